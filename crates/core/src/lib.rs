pub mod config;
pub mod error;
pub mod message;

pub use config::ChatConfig;
pub use error::{Error, ErrorKind, Result};
pub use message::{ChatMessage, DeliveryOp, InboundMessage};
