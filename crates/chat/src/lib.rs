pub mod bridge;
pub mod memory;
pub mod session;

pub use bridge::{run_delivery_loop, ChatTransport, DeliveryBridge};
pub use memory::ChatMemory;
pub use session::{ChatSession, ChatValue, CHAT_TURN_TASK};
