use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Component not registered: {0}")]
    ComponentNotRegistered(String),

    #[error("Unknown skill: {0}")]
    UnknownSkill(String),

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Task already registered: {0}")]
    TaskAlreadyRegistered(String),

    #[error("Skill error: {0}")]
    Skill(String),

    #[error("Component error: {0}")]
    Component(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0}")]
    Other(String),
}

/// Coarse classification used to filter exception handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ComponentNotRegistered,
    UnknownSkill,
    UnknownTask,
    TaskAlreadyRegistered,
    Skill,
    Component,
    Validation,
    Config,
    Delivery,
    Io,
    Json,
    Yaml,
    Other,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ComponentNotRegistered(_) => ErrorKind::ComponentNotRegistered,
            Error::UnknownSkill(_) => ErrorKind::UnknownSkill,
            Error::UnknownTask(_) => ErrorKind::UnknownTask,
            Error::TaskAlreadyRegistered(_) => ErrorKind::TaskAlreadyRegistered,
            Error::Skill(_) => ErrorKind::Skill,
            Error::Component(_) => ErrorKind::Component,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Config(_) => ErrorKind::Config,
            Error::Delivery(_) => ErrorKind::Delivery,
            Error::Io(_) => ErrorKind::Io,
            Error::Json(_) => ErrorKind::Json,
            Error::Yaml(_) => ErrorKind::Yaml,
            Error::Other(_) => ErrorKind::Other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
