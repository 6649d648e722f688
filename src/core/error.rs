use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Robot not found: {0}")]
    RobotNotFound(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Assist error: {0}")]
    AssistError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

pub type Result<T> = std::result::Result<T, SimError>;
