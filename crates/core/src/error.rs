use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorekeepError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("{0}")]
    Validation(String),
    #[error("{operation} failed (status {status}): {message}")]
    Remote {
        operation: String,
        status: u16,
        message: String,
    },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("operation {name} did not complete after {attempts} polls")]
    Timeout { name: String, attempts: u32 },
    #[error("operation {name} failed: {message}")]
    OperationFailed { name: String, message: String },
    #[error("operation {0} was cancelled")]
    Cancelled(String),
    #[error("other: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, StorekeepError>;

impl StorekeepError {
    pub fn validation<E: ToString>(msg: E) -> Self {
        Self::Validation(msg.to_string())
    }

    pub fn transport<E: ToString>(err: E) -> Self {
        Self::Transport(err.to_string())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<toml::de::Error> for StorekeepError {
    fn from(value: toml::de::Error) -> Self {
        Self::Config(value.to_string())
    }
}
