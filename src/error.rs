use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClockError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("upstream channel error: {0}")]
    Upstream(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unprocessable: {0}")]
    Unprocessable(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}

pub type Result<T> = std::result::Result<T, ClockError>;

impl From<diesel::result::Error> for ClockError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => ClockError::NotFound("record not found".to_string()),
            other => ClockError::Database(other.to_string()),
        }
    }
}
