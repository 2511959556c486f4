use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ReactorError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("task execution error: {0}")]
    TaskExecution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<redis::RedisError> for ReactorError {
    fn from(err: redis::RedisError) -> Self {
        ReactorError::Storage(err.to_string())
    }
}

impl Serialize for ReactorError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
