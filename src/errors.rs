use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Screen capture failed after {attempts} attempts: {last_error}")]
    CaptureFailed { attempts: u32, last_error: String },

    #[error("Decision service transport failure: {0}")]
    Transport(String),

    #[error("Decision response decode failure: {0}")]
    Decode(String),

    #[error("Dispatch failure: {0}")]
    Dispatch(String),

    #[error("Screen capture produced an empty payload")]
    EmptyCapture,

    #[error("Task cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl serde::Serialize for AgentError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
