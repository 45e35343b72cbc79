use thiserror::Error;

#[derive(Error, Debug)]
pub enum EstuaryError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid feed {url}: {reason}")]
    InvalidFeed { url: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl EstuaryError {
    pub fn is_auth(&self) -> bool {
        matches!(self, EstuaryError::Auth(_))
    }

    pub fn invalid_feed(url: &str, reason: impl ToString) -> Self {
        EstuaryError::InvalidFeed {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<reqwest::Error> for EstuaryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return EstuaryError::Parse(e.to_string());
        }
        match e.status().map(|s| s.as_u16()) {
            Some(401) | Some(403) => EstuaryError::Auth(e.to_string()),
            Some(404) => EstuaryError::NotFound(e.to_string()),
            _ => EstuaryError::Network(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, EstuaryError>;
