use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state not found: {store}/{key}")]
    NotFound { store: String, key: String },
    #[error("state store client is closed")]
    Closed,
    #[error("state store unreachable: {0}")]
    Transport(String),
    #[error("state store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),
}

impl StoreError {
    pub fn not_found(store: &str, key: &str) -> Self {
        Self::NotFound { store: store.to_string(), key: key.to_string() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::NotFound { .. } => "not_found",
            StoreError::Closed => "closed",
            StoreError::Transport(_) => "transport",
            StoreError::Rejected { .. } => "rejected",
            StoreError::Decode(_) => "decode",
            StoreError::Io(_) => "io",
            StoreError::InvalidConfig(_) => "invalid_config",
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            StoreError::Decode(e.to_string())
        } else {
            StoreError::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_texts_are_stable() {
        assert_eq!(StoreError::not_found("s", "k").to_string(), "state not found: s/k");
        assert_eq!(
            StoreError::Rejected { status: 500, message: "boom".into() }.to_string(),
            "state store rejected request (500): boom"
        );
        assert_eq!(StoreError::Closed.to_string(), "state store client is closed");
    }

    #[test]
    fn not_found_classification() {
        assert!(StoreError::not_found("s", "k").is_not_found());
        assert!(!StoreError::Closed.is_not_found());
        assert_eq!(StoreError::Transport("x".into()).kind(), "transport");
    }
}
