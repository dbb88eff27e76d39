use serde::{Deserialize, Serialize};

/// Body accepted by `POST /state`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StateRequest {
    pub message: String,
}

/// Body returned by `GET /state`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StateResponse {
    pub state: String,
    #[serde(rename = "eTag")]
    pub etag: String,
}

/// Fixed acknowledgement envelope: `{"message": ...}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MessageBody {
    pub message: String,
}

impl MessageBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Error envelope: `{"error": ...}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}
