use crate::model::Timestamp;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingReason,
    EmptyMessage,
    SlotCount(usize),
    SlotNotInFuture(Timestamp),
    SlotNotAfterStart(Timestamp),
    DuplicateSlot(Timestamp),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::MissingReason => write!(f, "a decline reason is required"),
            ValidationError::EmptyMessage => write!(f, "a message to the patient is required"),
            ValidationError::SlotCount(n) => {
                write!(f, "between 1 and 3 alternative times are required, got {n}")
            }
            ValidationError::SlotNotInFuture(start) => {
                write!(f, "proposed time {} is not in the future", start.to_rfc3339())
            }
            ValidationError::SlotNotAfterStart(start) => {
                write!(f, "proposed time {} does not end after it starts", start.to_rfc3339())
            }
            ValidationError::DuplicateSlot(start) => {
                write!(f, "proposed time {} is listed more than once", start.to_rfc3339())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    Network(String),
    Http { status: u16, message: String },
    Decode(String),
    Validation(ValidationError),
    ActionInFlight(String),
    Realtime(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Network(e) => write!(f, "network error: {e}"),
            StoreError::Http { message, .. } => f.write_str(message),
            StoreError::Decode(e) => write!(f, "unexpected response: {e}"),
            StoreError::Validation(e) => write!(f, "{e}"),
            StoreError::ActionInFlight(id) => {
                write!(f, "an action on booking {id} is already in progress")
            }
            StoreError::Realtime(e) => write!(f, "realtime error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<ValidationError> for StoreError {
    fn from(e: ValidationError) -> Self {
        StoreError::Validation(e)
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            StoreError::Decode(e.to_string())
        } else {
            StoreError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Decode(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for StoreError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        StoreError::Realtime(e.to_string())
    }
}
