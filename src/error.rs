use thiserror::Error;

pub type FeedResult<T> = Result<T, FeedError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeedError {
    #[error("connection error on source `{source_id}`: {reason}")]
    Connection { source_id: String, reason: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("decimation error: {0}")]
    Decimation(String),

    #[error("invalid sample: {0}")]
    InvalidSample(String),

    #[error("out-of-order sample on channel `{channel}`: {incoming} < newest {newest}")]
    OutOfOrder {
        channel: String,
        newest: f64,
        incoming: f64,
    },

    #[error("sample for channel `{actual}` appended to buffer of `{expected}`")]
    ChannelMismatch { expected: String, actual: String },

    #[error("rendering surface error: {0}")]
    Surface(String),

    #[error("session is closed")]
    SessionClosed,
}

impl FeedError {
    pub(crate) fn connection(source_id: &str, reason: impl Into<String>) -> Self {
        Self::Connection {
            source_id: source_id.to_owned(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse(_))
    }

    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}
