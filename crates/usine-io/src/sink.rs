use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use usine_core::Reading;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("initialization failed: {0}")]
    Initialize(String),

    #[error("sink used before a successful initialize")]
    NotInitialized,

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize reading: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP endpoint answered with status {status}")]
    HttpStatus { status: u16 },

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("sink panicked: {0}")]
    Panicked(String),
}

impl SinkError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> SinkError {
        let path = path.into();
        move |source| SinkError::Io { path, source }
    }
}

/// Consumer of generated readings.
///
/// `initialize` runs once before the first tick, `send` once per tick while
/// the sink is enabled, and `cleanup` exactly once at shutdown, including
/// after a failed `initialize`. `send` must return in bounded time; any
/// timeout policy belongs to the implementation.
#[async_trait]
pub trait Sink: Send {
    /// Identifier used in logs and metric labels.
    fn name(&self) -> &str;

    async fn initialize(&mut self) -> Result<(), SinkError>;

    async fn send(&mut self, reading: &Reading) -> Result<(), SinkError>;

    async fn cleanup(&mut self) -> Result<(), SinkError>;
}
