use tokio_tungstenite::tungstenite;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("API key must be set either via argument or GEMINI_API_KEY environment variable")]
    MissingApiKey,
    #[error("websocket error: {0}")]
    WebSocket(#[from] Box<tungstenite::Error>),
    #[error("live session setup failed: {0}")]
    Setup(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("connection closed: {}", .reason.as_deref().unwrap_or("no reason given"))]
    Closed { reason: Option<String> },
    #[error("session is closed")]
    SessionClosed,
    /// No `turnComplete` message arrived within the configured number of polls
    ///
    /// The queue is left as it is, so late fragments of this turn are
    /// collected as the next one.
    #[error("timed out waiting for a complete turn after {attempts} polling attempts")]
    TurnTimeout { attempts: u32 },
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Base64(#[from] base64::DecodeError),
}

impl From<tungstenite::Error> for Error {
    fn from(error: tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(error))
    }
}

impl Error {
    /// Whether this error came from the connection rather than from turn bookkeeping.
    ///
    /// A session closes itself before handing one of these back.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::WebSocket(_) | Self::Transport(_) | Self::Closed { .. }
        )
    }
}
