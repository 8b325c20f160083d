use tokio_tungstenite::tungstenite;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The gateway refused the credential during the handshake.
    #[error("credential rejected: {0}")]
    Rejected(String),

    #[error("invalid gateway url: {0}")]
    InvalidUrl(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request failed with status {0}")]
    Status(u16),
}
