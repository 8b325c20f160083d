//! Connection lifecycle for the push channel.
//!
//! One driver task owns the websocket. It watches the credential store and
//! moves through Disconnected -> Connecting -> Connected, or into Error when
//! the gateway refuses the credential. Because only the driver ever dials,
//! there is at most one handshake in flight per client.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode, header};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use jobboard_types::events::GatewayEvent;
use jobboard_types::models::Notification;

use crate::credentials::CredentialStore;
use crate::error::ClientError;
use crate::history::HistoryClient;
use crate::store::NotificationStore;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SharedStore = Arc<Mutex<NotificationStore>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The gateway rejected the current credential. No retry happens until
    /// the credential changes.
    Error(String),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// e.g. `ws://localhost:3000/gateway`
    pub gateway_url: String,
    /// REST base for the history fetch and read-state calls. Without it the
    /// client only knows what was pushed since it connected.
    pub api_url: Option<String>,
    pub history_page_size: u32,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl ClientConfig {
    pub fn new(gateway_url: impl Into<String>) -> Self {
        Self {
            gateway_url: gateway_url.into(),
            api_url: None,
            history_page_size: 20,
            backoff_initial: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self
    }
}

/// Handle to a running notification session. Dropping it closes the
/// socket and stops reconnecting.
pub struct NotificationClient {
    store: SharedStore,
    state: watch::Receiver<ConnectionState>,
    credentials: CredentialStore,
    history: Option<Arc<HistoryClient>>,
    driver: JoinHandle<()>,
}

impl NotificationClient {
    /// Start the driver. Must be called from within a tokio runtime.
    pub fn spawn(config: ClientConfig, credentials: CredentialStore) -> Self {
        let store: SharedStore = Arc::new(Mutex::new(NotificationStore::new()));
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let history = config
            .api_url
            .as_ref()
            .map(|url| Arc::new(HistoryClient::new(url.clone(), config.history_page_size)));

        let driver = Driver {
            backoff: Backoff::new(config.backoff_initial, config.backoff_max),
            config,
            credentials: credentials.subscribe(),
            store: store.clone(),
            state: state_tx,
            history: history.clone(),
        };
        let driver = tokio::spawn(driver.run());

        Self {
            store,
            state,
            credentials,
            history,
            driver,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        *self.state.borrow() == ConnectionState::Connected
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn unread_count(&self) -> usize {
        self.store.lock().unread_count()
    }

    /// Copy of the current history, newest first.
    pub fn history(&self) -> Vec<Notification> {
        self.store.lock().history().cloned().collect()
    }

    /// Run a read-only closure against the store under its lock.
    pub fn with_store<T>(&self, f: impl FnOnce(&NotificationStore) -> T) -> T {
        f(&self.store.lock())
    }

    /// Mark a notification read locally, then tell the server in the
    /// background. Server failures are logged; local state is not rolled back.
    pub fn mark_as_read(&self, id: i64) -> bool {
        let changed = self.store.lock().mark_as_read(id);
        if !changed {
            return false;
        }

        if let (Some(history), Some(token)) = (self.history.clone(), self.credentials.current()) {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if let Err(e) = history.mark_read(&token, id).await {
                        warn!("Failed to sync read state for notification {}: {}", id, e);
                    }
                });
            }
        }
        true
    }
}

impl Drop for NotificationClient {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

enum ChannelEnd {
    TransportClosed,
    CredentialChanged,
    CredentialsDropped,
}

struct Driver {
    config: ClientConfig,
    credentials: watch::Receiver<Option<String>>,
    store: SharedStore,
    state: watch::Sender<ConnectionState>,
    history: Option<Arc<HistoryClient>>,
    backoff: Backoff,
}

impl Driver {
    async fn run(mut self) {
        // Last credential the gateway refused; never redialed with.
        let mut rejected: Option<String> = None;

        loop {
            let token = self.credentials.borrow_and_update().clone();

            let Some(token) = token else {
                rejected = None;
                self.reset(ConnectionState::Disconnected);
                if self.credentials.changed().await.is_err() {
                    return;
                }
                continue;
            };

            if rejected.as_deref() == Some(token.as_str()) {
                if self.credentials.changed().await.is_err() {
                    return;
                }
                continue;
            }

            self.set_state(ConnectionState::Connecting);

            let attempt = tokio::select! {
                result = connect(&self.config.gateway_url, &token) => Some(result),
                changed = self.credentials.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    None
                }
            };
            let Some(result) = attempt else {
                debug!("Credential changed during handshake, restarting");
                continue;
            };

            match result {
                Ok(ws) => {
                    self.backoff.reset();
                    self.set_state(ConnectionState::Connected);
                    info!("Connected to {}", self.config.gateway_url);

                    let end = self.run_channel(ws, &token).await;
                    self.reset(ConnectionState::Disconnected);

                    match end {
                        ChannelEnd::CredentialChanged => continue,
                        ChannelEnd::CredentialsDropped => return,
                        ChannelEnd::TransportClosed => {
                            if !self.wait_backoff().await {
                                return;
                            }
                        }
                    }
                }
                Err(ClientError::Rejected(reason)) => {
                    warn!("Gateway rejected credential: {}", reason);
                    rejected = Some(token);
                    self.reset(ConnectionState::Error(reason));
                }
                Err(e) => {
                    warn!("Gateway connection failed: {}", e);
                    self.set_state(ConnectionState::Disconnected);
                    if !self.wait_backoff().await {
                        return;
                    }
                }
            }
        }
    }

    /// Pump the open socket until it closes or the credential changes.
    async fn run_channel(&mut self, ws: WsStream, token: &str) -> ChannelEnd {
        let (mut write, mut read) = ws.split();

        let history = self.history.clone();
        let token = token.to_string();
        let fetch = async move {
            match history {
                Some(history) => Some(history.fetch_latest(&token).await),
                None => None,
            }
        };
        tokio::pin!(fetch);
        let mut fetched = false;

        loop {
            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => apply_frame(&self.store, text.as_str()),
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Gateway closed the connection");
                        return ChannelEnd::TransportClosed;
                    }
                    Some(Err(e)) => {
                        warn!("Gateway read error: {}", e);
                        return ChannelEnd::TransportClosed;
                    }
                    // tungstenite answers pings on its own
                    Some(Ok(_)) => {}
                },
                result = &mut fetch, if !fetched => {
                    fetched = true;
                    match result {
                        Some(Ok(snapshot)) => {
                            debug!("Merging {} notifications from history", snapshot.len());
                            self.store.lock().merge_snapshot(snapshot);
                        }
                        Some(Err(e)) => warn!("History fetch failed: {}", e),
                        None => {}
                    }
                }
                changed = self.credentials.changed() => {
                    let _ = write.close().await;
                    return match changed {
                        Ok(()) => ChannelEnd::CredentialChanged,
                        Err(_) => ChannelEnd::CredentialsDropped,
                    };
                }
            }
        }
    }

    /// Sleep for the next backoff step. A credential change cuts the wait
    /// short. Returns `false` once the credential store is gone.
    async fn wait_backoff(&mut self) -> bool {
        let delay = self.backoff.next_delay();
        debug!("Reconnecting in {:?}", delay);
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            changed = self.credentials.changed() => changed.is_ok(),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }

    fn reset(&self, state: ConnectionState) {
        self.store.lock().clear();
        self.set_state(state);
    }
}

async fn connect(url: &str, token: &str) -> Result<WsStream, ClientError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
    let value = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|_| ClientError::Rejected("credential is not a valid header value".into()))?;
    request.headers_mut().insert(header::AUTHORIZATION, value);

    match tokio_tungstenite::connect_async(request).await {
        Ok((ws, _)) => Ok(ws),
        Err(tungstenite::Error::Http(response)) if response.status() == StatusCode::UNAUTHORIZED => {
            let reason = response
                .body()
                .as_deref()
                .and_then(rejection_reason)
                .unwrap_or_else(|| "unauthorized".to_string());
            Err(ClientError::Rejected(reason))
        }
        Err(e) => Err(e.into()),
    }
}

/// Pull `reason` out of the gateway's 401 body.
fn rejection_reason(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value.get("reason")?.as_str().map(str::to_string)
}

/// Apply one server frame to the store. Anything that does not parse is
/// dropped.
fn apply_frame(store: &Mutex<NotificationStore>, text: &str) {
    match serde_json::from_str::<GatewayEvent>(text) {
        Ok(GatewayEvent::Notification(notification)) => {
            let id = notification.id;
            if !store.lock().add_notification(notification) {
                debug!("Ignoring duplicate notification {}", id);
            }
        }
        Ok(GatewayEvent::Ready { user_id, role }) => {
            debug!("Gateway ready for {} ({})", user_id, role.as_str());
        }
        Err(e) => {
            let preview: String = text.chars().take(200).collect();
            warn!("Dropping malformed gateway frame ({}): {}", e, preview);
        }
    }
}

/// Exponential reconnect delay: doubles from `initial` up to `max`.
#[derive(Debug, Clone)]
struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }
}
