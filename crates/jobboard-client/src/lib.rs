//! Client side of the notification bridge: keeps one authenticated push
//! channel open for the current credential and maintains the local
//! notification list and unread counter.

pub mod credentials;
pub mod error;
pub mod history;
pub mod session;
pub mod store;

pub use credentials::CredentialStore;
pub use error::ClientError;
pub use history::HistoryClient;
pub use session::{ClientConfig, ConnectionState, NotificationClient};
pub use store::NotificationStore;
