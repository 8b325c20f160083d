//! Server-side emission hook. Business logic calls [`Notifier::notify`];
//! the record is stored first, then pushed to whatever connections the
//! user has open.

use std::sync::Arc;

use anyhow::Context;
use tracing::debug;
use uuid::Uuid;

use jobboard_db::Database;
use jobboard_gateway::GroupRegistry;
use jobboard_types::models::{NewNotification, Notification};

use crate::notifications::notification_from_row;

#[derive(Clone)]
pub struct Notifier {
    db: Arc<Database>,
    registry: GroupRegistry,
}

impl Notifier {
    pub fn new(db: Arc<Database>, registry: GroupRegistry) -> Self {
        Self { db, registry }
    }

    /// Persist and deliver. Delivery is best effort; the returned
    /// notification is what was stored, whether or not anyone was online.
    pub async fn notify(&self, user_id: Uuid, new: NewNotification) -> anyhow::Result<Notification> {
        let data = new
            .data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("serializing notification data")?;

        let db = self.db.clone();
        let uid = user_id.to_string();
        let row = tokio::task::spawn_blocking(move || {
            db.insert_notification(&uid, &new.kind, &new.title, &new.message, data.as_deref())
        })
        .await
        .context("notification insert task panicked")??;

        let notification = notification_from_row(row);
        debug!("Notification {} ({}) stored for {}", notification.id, notification.kind, user_id);

        self.registry.emit(user_id, notification.clone()).await;
        Ok(notification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobboard_types::events::GatewayEvent;

    #[tokio::test]
    async fn notify_persists_then_delivers() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let registry = GroupRegistry::new();
        let notifier = Notifier::new(db.clone(), registry.clone());

        let user = Uuid::new_v4();
        let mut rx = registry.join(Uuid::new_v4(), user).await.unwrap();

        let sent = notifier
            .notify(
                user,
                NewNotification::new("new_application", "New applicant", "Sam applied")
                    .with_data(serde_json::json!({ "jobId": 42 })),
            )
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            GatewayEvent::Notification(n) => assert_eq!(n, sent),
            other => panic!("unexpected event {:?}", other),
        }

        let stored = db.get_notification(&user.to_string(), sent.id).unwrap().unwrap();
        assert!(!stored.is_read);
        assert_eq!(stored.data.as_deref(), Some(r#"{"jobId":42}"#));
    }

    #[tokio::test]
    async fn notify_offline_user_is_still_stored() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let notifier = Notifier::new(db.clone(), GroupRegistry::new());
        let user = Uuid::new_v4();

        notifier
            .notify(user, NewNotification::new("status_change", "Update", "Shortlisted"))
            .await
            .unwrap();

        assert_eq!(db.unread_notification_count(&user.to_string()).unwrap(), 1);
    }
}
