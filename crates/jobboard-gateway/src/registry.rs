use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, trace};
use uuid::Uuid;

use jobboard_types::events::GatewayEvent;
use jobboard_types::models::Notification;

/// Server-assigned id of one open gateway connection.
pub type ConnectionId = Uuid;

/// Broadcast address for all connections of one user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey(String);

impl GroupKey {
    pub fn for_user(user_id: Uuid) -> Self {
        Self(format!("user_{}", user_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Group membership and fan-out for connected clients.
///
/// Membership is mutated only by the connection task (join on admit, leave
/// on close). Business logic only calls [`GroupRegistry::emit`].
#[derive(Clone, Default)]
pub struct GroupRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    /// group -> (conn_id -> per-connection queue)
    groups: RwLock<HashMap<GroupKey, HashMap<ConnectionId, mpsc::UnboundedSender<GatewayEvent>>>>,

    /// conn_id -> the one group it belongs to
    members: RwLock<HashMap<ConnectionId, GroupKey>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a connection to its user's group. Returns the receiving end of
    /// the connection's queue, or `None` if the connection already belongs to
    /// a group.
    pub async fn join(
        &self,
        conn_id: ConnectionId,
        user_id: Uuid,
    ) -> Option<mpsc::UnboundedReceiver<GatewayEvent>> {
        let group = GroupKey::for_user(user_id);

        // Lock order: members, then groups.
        let mut members = self.inner.members.write().await;
        if members.contains_key(&conn_id) {
            return None;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .groups
            .write()
            .await
            .entry(group.clone())
            .or_default()
            .insert(conn_id, tx);

        debug!("Connection {} joined {}", conn_id, group);
        members.insert(conn_id, group);
        Some(rx)
    }

    /// Remove a connection from its group. Empty groups are dropped.
    pub async fn leave(&self, conn_id: ConnectionId) {
        let mut members = self.inner.members.write().await;
        let Some(group) = members.remove(&conn_id) else {
            return;
        };

        let mut groups = self.inner.groups.write().await;
        if let Some(conns) = groups.get_mut(&group) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                groups.remove(&group);
            }
        }

        debug!("Connection {} left {}", conn_id, group);
    }

    /// Push a notification to every open connection of `user_id`.
    ///
    /// Fire-and-forget: an offline user is a no-op, and a connection whose
    /// task has already exited is skipped.
    pub async fn emit(&self, user_id: Uuid, notification: Notification) {
        let group = GroupKey::for_user(user_id);
        let groups = self.inner.groups.read().await;

        let Some(conns) = groups.get(&group) else {
            trace!("No open connections in {}, dropping notification {}", group, notification.id);
            return;
        };

        let event = GatewayEvent::Notification(notification);
        for (conn_id, tx) in conns {
            if tx.send(event.clone()).is_err() {
                trace!("Connection {} closed before delivery", conn_id);
            }
        }
    }

    /// Number of open connections for one user.
    pub async fn connection_count(&self, user_id: Uuid) -> usize {
        self.inner
            .groups
            .read()
            .await
            .get(&GroupKey::for_user(user_id))
            .map_or(0, HashMap::len)
    }

    /// Number of non-empty groups.
    pub async fn group_count(&self) -> usize {
        self.inner.groups.read().await.len()
    }

    /// The group a connection was joined to, if it is still open.
    pub async fn group_of(&self, conn_id: ConnectionId) -> Option<GroupKey> {
        self.inner.members.read().await.get(&conn_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn notification(id: i64) -> Notification {
        Notification {
            id,
            kind: "new_application".into(),
            title: format!("title {id}"),
            message: "body".into(),
            data: None,
            is_read: false,
            created_at: Utc::now(),
        }
    }

    fn expect_notification(event: GatewayEvent) -> Notification {
        match event {
            GatewayEvent::Notification(n) => n,
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn group_key_is_derived_from_user() {
        let user = Uuid::parse_str("6f1c2a9e-0000-4000-8000-000000000001").unwrap();
        assert_eq!(
            GroupKey::for_user(user).as_str(),
            "user_6f1c2a9e-0000-4000-8000-000000000001"
        );
    }

    #[tokio::test]
    async fn emit_preserves_order_per_connection() {
        let registry = GroupRegistry::new();
        let user = Uuid::new_v4();
        let mut rx = registry.join(Uuid::new_v4(), user).await.unwrap();

        registry.emit(user, notification(1)).await;
        registry.emit(user, notification(2)).await;

        assert_eq!(expect_notification(rx.recv().await.unwrap()).id, 1);
        assert_eq!(expect_notification(rx.recv().await.unwrap()).id, 2);
    }

    #[tokio::test]
    async fn emit_fans_out_to_every_connection_of_the_user() {
        let registry = GroupRegistry::new();
        let user = Uuid::new_v4();
        let mut tab_a = registry.join(Uuid::new_v4(), user).await.unwrap();
        let mut tab_b = registry.join(Uuid::new_v4(), user).await.unwrap();
        assert_eq!(registry.connection_count(user).await, 2);
        assert_eq!(registry.group_count().await, 1);

        registry.emit(user, notification(1)).await;

        assert_eq!(expect_notification(tab_a.recv().await.unwrap()).id, 1);
        assert_eq!(expect_notification(tab_b.recv().await.unwrap()).id, 1);
    }

    #[tokio::test]
    async fn groups_are_isolated() {
        let registry = GroupRegistry::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let mut alice_rx = registry.join(Uuid::new_v4(), alice).await.unwrap();
        let mut bob_rx = registry.join(Uuid::new_v4(), bob).await.unwrap();

        registry.emit(alice, notification(1)).await;

        assert_eq!(expect_notification(alice_rx.recv().await.unwrap()).id, 1);
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn join_is_once_per_connection() {
        let registry = GroupRegistry::new();
        let conn = Uuid::new_v4();
        let user = Uuid::new_v4();

        let _rx = registry.join(conn, user).await.unwrap();
        assert!(registry.join(conn, user).await.is_none());
        assert!(registry.join(conn, Uuid::new_v4()).await.is_none());
        assert_eq!(registry.connection_count(user).await, 1);
        assert_eq!(registry.group_count().await, 1);
        assert_eq!(registry.group_of(conn).await, Some(GroupKey::for_user(user)));
    }

    #[tokio::test]
    async fn leave_drops_connection_and_empty_group() {
        let registry = GroupRegistry::new();
        let user = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let _a = registry.join(first, user).await.unwrap();
        let mut b = registry.join(second, user).await.unwrap();

        registry.leave(first).await;
        assert_eq!(registry.connection_count(user).await, 1);

        registry.emit(user, notification(5)).await;
        assert_eq!(expect_notification(b.recv().await.unwrap()).id, 5);

        registry.leave(second).await;
        registry.leave(second).await;
        assert_eq!(registry.connection_count(user).await, 0);
        assert_eq!(registry.group_count().await, 0);
        assert!(registry.group_of(second).await.is_none());
    }

    #[tokio::test]
    async fn emit_to_offline_user_is_a_no_op() {
        let registry = GroupRegistry::new();
        registry.emit(Uuid::new_v4(), notification(1)).await;
        assert_eq!(registry.group_count().await, 0);
    }

    #[tokio::test]
    async fn emit_skips_connections_whose_receiver_is_gone() {
        let registry = GroupRegistry::new();
        let user = Uuid::new_v4();
        let dropped = registry.join(Uuid::new_v4(), user).await.unwrap();
        drop(dropped);
        let mut live = registry.join(Uuid::new_v4(), user).await.unwrap();

        registry.emit(user, notification(9)).await;
        assert_eq!(expect_notification(live.recv().await.unwrap()).id, 9);
    }
}
