//! Client-side notification state: newest-first history plus an unread
//! counter that always equals the number of unread entries.

use std::collections::{HashMap, HashSet, VecDeque};

use jobboard_types::models::Notification;

#[derive(Debug, Default, Clone)]
pub struct NotificationStore {
    /// Newest first
    history: VecDeque<Notification>,
    unread: usize,
    ids: HashSet<i64>,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend a pushed notification. A notification whose id is already
    /// present is ignored and `false` is returned.
    pub fn add_notification(&mut self, notification: Notification) -> bool {
        if !self.ids.insert(notification.id) {
            return false;
        }
        if !notification.is_read {
            self.unread += 1;
        }
        self.history.push_front(notification);
        true
    }

    /// Mark one entry read. Returns `true` only on an unread -> read
    /// transition, so repeated calls never decrement twice.
    pub fn mark_as_read(&mut self, id: i64) -> bool {
        match self.history.iter_mut().find(|n| n.id == id) {
            Some(n) if !n.is_read => {
                n.is_read = true;
                self.unread -= 1;
                true
            }
            _ => false,
        }
    }

    /// Reconcile with an authoritative history page.
    ///
    /// Entries are matched by id. For ids present in both, the snapshot's
    /// copy (and so its read flag) replaces the local one. Local entries the
    /// snapshot does not mention are kept. The result is ordered by id,
    /// highest first, and the unread counter is recomputed once.
    pub fn merge_snapshot(&mut self, snapshot: Vec<Notification>) {
        let mut by_id: HashMap<i64, Notification> =
            self.history.drain(..).map(|n| (n.id, n)).collect();
        for n in snapshot {
            by_id.insert(n.id, n);
        }

        let mut merged: Vec<Notification> = by_id.into_values().collect();
        merged.sort_unstable_by(|a, b| b.id.cmp(&a.id));

        self.ids = merged.iter().map(|n| n.id).collect();
        self.unread = merged.iter().filter(|n| !n.is_read).count();
        self.history = merged.into();
    }

    /// Drop all state (logout, credential loss, transport close).
    pub fn clear(&mut self) {
        self.history.clear();
        self.ids.clear();
        self.unread = 0;
    }

    pub fn unread_count(&self) -> usize {
        self.unread
    }

    pub fn history(&self) -> impl Iterator<Item = &Notification> {
        self.history.iter()
    }

    pub fn get(&self, id: i64) -> Option<&Notification> {
        self.history.iter().find(|n| n.id == id)
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}
