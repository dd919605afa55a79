use std::{
    collections::HashMap,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
    task::{Context, Poll},
};

use futures::Stream;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::model::notification::Notification;

/// Pending notifications one connection may queue before newer ones are
/// dropped for it.
const SUBSCRIBER_BUFFER: usize = 10;

/// In-memory fan-out registry for live notification delivery, keyed by
/// recipient. Constructed once in `main` and cloned into handlers through
/// `AppState`.
///
/// Durable delivery is the caller's concern: persist the notification first,
/// then publish here for whoever happens to be connected right now.
#[derive(Clone)]
pub struct NotificationHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    // Invariant: a user id is present iff it has at least one live handle.
    subs: RwLock<HashMap<Uuid, HashMap<u64, mpsc::Sender<Notification>>>>,
    next_token: AtomicU64,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                subs: RwLock::new(HashMap::new()),
                next_token: AtomicU64::new(0),
            }),
        }
    }

    /// Registers a new bounded channel for `user_id` and returns its handle.
    /// Every open connection of a user holds its own subscription.
    pub fn subscribe(&self, user_id: Uuid) -> Subscription {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_BUFFER);
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        let mut subs = self.inner.subs.write().unwrap();
        subs.entry(user_id).or_default().insert(token, sender);
        Subscription {
            hub: self.clone(),
            user_id,
            token,
            receiver,
        }
    }

    /// Removes the handle from the registry and closes its channel. Dropping
    /// the handle does the same; both paths are idempotent.
    #[allow(dead_code)]
    pub fn unsubscribe(&self, subscription: Subscription) {
        drop(subscription);
    }

    /// Pushes a notification to every live subscription of its recipient.
    /// Never blocks: a subscriber whose buffer is full loses this
    /// notification (it stays available through the persisted list).
    pub fn publish(&self, notification: &Notification) {
        let subs = self.inner.subs.read().unwrap();
        let Some(user_subs) = subs.get(&notification.user_id) else {
            return;
        };
        for sender in user_subs.values() {
            match sender.try_send(notification.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(
                        user_id = %notification.user_id,
                        "subscriber buffer full, dropping live notification"
                    );
                }
                // Receiver already gone; its Drop removes the entry shortly.
                Err(TrySendError::Closed(_)) => {}
            }
        }
    }

    pub fn subscriber_count(&self, user_id: Uuid) -> usize {
        self.inner
            .subs
            .read()
            .unwrap()
            .get(&user_id)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    fn remove(&self, user_id: Uuid, token: u64) {
        let mut subs = self.inner.subs.write().unwrap();
        if let Some(user_subs) = subs.get_mut(&user_id) {
            user_subs.remove(&token);
            if user_subs.is_empty() {
                subs.remove(&user_id);
            }
        }
    }

    #[cfg(test)]
    fn registered_users(&self) -> usize {
        self.inner.subs.read().unwrap().len()
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One live subscription, bound to one connection. Dropping it unregisters
/// the channel; the per-user registry entry disappears with the last handle.
pub struct Subscription {
    hub: NotificationHub,
    user_id: Uuid,
    token: u64,
    receiver: mpsc::Receiver<Notification>,
}

impl Subscription {
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// Waits for the next notification published for this subscription.
    #[allow(dead_code)]
    pub async fn recv(&mut self) -> Option<Notification> {
        self.receiver.recv().await
    }
}

impl Stream for Subscription {
    type Item = Notification;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.remove(self.user_id, self.token);
    }
}
