use tokio::sync::broadcast;
use tracing::debug;

use grocer_types::events::Notification;

const NOTIFICATION_CAPACITY: usize = 64;

/// Where user-visible notifications go (toasts in a UI, lines in a terminal).
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

impl<F> Notifier for F
where
    F: Fn(Notification) + Send + Sync,
{
    fn notify(&self, notification: Notification) {
        self(notification)
    }
}

/// Fans notifications out to every subscriber.
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, notification: Notification) {
        debug!("Notification: {:?}", notification);
        // Nobody listening is fine
        let _ = self.tx.send(notification);
    }
}
