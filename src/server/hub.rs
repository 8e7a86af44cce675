use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};

/// Notice that a collection changed. Receivers re-read the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Changed;

/// Fans change notices out to every session watching a user's collection.
pub struct ChangeHub {
    /// Key: (user_id, collection)
    channels: RwLock<HashMap<(String, String), broadcast::Sender<Changed>>>,
}

impl ChangeHub {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribes to changes of one user's collection.
    pub async fn subscribe(&self, user_id: &str, collection: &str) -> broadcast::Receiver<Changed> {
        let key = (user_id.to_string(), collection.to_string());

        let mut channels = self.channels.write().await;

        if let Some(sender) = channels.get(&key) {
            sender.subscribe()
        } else {
            // Lagging receivers only need to know something changed
            let (sender, receiver) = broadcast::channel(16);
            channels.insert(key, sender);
            receiver
        }
    }

    /// Notifies every subscriber of one user's collection.
    pub async fn notify(&self, user_id: &str, collection: &str) {
        let key = (user_id.to_string(), collection.to_string());

        let mut channels = self.channels.write().await;

        if let Some(sender) = channels.get(&key) {
            if sender.send(Changed).is_err() {
                // Nobody is listening any more
                channels.remove(&key);
            }
        }
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}
