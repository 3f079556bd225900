use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use crate::NotificationSink;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationUpdate {
    New,
    Changed { old_message: String },
    Equal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ShownNotification {
    title: String,
    message: String,
}

/// Tracks which persistent notifications are currently shown so they can be
/// dismissed once the condition clears.
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    shown: Mutex<HashMap<String, ShownNotification>>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            sink,
            shown: Mutex::new(HashMap::new()),
        }
    }

    pub fn show(&self, id: &str, title: &str, message: &str) -> NotificationUpdate {
        let next = ShownNotification {
            title: title.to_owned(),
            message: message.to_owned(),
        };
        let update = {
            let mut shown = self.shown.lock().unwrap_or_else(PoisonError::into_inner);
            match shown.insert(id.to_owned(), next.clone()) {
                None => NotificationUpdate::New,
                Some(old) if old == next => NotificationUpdate::Equal,
                Some(old) => NotificationUpdate::Changed {
                    old_message: old.message,
                },
            }
        };
        self.sink.create(id, title, message);
        update
    }

    /// Returns true if the notification was shown.
    pub fn dismiss(&self, id: &str) -> bool {
        let removed = self
            .shown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some();
        if removed {
            self.sink.dismiss(id);
        }
        removed
    }

    pub fn dismiss_all(&self) {
        let ids: Vec<String> = self
            .shown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(id, _)| id)
            .collect();
        for id in ids {
            self.sink.dismiss(&id);
        }
    }

    pub fn is_shown(&self, id: &str) -> bool {
        self.shown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }
}
