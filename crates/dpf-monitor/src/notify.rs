//! User Notifications
//!
//! Notifications are best effort: every call reports success as a flag and
//! never fails the caller.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};

/// Platform notification surface
#[async_trait]
pub trait Notifier: Send + Sync {
    /// High-priority alert
    async fn alert(&self, title: &str, body: &str) -> bool;

    /// Show or replace the low-priority ongoing notification
    async fn show_persistent(&self, title: &str, body: &str) -> bool;

    /// Remove the ongoing notification
    async fn dismiss_persistent(&self) -> bool;
}

/// Whether the platform can notify at all
#[derive(Clone, Default)]
pub enum NotifierCapability {
    Available(Arc<dyn Notifier>),
    #[default]
    Unavailable,
}

impl NotifierCapability {
    /// Wrap a working notifier
    pub fn available(notifier: Arc<dyn Notifier>) -> Self {
        NotifierCapability::Available(notifier)
    }

    /// Check if notifications can be shown at all
    pub fn is_available(&self) -> bool {
        matches!(self, NotifierCapability::Available(_))
    }

    /// Forwarded to the notifier; `false` when unavailable
    pub async fn alert(&self, title: &str, body: &str) -> bool {
        match self {
            NotifierCapability::Available(n) => n.alert(title, body).await,
            NotifierCapability::Unavailable => false,
        }
    }

    pub async fn show_persistent(&self, title: &str, body: &str) -> bool {
        match self {
            NotifierCapability::Available(n) => n.show_persistent(title, body).await,
            NotifierCapability::Unavailable => false,
        }
    }

    pub async fn dismiss_persistent(&self) -> bool {
        match self {
            NotifierCapability::Available(n) => n.dismiss_persistent().await,
            NotifierCapability::Unavailable => false,
        }
    }
}

/// Notification recorded by [`RecordingNotifier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Alert { title: String, body: String },
    Persistent { title: String, body: String },
    Dismissed,
}

/// Notifier that remembers what it was asked to show
#[derive(Default)]
pub struct RecordingNotifier {
    log: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything shown so far, oldest first
    pub fn notifications(&self) -> Vec<Notification> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of alerts shown
    pub fn alert_count(&self) -> usize {
        self.notifications()
            .iter()
            .filter(|n| matches!(n, Notification::Alert { .. }))
            .count()
    }

    fn record(&self, notification: Notification) -> bool {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
        true
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn alert(&self, title: &str, body: &str) -> bool {
        self.record(Notification::Alert {
            title: title.to_string(),
            body: body.to_string(),
        })
    }

    async fn show_persistent(&self, title: &str, body: &str) -> bool {
        self.record(Notification::Persistent {
            title: title.to_string(),
            body: body.to_string(),
        })
    }

    async fn dismiss_persistent(&self) -> bool {
        self.record(Notification::Dismissed)
    }
}
