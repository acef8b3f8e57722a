use crate::process::{NotificationEvent, ProcessId};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::warn;

/// Status update pushed to the UI
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    SubscriptionCreated(ProcessId),
    Event(NotificationEvent),
    SubscriptionDeleted(ProcessId),
    ProcessStarted(ProcessId),
    MutationResult(Value),
    Error(String),
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::SubscriptionCreated(id) => write!(f, "Subscription to {id} created"),
            Notification::Event(event) => write!(f, "{event}"),
            Notification::SubscriptionDeleted(id) => write!(f, "Subscription to {id} deleted"),
            Notification::ProcessStarted(id) => write!(f, "Process started: {id}"),
            Notification::MutationResult(data) => write!(f, "{data}"),
            Notification::Error(message) => write!(f, "Error: {message}"),
        }
    }
}

#[async_trait]
pub trait Observer: Send + Sync {
    async fn notify(&self, notification: Notification);
}

/// Append-only in-memory log of notifications
#[derive(Clone, Default)]
pub struct MessageLog(Arc<Mutex<Vec<Notification>>>);

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.0.lock().await.clone()
    }

    /// Notifications rendered the way they are displayed
    pub async fn lines(&self) -> Vec<String> {
        self.0.lock().await.iter().map(ToString::to_string).collect()
    }

    pub async fn len(&self) -> usize {
        self.0.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.0.lock().await.is_empty()
    }
}

#[async_trait]
impl Observer for MessageLog {
    async fn notify(&self, notification: Notification) {
        self.0.lock().await.push(notification);
    }
}

/// Writes one line per notification to any async writer
pub struct WriterObserver(Arc<Mutex<Box<dyn AsyncWrite + Unpin + Sync + Send>>>);

impl Clone for WriterObserver {
    fn clone(&self) -> Self {
        WriterObserver(self.0.clone())
    }
}

impl WriterObserver {
    pub fn new(writer: Box<dyn AsyncWrite + Unpin + Sync + Send>) -> Self {
        WriterObserver(Arc::new(Mutex::new(writer)))
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(tokio::io::stdout()))
    }
}

#[async_trait]
impl Observer for WriterObserver {
    async fn notify(&self, notification: Notification) {
        let line = format!("{notification}\n");
        let mut writer = self.0.lock().await;
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            warn!(error = %e, "Failed to write notification");
            return;
        }
        if let Err(e) = writer.flush().await {
            warn!(error = %e, "Failed to flush notification");
        }
    }
}
