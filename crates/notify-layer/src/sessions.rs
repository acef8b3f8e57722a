use notify_layer_core::{
    ProcessId, SessionOutcome, SessionPolicy, SessionState, SubscriptionSession,
};
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct TrackedSession {
    cancellation_token: CancellationToken,
    task: Option<JoinHandle<SessionOutcome>>,
}

impl TrackedSession {
    fn is_open(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    async fn close(&mut self) -> Option<SessionOutcome> {
        self.cancellation_token.cancel();
        let task = self.task.take()?;
        match task.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(error = %e, "Subscription task failed");
                None
            }
        }
    }
}

/// Keeps the run loop of every opened session and applies the session policy.
///
/// Sessions that had already finished when a later `open` or `shutdown` runs
/// are forgotten, so their slot reads `Idle` again.
pub struct SessionRegistry {
    policy: SessionPolicy,
    sessions: Mutex<HashMap<ProcessId, TrackedSession>>,
}

impl SessionRegistry {
    pub fn new(policy: SessionPolicy) -> Self {
        Self {
            policy,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Open a session for `process_id` and spawn its run loop.
    ///
    /// The registry stays locked from closing the conflicting sessions until
    /// the new one is tracked, so concurrent opens never outgrow the policy.
    pub async fn open<F, Fut, E>(&self, process_id: &ProcessId, open_session: F) -> Result<(), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SubscriptionSession, E>>,
    {
        let mut sessions = self.sessions.lock().await;
        Self::prune(&mut sessions);

        for (id, tracked) in sessions.iter_mut() {
            let conflicting = match self.policy {
                SessionPolicy::Exclusive => true,
                SessionPolicy::Concurrent => id == process_id,
            };
            if conflicting && tracked.is_open() {
                debug!(process_id = %id, "Closing previous subscription");
                tracked.close().await;
            }
        }

        let session = open_session().await?;
        let cancellation_token = CancellationToken::new();
        let task = tokio::spawn(session.run(cancellation_token.clone()));
        sessions.insert(
            process_id.clone(),
            TrackedSession {
                cancellation_token,
                task: Some(task),
            },
        );
        debug!(process_id = %process_id, "Tracking subscription");
        Ok(())
    }

    fn prune(sessions: &mut HashMap<ProcessId, TrackedSession>) {
        sessions.retain(|_, tracked| tracked.is_open());
    }

    pub async fn state(&self, process_id: &ProcessId) -> SessionState {
        match self.sessions.lock().await.get(process_id) {
            None => SessionState::Idle,
            Some(tracked) if tracked.is_open() => SessionState::Open,
            Some(_) => SessionState::Closed,
        }
    }

    /// Close the session of `process_id`; `false` if it was not open
    pub async fn close(&self, process_id: &ProcessId) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(process_id) {
            Some(tracked) if tracked.is_open() => {
                tracked.close().await;
                true
            }
            _ => false,
        }
    }

    pub async fn open_count(&self) -> usize {
        self.sessions
            .lock()
            .await
            .values()
            .filter(|tracked| tracked.is_open())
            .count()
    }

    /// Close every session. Idempotent.
    pub async fn shutdown(&self) {
        let mut sessions = self.sessions.lock().await;
        Self::prune(&mut sessions);
        let closed = sessions.len();
        for tracked in sessions.values_mut() {
            tracked.close().await;
        }
        info!(closed, "Subscriptions shut down");
    }

    #[cfg(test)]
    async fn tracked_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
