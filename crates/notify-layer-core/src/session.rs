use crate::documents::{ON_PROCESS_DONE, SUBSCRIPTION_FILTER_VARIABLE};
use crate::error::TransportError;
use crate::observer::{Notification, Observer};
use crate::process::{NotificationEvent, ProcessId};
use crate::transport::{EventStream, GraphqlRequest, StreamItem, SubscriptionTransport};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Lifecycle of the subscription slot of one process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No subscription was opened
    Idle,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Release the stream when the transport reports an error
    pub dispose_on_error: bool,
}

/// How [`SubscriptionSession::run`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The completion event arrived and was forwarded
    Delivered,
    /// An error was reported and the stream disposed
    Failed,
    /// Closed from outside
    Cancelled,
    /// The transport ended the stream without an event
    Ended,
}

/// One `onProcessDone` subscription: open, forward the first event, close.
///
/// The session is the only owner of its stream; nothing else can
/// unsubscribe it except through [`close`](Self::close) or the token handed
/// to [`run`](Self::run).
pub struct SubscriptionSession {
    process_id: ProcessId,
    stream: EventStream,
    observer: Arc<dyn Observer>,
    options: SessionOptions,
    state: SessionState,
}

impl SubscriptionSession {
    pub async fn open(
        transport: &dyn SubscriptionTransport,
        process_id: ProcessId,
        observer: Arc<dyn Observer>,
        options: SessionOptions,
    ) -> Result<Self, TransportError> {
        let request = GraphqlRequest::new(&ON_PROCESS_DONE)
            .variable(SUBSCRIPTION_FILTER_VARIABLE, process_id.as_str());
        let stream = transport.subscribe(request).await?;

        info!(process_id = %process_id, "Subscription created");
        observer
            .notify(Notification::SubscriptionCreated(process_id.clone()))
            .await;

        Ok(Self {
            process_id,
            stream,
            observer,
            options,
            state: SessionState::Open,
        })
    }

    pub fn process_id(&self) -> &ProcessId {
        &self.process_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Next raw item from the stream; `None` once the session is closed
    pub async fn next(&mut self) -> Option<StreamItem> {
        if !self.is_active() {
            return None;
        }
        self.stream.next().await
    }

    /// Forward `event`, unsubscribe and report the deletion.
    ///
    /// Returns `false` (and notifies nothing) when the session is already closed.
    pub async fn on_event(&mut self, event: NotificationEvent) -> bool {
        if !self.is_active() {
            debug!(process_id = %self.process_id, "Ignoring event for closed subscription");
            return false;
        }
        debug!(process_id = %self.process_id, payload = %event, "Process done event received");
        self.observer.notify(Notification::Event(event)).await;

        self.release();
        info!(process_id = %self.process_id, "Subscription deleted");
        self.observer
            .notify(Notification::SubscriptionDeleted(self.process_id.clone()))
            .await;
        true
    }

    /// Report a transport error. Returns `true` if the session was disposed.
    pub async fn on_error(&mut self, err: TransportError) -> bool {
        if !self.is_active() {
            return false;
        }
        error!(process_id = %self.process_id, error = %err, "Subscription error");
        self.observer.notify(Notification::Error(err.to_string())).await;

        if self.options.dispose_on_error {
            self.release();
            return true;
        }
        false
    }

    /// Release the stream without notifying anyone. Safe to call repeatedly.
    pub fn close(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.release();
        info!(process_id = %self.process_id, "Subscription closed");
        true
    }

    fn release(&mut self) {
        self.stream.close();
        self.state = SessionState::Closed;
    }

    /// Drive the session until its first event, disposal on error,
    /// end of stream or `cancel`.
    pub async fn run(mut self, cancel: CancellationToken) -> SessionOutcome {
        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.close();
                    return SessionOutcome::Cancelled;
                }
                item = self.next() => item,
            };

            match item {
                Some(Ok(event)) => {
                    self.on_event(event).await;
                    return SessionOutcome::Delivered;
                }
                Some(Err(err)) => {
                    if self.on_error(err).await {
                        return SessionOutcome::Failed;
                    }
                }
                None => {
                    debug!(process_id = %self.process_id, "Subscription stream ended");
                    self.close();
                    return SessionOutcome::Ended;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::MessageLog;
    use crate::transport::{EventSender, event_channel};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Hands out streams and keeps the sending halves for the test
    #[derive(Default)]
    struct ManualTransport {
        subscriptions: Mutex<Vec<(GraphqlRequest, EventSender)>>,
    }

    impl ManualTransport {
        fn sender(&self, index: usize) -> EventSender {
            self.subscriptions.lock().unwrap()[index].1.clone()
        }
    }

    #[async_trait]
    impl SubscriptionTransport for ManualTransport {
        async fn subscribe(&self, request: GraphqlRequest) -> Result<EventStream, TransportError> {
            let (tx, stream) = event_channel();
            self.subscriptions.lock().unwrap().push((request, tx));
            Ok(stream)
        }
    }

    struct RefusingTransport;

    #[async_trait]
    impl SubscriptionTransport for RefusingTransport {
        async fn subscribe(&self, _: GraphqlRequest) -> Result<EventStream, TransportError> {
            Err(TransportError::Unauthorized("no token".to_string()))
        }
    }

    async fn open(
        transport: &ManualTransport,
        id: &str,
        options: SessionOptions,
    ) -> (SubscriptionSession, MessageLog) {
        let log = MessageLog::new();
        let session = SubscriptionSession::open(
            transport,
            ProcessId::new(id).unwrap(),
            Arc::new(log.clone()),
            options,
        )
        .await
        .unwrap();
        (session, log)
    }

    fn done() -> NotificationEvent {
        NotificationEvent::new(json!({"status": "done"}))
    }

    #[tokio::test]
    async fn test_open_filters_on_process_id_and_reports_creation() {
        let transport = ManualTransport::default();
        let (session, log) = open(&transport, "proc-1", SessionOptions::default()).await;

        assert!(session.is_active());
        assert_eq!(log.lines().await, vec!["Subscription to proc-1 created"]);
        let request = transport.subscriptions.lock().unwrap()[0].0.clone();
        assert_eq!(request.string_variable("id"), Some("proc-1"));
        assert_eq!(request.operation_name.as_deref(), Some("OnProcessDone"));
    }

    #[tokio::test]
    async fn test_open_failure_notifies_nothing() {
        let log = MessageLog::new();
        let result = SubscriptionSession::open(
            &RefusingTransport,
            ProcessId::new("proc-1").unwrap(),
            Arc::new(log.clone()),
            SessionOptions::default(),
        )
        .await;
        assert!(matches!(result, Err(TransportError::Unauthorized(_))));
        assert!(log.is_empty().await);
    }

    #[tokio::test]
    async fn test_first_event_closes_session() {
        let transport = ManualTransport::default();
        let (mut session, log) = open(&transport, "proc-1", SessionOptions::default()).await;

        assert!(session.on_event(done()).await);
        assert_eq!(session.state(), SessionState::Closed);
        assert!(transport.sender(0).is_closed());
        assert_eq!(
            log.lines().await,
            vec![
                "Subscription to proc-1 created",
                r#"{"status":"done"}"#,
                "Subscription to proc-1 deleted",
            ]
        );

        // a second event on the disposed handle is swallowed
        assert!(!session.on_event(done()).await);
        assert_eq!(log.len().await, 3);
    }

    #[tokio::test]
    async fn test_close_after_event_is_noop() {
        let transport = ManualTransport::default();
        let (mut session, log) = open(&transport, "proc-1", SessionOptions::default()).await;
        session.on_event(done()).await;

        assert!(!session.close());
        assert!(!session.close());
        assert_eq!(log.len().await, 3);
    }

    #[tokio::test]
    async fn test_error_keeps_session_open_by_default() {
        let transport = ManualTransport::default();
        let (mut session, log) = open(&transport, "proc-2", SessionOptions::default()).await;

        let disposed = session
            .on_error(TransportError::Connection("network down".to_string()))
            .await;
        assert!(!disposed);
        assert!(session.is_active());
        assert!(!transport.sender(0).is_closed());

        let lines = log.lines().await;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "Subscription to proc-2 created");
        assert!(lines[1].contains("network down"));

        assert!(session.close());
        assert_eq!(session.state(), SessionState::Closed);
        assert!(transport.sender(0).is_closed());
        assert_eq!(log.len().await, 2);
    }

    #[tokio::test]
    async fn test_error_disposes_when_configured() {
        let transport = ManualTransport::default();
        let options = SessionOptions {
            dispose_on_error: true,
        };
        let (mut session, log) = open(&transport, "proc-2", options).await;

        assert!(session.on_error(TransportError::Closed).await);
        assert_eq!(session.state(), SessionState::Closed);
        assert!(transport.sender(0).is_closed());
        // disposal on error does not claim a deletion
        assert_eq!(log.len().await, 2);
        assert!(!session.on_error(TransportError::Closed).await);
    }

    #[tokio::test]
    async fn test_close_open_session_is_silent() {
        let transport = ManualTransport::default();
        let (mut session, log) = open(&transport, "proc-3", SessionOptions::default()).await;

        assert!(session.close());
        assert!(transport.sender(0).is_closed());
        assert!(session.next().await.is_none());
        assert_eq!(log.lines().await, vec!["Subscription to proc-3 created"]);
    }

    #[tokio::test]
    async fn test_run_delivers_first_event_only() {
        let transport = ManualTransport::default();
        let (session, log) = open(&transport, "proc-1", SessionOptions::default()).await;
        let tx = transport.sender(0);
        tx.send(done()).unwrap();
        let _ = tx.send(NotificationEvent::new(json!({"status": "again"})));

        let outcome = session.run(CancellationToken::new()).await;
        assert_eq!(outcome, SessionOutcome::Delivered);
        assert!(tx.is_closed());
        assert_eq!(log.len().await, 3);
    }

    #[tokio::test]
    async fn test_run_reports_errors_then_delivers() {
        let transport = ManualTransport::default();
        let (session, log) = open(&transport, "proc-2", SessionOptions::default()).await;
        let tx = transport.sender(0);
        tx.fail(TransportError::Connection("network down".into()))
            .unwrap();
        tx.send(done()).unwrap();

        assert_eq!(
            session.run(CancellationToken::new()).await,
            SessionOutcome::Delivered
        );
        let lines = log.lines().await;
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("Error: "));
        assert_eq!(lines[3], "Subscription to proc-2 deleted");
    }

    #[tokio::test]
    async fn test_run_with_dispose_on_error_stops() {
        let transport = ManualTransport::default();
        let options = SessionOptions {
            dispose_on_error: true,
        };
        let (session, _log) = open(&transport, "proc-2", options).await;
        let tx = transport.sender(0);
        tx.fail(TransportError::Timeout("slow".into())).unwrap();

        assert_eq!(
            session.run(CancellationToken::new()).await,
            SessionOutcome::Failed
        );
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_run_cancelled_releases_handle_silently() {
        let transport = ManualTransport::default();
        let (session, log) = open(&transport, "proc-4", SessionOptions::default()).await;
        let cancel = CancellationToken::new();

        let task = tokio::spawn(session.run(cancel.clone()));
        cancel.cancel();
        assert_eq!(task.await.unwrap(), SessionOutcome::Cancelled);
        assert!(transport.sender(0).is_closed());
        assert_eq!(log.len().await, 1);
    }

    #[tokio::test]
    async fn test_run_ends_when_transport_drops_stream() {
        let transport = ManualTransport::default();
        let (session, log) = open(&transport, "proc-5", SessionOptions::default()).await;
        transport.subscriptions.lock().unwrap().clear();

        assert_eq!(
            session.run(CancellationToken::new()).await,
            SessionOutcome::Ended
        );
        assert_eq!(log.len().await, 1);
    }
}
