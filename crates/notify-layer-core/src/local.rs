//! In-process stand-in for the process API.
//!
//! Resolves the process mutations the way the deployed resolvers do and fans
//! `onProcessDone` payloads out to matching subscribers. Used by the demo and
//! by tests that need a transport without a network.

use crate::documents::{
    END_PROCESS, GET_PROCESS, ON_PROCESS_DONE, PROCESS_ID_VARIABLE, START_PROCESS,
    START_PROCESS_LAMBDA, SUBSCRIPTION_FILTER_VARIABLE,
};
use crate::error::TransportError;
use crate::process::{NotificationEvent, ProcessId, ProcessRecord, ProcessStatus};
use crate::transport::{
    AuthMode, EventSender, EventStream, GraphqlRequest, GraphqlResponse, MutationTransport,
    SubscriptionTransport, event_channel,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const LAMBDA_TOKEN_PREFIX: &str = "user_id=";

struct Subscriber {
    process_id: String,
    sender: EventSender,
}

#[derive(Default)]
struct Inner {
    subscribers: Mutex<Vec<Subscriber>>,
    requests: Mutex<Vec<GraphqlRequest>>,
}

#[derive(Clone, Default)]
pub struct LocalBackend {
    inner: Arc<Inner>,
    completion_delay: Option<Duration>,
}

impl LocalBackend {
    /// Backend whose processes only finish through `endProcess` or [`publish`](Self::publish)
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that completes every started process after `delay`
    pub fn with_completion_delay(delay: Duration) -> Self {
        Self {
            inner: Arc::default(),
            completion_delay: Some(delay),
        }
    }

    /// Push `payload` to every open subscriber of `process_id`; returns how many got it
    pub async fn publish(&self, process_id: &str, payload: Value) -> usize {
        let event = NotificationEvent::new(payload);
        self.broadcast(process_id, |sender| sender.send(event.clone()))
            .await
    }

    /// Push a transport error to every open subscriber of `process_id`
    pub async fn fail_subscribers(&self, process_id: &str, error: TransportError) -> usize {
        self.broadcast(process_id, |sender| sender.fail(error.clone()))
            .await
    }

    async fn broadcast<F>(&self, process_id: &str, deliver: F) -> usize
    where
        F: Fn(&EventSender) -> Result<(), TransportError>,
    {
        let mut subscribers = self.inner.subscribers.lock().await;
        subscribers.retain(|s| !s.sender.is_closed());
        let delivered = subscribers
            .iter()
            .filter(|s| s.process_id == process_id)
            .filter(|s| deliver(&s.sender).is_ok())
            .count();
        debug!(process_id, delivered, "Published to subscribers");
        delivered
    }

    /// Open subscriptions for `process_id`
    pub async fn subscriber_count(&self, process_id: &str) -> usize {
        self.inner
            .subscribers
            .lock()
            .await
            .iter()
            .filter(|s| s.process_id == process_id && !s.sender.is_closed())
            .count()
    }

    /// Every mutation received so far
    pub async fn requests(&self) -> Vec<GraphqlRequest> {
        self.inner.requests.lock().await.clone()
    }

    fn done_payload(id: &ProcessId) -> Value {
        json!({ "onProcessDone": ProcessRecord::new(id.clone(), ProcessStatus::Done) })
    }

    fn schedule_completion(&self, id: ProcessId) {
        let Some(delay) = self.completion_delay else {
            return;
        };
        let backend = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            info!(process_id = %id, "Process finished");
            backend
                .publish(id.as_str(), Self::done_payload(&id))
                .await;
        });
    }

    fn authorize(request: &GraphqlRequest) -> Result<(), TransportError> {
        if request.auth_mode != AuthMode::Lambda {
            return Ok(());
        }
        match request.auth_token.as_deref() {
            Some(token) if token.starts_with(LAMBDA_TOKEN_PREFIX) => Ok(()),
            _ => Err(TransportError::Unauthorized(
                "missing or malformed lambda authorization token".to_string(),
            )),
        }
    }

    async fn resolve(&self, request: &GraphqlRequest) -> GraphqlResponse {
        let operation = request.operation_name.as_deref().unwrap_or_default();
        let id = match request
            .string_variable(PROCESS_ID_VARIABLE)
            .map(ProcessId::new)
        {
            Some(Ok(id)) => id,
            _ => return GraphqlResponse::error("process_id is required"),
        };

        if operation == START_PROCESS.operation_name
            || operation == START_PROCESS_LAMBDA.operation_name
        {
            info!(process_id = %id, operation, "Process started");
            self.schedule_completion(id.clone());
            let field = if operation == START_PROCESS.operation_name {
                "startProcess"
            } else {
                "startProcessLambda"
            };
            GraphqlResponse::data(json!({ field: ProcessRecord::new(id, ProcessStatus::Pending) }))
        } else if operation == END_PROCESS.operation_name {
            self.publish(id.as_str(), Self::done_payload(&id)).await;
            GraphqlResponse::data(json!({ "endProcess": ProcessRecord::new(id, ProcessStatus::Done) }))
        } else if operation == GET_PROCESS.operation_name {
            GraphqlResponse::data(
                json!({ "getProcess": ProcessRecord::new(id, ProcessStatus::Completed) }),
            )
        } else {
            warn!(operation, "Unknown operation");
            GraphqlResponse::error(format!("Unknown operation: {operation}"))
        }
    }
}

#[async_trait]
impl MutationTransport for LocalBackend {
    async fn mutate(&self, request: GraphqlRequest) -> Result<GraphqlResponse, TransportError> {
        self.inner.requests.lock().await.push(request.clone());
        Self::authorize(&request)?;
        Ok(self.resolve(&request).await)
    }
}

#[async_trait]
impl SubscriptionTransport for LocalBackend {
    async fn subscribe(&self, request: GraphqlRequest) -> Result<EventStream, TransportError> {
        Self::authorize(&request)?;
        if request.operation_name.as_deref() != Some(ON_PROCESS_DONE.operation_name) {
            return Err(TransportError::GraphQl(
                GraphqlResponse::error("Unknown subscription").errors,
            ));
        }
        let process_id = request
            .string_variable(SUBSCRIPTION_FILTER_VARIABLE)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                TransportError::GraphQl(GraphqlResponse::error("id is required").errors)
            })?
            .to_string();

        let (sender, stream) = event_channel();
        debug!(process_id = %process_id, "Subscriber registered");
        self.inner.subscribers.lock().await.push(Subscriber {
            process_id,
            sender,
        });
        Ok(stream)
    }
}
