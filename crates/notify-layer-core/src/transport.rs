use crate::documents::Document;
use crate::error::{GraphqlError, TransportError};
use crate::process::NotificationEvent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Authorization used for a request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthMode {
    ApiKey,
    /// User pool token plus usage plan header
    #[default]
    Cognito,
    /// Custom authorizer token, `user_id=<username>`
    Lambda,
}

/// A GraphQL operation plus everything needed to authorize it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphqlRequest {
    pub query: String,
    #[serde(rename = "operationName", skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    pub variables: Map<String, Value>,
    #[serde(skip)]
    pub auth_mode: AuthMode,
    #[serde(skip)]
    pub auth_token: Option<String>,
    #[serde(skip)]
    pub headers: BTreeMap<String, String>,
}

impl GraphqlRequest {
    pub fn new(document: &Document) -> Self {
        Self {
            query: document.query.to_string(),
            operation_name: Some(document.operation_name.to_string()),
            variables: Map::new(),
            auth_mode: AuthMode::default(),
            auth_token: None,
            headers: BTreeMap::new(),
        }
    }

    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn auth_mode(mut self, mode: AuthMode) -> Self {
        self.auth_mode = mode;
        self
    }

    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// String value of a variable, if present
    pub fn string_variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).and_then(Value::as_str)
    }
}

/// Body of a GraphQL response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphqlResponse {
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphqlError>,
}

impl GraphqlResponse {
    pub fn data(data: Value) -> Self {
        Self {
            data,
            errors: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            data: Value::Null,
            errors: vec![GraphqlError {
                message: message.into(),
                error_type: None,
            }],
        }
    }

    /// `data`, or the reported errors
    pub fn into_data(self) -> Result<Value, TransportError> {
        if self.errors.is_empty() {
            Ok(self.data)
        } else {
            Err(TransportError::GraphQl(self.errors))
        }
    }
}

#[async_trait]
pub trait MutationTransport: Send + Sync {
    async fn mutate(&self, request: GraphqlRequest) -> Result<GraphqlResponse, TransportError>;
}

#[async_trait]
pub trait SubscriptionTransport: Send + Sync {
    /// Open a push stream for `request`; dropping or closing the returned
    /// stream unsubscribes.
    async fn subscribe(&self, request: GraphqlRequest) -> Result<EventStream, TransportError>;
}

pub type StreamItem = Result<NotificationEvent, TransportError>;

/// Create a connected sender/stream pair
pub fn event_channel() -> (EventSender, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    let token = CancellationToken::new();
    (
        EventSender {
            tx,
            token: token.clone(),
        },
        EventStream { rx, token },
    )
}

/// Transport side of a subscription
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<StreamItem>,
    token: CancellationToken,
}

impl EventSender {
    pub fn send(&self, event: NotificationEvent) -> Result<(), TransportError> {
        self.push(Ok(event))
    }

    pub fn fail(&self, error: TransportError) -> Result<(), TransportError> {
        self.push(Err(error))
    }

    fn push(&self, item: StreamItem) -> Result<(), TransportError> {
        if self.token.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.tx.send(item).map_err(|_| TransportError::Closed)
    }

    /// True once the consumer unsubscribed
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled() || self.tx.is_closed()
    }

    pub async fn closed(&self) {
        self.token.cancelled().await
    }
}

/// Consumer side of a subscription. Single consumer, cancellable.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<StreamItem>,
    token: CancellationToken,
}

impl EventStream {
    /// Next item in transport order, `None` once closed or ended by the transport
    pub async fn next(&mut self) -> Option<StreamItem> {
        if self.token.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            item = self.rx.recv() => item,
        }
    }

    /// Unsubscribe. Returns `false` if the stream was already closed.
    pub fn close(&mut self) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        self.token.cancel();
        self.rx.close();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token that unsubscribes this stream when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
