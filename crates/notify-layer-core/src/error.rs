use thiserror::Error;

/// Failures raised by an [`AuthProvider`](crate::AuthProvider)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    #[error("Incorrect username or password")]
    InvalidCredentials,

    #[error("User does not exist: {0}")]
    UserNotFound(String),

    #[error("No user is signed in")]
    NotSignedIn,

    #[error("Auth provider error: {0}")]
    Provider(String),
}

/// A single entry of the `errors` array of a GraphQL response
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GraphqlError {
    pub message: String,
    #[serde(default, rename = "errorType", skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

/// Failures raised while dispatching a mutation or holding a subscription
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("GraphQL errors: {}", join_messages(.0))]
    GraphQl(Vec<GraphqlError>),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Malformed payload: {0}")]
    Serialization(String),

    #[error("Subscription stream closed")]
    Closed,
}

fn join_messages(errors: &[GraphqlError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

impl TransportError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Connection(_) | TransportError::Timeout(_) => true,
            TransportError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(value: serde_json::Error) -> Self {
        TransportError::Serialization(value.to_string())
    }
}

/// Top level error type of the notify layer
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid process id: {0:?}")]
    InvalidProcessId(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No subscription transport configured")]
    SubscriptionsUnavailable,

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl NotifyError {
    pub fn configuration(message: impl Into<String>) -> Self {
        NotifyError::Configuration(message.into())
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, NotifyError::Transport(e) if e.is_retryable())
    }

    /// Check if this error indicates a permanent failure
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            NotifyError::Configuration(_)
                | NotifyError::InvalidProcessId(_)
                | NotifyError::SubscriptionsUnavailable
                | NotifyError::Auth(AuthError::InvalidCredentials)
                | NotifyError::Transport(TransportError::Unauthorized(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = NotifyError::InvalidProcessId(String::new());
        assert_eq!(format!("{error}"), "Invalid process id: \"\"");

        let error = NotifyError::from(TransportError::Connection("refused".to_string()));
        let display = format!("{error}");
        assert!(display.contains("Transport error"));
        assert!(display.contains("refused"));
    }

    #[test]
    fn test_graphql_error_display_joins_messages() {
        let error = TransportError::GraphQl(vec![
            GraphqlError {
                message: "process_id is required".to_string(),
                error_type: None,
            },
            GraphqlError {
                message: "second".to_string(),
                error_type: Some("Lambda:Unhandled".to_string()),
            },
        ]);
        assert_eq!(
            error.to_string(),
            "GraphQL errors: process_id is required; second"
        );
    }

    #[test]
    fn test_error_categorization() {
        // Retryable errors
        assert!(TransportError::Connection("x".into()).is_retryable());
        assert!(TransportError::Timeout("x".into()).is_retryable());
        assert!(
            TransportError::Status {
                status: 503,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(NotifyError::from(TransportError::Timeout("x".into())).is_retryable());

        // Non-retryable errors
        assert!(
            !TransportError::Status {
                status: 400,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(!TransportError::Closed.is_retryable());
        assert!(!NotifyError::from(AuthError::NotSignedIn).is_retryable());
        assert!(!NotifyError::configuration("bad").is_retryable());
    }

    #[test]
    fn test_permanent_errors() {
        assert!(NotifyError::configuration("bad").is_permanent());
        assert!(NotifyError::from(AuthError::InvalidCredentials).is_permanent());
        assert!(!NotifyError::from(TransportError::Closed).is_permanent());
    }
}
