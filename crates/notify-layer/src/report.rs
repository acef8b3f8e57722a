use async_trait::async_trait;
use notify_layer_core::{Notification, NotifyError, Observer};
use tracing::error;

/// Error boundary of the layer: log the failure, show it to the user, hand it back.
#[async_trait]
pub trait Report<T>: Send + Sized {
    async fn report(self, observer: &dyn Observer, context: &str) -> Result<T, NotifyError>;
}

#[async_trait]
impl<T: Send, E: Into<NotifyError> + Send> Report<T> for Result<T, E> {
    async fn report(self, observer: &dyn Observer, context: &str) -> Result<T, NotifyError> {
        match self {
            Ok(value) => Ok(value),
            Err(e) => {
                let e = e.into();
                error!(error = %e, "{context}");
                observer
                    .notify(Notification::Error(format!("{context} - {e}")))
                    .await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify_layer_core::{AuthError, MessageLog};

    #[tokio::test]
    async fn test_ok_passes_through_silently() {
        let log = MessageLog::new();
        let value = Ok::<_, AuthError>(7).report(&log, "unused").await.unwrap();
        assert_eq!(value, 7);
        assert!(log.is_empty().await);
    }

    #[tokio::test]
    async fn test_error_is_converted_and_shown() {
        let log = MessageLog::new();
        let result = Err::<(), _>(AuthError::NotSignedIn)
            .report(&log, "Error signing out")
            .await;
        assert!(matches!(result, Err(NotifyError::Auth(AuthError::NotSignedIn))));
        assert_eq!(
            log.lines().await,
            vec!["Error: Error signing out - Authentication failed: No user is signed in"]
        );
    }
}
