use crate::http::HttpTransport;
use crate::report::Report;
use crate::sessions::SessionRegistry;
use backon::{ExponentialBuilder, Retryable};
use notify_layer_core::documents::{PROCESS_ID_VARIABLE, START_PROCESS, START_PROCESS_LAMBDA};
use notify_layer_core::{
    AuthMode, AuthProvider, ClientConfig, Credentials, GraphqlRequest, LocalBackend,
    MutationTransport, Notification, NotifyError, Observer, ProcessId, RetryConfig,
    SessionOptions, SessionState, SubscriptionSession, SubscriptionTransport, User,
};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Application state behind the UI: who is signed in, how requests travel,
/// where status lines go and which subscriptions are open.
///
/// Built once and shared by every handler.
pub struct NotifyLayer {
    config: ClientConfig,
    auth: Arc<dyn AuthProvider>,
    transport: Arc<dyn MutationTransport>,
    subscriptions: Option<Arc<dyn SubscriptionTransport>>,
    observer: Arc<dyn Observer>,
    sessions: SessionRegistry,
    retry_strategy: ExponentialBuilder,
}

impl NotifyLayer {
    pub fn new(
        config: ClientConfig,
        auth: Arc<dyn AuthProvider>,
        transport: Arc<dyn MutationTransport>,
        observer: Arc<dyn Observer>,
    ) -> Result<Self, NotifyError> {
        config.retry_config.validate()?;

        Ok(Self {
            retry_strategy: Self::create_retry_strategy(&config.retry_config),
            sessions: SessionRegistry::new(config.session_policy),
            config,
            auth,
            transport,
            subscriptions: None,
            observer,
        })
    }

    /// Layer sending requests to `config.endpoint` over HTTPS
    pub fn http(
        config: ClientConfig,
        auth: Arc<dyn AuthProvider>,
        observer: Arc<dyn Observer>,
    ) -> Result<Self, NotifyError> {
        let transport = HttpTransport::new(&config)?;
        Self::new(config, auth, Arc::new(transport), observer)
    }

    /// Layer wired to an in-process backend for both mutations and subscriptions
    pub fn local(
        config: ClientConfig,
        auth: Arc<dyn AuthProvider>,
        backend: LocalBackend,
        observer: Arc<dyn Observer>,
    ) -> Result<Self, NotifyError> {
        let backend = Arc::new(backend);
        Ok(Self::new(config, auth, backend.clone(), observer)?.with_subscriptions(backend))
    }

    pub fn with_subscriptions(mut self, transport: Arc<dyn SubscriptionTransport>) -> Self {
        self.subscriptions = Some(transport);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn create_retry_strategy(retry_config: &RetryConfig) -> ExponentialBuilder {
        let mut retry_builder = ExponentialBuilder::default()
            .with_min_delay(retry_config.min_delay())
            .with_max_delay(retry_config.max_delay())
            .with_max_times(retry_config.retries());

        if retry_config.jitter {
            retry_builder = retry_builder.with_jitter();
        }

        retry_builder
    }

    /// Run `operation`, retrying while the error is retryable and attempts remain
    async fn attempt_with_retry<T, F, Fut>(&self, operation: F) -> Result<T, NotifyError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, NotifyError>>,
    {
        operation
            .retry(self.retry_strategy)
            .when(|e: &NotifyError| e.is_retryable())
            .notify(|e: &NotifyError, delay: Duration| {
                warn!(error = %e, ?delay, "Request failed, retrying");
            })
            .await
    }

    pub async fn sign_in(&self, credentials: &Credentials) -> Result<User, NotifyError> {
        let observer = self.observer.as_ref();
        self.auth
            .sign_in(credentials)
            .await
            .report(observer, "Error signing in")
            .await?;
        info!(username = %credentials.username, "User signed in");

        let user = self
            .auth
            .current_user()
            .await
            .report(observer, "Error signing in")
            .await?;
        let attributes = self
            .auth
            .fetch_user_attributes(&user)
            .await
            .report(observer, "Error signing in")
            .await?;
        debug!(username = %user.username, ?attributes, "Fetched user attributes");
        Ok(user)
    }

    pub async fn sign_out(&self) -> Result<(), NotifyError> {
        self.auth
            .sign_out()
            .await
            .report(self.observer.as_ref(), "Error signing out")
            .await?;
        info!("User signed out");
        Ok(())
    }

    /// Start `process_id` with the configured default authorization
    pub async fn start(&self, process_id: &str) -> Result<Value, NotifyError> {
        self.start_process(process_id, self.config.default_auth_mode)
            .await
    }

    /// Dispatch the start mutation and, if configured, subscribe to its completion.
    ///
    /// Returns the `data` of the mutation response.
    pub async fn start_process(&self, process_id: &str, mode: AuthMode) -> Result<Value, NotifyError> {
        info!(process_id, ?mode, "Starting process");
        let context = format!("Error starting process {process_id}");
        let (id, data) = self
            .dispatch_start(process_id, mode)
            .await
            .report(self.observer.as_ref(), &context)
            .await?;

        info!(process_id = %id, "Process started");
        self.observer
            .notify(Notification::ProcessStarted(id.clone()))
            .await;
        self.observer
            .notify(Notification::MutationResult(data.clone()))
            .await;

        if self.config.subscribe_on_start && self.subscriptions.is_some() {
            self.subscribe(id).await?;
        }
        Ok(data)
    }

    async fn dispatch_start(
        &self,
        process_id: &str,
        mode: AuthMode,
    ) -> Result<(ProcessId, Value), NotifyError> {
        let id = ProcessId::new(process_id)?;
        let request = self.start_request(&id, mode).await?;
        let data = self
            .attempt_with_retry(|| async {
                let response = self.transport.mutate(request.clone()).await?;
                Ok::<_, NotifyError>(response.into_data()?)
            })
            .await?;
        Ok((id, data))
    }

    async fn start_request(
        &self,
        id: &ProcessId,
        mode: AuthMode,
    ) -> Result<GraphqlRequest, NotifyError> {
        match mode {
            AuthMode::ApiKey => Ok(GraphqlRequest::new(&START_PROCESS)
                .variable(PROCESS_ID_VARIABLE, id.as_str())
                .auth_mode(AuthMode::ApiKey)),
            AuthMode::Cognito => {
                let user = self.auth.current_user().await?;
                let mut request = GraphqlRequest::new(&START_PROCESS)
                    .variable(PROCESS_ID_VARIABLE, id.as_str())
                    .auth_mode(AuthMode::Cognito);
                if let Some(token) = user.id_token.clone() {
                    request = request.auth_token(token);
                }
                self.with_usage_plan(request, &user).await
            }
            AuthMode::Lambda => {
                let user = self.auth.current_user().await?;
                let request = GraphqlRequest::new(&START_PROCESS_LAMBDA)
                    .variable(PROCESS_ID_VARIABLE, id.as_str())
                    .auth_mode(AuthMode::Lambda)
                    .auth_token(format!("user_id={}", user.username));
                self.with_usage_plan(request, &user).await
            }
        }
    }

    /// Attach the signed-in user's usage plan header
    async fn with_usage_plan(
        &self,
        request: GraphqlRequest,
        user: &User,
    ) -> Result<GraphqlRequest, NotifyError> {
        let attributes = self.auth.fetch_user_attributes(user).await?;
        match attributes.get(&self.config.usage_plan_attribute) {
            Some(plan) => Ok(request.header(self.config.usage_plan_header.clone(), plan.clone())),
            None => {
                warn!(
                    username = %user.username,
                    attribute = %self.config.usage_plan_attribute,
                    "User has no usage plan"
                );
                Ok(request)
            }
        }
    }

    /// Open a subscription for `process_id` and hand it to its run loop
    pub async fn subscribe(&self, process_id: ProcessId) -> Result<(), NotifyError> {
        let context = format!("Error subscribing to {process_id}");
        let transport = self
            .subscriptions
            .clone()
            .ok_or(NotifyError::SubscriptionsUnavailable)
            .report(self.observer.as_ref(), &context)
            .await?;

        let options = SessionOptions {
            dispose_on_error: self.config.dispose_on_error,
        };
        self.sessions
            .open(&process_id, || async {
                SubscriptionSession::open(
                    transport.as_ref(),
                    process_id.clone(),
                    self.observer.clone(),
                    options,
                )
                .await
                .report(self.observer.as_ref(), &context)
                .await
            })
            .await
    }

    pub async fn session_state(&self, process_id: &ProcessId) -> SessionState {
        self.sessions.state(process_id).await
    }

    pub async fn open_sessions(&self) -> usize {
        self.sessions.open_count().await
    }

    /// Close the subscription of `process_id` without notifying
    pub async fn close_session(&self, process_id: &ProcessId) -> bool {
        self.sessions.close(process_id).await
    }

    /// Teardown: close every subscription. Safe to call more than once.
    pub async fn shutdown(&self) {
        info!("Shutting down notify layer");
        self.sessions.shutdown().await;
    }
}
