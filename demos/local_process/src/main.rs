use notify_layer::{
    AuthMode, ClientConfig, Credentials, InMemoryAuthProvider, LocalBackend, NotifyLayer,
    ProcessId, SessionState, WriterObserver, init_tracing,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const CONFIG: &str = r#"{
    "endpoint": "https://local.invalid/graphql",
    "defaultAuthMode": "lambda",
    "sessionPolicy": "exclusive"
}"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(false);

    // Process id from the first argument, like the text field of the page
    let process_id = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "demo-process".to_string());

    let config = ClientConfig::from_json(CONFIG)?;
    let auth = Arc::new(InMemoryAuthProvider::new().with_account(
        "demo",
        "demo-password",
        [("custom:usage_plan", "basic")],
    ));
    // Finishes every started process after two seconds
    let backend = LocalBackend::with_completion_delay(Duration::from_secs(2));
    let layer = NotifyLayer::local(config, auth, backend, Arc::new(WriterObserver::stdout()))?;

    layer
        .sign_in(&Credentials::new("demo", "demo-password"))
        .await?;
    layer.start_process(&process_id, AuthMode::Lambda).await?;

    let id = ProcessId::new(process_id)?;
    let waited = tokio::time::timeout(Duration::from_secs(10), async {
        while layer.session_state(&id).await == SessionState::Open {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    if waited.is_err() {
        warn!(process_id = %id, "Process did not finish in time");
    }

    layer.shutdown().await;
    layer.sign_out().await?;
    Ok(())
}
