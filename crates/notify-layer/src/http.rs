use async_trait::async_trait;
use notify_layer_core::{
    AuthMode, ClientConfig, GraphqlRequest, GraphqlResponse, MutationTransport, NotifyError,
    TransportError,
};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, info, warn};

const API_KEY_HEADER: &str = "x-api-key";

/// Sends GraphQL mutations and queries over HTTPS
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: reqwest::Url,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, NotifyError> {
        let endpoint = reqwest::Url::parse(&config.endpoint).map_err(|e| {
            NotifyError::configuration(format!("Invalid endpoint {}: {e}", config.endpoint))
        })?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| NotifyError::configuration(format!("Failed to build HTTP client: {e}")))?;

        info!(endpoint = %endpoint, "Creating HTTP transport");
        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
        })
    }

    fn headers(&self, request: &GraphqlRequest) -> Result<HeaderMap, TransportError> {
        let mut headers = HeaderMap::new();

        match request.auth_mode {
            AuthMode::ApiKey => {
                let key = self.api_key.as_deref().ok_or_else(|| {
                    TransportError::Unauthorized("no API key configured".to_string())
                })?;
                headers.insert(API_KEY_HEADER, header_value(API_KEY_HEADER, key)?);
            }
            AuthMode::Cognito | AuthMode::Lambda => {
                let token = request.auth_token.as_deref().ok_or_else(|| {
                    TransportError::Unauthorized(format!(
                        "{:?} authorization needs a token",
                        request.auth_mode
                    ))
                })?;
                headers.insert(AUTHORIZATION, header_value("authorization", token)?);
            }
        }

        for (name, value) in &request.headers {
            let header = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                TransportError::Serialization(format!("invalid header name {name:?}"))
            })?;
            headers.insert(header, header_value(name, value)?);
        }
        Ok(headers)
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value)
        .map_err(|_| TransportError::Serialization(format!("invalid value for header {name}")))
}

fn transport_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_decode() {
        TransportError::Serialization(e.to_string())
    } else {
        TransportError::Connection(e.to_string())
    }
}

#[async_trait]
impl MutationTransport for HttpTransport {
    async fn mutate(&self, request: GraphqlRequest) -> Result<GraphqlResponse, TransportError> {
        let headers = self.headers(&request)?;
        debug!(
            operation = request.operation_name.as_deref().unwrap_or("anonymous"),
            "Sending GraphQL request"
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(headers)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "GraphQL endpoint rejected request");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<GraphqlResponse>()
            .await
            .map_err(transport_error)
    }
}
