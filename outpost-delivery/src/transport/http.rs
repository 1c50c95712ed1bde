use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use outpost_common::{Transport, TransportError, TransportFactory, incoming, outgoing};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

const REGION_PLACEHOLDER: &str = "{region}";

const fn default_timeout() -> u64 {
    30
}

const fn default_verify_on_connect() -> bool {
    true
}

fn default_endpoint() -> String {
    "http://localhost:8025".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Where and how to reach the HTTP mail relay
///
/// ```ron
/// transport: (
///     endpoint: "https://relay.{region}.example.com",
///     region: "eu-west-1",
///     timeout_secs: 30,
///     api_token: Some("..."),
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct HttpTransportConfig {
    /// Base URL of the relay; `{region}` is replaced by [`Self::region`]
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Delivery region substituted into the endpoint
    ///
    /// Default: `us-east-1`
    #[serde(default = "default_region")]
    pub region: String,

    /// Per-request timeout (in seconds)
    ///
    /// Default: 30 seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Sent as a bearer token with every request
    #[serde(default)]
    pub api_token: Option<String>,

    /// Probe the relay when connecting, so an unreachable relay aborts the
    /// cycle before any message is touched
    ///
    /// Default: `true`
    #[serde(default = "default_verify_on_connect")]
    pub verify_on_connect: bool,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            region: default_region(),
            timeout_secs: default_timeout(),
            api_token: None,
            verify_on_connect: default_verify_on_connect(),
        }
    }
}

impl HttpTransportConfig {
    /// The endpoint with the region filled in
    ///
    /// # Errors
    /// [`TransportError::Malformed`] if the result is not a valid URL.
    pub fn base_url(&self) -> Result<Url, TransportError> {
        let endpoint = self.endpoint.replace(REGION_PLACEHOLDER, &self.region);
        Url::parse(endpoint.trim_end_matches('/'))
            .map_err(|e| TransportError::Malformed(format!("Invalid relay endpoint {endpoint}: {e}")))
    }

    fn send_url(&self) -> Result<Url, TransportError> {
        let base = self.base_url()?;
        let path = format!("{}/v1/send", base.path().trim_end_matches('/'));
        let mut url = base;
        url.set_path(&path);
        Ok(url)
    }
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a [String],
    raw: String,
}

/// Map a relay response status onto the failure taxonomy
///
/// # Errors
/// - [`TransportError::Permanent`] for 4xx other than 408 and 429
/// - [`TransportError::Transient`] for 408, 429, 5xx and anything unexpected
pub fn classify_status(status: StatusCode, detail: &str) -> Result<(), TransportError> {
    let reason = if detail.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {detail}")
    };

    if status.is_success() {
        Ok(())
    } else if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::TOO_MANY_REQUESTS {
        Err(TransportError::Transient(reason))
    } else if status.is_client_error() {
        Err(TransportError::Permanent(reason))
    } else {
        Err(TransportError::Transient(reason))
    }
}

fn classify_request_error(err: &reqwest::Error) -> TransportError {
    if err.is_connect() {
        TransportError::Unreachable(err.to_string())
    } else {
        TransportError::Transient(err.to_string())
    }
}

/// Reject envelopes and payloads the relay could never accept
fn validate(from: &str, to: &[String], message: &[u8]) -> Result<(), TransportError> {
    if from.trim().is_empty() {
        return Err(TransportError::Malformed("Empty sender".to_string()));
    }

    if to.is_empty() || to.iter().any(|rcpt| rcpt.trim().is_empty()) {
        return Err(TransportError::Malformed("Missing recipients".to_string()));
    }

    match mailparse::parse_headers(message) {
        Ok((headers, _)) if !headers.is_empty() => Ok(()),
        Ok(_) => Err(TransportError::Malformed(
            "Message has no header block".to_string(),
        )),
        Err(e) => Err(TransportError::Malformed(format!(
            "Message headers do not parse: {e}"
        ))),
    }
}

/// Delivers messages by posting them to an HTTP mail relay
///
/// The HTTP client is created on [`Transport::connect`] (or on first send)
/// and dropped on [`Transport::close`].
#[derive(Debug)]
pub struct HttpTransport {
    config: Arc<HttpTransportConfig>,
    client: Option<reqwest::Client>,
}

impl HttpTransport {
    pub const fn new(config: Arc<HttpTransportConfig>) -> Self {
        Self {
            config,
            client: None,
        }
    }

    pub const fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    fn client(&mut self) -> Result<reqwest::Client, TransportError> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()
            .map_err(|e| TransportError::Unreachable(format!("HTTP client error: {e}")))?;
        self.client = Some(client.clone());
        Ok(client)
    }

    fn authorise(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let base = self.config.base_url()?;
        let client = self.client()?;

        if self.config.verify_on_connect {
            outgoing!(level = DEBUG, "Probing relay at {base}");
            let response = self
                .authorise(client.get(base.clone()))
                .send()
                .await
                .map_err(|e| TransportError::Unreachable(format!("{base}: {e}")))?;
            incoming!(level = DEBUG, "Relay answered probe with {}", response.status());
        }

        Ok(())
    }

    async fn send(
        &mut self,
        from: &str,
        to: &[String],
        message: &[u8],
    ) -> Result<(), TransportError> {
        validate(from, to, message)?;

        let url = self.config.send_url()?;
        let client = self.client()?;
        let body = SendRequest {
            from,
            to,
            raw: STANDARD.encode(message),
        };

        outgoing!(
            level = DEBUG,
            from,
            recipients = to.len(),
            bytes = message.len(),
            "Posting message to {url}"
        );

        let response = self
            .authorise(client.post(url))
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_request_error(&e))?;

        let status = response.status();
        let detail = if status.is_success() {
            String::new()
        } else {
            response.text().await.unwrap_or_default()
        };

        incoming!(level = DEBUG, "Relay responded with {status}");
        classify_status(status, detail.trim())
    }

    async fn close(&mut self) {
        if self.client.take().is_some() {
            debug!("Closed relay connection");
        }
    }
}

/// Creates an [`HttpTransport`] per cycle from a shared configuration
#[derive(Debug, Clone)]
pub struct HttpTransportFactory {
    config: Arc<HttpTransportConfig>,
}

impl HttpTransportFactory {
    pub fn new(config: HttpTransportConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Same relay, different delivery region
    #[must_use]
    pub fn with_region(self, region: impl Into<String>) -> Self {
        let mut config = Arc::unwrap_or_clone(self.config);
        config.region = region.into();
        Self::new(config)
    }

    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }
}

impl TransportFactory for HttpTransportFactory {
    fn create(&self) -> Result<Box<dyn Transport>, TransportError> {
        self.config.base_url()?;
        Ok(Box::new(HttpTransport::new(Arc::clone(&self.config))))
    }
}
