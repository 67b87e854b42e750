//! `http_request`: fire an HTTP request and ignore the response body.
//!
//! All requests share the context's `reqwest::Client`, which carries the
//! configured timeout; there is no other cancellation.

use async_trait::async_trait;
use keyhook_core::KeyEvent;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Url};
use tracing::{debug, warn};

use crate::application::action_registry::{
    Action, ActionContext, ActionError, ActionOutcome, ActionType, FieldSpec,
};

const SUPPORTED_METHODS: [&str; 6] = ["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD"];

/// Sends one HTTP request per trigger.
pub struct HttpRequestAction {
    pub url: String,
    pub method: String,
    /// Sent for every method except GET and HEAD.
    pub body: String,
    pub content_type: String,
    client: reqwest::Client,
}

static FIELDS: [FieldSpec<HttpRequestAction>; 4] = [
    FieldSpec::text("url", |a, v| a.url = v),
    FieldSpec::text("method", |a, v| a.method = v),
    FieldSpec::text("body", |a, v| a.body = v),
    FieldSpec::text("content_type", |a, v| a.content_type = v),
];

impl HttpRequestAction {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            body: String::new(),
            content_type: "application/json".to_string(),
            client,
        }
    }

    fn parse_method(&self) -> Result<Method, ActionError> {
        let method = self.method.trim().to_ascii_uppercase();
        let method = if method.is_empty() { "GET".to_string() } else { method };
        if !SUPPORTED_METHODS.contains(&method.as_str()) {
            return Err(ActionError::validation(format!(
                "Unsupported HTTP method: {}",
                self.method
            )));
        }
        Method::from_bytes(method.as_bytes())
            .map_err(|_| ActionError::validation(format!("Unsupported HTTP method: {}", self.method)))
    }

    fn parse_url(&self) -> Result<Url, ActionError> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(ActionError::validation("URL is required"));
        }
        match Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(parsed),
            _ => Err(ActionError::validation("Invalid URL format")),
        }
    }
}

impl std::fmt::Debug for HttpRequestAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRequestAction")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Action for HttpRequestAction {
    fn type_id(&self) -> &'static str {
        Self::TYPE_ID
    }

    fn display_name(&self) -> &'static str {
        Self::DISPLAY_NAME
    }

    fn validate(&self) -> Result<(), ActionError> {
        self.parse_url()?;
        self.parse_method()?;
        Ok(())
    }

    async fn execute(&self, _event: &KeyEvent) -> Result<ActionOutcome, ActionError> {
        let url = self.parse_url()?;
        let method = self.parse_method()?;

        let mut request = self.client.request(method.clone(), url.clone());
        if method != Method::GET && method != Method::HEAD {
            request = request
                .header(CONTENT_TYPE, self.content_type.as_str())
                .body(self.body.clone());
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            debug!(%method, %url, %status, "HTTP request sent");
        } else {
            warn!(%method, %url, %status, "HTTP request returned an error status");
        }
        Ok(ActionOutcome::Completed)
    }
}

impl ActionType for HttpRequestAction {
    const TYPE_ID: &'static str = "http_request";
    const DISPLAY_NAME: &'static str = "HTTP Request";

    fn fields() -> &'static [FieldSpec<Self>] {
        &FIELDS
    }

    fn from_context(ctx: &ActionContext) -> Self {
        Self::new(ctx.http.clone(), String::new())
    }
}
