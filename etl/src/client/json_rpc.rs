use std::time::Duration;

use async_trait::async_trait;
use error_stack::{report, Result, ResultExt};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::instrument;
use url::Url;

use super::{ClientError, LedgerClient, Request};

#[derive(Debug, Clone)]
pub struct JsonRpcClientOptions {
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for JsonRpcClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

/// A [LedgerClient] speaking JSON-RPC over HTTP.
#[derive(Debug, Clone)]
pub struct JsonRpcClient {
    client: reqwest::Client,
    url: Url,
    options: JsonRpcClientOptions,
}

impl JsonRpcClient {
    pub fn new(url: Url, options: JsonRpcClientOptions) -> Result<Self, ClientError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::Configuration)
                .attach_printable("node url must be http or https")
                .attach_printable_lazy(|| format!("url: {url}"));
        }

        let client = reqwest::Client::builder()
            .build()
            .change_context(ClientError::Configuration)
            .attach_printable("failed to build http client")?;

        Ok(Self {
            client,
            url,
            options,
        })
    }

    async fn post(&self, body: &Value) -> Result<Value, ClientError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(body)
            .send()
            .await
            .change_context(ClientError::Request)
            .attach_printable("failed to send request to node")?;

        let status = response.status();
        if !status.is_success() {
            let context = if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                ClientError::Request
            } else {
                ClientError::Rejected
            };
            return Err(report!(context)).attach_printable(format!("status code: {status}"));
        }

        let body = response
            .bytes()
            .await
            .change_context(ClientError::Request)
            .attach_printable("failed to read response body")?;

        serde_json::from_slice::<Value>(&body)
            .change_context(ClientError::Response)
            .attach_printable("failed to parse response body")
    }
}

#[async_trait]
impl LedgerClient for JsonRpcClient {
    #[instrument(skip(self), level = "debug")]
    async fn send(&self, request: Request) -> Result<Value, ClientError> {
        let body = json!({
            "method": request.command(),
            "params": [&request],
        });

        let Ok(response) = tokio::time::timeout(self.options.timeout, self.post(&body)).await
        else {
            return Err(ClientError::Timeout)
                .attach_printable("request to node timed out")
                .attach_printable_lazy(|| format!("request: {request:?}"));
        };

        let result = match response? {
            Value::Object(mut response) => response.remove("result"),
            _ => None,
        };

        result.ok_or_else(|| {
            report!(ClientError::Response)
                .attach_printable("response has no result")
                .attach_printable(format!("request: {request:?}"))
        })
    }
}
