//! Access tokens for the BigQuery REST api.
use std::{fmt, sync::Arc};

use async_trait::async_trait;
use error_stack::{report, Result};
use gcp_auth::TokenProvider;
use tokio::sync::OnceCell;

use super::StoreError;

const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";

/// How the store authenticates its requests.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// A fixed OAuth2 access token. It is never refreshed.
    AccessToken(String),
    /// Google application default credentials, refreshed before they expire.
    ApplicationDefault,
    /// Requests are not authenticated. Used with local emulators.
    Anonymous,
}

/// Provides the bearer token of each request.
#[async_trait]
pub trait TokenSource: Send + Sync + 'static {
    async fn token(&self) -> Result<String, StoreError>;
}

/// Always returns the same token.
pub struct StaticToken(String);

/// Tokens from the application default credentials.
///
/// Credentials are discovered on the first request. The provider caches the token and
/// refreshes it shortly before it expires, so long runs keep a valid token.
#[derive(Default)]
pub struct DefaultCredentials {
    provider: OnceCell<Arc<dyn TokenProvider>>,
}

impl Credentials {
    pub fn token_source(&self) -> Option<Arc<dyn TokenSource>> {
        let source: Arc<dyn TokenSource> = match self {
            Credentials::AccessToken(token) => Arc::new(StaticToken::new(token.clone())),
            Credentials::ApplicationDefault => Arc::new(DefaultCredentials::default()),
            Credentials::Anonymous => return None,
        };
        Some(source)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::AccessToken(_) => f.write_str("AccessToken(<redacted>)"),
            Credentials::ApplicationDefault => f.write_str("ApplicationDefault"),
            Credentials::Anonymous => f.write_str("Anonymous"),
        }
    }
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String, StoreError> {
        Ok(self.0.clone())
    }
}

impl DefaultCredentials {
    async fn provider(&self) -> Result<&Arc<dyn TokenProvider>, StoreError> {
        self.provider
            .get_or_try_init(|| async {
                gcp_auth::provider().await.map_err(|err| {
                    report!(StoreError::Configuration)
                        .attach_printable("failed to discover google credentials")
                        .attach_printable(err.to_string())
                })
            })
            .await
    }
}

#[async_trait]
impl TokenSource for DefaultCredentials {
    async fn token(&self) -> Result<String, StoreError> {
        let provider = self.provider().await?;
        let token = provider.token(&[BIGQUERY_SCOPE]).await.map_err(|err| {
            report!(StoreError::Request)
                .attach_printable("failed to refresh access token")
                .attach_printable(err.to_string())
        })?;
        Ok(token.as_str().to_string())
    }
}
