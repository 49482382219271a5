//! Ledger network client.
mod json_rpc;

use std::fmt;

use async_trait::async_trait;
use error_stack::Result;
use serde::Serialize;
use serde_json::Value;

#[cfg(test)]
use mockall::automock;

use crate::model::LedgerSequence;

pub use self::json_rpc::{JsonRpcClient, JsonRpcClientOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientError {
    /// Transport failure or retryable status (429, 5xx).
    Request,
    /// The request did not complete in time.
    Timeout,
    /// The node refused the request.
    Rejected,
    /// The response is not a JSON-RPC response.
    Response,
    Configuration,
}

impl error_stack::Context for ClientError {}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Request => write!(f, "failed to send request"),
            ClientError::Timeout => write!(f, "request timed out"),
            ClientError::Rejected => write!(f, "request rejected"),
            ClientError::Response => write!(f, "malformed response"),
            ClientError::Configuration => write!(f, "configuration error"),
        }
    }
}

/// A request to the ledger network.
///
/// Serializes to the request parameters, the command name is [Request::command].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Request {
    Ledger {
        ledger_index: LedgerSequence,
        transactions: bool,
        expand: bool,
    },
    Tx {
        transaction: String,
    },
}

impl Request {
    pub fn command(&self) -> &'static str {
        match self {
            Request::Ledger { .. } => "ledger",
            Request::Tx { .. } => "tx",
        }
    }

    pub fn is_expanded_ledger(&self) -> bool {
        matches!(self, Request::Ledger { expand: true, .. })
    }
}

/// Sends requests to the ledger network.
///
/// Implementations return the response `result` object as is. Errors reported by the node
/// (for example `lgrNotFound`) are part of the result, not failures of the call.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync + 'static {
    async fn send(&self, request: Request) -> Result<Value, ClientError>;
}
