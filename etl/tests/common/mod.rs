#![allow(dead_code)]

use serde::Deserialize;
use serde_json::{json, Value};
use wiremock::{http::Method, Match, Request, Respond, ResponseTemplate};

#[derive(Debug, Deserialize)]
struct RpcRequest {
    method: String,
    params: Value,
}

/// Matches a JSON-RPC request by command and parameters.
pub struct RpcRequestMatcher {
    method: String,
    params: Value,
}

/// A successful response with the given result.
pub struct RpcResponse {
    result: Value,
}

/// A response with an error reported by the node.
pub struct RpcErrorResponse {
    error: String,
}

pub fn rpc_request<P>(method: impl Into<String>, params: P) -> RpcRequestMatcher
where
    P: serde::Serialize,
{
    RpcRequestMatcher {
        method: method.into(),
        params: serde_json::to_value(params).expect("failed to serialize JSON params"),
    }
}

/// Matches any request for the given command.
pub struct RpcMethodMatcher {
    method: String,
}

pub fn rpc_method(method: impl Into<String>) -> RpcMethodMatcher {
    RpcMethodMatcher {
        method: method.into(),
    }
}

impl RpcResponse {
    pub fn new(result: Value) -> Self {
        Self { result }
    }
}

impl RpcErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

impl Match for RpcRequestMatcher {
    fn matches(&self, req: &Request) -> bool {
        if req.method != Method::Post {
            return false;
        }

        if let Ok(rpc_req) = serde_json::from_slice::<RpcRequest>(&req.body) {
            rpc_req.method == self.method && rpc_req.params == self.params
        } else {
            false
        }
    }
}

impl Match for RpcMethodMatcher {
    fn matches(&self, req: &Request) -> bool {
        if req.method != Method::Post {
            return false;
        }

        serde_json::from_slice::<RpcRequest>(&req.body)
            .map(|rpc_req| rpc_req.method == self.method)
            .unwrap_or(false)
    }
}

impl Respond for RpcResponse {
    fn respond(&self, req: &Request) -> ResponseTemplate {
        if serde_json::from_slice::<RpcRequest>(&req.body).is_ok() {
            let mut result = self.result.clone();
            if let Some(result) = result.as_object_mut() {
                result.insert("status".to_string(), json!("success"));
            }
            ResponseTemplate::new(200).set_body_json(json!({ "result": result }))
        } else {
            ResponseTemplate::new(400)
        }
    }
}

impl Respond for RpcErrorResponse {
    fn respond(&self, req: &Request) -> ResponseTemplate {
        if let Ok(rpc_req) = serde_json::from_slice::<RpcRequest>(&req.body) {
            ResponseTemplate::new(200).set_body_json(json!({
                "result": {
                    "error": self.error,
                    "status": "error",
                    "request": {
                        "command": rpc_req.method,
                    },
                }
            }))
        } else {
            ResponseTemplate::new(400)
        }
    }
}

/// The params of a `tx` request.
pub fn tx_params(hash: &str) -> Value {
    json!([{ "transaction": hash }])
}

/// The params of a `ledger` request.
pub fn ledger_params(ledger_index: u64, transactions: bool, expand: bool) -> Value {
    json!([{
        "ledger_index": ledger_index,
        "transactions": transactions,
        "expand": expand,
    }])
}
