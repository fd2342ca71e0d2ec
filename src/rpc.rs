//! JSON-RPC pass-through to an external ledger gateway.
//!
//! The gateway owns everything this crate deliberately does not: transaction
//! encoding, fee calculation, script compilation and key custody. One gateway
//! endpoint serves one ledger; the signer endpoint is separate so keys can
//! live on a different host than chain access.

use crate::{
    htlc_location::LockLocation,
    ledger::{
        AdapterError, KeySigner, LedgerAdapter, LedgerKind, LegSnapshot, RejectReason,
        SignedMaterial, SigningError, SubmissionReceipt, TxMaterial,
    },
    Timestamp,
};
use anyhow::Context;
use async_trait::async_trait;
use futures::TryFutureExt;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt::Debug;

#[derive(Clone, Debug)]
pub struct Client {
    inner: reqwest::Client,
    url: url::Url,
}

impl Client {
    pub fn new(base_url: url::Url) -> Self {
        Self {
            inner: reqwest::Client::new(),
            url: base_url,
        }
    }

    pub async fn send<Req, Res>(&self, request: Request<Req>) -> anyhow::Result<Res>
    where
        Req: Debug + Serialize,
        Res: Debug + DeserializeOwned,
    {
        let response = self
            .inner
            .post(self.url.clone())
            .json(&request)
            .send()
            .map_err(ConnectionFailed)
            .await?
            .json::<Response<Res>>()
            .await
            .context("failed to deserialize JSON response as JSON-RPC response")?
            .payload
            .into_result()
            .with_context(|| {
                format!(
                    "JSON-RPC request {} failed",
                    serde_json::to_string(&request).expect("can always serialize to JSON")
                )
            })?;

        Ok(response)
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct Request<T> {
    id: String,
    jsonrpc: String,
    method: String,
    params: T,
}

impl<T> Request<T> {
    pub fn new(method: &str, params: T) -> Self {
        Self {
            id: "1".to_owned(),
            jsonrpc: "2.0".to_owned(),
            method: method.to_owned(),
            params,
        }
    }
}

#[derive(Deserialize, Debug, PartialEq)]
pub struct Response<R> {
    #[serde(flatten)]
    pub payload: ResponsePayload<R>,
}

#[derive(Deserialize, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ResponsePayload<R> {
    Result(R),
    Error(JsonRpcError),
}

impl<R> ResponsePayload<R> {
    fn into_result(self) -> Result<R, JsonRpcError> {
        match self {
            ResponsePayload::Result(result) => Ok(result),
            ResponsePayload::Error(e) => Err(e),
        }
    }
}

#[derive(Debug, Deserialize, thiserror::Error, PartialEq)]
#[error("JSON-RPC request failed with code {code}: {message}")]
pub struct JsonRpcError {
    code: i64,
    message: String,
}

impl JsonRpcError {
    /// Chain-level rejection, if the gateway's error code encodes one.
    fn reject_reason(&self) -> Option<RejectReason> {
        match self.code {
            1001 => Some(RejectReason::InvalidSecret),
            1002 => Some(RejectReason::Expired),
            1003 => Some(RejectReason::NotYetExpired),
            1004 => Some(RejectReason::AlreadySpent),
            1005 => Some(RejectReason::InsufficientFunds),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("connection error: {0}")]
pub struct ConnectionFailed(#[from] reqwest::Error);

/// A [`LedgerAdapter`] speaking to a gateway over JSON-RPC.
#[derive(Clone, Debug)]
pub struct RpcLedger {
    client: Client,
    kind: LedgerKind,
}

impl RpcLedger {
    pub fn new(url: url::Url, kind: LedgerKind) -> Self {
        RpcLedger {
            client: Client::new(url),
            kind,
        }
    }
}

#[derive(Debug, Serialize)]
struct LockStateParams<'a> {
    location: &'a LockLocation,
}

#[derive(Debug, Deserialize)]
struct ChainTimeResult {
    time: u32,
}

#[async_trait]
impl LedgerAdapter for RpcLedger {
    fn kind(&self) -> LedgerKind {
        self.kind
    }

    async fn lock_state(&self, location: &LockLocation) -> Result<LegSnapshot, AdapterError> {
        self.client
            .send(Request::new("swap_lockState", LockStateParams { location }))
            .await
            .map_err(into_adapter_error)
    }

    async fn submit(&self, signed: SignedMaterial) -> Result<SubmissionReceipt, AdapterError> {
        self.client
            .send(Request::new("swap_submit", signed))
            .await
            .map_err(into_adapter_error)
    }

    async fn current_time(&self) -> Result<Timestamp, AdapterError> {
        let result: ChainTimeResult = self
            .client
            .send(Request::new("swap_chainTime", ()))
            .await
            .map_err(into_adapter_error)?;

        Ok(Timestamp::from(result.time))
    }
}

/// A [`KeySigner`] speaking to a signing service over JSON-RPC.
#[derive(Clone, Debug)]
pub struct RpcSigner {
    client: Client,
}

impl RpcSigner {
    pub fn new(url: url::Url) -> Self {
        RpcSigner {
            client: Client::new(url),
        }
    }
}

#[async_trait]
impl KeySigner for RpcSigner {
    async fn sign(&self, material: TxMaterial) -> Result<SignedMaterial, SigningError> {
        self.client
            .send(Request::new("signer_sign", material))
            .await
            .map_err(|e| SigningError(format!("{:#}", e)))
    }
}

fn into_adapter_error(e: anyhow::Error) -> AdapterError {
    if e.downcast_ref::<ConnectionFailed>().is_some() {
        return AdapterError::Transient(format!("{:#}", e));
    }

    if let Some(rpc_error) = e.downcast_ref::<JsonRpcError>() {
        if let Some(reason) = rpc_error.reject_reason() {
            return AdapterError::Rejected(reason);
        }
    }

    AdapterError::Configuration(format!("{:#}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_a_result_response() {
        let response: Response<ChainTimeResult> =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":"1","result":{"time":1700000000}}"#)
                .unwrap();

        match response.payload {
            ResponsePayload::Result(result) => assert_eq!(result.time, 1_700_000_000),
            ResponsePayload::Error(e) => panic!("unexpected error: {}", e),
        }
    }

    #[test]
    fn gateway_rejection_codes_map_to_reject_reasons() {
        let response: Response<ChainTimeResult> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":"1","error":{"code":1004,"message":"already spent"}}"#,
        )
        .unwrap();

        let error = match response.payload {
            ResponsePayload::Error(e) => e,
            ResponsePayload::Result(_) => panic!("expected an error payload"),
        };

        assert_eq!(error.reject_reason(), Some(RejectReason::AlreadySpent));
    }

    #[test]
    fn unknown_error_codes_are_not_rejections() {
        let error = JsonRpcError {
            code: -32601,
            message: "method not found".to_owned(),
        };

        assert_eq!(error.reject_reason(), None);
    }
}
