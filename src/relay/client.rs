//! JSON-RPC client for a Kora-compatible fee relay.
//!
//! Methods:
//! - getPayerSigner
//! - getSupportedTokens
//! - getBlockhash
//! - getPaymentInstruction (never retried)
//! - signTransaction (never retried)

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_retry::{strategy::ExponentialBackoff, RetryIf};
use tracing::debug;

use super::{
    PayerSigner, PaymentInstructionRequest, PaymentInstructionResponse, RelayApi, RelayError,
    SignTransactionRequest,
};

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct JsonRpcResponse<R> {
    result: Option<R>,
    error: Option<JsonRpcErrorObject>,
}

#[derive(Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct SupportedTokens {
    tokens: Vec<String>,
}

#[derive(Deserialize)]
struct Blockhash {
    blockhash: String,
}

#[derive(Deserialize)]
struct SignedTransaction {
    signed_transaction: String,
}

/// Relay client speaking JSON-RPC 2.0 over HTTP
pub struct KoraClient {
    url: String,
    client: reqwest::Client,
    max_retries: usize,
    next_id: AtomicU64,
}

impl KoraClient {
    pub fn new(url: &str, timeout: Duration, max_retries: usize) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build relay HTTP client: {}", e))?;

        Ok(Self {
            url: url.to_string(),
            client,
            max_retries,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Single JSON-RPC round trip
    async fn call<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R, RelayError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let resp = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RelayError::Status { status, body });
        }

        let body: JsonRpcResponse<R> = resp
            .json()
            .await
            .map_err(|e| RelayError::Decode(format!("{}: {}", method, e)))?;

        if let Some(err) = body.error {
            return Err(RelayError::JsonRpc {
                code: err.code,
                message: err.message,
            });
        }
        body.result
            .ok_or_else(|| RelayError::Decode(format!("{}: response has no result", method)))
    }

    /// Round trip with bounded backoff on transport failures (read-only calls)
    async fn call_idempotent<R: DeserializeOwned>(&self, method: &str) -> Result<R, RelayError> {
        let strategy = ExponentialBackoff::from_millis(10)
            .max_delay(Duration::from_secs(1))
            .take(self.max_retries);

        RetryIf::spawn(
            strategy,
            move || async move {
                let result = self.call::<R>(method, Value::Array(vec![])).await;
                if let Err(e) = &result {
                    debug!(method, error = %e, "Relay call failed");
                }
                result
            },
            |e: &RelayError| e.is_retryable(),
        )
        .await
    }

    fn to_params<T: Serialize>(method: &str, params: &T) -> Result<Value, RelayError> {
        serde_json::to_value(params).map_err(|e| RelayError::Decode(format!("{}: {}", method, e)))
    }
}

#[async_trait]
impl RelayApi for KoraClient {
    async fn get_payer_signer(&self) -> Result<PayerSigner, RelayError> {
        self.call_idempotent("getPayerSigner").await
    }

    async fn get_supported_tokens(&self) -> Result<Vec<String>, RelayError> {
        let supported: SupportedTokens = self.call_idempotent("getSupportedTokens").await?;
        Ok(supported.tokens)
    }

    async fn get_blockhash(&self) -> Result<String, RelayError> {
        let blockhash: Blockhash = self.call_idempotent("getBlockhash").await?;
        Ok(blockhash.blockhash)
    }

    async fn get_payment_instruction(
        &self,
        request: &PaymentInstructionRequest,
    ) -> Result<PaymentInstructionResponse, RelayError> {
        let params = Self::to_params("getPaymentInstruction", request)?;
        self.call("getPaymentInstruction", params).await
    }

    async fn sign_transaction(&self, request: &SignTransactionRequest) -> Result<String, RelayError> {
        let params = Self::to_params("signTransaction", request)?;
        let signed: SignedTransaction = self.call("signTransaction", params).await?;
        Ok(signed.signed_transaction)
    }
}
