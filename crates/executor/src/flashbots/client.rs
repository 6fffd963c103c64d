//! Flashbots 客户端
//!
//! 负责与 Flashbots 中继通信。每个请求独立签名，不保留连接状态。

use async_trait::async_trait;
use ethers::types::H256;
use models::{ResolvedBundle, SubmissionRequest};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::auth::{sign_payload, FLASHBOTS_SIGNATURE_HEADER};
use super::types::*;
use crate::relay::BundleRelay;
use crate::signer::ReputationSigner;
use crate::types::BundleError;

const LOG_TARGET: &str = "flashbots_relay";

/// Flashbots 客户端
pub struct FlashbotsClient<S: ReputationSigner> {
    /// 配置
    config: FlashbotsConfig,
    /// HTTP 客户端
    http_client: Client,
    /// 声誉签名者（只用于向 Flashbots 证明身份，不签署交易）
    signer: S,
    /// JSON-RPC 请求 ID
    next_id: AtomicU64,
}

impl<S: ReputationSigner> FlashbotsClient<S> {
    /// 创建新的 Flashbots 客户端
    pub fn new(config: FlashbotsConfig, signer: S) -> Result<Self, BundleError> {
        let http_client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BundleError::Config(format!("failed to build HTTP client: {}", e)))?;

        info!(
            target: LOG_TARGET,
            "🔒 Flashbots 客户端初始化: relay_url={}, chain_id={}, 签名地址={:?}",
            config.relay_url,
            config.chain_id,
            signer.address()
        );

        Ok(Self {
            config,
            http_client,
            signer,
            next_id: AtomicU64::new(1),
        })
    }

    /// 发送签名的请求到 Flashbots 中继
    ///
    /// 返回 `Ok(None)` 表示中继返回了 `result: null`
    async fn send_signed_request<P, T>(
        &self,
        method: &'static str,
        params: P,
    ) -> Result<Option<T>, BundleError>
    where
        P: Serialize + Send,
        T: DeserializeOwned + Send,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);
        let body = serde_json::to_vec(&request)
            .map_err(|e| BundleError::Validation(format!("failed to encode {}: {}", method, e)))?;

        let auth_header = sign_payload(&self.signer, &body)?;

        info!(target: LOG_TARGET, "📡 Flashbots 请求 {} (id={}) -> {}", method, id, self.config.relay_url);
        debug!(target: LOG_TARGET, "📝 {}: {}", FLASHBOTS_SIGNATURE_HEADER, auth_header);
        debug!(target: LOG_TARGET, "📤 请求体: {}", String::from_utf8_lossy(&body));

        let response = self
            .http_client
            .post(&self.config.relay_url)
            .header("Content-Type", "application/json")
            .header(FLASHBOTS_SIGNATURE_HEADER, auth_header)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() { "timeout" } else { "transport" };
                warn!(target: LOG_TARGET, "⚠️ Flashbots 请求 {} 失败 ({}): {}", method, kind, e);
                BundleError::RelayTransport(format!("{} {}: {}", method, kind, e))
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BundleError::RelayTransport(format!("{} body read failed: {}", method, e)))?;

        info!(target: LOG_TARGET, "📥 Flashbots 响应 {} [{}]", method, status);
        debug!(target: LOG_TARGET, "📥 响应体: {}", text);

        if !status.is_success() {
            // 4xx 且带 JSON-RPC error 时视为协议错误，其余一律视为传输错误
            if status.is_client_error() {
                let parsed: Result<JsonRpcResponse<serde_json::Value>, _> =
                    serde_json::from_str(&text);
                if let Ok(JsonRpcResponse { error: Some(error), .. }) = parsed {
                    return Err(protocol_error(method, error));
                }
            }
            warn!(target: LOG_TARGET, "⚠️ Flashbots 请求 {} 返回 HTTP {}", method, status);
            return Err(BundleError::RelayTransport(format!(
                "{} HTTP {}: {}",
                method, status, text
            )));
        }

        let json_response: JsonRpcResponse<T> = serde_json::from_str(&text).map_err(|e| {
            BundleError::RelayTransport(format!("{} malformed response: {}", method, e))
        })?;

        if let Some(error) = json_response.error {
            return Err(protocol_error(method, error));
        }

        Ok(json_response.result)
    }
}

fn protocol_error(method: &str, error: JsonRpcError) -> BundleError {
    warn!(
        target: LOG_TARGET,
        "❌ Flashbots RPC 错误 {}: {} - {}",
        method,
        error.code,
        error.message
    );
    BundleError::RelayProtocol {
        code: error.code,
        message: error.message,
    }
}

#[async_trait]
impl<S: ReputationSigner> BundleRelay for FlashbotsClient<S> {
    async fn send_bundle(&self, request: &SubmissionRequest) -> Result<H256, BundleError> {
        let params = BundleRequest::from(request);
        let response: Option<SendBundleResponse> =
            self.send_signed_request("eth_sendBundle", vec![params]).await?;

        // 带 replacementUuid 时部分中继不返回哈希，使用本地计算的内容哈希
        let bundle_hash = response
            .and_then(|r| r.bundle_hash)
            .unwrap_or_else(|| request.bundle.bundle_hash());

        info!(
            target: LOG_TARGET,
            "✅ Bundle 已发送: {:?}, 目标区块 {}",
            bundle_hash,
            request.target_block
        );
        Ok(bundle_hash)
    }

    async fn call_bundle(
        &self,
        bundle: &ResolvedBundle,
        target_block: u64,
        state_block: StateBlock,
    ) -> Result<SimulateBundleResponse, BundleError> {
        let params = SimulateBundleRequest {
            txs: bundle.raw_hex(),
            block_number: hex_block(target_block),
            state_block_number: state_block.to_param(),
            timestamp: None,
        };

        let response: SimulateBundleResponse = self
            .send_signed_request("eth_callBundle", vec![params])
            .await?
            .ok_or_else(|| {
                BundleError::RelayTransport("eth_callBundle returned no result".to_string())
            })?;

        debug!(
            target: LOG_TARGET,
            "Bundle 模拟完成: gas_used={}, coinbase_diff={}",
            response.gas_used,
            response.coinbase_diff
        );
        Ok(response)
    }

    async fn get_bundle_stats(
        &self,
        bundle_hash: H256,
        block_number: u64,
    ) -> Result<BundleStatsResponse, BundleError> {
        let params = BundleStatsRequest {
            bundle_hash,
            block_number: hex_block(block_number),
        };
        Ok(self
            .send_signed_request("flashbots_getBundleStats", vec![params])
            .await?
            .unwrap_or_default())
    }

    async fn get_bundle_stats_v2(
        &self,
        bundle_hash: H256,
        block_number: u64,
    ) -> Result<BundleStatsV2Response, BundleError> {
        let params = BundleStatsRequest {
            bundle_hash,
            block_number: hex_block(block_number),
        };
        Ok(self
            .send_signed_request("flashbots_getBundleStatsV2", vec![params])
            .await?
            .unwrap_or_default())
    }

    async fn cancel_bundle(&self, replacement_uuid: Uuid) -> Result<(), BundleError> {
        let params = CancelBundleRequest { replacement_uuid };
        let _: Option<serde_json::Value> =
            self.send_signed_request("eth_cancelBundle", vec![params]).await?;
        info!(target: LOG_TARGET, "🛑 已请求取消 Bundle: replacementUuid={}", replacement_uuid);
        Ok(())
    }
}
