//! Flashbots 类型定义

use ethers::types::{Address, H256, U256};
use models::{quantity, SubmissionRequest};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Flashbots 配置
#[derive(Debug, Clone)]
pub struct FlashbotsConfig {
    /// Flashbots 中继 URL
    pub relay_url: String,
    /// 链 ID
    pub chain_id: u64,
    /// 单个请求的超时时间
    pub request_timeout: Duration,
}

impl Default for FlashbotsConfig {
    fn default() -> Self {
        Self {
            // 以太坊主网 Flashbots 中继
            relay_url: "https://relay.flashbots.net".to_string(),
            chain_id: 1,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl FlashbotsConfig {
    /// 按链 ID 选择中继
    pub fn for_chain(chain_id: u64) -> Self {
        Self {
            relay_url: Self::relay_url_for_chain(chain_id).to_string(),
            chain_id,
            ..Default::default()
        }
    }

    /// 获取对应链的 Flashbots 中继 URL
    pub fn relay_url_for_chain(chain_id: u64) -> &'static str {
        match chain_id {
            1 => "https://relay.flashbots.net",                // 以太坊主网
            5 => "https://relay-goerli.flashbots.net",         // Goerli 测试网
            17000 => "https://relay-holesky.flashbots.net",    // Holesky 测试网
            11155111 => "https://relay-sepolia.flashbots.net", // Sepolia 测试网
            _ => "https://relay.flashbots.net",                // 默认主网
        }
    }

    pub fn relay_url(mut self, relay_url: impl Into<String>) -> Self {
        self.relay_url = relay_url.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// 区块号的十六进制表示
pub fn hex_block(block_number: u64) -> String {
    format!("0x{:x}", block_number)
}

/// 模拟所基于的状态区块
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateBlock {
    Latest,
    Number(u64),
}

impl StateBlock {
    pub fn to_param(&self) -> String {
        match self {
            StateBlock::Latest => "latest".to_string(),
            StateBlock::Number(n) => hex_block(*n),
        }
    }
}

/// Bundle 请求参数
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleRequest {
    /// 签名后的交易列表（十六进制字符串）
    pub txs: Vec<String>,
    /// 目标区块号（十六进制）
    pub block_number: String,
    /// 最小时间戳（可选）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_timestamp: Option<u64>,
    /// 最大时间戳（可选）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_timestamp: Option<u64>,
    /// 允许回滚的交易哈希列表
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reverting_tx_hashes: Vec<H256>,
    /// 替换 ID，同一 ID 的新 bundle 会替换旧的
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replacement_uuid: Option<Uuid>,
}

impl From<&SubmissionRequest> for BundleRequest {
    fn from(request: &SubmissionRequest) -> Self {
        Self {
            txs: request.bundle.raw_hex(),
            block_number: hex_block(request.target_block),
            min_timestamp: request.options.min_timestamp,
            max_timestamp: request.options.max_timestamp,
            reverting_tx_hashes: request.options.reverting_tx_hashes.clone(),
            replacement_uuid: request.options.replacement_uuid,
        }
    }
}

/// Bundle 模拟请求
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateBundleRequest {
    /// 签名后的交易列表
    pub txs: Vec<String>,
    /// 目标区块号
    pub block_number: String,
    /// 用于模拟的状态区块号 ("latest" 或十六进制)
    pub state_block_number: String,
    /// 模拟时间戳（可选）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

/// Bundle 统计查询参数 (v1 / v2 相同)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleStatsRequest {
    pub bundle_hash: H256,
    pub block_number: String,
}

/// Bundle 取消请求
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelBundleRequest {
    pub replacement_uuid: Uuid,
}

/// Bundle 发送响应
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendBundleResponse {
    /// Bundle 哈希
    #[serde(default)]
    pub bundle_hash: Option<H256>,
}

/// Bundle 模拟响应
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateBundleResponse {
    /// 模拟结果列表
    #[serde(default)]
    pub results: Vec<SimulationResult>,
    /// coinbase 收益差（验证者收益）
    #[serde(default, deserialize_with = "quantity::deserialize")]
    pub coinbase_diff: U256,
    /// bundle 有效 gas 价格
    #[serde(default, alias = "bundleGasPrice", deserialize_with = "quantity::deserialize")]
    pub gas_price: U256,
    /// 总 gas 使用
    #[serde(default, alias = "totalGasUsed")]
    pub gas_used: u64,
    /// 状态区块号
    #[serde(default)]
    pub state_block_number: u64,
    /// 总 gas 费
    #[serde(default, alias = "gasFees", deserialize_with = "quantity::deserialize")]
    pub total_gas_fees: U256,
    #[serde(default)]
    pub bundle_hash: Option<H256>,
}

impl SimulateBundleResponse {
    /// 第一笔失败的交易及原因
    ///
    /// revert 为空 (0x) 表示成功，只有非空的 revert 才是失败
    pub fn first_failure(&self) -> Option<(usize, String)> {
        self.results.iter().enumerate().find_map(|(index, result)| {
            let revert = result
                .revert
                .as_deref()
                .filter(|r| !r.is_empty() && *r != "0x");
            match (&result.error, revert) {
                (Some(error), _) => Some((index, error.clone())),
                (None, Some(revert)) => Some((index, format!("reverted: {}", revert))),
                (None, None) => None,
            }
        })
    }
}

/// 单笔交易模拟结果
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    /// 交易哈希
    #[serde(default)]
    pub tx_hash: H256,
    /// gas 使用量
    #[serde(default)]
    pub gas_used: u64,
    /// gas 价格
    #[serde(default, deserialize_with = "quantity::deserialize")]
    pub gas_price: U256,
    /// gas 费
    #[serde(default, deserialize_with = "quantity::deserialize")]
    pub gas_fees: U256,
    /// 发送者
    #[serde(default)]
    pub from_address: Address,
    /// 接收者
    #[serde(default)]
    pub to_address: Option<Address>,
    /// coinbase 差值
    #[serde(default, deserialize_with = "quantity::deserialize")]
    pub coinbase_diff: U256,
    /// 直接转给 coinbase 的 ETH
    #[serde(default, deserialize_with = "quantity::deserialize")]
    pub eth_sent_to_coinbase: U256,
    /// 错误信息（如果有）
    #[serde(default)]
    pub error: Option<String>,
    /// 回滚原因（如果有）
    #[serde(default)]
    pub revert: Option<String>,
    /// 返回值
    #[serde(default)]
    pub value: Option<String>,
}

/// Bundle 状态查询响应 (flashbots_getBundleStats)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleStatsResponse {
    /// 是否已经被模拟
    #[serde(default)]
    pub is_simulated: bool,
    /// 是否已经被提交给验证者
    #[serde(default)]
    pub is_sent_to_miners: bool,
    /// 是否高优先级
    #[serde(default)]
    pub is_high_priority: Option<bool>,
    /// 第一次模拟时间
    #[serde(default)]
    pub simulated_at: Option<String>,
    /// 提交给验证者的时间
    #[serde(default)]
    pub submitted_at: Option<String>,
    /// 中继收到的时间
    #[serde(default)]
    pub received_at: Option<String>,
}

/// Bundle 状态查询响应 (flashbots_getBundleStatsV2)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleStatsV2Response {
    #[serde(default)]
    pub is_high_priority: bool,
    #[serde(default)]
    pub is_simulated: bool,
    #[serde(default)]
    pub simulated_at: Option<String>,
    #[serde(default)]
    pub received_at: Option<String>,
    /// 考虑过该 bundle 的 builder
    #[serde(default)]
    pub considered_by_builders_at: Vec<BuilderTimestamp>,
    /// 将该 bundle 封装进区块的 builder
    #[serde(default)]
    pub sealed_by_builders_at: Vec<BuilderTimestamp>,
}

/// builder 时间记录
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderTimestamp {
    pub pubkey: String,
    pub timestamp: String,
}

/// JSON-RPC 请求
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<T: Serialize> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: T,
}

impl<T: Serialize> JsonRpcRequest<T> {
    pub fn new(id: u64, method: &'static str, params: T) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// JSON-RPC 响应
#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse<T> {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: serde_json::Value,
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 错误
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}
