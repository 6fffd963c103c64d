//! 中继接口
//!
//! 提交管理器只依赖这个 trait，测试中用内存实现替换真实中继。

use async_trait::async_trait;
use ethers::types::H256;
use models::{ResolvedBundle, SubmissionRequest};
use uuid::Uuid;

use crate::flashbots::{
    BundleStatsResponse, BundleStatsV2Response, SimulateBundleResponse, StateBlock,
};
use crate::types::BundleError;

#[async_trait]
pub trait BundleRelay: Send + Sync {
    /// eth_sendBundle，返回 bundle 哈希
    async fn send_bundle(&self, request: &SubmissionRequest) -> Result<H256, BundleError>;

    /// eth_callBundle，模拟失败体现在返回结果中，由调用方判断
    async fn call_bundle(
        &self,
        bundle: &ResolvedBundle,
        target_block: u64,
        state_block: StateBlock,
    ) -> Result<SimulateBundleResponse, BundleError>;

    /// flashbots_getBundleStats
    async fn get_bundle_stats(
        &self,
        bundle_hash: H256,
        block_number: u64,
    ) -> Result<BundleStatsResponse, BundleError>;

    /// flashbots_getBundleStatsV2
    async fn get_bundle_stats_v2(
        &self,
        bundle_hash: H256,
        block_number: u64,
    ) -> Result<BundleStatsV2Response, BundleError>;

    /// eth_cancelBundle，按 replacementUuid 取消
    async fn cancel_bundle(&self, replacement_uuid: Uuid) -> Result<(), BundleError>;
}
