//! 上链监控
//!
//! 逐个查询 bundle 内交易的回执。找不到回执是正常情况，RPC 失败则单独报错。

use ethers::types::H256;
use models::InclusionResult;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::chain::ChainClient;
use crate::types::BundleError;

const LOG_TARGET: &str = "bundle_submission";

pub struct InclusionMonitor<C: ?Sized> {
    chain: Arc<C>,
}

impl<C: ChainClient + ?Sized> InclusionMonitor<C> {
    pub fn new(chain: Arc<C>) -> Self {
        Self { chain }
    }

    /// 检查 `tx_hashes` 中任一交易是否在 `blocks` 范围内上链
    ///
    /// 范围之外的回执不算作本次范围内的上链。
    pub async fn check_inclusion(
        &self,
        tx_hashes: &[H256],
        blocks: RangeInclusive<u64>,
    ) -> Result<InclusionResult, BundleError> {
        for tx_hash in tx_hashes {
            let Some(receipt) = self.chain.transaction_receipt(*tx_hash).await? else {
                continue;
            };
            let Some(block_number) = receipt.block_number.map(|n| n.as_u64()) else {
                // 回执尚未关联区块
                continue;
            };

            if blocks.contains(&block_number) {
                debug!(target: LOG_TARGET, "🔍 交易 {:?} 在区块 {} 上链", tx_hash, block_number);
                return Ok(InclusionResult::Included {
                    block_number,
                    tx_hash: *tx_hash,
                    receipt: Box::new(receipt),
                });
            }

            warn!(
                target: LOG_TARGET,
                "⚠️ 交易 {:?} 在区块 {} 上链，不在检查范围 {}..={} 内",
                tx_hash,
                block_number,
                blocks.start(),
                blocks.end()
            );
        }

        Ok(InclusionResult::NotFound)
    }
}

impl<C: ?Sized> Clone for InclusionMonitor<C> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
        }
    }
}
