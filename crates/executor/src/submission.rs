//! Bundle 提交管理器
//!
//! 一个提交生命周期的状态机:
//!
//! ```text
//! Building → Simulated(可选) → Submitted → Monitoring → Included
//!     ↑                                         │
//!     └──────────────── Retrying ←──────────────┤
//!                                               └→ Abandoned (取消 / 达到重试上限)
//! ```
//!
//! 同一生命周期内的所有提交使用同一个 replacementUuid，
//! 每次重试都重新读取区块高度、重新签名并选择新的目标区块。

use ethers::types::H256;
use models::{Bundle, InclusionResult, ResolvedBundle, SubmissionRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::assembler::ResolveBundle;
use crate::chain::ChainClient;
use crate::flashbots::StateBlock;
use crate::monitor::InclusionMonitor;
use crate::relay::BundleRelay;
use crate::signer::Keyring;
use crate::types::{
    AbandonReason, AttemptReport, AttemptResult, BundleError, RetryCeiling, SubmissionOutcome,
    SubmissionState,
};

const LOG_TARGET: &str = "bundle_submission";

/// 提交配置
#[derive(Debug, Clone)]
pub struct SubmissionConfig {
    /// 目标区块 = 当前区块 + lookahead_blocks
    pub lookahead_blocks: u64,
    /// 发送后等待多久再查询统计 (约一个出块时间)
    pub block_time: Duration,
    /// 监控阶段轮询间隔
    pub poll_interval: Duration,
    /// 重试上限
    pub ceiling: RetryCeiling,
    /// 发送前是否先用 eth_callBundle 模拟
    pub simulate_before_send: bool,
    /// 连续链上 RPC 失败多少次后放弃
    pub max_consecutive_rpc_failures: u32,
}

impl SubmissionConfig {
    pub fn new(ceiling: RetryCeiling) -> Self {
        Self {
            lookahead_blocks: 10,
            block_time: Duration::from_secs(12),
            poll_interval: Duration::from_secs(1),
            ceiling,
            simulate_before_send: false,
            max_consecutive_rpc_failures: 5,
        }
    }

    pub fn lookahead_blocks(mut self, blocks: u64) -> Self {
        self.lookahead_blocks = blocks;
        self
    }

    pub fn block_time(mut self, block_time: Duration) -> Self {
        self.block_time = block_time;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn simulate_before_send(mut self, simulate: bool) -> Self {
        self.simulate_before_send = simulate;
        self
    }

    pub fn max_consecutive_rpc_failures(mut self, max: u32) -> Self {
        self.max_consecutive_rpc_failures = max;
        self
    }

    pub fn validate(&self) -> Result<(), BundleError> {
        if self.lookahead_blocks == 0 {
            return Err(BundleError::Config("lookahead_blocks must be at least 1".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(BundleError::Config("poll_interval must be positive".to_string()));
        }
        if self.max_consecutive_rpc_failures == 0 {
            return Err(BundleError::Config(
                "max_consecutive_rpc_failures must be at least 1".to_string(),
            ));
        }
        match self.ceiling {
            RetryCeiling::Attempts(0) | RetryCeiling::AttemptsOrDeadline { attempts: 0, .. } => {
                Err(BundleError::Config("retry ceiling allows no attempts".to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// 监控阶段一次观察的结果
enum Observation {
    Included { block_number: u64, tx_hash: H256 },
    /// 区块高度已越过目标区块，且范围内没有回执
    Passed,
    Pending,
}

/// Bundle 提交管理器
///
/// 中继和链客户端通过 `Arc` 注入，多个管理器可以共享。
pub struct SubmissionManager<R: ?Sized, C: ?Sized> {
    relay: Arc<R>,
    chain: Arc<C>,
    monitor: InclusionMonitor<C>,
    signers: Keyring,
    config: SubmissionConfig,
}

impl<R, C> SubmissionManager<R, C>
where
    R: BundleRelay + ?Sized,
    C: ChainClient + ?Sized,
{
    pub fn new(
        relay: Arc<R>,
        chain: Arc<C>,
        signers: Keyring,
        config: SubmissionConfig,
    ) -> Result<Self, BundleError> {
        config.validate()?;
        Ok(Self {
            monitor: InclusionMonitor::new(chain.clone()),
            relay,
            chain,
            signers,
            config,
        })
    }

    /// 开始一个新的提交生命周期，使用新生成的 replacementUuid
    pub async fn submit(
        &self,
        bundle: &Bundle,
        cancel: &CancellationToken,
    ) -> Result<SubmissionOutcome, BundleError> {
        self.submit_with_id(bundle, Uuid::new_v4(), cancel).await
    }

    /// 使用指定的 replacementUuid 提交，直到上链、放弃或遇到不可重试的错误
    pub async fn submit_with_id(
        &self,
        bundle: &Bundle,
        replacement_uuid: Uuid,
        cancel: &CancellationToken,
    ) -> Result<SubmissionOutcome, BundleError> {
        info!(
            target: LOG_TARGET,
            "🚀 开始提交 Bundle: {} 笔交易, replacementUuid={}, 重试上限={:?}",
            bundle.len(),
            replacement_uuid,
            self.config.ceiling
        );

        let started = Instant::now();
        let mut attempts: Vec<AttemptReport> = Vec::new();
        let mut submitted = false;

        loop {
            if cancel.is_cancelled() {
                return Ok(self
                    .abandon(replacement_uuid, AbandonReason::Cancelled, attempts, submitted)
                    .await);
            }
            if let Some(reason) = self
                .config
                .ceiling
                .reached(attempts.len() as u32, started.elapsed())
            {
                return Ok(self.abandon(replacement_uuid, reason, attempts, submitted).await);
            }

            let attempt = attempts.len() as u32 + 1;
            let Some(report) = self
                .run_attempt(attempt, bundle, replacement_uuid, cancel, &mut submitted)
                .await?
            else {
                return Ok(self
                    .abandon(replacement_uuid, AbandonReason::Cancelled, attempts, submitted)
                    .await);
            };

            match report.result.clone() {
                AttemptResult::Included {
                    block_number,
                    tx_hash,
                } => {
                    info!(
                        target: LOG_TARGET,
                        "🎉 [{}] Bundle {:?} 已在区块 {} 上链 (交易 {:?}, 第 {} 次尝试)",
                        SubmissionState::Included,
                        report.bundle_hash,
                        block_number,
                        tx_hash,
                        attempt
                    );
                    let bundle_hash = report.bundle_hash;
                    attempts.push(report);
                    return Ok(SubmissionOutcome::Included {
                        replacement_uuid,
                        bundle_hash,
                        block_number,
                        tx_hash,
                        attempts,
                    });
                }
                AttemptResult::Cancelled => {
                    attempts.push(report);
                    return Ok(self
                        .abandon(replacement_uuid, AbandonReason::Cancelled, attempts, submitted)
                        .await);
                }
                AttemptResult::NotIncluded => {
                    info!(
                        target: LOG_TARGET,
                        "🔁 [{}] 目标区块 {} 已过，未上链，重新提交",
                        SubmissionState::Retrying,
                        report.target_block
                    );
                    attempts.push(report);
                }
                AttemptResult::RelayUnavailable(reason) => {
                    warn!(
                        target: LOG_TARGET,
                        "📵 [{}] 中继不可用 (目标区块 {}): {}",
                        SubmissionState::Retrying,
                        report.target_block,
                        reason
                    );
                    attempts.push(report);
                    if !self.pause(self.config.poll_interval, cancel).await {
                        return Ok(self
                            .abandon(replacement_uuid, AbandonReason::Cancelled, attempts, submitted)
                            .await);
                    }
                }
            }
        }
    }

    /// 执行一次尝试
    ///
    /// 返回 `Ok(None)` 表示在确定目标区块之前就被取消了
    async fn run_attempt(
        &self,
        attempt: u32,
        bundle: &Bundle,
        replacement_uuid: Uuid,
        cancel: &CancellationToken,
        submitted: &mut bool,
    ) -> Result<Option<AttemptReport>, BundleError> {
        // Building: 签名在任何网络调用之前完成
        let resolved = bundle.resolve(&self.signers)?;
        let Some(head) = self.read_head(cancel).await? else {
            return Ok(None);
        };
        let target_block = head + self.config.lookahead_blocks;

        let mut report = AttemptReport {
            attempt,
            head_block: head,
            target_block,
            bundle_hash: resolved.bundle_hash(),
            result: AttemptResult::NotIncluded,
        };
        info!(
            target: LOG_TARGET,
            "🧱 [{}] 第 {} 次尝试: 当前区块 {}, 目标区块 {}, bundle {:?}",
            SubmissionState::Building,
            attempt,
            head,
            target_block,
            report.bundle_hash
        );

        if self.config.simulate_before_send {
            if let Err(e) = self.simulate(&resolved, target_block).await {
                if !e.is_relay_transport() {
                    return Err(e);
                }
                report.result = AttemptResult::RelayUnavailable(e.to_string());
                return Ok(Some(report));
            }
        }

        let request = SubmissionRequest::new(resolved, target_block).replacement_uuid(replacement_uuid);
        match self.relay.send_bundle(&request).await {
            Ok(bundle_hash) => {
                *submitted = true;
                report.bundle_hash = bundle_hash;
            }
            Err(e) if e.is_relay_transport() => {
                report.result = AttemptResult::RelayUnavailable(e.to_string());
                return Ok(Some(report));
            }
            Err(e) => {
                error!(target: LOG_TARGET, "❌ 中继拒绝 Bundle，不再重发: {}", e);
                return Err(e);
            }
        }
        info!(
            target: LOG_TARGET,
            "📨 [{}] Bundle {:?} 已提交, 目标区块 {}",
            SubmissionState::Submitted,
            report.bundle_hash,
            target_block
        );

        // 等待约一个出块时间后查询统计，仅用于日志
        if !self.pause(self.config.block_time, cancel).await {
            report.result = AttemptResult::Cancelled;
            return Ok(Some(report));
        }
        self.log_bundle_stats(report.bundle_hash, target_block).await;

        debug!(target: LOG_TARGET, "👀 [{}] 监控区块 {}..={}", SubmissionState::Monitoring, head + 1, target_block);
        let tx_hashes = request.bundle.tx_hashes();
        let mut rpc_failures = 0u32;
        loop {
            if cancel.is_cancelled() {
                report.result = AttemptResult::Cancelled;
                return Ok(Some(report));
            }

            match self.observe(&tx_hashes, head, target_block).await {
                Ok(Observation::Included {
                    block_number,
                    tx_hash,
                }) => {
                    report.result = AttemptResult::Included {
                        block_number,
                        tx_hash,
                    };
                    return Ok(Some(report));
                }
                Ok(Observation::Passed) => {
                    report.result = AttemptResult::NotIncluded;
                    return Ok(Some(report));
                }
                Ok(Observation::Pending) => rpc_failures = 0,
                Err(BundleError::ChainRpc(msg)) => {
                    rpc_failures += 1;
                    if rpc_failures >= self.config.max_consecutive_rpc_failures {
                        return Err(BundleError::ChainRpc(msg));
                    }
                    warn!(
                        target: LOG_TARGET,
                        "⚠️ 链上 RPC 失败 ({}/{}): {}",
                        rpc_failures,
                        self.config.max_consecutive_rpc_failures,
                        msg
                    );
                }
                Err(e) => return Err(e),
            }

            if !self.pause(self.config.poll_interval, cancel).await {
                report.result = AttemptResult::Cancelled;
                return Ok(Some(report));
            }
        }
    }

    /// eth_callBundle 模拟，任一交易失败即中止
    async fn simulate(&self, resolved: &ResolvedBundle, target_block: u64) -> Result<(), BundleError> {
        let simulation = self
            .relay
            .call_bundle(resolved, target_block, StateBlock::Latest)
            .await?;
        if let Some((index, reason)) = simulation.first_failure() {
            error!(target: LOG_TARGET, "❌ Bundle 模拟失败: 交易 {} - {}", index, reason);
            return Err(BundleError::SimulationFailed(format!("tx {}: {}", index, reason)));
        }
        info!(
            target: LOG_TARGET,
            "🧪 [{}] 模拟成功: gas_used={}, coinbase_diff={}",
            SubmissionState::Simulated,
            simulation.gas_used,
            simulation.coinbase_diff
        );
        Ok(())
    }

    /// 读取区块高度，临时的 RPC 失败会重试
    ///
    /// 返回 `Ok(None)` 表示等待期间被取消
    async fn read_head(&self, cancel: &CancellationToken) -> Result<Option<u64>, BundleError> {
        let mut failures = 0u32;
        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                result = self.chain.block_number() => result,
            };
            match result {
                Ok(head) => return Ok(Some(head)),
                Err(BundleError::ChainRpc(msg)) => {
                    failures += 1;
                    if failures >= self.config.max_consecutive_rpc_failures {
                        return Err(BundleError::ChainRpc(msg));
                    }
                    warn!(target: LOG_TARGET, "⚠️ 读取区块高度失败 ({}): {}", failures, msg);
                }
                Err(e) => return Err(e),
            }
            if !self.pause(self.config.poll_interval, cancel).await {
                return Ok(None);
            }
        }
    }

    /// 读取最新区块后检查 [head+1, target] 范围内的回执
    ///
    /// 只有在区块高度已到达目标区块之后检查过，才认定本次未上链。
    async fn observe(
        &self,
        tx_hashes: &[H256],
        head: u64,
        target_block: u64,
    ) -> Result<Observation, BundleError> {
        let current = self.chain.block_number().await?;
        match self
            .monitor
            .check_inclusion(tx_hashes, head + 1..=target_block)
            .await?
        {
            InclusionResult::Included {
                block_number,
                tx_hash,
                ..
            } => Ok(Observation::Included {
                block_number,
                tx_hash,
            }),
            InclusionResult::NotFound if current >= target_block => Ok(Observation::Passed),
            InclusionResult::NotFound => {
                debug!(target: LOG_TARGET, "等待区块 {} (当前 {})", target_block, current);
                Ok(Observation::Pending)
            }
        }
    }

    /// 查询 bundle 统计，失败只记录日志
    async fn log_bundle_stats(&self, bundle_hash: H256, target_block: u64) {
        match self.relay.get_bundle_stats(bundle_hash, target_block).await {
            Ok(stats) => info!(
                target: LOG_TARGET,
                "📊 bundleStats: simulated={}, sentToMiners={}, highPriority={:?}",
                stats.is_simulated,
                stats.is_sent_to_miners,
                stats.is_high_priority
            ),
            Err(e) => debug!(target: LOG_TARGET, "bundleStats 查询失败: {}", e),
        }
        match self.relay.get_bundle_stats_v2(bundle_hash, target_block).await {
            Ok(stats) => info!(
                target: LOG_TARGET,
                "📊 bundleStatsV2: simulated={}, highPriority={}, 考虑={} 个 builder, 封装={} 个 builder",
                stats.is_simulated,
                stats.is_high_priority,
                stats.considered_by_builders_at.len(),
                stats.sealed_by_builders_at.len()
            ),
            Err(e) => debug!(target: LOG_TARGET, "bundleStatsV2 查询失败: {}", e),
        }
    }

    /// 等待一段时间，被取消时返回 false
    async fn pause(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    async fn abandon(
        &self,
        replacement_uuid: Uuid,
        reason: AbandonReason,
        attempts: Vec<AttemptReport>,
        submitted: bool,
    ) -> SubmissionOutcome {
        warn!(
            target: LOG_TARGET,
            "🛑 [{}] 放弃 Bundle (replacementUuid={}): {} (共 {} 次尝试)",
            SubmissionState::Abandoned,
            replacement_uuid,
            reason,
            attempts.len()
        );

        // 取消时同时撤回中继上仍在等待的 bundle
        if reason == AbandonReason::Cancelled && submitted {
            if let Err(e) = self.relay.cancel_bundle(replacement_uuid).await {
                warn!(target: LOG_TARGET, "⚠️ 中继端取消失败: {}", e);
            }
        }

        SubmissionOutcome::Abandoned {
            replacement_uuid,
            reason,
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flashbots::{
        BundleStatsResponse, BundleStatsV2Response, SimulateBundleResponse, SimulationResult,
    };
    use crate::signer::tests::{sender, transfer};
    use crate::signer::TransactionSigner;
    use async_trait::async_trait;
    use ethers::types::{Address, TransactionReceipt, U256, U64};
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};

    /// 每次读取区块高度都前进一个区块的链
    struct MockChain {
        head: Mutex<u64>,
        receipts: HashMap<H256, u64>,
        head_failures: Mutex<u32>,
        head_reads: Mutex<u32>,
    }

    impl MockChain {
        fn new(first_head: u64) -> Self {
            Self {
                head: Mutex::new(first_head - 1),
                receipts: HashMap::new(),
                head_failures: Mutex::new(0),
                head_reads: Mutex::new(0),
            }
        }

        fn with_receipt(mut self, tx_hash: H256, block: u64) -> Self {
            self.receipts.insert(tx_hash, block);
            self
        }

        fn failing_reads(self, count: u32) -> Self {
            *self.head_failures.lock() = count;
            self
        }
    }

    #[async_trait]
    impl ChainClient for MockChain {
        async fn block_number(&self) -> Result<u64, BundleError> {
            *self.head_reads.lock() += 1;
            let mut failures = self.head_failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(BundleError::ChainRpc("connection refused".to_string()));
            }
            let mut head = self.head.lock();
            *head += 1;
            Ok(*head)
        }

        async fn transaction_count(&self, _: Address) -> Result<U256, BundleError> {
            Ok(U256::zero())
        }

        async fn balance(&self, _: Address) -> Result<U256, BundleError> {
            Ok(U256::zero())
        }

        async fn transaction_receipt(
            &self,
            tx_hash: H256,
        ) -> Result<Option<TransactionReceipt>, BundleError> {
            let head = *self.head.lock();
            Ok(self
                .receipts
                .get(&tx_hash)
                .filter(|block| **block <= head)
                .map(|block| TransactionReceipt {
                    transaction_hash: tx_hash,
                    block_number: Some(U64::from(*block)),
                    ..Default::default()
                }))
        }
    }

    /// 记录每次提交的中继
    #[derive(Default)]
    struct MockRelay {
        send_replies: Mutex<VecDeque<Result<H256, BundleError>>>,
        simulation: Mutex<Option<SimulateBundleResponse>>,
        sent: Mutex<Vec<(u64, Option<Uuid>)>>,
        simulated: Mutex<u32>,
        stats_queries: Mutex<u32>,
        cancelled: Mutex<Vec<Uuid>>,
    }

    impl MockRelay {
        fn replying(replies: Vec<Result<H256, BundleError>>) -> Self {
            Self {
                send_replies: Mutex::new(replies.into()),
                ..Default::default()
            }
        }

        fn targets(&self) -> Vec<u64> {
            self.sent.lock().iter().map(|(target, _)| *target).collect()
        }
    }

    #[async_trait]
    impl BundleRelay for MockRelay {
        async fn send_bundle(&self, request: &SubmissionRequest) -> Result<H256, BundleError> {
            self.sent
                .lock()
                .push((request.target_block, request.options.replacement_uuid));
            self.send_replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(request.bundle.bundle_hash()))
        }

        async fn call_bundle(
            &self,
            _: &ResolvedBundle,
            _: u64,
            state_block: StateBlock,
        ) -> Result<SimulateBundleResponse, BundleError> {
            assert_eq!(state_block, StateBlock::Latest);
            *self.simulated.lock() += 1;
            Ok(self.simulation.lock().clone().unwrap_or_default())
        }

        async fn get_bundle_stats(&self, _: H256, _: u64) -> Result<BundleStatsResponse, BundleError> {
            *self.stats_queries.lock() += 1;
            Err(BundleError::RelayTransport("stats unavailable".to_string()))
        }

        async fn get_bundle_stats_v2(
            &self,
            _: H256,
            _: u64,
        ) -> Result<BundleStatsV2Response, BundleError> {
            *self.stats_queries.lock() += 1;
            Ok(BundleStatsV2Response::default())
        }

        async fn cancel_bundle(&self, replacement_uuid: Uuid) -> Result<(), BundleError> {
            self.cancelled.lock().push(replacement_uuid);
            Ok(())
        }
    }

    fn keyring() -> Keyring {
        Keyring::new().with_signer(Arc::new(sender()))
    }

    /// 第一笔预签名，第二笔提交时签名
    fn bundle() -> Bundle {
        let wallet = sender();
        Bundle::new()
            .push_signed(wallet.sign_transaction(&transfer(0)).unwrap())
            .push_unsigned(wallet.address(), transfer(1))
            .unwrap()
    }

    fn tx_hashes() -> Vec<H256> {
        bundle().resolve(&keyring()).unwrap().tx_hashes()
    }

    fn manager(
        relay: Arc<MockRelay>,
        chain: Arc<MockChain>,
        ceiling: RetryCeiling,
    ) -> SubmissionManager<MockRelay, MockChain> {
        let config = SubmissionConfig::new(ceiling)
            .block_time(Duration::from_secs(12))
            .poll_interval(Duration::from_secs(1));
        SubmissionManager::new(relay, chain, keyring(), config).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_keeps_replacement_uuid() {
        let relay = Arc::new(MockRelay::default());
        let chain = Arc::new(MockChain::new(100));
        let manager = manager(relay.clone(), chain, RetryCeiling::Attempts(2));

        let outcome = manager.submit(&bundle(), &CancellationToken::new()).await.unwrap();
        match &outcome {
            SubmissionOutcome::Abandoned { reason, attempts, .. } => {
                assert_eq!(*reason, AbandonReason::AttemptsExhausted(2));
                assert_eq!(attempts.len(), 2);
                assert!(attempts.iter().all(|a| a.result == AttemptResult::NotIncluded));
            }
            other => panic!("expected abandonment, got {:?}", other),
        }

        // 第一次 100 + 10，监控到 110 后重试，新的区块高度 111 + 10
        assert_eq!(relay.targets(), vec![110, 121]);
        let uuids: Vec<_> = relay.sent.lock().iter().map(|(_, uuid)| *uuid).collect();
        assert_eq!(uuids, vec![Some(outcome.replacement_uuid()); 2]);
        assert!(relay.cancelled.lock().is_empty());
        assert_eq!(*relay.stats_queries.lock(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_tx_included_at_head_plus_four() {
        let hashes = tx_hashes();
        let relay = Arc::new(MockRelay::default());
        let chain = Arc::new(MockChain::new(100).with_receipt(hashes[1], 104));
        let manager = manager(relay.clone(), chain, RetryCeiling::Attempts(3));

        match manager.submit(&bundle(), &CancellationToken::new()).await.unwrap() {
            SubmissionOutcome::Included {
                block_number,
                tx_hash,
                attempts,
                ..
            } => {
                assert_eq!(block_number, 104);
                assert_eq!(tx_hash, hashes[1]);
                assert_eq!(attempts.len(), 1);
                assert_eq!(attempts[0].target_block, 110);
            }
            other => panic!("expected inclusion, got {:?}", other),
        }
        assert_eq!(relay.sent.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_transport_error_is_retried() {
        let hashes = tx_hashes();
        let relay = Arc::new(MockRelay::replying(vec![Err(BundleError::RelayTransport(
            "HTTP 500".to_string(),
        ))]));
        let chain = Arc::new(MockChain::new(100).with_receipt(hashes[0], 105));
        let manager = manager(relay.clone(), chain, RetryCeiling::Attempts(3));

        match manager.submit(&bundle(), &CancellationToken::new()).await.unwrap() {
            SubmissionOutcome::Included {
                block_number,
                attempts,
                ..
            } => {
                assert_eq!(block_number, 105);
                assert_eq!(attempts.len(), 2);
                assert!(matches!(attempts[0].result, AttemptResult::RelayUnavailable(_)));
            }
            other => panic!("expected inclusion, got {:?}", other),
        }
        assert_eq!(relay.targets(), vec![110, 111]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_protocol_error_not_resubmitted() {
        let relay = Arc::new(MockRelay::replying(vec![Err(BundleError::RelayProtocol {
            code: -32602,
            message: "invalid params".to_string(),
        })]));
        let chain = Arc::new(MockChain::new(100));
        let manager = manager(relay.clone(), chain, RetryCeiling::Unbounded);

        let err = manager.submit(&bundle(), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, BundleError::RelayProtocol { code: -32602, .. }));
        assert_eq!(relay.sent.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_lifecycle_gets_fresh_uuid() {
        let relay = Arc::new(MockRelay::default());
        let chain = Arc::new(MockChain::new(100));
        let manager = manager(relay.clone(), chain, RetryCeiling::Attempts(1));
        let cancel = CancellationToken::new();

        let first = manager.submit(&bundle(), &cancel).await.unwrap();
        let second = manager.submit(&bundle(), &cancel).await.unwrap();
        assert_ne!(first.replacement_uuid(), second.replacement_uuid());

        let sent = relay.sent.lock().clone();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].1, Some(first.replacement_uuid()));
        assert_eq!(sent[1].1, Some(second.replacement_uuid()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_withdraws_bundle() {
        let relay = Arc::new(MockRelay::default());
        let chain = Arc::new(MockChain::new(100));
        let manager = manager(relay.clone(), chain, RetryCeiling::Unbounded);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            trigger.cancel();
        });

        let outcome = manager.submit(&bundle(), &cancel).await.unwrap();
        match &outcome {
            SubmissionOutcome::Abandoned { reason, .. } => {
                assert_eq!(*reason, AbandonReason::Cancelled)
            }
            other => panic!("expected cancellation, got {:?}", other),
        }
        assert_eq!(*relay.cancelled.lock(), vec![outcome.replacement_uuid()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start() {
        let relay = Arc::new(MockRelay::default());
        let chain = Arc::new(MockChain::new(100));
        let manager = manager(relay.clone(), chain, RetryCeiling::Unbounded);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = manager.submit(&bundle(), &cancel).await.unwrap();
        assert_eq!(outcome.state(), SubmissionState::Abandoned);
        assert!(outcome.attempts().is_empty());
        assert!(relay.sent.lock().is_empty());
        // 没有提交过，不需要撤回
        assert!(relay.cancelled.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_failure_aborts() {
        let relay = Arc::new(MockRelay::default());
        *relay.simulation.lock() = Some(SimulateBundleResponse {
            results: vec![
                SimulationResult::default(),
                SimulationResult {
                    error: Some("execution reverted".to_string()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        });
        let chain = Arc::new(MockChain::new(100));
        let config = SubmissionConfig::new(RetryCeiling::Attempts(3)).simulate_before_send(true);
        let manager = SubmissionManager::new(relay.clone(), chain, keyring(), config).unwrap();

        let err = manager.submit(&bundle(), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, BundleError::SimulationFailed(_)));
        assert_eq!(*relay.simulated.lock(), 1);
        assert!(relay.sent.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_error_before_network() {
        let relay = Arc::new(MockRelay::default());
        let chain = Arc::new(MockChain::new(100));
        let manager = manager(relay.clone(), chain.clone(), RetryCeiling::Attempts(3));
        let bundle = Bundle::new()
            .push_unsigned(Address::repeat_byte(0x77), transfer(0))
            .unwrap();

        let err = manager.submit(&bundle, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, BundleError::Signing(_)));
        assert!(relay.sent.lock().is_empty());
        assert_eq!(*chain.head_reads.lock(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_rpc_failures_tolerated() {
        let hashes = tx_hashes();
        let relay = Arc::new(MockRelay::default());
        let chain = Arc::new(MockChain::new(100).with_receipt(hashes[0], 102).failing_reads(2));
        let manager = manager(relay, chain, RetryCeiling::Attempts(1));

        let outcome = manager.submit(&bundle(), &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.state(), SubmissionState::Included);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_rpc_failure_surfaces() {
        let relay = Arc::new(MockRelay::default());
        let chain = Arc::new(MockChain::new(100).failing_reads(100));
        let config = SubmissionConfig::new(RetryCeiling::Unbounded).max_consecutive_rpc_failures(3);
        let manager = SubmissionManager::new(relay.clone(), chain.clone(), keyring(), config).unwrap();

        let err = manager.submit(&bundle(), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, BundleError::ChainRpc(_)));
        assert_eq!(*chain.head_reads.lock(), 3);
        assert!(relay.sent.lock().is_empty());
    }

    #[test]
    fn test_config_validation() {
        assert!(SubmissionConfig::new(RetryCeiling::Unbounded).validate().is_ok());
        assert!(SubmissionConfig::new(RetryCeiling::Attempts(0)).validate().is_err());
        assert!(SubmissionConfig::new(RetryCeiling::Attempts(1))
            .lookahead_blocks(0)
            .validate()
            .is_err());
        assert!(SubmissionConfig::new(RetryCeiling::Deadline(Duration::from_secs(60)))
            .poll_interval(Duration::ZERO)
            .validate()
            .is_err());
    }
}
