//! 应用启动引导模块
//!
//! 封装客户端初始化、bundle 提交和结果输出

use anyhow::{Context, Result};
use config_crate::{AppConfig, CeilingSettings};
use ethers::providers::{Http, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, U256};
use ethers::utils::{format_ether, parse_ether};
use executor::{
    http_provider, BundleRelay, CancellationToken, ChainClient, EthersChain, FlashbotsClient,
    FlashbotsConfig, Keyring, ReputationKey, ReputationSigner, RetryCeiling, SenderWallet,
    SubmissionConfig, SubmissionManager, SubmissionOutcome, TransactionSigner,
};
use models::{Bundle, Transaction};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// 简单转账的 gas 上限
const TRANSFER_GAS: u64 = 21_000;

/// 示例转账参数
#[derive(Debug, Clone)]
pub struct TransferArgs {
    /// 不指定时使用随机地址
    pub receiver: Option<Address>,
    pub amount_eth: String,
    pub max_fee_gwei: u64,
    pub priority_fee_gwei: u64,
    pub simulate: bool,
}

/// 应用程序实例
pub struct Application {
    config: AppConfig,
    chain: Arc<EthersChain<Provider<Http>>>,
    relay: Arc<FlashbotsClient<ReputationKey>>,
    sender: Arc<SenderWallet>,
    cancel: CancellationToken,
}

impl Application {
    /// 根据配置初始化客户端
    pub fn new(config: AppConfig) -> Result<Self> {
        Self::log_config(&config);

        let provider = http_provider(&config.network.provider_url, config.timeouts.rpc_request)?;
        let chain = Arc::new(EthersChain::new(Arc::new(provider), config.timeouts.rpc_request));

        let sender = SenderWallet::from_key(config.wallet.sender_key.expose())
            .context("ETH_SENDER_KEY 无效")?;
        let reputation = ReputationKey::from_key(config.wallet.signer_key.expose())
            .context("ETH_SIGNER_KEY 无效")?;
        if reputation.address() == sender.address() {
            warn!("⚠️  声誉密钥与发送账户相同，建议使用不持有资金的独立密钥");
        }
        info!("🔑 发送账户: {:?}", sender.address());
        info!("🔑 声誉账户: {:?}", reputation.address());

        let relay_config = FlashbotsConfig::for_chain(config.network.chain_id)
            .relay_url(config.network.relay_url.clone())
            .request_timeout(config.timeouts.relay_request);
        let relay = Arc::new(FlashbotsClient::new(relay_config, reputation)?);

        Ok(Self {
            config,
            chain,
            relay,
            sender: Arc::new(sender),
            cancel: CancellationToken::new(),
        })
    }

    /// 发送两笔转账组成的 bundle: 第一笔预先签名，第二笔提交时签名
    pub async fn send_transfers(&self, args: TransferArgs) -> Result<()> {
        let receiver = args
            .receiver
            .unwrap_or_else(|| LocalWallet::new(&mut ethers::core::rand::thread_rng()).address());
        let sender = self.sender.address();
        let value = parse_ether(args.amount_eth.as_str())
            .with_context(|| format!("无效的转账金额: {}", args.amount_eth))?;

        self.log_balances(sender, receiver, "发送前").await?;

        let nonce = self.chain.transaction_count(sender).await?;
        let chain_id = self.config.network.chain_id;
        let max_fee = gwei(args.max_fee_gwei);
        let priority_fee = gwei(args.priority_fee_gwei);
        info!(
            "📝 构建转账: {} ETH x 2 -> {:?}, nonce={}, maxFee={} gwei, priorityFee={} gwei",
            args.amount_eth, receiver, nonce, args.max_fee_gwei, args.priority_fee_gwei
        );

        let transfer = |nonce: U256| {
            Transaction::eip1559(
                receiver,
                value,
                U256::from(TRANSFER_GAS),
                max_fee,
                priority_fee,
                nonce,
                chain_id,
            )
            .map(|tx| tx.with_from(sender))
        };
        let first = self.sender.sign_transaction(&transfer(nonce)?)?;
        let bundle = Bundle::new()
            .push_signed(first)
            .push_unsigned(sender, transfer(nonce + 1)?)?;

        self.submit(&bundle, args.simulate).await?;
        self.log_balances(sender, receiver, "发送后").await?;
        Ok(())
    }

    /// 提交 JSON 文件中的 bundle
    pub async fn submit_file(&self, path: &Path, simulate: bool) -> Result<()> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("读取 bundle 文件失败: {}", path.display()))?;
        let bundle = Bundle::from_json(&json)
            .with_context(|| format!("解析 bundle 文件失败: {}", path.display()))?;
        info!("📦 已加载 bundle: {} 个条目", bundle.len());

        self.submit(&bundle, simulate).await?;
        Ok(())
    }

    /// 按 replacementUuid 取消中继上的 bundle
    pub async fn cancel(&self, replacement_uuid: Uuid) -> Result<()> {
        self.relay.cancel_bundle(replacement_uuid).await?;
        info!("✅ 已取消 replacementUuid={}", replacement_uuid);
        Ok(())
    }

    async fn submit(&self, bundle: &Bundle, simulate: bool) -> Result<SubmissionOutcome> {
        let settings = &self.config.submission;
        let config = SubmissionConfig::new(retry_ceiling(settings.ceiling))
            .lookahead_blocks(settings.lookahead_blocks)
            .block_time(settings.block_time)
            .poll_interval(settings.poll_interval)
            .simulate_before_send(simulate || settings.simulate_before_send)
            .max_consecutive_rpc_failures(settings.max_consecutive_rpc_failures);

        let keyring = Keyring::new().with_signer(self.sender.clone());
        let manager =
            SubmissionManager::new(self.relay.clone(), self.chain.clone(), keyring, config)?;

        // Ctrl+C 取消当前提交，并撤回中继上的 bundle
        let cancel = self.cancel.clone();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("收到 Ctrl+C，正在取消提交...");
                cancel.cancel();
            }
        });

        let result = manager.submit(bundle, &self.cancel).await;
        watcher.abort();

        match &result {
            Ok(outcome) => Self::log_outcome(outcome),
            Err(e) => error!("❌ Bundle 提交失败: {}", e),
        }
        Ok(result?)
    }

    async fn log_balances(&self, sender: Address, receiver: Address, stage: &str) -> Result<()> {
        let sender_balance = self.chain.balance(sender).await?;
        let receiver_balance = self.chain.balance(receiver).await?;
        info!("💰 [{}] 发送账户 {:?}: {} ETH", stage, sender, format_ether(sender_balance));
        info!("💰 [{}] 接收账户 {:?}: {} ETH", stage, receiver, format_ether(receiver_balance));
        Ok(())
    }

    fn log_outcome(outcome: &SubmissionOutcome) {
        for report in outcome.attempts() {
            info!(
                "  #{} 当前区块 {} -> 目标区块 {}, bundle {:?}: {:?}",
                report.attempt, report.head_block, report.target_block, report.bundle_hash, report.result
            );
        }
        match outcome {
            SubmissionOutcome::Included {
                replacement_uuid,
                bundle_hash,
                block_number,
                tx_hash,
                ..
            } => {
                info!("========================================");
                info!("✅ Bundle 已上链: 区块 {}", block_number);
                info!("   bundle: {:?}", bundle_hash);
                info!("   交易: {:?}", tx_hash);
                info!("   replacementUuid: {}", replacement_uuid);
                info!("========================================");
            }
            SubmissionOutcome::Abandoned {
                replacement_uuid,
                reason,
                ..
            } => {
                warn!("========================================");
                warn!("🛑 Bundle 未上链: {}", reason);
                warn!("   replacementUuid: {}", replacement_uuid);
                warn!("========================================");
            }
        }
    }

    fn log_config(config: &AppConfig) {
        info!("配置加载成功");
        info!("========================================");
        info!("网络: {} (chain_id={})", config.network.network, config.network.chain_id);
        info!("RPC: {}", config.network.provider_url);
        info!("中继: {}", config.network.relay_url);
        info!(
            "目标区块: 当前 + {}, 轮询间隔 {:?}, 出块时间 {:?}",
            config.submission.lookahead_blocks,
            config.submission.poll_interval,
            config.submission.block_time
        );
        info!("重试上限: {:?}", config.submission.ceiling);
        info!("========================================");
    }
}

fn gwei(amount: u64) -> U256 {
    U256::from(amount) * U256::exp10(9)
}

fn retry_ceiling(settings: CeilingSettings) -> RetryCeiling {
    match settings {
        CeilingSettings::Attempts(max) => RetryCeiling::Attempts(max),
        CeilingSettings::Deadline(limit) => RetryCeiling::Deadline(limit),
        CeilingSettings::AttemptsOrDeadline { attempts, deadline } => {
            RetryCeiling::AttemptsOrDeadline { attempts, deadline }
        }
        CeilingSettings::Unbounded => RetryCeiling::Unbounded,
    }
}

/// 设置全局 panic hook
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        error!("========================================");
        error!("!!! 系统发生 PANIC !!!");
        error!("========================================");
        if let Some(location) = panic_info.location() {
            error!(
                "发生位置: {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            );
        }
        if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            error!("Panic 消息: {}", s);
        }
        error!("========================================");
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_gwei() {
        assert_eq!(gwei(200), U256::from(200_000_000_000u64));
    }

    #[test]
    fn test_retry_ceiling_mapping() {
        assert_eq!(retry_ceiling(CeilingSettings::Attempts(3)), RetryCeiling::Attempts(3));
        assert_eq!(retry_ceiling(CeilingSettings::Unbounded), RetryCeiling::Unbounded);
        let deadline = Duration::from_secs(90);
        assert_eq!(
            retry_ceiling(CeilingSettings::AttemptsOrDeadline { attempts: 2, deadline }),
            RetryCeiling::AttemptsOrDeadline { attempts: 2, deadline }
        );
    }
}
