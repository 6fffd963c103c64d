//! Bundle 执行器
//!
//! 通过 Flashbots 风格的私有中继提交交易包，并监控其是否上链
//!
//! ## 模块结构
//!
//! - `signer`: 交易签名与中继身份签名，两者互相独立
//! - `assembler`: 把预签名和待签名条目解析为有序的签名交易
//! - `flashbots`: 中继请求签名与 JSON-RPC 客户端
//! - `chain`: 链上 RPC (区块高度、nonce、余额、回执)
//! - `monitor`: 上链检查
//! - `submission`: 目标区块选择、replacementUuid 生命周期与重试

mod assembler;
mod chain;
mod monitor;
mod relay;
mod signer;
mod submission;
mod types;
pub mod flashbots;

pub use assembler::ResolveBundle;
pub use chain::{http_provider, ChainClient, EthersChain};
pub use flashbots::{FlashbotsClient, FlashbotsConfig, StateBlock};
pub use monitor::InclusionMonitor;
pub use relay::BundleRelay;
pub use signer::{Keyring, ReputationKey, ReputationSigner, SenderWallet, TransactionSigner};
pub use submission::{SubmissionConfig, SubmissionManager};
pub use types::{
    AbandonReason, AttemptReport, AttemptResult, BundleError, RetryCeiling, SubmissionOutcome,
    SubmissionState,
};

// 重新导出 tokio-util 的取消令牌，调用方无需额外依赖
pub use tokio_util::sync::CancellationToken;
