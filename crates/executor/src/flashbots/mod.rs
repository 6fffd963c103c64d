//! Flashbots 模块
//!
//! 通过私有中继提交 bundle，交易不进入公开 mempool
//!
//! ## 工作原理
//!
//! ```text
//! 普通交易:  钱包 → 公开 Mempool → 所有人可见 → 可能被抢跑
//! Flashbots: 钱包 → Flashbots 中继 → builder → 原子地打包进目标区块
//! ```
//!
//! ## 特点
//! - 交易不会出现在公开 mempool，其他人看不到
//! - bundle 内交易按顺序执行，要么全部上链，要么都不上链
//! - 每个请求都带有声誉密钥的签名 (X-Flashbots-Signature)

pub mod auth;
mod client;
mod types;

pub use auth::{recover_signer, sign_payload, FLASHBOTS_SIGNATURE_HEADER};
pub use client::FlashbotsClient;
pub use types::*;
