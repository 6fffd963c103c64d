//! 链上 RPC 接口
//!
//! `EthersChain` 把 ethers `Middleware` 适配为 `ChainClient`，每次调用都有超时。

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address, TransactionReceipt, H256, U256};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::types::BundleError;

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn block_number(&self) -> Result<u64, BundleError>;

    /// 账户在最新区块 (latest) 状态下的 nonce，不计入公共内存池中的 pending 交易
    async fn transaction_count(&self, address: Address) -> Result<U256, BundleError>;

    async fn balance(&self, address: Address) -> Result<U256, BundleError>;

    async fn transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> Result<Option<TransactionReceipt>, BundleError>;
}

/// 基于 ethers Provider 的链客户端
pub struct EthersChain<M> {
    provider: Arc<M>,
    timeout: Duration,
}

impl<M: Middleware> EthersChain<M> {
    pub fn new(provider: Arc<M>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    async fn call<T, E, F>(&self, method: &str, fut: F) -> Result<T, BundleError>
    where
        F: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(BundleError::ChainRpc(format!("{}: {}", method, e))),
            Err(_) => Err(BundleError::ChainRpc(format!(
                "{}: timed out after {:?}",
                method, self.timeout
            ))),
        }
    }
}

#[async_trait]
impl<M: Middleware + 'static> ChainClient for EthersChain<M> {
    async fn block_number(&self) -> Result<u64, BundleError> {
        let block = self
            .call("eth_blockNumber", self.provider.get_block_number())
            .await?;
        Ok(block.as_u64())
    }

    async fn transaction_count(&self, address: Address) -> Result<U256, BundleError> {
        self.call(
            "eth_getTransactionCount",
            self.provider.get_transaction_count(address, None),
        )
        .await
    }

    async fn balance(&self, address: Address) -> Result<U256, BundleError> {
        self.call("eth_getBalance", self.provider.get_balance(address, None))
            .await
    }

    async fn transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> Result<Option<TransactionReceipt>, BundleError> {
        self.call(
            "eth_getTransactionReceipt",
            self.provider.get_transaction_receipt(tx_hash),
        )
        .await
    }
}

/// 创建带请求超时的 HTTP Provider
pub fn http_provider(rpc_url: &str, timeout: Duration) -> Result<Provider<Http>, BundleError> {
    let url = Url::parse(rpc_url)
        .map_err(|e| BundleError::Config(format!("invalid RPC url {}: {}", rpc_url, e)))?;
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| BundleError::Config(format!("failed to build HTTP client: {}", e)))?;
    Ok(Provider::new(Http::new_with_client(url, client)))
}
