use ethers::types::{Address, Bytes, TransactionReceipt, H256};
use ethers::utils::keccak256;
use serde::Deserialize;
use uuid::Uuid;

use crate::transaction::{SignedTransaction, Transaction, TransactionError, TransactionParams};

/// Bundle 条目
///
/// 条目顺序即为目标区块内的执行顺序。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "serde_json::Value")]
pub enum BundleEntry {
    /// 预先签名的原始交易
    Signed(SignedTransaction),
    /// 提交时由 `signer` 对应的签名者签名
    Unsigned {
        signer: Address,
        transaction: Transaction,
    },
}

impl BundleEntry {
    /// 创建待签名条目，交易若声明了 from 必须与签名者一致
    pub fn unsigned(signer: Address, transaction: Transaction) -> Result<Self, TransactionError> {
        if let Some(declared) = transaction.from() {
            if declared != signer {
                return Err(TransactionError::SenderMismatch { declared, signer });
            }
        }
        Ok(Self::Unsigned {
            signer,
            transaction,
        })
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, BundleEntry::Signed(_))
    }
}

/// 外部 JSON 格式:
/// `{"signed_transaction": "0x.."}` 或 `{"signer": "0x..", "transaction": {...}}`
///
/// 按是否存在 `signed_transaction` 键选择形式，字段错误原样返回。
#[derive(Debug, Deserialize)]
struct SignedEntry {
    signed_transaction: Bytes,
}

#[derive(Debug, Deserialize)]
struct UnsignedEntry {
    signer: Address,
    transaction: TransactionParams,
}

impl TryFrom<serde_json::Value> for BundleEntry {
    type Error = TransactionError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        let invalid = |e: serde_json::Error| TransactionError::InvalidEntry(e.to_string());

        if value.get("signed_transaction").is_some() {
            let entry: SignedEntry = serde_json::from_value(value).map_err(invalid)?;
            if entry.signed_transaction.is_empty() {
                return Err(TransactionError::InvalidEntry(
                    "signed_transaction is empty".to_string(),
                ));
            }
            return Ok(BundleEntry::Signed(SignedTransaction::from_raw(entry.signed_transaction)));
        }

        let entry: UnsignedEntry = serde_json::from_value(value).map_err(invalid)?;
        BundleEntry::unsigned(entry.signer, Transaction::try_from(entry.transaction)?)
    }
}

/// 交易包 (未解析)
///
/// 每次提交尝试都会重新解析 (签名) 一次。
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Bundle {
    entries: Vec<BundleEntry>,
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从外部 JSON 数组解析
    pub fn from_json(json: &str) -> Result<Self, TransactionError> {
        serde_json::from_str(json).map_err(|e| TransactionError::InvalidEntry(e.to_string()))
    }

    /// 添加预签名交易
    pub fn push_signed(mut self, signed_tx: SignedTransaction) -> Self {
        self.entries.push(BundleEntry::Signed(signed_tx));
        self
    }

    /// 添加待签名交易
    pub fn push_unsigned(
        mut self,
        signer: Address,
        transaction: Transaction,
    ) -> Result<Self, TransactionError> {
        self.entries.push(BundleEntry::unsigned(signer, transaction)?);
        Ok(self)
    }

    pub fn push_entry(mut self, entry: BundleEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn entries(&self) -> &[BundleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 已解析的交易包，全部条目均为签名字节
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBundle {
    txs: Vec<SignedTransaction>,
}

impl ResolvedBundle {
    pub fn new(txs: Vec<SignedTransaction>) -> Self {
        Self { txs }
    }

    pub fn transactions(&self) -> &[SignedTransaction] {
        &self.txs
    }

    pub fn tx_hashes(&self) -> Vec<H256> {
        self.txs.iter().map(SignedTransaction::hash).collect()
    }

    pub fn raw_hex(&self) -> Vec<String> {
        self.txs.iter().map(SignedTransaction::to_hex).collect()
    }

    /// 内容哈希: keccak256(交易哈希依次拼接)
    pub fn bundle_hash(&self) -> H256 {
        let mut buf = Vec::with_capacity(self.txs.len() * 32);
        for tx in &self.txs {
            buf.extend_from_slice(tx.hash().as_bytes());
        }
        H256::from(keccak256(buf))
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }
}

/// `eth_sendBundle` 的可选参数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendBundleOptions {
    /// 设置后同一 uuid 的后续提交会替换之前的 bundle，也可用于取消
    pub replacement_uuid: Option<Uuid>,
    pub min_timestamp: Option<u64>,
    pub max_timestamp: Option<u64>,
    /// 允许回滚的交易哈希
    pub reverting_tx_hashes: Vec<H256>,
}

/// 一次提交请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRequest {
    pub bundle: ResolvedBundle,
    pub target_block: u64,
    pub options: SendBundleOptions,
}

impl SubmissionRequest {
    pub fn new(bundle: ResolvedBundle, target_block: u64) -> Self {
        Self {
            bundle,
            target_block,
            options: SendBundleOptions::default(),
        }
    }

    pub fn replacement_uuid(mut self, uuid: Uuid) -> Self {
        self.options.replacement_uuid = Some(uuid);
        self
    }

    pub fn options(mut self, options: SendBundleOptions) -> Self {
        self.options = options;
        self
    }
}

/// 上链检查结果
#[derive(Debug, Clone)]
pub enum InclusionResult {
    /// 找到了 bundle 中某笔交易的回执
    Included {
        block_number: u64,
        tx_hash: H256,
        receipt: Box<TransactionReceipt>,
    },
    /// 检查范围内没有找到
    NotFound,
}

impl InclusionResult {
    pub fn is_included(&self) -> bool {
        matches!(self, InclusionResult::Included { .. })
    }
}
