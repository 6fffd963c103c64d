use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, Bytes, Eip1559TransactionRequest, Signature, TransactionRequest, H256, U256,
};
use ethers::utils::{keccak256, rlp};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::quantity;

/// 交易模型错误
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Missing required field `{field}` for {tx_type:?} transaction")]
    MissingField { field: &'static str, tx_type: TxType },

    #[error("Field `{field}` is not allowed for {tx_type:?} transaction")]
    ForbiddenField { field: &'static str, tx_type: TxType },

    #[error("Missing transaction type")]
    MissingType,

    #[error("Unsupported transaction type: {0}")]
    UnsupportedType(u8),

    #[error("maxPriorityFeePerGas {priority_fee} exceeds maxFeePerGas {max_fee}")]
    PriorityFeeTooHigh { max_fee: U256, priority_fee: U256 },

    #[error("Sender {declared:?} does not match signer {signer:?}")]
    SenderMismatch { declared: Address, signer: Address },

    #[error("Failed to decode signed transaction: {0}")]
    Decode(String),

    #[error("Invalid bundle entry: {0}")]
    InvalidEntry(String),
}

/// 交易类型 (EIP-2718 类型字节)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxType {
    /// 类型 0，单一 gasPrice
    Legacy,
    /// 类型 2，动态费用
    Eip1559,
}

impl TxType {
    pub fn from_type_byte(value: u8) -> Result<Self, TransactionError> {
        match value {
            0 => Ok(TxType::Legacy),
            2 => Ok(TxType::Eip1559),
            other => Err(TransactionError::UnsupportedType(other)),
        }
    }

    pub fn type_byte(&self) -> u8 {
        match self {
            TxType::Legacy => 0,
            TxType::Eip1559 => 2,
        }
    }
}

/// 费用字段，由交易类型决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeFields {
    Legacy {
        gas_price: U256,
    },
    Eip1559 {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
}

/// 交易字段表 (外部输入格式，所有字段可选)
///
/// 字段名与 JSON-RPC 交易对象一致 (`gas`, `maxFeePerGas`, `chainId`, `type` ...)，
/// 通过 `Transaction::try_from` 做类型校验后才能使用。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    #[serde(
        default,
        deserialize_with = "quantity::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
    #[serde(
        default,
        alias = "gasLimit",
        deserialize_with = "quantity::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub gas: Option<U256>,
    #[serde(
        default,
        deserialize_with = "quantity::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub gas_price: Option<U256>,
    #[serde(
        default,
        deserialize_with = "quantity::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_fee_per_gas: Option<U256>,
    #[serde(
        default,
        deserialize_with = "quantity::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_priority_fee_per_gas: Option<U256>,
    #[serde(
        default,
        deserialize_with = "quantity::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub nonce: Option<U256>,
    #[serde(
        default,
        deserialize_with = "quantity::deserialize_opt_u64",
        skip_serializing_if = "Option::is_none"
    )]
    pub chain_id: Option<u64>,
    #[serde(
        rename = "type",
        default,
        deserialize_with = "quantity::deserialize_opt_u8",
        skip_serializing_if = "Option::is_none"
    )]
    pub tx_type: Option<u8>,
}

/// 经过校验的交易
///
/// 构建后不可修改；nonce、chainId 和费用字段在构建时即已固定。
/// EIP-1559 交易一定带 chainId；legacy 交易没有 chainId 时按 EIP-155 之前的方式签名。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    from: Option<Address>,
    to: Address,
    value: U256,
    data: Bytes,
    gas_limit: U256,
    fees: FeeFields,
    nonce: U256,
    chain_id: Option<u64>,
}

impl Transaction {
    /// 构建 EIP-1559 转账交易
    #[allow(clippy::too_many_arguments)]
    pub fn eip1559(
        to: Address,
        value: U256,
        gas_limit: U256,
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
        nonce: U256,
        chain_id: u64,
    ) -> Result<Self, TransactionError> {
        Self::try_from(TransactionParams {
            to: Some(to),
            value: Some(value),
            gas: Some(gas_limit),
            max_fee_per_gas: Some(max_fee_per_gas),
            max_priority_fee_per_gas: Some(max_priority_fee_per_gas),
            nonce: Some(nonce),
            chain_id: Some(chain_id),
            tx_type: Some(2),
            ..Default::default()
        })
    }

    /// 设置交易发送者 (签名时会校验与签名者一致)
    pub fn with_from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    pub fn from(&self) -> Option<Address> {
        self.from
    }

    pub fn to(&self) -> Address {
        self.to
    }

    pub fn value(&self) -> U256 {
        self.value
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn gas_limit(&self) -> U256 {
        self.gas_limit
    }

    pub fn fees(&self) -> FeeFields {
        self.fees
    }

    pub fn nonce(&self) -> U256 {
        self.nonce
    }

    pub fn chain_id(&self) -> Option<u64> {
        self.chain_id
    }

    pub fn tx_type(&self) -> TxType {
        match self.fees {
            FeeFields::Legacy { .. } => TxType::Legacy,
            FeeFields::Eip1559 { .. } => TxType::Eip1559,
        }
    }

    /// 转换为 ethers 的 TypedTransaction，`from` 为签名者地址
    pub fn to_typed(&self, from: Address) -> TypedTransaction {
        let mut typed: TypedTransaction = match self.fees {
            FeeFields::Legacy { gas_price } => TransactionRequest::new()
                .from(from)
                .to(self.to)
                .value(self.value)
                .data(self.data.clone())
                .gas(self.gas_limit)
                .gas_price(gas_price)
                .nonce(self.nonce)
                .into(),
            FeeFields::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => Eip1559TransactionRequest::new()
                .from(from)
                .to(self.to)
                .value(self.value)
                .data(self.data.clone())
                .gas(self.gas_limit)
                .max_fee_per_gas(max_fee_per_gas)
                .max_priority_fee_per_gas(max_priority_fee_per_gas)
                .nonce(self.nonce)
                .into(),
        };
        if let Some(chain_id) = self.chain_id {
            typed.set_chain_id(chain_id);
        }
        typed
    }
}

impl TryFrom<TransactionParams> for Transaction {
    type Error = TransactionError;

    fn try_from(params: TransactionParams) -> Result<Self, Self::Error> {
        let tx_type = TxType::from_type_byte(params.tx_type.ok_or(TransactionError::MissingType)?)?;
        let missing = |field| TransactionError::MissingField { field, tx_type };
        let forbidden = |field| TransactionError::ForbiddenField { field, tx_type };

        let chain_id = match tx_type {
            TxType::Legacy => params.chain_id,
            TxType::Eip1559 => Some(params.chain_id.ok_or_else(|| missing("chainId"))?),
        };

        let fees = match tx_type {
            TxType::Legacy => {
                if params.max_fee_per_gas.is_some() {
                    return Err(forbidden("maxFeePerGas"));
                }
                if params.max_priority_fee_per_gas.is_some() {
                    return Err(forbidden("maxPriorityFeePerGas"));
                }
                FeeFields::Legacy {
                    gas_price: params.gas_price.ok_or_else(|| missing("gasPrice"))?,
                }
            }
            TxType::Eip1559 => {
                if params.gas_price.is_some() {
                    return Err(forbidden("gasPrice"));
                }
                let max_fee = params.max_fee_per_gas.ok_or_else(|| missing("maxFeePerGas"))?;
                let priority_fee = params
                    .max_priority_fee_per_gas
                    .ok_or_else(|| missing("maxPriorityFeePerGas"))?;
                if priority_fee > max_fee {
                    return Err(TransactionError::PriorityFeeTooHigh {
                        max_fee,
                        priority_fee,
                    });
                }
                FeeFields::Eip1559 {
                    max_fee_per_gas: max_fee,
                    max_priority_fee_per_gas: priority_fee,
                }
            }
        };

        Ok(Self {
            from: params.from,
            to: params.to.ok_or_else(|| missing("to"))?,
            value: params.value.unwrap_or_default(),
            data: params.data.unwrap_or_default(),
            gas_limit: params.gas.ok_or_else(|| missing("gas"))?,
            fees,
            nonce: params.nonce.ok_or_else(|| missing("nonce"))?,
            chain_id,
        })
    }
}

impl From<&Transaction> for TransactionParams {
    fn from(tx: &Transaction) -> Self {
        let (gas_price, max_fee_per_gas, max_priority_fee_per_gas) = match tx.fees {
            FeeFields::Legacy { gas_price } => (Some(gas_price), None, None),
            FeeFields::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => (None, Some(max_fee_per_gas), Some(max_priority_fee_per_gas)),
        };
        Self {
            from: tx.from,
            to: Some(tx.to),
            value: Some(tx.value),
            data: (!tx.data.is_empty()).then(|| tx.data.clone()),
            gas: Some(tx.gas_limit),
            gas_price,
            max_fee_per_gas,
            max_priority_fee_per_gas,
            nonce: Some(tx.nonce),
            chain_id: tx.chain_id,
            tx_type: Some(tx.tx_type().type_byte()),
        }
    }
}

/// 签名后的交易 (原始字节)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignedTransaction {
    raw: Bytes,
    hash: H256,
}

/// 解码后的签名交易
#[derive(Debug, Clone)]
pub struct DecodedTransaction {
    pub tx: TypedTransaction,
    pub signature: Signature,
    /// 从签名恢复出的发送者
    pub sender: Address,
}

impl SignedTransaction {
    pub fn from_raw(raw: Bytes) -> Self {
        let hash = H256::from(keccak256(&raw));
        Self { raw, hash }
    }

    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// 交易哈希 keccak256(raw)
    pub fn hash(&self) -> H256 {
        self.hash
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.raw))
    }

    /// 解码原始字节并恢复发送者
    pub fn decode(&self) -> Result<DecodedTransaction, TransactionError> {
        if self.raw.is_empty() {
            return Err(TransactionError::Decode("empty payload".to_string()));
        }
        let (tx, signature) = TypedTransaction::decode_signed(&rlp::Rlp::new(&self.raw))
            .map_err(|e| TransactionError::Decode(e.to_string()))?;
        let sender = signature
            .recover(tx.sighash())
            .map_err(|e| TransactionError::Decode(e.to_string()))?;
        Ok(DecodedTransaction {
            tx,
            signature,
            sender,
        })
    }
}

impl From<Bytes> for SignedTransaction {
    fn from(raw: Bytes) -> Self {
        Self::from_raw(raw)
    }
}
