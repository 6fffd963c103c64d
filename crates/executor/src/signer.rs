//! 签名能力
//!
//! 交易签名 (有资金的发送账户) 与中继身份签名 (无资金的声誉账户) 是两个独立的接口，
//! 分别由 `SenderWallet` 和 `ReputationKey` 实现，不能互相替代。

use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Signature};
use ethers::utils::hash_message;
use models::{SignedTransaction, Transaction};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::types::BundleError;

/// 交易签名能力
pub trait TransactionSigner: Send + Sync {
    fn address(&self) -> Address;

    /// 签名一笔已校验的交易，返回原始字节
    fn sign_transaction(&self, tx: &Transaction) -> Result<SignedTransaction, BundleError>;
}

/// 中继身份签名能力 (EIP-191 personal message)
pub trait ReputationSigner: Send + Sync {
    fn address(&self) -> Address;

    fn sign_message(&self, message: &[u8]) -> Result<Signature, BundleError>;
}

/// 发送者钱包
#[derive(Clone)]
pub struct SenderWallet {
    wallet: LocalWallet,
}

impl SenderWallet {
    pub fn new(wallet: LocalWallet) -> Self {
        Self { wallet }
    }

    pub fn from_key(private_key: &str) -> Result<Self, BundleError> {
        let wallet = private_key
            .parse::<LocalWallet>()
            .map_err(|e| BundleError::Signing(format!("invalid sender key: {}", e)))?;
        Ok(Self::new(wallet))
    }
}

impl TransactionSigner for SenderWallet {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    fn sign_transaction(&self, tx: &Transaction) -> Result<SignedTransaction, BundleError> {
        let from = self.wallet.address();
        if let Some(declared) = tx.from() {
            if declared != from {
                return Err(BundleError::Signing(format!(
                    "transaction declares sender {:?}, wallet is {:?}",
                    declared, from
                )));
            }
        }

        let typed = tx.to_typed(from);
        let signature = match tx.chain_id() {
            Some(chain_id) => self
                .wallet
                .clone()
                .with_chain_id(chain_id)
                .sign_transaction_sync(&typed),
            // 无 chainId 的 legacy 交易: 不带重放保护，v = 27/28
            None => self.wallet.sign_hash(typed.sighash()),
        }
        .map_err(|e| BundleError::Signing(e.to_string()))?;

        Ok(SignedTransaction::from_raw(typed.rlp_signed(&signature)))
    }
}

impl fmt::Debug for SenderWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderWallet").field("address", &self.wallet.address()).finish()
    }
}

/// 中继声誉密钥
///
/// 只用于签名请求，向中继证明身份，不应持有资金。
#[derive(Clone)]
pub struct ReputationKey {
    wallet: LocalWallet,
}

impl ReputationKey {
    pub fn new(wallet: LocalWallet) -> Self {
        Self { wallet }
    }

    pub fn from_key(private_key: &str) -> Result<Self, BundleError> {
        let wallet = private_key
            .parse::<LocalWallet>()
            .map_err(|e| BundleError::Auth(format!("invalid reputation key: {}", e)))?;
        Ok(Self::new(wallet))
    }
}

impl ReputationSigner for ReputationKey {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    fn sign_message(&self, message: &[u8]) -> Result<Signature, BundleError> {
        self.wallet
            .sign_hash(hash_message(message))
            .map_err(|e| BundleError::Auth(e.to_string()))
    }
}

impl fmt::Debug for ReputationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReputationKey").field("address", &self.wallet.address()).finish()
    }
}

/// 按地址查找交易签名者
#[derive(Clone, Default)]
pub struct Keyring {
    signers: HashMap<Address, Arc<dyn TransactionSigner>>,
}

impl Keyring {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signer(mut self, signer: Arc<dyn TransactionSigner>) -> Self {
        self.insert(signer);
        self
    }

    pub fn insert(&mut self, signer: Arc<dyn TransactionSigner>) {
        self.signers.insert(signer.address(), signer);
    }

    pub fn get(&self, address: &Address) -> Option<&Arc<dyn TransactionSigner>> {
        self.signers.get(address)
    }

}

impl fmt::Debug for Keyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.signers.keys()).finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ethers::types::transaction::eip2718::TypedTransaction;
    use ethers::types::U256;

    /// anvil 默认账户 #0
    pub const SENDER_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    /// anvil 默认账户 #1
    pub const REPUTATION_KEY: &str =
        "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

    pub fn sender() -> SenderWallet {
        SenderWallet::from_key(SENDER_KEY).unwrap()
    }

    pub fn reputation() -> ReputationKey {
        ReputationKey::from_key(REPUTATION_KEY).unwrap()
    }

    pub fn transfer(nonce: u64) -> Transaction {
        Transaction::eip1559(
            "0x000000000000000000000000000000000000dead".parse().unwrap(),
            U256::exp10(15),
            U256::from(21000),
            U256::from(200) * U256::exp10(9),
            U256::from(50) * U256::exp10(9),
            U256::from(nonce),
            11155111,
        )
        .unwrap()
    }

    #[test]
    fn test_sign_then_decode_recovers_fields() {
        let wallet = sender();
        let tx = transfer(7);
        let signed = wallet.sign_transaction(&tx).unwrap();

        let decoded = signed.decode().unwrap();
        assert_eq!(decoded.sender, wallet.address());
        assert_eq!(decoded.tx.nonce(), Some(&tx.nonce()));
        assert_eq!(decoded.tx.value(), Some(&tx.value()));
        assert_eq!(decoded.tx.gas(), Some(&tx.gas_limit()));
        assert_eq!(decoded.tx.to_addr(), Some(&tx.to()));
        assert_eq!(decoded.tx.chain_id().map(|id| id.as_u64()), tx.chain_id());
        match decoded.tx {
            TypedTransaction::Eip1559(inner) => {
                assert_eq!(inner.max_fee_per_gas, Some(U256::from(200) * U256::exp10(9)));
                assert_eq!(inner.max_priority_fee_per_gas, Some(U256::from(50) * U256::exp10(9)));
            }
            other => panic!("expected EIP-1559, got {:?}", other),
        }
    }

    #[test]
    fn test_legacy_sign_then_decode() {
        let tx = Transaction::try_from(models::TransactionParams {
            to: Some(Address::repeat_byte(0x11)),
            value: Some(U256::from(5)),
            gas: Some(U256::from(21000)),
            gas_price: Some(U256::exp10(9)),
            nonce: Some(U256::from(3)),
            chain_id: Some(1),
            tx_type: Some(0),
            ..Default::default()
        })
        .unwrap();
        let wallet = sender();
        let decoded = wallet.sign_transaction(&tx).unwrap().decode().unwrap();
        assert_eq!(decoded.sender, wallet.address());
        assert_eq!(decoded.tx.gas_price(), Some(U256::exp10(9)));
        assert_eq!(decoded.tx.nonce(), Some(&U256::from(3)));
    }

    #[test]
    fn test_legacy_without_chain_id_signs_pre_eip155() {
        let tx = Transaction::try_from(models::TransactionParams {
            to: Some(Address::repeat_byte(0x11)),
            gas: Some(U256::from(21000)),
            gas_price: Some(U256::exp10(9)),
            nonce: Some(U256::zero()),
            tx_type: Some(0),
            ..Default::default()
        })
        .unwrap();
        let wallet = sender();
        let decoded = wallet.sign_transaction(&tx).unwrap().decode().unwrap();
        assert_eq!(decoded.sender, wallet.address());
        assert_eq!(decoded.tx.chain_id(), None);
        assert!(decoded.signature.v == 27 || decoded.signature.v == 28);
    }

    #[test]
    fn test_sign_rejects_foreign_sender() {
        let tx = transfer(0).with_from(Address::repeat_byte(0x42));
        assert!(matches!(sender().sign_transaction(&tx), Err(BundleError::Signing(_))));
    }

    #[test]
    fn test_reputation_signature_recovers() {
        let key = reputation();
        let signature = key.sign_message(b"hello relay").unwrap();
        assert_eq!(signature.recover(hash_message(b"hello relay")).unwrap(), key.address());
        assert_ne!(key.address(), sender().address());
    }

    #[test]
    fn test_keyring_lookup() {
        let wallet = sender();
        let keyring = Keyring::new().with_signer(Arc::new(wallet.clone()));
        assert!(keyring.get(&wallet.address()).is_some());
        assert!(keyring.get(&Address::zero()).is_none());
    }

    #[test]
    fn test_invalid_keys() {
        assert!(matches!(SenderWallet::from_key("not a key"), Err(BundleError::Signing(_))));
        assert!(matches!(ReputationKey::from_key("0x00"), Err(BundleError::Auth(_))));
    }
}
