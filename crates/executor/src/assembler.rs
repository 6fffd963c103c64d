//! Bundle 组装
//!
//! 把混合了预签名和待签名条目的 `Bundle` 解析为按顺序排列的签名交易。
//! 任一条目失败则整个 bundle 失败，此时不会发生任何网络调用。

use ethers::types::{Address, U256};
use models::{Bundle, BundleEntry, ResolvedBundle, SignedTransaction};
use std::collections::HashSet;
use tracing::debug;

use crate::signer::Keyring;
use crate::types::BundleError;

pub trait ResolveBundle {
    /// 按条目顺序签名，返回与输入等长、同序的签名交易
    fn resolve(&self, signers: &Keyring) -> Result<ResolvedBundle, BundleError>;
}

impl ResolveBundle for Bundle {
    fn resolve(&self, signers: &Keyring) -> Result<ResolvedBundle, BundleError> {
        if self.is_empty() {
            return Err(BundleError::Validation("bundle has no transactions".to_string()));
        }

        let mut txs = Vec::with_capacity(self.len());
        let mut seen_nonces: HashSet<(Address, U256)> = HashSet::with_capacity(self.len());

        for (index, entry) in self.entries().iter().enumerate() {
            let signed = resolve_entry(index, entry, signers)?;

            // 预签名条目也要解码，才能发现损坏的字节和重复的 nonce
            let decoded = signed
                .decode()
                .map_err(|e| BundleError::Validation(format!("entry {}: {}", index, e)))?;
            let nonce = decoded.tx.nonce().copied().unwrap_or_default();
            if !seen_nonces.insert((decoded.sender, nonce)) {
                return Err(BundleError::Validation(format!(
                    "entry {}: duplicate nonce {} for sender {:?}",
                    index, nonce, decoded.sender
                )));
            }

            debug!(
                "Bundle 条目 {}: sender={:?}, nonce={}, hash={:?}",
                index,
                decoded.sender,
                nonce,
                signed.hash()
            );
            txs.push(signed);
        }

        Ok(ResolvedBundle::new(txs))
    }
}

fn resolve_entry(
    index: usize,
    entry: &BundleEntry,
    signers: &Keyring,
) -> Result<SignedTransaction, BundleError> {
    match entry {
        BundleEntry::Signed(signed) => Ok(signed.clone()),
        BundleEntry::Unsigned {
            signer,
            transaction,
        } => {
            let wallet = signers.get(signer).ok_or_else(|| {
                BundleError::Signing(format!("entry {}: no signer registered for {:?}", index, signer))
            })?;
            wallet.sign_transaction(transaction).map_err(|e| match e {
                BundleError::Signing(msg) => BundleError::Signing(format!("entry {}: {}", index, msg)),
                other => other,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::tests::{sender, transfer};
    use crate::signer::TransactionSigner;
    use ethers::types::Bytes;
    use std::sync::Arc;

    fn keyring() -> Keyring {
        Keyring::new().with_signer(Arc::new(sender()))
    }

    #[test]
    fn test_mixed_bundle_preserves_order() {
        let wallet = sender();
        let presigned = wallet.sign_transaction(&transfer(5)).unwrap();
        let bundle = Bundle::new()
            .push_signed(presigned.clone())
            .push_unsigned(wallet.address(), transfer(6))
            .unwrap()
            .push_unsigned(wallet.address(), transfer(7))
            .unwrap();

        let resolved = bundle.resolve(&keyring()).unwrap();
        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved.transactions()[0], presigned);
        for (index, expected_nonce) in [5u64, 6, 7].into_iter().enumerate() {
            let decoded = resolved.transactions()[index].decode().unwrap();
            assert_eq!(decoded.sender, wallet.address());
            assert_eq!(decoded.tx.nonce(), Some(&U256::from(expected_nonce)));
        }
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let wallet = sender();
        let bundle = Bundle::new().push_unsigned(wallet.address(), transfer(1)).unwrap();
        let first = bundle.resolve(&keyring()).unwrap();
        let second = bundle.resolve(&keyring()).unwrap();
        assert_eq!(first.bundle_hash(), second.bundle_hash());
    }

    #[test]
    fn test_empty_bundle_rejected() {
        assert!(matches!(Bundle::new().resolve(&keyring()), Err(BundleError::Validation(_))));
    }

    #[test]
    fn test_unknown_signer_aborts_bundle() {
        let bundle = Bundle::new()
            .push_unsigned(sender().address(), transfer(0))
            .unwrap()
            .push_unsigned(Address::repeat_byte(0x99), transfer(1))
            .unwrap();
        assert!(matches!(bundle.resolve(&keyring()), Err(BundleError::Signing(_))));
    }

    #[test]
    fn test_malformed_presigned_entry_rejected() {
        let bundle = Bundle::new()
            .push_signed(SignedTransaction::from_raw(Bytes::from(vec![0x02, 0x01])));
        assert!(matches!(bundle.resolve(&keyring()), Err(BundleError::Validation(_))));
    }

    #[test]
    fn test_duplicate_nonce_rejected() {
        let wallet = sender();
        let presigned = wallet.sign_transaction(&transfer(3)).unwrap();
        let bundle = Bundle::new()
            .push_signed(presigned)
            .push_unsigned(wallet.address(), transfer(3))
            .unwrap();
        match bundle.resolve(&keyring()) {
            Err(BundleError::Validation(msg)) => assert!(msg.contains("duplicate nonce")),
            other => panic!("expected duplicate nonce error, got {:?}", other),
        }
    }
}
