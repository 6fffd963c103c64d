//! 中继请求签名
//!
//! Flashbots 要求: signMessage(keccak256(body).toHex())
//! 即对请求体 keccak256 哈希的十六进制字符串做 EIP-191 签名，
//! 请求头格式为 `{signer_address}:{signature}`。

use ethers::types::{Address, Signature};
use ethers::utils::{hash_message, keccak256};

use crate::signer::ReputationSigner;
use crate::types::BundleError;

/// 签名请求头名称
pub const FLASHBOTS_SIGNATURE_HEADER: &str = "X-Flashbots-Signature";

/// 被签名的消息: "0x" + hex(keccak256(body))
pub fn body_digest_message(body: &[u8]) -> String {
    format!("0x{}", hex::encode(keccak256(body)))
}

/// 为请求体生成 X-Flashbots-Signature 请求头的值
///
/// 每个请求都重新计算，不能复用。
pub fn sign_payload<S: ReputationSigner + ?Sized>(
    signer: &S,
    body: &[u8],
) -> Result<String, BundleError> {
    let message = body_digest_message(body);
    let signature = signer.sign_message(message.as_bytes())?;

    // r (32) + s (32) + v (1) = 65 bytes，v 必须是 27 或 28
    let mut sig_bytes = signature.to_vec();
    if sig_bytes.len() != 65 {
        return Err(BundleError::Auth(format!(
            "unexpected signature length {}",
            sig_bytes.len()
        )));
    }
    if sig_bytes[64] < 27 {
        sig_bytes[64] += 27;
    }

    Ok(format!(
        "0x{}:0x{}",
        hex::encode(signer.address().as_bytes()),
        hex::encode(&sig_bytes)
    ))
}

/// 从请求头恢复签名者地址，并校验与声明的地址一致
pub fn recover_signer(header: &str, body: &[u8]) -> Result<Address, BundleError> {
    let (address, signature) = header
        .split_once(':')
        .ok_or_else(|| BundleError::Auth("header must be <address>:<signature>".to_string()))?;

    let declared: Address = address
        .parse()
        .map_err(|_| BundleError::Auth(format!("invalid signer address: {}", address)))?;
    let sig_bytes = hex::decode(signature.trim_start_matches("0x"))
        .map_err(|e| BundleError::Auth(format!("invalid signature hex: {}", e)))?;
    let signature = Signature::try_from(sig_bytes.as_slice())
        .map_err(|e| BundleError::Auth(e.to_string()))?;

    let recovered = signature
        .recover(hash_message(body_digest_message(body)))
        .map_err(|e| BundleError::Auth(e.to_string()))?;

    if recovered != declared {
        return Err(BundleError::Auth(format!(
            "signature recovers to {:?}, header declares {:?}",
            recovered, declared
        )));
    }
    Ok(recovered)
}
