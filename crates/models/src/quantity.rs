//! JSON 数量字段的反序列化
//!
//! 节点、中继和手写的 bundle 文件对同一个数量有不同写法:
//! JSON 整数 (`21000`)、十六进制字符串 (`"0x5208"`) 或十进制字符串 (`"21000"`)。
//! 这里统一解析为 `U256`，再按字段需要收窄为 `u64` / `u8`。

use ethers::types::U256;
use serde::de::{self, Deserializer, Visitor};
use std::fmt;

struct QuantityVisitor;

impl<'de> Visitor<'de> for QuantityVisitor {
    type Value = U256;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a quantity as an integer, a 0x-prefixed hex string or a decimal string")
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<U256, E> {
        Ok(U256::from(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<U256, E> {
        u64::try_from(value)
            .map(U256::from)
            .map_err(|_| E::custom(format!("quantity must not be negative: {}", value)))
    }

    fn visit_u128<E: de::Error>(self, value: u128) -> Result<U256, E> {
        Ok(U256::from(value))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<U256, E> {
        let trimmed = value.trim();
        let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
            Some("") => Ok(U256::zero()),
            Some(hex) => U256::from_str_radix(hex, 16).map_err(|e| e.to_string()),
            None => U256::from_dec_str(trimmed).map_err(|e| e.to_string()),
        };
        parsed.map_err(|e| E::custom(format!("invalid quantity `{}`: {}", value, e)))
    }
}

struct OptionalQuantityVisitor;

impl<'de> Visitor<'de> for OptionalQuantityVisitor {
    type Value = Option<U256>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an optional quantity")
    }

    fn visit_none<E: de::Error>(self) -> Result<Option<U256>, E> {
        Ok(None)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Option<U256>, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Option<U256>, D::Error> {
        deserialize(deserializer).map(Some)
    }
}

/// 解析为 `U256`
pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(QuantityVisitor)
}

/// 可缺省 / 可为 null 的 `U256`
pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<U256>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_option(OptionalQuantityVisitor)
}

/// 可缺省的 `u64` (如 chainId)
pub fn deserialize_opt_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    narrow(deserialize_opt(deserializer)?, u64::MAX.into(), |v| v.as_u64())
}

/// 可缺省的 `u8` (如交易类型)
pub fn deserialize_opt_u8<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    narrow(deserialize_opt(deserializer)?, u8::MAX.into(), |v| v.as_u32() as u8)
}

fn narrow<T, E: de::Error>(
    value: Option<U256>,
    max: U256,
    convert: impl Fn(U256) -> T,
) -> Result<Option<T>, E> {
    match value {
        Some(v) if v > max => Err(E::custom(format!("quantity {} out of range (max {})", v, max))),
        Some(v) => Ok(Some(convert(v))),
        None => Ok(None),
    }
}
