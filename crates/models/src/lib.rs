//! Bundle 数据模型
//!
//! - `transaction`: 单笔交易的类型化表示与签名字节
//! - `bundle`: Bundle 条目、已解析 Bundle、提交请求与上链结果
//! - `quantity`: 整数 / 十六进制 / 十进制字符串形式的数量字段解析

mod bundle;
pub mod quantity;
mod transaction;

pub use bundle::*;
pub use transaction::*;
