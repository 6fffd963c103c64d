use anyhow::{bail, Context, Result};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// 进程级配置，启动时读取一次
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub wallet: WalletConfig,
    pub submission: SubmissionSettings,
    pub timeouts: TimeoutConfig,
    pub log: LogConfig,
}

/// 支持的网络
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Mainnet,
    Sepolia,
    Holesky,
    Goerli,
}

impl Network {
    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Mainnet => 1,
            Network::Goerli => 5,
            Network::Holesky => 17000,
            Network::Sepolia => 11155111,
        }
    }

    /// 默认的 Flashbots 中继
    pub fn relay_url(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://relay.flashbots.net",
            Network::Goerli => "https://relay-goerli.flashbots.net",
            Network::Holesky => "https://relay-holesky.flashbots.net",
            Network::Sepolia => "https://relay-sepolia.flashbots.net",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Sepolia => "sepolia",
            Network::Holesky => "holesky",
            Network::Goerli => "goerli",
        }
    }
}

impl FromStr for Network {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mainnet" | "ethereum" => Ok(Network::Mainnet),
            "sepolia" => Ok(Network::Sepolia),
            "holesky" => Ok(Network::Holesky),
            "goerli" => Ok(Network::Goerli),
            other => bail!("不支持的网络: {} (可选 mainnet/sepolia/holesky/goerli)", other),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub network: Network,
    pub chain_id: u64,
    pub provider_url: String,
    pub relay_url: String,
}

/// 私钥，Debug 输出时隐藏内容
#[derive(Clone)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(***)")
    }
}

#[derive(Debug, Clone)]
pub struct WalletConfig {
    /// 发送交易的账户 (需要资金)
    pub sender_key: SecretKey,
    /// 向中继证明身份的账户 (不需要资金)
    pub signer_key: SecretKey,
}

/// 重试上限设置，至少需要配置一项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeilingSettings {
    Attempts(u32),
    Deadline(Duration),
    AttemptsOrDeadline { attempts: u32, deadline: Duration },
    Unbounded,
}

#[derive(Debug, Clone)]
pub struct SubmissionSettings {
    /// 目标区块 = 当前区块 + lookahead_blocks
    pub lookahead_blocks: u64,
    pub poll_interval: Duration,
    pub block_time: Duration,
    pub ceiling: CeilingSettings,
    pub simulate_before_send: bool,
    pub max_consecutive_rpc_failures: u32,
}

#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    pub relay_request: Duration,
    pub rpc_request: Duration,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub dir: String,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        // 加载 .env 文件
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意键值来源解析配置
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        // 网络配置
        let network: Network = get("NETWORK")
            .unwrap_or_else(|| "sepolia".to_string())
            .parse()
            .context("Invalid NETWORK")?;
        let provider_url = get("PROVIDER_URL").context("PROVIDER_URL not set")?;
        let relay_url = get("FLASHBOTS_RELAY_URL").unwrap_or_else(|| network.relay_url().to_string());

        // 钱包配置
        let wallet = WalletConfig {
            sender_key: SecretKey::new(get("ETH_SENDER_KEY").context("ETH_SENDER_KEY not set")?),
            signer_key: SecretKey::new(get("ETH_SIGNER_KEY").context("ETH_SIGNER_KEY not set")?),
        };

        // 提交配置
        let lookahead_blocks: u64 = parse_or(&get, "LOOKAHEAD_BLOCKS", 10)?;
        if lookahead_blocks == 0 {
            bail!("LOOKAHEAD_BLOCKS 必须至少为 1");
        }

        let max_attempts: Option<u32> = parse_opt(&get, "MAX_ATTEMPTS")?;
        let deadline_secs: Option<u64> = parse_opt(&get, "DEADLINE_SECS")?;
        let unbounded: bool = parse_or(&get, "UNBOUNDED_RETRIES", false)?;
        let ceiling = match (max_attempts, deadline_secs, unbounded) {
            (Some(0), _, _) => bail!("MAX_ATTEMPTS 必须至少为 1"),
            (Some(attempts), Some(secs), _) => CeilingSettings::AttemptsOrDeadline {
                attempts,
                deadline: Duration::from_secs(secs),
            },
            (Some(attempts), None, _) => CeilingSettings::Attempts(attempts),
            (None, Some(secs), _) => CeilingSettings::Deadline(Duration::from_secs(secs)),
            (None, None, true) => CeilingSettings::Unbounded,
            (None, None, false) => bail!(
                "未配置重试上限: 请设置 MAX_ATTEMPTS 或 DEADLINE_SECS，或显式设置 UNBOUNDED_RETRIES=true"
            ),
        };

        let submission = SubmissionSettings {
            lookahead_blocks,
            poll_interval: Duration::from_millis(parse_or(&get, "POLL_INTERVAL_MS", 1000)?),
            block_time: Duration::from_secs(parse_or(&get, "BLOCK_TIME_SECS", 12)?),
            ceiling,
            simulate_before_send: parse_or(&get, "SIMULATE_BEFORE_SEND", false)?,
            max_consecutive_rpc_failures: parse_or(&get, "MAX_RPC_FAILURES", 5)?,
        };

        let timeouts = TimeoutConfig {
            relay_request: Duration::from_secs(parse_or(&get, "RELAY_TIMEOUT_SECS", 30)?),
            rpc_request: Duration::from_secs(parse_or(&get, "RPC_TIMEOUT_SECS", 15)?),
        };

        // 日志配置
        let log = LogConfig {
            level: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            dir: get("LOG_DIR").unwrap_or_else(|| "./logs".to_string()),
        };

        Ok(Self {
            network: NetworkConfig {
                network,
                chain_id: network.chain_id(),
                provider_url,
                relay_url,
            },
            wallet,
            submission,
            timeouts,
            log,
        })
    }
}

fn parse_opt<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    get(key)
        .map(|raw| raw.parse::<T>().with_context(|| format!("Invalid {}: {}", key, raw)))
        .transpose()
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(parse_opt(get, key)?.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let mut vars: HashMap<String, String> = [
            ("PROVIDER_URL", "http://127.0.0.1:8545"),
            ("ETH_SENDER_KEY", "0xaaaa"),
            ("ETH_SIGNER_KEY", "0xbbbb"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in pairs {
            vars.insert(k.to_string(), v.to_string());
        }
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_with_attempt_ceiling() {
        let config = load(&[("MAX_ATTEMPTS", "5")]).unwrap();
        assert_eq!(config.network.network, Network::Sepolia);
        assert_eq!(config.network.chain_id, 11155111);
        assert_eq!(config.network.relay_url, "https://relay-sepolia.flashbots.net");
        assert_eq!(config.submission.lookahead_blocks, 10);
        assert_eq!(config.submission.block_time, Duration::from_secs(12));
        assert_eq!(config.submission.poll_interval, Duration::from_secs(1));
        assert_eq!(config.submission.ceiling, CeilingSettings::Attempts(5));
        assert!(!config.submission.simulate_before_send);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_missing_ceiling_is_an_error() {
        let err = load(&[]).unwrap_err();
        assert!(err.to_string().contains("UNBOUNDED_RETRIES"));
        let config = load(&[("UNBOUNDED_RETRIES", "true")]).unwrap();
        assert_eq!(config.submission.ceiling, CeilingSettings::Unbounded);
    }

    #[test]
    fn test_combined_ceiling() {
        let config = load(&[("MAX_ATTEMPTS", "3"), ("DEADLINE_SECS", "120")]).unwrap();
        assert_eq!(
            config.submission.ceiling,
            CeilingSettings::AttemptsOrDeadline {
                attempts: 3,
                deadline: Duration::from_secs(120)
            }
        );
        let config = load(&[("DEADLINE_SECS", "60")]).unwrap();
        assert_eq!(config.submission.ceiling, CeilingSettings::Deadline(Duration::from_secs(60)));
    }

    #[test]
    fn test_network_presets_and_relay_override() {
        let config = load(&[("NETWORK", "Mainnet"), ("MAX_ATTEMPTS", "1")]).unwrap();
        assert_eq!(config.network.chain_id, 1);
        assert_eq!(config.network.relay_url, "https://relay.flashbots.net");

        let config = load(&[
            ("NETWORK", "holesky"),
            ("FLASHBOTS_RELAY_URL", "http://localhost:18545"),
            ("MAX_ATTEMPTS", "1"),
        ])
        .unwrap();
        assert_eq!(config.network.chain_id, 17000);
        assert_eq!(config.network.relay_url, "http://localhost:18545");

        assert!(load(&[("NETWORK", "bsc"), ("MAX_ATTEMPTS", "1")]).is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(load(&[("MAX_ATTEMPTS", "0")]).is_err());
        assert!(load(&[("MAX_ATTEMPTS", "many")]).is_err());
        assert!(load(&[("MAX_ATTEMPTS", "1"), ("LOOKAHEAD_BLOCKS", "0")]).is_err());
        assert!(load(&[("MAX_ATTEMPTS", "1"), ("SIMULATE_BEFORE_SEND", "yes")]).is_err());
    }

    #[test]
    fn test_missing_keys_and_redaction() {
        let vars: HashMap<&str, &str> = HashMap::from([("PROVIDER_URL", "http://x")]);
        let err = AppConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap_err();
        assert!(err.to_string().contains("ETH_SENDER_KEY"));

        let config = load(&[("MAX_ATTEMPTS", "1")]).unwrap();
        let debug = format!("{:?}", config.wallet);
        assert!(!debug.contains("aaaa"));
        assert_eq!(config.wallet.sender_key.expose(), "0xaaaa");
    }
}
