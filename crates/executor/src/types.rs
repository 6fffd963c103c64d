//! 执行器类型定义

use ethers::types::H256;
use models::TransactionError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Bundle 生命周期错误
///
/// "尚未上链" 不是错误，由 `InclusionResult::NotFound` 表达。
#[derive(Debug, Error)]
pub enum BundleError {
    /// 交易字段不合法，发生在任何网络调用之前
    #[error("Invalid bundle: {0}")]
    Validation(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    /// 无法生成 X-Flashbots-Signature 请求头
    #[error("Relay authentication failed: {0}")]
    Auth(String),

    /// 连接失败、超时、非 2xx 响应或无法解析的响应
    #[error("Relay unavailable: {0}")]
    RelayTransport(String),

    /// 中继返回了 JSON-RPC error 对象
    #[error("Relay rejected request: {code} - {message}")]
    RelayProtocol { code: i64, message: String },

    #[error("Bundle simulation failed: {0}")]
    SimulationFailed(String),

    #[error("Chain RPC error: {0}")]
    ChainRpc(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl BundleError {
    /// 可以在下一轮重试的中继错误
    pub fn is_relay_transport(&self) -> bool {
        matches!(self, BundleError::RelayTransport(_))
    }
}

impl From<TransactionError> for BundleError {
    fn from(err: TransactionError) -> Self {
        BundleError::Validation(err.to_string())
    }
}

/// 提交状态机的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Building,
    Simulated,
    Submitted,
    Monitoring,
    Included,
    Retrying,
    Abandoned,
}

impl fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubmissionState::Building => "Building",
            SubmissionState::Simulated => "Simulated",
            SubmissionState::Submitted => "Submitted",
            SubmissionState::Monitoring => "Monitoring",
            SubmissionState::Included => "Included",
            SubmissionState::Retrying => "Retrying",
            SubmissionState::Abandoned => "Abandoned",
        };
        f.write_str(name)
    }
}

/// 重试上限 (必须显式配置)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCeiling {
    /// 最多尝试次数
    Attempts(u32),
    /// 从第一次尝试开始计算的最长时间，在两次尝试之间检查
    Deadline(Duration),
    /// 任一条件满足即放弃
    AttemptsOrDeadline { attempts: u32, deadline: Duration },
    /// 无限重试，直到上链或被取消
    Unbounded,
}

impl RetryCeiling {
    /// 开始第 `completed + 1` 次尝试前检查是否已达上限
    pub fn reached(&self, completed: u32, elapsed: Duration) -> Option<AbandonReason> {
        let attempts_hit = |max: u32| (completed >= max).then_some(AbandonReason::AttemptsExhausted(max));
        let deadline_hit =
            |limit: Duration| (elapsed >= limit).then_some(AbandonReason::DeadlineExceeded(limit));
        match *self {
            RetryCeiling::Attempts(max) => attempts_hit(max),
            RetryCeiling::Deadline(limit) => deadline_hit(limit),
            RetryCeiling::AttemptsOrDeadline { attempts, deadline } => {
                attempts_hit(attempts).or_else(|| deadline_hit(deadline))
            }
            RetryCeiling::Unbounded => None,
        }
    }
}

/// 放弃原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbandonReason {
    Cancelled,
    AttemptsExhausted(u32),
    DeadlineExceeded(Duration),
}

impl fmt::Display for AbandonReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbandonReason::Cancelled => write!(f, "cancelled by caller"),
            AbandonReason::AttemptsExhausted(max) => write!(f, "not included after {} attempts", max),
            AbandonReason::DeadlineExceeded(limit) => {
                write!(f, "not included within {}s", limit.as_secs())
            }
        }
    }
}

/// 单次尝试的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResult {
    Included { block_number: u64, tx_hash: H256 },
    NotIncluded,
    /// 中继传输失败，本轮没有确认
    RelayUnavailable(String),
    Cancelled,
}

/// 单次尝试记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptReport {
    pub attempt: u32,
    pub head_block: u64,
    pub target_block: u64,
    pub bundle_hash: H256,
    pub result: AttemptResult,
}

/// 一个提交生命周期的最终结果
#[derive(Debug, Clone)]
pub enum SubmissionOutcome {
    Included {
        replacement_uuid: Uuid,
        bundle_hash: H256,
        block_number: u64,
        tx_hash: H256,
        attempts: Vec<AttemptReport>,
    },
    Abandoned {
        replacement_uuid: Uuid,
        reason: AbandonReason,
        attempts: Vec<AttemptReport>,
    },
}

impl SubmissionOutcome {
    pub fn replacement_uuid(&self) -> Uuid {
        match self {
            SubmissionOutcome::Included { replacement_uuid, .. }
            | SubmissionOutcome::Abandoned { replacement_uuid, .. } => *replacement_uuid,
        }
    }

    pub fn attempts(&self) -> &[AttemptReport] {
        match self {
            SubmissionOutcome::Included { attempts, .. }
            | SubmissionOutcome::Abandoned { attempts, .. } => attempts,
        }
    }

    pub fn state(&self) -> SubmissionState {
        match self {
            SubmissionOutcome::Included { .. } => SubmissionState::Included,
            SubmissionOutcome::Abandoned { .. } => SubmissionState::Abandoned,
        }
    }
}
