//! 错误恢复引擎
//!
//! 把「睡眠后 continue」的隐式重试显式化为 RetryPolicy（最大次数 + 退避），
//! 根据 AgentError 与已尝试次数返回 RecoveryAction，供研究循环决定重试、结束还是终止。

use std::time::Duration;

use crate::config::RetrySection;
use crate::core::{AgentError, RecoveryAction};

/// 单轮重试策略；max_attempts 为 None 表示不限次数（只受外层轮次预算约束）
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: Option<u32>,
    pub delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn unbounded(delay: Duration) -> Self {
        Self {
            max_attempts: None,
            delay,
            backoff_factor: 1.0,
            max_delay: delay,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn with_backoff(mut self, factor: f64, max_delay: Duration) -> Self {
        self.backoff_factor = factor.max(1.0);
        self.max_delay = max_delay.max(self.delay);
        self
    }

    /// 第 attempt 次失败（从 1 开始）后是否还允许重试
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }

    /// 第 attempt 次失败后的等待时间：delay * factor^(attempt-1)，不超过 max_delay
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32) as i32;
        let secs = self.delay.as_secs_f64() * self.backoff_factor.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped.max(0.0)).unwrap_or(self.max_delay)
    }
}

/// 配置中的秒数转为 Duration；负数按 0 处理，inf 或溢出为配置错误
pub fn duration_from_secs(key: &str, secs: f64) -> Result<Duration, AgentError> {
    Duration::try_from_secs_f64(secs.max(0.0))
        .map_err(|e| AgentError::ConfigError(format!("{key} = {secs}: {e}")))
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unbounded(Duration::from_secs(10))
    }
}

impl TryFrom<&RetrySection> for RetryPolicy {
    type Error = AgentError;

    fn try_from(cfg: &RetrySection) -> Result<Self, Self::Error> {
        let policy = RetryPolicy::unbounded(duration_from_secs("agent.retry.delay_secs", cfg.delay_secs)?)
            .with_backoff(
                cfg.backoff_factor,
                duration_from_secs("agent.retry.max_delay_secs", cfg.max_delay_secs)?,
            );
        Ok(match cfg.max_attempts {
            Some(n) => policy.with_max_attempts(n),
            None => policy,
        })
    }
}

/// 错误 -> 动作映射
#[derive(Debug, Default, Clone)]
pub struct RecoveryEngine {
    policy: RetryPolicy,
}

impl RecoveryEngine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// attempt：同一轮内第几次失败（从 1 开始）
    pub fn handle(&self, err: &AgentError, attempt: u32) -> RecoveryAction {
        if err.is_fatal() {
            return RecoveryAction::Abort;
        }
        if self.policy.allows(attempt) {
            RecoveryAction::RetryRound(self.policy.delay_for(attempt))
        } else {
            RecoveryAction::EndRun
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;

    #[test]
    fn test_recovery_json_parse_error_retries() {
        let engine = RecoveryEngine::new(RetryPolicy::unbounded(Duration::from_secs(10)));
        let err = AgentError::JsonParseError("no object".to_string());
        assert_eq!(
            engine.handle(&err, 1),
            RecoveryAction::RetryRound(Duration::from_secs(10))
        );
        // 不限次数
        assert!(matches!(engine.handle(&err, 1_000), RecoveryAction::RetryRound(_)));
    }

    #[test]
    fn test_recovery_llm_error_retries() {
        let engine = RecoveryEngine::default();
        let err = AgentError::LlmError(LlmError::RateLimited { retry_after_ms: 1000 });
        assert!(matches!(engine.handle(&err, 1), RecoveryAction::RetryRound(_)));
    }

    #[test]
    fn test_recovery_fatal_aborts() {
        let engine = RecoveryEngine::default();
        let err = AgentError::MissingCredentials("LLM_API_KEY".to_string());
        assert_eq!(engine.handle(&err, 1), RecoveryAction::Abort);
        let err = AgentError::ConfigError("bad".to_string());
        assert_eq!(engine.handle(&err, 1), RecoveryAction::Abort);
    }

    #[test]
    fn test_recovery_bounded_policy_ends_run() {
        let policy = RetryPolicy::unbounded(Duration::ZERO).with_max_attempts(2);
        let engine = RecoveryEngine::new(policy);
        let err = AgentError::LlmError(LlmError::Network("reset".to_string()));
        assert!(matches!(engine.handle(&err, 1), RecoveryAction::RetryRound(_)));
        assert_eq!(engine.handle(&err, 2), RecoveryAction::EndRun);
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::unbounded(Duration::from_secs(2))
            .with_backoff(2.0, Duration::from_secs(10));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(4), Duration::from_secs(10));
        assert_eq!(policy.delay_for(40), Duration::from_secs(10));
    }

    #[test]
    fn test_policy_from_config() {
        let cfg = RetrySection {
            max_attempts: Some(3),
            delay_secs: 1.0,
            backoff_factor: 3.0,
            max_delay_secs: 5.0,
        };
        let policy = RetryPolicy::try_from(&cfg).unwrap();
        assert_eq!(policy.max_attempts, Some(3));
        assert_eq!(policy.delay_for(2), Duration::from_secs(3));
        assert_eq!(policy.delay_for(3), Duration::from_secs(5));
    }

    #[test]
    fn test_infinite_delay_is_config_error() {
        let cfg = RetrySection {
            max_attempts: None,
            delay_secs: f64::INFINITY,
            backoff_factor: 2.0,
            max_delay_secs: 60.0,
        };
        assert!(matches!(
            RetryPolicy::try_from(&cfg),
            Err(AgentError::ConfigError(_))
        ));
        assert!(duration_from_secs("x", 1e300).is_err());
        assert_eq!(duration_from_secs("x", -1.0).unwrap(), Duration::ZERO);
    }
}
