use std::time::Duration;

use catbridge_core::RemoteId;
use catbridge_migration::{DEFAULT_LOG_CAPACITY, RetryPolicy, TemplatePolicy};

/// Migration engine tunables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Task-level retries before a task is marked failed and the run pauses.
    pub max_retries: u32,
    /// Linear backoff unit between task retries (`base × retry number`).
    pub retry_base_delay: Duration,
    /// Pause between two successful tasks.
    pub throttle: Duration,
    pub log_capacity: usize,
    /// Unit used when a template's local unit resolves to nothing.
    pub default_unit_id: RemoteId,
    pub default_category_id: RemoteId,
    pub template_policy: TemplatePolicy,
    /// Polling for asynchronous variant generation after template creation.
    pub variant_polling: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay: Duration::from_secs(2),
            throttle: Duration::from_millis(300),
            log_capacity: DEFAULT_LOG_CAPACITY,
            default_unit_id: 1,
            default_category_id: 1,
            template_policy: TemplatePolicy::AlwaysCreate,
            variant_polling: RetryPolicy::exponential(5, Duration::from_secs(1), Duration::from_secs(8)),
        }
    }
}

impl EngineConfig {
    /// Same limits as the default, with every delay set to zero (tests/dev).
    pub fn immediate() -> Self {
        Self {
            retry_base_delay: Duration::ZERO,
            throttle: Duration::ZERO,
            variant_polling: RetryPolicy::fixed(5, Duration::ZERO),
            ..Self::default()
        }
    }

    pub fn with_template_policy(mut self, policy: TemplatePolicy) -> Self {
        self.template_policy = policy;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn task_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::linear(self.max_retries, self.retry_base_delay)
    }
}
