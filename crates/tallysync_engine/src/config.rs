//! Configuration for the sync engine.

use rand::Rng;
use std::time::Duration;
use tallysync_protocol::{EntityType, Priority};

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the remote API.
    pub base_url: String,
    /// Hard capacity of the pending mutation queue.
    pub queue_capacity: usize,
    /// Retry budget given to new mutations.
    pub default_max_retries: u32,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Interval for periodic background sync.
    pub sync_interval: Option<Duration>,
    /// Backoff between failed replays of the same mutation.
    pub retry: RetryConfig,
    /// Default priority per entity type.
    pub priorities: PriorityPolicy,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            queue_capacity: 100,
            default_max_retries: 3,
            request_timeout: Duration::from_secs(30),
            sync_interval: None,
            retry: RetryConfig::default(),
            priorities: PriorityPolicy::default(),
        }
    }

    /// Sets the queue capacity. A capacity of zero is raised to one.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Sets the retry budget of new mutations.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the sync interval for automatic sync.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the priority policy.
    pub fn with_priorities(mut self, priorities: PriorityPolicy) -> Self {
        self.priorities = priorities;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("")
    }
}

/// Configuration for backoff between failed replays.
///
/// The number of attempts is not configured here: it is the `max_retries`
/// of each mutation.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates the default backoff: 100 ms doubling up to 30 s, with jitter.
    pub fn new() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration where failed mutations are eligible again
    /// immediately.
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Disables jitter.
    pub fn without_jitter(mut self) -> Self {
        self.add_jitter = false;
        self
    }

    /// Calculates the delay after the `attempt`-th failure (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter && delay_secs > 0.0 {
            // Up to 25% jitter
            let jitter = delay_secs * rand::thread_rng().gen_range(0.0..0.25);
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Default drain priority per entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityPolicy {
    /// Priority of transaction writes.
    pub transaction: Priority,
    /// Priority of budget writes.
    pub budget: Priority,
    /// Priority of goal writes.
    pub goal: Priority,
    /// Priority of category writes.
    pub category: Priority,
    /// Priority of everything else.
    pub other: Priority,
}

impl PriorityPolicy {
    /// Returns the priority for `entity_type`.
    pub fn priority_for(&self, entity_type: EntityType) -> Priority {
        match entity_type {
            EntityType::Transaction => self.transaction,
            EntityType::Budget => self.budget,
            EntityType::Goal => self.goal,
            EntityType::Category => self.category,
            EntityType::Other => self.other,
        }
    }

    /// Overrides the priority for one entity type.
    pub fn with(mut self, entity_type: EntityType, priority: Priority) -> Self {
        let slot = match entity_type {
            EntityType::Transaction => &mut self.transaction,
            EntityType::Budget => &mut self.budget,
            EntityType::Goal => &mut self.goal,
            EntityType::Category => &mut self.category,
            EntityType::Other => &mut self.other,
        };
        *slot = priority;
        self
    }
}

impl Default for PriorityPolicy {
    fn default() -> Self {
        Self {
            transaction: Priority::High,
            budget: Priority::Medium,
            goal: Priority::Medium,
            category: Priority::Low,
            other: Priority::Low,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("https://api.example.com")
            .with_queue_capacity(50)
            .with_max_retries(5)
            .with_request_timeout(Duration::from_secs(10))
            .with_sync_interval(Duration::from_secs(300));

        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.queue_capacity, 50);
        assert_eq!(config.default_max_retries, 5);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.sync_interval, Some(Duration::from_secs(300)));
    }

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.default_max_retries, 3);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.sync_interval.is_none());
    }

    #[test]
    fn zero_capacity_is_raised() {
        assert_eq!(SyncConfig::default().with_queue_capacity(0).queue_capacity, 1);
    }

    #[test]
    fn immediate_retry_has_no_delay() {
        let config = RetryConfig::immediate();
        for attempt in 0..5 {
            assert_eq!(config.delay_for_attempt(attempt), Duration::ZERO);
        }
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new()
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);

        let delay1 = config.delay_for_attempt(1);
        assert!(delay1 >= Duration::from_millis(100));
        assert!(delay1 <= Duration::from_millis(125));

        let delay2 = config.delay_for_attempt(2);
        assert!(delay2 >= Duration::from_millis(200));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0)
            .without_jitter();

        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(5));
    }

    #[test]
    fn priority_policy() {
        let policy = PriorityPolicy::default();
        assert_eq!(policy.priority_for(EntityType::Transaction), Priority::High);
        assert_eq!(policy.priority_for(EntityType::Goal), Priority::Medium);
        assert_eq!(policy.priority_for(EntityType::Category), Priority::Low);

        let policy = policy.with(EntityType::Category, Priority::High);
        assert_eq!(policy.priority_for(EntityType::Category), Priority::High);
    }
}
