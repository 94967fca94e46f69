use std::time::Duration;

/// Tuning for distributed lock acquisition.
///
/// Defaults follow the usual Redlock client settings: an 8s lease, 32
/// attempts spaced 500ms apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConfig {
    /// Lease after which the coordinator frees a lock whose holder vanished.
    pub expiry: Duration,
    pub tries: u32,
    pub retry_delay: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            expiry: Duration::from_secs(8),
            tries: 32,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl LockConfig {
    /// Upper bound on how long a single acquisition may wait.
    pub fn acquire_budget(&self) -> Duration {
        self.retry_delay * self.tries.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_budget() {
        assert_eq!(LockConfig::default().acquire_budget(), Duration::from_secs(16));

        let config = LockConfig {
            tries: 0,
            retry_delay: Duration::from_millis(10),
            ..LockConfig::default()
        };
        assert_eq!(config.acquire_budget(), Duration::from_millis(10));
    }
}
