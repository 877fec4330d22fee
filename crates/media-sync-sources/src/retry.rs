use async_trait::async_trait;
use std::time::Duration;

/// Bounded-attempt policy for the Trakt request executor
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Wait used when a 429 carries no parseable `Retry-After`
    pub default_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            default_retry_after: Duration::from_secs(1),
        }
    }
}

/// Source of backoff delays. Production code sleeps on the tokio timer;
/// tests record the requested durations instead.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records every requested sleep and returns immediately
    #[derive(Debug, Default)]
    pub struct RecordingSleeper {
        pub slept: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub fn total(&self) -> Duration {
            self.slept.lock().unwrap().iter().sum()
        }

        pub fn count(&self) -> usize {
            self.slept.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }
}
