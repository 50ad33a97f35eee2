use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

/// Pause taken between two listing-index pages of the same source
#[async_trait]
pub trait DelayStrategy: Send + Sync {
    async fn pause(&self);
}

/// Base delay plus a uniform random jitter
#[derive(Debug, Clone)]
pub struct PolitenessDelay {
    pub base: Duration,
    pub jitter: Duration,
}

impl PolitenessDelay {
    pub fn new(base: Duration, jitter: Duration) -> Self {
        Self { base, jitter }
    }

    pub fn next_delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.base + Duration::from_millis(extra)
    }
}

impl Default for PolitenessDelay {
    fn default() -> Self {
        Self::new(Duration::from_millis(1500), Duration::from_millis(1000))
    }
}

#[async_trait]
impl DelayStrategy for PolitenessDelay {
    async fn pause(&self) {
        tokio::time::sleep(self.next_delay()).await;
    }
}

/// Returns immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

#[async_trait]
impl DelayStrategy for NoDelay {
    async fn pause(&self) {}
}
