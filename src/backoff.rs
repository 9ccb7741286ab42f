//! Jittered exponential backoff for the bootstrap connect scheduler.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryOptions;

pub struct Backoff {
    opts: RetryOptions,
    attempt: u32,
}

impl Backoff {
    pub fn new(opts: RetryOptions) -> Self {
        Backoff { opts, attempt: 0 }
    }

    /// The delay before the next retry, or `None` once `opts.retries` have
    /// been exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.opts.retries {
            return None;
        }

        let base = self.opts.min_timeout.as_millis() as f64 * self.opts.factor.powi(self.attempt as i32);
        let capped = base.min(self.opts.max_timeout.as_millis() as f64);
        let millis = if self.opts.randomize && capped > 0.0 {
            rand::thread_rng().gen_range((capped * 0.5)..=capped)
        } else {
            capped
        };

        self.attempt += 1;
        Some(Duration::from_millis(millis as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_after_configured_retry_count() {
        let mut backoff = Backoff::new(RetryOptions { retries: 3, randomize: false, ..RetryOptions::default() });
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());
    }

    #[test]
    fn delay_grows_by_the_configured_factor_without_jitter() {
        let mut backoff = Backoff::new(RetryOptions {
            retries: 3,
            factor: 2.0,
            min_timeout: Duration::from_millis(100),
            max_timeout: Duration::from_secs(60),
            randomize: false,
        });
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(400)));
    }

    #[test]
    fn delay_never_exceeds_max_timeout() {
        let mut backoff = Backoff::new(RetryOptions {
            retries: 10,
            factor: 10.0,
            min_timeout: Duration::from_millis(100),
            max_timeout: Duration::from_millis(500),
            randomize: false,
        });
        for _ in 0..10 {
            let delay = backoff.next_delay().unwrap();
            assert!(delay <= Duration::from_millis(500));
        }
    }
}
