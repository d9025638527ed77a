// Copyright (c) Microsoft. All rights reserved.

use std::time::Duration;

const BACKOFF_MULTIPLIER: u32 = 2;
const MAX_BACKOFF_MULTIPLE: u32 = 8;

/// Multiplicative backoff driving a retry cadence. The first wait is always
/// the base interval; every call to `next_wait` doubles the following wait
/// up to eight times the base, and `reset` restores the base after a
/// successful attempt.
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    #[must_use]
    pub fn new(base: Duration) -> Self {
        Backoff {
            base,
            max: base * MAX_BACKOFF_MULTIPLE,
            current: base,
        }
    }

    pub fn next_wait(&mut self) -> Duration {
        let wait = self.current;
        self.current = (self.current * BACKOFF_MULTIPLIER).min(self.max);
        wait
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_wait_is_the_base_interval() {
        let mut backoff = Backoff::new(Duration::from_secs(5));

        assert_eq!(backoff.next_wait(), Duration::from_secs(5));
    }

    #[test]
    fn wait_doubles_on_every_failed_attempt() {
        let mut backoff = Backoff::new(Duration::from_secs(5));

        assert_eq!(backoff.next_wait(), Duration::from_secs(5));
        assert_eq!(backoff.next_wait(), Duration::from_secs(10));
        assert_eq!(backoff.next_wait(), Duration::from_secs(20));
    }

    #[test]
    fn wait_never_exceeds_eight_times_the_base() {
        let mut backoff = Backoff::new(Duration::from_secs(5));

        for _ in 0..10 {
            backoff.next_wait();
        }

        assert_eq!(backoff.next_wait(), Duration::from_secs(40));
    }

    #[test]
    fn reset_restores_the_base_interval() {
        let mut backoff = Backoff::new(Duration::from_secs(5));

        backoff.next_wait();
        backoff.next_wait();
        backoff.reset();

        assert_eq!(backoff.next_wait(), Duration::from_secs(5));
    }
}
