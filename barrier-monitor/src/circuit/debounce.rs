//! Filters raw samples so a changed value only counts once it has held
//! for a debounce window.
//!
//! # State Machine
//!
//! ```text
//!            sample != stable                 held >= window
//!  Stable ───────────────────► Pending(v, t) ───────────────► Stable(v)
//!    ▲                               │
//!    │      sample == stable         │
//!    └───────────────────────────────┘
//! ```
//!
//! With a zero window the first differing sample is accepted immediately,
//! which is how an undebounced input behaves.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct Debouncer<T> {
    window: Duration,
    stable: T,
    pending: Option<(T, Instant)>,
}

impl<T: Copy + PartialEq> Debouncer<T> {
    pub fn new(initial: T, window: Duration) -> Self {
        Self {
            window,
            stable: initial,
            pending: None,
        }
    }

    /// Last accepted value.
    pub fn stable(&self) -> T {
        self.stable
    }

    /// Whether a differing value is currently being timed.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Feed one sample taken at `now`.
    ///
    /// Returns the new stable value when this sample completes a change,
    /// `None` otherwise.
    pub fn update(&mut self, sample: T, now: Instant) -> Option<T> {
        if sample == self.stable {
            self.pending = None;
            return None;
        }

        let since = match self.pending {
            Some((candidate, since)) if candidate == sample => since,
            _ => {
                self.pending = Some((sample, now));
                now
            }
        };

        if now.saturating_duration_since(since) >= self.window {
            self.stable = sample;
            self.pending = None;
            Some(sample)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(300);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn zero_window_accepts_first_change() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(false, Duration::ZERO);
        assert_eq!(d.update(true, t0), Some(true));
        assert!(d.stable());
        assert_eq!(d.update(true, t0 + ms(100)), None);
        assert_eq!(d.update(false, t0 + ms(200)), Some(false));
    }

    #[test]
    fn change_accepted_after_window() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(false, WINDOW);
        assert_eq!(d.update(true, t0), None);
        assert!(d.is_pending());
        assert_eq!(d.update(true, t0 + ms(200)), None);
        assert_eq!(d.update(true, t0 + ms(300)), Some(true));
        assert!(!d.is_pending());
    }

    #[test]
    fn glitch_shorter_than_window_is_ignored() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(false, WINDOW);
        assert_eq!(d.update(true, t0), None);
        assert_eq!(d.update(false, t0 + ms(100)), None);
        assert!(!d.is_pending());

        // A new episode needs its own full window.
        assert_eq!(d.update(true, t0 + ms(200)), None);
        assert_eq!(d.update(true, t0 + ms(400)), None);
        assert_eq!(d.update(true, t0 + ms(500)), Some(true));
    }

    #[test]
    fn stable_samples_are_silent() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(7u8, WINDOW);
        for i in 0..10 {
            assert_eq!(d.update(7, t0 + ms(i * 100)), None);
        }
    }

    #[test]
    fn new_candidate_restarts_timing() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(0u8, WINDOW);
        assert_eq!(d.update(1, t0), None);
        assert_eq!(d.update(2, t0 + ms(200)), None);
        assert_eq!(d.update(2, t0 + ms(400)), None);
        assert_eq!(d.update(2, t0 + ms(500)), Some(2));
    }
}
