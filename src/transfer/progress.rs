//! Transfer progress reporting.
//!
//! Progress flows through a `watch` channel, so a slow subscriber always
//! observes the latest value instead of a growing backlog. Byte-level
//! updates are throttled by the configured emission rate and a minimum
//! fraction step; terminal states and the final byte count always go out.
//! Speed and ETA come from an exponential moving average of the observed
//! rate.

#![expect(
    clippy::float_arithmetic,
    reason = "fractions, rates, and ETAs are inherently floating point"
)]
#![expect(
    clippy::cast_precision_loss,
    reason = "byte counts well below 2^52 lose nothing as f64"
)]

use std::time::Duration;

use camino::Utf8PathBuf;
use tokio::{sync::watch, time::Instant};

use crate::config::ClientConfig;

/// Minimum fraction advance between throttled emissions.
const MIN_FRACTION_STEP: f64 = 0.02;
/// Smoothing factor of the rate estimator.
const RATE_ALPHA: f64 = 0.3;

/// State of a transfer, as observed by a progress subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferProgress {
    /// The engine is setting up local state.
    Preparing,
    /// The transfer channel is being opened.
    Connecting,
    /// The handshake has been written.
    Connected,
    /// Payload bytes are moving.
    Transfer {
        /// Name of the item being transferred.
        name: String,
        /// Bytes transferred so far.
        bytes: u64,
        /// Declared total byte count.
        total: u64,
        /// `bytes / total`, clamped to `0.0..=1.0`.
        fraction: f64,
        /// Smoothed rate in bytes per second, once measurable.
        speed: Option<f64>,
        /// Estimated time remaining, once measurable.
        eta: Option<Duration>,
    },
    /// The transfer finished; downloads carry the destination path.
    Completed {
        /// Final on-disk location, for transfers that produce one.
        path: Option<Utf8PathBuf>,
    },
    /// The caller cancelled the transfer.
    Cancelled,
    /// The transfer failed.
    Failed {
        /// Human-readable failure description.
        message: String,
    },
}

/// Exponential-moving-average rate estimator.
#[derive(Debug)]
struct RateEstimator {
    rate: Option<f64>,
    last: Instant,
    last_bytes: u64,
}

impl RateEstimator {
    fn new(now: Instant) -> Self {
        Self {
            rate: None,
            last: now,
            last_bytes: 0,
        }
    }

    fn update(&mut self, now: Instant, bytes: u64) -> Option<f64> {
        let dt = now.duration_since(self.last).as_secs_f64();
        if dt <= 0.0 {
            return self.rate;
        }
        let delta = bytes.saturating_sub(self.last_bytes) as f64;
        let instantaneous = delta / dt;
        self.rate = Some(match self.rate {
            Some(rate) => RATE_ALPHA * instantaneous + (1.0 - RATE_ALPHA) * rate,
            None => instantaneous,
        });
        self.last = now;
        self.last_bytes = bytes;
        self.rate
    }
}

/// Producer side of a transfer's progress channel.
#[derive(Debug)]
pub(crate) struct ProgressSender {
    tx: watch::Sender<TransferProgress>,
    min_interval: Duration,
    last_emit: Option<Instant>,
    last_fraction: f64,
    rate: RateEstimator,
}

impl ProgressSender {
    /// Create a progress channel starting in [`TransferProgress::Preparing`].
    pub(crate) fn new(config: &ClientConfig) -> (Self, watch::Receiver<TransferProgress>) {
        let (tx, rx) = watch::channel(TransferProgress::Preparing);
        (
            Self {
                tx,
                min_interval: config.progress_interval(),
                last_emit: None,
                last_fraction: 0.0,
                rate: RateEstimator::new(Instant::now()),
            },
            rx,
        )
    }

    /// Emit a state change unconditionally.
    pub(crate) fn state(&self, progress: TransferProgress) {
        let _: Result<_, _> = self.tx.send(progress);
    }

    /// Emit a throttled byte-count update.
    ///
    /// The final update (`bytes == total`) always goes out so subscribers
    /// observe a fraction of 1.0 before [`TransferProgress::Completed`].
    pub(crate) fn transferred(&mut self, name: &str, bytes: u64, total: u64) {
        let now = Instant::now();
        let fraction = if total == 0 {
            1.0
        } else {
            (bytes as f64 / total as f64).min(1.0)
        };
        let done = bytes >= total;
        if !done {
            if let Some(last) = self.last_emit {
                if now.duration_since(last) < self.min_interval
                    || fraction - self.last_fraction < MIN_FRACTION_STEP
                {
                    return;
                }
            }
        }
        let speed = self.rate.update(now, bytes);
        let eta = speed.and_then(|rate| {
            if rate > 0.0 && !done {
                Some(Duration::from_secs_f64(
                    (total.saturating_sub(bytes)) as f64 / rate,
                ))
            } else {
                None
            }
        });
        self.last_emit = Some(now);
        self.last_fraction = fraction;
        self.state(TransferProgress::Transfer {
            name: name.to_owned(),
            bytes,
            total,
            fraction,
            speed,
            eta,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> ClientConfig {
        ClientConfig {
            progress_emit_hz: 1000,
            ..ClientConfig::default()
        }
    }

    #[tokio::test]
    async fn final_update_always_reaches_one() {
        let (mut sender, rx) = ProgressSender::new(&fast_config());
        sender.transferred("readme.txt", 1234, 1234);
        match rx.borrow().clone() {
            TransferProgress::Transfer {
                bytes,
                total,
                fraction,
                ..
            } => {
                assert_eq!(bytes, 1234);
                assert_eq!(total, 1234);
                assert!((fraction - 1.0).abs() < f64::EPSILON);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_total_counts_as_complete() {
        let (mut sender, rx) = ProgressSender::new(&fast_config());
        sender.transferred("empty", 0, 0);
        match rx.borrow().clone() {
            TransferProgress::Transfer { fraction, .. } => {
                assert!((fraction - 1.0).abs() < f64::EPSILON);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn intermediate_updates_are_throttled_by_fraction() {
        let (mut sender, rx) = ProgressSender::new(&fast_config());
        sender.transferred("big", 100, 10_000);
        sender.transferred("big", 101, 10_000); // < 2% ahead, coalesced
        match rx.borrow().clone() {
            TransferProgress::Transfer { bytes, .. } => assert_eq!(bytes, 100),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn subscribers_observe_latest_value_only() {
        let (mut sender, mut rx) = ProgressSender::new(&fast_config());
        sender.transferred("big", 5_000, 10_000);
        sender.transferred("big", 10_000, 10_000);
        rx.changed().await.unwrap();
        match rx.borrow_and_update().clone() {
            TransferProgress::Transfer { bytes, .. } => assert_eq!(bytes, 10_000),
            other => panic!("unexpected {other:?}"),
        }
    }
}
