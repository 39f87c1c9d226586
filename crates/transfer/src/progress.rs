use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use cinevision_protocol::ProgressSnapshot;

use crate::UploadSession;

/// Callback invoked with upload progress.
pub type ProgressCallback = Arc<dyn Fn(ProgressSnapshot) + Send + Sync>;

/// Builds progress snapshots for a session and forwards them to a callback.
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    speed: SpeedCalculator,
    // Held while a snapshot is built and delivered so callbacks see
    // monotonic counters when several workers report at once.
    delivery: Mutex<()>,
}

impl ProgressReporter {
    pub fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            callback,
            speed: SpeedCalculator::new(None, None),
            delivery: Mutex::new(()),
        }
    }

    /// Records `bytes` accepted by storage just now.
    pub fn record_bytes(&self, bytes: u64) {
        self.speed.add_sample(bytes);
    }

    /// Computes the current snapshot for `session`.
    pub fn snapshot(&self, session: &UploadSession) -> ProgressSnapshot {
        let plan = session.plan();
        let transferred = session.bytes_transferred();
        let remaining = plan.file_size().saturating_sub(transferred);
        ProgressSnapshot {
            upload_id: session.id(),
            bytes_transferred: transferred,
            total_bytes: plan.file_size(),
            parts_completed: session.parts_completed(),
            total_parts: plan.total_parts(),
            elapsed_ms: session.elapsed().as_millis() as u64,
            bytes_per_second: self.speed.bytes_per_second(),
            eta_secs: self.speed.eta(remaining).map(|d| d.as_secs()),
        }
    }

    /// Sends a snapshot to the callback, if any.
    pub fn report(&self, session: &UploadSession) {
        if let Some(cb) = &self.callback {
            let _guard = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
            cb(self.snapshot(session));
        }
    }
}

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Calculates transfer speed using a sliding window of samples.
pub struct SpeedCalculator {
    inner: Mutex<SpeedInner>,
}

struct SpeedInner {
    started: Instant,
    samples: Vec<SpeedSample>,
    max_samples: usize,
    window_size: Duration,
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window_size`: time window for speed calculation (default 60 s;
    ///   parts are large, so samples arrive seconds apart).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window_size: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(SpeedInner {
                started: Instant::now(),
                samples: Vec::new(),
                max_samples: max_samples.unwrap_or(100),
                window_size: window_size.unwrap_or(Duration::from_secs(60)),
            }),
        }
    }

    /// Records a sample of `bytes` transferred at the current instant.
    pub fn add_sample(&self, bytes: u64) {
        let mut s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        s.samples.push(SpeedSample {
            bytes,
            timestamp: now,
        });

        // Prune samples outside the window.
        if let Some(cutoff) = now.checked_sub(s.window_size) {
            s.samples.retain(|sample| sample.timestamp >= cutoff);
        }

        if s.samples.len() > s.max_samples {
            let excess = s.samples.len() - s.max_samples;
            s.samples.drain(..excess);
        }
    }

    /// Returns the average speed in bytes/second within the window.
    ///
    /// A single sample is measured against the calculator's start time,
    /// since one finished part already spans its whole transfer.
    pub fn bytes_per_second(&self) -> f64 {
        let s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(last) = s.samples.last() else {
            return 0.0;
        };

        let (since, bytes) = if s.samples.len() == 1 {
            (s.started, last.bytes)
        } else {
            // The first sample marks the window start; its bytes were
            // transferred before it.
            let first = &s.samples[0];
            let bytes = s.samples[1..].iter().map(|sample| sample.bytes).sum();
            (first.timestamp, bytes)
        };

        let elapsed = last.timestamp.duration_since(since);
        if elapsed.is_zero() {
            return 0.0;
        }
        bytes as f64 / elapsed.as_secs_f64()
    }

    /// Estimates time remaining to transfer `remaining_bytes`.
    ///
    /// Returns `None` if speed is zero.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining_bytes as f64 / speed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PartPlan;
    use cinevision_protocol::UploadTarget;

    fn sample_session() -> UploadSession {
        UploadSession::new(
            "s1".into(),
            "videos/s1.mp4".into(),
            UploadTarget::new("lang-1"),
            PartPlan::new(1024, 256).unwrap(),
        )
    }

    #[test]
    fn reporter_snapshot_counts_parts() {
        let reporter = ProgressReporter::new(None);
        let session = sample_session();
        session.record_success(1, "a").unwrap();
        session.record_success(2, "b").unwrap();

        let snap = reporter.snapshot(&session);
        assert_eq!(snap.upload_id, "s1");
        assert_eq!(snap.bytes_transferred, 512);
        assert_eq!(snap.total_bytes, 1024);
        assert_eq!(snap.parts_completed, 2);
        assert_eq!(snap.total_parts, 4);
    }

    #[test]
    fn reporter_calls_callback() {
        let received = Arc::new(Mutex::new(Vec::<u32>::new()));
        let r = Arc::clone(&received);
        let reporter = ProgressReporter::new(Some(Arc::new(move |p: ProgressSnapshot| {
            r.lock().unwrap().push(p.parts_completed);
        })));

        let session = sample_session();
        session.record_success(1, "a").unwrap();
        reporter.report(&session);
        session.record_success(2, "b").unwrap();
        reporter.report(&session);

        assert_eq!(*received.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn reporter_without_callback_is_silent() {
        let reporter = ProgressReporter::new(None);
        // Should not panic.
        reporter.report(&sample_session());
    }

    #[test]
    fn speed_calculator_no_samples() {
        let calc = SpeedCalculator::new(None, None);
        assert_eq!(calc.bytes_per_second(), 0.0);
        assert!(calc.eta(1000).is_none());
    }

    #[test]
    fn speed_calculator_single_sample_uses_start_time() {
        let calc = SpeedCalculator::new(None, None);
        std::thread::sleep(Duration::from_millis(20));
        calc.add_sample(100);
        assert!(calc.bytes_per_second() > 0.0);
    }

    #[test]
    fn speed_calculator_multiple_samples() {
        let calc = SpeedCalculator::new(Some(Duration::from_secs(10)), None);
        calc.add_sample(500);
        std::thread::sleep(Duration::from_millis(50));
        calc.add_sample(500);

        // Timing is imprecise, just check > 0.
        assert!(calc.bytes_per_second() > 0.0);
        let eta = calc.eta(10_000);
        assert!(eta.is_some());
        assert!(eta.unwrap().as_secs_f64() > 0.0);
    }

    #[test]
    fn speed_calculator_max_samples() {
        let calc = SpeedCalculator::new(Some(Duration::from_secs(60)), Some(5));
        for i in 0..20 {
            calc.add_sample(i * 10);
        }
        let s = calc.inner.lock().unwrap();
        assert!(s.samples.len() <= 5);
    }
}
