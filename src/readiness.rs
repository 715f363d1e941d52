//! Bounded polling that confirms an external process finished writing a file.
//!
//! The filesystem is the only synchronization point between the coordinator
//! and a producer, so readiness is inferred from metadata: either the mtime
//! moved past a baseline captured before the producer ran, or the size stopped
//! changing for a number of consecutive samples. A wait never errors; a
//! metadata failure on a sample simply counts as "not ready yet".
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Stderr, Write};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

/// How a stage's artifact is judged ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessPolicy {
    /// Exists and mtime is later than the baseline, then a grace delay.
    Modification,
    /// Exists and size unchanged across `stable_samples` consecutive samples.
    SizeStable,
    /// Single post-hoc check after a synchronous producer returned.
    Existence,
}

/// Modification time of `path` captured before a producer runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Baseline {
    mtime: Option<SystemTime>,
}

impl Baseline {
    pub fn capture(path: &Path) -> Self {
        Self {
            mtime: modified(path),
        }
    }

    /// Baseline for a path that did not exist.
    pub fn absent() -> Self {
        Self { mtime: None }
    }

    /// Whether the target already existed (a stale artifact to be overwritten).
    pub fn existed(&self) -> bool {
        self.mtime.is_some()
    }

    fn advanced_by(&self, current: SystemTime) -> bool {
        match self.mtime {
            Some(before) => current > before,
            None => true,
        }
    }
}

/// One observation made during a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitSignal {
    /// Target does not exist yet.
    Absent,
    /// Target exists but its mtime has not moved past the baseline.
    Stale,
    /// Target size changed since the previous sample.
    Growing { size: u64 },
    /// Target size matched the previous sample `streak` times in a row.
    Steady { size: u64, streak: u32 },
    /// Target judged ready.
    Ready,
}

/// Receives every sample so an operator can tell "still waiting" from "hung".
pub trait WaitObserver {
    fn on_signal(&mut self, path: &Path, signal: WaitSignal);

    /// Called once per wait with its outcome, whatever it was.
    fn on_finish(&mut self, _path: &Path, _outcome: &WaitOutcome) {}
}

/// Heartbeat markers: `.` waiting, `+` growing, `=` steady.
///
/// The marker line is closed when the wait ends, so the next log line starts
/// on its own line after a timeout as well as after success.
#[derive(Debug)]
pub struct ConsoleHeartbeat<W = Stderr> {
    out: W,
    line_open: bool,
}

impl Default for ConsoleHeartbeat {
    fn default() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write> ConsoleHeartbeat<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            line_open: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn mark(&mut self, marker: &str) {
        // Heartbeat output is best effort.
        let _ = self.out.write_all(marker.as_bytes());
        let _ = self.out.flush();
        self.line_open = true;
    }
}

impl<W: Write> WaitObserver for ConsoleHeartbeat<W> {
    fn on_signal(&mut self, _path: &Path, signal: WaitSignal) {
        match signal {
            WaitSignal::Absent | WaitSignal::Stale => self.mark("."),
            WaitSignal::Growing { .. } => self.mark("+"),
            WaitSignal::Steady { .. } => self.mark("="),
            WaitSignal::Ready => {}
        }
    }

    fn on_finish(&mut self, _path: &Path, _outcome: &WaitOutcome) {
        if self.line_open {
            let _ = self.out.write_all(b"\n");
            let _ = self.out.flush();
            self.line_open = false;
        }
    }
}

/// Collects signals and outcomes in order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub signals: Vec<WaitSignal>,
    pub outcomes: Vec<WaitOutcome>,
}

impl WaitObserver for RecordingObserver {
    fn on_signal(&mut self, _path: &Path, signal: WaitSignal) {
        self.signals.push(signal);
    }

    fn on_finish(&mut self, _path: &Path, outcome: &WaitOutcome) {
        self.outcomes.push(*outcome);
    }
}

/// Result of a readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready { waited: Duration },
    TimedOut { waited: Duration },
    /// Post-hoc check found no fresh artifact.
    NotProduced,
}

impl WaitOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, WaitOutcome::Ready { .. })
    }
}

/// Polls a single path until it is ready or the timeout elapses.
#[derive(Debug, Clone)]
pub struct FileReadinessWaiter {
    pub poll_interval: Duration,
    pub grace_delay: Duration,
    pub stable_samples: u32,
}

impl Default for FileReadinessWaiter {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            grace_delay: Duration::from_secs(2),
            stable_samples: 3,
        }
    }
}

impl FileReadinessWaiter {
    /// Block until `path` is ready under `policy`, or `timeout` elapses.
    pub fn wait(
        &self,
        path: &Path,
        policy: ReadinessPolicy,
        baseline: &Baseline,
        timeout: Duration,
        observer: &mut dyn WaitObserver,
    ) -> WaitOutcome {
        tracing::debug!(
            path = %path.display(),
            ?policy,
            timeout_ms = timeout.as_millis() as u64,
            "readiness wait start"
        );
        let outcome = match policy {
            ReadinessPolicy::Modification => {
                self.wait_for_modification(path, baseline, timeout, observer)
            }
            ReadinessPolicy::SizeStable => self.wait_for_stable_size(path, timeout, observer),
            ReadinessPolicy::Existence => check_existence(path, baseline, observer),
        };
        observer.on_finish(path, &outcome);
        outcome
    }

    fn wait_for_modification(
        &self,
        path: &Path,
        baseline: &Baseline,
        timeout: Duration,
        observer: &mut dyn WaitObserver,
    ) -> WaitOutcome {
        let start = Instant::now();
        loop {
            match modified(path) {
                Some(current) if baseline.advanced_by(current) => {
                    thread::sleep(self.grace_delay);
                    observer.on_signal(path, WaitSignal::Ready);
                    return WaitOutcome::Ready {
                        waited: start.elapsed(),
                    };
                }
                Some(_) => observer.on_signal(path, WaitSignal::Stale),
                None => observer.on_signal(path, WaitSignal::Absent),
            }
            if !self.pause(start, timeout) {
                return WaitOutcome::TimedOut {
                    waited: start.elapsed(),
                };
            }
        }
    }

    fn wait_for_stable_size(
        &self,
        path: &Path,
        timeout: Duration,
        observer: &mut dyn WaitObserver,
    ) -> WaitOutcome {
        let start = Instant::now();
        let mut last_size: Option<u64> = None;
        let mut streak = 0u32;
        loop {
            match file_size(path) {
                Some(size) if last_size == Some(size) => {
                    streak += 1;
                    observer.on_signal(path, WaitSignal::Steady { size, streak });
                    if streak >= self.stable_samples {
                        observer.on_signal(path, WaitSignal::Ready);
                        return WaitOutcome::Ready {
                            waited: start.elapsed(),
                        };
                    }
                }
                Some(size) => {
                    streak = 0;
                    last_size = Some(size);
                    observer.on_signal(path, WaitSignal::Growing { size });
                }
                None => {
                    streak = 0;
                    last_size = None;
                    observer.on_signal(path, WaitSignal::Absent);
                }
            }
            if !self.pause(start, timeout) {
                return WaitOutcome::TimedOut {
                    waited: start.elapsed(),
                };
            }
        }
    }

    /// Sleep until the next sample; `false` once the timeout has elapsed.
    fn pause(&self, start: Instant, timeout: Duration) -> bool {
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return false;
        }
        thread::sleep(self.poll_interval.min(timeout - elapsed));
        true
    }
}

fn check_existence(
    path: &Path,
    baseline: &Baseline,
    observer: &mut dyn WaitObserver,
) -> WaitOutcome {
    match modified(path) {
        Some(current) if baseline.advanced_by(current) => {
            observer.on_signal(path, WaitSignal::Ready);
            WaitOutcome::Ready {
                waited: Duration::ZERO,
            }
        }
        Some(_) => {
            observer.on_signal(path, WaitSignal::Stale);
            WaitOutcome::NotProduced
        }
        None => {
            observer.on_signal(path, WaitSignal::Absent);
            WaitOutcome::NotProduced
        }
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    let meta = fs::metadata(path).ok()?;
    if !meta.is_file() {
        return None;
    }
    meta.modified().ok()
}

fn file_size(path: &Path) -> Option<u64> {
    let meta = fs::metadata(path).ok()?;
    meta.is_file().then_some(meta.len())
}

#[cfg(test)]
#[path = "readiness_tests.rs"]
mod tests;
