use super::*;
use std::fs::OpenOptions;
use std::io::Write;
use tempfile::TempDir;

fn fast_waiter() -> FileReadinessWaiter {
    FileReadinessWaiter {
        poll_interval: Duration::from_millis(5),
        grace_delay: Duration::from_millis(20),
        stable_samples: 3,
    }
}

fn backdate(path: &Path, secs: u64) {
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .expect("open for backdating");
    file.set_modified(SystemTime::now() - Duration::from_secs(secs))
        .expect("set mtime");
}

/// Appends one byte per sample for the first `writes` samples.
struct GrowingWriter<'a> {
    path: &'a Path,
    writes: usize,
    signals: Vec<WaitSignal>,
}

impl WaitObserver for GrowingWriter<'_> {
    fn on_signal(&mut self, _path: &Path, signal: WaitSignal) {
        self.signals.push(signal);
        if self.writes > 0 {
            self.writes -= 1;
            let mut file = OpenOptions::new()
                .append(true)
                .open(self.path)
                .expect("open for append");
            file.write_all(b"x").expect("append");
        }
    }
}

#[test]
fn modification_wait_times_out_when_file_never_appears() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("never.mp3");
    let mut observer = RecordingObserver::default();
    let timeout = Duration::from_millis(60);

    let outcome = fast_waiter().wait(
        &path,
        ReadinessPolicy::Modification,
        &Baseline::capture(&path),
        timeout,
        &mut observer,
    );

    let WaitOutcome::TimedOut { waited } = outcome else {
        panic!("expected timeout, got {outcome:?}");
    };
    assert!(waited >= timeout);
    assert!(!observer.signals.is_empty());
    assert!(observer.signals.iter().all(|s| *s == WaitSignal::Absent));
}

#[test]
fn modification_wait_returns_after_creation_plus_grace() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("late.mp3");
    let baseline = Baseline::capture(&path);
    assert!(!baseline.existed());

    let writer_path = path.clone();
    let writer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        fs::write(&writer_path, b"audio").expect("write target");
    });

    let waiter = fast_waiter();
    let timeout = Duration::from_secs(5);
    let mut observer = RecordingObserver::default();
    let outcome = waiter.wait(
        &path,
        ReadinessPolicy::Modification,
        &baseline,
        timeout,
        &mut observer,
    );
    writer.join().expect("writer thread");

    let WaitOutcome::Ready { waited } = outcome else {
        panic!("expected ready, got {outcome:?}");
    };
    assert!(waited >= waiter.grace_delay);
    assert!(waited < timeout + waiter.grace_delay);
    assert_eq!(observer.signals.last(), Some(&WaitSignal::Ready));
}

#[test]
fn modification_wait_ignores_stale_file_until_rewritten() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("stale.mp3");
    fs::write(&path, b"old").expect("write stale");
    backdate(&path, 120);
    let baseline = Baseline::capture(&path);
    assert!(baseline.existed());

    let mut observer = RecordingObserver::default();
    let outcome = fast_waiter().wait(
        &path,
        ReadinessPolicy::Modification,
        &baseline,
        Duration::from_millis(40),
        &mut observer,
    );
    assert!(matches!(outcome, WaitOutcome::TimedOut { .. }));
    assert!(observer.signals.iter().all(|s| *s == WaitSignal::Stale));

    fs::write(&path, b"fresh").expect("rewrite");
    let outcome = fast_waiter().wait(
        &path,
        ReadinessPolicy::Modification,
        &baseline,
        Duration::from_secs(5),
        &mut RecordingObserver::default(),
    );
    assert!(outcome.is_ready());
}

#[test]
fn size_wait_reports_growth_then_three_steady_samples() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("growing.mp3");
    fs::write(&path, b"x").expect("seed file");

    let mut observer = GrowingWriter {
        path: &path,
        writes: 2,
        signals: Vec::new(),
    };
    let outcome = fast_waiter().wait(
        &path,
        ReadinessPolicy::SizeStable,
        &Baseline::absent(),
        Duration::from_secs(5),
        &mut observer,
    );

    assert!(outcome.is_ready());
    assert_eq!(
        observer.signals,
        vec![
            WaitSignal::Growing { size: 1 },
            WaitSignal::Growing { size: 2 },
            WaitSignal::Growing { size: 3 },
            WaitSignal::Steady { size: 3, streak: 1 },
            WaitSignal::Steady { size: 3, streak: 2 },
            WaitSignal::Steady { size: 3, streak: 3 },
            WaitSignal::Ready,
        ]
    );
}

#[test]
fn size_wait_is_not_ready_before_enough_steady_samples() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("short.mp3");
    fs::write(&path, b"abc").expect("write target");
    let waiter = FileReadinessWaiter {
        poll_interval: Duration::from_millis(50),
        grace_delay: Duration::ZERO,
        stable_samples: 3,
    };
    let mut observer = RecordingObserver::default();

    let outcome = waiter.wait(
        &path,
        ReadinessPolicy::SizeStable,
        &Baseline::absent(),
        Duration::from_millis(60),
        &mut observer,
    );

    assert!(matches!(outcome, WaitOutcome::TimedOut { .. }));
    assert!(!observer.signals.contains(&WaitSignal::Ready));
    assert_eq!(observer.signals[0], WaitSignal::Growing { size: 3 });
}

#[test]
fn size_wait_tolerates_absent_target() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("missing.mp3");
    let mut observer = RecordingObserver::default();
    let outcome = fast_waiter().wait(
        &path,
        ReadinessPolicy::SizeStable,
        &Baseline::absent(),
        Duration::from_millis(30),
        &mut observer,
    );
    assert!(matches!(outcome, WaitOutcome::TimedOut { .. }));
    assert!(observer.signals.iter().all(|s| *s == WaitSignal::Absent));
}

#[test]
fn existence_check_does_not_poll() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("video.mp4");
    let waiter = fast_waiter();
    let timeout = Duration::from_secs(30);

    let outcome = waiter.wait(
        &path,
        ReadinessPolicy::Existence,
        &Baseline::capture(&path),
        timeout,
        &mut RecordingObserver::default(),
    );
    assert_eq!(outcome, WaitOutcome::NotProduced);

    fs::write(&path, b"video").expect("write video");
    backdate(&path, 120);
    let stale = Baseline::capture(&path);
    let outcome = waiter.wait(
        &path,
        ReadinessPolicy::Existence,
        &stale,
        timeout,
        &mut RecordingObserver::default(),
    );
    assert_eq!(outcome, WaitOutcome::NotProduced);

    fs::write(&path, b"new video").expect("rewrite video");
    let outcome = waiter.wait(
        &path,
        ReadinessPolicy::Existence,
        &stale,
        timeout,
        &mut RecordingObserver::default(),
    );
    assert!(outcome.is_ready());
}

#[test]
fn heartbeat_closes_its_line_after_a_timeout() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("never.mp3");
    let mut heartbeat = ConsoleHeartbeat::new(Vec::new());

    let outcome = fast_waiter().wait(
        &path,
        ReadinessPolicy::SizeStable,
        &Baseline::absent(),
        Duration::from_millis(20),
        &mut heartbeat,
    );

    assert!(matches!(outcome, WaitOutcome::TimedOut { .. }));
    let text = String::from_utf8(heartbeat.into_inner()).expect("utf8");
    assert!(text.starts_with('.'), "{text:?}");
    assert!(text.ends_with(".\n"), "{text:?}");
    assert_eq!(text.matches('\n').count(), 1);
}

#[test]
fn heartbeat_closes_its_line_when_nothing_was_produced() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("video.mp4");
    let mut heartbeat = ConsoleHeartbeat::new(Vec::new());

    let outcome = fast_waiter().wait(
        &path,
        ReadinessPolicy::Existence,
        &Baseline::absent(),
        Duration::ZERO,
        &mut heartbeat,
    );

    assert_eq!(outcome, WaitOutcome::NotProduced);
    assert_eq!(heartbeat.into_inner(), b".\n");
}

#[test]
fn every_wait_reports_its_outcome_once() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("ready.mp3");
    fs::write(&path, b"audio").expect("write target");
    let mut observer = RecordingObserver::default();

    let outcome = fast_waiter().wait(
        &path,
        ReadinessPolicy::Existence,
        &Baseline::absent(),
        Duration::ZERO,
        &mut observer,
    );

    assert_eq!(observer.outcomes, vec![outcome]);
    assert_eq!(observer.signals, vec![WaitSignal::Ready]);
}
