//! Integration tests for the polling loop.
//!
//! Time is paused, so every sleep completes instantly while the clock still
//! advances by exactly the slept amount.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use presence_monitor::{
    ClientError, ContactHandle, JsonStatsFile, MonitorReport, MonitorSettings, PresenceClient,
    PresenceMonitor, PresenceState, RawPresence, ReplayClient, Reporter, Statistics, StatsError,
    StatsStore, StopReason,
};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

type Step = Result<RawPresence, ClientError>;

/// Shared view into what the scripted client saw.
#[derive(Clone, Default)]
struct Recorder {
    polls: Arc<Mutex<Vec<Instant>>>,
    disconnects: Arc<AtomicUsize>,
}

impl Recorder {
    fn polls(&self) -> Vec<Instant> {
        self.polls.lock().unwrap().clone()
    }

    fn gaps(&self) -> Vec<Duration> {
        self.polls().windows(2).map(|w| w[1] - w[0]).collect()
    }
}

/// Plays a fixed script, then cancels the monitor and blocks forever.
struct ScriptedClient {
    steps: VecDeque<Step>,
    resolvable: bool,
    cancel: CancellationToken,
    recorder: Recorder,
}

impl ScriptedClient {
    fn new(steps: Vec<Step>, cancel: &CancellationToken, recorder: &Recorder) -> Self {
        Self {
            steps: steps.into(),
            resolvable: true,
            cancel: cancel.clone(),
            recorder: recorder.clone(),
        }
    }
}

#[async_trait]
impl PresenceClient for ScriptedClient {
    async fn connect(&mut self) -> Result<(), ClientError> {
        Ok(())
    }

    async fn resolve_contact(&mut self, identifier: &str) -> Result<ContactHandle, ClientError> {
        if !self.resolvable {
            return Err(ClientError::resolution(identifier, "not in contacts"));
        }
        Ok(ContactHandle {
            id: "1001".to_string(),
            display_name: "Test Contact".to_string(),
            username: Some("test".to_string()),
        })
    }

    async fn get_presence(&mut self, _contact: &ContactHandle) -> Result<RawPresence, ClientError> {
        self.recorder.polls.lock().unwrap().push(Instant::now());
        match self.steps.pop_front() {
            Some(step) => step,
            None => {
                self.cancel.cancel();
                std::future::pending().await
            }
        }
    }

    async fn disconnect(&mut self) {
        self.recorder.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-memory store that counts saves.
#[derive(Clone, Default)]
struct CountingStore {
    initial: Statistics,
    saved: Arc<Mutex<Vec<Statistics>>>,
}

impl CountingStore {
    fn saves(&self) -> usize {
        self.saved.lock().unwrap().len()
    }

    fn last(&self) -> Option<Statistics> {
        self.saved.lock().unwrap().last().cloned()
    }
}

impl StatsStore for CountingStore {
    fn load(&self) -> Result<Statistics, StatsError> {
        Ok(self.initial.clone())
    }

    fn save(&mut self, stats: &Statistics) -> Result<(), StatsError> {
        self.saved.lock().unwrap().push(stats.clone());
        Ok(())
    }
}

fn settings() -> MonitorSettings {
    MonitorSettings {
        target: "+989123456789".to_string(),
        check_interval: Duration::from_secs(10),
        zone: chrono_tz::Asia::Tehran,
        rate_limit_grace: Duration::from_secs(10),
        max_consecutive_errors: 5,
    }
}

fn last_seen(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, hour, minute, 0).unwrap()
}

fn transient() -> Step {
    Err(ClientError::transient("connection reset"))
}

fn online() -> Step {
    Ok(RawPresence::Online { expires: None })
}

async fn run_script(
    steps: Vec<Step>,
    store: &CountingStore,
    log_path: &Path,
) -> (MonitorReport, Recorder) {
    let cancel = CancellationToken::new();
    let recorder = Recorder::default();
    let client = ScriptedClient::new(steps, &cancel, &recorder);
    let reporter = Reporter::new(log_path, chrono_tz::Asia::Tehran).quiet();
    let monitor = PresenceMonitor::new(client, store.clone(), reporter, settings(), cancel).unwrap();
    (monitor.run().await, recorder)
}

#[tokio::test(start_paused = true)]
async fn test_mixed_readings_report_four_transitions() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("online_log.txt");
    let store = CountingStore::default();

    let steps = vec![
        online(),
        online(),
        Ok(RawPresence::offline_at(last_seen(6, 0))),
        Ok(RawPresence::offline_at(last_seen(6, 0))),
        Ok(RawPresence::offline_at(last_seen(6, 45))),
        Ok(RawPresence::Empty),
    ];
    let (report, recorder) = run_script(steps, &store, &log_path).await;

    assert_eq!(report.reason, StopReason::Cancelled);
    let kinds: Vec<_> = report.transitions.iter().map(PresenceState::kind).collect();
    assert_eq!(kinds.len(), 4);
    assert_eq!(
        report
            .transitions
            .iter()
            .filter_map(PresenceState::last_seen_label)
            .collect::<Vec<_>>(),
        vec!["2024-03-01 09:30:00", "2024-03-01 10:15:00"]
    );

    let log = std::fs::read_to_string(&log_path).unwrap();
    assert_eq!(log.matches("] came online").count(), 1);
    assert_eq!(log.matches("] went offline").count(), 2);
    assert_eq!(log.matches("] status hidden").count(), 1);
    assert!(log.contains("contact: Test Contact (@test)"));

    assert_eq!(report.stats.total_checks, 6);
    assert_eq!(report.stats.online_count, 1);
    assert_eq!(report.stats.offline_count, 2);
    assert!(report.stats.start_time.is_some());

    // One save per transition plus the final one.
    assert_eq!(store.saves(), 5);
    assert_eq!(store.last(), Some(report.stats.clone()));
    assert_eq!(recorder.disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_online_logs_once() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("online_log.txt");
    let store = CountingStore::default();

    let (report, recorder) = run_script(vec![online(), online()], &store, &log_path).await;

    assert_eq!(report.transitions, vec![PresenceState::Online]);
    assert_eq!(report.stats.total_checks, 2);
    let log = std::fs::read_to_string(&log_path).unwrap();
    assert_eq!(log.matches("came online").count(), 1);

    // Successful cycles are spaced by the check interval.
    assert_eq!(recorder.gaps()[0], Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_waits_with_grace_and_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = CountingStore::default();

    let steps = vec![transient(), Err(ClientError::rate_limited(30)), online()];
    let (report, recorder) = run_script(steps, &store, &dir.path().join("log.txt")).await;

    let gaps = recorder.gaps();
    assert_eq!(gaps[0], Duration::from_secs(20));
    assert!(gaps[1] >= Duration::from_secs(40) && gaps[1] < Duration::from_secs(41));

    assert_eq!(report.stats.error_count, 1);
    assert_eq!(report.stats.total_checks, 1);
    assert_eq!(report.reason, StopReason::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_rate_limit_wait_is_cancellable() {
    let dir = tempfile::tempdir().unwrap();
    let store = CountingStore::default();
    let cancel = CancellationToken::new();
    let recorder = Recorder::default();

    let steps = vec![online(), Err(ClientError::rate_limited(u64::MAX)), online()];
    let client = ScriptedClient::new(steps, &cancel, &recorder);
    let reporter = Reporter::new(dir.path().join("log.txt"), chrono_tz::Asia::Tehran).quiet();
    let monitor = PresenceMonitor::new(client, store.clone(), reporter, settings(), cancel.clone())
        .unwrap();

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(60)).await;
        cancel.cancel();
    });
    let report = monitor.run().await;
    stopper.await.unwrap();

    assert_eq!(report.reason, StopReason::Cancelled);
    assert_eq!(recorder.polls().len(), 2);
    assert_eq!(report.stats.total_checks, 1);
    assert_eq!(report.stats.error_count, 0);
    assert_eq!(store.saves(), 2);
    assert_eq!(recorder.disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_five_consecutive_errors_stop_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("online_log.txt");
    let store = CountingStore::default();

    let steps = (0..5).map(|_| transient()).chain([online()]).collect();
    let (report, recorder) = run_script(steps, &store, &log_path).await;

    assert_eq!(
        report.reason,
        StopReason::ErrorBudgetExhausted { consecutive: 5 }
    );
    assert_eq!(report.stats.error_count, 5);
    assert_eq!(report.stats.total_checks, 0);
    assert_eq!(recorder.polls().len(), 5);
    assert!(recorder.gaps().iter().all(|gap| *gap == Duration::from_secs(20)));

    assert_eq!(store.saves(), 1);
    assert_eq!(store.last().unwrap().error_count, 5);
    assert_eq!(recorder.disconnects.load(Ordering::SeqCst), 1);

    let log = std::fs::read_to_string(&log_path).unwrap();
    assert!(log.contains("] error #5: connection reset"));
    assert!(log.contains("too many consecutive errors (5), stopping"));
}

#[tokio::test(start_paused = true)]
async fn test_success_resets_error_streak() {
    let dir = tempfile::tempdir().unwrap();
    let store = CountingStore::default();

    let mut steps = vec![transient(), transient(), transient(), transient(), online()];
    steps.extend((0..4).map(|_| transient()));
    let (report, _) = run_script(steps, &store, &dir.path().join("log.txt")).await;

    assert_eq!(report.reason, StopReason::Cancelled);
    assert_eq!(report.stats.error_count, 8);
    assert_eq!(report.stats.total_checks, 1);
}

#[tokio::test(start_paused = true)]
async fn test_total_checks_counts_only_classified_cycles() {
    let dir = tempfile::tempdir().unwrap();
    let store = CountingStore::default();

    let steps = vec![
        online(),
        Err(ClientError::rate_limited(5)),
        transient(),
        Ok(RawPresence::Recently),
        Ok(RawPresence::Offline { was_online: None }),
    ];
    let (report, _) = run_script(steps, &store, &dir.path().join("log.txt")).await;

    let stats = &report.stats;
    assert_eq!(stats.total_checks, 3);
    assert_eq!(stats.error_count, 1);
    assert_eq!(stats.online_count, 1);
    assert_eq!(stats.offline_count, 1);
    assert!(stats.online_count + stats.offline_count <= stats.total_checks);
}

#[tokio::test(start_paused = true)]
async fn test_unresolvable_contact_stops_without_polling() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("online_log.txt");
    let store = CountingStore::default();
    let cancel = CancellationToken::new();
    let recorder = Recorder::default();

    let mut client = ScriptedClient::new(vec![online()], &cancel, &recorder);
    client.resolvable = false;
    let reporter = Reporter::new(&log_path, chrono_tz::Asia::Tehran).quiet();
    let report = PresenceMonitor::new(client, store.clone(), reporter, settings(), cancel)
        .unwrap()
        .run()
        .await;

    assert!(matches!(report.reason, StopReason::Configuration(_)));
    assert!(report.reason.is_fatal());
    assert!(report.contact.is_none());
    assert!(recorder.polls().is_empty());
    assert_eq!(store.saves(), 1);
    assert_eq!(recorder.disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_before_start() {
    let dir = tempfile::tempdir().unwrap();
    let store = CountingStore::default();
    let cancel = CancellationToken::new();
    let recorder = Recorder::default();
    cancel.cancel();

    let client = ScriptedClient::new(vec![online()], &cancel, &recorder);
    let reporter = Reporter::new(dir.path().join("log.txt"), chrono_tz::Asia::Tehran).quiet();
    let report = PresenceMonitor::new(client, store.clone(), reporter, settings(), cancel)
        .unwrap()
        .run()
        .await;

    assert_eq!(report.reason, StopReason::Cancelled);
    assert!(recorder.polls().is_empty());
    assert_eq!(store.saves(), 1);
    assert_eq!(recorder.disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_sleep() {
    let dir = tempfile::tempdir().unwrap();
    let store = CountingStore::default();
    let cancel = CancellationToken::new();
    let recorder = Recorder::default();

    // Long interval, script never exhausts before the cancel fires.
    let client = ScriptedClient::new(vec![online(), online()], &cancel, &recorder);
    let reporter = Reporter::new(dir.path().join("log.txt"), chrono_tz::Asia::Tehran).quiet();
    let mut settings = settings();
    settings.check_interval = Duration::from_secs(3600);
    let monitor = PresenceMonitor::new(client, store.clone(), reporter, settings, cancel.clone())
        .unwrap();

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(60)).await;
        cancel.cancel();
    });
    let report = monitor.run().await;
    stopper.await.unwrap();

    assert_eq!(report.reason, StopReason::Cancelled);
    assert_eq!(recorder.polls().len(), 1);
    assert_eq!(report.stats.total_checks, 1);
    // Transition save plus the final save.
    assert_eq!(store.saves(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_statistics_resume_from_store() {
    let dir = tempfile::tempdir().unwrap();
    let start = chrono_tz::Asia::Tehran
        .with_ymd_and_hms(2024, 1, 1, 8, 0, 0)
        .unwrap()
        .fixed_offset();
    let store = CountingStore {
        initial: Statistics {
            online_count: 2,
            offline_count: 2,
            total_checks: 10,
            error_count: 1,
            start_time: Some(start),
        },
        ..CountingStore::default()
    };

    let (report, _) = run_script(vec![online()], &store, &dir.path().join("log.txt")).await;

    assert_eq!(report.stats.total_checks, 11);
    assert_eq!(report.stats.online_count, 3);
    assert_eq!(report.stats.error_count, 1);
    assert_eq!(report.stats.start_time, Some(start));
}

#[tokio::test(start_paused = true)]
async fn test_replay_client_with_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("online_log.txt");
    let stats_path = dir.path().join("statistics.json");

    let client = ReplayClient::parse(
        r#"
        {"status":"online"}
        {"status":"offline","was_online":"2024-03-01T06:00:00Z"}
        {"status":"offline","was_online":"2024-03-01T06:00:00Z"}
        "#,
    )
    .unwrap();
    let reporter = Reporter::new(&log_path, chrono_tz::Asia::Tehran).quiet();
    let store = JsonStatsFile::new(&stats_path);
    let mut settings = settings();
    settings.max_consecutive_errors = 1;

    let report = PresenceMonitor::new(client, store, reporter, settings, CancellationToken::new())
        .unwrap()
        .run()
        .await;

    // The exhausted script surfaces as a transient error.
    assert_eq!(
        report.reason,
        StopReason::ErrorBudgetExhausted { consecutive: 1 }
    );
    assert_eq!(report.transitions.len(), 2);

    let persisted = JsonStatsFile::new(&stats_path).load().unwrap();
    assert_eq!(persisted, report.stats);
    assert_eq!(persisted.total_checks, 3);
    assert_eq!(persisted.offline_count, 1);
    assert_eq!(persisted.error_count, 1);

    let log = std::fs::read_to_string(&log_path).unwrap();
    assert!(log.contains("went offline, last seen 2024-03-01 09:30:00"));
}
