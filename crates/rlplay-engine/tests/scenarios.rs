use std::{
    cell::RefCell,
    collections::VecDeque,
    rc::Rc,
    sync::mpsc::Sender,
    time::Duration,
};

use proptest::prelude::*;
use rlplay_engine::{
    Algorithm, BackendError, BanditConfig, BanditStepper, ChannelTransport, PlaybackPhase,
    Playground, RewardNoise, RunAck, RunConfig, RunRequest, RunSeed, ScriptedTransport,
    SessionId, SessionStatus, SimulationBackend, StartRunError, Transport, TransportEvent,
};

const MS: Duration = Duration::from_millis(1);

type Log = Rc<RefCell<Vec<String>>>;

/// Transport that records when it is closed.
#[derive(Debug)]
struct LoggedTransport {
    id: String,
    inner: Box<dyn Transport>,
    log: Log,
}

impl Transport for LoggedTransport {
    fn poll(&mut self) -> Option<TransportEvent> {
        self.inner.poll()
    }

    fn close(&mut self) {
        self.log.borrow_mut().push(format!("close:{}", self.id));
        self.inner.close();
    }
}

/// Backend serving queued transports in order.
#[derive(Debug, Default)]
struct TestBackend {
    transports: VecDeque<Box<dyn Transport>>,
    started: u32,
    /// Overrides the planned episode count reported in the ack.
    planned: Option<u32>,
    log: Log,
}

impl TestBackend {
    fn with_frames(mut self, frames: Vec<String>) -> Self {
        self.transports
            .push_back(Box::new(ScriptedTransport::from_frames(frames)));
        self
    }

    fn with_live(mut self) -> (Self, Sender<TransportEvent>) {
        let (tx, transport) = ChannelTransport::pair();
        self.transports.push_back(Box::new(transport));
        (self, tx)
    }
}

impl SimulationBackend for TestBackend {
    fn start(&mut self, request: &RunRequest) -> Result<RunAck, BackendError> {
        self.started += 1;
        let total_episodes = self.planned.unwrap_or_else(|| {
            request.config["n_episodes"]
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0)
        });
        self.log
            .borrow_mut()
            .push(format!("start:remote-{}", self.started));
        Ok(RunAck {
            session_id: SessionId::new(format!("remote-{}", self.started)),
            total_episodes,
        })
    }

    fn open_stream(&mut self, id: &SessionId) -> Result<Box<dyn Transport>, BackendError> {
        let inner = self
            .transports
            .pop_front()
            .ok_or_else(|| BackendError::Rejected("no stream scripted".to_owned()))?;
        Ok(Box::new(LoggedTransport {
            id: id.to_string(),
            inner,
            log: Rc::clone(&self.log),
        }))
    }
}

fn step(index: u32) -> String {
    format!(
        r#"{{"episode": {index}, "total_reward": {index}.5, "steps": 1,
            "trajectory": [{{"state": [0, 0], "action": 1, "reward": 0.5, "next_state": [0, 1]}}],
            "q_table": {{"(0, 0)": [0.0, 1.0, 0.0, 0.0]}}}}"#
    )
}

fn started() -> String {
    r#"{"status": "started"}"#.to_owned()
}

fn completed() -> String {
    r#"{"status": "completed"}"#.to_owned()
}

fn qlearning(n_episodes: u32) -> RunConfig {
    let RunConfig::QLearning(mut tabular) = RunConfig::default_for(Algorithm::QLearning) else {
        unreachable!()
    };
    tabular.n_episodes = n_episodes;
    RunConfig::QLearning(tabular)
}

fn noiseless_bandit(n_episodes: u32, epsilon: f64) -> BanditConfig {
    BanditConfig {
        n_episodes,
        epsilon,
        noise: RewardNoise::None,
        seed: Some(RunSeed::from_u128(11)),
        ..BanditConfig::default()
    }
}

/// Registers logging callbacks on a fresh run.
fn start_logged<B: SimulationBackend>(
    playground: &mut Playground<B>,
    config: RunConfig,
    now: Duration,
) -> Result<Log, StartRunError> {
    let log = Log::default();
    let mut handle = playground.start_run(config, now)?;
    let l = Rc::clone(&log);
    handle.on_step(move |r| l.borrow_mut().push(format!("step:{}", r.episode_index)));
    let l = Rc::clone(&log);
    handle.on_error(move |e| l.borrow_mut().push(format!("error:{}", e.message())));
    let l = Rc::clone(&log);
    handle.on_complete(move || l.borrow_mut().push("complete".to_owned()));
    Ok(log)
}

fn count(log: &Log, prefix: &str) -> usize {
    log.borrow().iter().filter(|e| e.starts_with(prefix)).count()
}

#[test]
fn bandit_settles_on_best_arm_after_trying_each() {
    let mut stepper =
        BanditStepper::with_true_values(noiseless_bandit(50, 0.0), vec![0.1, 0.3, 0.9, 0.2, 0.5]);
    let records = std::iter::from_fn(|| stepper.step()).collect::<Vec<_>>();
    assert_eq!(records.len(), 50);
    for record in &records[5..] {
        assert_eq!(record.action, 2);
        assert_eq!(record.is_optimal, Some(true));
    }
    assert_eq!(records.last().map(|r| r.episode_index), Some(49));
}

#[test]
fn stream_started_three_records_completed() {
    let backend = TestBackend::default()
        .with_frames(vec![started(), step(0), step(1), step(2), completed()]);
    let mut playground = Playground::new(backend);
    let log = start_logged(&mut playground, qlearning(10), Duration::ZERO).unwrap();

    playground.advance(Duration::ZERO);
    assert_eq!(count(&log, "step:"), 3);
    assert_eq!(count(&log, "complete"), 1);
    assert_eq!(count(&log, "error:"), 0);
    assert_eq!(playground.store().len(), 3);
    assert_eq!(
        playground.session().map(|s| s.status()),
        Some(SessionStatus::Completed)
    );

    // later advances deliver nothing more
    playground.advance(Duration::from_secs(1));
    assert_eq!(log.borrow().len(), 4);
}

#[test]
fn playback_scrub_and_play_to_finish() {
    let frames = std::iter::once(started())
        .chain((0..10).map(step))
        .chain([completed()])
        .collect();
    let mut playground = Playground::new(TestBackend::default().with_frames(frames));
    playground.start_run(qlearning(10), Duration::ZERO).unwrap();
    playground.advance(Duration::ZERO);
    assert_eq!(playground.playback_phase(), PlaybackPhase::Ready);

    playground.set_index(7);
    playground.set_speed(100);
    playground.play(Duration::ZERO);
    playground.advance(250 * MS);

    let state = playground.playback_state();
    assert_eq!(state.current_index, 9);
    assert!(!state.is_playing);
    assert_eq!(playground.playback_phase(), PlaybackPhase::Finished);
    assert_eq!(playground.current_record().map(|r| r.episode_index), Some(9));
}

#[test]
fn second_start_discards_first_run() {
    let first = vec![started(), step(0), step(1), completed()];
    let second = vec![started(), step(0), completed()];
    let backend = TestBackend::default().with_frames(first).with_frames(second);
    let log = Rc::clone(&backend.log);
    let mut playground = Playground::new(backend);

    let first_log = start_logged(&mut playground, qlearning(10), Duration::ZERO).unwrap();
    let second_log = start_logged(&mut playground, qlearning(10), Duration::ZERO).unwrap();
    playground.advance(Duration::ZERO);

    assert!(first_log.borrow().is_empty());
    assert_eq!(*second_log.borrow(), vec!["step:0", "complete"]);
    assert_eq!(playground.store().len(), 1);
    assert_eq!(
        playground.session().map(|s| s.id().as_str().to_owned()),
        Some("remote-2".to_owned())
    );
    // the first stream was closed before the second run was requested
    let log = log.borrow();
    assert_eq!(&log[..3], &["start:remote-1", "close:remote-1", "start:remote-2"]);
}

#[test]
fn second_local_start_discards_first_run() {
    let mut playground = Playground::new(TestBackend::default());
    let first = RunConfig::Bandit(noiseless_bandit(100, 0.1));
    let second = RunConfig::Bandit(BanditConfig {
        n_arms: 3,
        ..noiseless_bandit(100, 0.1)
    });
    let first_log = start_logged(&mut playground, first, Duration::ZERO).unwrap();
    let second_log = start_logged(&mut playground, second, Duration::ZERO).unwrap();
    assert!(playground.store().is_empty());

    playground.advance(300 * MS);
    assert!(first_log.borrow().is_empty());
    assert_eq!(count(&second_log, "step:"), 11);
    assert!(
        playground
            .store()
            .iter()
            .all(|r| r.arm_stats.as_ref().is_some_and(|s| s.estimates.len() == 3))
    );
}

#[test]
fn error_frame_after_two_records() {
    let frames = vec![
        started(),
        step(0),
        step(1),
        r#"{"status": "error", "error": "oom"}"#.to_owned(),
        step(2),
        completed(),
    ];
    let mut playground = Playground::new(TestBackend::default().with_frames(frames));
    let log = start_logged(&mut playground, qlearning(10), Duration::ZERO).unwrap();
    playground.advance(Duration::ZERO);

    assert_eq!(*log.borrow(), vec!["step:0", "step:1", "error:oom"]);
    let session = playground.session().unwrap();
    assert_eq!(session.status(), SessionStatus::Error);
    assert!(session.error().unwrap().to_string().contains("oom"));
    assert_eq!(playground.store().len(), 2);
}

#[test]
fn decreasing_episode_index_is_a_session_error() {
    let frames = vec![started(), step(0), step(2), step(1), completed()];
    let mut playground = Playground::new(TestBackend::default().with_frames(frames));
    let log = start_logged(&mut playground, qlearning(10), Duration::ZERO).unwrap();
    playground.advance(Duration::ZERO);

    assert_eq!(count(&log, "step:"), 2);
    assert_eq!(count(&log, "error:"), 1);
    assert_eq!(count(&log, "complete"), 0);
    assert_eq!(playground.store().len(), 2);
}

#[test]
fn index_beyond_plan_is_a_session_error() {
    let frames = vec![started(), step(0), step(1), step(2), completed()];
    let mut backend = TestBackend::default().with_frames(frames);
    backend.planned = Some(2);
    let mut playground = Playground::new(backend);
    let log = start_logged(&mut playground, qlearning(10), Duration::ZERO).unwrap();
    playground.advance(Duration::ZERO);

    assert_eq!(count(&log, "step:"), 2);
    assert_eq!(count(&log, "error:"), 1);
    assert_eq!(count(&log, "complete"), 0);
}

#[test]
fn stream_dropped_without_completion_is_an_error() {
    let (backend, tx) = TestBackend::default().with_live();
    let mut playground = Playground::new(backend);
    let log = start_logged(&mut playground, qlearning(10), Duration::ZERO).unwrap();

    tx.send(TransportEvent::Frame(step(0))).unwrap();
    tx.send(TransportEvent::Fault {
        closed: false,
        message: "retrying".to_owned(),
    })
    .unwrap();
    playground.advance(Duration::ZERO);
    assert_eq!(*log.borrow(), vec!["step:0"]);

    drop(tx);
    playground.advance(MS);
    playground.advance(2 * MS);
    assert_eq!(count(&log, "error:"), 1);
    assert_eq!(
        playground.session().map(|s| s.status()),
        Some(SessionStatus::Error)
    );
}

#[test]
fn config_error_creates_no_session() {
    let mut playground = Playground::new(TestBackend::default());
    let mut config = qlearning(10);
    if let RunConfig::QLearning(tabular) = &mut config {
        tabular.alpha = 2.0;
    }
    let result = playground.start_run(config, Duration::ZERO);
    assert!(matches!(result, Err(StartRunError::Config(_))));
    assert!(playground.session().is_none());
    assert_eq!(playground.backend_mut().started, 0);
}

#[test]
fn live_playback_waits_at_tail() {
    let (backend, tx) = TestBackend::default().with_live();
    let mut playground = Playground::new(backend);
    playground.start_run(qlearning(10), Duration::ZERO).unwrap();
    tx.send(TransportEvent::Frame(step(0))).unwrap();
    playground.advance(Duration::ZERO);
    playground.set_speed(10);
    playground.play(Duration::ZERO);

    playground.advance(100 * MS);
    assert_eq!(playground.playback_state().current_index, 0);
    assert_eq!(playground.playback_phase(), PlaybackPhase::Playing);

    for i in 1..3 {
        tx.send(TransportEvent::Frame(step(i))).unwrap();
    }
    playground.advance(130 * MS);
    assert_eq!(playground.playback_state().current_index, 2);

    tx.send(TransportEvent::Frame(completed())).unwrap();
    playground.advance(150 * MS);
    assert_eq!(playground.playback_phase(), PlaybackPhase::Finished);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Production at one rate, playback at another: the cursor never passes
    /// the last appended record.
    #[test]
    fn playback_never_passes_production(
        production_ms in 1u64..60,
        playback_ms in 1u64..60,
        n_episodes in 10u32..80,
        play_at in 0u64..200,
    ) {
        // local producer on its fixed cadence
        let mut local = Playground::new(TestBackend::default());
        let config = RunConfig::Bandit(BanditConfig {
            n_episodes,
            ..noiseless_bandit(10, 0.1)
        });
        local.start_run(config, Duration::ZERO).unwrap();
        local.set_speed(playback_ms);

        // remote producer fed at `production_ms`
        let (backend, tx) = TestBackend::default().with_live();
        let mut remote = Playground::new(backend);
        remote.start_run(qlearning(n_episodes), Duration::ZERO).unwrap();
        remote.set_speed(playback_ms);

        let mut now = Duration::ZERO;
        let mut produced = 0;
        let mut next_production = Duration::ZERO;
        let end = Duration::from_millis(
            u64::from(n_episodes) * (production_ms + playback_ms + 30) + 1000,
        );
        while now <= end {
            if now >= next_production && produced < n_episodes {
                tx.send(TransportEvent::Frame(step(produced))).unwrap();
                produced += 1;
                next_production += Duration::from_millis(production_ms);
                if produced == n_episodes {
                    tx.send(TransportEvent::Frame(completed())).unwrap();
                }
            }
            local.advance(now);
            remote.advance(now);
            if now >= Duration::from_millis(play_at) {
                // once per run: `play` from `Finished` would restart at 0
                for playground in [&mut local, &mut remote] {
                    if matches!(
                        playground.playback_phase(),
                        PlaybackPhase::Ready | PlaybackPhase::Paused
                    ) {
                        playground.play(now);
                    }
                }
            }
            for state in [local.playback_state(), remote.playback_state()] {
                prop_assert!(state.current_index < state.buffer_length.max(1));
            }
            if remote.playback_phase().is_finished() && local.playback_phase().is_finished() {
                break;
            }
            now += MS;
        }
        prop_assert_eq!(remote.store().len(), n_episodes as usize);
        prop_assert_eq!(remote.playback_phase(), PlaybackPhase::Finished);
        prop_assert_eq!(local.store().len(), n_episodes as usize);
        prop_assert_eq!(local.playback_phase(), PlaybackPhase::Finished);
    }
}
