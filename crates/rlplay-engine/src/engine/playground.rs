use std::time::Duration;

use crate::{
    core::{ConfigError, RunConfig, RunRequest, StepRecord},
    engine::{
        backend::{BackendError, SimulationBackend},
        playback::{BufferView, PlaybackController, PlaybackPhase, PlaybackState},
        session::{Listeners, SessionError, SessionId, SessionStatus, SimulationSession},
        stepper::{BanditStepper, Reconfigured},
        store::{OutOfOrderError, ResultStore},
        stream::{StreamHandle, StreamSink},
        timer::Timer,
    },
};

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum StartRunError {
    #[display("invalid configuration: {_0}")]
    Config(ConfigError),
    #[display("{_0}")]
    Backend(BackendError),
}

#[derive(Debug)]
enum Producer {
    Local {
        stepper: Box<BanditStepper>,
        timer: Timer,
    },
    Remote {
        stream: StreamHandle,
    },
}

/// The producer, session and callbacks of the current run.
///
/// Dropping it drops the producer's timer and stream with it, so a run can
/// never outlive its slot in the [`Playground`].
#[derive(Debug)]
struct ActiveRun {
    session: SimulationSession,
    config: RunConfig,
    producer: Producer,
    listeners: Listeners,
    stopped: bool,
}

impl ActiveRun {
    fn is_growing(&self) -> bool {
        !self.stopped && !self.session.is_terminal()
    }

    fn producer_deadline(&self) -> Option<Duration> {
        match &self.producer {
            Producer::Local { timer, .. } => timer.deadline(),
            Producer::Remote { .. } => None,
        }
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        match &mut self.producer {
            Producer::Local { timer, .. } => timer.cancel(),
            Producer::Remote { stream } => stream.close(),
        }
        self.stopped = true;
        tracing::info!(id = %self.session.id(), "run stopped");
    }
}

/// Routes stream events of a remote run into the store and the session.
struct RunSink<'a> {
    store: &'a mut ResultStore,
    session: &'a mut SimulationSession,
    listeners: &'a mut Listeners,
}

impl StreamSink for RunSink<'_> {
    fn on_data(&mut self, record: &StepRecord) -> Result<(), SessionError> {
        let planned = self.session.total_episodes_planned();
        if planned > 0 && record.episode_index >= planned {
            return Err(SessionError::Protocol(format!(
                "episode index {} is beyond the {planned} planned episodes",
                record.episode_index
            )));
        }
        self.store
            .append(record.clone())
            .map_err(|e| SessionError::Protocol(e.to_string()))?;
        self.session.mark_running();
        self.listeners.emit_step(record);
        Ok(())
    }

    fn on_error(&mut self, error: &SessionError) {
        if self.session.fail(error.clone()) {
            self.listeners.emit_error(error);
        }
    }

    fn on_complete(&mut self) {
        if self.session.complete() {
            self.listeners.emit_complete();
        }
    }
}

/// Session manager: owns the active run, its Result Store and the Playback
/// Controller, and drives them from a caller-supplied clock.
///
/// Production and playback are two independent timers over one store. The
/// caller sleeps until [`Playground::next_deadline`] (or until input arrives)
/// and then calls [`Playground::advance`].
#[derive(Debug)]
pub struct Playground<B> {
    backend: B,
    store: ResultStore,
    playback: PlaybackController,
    run: Option<ActiveRun>,
    local_runs: u64,
}

impl<B> Playground<B>
where
    B: SimulationBackend,
{
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            store: ResultStore::new(),
            playback: PlaybackController::new(),
            run: None,
            local_runs: 0,
        }
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Starts a new run, replacing the current one.
    ///
    /// The configuration is validated first; when it is invalid nothing
    /// changes. Otherwise the previous run is torn down completely before
    /// the new producer is created.
    pub fn start_run(
        &mut self,
        config: RunConfig,
        now: Duration,
    ) -> Result<SessionHandle<'_>, StartRunError> {
        config.validate()?;
        self.teardown();

        let algorithm = config.algorithm();
        let (session, producer) = if let RunConfig::Bandit(bandit) = &config {
            self.local_runs += 1;
            let id = SessionId::new(format!("local-{}", self.local_runs));
            let stepper = Box::new(BanditStepper::new(bandit.clone()));
            let mut timer = Timer::new();
            timer.arm(now, Duration::ZERO);
            let session = SimulationSession::new(id, algorithm, bandit.n_episodes);
            (session, Producer::Local { stepper, timer })
        } else {
            let ack = self.backend.start(&RunRequest::from(&config))?;
            let transport = self.backend.open_stream(&ack.session_id)?;
            let session = SimulationSession::new(ack.session_id, algorithm, ack.total_episodes);
            let stream = StreamHandle::new(transport);
            (session, Producer::Remote { stream })
        };
        tracing::info!(
            id = %session.id(),
            %algorithm,
            planned = session.total_episodes_planned(),
            "run started"
        );

        let run = self.run.insert(ActiveRun {
            session,
            config,
            producer,
            listeners: Listeners::default(),
            stopped: false,
        });
        Ok(SessionHandle { run })
    }

    /// Applies a changed configuration to the current run.
    ///
    /// A local bandit run keeps its learner when only epsilon, noise or the
    /// episode budget change. Anything else (another algorithm, a different
    /// arm count, a finished run) starts a fresh run.
    pub fn retune(&mut self, config: RunConfig, now: Duration) -> Result<Reconfigured, StartRunError> {
        config.validate()?;
        if let Some(run) = &mut self.run
            && run.is_growing()
            && let (RunConfig::Bandit(bandit), Producer::Local { stepper, .. }) =
                (&config, &mut run.producer)
            && !stepper.requires_rebuild(bandit)
        {
            stepper.reconfigure(bandit.clone());
            run.session.replan(bandit.n_episodes);
            run.config = config;
            return Ok(Reconfigured::InPlace);
        }
        self.start_run(config, now)?;
        Ok(Reconfigured::Reinitialized)
    }

    /// Replaces the store with imported records. No session is attached, so
    /// the buffer is complete from the start.
    pub fn import<I>(&mut self, records: I) -> Result<(), OutOfOrderError>
    where
        I: IntoIterator<Item = StepRecord>,
    {
        let mut store = ResultStore::new();
        store.replace_all(records)?;
        self.teardown();
        self.store = store;
        let view = self.view();
        self.playback.sync(view);
        tracing::info!(records = self.store.len(), "records imported");
        Ok(())
    }

    /// Stops producing for the current run, keeping what was recorded.
    pub fn stop(&mut self) {
        if let Some(run) = &mut self.run {
            run.stop();
        }
    }

    /// Earliest pending timer, if any.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        let producer = self.run.as_ref().and_then(ActiveRun::producer_deadline);
        [producer, self.playback.deadline()]
            .into_iter()
            .flatten()
            .min()
    }

    /// Delivers pending stream events, then runs every timer due at `now`
    /// in deadline order (the producer first on a tie).
    pub fn advance(&mut self, now: Duration) {
        self.pump();
        loop {
            let producer = self
                .run
                .as_ref()
                .and_then(ActiveRun::producer_deadline)
                .filter(|&at| at <= now);
            let playback = self.playback.deadline().filter(|&at| at <= now);
            match (producer, playback) {
                (Some(p), Some(q)) if p <= q => self.tick_producer(now),
                (Some(_), None) => self.tick_producer(now),
                (_, Some(_)) => {
                    let view = self.view();
                    self.playback.tick(now, view);
                }
                (None, None) => break,
            }
        }
    }

    fn pump(&mut self) {
        let Self { store, run, .. } = self;
        if let Some(ActiveRun {
            session,
            producer: Producer::Remote { stream },
            listeners,
            ..
        }) = run
        {
            let mut sink = RunSink {
                store,
                session,
                listeners,
            };
            stream.pump(&mut sink);
        }
        let view = self.view();
        self.playback.sync(view);
    }

    fn tick_producer(&mut self, now: Duration) {
        let Self { store, run, .. } = self;
        let Some(ActiveRun {
            session,
            producer: Producer::Local { stepper, timer },
            listeners,
            ..
        }) = run
        else {
            return;
        };
        let Some(at) = timer.fire(now) else {
            return;
        };
        if let Some(record) = stepper.step() {
            match store.append(record.clone()) {
                Ok(_) => {
                    session.mark_running();
                    listeners.emit_step(&record);
                }
                Err(e) => {
                    let error = SessionError::Protocol(e.to_string());
                    tracing::warn!(%error, "local run failed");
                    if session.fail(error.clone()) {
                        listeners.emit_error(&error);
                    }
                    return;
                }
            }
        }
        if stepper.is_finished() {
            if session.complete() {
                listeners.emit_complete();
            }
        } else {
            timer.arm(at, stepper.tick_delay());
        }
        let view = self.view();
        self.playback.sync(view);
    }

    /// Tears the current run down: producer timer, stream, playback, store,
    /// in that order.
    fn teardown(&mut self) {
        if let Some(mut run) = self.run.take() {
            tracing::info!(id = %run.session.id(), status = %run.session.status(), "tearing down run");
            match &mut run.producer {
                Producer::Local { timer, .. } => timer.cancel(),
                Producer::Remote { stream } => stream.close(),
            }
        }
        self.playback.reset(BufferView::finished(0));
        self.store.clear();
    }

    /// Current read snapshot of the store for the playback controller.
    #[must_use]
    pub fn view(&self) -> BufferView {
        BufferView {
            len: self.store.len(),
            growing: self.run.as_ref().is_some_and(ActiveRun::is_growing),
        }
    }

    #[must_use]
    pub const fn store(&self) -> &ResultStore {
        &self.store
    }

    #[must_use]
    pub fn session(&self) -> Option<&SimulationSession> {
        self.run.as_ref().map(|run| &run.session)
    }

    #[must_use]
    pub fn config(&self) -> Option<&RunConfig> {
        self.run.as_ref().map(|run| &run.config)
    }

    /// The local learner of the current run, if it runs in-process.
    #[must_use]
    pub fn stepper(&self) -> Option<&BanditStepper> {
        match &self.run.as_ref()?.producer {
            Producer::Local { stepper, .. } => Some(stepper.as_ref()),
            Producer::Remote { .. } => None,
        }
    }

    #[must_use]
    pub fn playback_state(&self) -> PlaybackState {
        self.playback.state(self.view())
    }

    #[must_use]
    pub const fn playback_phase(&self) -> PlaybackPhase {
        self.playback.phase()
    }

    #[must_use]
    pub const fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    /// The record selected by the playback position.
    #[must_use]
    pub fn current_record(&self) -> Option<&StepRecord> {
        self.store.get(self.playback.current_index())
    }

    pub fn play(&mut self, now: Duration) {
        let view = self.view();
        self.playback.play(view, now);
    }

    pub fn pause(&mut self) {
        self.playback.pause();
    }

    pub fn toggle_playback(&mut self, now: Duration) {
        let view = self.view();
        self.playback.toggle(view, now);
    }

    pub fn reset_playback(&mut self) {
        let view = self.view();
        self.playback.reset(view);
    }

    pub fn set_speed(&mut self, ms: u64) {
        self.playback.set_speed(ms);
    }

    pub fn speed_up(&mut self) {
        self.playback.speed_up();
    }

    pub fn slow_down(&mut self) {
        self.playback.slow_down();
    }

    pub fn set_index(&mut self, index: usize) {
        let view = self.view();
        self.playback.set_index(index, view);
    }

    pub fn step_by(&mut self, delta: isize) {
        let view = self.view();
        self.playback.step_by(delta, view);
    }
}

/// Handle on a freshly started run, for registering callbacks.
///
/// Callbacks fire from [`Playground::advance`]; a record is in the store by
/// the time `on_step` sees it.
#[derive(Debug)]
pub struct SessionHandle<'a> {
    run: &'a mut ActiveRun,
}

impl SessionHandle<'_> {
    #[must_use]
    pub fn id(&self) -> &SessionId {
        self.run.session.id()
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.run.session.status()
    }

    pub fn on_step(&mut self, f: impl FnMut(&StepRecord) + 'static) -> &mut Self {
        self.run.listeners.on_step(f);
        self
    }

    pub fn on_error(&mut self, f: impl FnMut(&SessionError) + 'static) -> &mut Self {
        self.run.listeners.on_error(f);
        self
    }

    pub fn on_complete(&mut self, f: impl FnMut() + 'static) -> &mut Self {
        self.run.listeners.on_complete(f);
        self
    }

    /// Stops the producer; recorded steps stay available for playback.
    pub fn stop(&mut self) {
        self.run.stop();
    }
}
