use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::{Algorithm, StepRecord};

/// Opaque session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::From)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, derive_more::Display, derive_more::IsVariant)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[display("started")]
    Started,
    #[display("running")]
    Running,
    #[display("completed")]
    Completed,
    #[display("error")]
    Error,
}

impl SessionStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Failure that terminates a session.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum SessionError {
    /// The stream broke or ended abnormally.
    #[display("transport error: {_0}")]
    Transport(#[error(not(source))] String),
    /// The producer reported a failure.
    #[display("simulation failed: {_0}")]
    Remote(#[error(not(source))] String),
    /// The stream delivered something that breaks the session's contract
    /// (an unparseable frame, a decreasing or out-of-plan episode index).
    #[display("protocol error: {_0}")]
    Protocol(#[error(not(source))] String),
}

impl SessionError {
    /// The message without the category prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Transport(m) | Self::Remote(m) | Self::Protocol(m) => m,
        }
    }
}

/// Lifecycle of one run.
///
/// `Started` on acknowledgment, `Running` on the first record, then one of
/// the terminal states. Transitions out of a terminal state are ignored.
#[derive(Debug, Clone)]
pub struct SimulationSession {
    id: SessionId,
    algorithm: Algorithm,
    status: SessionStatus,
    total_episodes_planned: u32,
    error: Option<SessionError>,
}

impl SimulationSession {
    #[must_use]
    pub fn new(id: SessionId, algorithm: Algorithm, total_episodes_planned: u32) -> Self {
        tracing::debug!(%id, %algorithm, total_episodes_planned, "session started");
        Self {
            id,
            algorithm,
            status: SessionStatus::Started,
            total_episodes_planned,
            error: None,
        }
    }

    #[must_use]
    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub const fn total_episodes_planned(&self) -> u32 {
        self.total_episodes_planned
    }

    #[must_use]
    pub const fn error(&self) -> Option<&SessionError> {
        self.error.as_ref()
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Changes the episode budget of a run that is still producing.
    pub(crate) fn replan(&mut self, total_episodes_planned: u32) {
        if !self.is_terminal() && total_episodes_planned != self.total_episodes_planned {
            tracing::debug!(
                id = %self.id,
                from = self.total_episodes_planned,
                to = total_episodes_planned,
                "session replanned"
            );
            self.total_episodes_planned = total_episodes_planned;
        }
    }

    /// Marks the first record. Returns `true` on an actual transition.
    pub fn mark_running(&mut self) -> bool {
        self.transition(SessionStatus::Running, |s| s == SessionStatus::Started)
    }

    pub fn complete(&mut self) -> bool {
        self.transition(SessionStatus::Completed, |s| !s.is_terminal())
    }

    pub fn fail(&mut self, error: SessionError) -> bool {
        let changed = self.transition(SessionStatus::Error, |s| !s.is_terminal());
        if changed {
            self.error = Some(error);
        }
        changed
    }

    fn transition(&mut self, to: SessionStatus, allowed: impl FnOnce(SessionStatus) -> bool) -> bool {
        if !allowed(self.status) {
            return false;
        }
        tracing::debug!(id = %self.id, from = %self.status, %to, "session status");
        self.status = to;
        true
    }
}

type StepListener = Box<dyn FnMut(&StepRecord)>;
type ErrorListener = Box<dyn FnMut(&SessionError)>;
type CompleteListener = Box<dyn FnMut()>;

/// Registered session callbacks.
#[derive(Default)]
pub struct Listeners {
    on_step: Vec<StepListener>,
    on_error: Vec<ErrorListener>,
    on_complete: Vec<CompleteListener>,
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("on_step", &self.on_step.len())
            .field("on_error", &self.on_error.len())
            .field("on_complete", &self.on_complete.len())
            .finish()
    }
}

impl Listeners {
    pub fn on_step(&mut self, f: impl FnMut(&StepRecord) + 'static) {
        self.on_step.push(Box::new(f));
    }

    pub fn on_error(&mut self, f: impl FnMut(&SessionError) + 'static) {
        self.on_error.push(Box::new(f));
    }

    pub fn on_complete(&mut self, f: impl FnMut() + 'static) {
        self.on_complete.push(Box::new(f));
    }

    pub fn emit_step(&mut self, record: &StepRecord) {
        for f in &mut self.on_step {
            f(record);
        }
    }

    pub fn emit_error(&mut self, error: &SessionError) {
        for f in &mut self.on_error {
            f(error);
        }
    }

    pub fn emit_complete(&mut self) {
        for f in &mut self.on_complete {
            f();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::core::AgentState;

    fn session() -> SimulationSession {
        SimulationSession::new(SessionId::new("s-1"), Algorithm::QLearning, 10)
    }

    #[test]
    fn test_lifecycle() {
        let mut s = session();
        assert_eq!(s.status(), SessionStatus::Started);
        assert!(s.mark_running());
        assert!(!s.mark_running());
        assert!(s.complete());
        assert!(s.is_terminal());
    }

    #[test]
    fn test_no_transition_after_terminal() {
        let mut s = session();
        assert!(s.fail(SessionError::Remote("oom".to_owned())));
        assert!(!s.complete());
        assert!(!s.mark_running());
        assert!(!s.fail(SessionError::Transport("late".to_owned())));
        assert_eq!(s.status(), SessionStatus::Error);
        assert_eq!(s.error().map(SessionError::message), Some("oom"));
    }

    #[test]
    fn test_completion_straight_from_started() {
        let mut s = session();
        assert!(s.complete());
        assert_eq!(s.status(), SessionStatus::Completed);
    }

    #[test]
    fn test_listeners_fire_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut listeners = Listeners::default();
        for name in ["a", "b"] {
            let log = Rc::clone(&log);
            listeners.on_step(move |r| log.borrow_mut().push(format!("{name}:{}", r.episode_index)));
        }
        let log_complete = Rc::clone(&log);
        listeners.on_complete(move || log_complete.borrow_mut().push("done".to_owned()));

        listeners.emit_step(&StepRecord::new(4, 0.0, AgentState::Arm(0), 0));
        listeners.emit_complete();
        assert_eq!(*log.borrow(), vec!["a:4", "b:4", "done"]);
    }
}
