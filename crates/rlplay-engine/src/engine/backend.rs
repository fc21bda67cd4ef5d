use std::fmt;

use serde::Deserialize;

use crate::{
    core::RunRequest,
    engine::{session::SessionId, stream::Transport},
};

/// Acknowledgment of a run request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunAck {
    pub session_id: SessionId,
    pub total_episodes: u32,
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum BackendError {
    #[display("no simulation backend is configured")]
    Unavailable,
    #[display("backend rejected the run: {_0}")]
    Rejected(#[error(not(source))] String),
    #[display("failed to reach the backend: {_0}")]
    Connection(#[error(not(source))] String),
}

/// The remote producer of grid-world runs.
///
/// `start` submits a run and returns its session; `open_stream` subscribes
/// to that session's frames. Both are called synchronously from the owning
/// [`Playground`](super::Playground), so a slow backend blocks only the
/// caller that started the run.
pub trait SimulationBackend: fmt::Debug {
    fn start(&mut self, request: &RunRequest) -> Result<RunAck, BackendError>;
    fn open_stream(&mut self, id: &SessionId) -> Result<Box<dyn Transport>, BackendError>;
}

/// Backend for purely local use; every remote run is refused.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackend;

impl SimulationBackend for NoBackend {
    fn start(&mut self, _request: &RunRequest) -> Result<RunAck, BackendError> {
        Err(BackendError::Unavailable)
    }

    fn open_stream(&mut self, _id: &SessionId) -> Result<Box<dyn Transport>, BackendError> {
        Err(BackendError::Unavailable)
    }
}
