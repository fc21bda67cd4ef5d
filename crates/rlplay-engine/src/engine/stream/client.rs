use crate::{
    core::StepRecord,
    engine::session::{Listeners, SessionError},
};

use super::{
    frame::{Control, Frame},
    transport::{Transport, TransportEvent},
};

/// Receiver of classified stream events.
///
/// The sink sees a record before the handle's own callbacks do, and can
/// reject it; a rejection terminates the stream with that error.
pub trait StreamSink {
    fn on_data(&mut self, record: &StepRecord) -> Result<(), SessionError>;
    fn on_error(&mut self, error: &SessionError);
    fn on_complete(&mut self);
}

/// Sink that accepts everything, for handles used only through callbacks.
impl StreamSink for () {
    fn on_data(&mut self, _record: &StepRecord) -> Result<(), SessionError> {
        Ok(())
    }

    fn on_error(&mut self, _error: &SessionError) {}

    fn on_complete(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::IsVariant)]
pub enum StreamState {
    Open,
    Completed,
    Failed,
    Closed,
}

/// Subscription to one remote session's stream.
///
/// Turns raw transport events into record deliveries plus the completed and
/// error signals. Exactly one of those two terminal signals fires, at most
/// once; after it (or after [`StreamHandle::close`]) every event is dropped
/// and the transport is released.
#[derive(Debug)]
pub struct StreamHandle {
    transport: Box<dyn Transport>,
    state: StreamState,
    listeners: Listeners,
}

impl StreamHandle {
    #[must_use]
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            state: StreamState::Open,
            listeners: Listeners::default(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> StreamState {
        self.state
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.state.is_open()
    }

    pub fn on_data(&mut self, f: impl FnMut(&StepRecord) + 'static) {
        self.listeners.on_step(f);
    }

    pub fn on_error(&mut self, f: impl FnMut(&SessionError) + 'static) {
        self.listeners.on_error(f);
    }

    pub fn on_complete(&mut self, f: impl FnMut() + 'static) {
        self.listeners.on_complete(f);
    }

    /// Drains every event the transport has ready. Returns whether the
    /// stream is still open.
    pub fn pump(&mut self, sink: &mut dyn StreamSink) -> bool {
        while self.is_open() {
            let Some(event) = self.transport.poll() else {
                break;
            };
            self.deliver(event, sink);
        }
        self.is_open()
    }

    /// Processes one transport event.
    pub fn deliver(&mut self, event: TransportEvent, sink: &mut dyn StreamSink) {
        if !self.is_open() {
            tracing::trace!(state = ?self.state, ?event, "dropping event on closed stream");
            return;
        }
        match event {
            TransportEvent::Frame(payload) => match Frame::parse(&payload) {
                Ok(Frame::Data(record)) => {
                    if let Err(error) = sink.on_data(&record) {
                        self.fail(error, sink);
                    } else {
                        self.listeners.emit_step(&record);
                    }
                }
                Ok(Frame::Control(Control::Started)) => {
                    tracing::trace!("stream acknowledged");
                }
                Ok(Frame::Control(Control::Completed)) => {
                    self.state = StreamState::Completed;
                    self.transport.close();
                    sink.on_complete();
                    self.listeners.emit_complete();
                }
                Ok(Frame::Control(Control::Error(message))) => {
                    self.fail(SessionError::Remote(message), sink);
                }
                Err(e) => self.fail(SessionError::Protocol(e.to_string()), sink),
            },
            TransportEvent::Fault {
                closed: false,
                message,
            } => {
                tracing::debug!(%message, "transient stream fault");
            }
            TransportEvent::Fault {
                closed: true,
                message,
            } => self.fail(SessionError::Transport(message), sink),
            TransportEvent::Ended => self.fail(
                SessionError::Transport("stream ended before completion".to_owned()),
                sink,
            ),
        }
    }

    /// Unsubscribes. Has no effect once the stream is no longer open.
    pub fn close(&mut self) {
        if self.is_open() {
            self.state = StreamState::Closed;
            self.transport.close();
        }
    }

    fn fail(&mut self, error: SessionError, sink: &mut dyn StreamSink) {
        tracing::warn!(%error, "stream failed");
        self.state = StreamState::Failed;
        self.transport.close();
        sink.on_error(&error);
        self.listeners.emit_error(&error);
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.close();
    }
}
