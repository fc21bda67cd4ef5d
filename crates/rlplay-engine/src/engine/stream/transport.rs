use std::{
    collections::VecDeque,
    fmt,
    sync::mpsc::{self, Receiver, TryRecvError},
};

/// Raw event delivered by a stream transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One frame payload.
    Frame(String),
    /// A transport-level fault.
    ///
    /// `closed` reports whether the connection is definitively gone; a fault
    /// on a live connection is transient and the transport keeps going.
    Fault { closed: bool, message: String },
    /// The connection ended normally.
    Ended,
}

/// Non-blocking source of stream events.
pub trait Transport: fmt::Debug {
    /// Returns the next pending event, or `None` when nothing is available
    /// right now.
    fn poll(&mut self) -> Option<TransportEvent>;

    /// Releases the underlying connection. Must be idempotent.
    fn close(&mut self);
}

/// Transport fed through a channel, usually by a reader thread.
///
/// A sender that disconnects without an [`TransportEvent::Ended`] is reported
/// as a closed fault.
#[derive(Debug)]
pub struct ChannelTransport {
    rx: Option<Receiver<TransportEvent>>,
}

impl ChannelTransport {
    #[must_use]
    pub fn new(rx: Receiver<TransportEvent>) -> Self {
        Self { rx: Some(rx) }
    }

    /// Creates a connected sender/transport pair.
    #[must_use]
    pub fn pair() -> (mpsc::Sender<TransportEvent>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self::new(rx))
    }
}

impl Transport for ChannelTransport {
    fn poll(&mut self) -> Option<TransportEvent> {
        let rx = self.rx.as_ref()?;
        match rx.try_recv() {
            Ok(event) => {
                if event == TransportEvent::Ended {
                    self.rx = None;
                }
                Some(event)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.rx = None;
                Some(TransportEvent::Fault {
                    closed: true,
                    message: "stream reader stopped".to_owned(),
                })
            }
        }
    }

    fn close(&mut self) {
        // dropping the receiver makes the reader's next send fail
        self.rx = None;
    }
}

/// Transport replaying a fixed sequence of events.
///
/// Used for captured streams and tests. Once the queue is empty it reports
/// [`TransportEvent::Ended`] if `end_when_drained` is set, otherwise it just
/// stays idle (a live stream that has not produced anything yet).
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    events: VecDeque<TransportEvent>,
    end_when_drained: bool,
    closed: bool,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new<I>(events: I) -> Self
    where
        I: IntoIterator<Item = TransportEvent>,
    {
        Self {
            events: events.into_iter().collect(),
            end_when_drained: false,
            closed: false,
        }
    }

    /// Builds a transport from frame payloads, ending after the last one.
    #[must_use]
    pub fn from_frames<I, S>(frames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            end_when_drained: true,
            ..Self::new(frames.into_iter().map(|f| TransportEvent::Frame(f.into())))
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

impl Transport for ScriptedTransport {
    fn poll(&mut self) -> Option<TransportEvent> {
        if self.closed {
            return None;
        }
        match self.events.pop_front() {
            Some(event) => Some(event),
            None if self.end_when_drained => {
                self.closed = true;
                Some(TransportEvent::Ended)
            }
            None => None,
        }
    }

    fn close(&mut self) {
        self.closed = true;
        self.events.clear();
    }
}
