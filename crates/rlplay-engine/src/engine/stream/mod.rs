//! Session stream client.
//!
//! A remote run is consumed as a sequence of frames:
//!
//! - [`sse`] decodes the server-sent event framing into payload strings
//! - [`Frame::parse`] classifies a payload into a control signal or a record
//! - a [`Transport`] delivers payloads without blocking the caller
//! - [`StreamHandle`] ties these together and enforces the delivery contract
//!   (transient faults are swallowed, a terminal signal fires once, nothing is
//!   delivered after it)

pub use self::{client::*, frame::*, transport::*};

mod client;
mod frame;
pub mod sse;
mod transport;
