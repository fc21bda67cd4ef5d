use std::{
    io::{BufRead, BufReader},
    sync::mpsc::Sender,
    thread,
    time::Duration,
};

use reqwest::{
    blocking::{Client, Response},
    header::ACCEPT,
};
use rlplay_engine::{
    BackendError, ChannelTransport, RunAck, RunRequest, SessionId, SimulationBackend, Transport,
    TransportEvent, stream::sse::SseEvents,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Simulation backend reached over HTTP.
///
/// Runs are submitted with `POST /api/simulate`; frames arrive as server-sent
/// events from `GET /api/simulate/stream/{id}`, read on a dedicated thread
/// and handed over through a [`ChannelTransport`].
#[derive(Debug)]
pub struct HttpBackend {
    base_url: String,
    client: Client,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        // no overall timeout: the stream stays open for the whole run
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(None)
            .build()?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }
}

impl SimulationBackend for HttpBackend {
    fn start(&mut self, request: &RunRequest) -> Result<RunAck, BackendError> {
        let url = join_url(&self.base_url, "/api/simulate");
        tracing::debug!(%url, algorithm = %request.algorithm, "submitting run");
        let response = self
            .client
            .post(url)
            .timeout(REQUEST_TIMEOUT)
            .json(request)
            .send()
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        let response = check_status(response)?;
        response
            .json::<RunAck>()
            .map_err(|e| BackendError::Rejected(format!("malformed acknowledgment: {e}")))
    }

    fn open_stream(&mut self, id: &SessionId) -> Result<Box<dyn Transport>, BackendError> {
        let url = join_url(&self.base_url, &format!("/api/simulate/stream/{id}"));
        tracing::debug!(%url, "opening stream");
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        let response = check_status(response)?;

        let (tx, transport) = ChannelTransport::pair();
        thread::Builder::new()
            .name(format!("sse-{id}"))
            .spawn(move || forward_events(BufReader::new(response), &tx))
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        Ok(Box::new(transport))
    }
}

fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .unwrap_or_else(|_| "<unavailable>".to_string());
    Err(BackendError::Rejected(format!("{status}: {body}")))
}

/// Pushes every SSE payload of `reader` into `tx` until the stream ends,
/// fails, or the receiving side is closed.
fn forward_events<R>(reader: R, tx: &Sender<TransportEvent>)
where
    R: BufRead,
{
    for payload in SseEvents::new(reader) {
        let event = match payload {
            Ok(frame) => TransportEvent::Frame(frame),
            Err(e) => {
                tracing::warn!(error = %e, "stream read failed");
                _ = tx.send(TransportEvent::Fault {
                    closed: true,
                    message: e.to_string(),
                });
                return;
            }
        };
        if tx.send(event).is_err() {
            tracing::trace!("stream closed by receiver");
            return;
        }
    }
    _ = tx.send(TransportEvent::Ended);
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Cursor, sync::mpsc};

    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("http://localhost:8000/", "/api/simulate"),
            "http://localhost:8000/api/simulate"
        );
        assert_eq!(
            join_url("http://localhost:8000", "api/simulate"),
            "http://localhost:8000/api/simulate"
        );
    }

    #[test]
    fn test_forward_events_ends_stream() {
        let (tx, rx) = mpsc::channel();
        let body = "data: {\"status\": \"started\"}\n\n: keep-alive\n\ndata: {\"episode\": 0}\n\n";
        forward_events(Cursor::new(body), &tx);
        let events = rx.try_iter().collect::<Vec<_>>();
        assert_eq!(
            events,
            vec![
                TransportEvent::Frame(r#"{"status": "started"}"#.to_owned()),
                TransportEvent::Frame(r#"{"episode": 0}"#.to_owned()),
                TransportEvent::Ended,
            ]
        );
    }

    #[test]
    fn test_forward_events_stops_when_closed() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        // must return instead of looping on a dead channel
        forward_events(Cursor::new("data: 1\n\ndata: 2\n\n"), &tx);
    }
}
