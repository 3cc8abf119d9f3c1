use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{Dispatch, Level};

use crate::http::{HttpRequest, HttpResponse};
use crate::transport::{Transport, TransportError};

/// Replays queued responses in order and records every request it sees.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, status: u16, headers: Vec<(&str, &str)>, body: Vec<u8>) {
        self.responses.lock().push_back(Ok(HttpResponse {
            status,
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body,
        }));
    }

    pub fn push_json(&self, status: u16, body: &str) {
        self.push(
            status,
            vec![("Content-Type", "application/json")],
            body.as_bytes().to_vec(),
        );
    }

    pub fn fail(&self, message: &str) {
        self.responses
            .lock()
            .push_back(Err(TransportError(message.to_string())));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(request.clone());
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError("no scripted response left".to_string())))
    }
}

/// A log sink for asserting on emitted records.
#[derive(Clone, Default)]
pub(crate) struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// A plain-text `fmt` dispatch writing into this sink.
    pub fn dispatch(&self) -> Dispatch {
        let sink = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .with_max_level(Level::DEBUG)
            .finish();
        Dispatch::new(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
