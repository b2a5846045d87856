use super::debug::HttpDebugConfig;
use crate::trace::SessionTrace;
use reqwest::Client;
use reqwest::header::HeaderMap;
use serde::Serialize;
use std::fmt;
use std::io::{self, Write};
#[cfg(test)]
use std::sync::{Arc, Mutex};

/// Status and body of a completed exchange. Non-2xx statuses are returned
/// here rather than as errors so callers can map them themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Sent,
    Received,
}

impl Direction {
    fn arrow(self) -> char {
        match self {
            Self::Sent => '>',
            Self::Received => '<',
        }
    }
}

#[derive(Clone)]
enum DebugSink {
    Stderr,
    #[cfg(test)]
    Memory(Arc<Mutex<Vec<String>>>),
}

impl DebugSink {
    fn emit(&self, lines: Vec<String>) {
        match self {
            Self::Stderr => {
                let mut stderr = io::stderr().lock();
                for line in lines {
                    let _ = writeln!(stderr, "{line}");
                }
            }
            #[cfg(test)]
            Self::Memory(buffer) => {
                if let Ok(mut buffer) = buffer.lock() {
                    buffer.extend(lines);
                }
            }
        }
    }
}

/// JSON-over-HTTP client for the model service. Every exchange is copied
/// verbatim to the session trace and, with `--http-debug`, shown redacted on
/// stderr.
#[derive(Clone)]
pub struct HttpClient {
    inner: Client,
    debug: HttpDebugConfig,
    sink: DebugSink,
    trace: Option<SessionTrace>,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("debug", &self.debug)
            .field("traced", &self.trace.is_some())
            .finish()
    }
}

impl HttpClient {
    pub fn new(inner: Client, debug: HttpDebugConfig) -> Self {
        Self {
            inner,
            debug,
            sink: DebugSink::Stderr,
            trace: None,
        }
    }

    pub fn with_trace(mut self, trace: SessionTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    #[cfg(test)]
    fn with_memory_sink(inner: Client, debug: HttpDebugConfig) -> (Self, Arc<Mutex<Vec<String>>>) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let client = Self {
            sink: DebugSink::Memory(Arc::clone(&buffer)),
            ..Self::new(inner, debug)
        };
        (client, buffer)
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        bearer_token: Option<&str>,
        payload: &T,
    ) -> Result<HttpReply, reqwest::Error> {
        let body_json = serde_json::to_string(payload)
            .unwrap_or_else(|err| format!("{{\"_serialization_error\":\"{err}\"}}"));

        let mut builder = self.inner.post(url).json(payload);
        if let Some(token) = bearer_token {
            builder = builder.bearer_auth(token);
        }
        let request = builder.build()?;
        self.record_request(&request, &body_json);

        let response = self
            .inner
            .execute(request)
            .await
            .inspect_err(|err| self.record_failure(err))?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .inspect_err(|err| self.record_failure(err))?;
        self.record_response(status, &headers, &body);

        Ok(HttpReply { status, body })
    }

    fn record_request(&self, request: &reqwest::Request, body: &str) {
        let method = request.method().as_str();
        if let Some(trace) = &self.trace {
            let start = format!("{method} {}", request.url());
            trace.log_http("http.in", &start, request.headers(), body);
        }
        if self.debug.enabled {
            let start = format!("{method} {}", self.debug.show_url(request.url()));
            self.sink.emit(debug_lines(
                self.debug,
                Direction::Sent,
                &start,
                request.headers(),
                body,
            ));
        }
    }

    fn record_response(&self, status: u16, headers: &HeaderMap, body: &str) {
        if let Some(trace) = &self.trace {
            trace.log_http("http.out", &format!("HTTP {status}"), headers, body);
        }
        if self.debug.enabled {
            let start = format!("HTTP {status}");
            self.sink.emit(debug_lines(
                self.debug,
                Direction::Received,
                &start,
                headers,
                body,
            ));
        }
    }

    fn record_failure(&self, err: &reqwest::Error) {
        if let Some(trace) = &self.trace {
            trace.log_http_error(&err.to_string());
        }
        if self.debug.enabled {
            self.sink.emit(vec![format!("[http-debug] ! {err}")]);
        }
    }
}

/// Start line, headers, a blank separator, then the body line by line.
fn debug_lines(
    debug: HttpDebugConfig,
    direction: Direction,
    start: &str,
    headers: &HeaderMap,
    body: &str,
) -> Vec<String> {
    let arrow = direction.arrow();
    let mut lines = vec![format!("[http-debug] {arrow} {start}")];
    lines.extend(headers.iter().map(|(name, value)| {
        format!(
            "[http-debug] {arrow} {}: {}",
            name.as_str(),
            debug.show_header(name.as_str(), value)
        )
    }));
    lines.push(format!("[http-debug] {arrow}"));

    let body = debug.show_body(body);
    if body.is_empty() {
        lines.push(format!("[http-debug] {arrow} <empty body>"));
    } else {
        lines.extend(body.lines().map(|line| format!("[http-debug] {arrow} {line}")));
    }
    lines
}
