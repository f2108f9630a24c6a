//! Server-sent-event driver.
//!
//! Reads the prediction's push feed and reduces it to one signal: the
//! remote job finished (`done`), it reported an error, or the connection
//! closed without a terminal event. The caller re-fetches final state on
//! `done` and falls back to polling on a silent disconnect, so push
//! delivery is an optimization and never a correctness requirement.

use futures::StreamExt;

use darkroom_core::error::GenerateError;

use crate::api::ReplicateApi;

// ---------------------------------------------------------------------------
// Frame parsing
// ---------------------------------------------------------------------------

/// One parsed server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name; `"message"` when the feed sent no `event:` field.
    pub event: String,
    /// Concatenated `data:` lines, newline-joined.
    pub data: String,
}

/// Incremental SSE field accumulator.
///
/// Feed it complete lines (no trailing newline); a blank line flushes
/// the accumulated fields into an [`SseEvent`].
#[derive(Debug, Default)]
pub struct SseParser {
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one line; returns a complete event on frame boundaries.
    pub fn push_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.flush();
        }
        // Comment lines keep the connection alive and carry nothing.
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // id / retry are irrelevant here.
            _ => {}
        }
        None
    }

    fn flush(&mut self) -> Option<SseEvent> {
        if self.event.is_none() && self.data.is_empty() {
            return None;
        }
        let event = self.event.take().unwrap_or_else(|| "message".to_string());
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent { event, data })
    }
}

// ---------------------------------------------------------------------------
// Stream driver
// ---------------------------------------------------------------------------

/// Outcome of watching a prediction's event feed.
#[derive(Debug, PartialEq, Eq)]
pub enum StreamSignal {
    /// The feed announced completion; re-fetch the handle for final state.
    Done,
    /// The feed announced an explicit error with this payload.
    Error(String),
    /// The connection closed without a terminal event; fall back to polling.
    Disconnected,
}

/// Subscribe to `stream_url` and watch for a terminal event.
///
/// Connection-level failures after subscription (mid-stream read errors,
/// clean EOF) report [`StreamSignal::Disconnected`] rather than failing:
/// polling remains available and authoritative. Only a non-2xx response
/// to the subscription itself is an error.
pub async fn watch_stream(
    api: &ReplicateApi,
    stream_url: &str,
) -> Result<StreamSignal, GenerateError> {
    let response = api.open_stream(stream_url).await.map_err(GenerateError::from)?;

    let mut body = response.bytes_stream();
    let mut parser = SseParser::new();
    let mut buffer = String::new();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(error = %e, "Event stream read failed, falling back to polling");
                return Ok(StreamSignal::Disconnected);
            }
        };

        buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(newline) = buffer.find('\n') {
            let line: String = buffer.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if let Some(sse) = parser.push_line(line) {
                match sse.event.as_str() {
                    "done" => return Ok(StreamSignal::Done),
                    "error" => return Ok(StreamSignal::Error(sse.data)),
                    other => {
                        tracing::trace!(event = other, "Ignoring non-terminal stream event");
                    }
                }
            }
        }
    }

    tracing::debug!("Event stream closed without terminal event");
    Ok(StreamSignal::Disconnected)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // -- parser --

    fn feed(parser: &mut SseParser, frame: &str) -> Vec<SseEvent> {
        frame
            .split('\n')
            .filter_map(|line| parser.push_line(line))
            .collect()
    }

    #[test]
    fn parses_named_event_with_data() {
        let mut parser = SseParser::new();
        let events = feed(&mut parser, "event: output\ndata: https://f/1.png\n\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: "output".into(),
                data: "https://f/1.png".into()
            }]
        );
    }

    #[test]
    fn data_only_defaults_to_message() {
        let mut parser = SseParser::new();
        let events = feed(&mut parser, "data: hello\n\n");
        assert_eq!(events[0].event, "message");
    }

    #[test]
    fn multiline_data_joined_with_newlines() {
        let mut parser = SseParser::new();
        let events = feed(&mut parser, "event: error\ndata: line one\ndata: line two\n\n");
        assert_eq!(events[0].data, "line one\nline two");
    }

    #[test]
    fn comments_and_unknown_fields_ignored() {
        let mut parser = SseParser::new();
        let events = feed(
            &mut parser,
            ": keepalive\nid: 7\nretry: 1000\nevent: done\ndata: {}\n\n",
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "done");
    }

    #[test]
    fn blank_line_without_fields_emits_nothing() {
        let mut parser = SseParser::new();
        assert!(feed(&mut parser, "\n\n").is_empty());
    }

    #[test]
    fn consecutive_frames_parse_independently() {
        let mut parser = SseParser::new();
        let events = feed(
            &mut parser,
            "event: output\ndata: a\n\nevent: done\ndata: {}\n\n",
        );
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event, "done");
    }

    // -- driver --

    fn sse_response(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .insert_header("content-type", "text/event-stream")
            .set_body_string(body.to_string())
    }

    #[tokio::test]
    async fn done_event_signals_completion() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/stream/p1"))
            .and(header("accept", "text/event-stream"))
            .respond_with(sse_response("event: output\ndata: partial\n\nevent: done\ndata: {}\n\n"))
            .mount(&server)
            .await;

        let api = ReplicateApi::new(server.uri(), "tok".into());
        let url = format!("{}/stream/p1", server.uri());
        let signal = watch_stream(&api, &url).await.unwrap();
        assert_eq!(signal, StreamSignal::Done);
    }

    #[tokio::test]
    async fn error_event_carries_payload() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/stream/p1"))
            .respond_with(sse_response("event: error\ndata: out of memory\n\n"))
            .mount(&server)
            .await;

        let api = ReplicateApi::new(server.uri(), "tok".into());
        let url = format!("{}/stream/p1", server.uri());
        let signal = watch_stream(&api, &url).await.unwrap();
        assert_eq!(signal, StreamSignal::Error("out of memory".into()));
    }

    #[tokio::test]
    async fn silent_close_reports_disconnected() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/stream/p1"))
            .respond_with(sse_response("event: output\ndata: partial\n\n"))
            .mount(&server)
            .await;

        let api = ReplicateApi::new(server.uri(), "tok".into());
        let url = format!("{}/stream/p1", server.uri());
        let signal = watch_stream(&api, &url).await.unwrap();
        assert_eq!(signal, StreamSignal::Disconnected);
    }

    #[tokio::test]
    async fn rejected_subscription_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/stream/p1"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such stream"))
            .mount(&server)
            .await;

        let api = ReplicateApi::new(server.uri(), "tok".into());
        let url = format!("{}/stream/p1", server.uri());
        assert!(watch_stream(&api, &url).await.is_err());
    }
}
