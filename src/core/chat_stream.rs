use futures_util::StreamExt;
use memchr::memchr;
use tokio::sync::mpsc;
use tracing::debug;

use crate::api::{GenerateChunk, GenerateRequest};
use crate::utils::url::construct_api_url;

#[derive(Clone, Debug)]
pub enum StreamMessage {
    Chunk(String),
    Error(String),
    End,
}

/// Handle one line of the newline-delimited JSON stream. Returns true when
/// the stream is finished and the task should stop reading.
///
/// Lines that do not parse as a generate chunk are skipped; the server
/// occasionally emits keep-alive blanks and the stream must survive them.
fn process_stream_line(
    line: &str,
    tx: &mpsc::UnboundedSender<(StreamMessage, u64)>,
    stream_id: u64,
) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }

    match serde_json::from_str::<GenerateChunk>(trimmed) {
        Ok(chunk) => {
            if let Some(error) = chunk.error {
                let _ = tx.send((StreamMessage::Error(format_api_error(&error)), stream_id));
                let _ = tx.send((StreamMessage::End, stream_id));
                return true;
            }

            if let Some(token) = chunk.response {
                if !token.is_empty() {
                    let _ = tx.send((StreamMessage::Chunk(token), stream_id));
                }
            }

            if chunk.done {
                let _ = tx.send((StreamMessage::End, stream_id));
                return true;
            }

            false
        }
        Err(e) => {
            debug!("skipping malformed stream line: {e}");
            false
        }
    }
}

/// Leftover bytes after the last newline, ready for parsing.
fn pending_line(buffer: &[u8]) -> Option<&str> {
    if buffer.is_empty() {
        return None;
    }
    std::str::from_utf8(buffer)
        .ok()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                serde_json::Value::Object(map) => map
                    .get("message")
                    .and_then(|message| message.as_str().map(str::to_owned)),
                _ => None,
            })
        });

    summary.map(|text| {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.trim().to_string()
    })
}

fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "Error: <empty response from server>".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(summary) = extract_error_summary(&json_value) {
            if !summary.is_empty() {
                return format!("Error: {summary}");
            }
        }
    }

    format!("Error: {trimmed}")
}

pub struct StreamParams {
    pub client: reqwest::Client,
    pub base_url: String,
    pub model: String,
    pub prompt: String,
    pub cancel_token: tokio_util::sync::CancellationToken,
    pub stream_id: u64,
}

#[derive(Clone)]
pub struct ChatStreamService {
    tx: mpsc::UnboundedSender<(StreamMessage, u64)>,
}

impl ChatStreamService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(StreamMessage, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn spawn_stream(&self, params: StreamParams) {
        let tx_clone = self.tx.clone();
        tokio::spawn(async move {
            let StreamParams {
                client,
                base_url,
                model,
                prompt,
                cancel_token,
                stream_id,
            } = params;

            let request = GenerateRequest {
                model,
                prompt,
                stream: true,
            };

            tokio::select! {
                _ = async {
                    let generate_url = construct_api_url(&base_url, "api/generate");
                    match client
                        .post(generate_url)
                        .header("Content-Type", "application/json")
                        .json(&request)
                        .send()
                        .await
                    {
                        Ok(response) => {
                            if !response.status().is_success() {
                                let error_text = response
                                    .text()
                                    .await
                                    .unwrap_or_else(|_| "<no body>".to_string());
                                let formatted_error = format_api_error(&error_text);
                                let _ = tx_clone
                                    .send((StreamMessage::Error(formatted_error), stream_id));
                                let _ = tx_clone.send((StreamMessage::End, stream_id));
                                return;
                            }

                            let mut stream = response.bytes_stream();
                            let mut buffer: Vec<u8> = Vec::new();

                            while let Some(chunk) = stream.next().await {
                                if cancel_token.is_cancelled() {
                                    return;
                                }

                                if let Ok(chunk_bytes) = chunk {
                                    buffer.extend_from_slice(&chunk_bytes);

                                    while let Some(newline_pos) = memchr(b'\n', &buffer) {
                                        let line_str = match std::str::from_utf8(&buffer[..newline_pos]) {
                                            Ok(s) => s.trim(),
                                            Err(e) => {
                                                debug!("invalid UTF-8 in stream: {e}");
                                                buffer.drain(..=newline_pos);
                                                continue;
                                            }
                                        };

                                        let should_end = process_stream_line(
                                            line_str,
                                            &tx_clone,
                                            stream_id,
                                        );
                                        buffer.drain(..=newline_pos);
                                        if should_end {
                                            return;
                                        }
                                    }
                                }
                            }

                            // Servers may end the stream without a trailing
                            // newline; flush whatever is left in the buffer.
                            if let Some(line_str) = pending_line(&buffer) {
                                if process_stream_line(line_str, &tx_clone, stream_id) {
                                    return;
                                }
                            }

                            let _ = tx_clone.send((StreamMessage::End, stream_id));
                        }
                        Err(e) => {
                            let formatted_error = format_api_error(&e.to_string());
                            let _ = tx_clone
                                .send((StreamMessage::Error(formatted_error), stream_id));
                            let _ = tx_clone.send((StreamMessage::End, stream_id));
                        }
                    }
                } => {}
                _ = cancel_token.cancelled() => {}
            }
        });
    }

    #[cfg(test)]
    pub fn send_for_test(&self, message: StreamMessage, stream_id: u64) {
        let _ = self.tx.send((message, stream_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_concatenate_in_order() {
        let (service, mut rx) = ChatStreamService::new();
        let stream_id = 7;
        let lines = [
            r#"{"response":"Hel","done":false}"#,
            r#"{"response":"lo, ","done":false}"#,
            r#"{"response":"world","done":false}"#,
            r#"{"response":"","done":true}"#,
        ];

        for line in &lines {
            process_stream_line(line, &service.tx, stream_id);
        }

        let mut collected = String::new();
        let mut ended = false;
        while let Ok((message, received_id)) = rx.try_recv() {
            assert_eq!(received_id, stream_id);
            match message {
                StreamMessage::Chunk(token) => collected.push_str(&token),
                StreamMessage::End => ended = true,
                other => panic!("unexpected message {other:?}"),
            }
        }

        assert_eq!(collected, "Hello, world");
        assert!(ended);
    }

    #[test]
    fn done_line_ends_the_stream() {
        let (service, mut rx) = ChatStreamService::new();

        assert!(!process_stream_line(
            r#"{"response":"hi","done":false}"#,
            &service.tx,
            1
        ));
        assert!(process_stream_line(
            r#"{"response":"","done":true}"#,
            &service.tx,
            1
        ));

        let (message, _) = rx.try_recv().expect("expected chunk");
        assert!(matches!(message, StreamMessage::Chunk(ref t) if t == "hi"));
        let (message, _) = rx.try_recv().expect("expected end");
        assert!(matches!(message, StreamMessage::End));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn malformed_lines_are_skipped_silently() {
        let (service, mut rx) = ChatStreamService::new();

        assert!(!process_stream_line("not json at all", &service.tx, 3));
        assert!(!process_stream_line("", &service.tx, 3));
        assert!(!process_stream_line("   ", &service.tx, 3));
        assert!(!process_stream_line(r#"{"unrelated":true}"#, &service.tx, 3));

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn error_field_routes_an_error_then_end() {
        let (service, mut rx) = ChatStreamService::new();

        assert!(process_stream_line(
            r#"{"error":"model 'nope' not found"}"#,
            &service.tx,
            9
        ));

        let (message, received_id) = rx.try_recv().expect("expected error message");
        assert_eq!(received_id, 9);
        match message {
            StreamMessage::Error(text) => {
                assert_eq!(text, "Error: model 'nope' not found");
            }
            other => panic!("expected error message, got {other:?}"),
        }

        let (message, _) = rx.try_recv().expect("expected end message");
        assert!(matches!(message, StreamMessage::End));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn final_line_without_newline_is_not_dropped() {
        let (service, mut rx) = ChatStreamService::new();

        // Stream closed mid-line; the leftover bytes still hold a full chunk
        let buffer: &[u8] = br#"{"response":"tail","done":true}"#;
        let line = pending_line(buffer).expect("leftover line");
        assert!(process_stream_line(line, &service.tx, 4));

        let (message, _) = rx.try_recv().expect("expected chunk");
        assert!(matches!(message, StreamMessage::Chunk(ref t) if t == "tail"));
        let (message, _) = rx.try_recv().expect("expected end");
        assert!(matches!(message, StreamMessage::End));

        // Nothing left over means nothing to parse
        assert!(pending_line(b"").is_none());
        assert!(pending_line(b"  \r").is_none());
    }

    #[test]
    fn format_api_error_summarizes_json_bodies() {
        assert_eq!(
            format_api_error(r#"{"error":"model overloaded"}"#),
            "Error: model overloaded"
        );
        assert_eq!(
            format_api_error(r#"{"error":{"message":"  too   many\nrequests "}}"#),
            "Error: too many requests"
        );
        assert_eq!(format_api_error("connection refused"), "Error: connection refused");
        assert_eq!(format_api_error("  "), "Error: <empty response from server>");
    }
}
