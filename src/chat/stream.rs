//! Streamed chat rendering.
//!
//! The completion body is an SSE-style stream of `data: {json}` lines with
//! a terminal `data: [DONE]`. Chunks carry regular content and, for
//! reasoning-capable models, a separate `reasoning_content` field rendered
//! in a visually distinct region.

use std::io::Write;

use crate::runner::{ChatStreamResponse, ClientError, LineReader, Result};

const ITALIC: &str = "\x1b[3m";
const WHITE: &str = "\x1b[37m";
const RESET: &str = "\x1b[0m";

/// Printer state: which region the previous fragment belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrinterState {
    None,
    Content,
    Reasoning,
}

/// Renders the chat stream to `out`, splitting reasoning and content.
/// Returns the captured content fragments in arrival order; their
/// concatenation is exactly what the server emitted.
pub async fn render(response: reqwest::Response, out: &mut dyn Write) -> Result<Vec<String>> {
    let mut lines = LineReader::new(response);
    let mut state = PrinterState::None;
    let mut captured = Vec::new();

    while let Some(line) = lines.next_line().await? {
        if line.is_empty() {
            continue;
        }
        let Some(data) = line.strip_prefix("data: ") else {
            continue;
        };
        if data == "[DONE]" {
            break;
        }

        let chunk: ChatStreamResponse = serde_json::from_str(data).map_err(|err| {
            ClientError::StreamProtocol(format!("error parsing stream response: {err}"))
        })?;
        let Some(choice) = chunk.choices.first() else {
            continue;
        };

        if !choice.delta.reasoning_content.is_empty() {
            if state == PrinterState::Content {
                write_fragment(out, "\n\n");
            }
            if state != PrinterState::Reasoning {
                write_fragment(out, &format!("{ITALIC}Thinking:{RESET}\n"));
            }
            state = PrinterState::Reasoning;
            write_fragment(
                out,
                &format!("{ITALIC}{WHITE}{}{RESET}", choice.delta.reasoning_content),
            );
        }
        if !choice.delta.content.is_empty() {
            if state == PrinterState::Reasoning {
                write_fragment(out, "\n\n");
            }
            state = PrinterState::Content;
            write_fragment(out, &choice.delta.content);
            captured.push(choice.delta.content.clone());
        }
    }

    Ok(captured)
}

/// Fragments are flushed immediately so output keeps pace with the server.
fn write_fragment(out: &mut dyn Write, fragment: &str) {
    let _ = out.write_all(fragment.as_bytes());
    let _ = out.flush();
}

#[cfg(test)]
mod tests {
    // The full state machine is exercised against a live mock server in
    // tests/chat_stream.rs; only the framing-independent pieces live here.

    #[test]
    fn printer_states_are_distinct() {
        use super::PrinterState;
        assert_ne!(PrinterState::None, PrinterState::Content);
        assert_ne!(PrinterState::Content, PrinterState::Reasoning);
    }
}
