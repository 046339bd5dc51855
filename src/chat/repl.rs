//! Interactive chat loop.
//!
//! A rustyline editor drives the prompt: Enter submits, Ctrl-C/Ctrl-D are
//! translated into `/bye`, and a hinter surfaces slash commands and history
//! suggestions inline. Up/Down are bound to the persisted history store's
//! own cursor rather than rustyline's built-in history, so navigation and
//! suggestions share one source of truth. Prompts opening with `"""`/`'''`
//! switch into multi-line capture.
//!
//! The editor blocks on the terminal, so it lives on a dedicated blocking
//! thread; the async loop requests one line at a time over channels.

use std::sync::{Arc, Mutex};

use anyhow::{Context as _, Result};
use rustyline::error::ReadlineError;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::{
    Cmd, Completer, ConditionalEventHandler, Editor, Event, EventContext, EventHandler, Helper,
    Highlighter, KeyCode, KeyEvent, Modifiers, Movement, RepeatCount, Validator,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::runner::{ClientError, RunnerClient};

use super::history::History;
use super::{multiline, stream};

const HELP_COMMANDS: &str = r#"Available Commands:
  /bye          Exit
  /copy         Copy the last response to the clipboard
  /?, /help     Show this help
  /? shortcuts  Help for keyboard shortcuts

Use """ to begin and end a multi-line message."#;

const HELP_SHORTCUTS: &str = r#"Available keyboard shortcuts:
  Ctrl + a      Move to the beginning of the line (Home)
  Ctrl + e      Move to the end of the line (End)
   Alt + b      Move left
   Alt + f      Move right
  Ctrl + k      Delete the sentence after the cursor
  Ctrl + u      Delete the sentence before the cursor
  Ctrl + w      Delete the word before the cursor
  Ctrl + d      Delete the character under the cursor"#;

const HELP_UNKNOWN_COMMAND: &str = "Unknown command...";
const HELP_NOTHING_TO_COPY: &str = "Nothing to copy...";
const HELP_COPIED: &str = "Done! Response copied to clipboard.";
const PLACEHOLDER: &str = "Start chatting! (/bye to quit, /? for help)";

const SLASH_COMMANDS: &[&str] = &["/help", "/bye", "/copy", "/?", "/? shortcuts"];

const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Prompt helper: inline hints for slash commands, history suggestions, and
/// the first-turn placeholder.
#[derive(Completer, Helper, Highlighter, Validator)]
struct PromptHelper {
    history: Arc<Mutex<History>>,
    placeholder: Arc<Mutex<Option<String>>>,
}

impl Hinter for PromptHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos < line.len() {
            return None;
        }
        if line.is_empty() {
            let placeholder = self.placeholder.lock().expect("placeholder poisoned");
            return placeholder
                .as_ref()
                .map(|text| format!("{DIM}{text}{RESET}"));
        }
        if line == "/" {
            return SLASH_COMMANDS
                .first()
                .map(|command| command[1..].to_string());
        }
        let history = self.history.lock().expect("history poisoned");
        history
            .suggestions(line)
            .first()
            .and_then(|suggestion| suggestion.get(line.len()..))
            .filter(|rest| !rest.is_empty())
            .map(|rest| rest.to_string())
    }
}

/// Navigation state for one prompt: the history index starts at -1 and
/// survives keystrokes until the line is submitted.
struct HistoryCursor {
    history: Arc<Mutex<History>>,
    index: Mutex<isize>,
}

impl HistoryCursor {
    fn reset(&self) {
        *self.index.lock().expect("history cursor poisoned") = -1;
    }
}

/// Binds one arrow direction to the history walk.
struct HistoryKeyHandler {
    cursor: Arc<HistoryCursor>,
    forward: bool,
}

impl ConditionalEventHandler for HistoryKeyHandler {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        ctx: &EventContext,
    ) -> Option<Cmd> {
        let history = self.cursor.history.lock().expect("history poisoned");
        let mut index = self.cursor.index.lock().expect("history cursor poisoned");
        let (text, new_index, _cursor_pos) = if self.forward {
            history.next(ctx.line(), ctx.pos(), *index)
        } else {
            history.previous(ctx.line(), ctx.pos(), *index)
        };
        *index = new_index;
        if text == ctx.line() {
            return Some(Cmd::Noop);
        }
        // Replacing the whole buffer leaves the cursor at the end of the
        // recalled entry.
        Some(Cmd::Replace(Movement::WholeBuffer, Some(text)))
    }
}

/// One submitted prompt, or the reason the editor stopped.
enum ReadlineEvent {
    Line(String),
    Bye,
    Error(String),
}

fn print_help(status: &str) {
    println!("{status}");
    println!();
}

fn copy_to_clipboard(text: &str) {
    // Clipboard access is best-effort; headless sessions go without.
    if let Ok(mut clipboard) = arboard::Clipboard::new() {
        let _ = clipboard.set_text(text.to_string());
    }
}

/// Runs the interactive chat loop until `/bye` or a failed chat turn.
pub async fn run(
    client: &RunnerClient,
    backend: Option<&str>,
    model: &str,
    api_key: Option<&str>,
    history: History,
    cancel: &CancellationToken,
) -> Result<()> {
    println!("Interactive chat mode started. Type '/bye' to exit.");

    let history = Arc::new(Mutex::new(history));
    let placeholder = Arc::new(Mutex::new(Some(PLACEHOLDER.to_string())));

    let (request_tx, request_rx) = std::sync::mpsc::channel::<()>();
    let (line_tx, mut line_rx) = tokio::sync::mpsc::channel::<ReadlineEvent>(1);

    let editor_history = history.clone();
    let editor_placeholder = placeholder.clone();
    let editor_task = tokio::task::spawn_blocking(move || {
        let mut editor: Editor<PromptHelper, DefaultHistory> = match Editor::new() {
            Ok(editor) => editor,
            Err(err) => {
                let _ = line_tx.blocking_send(ReadlineEvent::Error(err.to_string()));
                return;
            }
        };
        editor.set_helper(Some(PromptHelper {
            history: editor_history.clone(),
            placeholder: editor_placeholder,
        }));
        // Esc abandons the current input.
        editor.bind_sequence(
            KeyEvent(KeyCode::Esc, Modifiers::NONE),
            Cmd::Kill(Movement::WholeLine),
        );
        let cursor = Arc::new(HistoryCursor {
            history: editor_history,
            index: Mutex::new(-1),
        });
        editor.bind_sequence(
            KeyEvent(KeyCode::Up, Modifiers::NONE),
            EventHandler::Conditional(Box::new(HistoryKeyHandler {
                cursor: cursor.clone(),
                forward: false,
            })),
        );
        editor.bind_sequence(
            KeyEvent(KeyCode::Down, Modifiers::NONE),
            EventHandler::Conditional(Box::new(HistoryKeyHandler {
                cursor: cursor.clone(),
                forward: true,
            })),
        );

        while request_rx.recv().is_ok() {
            cursor.reset();
            let event = match editor.readline("> ") {
                Ok(line) => ReadlineEvent::Line(line),
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => ReadlineEvent::Bye,
                Err(err) => ReadlineEvent::Error(err.to_string()),
            };
            let stop = !matches!(event, ReadlineEvent::Line(_));
            if line_tx.blocking_send(event).is_err() || stop {
                break;
            }
        }
    });

    let mut last_resp: Vec<String> = Vec::new();
    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin());

    let result = loop {
        if request_tx.send(()).is_err() {
            break Ok(());
        }
        let mut question = match line_rx.recv().await {
            Some(ReadlineEvent::Line(line)) => line,
            Some(ReadlineEvent::Bye) | None => break Ok(()),
            Some(ReadlineEvent::Error(err)) => {
                break Err(anyhow::anyhow!(err)).context("failed to read prompt")
            }
        };

        match question.as_str() {
            "/bye" => break Ok(()),
            _ if question.trim().is_empty() => continue,
            "/help" | "/?" => {
                print_help(HELP_COMMANDS);
                continue;
            }
            "/? shortcuts" => {
                print_help(HELP_SHORTCUTS);
                continue;
            }
            "/copy" => {
                if last_resp.is_empty() {
                    print_help(HELP_NOTHING_TO_COPY);
                } else {
                    copy_to_clipboard(&last_resp.concat());
                    print_help(HELP_COPIED);
                }
                continue;
            }
            _ if question.starts_with('/') => {
                print_help(HELP_UNKNOWN_COMMAND);
                continue;
            }
            _ if question.starts_with("\"\"\"") || question.starts_with("'''") => {
                let initial = format!("{question}\n");
                question = match multiline::read_multiline(cancel, &mut stdin, &initial).await {
                    Ok(question) => question,
                    Err(err) => break Err(err),
                };
            }
            _ => {}
        }

        let raw_input = question.clone();
        debug!(model, "sending chat turn");
        let response = match client
            .chat_completions(backend, model, &question, api_key)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                eprintln!("{}", chat_failure_message(&err));
                break Ok(());
            }
        };
        match stream::render(response, &mut std::io::stdout()).await {
            Ok(chunks) => last_resp = chunks,
            Err(err) => {
                eprintln!("{}", chat_failure_message(&err));
                break Ok(());
            }
        }

        let appended = history
            .lock()
            .expect("history poisoned")
            .append(&raw_input);
        if let Err(err) = appended {
            break Err(err).context("unable to update history");
        }

        // Placeholder only accompanies the very first prompt.
        placeholder.lock().expect("placeholder poisoned").take();
        println!();
    };

    drop(request_tx);
    let _ = editor_task.await;
    result
}

fn chat_failure_message(err: &ClientError) -> String {
    if err.is_not_running() {
        return "Failed to generate a response: Docker Model Runner is not running".to_string();
    }
    format!("Failed to generate a response: {err}")
}
