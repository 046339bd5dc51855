//! Multi-line prompt capture.
//!
//! A prompt opening with `"""` or `'''` switches the REPL into multi-line
//! mode: lines are read until one whose trimmed form equals or ends with
//! the opening delimiter. The closing delimiter is excised and trailing
//! newlines are trimmed. Reads select against cancellation so Ctrl-C does
//! not leave the loop stuck in a blocked read.

use anyhow::{bail, Context as _, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;

async fn read_line_cancellable<R>(
    cancel: &CancellationToken,
    reader: &mut R,
    buf: &mut String,
) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    tokio::select! {
        _ = cancel.cancelled() => bail!("cancelled"),
        read = reader.read_line(buf) => read.context("failed to read input"),
    }
}

/// Reads a multi-line string, starting from `initial_text` (the already
/// submitted first line, newline included) and continuing from `reader`.
pub async fn read_multiline<R>(
    cancel: &CancellationToken,
    reader: &mut R,
    initial_text: &str,
) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut pending = initial_text.to_string();
    while pending.len() < 3 {
        if read_line_cancellable(cancel, reader, &mut pending).await? == 0 {
            bail!("invalid multiline string prefix: {pending:?}");
        }
    }

    let prefix: String = pending.chars().take(3).collect();
    if prefix != "\"\"\"" && prefix != "'''" {
        bail!("invalid multiline string prefix: {prefix:?}");
    }
    // The delimiters are ASCII, so this split is char-boundary safe.
    let mut rest = pending.split_off(3);

    let mut question = String::new();
    loop {
        let line = loop {
            if let Some(pos) = rest.find('\n') {
                break rest.drain(..=pos).collect::<String>();
            }
            if read_line_cancellable(cancel, reader, &mut rest).await? == 0 {
                if rest.is_empty() {
                    bail!("unclosed multiline input: EOF");
                }
                break std::mem::take(&mut rest);
            }
        };

        question.push_str(&line);
        let trimmed = line.trim();
        if trimmed == prefix || trimmed.ends_with(prefix.as_str()) {
            break;
        }
        print!("... ");
        let _ = std::io::Write::flush(&mut std::io::stdout());
    }

    if let Some(idx) = question.rfind(prefix.as_str()) {
        question.replace_range(idx..idx + 3, "");
    }
    Ok(question.trim_end_matches('\n').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn capture(input: &str) -> Result<String> {
        let cancel = CancellationToken::new();
        let mut reader = tokio::io::BufReader::new(input.as_bytes());
        read_multiline(&cancel, &mut reader, "").await
    }

    async fn capture_chunked(input: &str) -> Result<String> {
        // The REPL hands over the already-read first line; make sure both
        // entry paths agree.
        let cancel = CancellationToken::new();
        let (first, rest) = match input.find('\n') {
            Some(pos) => input.split_at(pos + 1),
            None => (input, ""),
        };
        let mut reader = tokio::io::BufReader::new(rest.as_bytes());
        read_multiline(&cancel, &mut reader, first).await
    }

    #[tokio::test]
    async fn single_line_with_triple_quotes() {
        assert_eq!(capture(r#""""hello world""""#).await.unwrap(), "hello world");
        assert_eq!(capture_chunked(r#""""hello world""""#).await.unwrap(), "hello world");
    }

    #[tokio::test]
    async fn multiline_with_double_quotes() {
        let input = "\"\"\"tell\nme\na\njoke\"\"\"";
        assert_eq!(capture(input).await.unwrap(), "tell\nme\na\njoke");
        assert_eq!(capture_chunked(input).await.unwrap(), "tell\nme\na\njoke");
    }

    #[tokio::test]
    async fn multiline_with_single_quotes() {
        let input = "'''tell\nme\na\njoke'''";
        assert_eq!(capture(input).await.unwrap(), "tell\nme\na\njoke");
    }

    #[tokio::test]
    async fn closing_quotes_on_their_own_line_trim_the_newline() {
        let input = "\"\"\"first line\nsecond line\n\"\"\"";
        assert_eq!(capture(input).await.unwrap(), "first line\nsecond line");
    }

    #[tokio::test]
    async fn trailing_spaces_before_closing_quotes_survive() {
        let input = "\"\"\"first line\nsecond line   \"\"\"";
        assert_eq!(capture(input).await.unwrap(), "first line\nsecond line   ");
    }

    #[tokio::test]
    async fn empty_delimiter_pair_yields_empty_payload() {
        assert_eq!(capture(r#""""""""#).await.unwrap(), "");
        assert_eq!(capture("''''''").await.unwrap(), "");
    }

    #[tokio::test]
    async fn delimiter_then_newline_then_delimiter_is_empty() {
        assert_eq!(capture("\"\"\"\n\"\"\"").await.unwrap(), "");
    }

    #[tokio::test]
    async fn closing_quotes_mid_line_keep_inner_quotes() {
        assert_eq!(
            capture(r#""""foo"""bar""""#).await.unwrap(),
            r#"foo"""bar"#
        );
    }

    #[tokio::test]
    async fn empty_lines_are_preserved() {
        let input = "\"\"\"first line\n\nthird line\"\"\"";
        assert_eq!(capture(input).await.unwrap(), "first line\n\nthird line");
    }

    #[tokio::test]
    async fn unclosed_input_is_an_error() {
        let err = capture("\"\"\"foo\nbar\nbaz").await.unwrap_err();
        assert!(err.to_string().contains("unclosed multiline input"));
    }

    #[tokio::test]
    async fn bare_prefix_is_an_error() {
        assert!(capture(r#"""""#).await.is_err());
    }

    #[tokio::test]
    async fn invalid_prefix_is_an_error() {
        let err = capture(r#""foo bar""#).await.unwrap_err();
        assert!(err.to_string().contains("invalid multiline string prefix"));
    }

    #[tokio::test]
    async fn empty_input_is_an_error() {
        assert!(capture("").await.is_err());
    }

    #[tokio::test]
    async fn whitespace_only_body_is_preserved() {
        let input = "\"\"\"   \n   \n   \"\"\"";
        assert_eq!(capture(input).await.unwrap(), "   \n   \n   ");
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_blocked_read() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (_tx, rx) = tokio::io::duplex(16);
        let mut reader = tokio::io::BufReader::new(rx);
        let err = read_multiline(&cancel, &mut reader, "\"\"\"waiting\n")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }
}
