//! Line framing over a streamed HTTP response body.
//!
//! Both the NDJSON pull/push progress stream and the SSE-style chat stream
//! arrive as newline-delimited frames; this reader yields them one at a time
//! without buffering the whole body.

use futures_util::StreamExt;

use super::error::{ClientError, Result};

pub struct LineReader {
    stream: std::pin::Pin<
        Box<dyn futures_util::Stream<Item = std::result::Result<bytes::Bytes, reqwest::Error>> + Send>,
    >,
    buf: Vec<u8>,
    done: bool,
}

impl LineReader {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            stream: Box::pin(response.bytes_stream()),
            buf: Vec::new(),
            done: false,
        }
    }

    /// Returns the next line without its trailing `\n`/`\r\n`, or `None` at
    /// end of stream. A trailing unterminated line is yielded before `None`.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }

            if self.done {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                let line = String::from_utf8_lossy(&self.buf).into_owned();
                self.buf.clear();
                return Ok(Some(line));
            }

            match self.stream.next().await {
                Some(Ok(chunk)) => self.buf.extend_from_slice(&chunk),
                Some(Err(err)) => return Err(ClientError::Stream(err)),
                None => self.done = true,
            }
        }
    }
}
