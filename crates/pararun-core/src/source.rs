//! Command source: turns input lines into argument vectors.
//!
//! One command per line. Lines are split on spaces (runs of spaces collapse,
//! no quoting or escaping) and the tokens are appended to the fixed prefix
//! argv supplied at startup. The stream is lazy, finite, and non-restartable.
//!
//! Malformed input is fatal for the whole run: a line without a terminating
//! newline, a line longer than [`MAX_LINE`], a line that is not UTF-8, or a
//! command with more than [`MAX_ARGS`] arguments all abort before any job is
//! launched for that line.

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::config::{MAX_ARGS, MAX_LINE};

/// Errors produced while reading and tokenizing input lines.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("input error. too long input line?\nbad line: {0}")]
    LineTooLong(String),
    #[error("input error. missing newline?\nbad line: {0}")]
    MissingNewline(String),
    #[error("input error. line is not valid UTF-8.")]
    NotUtf8,
    #[error("too many arguments for a command.")]
    TooManyArgs,
    #[error("empty command.\nbad line: {0}")]
    EmptyCommand(String),
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

/// Lazy reader of job argument vectors from a line-oriented stream.
pub struct CommandSource<R> {
    reader: R,
    prefix: Vec<String>,
    line: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> CommandSource<R> {
    pub fn new(reader: R, prefix: Vec<String>) -> Self {
        Self {
            reader,
            prefix,
            line: Vec::with_capacity(256),
        }
    }

    /// Read the next command, or `None` at end of input.
    ///
    /// The returned argv is the startup prefix followed by the line's tokens.
    pub async fn next_command(&mut self) -> Result<Option<Vec<String>>, SourceError> {
        self.line.clear();
        // Read one byte past the limit so an over-long line is distinguishable
        // from one that just fits.
        let mut limited = (&mut self.reader).take(MAX_LINE as u64 + 1);
        limited.read_until(b'\n', &mut self.line).await?;

        if self.line.is_empty() {
            return Ok(None);
        }
        if self.line.len() > MAX_LINE {
            let shown = String::from_utf8_lossy(&self.line).into_owned();
            return Err(SourceError::LineTooLong(truncate_for_display(&shown)));
        }
        if self.line.last() != Some(&b'\n') {
            let shown = String::from_utf8_lossy(&self.line).into_owned();
            return Err(SourceError::MissingNewline(shown));
        }
        self.line.pop();

        let text = std::str::from_utf8(&self.line).map_err(|_| SourceError::NotUtf8)?;

        let mut argv = self.prefix.clone();
        for token in text.split(' ').filter(|t| !t.is_empty()) {
            if argv.len() == MAX_ARGS {
                return Err(SourceError::TooManyArgs);
            }
            argv.push(token.to_string());
        }
        if argv.is_empty() {
            return Err(SourceError::EmptyCommand(text.to_string()));
        }

        Ok(Some(argv))
    }
}

/// Keep diagnostics for huge lines readable.
fn truncate_for_display(s: &str) -> String {
    const SHOWN: usize = 200;
    if s.len() <= SHOWN {
        return s.to_string();
    }
    let mut end = SHOWN;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(input: &str, prefix: &[&str]) -> CommandSource<&'static [u8]> {
        let input: &'static [u8] = Box::leak(input.as_bytes().to_vec().into_boxed_slice());
        CommandSource::new(input, prefix.iter().map(|s| s.to_string()).collect())
    }

    #[tokio::test]
    async fn test_basic_tokenization() {
        let mut src = source("echo hello world\n", &[]);
        let argv = src.next_command().await.unwrap().unwrap();
        assert_eq!(argv, vec!["echo", "hello", "world"]);
        assert!(src.next_command().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_prefix_prepended() {
        let mut src = source("file.txt\n", &["wc", "-l"]);
        let argv = src.next_command().await.unwrap().unwrap();
        assert_eq!(argv, vec!["wc", "-l", "file.txt"]);
    }

    #[tokio::test]
    async fn test_runs_of_spaces_collapse() {
        let mut src = source("echo   a  b\n", &[]);
        let argv = src.next_command().await.unwrap().unwrap();
        assert_eq!(argv, vec!["echo", "a", "b"]);
    }

    #[tokio::test]
    async fn test_multiple_lines_in_order() {
        let mut src = source("one\ntwo\nthree\n", &["echo"]);
        assert_eq!(src.next_command().await.unwrap().unwrap(), vec!["echo", "one"]);
        assert_eq!(src.next_command().await.unwrap().unwrap(), vec!["echo", "two"]);
        assert_eq!(src.next_command().await.unwrap().unwrap(), vec!["echo", "three"]);
        assert!(src.next_command().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_newline_is_fatal() {
        let mut src = source("echo unfinished", &[]);
        let err = src.next_command().await.unwrap_err();
        assert!(matches!(err, SourceError::MissingNewline(_)));
    }

    #[tokio::test]
    async fn test_over_long_line_is_fatal() {
        let line = format!("{}\n", "x".repeat(MAX_LINE + 10));
        let mut src = source(&line, &[]);
        let err = src.next_command().await.unwrap_err();
        assert!(matches!(err, SourceError::LineTooLong(_)));
    }

    #[tokio::test]
    async fn test_line_exactly_at_limit_is_fine() {
        // MAX_LINE includes the newline.
        let line = format!("{}\n", "y".repeat(MAX_LINE - 1));
        let mut src = source(&line, &[]);
        let argv = src.next_command().await.unwrap().unwrap();
        assert_eq!(argv.len(), 1);
        assert_eq!(argv[0].len(), MAX_LINE - 1);
    }

    #[tokio::test]
    async fn test_blank_line_without_prefix_is_fatal() {
        let mut src = source("\n", &[]);
        let err = src.next_command().await.unwrap_err();
        assert!(matches!(err, SourceError::EmptyCommand(_)));
    }

    #[tokio::test]
    async fn test_blank_line_with_prefix_runs_prefix_alone() {
        let mut src = source("\n", &["true"]);
        let argv = src.next_command().await.unwrap().unwrap();
        assert_eq!(argv, vec!["true"]);
    }

    #[tokio::test]
    async fn test_too_many_arguments() {
        let line = format!("{}\n", vec!["a"; MAX_ARGS + 1].join(" "));
        let mut src = source(&line, &[]);
        let err = src.next_command().await.unwrap_err();
        assert!(matches!(err, SourceError::TooManyArgs));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let mut src = source("", &["echo"]);
        assert!(src.next_command().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_fatal() {
        let bytes: &'static [u8] = Box::leak(vec![b'a', 0xff, 0xfe, b'\n'].into_boxed_slice());
        let mut src = CommandSource::new(bytes, vec![]);
        let err = src.next_command().await.unwrap_err();
        assert!(matches!(err, SourceError::NotUtf8));
    }
}
