//! Streaming of child stdout/stderr into the log.

use std::io::{BufRead, BufReader, Read};

/// Which child stream a line came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum StreamType {
    Stdout,
    Stderr,
}

impl std::fmt::Display for StreamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

/// Log level chosen for one line of child output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LineLevel {
    Skip,
    Info,
    Warn,
    Error,
}

/// Extracts a human-readable message from a thread panic payload.
pub(super) fn panic_message(err: &(dyn std::any::Any + Send)) -> &str {
    err.downcast_ref::<&str>()
        .copied()
        .or_else(|| err.downcast_ref::<String>().map(|s| s.as_str()))
        .unwrap_or("unknown panic")
}

/// Reads a pipe line by line and logs each line under `program`.
///
/// stdout goes to INFO so apt progress is visible at the default level.
/// stderr goes to WARN, except apt's `E:` lines which go to ERROR.
/// Invalid UTF-8 is replaced lossily. A read error stops the reader without
/// failing the command; the exit status decides success.
pub(super) fn read_pipe_to_log<R: Read>(pipe: Option<R>, stream_type: StreamType, program: &str) {
    let Some(pipe) = pipe else {
        tracing::error!(
            stream = %stream_type,
            program,
            "pipe was None, no output will be captured"
        );
        return;
    };

    let mut reader = BufReader::new(pipe);
    let mut line_buf = Vec::new();

    loop {
        line_buf.clear();
        match reader.read_until(b'\n', &mut line_buf) {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line_buf);
                let line = text.trim_end_matches(['\n', '\r']);
                match classify(line, stream_type) {
                    LineLevel::Skip => {}
                    LineLevel::Info => tracing::info!(stream = %stream_type, program, "{}", line),
                    LineLevel::Warn => tracing::warn!(stream = %stream_type, program, "{}", line),
                    LineLevel::Error => tracing::error!(stream = %stream_type, program, "{}", line),
                }
            }
            Err(e) => {
                tracing::error!(
                    stream = %stream_type,
                    program,
                    error = %e,
                    "I/O error, stopping read"
                );
                break;
            }
        }
    }
}

fn classify(line: &str, stream_type: StreamType) -> LineLevel {
    if line.trim().is_empty() {
        return LineLevel::Skip;
    }
    match stream_type {
        StreamType::Stdout => LineLevel::Info,
        StreamType::Stderr if line.starts_with("E: ") => LineLevel::Error,
        StreamType::Stderr => LineLevel::Warn,
    }
}
