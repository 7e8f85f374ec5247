//! Host Function Bridge
//!
//! Native functions exposed to every script environment. There is one
//! script-visible function, `log`, plus [`HostBridge::emit_line`] which the
//! host uses for its own notices so they share the same output lock.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

/// Argument value handed from a script to a host function
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    String(String),
    /// Object, carrying the engine's string conversion of it
    Object(String),
    Number(f64),
    Bool(bool),
    Null,
    Undefined,
    /// Raw guest bytes that are not valid text
    Bytes(Vec<u8>),
}

impl ScriptValue {
    /// Short kind name used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Object(_) => "object",
            Self::Number(_) => "number",
            Self::Bool(_) => "boolean",
            Self::Null => "null",
            Self::Undefined => "undefined",
            Self::Bytes(_) => "bytes",
        }
    }

    /// String conversion; only strings and objects are loggable
    fn to_log_text(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Object(s) => Some(s),
            _ => None,
        }
    }
}

/// Host function failure
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Argument kind that `log` cannot convert
    #[error("invalid argument {index}: cannot log a value of kind {kind}")]
    InvalidArgument { index: usize, kind: &'static str },

    /// Writing to the output stream failed
    #[error("output write failed: {0}")]
    Io(#[from] io::Error),
}

/// Serialized output sink shared by all environments
pub struct HostBridge {
    out: Mutex<Box<dyn Write + Send>>,
}

impl fmt::Debug for HostBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBridge").finish_non_exhaustive()
    }
}

impl HostBridge {
    /// Bridge writing to the process's standard output
    pub fn stdout() -> Self {
        Self::with_writer(io::stdout())
    }

    /// Bridge writing to an arbitrary sink
    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(writer)),
        }
    }

    /// `log(args...)` as seen by scripts
    ///
    /// Arguments are converted to text, joined by single spaces and written
    /// as one flushed line. The whole sequence holds the output lock, so
    /// lines from concurrent environments never interleave.
    pub fn log(&self, args: &[ScriptValue]) -> Result<(), BridgeError> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);

        let mut line = String::new();
        for (index, arg) in args.iter().enumerate() {
            let text = arg.to_log_text().ok_or(BridgeError::InvalidArgument {
                index,
                kind: arg.kind(),
            })?;
            if index > 0 {
                line.push(' ');
            }
            line.push_str(text);
        }
        line.push('\n');

        out.write_all(line.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    /// Write a host notice under the same lock as script output
    pub fn emit_line(&self, line: &str) -> Result<(), BridgeError> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{}", line)?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::SharedBuffer;
    use std::sync::Arc;

    fn s(text: &str) -> ScriptValue {
        ScriptValue::String(text.to_string())
    }

    #[test]
    fn test_log_joins_with_single_space() {
        let buffer = SharedBuffer::new();
        let bridge = HostBridge::with_writer(buffer.clone());

        bridge
            .log(&[s("hello"), ScriptValue::Object("[object Object]".into()), s("x")])
            .unwrap();

        assert_eq!(buffer.contents(), "hello [object Object] x\n");
    }

    #[test]
    fn test_log_no_arguments_writes_empty_line() {
        let buffer = SharedBuffer::new();
        let bridge = HostBridge::with_writer(buffer.clone());
        bridge.log(&[]).unwrap();
        assert_eq!(buffer.contents(), "\n");
    }

    #[test]
    fn test_log_rejects_non_text_arguments() {
        let buffer = SharedBuffer::new();
        let bridge = HostBridge::with_writer(buffer.clone());

        for bad in [
            ScriptValue::Number(1.0),
            ScriptValue::Bool(true),
            ScriptValue::Null,
            ScriptValue::Undefined,
            ScriptValue::Bytes(vec![0xff]),
        ] {
            let err = bridge.log(&[s("ok"), bad.clone()]).unwrap_err();
            match err {
                BridgeError::InvalidArgument { index, kind } => {
                    assert_eq!(index, 1);
                    assert_eq!(kind, bad.kind());
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        // Nothing is written for a rejected call
        assert_eq!(buffer.contents(), "");
    }

    #[test]
    fn test_emit_line() {
        let buffer = SharedBuffer::new();
        let bridge = HostBridge::with_writer(buffer.clone());
        bridge.emit_line("all scripts finished").unwrap();
        assert_eq!(buffer.contents(), "all scripts finished\n");
    }

    #[test]
    fn test_concurrent_logs_never_interleave() {
        const THREADS: usize = 8;
        const LINES: usize = 200;

        let buffer = SharedBuffer::new();
        let bridge = Arc::new(HostBridge::with_writer(buffer.clone()));

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let bridge = Arc::clone(&bridge);
                std::thread::spawn(move || {
                    let word = format!("word{t}_{}", "x".repeat(t * 7));
                    for _ in 0..LINES {
                        bridge.log(&[ScriptValue::String(word.clone())]).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let contents = buffer.contents();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), THREADS * LINES);
        for t in 0..THREADS {
            let expected = format!("word{t}_{}", "x".repeat(t * 7));
            assert_eq!(lines.iter().filter(|l| **l == expected).count(), LINES);
        }
    }
}
