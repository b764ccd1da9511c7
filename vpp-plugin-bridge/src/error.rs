//! Plugin error type
//!
//! Everything that can go wrong inside the plugin is an [`Error`]. Errors never cross the C ABI:
//! [`crate::boundary`] logs them and reduces them to a [`crate::abi::ResultCode`] or a negative
//! batch result.

use std::{any::Any, path::PathBuf};

use thiserror::Error;

/// Errors raised while building or driving a plugin context
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The configuration locator handed to init is not valid UTF-8
    #[error("configuration locator is not valid UTF-8")]
    InvalidLocator,
    /// The configuration file could not be read
    #[error("unable to read configuration file {}", path.display())]
    ConfigRead {
        /// Path named by the configuration locator
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
    /// The configuration is not well-formed JSON or has unknown fields
    #[error("malformed configuration")]
    ConfigParse(#[from] serde_json::Error),
    /// The configuration is well-formed but a value is out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The plugin context could not be allocated
    #[error("failed to allocate plugin context")]
    Alloc,
    /// A panic was caught before it could reach the caller
    #[error("panic: {0}")]
    Panic(String),
    /// The handle was created by a plugin exporting a different processor
    #[error("handle does not belong to this plugin")]
    HandleMismatch,
    /// The batch holds more buffers than the configured limit
    #[error("batch of {len} buffers exceeds the limit of {max}")]
    BatchTooLarge {
        /// Number of buffer references in the batch
        len: usize,
        /// Configured `max_batch`
        max: usize,
    },
    /// A buffer reference inside the batch is null
    #[error("buffer reference {index} is null")]
    NullBuffer {
        /// Position of the null reference in the batch
        index: usize,
    },
    /// Per-buffer work failed
    #[error("processing buffer {index} failed")]
    Buffer {
        /// Position of the buffer in the batch
        index: usize,
        /// What the processor reported
        #[source]
        source: Box<Error>,
    },
    /// Error reported by a buffer processor
    #[error("{0}")]
    Processor(String),
    /// The processed count cannot be represented as a C `int`
    #[error("processed count {0} does not fit the C return type")]
    CountOverflow(usize),
}

impl Error {
    /// Creates a processor error from a message
    pub fn processor<M: std::fmt::Display>(message: M) -> Self {
        Self::Processor(message.to_string())
    }

    /// Creates an error from a caught panic payload
    ///
    /// Payloads that are neither `&str` nor `String` are discarded without running their
    /// destructor under the caller's stack, since it could panic again.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<String>() {
            Ok(message) => return Self::Panic(*message),
            Err(payload) => payload,
        };
        if let Some(message) = payload.downcast_ref::<&'static str>() {
            return Self::Panic((*message).to_string());
        }
        discard_payload(payload);
        Self::Panic("non-string panic payload".to_string())
    }
}

/// Drops a panic payload, swallowing any panic raised by its destructor
pub(crate) fn discard_payload(payload: Box<dyn Any + Send>) {
    let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || drop(payload)));
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn panic_payloads() {
        let e = Error::from_panic(Box::new("static message"));
        assert_eq!(e.to_string(), "panic: static message");

        let e = Error::from_panic(Box::new(format!("fault at {}", 3)));
        assert_eq!(e.to_string(), "panic: fault at 3");

        let e = Error::from_panic(Box::new(42_u32));
        assert_eq!(e.to_string(), "panic: non-string panic payload");
    }

    #[test]
    fn buffer_error_chain() {
        let e = Error::Buffer {
            index: 2,
            source: Box::new(Error::processor("checksum mismatch")),
        };
        assert_eq!(e.to_string(), "processing buffer 2 failed");
        let source = std::error::Error::source(&e).expect("buffer errors carry a source");
        assert_eq!(source.to_string(), "checksum mismatch");
    }
}
