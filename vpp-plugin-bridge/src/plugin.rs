//! Plugin core
//!
//! [`PluginCore`] owns everything a plugin context needs at runtime and runs the per-batch loop.
//! What happens to each buffer is up to the [`BufferProcessor`] it is built with.

use crate::{
    vlib::{Batch, BufferRef},
    vppinfra::{cache::prefetch_load, unlikely},
    Config, Error,
};

/// Per-buffer work performed by a plugin
///
/// Implementations are built once per plugin context during init and then see every buffer of
/// every successful batch, in order, exactly once. A buffer reference must not be retained past
/// the call it was passed to.
pub trait BufferProcessor {
    /// Builds the processor from the plugin configuration
    ///
    /// Any error aborts init and no plugin context is handed to the host.
    fn from_config(config: &Config) -> Result<Self, Error>
    where
        Self: Sized;

    /// Processes one buffer
    ///
    /// An error fails the whole batch; buffers after this one are not visited.
    fn process_buffer(&mut self, buffer: &mut BufferRef) -> Result<(), Error>;
}

/// Processor that counts the buffers it is shown without interpreting them
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Counter {
    visited: u64,
}

impl Counter {
    /// Number of buffers visited, including those of batches that later failed
    pub fn visited(&self) -> u64 {
        self.visited
    }
}

impl BufferProcessor for Counter {
    fn from_config(_config: &Config) -> Result<Self, Error> {
        Ok(Self::default())
    }

    #[inline(always)]
    fn process_buffer(&mut self, _buffer: &mut BufferRef) -> Result<(), Error> {
        self.visited += 1;
        Ok(())
    }
}

/// Native state behind a plugin context
#[derive(Debug)]
pub struct PluginCore<P> {
    config: Config,
    processor: P,
    processed: u64,
}

impl<P: BufferProcessor> PluginCore<P> {
    /// Creates a new core from a parsed configuration and a built processor
    pub fn new(config: Config, processor: P) -> Self {
        Self {
            config,
            processor,
            processed: 0,
        }
    }

    /// Total number of buffers processed by successful batches
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// The configuration the core was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The per-buffer processor
    pub fn processor(&self) -> &P {
        &self.processor
    }

    /// Processes a batch, returning the number of buffers processed
    ///
    /// On error, buffers before the failing one have been visited (and possibly modified) but
    /// the processed total is left unchanged.
    pub fn process(&mut self, batch: Batch<'_>) -> Result<usize, Error> {
        let refs = batch.as_slice();
        if unlikely(refs.len() > self.config.max_batch) {
            return Err(Error::BatchTooLarge {
                len: refs.len(),
                max: self.config.max_batch,
            });
        }

        for (index, &ptr) in refs.iter().enumerate() {
            if self.config.prefetch {
                if let Some(&next) = refs.get(index + 1) {
                    prefetch_load(next);
                }
            }
            if unlikely(ptr.is_null()) {
                return Err(Error::NullBuffer { index });
            }
            // SAFETY: the batch guarantees every non-null element is a valid buffer for the
            // duration of this call, and the reference doesn't outlive this iteration.
            let b0 = unsafe { BufferRef::from_ptr_mut(ptr) };
            self.processor
                .process_buffer(b0)
                .map_err(|source| Error::Buffer {
                    index,
                    source: Box::new(source),
                })?;
        }

        self.processed += refs.len() as u64;
        Ok(refs.len())
    }
}
