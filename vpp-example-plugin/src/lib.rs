//! Example VPP plugin
//!
//! This example shows both sides of the bridge C ABI in one crate, and is intended as a
//! cookbook-style reference:
//!
//! - The plugin side: a small [`BufferProcessor`] ([`Marker`]) that sets a flag on every buffer
//!   it is shown, exported under the `example_plugin_*` symbols with
//!   [`vpp_plugin_bridge::export_plugin!`].
//! - The host side: what a VPP graph node does with those symbols. [`ExampleNode`] creates a
//!   plugin context at init, hands each [`Frame`] over as one batch, translates a failed batch
//!   into an error counter and destroys the context when dropped.
//!
//! Real VPP buffers are `vlib_buffer_t`. [`HostBuffer`] stands in for them so that the example
//! can run without VPP.

use std::{
    ffi::{c_int, c_void, CStr},
    marker::PhantomData,
    ptr::NonNull,
};

use arrayvec::ArrayVec;
use bitflags::bitflags;
use vpp_plugin_bridge::{
    abi::{PluginApi, PluginHandle, ResultCode},
    vlib::FRAME_SIZE,
    vppinfra::unlikely,
    BufferProcessor, BufferRef, Config, Error,
};

bitflags! {
    /// Host buffer flags
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferFlags: u32 {
        /// Trace this buffer
        const IS_TRACED = 1 << 0;
        /// Buffer has been seen by the marker plugin
        const MARKED = 1 << 1;
    }
}

/// Minimal stand-in for a VPP buffer
#[repr(C)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HostBuffer {
    flags: BufferFlags,
    current_length: u16,
}

impl HostBuffer {
    /// Creates an unflagged buffer holding `current_length` bytes of packet data
    pub fn new(current_length: u16) -> Self {
        Self {
            flags: BufferFlags::empty(),
            current_length,
        }
    }

    /// Buffer flags
    pub fn flags(&self) -> BufferFlags {
        self.flags
    }

    /// Sets the given flags, leaving others untouched
    pub fn set_flags(&mut self, flags: BufferFlags) {
        self.flags.insert(flags);
    }

    /// Length of the packet data
    pub fn current_length(&self) -> u16 {
        self.current_length
    }
}

/// Processor marking every buffer it is shown
///
/// Buffers must be [`HostBuffer`]s. Empty buffers are rejected, failing the batch.
#[derive(Debug, Default)]
pub struct Marker {
    marked: u64,
}

impl BufferProcessor for Marker {
    fn from_config(config: &Config) -> Result<Self, Error> {
        tracing::debug!(name = %config.name, "marker ready");
        Ok(Self::default())
    }

    fn process_buffer(&mut self, buffer: &mut BufferRef) -> Result<(), Error> {
        // SAFETY: the hosts of this plugin only hand over `HostBuffer`s
        let b0 = unsafe { buffer.cast_mut::<HostBuffer>() };
        if unlikely(b0.current_length == 0) {
            return Err(Error::processor("empty buffer"));
        }
        b0.flags.insert(BufferFlags::MARKED);
        self.marked += 1;
        if unlikely(b0.flags.contains(BufferFlags::IS_TRACED)) {
            tracing::trace!(
                len = b0.current_length,
                marked = self.marked,
                "marked traced buffer"
            );
        }
        Ok(())
    }
}

vpp_plugin_bridge::export_plugin! {
    processor: Marker,
    prefix: "example_plugin",
}

/// A frame of buffers waiting to be handed to the plugin
#[derive(Debug, Default)]
pub struct Frame<'a> {
    buffers: ArrayVec<*mut c_void, FRAME_SIZE>,
    _marker: PhantomData<&'a mut HostBuffer>,
}

impl<'a> Frame<'a> {
    /// Creates an empty frame
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a buffer to the frame
    ///
    /// Gives the buffer back if the frame is already full.
    pub fn push(&mut self, buffer: &'a mut HostBuffer) -> Result<(), &'a mut HostBuffer> {
        if self.buffers.is_full() {
            return Err(buffer);
        }
        self.buffers.push((buffer as *mut HostBuffer).cast());
        Ok(())
    }

    /// Number of buffers in the frame
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether the frame holds no buffers
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

/// Graph node driving a plugin through its C entry points
///
/// The plugin context lives as long as the node.
#[derive(Debug)]
pub struct ExampleNode {
    api: PluginApi,
    ctx: NonNull<PluginHandle>,
    errors: u64,
}

impl ExampleNode {
    /// Creates the node and its plugin context
    ///
    /// An empty `config_path` selects the default configuration. On failure the plugin's result
    /// code is returned.
    ///
    /// # Safety
    ///
    /// The plugin behind `api` must accept [`HostBuffer`]s as its buffers.
    pub unsafe fn init(api: PluginApi, config_path: &CStr) -> Result<Self, c_int> {
        let mut rc = c_int::from(ResultCode::Error);
        // SAFETY: `config_path` is nul-terminated and `rc` is a writable int
        let ctx = unsafe { (api.init)(config_path.as_ptr(), &mut rc) };
        match NonNull::new(ctx) {
            Some(ctx) => {
                tracing::info!(config = ?config_path, "example node ready");
                Ok(Self {
                    api,
                    ctx,
                    errors: 0,
                })
            }
            None => {
                tracing::error!(config = ?config_path, rc, "plugin init failed");
                Err(rc)
            }
        }
    }

    /// Hands a frame over to the plugin, returning the number of buffers processed
    ///
    /// A failed batch counts as an error and processes nothing.
    pub fn process(&mut self, frame: &mut Frame<'_>) -> usize {
        if frame.is_empty() {
            return 0;
        }
        // SAFETY: the context is live and only used through `&mut self`, and every pointer in
        // the frame is a `HostBuffer` mutably borrowed for the frame's lifetime
        let processed = unsafe {
            (self.api.process_batch)(self.ctx.as_ptr(), frame.buffers.as_mut_ptr(), frame.len())
        };
        match usize::try_from(processed) {
            Ok(processed) => processed,
            Err(_) => {
                self.errors += 1;
                tracing::warn!(n_vectors = frame.len(), "batch failed");
                0
            }
        }
    }

    /// Number of failed batches
    pub fn errors(&self) -> u64 {
        self.errors
    }
}

impl Drop for ExampleNode {
    fn drop(&mut self) {
        // SAFETY: the context came from this API's init and is not used again
        unsafe { (self.api.shutdown)(self.ctx.as_ptr()) };
    }
}
