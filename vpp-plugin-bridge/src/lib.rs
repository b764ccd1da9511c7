#![warn(
    missing_docs,
    missing_copy_implementations,
    clippy::undocumented_unsafe_blocks
)]

//! # Stable C ABI bridge for VPP plugins written in Rust
//!
//! [VPP](https://wiki.fd.io/view/VPP/What_is_VPP%3F) calls into plugins from graph nodes written
//! in C, once per frame. This crate lets the packet-touching part of such a plugin live in Rust
//! behind three C functions, without the C side knowing anything about Rust types, errors or
//! panics:
//!
//! ```c
//! vpp_plugin_ctx_t *vpp_plugin_init(const char *config_path, int *out_rc);
//! int vpp_plugin_process_batch(vpp_plugin_ctx_t *ctx, void **buffers, size_t n);
//! void vpp_plugin_shutdown(vpp_plugin_ctx_t *ctx);
//! ```
//!
//! The declarations live in `include/vpp_plugin.h`. The pieces are:
//!
//! - [`abi`]: the types of the C surface (opaque handle, result codes, entry point signatures).
//! - [`boundary`]: the adapter implementing the entry points. It owns the context lifecycle and
//!   turns every error and panic into a result code, so nothing ever unwinds into C.
//! - [`plugin`]: the plugin core running the per-batch loop over a [`BufferProcessor`].
//! - [`vlib`]: borrowed views of the buffer references handed over by the host.
//!
//! # Writing a plugin
//!
//! Implement [`BufferProcessor`] and export it under a symbol prefix:
//!
//! ```
//! use vpp_plugin_bridge::{export_plugin, BufferProcessor, BufferRef, Config, Error};
//!
//! struct Tagger {
//!     tag: u8,
//! }
//!
//! impl BufferProcessor for Tagger {
//!     fn from_config(_config: &Config) -> Result<Self, Error> {
//!         Ok(Self { tag: 0xa5 })
//!     }
//!
//!     fn process_buffer(&mut self, buffer: &mut BufferRef) -> Result<(), Error> {
//!         // SAFETY: this host hands over single-byte buffers
//!         unsafe { *buffer.cast_mut::<u8>() = self.tag };
//!         Ok(())
//!     }
//! }
//!
//! export_plugin! {
//!     processor: Tagger,
//!     prefix: "tagger",
//! }
//!
//! let mut rc = -1;
//! let ctx = unsafe { tagger_init(std::ptr::null(), &mut rc) };
//! assert_eq!(rc, 0);
//!
//! let mut bytes = [0_u8; 3];
//! let mut buffers: Vec<*mut std::ffi::c_void> =
//!     bytes.iter_mut().map(|b| b as *mut u8 as *mut _).collect();
//! assert_eq!(unsafe { tagger_process_batch(ctx, buffers.as_mut_ptr(), 3) }, 3);
//! assert_eq!(bytes, [0xa5; 3]);
//!
//! unsafe { tagger_shutdown(ctx) };
//! ```
//!
//! # Features
//!
//! - `default-plugin` (enabled by default): export the `vpp_plugin_*` entry points backed by the
//!   [`Counter`] processor. Plugins exporting their own processor usually disable it.

// Lets the code generated by `export_plugin!` name this crate from inside it
extern crate self as vpp_plugin_bridge;

pub mod abi;
pub mod boundary;
pub mod config;
pub mod error;
pub mod logging;
pub mod plugin;
pub mod vlib;
pub mod vppinfra;

pub use crate::{
    config::Config,
    error::Error,
    plugin::{BufferProcessor, Counter, PluginCore},
    vlib::{Batch, BufferRef},
};

// Re-export macros for convenience
pub use vpp_plugin_bridge_macros::export_plugin;

#[cfg(feature = "default-plugin")]
export_plugin! {
    processor: crate::plugin::Counter,
    prefix: "vpp_plugin",
}
