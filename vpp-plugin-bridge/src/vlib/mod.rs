//! Host buffer abstractions
//!
//! This module contains the plugin's view of what the VPP graph hands it: opaque buffer
//! references and the borrowed batches they arrive in.

pub mod buffer;

pub use buffer::{Batch, BufferRef};

/// Max number of vector elements VPP hands a node at once
///
/// Corresponds to `VLIB_FRAME_SIZE` in VPP.
pub const FRAME_SIZE: usize = 256;
