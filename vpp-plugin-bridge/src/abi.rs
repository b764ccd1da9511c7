//! Stable C interface
//!
//! Types making up the C-callable surface declared in `include/vpp_plugin.h`. This module holds
//! no behaviour: the entry points themselves are generated by [`crate::export_plugin`] on top of
//! [`crate::boundary`].
//!
//! ```c
//! vpp_plugin_ctx_t *vpp_plugin_init(const char *config_path, int *out_rc);
//! int vpp_plugin_process_batch(vpp_plugin_ctx_t *ctx, void **buffers, size_t n);
//! void vpp_plugin_shutdown(vpp_plugin_ctx_t *ctx);
//! ```

use std::{
    ffi::{c_char, c_int, c_void},
    mem::size_of,
};

use crate::const_assert;

/// Result code written by init
///
/// The same `ERROR` value is returned by process-batch on failure.
///
/// Corresponds to `enum vpp_plugin_rc_e` in the C header.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResultCode {
    /// Success (`VPP_PLUGIN_OK`)
    Ok = 0,
    /// Failure (`VPP_PLUGIN_ERR`)
    Error = -1,
}

const_assert!(size_of::<ResultCode>() == size_of::<c_int>());

impl From<ResultCode> for c_int {
    fn from(value: ResultCode) -> Self {
        value as c_int
    }
}

/// Opaque plugin context handle
///
/// A `*mut PluginHandle` is equivalent to a `vpp_plugin_ctx_t *` in C. Its layout is private to
/// [`crate::boundary`]; the host only ever stores and passes back the pointer it got from init.
#[repr(transparent)]
pub struct PluginHandle(foreign_types::Opaque);

/// C name of [`PluginHandle`]
#[allow(non_camel_case_types)]
pub type vpp_plugin_ctx_t = PluginHandle;

/// Signature of an exported init entry point
pub type InitFn = unsafe extern "C" fn(*const c_char, *mut c_int) -> *mut PluginHandle;
/// Signature of an exported process-batch entry point
pub type ProcessBatchFn = unsafe extern "C" fn(*mut PluginHandle, *mut *mut c_void, usize) -> c_int;
/// Signature of an exported shutdown entry point
pub type ShutdownFn = unsafe extern "C" fn(*mut PluginHandle);

/// The three entry points exported by one plugin
///
/// This is what a host resolves after loading a plugin. [`crate::export_plugin`] also emits a
/// constant of this type for hosts linking the plugin directly.
#[derive(Debug, Copy, Clone)]
pub struct PluginApi {
    /// Creates a plugin context
    pub init: InitFn,
    /// Processes a batch of buffer references
    pub process_batch: ProcessBatchFn,
    /// Destroys a plugin context
    pub shutdown: ShutdownFn,
}
