//! Cache prefetching
//!
//! Batches arrive as arrays of pointers to host buffers scattered through the buffer pool, so
//! the per-buffer loop pulls the next buffer's first cache line in while working on the current
//! one.

/// Requests the cache line at `p` for reading
///
/// Only emits an instruction on x86_64; elsewhere it compiles to nothing. Any pointer value is
/// accepted, including null.
#[inline(always)]
pub fn prefetch_load<T>(p: *const T) {
    #[cfg(target_arch = "x86_64")]
    // SAFETY: a prefetch is a hint and never dereferences its operand
    unsafe {
        use std::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
        _mm_prefetch::<{ _MM_HINT_T0 }>(p.cast::<i8>());
    }
    #[cfg(not(target_arch = "x86_64"))]
    let _ = p;
}
