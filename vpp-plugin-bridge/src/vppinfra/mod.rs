//! Hot-path helpers
//!
//! Branch hints and cache prefetching for the per-buffer loop, and the compile-time assertion
//! pinning down the layout of types shared with C.

pub mod cache;

#[cold]
const fn cold() {}

/// Marks a condition that is expected to be false on the fast path
///
/// Returns `b` unchanged. Used for the error checks inside the per-buffer loop so the compiler
/// lays out the success path as the fall-through.
// Stand-in for std::hint::unlikely until it is stable
#[inline(always)]
pub const fn unlikely(b: bool) -> bool {
    if b {
        cold();
    }
    b
}

/// Fails compilation unless the constant expression holds
///
/// ```
/// vpp_plugin_bridge::const_assert!(std::mem::size_of::<u32>() == 4);
/// ```
#[macro_export]
macro_rules! const_assert {
    ($x:expr $(,)?) => {
        const _: () = ::std::assert!($x);
    };
}
