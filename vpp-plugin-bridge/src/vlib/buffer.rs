//! Buffer references and batches
//!
//! The host passes a batch as a `void **` array plus a count. Neither the array nor the buffers
//! it points at belong to the plugin: a [`Batch`] is a borrowed view for the duration of one
//! process-batch call, and a [`BufferRef`] is only reachable while a single buffer is visited.

use std::{ffi::c_void, marker::PhantomData, slice};

/// Reference to a host buffer
///
/// A `&mut BufferRef` is equivalent to the opaque `void *` (in a VPP host, a `vlib_buffer_t *`)
/// found in a batch. The plugin core never interprets the buffer itself; processors that know
/// the host's buffer layout use [`Self::cast`] and [`Self::cast_mut`].
#[repr(transparent)]
pub struct BufferRef(foreign_types::Opaque);

impl BufferRef {
    /// Create a `&BufferRef` from a raw pointer
    ///
    /// # Safety
    ///
    /// - The pointer must be non-null and point to a live host buffer.
    /// - The buffer must stay valid and must not be mutated through other pointers for the
    ///   lifetime of the returned reference.
    #[inline(always)]
    pub unsafe fn from_ptr<'a>(ptr: *mut c_void) -> &'a Self {
        &*(ptr as *const Self)
    }

    /// Create a `&mut BufferRef` from a raw pointer
    ///
    /// # Safety
    ///
    /// - The pointer must be non-null and point to a live host buffer.
    /// - The buffer must stay valid and must not be accessed through other pointers for the
    ///   lifetime of the returned reference.
    #[inline(always)]
    pub unsafe fn from_ptr_mut<'a>(ptr: *mut c_void) -> &'a mut Self {
        &mut *(ptr as *mut Self)
    }

    /// Returns the raw pointer to the host buffer
    #[inline(always)]
    pub fn as_ptr(&self) -> *mut c_void {
        self as *const _ as *mut _
    }

    /// View the host buffer as a `T`
    ///
    /// # Safety
    ///
    /// The host buffer must be a properly aligned, initialised `T`.
    #[inline(always)]
    pub unsafe fn cast<T>(&self) -> &T {
        &*(self.as_ptr() as *const T)
    }

    /// View the host buffer as a mutable `T`
    ///
    /// Changes made through the returned reference are visible to the host once the batch call
    /// returns.
    ///
    /// # Safety
    ///
    /// The host buffer must be a properly aligned, initialised `T`.
    #[inline(always)]
    pub unsafe fn cast_mut<T>(&mut self) -> &mut T {
        &mut *(self.as_ptr() as *mut T)
    }
}

/// Borrowed batch of host buffer references
///
/// Elements may be null; a null element is a malformed reference which the plugin core rejects
/// when it reaches it. Every non-null element is guaranteed by the creator of the batch to be
/// valid for `'a`.
#[derive(Debug, Copy, Clone)]
pub struct Batch<'a> {
    refs: &'a [*mut c_void],
    _marker: PhantomData<&'a mut BufferRef>,
}

impl<'a> Batch<'a> {
    /// An empty batch
    pub const fn empty() -> Self {
        Self {
            refs: &[],
            _marker: PhantomData,
        }
    }

    /// Creates a batch from the pointer and count handed over the C ABI
    ///
    /// A null `refs` pointer or a zero `count` yield an empty batch.
    ///
    /// # Safety
    ///
    /// - If `refs` is non-null and `count` is non-zero, `refs` must point to `count` readable,
    ///   initialised pointers that stay unmodified for `'a`.
    /// - Every non-null element must satisfy the preconditions of [`BufferRef::from_ptr_mut`]
    ///   for `'a`, except that the same buffer may appear more than once.
    #[inline(always)]
    pub unsafe fn from_raw_parts(refs: *const *mut c_void, count: usize) -> Self {
        if refs.is_null() || count == 0 {
            return Self::empty();
        }
        Self::from_slice(slice::from_raw_parts(refs, count))
    }

    /// Creates a batch from a slice of buffer pointers
    ///
    /// # Safety
    ///
    /// Every non-null element must satisfy the preconditions of [`BufferRef::from_ptr_mut`] for
    /// `'a`, except that the same buffer may appear more than once.
    #[inline(always)]
    pub unsafe fn from_slice(refs: &'a [*mut c_void]) -> Self {
        Self {
            refs,
            _marker: PhantomData,
        }
    }

    /// Number of buffer references in the batch
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    /// Returns true if the batch holds no buffer references
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// The raw buffer references, in the order the host supplied them
    #[inline(always)]
    pub fn as_slice(&self) -> &'a [*mut c_void] {
        self.refs
    }
}

impl Default for Batch<'_> {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_or_zero_is_empty() {
        let mut b0 = 0_u32;
        let refs = [&mut b0 as *mut u32 as *mut c_void];

        // SAFETY: null pointer yields an empty batch without reading anything
        let batch = unsafe { Batch::from_raw_parts(std::ptr::null(), 4) };
        assert!(batch.is_empty());

        // SAFETY: zero count yields an empty batch without reading anything
        let batch = unsafe { Batch::from_raw_parts(refs.as_ptr(), 0) };
        assert!(batch.is_empty());

        // SAFETY: refs holds one pointer to a live u32
        let batch = unsafe { Batch::from_raw_parts(refs.as_ptr(), 1) };
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.as_slice()[0], refs[0]);
    }

    #[test]
    fn typed_access() {
        let mut value = 7_u64;
        let ptr = &mut value as *mut u64 as *mut c_void;
        // SAFETY: ptr points to a live, aligned u64 that is only accessed through `b`
        unsafe {
            let b = BufferRef::from_ptr_mut(ptr);
            assert_eq!(b.as_ptr(), ptr);
            *b.cast_mut::<u64>() += 1;
            assert_eq!(*b.cast::<u64>(), 8);
        }
        assert_eq!(value, 8);
    }
}
