//! Boundary adapter
//!
//! Implements the C entry points on top of [`PluginCore`]. This is the only place where Rust
//! errors and panics meet the C caller, and it reduces all of them to the closed vocabulary of
//! [`crate::abi`]:
//!
//! | entry point     | success                  | any failure           |
//! |-----------------|--------------------------|-----------------------|
//! | `init`          | non-null handle, `OK`    | null handle, `ERROR`  |
//! | `process_batch` | buffers processed (`>=0`)| `ERROR` (`-1`)        |
//! | `shutdown`      | context released         | nothing observable    |
//!
//! Panics are caught with [`std::panic::catch_unwind`], so a plugin must be built with
//! `panic = "unwind"` (the default) for the guarantee to hold. Failed batches report no partial
//! count: the host treats the whole frame as failed.
//!
//! The functions here are generic over the [`BufferProcessor`] so every exported plugin shares
//! one implementation; [`crate::export_plugin`] instantiates them for a concrete processor.

use std::{
    any::TypeId,
    ffi::{c_char, c_int, c_void, CStr},
    panic::{catch_unwind, AssertUnwindSafe},
    ptr::{self, NonNull},
};

use tracing::{error, info};

use crate::{
    abi::{PluginHandle, ResultCode},
    error::discard_payload,
    logging,
    plugin::{BufferProcessor, PluginCore},
    vlib::Batch,
    vppinfra::unlikely,
    Config, Error,
};

/// Plugin context behind a [`PluginHandle`]
///
/// The processor type tag is the first field of a `repr(C)` struct so that it sits at the same
/// offset whatever `P` is, letting a handle be checked before it is used as a `PluginContext<P>`.
#[repr(C)]
pub struct PluginContext<P> {
    processor_type: TypeId,
    core: PluginCore<P>,
}

impl<P: BufferProcessor + 'static> PluginContext<P> {
    fn new(core: PluginCore<P>) -> Self {
        Self {
            processor_type: TypeId::of::<P>(),
            core,
        }
    }

    /// The plugin core owned by this context
    pub fn core(&self) -> &PluginCore<P> {
        &self.core
    }

    fn into_handle(self: Box<Self>) -> *mut PluginHandle {
        Box::into_raw(self).cast()
    }

    /// Borrows the context behind a handle
    ///
    /// Returns `Ok(None)` for a null handle.
    ///
    /// # Safety
    ///
    /// - A non-null handle must have been returned by [`init`] (for any processor type) and not
    ///   yet passed to [`shutdown`].
    /// - No other reference to the context may exist for `'a`.
    pub unsafe fn from_handle<'a>(
        handle: *mut PluginHandle,
    ) -> Result<Option<&'a mut Self>, Error> {
        let Some(handle) = NonNull::new(handle) else {
            return Ok(None);
        };
        // SAFETY: the tag is the first field of a repr(C) struct, so it is at offset zero for
        // every processor type and can be read through any live handle without touching the
        // rest of the context.
        let processor_type =
            unsafe { (*handle.as_ptr().cast::<PluginContext<()>>()).processor_type };
        if unlikely(processor_type != TypeId::of::<P>()) {
            return Err(Error::HandleMismatch);
        }
        // SAFETY: the tag matches, so the handle was created from a Box<PluginContext<P>>
        Ok(Some(unsafe { &mut *handle.as_ptr().cast::<Self>() }))
    }
}

/// Runs `f`, catching any panic and reporting it as an [`Error`]
fn catch_fault<T>(f: impl FnOnce() -> Result<T, Error>) -> Result<T, Error> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| Err(Error::from_panic(payload)))
}

/// Runs `f`, returning `fallback` if anything in it panics
///
/// Last line of defence around each entry point, covering logging as well as the core.
fn guard<T>(fallback: T, f: impl FnOnce() -> T) -> T {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(payload) => {
            discard_payload(payload);
            fallback
        }
    }
}

/// Allocates a box, reporting allocator failure instead of aborting
fn try_box<T>(value: T) -> Result<Box<T>, Error> {
    let mut slot = Vec::new();
    slot.try_reserve_exact(1).map_err(|_| Error::Alloc)?;
    slot.push(value);
    let slot: Box<[T; 1]> = slot
        .into_boxed_slice()
        .try_into()
        .map_err(|_| Error::Alloc)?;
    // SAFETY: [T; 1] has the same size and alignment as T, so the allocation is a valid Box<T>
    Ok(unsafe { Box::from_raw(Box::into_raw(slot).cast::<T>()) })
}

/// Reads the configuration locator handed to init
///
/// # Safety
///
/// A non-null `config_locator` must point to a nul-terminated string that stays valid for `'a`.
unsafe fn locator<'a>(config_locator: *const c_char) -> Result<&'a str, Error> {
    if config_locator.is_null() {
        return Ok("");
    }
    // SAFETY: non-null and nul-terminated per the caller contract
    let locator = unsafe { CStr::from_ptr(config_locator) };
    locator.to_str().map_err(|_| Error::InvalidLocator)
}

fn build<P, F>(locator: &str, build_processor: F) -> Result<Box<PluginContext<P>>, Error>
where
    P: BufferProcessor + 'static,
    F: FnOnce(&Config) -> Result<P, Error>,
{
    let config = Config::load(locator)?;
    if let Some(filter) = &config.log_filter {
        logging::init(filter)?;
    }
    let processor = build_processor(&config)?;
    try_box(PluginContext::new(PluginCore::new(config, processor)))
}

fn set_rc(out_rc: *mut c_int, rc: ResultCode) {
    if let Some(out_rc) = NonNull::new(out_rc) {
        // SAFETY: a non-null out_rc must be writable per the init contract
        unsafe { out_rc.as_ptr().write(rc.into()) }
    }
}

/// Creates a plugin context
///
/// Loads the configuration named by `config_locator` (null or empty for defaults), builds the
/// processor with `build_processor` and returns a handle to the new context, writing
/// [`ResultCode::Ok`] to `out_rc`. On any failure, including a panic, returns null and writes
/// [`ResultCode::Error`]; everything allocated during the attempt has been released.
///
/// # Safety
///
/// - `config_locator` must be null or point to a nul-terminated string valid for the call.
/// - `out_rc` must be null or point to a writable `int`.
pub unsafe fn init<P, F>(
    config_locator: *const c_char,
    out_rc: *mut c_int,
    build_processor: F,
) -> *mut PluginHandle
where
    P: BufferProcessor + 'static,
    F: FnOnce(&Config) -> Result<P, Error>,
{
    set_rc(out_rc, ResultCode::Error);

    let handle = guard(ptr::null_mut(), || {
        // SAFETY: forwarded caller contract
        let result = catch_fault(|| build(unsafe { locator(config_locator) }?, build_processor));
        match result {
            Ok(context) => {
                info!(
                    plugin = %context.core.config().name,
                    max_batch = context.core.config().max_batch,
                    "plugin context initialised"
                );
                context.into_handle()
            }
            Err(e) => {
                error!(
                    error = %e,
                    source = ?std::error::Error::source(&e),
                    "plugin init failed"
                );
                ptr::null_mut()
            }
        }
    });

    if !handle.is_null() {
        set_rc(out_rc, ResultCode::Ok);
    }
    handle
}

/// Processes a batch of buffer references
///
/// Returns the number of buffers processed, or [`ResultCode::Error`] if the handle is null (for
/// a non-empty batch), belongs to a different plugin, or processing failed or panicked. A null
/// `buffers` array or zero `count` is a no-op returning 0.
///
/// # Safety
///
/// - A non-null `handle` must have been returned by an init entry point and not yet shut down,
///   and must not be used concurrently from another thread.
/// - If `buffers` is non-null and `count` non-zero, `buffers` must point to `count` pointers,
///   each either null or pointing to a host buffer valid for the duration of the call.
pub unsafe fn process_batch<P>(
    handle: *mut PluginHandle,
    buffers: *mut *mut c_void,
    count: usize,
) -> c_int
where
    P: BufferProcessor + 'static,
{
    guard(ResultCode::Error.into(), || {
        // SAFETY: forwarded caller contract
        let context = match unsafe { PluginContext::<P>::from_handle(handle) } {
            Ok(Some(context)) => context,
            Ok(None) if count == 0 => return 0,
            Ok(None) => {
                error!(count, "batch presented without a plugin context");
                return ResultCode::Error.into();
            }
            Err(e) => {
                error!(error = %e, "batch rejected");
                return ResultCode::Error.into();
            }
        };

        // SAFETY: forwarded caller contract
        let batch = unsafe { Batch::from_raw_parts(buffers, count) };
        let result = catch_fault(|| {
            let n = context.core.process(batch)?;
            c_int::try_from(n).map_err(|_| Error::CountOverflow(n))
        });
        match result {
            Ok(n) => n,
            Err(e) => {
                error!(
                    plugin = %context.core.config().name,
                    count,
                    error = %e,
                    source = ?std::error::Error::source(&e),
                    "batch processing failed"
                );
                ResultCode::Error.into()
            }
        }
    })
}

/// Destroys a plugin context
///
/// Releases the context and everything its core owns. A null handle is a no-op, as is a handle
/// belonging to a different plugin (which is logged and left alone).
///
/// # Safety
///
/// A non-null `handle` must have been returned by an init entry point, must not have been shut
/// down already and must not be in use by another thread. It must not be used after this call.
pub unsafe fn shutdown<P>(handle: *mut PluginHandle)
where
    P: BufferProcessor + 'static,
{
    guard((), || {
        // SAFETY: forwarded caller contract
        let context = match unsafe { PluginContext::<P>::from_handle(handle) } {
            Ok(Some(context)) => context,
            Ok(None) => return,
            Err(e) => {
                error!(error = %e, "shutdown rejected");
                return;
            }
        };
        info!(
            plugin = %context.core.config().name,
            processed = context.core.processed(),
            "plugin context shut down"
        );
        // SAFETY: the handle came from Box::into_raw in init, the tag check above confirmed its
        // type and the caller gives up the handle with this call.
        drop(unsafe { Box::from_raw(context as *mut PluginContext<P>) });
    })
}

#[cfg(test)]
mod tests {
    use std::{
        ffi::CString,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    use super::*;
    use crate::{plugin::Counter, vlib::BufferRef};

    use pretty_assertions::assert_eq;

    const ERROR: c_int = -1;

    /// Counts live instances so tests can check nothing is leaked
    #[derive(Clone, Default)]
    struct Live(Arc<AtomicUsize>);

    impl Live {
        fn track(&self) -> Tracked {
            self.0.fetch_add(1, Ordering::SeqCst);
            Tracked(self.0.clone())
        }

        fn count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    struct Tracked(Arc<AtomicUsize>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// How a test processor misbehaves on a given buffer id
    #[derive(Clone, Copy)]
    enum Fault {
        Error(u32),
        Panic(u32),
    }

    struct TestProcessor {
        _tracked: Tracked,
        seen: Vec<u32>,
        fault: Option<Fault>,
    }

    impl BufferProcessor for TestProcessor {
        fn from_config(_config: &Config) -> Result<Self, Error> {
            Err(Error::processor("built by the tests only"))
        }

        fn process_buffer(&mut self, buffer: &mut BufferRef) -> Result<(), Error> {
            // SAFETY: tests only hand in pointers to u32s
            let id = unsafe { *buffer.cast::<u32>() };
            self.seen.push(id);
            match self.fault {
                Some(Fault::Error(f)) if f == id => Err(Error::processor("injected fault")),
                Some(Fault::Panic(f)) if f == id => panic!("injected panic on buffer {id}"),
                _ => Ok(()),
            }
        }
    }

    fn init_test(live: &Live, fault: Option<Fault>, rc: &mut c_int) -> *mut PluginHandle {
        let live = live.clone();
        // SAFETY: null locator and a valid out_rc
        unsafe {
            init(ptr::null(), rc, move |_config: &Config| {
                Ok(TestProcessor {
                    _tracked: live.track(),
                    seen: Vec::new(),
                    fault,
                })
            })
        }
    }

    fn seen(handle: *mut PluginHandle) -> Vec<u32> {
        // SAFETY: handle is live and not used elsewhere while borrowed
        let context = unsafe { PluginContext::<TestProcessor>::from_handle(handle) }
            .expect("handle type matches")
            .expect("handle is not null");
        context.core().processor().seen.clone()
    }

    fn refs(ids: &mut [u32]) -> Vec<*mut c_void> {
        ids.iter_mut()
            .map(|id| id as *mut u32 as *mut c_void)
            .collect()
    }

    #[test]
    fn lifecycle_releases_everything() {
        let live = Live::default();
        for _ in 0..8 {
            let mut rc = ERROR;
            let handle = init_test(&live, None, &mut rc);
            assert!(!handle.is_null());
            assert_eq!(rc, 0);
            assert_eq!(live.count(), 1);

            let mut ids = [0, 1, 2];
            let mut refs = refs(&mut ids);
            // SAFETY: live handle, refs point to u32s owned by this test
            unsafe {
                assert_eq!(process_batch::<TestProcessor>(handle, refs.as_mut_ptr(), 3), 3);
                shutdown::<TestProcessor>(handle);
            }
            assert_eq!(live.count(), 0);
        }
    }

    #[test]
    fn visits_each_buffer_once_in_order() {
        let live = Live::default();
        let mut rc = ERROR;
        let handle = init_test(&live, None, &mut rc);

        let mut ids = [5, 3, 9, 1];
        let mut refs = refs(&mut ids);
        // SAFETY: live handle, refs point to u32s owned by this test
        let n = unsafe { process_batch::<TestProcessor>(handle, refs.as_mut_ptr(), refs.len()) };
        assert_eq!(n, 4);
        assert_eq!(seen(handle), vec![5, 3, 9, 1]);

        // SAFETY: handle is live
        unsafe { shutdown::<TestProcessor>(handle) };
    }

    #[test]
    fn construction_failures_leak_nothing() {
        let live = Live::default();

        // Processor built, then construction fails
        let mut rc = 0;
        let l = live.clone();
        // SAFETY: null locator and a valid out_rc
        let handle = unsafe {
            init::<TestProcessor, _>(ptr::null(), &mut rc, move |_config: &Config| {
                let _tracked = l.track();
                Err(Error::processor("refusing to start"))
            })
        };
        assert!(handle.is_null());
        assert_eq!(rc, ERROR);
        assert_eq!(live.count(), 0);

        // Processor built, then construction panics
        let mut rc = 0;
        let l = live.clone();
        // SAFETY: null locator and a valid out_rc
        let handle = unsafe {
            init::<TestProcessor, _>(ptr::null(), &mut rc, move |_config: &Config| {
                let _tracked = l.track();
                panic!("constructor fault")
            })
        };
        assert!(handle.is_null());
        assert_eq!(rc, ERROR);
        assert_eq!(live.count(), 0);
    }

    #[test]
    fn bad_locators() {
        let mut rc = 0;
        let missing = CString::new("/nonexistent/vpp-plugin/config.json").unwrap();
        // SAFETY: valid C string and out_rc
        let handle = unsafe { init(missing.as_ptr(), &mut rc, Counter::from_config) };
        assert!(handle.is_null());
        assert_eq!(rc, ERROR);

        let invalid_utf8 = CString::new(vec![0xff, 0xfe]).unwrap();
        let mut rc = 0;
        // SAFETY: valid C string and out_rc
        let handle = unsafe { init(invalid_utf8.as_ptr(), &mut rc, Counter::from_config) };
        assert!(handle.is_null());
        assert_eq!(rc, ERROR);
    }

    #[test]
    fn null_out_rc() {
        // SAFETY: null locator, null out_rc is allowed
        let handle = unsafe { init(ptr::null(), ptr::null_mut(), Counter::from_config) };
        assert!(!handle.is_null());
        // SAFETY: handle is live
        unsafe { shutdown::<Counter>(handle) };
    }

    #[test]
    fn fault_mid_batch() {
        for fault in [Fault::Error(2), Fault::Panic(2)] {
            let live = Live::default();
            let mut rc = ERROR;
            let handle = init_test(&live, Some(fault), &mut rc);

            let mut ids = [0, 1, 2, 3, 4];
            let mut refs = refs(&mut ids);
            // SAFETY: live handle, refs point to u32s owned by this test
            let n = unsafe { process_batch::<TestProcessor>(handle, refs.as_mut_ptr(), 5) };
            assert_eq!(n, ERROR);
            assert_eq!(seen(handle), vec![0, 1, 2]);

            // SAFETY: handle is live
            unsafe { shutdown::<TestProcessor>(handle) };
            assert_eq!(live.count(), 0);
        }
    }

    #[test]
    fn empty_and_null_batches() {
        let mut rc = ERROR;
        // SAFETY: null locator and a valid out_rc
        let handle = unsafe { init(ptr::null(), &mut rc, Counter::from_config) };
        let mut b0 = 0_u32;
        let mut refs = [&mut b0 as *mut u32 as *mut c_void];

        // SAFETY: handle is live or null, arrays are valid or null
        unsafe {
            assert_eq!(process_batch::<Counter>(handle, ptr::null_mut(), 4), 0);
            assert_eq!(process_batch::<Counter>(handle, refs.as_mut_ptr(), 0), 0);
            assert_eq!(process_batch::<Counter>(ptr::null_mut(), ptr::null_mut(), 0), 0);
            assert_eq!(process_batch::<Counter>(ptr::null_mut(), refs.as_mut_ptr(), 0), 0);
            assert_eq!(process_batch::<Counter>(ptr::null_mut(), refs.as_mut_ptr(), 1), ERROR);
            assert_eq!(process_batch::<Counter>(ptr::null_mut(), ptr::null_mut(), 1), ERROR);
            shutdown::<Counter>(handle);
            shutdown::<Counter>(ptr::null_mut());
        }
    }

    #[test]
    fn foreign_handle_is_rejected() {
        let live = Live::default();
        let mut rc = ERROR;
        let handle = init_test(&live, None, &mut rc);
        let mut b0 = 0_u32;
        let mut refs = [&mut b0 as *mut u32 as *mut c_void];

        // SAFETY: handle is live; the mismatched calls are rejected before the context is used
        unsafe {
            assert_eq!(process_batch::<Counter>(handle, refs.as_mut_ptr(), 1), ERROR);
            shutdown::<Counter>(handle);
            assert_eq!(live.count(), 1);
            assert_eq!(process_batch::<TestProcessor>(handle, refs.as_mut_ptr(), 1), 1);
            shutdown::<TestProcessor>(handle);
        }
        assert_eq!(live.count(), 0);
    }

    #[test]
    fn count_overflow_is_an_error() {
        let n = i32::MAX as usize + 1;
        let result: Result<c_int, Error> =
            c_int::try_from(n).map_err(|_| Error::CountOverflow(n));
        assert!(matches!(result, Err(Error::CountOverflow(m)) if m == n));
    }

    #[test]
    fn try_box_round_trip() {
        let b = try_box(String::from("context")).expect("allocation succeeds");
        assert_eq!(*b, "context");
        let zst = try_box([0_u8; 0]).expect("zero-sized allocation succeeds");
        assert!(zst.is_empty());
    }
}
