//! C API for firstmatch
//!
//! Stable FFI surface for building and querying automatons from C and
//! embedded language runtimes. Handles are opaque; the first byte of every
//! handle is the magic `0x5A` so foreign callers can be cross-checked at
//! entry. Passing anything else is a programming error and trips a debug
//! assertion rather than a recoverable error.
//!
//! # Safety Guarantees
//!
//! - Null pointer checks on all inputs
//! - Panic catching at the FFI boundary
//! - No-match is reported as `(-1, -1)`, never an error code
//!
//! # Basic Usage Pattern
//!
//! ```c
//! const char *dict[] = { "he", "she", "his", "her" };
//! ac_t *ac = ac_create(dict, 4);
//! if (ac == NULL) { /* invalid pattern or out of memory */ }
//!
//! ac_result_t r = ac_match(ac, "ushers", 6);
//! if (r.match_begin >= 0) {
//!     /* inclusive span [r.match_begin, r.match_end] */
//! }
//!
//! ac_free(ac);
//! ```

use crate::format::{MAGIC, VARIANT_PACKED};
use crate::packed::PackedAc;
use std::os::raw::{c_char, c_int, c_uint};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::slice;

/// Match result returned across the C boundary
///
/// Both indices are zero-based and inclusive; `(-1, -1)` means no match.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcResult {
    /// Index of the first matched byte, or -1
    pub match_begin: c_int,
    /// Index of the last matched byte, or -1
    pub match_end: c_int,
}

const NO_MATCH: AcResult = AcResult {
    match_begin: -1,
    match_end: -1,
};

/// Opaque automaton handle; the first byte is always the magic `0x5A`
#[repr(C)]
pub struct AcHandle {
    magic: u8,
    variant: u8,
    _reserved: [u8; 6],
    inner: PackedAc,
}

/// Build an automaton from `vect_len` NUL-terminated patterns
///
/// Returns null on invalid input: a null vector, a null element, an empty
/// pattern, or allocation failure. The handle must be released with
/// [`ac_free`].
///
/// # Safety
///
/// `str_vect` must point to `vect_len` valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn ac_create(
    str_vect: *const *const c_char,
    vect_len: c_uint,
) -> *mut AcHandle {
    if str_vect.is_null() && vect_len > 0 {
        return std::ptr::null_mut();
    }

    let mut patterns: Vec<&[u8]> = Vec::with_capacity(vect_len as usize);
    for i in 0..vect_len as usize {
        let p = *str_vect.add(i);
        if p.is_null() {
            return std::ptr::null_mut();
        }
        patterns.push(std::ffi::CStr::from_ptr(p).to_bytes());
    }

    let built = catch_unwind(AssertUnwindSafe(|| PackedAc::build(&patterns).ok()));
    match built {
        Ok(Some(inner)) => Box::into_raw(Box::new(AcHandle {
            magic: MAGIC,
            variant: VARIANT_PACKED,
            _reserved: [0; 6],
            inner,
        })),
        _ => std::ptr::null_mut(),
    }
}

/// Earliest match of any pattern in `str[0..len)`
///
/// # Safety
///
/// `ac` must be a handle returned by [`ac_create`] and not yet freed;
/// `str` must point to `len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn ac_match(ac: *const AcHandle, str: *const c_char, len: c_uint) -> AcResult {
    if ac.is_null() || (str.is_null() && len > 0) {
        return NO_MATCH;
    }
    let handle = &*ac;
    debug_assert_eq!(handle.magic, MAGIC, "foreign pointer passed as ac handle");

    let input: &[u8] = if len == 0 {
        &[]
    } else {
        slice::from_raw_parts(str as *const u8, len as usize)
    };

    catch_unwind(AssertUnwindSafe(|| match handle.inner.find(input) {
        Some(m) => AcResult {
            match_begin: m.begin as c_int,
            match_end: m.end as c_int,
        },
        None => NO_MATCH,
    }))
    .unwrap_or(NO_MATCH)
}

/// Like [`ac_match`] but returns only the begin index
///
/// Exists because some embedded runtimes handle scalar returns far more
/// cheaply than aggregate returns.
///
/// # Safety
///
/// Same contract as [`ac_match`].
#[no_mangle]
pub unsafe extern "C" fn ac_match2(ac: *const AcHandle, str: *const c_char, len: c_uint) -> c_int {
    ac_match(ac, str, len).match_begin
}

/// Release a handle returned by [`ac_create`]
///
/// A null handle is a no-op.
///
/// # Safety
///
/// `ac` must be a handle returned by [`ac_create`], freed at most once.
#[no_mangle]
pub unsafe extern "C" fn ac_free(ac: *mut AcHandle) {
    if ac.is_null() {
        return;
    }
    debug_assert_eq!((*ac).magic, MAGIC, "foreign pointer passed as ac handle");
    drop(Box::from_raw(ac));
}
