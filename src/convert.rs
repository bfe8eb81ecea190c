//! Conversion of a reference automaton into the packed buffer format
//!
//! Two passes over the states in id order. Pass 1 sizes every record under
//! the chosen encoding and assigns byte offsets; pass 2 emits the header and
//! records. The id-to-offset table built in pass 1 is the only translation
//! layer between the pointer graph and the offset graph; it is dropped once
//! the buffer is complete.
//!
//! Offsets start out two bytes wide. If the laid-out buffer cannot be
//! addressed by u16 the conversion is redone once with four-byte offsets;
//! only a buffer beyond u32 fails, with [`AcError::Overflow`].

use crate::error::{AcError, Result};
use crate::format::{
    classify, record_size, PackedHeader, StateKind, StateRec, StateRec16, StateRec32, HEADER_LEN,
    MAGIC, VARIANT_PACKED,
};
use crate::ref_ac::RefAc;
use std::mem;
use zerocopy::IntoBytes;

/// Allocation capability for the single packed buffer
///
/// Injected so callers can reuse pre-allocated storage at conversion time.
/// The returned vector must be zero-filled and exactly `size` bytes long.
pub trait BufferAlloc {
    /// Allocate a zeroed buffer of exactly `size` bytes
    fn alloc(&mut self, size: usize) -> Result<Vec<u8>>;
}

/// Default allocator: fallible heap reservation
pub struct HeapAlloc;

impl BufferAlloc for HeapAlloc {
    fn alloc(&mut self, size: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(size)
            .map_err(|_| AcError::OutOfMemory(format!("packed buffer of {size} bytes")))?;
        buf.resize(size, 0);
        Ok(buf)
    }
}

/// Convert a reference automaton into a packed buffer using the heap
pub fn convert(ref_ac: &RefAc) -> Result<Vec<u8>> {
    convert_with(ref_ac, &mut HeapAlloc)
}

/// Convert a reference automaton, allocating through `alloc`
pub fn convert_with(ref_ac: &RefAc, alloc: &mut dyn BufferAlloc) -> Result<Vec<u8>> {
    if let Some(buf) = emit::<StateRec16>(ref_ac, alloc)? {
        return Ok(buf);
    }
    if let Some(buf) = emit::<StateRec32>(ref_ac, alloc)? {
        return Ok(buf);
    }
    Err(AcError::Overflow(format!(
        "{} states exceed the 4-byte offset space",
        ref_ac.state_count()
    )))
}

/// Lay out and emit the buffer under offset width `R`
///
/// Returns `Ok(None)` when the layout does not fit the width, signalling the
/// caller to widen and retry.
fn emit<R: StateRec>(ref_ac: &RefAc, alloc: &mut dyn BufferAlloc) -> Result<Option<Vec<u8>>> {
    let state_count = ref_ac.state_count();

    // Pass 1: sizing and offset assignment, id order.
    let mut offsets: Vec<u32> = Vec::with_capacity(state_count);
    let mut cursor = HEADER_LEN;
    for id in ref_ac.state_ids() {
        let k = ref_ac.state(id).goto_count();
        offsets.push(cursor as u32);
        cursor += record_size::<R>(classify(k), k);
    }
    if cursor > R::MAX_ADDRESSABLE {
        return Ok(None);
    }

    let mut buf = alloc.alloc(cursor)?;

    let header = PackedHeader {
        magic: MAGIC,
        variant: VARIANT_PACKED,
        offset_width: R::WIDTH_TAG,
        reserved: 0,
        root_offset: offsets[0],
        buffer_len: cursor as u32,
        state_count: state_count as u32,
    };
    buf[..HEADER_LEN].copy_from_slice(header.as_bytes());

    // Pass 2: emission, same order.
    for (i, id) in ref_ac.state_ids().enumerate() {
        let state = ref_ac.state(id);
        let rec_off = offsets[i] as usize;
        let k = state.goto_count();
        let kind = classify(k);
        let failure = offsets[(state.failure() - 1) as usize];

        let sparse_count = match kind {
            StateKind::Sparse => k as u8,
            StateKind::Dense => 0,
        };
        let rec = R::new(kind, state.is_terminal(), sparse_count, state.match_len(), failure);
        buf[rec_off..rec_off + mem::size_of::<R>()].copy_from_slice(rec.as_bytes());

        let body = rec_off + mem::size_of::<R>();
        let edges = state.sorted_gotos();
        match kind {
            StateKind::Sparse => {
                for (j, &(b, _)) in edges.iter().enumerate() {
                    buf[body + j] = b;
                }
                let targets = body + crate::format::align_up(k, R::OFFSET_WIDTH);
                for (j, &(_, child)) in edges.iter().enumerate() {
                    let child_off = offsets[(child - 1) as usize] as usize;
                    R::write_offset(&mut buf, targets + j * R::OFFSET_WIDTH, child_off);
                }
            }
            StateKind::Dense => {
                for &(b, child) in &edges {
                    let child_off = offsets[(child - 1) as usize] as usize;
                    R::write_offset(&mut buf, body + b as usize * R::OFFSET_WIDTH, child_off);
                }
            }
        }
    }

    Ok(Some(buf))
}
