//! Packed Aho-Corasick automaton and its matcher
//!
//! A [`PackedAc`] owns exactly one contiguous byte buffer produced by
//! [`crate::convert`]. Matching runs directly on the buffer: per state, a
//! one-byte discriminator selects between a binary search over sorted edge
//! bytes and a 256-entry direct-indexed table. The buffer is immutable after
//! build, so one automaton can serve concurrent matches from many threads.

use crate::convert::{convert, convert_with, BufferAlloc};
use crate::error::{AcError, Result};
use crate::format::{
    align_up, OffsetWidth, PackedHeader, StateKind, StateRec, StateRec16, StateRec32,
};
use crate::ref_ac::{Match, RefAc};
use crate::validation::validate_packed;
use memchr::{memchr, memchr2, memchr3};
use std::mem;
use zerocopy::FromBytes;

/// Packed automaton: a single relocatable byte buffer plus cached root data
pub struct PackedAc {
    buf: Vec<u8>,
    root_offset: usize,
    width: OffsetWidth,
    state_count: usize,
    /// Bytes with a transition out of the root, sorted and deduplicated.
    /// Drives the fast-forward scan while the matcher sits at the root.
    root_bytes: Vec<u8>,
    /// 256-bit membership table over `root_bytes`
    root_mask: [u8; 32],
}

impl PackedAc {
    /// Build a packed automaton from an ordered pattern set
    ///
    /// Duplicates are permitted and collapse to one state. An empty pattern
    /// list yields an automaton that never matches; an empty pattern fails
    /// with [`AcError::InvalidPattern`].
    pub fn build<P: AsRef<[u8]>>(patterns: &[P]) -> Result<PackedAc> {
        let ref_ac = RefAc::build(patterns)?;
        Self::adopt(convert(&ref_ac)?)
    }

    /// Build, allocating the packed buffer through `alloc`
    pub fn build_with<P: AsRef<[u8]>>(
        patterns: &[P],
        alloc: &mut dyn BufferAlloc,
    ) -> Result<PackedAc> {
        let ref_ac = RefAc::build(patterns)?;
        Self::adopt(convert_with(&ref_ac, alloc)?)
    }

    /// Adopt a buffer that has already passed structural validation
    fn adopt(buf: Vec<u8>) -> Result<PackedAc> {
        let header = PackedHeader::read_from_prefix(&buf)
            .map_err(|_| AcError::Validation("buffer shorter than header".to_string()))?
            .0;
        let width = OffsetWidth::from_tag(header.offset_width)
            .ok_or_else(|| AcError::Validation("unknown offset width".to_string()))?;
        let root_offset = header.root_offset as usize;

        let root_bytes = match width {
            OffsetWidth::U16 => extract_root_bytes::<StateRec16>(&buf, root_offset),
            OffsetWidth::U32 => extract_root_bytes::<StateRec32>(&buf, root_offset),
        };
        let mut root_mask = [0u8; 32];
        for &b in &root_bytes {
            root_mask[b as usize / 8] |= 1 << (b % 8);
        }

        Ok(PackedAc {
            buf,
            root_offset,
            width,
            state_count: header.state_count as usize,
            root_bytes,
            root_mask,
        })
    }

    /// Re-adopt a relocatable buffer, e.g. one read back from disk
    ///
    /// The buffer is fully validated first; anything that fails a structural
    /// check is rejected with [`AcError::Validation`].
    pub fn from_bytes(buf: Vec<u8>) -> Result<PackedAc> {
        let report = validate_packed(&buf);
        if let Some(error) = report.errors.first() {
            return Err(AcError::Validation(error.clone()));
        }
        Self::adopt(buf)
    }

    /// The underlying buffer, suitable for relocation or persistence
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Number of state records in the buffer
    pub fn state_count(&self) -> usize {
        self.state_count
    }

    /// Offset width chosen at conversion time
    pub fn offset_width(&self) -> OffsetWidth {
        self.width
    }

    /// Earliest match of any dictionary pattern in `input`, or `None`
    ///
    /// The returned span has the smallest end position of any pattern
    /// occurrence; among patterns ending there it is the longest. Indices are
    /// zero-based and inclusive on both ends.
    pub fn find(&self, input: &[u8]) -> Option<Match> {
        match self.width {
            OffsetWidth::U16 => self.find_impl::<StateRec16>(input),
            OffsetWidth::U32 => self.find_impl::<StateRec32>(input),
        }
    }

    /// Begin index of the earliest match, or `None`
    ///
    /// Convenience for foreign callers whose calling convention handles
    /// scalar returns more cheaply than aggregate returns.
    pub fn find_begin(&self, input: &[u8]) -> Option<usize> {
        self.find(input).map(|m| m.begin)
    }

    fn find_impl<R: StateRec>(&self, input: &[u8]) -> Option<Match> {
        let root = self.root_offset;
        let mut s = root;
        let mut rec = self.read_rec::<R>(s)?;
        let mut i = 0usize;

        while i < input.len() {
            if s == root {
                i = self.next_root_candidate(input, i)?;
            }
            let b = input[i];

            match self.transition::<R>(s, &rec, b) {
                Some(child) => {
                    rec = self.read_rec::<R>(child)?;
                    s = child;
                    i += 1;
                    if rec.is_terminal() {
                        return Some(Match {
                            begin: i - rec.match_len(),
                            end: i - 1,
                        });
                    }
                }
                None => {
                    if s == root {
                        i += 1;
                    } else {
                        s = rec.failure();
                        rec = self.read_rec::<R>(s)?;
                    }
                }
            }
        }
        None
    }

    #[inline]
    fn read_rec<R: StateRec>(&self, offset: usize) -> Option<R> {
        let slice = self.buf.get(offset..)?;
        Some(R::read_from_prefix(slice).ok()?.0)
    }

    /// Look up `goto(state, b)`; `None` when no transition exists
    #[inline]
    fn transition<R: StateRec>(&self, rec_off: usize, rec: &R, b: u8) -> Option<usize> {
        let body = rec_off + mem::size_of::<R>();
        match StateKind::from_u8(rec.kind_raw())? {
            StateKind::Sparse => {
                let k = rec.edge_count();
                let bytes = self.buf.get(body..body + k)?;
                let idx = bytes.binary_search(&b).ok()?;
                let targets = body + align_up(k, R::OFFSET_WIDTH);
                R::read_offset(&self.buf, targets + idx * R::OFFSET_WIDTH)
            }
            StateKind::Dense => {
                let target = R::read_offset(&self.buf, body + b as usize * R::OFFSET_WIDTH)?;
                if target == 0 {
                    None
                } else {
                    Some(target)
                }
            }
        }
    }

    /// While at the root, skip to the next byte that can leave it
    ///
    /// Uses memchr for up to three distinct root bytes and the 256-bit
    /// membership table for up to sixteen; beyond that the automaton already
    /// transitions out of the root often enough that skipping cannot pay.
    #[inline]
    fn next_root_candidate(&self, input: &[u8], start: usize) -> Option<usize> {
        if start >= input.len() {
            return None;
        }
        match self.root_bytes.len() {
            0 => None,
            1 => memchr(self.root_bytes[0], &input[start..]).map(|p| start + p),
            2 => memchr2(self.root_bytes[0], self.root_bytes[1], &input[start..])
                .map(|p| start + p),
            3 => memchr3(
                self.root_bytes[0],
                self.root_bytes[1],
                self.root_bytes[2],
                &input[start..],
            )
            .map(|p| start + p),
            4..=16 => input[start..]
                .iter()
                .position(|&b| self.root_mask[b as usize / 8] & (1 << (b % 8)) != 0)
                .map(|p| start + p),
            _ => Some(start),
        }
    }
}

/// Collect the bytes with a root transition, sorted ascending
fn extract_root_bytes<R: StateRec>(buf: &[u8], root_offset: usize) -> Vec<u8> {
    let mut bytes = Vec::new();
    let Some(slice) = buf.get(root_offset..) else {
        return bytes;
    };
    let Ok((rec, _)) = R::read_from_prefix(slice) else {
        return bytes;
    };
    let body = root_offset + mem::size_of::<R>();

    match StateKind::from_u8(rec.kind_raw()) {
        Some(StateKind::Sparse) => {
            if let Some(edge_bytes) = buf.get(body..body + rec.edge_count()) {
                bytes.extend_from_slice(edge_bytes);
            }
        }
        Some(StateKind::Dense) => {
            for b in 0u16..=255 {
                let at = body + b as usize * R::OFFSET_WIDTH;
                if let Some(target) = R::read_offset(buf, at) {
                    if target != 0 {
                        bytes.push(b as u8);
                    }
                }
            }
        }
        None => {}
    }

    // Sparse edges arrive pre-sorted; keep the invariant either way.
    bytes.sort_unstable();
    bytes.dedup();
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(ac: &PackedAc, input: &str) -> Option<(usize, usize)> {
        ac.find(input.as_bytes()).map(|m| (m.begin, m.end))
    }

    #[test]
    fn classic_dictionary() {
        let ac = PackedAc::build(&["he", "she", "his", "her"]).unwrap();
        assert_eq!(spans(&ac, "ahe"), Some((1, 2)));
        assert_eq!(spans(&ac, "she"), Some((0, 2)));
        assert_eq!(spans(&ac, "hers"), Some((0, 1)));
        assert_eq!(spans(&ac, "xyz"), None);
    }

    #[test]
    fn root_byte_extraction() {
        let ac = PackedAc::build(&["he", "she", "his", "her"]).unwrap();
        assert_eq!(ac.root_bytes, vec![b'h', b's']);

        let single = PackedAc::build(&["needle"]).unwrap();
        assert_eq!(single.root_bytes, vec![b'n']);
    }

    #[test]
    fn dense_root() {
        // Sixty distinct leading bytes force the dense encoding at the root.
        let patterns: Vec<Vec<u8>> = (1u8..=60).map(|b| vec![b, b'x']).collect();
        let ac = PackedAc::build(&patterns).unwrap();
        assert_eq!(ac.root_bytes.len(), 60);

        let m = ac.find(&[99, 7, b'x', 7][..]).unwrap();
        assert_eq!((m.begin, m.end), (1, 2));
    }

    #[test]
    fn fast_forward_skips_dead_prefix() {
        let ac = PackedAc::build(&["needle"]).unwrap();
        let mut input = vec![b'x'; 1000];
        input.extend_from_slice(b"needle");
        let m = ac.find(&input).unwrap();
        assert_eq!((m.begin, m.end), (1000, 1005));

        let all_filler = vec![b'x'; 1000];
        assert_eq!(ac.find(&all_filler), None);
    }

    #[test]
    fn bitset_fast_forward_path() {
        // Five root bytes exercise the membership-table scan.
        let ac = PackedAc::build(&["a1", "b2", "c3", "d4", "e5"]).unwrap();
        assert_eq!(ac.root_bytes.len(), 5);
        assert_eq!(spans(&ac, "zzzzd4zz"), Some((4, 5)));
    }

    #[test]
    fn find_begin_matches_find() {
        let ac = PackedAc::build(&["ot h", "andle"]).unwrap();
        let text = "The pot had a handle";
        assert_eq!(ac.find_begin(text.as_bytes()), Some(5));
        assert_eq!(spans(&ac, text), Some((5, 8)));
    }

    #[test]
    fn empty_inputs() {
        let ac = PackedAc::build(&["abc"]).unwrap();
        assert_eq!(ac.find(b""), None);

        let empty = PackedAc::build::<&[u8]>(&[]).unwrap();
        assert_eq!(empty.find(b"abc"), None);
        assert_eq!(empty.state_count(), 1);
    }

    #[test]
    fn round_trip_through_bytes() {
        let ac = PackedAc::build(&["he", "she"]).unwrap();
        let copy = PackedAc::from_bytes(ac.as_bytes().to_vec()).unwrap();
        assert_eq!(spans(&copy, "ushers"), spans(&ac, "ushers"));
        assert_eq!(copy.state_count(), ac.state_count());
    }

    #[test]
    fn corrupted_bytes_rejected() {
        let ac = PackedAc::build(&["he", "she"]).unwrap();

        let mut bad_magic = ac.as_bytes().to_vec();
        bad_magic[0] ^= 0xFF;
        assert!(matches!(
            PackedAc::from_bytes(bad_magic),
            Err(AcError::Validation(_))
        ));

        let truncated = ac.as_bytes()[..ac.as_bytes().len() - 4].to_vec();
        assert!(matches!(
            PackedAc::from_bytes(truncated),
            Err(AcError::Validation(_))
        ));
    }

    #[test]
    fn build_with_custom_allocator() {
        use crate::convert::HeapAlloc;

        struct Tracking {
            last_size: usize,
        }
        impl BufferAlloc for Tracking {
            fn alloc(&mut self, size: usize) -> crate::error::Result<Vec<u8>> {
                self.last_size = size;
                HeapAlloc.alloc(size)
            }
        }

        let mut alloc = Tracking { last_size: 0 };
        let ac = PackedAc::build_with(&["he", "she"], &mut alloc).unwrap();
        assert_eq!(alloc.last_size, ac.as_bytes().len());
        assert_eq!(
            ac.find(b"ushers").map(|m| (m.begin, m.end)),
            Some((1, 3))
        );
    }

    #[test]
    fn binary_patterns() {
        // The alphabet is raw bytes; NUL and high bytes are ordinary.
        let ac = PackedAc::build(&[&[0u8, 255, 0][..], &[7u8][..]]).unwrap();
        let m = ac.find(&[1u8, 0, 255, 0, 7][..]).unwrap();
        assert_eq!((m.begin, m.end), (1, 3));
    }
}
