//! Structural validation for untrusted packed buffers
//!
//! A packed buffer adopted from outside the build pipeline (disk, FFI, the
//! network) is walked record by record before use. Validation checks the
//! header, that the records tile the buffer exactly, and that every failure
//! and child offset lands on a record boundary. Errors make the buffer
//! unusable; warnings flag oddities that do not affect matching.

use crate::format::{
    align_up, OffsetWidth, PackedHeader, StateKind, StateRec, StateRec16, StateRec32, HEADER_LEN,
    MAGIC, VARIANT_PACKED,
};
use std::collections::{HashSet, VecDeque};
use std::mem;
use zerocopy::FromBytes;

/// Outcome of validating one buffer
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Critical problems; any entry makes the buffer unusable
    pub errors: Vec<String>,
    /// Non-fatal oddities
    pub warnings: Vec<String>,
    /// Statistics gathered during the walk
    pub stats: PackedStats,
}

impl ValidationResult {
    /// Whether the buffer passed every structural check
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Statistics gathered while walking a packed buffer
#[derive(Debug, Clone, Default)]
pub struct PackedStats {
    /// Number of state records
    pub state_count: u32,
    /// States using the sparse encoding
    pub sparse_count: u32,
    /// States using the dense encoding
    pub dense_count: u32,
    /// States with the terminal bit set
    pub terminal_count: u32,
    /// States unreachable from the root via goto edges
    pub unreachable_count: u32,
    /// Total buffer length in bytes
    pub buffer_len: usize,
}

/// Validate a packed automaton buffer
pub fn validate_packed(buffer: &[u8]) -> ValidationResult {
    let mut result = ValidationResult {
        errors: Vec::new(),
        warnings: Vec::new(),
        stats: PackedStats {
            buffer_len: buffer.len(),
            ..Default::default()
        },
    };

    let Ok((header, _)) = PackedHeader::read_from_prefix(buffer) else {
        result.errors.push("buffer shorter than header".to_string());
        return result;
    };

    if header.magic != MAGIC {
        result
            .errors
            .push(format!("bad magic byte {:#04x}", header.magic));
        return result;
    }
    if header.variant != VARIANT_PACKED {
        result
            .errors
            .push(format!("unsupported variant {}", header.variant));
        return result;
    }
    if header.buffer_len as usize != buffer.len() {
        result.errors.push(format!(
            "header claims {} bytes, buffer has {}",
            header.buffer_len,
            buffer.len()
        ));
        return result;
    }
    if header.state_count == 0 {
        result.errors.push("zero states".to_string());
        return result;
    }
    if header.root_offset as usize != HEADER_LEN {
        result.errors.push(format!(
            "root record at {} instead of {}",
            header.root_offset, HEADER_LEN
        ));
        return result;
    }
    result.stats.state_count = header.state_count;

    match OffsetWidth::from_tag(header.offset_width) {
        Some(OffsetWidth::U16) => walk::<StateRec16>(buffer, &header, &mut result),
        Some(OffsetWidth::U32) => walk::<StateRec32>(buffer, &header, &mut result),
        None => result
            .errors
            .push(format!("unknown offset width {}", header.offset_width)),
    }

    result
}

fn walk<R: StateRec>(buffer: &[u8], header: &PackedHeader, result: &mut ValidationResult) {
    // First pass: tile the buffer into records and collect the boundary set.
    let mut boundaries: Vec<usize> = Vec::with_capacity(header.state_count as usize);
    let mut cursor = HEADER_LEN;

    for i in 0..header.state_count {
        let Some(slice) = buffer.get(cursor..) else {
            result
                .errors
                .push(format!("record {i} starts past the buffer end"));
            return;
        };
        let Ok((rec, _)) = R::read_from_prefix(slice) else {
            result.errors.push(format!("record {i} is truncated"));
            return;
        };
        let Some(kind) = StateKind::from_u8(rec.kind_raw()) else {
            result
                .errors
                .push(format!("record {i} has invalid encoding kind {}", rec.kind_raw()));
            return;
        };

        boundaries.push(cursor);
        let size = crate::format::record_size::<R>(kind, rec.edge_count());
        match cursor.checked_add(size) {
            Some(end) if end <= buffer.len() => cursor = end,
            _ => {
                result
                    .errors
                    .push(format!("record {i} overruns the buffer"));
                return;
            }
        }
    }

    if cursor != buffer.len() {
        result.errors.push(format!(
            "{} trailing bytes after the last record",
            buffer.len() - cursor
        ));
    }

    let boundary_set: HashSet<usize> = boundaries.iter().copied().collect();

    // Second pass: per-record field checks against the boundary set.
    // The first pass already verified record bounds and kinds.
    for (i, &rec_off) in boundaries.iter().enumerate() {
        let Ok((rec, _)) = R::read_from_prefix(&buffer[rec_off..]) else {
            continue;
        };
        let Some(kind) = StateKind::from_u8(rec.kind_raw()) else {
            continue;
        };
        let body = rec_off + mem::size_of::<R>();

        match kind {
            StateKind::Sparse => result.stats.sparse_count += 1,
            StateKind::Dense => result.stats.dense_count += 1,
        }

        if rec.terminal_raw() > 1 {
            result
                .errors
                .push(format!("record {i} has non-boolean terminal flag"));
        }
        if rec.is_terminal() != (rec.match_len() > 0) {
            result.errors.push(format!(
                "record {i}: terminal flag and match length disagree"
            ));
        }
        if rec.is_terminal() {
            result.stats.terminal_count += 1;
        }

        if !boundary_set.contains(&rec.failure()) {
            result.errors.push(format!(
                "record {i} failure offset {} is not a record boundary",
                rec.failure()
            ));
        }
        if rec_off == HEADER_LEN && rec.failure() != rec_off {
            result
                .errors
                .push("root failure link does not point at the root".to_string());
        }

        match kind {
            StateKind::Sparse => {
                let k = rec.edge_count();
                let Some(edge_bytes) = buffer.get(body..body + k) else {
                    result
                        .errors
                        .push(format!("record {i} edge bytes overrun the buffer"));
                    continue;
                };
                if !edge_bytes.windows(2).all(|w| w[0] < w[1]) {
                    result.errors.push(format!(
                        "record {i} edge bytes are not strictly ascending"
                    ));
                }
                let targets = body + align_up(k, R::OFFSET_WIDTH);
                for j in 0..k {
                    match R::read_offset(buffer, targets + j * R::OFFSET_WIDTH) {
                        Some(target) if boundary_set.contains(&target) => {}
                        Some(target) => result.errors.push(format!(
                            "record {i} child offset {target} is not a record boundary"
                        )),
                        None => result
                            .errors
                            .push(format!("record {i} child table overruns the buffer")),
                    }
                }
            }
            StateKind::Dense => {
                for b in 0..256 {
                    match R::read_offset(buffer, body + b * R::OFFSET_WIDTH) {
                        Some(0) => {}
                        Some(target) if boundary_set.contains(&target) => {}
                        Some(target) => result.errors.push(format!(
                            "record {i} dense entry {b} points at {target}, not a record"
                        )),
                        None => {
                            result
                                .errors
                                .push(format!("record {i} dense table overruns the buffer"));
                            break;
                        }
                    }
                }
            }
        }
    }

    if !result.errors.is_empty() {
        return;
    }

    // Reachability sweep over goto edges; orphans cannot corrupt a match but
    // indicate a converter bug or tampering.
    let mut seen: HashSet<usize> = HashSet::new();
    let mut queue = VecDeque::new();
    seen.insert(HEADER_LEN);
    queue.push_back(HEADER_LEN);
    while let Some(rec_off) = queue.pop_front() {
        let Ok((rec, _)) = R::read_from_prefix(&buffer[rec_off..]) else {
            continue;
        };
        let Some(kind) = StateKind::from_u8(rec.kind_raw()) else {
            continue;
        };
        let body = rec_off + mem::size_of::<R>();
        let visit = |target: usize, seen: &mut HashSet<usize>, queue: &mut VecDeque<usize>| {
            if target != 0 && seen.insert(target) {
                queue.push_back(target);
            }
        };
        match kind {
            StateKind::Sparse => {
                let k = rec.edge_count();
                let targets = body + align_up(k, R::OFFSET_WIDTH);
                for j in 0..k {
                    if let Some(t) = R::read_offset(buffer, targets + j * R::OFFSET_WIDTH) {
                        visit(t, &mut seen, &mut queue);
                    }
                }
            }
            StateKind::Dense => {
                for b in 0..256 {
                    if let Some(t) = R::read_offset(buffer, body + b * R::OFFSET_WIDTH) {
                        visit(t, &mut seen, &mut queue);
                    }
                }
            }
        }
    }
    let unreachable = boundaries.len() - seen.len();
    if unreachable > 0 {
        result.stats.unreachable_count = unreachable as u32;
        result
            .warnings
            .push(format!("{unreachable} records unreachable from the root"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packed::PackedAc;

    fn built(patterns: &[&str]) -> Vec<u8> {
        PackedAc::build(patterns).unwrap().as_bytes().to_vec()
    }

    #[test]
    fn built_buffers_validate_clean() {
        for dict in [
            vec!["he", "she", "his", "hers"],
            vec!["The"],
            vec!["a"],
            vec!["poto", "poto"],
        ] {
            let report = validate_packed(&built(&dict));
            assert!(report.is_valid(), "errors: {:?}", report.errors);
            assert!(report.warnings.is_empty(), "warnings: {:?}", report.warnings);
            assert_eq!(report.stats.unreachable_count, 0);
        }
    }

    #[test]
    fn stats_reflect_structure() {
        let report = validate_packed(&built(&["he", "she", "his", "hers"]));
        assert_eq!(report.stats.state_count, 10);
        assert_eq!(report.stats.sparse_count, 10);
        assert_eq!(report.stats.dense_count, 0);
        // One per pattern end: he, she, his, hers.
        assert_eq!(report.stats.terminal_count, 4);
    }

    #[test]
    fn dense_states_counted() {
        let patterns: Vec<Vec<u8>> = (1u8..=60).map(|b| vec![b]).collect();
        let buf = PackedAc::build(&patterns).unwrap().as_bytes().to_vec();
        let report = validate_packed(&buf);
        assert!(report.is_valid());
        assert_eq!(report.stats.dense_count, 1);
        assert_eq!(report.stats.sparse_count, 60);
    }

    #[test]
    fn rejects_header_damage() {
        let mut buf = built(&["he"]);

        let mut bad = buf.clone();
        bad[0] = 0x00;
        assert!(!validate_packed(&bad).is_valid());

        let mut bad = buf.clone();
        bad[1] = 7;
        assert!(!validate_packed(&bad).is_valid());

        buf.truncate(buf.len() - 1);
        assert!(!validate_packed(&buf).is_valid());
    }

    #[test]
    fn rejects_dangling_offsets() {
        let buf = built(&["he", "she"]);

        // Smash the root's failure link to a misaligned offset.
        let mut bad = buf.clone();
        let fail_at = HEADER_LEN + 6; // StateRec16 failure field
        bad[fail_at] = 0x03;
        bad[fail_at + 1] = 0x00;
        let report = validate_packed(&bad);
        assert!(!report.is_valid());
    }

    #[test]
    fn rejects_trailing_garbage() {
        let mut buf = built(&["he"]);
        buf.extend_from_slice(&[0u8; 8]);
        let report = validate_packed(&buf);
        assert!(!report.is_valid());
    }

    #[test]
    fn empty_dictionary_buffer_is_valid() {
        let buf = PackedAc::build::<&[u8]>(&[]).unwrap().as_bytes().to_vec();
        let report = validate_packed(&buf);
        assert!(report.is_valid(), "errors: {:?}", report.errors);
        assert_eq!(report.stats.state_count, 1);
        assert_eq!(report.stats.terminal_count, 0);
    }
}
