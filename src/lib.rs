//! firstmatch - Earliest-Match Multi-Pattern Search
//!
//! firstmatch builds an Aho-Corasick automaton from a fixed dictionary of
//! byte-string patterns and reports the earliest occurrence of any pattern in
//! an input. The distinguishing design is a two-stage pipeline: a reference
//! construction over linked nodes, then a deterministic conversion into a
//! single contiguous, pointer-free byte buffer that is the object actually
//! used for matching.
//!
//! # Quick Start
//!
//! ```rust
//! use firstmatch::PackedAc;
//!
//! let ac = PackedAc::build(&["he", "she", "his", "her"])?;
//!
//! let m = ac.find(b"ushers").unwrap();
//! assert_eq!((m.begin, m.end), (1, 3)); // "she", inclusive indices
//!
//! assert_eq!(ac.find(b"nothing here"), None);
//! # Ok::<(), firstmatch::AcError>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! patterns ──> RefAc (trie + failure links) ──> convert ──> PackedAc
//!                                                              │
//!                              single relocatable byte buffer ─┘
//! ```
//!
//! The packed buffer holds a 16-byte header followed by one record per
//! state. Each record encodes its transitions either sparsely (sorted bytes,
//! binary searched) or densely (256-entry table), chosen per state by
//! fanout. Offsets replace pointers throughout, so the buffer can be handed
//! across FFI, copied, or persisted as-is and re-adopted with
//! [`PackedAc::from_bytes`].
//!
//! # Key Properties
//!
//! - **Earliest match**: the span with the smallest end position is
//!   returned; among patterns ending there, the longest
//! - **Deterministic**: equal dictionaries yield byte-identical buffers
//! - **Immutable after build**: one automaton serves concurrent matches
//!   from many threads without locking
//! - **Raw bytes**: the alphabet is `{0..=255}`; no Unicode awareness

#![warn(missing_docs)]
#![warn(clippy::all)]

/// C FFI surface: create/match/free over magic-tagged opaque handles
pub mod c_api;
/// Two-pass conversion of the reference automaton into the packed buffer
pub mod convert;
/// Error types
pub mod error;
/// Packed buffer layout: header, record headers, encoding kinds
pub mod format;
/// Packed automaton and matcher
pub mod packed;
/// Reference automaton: trie, failure links, terminality propagation
pub mod ref_ac;
/// Structural validation of untrusted packed buffers
pub mod validation;

pub use convert::{convert, convert_with, BufferAlloc, HeapAlloc};
pub use error::{AcError, Result};
pub use format::{OffsetWidth, MAGIC, VARIANT_PACKED, VARIANT_REFERENCE};
pub use packed::PackedAc;
pub use ref_ac::{Match, RefAc};
pub use validation::{validate_packed, PackedStats, ValidationResult};
