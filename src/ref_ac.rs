//! Reference Aho-Corasick automaton over linked states
//!
//! This is the construction tier: a trie built from the pattern set, failure
//! links assigned breadth-first, and terminality propagated along failure
//! chains so the matcher only ever inspects the current state's terminal bit.
//! It is converted into the packed buffer representation by
//! [`crate::convert`] and normally discarded afterwards, but it answers
//! [`RefAc::find`] with the same contract as the packed matcher and serves as
//! the oracle in differential tests.

use crate::error::{AcError, Result};
use std::collections::{HashMap, VecDeque};

/// State id of the root; ids are assigned in allocation order starting here
pub const ROOT_ID: u32 = 1;

/// A matched span: zero-based inclusive byte indices into the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    /// Index of the first matched byte
    pub begin: usize,
    /// Index of the last matched byte, `end >= begin`
    pub end: usize,
}

impl Match {
    /// Length of the matched span in bytes
    pub fn len(&self) -> usize {
        self.end - self.begin + 1
    }

    /// Always false; a match spans at least one byte
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// One state of the reference automaton
#[derive(Debug, Clone)]
pub struct RefState {
    /// Distance from the root; the root is 0
    depth: u16,
    /// Set when a pattern ends here or a failure-chain suffix does
    terminal: bool,
    /// Length of the longest pattern that is a suffix of this state's path;
    /// zero iff not terminal
    match_len: u16,
    /// Failure link target id; the root links to itself
    failure: u32,
    /// Goto edges keyed by input byte
    gotos: HashMap<u8, u32>,
}

impl RefState {
    fn new(depth: u16) -> Self {
        Self {
            depth,
            terminal: false,
            match_len: 0,
            failure: ROOT_ID,
            gotos: HashMap::new(),
        }
    }

    /// Depth of this state (root = 0)
    pub fn depth(&self) -> u16 {
        self.depth
    }

    /// Whether arriving here signals a completed pattern
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Length of the longest pattern ending at this state, zero if none
    pub fn match_len(&self) -> u16 {
        self.match_len
    }

    /// Failure link target id
    pub fn failure(&self) -> u32 {
        self.failure
    }

    /// Number of outgoing goto edges
    pub fn goto_count(&self) -> usize {
        self.gotos.len()
    }

    /// Child reached on `b`, if any
    pub fn goto(&self, b: u8) -> Option<u32> {
        self.gotos.get(&b).copied()
    }

    /// All goto edges sorted ascending by input byte
    pub fn sorted_gotos(&self) -> Vec<(u8, u32)> {
        let mut edges: Vec<(u8, u32)> = self.gotos.iter().map(|(&b, &id)| (b, id)).collect();
        edges.sort_unstable_by_key(|&(b, _)| b);
        edges
    }
}

/// Reference automaton: trie, failure links, propagated terminality
///
/// Construction is deterministic in pattern order: the same ordered pattern
/// sequence produces the same state ids across runs. Duplicate patterns
/// revisit existing states and do not grow the trie.
#[derive(Debug)]
pub struct RefAc {
    states: Vec<RefState>,
}

impl RefAc {
    /// Build the automaton from an ordered pattern set
    ///
    /// An empty pattern list yields a valid automaton that never matches.
    /// An empty pattern, or one longer than `u16::MAX` bytes, is rejected
    /// with [`AcError::InvalidPattern`].
    pub fn build<P: AsRef<[u8]>>(patterns: &[P]) -> Result<RefAc> {
        let mut ac = RefAc {
            states: vec![RefState::new(0)],
        };

        for pattern in patterns {
            ac.add_pattern(pattern.as_ref())?;
        }

        ac.build_failure_links();
        Ok(ac)
    }

    /// Number of states including the root
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Look up a state by id
    ///
    /// # Panics
    ///
    /// Panics if `id` was not allocated by this automaton.
    pub fn state(&self, id: u32) -> &RefState {
        &self.states[(id - 1) as usize]
    }

    fn state_mut(&mut self, id: u32) -> &mut RefState {
        &mut self.states[(id - 1) as usize]
    }

    /// Iterate state ids in allocation order, root first
    pub fn state_ids(&self) -> impl Iterator<Item = u32> {
        ROOT_ID..ROOT_ID + self.states.len() as u32
    }

    fn new_state(&mut self, depth: u16) -> Result<u32> {
        self.states
            .try_reserve(1)
            .map_err(|_| AcError::OutOfMemory(format!("reference state at depth {depth}")))?;
        self.states.push(RefState::new(depth));
        Ok(self.states.len() as u32)
    }

    fn add_pattern(&mut self, pattern: &[u8]) -> Result<()> {
        if pattern.is_empty() {
            return Err(AcError::InvalidPattern("empty pattern".to_string()));
        }
        if pattern.len() > u16::MAX as usize {
            return Err(AcError::InvalidPattern(format!(
                "pattern of {} bytes exceeds the {}-byte limit",
                pattern.len(),
                u16::MAX
            )));
        }

        let mut current = ROOT_ID;
        for &b in pattern {
            current = match self.state(current).goto(b) {
                Some(next) => next,
                None => {
                    let depth = self.state(current).depth + 1;
                    let child = self.new_state(depth)?;
                    self.state_mut(current).gotos.insert(b, child);
                    child
                }
            };
        }

        let depth = self.state(current).depth;
        let terminal = self.state_mut(current);
        terminal.terminal = true;
        terminal.match_len = depth;
        Ok(())
    }

    /// Assign failure links breadth-first and propagate terminality
    ///
    /// Depth-1 states fail to the root. For a deeper child `c` reached from
    /// `s` on byte `b`, the parent's failure chain is walked until a state
    /// with a goto on `b` is found; the root absorbs the rest. A computed
    /// failure equal to `c` itself collapses to the root.
    ///
    /// When `fail(c)` is terminal, `c` becomes terminal too and inherits the
    /// failure target's match length unless a longer pattern ends at `c`
    /// itself. The failure target is strictly shallower, so by the time `c`
    /// is processed its target is final.
    fn build_failure_links(&mut self) {
        let mut queue = VecDeque::new();

        let root_children: Vec<u32> = self.state(ROOT_ID).gotos.values().copied().collect();
        for child in root_children {
            self.state_mut(child).failure = ROOT_ID;
            queue.push_back(child);
        }

        while let Some(s) = queue.pop_front() {
            let transitions: Vec<(u8, u32)> =
                self.state(s).gotos.iter().map(|(&b, &c)| (b, c)).collect();

            for (b, c) in transitions {
                queue.push_back(c);

                let mut f = self.state(s).failure;
                while f != ROOT_ID && self.state(f).goto(b).is_none() {
                    f = self.state(f).failure;
                }

                let fail_c = match self.state(f).goto(b) {
                    Some(target) if target != c => target,
                    _ => ROOT_ID,
                };
                self.state_mut(c).failure = fail_c;

                let fail_state = self.state(fail_c);
                if fail_state.terminal {
                    let inherited = fail_state.match_len;
                    let child = self.state_mut(c);
                    if !child.terminal {
                        child.terminal = true;
                        child.match_len = inherited;
                    }
                }
            }
        }
    }

    /// Earliest match of any pattern in `input`, or `None`
    ///
    /// Same contract as [`crate::PackedAc::find`]: the span with the smallest
    /// end position, and among patterns ending there, the longest.
    pub fn find(&self, input: &[u8]) -> Option<Match> {
        let mut state = ROOT_ID;
        let mut idx = 0usize;

        while idx < input.len() {
            let b = input[idx];
            match self.state(state).goto(b) {
                Some(next) => {
                    state = next;
                    idx += 1;
                    let s = self.state(state);
                    if s.terminal {
                        return Some(Match {
                            begin: idx - s.match_len as usize,
                            end: idx - 1,
                        });
                    }
                }
                None => {
                    if state == ROOT_ID {
                        idx += 1;
                    } else {
                        state = self.state(state).failure;
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trie_shape() {
        let ac = RefAc::build(&["he", "she", "his", "hers"]).unwrap();
        // root + h,e + s,h,e + i,s + r,s
        assert_eq!(ac.state_count(), 10);

        let root = ac.state(ROOT_ID);
        assert_eq!(root.depth(), 0);
        assert_eq!(root.goto_count(), 2); // 'h', 's'
        assert!(!root.is_terminal());
    }

    #[test]
    fn duplicates_collapse() {
        let once = RefAc::build(&["poto"]).unwrap();
        let twice = RefAc::build(&["poto", "poto"]).unwrap();
        assert_eq!(once.state_count(), twice.state_count());
        assert_eq!(twice.state_count(), 5);
    }

    #[test]
    fn empty_pattern_rejected() {
        let err = RefAc::build(&["he", ""]).unwrap_err();
        assert!(matches!(err, AcError::InvalidPattern(_)));
    }

    #[test]
    fn empty_dictionary_never_matches() {
        let ac = RefAc::build::<&[u8]>(&[]).unwrap();
        assert_eq!(ac.state_count(), 1);
        assert_eq!(ac.find(b"anything at all"), None);
        assert_eq!(ac.find(b""), None);
    }

    #[test]
    fn failure_links_point_shallower() {
        let ac = RefAc::build(&["he", "she", "his", "hers"]).unwrap();
        for id in ac.state_ids() {
            let s = ac.state(id);
            let f = ac.state(s.failure());
            if id == ROOT_ID {
                assert_eq!(s.failure(), ROOT_ID);
            } else {
                assert!(f.depth() < s.depth());
            }
        }
    }

    #[test]
    fn terminality_propagates_along_failures() {
        // "she" ends at a state whose failure chain passes through "he".
        let ac = RefAc::build(&["she", "he"]).unwrap();
        let s = ac.state(ROOT_ID).goto(b's').unwrap();
        let sh = ac.state(s).goto(b'h').unwrap();
        let she = ac.state(sh).goto(b'e').unwrap();
        assert!(ac.state(she).is_terminal());
        assert_eq!(ac.state(she).match_len(), 3);

        // "sh" fails to "h", "she" fails to "he".
        let h = ac.state(ROOT_ID).goto(b'h').unwrap();
        let he = ac.state(h).goto(b'e').unwrap();
        assert_eq!(ac.state(sh).failure(), h);
        assert_eq!(ac.state(she).failure(), he);
    }

    #[test]
    fn propagated_terminal_reports_suffix_length() {
        // "abc" is not a pattern, but entering it completes "bc".
        let ac = RefAc::build(&["bc", "abcd"]).unwrap();
        let m = ac.find(b"abcd").unwrap();
        assert_eq!((m.begin, m.end), (1, 2));
    }

    #[test]
    fn reference_matcher_earliest() {
        let ac = RefAc::build(&["he", "she", "his", "her"]).unwrap();
        let m = ac.find(b"ahe").unwrap();
        assert_eq!((m.begin, m.end), (1, 2));

        // "her" would end later; "he" wins on earliest end.
        let m = ac.find(b"hers").unwrap();
        assert_eq!((m.begin, m.end), (0, 1));
    }
}
