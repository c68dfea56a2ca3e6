//! Sorted vessel registry
//!
//! Doubly-linked list ordered by nominal ratio, descending: the head is the
//! safest vessel, the tail the riskiest. Keys are the ratios stored at the
//! last insert, so every operation that changes a vessel's health must
//! `reinsert` it.
//!
//! Insertion takes a `(prev, next)` hint. A valid hint costs O(1); a stale
//! one is repaired by walking from whichever neighbour is still usable.
//! `approx_hint` produces a starting point by seeded random sampling.

use std::collections::HashMap;

use log::debug;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};
use crate::math::abs_diff;
use crate::types::AccountId;

/// Caller-supplied neighbours of the insertion point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Hint {
    /// Expected neighbour with a key >= the inserted one
    pub prev: Option<AccountId>,
    /// Expected neighbour with a key <= the inserted one
    pub next: Option<AccountId>,
}

impl Hint {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn between(prev: Option<AccountId>, next: Option<AccountId>) -> Self {
        Self { prev, next }
    }
}

/// Result of a randomized hint search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApproxHint {
    pub hint: Option<AccountId>,
    /// Distance between the hint's key and the target
    pub diff: u128,
    /// Seed to continue the search with
    pub latest_seed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Node {
    key: u128,
    prev: Option<AccountId>,
    next: Option<AccountId>,
    /// Index into `members`
    slot: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortedVessels {
    nodes: HashMap<AccountId, Node>,
    /// Random-access view of the members for sampling
    members: Vec<AccountId>,
    head: Option<AccountId>,
    tail: Option<AccountId>,
    max_size: usize,
}

impl SortedVessels {
    pub fn new(max_size: usize) -> Self {
        Self {
            nodes: HashMap::new(),
            members: Vec::new(),
            head: None,
            tail: None,
            max_size,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.max_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn contains(&self, id: AccountId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Key stored for `id` at its last insert
    pub fn key_of(&self, id: AccountId) -> Option<u128> {
        self.nodes.get(&id).map(|n| n.key)
    }

    pub fn first(&self) -> Option<AccountId> {
        self.head
    }

    pub fn last(&self) -> Option<AccountId> {
        self.tail
    }

    pub fn next(&self, id: AccountId) -> Option<AccountId> {
        self.nodes.get(&id).and_then(|n| n.next)
    }

    pub fn prev(&self, id: AccountId) -> Option<AccountId> {
        self.nodes.get(&id).and_then(|n| n.prev)
    }

    /// Head to tail
    pub fn iter(&self) -> impl Iterator<Item = AccountId> + '_ {
        std::iter::successors(self.head, move |id| self.next(*id))
    }

    /// Tail to head, riskiest first
    pub fn iter_from_tail(&self) -> impl Iterator<Item = AccountId> + '_ {
        std::iter::successors(self.tail, move |id| self.prev(*id))
    }

    pub fn insert(&mut self, id: AccountId, key: u128, hint: Hint) -> LedgerResult<()> {
        if self.is_full() {
            return Err(LedgerError::RegistryFull(self.max_size));
        }
        if self.contains(id) {
            return Err(LedgerError::RegistryContains(id));
        }
        if key == 0 {
            return Err(LedgerError::ZeroRegistryKey);
        }

        let (prev, next) = if self.valid_insert_position(key, hint.prev, hint.next) {
            (hint.prev, hint.next)
        } else {
            self.find_insert_position(key, hint)
        };

        match prev {
            Some(p) => self.link_next(p, Some(id)),
            None => self.head = Some(id),
        }
        match next {
            Some(n) => self.link_prev(n, Some(id)),
            None => self.tail = Some(id),
        }
        self.nodes.insert(id, Node { key, prev, next, slot: self.members.len() });
        self.members.push(id);
        Ok(())
    }

    /// Unlink `id`, returning its stored key
    pub fn remove(&mut self, id: AccountId) -> LedgerResult<u128> {
        let node = self.nodes.remove(&id).ok_or(LedgerError::RegistryMissing(id))?;

        match node.prev {
            Some(p) => self.link_next(p, node.next),
            None => self.head = node.next,
        }
        match node.next {
            Some(n) => self.link_prev(n, node.prev),
            None => self.tail = node.prev,
        }

        self.members.swap_remove(node.slot);
        if let Some(moved) = self.members.get(node.slot).copied() {
            if let Some(m) = self.nodes.get_mut(&moved) {
                m.slot = node.slot;
            }
        }
        Ok(node.key)
    }

    /// Move `id` to the position of `new_key`
    pub fn reinsert(&mut self, id: AccountId, new_key: u128, hint: Hint) -> LedgerResult<()> {
        if !self.contains(id) {
            return Err(LedgerError::RegistryMissing(id));
        }
        if new_key == 0 {
            return Err(LedgerError::ZeroRegistryKey);
        }
        self.remove(id)?;
        // a hint naming the vessel itself is useless once it is unlinked
        let hint = Hint {
            prev: hint.prev.filter(|p| *p != id),
            next: hint.next.filter(|n| *n != id),
        };
        self.insert(id, new_key, hint)
    }

    /// Would `key` sit correctly between `prev` and `next`?
    pub fn valid_insert_position(&self, key: u128, prev: Option<AccountId>, next: Option<AccountId>) -> bool {
        match (prev, next) {
            (None, None) => self.is_empty(),
            (None, Some(n)) => self.head == Some(n) && self.key_of(n).is_some_and(|k| key >= k),
            (Some(p), None) => self.tail == Some(p) && self.key_of(p).is_some_and(|k| key <= k),
            (Some(p), Some(n)) => {
                self.next(p) == Some(n)
                    && self.key_of(p).is_some_and(|k| k >= key)
                    && self.key_of(n).is_some_and(|k| key >= k)
            }
        }
    }

    /// Exact `(prev, next)` for `key`, walking from whatever the hint still offers
    pub fn find_insert_position(&self, key: u128, hint: Hint) -> (Option<AccountId>, Option<AccountId>) {
        let prev = hint.prev.filter(|p| self.key_of(*p).is_some_and(|k| key <= k));
        let next = hint.next.filter(|n| self.key_of(*n).is_some_and(|k| key >= k));

        match (prev, next) {
            (Some(p), _) => self.descend_list(key, p),
            (None, Some(n)) => self.ascend_list(key, n),
            (None, None) => match self.head {
                Some(h) => self.descend_list(key, h),
                None => (None, None),
            },
        }
    }

    /// Walk towards the tail starting at `start`
    fn descend_list(&self, key: u128, start: AccountId) -> (Option<AccountId>, Option<AccountId>) {
        if self.head == Some(start) && self.key_of(start).is_some_and(|k| key >= k) {
            return (None, Some(start));
        }
        let mut prev = Some(start);
        let mut next = self.next(start);
        while let Some(p) = prev {
            if self.valid_insert_position(key, prev, next) {
                break;
            }
            prev = self.next(p);
            next = prev.and_then(|id| self.next(id));
        }
        (prev, next)
    }

    /// Walk towards the head starting at `start`
    fn ascend_list(&self, key: u128, start: AccountId) -> (Option<AccountId>, Option<AccountId>) {
        if self.tail == Some(start) && self.key_of(start).is_some_and(|k| key <= k) {
            return (Some(start), None);
        }
        let mut next = Some(start);
        let mut prev = self.prev(start);
        while let Some(n) = next {
            if self.valid_insert_position(key, prev, next) {
                break;
            }
            next = self.prev(n);
            prev = next.and_then(|id| self.prev(id));
        }
        (prev, next)
    }

    /// Seeded random search for a member whose key is close to `key`
    ///
    /// Starts from the closer end of the list, then draws `trials` members
    /// uniformly. Deterministic for a given seed and list.
    pub fn approx_hint(&self, key: u128, trials: usize, seed: u64) -> ApproxHint {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let mut best = None;
        let mut best_diff = u128::MAX;
        for end in [self.head, self.tail].into_iter().flatten() {
            if let Some(k) = self.key_of(end) {
                let d = abs_diff(k, key);
                if d < best_diff {
                    best = Some(end);
                    best_diff = d;
                }
            }
        }

        if !self.members.is_empty() {
            for _ in 0..trials {
                let candidate = self.members[rng.gen_range(0..self.members.len())];
                if let Some(k) = self.key_of(candidate) {
                    let d = abs_diff(k, key);
                    if d < best_diff {
                        best = Some(candidate);
                        best_diff = d;
                    }
                }
            }
        }

        debug!("approx hint for key {}: {:?} (diff {}, {} trials)", key, best, best_diff, trials);
        ApproxHint {
            hint: best,
            diff: if best.is_some() { best_diff } else { 0 },
            latest_seed: rng.gen(),
        }
    }

    fn link_next(&mut self, id: AccountId, next: Option<AccountId>) {
        if let Some(n) = self.nodes.get_mut(&id) {
            n.next = next;
        }
    }

    fn link_prev(&mut self, id: AccountId, prev: Option<AccountId>) {
        if let Some(n) = self.nodes.get_mut(&id) {
            n.prev = prev;
        }
    }
}
