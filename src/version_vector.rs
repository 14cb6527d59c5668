//! Version vectors (§4.5): a per-client counter map with the usual CRDT
//! lattice laws. No direct teacher analogue — ethersync tracks causality
//! through Automerge's internal change hashes instead of an explicit
//! vector — built in the teacher's general "small typed wrapper over a
//! `BTreeMap`, `Serialize`-derived" idiom seen throughout its `types.rs`.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use derive_more::Deref;
use serde::{Deserialize, Serialize};

/// Maps `clientId -> highest op counter seen from that client`. `Deref`
/// lets callers iterate entries directly (`vv.iter()`) without a
/// dedicated accessor for every `BTreeMap` method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Deref)]
#[serde(transparent)]
pub struct VersionVector(BTreeMap<String, u64>);

impl VersionVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, client_id: &str) -> u64 {
        self.0.get(client_id).copied().unwrap_or(0)
    }

    pub fn set(&mut self, client_id: impl Into<String>, counter: u64) {
        self.0.insert(client_id.into(), counter);
    }

    /// Bumps `client_id`'s counter by one (§4.5). Distinct from `set`:
    /// this is the unary op a client calls after producing its own
    /// change, never a "raise to at least" merge.
    pub fn increment(&mut self, client_id: &str) {
        let entry = self.0.entry(client_id.to_string()).or_insert(0);
        *entry += 1;
    }

    /// Per-client componentwise max (commutative, associative, idempotent).
    pub fn merge(&self, other: &Self) -> Self {
        let mut merged = self.0.clone();
        for (client, &counter) in &other.0 {
            let entry = merged.entry(client.clone()).or_insert(0);
            *entry = (*entry).max(counter);
        }
        Self(merged)
    }

    pub fn merge_in_place(&mut self, other: &Self) {
        *self = self.merge(other);
    }

    /// `self` strictly dominates `other` on at least one component and
    /// never falls behind on any.
    pub fn is_newer_than(&self, other: &Self) -> bool {
        matches!(self.partial_cmp_lattice(other), Some(Ordering::Greater))
    }

    /// Neither vector dominates the other.
    pub fn is_concurrent_with(&self, other: &Self) -> bool {
        self.partial_cmp_lattice(other).is_none()
    }

    fn partial_cmp_lattice(&self, other: &Self) -> Option<Ordering> {
        let mut clients: Vec<&String> = self.0.keys().chain(other.0.keys()).collect();
        clients.sort_unstable();
        clients.dedup();

        let mut less = false;
        let mut greater = false;
        for client in clients {
            match self.get(client).cmp(&other.get(client)) {
                Ordering::Less => less = true,
                Ordering::Greater => greater = true,
                Ordering::Equal => {}
            }
        }
        match (less, greater) {
            (false, false) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Less),
            (false, true) => Some(Ordering::Greater),
            (true, true) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("BTreeMap<String, u64> is always representable as JSON")
    }
}
