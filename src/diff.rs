//! Delta/diff generation (§4.3): `diff(prev, next, client_id) -> Delta`.
//!
//! Grounded on the teacher's `Document::update_text` + `dissimilar::diff`
//! pairing in `document.rs` (a prefix/suffix text diff feeding a single
//! retain/insert/delete triad), generalised to id-keyed block matching at
//! the top level. Intentionally non-minimal per §9: a changed block
//! collapses to at most one `delete_text` plus one `insert_text`, never a
//! full Myers edit script.

use std::collections::HashSet;

use dissimilar::Chunk;
use serde::{Deserialize, Serialize};

use crate::model::{Attrs, Document, ElementNode, Node};
use crate::ops::Op;

/// A batch of ops a single client produced between two document versions
/// (§3, §4.3, §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub client_id: String,
    pub base_version: u64,
    pub result_version: u64,
    pub ops: Vec<Op>,
    pub timestamp: u64,
}

/// Computes the ops that turn `prev` into `next`, attributing them to
/// `client_id` and stamping them with `timestamp` (caller-supplied, like
/// `BatchedTransport`'s injected `Clock`, so callers stay deterministically
/// testable). Returns a delta with an empty `ops` list when the documents
/// are identical.
pub fn diff(prev: &Document, next: &Document, client_id: impl Into<String>, timestamp: u64) -> Delta {
    let ops = diff_children(&prev.children, &next.children);
    Delta {
        client_id: client_id.into(),
        base_version: prev.version,
        result_version: prev.version + 1,
        ops,
        timestamp,
    }
}

fn diff_children(prev: &[ElementNode], next: &[ElementNode]) -> Vec<Op> {
    let mut ops = Vec::new();
    let mut i = 0usize;
    let mut j = 0usize;
    let mut cursor = 0usize;

    while i < prev.len() || j < next.len() {
        let remaining_next: HashSet<&str> = next[j..].iter().map(|n| n.id.as_str()).collect();
        let remaining_prev: HashSet<&str> = prev[i..].iter().map(|n| n.id.as_str()).collect();

        match (prev.get(i), next.get(j)) {
            (Some(p), Some(n)) if p.id == n.id => {
                diff_block(p, n, cursor, &mut ops);
                cursor += 1;
                i += 1;
                j += 1;
            }
            (Some(p), _) if !remaining_next.contains(p.id.as_str()) => {
                ops.push(Op::DeleteNode { path: vec![], offset: cursor as i64 });
                i += 1;
            }
            (_, Some(n)) if !remaining_prev.contains(n.id.as_str()) => {
                ops.push(Op::InsertNode { path: vec![], offset: cursor, data: Box::new(n.clone()) });
                cursor += 1;
                j += 1;
            }
            (Some(_), Some(_)) => {
                // Both ids exist somewhere in the other sequence: treat as
                // a reorder by deleting here and letting the later pass
                // insert it back — not minimal, but always convergent.
                ops.push(Op::DeleteNode { path: vec![], offset: cursor as i64 });
                i += 1;
            }
            (Some(_), None) => {
                ops.push(Op::DeleteNode { path: vec![], offset: cursor as i64 });
                i += 1;
            }
            (None, Some(n)) => {
                ops.push(Op::InsertNode { path: vec![], offset: cursor, data: Box::new(n.clone()) });
                cursor += 1;
                j += 1;
            }
            (None, None) => break,
        }
    }

    ops
}

fn diff_block(prev: &ElementNode, next: &ElementNode, block_index: usize, ops: &mut Vec<Op>) {
    if prev.node_type != next.node_type {
        ops.push(Op::SetNodeType {
            path: vec![block_index],
            node_type: next.node_type.clone(),
        });
    }

    let changed_attrs: Attrs = next
        .attrs
        .iter()
        .filter(|(k, v)| prev.attrs.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if !changed_attrs.is_empty() {
        ops.push(Op::UpdateAttrs {
            path: vec![block_index],
            attrs: changed_attrs,
        });
    }

    let old_text = Node::Element(prev.clone()).concatenated_text();
    let new_text = Node::Element(next.clone()).concatenated_text();
    if let Some((offset, delete_len, insert_data)) = diff_text(&old_text, &new_text) {
        if delete_len > 0 {
            ops.push(Op::DeleteText { path: vec![block_index], offset, length: delete_len });
        }
        if !insert_data.is_empty() {
            ops.push(Op::InsertText { path: vec![block_index], offset, data: insert_data });
        }
    }
}

/// Common-prefix/suffix text diff via `dissimilar`, collapsed to a single
/// `(offset, old_middle_len, new_middle)` triad. Returns `None` when the
/// strings are identical.
fn diff_text(old: &str, new: &str) -> Option<(usize, usize, String)> {
    if old == new {
        return None;
    }
    let chunks = dissimilar::diff(old, new);
    let prefix_len = match chunks.first() {
        Some(Chunk::Equal(s)) => s.chars().count(),
        _ => 0,
    };
    let suffix_len = match chunks.last() {
        Some(Chunk::Equal(s)) => s.chars().count(),
        _ => 0,
    };

    let old_chars: Vec<char> = old.chars().collect();
    let new_chars: Vec<char> = new.chars().collect();
    let prefix_len = prefix_len.min(old_chars.len()).min(new_chars.len());
    let suffix_len = suffix_len
        .min(old_chars.len() - prefix_len)
        .min(new_chars.len() - prefix_len);

    let old_mid_len = old_chars.len() - prefix_len - suffix_len;
    let new_mid: String = new_chars[prefix_len..new_chars.len() - suffix_len].iter().collect();
    Some((prefix_len, old_mid_len, new_mid))
}
