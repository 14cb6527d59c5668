//! The operational-transform engine (§4.2): `transform(opsA, opsB, tieBreak)
//! -> (opsA', opsB')`, guaranteeing
//! `apply(apply(doc, opsA), opsB') == apply(apply(doc, opsB), opsA')`.
//!
//! Grounded on the teacher's `ot.rs` (`transform_through_operations`,
//! `OTServer`): kept the "transform one operation through an evolving
//! queue of the other side's operations" technique and the
//! tie-break-via-ordering idiom, generalised from a 3-op text-only
//! transform to the 8-op cross-level matrix this spec requires.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::model::{Attrs, NodePath};
use crate::ops::Op;
use crate::position::{map_through_delete, map_through_insert};

static TRANSFORM_FAILURES: AtomicU64 = AtomicU64::new(0);

/// Number of times `transform_pair` has fallen through to the
/// unrecognised-pair diagnostic since process start (or the last
/// `reset_transform_failure_count`). Exposed for tests per SPEC_FULL §4's
/// "transform diagnostics counter".
pub fn transform_failure_count() -> u64 {
    TRANSFORM_FAILURES.load(Ordering::Relaxed)
}

pub fn reset_transform_failure_count() {
    TRANSFORM_FAILURES.store(0, Ordering::Relaxed);
}

/// Which side wins when two concurrent ops target the exact same
/// position and the rule below doesn't resolve it structurally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    Left,
    Right,
}

impl TieBreak {
    fn flip(self) -> Self {
        match self {
            TieBreak::Left => TieBreak::Right,
            TieBreak::Right => TieBreak::Left,
        }
    }
}

fn noop_delete_text(path: NodePath) -> Op {
    Op::DeleteText { path, offset: 0, length: 0 }
}

fn noop_insert_text(path: NodePath) -> Op {
    Op::InsertText { path, offset: 0, data: String::new() }
}

fn noop_mark(op: &Op) -> Op {
    match op {
        Op::AddMark { path, mark, .. } => Op::AddMark {
            path: path.clone(),
            offset: 0,
            length: 0,
            mark: mark.clone(),
        },
        Op::RemoveMark { path, mark, .. } => Op::RemoveMark {
            path: path.clone(),
            offset: 0,
            length: 0,
            mark: mark.clone(),
        },
        other => other.clone(),
    }
}

fn noop_delete_node(path: NodePath) -> Op {
    Op::DeleteNode { path, offset: -1 }
}

/// Transforms a pair of ops that fall into one of the eight op kinds.
/// Unrecognised combinations pass through unchanged and are logged as a
/// transform diagnostic (§7's `TransformFailure`, never a hard error).
pub fn transform_pair(a: &Op, b: &Op, tie: TieBreak) -> (Op, Op) {
    use Op::*;

    match (a, b) {
        // --- insert_node / delete_node at the document root ---
        (InsertNode { offset: ao, .. }, InsertNode { offset: bo, .. }) => {
            let (ao, bo) = (*ao, *bo);
            if ao < bo {
                (a.clone(), with_offset(b, bo + 1))
            } else if ao > bo {
                (with_offset(a, ao + 1), b.clone())
            } else {
                match tie {
                    TieBreak::Left => (a.clone(), with_offset(b, bo + 1)),
                    TieBreak::Right => (with_offset(a, ao + 1), b.clone()),
                }
            }
        }
        (DeleteNode { path: ap, offset: ao }, DeleteNode { path: bp, offset: bo }) if *ao >= 0 && *bo >= 0 => {
            let (ao, bo) = (*ao as usize, *bo as usize);
            match ao.cmp(&bo) {
                std::cmp::Ordering::Less => (a.clone(), with_i64_offset(b, bo as i64 - 1)),
                std::cmp::Ordering::Greater => (with_i64_offset(a, ao as i64 - 1), b.clone()),
                // Same target: each side already removed the node locally
                // when it applied its own original op, so the op arriving
                // from the other side is redundant on *both* timelines —
                // `a'` (replayed after `b`) and `b'` (replayed after `a`)
                // must both collapse to no-ops, not just one of them.
                std::cmp::Ordering::Equal => (noop_delete_node(ap.clone()), noop_delete_node(bp.clone())),
            }
        }
        (InsertNode { offset: ao, .. }, DeleteNode { offset: bo, .. }) if *bo >= 0 => {
            let (ao, bo) = (*ao, *bo as usize);
            if ao <= bo {
                (a.clone(), with_i64_offset(b, bo as i64 + 1))
            } else {
                (with_offset(a, ao - 1), b.clone())
            }
        }
        (DeleteNode { offset: ao, .. }, InsertNode { offset: bo, .. }) if *ao >= 0 => {
            let (b2, a2) = transform_pair(b, a, tie.flip());
            (a2, b2)
        }

        // --- text/mark range ops on the same block, or a no-op fast path ---
        (a, b) if is_text_range_like(a) && is_text_range_like(b) => {
            if block_of(a) != block_of(b) {
                (a.clone(), b.clone())
            } else {
                transform_text_range_pair(a, b, tie)
            }
        }

        // --- attrs/type metadata on the same block: last-writer-wins ---
        (SetNodeType { path: ap, node_type: at }, SetNodeType { path: bp, node_type: bt }) if ap == bp => {
            match tie {
                TieBreak::Left => (a.clone(), SetNodeType { path: bp.clone(), node_type: at.clone() }),
                TieBreak::Right => (SetNodeType { path: ap.clone(), node_type: bt.clone() }, b.clone()),
            }
        }
        // set_node_type and update_attrs touch disjoint fields, so they
        // never conflict even when aimed at the same block.
        (SetNodeType { path: ap, .. }, UpdateAttrs { path: bp, .. })
        | (UpdateAttrs { path: ap, .. }, SetNodeType { path: bp, .. })
            if ap == bp =>
        {
            (a.clone(), b.clone())
        }
        (UpdateAttrs { path: ap, attrs: aa }, UpdateAttrs { path: bp, attrs: ba }) if ap == bp => {
            let winner: &Attrs = match tie {
                TieBreak::Left => aa,
                TieBreak::Right => ba,
            };
            (
                UpdateAttrs { path: ap.clone(), attrs: winner.clone() },
                UpdateAttrs { path: bp.clone(), attrs: winner.clone() },
            )
        }

        // --- cross-level: block-addressed op vs a root insert/delete ---
        (op, InsertNode { offset: bo, .. }) if has_block_index(op) => {
            (shift_block_index_by_insert(op, *bo), b.clone())
        }
        (InsertNode { offset: ao, .. }, op) if has_block_index(op) => {
            (a.clone(), shift_block_index_by_insert(op, *ao))
        }
        (op, DeleteNode { offset: bo, .. }) if has_block_index(op) && *bo >= 0 => {
            (shift_block_index_by_delete(op, *bo as usize), b.clone())
        }
        (DeleteNode { offset: ao, .. }, op) if has_block_index(op) && *ao >= 0 => {
            (a.clone(), shift_block_index_by_delete(op, *ao as usize))
        }

        // A text/mark edit alongside a type/attrs change on the same
        // block: disjoint concerns, neither needs to move.
        (a, b) if has_block_index(a) && has_block_index(b) && is_text_range_like(a) != is_text_range_like(b) => {
            (a.clone(), b.clone())
        }

        // Independent ops (different blocks, unrelated fields, or either
        // side already a no-op sentinel): nothing to reconcile.
        _ => {
            if a.is_noop() || b.is_noop() || block_of(a) != block_of(b) {
                (a.clone(), b.clone())
            } else {
                TRANSFORM_FAILURES.fetch_add(1, Ordering::Relaxed);
                let diagnostic = CoreError::TransformFailure { reason: format!("{a:?} vs {b:?}") };
                tracing::warn!(%diagnostic, "transform: unrecognised op pair, passing through unchanged");
                (a.clone(), b.clone())
            }
        }
    }
}

fn is_text_range_like(op: &Op) -> bool {
    matches!(
        op,
        Op::InsertText { .. } | Op::DeleteText { .. } | Op::AddMark { .. } | Op::RemoveMark { .. }
    )
}

fn has_block_index(op: &Op) -> bool {
    matches!(
        op,
        Op::InsertText { .. }
            | Op::DeleteText { .. }
            | Op::AddMark { .. }
            | Op::RemoveMark { .. }
            | Op::SetNodeType { .. }
            | Op::UpdateAttrs { .. }
    )
}

fn block_of(op: &Op) -> Option<usize> {
    match op {
        Op::InsertText { path, .. }
        | Op::DeleteText { path, .. }
        | Op::AddMark { path, .. }
        | Op::RemoveMark { path, .. }
        | Op::SetNodeType { path, .. }
        | Op::UpdateAttrs { path, .. } => path.first().copied(),
        Op::InsertNode { .. } | Op::DeleteNode { .. } => None,
    }
}

fn with_offset(op: &Op, new_offset: usize) -> Op {
    match op.clone() {
        Op::InsertNode { path, data, .. } => Op::InsertNode { path, offset: new_offset, data },
        other => other,
    }
}

fn with_i64_offset(op: &Op, new_offset: i64) -> Op {
    match op.clone() {
        Op::DeleteNode { path, .. } => Op::DeleteNode { path, offset: new_offset },
        other => other,
    }
}

/// Rewrites a block-addressed op's `path[0]` after a root `insert_node`
/// at `at`, per §4.2's cross-level rule.
fn shift_block_index_by_insert(op: &Op, at: usize) -> Op {
    with_block_index(op, |bi| map_through_insert(bi, at, 1))
}

/// Rewrites a block-addressed op's `path[0]` after a root `delete_node`
/// at `at`; if `at` targeted the op's own block, the op collapses to a
/// no-op sentinel (its target vanished).
fn shift_block_index_by_delete(op: &Op, at: usize) -> Op {
    let Some(bi) = block_of(op) else { return op.clone() };
    if bi == at {
        return to_noop(op);
    }
    let new_bi = if bi > at { bi - 1 } else { bi };
    with_block_index(op, |_| new_bi)
}

fn with_block_index(op: &Op, f: impl FnOnce(usize) -> usize) -> Op {
    match op.clone() {
        Op::InsertText { mut path, offset, data } => {
            if let Some(bi) = path.first_mut() {
                *bi = f(*bi);
            }
            Op::InsertText { path, offset, data }
        }
        Op::DeleteText { mut path, offset, length } => {
            if let Some(bi) = path.first_mut() {
                *bi = f(*bi);
            }
            Op::DeleteText { path, offset, length }
        }
        Op::AddMark { mut path, offset, length, mark } => {
            if let Some(bi) = path.first_mut() {
                *bi = f(*bi);
            }
            Op::AddMark { path, offset, length, mark }
        }
        Op::RemoveMark { mut path, offset, length, mark } => {
            if let Some(bi) = path.first_mut() {
                *bi = f(*bi);
            }
            Op::RemoveMark { path, offset, length, mark }
        }
        Op::SetNodeType { mut path, node_type } => {
            if let Some(bi) = path.first_mut() {
                *bi = f(*bi);
            }
            Op::SetNodeType { path, node_type }
        }
        Op::UpdateAttrs { mut path, attrs } => {
            if let Some(bi) = path.first_mut() {
                *bi = f(*bi);
            }
            Op::UpdateAttrs { path, attrs }
        }
        other => other,
    }
}

fn to_noop(op: &Op) -> Op {
    match op {
        Op::InsertText { path, .. } => noop_insert_text(path.clone()),
        Op::DeleteText { path, .. } => noop_delete_text(path.clone()),
        Op::AddMark { .. } | Op::RemoveMark { .. } => noop_mark(op),
        other => other.clone(),
    }
}

/// A pure character range, used to describe the effective span of any
/// text/mark op during transform.
#[derive(Debug, Clone, Copy)]
struct Range {
    start: usize,
    end: usize,
}

fn transform_text_range_pair(a: &Op, b: &Op, tie: TieBreak) -> (Op, Op) {
    use Op::*;
    match (a, b) {
        (InsertText { offset: ao, data: ad, .. }, InsertText { offset: bo, .. }) => {
            let (ao, bo, al) = (*ao, *bo, ad.chars().count());
            if ao < bo {
                (a.clone(), reoffset(b, bo + al))
            } else if ao > bo {
                (reoffset(a, ao + b_insert_len(b)), b.clone())
            } else {
                match tie {
                    TieBreak::Left => (a.clone(), reoffset(b, bo + al)),
                    TieBreak::Right => (reoffset(a, ao + b_insert_len(b)), b.clone()),
                }
            }
        }
        (InsertText { .. }, DeleteText { .. } | AddMark { .. } | RemoveMark { .. }) => {
            let (a2, b2) = transform_insert_vs_range(a, b);
            (a2, b2)
        }
        (DeleteText { .. } | AddMark { .. } | RemoveMark { .. }, InsertText { .. }) => {
            let (b2, a2) = transform_insert_vs_range(b, a);
            (a2, b2)
        }
        (DeleteText { .. }, DeleteText { .. }) => transform_delete_delete(a, b),
        (DeleteText { .. }, AddMark { .. } | RemoveMark { .. }) => {
            let b2 = map_range_through_delete(b, a);
            (a.clone(), b2)
        }
        (AddMark { .. } | RemoveMark { .. }, DeleteText { .. }) => {
            let a2 = map_range_through_delete(a, b);
            (a2, b.clone())
        }
        (AddMark { .. } | RemoveMark { .. }, AddMark { .. } | RemoveMark { .. }) => {
            transform_mark_mark(a, b, tie)
        }
        _ => (a.clone(), b.clone()),
    }
}

fn b_insert_len(op: &Op) -> usize {
    match op {
        Op::InsertText { data, .. } => data.chars().count(),
        _ => 0,
    }
}

fn reoffset(op: &Op, new_offset: usize) -> Op {
    match op.clone() {
        Op::InsertText { path, data, .. } => Op::InsertText { path, offset: new_offset, data },
        Op::DeleteText { path, length, .. } => Op::DeleteText { path, offset: new_offset, length },
        Op::AddMark { path, length, mark, .. } => Op::AddMark { path, offset: new_offset, length, mark },
        Op::RemoveMark { path, length, mark, .. } => Op::RemoveMark { path, offset: new_offset, length, mark },
        other => other,
    }
}

fn range_of(op: &Op) -> Range {
    match op {
        Op::DeleteText { offset, length, .. }
        | Op::AddMark { offset, length, .. }
        | Op::RemoveMark { offset, length, .. } => Range { start: *offset, end: *offset + *length },
        Op::InsertText { offset, .. } => Range { start: *offset, end: *offset },
        _ => Range { start: 0, end: 0 },
    }
}

fn with_range(op: &Op, range: Range) -> Op {
    let len = range.end.saturating_sub(range.start);
    match op.clone() {
        Op::DeleteText { path, .. } => Op::DeleteText { path, offset: range.start, length: len },
        Op::AddMark { path, mark, .. } => Op::AddMark { path, offset: range.start, length: len, mark },
        Op::RemoveMark { path, mark, .. } => Op::RemoveMark { path, offset: range.start, length: len, mark },
        other => other,
    }
}

/// `ins` is `insert_text`; `range_op` is `delete_text`/`add_mark`/
/// `remove_mark`. Returns `(ins', range_op')`.
fn transform_insert_vs_range(ins: &Op, range_op: &Op) -> (Op, Op) {
    let Op::InsertText { offset: io, data, .. } = ins else { unreachable!() };
    let ins_len = data.chars().count();
    let r = range_of(range_op);

    if matches!(range_op, Op::DeleteText { .. }) {
        if *io <= r.start {
            (ins.clone(), reoffset(range_op, r.start + ins_len))
        } else if *io >= r.end {
            (reoffset(ins, *io - (r.end - r.start)), range_op.clone())
        } else {
            // Insertion lands inside the deleted span: the delete grows to
            // still remove the surviving original characters, the insert
            // is pinned to the deletion's start so it is not swallowed.
            let grown = Range { start: r.start, end: r.end + ins_len };
            (reoffset(ins, r.start), with_range(range_op, grown))
        }
    } else {
        // Mark ops don't move text; only the mark's range is remapped.
        let new_start = map_through_insert(r.start, *io, ins_len);
        let new_end = map_through_insert(r.end, *io, ins_len);
        (ins.clone(), with_range(range_op, Range { start: new_start, end: new_end }))
    }
}

fn transform_delete_delete(a: &Op, b: &Op) -> (Op, Op) {
    let ra = range_of(a);
    let rb = range_of(b);
    let a2 = Range {
        start: map_through_delete(ra.start, rb.start, rb.end - rb.start),
        end: map_through_delete(ra.end, rb.start, rb.end - rb.start),
    };
    let b2 = Range {
        start: map_through_delete(rb.start, ra.start, ra.end - ra.start),
        end: map_through_delete(rb.end, ra.start, ra.end - ra.start),
    };
    (with_range(a, a2), with_range(b, b2))
}

fn map_range_through_delete(mark_op: &Op, delete_op: &Op) -> Op {
    let r = range_of(mark_op);
    let d = range_of(delete_op);
    let new = Range {
        start: map_through_delete(r.start, d.start, d.end - d.start),
        end: map_through_delete(r.end, d.start, d.end - d.start),
    };
    with_range(mark_op, new)
}

fn transform_mark_mark(a: &Op, b: &Op, tie: TieBreak) -> (Op, Op) {
    let same_target = matches!(
        (a, b),
        (Op::AddMark { mark: am, .. }, Op::AddMark { mark: bm, .. }) if am == bm
    ) || matches!(
        (a, b),
        (Op::RemoveMark { mark: am, .. }, Op::RemoveMark { mark: bm, .. }) if am == bm
    ) || matches!(
        (a, b),
        (Op::AddMark { mark: am, .. }, Op::RemoveMark { mark: bm, .. })
        | (Op::RemoveMark { mark: am, .. }, Op::AddMark { mark: bm, .. }) if am == bm
    );

    if same_target && range_of(a).start == range_of(b).start && range_of(a).end == range_of(b).end {
        // Concurrent add+remove (or add+add / remove+remove) of the same
        // mark on the same range: tie-break decides which op's effect
        // wins, and the loser's prime is a same-shaped no-op so it still
        // appears on the wire but does nothing further.
        match tie {
            TieBreak::Left => (a.clone(), noop_mark(b)),
            TieBreak::Right => (noop_mark(a), b.clone()),
        }
    } else {
        // Neither op moves text; independent ranges/types simply coexist.
        (a.clone(), b.clone())
    }
}

/// Sequence-level transform (§4.2): transforms every op in `ops_a`
/// through the (evolving) `ops_b` queue pairwise, composing both sides
/// as it goes — mirroring the teacher's `transform_through_operations`
/// generalised from a single op to a whole sequence.
pub fn transform(ops_a: &[Op], ops_b: &[Op], tie: TieBreak) -> (Vec<Op>, Vec<Op>) {
    let mut bs = ops_b.to_vec();
    let mut a_primes = Vec::with_capacity(ops_a.len());

    for a in ops_a {
        let mut a_cur = a.clone();
        let mut new_bs = Vec::with_capacity(bs.len());
        for b in &bs {
            let (a_next, b_next) = transform_pair(&a_cur, b, tie);
            a_cur = a_next;
            new_bs.push(b_next);
        }
        bs = new_bs;
        a_primes.push(a_cur);
    }

    (a_primes, bs)
}
