//! Position/selection mapping through remote operations (§4.4), plus the
//! per-editor remote cursor registry (Design Notes "Selection & cursor
//! registry").

use std::collections::BTreeMap;

use crate::model::{Position, Selection};
use crate::ops::Op;

/// Maps a single scalar offset through a text insertion at `at`.
pub(crate) fn map_through_insert(pos: usize, at: usize, inserted_len: usize) -> usize {
    if at <= pos {
        pos + inserted_len
    } else {
        pos
    }
}

/// Maps a single scalar offset through a text deletion `[del_start,
/// del_start + del_len)`, clamping into the deletion when the position
/// fell inside it.
pub(crate) fn map_through_delete(pos: usize, del_start: usize, del_len: usize) -> usize {
    if pos <= del_start {
        pos
    } else if pos >= del_start + del_len {
        pos - del_len
    } else {
        del_start
    }
}

/// Folds `ops` left to right over `pos`, per §4.4's per-op rules.
pub fn map_position(pos: &Position, ops: &[Op]) -> Position {
    let mut block_index = pos.block_index;
    let mut offset = pos.offset;
    let mut vanished = false;

    for op in ops {
        if vanished {
            break;
        }
        match op {
            Op::InsertText { path, offset: o, data } => {
                if path.first() == Some(&block_index) {
                    offset = map_through_insert(offset, *o, data.chars().count());
                }
            }
            Op::DeleteText { path, offset: o, length } => {
                if path.first() == Some(&block_index) {
                    offset = map_through_delete(offset, *o, *length);
                }
            }
            Op::InsertNode { offset: o, .. } => {
                if *o <= block_index {
                    block_index += 1;
                }
            }
            Op::DeleteNode { offset: o, .. } if *o >= 0 => {
                let o = *o as usize;
                match o.cmp(&block_index) {
                    std::cmp::Ordering::Less => block_index -= 1,
                    std::cmp::Ordering::Equal => {
                        block_index = block_index.saturating_sub(1);
                        offset = 0;
                        vanished = true;
                    }
                    std::cmp::Ordering::Greater => {}
                }
            }
            _ => {}
        }
    }

    Position {
        block_index,
        path: pos.path.clone(),
        offset,
    }
}

/// Maps both endpoints of a selection independently (§4.4).
pub fn map_selection(sel: &Selection, ops: &[Op]) -> Selection {
    Selection {
        anchor: map_position(&sel.anchor, ops),
        focus: map_position(&sel.focus, ops),
    }
}

/// A remote collaborator's cursor, tracked by `clientId`.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorInfo {
    pub client_id: String,
    pub position: Position,
    pub selection: Option<Selection>,
    pub color: Option<String>,
    pub label: Option<String>,
}

/// Per-editor registry of remote cursors, remapped after every remote
/// apply (§4.4, Design Notes).
#[derive(Debug, Default)]
pub struct CursorRegistry {
    cursors: BTreeMap<String, CursorInfo>,
}

impl CursorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, cursor: CursorInfo) {
        self.cursors.insert(cursor.client_id.clone(), cursor);
    }

    pub fn remove(&mut self, client_id: &str) {
        self.cursors.remove(client_id);
    }

    pub fn get(&self, client_id: &str) -> Option<&CursorInfo> {
        self.cursors.get(client_id)
    }

    pub fn all(&self) -> impl Iterator<Item = &CursorInfo> {
        self.cursors.values()
    }

    /// Remaps every tracked cursor through `ops`, as required after every
    /// remote apply.
    pub fn remap_all(&mut self, ops: &[Op]) {
        for cursor in self.cursors.values_mut() {
            cursor.position = map_position(&cursor.position, ops);
            if let Some(sel) = &cursor.selection {
                cursor.selection = Some(map_selection(sel, ops));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Mark;

    #[test]
    fn insert_before_shifts_offset() {
        let pos = Position::new(0, 5);
        let ops = vec![Op::InsertText {
            path: vec![0],
            offset: 2,
            data: "xyz".into(),
        }];
        let mapped = map_position(&pos, &ops);
        assert_eq!(mapped.offset, 8);
    }

    #[test]
    fn insert_after_does_not_shift() {
        let pos = Position::new(0, 2);
        let ops = vec![Op::InsertText {
            path: vec![0],
            offset: 5,
            data: "xyz".into(),
        }];
        assert_eq!(map_position(&pos, &ops).offset, 2);
    }

    #[test]
    fn delete_spanning_clamps_into_start() {
        let pos = Position::new(0, 4);
        let ops = vec![Op::DeleteText {
            path: vec![0],
            offset: 2,
            length: 5,
        }];
        assert_eq!(map_position(&pos, &ops).offset, 2);
    }

    #[test]
    fn insert_node_before_shifts_block_index() {
        let pos = Position::new(1, 0);
        let ops = vec![Op::InsertNode {
            path: vec![],
            offset: 0,
            data: Box::new(crate::model::ElementNode::new("x", "paragraph")),
        }];
        assert_eq!(map_position(&pos, &ops).block_index, 2);
    }

    #[test]
    fn delete_node_at_target_collapses_to_previous_block() {
        let pos = Position::new(1, 4);
        let ops = vec![Op::DeleteNode { path: vec![], offset: 1 }];
        let mapped = map_position(&pos, &ops);
        assert_eq!(mapped.block_index, 0);
        assert_eq!(mapped.offset, 0);
    }

    #[test]
    fn registry_remaps_tracked_cursors() {
        let mut registry = CursorRegistry::new();
        registry.set(CursorInfo {
            client_id: "a".into(),
            position: Position::new(0, 1),
            selection: None,
            color: None,
            label: None,
        });
        registry.remap_all(&[Op::InsertText {
            path: vec![0],
            offset: 0,
            data: "xx".into(),
        }]);
        assert_eq!(registry.get("a").unwrap().position.offset, 3);
    }

    #[test]
    fn unrelated_mark_op_does_not_affect_position() {
        let pos = Position::new(0, 3);
        let ops = vec![Op::AddMark {
            path: vec![0],
            offset: 0,
            length: 5,
            mark: Mark::new("bold"),
        }];
        assert_eq!(map_position(&pos, &ops).offset, 3);
    }
}
