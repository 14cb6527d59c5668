//! The eight-operation algebra (§4.1): `apply(doc, op) -> doc'`.
//!
//! Path convention (resolves an ambiguity the spec leaves to the
//! examples in §4.3/§8.2 rather than spelling out): `insert_node` and
//! `delete_node` address the document root with `path = []` and `offset`
//! as the root child index. `set_node_type`/`update_attrs` address a
//! single block with `path = [block_index]`. `insert_text`/`delete_text`/
//! `add_mark`/`remove_mark` address a block with `path[0] == block_index`
//! (a second, conventionally-zero component may be present, as in the
//! wire examples of §4.3/§8.2) and `offset`/`length` are measured over
//! that block's *concatenated* text (invariant 4), not a single child's
//! local text — this lets the ops remain stable as the block's internal
//! TextNode/mark structure is split and merged underneath them.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::ids::IdGenerator;
use crate::model::{Attrs, Document, ElementNode, Mark, Node, NodePath, TextNode};

/// One of the eight primitive document operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Op {
    InsertText {
        path: NodePath,
        offset: usize,
        data: String,
    },
    DeleteText {
        path: NodePath,
        offset: usize,
        length: usize,
    },
    InsertNode {
        path: NodePath,
        offset: usize,
        data: Box<ElementNode>,
    },
    /// `offset == -1` is the no-op sentinel a transformed delete can
    /// collapse to (§4.2).
    DeleteNode { path: NodePath, offset: i64 },
    SetNodeType {
        path: NodePath,
        node_type: String,
    },
    UpdateAttrs { path: NodePath, attrs: Attrs },
    AddMark {
        path: NodePath,
        offset: usize,
        length: usize,
        mark: Mark,
    },
    RemoveMark {
        path: NodePath,
        offset: usize,
        length: usize,
        mark: Mark,
    },
}

impl Op {
    /// True for ops the OT engine has reduced to a no-op sentinel.
    pub fn is_noop(&self) -> bool {
        match self {
            Op::DeleteNode { offset, .. } => *offset < 0,
            Op::InsertText { data, .. } => data.is_empty(),
            Op::DeleteText { length, .. } => *length == 0,
            Op::AddMark { length, .. } | Op::RemoveMark { length, .. } => *length == 0,
            Op::InsertNode { .. } | Op::SetNodeType { .. } | Op::UpdateAttrs { .. } => false,
        }
    }

    fn block_index(&self) -> Option<usize> {
        match self {
            Op::InsertText { path, .. }
            | Op::DeleteText { path, .. }
            | Op::AddMark { path, .. }
            | Op::RemoveMark { path, .. }
            | Op::SetNodeType { path, .. }
            | Op::UpdateAttrs { path, .. } => path.first().copied(),
            Op::InsertNode { .. } | Op::DeleteNode { .. } => None,
        }
    }
}

/// Applies `op` to `doc`, returning the resulting document. Fails the
/// whole operation (never partially mutates) with `InvalidPath` or
/// `InvalidRange` per §4.1/§7.
pub fn apply(doc: &Document, op: &Op) -> CoreResult<Document> {
    if op.is_noop() {
        let mut next = doc.clone();
        next.version += 1;
        return Ok(next);
    }

    let mut next = doc.clone();
    match op {
        Op::InsertText { path, offset, data } => {
            let block = require_block_mut(&mut next, path)?;
            insert_text_in_block(block, *offset, data)?;
        }
        Op::DeleteText {
            path,
            offset,
            length,
        } => {
            let block = require_block_mut(&mut next, path)?;
            delete_text_in_block(block, *offset, *length)?;
        }
        Op::InsertNode { path, offset, data } => {
            if !path.is_empty() {
                return Err(CoreError::InvalidPath {
                    path: path.clone(),
                    message: "insert_node expects an empty path".into(),
                });
            }
            if *offset > next.children.len() {
                return Err(CoreError::InvalidPath {
                    path: path.clone(),
                    message: format!("insert_node offset {offset} out of bounds"),
                });
            }
            next.children.insert(*offset, (**data).clone());
        }
        Op::DeleteNode { path, offset } => {
            if !path.is_empty() {
                return Err(CoreError::InvalidPath {
                    path: path.clone(),
                    message: "delete_node expects an empty path".into(),
                });
            }
            if *offset < 0 {
                // No-op sentinel; already handled above, kept for clarity.
            } else {
                let idx = *offset as usize;
                if idx >= next.children.len() {
                    return Err(CoreError::InvalidPath {
                        path: path.clone(),
                        message: format!("delete_node offset {offset} out of bounds"),
                    });
                }
                next.children.remove(idx);
            }
        }
        Op::SetNodeType { path, node_type } => {
            let idx = single_block_index(path)?;
            let block = next.children.get_mut(idx).ok_or_else(|| CoreError::InvalidPath {
                path: path.clone(),
                message: format!("block {idx} does not exist"),
            })?;
            block.node_type = node_type.clone();
        }
        Op::UpdateAttrs { path, attrs } => {
            let idx = single_block_index(path)?;
            let block = next.children.get_mut(idx).ok_or_else(|| CoreError::InvalidPath {
                path: path.clone(),
                message: format!("block {idx} does not exist"),
            })?;
            for (k, v) in attrs {
                block.attrs.insert(k.clone(), v.clone());
            }
        }
        Op::AddMark {
            path,
            offset,
            length,
            mark,
        } => {
            let block = require_block_mut(&mut next, path)?;
            mark_range_in_block(block, *offset, *length, |node| {
                if !node.marks.contains(mark) {
                    node.marks.push(mark.clone());
                }
            })?;
        }
        Op::RemoveMark {
            path,
            offset,
            length,
            mark,
        } => {
            let block = require_block_mut(&mut next, path)?;
            mark_range_in_block(block, *offset, *length, |node| {
                node.marks.retain(|m| m != mark);
            })?;
        }
    }
    next.version += 1;
    Ok(next)
}

fn single_block_index(path: &NodePath) -> CoreResult<usize> {
    if path.len() != 1 {
        return Err(CoreError::InvalidPath {
            path: path.clone(),
            message: "expected a single-component block path".into(),
        });
    }
    Ok(path[0])
}

fn require_block_mut<'a>(doc: &'a mut Document, path: &NodePath) -> CoreResult<&'a mut ElementNode> {
    let idx = op_block_index(path)?;
    doc.children.get_mut(idx).ok_or_else(|| CoreError::InvalidPath {
        path: path.clone(),
        message: format!("block {idx} does not exist"),
    })
}

fn op_block_index(path: &NodePath) -> CoreResult<usize> {
    path.first().copied().ok_or_else(|| CoreError::InvalidPath {
        path: path.clone(),
        message: "text/mark ops require a non-empty path".into(),
    })
}

/// Flattened `(relative child path, char length)` of every TextNode
/// reachable below `children`, in document order.
fn collect_text_paths(children: &[Node]) -> Vec<(Vec<usize>, usize)> {
    fn walk(nodes: &[Node], prefix: &mut Vec<usize>, out: &mut Vec<(Vec<usize>, usize)>) {
        for (i, n) in nodes.iter().enumerate() {
            prefix.push(i);
            match n {
                Node::Text(t) => out.push((prefix.clone(), t.text.chars().count())),
                Node::Element(e) => walk(&e.children, prefix, out),
            }
            prefix.pop();
        }
    }
    let mut out = Vec::new();
    walk(children, &mut Vec::new(), &mut out);
    out
}

fn get_text_node_mut<'a>(children: &'a mut [Node], path: &[usize]) -> Option<&'a mut TextNode> {
    let (&idx, rest) = path.split_first()?;
    let node = children.get_mut(idx)?;
    if rest.is_empty() {
        node.as_text_mut()
    } else if let Node::Element(e) = node {
        get_text_node_mut(&mut e.children, rest)
    } else {
        None
    }
}

fn total_text_len(children: &[Node]) -> usize {
    collect_text_paths(children).iter().map(|(_, len)| len).sum()
}

fn insert_text_in_block(block: &mut ElementNode, offset: usize, data: &str) -> CoreResult<()> {
    if data.is_empty() {
        return Ok(());
    }
    let total = total_text_len(&block.children);
    if offset > total {
        return Err(CoreError::InvalidRange {
            offset,
            length: 0,
            message: format!("insert_text offset {offset} exceeds block length {total}"),
        });
    }

    let spans = collect_text_paths(&block.children);
    let mut cursor = 0usize;
    for (path, len) in &spans {
        if offset <= cursor + len {
            let local = offset - cursor;
            let node = get_text_node_mut(&mut block.children, path)
                .expect("path was just collected from this tree");
            splice_str(&mut node.text, local, 0, data);
            return Ok(());
        }
        cursor += len;
    }
    // No TextNode covers this offset (empty block): materialise one.
    block.children.push(Node::Text(TextNode::new(fresh_id(), data)));
    Ok(())
}

fn delete_text_in_block(block: &mut ElementNode, offset: usize, length: usize) -> CoreResult<()> {
    if length == 0 {
        return Ok(());
    }
    let total = total_text_len(&block.children);
    if offset + length > total {
        return Err(CoreError::InvalidRange {
            offset,
            length,
            message: format!("delete_text range [{offset}, {}) exceeds block length {total}", offset + length),
        });
    }
    let end = offset + length;
    let spans = collect_text_paths(&block.children);
    let mut cursor = 0usize;
    let mut to_remove: Vec<Vec<usize>> = Vec::new();
    for (path, len) in &spans {
        let node_start = cursor;
        let node_end = cursor + len;
        cursor = node_end;
        if node_end <= offset || node_start >= end {
            continue;
        }
        let local_start = offset.saturating_sub(node_start).min(*len);
        let local_end = end.saturating_sub(node_start).min(*len);
        let node = get_text_node_mut(&mut block.children, path)
            .expect("path was just collected from this tree");
        splice_str(&mut node.text, local_start, local_end - local_start, "");
        if node.text.is_empty() {
            to_remove.push(path.clone());
        }
    }
    for path in to_remove.into_iter().rev() {
        remove_at_path(&mut block.children, &path);
    }
    Ok(())
}

fn mark_range_in_block(
    block: &mut ElementNode,
    offset: usize,
    length: usize,
    mut f: impl FnMut(&mut TextNode),
) -> CoreResult<()> {
    if length == 0 {
        return Ok(());
    }
    let total = total_text_len(&block.children);
    let end = offset + length;
    if end > total {
        return Err(CoreError::InvalidRange {
            offset,
            length,
            message: format!("mark range [{offset}, {end}) exceeds block length {total}"),
        });
    }

    split_at_boundary(block, offset);
    split_at_boundary(block, end);

    let spans = collect_text_paths(&block.children);
    let mut cursor = 0usize;
    for (path, len) in &spans {
        let node_start = cursor;
        let node_end = cursor + len;
        cursor = node_end;
        if node_start >= offset && node_end <= end && node_start < node_end {
            let node = get_text_node_mut(&mut block.children, path)
                .expect("path was just collected from this tree");
            f(node);
        }
    }
    Ok(())
}

/// Splits the TextNode straddling `boundary` (if any) into two nodes with
/// identical marks, so that subsequent range operations land exactly on
/// node boundaries.
fn split_at_boundary(block: &mut ElementNode, boundary: usize) {
    let spans = collect_text_paths(&block.children);
    let mut cursor = 0usize;
    for (path, len) in &spans {
        let node_start = cursor;
        let node_end = cursor + len;
        cursor = node_end;
        if boundary > node_start && boundary < node_end {
            let local = boundary - node_start;
            let node = get_text_node_mut(&mut block.children, path)
                .expect("path was just collected from this tree");
            let tail: String = node.text.chars().skip(local).collect();
            let head: String = node.text.chars().take(local).collect();
            let marks = node.marks.clone();
            node.text = head;
            let mut new_node = TextNode::new(fresh_id(), tail);
            new_node.marks = marks;
            insert_after_path(&mut block.children, path, Node::Text(new_node));
            return;
        }
    }
}

fn insert_after_path(children: &mut Vec<Node>, path: &[usize], new_node: Node) {
    if path.len() == 1 {
        children.insert(path[0] + 1, new_node);
        return;
    }
    let (&idx, rest) = path.split_first().expect("non-empty path");
    if let Some(Node::Element(e)) = children.get_mut(idx) {
        insert_after_path(&mut e.children, rest, new_node);
    }
}

fn remove_at_path(children: &mut Vec<Node>, path: &[usize]) {
    if path.len() == 1 {
        children.remove(path[0]);
        return;
    }
    let (&idx, rest) = path.split_first().expect("non-empty path");
    if let Some(Node::Element(e)) = children.get_mut(idx) {
        remove_at_path(&mut e.children, rest);
    }
}

fn splice_str(s: &mut String, start: usize, delete_len: usize, insert: &str) {
    let chars: Vec<char> = s.chars().collect();
    let end = (start + delete_len).min(chars.len());
    let mut out = String::with_capacity(s.len() + insert.len());
    out.extend(chars[..start].iter());
    out.push_str(insert);
    out.extend(chars[end..].iter());
    *s = out;
}

thread_local! {
    static SPLIT_IDS: std::cell::RefCell<Box<dyn IdGenerator>> =
        std::cell::RefCell::new(Box::new(crate::ids::RandomIdGenerator));
}

/// Sets the `IdGenerator` used to mint ids for text nodes `apply` creates
/// internally (splitting a node across a mark/delete boundary,
/// materialising one in an empty block). Tests should call this with a
/// `CountingIdGenerator` for determinism; production code can leave the
/// default random generator in place.
pub fn set_split_id_generator(generator: Box<dyn IdGenerator>) {
    SPLIT_IDS.with(|cell| *cell.borrow_mut() = generator);
}

fn fresh_id() -> String {
    SPLIT_IDS.with(|cell| cell.borrow().next_id())
}
