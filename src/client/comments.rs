//! Comment forest manipulation
//!
//! A comment tree arrives as a forest of `{kind, data}` things where each
//! comment (`t1`) nests its replies in a listing under `data.replies`, and
//! collapsed threads appear as `more` placeholders. These helpers locate and
//! replace placeholders, prune the ones left over, and flatten the forest.

use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};

/// A collapsed-thread placeholder located in a forest
#[derive(Debug, Clone, PartialEq)]
pub struct MoreNode {
    /// Index path from the forest root to the placeholder
    pub path: Vec<usize>,
    /// Fullname of the comment or submission the placeholder hangs off
    pub parent_id: String,
    /// Number of hidden comments reported upstream
    pub count: i64,
    /// Ids of hidden comments; empty for "continue this thread" placeholders
    pub children: Vec<String>,
}

impl MoreNode {
    pub fn is_continue_thread(&self) -> bool {
        self.children.is_empty()
    }
}

fn kind(node: &Value) -> Option<&str> {
    node.get("kind").and_then(Value::as_str)
}

fn is_comment(node: &Value) -> bool {
    kind(node) == Some("t1")
}

fn is_more(node: &Value) -> bool {
    kind(node) == Some("more")
}

fn replies(node: &Value) -> Option<&Vec<Value>> {
    node.pointer("/data/replies/data/children")
        .and_then(Value::as_array)
}

fn replies_mut(node: &mut Value) -> Option<&mut Vec<Value>> {
    node.pointer_mut("/data/replies/data/children")
        .and_then(Value::as_array_mut)
}

/// Fullname (`t1_xxx`) of a comment thing
pub(crate) fn fullname(node: &Value) -> Option<String> {
    if let Some(name) = node.pointer("/data/name").and_then(Value::as_str) {
        return Some(name.to_string());
    }
    node.pointer("/data/id")
        .and_then(Value::as_str)
        .map(|id| format!("t1_{}", id))
}

fn push_reply(node: &mut Value, child: Value) {
    if replies(node).is_none() {
        if let Some(data) = node.get_mut("data").and_then(Value::as_object_mut) {
            data.insert(
                "replies".to_string(),
                json!({"kind": "Listing", "data": {"children": []}}),
            );
        }
    }
    if let Some(children) = replies_mut(node) {
        children.push(child);
    }
}

/// Finds the placeholder hiding the most comments
///
/// Ties go to the placeholder met first in a depth-first walk.
pub fn find_largest_more(forest: &[Value]) -> Option<MoreNode> {
    fn visit(nodes: &[Value], path: &mut Vec<usize>, best: &mut Option<MoreNode>) {
        for (i, node) in nodes.iter().enumerate() {
            path.push(i);
            if is_more(node) {
                let count = node
                    .pointer("/data/count")
                    .and_then(Value::as_i64)
                    .unwrap_or(0);
                if best.as_ref().map_or(true, |b| count > b.count) {
                    *best = Some(MoreNode {
                        path: path.clone(),
                        parent_id: node
                            .pointer("/data/parent_id")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        count,
                        children: node
                            .pointer("/data/children")
                            .and_then(Value::as_array)
                            .map(|ids| {
                                ids.iter()
                                    .filter_map(Value::as_str)
                                    .map(str::to_string)
                                    .collect()
                            })
                            .unwrap_or_default(),
                    });
                }
            } else if let Some(children) = replies(node) {
                visit(children, path, best);
            }
            path.pop();
        }
    }

    let mut best = None;
    visit(forest, &mut Vec::new(), &mut best);
    best
}

/// Replaces the node at `path` with `replacement`, keeping sibling order
///
/// Returns false if the path no longer points at a node.
pub(crate) fn replace_at(forest: &mut Vec<Value>, path: &[usize], replacement: Vec<Value>) -> bool {
    let Some((&last, parents)) = path.split_last() else {
        return false;
    };

    let mut nodes = forest;
    for &idx in parents {
        let current = nodes;
        match current.get_mut(idx).and_then(replies_mut) {
            Some(children) => nodes = children,
            None => return false,
        }
    }

    if last >= nodes.len() {
        return false;
    }
    nodes.splice(last..=last, replacement);
    true
}

/// Rebuilds a forest from a flat list of things linked by `parent_id`
///
/// Things whose parent is not in the list become roots, in input order.
pub fn nest_things(things: Vec<Value>) -> Vec<Value> {
    let index: HashMap<String, usize> = things
        .iter()
        .enumerate()
        .filter(|(_, thing)| is_comment(thing))
        .filter_map(|(i, thing)| fullname(thing).map(|name| (name, i)))
        .collect();

    let mut children_of: Vec<Vec<usize>> = vec![Vec::new(); things.len()];
    let mut roots = Vec::new();
    for (i, thing) in things.iter().enumerate() {
        let parent = thing
            .pointer("/data/parent_id")
            .and_then(Value::as_str)
            .and_then(|p| index.get(p));
        match parent {
            Some(&p) if p != i => children_of[p].push(i),
            _ => roots.push(i),
        }
    }

    fn build(i: usize, slots: &mut [Option<Value>], children_of: &[Vec<usize>]) -> Option<Value> {
        let mut node = slots[i].take()?;
        for &child in &children_of[i] {
            if let Some(child_node) = build(child, slots, children_of) {
                push_reply(&mut node, child_node);
            }
        }
        Some(node)
    }

    let mut slots: Vec<Option<Value>> = things.into_iter().map(Some).collect();
    roots
        .into_iter()
        .filter_map(|i| build(i, &mut slots, &children_of))
        .collect()
}

/// Removes every remaining placeholder from the forest
pub fn prune_more(forest: &mut Vec<Value>) {
    forest.retain(|node| !is_more(node));
    for node in forest.iter_mut() {
        if let Some(children) = replies_mut(node) {
            prune_more(children);
        }
    }
}

/// Flattens a forest breadth-first into a list of comments
///
/// Each comment's nested replies are replaced by an ordered `reply_ids`
/// array. Non-comment things are dropped.
pub fn flatten(forest: Vec<Value>) -> Vec<Value> {
    let mut queue: VecDeque<Value> = forest.into();
    let mut flat = Vec::new();

    while let Some(mut node) = queue.pop_front() {
        if !is_comment(&node) {
            continue;
        }

        let replies = replies_mut(&mut node).map(std::mem::take).unwrap_or_default();
        let reply_ids: Vec<Value> = replies
            .iter()
            .filter(|reply| is_comment(reply))
            .filter_map(|reply| reply.pointer("/data/id").cloned())
            .collect();

        if let Some(data) = node.get_mut("data").and_then(Value::as_object_mut) {
            data.remove("replies");
            data.insert("reply_ids".to_string(), Value::Array(reply_ids));
        }

        queue.extend(replies);
        flat.push(node);
    }

    flat
}
