//! Hierarchical views over flat ERP record lists.
//!
//! The ERP API returns records as a flat list where each item names its parent
//! by identifier (e.g. `parent_part` on BOM lines). The forest is a derived,
//! transient structure: it is rebuilt from scratch on every fetch and never
//! written back to the API.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Parent value meaning "this record has no real parent".
pub const DEFAULT_ROOT_SENTINEL: &str = "root";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("Record at position {index} has no identifier")]
    MissingIdentifier { index: usize },

    #[error("Cyclic parent reference involving: {}", .ids.join(", "))]
    CyclicParent { ids: Vec<String> },
}

/// One flat item returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// The full JSON object as received, including the id and parent fields.
    pub data: Map<String, Value>,
}

impl Record {
    /// Create a record with no attributes beyond its identity.
    pub fn new(id: impl Into<String>, parent: Option<&str>) -> Self {
        Self {
            id: id.into(),
            parent: parent.map(str::to_string),
            data: Map::new(),
        }
    }

    /// Extract a record from a raw API object.
    ///
    /// The identifier is the first of `id_fields` present on the object.
    /// `index` is the position in the source list and is only used for errors.
    pub fn from_value(
        index: usize,
        value: Value,
        id_fields: &[String],
        parent_field: Option<&str>,
    ) -> Result<Self, TreeError> {
        let Value::Object(data) = value else {
            return Err(TreeError::MissingIdentifier { index });
        };

        let id = id_fields
            .iter()
            .find_map(|field| data.get(field).and_then(reference_key))
            .ok_or(TreeError::MissingIdentifier { index })?;

        let parent = parent_field
            .and_then(|field| data.get(field))
            .and_then(reference_key);

        Ok(Self { id, parent, data })
    }

    pub fn attr(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }
}

/// Convert a list of raw API objects into records, preserving order.
pub fn records_from_values(
    values: Vec<Value>,
    id_fields: &[String],
    parent_field: Option<&str>,
) -> Result<Vec<Record>, TreeError> {
    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| Record::from_value(index, value, id_fields, parent_field))
        .collect()
}

/// Read an identifier-like value. Populated references (`{"_id": ...}`) are
/// unwrapped, numbers are stringified, empty strings count as absent.
fn reference_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(obj) => obj.get("_id").and_then(reference_key),
        _ => None,
    }
}

/// A record plus its reconstructed ordered children.
#[derive(Debug, PartialEq, Serialize)]
pub struct Node {
    #[serde(flatten)]
    pub record: Record,
    pub level: usize,
    pub children: Vec<Node>,
}

// Parent chains from the API can be thousands of levels deep, so cloning and
// dropping walk the subtree with an explicit stack.
impl Clone for Node {
    fn clone(&self) -> Self {
        let mut order: Vec<&Node> = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            order.push(node);
            stack.extend(node.children.iter().rev());
        }

        assemble(order.into_iter().rev().map(|node| {
            let copy = Node {
                record: node.record.clone(),
                level: node.level,
                children: Vec::new(),
            };
            (copy, node.children.len())
        }))
        .pop()
        .unwrap_or_else(|| unreachable!("a subtree has at least its root"))
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.children);
        while let Some(mut node) = stack.pop() {
            stack.append(&mut node.children);
        }
    }
}

/// Attach children to parents given nodes in reverse pre-order, each paired
/// with its child count. Returns the top-level nodes in their original order.
fn assemble(reversed: impl Iterator<Item = (Node, usize)>) -> Vec<Node> {
    let mut built: Vec<Node> = Vec::new();
    for (mut node, child_count) in reversed {
        // Later siblings were finished first, so they sit lower on the stack.
        let mut children = built.split_off(built.len() - child_count);
        children.reverse();
        node.children = children;
        built.push(node);
    }
    built.reverse();
    built
}

/// Ordered sequence of root nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Forest {
    pub roots: Vec<Node>,
}

/// A record annotated with its depth, for tabular display and export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatRow {
    #[serde(flatten)]
    pub record: Record,
    pub level: usize,
}

impl Forest {
    /// Total number of nodes, counting all descendants.
    pub fn len(&self) -> usize {
        let mut count = 0;
        let mut stack: Vec<&Node> = self.roots.iter().collect();
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Pre-order traversal of the forest.
    pub fn preorder(&self) -> Preorder<'_> {
        Preorder {
            stack: self.roots.iter().rev().collect(),
        }
    }
}

pub struct Preorder<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for Preorder<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Rebuild the parent/child forest from a flat, ordered record list.
///
/// A record is a root when its parent reference is absent, empty, equal to
/// `sentinel`, or names an identifier not present in `records`. Otherwise it
/// becomes a child of the record with that identifier (the last one, when
/// identifiers repeat). Siblings keep their input order.
///
/// Records that cannot be reached from any root (a record that is its own
/// parent, or a parent chain that loops) fail the whole build.
pub fn build_forest(records: Vec<Record>, sentinel: &str) -> Result<Forest, TreeError> {
    let count = records.len();

    let parents: Vec<Option<usize>> = {
        let lookup: HashMap<&str, usize> = records
            .iter()
            .enumerate()
            .map(|(index, record)| (record.id.as_str(), index))
            .collect();

        records
            .iter()
            .map(|record| resolve_parent(record, sentinel, &lookup))
            .collect()
    };

    let mut roots = Vec::new();
    let mut children_of: Vec<Vec<usize>> = vec![Vec::new(); count];
    for (index, parent) in parents.iter().enumerate() {
        match parent {
            Some(parent) => children_of[*parent].push(index),
            None => roots.push(index),
        }
    }

    let mut reached = vec![false; count];
    let mut stack = roots.clone();
    while let Some(index) = stack.pop() {
        if !reached[index] {
            reached[index] = true;
            stack.extend(children_of[index].iter().copied());
        }
    }

    let unreachable: Vec<String> = records
        .iter()
        .zip(&reached)
        .filter(|(_, reached)| !**reached)
        .map(|(record, _)| record.id.clone())
        .collect();
    if !unreachable.is_empty() {
        return Err(TreeError::CyclicParent { ids: unreachable });
    }

    // Every record is reachable exactly once, so the pre-order visits each
    // index once and every slot is taken once.
    let mut order: Vec<(usize, usize)> = Vec::with_capacity(count);
    let mut stack: Vec<(usize, usize)> = roots.iter().rev().map(|&index| (index, 0)).collect();
    while let Some((index, level)) = stack.pop() {
        order.push((index, level));
        stack.extend(children_of[index].iter().rev().map(|&child| (child, level + 1)));
    }

    let mut slots: Vec<Option<Record>> = records.into_iter().map(Some).collect();
    let roots = assemble(order.into_iter().rev().filter_map(|(index, level)| {
        let record = slots[index].take()?;
        let node = Node {
            record,
            level,
            children: Vec::new(),
        };
        Some((node, children_of[index].len()))
    }));

    Ok(Forest { roots })
}

fn resolve_parent(
    record: &Record,
    sentinel: &str,
    lookup: &HashMap<&str, usize>,
) -> Option<usize> {
    let parent = record.parent.as_deref()?;
    if parent.is_empty() || parent == sentinel {
        return None;
    }
    lookup.get(parent).copied()
}

/// Pre-order flattening of the forest with each record's depth (root = 0).
pub fn flatten_with_depth(forest: &Forest) -> Vec<FlatRow> {
    forest
        .preorder()
        .map(|node| FlatRow {
            record: node.record.clone(),
            level: node.level,
        })
        .collect()
}

/// The selected identifiers plus all of their transitive descendants, in
/// pre-order and without repeats. Unknown identifiers are ignored.
pub fn collect_with_descendants(forest: &Forest, selected: &[String]) -> Vec<String> {
    let wanted: HashSet<&str> = selected.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    let mut collected = Vec::new();

    let mut stack: Vec<(&Node, bool)> = forest.roots.iter().rev().map(|n| (n, false)).collect();
    while let Some((node, inside)) = stack.pop() {
        let inside = inside || wanted.contains(node.record.id.as_str());
        if inside && seen.insert(node.record.id.as_str()) {
            collected.push(node.record.id.clone());
        }
        stack.extend(node.children.iter().rev().map(|child| (child, inside)));
    }

    collected
}

/// Flattened rows limited to a selection and its descendants.
/// An empty selection means every row.
pub fn rows_for_selection(forest: &Forest, selected: &[String]) -> Vec<FlatRow> {
    let rows = flatten_with_depth(forest);
    if selected.is_empty() {
        return rows;
    }

    let scope: HashSet<String> = collect_with_descendants(forest, selected)
        .into_iter()
        .collect();
    rows.into_iter()
        .filter(|row| scope.contains(&row.record.id))
        .collect()
}
