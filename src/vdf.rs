//! VDF/ACF (Valve key-value) parser and serializer
//!
//! Line-oriented and deliberately forgiving: a line is either a lone quoted
//! key (an object follows), a `"key" "value"` pair, an opening or closing
//! brace, or noise that is skipped. Escaped quotes inside tokens are not
//! supported. `\\` inside values is unescaped on read and escaped again on
//! write so paths round-trip.

use crate::error::VdfError;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VdfNode {
    Scalar(String),
    Object(VdfObject),
}

impl VdfNode {
    pub fn as_object(&self) -> Option<&VdfObject> {
        match self {
            VdfNode::Object(obj) => Some(obj),
            VdfNode::Scalar(_) => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            VdfNode::Scalar(value) => Some(value),
            VdfNode::Object(_) => None,
        }
    }
}

/// Ordered key-value object. Keys keep their original casing; lookups are
/// case-insensitive because Steam is inconsistent ("MostRecent" vs
/// "mostrecent").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VdfObject {
    entries: Vec<(String, VdfNode)>,
}

impl VdfObject {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(key))
    }

    pub fn get(&self, key: &str) -> Option<&VdfNode> {
        self.position(key).map(|i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut VdfNode> {
        let idx = self.position(key)?;
        Some(&mut self.entries[idx].1)
    }

    /// Child object, or `None` if absent or a scalar.
    pub fn get_object(&self, key: &str) -> Option<&VdfObject> {
        self.get(key).and_then(VdfNode::as_object)
    }

    pub fn get_object_mut(&mut self, key: &str) -> Option<&mut VdfObject> {
        match self.get_mut(key)? {
            VdfNode::Object(obj) => Some(obj),
            VdfNode::Scalar(_) => None,
        }
    }

    /// Child scalar, or `None` if absent or an object.
    pub fn get_value(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(VdfNode::as_scalar)
    }

    /// Follow a chain of object keys.
    pub fn get_path(&self, keys: &[&str]) -> Option<&VdfObject> {
        keys.iter()
            .try_fold(self, |obj, key| obj.get_object(key))
    }

    /// Insert or replace. An existing key (any casing) keeps its position and
    /// its original spelling.
    pub fn insert(&mut self, key: impl Into<String>, node: VdfNode) {
        let key = key.into();
        match self.position(&key) {
            Some(idx) => self.entries[idx].1 = node,
            None => self.entries.push((key, node)),
        }
    }

    pub fn set_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.insert(key, VdfNode::Scalar(value.into()));
    }

    /// Child object for `key`, created (or replacing a scalar) when needed.
    pub fn ensure_object(&mut self, key: &str) -> &mut VdfObject {
        let idx = match self.position(key) {
            Some(idx) => idx,
            None => {
                self.entries
                    .push((key.to_string(), VdfNode::Object(VdfObject::new())));
                self.entries.len() - 1
            }
        };
        into_object(&mut self.entries[idx].1)
    }

    pub fn remove(&mut self, key: &str) -> Option<VdfNode> {
        let idx = self.position(key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VdfNode)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Only the children that are objects.
    pub fn objects(&self) -> impl Iterator<Item = (&str, &VdfObject)> {
        self.iter()
            .filter_map(|(k, v)| v.as_object().map(|obj| (k, obj)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn into_object(slot: &mut VdfNode) -> &mut VdfObject {
    match slot {
        VdfNode::Object(obj) => obj,
        VdfNode::Scalar(_) => {
            *slot = VdfNode::Object(VdfObject::new());
            into_object(slot)
        }
    }
}

/// Free-function accessor mirroring [`VdfObject::get_object`].
pub fn get_object<'a>(node: &'a VdfObject, key: &str) -> Option<&'a VdfObject> {
    node.get_object(key)
}

/// Free-function accessor mirroring [`VdfObject::get_value`].
pub fn get_value<'a>(node: &'a VdfObject, key: &str) -> Option<&'a str> {
    node.get_value(key)
}

enum Line<'a> {
    Blank,
    Open,
    Close,
    Key(&'a str, bool),
    Pair(&'a str, &'a str),
    Other,
}

fn classify(trimmed: &str, line_no: usize) -> Result<Line<'_>, VdfError> {
    if trimmed.is_empty() {
        return Ok(Line::Blank);
    }
    if trimmed == "{" {
        return Ok(Line::Open);
    }
    if trimmed == "}" {
        return Ok(Line::Close);
    }
    if !trimmed.starts_with('"') {
        return Ok(Line::Other);
    }

    let quotes: Vec<usize> = trimmed.match_indices('"').map(|(i, _)| i).collect();
    match quotes.len() {
        0 | 1 => Err(VdfError::BadToken { line: line_no }),
        2 | 3 => {
            let key = &trimmed[quotes[0] + 1..quotes[1]];
            let rest = &trimmed[quotes[1] + 1..];
            if quotes.len() == 3 && !rest.trim_start().starts_with('{') {
                return Err(VdfError::BadToken { line: line_no });
            }
            Ok(Line::Key(key, rest.trim_start().starts_with('{')))
        }
        _ => {
            let key = &trimmed[quotes[0] + 1..quotes[1]];
            let value = &trimmed[quotes[2] + 1..quotes[3]];
            Ok(Line::Pair(key, value))
        }
    }
}

fn unescape(value: &str) -> String {
    value.replace("\\\\", "\\")
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\")
}

/// Parse a whole document. The returned root object holds the top-level
/// keys (e.g. `"AppState"`).
pub fn parse(text: &str) -> Result<VdfObject, VdfError> {
    let mut stack: Vec<(String, VdfObject)> = vec![(String::new(), VdfObject::new())];
    let mut pending: Option<(String, usize)> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        match classify(raw.trim(), line_no)? {
            Line::Blank | Line::Other => {}
            Line::Open => match pending.take() {
                Some((key, _)) => stack.push((key, VdfObject::new())),
                // A brace with no key in front: treat as noise, like Steam does
                None => {}
            },
            Line::Close => {
                if let Some((key, line)) = pending.take() {
                    return Err(VdfError::DanglingKey { line, key });
                }
                if stack.len() < 2 {
                    return Err(VdfError::UnexpectedClose { line: line_no });
                }
                let Some((key, obj)) = stack.pop() else {
                    return Err(VdfError::UnexpectedClose { line: line_no });
                };
                if let Some((_, parent)) = stack.last_mut() {
                    parent.insert(key, VdfNode::Object(obj));
                }
            }
            Line::Key(key, opens_inline) => {
                if let Some((prev, line)) = pending.take() {
                    return Err(VdfError::DanglingKey { line, key: prev });
                }
                if opens_inline {
                    stack.push((key.to_string(), VdfObject::new()));
                } else {
                    pending = Some((key.to_string(), line_no));
                }
            }
            Line::Pair(key, value) => {
                if let Some((prev, line)) = pending.take() {
                    return Err(VdfError::DanglingKey { line, key: prev });
                }
                if let Some((_, current)) = stack.last_mut() {
                    current.set_value(key, unescape(value));
                }
            }
        }
    }

    if let Some((key, line)) = pending {
        return Err(VdfError::DanglingKey { line, key });
    }
    if stack.len() > 1 {
        let key = stack.pop().map(|(k, _)| k).unwrap_or_default();
        return Err(VdfError::Unclosed { key });
    }

    Ok(stack.pop().map(|(_, root)| root).unwrap_or_default())
}

/// An object in the source text: its key path from the root and the byte
/// offset just past the line holding its opening brace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSpan {
    pub path: Vec<String>,
    pub body_start: usize,
}

/// Every object in `text`, in document order. Used to edit a document in
/// place without re-rendering the lines around the edit.
pub fn object_spans(text: &str) -> Result<Vec<ObjectSpan>, VdfError> {
    let mut spans = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut pending: Option<String> = None;
    let mut offset = 0;

    for (idx, raw) in text.split_inclusive('\n').enumerate() {
        offset += raw.len();
        match classify(raw.trim(), idx + 1)? {
            Line::Blank | Line::Other => {}
            Line::Open => {
                if let Some(key) = pending.take() {
                    path.push(key);
                    spans.push(ObjectSpan {
                        path: path.clone(),
                        body_start: offset,
                    });
                }
            }
            Line::Close => {
                pending = None;
                path.pop();
            }
            Line::Key(key, true) => {
                pending = None;
                path.push(key.to_string());
                spans.push(ObjectSpan {
                    path: path.clone(),
                    body_start: offset,
                });
            }
            Line::Key(key, false) => pending = Some(key.to_string()),
            Line::Pair(..) => pending = None,
        }
    }

    Ok(spans)
}

pub fn parse_file(path: &Path) -> Result<VdfObject, VdfError> {
    let content = std::fs::read_to_string(path).map_err(|source| VdfError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&content)
}

/// Render a root object back to text in Steam's tab-indented layout.
pub fn serialize(root: &VdfObject) -> String {
    let mut out = String::new();
    write_object(&mut out, root, 0);
    out
}

fn write_object(out: &mut String, obj: &VdfObject, depth: usize) {
    let indent = "\t".repeat(depth);
    for (key, node) in obj.iter() {
        match node {
            VdfNode::Scalar(value) => {
                out.push_str(&format!("{}\"{}\"\t\t\"{}\"\n", indent, key, escape(value)));
            }
            VdfNode::Object(child) => {
                out.push_str(&format!("{}\"{}\"\n{}{{\n", indent, key, indent));
                write_object(out, child, depth + 1);
                out.push_str(&format!("{}}}\n", indent));
            }
        }
    }
}
