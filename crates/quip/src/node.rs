use strum::{Display, EnumString, IntoStaticStr};

use crate::value::Value;

/// Kind tag of an AST node.
///
/// All variants serialize to camelCase (e.g., `KeyValue` -> "keyValue",
/// `ForIn` -> "forIn"), which is also the `t` field of the serialized tree
/// form.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    IntoStaticStr,
    serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Constant,
    Variable,
    KeyValue,
    Array,
    Object,
    Operator,
    Function,
    ChildFunction,
    ArrowFunction,
    Block,
    If,
    Elif,
    Else,
    While,
    For,
    ForIn,
    Switch,
    Case,
    Default,
    Options,
    Break,
    Continue,
    Return,
}

/// An untyped AST node produced by the parser.
///
/// `name` is a string for most kinds; constant nodes (and case labels)
/// carry their literal value in it instead. The serde representation is the
/// stable `{n, t, c}` wire form: `{"n": name, "t": kind, "c": [child...]}`,
/// with `c` omitted for leaves.
///
/// Parent/index back-links are not stored; queries that need parentage
/// carry it as walk state.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Node {
    #[serde(rename = "n")]
    pub name: Value,
    #[serde(rename = "t")]
    pub kind: NodeKind,
    #[serde(rename = "c", default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

impl Node {
    /// Creates a leaf node.
    pub fn new(name: impl Into<Value>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            children: Vec::new(),
        }
    }

    /// Creates a node with children.
    pub fn with_children(name: impl Into<Value>, kind: NodeKind, children: Vec<Node>) -> Self {
        Self {
            name: name.into(),
            kind,
            children,
        }
    }

    /// The node's name as text, for the kinds whose name is a string.
    /// Constant nodes (whose name is an arbitrary literal) return `None`
    /// unless the literal happens to be a string.
    pub fn text(&self) -> Option<&str> {
        self.name.as_str()
    }
}

/// One node of the serialized `{n, t, c}` tree.
///
/// `Node` values serialize to this shape directly; `TreeRecord` exists so
/// operand trees (whose kind tags differ from node kind tags) share the
/// same wire form, and so callers can inspect a serialized tree without
/// deciding up front whether it holds a Node or an Operand.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TreeRecord {
    #[serde(rename = "n")]
    pub name: Value,
    #[serde(rename = "t")]
    pub kind: String,
    #[serde(rename = "c", default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeRecord>,
}

impl From<&Node> for TreeRecord {
    fn from(node: &Node) -> Self {
        Self {
            name: node.name.clone(),
            kind: node.kind.to_string(),
            children: node.children.iter().map(TreeRecord::from).collect(),
        }
    }
}

impl Node {
    /// Rebuilds a node tree from its serialized records; the inverse of
    /// serialization. Fails with the offending tag when a record's kind is
    /// not a node kind.
    pub(crate) fn from_record(record: &TreeRecord) -> Result<Node, String> {
        let kind = record.kind.parse::<NodeKind>().map_err(|_| record.kind.clone())?;
        let children = record
            .children
            .iter()
            .map(Node::from_record)
            .collect::<Result<_, _>>()?;
        Ok(Node {
            name: record.name.clone(),
            kind,
            children,
        })
    }
}
