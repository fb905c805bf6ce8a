use indexmap::IndexMap;

use crate::model::{Category, FunctionMetadata, Model};
use crate::node::{Node, NodeKind};
use crate::operand::Operand;
use crate::value::{Value, ValueType};

mod private {
    pub trait Sealed {}
    impl Sealed for crate::node::Node {}
    impl Sealed for crate::operand::Operand {}
}

/// What one tree node is, as far as the introspection queries care.
#[derive(Debug, Clone, Copy)]
pub enum TreeItem<'t> {
    Variable(&'t str),
    Constant(&'t Value),
    Operator(&'t str),
    Function(&'t str),
    Other,
}

/// Trees the introspection queries can walk: AST [`Node`]s and compiled
/// [`Operand`]s. Sealed — the engine only knows how to query these two.
pub trait Queryable: private::Sealed {
    #[doc(hidden)]
    fn query_children(&self) -> &[Self]
    where
        Self: Sized;

    #[doc(hidden)]
    fn query_item(&self) -> TreeItem<'_>;

    #[doc(hidden)]
    fn to_record(&self) -> crate::node::TreeRecord;
}

impl Queryable for Node {
    fn query_children(&self) -> &[Self] {
        &self.children
    }

    fn to_record(&self) -> crate::node::TreeRecord {
        crate::node::TreeRecord::from(self)
    }

    fn query_item(&self) -> TreeItem<'_> {
        match self.kind {
            NodeKind::Constant => TreeItem::Constant(&self.name),
            NodeKind::Variable => match self.text() {
                Some(name) => TreeItem::Variable(name),
                None => TreeItem::Other,
            },
            NodeKind::Operator => match self.text() {
                Some(name) => TreeItem::Operator(name),
                None => TreeItem::Other,
            },
            NodeKind::Function | NodeKind::ChildFunction | NodeKind::ArrowFunction => {
                match self.text() {
                    Some(name) => TreeItem::Function(name),
                    None => TreeItem::Other,
                }
            }
            _ => TreeItem::Other,
        }
    }
}

impl Queryable for Operand {
    fn query_children(&self) -> &[Self] {
        self.children()
    }

    fn to_record(&self) -> crate::node::TreeRecord {
        crate::node::TreeRecord::from(self)
    }

    fn query_item(&self) -> TreeItem<'_> {
        match self {
            Operand::Constant(value) => TreeItem::Constant(value),
            Operand::Variable(name) => TreeItem::Variable(name),
            Operand::Operator { name, .. } => TreeItem::Operator(name),
            Operand::Function { name, .. }
            | Operand::ArrowFunction { name, .. }
            | Operand::ContextFunction { name, .. } => TreeItem::Function(name),
            _ => TreeItem::Other,
        }
    }
}

/// Collects every variable in the tree with its inferred type.
pub(crate) fn vars<T: Queryable>(model: &Model, tree: &T) -> IndexMap<String, ValueType> {
    let mut out = IndexMap::new();
    collect_vars(model, tree, None, &mut out);
    out
}

fn collect_vars<T: Queryable>(
    model: &Model,
    node: &T,
    parent: Option<(&T, usize)>,
    out: &mut IndexMap<String, ValueType>,
) {
    if let TreeItem::Variable(name) = node.query_item() {
        out.insert(name.to_owned(), infer_type(model, parent));
    }
    for (index, child) in node.query_children().iter().enumerate() {
        collect_vars(model, child, Some((node, index)), out);
    }
}

/// Infers a node's expected type from its position under its parent.
///
/// Operator parents contribute their argument descriptor — except in the
/// comparison category, where the sibling's type wins (so `x == 1` infers
/// `int` for `x`). Function parents contribute their argument descriptor.
/// Anything else is `any`.
pub(crate) fn infer_type<T: Queryable>(model: &Model, parent: Option<(&T, usize)>) -> ValueType {
    let Some((parent, index)) = parent else {
        return ValueType::Any;
    };
    match parent.query_item() {
        TreeItem::Operator(op_name) => {
            let siblings = parent.query_children();
            let Ok(metadata) = model.operator_metadata(op_name, siblings.len()) else {
                return ValueType::Any;
            };
            if metadata.category == Category::Comparison {
                let other = if index == 0 { 1 } else { 0 };
                match siblings.get(other) {
                    Some(sibling) => self_type(model, sibling),
                    None => ValueType::Any,
                }
            } else {
                metadata
                    .args
                    .get(index)
                    .map_or(ValueType::Any, |arg| arg.value_type)
            }
        }
        TreeItem::Function(fn_name) => model
            .function_metadata(fn_name)
            .ok()
            .and_then(|metadata| metadata.args.get(index))
            .map_or(ValueType::Any, |arg| arg.value_type),
        _ => ValueType::Any,
    }
}

/// A node's own result type: a constant's value type, an operator's or
/// function's declared return type, `any` otherwise.
pub(crate) fn self_type<T: Queryable>(model: &Model, node: &T) -> ValueType {
    match node.query_item() {
        TreeItem::Constant(value) => value.value_type(),
        TreeItem::Operator(name) => model
            .operator_metadata(name, node.query_children().len())
            .map_or(ValueType::Any, |metadata| metadata.return_type),
        TreeItem::Function(name) => model
            .function_metadata(name)
            .map_or(ValueType::Any, |metadata| metadata.return_type),
        _ => ValueType::Any,
    }
}

/// Collects every constant in the tree, keyed by its rendered literal,
/// with its value type.
pub(crate) fn constants<T: Queryable>(tree: &T) -> IndexMap<String, ValueType> {
    let mut out = IndexMap::new();
    collect_constants(tree, &mut out);
    out
}

fn collect_constants<T: Queryable>(node: &T, out: &mut IndexMap<String, ValueType>) {
    if let TreeItem::Constant(value) = node.query_item() {
        out.insert(value.to_string(), value.value_type());
    }
    for child in node.query_children() {
        collect_constants(child, out);
    }
}

/// Collects every operator in the tree with its category.
pub(crate) fn operators<T: Queryable>(model: &Model, tree: &T) -> IndexMap<String, Category> {
    let mut out = IndexMap::new();
    collect_operators(model, tree, &mut out);
    out
}

fn collect_operators<T: Queryable>(model: &Model, node: &T, out: &mut IndexMap<String, Category>) {
    if let TreeItem::Operator(name) = node.query_item() {
        if let Ok(metadata) = model.operator_metadata(name, node.query_children().len()) {
            out.insert(name.to_owned(), metadata.category);
        }
    }
    for child in node.query_children() {
        collect_operators(model, child, out);
    }
}

/// Collects every registered function referenced by the tree with its
/// metadata. Context functions (resolved at evaluation time) have no
/// metadata and are skipped.
pub(crate) fn functions<T: Queryable>(model: &Model, tree: &T) -> IndexMap<String, FunctionMetadata> {
    let mut out = IndexMap::new();
    collect_functions(model, tree, &mut out);
    out
}

fn collect_functions<T: Queryable>(
    model: &Model,
    node: &T,
    out: &mut IndexMap<String, FunctionMetadata>,
) {
    if let TreeItem::Function(name) = node.query_item() {
        if let Ok(metadata) = model.function_metadata(name) {
            out.insert(name.to_owned(), metadata.clone());
        }
    }
    for child in node.query_children() {
        collect_functions(model, child, out);
    }
}
