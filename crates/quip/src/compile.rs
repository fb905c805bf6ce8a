use std::str::FromStr;

use ahash::AHashMap;

use crate::error::{CompileError, CompileResult, ModelError};
use crate::library::{FunctionImpl, Library};
use crate::model::Model;
use crate::node::{Node, NodeKind, TreeRecord};
use crate::operand::{Binding, Operand, OperandKind};
use crate::value::Value;

/// Lowers node trees to operand trees.
///
/// A post-order walk compiles children first, then binds each node to its
/// implementation: operators and functions are looked up in the Model and
/// resolved through the library named in their metadata, so evaluation
/// never touches the registry again. Afterwards `reduce` folds constant
/// subtrees.
#[derive(Debug)]
pub(crate) struct Compiler<'a> {
    model: &'a Model,
    libraries: &'a AHashMap<String, Library>,
}

impl<'a> Compiler<'a> {
    pub fn new(model: &'a Model, libraries: &'a AHashMap<String, Library>) -> Self {
        Self { model, libraries }
    }

    pub fn compile(&self, node: &Node) -> CompileResult<Operand> {
        let operand = self.node_to_operand(node)?;
        self.reduce(operand)
    }

    fn node_to_operand(&self, node: &Node) -> CompileResult<Operand> {
        let mut children = Vec::with_capacity(node.children.len());
        for child in &node.children {
            children.push(self.node_to_operand(child)?);
        }
        self.create_operand(node.kind, &node.name, children)
    }

    fn create_operand(
        &self,
        kind: NodeKind,
        name: &Value,
        children: Vec<Operand>,
    ) -> CompileResult<Operand> {
        match kind {
            NodeKind::Constant => Ok(Operand::Constant(name.clone())),
            NodeKind::Variable => Ok(Operand::Variable(name_text(name)?)),
            NodeKind::KeyValue => Ok(Operand::KeyValue {
                key: name_text(name)?,
                children,
            }),
            NodeKind::Array => Ok(Operand::Array { children }),
            NodeKind::Object => Ok(Operand::Object { children }),
            NodeKind::Operator => self.create_operator(&name_text(name)?, children),
            NodeKind::Function => self.create_function(&name_text(name)?, children, false),
            NodeKind::ArrowFunction => self.create_function(&name_text(name)?, children, true),
            NodeKind::ChildFunction => {
                let name = name_text(name)?;
                if self.model.has_function(&name) {
                    // A registered name called through a receiver is an
                    // ordinary function call with the receiver prepended.
                    self.create_function(&name, children, false)
                } else {
                    Ok(Operand::ContextFunction { name, children })
                }
            }
            NodeKind::Block => Ok(Operand::Block { children }),
            NodeKind::If => Ok(Operand::If { children }),
            NodeKind::Elif => Ok(Operand::Elif { children }),
            NodeKind::Else => Ok(Operand::Else { children }),
            NodeKind::While => Ok(Operand::While { children }),
            NodeKind::For => Ok(Operand::For { children }),
            NodeKind::ForIn => Ok(Operand::ForIn { children }),
            NodeKind::Switch => Ok(Operand::Switch { children }),
            NodeKind::Case => Ok(Operand::Case {
                label: name.clone(),
                children,
            }),
            NodeKind::Default => Ok(Operand::Default { children }),
            NodeKind::Options => Ok(Operand::Options { children }),
            NodeKind::Break => Ok(Operand::Break),
            NodeKind::Continue => Ok(Operand::Continue),
            NodeKind::Return => Ok(Operand::Return),
        }
    }

    /// Binds an operator node: metadata from the Model, implementation from
    /// the metadata's library. A custom factory takes precedence and
    /// receives the entry's plain function to wrap.
    fn create_operator(&self, name: &str, children: Vec<Operand>) -> CompileResult<Operand> {
        let arity = children.len();
        let metadata = self.model.operator_metadata(name, arity)?;
        let library = self.library(&metadata.lib)?;
        let entry = library
            .operator(name, arity)
            .ok_or_else(|| ModelError::UnknownOperator {
                name: name.to_owned(),
                arity,
            })?;
        let binding = if let Some(factory) = entry.custom {
            Binding::Custom(factory(name, entry.function))
        } else if let Some(function) = entry.function {
            Binding::Eager(function)
        } else {
            return Err(CompileError::BadNode {
                message: format!("operator '{name}' has neither function nor custom constructor"),
            });
        };
        Ok(Operand::Operator {
            name: name.to_owned(),
            children,
            binding,
        })
    }

    fn create_function(&self, name: &str, children: Vec<Operand>, arrow: bool) -> CompileResult<Operand> {
        let metadata = self.model.function_metadata(name)?;
        let library = self.library(&metadata.lib)?;
        let entry = library.function(name).ok_or_else(|| ModelError::UnknownFunction {
            name: name.to_owned(),
        })?;
        match (arrow, entry.implementation) {
            (false, FunctionImpl::Plain(function)) => Ok(Operand::Function {
                name: name.to_owned(),
                children,
                function,
            }),
            (true, FunctionImpl::Arrow(function)) => Ok(Operand::ArrowFunction {
                name: name.to_owned(),
                children,
                function,
            }),
            (false, FunctionImpl::Arrow(_)) => Err(CompileError::BadNode {
                message: format!("function '{name}' must be called as receiver.{name}(x => body)"),
            }),
            (true, FunctionImpl::Plain(_)) => Err(CompileError::BadNode {
                message: format!("function '{name}' is not an arrow function"),
            }),
        }
    }

    fn library(&self, name: &str) -> CompileResult<&Library> {
        self.libraries.get(name).ok_or_else(|| {
            ModelError::UnknownLibrary {
                name: name.to_owned(),
            }
            .into()
        })
    }

    /// Constant folding: an eager operator whose children all reduced to
    /// constants is evaluated once, here, and replaced by the result.
    ///
    /// Custom operators (short-circuit, assignment) and functions are never
    /// folded — they may be effectful or context-dependent. A failing fold
    /// propagates; it is not swallowed.
    pub fn reduce(&self, operand: Operand) -> CompileResult<Operand> {
        match operand {
            Operand::Operator {
                name,
                children,
                binding: Binding::Eager(function),
            } => {
                let children = self.reduce_all(children)?;
                if children.iter().all(|c| matches!(c, Operand::Constant(_))) {
                    let args: Vec<Value> = children
                        .iter()
                        .map(|c| match c {
                            Operand::Constant(v) => v.clone(),
                            _ => Value::Null,
                        })
                        .collect();
                    let value = function(&args).map_err(CompileError::Fold)?;
                    Ok(Operand::Constant(value))
                } else {
                    Ok(Operand::Operator {
                        name,
                        children,
                        binding: Binding::Eager(function),
                    })
                }
            }
            Operand::Operator { name, children, binding } => Ok(Operand::Operator {
                name,
                children: self.reduce_all(children)?,
                binding,
            }),
            Operand::KeyValue { key, children } => Ok(Operand::KeyValue {
                key,
                children: self.reduce_all(children)?,
            }),
            Operand::Array { children } => Ok(Operand::Array {
                children: self.reduce_all(children)?,
            }),
            Operand::Object { children } => Ok(Operand::Object {
                children: self.reduce_all(children)?,
            }),
            Operand::Function { name, children, function } => Ok(Operand::Function {
                name,
                children: self.reduce_all(children)?,
                function,
            }),
            Operand::ArrowFunction { name, children, function } => Ok(Operand::ArrowFunction {
                name,
                children: self.reduce_all(children)?,
                function,
            }),
            Operand::ContextFunction { name, children } => Ok(Operand::ContextFunction {
                name,
                children: self.reduce_all(children)?,
            }),
            Operand::Block { children } => Ok(Operand::Block {
                children: self.reduce_all(children)?,
            }),
            Operand::If { children } => Ok(Operand::If {
                children: self.reduce_all(children)?,
            }),
            Operand::Elif { children } => Ok(Operand::Elif {
                children: self.reduce_all(children)?,
            }),
            Operand::Else { children } => Ok(Operand::Else {
                children: self.reduce_all(children)?,
            }),
            Operand::While { children } => Ok(Operand::While {
                children: self.reduce_all(children)?,
            }),
            Operand::For { children } => Ok(Operand::For {
                children: self.reduce_all(children)?,
            }),
            Operand::ForIn { children } => Ok(Operand::ForIn {
                children: self.reduce_all(children)?,
            }),
            Operand::Switch { children } => Ok(Operand::Switch {
                children: self.reduce_all(children)?,
            }),
            Operand::Case { label, children } => Ok(Operand::Case {
                label,
                children: self.reduce_all(children)?,
            }),
            Operand::Default { children } => Ok(Operand::Default {
                children: self.reduce_all(children)?,
            }),
            Operand::Options { children } => Ok(Operand::Options {
                children: self.reduce_all(children)?,
            }),
            leaf @ (Operand::Constant(_)
            | Operand::Variable(_)
            | Operand::Break
            | Operand::Continue
            | Operand::Return) => Ok(leaf),
        }
    }

    fn reduce_all(&self, children: Vec<Operand>) -> CompileResult<Vec<Operand>> {
        children.into_iter().map(|c| self.reduce(c)).collect()
    }

    /// Rebuilds an operand tree from its serialized `{n, t, c}` records,
    /// re-binding every operator and function against the current Model —
    /// the inverse of serialization up to bindings.
    pub fn operand_from_record(&self, record: &TreeRecord) -> CompileResult<Operand> {
        let mut children = Vec::with_capacity(record.children.len());
        for child in &record.children {
            children.push(self.operand_from_record(child)?);
        }
        let kind = OperandKind::from_str(&record.kind).map_err(|_| CompileError::NodeNotSupported {
            name: record.kind.clone(),
        })?;
        match kind {
            OperandKind::Constant => Ok(Operand::Constant(record.name.clone())),
            OperandKind::Variable => Ok(Operand::Variable(name_text(&record.name)?)),
            OperandKind::KeyValue => Ok(Operand::KeyValue {
                key: name_text(&record.name)?,
                children,
            }),
            OperandKind::Array => Ok(Operand::Array { children }),
            OperandKind::Object => Ok(Operand::Object { children }),
            OperandKind::Operator => self.create_operator(&name_text(&record.name)?, children),
            OperandKind::Function => self.create_function(&name_text(&record.name)?, children, false),
            OperandKind::ArrowFunction => self.create_function(&name_text(&record.name)?, children, true),
            OperandKind::ContextFunction => Ok(Operand::ContextFunction {
                name: name_text(&record.name)?,
                children,
            }),
            OperandKind::Block => Ok(Operand::Block { children }),
            OperandKind::If => Ok(Operand::If { children }),
            OperandKind::Elif => Ok(Operand::Elif { children }),
            OperandKind::Else => Ok(Operand::Else { children }),
            OperandKind::While => Ok(Operand::While { children }),
            OperandKind::For => Ok(Operand::For { children }),
            OperandKind::ForIn => Ok(Operand::ForIn { children }),
            OperandKind::Switch => Ok(Operand::Switch { children }),
            OperandKind::Case => Ok(Operand::Case {
                label: record.name.clone(),
                children,
            }),
            OperandKind::Default => Ok(Operand::Default { children }),
            OperandKind::Options => Ok(Operand::Options { children }),
            OperandKind::Break => Ok(Operand::Break),
            OperandKind::Continue => Ok(Operand::Continue),
            OperandKind::Return => Ok(Operand::Return),
        }
    }
}

/// The node's name as text, required for every kind except constants and
/// case labels.
fn name_text(name: &Value) -> CompileResult<String> {
    name.as_str()
        .map(ToOwned::to_owned)
        .ok_or_else(|| CompileError::BadNode {
            message: format!("expected a name, found {name}"),
        })
}
