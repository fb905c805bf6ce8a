use strum::{Display, EnumString, IntoStaticStr};

use crate::library::{ArrowFn, CustomOperator, NativeFn};
use crate::node::TreeRecord;
use crate::value::Value;

/// Kind tag of an operand, also the `t` field of a serialized operand tree.
/// Serialized as the variant name itself (`Constant`, `ArrowFunction`, ...),
/// which keeps operand records visually distinct from node records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum OperandKind {
    Constant,
    Variable,
    KeyValue,
    Array,
    Object,
    Operator,
    Function,
    ArrowFunction,
    ContextFunction,
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

/// How an operator operand evaluates.
///
/// Eager operators have their children evaluated first and the native
/// function applied to the results; custom operators receive their children
/// unevaluated together with the evaluator, which is what short-circuiting
/// and assignment need.
#[derive(Debug)]
pub enum Binding {
    Eager(NativeFn),
    Custom(Box<dyn CustomOperator>),
}

/// A node of the compiled, executable tree.
///
/// Built by the compiler from an AST node tree; every operator, function and
/// arrow function is already bound to its library implementation, so
/// evaluation never goes back to the registry (except for context-function
/// method dispatch, which is dynamic by design).
///
/// The tree is immutable after compilation. Evaluation state (scopes) lives
/// in the [`Context`](crate::Context), so one compiled tree can be evaluated
/// against many contexts, and concurrent evaluations only need disjoint
/// contexts.
#[derive(Debug)]
pub enum Operand {
    /// A literal value, including everything constant folding produced.
    Constant(Value),
    /// A context lookup by (possibly dotted) name.
    Variable(String),
    /// One `key: value` entry of an object literal; exactly one child.
    KeyValue { key: String, children: Vec<Operand> },
    Array { children: Vec<Operand> },
    /// Object literal; all children are `KeyValue`.
    Object { children: Vec<Operand> },
    Operator {
        name: String,
        children: Vec<Operand>,
        binding: Binding,
    },
    Function {
        name: String,
        children: Vec<Operand>,
        function: NativeFn,
    },
    /// A higher-order call `receiver.name(x => body)`.
    /// Children are `[receiver]` or `[receiver, Variable(param), body]`.
    ArrowFunction {
        name: String,
        children: Vec<Operand>,
        function: ArrowFn,
    },
    /// A method call on a receiver resolved at evaluation time from the
    /// receiver's runtime type. Children are `[receiver, args...]`.
    ContextFunction { name: String, children: Vec<Operand> },
    Block { children: Vec<Operand> },
    /// Children: `[condition, then]` plus any `Elif`/`Else` children.
    If { children: Vec<Operand> },
    /// Children: `[condition, block]`.
    Elif { children: Vec<Operand> },
    /// Children: `[block]`.
    Else { children: Vec<Operand> },
    /// Children: `[condition, body]`.
    While { children: Vec<Operand> },
    /// Children: `[init, condition, step, body]`.
    For { children: Vec<Operand> },
    /// Children: `[Variable(name), iterable, body]`.
    ForIn { children: Vec<Operand> },
    /// Children: `[discriminant, Options]`.
    Switch { children: Vec<Operand> },
    /// One switch case; children: `[block]`.
    Case { label: Value, children: Vec<Operand> },
    /// The switch default; children: `[block]`.
    Default { children: Vec<Operand> },
    /// Container of a switch's cases and optional default.
    Options { children: Vec<Operand> },
    Break,
    Continue,
    Return,
}

impl Operand {
    pub fn kind(&self) -> OperandKind {
        match self {
            Self::Constant(_) => OperandKind::Constant,
            Self::Variable(_) => OperandKind::Variable,
            Self::KeyValue { .. } => OperandKind::KeyValue,
            Self::Array { .. } => OperandKind::Array,
            Self::Object { .. } => OperandKind::Object,
            Self::Operator { .. } => OperandKind::Operator,
            Self::Function { .. } => OperandKind::Function,
            Self::ArrowFunction { .. } => OperandKind::ArrowFunction,
            Self::ContextFunction { .. } => OperandKind::ContextFunction,
            Self::Block { .. } => OperandKind::Block,
            Self::If { .. } => OperandKind::If,
            Self::Elif { .. } => OperandKind::Elif,
            Self::Else { .. } => OperandKind::Else,
            Self::While { .. } => OperandKind::While,
            Self::For { .. } => OperandKind::For,
            Self::ForIn { .. } => OperandKind::ForIn,
            Self::Switch { .. } => OperandKind::Switch,
            Self::Case { .. } => OperandKind::Case,
            Self::Default { .. } => OperandKind::Default,
            Self::Options { .. } => OperandKind::Options,
            Self::Break => OperandKind::Break,
            Self::Continue => OperandKind::Continue,
            Self::Return => OperandKind::Return,
        }
    }

    pub fn children(&self) -> &[Operand] {
        match self {
            Self::Constant(_) | Self::Variable(_) | Self::Break | Self::Continue | Self::Return => &[],
            Self::KeyValue { children, .. }
            | Self::Array { children }
            | Self::Object { children }
            | Self::Operator { children, .. }
            | Self::Function { children, .. }
            | Self::ArrowFunction { children, .. }
            | Self::ContextFunction { children, .. }
            | Self::Block { children }
            | Self::If { children }
            | Self::Elif { children }
            | Self::Else { children }
            | Self::While { children }
            | Self::For { children }
            | Self::ForIn { children }
            | Self::Switch { children }
            | Self::Case { children, .. }
            | Self::Default { children }
            | Self::Options { children } => children,
        }
    }

    /// The `n` field of this operand's serialized record: the literal for
    /// constants and case labels, the name for named operands, the kind's
    /// conventional name for structural operands.
    pub fn record_name(&self) -> Value {
        match self {
            Self::Constant(value) => value.clone(),
            Self::Case { label, .. } => label.clone(),
            Self::Variable(name)
            | Self::KeyValue { key: name, .. }
            | Self::Operator { name, .. }
            | Self::Function { name, .. }
            | Self::ArrowFunction { name, .. }
            | Self::ContextFunction { name, .. } => Value::String(name.clone()),
            Self::Array { .. } => Value::from("array"),
            Self::Object { .. } => Value::from("object"),
            Self::Block { .. } => Value::from("block"),
            Self::If { .. } => Value::from("if"),
            Self::Elif { .. } => Value::from("elif"),
            Self::Else { .. } => Value::from("else"),
            Self::While { .. } => Value::from("while"),
            Self::For { .. } => Value::from("for"),
            Self::ForIn { .. } => Value::from("forIn"),
            Self::Switch { .. } => Value::from("switch"),
            Self::Default { .. } => Value::from("default"),
            Self::Options { .. } => Value::from("options"),
            Self::Break => Value::from("break"),
            Self::Continue => Value::from("continue"),
            Self::Return => Value::from("return"),
        }
    }
}

impl From<&Operand> for TreeRecord {
    fn from(operand: &Operand) -> Self {
        Self {
            name: operand.record_name(),
            kind: operand.kind().to_string(),
            children: operand.children().iter().map(TreeRecord::from).collect(),
        }
    }
}
