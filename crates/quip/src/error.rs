use std::error::Error;
use std::fmt;

use crate::value::ValueType;

/// Registry lookup failure: the Model has no record for the requested name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    UnknownOperator { name: String, arity: usize },
    UnknownFunction { name: String },
    UnknownEnum { name: String },
    UnknownLibrary { name: String },
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownOperator { name, arity } => {
                write!(f, "operator '{name}' with {arity} operand(s) is not registered")
            }
            Self::UnknownFunction { name } => write!(f, "function '{name}' is not registered"),
            Self::UnknownEnum { name } => write!(f, "enum '{name}' is not registered"),
            Self::UnknownLibrary { name } => write!(f, "library '{name}' is not installed"),
        }
    }
}

impl Error for ModelError {}

pub type ModelResult<T> = Result<T, ModelError>;

/// Failure while turning source text into a node tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// A quoted string reached the end of input without its closing quote.
    UnterminatedString,
    /// An object literal key was not followed by `:`.
    AttributeWithoutValue { name: String },
    /// An arrow-function call had neither an empty argument list nor `=>`.
    ArrowWithoutBody { function: String },
    /// An operator was lexed that the Model has no priority for.
    UnknownOperator { symbol: String },
    /// A token appeared where an operand or terminator was expected.
    UnexpectedToken { token: String },
    /// The input ended in the middle of a construct.
    UnexpectedEnd,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnterminatedString => f.write_str("unterminated string literal"),
            Self::AttributeWithoutValue { name } => write!(f, "attribute '{name}' without value"),
            Self::ArrowWithoutBody { function } => write!(f, "{function} without body"),
            Self::UnknownOperator { symbol } => write!(f, "unknown operator '{symbol}'"),
            Self::UnexpectedToken { token } => write!(f, "unexpected token '{token}'"),
            Self::UnexpectedEnd => f.write_str("unexpected end of expression"),
        }
    }
}

impl Error for ParseError {}

pub type ParseResult<T> = Result<T, ParseError>;

/// Failure while lowering a node tree to an operand tree.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// Registry lookup failed for an operator or function node.
    Model(ModelError),
    /// Constant folding evaluated an operator and the operator failed.
    Fold(EvalError),
    /// The node kind has no operand counterpart.
    NodeNotSupported { name: String },
    /// The node tree is structurally invalid (wrong child shape or a
    /// non-string name where a name is required).
    BadNode { message: String },
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Model(e) => write!(f, "{e}"),
            Self::Fold(e) => write!(f, "constant folding failed: {e}"),
            Self::NodeNotSupported { name } => write!(f, "node: {name} not supported"),
            Self::BadNode { message } => write!(f, "invalid node: {message}"),
        }
    }
}

impl Error for CompileError {}

impl From<ModelError> for CompileError {
    fn from(e: ModelError) -> Self {
        Self::Model(e)
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

/// Runtime failure raised by library callables or by evaluation itself.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    DivisionByZero,
    /// A binary operator received operand types it does not accept.
    TypeMismatch {
        operator: String,
        left: ValueType,
        right: ValueType,
    },
    /// A unary operator or single-operand rule rejected its operand type.
    UnsupportedOperand { operator: String, operand: ValueType },
    /// An operator was applied in a way that is structurally valid but
    /// numerically impossible (bad shift amount, negative sqrt, ...).
    InvalidOperation { operator: String, message: String },
    IndexOutOfRange { index: i64, len: usize },
    NotIndexable { target: ValueType },
    NotIterable { target: ValueType },
    /// A key lookup on an object found nothing.
    KeyNotFound { key: String },
    ArgumentCount {
        function: String,
        expected: usize,
        got: usize,
    },
    ArgumentType {
        function: String,
        index: usize,
        expected: ValueType,
        got: ValueType,
    },
    /// Method dispatch found no resolver for the receiver type and name.
    UnknownMethod { name: String, receiver: ValueType },
    /// The left side of an assignment is not a variable or index expression.
    AssignTarget { found: String },
    /// Registry lookup failed at evaluation time.
    Model(ModelError),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DivisionByZero => f.write_str("division by zero"),
            Self::TypeMismatch { operator, left, right } => {
                write!(f, "operator '{operator}' not supported between {left} and {right}")
            }
            Self::UnsupportedOperand { operator, operand } => {
                write!(f, "operator '{operator}' not supported for {operand}")
            }
            Self::InvalidOperation { operator, message } => {
                write!(f, "operator '{operator}': {message}")
            }
            Self::IndexOutOfRange { index, len } => {
                write!(f, "index {index} out of range for length {len}")
            }
            Self::NotIndexable { target } => write!(f, "{target} is not indexable"),
            Self::NotIterable { target } => write!(f, "{target} is not iterable"),
            Self::KeyNotFound { key } => write!(f, "key '{key}' not found"),
            Self::ArgumentCount { function, expected, got } => {
                write!(f, "{function} expects {expected} argument(s), got {got}")
            }
            Self::ArgumentType {
                function,
                index,
                expected,
                got,
            } => {
                write!(f, "{function} argument {index} expects {expected}, got {got}")
            }
            Self::UnknownMethod { name, receiver } => {
                write!(f, "{receiver} has no method '{name}'")
            }
            Self::AssignTarget { found } => {
                write!(f, "cannot assign to {found}")
            }
            Self::Model(e) => write!(f, "{e}"),
        }
    }
}

impl Error for EvalError {}

impl From<ModelError> for EvalError {
    fn from(e: ModelError) -> Self {
        Self::Model(e)
    }
}

pub type EvalResult<T> = Result<T, EvalError>;

/// Public error type of the facade.
///
/// Every failure unwinds to the `Engine` call that triggered it and is
/// wrapped there with the context a caller can act on: the offending
/// expression text, node name or operand name.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionError {
    Parse { expression: String, source: ParseError },
    Compile { node: String, source: CompileError },
    Eval { operand: String, source: EvalError },
    /// Serialized-tree handling failed: malformed JSON or an unknown kind tag.
    Serialize { message: String },
}

impl fmt::Display for ExpressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse { expression, source } => {
                write!(f, "expression: {expression} error: {source}")
            }
            Self::Compile { node, source } => write!(f, "node: {node} error: {source}"),
            Self::Eval { operand, source } => write!(f, "operand: {operand} error: {source}"),
            Self::Serialize { message } => write!(f, "serialized tree error: {message}"),
        }
    }
}

impl Error for ExpressionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse { source, .. } => Some(source),
            Self::Compile { source, .. } => Some(source),
            Self::Eval { source, .. } => Some(source),
            Self::Serialize { .. } => None,
        }
    }
}

pub type ExpressionResult<T> = Result<T, ExpressionError>;
