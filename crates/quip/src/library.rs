use std::fmt;

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::error::EvalResult;
use crate::eval::{Evaluator, Lambda};
use crate::model::{FunctionMetadata, OperatorMetadata};
use crate::operand::Operand;
use crate::value::Value;

/// A plain operator or function implementation: evaluated arguments in,
/// value out.
pub type NativeFn = fn(&[Value]) -> EvalResult<Value>;

/// An arrow-function receiver (`map`, `filter`, ...): it gets the evaluated
/// receiver plus a [`Lambda`] handle it can invoke once per element.
pub type ArrowFn = for<'e, 't, 'c> fn(Value, Lambda<'e, 't, 'c>) -> EvalResult<Value>;

/// Behavior of an operator that must see its children unevaluated.
///
/// Implementations decide when and whether to evaluate each child through
/// the evaluator they are handed — that is the whole point: `&&` skips its
/// right side, `=` never evaluates its left side as an expression at all.
pub trait CustomOperator: fmt::Debug {
    fn eval<'t, 'c>(&self, children: &'t [Operand], ev: &mut Evaluator<'t, 'c>) -> EvalResult<Value>;
}

/// Compile-time constructor hook for custom operators.
///
/// Called once per operator operand while the compiler binds the tree, with
/// the operator's name and the entry's plain implementation (so compound
/// assignments like `+=` can reuse the `+` function). The children stay
/// owned by the operand and reach the returned behavior at evaluation time.
pub type CustomFactory = fn(name: &str, base: Option<NativeFn>) -> Box<dyn CustomOperator>;

/// Method dispatch hook for context functions (`receiver.name(args)` where
/// `name` is not a registered function).
///
/// Returns `None` when this resolver does not handle the receiver/name
/// pair, letting the next installed resolver try.
pub type MethodResolver = fn(receiver: &Value, name: &str, args: &[Value]) -> Option<EvalResult<Value>>;

/// One operator implementation at one arity.
#[derive(Debug, Clone)]
pub struct OperatorEntry {
    /// The plain implementation; present for every eager operator, and for
    /// custom operators whose behavior wraps a base function (`+=`).
    pub function: Option<NativeFn>,
    /// The constructor hook for operators that evaluate their own children.
    pub custom: Option<CustomFactory>,
    pub metadata: OperatorMetadata,
}

impl OperatorEntry {
    pub fn eager(function: NativeFn, metadata: OperatorMetadata) -> Self {
        Self {
            function: Some(function),
            custom: None,
            metadata,
        }
    }

    pub fn custom(factory: CustomFactory, metadata: OperatorMetadata) -> Self {
        Self {
            function: None,
            custom: Some(factory),
            metadata,
        }
    }

    /// A custom operator carrying a base function for the factory to wrap,
    /// the shape every compound assignment uses.
    pub fn custom_with(factory: CustomFactory, function: NativeFn, metadata: OperatorMetadata) -> Self {
        Self {
            function: Some(function),
            custom: Some(factory),
            metadata,
        }
    }
}

/// A function implementation: plain call or arrow-function receiver.
#[derive(Debug, Clone, Copy)]
pub enum FunctionImpl {
    Plain(NativeFn),
    Arrow(ArrowFn),
}

/// One function implementation with its metadata.
#[derive(Debug, Clone)]
pub struct FunctionEntry {
    pub implementation: FunctionImpl,
    pub metadata: FunctionMetadata,
}

impl FunctionEntry {
    pub fn plain(function: NativeFn, metadata: FunctionMetadata) -> Self {
        Self {
            implementation: FunctionImpl::Plain(function),
            metadata,
        }
    }

    /// An arrow-function receiver; the metadata is marked accordingly so
    /// the parser treats the second syntactic argument as a lambda.
    pub fn arrow(function: ArrowFn, mut metadata: FunctionMetadata) -> Self {
        metadata.is_arrow_function = true;
        Self {
            implementation: FunctionImpl::Arrow(function),
            metadata,
        }
    }
}

/// A named bundle of operator and function implementations a host installs
/// into an [`Engine`](crate::Engine).
///
/// Installing a library copies its metadata into the Model (which drives
/// parsing and compilation) while the implementations stay here, looked up
/// by the compiler through the metadata's `lib` key.
#[derive(Debug, Default)]
pub struct Library {
    name: String,
    operators: AHashMap<String, AHashMap<usize, OperatorEntry>>,
    functions: AHashMap<String, FunctionEntry>,
    enums: AHashMap<String, IndexMap<String, Value>>,
    resolvers: Vec<MethodResolver>,
}

impl Library {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers an operator implementation for one arity. The entry's
    /// metadata `lib` field is stamped with this library's name.
    pub fn add_operator(&mut self, name: impl Into<String>, arity: usize, mut entry: OperatorEntry) {
        entry.metadata.lib = self.name.clone();
        self.operators.entry(name.into()).or_default().insert(arity, entry);
    }

    /// Registers a function implementation. The entry's metadata `lib`
    /// field is stamped with this library's name.
    pub fn add_function(&mut self, name: impl Into<String>, mut entry: FunctionEntry) {
        entry.metadata.lib = self.name.clone();
        self.functions.insert(name.into(), entry);
    }

    pub fn add_enum(&mut self, name: impl Into<String>, mapping: IndexMap<String, Value>) {
        self.enums.insert(name.into(), mapping);
    }

    /// Registers a method resolver for context-function dispatch.
    pub fn add_method_resolver(&mut self, resolver: MethodResolver) {
        self.resolvers.push(resolver);
    }

    pub(crate) fn operator(&self, name: &str, arity: usize) -> Option<&OperatorEntry> {
        self.operators.get(name)?.get(&arity)
    }

    pub(crate) fn function(&self, name: &str) -> Option<&FunctionEntry> {
        self.functions.get(name)
    }

    pub(crate) fn operators(&self) -> impl Iterator<Item = (&str, usize, &OperatorEntry)> {
        self.operators.iter().flat_map(|(name, by_arity)| {
            by_arity
                .iter()
                .map(move |(arity, entry)| (name.as_str(), *arity, entry))
        })
    }

    pub(crate) fn functions(&self) -> impl Iterator<Item = (&str, &FunctionEntry)> {
        self.functions.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub(crate) fn enums(&self) -> impl Iterator<Item = (&str, &IndexMap<String, Value>)> {
        self.enums.iter().map(|(name, mapping)| (name.as_str(), mapping))
    }

    pub(crate) fn resolvers(&self) -> &[MethodResolver] {
        &self.resolvers
    }
}
