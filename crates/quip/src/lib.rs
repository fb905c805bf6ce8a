#![doc = include_str!("../../../README.md")]
mod compile;
mod context;
mod corelib;
mod engine;
mod error;
mod eval;
mod library;
mod model;
mod node;
mod operand;
mod parse;
mod query;
mod value;

pub use crate::{
    context::Context,
    corelib::corelib,
    engine::Engine,
    error::{
        CompileError, CompileResult, EvalError, EvalResult, ExpressionError, ExpressionResult,
        ModelError, ModelResult, ParseError, ParseResult,
    },
    eval::{Evaluator, Lambda},
    library::{
        ArrowFn, CustomFactory, CustomOperator, FunctionEntry, FunctionImpl, Library,
        MethodResolver, NativeFn, OperatorEntry,
    },
    model::{ArgSpec, Category, FunctionMetadata, Model, OperatorMetadata},
    node::{Node, NodeKind, TreeRecord},
    operand::{Binding, Operand, OperandKind},
    query::{Queryable, TreeItem},
    value::{Value, ValueType},
};
