//! Public interface for parsing, compiling and running expressions.

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::compile::Compiler;
use crate::context::Context;
use crate::corelib::corelib;
use crate::error::{ExpressionError, ExpressionResult};
use crate::eval::Evaluator;
use crate::library::{Library, MethodResolver};
use crate::model::{Category, FunctionMetadata, Model};
use crate::node::{Node, TreeRecord};
use crate::operand::Operand;
use crate::parse::{Parser, ParserTables};
use crate::query::{self, Queryable};
use crate::value::{Value, ValueType};

/// The engine handle: one Model, its installed libraries, and the parser
/// tables derived from them.
///
/// Construction installs the core library; use [`Engine::empty`] to start
/// from a bare registry instead. The engine is cheap to share immutably:
/// parsing, compiling and evaluating all take `&self`, and evaluation state
/// lives in the caller's [`Context`].
///
/// # Example
/// ```
/// use quip::{Context, Engine, Value};
///
/// let engine = Engine::new();
/// let mut ctx = Context::new();
/// ctx.insert("a", 1);
/// ctx.insert("b", 3);
/// let result = engine.run("a == 1 && b != 2", &mut ctx).unwrap();
/// assert_eq!(result, Value::Bool(true));
/// ```
#[derive(Debug)]
pub struct Engine {
    model: Model,
    libraries: AHashMap<String, Library>,
    tables: ParserTables,
    resolvers: Vec<MethodResolver>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Creates an engine with the core library installed.
    pub fn new() -> Self {
        let mut engine = Self::empty();
        engine.add_library(corelib());
        engine
    }

    /// Creates an engine with no libraries at all. Until a library is
    /// installed, every operator and function fails to compile.
    pub fn empty() -> Self {
        Self {
            model: Model::new(),
            libraries: AHashMap::new(),
            tables: ParserTables::default(),
            resolvers: Vec::new(),
        }
    }

    /// The metadata registry shared by the parser and compiler.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Installs a library: copies its operator/function/enum metadata into
    /// the Model, takes over its method resolvers, and rebuilds the parser
    /// tables.
    ///
    /// Installing libraries after operand trees were compiled leaves those
    /// trees bound to the implementations they were compiled with.
    pub fn add_library(&mut self, library: Library) {
        for (name, mapping) in library.enums() {
            self.model.add_enum(name, mapping.clone());
        }
        for (name, arity, entry) in library.operators() {
            self.model.add_operator(name, arity, entry.metadata.clone());
        }
        for (name, entry) in library.functions() {
            self.model.add_function(name, entry.metadata.clone());
        }
        self.resolvers.extend_from_slice(library.resolvers());
        self.libraries.insert(library.name().to_owned(), library);
        self.refresh();
    }

    /// Rebuilds the parser's operator lexeme and arrow-function tables from
    /// the Model.
    fn refresh(&mut self) {
        self.tables = ParserTables::refresh(&self.model);
    }

    /// Parses source text into a node tree.
    ///
    /// # Errors
    /// `ExpressionError::Parse` carrying the offending expression text.
    pub fn parse(&self, expression: &str) -> ExpressionResult<Node> {
        Parser::new(&self.model, &self.tables)
            .parse(expression)
            .map_err(|source| ExpressionError::Parse {
                expression: expression.to_owned(),
                source,
            })
    }

    /// Parses and compiles source text into an executable operand tree.
    ///
    /// Compile once, evaluate many times: the returned tree is immutable
    /// and every evaluation only needs a [`Context`].
    ///
    /// # Errors
    /// Parse errors, registry lookups that fail, and constant folds that
    /// fail, each wrapped with their context.
    pub fn compile(&self, expression: &str) -> ExpressionResult<Operand> {
        let node = self.parse(expression)?;
        self.compile_node(&node)
    }

    /// Compiles an already-parsed node tree.
    ///
    /// # Errors
    /// `ExpressionError::Compile` carrying the node name.
    pub fn compile_node(&self, node: &Node) -> ExpressionResult<Operand> {
        Compiler::new(&self.model, &self.libraries)
            .compile(node)
            .map_err(|source| ExpressionError::Compile {
                node: node.name.to_string(),
                source,
            })
    }

    /// Parses, compiles and evaluates in one call.
    ///
    /// # Example
    /// ```
    /// use quip::{Context, Engine, Value};
    ///
    /// let engine = Engine::new();
    /// let result = engine.run("1 + 2 * 3", &mut Context::new()).unwrap();
    /// assert_eq!(result, Value::Int(7));
    /// ```
    pub fn run(&self, expression: &str, context: &mut Context) -> ExpressionResult<Value> {
        let operand = self.compile(expression)?;
        self.eval(&operand, context)
    }

    /// Compiles and evaluates an already-parsed node tree.
    pub fn run_node(&self, node: &Node, context: &mut Context) -> ExpressionResult<Value> {
        let operand = self.compile_node(node)?;
        self.eval(&operand, context)
    }

    /// Evaluates a pre-compiled operand tree against a context.
    ///
    /// # Errors
    /// `ExpressionError::Eval` carrying the operand name.
    pub fn eval(&self, operand: &Operand, context: &mut Context) -> ExpressionResult<Value> {
        let mut evaluator = Evaluator::new(&self.resolvers, context);
        evaluator
            .eval_value(operand)
            .map_err(|source| ExpressionError::Eval {
                operand: operand.record_name().to_string(),
                source,
            })
    }

    /// Every variable referenced by the tree, with its inferred type.
    pub fn vars<T: Queryable>(&self, tree: &T) -> IndexMap<String, ValueType> {
        query::vars(&self.model, tree)
    }

    /// Every constant in the tree, keyed by its rendered literal, with its
    /// value type.
    pub fn constants<T: Queryable>(&self, tree: &T) -> IndexMap<String, ValueType> {
        query::constants(tree)
    }

    /// Every operator in the tree, with its category.
    pub fn operators<T: Queryable>(&self, tree: &T) -> IndexMap<String, Category> {
        query::operators(&self.model, tree)
    }

    /// Every registered function referenced by the tree, with its metadata.
    pub fn functions<T: Queryable>(&self, tree: &T) -> IndexMap<String, FunctionMetadata> {
        query::functions(&self.model, tree)
    }

    /// The tree's own result type: a constant's value type, an operator's
    /// or function's declared return type, `any` otherwise.
    pub fn operand_type<T: Queryable>(&self, tree: &T) -> ValueType {
        query::self_type(&self.model, tree)
    }

    /// Serializes a node or operand tree into `{n, t, c}` records, the
    /// stable on-wire representation.
    pub fn serialize<T: Queryable>(&self, tree: &T) -> TreeRecord {
        tree.to_record()
    }

    /// Serializes a node or operand tree straight to a JSON string.
    pub fn serialize_json<T: Queryable>(&self, tree: &T) -> ExpressionResult<String> {
        serde_json::to_string(&self.serialize(tree)).map_err(|e| ExpressionError::Serialize {
            message: e.to_string(),
        })
    }

    /// Rebuilds a node tree from serialized records; the left inverse of
    /// [`Engine::serialize`] up to back-links.
    pub fn deserialize_node(&self, record: &TreeRecord) -> ExpressionResult<Node> {
        Node::from_record(record).map_err(|kind| ExpressionError::Serialize {
            message: format!("unknown node kind '{kind}'"),
        })
    }

    /// Rebuilds an operand tree from serialized records, re-binding every
    /// operator and function against this engine's libraries.
    pub fn deserialize_operand(&self, record: &TreeRecord) -> ExpressionResult<Operand> {
        Compiler::new(&self.model, &self.libraries)
            .operand_from_record(record)
            .map_err(|source| ExpressionError::Compile {
                node: record.name.to_string(),
                source,
            })
    }

    /// Parses `{n, t, c}` JSON and rebuilds the node tree.
    pub fn deserialize_node_json(&self, json: &str) -> ExpressionResult<Node> {
        let record = parse_record(json)?;
        self.deserialize_node(&record)
    }

    /// Parses `{n, t, c}` JSON and rebuilds the operand tree.
    pub fn deserialize_operand_json(&self, json: &str) -> ExpressionResult<Operand> {
        let record = parse_record(json)?;
        self.deserialize_operand(&record)
    }
}

fn parse_record(json: &str) -> ExpressionResult<TreeRecord> {
    serde_json::from_str(json).map_err(|e| ExpressionError::Serialize {
        message: e.to_string(),
    })
}
