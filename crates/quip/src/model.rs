use ahash::AHashMap;
use indexmap::IndexMap;
use strum::{Display, EnumString, IntoStaticStr};

use crate::error::{ModelError, ModelResult};
use crate::value::{Value, ValueType};

/// Operator category, carried in metadata and reported by the `operators`
/// introspection query. The comparison category also changes how argument
/// types are inferred (the sibling's type wins, so `x == 1` infers `int`
/// for `x`).
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
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Arithmetic,
    Comparison,
    Logical,
    Bitwise,
    Assignment,
    Other,
}

/// A typed parameter descriptor in operator/function metadata.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ArgSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
}

impl ArgSpec {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
        }
    }
}

/// Metadata installed for one operator at one arity.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OperatorMetadata {
    /// Binding priority; higher binds tighter.
    pub priority: i32,
    pub category: Category,
    pub args: Vec<ArgSpec>,
    #[serde(rename = "return")]
    pub return_type: ValueType,
    /// Key of the library holding the implementation.
    pub lib: String,
}

/// Metadata installed for one function.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionMetadata {
    pub args: Vec<ArgSpec>,
    #[serde(rename = "return")]
    pub return_type: ValueType,
    /// Key of the library holding the implementation.
    pub lib: String,
    /// When true, the second syntactic argument at a call site is a lambda
    /// `x => body` rather than an expression.
    pub is_arrow_function: bool,
}

/// The registry of operator, function and enum metadata.
///
/// The parser asks it for operator lexemes, priorities and the set of
/// arrow-function names; the compiler asks it which library implements each
/// name. It holds metadata only — implementations stay in the `Library`
/// values the engine keeps alongside it.
///
/// Once all libraries are installed the Model is read-only and can be shared
/// freely; installing more libraries after operand trees were compiled
/// leaves those trees bound to the implementations they were compiled with.
#[derive(Debug, Default)]
pub struct Model {
    operators: AHashMap<String, AHashMap<usize, OperatorMetadata>>,
    functions: AHashMap<String, FunctionMetadata>,
    enums: AHashMap<String, IndexMap<String, Value>>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts operator metadata into the nested `operators[name][arity]`
    /// table, replacing any previous record for the pair.
    pub fn add_operator(&mut self, name: impl Into<String>, arity: usize, metadata: OperatorMetadata) {
        self.operators.entry(name.into()).or_default().insert(arity, metadata);
    }

    pub fn add_function(&mut self, name: impl Into<String>, metadata: FunctionMetadata) {
        self.functions.insert(name.into(), metadata);
    }

    pub fn add_enum(&mut self, name: impl Into<String>, mapping: IndexMap<String, Value>) {
        self.enums.insert(name.into(), mapping);
    }

    /// Returns the metadata for `name` at `arity`.
    ///
    /// # Errors
    /// `ModelError::UnknownOperator` if the name or the arity is missing.
    pub fn operator_metadata(&self, name: &str, arity: usize) -> ModelResult<&OperatorMetadata> {
        self.operators
            .get(name)
            .and_then(|by_arity| by_arity.get(&arity))
            .ok_or_else(|| ModelError::UnknownOperator {
                name: name.to_owned(),
                arity,
            })
    }

    /// Returns the metadata for the function `name`.
    ///
    /// # Errors
    /// `ModelError::UnknownFunction` if the name is missing.
    pub fn function_metadata(&self, name: &str) -> ModelResult<&FunctionMetadata> {
        self.functions.get(name).ok_or_else(|| ModelError::UnknownFunction {
            name: name.to_owned(),
        })
    }

    /// Returns the operator's priority, the value precedence climbing in the
    /// parser is driven by.
    pub fn priority(&self, name: &str, arity: usize) -> ModelResult<i32> {
        Ok(self.operator_metadata(name, arity)?.priority)
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// True for a registered enum name, and for any `Name.option` where
    /// `Name` is a registered enum and `option` one of its keys.
    pub fn is_enum(&self, name: &str) -> bool {
        if let Some((enum_name, option)) = name.split_once('.') {
            self.enums
                .get(enum_name)
                .is_some_and(|mapping| mapping.contains_key(option))
        } else {
            self.enums.contains_key(name)
        }
    }

    /// Returns the full mapping of a registered enum.
    ///
    /// # Errors
    /// `ModelError::UnknownEnum` if the name is missing.
    pub fn get_enum(&self, name: &str) -> ModelResult<&IndexMap<String, Value>> {
        self.enums.get(name).ok_or_else(|| ModelError::UnknownEnum {
            name: name.to_owned(),
        })
    }

    /// Returns the value of one enum option.
    ///
    /// # Errors
    /// `ModelError::UnknownEnum` if the enum or the option is missing.
    pub fn get_enum_value(&self, name: &str, option: &str) -> ModelResult<&Value> {
        self.get_enum(name)?
            .get(option)
            .ok_or_else(|| ModelError::UnknownEnum {
                name: format!("{name}.{option}"),
            })
    }

    /// Iterates all registered operator names with their arity tables.
    /// Used by the parser to rebuild its lexeme tables after a library is
    /// installed.
    pub(crate) fn operators(&self) -> impl Iterator<Item = (&str, &AHashMap<usize, OperatorMetadata>)> {
        self.operators.iter().map(|(name, by_arity)| (name.as_str(), by_arity))
    }

    /// Iterates all registered function names with their metadata.
    pub(crate) fn functions(&self) -> impl Iterator<Item = (&str, &FunctionMetadata)> {
        self.functions.iter().map(|(name, md)| (name.as_str(), md))
    }
}
