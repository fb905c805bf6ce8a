//! The default standard library: arithmetic, comparison, logical, bitwise
//! and assignment operators, general-purpose functions, arrow-function
//! receivers and method resolvers.
//!
//! Everything here goes through the same [`Library`] registration surface a
//! host library would use; `Engine::new()` installs it, `Engine::empty()`
//! does not.

use crate::error::{EvalError, EvalResult};
use crate::eval::{normalize_index, Evaluator, Lambda};
use crate::library::{
    CustomOperator, FunctionEntry, Library, NativeFn, OperatorEntry,
};
use crate::model::{ArgSpec, Category, FunctionMetadata, OperatorMetadata};
use crate::operand::Operand;
use crate::value::{Value, ValueType};

/// Builds the core library.
pub fn corelib() -> Library {
    let mut lib = Library::new("core");

    // Binary operators. Priorities: higher binds tighter; assignment is the
    // loosest, exponentiation and indexing the tightest.
    lib.add_operator("+", 2, OperatorEntry::eager(add, binary(10, Category::Arithmetic)));
    lib.add_operator("-", 2, OperatorEntry::eager(sub, binary(10, Category::Arithmetic)));
    lib.add_operator("*", 2, OperatorEntry::eager(mul, binary(11, Category::Arithmetic)));
    lib.add_operator("/", 2, OperatorEntry::eager(div, binary(11, Category::Arithmetic)));
    lib.add_operator("%", 2, OperatorEntry::eager(rem, binary(11, Category::Arithmetic)));
    lib.add_operator("//", 2, OperatorEntry::eager(floor_div, binary(11, Category::Arithmetic)));
    lib.add_operator("**", 2, OperatorEntry::eager(pow, binary(12, Category::Arithmetic)));

    lib.add_operator("==", 2, OperatorEntry::eager(eq, comparison(4)));
    lib.add_operator("!=", 2, OperatorEntry::eager(ne, comparison(4)));
    lib.add_operator("<", 2, OperatorEntry::eager(lt, comparison(5)));
    lib.add_operator("<=", 2, OperatorEntry::eager(le, comparison(5)));
    lib.add_operator(">", 2, OperatorEntry::eager(gt, comparison(5)));
    lib.add_operator(">=", 2, OperatorEntry::eager(ge, comparison(5)));

    lib.add_operator("&&", 2, OperatorEntry::custom(and_factory, logical(3)));
    lib.add_operator("||", 2, OperatorEntry::custom(or_factory, logical(2)));

    lib.add_operator("|", 2, OperatorEntry::eager(bit_or, bitwise(6)));
    lib.add_operator("^", 2, OperatorEntry::eager(bit_xor, bitwise(7)));
    lib.add_operator("&", 2, OperatorEntry::eager(bit_and, bitwise(8)));
    lib.add_operator("<<", 2, OperatorEntry::eager(shl, bitwise(9)));
    lib.add_operator(">>", 2, OperatorEntry::eager(shr, bitwise(9)));

    lib.add_operator("[]", 2, OperatorEntry::eager(index, index_meta()));

    // Assignment family: `=` writes its right side through, the compound
    // forms wrap the matching base operator.
    lib.add_operator("=", 2, OperatorEntry::custom(assign_factory, assignment()));
    for (name, base) in [
        ("+=", add as NativeFn),
        ("-=", sub),
        ("*=", mul),
        ("/=", div),
        ("%=", rem),
        ("//=", floor_div),
        ("**=", pow),
        ("&=", bit_and),
        ("|=", bit_or),
        ("^=", bit_xor),
        ("<<=", shl),
        (">>=", shr),
    ] {
        lib.add_operator(name, 2, OperatorEntry::custom_with(assign_factory, base, assignment()));
    }

    // Unary prefixes.
    lib.add_operator("-", 1, OperatorEntry::eager(neg, unary(Category::Arithmetic)));
    lib.add_operator("!", 1, OperatorEntry::eager(logical_not, unary(Category::Logical)));
    lib.add_operator("~", 1, OperatorEntry::eager(bit_not, unary(Category::Bitwise)));

    // Numeric functions.
    lib.add_function("abs", FunctionEntry::plain(abs, func(&[("value", ValueType::Any)], ValueType::Any)));
    lib.add_function("ceil", FunctionEntry::plain(ceil, func(&[("value", ValueType::Float)], ValueType::Int)));
    lib.add_function("floor", FunctionEntry::plain(floor, func(&[("value", ValueType::Float)], ValueType::Int)));
    lib.add_function("round", FunctionEntry::plain(round, func(&[("value", ValueType::Float)], ValueType::Int)));
    lib.add_function("trunc", FunctionEntry::plain(trunc, func(&[("value", ValueType::Float)], ValueType::Int)));
    lib.add_function("sqrt", FunctionEntry::plain(sqrt, func(&[("value", ValueType::Float)], ValueType::Float)));
    lib.add_function("exp", FunctionEntry::plain(exp, func(&[("value", ValueType::Float)], ValueType::Float)));
    lib.add_function("ln", FunctionEntry::plain(ln, func(&[("value", ValueType::Float)], ValueType::Float)));
    lib.add_function("log", FunctionEntry::plain(log, func(&[("value", ValueType::Float)], ValueType::Float)));

    // String functions.
    lib.add_function("upper", FunctionEntry::plain(upper, func(&[("value", ValueType::String)], ValueType::String)));
    lib.add_function("lower", FunctionEntry::plain(lower, func(&[("value", ValueType::String)], ValueType::String)));
    lib.add_function("trim", FunctionEntry::plain(trim, func(&[("value", ValueType::String)], ValueType::String)));
    lib.add_function(
        "capitalize",
        FunctionEntry::plain(capitalize, func(&[("value", ValueType::String)], ValueType::String)),
    );
    lib.add_function(
        "replace",
        FunctionEntry::plain(
            replace,
            func(
                &[
                    ("value", ValueType::String),
                    ("from", ValueType::String),
                    ("to", ValueType::String),
                ],
                ValueType::String,
            ),
        ),
    );
    lib.add_function(
        "substring",
        FunctionEntry::plain(
            substring,
            func(
                &[
                    ("value", ValueType::String),
                    ("start", ValueType::Int),
                    ("length", ValueType::Int),
                ],
                ValueType::String,
            ),
        ),
    );
    lib.add_function(
        "startsWith",
        FunctionEntry::plain(
            starts_with,
            func(&[("value", ValueType::String), ("prefix", ValueType::String)], ValueType::Bool),
        ),
    );
    lib.add_function(
        "endsWith",
        FunctionEntry::plain(
            ends_with,
            func(&[("value", ValueType::String), ("suffix", ValueType::String)], ValueType::Bool),
        ),
    );

    // Collection and general functions.
    lib.add_function("length", FunctionEntry::plain(length, func(&[("value", ValueType::Any)], ValueType::Int)));
    lib.add_function("sum", FunctionEntry::plain(sum, func(&[("list", ValueType::Array)], ValueType::Any)));
    lib.add_function("avg", FunctionEntry::plain(avg, func(&[("list", ValueType::Array)], ValueType::Float)));
    lib.add_function("min", FunctionEntry::plain(min, func(&[("list", ValueType::Array)], ValueType::Any)));
    lib.add_function("max", FunctionEntry::plain(max, func(&[("list", ValueType::Array)], ValueType::Any)));
    lib.add_function(
        "contains",
        FunctionEntry::plain(
            contains,
            func(&[("container", ValueType::Any), ("item", ValueType::Any)], ValueType::Bool),
        ),
    );
    lib.add_function("keys", FunctionEntry::plain(keys, func(&[("object", ValueType::Object)], ValueType::Array)));
    lib.add_function("values", FunctionEntry::plain(values, func(&[("object", ValueType::Object)], ValueType::Array)));
    lib.add_function("toString", FunctionEntry::plain(to_string, func(&[("value", ValueType::Any)], ValueType::String)));
    lib.add_function("toNumber", FunctionEntry::plain(to_number, func(&[("value", ValueType::Any)], ValueType::Any)));
    lib.add_function("isNull", FunctionEntry::plain(is_null, func(&[("value", ValueType::Any)], ValueType::Bool)));

    // Arrow-function receivers.
    lib.add_function("map", FunctionEntry::arrow(map, func(&[("list", ValueType::Array)], ValueType::Array)));
    lib.add_function("filter", FunctionEntry::arrow(filter, func(&[("list", ValueType::Array)], ValueType::Array)));
    lib.add_function("foreach", FunctionEntry::arrow(foreach, func(&[("list", ValueType::Array)], ValueType::Null)));
    lib.add_function("first", FunctionEntry::arrow(first, func(&[("list", ValueType::Array)], ValueType::Any)));
    lib.add_function("last", FunctionEntry::arrow(last, func(&[("list", ValueType::Array)], ValueType::Any)));
    lib.add_function("sort", FunctionEntry::arrow(sort, func(&[("list", ValueType::Array)], ValueType::Array)));
    lib.add_function("any", FunctionEntry::arrow(any, func(&[("list", ValueType::Array)], ValueType::Bool)));
    lib.add_function("all", FunctionEntry::arrow(all, func(&[("list", ValueType::Array)], ValueType::Bool)));

    lib.add_method_resolver(core_methods);

    lib
}

// ---------------------------------------------------------------------------
// Metadata builders

fn binary(priority: i32, category: Category) -> OperatorMetadata {
    OperatorMetadata {
        priority,
        category,
        args: vec![
            ArgSpec::new("left", ValueType::Any),
            ArgSpec::new("right", ValueType::Any),
        ],
        return_type: ValueType::Any,
        lib: String::new(),
    }
}

fn comparison(priority: i32) -> OperatorMetadata {
    OperatorMetadata {
        return_type: ValueType::Bool,
        ..binary(priority, Category::Comparison)
    }
}

fn logical(priority: i32) -> OperatorMetadata {
    OperatorMetadata {
        args: vec![
            ArgSpec::new("left", ValueType::Bool),
            ArgSpec::new("right", ValueType::Bool),
        ],
        return_type: ValueType::Bool,
        ..binary(priority, Category::Logical)
    }
}

fn bitwise(priority: i32) -> OperatorMetadata {
    OperatorMetadata {
        args: vec![
            ArgSpec::new("left", ValueType::Int),
            ArgSpec::new("right", ValueType::Int),
        ],
        return_type: ValueType::Int,
        ..binary(priority, Category::Bitwise)
    }
}

fn assignment() -> OperatorMetadata {
    OperatorMetadata {
        args: vec![
            ArgSpec::new("target", ValueType::Any),
            ArgSpec::new("value", ValueType::Any),
        ],
        ..binary(1, Category::Assignment)
    }
}

fn index_meta() -> OperatorMetadata {
    OperatorMetadata {
        args: vec![
            ArgSpec::new("target", ValueType::Any),
            ArgSpec::new("index", ValueType::Any),
        ],
        ..binary(13, Category::Other)
    }
}

fn unary(category: Category) -> OperatorMetadata {
    OperatorMetadata {
        priority: 14,
        category,
        args: vec![ArgSpec::new("value", ValueType::Any)],
        return_type: ValueType::Any,
        lib: String::new(),
    }
}

fn func(args: &[(&str, ValueType)], return_type: ValueType) -> FunctionMetadata {
    FunctionMetadata {
        args: args.iter().map(|(name, ty)| ArgSpec::new(*name, *ty)).collect(),
        return_type,
        lib: String::new(),
        is_arrow_function: false,
    }
}

// ---------------------------------------------------------------------------
// Argument helpers

fn pair<'a>(op: &str, args: &'a [Value]) -> EvalResult<(&'a Value, &'a Value)> {
    match args {
        [left, right] => Ok((left, right)),
        _ => Err(EvalError::ArgumentCount {
            function: op.to_owned(),
            expected: 2,
            got: args.len(),
        }),
    }
}

fn single<'a>(op: &str, args: &'a [Value]) -> EvalResult<&'a Value> {
    match args {
        [value] => Ok(value),
        _ => Err(EvalError::ArgumentCount {
            function: op.to_owned(),
            expected: 1,
            got: args.len(),
        }),
    }
}

/// Both operands as integers or both as floats, with bools coercing to 0/1
/// and any float promoting the pair.
enum Numeric {
    Int(i64, i64),
    Float(f64, f64),
}

fn numeric(op: &str, left: &Value, right: &Value) -> EvalResult<Numeric> {
    if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
        return Ok(Numeric::Int(a, b));
    }
    match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) => Ok(Numeric::Float(a, b)),
        _ => Err(EvalError::TypeMismatch {
            operator: op.to_owned(),
            left: left.value_type(),
            right: right.value_type(),
        }),
    }
}

fn ints(op: &str, left: &Value, right: &Value) -> EvalResult<(i64, i64)> {
    match (left.as_int(), right.as_int()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(EvalError::TypeMismatch {
            operator: op.to_owned(),
            left: left.value_type(),
            right: right.value_type(),
        }),
    }
}

fn number_arg(function: &str, args: &[Value], index: usize) -> EvalResult<f64> {
    let value = args.get(index).ok_or_else(|| EvalError::ArgumentCount {
        function: function.to_owned(),
        expected: index + 1,
        got: args.len(),
    })?;
    value.as_number().ok_or_else(|| EvalError::ArgumentType {
        function: function.to_owned(),
        index,
        expected: ValueType::Float,
        got: value.value_type(),
    })
}

fn string_arg<'a>(function: &str, args: &'a [Value], index: usize) -> EvalResult<&'a str> {
    let value = args.get(index).ok_or_else(|| EvalError::ArgumentCount {
        function: function.to_owned(),
        expected: index + 1,
        got: args.len(),
    })?;
    value.as_str().ok_or_else(|| EvalError::ArgumentType {
        function: function.to_owned(),
        index,
        expected: ValueType::String,
        got: value.value_type(),
    })
}

fn array_arg<'a>(function: &str, args: &'a [Value], index: usize) -> EvalResult<&'a [Value]> {
    match args.get(index) {
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(EvalError::ArgumentType {
            function: function.to_owned(),
            index,
            expected: ValueType::Array,
            got: other.value_type(),
        }),
        None => Err(EvalError::ArgumentCount {
            function: function.to_owned(),
            expected: index + 1,
            got: args.len(),
        }),
    }
}

fn array_receiver(function: &str, receiver: Value) -> EvalResult<Vec<Value>> {
    match receiver {
        Value::Array(items) => Ok(items),
        other => Err(EvalError::ArgumentType {
            function: function.to_owned(),
            index: 0,
            expected: ValueType::Array,
            got: other.value_type(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Arithmetic operators

fn add(args: &[Value]) -> EvalResult<Value> {
    let (left, right) = pair("+", args)?;
    match (left, right) {
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
        (Value::Array(a), Value::Array(b)) => {
            let mut out = a.clone();
            out.extend(b.iter().cloned());
            Ok(Value::Array(out))
        }
        _ => match numeric("+", left, right)? {
            // checked first, falling back to float on overflow
            Numeric::Int(a, b) => Ok(match a.checked_add(b) {
                Some(v) => Value::Int(v),
                None => Value::Float(a as f64 + b as f64),
            }),
            Numeric::Float(a, b) => Ok(Value::Float(a + b)),
        },
    }
}

fn sub(args: &[Value]) -> EvalResult<Value> {
    let (left, right) = pair("-", args)?;
    match numeric("-", left, right)? {
        Numeric::Int(a, b) => Ok(match a.checked_sub(b) {
            Some(v) => Value::Int(v),
            None => Value::Float(a as f64 - b as f64),
        }),
        Numeric::Float(a, b) => Ok(Value::Float(a - b)),
    }
}

fn mul(args: &[Value]) -> EvalResult<Value> {
    let (left, right) = pair("*", args)?;
    match (left, right) {
        // string repetition: 'ab' * 3 or 3 * 'ab'
        (Value::String(s), Value::Int(n)) | (Value::Int(n), Value::String(s)) => {
            let count = usize::try_from(*n).unwrap_or(0);
            Ok(Value::String(s.repeat(count)))
        }
        _ => match numeric("*", left, right)? {
            Numeric::Int(a, b) => Ok(match a.checked_mul(b) {
                Some(v) => Value::Int(v),
                None => Value::Float(a as f64 * b as f64),
            }),
            Numeric::Float(a, b) => Ok(Value::Float(a * b)),
        },
    }
}

fn div(args: &[Value]) -> EvalResult<Value> {
    let (left, right) = pair("/", args)?;
    // true division always yields a float
    match numeric("/", left, right)? {
        Numeric::Int(_, 0) => Err(EvalError::DivisionByZero),
        Numeric::Int(a, b) => Ok(Value::Float(a as f64 / b as f64)),
        Numeric::Float(a, b) => {
            if b == 0.0 {
                Err(EvalError::DivisionByZero)
            } else {
                Ok(Value::Float(a / b))
            }
        }
    }
}

fn rem(args: &[Value]) -> EvalResult<Value> {
    let (left, right) = pair("%", args)?;
    match numeric("%", left, right)? {
        Numeric::Int(_, 0) => Err(EvalError::DivisionByZero),
        Numeric::Int(a, b) => Ok(Value::Int(a % b)),
        Numeric::Float(a, b) => {
            if b == 0.0 {
                Err(EvalError::DivisionByZero)
            } else {
                Ok(Value::Float(a % b))
            }
        }
    }
}

fn floor_div(args: &[Value]) -> EvalResult<Value> {
    let (left, right) = pair("//", args)?;
    match numeric("//", left, right)? {
        Numeric::Int(_, 0) => Err(EvalError::DivisionByZero),
        Numeric::Int(a, b) => {
            // rounds toward negative infinity, not toward zero
            let d = a / b;
            let r = a % b;
            let result = if r != 0 && (a < 0) != (b < 0) { d - 1 } else { d };
            Ok(Value::Int(result))
        }
        Numeric::Float(a, b) => {
            if b == 0.0 {
                Err(EvalError::DivisionByZero)
            } else {
                Ok(Value::Float((a / b).floor()))
            }
        }
    }
}

fn pow(args: &[Value]) -> EvalResult<Value> {
    let (left, right) = pair("**", args)?;
    match numeric("**", left, right)? {
        Numeric::Int(base, exp) => {
            if base == 0 && exp < 0 {
                return Err(EvalError::InvalidOperation {
                    operator: "**".to_owned(),
                    message: "zero cannot be raised to a negative power".to_owned(),
                });
            }
            if exp >= 0 {
                // integer result where it fits, float beyond
                let result = u32::try_from(exp).ok().and_then(|e| base.checked_pow(e));
                Ok(match result {
                    Some(v) => Value::Int(v),
                    None => Value::Float((base as f64).powf(exp as f64)),
                })
            } else {
                Ok(Value::Float((base as f64).powf(exp as f64)))
            }
        }
        Numeric::Float(base, exp) => {
            if base == 0.0 && exp < 0.0 {
                Err(EvalError::InvalidOperation {
                    operator: "**".to_owned(),
                    message: "zero cannot be raised to a negative power".to_owned(),
                })
            } else {
                Ok(Value::Float(base.powf(exp)))
            }
        }
    }
}

fn neg(args: &[Value]) -> EvalResult<Value> {
    let value = single("-", args)?;
    match value {
        Value::Int(v) => Ok(match v.checked_neg() {
            Some(n) => Value::Int(n),
            None => Value::Float(-(*v as f64)),
        }),
        Value::Float(v) => Ok(Value::Float(-v)),
        Value::Bool(b) => Ok(Value::Int(-i64::from(*b))),
        other => Err(EvalError::UnsupportedOperand {
            operator: "-".to_owned(),
            operand: other.value_type(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Comparison operators

fn eq(args: &[Value]) -> EvalResult<Value> {
    let (left, right) = pair("==", args)?;
    Ok(Value::Bool(left.loose_eq(right)))
}

fn ne(args: &[Value]) -> EvalResult<Value> {
    let (left, right) = pair("!=", args)?;
    Ok(Value::Bool(!left.loose_eq(right)))
}

fn ordering(op: &str, args: &[Value]) -> EvalResult<std::cmp::Ordering> {
    let (left, right) = pair(op, args)?;
    left.compare(right).ok_or_else(|| EvalError::TypeMismatch {
        operator: op.to_owned(),
        left: left.value_type(),
        right: right.value_type(),
    })
}

fn lt(args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Bool(ordering("<", args)?.is_lt()))
}

fn le(args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Bool(ordering("<=", args)?.is_le()))
}

fn gt(args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Bool(ordering(">", args)?.is_gt()))
}

fn ge(args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Bool(ordering(">=", args)?.is_ge()))
}

// ---------------------------------------------------------------------------
// Logical operators

fn logical_not(args: &[Value]) -> EvalResult<Value> {
    let value = single("!", args)?;
    Ok(Value::Bool(!value.is_truthy()))
}

/// Short-circuit `&&`: the right side is evaluated only when the left is
/// truthy; the deciding operand's value is the result.
#[derive(Debug)]
struct AndOperator;

impl CustomOperator for AndOperator {
    fn eval<'t, 'c>(&self, children: &'t [Operand], ev: &mut Evaluator<'t, 'c>) -> EvalResult<Value> {
        let [left, right] = children else {
            return Err(arity_error("&&", children.len()));
        };
        let value = ev.eval_value(left)?;
        if value.is_truthy() {
            ev.eval_value(right)
        } else {
            Ok(value)
        }
    }
}

/// Short-circuit `||`: the right side is evaluated only when the left is
/// falsy.
#[derive(Debug)]
struct OrOperator;

impl CustomOperator for OrOperator {
    fn eval<'t, 'c>(&self, children: &'t [Operand], ev: &mut Evaluator<'t, 'c>) -> EvalResult<Value> {
        let [left, right] = children else {
            return Err(arity_error("||", children.len()));
        };
        let value = ev.eval_value(left)?;
        if value.is_truthy() {
            Ok(value)
        } else {
            ev.eval_value(right)
        }
    }
}

fn and_factory(_name: &str, _base: Option<NativeFn>) -> Box<dyn CustomOperator> {
    Box::new(AndOperator)
}

fn or_factory(_name: &str, _base: Option<NativeFn>) -> Box<dyn CustomOperator> {
    Box::new(OrOperator)
}

fn arity_error(op: &str, got: usize) -> EvalError {
    EvalError::ArgumentCount {
        function: op.to_owned(),
        expected: 2,
        got,
    }
}

// ---------------------------------------------------------------------------
// Assignment operators

/// `=` and the compound family. The target child is never evaluated as an
/// expression: a variable target is written through the scope chain, an
/// index target (`a[i]`) mutates the container element in place. Compound
/// forms read the current value and apply the wrapped base operator first.
#[derive(Debug)]
struct AssignOperator {
    base: Option<NativeFn>,
}

impl CustomOperator for AssignOperator {
    fn eval<'t, 'c>(&self, children: &'t [Operand], ev: &mut Evaluator<'t, 'c>) -> EvalResult<Value> {
        let [target, expr] = children else {
            return Err(arity_error("=", children.len()));
        };
        let value = ev.eval_value(expr)?;
        match target {
            Operand::Variable(path) => {
                let value = match self.base {
                    Some(base) => base(&[ev.read_var(path), value])?,
                    None => value,
                };
                ev.write_var(path, value.clone());
                Ok(value)
            }
            Operand::Operator { name, children: index_children, .. } if name == "[]" => {
                let [Operand::Variable(path), index_expr] = index_children.as_slice() else {
                    return Err(EvalError::AssignTarget {
                        found: "index expression".to_owned(),
                    });
                };
                let idx = ev.eval_value(index_expr)?;
                let value = match self.base {
                    Some(base) => {
                        let current = index(&[ev.read_var(path), idx.clone()])?;
                        base(&[current, value])?
                    }
                    None => value,
                };
                ev.write_index(path, &idx, value.clone())?;
                Ok(value)
            }
            other => Err(EvalError::AssignTarget {
                found: other.kind().to_string(),
            }),
        }
    }
}

fn assign_factory(_name: &str, base: Option<NativeFn>) -> Box<dyn CustomOperator> {
    Box::new(AssignOperator { base })
}

// ---------------------------------------------------------------------------
// Bitwise operators

fn bit_and(args: &[Value]) -> EvalResult<Value> {
    let (left, right) = pair("&", args)?;
    let (a, b) = ints("&", left, right)?;
    Ok(Value::Int(a & b))
}

fn bit_or(args: &[Value]) -> EvalResult<Value> {
    let (left, right) = pair("|", args)?;
    let (a, b) = ints("|", left, right)?;
    Ok(Value::Int(a | b))
}

fn bit_xor(args: &[Value]) -> EvalResult<Value> {
    let (left, right) = pair("^", args)?;
    let (a, b) = ints("^", left, right)?;
    Ok(Value::Int(a ^ b))
}

fn shift_amount(op: &str, n: i64) -> EvalResult<u32> {
    u32::try_from(n).ok().filter(|v| *v < 64).ok_or_else(|| {
        EvalError::InvalidOperation {
            operator: op.to_owned(),
            message: format!("shift amount {n} out of range"),
        }
    })
}

fn shl(args: &[Value]) -> EvalResult<Value> {
    let (left, right) = pair("<<", args)?;
    let (a, b) = ints("<<", left, right)?;
    Ok(Value::Int(a << shift_amount("<<", b)?))
}

fn shr(args: &[Value]) -> EvalResult<Value> {
    let (left, right) = pair(">>", args)?;
    let (a, b) = ints(">>", left, right)?;
    Ok(Value::Int(a >> shift_amount(">>", b)?))
}

fn bit_not(args: &[Value]) -> EvalResult<Value> {
    let value = single("~", args)?;
    match value.as_int() {
        Some(v) => Ok(Value::Int(!v)),
        None => Err(EvalError::UnsupportedOperand {
            operator: "~".to_owned(),
            operand: value.value_type(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Indexing

fn index(args: &[Value]) -> EvalResult<Value> {
    let (target, idx) = pair("[]", args)?;
    match target {
        Value::Array(items) => {
            let i = normalize_index(items.len(), idx)?;
            Ok(items[i].clone())
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = normalize_index(chars.len(), idx)?;
            Ok(Value::String(chars[i].to_string()))
        }
        Value::Object(entries) => match idx {
            Value::String(key) => entries
                .get(key)
                .cloned()
                .ok_or_else(|| EvalError::KeyNotFound { key: key.clone() }),
            other => Err(EvalError::InvalidOperation {
                operator: "[]".to_owned(),
                message: format!("object index must be string, got {}", other.value_type()),
            }),
        },
        other => Err(EvalError::NotIndexable {
            target: other.value_type(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Numeric functions

fn abs(args: &[Value]) -> EvalResult<Value> {
    let value = single("abs", args)?;
    match value {
        Value::Int(v) => Ok(match v.checked_abs() {
            Some(n) => Value::Int(n),
            None => Value::Float((*v as f64).abs()),
        }),
        Value::Float(v) => Ok(Value::Float(v.abs())),
        other => Err(EvalError::ArgumentType {
            function: "abs".to_owned(),
            index: 0,
            expected: ValueType::Float,
            got: other.value_type(),
        }),
    }
}

fn ceil(args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Int(number_arg("ceil", args, 0)?.ceil() as i64))
}

fn floor(args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Int(number_arg("floor", args, 0)?.floor() as i64))
}

fn round(args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Int(number_arg("round", args, 0)?.round() as i64))
}

fn trunc(args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Int(number_arg("trunc", args, 0)?.trunc() as i64))
}

fn sqrt(args: &[Value]) -> EvalResult<Value> {
    let v = number_arg("sqrt", args, 0)?;
    if v < 0.0 {
        return Err(EvalError::InvalidOperation {
            operator: "sqrt".to_owned(),
            message: "negative argument".to_owned(),
        });
    }
    Ok(Value::Float(v.sqrt()))
}

fn exp(args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Float(number_arg("exp", args, 0)?.exp()))
}

fn ln(args: &[Value]) -> EvalResult<Value> {
    let v = number_arg("ln", args, 0)?;
    if v <= 0.0 {
        return Err(EvalError::InvalidOperation {
            operator: "ln".to_owned(),
            message: "argument must be positive".to_owned(),
        });
    }
    Ok(Value::Float(v.ln()))
}

fn log(args: &[Value]) -> EvalResult<Value> {
    let v = number_arg("log", args, 0)?;
    if v <= 0.0 {
        return Err(EvalError::InvalidOperation {
            operator: "log".to_owned(),
            message: "argument must be positive".to_owned(),
        });
    }
    Ok(Value::Float(v.log10()))
}

// ---------------------------------------------------------------------------
// String functions

fn upper(args: &[Value]) -> EvalResult<Value> {
    Ok(Value::String(string_arg("upper", args, 0)?.to_uppercase()))
}

fn lower(args: &[Value]) -> EvalResult<Value> {
    Ok(Value::String(string_arg("lower", args, 0)?.to_lowercase()))
}

fn trim(args: &[Value]) -> EvalResult<Value> {
    Ok(Value::String(string_arg("trim", args, 0)?.trim().to_owned()))
}

fn capitalize(args: &[Value]) -> EvalResult<Value> {
    let s = string_arg("capitalize", args, 0)?;
    let mut chars = s.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    };
    Ok(Value::String(capitalized))
}

fn replace(args: &[Value]) -> EvalResult<Value> {
    let s = string_arg("replace", args, 0)?;
    let from = string_arg("replace", args, 1)?;
    let to = string_arg("replace", args, 2)?;
    Ok(Value::String(s.replace(from, to)))
}

fn substring(args: &[Value]) -> EvalResult<Value> {
    let s = string_arg("substring", args, 0)?;
    let start = number_arg("substring", args, 1)? as usize;
    let chars: Vec<char> = s.chars().collect();
    let start = start.min(chars.len());
    let end = if args.len() > 2 {
        (start + number_arg("substring", args, 2)? as usize).min(chars.len())
    } else {
        chars.len()
    };
    Ok(Value::String(chars[start..end].iter().collect()))
}

fn starts_with(args: &[Value]) -> EvalResult<Value> {
    let s = string_arg("startsWith", args, 0)?;
    let prefix = string_arg("startsWith", args, 1)?;
    Ok(Value::Bool(s.starts_with(prefix)))
}

fn ends_with(args: &[Value]) -> EvalResult<Value> {
    let s = string_arg("endsWith", args, 0)?;
    let suffix = string_arg("endsWith", args, 1)?;
    Ok(Value::Bool(s.ends_with(suffix)))
}

// ---------------------------------------------------------------------------
// Collection and general functions

fn length(args: &[Value]) -> EvalResult<Value> {
    let value = single("length", args)?;
    let len = match value {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(entries) => entries.len(),
        other => {
            return Err(EvalError::ArgumentType {
                function: "length".to_owned(),
                index: 0,
                expected: ValueType::Array,
                got: other.value_type(),
            })
        }
    };
    Ok(Value::Int(len as i64))
}

fn sum(args: &[Value]) -> EvalResult<Value> {
    let items = array_arg("sum", args, 0)?;
    let mut acc = Value::Int(0);
    for item in items {
        acc = add(&[acc, item.clone()])?;
    }
    Ok(acc)
}

fn avg(args: &[Value]) -> EvalResult<Value> {
    let items = array_arg("avg", args, 0)?;
    if items.is_empty() {
        return Err(EvalError::InvalidOperation {
            operator: "avg".to_owned(),
            message: "empty list".to_owned(),
        });
    }
    let total = sum(args)?;
    div(&[total, Value::Int(items.len() as i64)])
}

fn extremum(function: &str, args: &[Value], keep_left: fn(std::cmp::Ordering) -> bool) -> EvalResult<Value> {
    let items = array_arg(function, args, 0)?;
    let mut best: Option<&Value> = None;
    for item in items {
        best = match best {
            None => Some(item),
            Some(current) => {
                let ord = current.compare(item).ok_or_else(|| EvalError::TypeMismatch {
                    operator: function.to_owned(),
                    left: current.value_type(),
                    right: item.value_type(),
                })?;
                if keep_left(ord) {
                    Some(current)
                } else {
                    Some(item)
                }
            }
        };
    }
    Ok(best.cloned().unwrap_or(Value::Null))
}

fn min(args: &[Value]) -> EvalResult<Value> {
    extremum("min", args, std::cmp::Ordering::is_le)
}

fn max(args: &[Value]) -> EvalResult<Value> {
    extremum("max", args, std::cmp::Ordering::is_ge)
}

fn contains(args: &[Value]) -> EvalResult<Value> {
    let (container, item) = pair("contains", args)?;
    let found = match (container, item) {
        (Value::String(s), Value::String(needle)) => s.contains(needle.as_str()),
        (Value::Array(items), needle) => items.iter().any(|v| v.loose_eq(needle)),
        (Value::Object(entries), Value::String(key)) => entries.contains_key(key),
        _ => false,
    };
    Ok(Value::Bool(found))
}

fn keys(args: &[Value]) -> EvalResult<Value> {
    match single("keys", args)? {
        Value::Object(entries) => Ok(entries.keys().cloned().map(Value::String).collect()),
        other => Err(EvalError::ArgumentType {
            function: "keys".to_owned(),
            index: 0,
            expected: ValueType::Object,
            got: other.value_type(),
        }),
    }
}

fn values(args: &[Value]) -> EvalResult<Value> {
    match single("values", args)? {
        Value::Object(entries) => Ok(entries.values().cloned().collect()),
        other => Err(EvalError::ArgumentType {
            function: "values".to_owned(),
            index: 0,
            expected: ValueType::Object,
            got: other.value_type(),
        }),
    }
}

fn to_string(args: &[Value]) -> EvalResult<Value> {
    Ok(Value::String(single("toString", args)?.to_string()))
}

fn to_number(args: &[Value]) -> EvalResult<Value> {
    let value = single("toNumber", args)?;
    match value {
        Value::Int(_) | Value::Float(_) => Ok(value.clone()),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::String(s) => {
            if let Ok(n) = s.parse::<i64>() {
                Ok(Value::Int(n))
            } else if let Ok(f) = s.parse::<f64>() {
                Ok(Value::Float(f))
            } else {
                Err(EvalError::ArgumentType {
                    function: "toNumber".to_owned(),
                    index: 0,
                    expected: ValueType::Float,
                    got: ValueType::String,
                })
            }
        }
        other => Err(EvalError::ArgumentType {
            function: "toNumber".to_owned(),
            index: 0,
            expected: ValueType::Float,
            got: other.value_type(),
        }),
    }
}

fn is_null(args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Bool(matches!(single("isNull", args)?, Value::Null)))
}

// ---------------------------------------------------------------------------
// Arrow-function receivers

fn map(receiver: Value, mut lambda: Lambda<'_, '_, '_>) -> EvalResult<Value> {
    let items = array_receiver("map", receiver)?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        out.push(lambda.invoke(item)?);
    }
    Ok(Value::Array(out))
}

fn filter(receiver: Value, mut lambda: Lambda<'_, '_, '_>) -> EvalResult<Value> {
    let items = array_receiver("filter", receiver)?;
    let mut out = Vec::new();
    for item in items {
        if lambda.invoke(item.clone())?.is_truthy() {
            out.push(item);
        }
    }
    Ok(Value::Array(out))
}

fn foreach(receiver: Value, mut lambda: Lambda<'_, '_, '_>) -> EvalResult<Value> {
    let items = array_receiver("foreach", receiver)?;
    for item in items {
        lambda.invoke(item)?;
    }
    Ok(Value::Null)
}

fn first(receiver: Value, mut lambda: Lambda<'_, '_, '_>) -> EvalResult<Value> {
    let items = array_receiver("first", receiver)?;
    if !lambda.has_body() {
        return Ok(items.into_iter().next().unwrap_or(Value::Null));
    }
    for item in items {
        if lambda.invoke(item.clone())?.is_truthy() {
            return Ok(item);
        }
    }
    Ok(Value::Null)
}

fn last(receiver: Value, mut lambda: Lambda<'_, '_, '_>) -> EvalResult<Value> {
    let items = array_receiver("last", receiver)?;
    if !lambda.has_body() {
        return Ok(items.into_iter().next_back().unwrap_or(Value::Null));
    }
    for item in items.into_iter().rev() {
        if lambda.invoke(item.clone())?.is_truthy() {
            return Ok(item);
        }
    }
    Ok(Value::Null)
}

fn sort(receiver: Value, mut lambda: Lambda<'_, '_, '_>) -> EvalResult<Value> {
    let items = array_receiver("sort", receiver)?;
    // decorate with sort keys (the item itself for a lambda-less call)
    let mut pairs = Vec::with_capacity(items.len());
    for item in items {
        let key = lambda.invoke(item.clone())?;
        pairs.push((key, item));
    }
    pairs.sort_by(|a, b| a.0.compare(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    Ok(Value::Array(pairs.into_iter().map(|(_, item)| item).collect()))
}

fn any(receiver: Value, mut lambda: Lambda<'_, '_, '_>) -> EvalResult<Value> {
    let items = array_receiver("any", receiver)?;
    for item in items {
        if lambda.invoke(item)?.is_truthy() {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn all(receiver: Value, mut lambda: Lambda<'_, '_, '_>) -> EvalResult<Value> {
    let items = array_receiver("all", receiver)?;
    for item in items {
        if !lambda.invoke(item)?.is_truthy() {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

// ---------------------------------------------------------------------------
// Method resolvers

/// Dynamic dispatch for unregistered method names on core receivers.
fn core_methods(receiver: &Value, name: &str, args: &[Value]) -> Option<EvalResult<Value>> {
    match (receiver, name) {
        (Value::String(s), "split") => Some(split_method(s, args)),
        (Value::String(s), "indexOf") => Some(index_of_string(s, args)),
        (Value::Array(items), "indexOf") => Some(index_of_array(items, args)),
        (Value::Array(items), "join") => Some(join_method(items, args)),
        (Value::Array(items), "reverse") => {
            let mut out = items.clone();
            out.reverse();
            Some(Ok(Value::Array(out)))
        }
        _ => None,
    }
}

fn split_method(s: &str, args: &[Value]) -> EvalResult<Value> {
    let sep = string_arg("split", args, 0)?;
    Ok(s.split(sep).map(Value::from).collect())
}

fn index_of_string(s: &str, args: &[Value]) -> EvalResult<Value> {
    let needle = string_arg("indexOf", args, 0)?;
    // position in characters, not bytes
    let found = s.find(needle).map(|byte| s[..byte].chars().count() as i64);
    Ok(Value::Int(found.unwrap_or(-1)))
}

fn index_of_array(items: &[Value], args: &[Value]) -> EvalResult<Value> {
    let needle = single("indexOf", args)?;
    let found = items.iter().position(|v| v.loose_eq(needle));
    Ok(Value::Int(found.map_or(-1, |i| i as i64)))
}

fn join_method(items: &[Value], args: &[Value]) -> EvalResult<Value> {
    let sep = string_arg("join", args, 0)?;
    let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
    Ok(Value::String(parts.join(sep)))
}
