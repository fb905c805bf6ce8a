use indexmap::IndexMap;

use crate::context::{Context, ScopeId, ROOT_SCOPE};
use crate::error::{EvalError, EvalResult};
use crate::library::MethodResolver;
use crate::operand::{Binding, Operand};
use crate::value::Value;

/// Result of evaluating one operand: either a value, or a control-flow
/// sentinel on its way to the enclosing loop or block.
///
/// Sentinels are values, not errors. Loops consume `Break` and `Continue`;
/// `Return` unwinds all the way out of the tree.
#[derive(Debug)]
pub(crate) enum Flow {
    Value(Value),
    Break,
    Continue,
    Return(Value),
}

impl Flow {
    /// Collapses a flow into a plain value, for positions where sentinels
    /// have nothing left to unwind through.
    fn into_value(self) -> Value {
        match self {
            Self::Value(v) | Self::Return(v) => v,
            Self::Break | Self::Continue => Value::Null,
        }
    }
}

/// Executes a compiled operand tree against a [`Context`].
///
/// The evaluator is the frame of one run: it tracks the current scope and
/// spawns/releases child scopes around loop bodies and lambda invocations,
/// on every exit path. Custom operators receive it to evaluate (or skip)
/// their children and to read and write variables.
#[derive(Debug)]
pub struct Evaluator<'t, 'c> {
    resolvers: &'t [MethodResolver],
    ctx: &'c mut Context,
    scope: ScopeId,
}

impl<'t, 'c> Evaluator<'t, 'c> {
    pub(crate) fn new(resolvers: &'t [MethodResolver], ctx: &'c mut Context) -> Self {
        Self {
            resolvers,
            ctx,
            scope: ROOT_SCOPE,
        }
    }

    /// Evaluates one operand to a plain value.
    ///
    /// This is the entry point custom operators and arrow functions use on
    /// the children handed to them.
    pub fn eval_value(&mut self, op: &'t Operand) -> EvalResult<Value> {
        Ok(self.eval_flow(op)?.into_value())
    }

    /// Reads a (possibly dotted) variable from the current scope chain.
    /// Unknown names read as `Null`.
    pub fn read_var(&self, path: &str) -> Value {
        self.ctx.read(self.scope, path).cloned().unwrap_or(Value::Null)
    }

    /// Writes a variable: the nearest scope defining the name receives the
    /// write, otherwise the root scope does.
    pub fn write_var(&mut self, path: &str, value: Value) {
        self.ctx.write(self.scope, path, value);
    }

    /// Writes one element of an array or object variable in place.
    ///
    /// # Errors
    /// Fails when the variable does not exist, is not a container, or the
    /// index is invalid for it.
    pub fn write_index(&mut self, path: &str, index: &Value, value: Value) -> EvalResult<()> {
        let Some(target) = self.ctx.read_mut(self.scope, path) else {
            return Err(EvalError::KeyNotFound { key: path.to_owned() });
        };
        match (target, index) {
            (Value::Array(items), idx) => {
                let i = normalize_index(items.len(), idx)?;
                items[i] = value;
                Ok(())
            }
            (Value::Object(entries), Value::String(key)) => {
                entries.insert(key.clone(), value);
                Ok(())
            }
            (other, _) => Err(EvalError::NotIndexable {
                target: other.value_type(),
            }),
        }
    }

    fn eval_args(&mut self, children: &'t [Operand]) -> EvalResult<Vec<Value>> {
        let mut args = Vec::with_capacity(children.len());
        for child in children {
            args.push(self.eval_value(child)?);
        }
        Ok(args)
    }

    fn enter_scope(&mut self) -> ScopeId {
        let child = self.ctx.child(self.scope);
        std::mem::replace(&mut self.scope, child)
    }

    fn exit_scope(&mut self, saved: ScopeId) {
        let child = std::mem::replace(&mut self.scope, saved);
        self.ctx.release(child);
    }

    pub(crate) fn eval_flow(&mut self, op: &'t Operand) -> EvalResult<Flow> {
        match op {
            Operand::Constant(value) => Ok(Flow::Value(value.clone())),
            Operand::Variable(name) => Ok(Flow::Value(self.read_var(name))),
            Operand::KeyValue { children, .. } => {
                let value = match children.first() {
                    Some(child) => self.eval_value(child)?,
                    None => Value::Null,
                };
                Ok(Flow::Value(value))
            }
            Operand::Array { children } => {
                let items = self.eval_args(children)?;
                Ok(Flow::Value(Value::Array(items)))
            }
            Operand::Object { children } => {
                let mut entries = IndexMap::with_capacity(children.len());
                for child in children {
                    if let Operand::KeyValue { key, children } = child {
                        let value = match children.first() {
                            Some(vc) => self.eval_value(vc)?,
                            None => Value::Null,
                        };
                        entries.insert(key.clone(), value);
                    }
                }
                Ok(Flow::Value(Value::Object(entries)))
            }
            Operand::Operator { children, binding, .. } => match binding {
                Binding::Eager(function) => {
                    let args = self.eval_args(children)?;
                    Ok(Flow::Value(function(&args)?))
                }
                Binding::Custom(custom) => Ok(Flow::Value(custom.eval(children, self)?)),
            },
            Operand::Function { children, function, .. } => {
                let args = self.eval_args(children)?;
                Ok(Flow::Value(function(&args)?))
            }
            Operand::ArrowFunction { children, function, .. } => {
                let receiver = match children.first() {
                    Some(r) => self.eval_value(r)?,
                    None => Value::Null,
                };
                let param = match children.get(1) {
                    Some(Operand::Variable(name)) => Some(name.as_str()),
                    _ => None,
                };
                let body = children.get(2);
                let lambda = Lambda {
                    ev: self,
                    param,
                    body,
                };
                Ok(Flow::Value(function(receiver, lambda)?))
            }
            Operand::ContextFunction { name, children } => {
                let receiver = match children.first() {
                    Some(r) => self.eval_value(r)?,
                    None => Value::Null,
                };
                let args = self.eval_args(children.get(1..).unwrap_or(&[]))?;
                let resolvers = self.resolvers;
                for resolver in resolvers {
                    if let Some(result) = resolver(&receiver, name, &args) {
                        return Ok(Flow::Value(result?));
                    }
                }
                Err(EvalError::UnknownMethod {
                    name: name.clone(),
                    receiver: receiver.value_type(),
                })
            }
            Operand::Block { children } => {
                let mut last = Value::Null;
                for child in children {
                    match self.eval_flow(child)? {
                        Flow::Value(v) => last = v,
                        flow => return Ok(flow),
                    }
                }
                Ok(Flow::Value(last))
            }
            Operand::If { children } => self.eval_if(children),
            Operand::While { children } => self.eval_while(children),
            Operand::For { children } => self.eval_for(children),
            Operand::ForIn { children } => self.eval_for_in(children),
            Operand::Switch { children } => self.eval_switch(children),
            // Branch containers are normally consumed by their parent; when
            // evaluated standalone they behave like their own block.
            Operand::Elif { children } => {
                if let [condition, block] = children.as_slice() {
                    if self.eval_value(condition)?.is_truthy() {
                        return self.eval_flow(block);
                    }
                }
                Ok(Flow::Value(Value::Null))
            }
            Operand::Else { children }
            | Operand::Case { children, .. }
            | Operand::Default { children } => match children.first() {
                Some(block) => self.eval_flow(block),
                None => Ok(Flow::Value(Value::Null)),
            },
            Operand::Options { .. } => Ok(Flow::Value(Value::Null)),
            Operand::Break => Ok(Flow::Break),
            Operand::Continue => Ok(Flow::Continue),
            Operand::Return => Ok(Flow::Return(Value::Null)),
        }
    }

    fn eval_if(&mut self, children: &'t [Operand]) -> EvalResult<Flow> {
        let [condition, then, rest @ ..] = children else {
            return Ok(Flow::Value(Value::Null));
        };
        if self.eval_value(condition)?.is_truthy() {
            return self.eval_flow(then);
        }
        for branch in rest {
            match branch {
                Operand::Elif { children } => {
                    if let [cond, block] = children.as_slice() {
                        if self.eval_value(cond)?.is_truthy() {
                            return self.eval_flow(block);
                        }
                    }
                }
                Operand::Else { children } => {
                    if let Some(block) = children.first() {
                        return self.eval_flow(block);
                    }
                }
                _ => {}
            }
        }
        Ok(Flow::Value(Value::Null))
    }

    fn eval_while(&mut self, children: &'t [Operand]) -> EvalResult<Flow> {
        let [condition, body] = children else {
            return Ok(Flow::Value(Value::Null));
        };
        let saved = self.enter_scope();
        let result = self.while_loop(condition, body);
        self.exit_scope(saved);
        result
    }

    fn while_loop(&mut self, condition: &'t Operand, body: &'t Operand) -> EvalResult<Flow> {
        let mut last = Value::Null;
        while self.eval_value(condition)?.is_truthy() {
            match self.eval_flow(body)? {
                Flow::Value(v) => last = v,
                Flow::Break => break,
                Flow::Continue => continue,
                ret @ Flow::Return(_) => return Ok(ret),
            }
        }
        Ok(Flow::Value(last))
    }

    fn eval_for(&mut self, children: &'t [Operand]) -> EvalResult<Flow> {
        let [init, condition, step, body] = children else {
            return Ok(Flow::Value(Value::Null));
        };
        let saved = self.enter_scope();
        let result = self.for_loop(init, condition, step, body);
        self.exit_scope(saved);
        result
    }

    fn for_loop(
        &mut self,
        init: &'t Operand,
        condition: &'t Operand,
        step: &'t Operand,
        body: &'t Operand,
    ) -> EvalResult<Flow> {
        self.eval_value(init)?;
        let mut last = Value::Null;
        while self.eval_value(condition)?.is_truthy() {
            match self.eval_flow(body)? {
                Flow::Value(v) => last = v,
                Flow::Break => break,
                Flow::Continue => {
                    self.eval_value(step)?;
                    continue;
                }
                ret @ Flow::Return(_) => return Ok(ret),
            }
            self.eval_value(step)?;
        }
        Ok(Flow::Value(last))
    }

    fn eval_for_in(&mut self, children: &'t [Operand]) -> EvalResult<Flow> {
        let [variable, iterable, body] = children else {
            return Ok(Flow::Value(Value::Null));
        };
        let Operand::Variable(name) = variable else {
            return Err(EvalError::AssignTarget {
                found: variable.kind().to_string(),
            });
        };
        let items: Vec<Value> = match self.eval_value(iterable)? {
            Value::Array(items) => items,
            Value::Object(entries) => entries.into_keys().map(Value::String).collect(),
            Value::String(s) => s.chars().map(|c| Value::String(c.to_string())).collect(),
            other => {
                return Err(EvalError::NotIterable {
                    target: other.value_type(),
                })
            }
        };
        let mut last = Value::Null;
        for item in items {
            let saved = self.enter_scope();
            self.ctx.bind(self.scope, name, item);
            let flow = self.eval_flow(body);
            self.exit_scope(saved);
            match flow? {
                Flow::Value(v) => last = v,
                Flow::Break => break,
                Flow::Continue => continue,
                ret @ Flow::Return(_) => return Ok(ret),
            }
        }
        Ok(Flow::Value(last))
    }

    fn eval_switch(&mut self, children: &'t [Operand]) -> EvalResult<Flow> {
        let [discriminant, options] = children else {
            return Ok(Flow::Value(Value::Null));
        };
        let value = self.eval_value(discriminant)?;
        let Operand::Options { children: options } = options else {
            return Ok(Flow::Value(Value::Null));
        };
        let mut default_block = None;
        for option in options {
            match option {
                Operand::Case { label, children } => {
                    if label.loose_eq(&value) {
                        return match children.first() {
                            Some(block) => self.eval_flow(block),
                            None => Ok(Flow::Value(Value::Null)),
                        };
                    }
                }
                Operand::Default { children } => default_block = children.first(),
                _ => {}
            }
        }
        match default_block {
            Some(block) => self.eval_flow(block),
            None => Ok(Flow::Value(Value::Null)),
        }
    }
}

/// The lambda of an arrow-function call, handed to the registered receiver
/// implementation.
///
/// Each `invoke` runs the body once in a fresh child scope with the
/// parameter bound to `item`, so the parameter shadows outer bindings and
/// nothing leaks out. A lambda-less call (`xs.sort()`) has no body and
/// `invoke` returns the item unchanged.
#[derive(Debug)]
pub struct Lambda<'e, 't, 'c> {
    ev: &'e mut Evaluator<'t, 'c>,
    param: Option<&'t str>,
    body: Option<&'t Operand>,
}

impl Lambda<'_, '_, '_> {
    /// Whether the call site supplied an `x => body` lambda.
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Runs the lambda body for one element and returns its value.
    pub fn invoke(&mut self, item: Value) -> EvalResult<Value> {
        let Some(body) = self.body else {
            return Ok(item);
        };
        let saved = self.ev.enter_scope();
        if let Some(param) = self.param {
            self.ev.ctx.bind(self.ev.scope, param, item);
        }
        let result = self.ev.eval_value(body);
        self.ev.exit_scope(saved);
        result
    }
}

/// Resolves a (possibly negative) index against a container length.
pub(crate) fn normalize_index(len: usize, index: &Value) -> EvalResult<usize> {
    let Some(i) = index.as_int() else {
        return Err(EvalError::InvalidOperation {
            operator: "[]".to_owned(),
            message: format!("index must be int, got {}", index.value_type()),
        });
    };
    let adjusted = if i < 0 { i + len as i64 } else { i };
    if adjusted < 0 || adjusted as usize >= len {
        return Err(EvalError::IndexOutOfRange { index: i, len });
    }
    Ok(adjusted as usize)
}
