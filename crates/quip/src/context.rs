use ahash::AHashMap;

use crate::value::Value;

/// Identifier of one scope inside a [`Context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

impl ScopeId {
    fn new(index: usize) -> Self {
        Self(index.try_into().expect("scope arena overflow"))
    }

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// The root scope, holding the caller-supplied bindings. Always index 0.
pub(crate) const ROOT_SCOPE: ScopeId = ScopeId(0);

#[derive(Debug, Default)]
struct Scope {
    vars: AHashMap<String, Value>,
    parent: Option<ScopeId>,
}

/// Lexically nested `name -> value` bindings threaded through evaluation.
///
/// All scopes live in one arena indexed by [`ScopeId`]; a child scope keeps
/// the id of its parent and delegates lookups for names it does not define.
/// Assignments write to the nearest defining scope, otherwise to the root,
/// so a plain `x = 1` at any depth creates a root binding unless some
/// enclosing scope already owns `x`.
///
/// The evaluator spawns a child scope around loop bodies and arrow-function
/// invocations and releases it when that operand finishes, on every exit
/// path. Released scopes go on a free list and are reused.
///
/// Dotted names (`order.total`) read and write through nested `Object`
/// values: the first segment resolves like a plain variable, the remaining
/// segments index into objects.
#[derive(Debug, Default)]
pub struct Context {
    scopes: Vec<Scope>,
    reuse_ids: Vec<ScopeId>,
}

impl Context {
    /// Creates a context holding only an empty root scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
            reuse_ids: Vec::new(),
        }
    }

    /// Binds a name directly in the root scope.
    ///
    /// The name is used verbatim as a key; use it to seed the variables an
    /// expression will read.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.scopes[ROOT_SCOPE.index()]
            .vars
            .insert(name.into(), value.into());
    }

    /// Reads a binding from the root scope, without delegation.
    /// Useful to inspect what an evaluation wrote.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.scopes[ROOT_SCOPE.index()].vars.get(name)
    }

    /// Creates a child scope delegating to `parent`.
    pub(crate) fn child(&mut self, parent: ScopeId) -> ScopeId {
        if let Some(reuse_id) = self.reuse_ids.pop() {
            let scope = &mut self.scopes[reuse_id.index()];
            scope.vars.clear();
            scope.parent = Some(parent);
            reuse_id
        } else {
            let id = ScopeId::new(self.scopes.len());
            self.scopes.push(Scope {
                vars: AHashMap::new(),
                parent: Some(parent),
            });
            id
        }
    }

    /// Releases a child scope for reuse. The root scope is never released.
    pub(crate) fn release(&mut self, id: ScopeId) {
        if id != ROOT_SCOPE {
            self.scopes[id.index()].vars.clear();
            self.reuse_ids.push(id);
        }
    }

    /// Binds a name directly in `scope`, shadowing any outer binding.
    /// Used for arrow-function parameters and `for in` loop variables.
    pub(crate) fn bind(&mut self, scope: ScopeId, name: &str, value: Value) {
        self.scopes[scope.index()].vars.insert(name.to_owned(), value);
    }

    /// Reads `path` starting from `scope`, delegating up the parent chain.
    /// Returns `None` when no scope in the chain defines the first segment
    /// or the remaining segments do not resolve through objects.
    pub(crate) fn read(&self, scope: ScopeId, path: &str) -> Option<&Value> {
        let (head, rest) = split_path(path);
        let owner = self.defining_scope(scope, head)?;
        let mut value = self.scopes[owner.index()].vars.get(head)?;
        for segment in rest {
            match value {
                Value::Object(entries) => value = entries.get(segment)?,
                _ => return None,
            }
        }
        Some(value)
    }

    /// Writes `path` from `scope`: the nearest scope defining the first
    /// segment receives the write, otherwise the root scope does. For
    /// dotted paths, intermediate objects are created as needed.
    pub(crate) fn write(&mut self, scope: ScopeId, path: &str, value: Value) {
        let (head, rest) = split_path(path);
        let owner = self.defining_scope(scope, head).unwrap_or(ROOT_SCOPE);
        let slot = self.scopes[owner.index()]
            .vars
            .entry(head.to_owned())
            .or_insert(Value::Null);
        let mut target = slot;
        for segment in rest {
            if !matches!(target, Value::Object(_)) {
                *target = Value::Object(indexmap::IndexMap::new());
            }
            let Value::Object(entries) = target else {
                unreachable!()
            };
            target = entries.entry(segment.to_owned()).or_insert(Value::Null);
        }
        *target = value;
    }

    /// Mutable access to the value at `path`, without creating anything.
    /// Used by index assignment (`a[i] = v`) to mutate in place.
    pub(crate) fn read_mut(&mut self, scope: ScopeId, path: &str) -> Option<&mut Value> {
        let (head, rest) = split_path(path);
        let owner = self.defining_scope(scope, head)?;
        let mut value = self.scopes[owner.index()].vars.get_mut(head)?;
        for segment in rest {
            match value {
                Value::Object(entries) => value = entries.get_mut(segment)?,
                _ => return None,
            }
        }
        Some(value)
    }

    /// Walks the parent chain from `scope` and returns the first scope that
    /// defines `name`.
    fn defining_scope(&self, scope: ScopeId, name: &str) -> Option<ScopeId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = &self.scopes[id.index()];
            if s.vars.contains_key(name) {
                return Some(id);
            }
            current = s.parent;
        }
        None
    }
}

impl FromIterator<(String, Value)> for Context {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut ctx = Self::new();
        for (name, value) in iter {
            ctx.insert(name, value);
        }
        ctx
    }
}

/// Splits a dotted path into its first segment and the rest.
fn split_path(path: &str) -> (&str, std::str::Split<'_, char>) {
    let mut segments = path.split('.');
    let head = segments.next().unwrap_or(path);
    (head, segments)
}
