use ahash::AHashSet;

use crate::error::{ParseError, ParseResult};
use crate::model::Model;
use crate::node::{Node, NodeKind};
use crate::value::Value;

/// Lexing tables derived from the Model.
///
/// The parser carries no hard-coded operator table: which 2- and 3-character
/// lexemes exist, and which function names take a lambda, is entirely decided
/// by what the installed libraries registered. Rebuilt by the engine after
/// every library installation.
#[derive(Debug, Default)]
pub(crate) struct ParserTables {
    double_operators: AHashSet<String>,
    triple_operators: AHashSet<String>,
    arrow_functions: AHashSet<String>,
}

impl ParserTables {
    pub fn refresh(model: &Model) -> Self {
        let mut tables = Self::default();
        for (name, _) in model.operators() {
            match name.chars().count() {
                2 => {
                    tables.double_operators.insert(name.to_owned());
                }
                3 => {
                    tables.triple_operators.insert(name.to_owned());
                }
                _ => {}
            }
        }
        for (name, metadata) in model.functions() {
            if metadata.is_arrow_function {
                tables.arrow_functions.insert(name.to_owned());
            }
        }
        tables
    }
}

/// Recursive-descent parser producing a [`Node`] tree from source text.
///
/// Parsing is two steps: `minify` strips whitespace outside string literals
/// (keeping a single separator between adjacent word characters, so `for(x
/// in xs)` and `else if` survive), then a cursor walks the character buffer
/// with single-token lookahead, climbing operator precedence as it goes.
#[derive(Debug)]
pub(crate) struct Parser<'a> {
    model: &'a Model,
    tables: &'a ParserTables,
}

impl<'a> Parser<'a> {
    pub fn new(model: &'a Model, tables: &'a ParserTables) -> Self {
        Self { model, tables }
    }

    pub fn parse(&self, expression: &str) -> ParseResult<Node> {
        let buffer = minify(expression);
        Cursor {
            mgr: self,
            buffer,
            index: 0,
        }
        .parse()
    }
}

/// Strips whitespace outside string literals.
///
/// A single space is kept where both neighbors are word characters, because
/// collapsing `x in xs` to `xinxs` would merge the tokens; everywhere else
/// whitespace carries no information and is dropped.
pub(crate) fn minify(expression: &str) -> Vec<char> {
    let chars: Vec<char> = expression.chars().collect();
    let mut out: Vec<char> = Vec::with_capacity(chars.len());
    let mut quote = ' ';
    let mut in_string = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if in_string {
            if c == quote {
                in_string = false;
            }
            out.push(c);
        } else if c == '\'' || c == '"' {
            in_string = true;
            quote = c;
            out.push(c);
        } else if c.is_whitespace() {
            let mut j = i;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            let prev_word = out.last().copied().is_some_and(is_word);
            let next_word = j < chars.len() && is_word(chars[j]);
            if prev_word && next_word {
                out.push(' ');
            }
            i = j;
            continue;
        } else {
            out.push(c);
        }
        i += 1;
    }
    out
}

fn is_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_ident(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// True when `op` ends the current subexpression: either the synthetic
/// space separator, or a single-character operator listed in the break set.
fn terminates(op: &str, brk: &str) -> bool {
    op == " " || (op.chars().count() == 1 && brk.contains(op))
}

fn operator_node(name: String, children: Vec<Node>) -> Node {
    Node::with_children(name, NodeKind::Operator, children)
}

/// Converts a bare (unquoted) switch case label into a typed literal, so
/// `case 1:` matches an integer discriminant under value equality.
fn case_label(text: String) -> Value {
    match text.as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(n) = text.parse::<i64>() {
        return Value::Int(n);
    }
    if text.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        if let Ok(f) = text.parse::<f64>() {
            return Value::Float(f);
        }
    }
    Value::String(text)
}

/// The per-parse cursor over the minified character buffer.
struct Cursor<'p, 'a> {
    mgr: &'p Parser<'a>,
    buffer: Vec<char>,
    index: usize,
}

impl Cursor<'_, '_> {
    fn parse(&mut self) -> ParseResult<Node> {
        let mut nodes = Vec::new();
        while !self.end() {
            let Some(node) = self.get_expression(None, None, ";")? else {
                break;
            };
            nodes.push(node);
        }
        if nodes.len() == 1 {
            Ok(nodes.remove(0))
        } else {
            Ok(Node::with_children("block", NodeKind::Block, nodes))
        }
    }

    fn end(&self) -> bool {
        self.index >= self.buffer.len()
    }

    fn current(&self) -> Option<char> {
        self.buffer.get(self.index).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.buffer.get(self.index + 1).copied()
    }

    fn previous(&self) -> Option<char> {
        self.index.checked_sub(1).and_then(|i| self.buffer.get(i)).copied()
    }

    fn bump(&mut self) {
        self.index += 1;
    }

    fn advance(&mut self, n: usize) {
        self.index += n;
    }

    fn skip_spaces(&mut self) {
        while self.current() == Some(' ') {
            self.bump();
        }
    }

    /// Lookahead comparison against a literal, without consuming.
    fn next_is(&self, key: &str) -> bool {
        let mut i = self.index;
        for c in key.chars() {
            if self.buffer.get(i) != Some(&c) {
                return false;
            }
            i += 1;
        }
        true
    }

    /// The error for "something should be here and is not": the current
    /// character when there is one, end-of-input otherwise.
    fn unexpected(&self) -> ParseError {
        match self.current() {
            Some(c) => ParseError::UnexpectedToken { token: c.to_string() },
            None => ParseError::UnexpectedEnd,
        }
    }

    /// Turns an optional operand into a hard requirement.
    fn require(&self, node: Option<Node>) -> ParseResult<Node> {
        node.ok_or_else(|| self.unexpected())
    }

    fn require_operand(&mut self) -> ParseResult<Node> {
        let operand = self.get_operand()?;
        self.require(operand)
    }

    fn priority(&self, op: &str) -> ParseResult<i32> {
        self.mgr
            .model
            .priority(op, 2)
            .map_err(|_| ParseError::UnknownOperator { symbol: op.to_owned() })
    }

    /// Precedence-climbing expression reader.
    ///
    /// Reads operand/operator pairs until an operator in the break set (or
    /// the end of input) terminates the expression. At equal or falling
    /// priority the accumulated left side folds into a node; at rising
    /// priority the right side is built recursively with the new operator
    /// as seed, which is exactly left associativity at equal priority and
    /// tighter binding for higher priorities.
    fn get_expression(
        &mut self,
        seed_operand: Option<Node>,
        seed_operator: Option<String>,
        brk: &str,
    ) -> ParseResult<Option<Node>> {
        let (mut operand1, mut operator) = match (seed_operand, seed_operator) {
            (Some(operand), Some(op)) => (operand, op),
            _ => {
                if self.end() {
                    return Ok(None);
                }
                let operand1 = self.get_operand()?;
                match self.get_operator() {
                    None => return Ok(operand1),
                    Some(op) if terminates(&op, brk) => return Ok(operand1),
                    Some(op) => match operand1 {
                        Some(operand) => (operand, op),
                        None => return Err(ParseError::UnexpectedToken { token: op }),
                    },
                }
            }
        };
        loop {
            if self.end() {
                return Err(ParseError::UnexpectedEnd);
            }
            let operand2 = self.require_operand()?;
            match self.get_operator() {
                None => return Ok(Some(operator_node(operator, vec![operand1, operand2]))),
                Some(next) if terminates(&next, brk) => {
                    return Ok(Some(operator_node(operator, vec![operand1, operand2])));
                }
                Some(next) => {
                    if self.priority(&operator)? >= self.priority(&next)? {
                        operand1 = operator_node(operator, vec![operand1, operand2]);
                        operator = next;
                    } else {
                        let rhs = self.get_expression(Some(operand2), Some(next), brk)?;
                        let rhs = self.require(rhs)?;
                        return Ok(Some(operator_node(operator, vec![operand1, rhs])));
                    }
                }
            }
        }
    }

    /// Reads one operand: a literal, variable, call, collection, group or
    /// control-flow block, with any leading unary prefix re-applied around
    /// it. Returns `None` without consuming when the current character
    /// cannot start an operand (the caller decides whether that is a clean
    /// terminator or an error).
    fn get_operand(&mut self) -> ParseResult<Option<Node>> {
        self.skip_spaces();
        let Some(mut first) = self.current() else {
            return Ok(None);
        };
        let mut is_negative = false;
        let mut is_not = false;
        let mut is_bit_not = false;
        if first == '-' {
            is_negative = true;
            self.bump();
            first = self.current().ok_or(ParseError::UnexpectedEnd)?;
        } else if first == '~' {
            is_bit_not = true;
            self.bump();
            first = self.current().ok_or(ParseError::UnexpectedEnd)?;
        } else if first == '!' {
            is_not = true;
            self.bump();
            first = self.current().ok_or(ParseError::UnexpectedEnd)?;
        }

        let operand = if first.is_ascii_alphanumeric() || first == '_' {
            let value = self.get_value();
            Some(self.alpha_operand(value, &mut is_negative, &mut is_bit_not)?)
        } else if first == '\'' || first == '"' {
            self.bump();
            let text = self.get_string(first)?;
            Some(Node::new(text, NodeKind::Constant))
        } else if first == '(' {
            self.bump();
            let inner = self.get_expression(None, None, ")")?;
            Some(self.require(inner)?)
        } else if first == '{' {
            self.bump();
            Some(self.get_object()?)
        } else if first == '[' {
            self.bump();
            let elements = self.get_args(']')?;
            Some(Node::with_children("array", NodeKind::Array, elements))
        } else {
            None
        };

        let Some(operand) = operand else {
            if is_negative || is_not || is_bit_not {
                return Err(self.unexpected());
            }
            return Ok(None);
        };

        let mut operand = self.solve_chain(operand)?;
        if is_negative {
            operand = operator_node("-".to_owned(), vec![operand]);
        }
        if is_not {
            operand = operator_node("!".to_owned(), vec![operand]);
        }
        if is_bit_not {
            operand = operator_node("~".to_owned(), vec![operand]);
        }
        Ok(Some(operand))
    }

    /// Dispatches an identifier run: keyword blocks, calls, indexing,
    /// literal keywords, numbers, enums, else a variable reference.
    fn alpha_operand(
        &mut self,
        value: String,
        is_negative: &mut bool,
        is_bit_not: &mut bool,
    ) -> ParseResult<Node> {
        if self.current() == Some('(') {
            match value.as_str() {
                "if" => {
                    self.bump();
                    return self.get_if_block();
                }
                "for" => {
                    self.bump();
                    return self.get_for_block();
                }
                "while" => {
                    self.bump();
                    return self.get_while_block();
                }
                "switch" => {
                    self.bump();
                    return self.get_switch_block();
                }
                _ => {
                    self.bump();
                    if let Some((receiver, method)) = value.rsplit_once('.') {
                        let variable = Node::new(receiver, NodeKind::Variable);
                        return self.get_child_function(method.to_owned(), variable);
                    }
                    let args = self.get_args(')')?;
                    return Ok(Node::with_children(value, NodeKind::Function, args));
                }
            }
        }
        if self.current() == Some('[') {
            self.bump();
            return self.get_index_operand(value);
        }
        match value.as_str() {
            "break" => return Ok(Node::new("break", NodeKind::Break)),
            "continue" => return Ok(Node::new("continue", NodeKind::Continue)),
            "return" => return Ok(Node::new("return", NodeKind::Return)),
            "true" => return Ok(Node::new(true, NodeKind::Constant)),
            "false" => return Ok(Node::new(false, NodeKind::Constant)),
            _ => {}
        }
        if value.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(mut n) = value.parse::<i64>() {
                if *is_negative {
                    n = -n;
                    *is_negative = false;
                } else if *is_bit_not {
                    n = !n;
                    *is_bit_not = false;
                }
                return Ok(Node::new(n, NodeKind::Constant));
            }
        }
        if value.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
            if let Ok(mut f) = value.parse::<f64>() {
                if *is_negative {
                    f = -f;
                    *is_negative = false;
                }
                return Ok(Node::new(f, NodeKind::Constant));
            }
        }
        if self.mgr.model.is_enum(&value) {
            return Ok(self.get_enum(&value));
        }
        Ok(Node::new(value, NodeKind::Variable))
    }

    /// Reads an identifier run: `[A-Za-z0-9_.]+`.
    fn get_value(&mut self) -> String {
        let mut buff = String::new();
        while let Some(c) = self.current() {
            if is_ident(c) {
                buff.push(c);
                self.bump();
            } else {
                break;
            }
        }
        buff
    }

    /// Lexes the operator at the cursor: longest match first against the
    /// Model's 3- and 2-character tables, else the single current character.
    fn get_operator(&mut self) -> Option<String> {
        if self.end() {
            return None;
        }
        if self.index + 2 < self.buffer.len() {
            let triple: String = self.buffer[self.index..self.index + 3].iter().collect();
            if self.mgr.tables.triple_operators.contains(&triple) {
                self.advance(3);
                return Some(triple);
            }
        }
        if self.index + 1 < self.buffer.len() {
            let double: String = self.buffer[self.index..self.index + 2].iter().collect();
            if self.mgr.tables.double_operators.contains(&double) {
                self.advance(2);
                return Some(double);
            }
        }
        let single = self.buffer[self.index].to_string();
        self.bump();
        Some(single)
    }

    /// Reads a string body after its opening quote was consumed. A doubled
    /// quote character is an embedded quote; the terminating quote is the
    /// first one not so escaped.
    fn get_string(&mut self, quote: char) -> ParseResult<String> {
        let mut buff = String::new();
        loop {
            let Some(c) = self.current() else {
                return Err(ParseError::UnterminatedString);
            };
            if c == quote {
                if self.peek_next() == Some(quote) {
                    buff.push(quote);
                    self.advance(2);
                } else {
                    self.bump();
                    return Ok(buff);
                }
            } else {
                buff.push(c);
                self.bump();
            }
        }
    }

    /// Reads a comma-separated expression list terminated by `end`
    /// (which is consumed).
    fn get_args(&mut self, end: char) -> ParseResult<Vec<Node>> {
        let mut brk = String::from(",");
        brk.push(end);
        let mut args = Vec::new();
        loop {
            let arg = self.get_expression(None, None, &brk)?;
            if let Some(arg) = arg {
                args.push(arg);
            }
            if self.previous() == Some(end) {
                break;
            }
            if self.end() {
                return Err(ParseError::UnexpectedEnd);
            }
        }
        Ok(args)
    }

    /// Reads an object literal body after `{`: `key: expr` pairs separated
    /// by commas, keys either quoted strings or identifier runs.
    fn get_object(&mut self) -> ParseResult<Node> {
        let mut attributes = Vec::new();
        loop {
            let name = match self.current() {
                Some(q @ ('\'' | '"')) => {
                    self.bump();
                    self.get_string(q)?
                }
                _ => self.get_value(),
            };
            if self.current() == Some(':') {
                self.bump();
            } else {
                return Err(ParseError::AttributeWithoutValue { name });
            }
            let value = self.get_expression(None, None, ",}")?;
            let value = self.require(value)?;
            attributes.push(Node::with_children(name, NodeKind::KeyValue, vec![value]));
            if self.previous() == Some('}') {
                break;
            }
            if self.end() {
                return Err(ParseError::UnexpectedEnd);
            }
        }
        Ok(Node::with_children("object", NodeKind::Object, attributes))
    }

    /// Reads `;`-separated statements up to the closing `}` of a block.
    fn get_block(&mut self) -> ParseResult<Node> {
        let mut lines = Vec::new();
        loop {
            let line = self.get_expression(None, None, ";}")?;
            if let Some(line) = line {
                lines.push(line);
            }
            if self.previous() == Some('}') {
                break;
            }
            if self.end() {
                return Err(ParseError::UnexpectedEnd);
            }
        }
        Ok(Node::with_children("block", NodeKind::Block, lines))
    }

    /// A control-flow body: either `{ ... }` or a single `;`-terminated
    /// expression.
    fn get_control_block(&mut self) -> ParseResult<Node> {
        self.skip_spaces();
        if self.current() == Some('{') {
            self.bump();
            self.get_block()
        } else {
            let line = self.get_expression(None, None, ";")?;
            self.require(line)
        }
    }

    /// `if(cond) body [else if(cond) body]* [else body]`, entered after
    /// `if(` was consumed. Children: `[cond, then, elif..., else?]`.
    fn get_if_block(&mut self) -> ParseResult<Node> {
        let condition = self.get_expression(None, None, ")")?;
        let condition = self.require(condition)?;
        let block = self.get_control_block()?;
        let mut children = vec![condition, block];
        while self.next_is("else if(") {
            self.advance(8);
            let cond = self.get_expression(None, None, ")")?;
            let cond = self.require(cond)?;
            let block = self.get_control_block()?;
            children.push(Node::with_children("elif", NodeKind::Elif, vec![cond, block]));
        }
        if self.next_is("else") {
            self.advance(4);
            let block = self.get_control_block()?;
            children.push(Node::with_children("else", NodeKind::Else, vec![block]));
        }
        Ok(Node::with_children("if", NodeKind::If, children))
    }

    /// `while(cond) body`, entered after `while(` was consumed.
    fn get_while_block(&mut self) -> ParseResult<Node> {
        let condition = self.get_expression(None, None, ")")?;
        let condition = self.require(condition)?;
        let block = self.get_control_block()?;
        Ok(Node::with_children("while", NodeKind::While, vec![condition, block]))
    }

    /// `for(init; cond; step) body` or `for(var in iterable) body`, entered
    /// after `for(` was consumed. The first expression decides which form
    /// this is: a `;` terminator means C-style, `in` means iteration.
    fn get_for_block(&mut self) -> ParseResult<Node> {
        let first = self.get_expression(None, None, ";")?;
        let first = self.require(first)?;
        if self.previous() == Some(';') {
            let condition = self.get_expression(None, None, ";")?;
            let condition = self.require(condition)?;
            let step = self.get_expression(None, None, ")")?;
            let step = self.require(step)?;
            let block = self.get_control_block()?;
            Ok(Node::with_children(
                "for",
                NodeKind::For,
                vec![first, condition, step, block],
            ))
        } else if self.next_is("in") {
            self.advance(2);
            self.skip_spaces();
            let iterable = self.get_expression(None, None, ")")?;
            let iterable = self.require(iterable)?;
            let block = self.get_control_block()?;
            Ok(Node::with_children(
                "forIn",
                NodeKind::ForIn,
                vec![first, iterable, block],
            ))
        } else {
            Err(self.unexpected())
        }
    }

    /// `switch(value) { case lit: stmt* ... default: stmt* }`, entered
    /// after `switch(` was consumed. Children: `[value, options]`.
    fn get_switch_block(&mut self) -> ParseResult<Node> {
        let value = self.get_expression(None, None, ")")?;
        let value = self.require(value)?;
        if self.current() == Some('{') {
            self.bump();
        } else {
            return Err(self.unexpected());
        }
        let mut children = Vec::new();
        let mut closed = false;
        while !closed {
            self.skip_spaces();
            if self.next_is("case") {
                self.advance(4);
                self.skip_spaces();
                let label = match self.current() {
                    Some(q @ ('\'' | '"')) => {
                        self.bump();
                        Value::String(self.get_string(q)?)
                    }
                    _ => case_label(self.get_value()),
                };
                if self.current() == Some(':') {
                    self.bump();
                }
                let (lines, hit_close) = self.get_case_lines()?;
                closed = hit_close;
                let block = Node::with_children("block", NodeKind::Block, lines);
                children.push(Node::with_children(label, NodeKind::Case, vec![block]));
            } else if self.next_is("default:") {
                self.advance(8);
                let (lines, hit_close) = self.get_case_lines()?;
                closed = hit_close;
                let block = Node::with_children("block", NodeKind::Block, lines);
                children.push(Node::with_children("default", NodeKind::Default, vec![block]));
            } else if self.current() == Some('}') {
                self.bump();
                closed = true;
            } else {
                return Err(self.unexpected());
            }
        }
        let options = Node::with_children("options", NodeKind::Options, children);
        Ok(Node::with_children("switch", NodeKind::Switch, vec![value, options]))
    }

    /// Reads the statements of one `case`/`default` arm. Returns the lines
    /// and whether the switch's closing `}` was consumed on the way.
    fn get_case_lines(&mut self) -> ParseResult<(Vec<Node>, bool)> {
        let mut lines = Vec::new();
        loop {
            self.skip_spaces();
            if self.next_is("case") || self.next_is("default:") {
                return Ok((lines, false));
            }
            if self.current() == Some('}') {
                self.bump();
                return Ok((lines, true));
            }
            if self.end() {
                return Err(ParseError::UnexpectedEnd);
            }
            let line = self.get_expression(None, None, ";}")?;
            if let Some(line) = line {
                lines.push(line);
            }
            if self.previous() == Some('}') {
                return Ok((lines, true));
            }
        }
    }

    /// Resolves member access chains after an operand: `.name(...)` is a
    /// method (or arrow) call, `.name` without parentheses a zero-argument
    /// chain link. Recursion allows arbitrary `a.b(...).c(...)` chains.
    fn solve_chain(&mut self, operand: Node) -> ParseResult<Node> {
        if self.current() == Some('.') {
            self.bump();
            let name = self.get_value();
            let chained = if self.current() == Some('(') {
                self.bump();
                self.get_child_function(name, operand)?
            } else {
                Node::with_children(name, NodeKind::ChildFunction, vec![operand])
            };
            self.solve_chain(chained)
        } else {
            Ok(operand)
        }
    }

    /// A call with a receiver, entered after `name(` was consumed.
    ///
    /// Names registered as arrow functions read `param => body` (or an
    /// empty argument list); everything else reads plain arguments with the
    /// receiver prepended.
    fn get_child_function(&mut self, name: String, parent: Node) -> ParseResult<Node> {
        if self.mgr.tables.arrow_functions.contains(&name) {
            let variable_name = self.get_value();
            if variable_name.is_empty() && self.current() == Some(')') {
                self.bump();
                return Ok(Node::with_children(name, NodeKind::ArrowFunction, vec![parent]));
            }
            if self.current() == Some('=') && self.peek_next() == Some('>') {
                self.advance(2);
            } else {
                return Err(ParseError::ArrowWithoutBody { function: name });
            }
            let variable = Node::new(variable_name, NodeKind::Variable);
            let body = self.get_expression(None, None, ")")?;
            let body = self.require(body)?;
            Ok(Node::with_children(
                name,
                NodeKind::ArrowFunction,
                vec![parent, variable, body],
            ))
        } else {
            let mut args = self.get_args(')')?;
            args.insert(0, parent);
            Ok(Node::with_children(name, NodeKind::ChildFunction, args))
        }
    }

    /// `name[index]`, entered after `[` was consumed: an `[]` operator node
    /// over the variable and the index expression.
    fn get_index_operand(&mut self, name: String) -> ParseResult<Node> {
        let index = self.get_expression(None, None, "]")?;
        let index = self.require(index)?;
        Ok(Node::with_children(
            "[]",
            NodeKind::Operator,
            vec![Node::new(name, NodeKind::Variable), index],
        ))
    }

    /// An enum reference: `Name.option` folds to its constant, a bare enum
    /// name expands to an object literal of all options. Falls back to a
    /// variable if the registry disagrees after all.
    fn get_enum(&self, value: &str) -> Node {
        if let Some((enum_name, option)) = value.split_once('.') {
            if let Ok(v) = self.mgr.model.get_enum_value(enum_name, option) {
                return Node::new(v.clone(), NodeKind::Constant);
            }
        } else if let Ok(mapping) = self.mgr.model.get_enum(value) {
            let attributes = mapping
                .iter()
                .map(|(key, v)| {
                    Node::with_children(
                        key.as_str(),
                        NodeKind::KeyValue,
                        vec![Node::new(v.clone(), NodeKind::Constant)],
                    )
                })
                .collect();
            return Node::with_children("object", NodeKind::Object, attributes);
        }
        Node::new(value, NodeKind::Variable)
    }
}
