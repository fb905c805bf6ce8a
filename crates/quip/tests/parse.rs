use quip::{Engine, ExpressionError, Node, NodeKind, ParseError, Value};

fn parse(expression: &str) -> Node {
    Engine::new().parse(expression).expect("expression should parse")
}

/// Helper to extract the inner parse error from a failing expression.
fn parse_err(expression: &str) -> ParseError {
    match Engine::new().parse(expression) {
        Err(ExpressionError::Parse { source, .. }) => source,
        other => panic!("expected parse error, got: {other:?}"),
    }
}

mod precedence {
    use super::*;

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let node = parse("1 + 2 * 3");
        assert_eq!(node.kind, NodeKind::Operator);
        assert_eq!(node.text(), Some("+"), "root should be '+', got: {node:?}");
        assert_eq!(node.children[1].text(), Some("*"));
    }

    #[test]
    fn comparison_yields_to_arithmetic() {
        let node = parse("1 == 2 + 3");
        assert_eq!(node.text(), Some("=="));
        assert_eq!(node.children[1].text(), Some("+"));
    }

    #[test]
    fn equal_priority_is_left_associative() {
        let node = parse("1 - 2 - 3");
        assert_eq!(node.text(), Some("-"));
        assert_eq!(node.children[0].text(), Some("-"), "left child should fold first");
        assert_eq!(node.children[1].name, Value::Int(3));
    }

    #[test]
    fn parentheses_override_priority() {
        let node = parse("(1 + 2) * 3");
        assert_eq!(node.text(), Some("*"));
        assert_eq!(node.children[0].text(), Some("+"));
    }

    #[test]
    fn logical_operators_bind_loosest() {
        let node = parse("a == 1 && b != 2");
        assert_eq!(node.text(), Some("&&"));
        assert_eq!(node.children[0].text(), Some("=="));
        assert_eq!(node.children[1].text(), Some("!="));
    }
}

mod operands {
    use super::*;

    #[test]
    fn negative_integer_folds_at_parse_time() {
        let node = parse("- 3");
        assert_eq!(node.kind, NodeKind::Constant);
        assert_eq!(node.name, Value::Int(-3));
    }

    #[test]
    fn bit_not_on_integer_folds_at_parse_time() {
        let node = parse("~0");
        assert_eq!(node.kind, NodeKind::Constant);
        assert_eq!(node.name, Value::Int(-1));
    }

    #[test]
    fn not_true_stays_an_operator_node() {
        let node = parse("!true");
        assert_eq!(node.kind, NodeKind::Operator);
        assert_eq!(node.text(), Some("!"));
        assert_eq!(node.children[0].name, Value::Bool(true));
    }

    #[test]
    fn float_literal() {
        let node = parse("1.5");
        assert_eq!(node.name, Value::Float(1.5));
    }

    #[test]
    fn doubled_quote_is_an_embedded_quote() {
        let node = parse("'it''s'");
        assert_eq!(node.name, Value::from("it's"));
    }

    #[test]
    fn double_quoted_string() {
        let node = parse("\"hi there\"");
        assert_eq!(node.name, Value::from("hi there"));
    }

    #[test]
    fn unterminated_string_fails() {
        assert_eq!(parse_err("'abc"), ParseError::UnterminatedString);
    }

    #[test]
    fn array_literal() {
        let node = parse("[1, 2, 3]");
        assert_eq!(node.kind, NodeKind::Array);
        assert_eq!(node.children.len(), 3);
    }

    #[test]
    fn object_literal_children_are_key_values() {
        let node = parse("{name: 'x', n: 1 + 2}");
        assert_eq!(node.kind, NodeKind::Object);
        assert_eq!(node.children.len(), 2);
        assert!(node.children.iter().all(|c| c.kind == NodeKind::KeyValue));
        assert_eq!(node.children[0].name, Value::from("name"));
        assert_eq!(node.children[1].children[0].text(), Some("+"));
    }

    #[test]
    fn object_key_without_colon_fails() {
        assert_eq!(
            parse_err("{a 1}"),
            ParseError::AttributeWithoutValue { name: "a".to_owned() }
        );
    }

    #[test]
    fn dotted_identifier_is_one_variable() {
        let node = parse("order.total");
        assert_eq!(node.kind, NodeKind::Variable);
        assert_eq!(node.text(), Some("order.total"));
    }
}

mod statements {
    use super::*;

    #[test]
    fn single_statement_is_not_wrapped() {
        assert_eq!(parse("1 + 2").kind, NodeKind::Operator);
    }

    #[test]
    fn multiple_statements_wrap_in_a_block() {
        let node = parse("a = 1; b = 2");
        assert_eq!(node.kind, NodeKind::Block);
        assert_eq!(node.children.len(), 2);
    }
}

mod calls {
    use super::*;

    #[test]
    fn flat_call_is_a_function_node() {
        let node = parse("abs(1)");
        assert_eq!(node.kind, NodeKind::Function);
        assert_eq!(node.text(), Some("abs"));
        assert_eq!(node.children.len(), 1);
    }

    #[test]
    fn dotted_call_prepends_the_receiver() {
        let node = parse("a.b.trim()");
        assert_eq!(node.kind, NodeKind::ChildFunction);
        assert_eq!(node.text(), Some("trim"));
        assert_eq!(node.children[0].text(), Some("a.b"));
        assert_eq!(node.children[0].kind, NodeKind::Variable);
    }

    #[test]
    fn arrow_call_has_receiver_parameter_and_body() {
        let node = parse("[1,2].map(x => x * x)");
        assert_eq!(node.kind, NodeKind::ArrowFunction);
        assert_eq!(node.text(), Some("map"));
        assert_eq!(node.children.len(), 3);
        assert_eq!(node.children[0].kind, NodeKind::Array);
        assert_eq!(node.children[1].text(), Some("x"));
        assert_eq!(node.children[2].text(), Some("*"));
    }

    #[test]
    fn arrow_call_without_lambda() {
        let node = parse("[2,1].sort()");
        assert_eq!(node.kind, NodeKind::ArrowFunction);
        assert_eq!(node.children.len(), 1);
    }

    #[test]
    fn arrow_without_body_fails() {
        assert_eq!(
            parse_err("[1].map(x + 1)"),
            ParseError::ArrowWithoutBody { function: "map".to_owned() }
        );
    }

    #[test]
    fn indexing_is_the_bracket_operator() {
        let node = parse("a[0]");
        assert_eq!(node.kind, NodeKind::Operator);
        assert_eq!(node.text(), Some("[]"));
        assert_eq!(node.children[0].text(), Some("a"));
        assert_eq!(node.children[1].name, Value::Int(0));
    }

    #[test]
    fn chains_nest_left_to_right() {
        let node = parse("'a,b'.split(',').join('-')");
        assert_eq!(node.kind, NodeKind::ChildFunction);
        assert_eq!(node.text(), Some("join"));
        assert_eq!(node.children[0].text(), Some("split"));
    }
}

mod control_flow {
    use super::*;

    #[test]
    fn if_else_shape() {
        let node = parse("if(a > 0){b = 1}else{b = 2}");
        assert_eq!(node.kind, NodeKind::If);
        assert_eq!(node.children.len(), 3);
        assert_eq!(node.children[0].text(), Some(">"));
        assert_eq!(node.children[1].kind, NodeKind::Block);
        assert_eq!(node.children[2].kind, NodeKind::Else);
    }

    #[test]
    fn else_if_chain_shape() {
        let node = parse("if(a){1} else if(b){2} else {3}");
        assert_eq!(node.children.len(), 4);
        assert_eq!(node.children[2].kind, NodeKind::Elif);
        assert_eq!(node.children[2].children.len(), 2);
        assert_eq!(node.children[3].kind, NodeKind::Else);
    }

    #[test]
    fn while_shape() {
        let node = parse("while(i < 5){i += 1}");
        assert_eq!(node.kind, NodeKind::While);
        assert_eq!(node.children.len(), 2);
    }

    #[test]
    fn c_style_for_shape() {
        let node = parse("for(i = 0; i < 5; i += 1){s += i}");
        assert_eq!(node.kind, NodeKind::For);
        assert_eq!(node.children.len(), 4);
        assert_eq!(node.children[3].kind, NodeKind::Block);
    }

    #[test]
    fn for_in_shape() {
        let node = parse("for(x in xs){s += x}");
        assert_eq!(node.kind, NodeKind::ForIn);
        assert_eq!(node.children.len(), 3);
        assert_eq!(node.children[0].text(), Some("x"));
        assert_eq!(node.children[1].text(), Some("xs"));
    }

    #[test]
    fn switch_shape() {
        let node = parse("switch(k){case 'a': 1; case 'b': 2; default: 0}");
        assert_eq!(node.kind, NodeKind::Switch);
        assert_eq!(node.children.len(), 2);
        let options = &node.children[1];
        assert_eq!(options.kind, NodeKind::Options);
        assert_eq!(options.children.len(), 3);
        assert_eq!(options.children[0].kind, NodeKind::Case);
        assert_eq!(options.children[0].name, Value::from("a"));
        assert_eq!(options.children[2].kind, NodeKind::Default);
    }

    #[test]
    fn bare_case_labels_are_typed() {
        let node = parse("switch(n){case 1: 'one';}");
        let case = &node.children[1].children[0];
        assert_eq!(case.name, Value::Int(1));
    }

    #[test]
    fn break_is_a_leaf() {
        let node = parse("break");
        assert_eq!(node.kind, NodeKind::Break);
        assert!(node.children.is_empty());
    }
}
