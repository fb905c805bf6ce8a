use quip::{CompileError, Context, Engine, EvalError, ExpressionError, Operand, Value};

fn run(expression: &str) -> Value {
    Engine::new()
        .run(expression, &mut Context::new())
        .expect("expression should evaluate")
}

fn run_with(expression: &str, vars: &[(&str, Value)]) -> Value {
    let engine = Engine::new();
    let mut ctx = Context::new();
    for (name, value) in vars {
        ctx.insert(*name, value.clone());
    }
    engine.run(expression, &mut ctx).expect("expression should evaluate")
}

fn eval_err(expression: &str, vars: &[(&str, Value)]) -> EvalError {
    let engine = Engine::new();
    let mut ctx = Context::new();
    for (name, value) in vars {
        ctx.insert(*name, value.clone());
    }
    match engine.run(expression, &mut ctx) {
        Err(ExpressionError::Eval { source, .. }) => source,
        other => panic!("expected eval error, got: {other:?}"),
    }
}

mod scenarios {
    use super::*;

    #[test]
    fn arithmetic_folds_to_a_constant_and_evaluates() {
        assert_eq!(run("1 + 2 * 3"), Value::Int(7));
        let compiled = Engine::new().compile("1 + 2 * 3").expect("should compile");
        assert!(
            matches!(compiled, Operand::Constant(Value::Int(7))),
            "folding should leave a single constant, got: {compiled:?}"
        );
    }

    #[test]
    fn comparisons_against_context() {
        let result = run_with("a == 1 && b != 2", &[("a", Value::Int(1)), ("b", Value::Int(3))]);
        assert_eq!(result, Value::Bool(true));
    }

    #[test]
    fn object_literal_evaluates_entries() {
        assert_eq!(run("{name: 'x', n: 1 + 2}").to_string(), "{name: 'x', n: 3}");
    }

    #[test]
    fn if_else_assigns_through_to_the_caller_scope() {
        let result = run_with("if(a > 0){b = 1}else{b = 2}; b", &[("a", Value::Int(-1))]);
        assert_eq!(result, Value::Int(2));
    }

    #[test]
    fn c_style_for_accumulates() {
        assert_eq!(run("s = 0; for(i = 0; i < 5; i += 1){s += i}; s"), Value::Int(10));
    }

    #[test]
    fn map_with_lambda_squares() {
        let expected = Value::Array(vec![
            Value::Int(1),
            Value::Int(4),
            Value::Int(9),
            Value::Int(16),
        ]);
        assert_eq!(run("[1,2,3,4].map(x => x * x)"), expected);
    }

    #[test]
    fn switch_selects_the_matching_case() {
        let result = run_with(
            "switch(k){case 'a': 1; case 'b': 2; default: 0}",
            &[("k", Value::from("b"))],
        );
        assert_eq!(result, Value::Int(2));
    }
}

mod operators {
    use super::*;

    #[test]
    fn division_always_yields_float() {
        assert_eq!(run("7 / 2"), Value::Float(3.5));
    }

    #[test]
    fn floor_division_rounds_toward_negative_infinity() {
        assert_eq!(run("7 // 2"), Value::Int(3));
        assert_eq!(run("-7 // 2"), Value::Int(-4));
    }

    #[test]
    fn power_of_integers_stays_integer() {
        assert_eq!(run("2 ** 10"), Value::Int(1024));
    }

    #[test]
    fn string_concatenation_and_repetition() {
        assert_eq!(run("'ab' + 'cd'"), Value::from("abcd"));
        assert_eq!(run("'ab' * 3"), Value::from("ababab"));
    }

    #[test]
    fn loose_numeric_equality() {
        assert_eq!(run("1 == 1.0"), Value::Bool(true));
        assert_eq!(run("true == 1"), Value::Bool(true));
        assert_eq!(run("'1' == 1"), Value::Bool(false));
    }

    #[test]
    fn division_by_zero_fails_during_folding() {
        let err = Engine::new().compile("1 / 0").expect_err("folding 1/0 should fail");
        assert!(
            matches!(
                err,
                ExpressionError::Compile {
                    source: CompileError::Fold(EvalError::DivisionByZero),
                    ..
                }
            ),
            "got: {err:?}"
        );
    }

    #[test]
    fn division_by_zero_fails_at_runtime() {
        let err = eval_err("a / 0", &[("a", Value::Int(1))]);
        assert_eq!(err, EvalError::DivisionByZero);
    }

    #[test]
    fn and_short_circuits_the_right_side() {
        let result = run("a = 0; a != 0 && 1 / a > 0");
        assert_eq!(result, Value::Bool(false));
    }

    #[test]
    fn or_short_circuits_the_right_side() {
        let result = run_with("a == 5 || 1 / a > 0", &[("a", Value::Int(5))]);
        assert_eq!(result, Value::Bool(true));
    }

    #[test]
    fn unary_operators() {
        assert_eq!(run("-(2 + 3)"), Value::Int(-5));
        assert_eq!(run("!false"), Value::Bool(true));
        assert_eq!(run("~5"), Value::Int(-6));
    }

    #[test]
    fn bitwise_operators() {
        assert_eq!(run("6 & 3"), Value::Int(2));
        assert_eq!(run("6 ^ 3"), Value::Int(5));
        assert_eq!(run("1 << 4"), Value::Int(16));
        assert_eq!(run("6 | 1"), Value::Int(7));
    }

    #[test]
    fn indexing_supports_negative_positions() {
        let xs = Value::Array(vec![Value::Int(10), Value::Int(20), Value::Int(30)]);
        assert_eq!(run_with("xs[1]", &[("xs", xs.clone())]), Value::Int(20));
        assert_eq!(run_with("xs[-1]", &[("xs", xs)]), Value::Int(30));
    }

    #[test]
    fn index_assignment_mutates_in_place() {
        let xs = Value::Array(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(run_with("xs[0] = 9; xs[0]", &[("xs", xs)]), Value::Int(9));
    }

    #[test]
    fn compound_assignment_with_triple_lexeme() {
        assert_eq!(run("a = 2; a **= 3; a"), Value::Int(8));
    }

    #[test]
    fn dotted_paths_write_through_nested_objects() {
        assert_eq!(run("cfg.retries = 3; cfg.retries"), Value::Int(3));
    }

    #[test]
    fn dotted_path_reads_from_context_objects() {
        let engine = Engine::new();
        let mut ctx = Context::new();
        let order = engine.run("{total: 21}", &mut Context::new()).expect("object");
        ctx.insert("order", order);
        assert_eq!(engine.run("order.total * 2", &mut ctx).expect("eval"), Value::Int(42));
    }
}

mod control_flow {
    use super::*;

    #[test]
    fn while_loop_runs_until_condition_fails() {
        assert_eq!(run("i = 0; while(i < 3){i += 1}; i"), Value::Int(3));
    }

    #[test]
    fn break_terminates_only_the_innermost_loop() {
        let src = "s = 0; for(i = 0; i < 3; i += 1){ for(j = 0; j < 3; j += 1){ if(j == 1){break}; s += 1 } }; s";
        assert_eq!(run(src), Value::Int(3));
    }

    #[test]
    fn continue_skips_to_the_next_iteration() {
        let src = "s = 0; for(i = 0; i < 5; i += 1){ if(i % 2 == 1){continue}; s += i }; s";
        assert_eq!(run(src), Value::Int(6));
    }

    #[test]
    fn return_unwinds_out_of_the_whole_tree() {
        let src = "s = 0; while(true){ s = 1; return; s = 2 }; s";
        assert_eq!(run(src), Value::Null);
    }

    #[test]
    fn else_if_chain_picks_first_truthy_branch() {
        let src = "if(a == 1){ 'one' } else if(a == 2){ 'two' } else { 'many' }";
        assert_eq!(run_with(src, &[("a", Value::Int(2))]), Value::from("two"));
    }

    #[test]
    fn if_without_matching_branch_is_null() {
        assert_eq!(run_with("if(a > 0){1}", &[("a", Value::Int(0))]), Value::Null);
    }

    #[test]
    fn switch_does_not_fall_through() {
        let src = "hits = 0; switch(k){case 'a': hits += 1; case 'b': hits += 1; default: hits += 100}; hits";
        assert_eq!(run_with(src, &[("k", Value::from("a"))]), Value::Int(1));
    }

    #[test]
    fn switch_without_match_takes_default() {
        let src = "switch(k){case 'a': 1; case 'b': 2; default: 0}";
        assert_eq!(run_with(src, &[("k", Value::from("z"))]), Value::Int(0));
    }

    #[test]
    fn switch_matches_typed_integer_labels() {
        let src = "switch(n){case 1: 'one'; default: 'other'}";
        assert_eq!(run_with(src, &[("n", Value::Int(1))]), Value::from("one"));
    }

    #[test]
    fn for_in_iterates_array_elements() {
        let xs = Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(run_with("s = 0; for(x in xs){s += x}; s", &[("xs", xs)]), Value::Int(6));
    }

    #[test]
    fn for_in_iterates_object_keys() {
        let src = "obj = {a: 1, b: 2}; out = ''; for(k in obj){out += k}; out";
        assert_eq!(run(src), Value::from("ab"));
    }
}

mod arrows {
    use super::*;

    #[test]
    fn filter_keeps_matching_elements() {
        let expected = Value::Array(vec![Value::Int(2), Value::Int(4)]);
        assert_eq!(run("[1,2,3,4].filter(x => x % 2 == 0)"), expected);
    }

    #[test]
    fn lambda_parameter_shadows_outer_binding() {
        let xs = Value::Array(vec![Value::Int(1)]);
        let result = run_with("ys = xs.map(x => x * 2); x", &[("xs", xs), ("x", Value::Int(9))]);
        assert_eq!(result, Value::Int(9), "outer x must survive the lambda");
    }

    #[test]
    fn lambda_parameter_does_not_leak() {
        assert_eq!(run("[1].foreach(x => x); x"), Value::Null);
    }

    #[test]
    fn sort_without_lambda_orders_naturally() {
        let expected = Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(run("[3,1,2].sort()"), expected);
    }

    #[test]
    fn sort_with_lambda_uses_the_key() {
        let expected = Value::Array(vec![Value::from("a"), Value::from("bb"), Value::from("ccc")]);
        assert_eq!(run("['bb','a','ccc'].sort(x => length(x))"), expected);
    }

    #[test]
    fn first_and_last_with_and_without_predicate() {
        assert_eq!(run("[1,2,3].first()"), Value::Int(1));
        assert_eq!(run("[1,2,3].first(x => x > 1)"), Value::Int(2));
        assert_eq!(run("[1,2,3].last()"), Value::Int(3));
        assert_eq!(run("[1,2,3].last(x => x < 3)"), Value::Int(2));
    }

    #[test]
    fn any_and_all() {
        assert_eq!(run("[1,2].any(x => x > 1)"), Value::Bool(true));
        assert_eq!(run("[1,2].all(x => x > 1)"), Value::Bool(false));
    }

    #[test]
    fn arrow_calls_chain() {
        let expected = Value::Array(vec![Value::Int(20), Value::Int(30), Value::Int(40)]);
        assert_eq!(run("[1,2,3,4].filter(x => x > 1).map(x => x * 10)"), expected);
    }
}

mod methods {
    use super::*;

    #[test]
    fn split_on_strings() {
        let expected = Value::Array(vec![Value::from("a"), Value::from("b"), Value::from("c")]);
        assert_eq!(run("'a,b,c'.split(',')"), expected);
    }

    #[test]
    fn join_on_arrays() {
        assert_eq!(run("[1,2].join('-')"), Value::from("1-2"));
    }

    #[test]
    fn index_of_on_strings_and_arrays() {
        assert_eq!(run("'hello'.indexOf('ll')"), Value::Int(2));
        assert_eq!(run("[5,6,7].indexOf(7)"), Value::Int(2));
        assert_eq!(run("[5,6,7].indexOf(9)"), Value::Int(-1));
    }

    #[test]
    fn reverse_on_arrays() {
        let expected = Value::Array(vec![Value::Int(3), Value::Int(2), Value::Int(1)]);
        assert_eq!(run("[1,2,3].reverse()"), expected);
    }

    #[test]
    fn unknown_method_fails_with_receiver_type() {
        let err = eval_err("'x'.frobnicate()", &[]);
        assert!(
            matches!(err, EvalError::UnknownMethod { ref name, .. } if name == "frobnicate"),
            "got: {err:?}"
        );
    }

    #[test]
    fn registered_function_is_callable_through_a_receiver() {
        assert_eq!(run("'abc'.upper()"), Value::from("ABC"));
    }
}

mod functions {
    use super::*;

    #[test]
    fn numeric_functions() {
        assert_eq!(run("abs(-4)"), Value::Int(4));
        assert_eq!(run("ceil(1.2)"), Value::Int(2));
        assert_eq!(run("floor(1.8)"), Value::Int(1));
        assert_eq!(run("round(2.5)"), Value::Int(3));
        assert_eq!(run("sqrt(9.0)"), Value::Float(3.0));
    }

    #[test]
    fn string_functions() {
        assert_eq!(run("upper('ab')"), Value::from("AB"));
        assert_eq!(run("trim('  x  ')"), Value::from("x"));
        assert_eq!(run("capitalize('heLLo')"), Value::from("Hello"));
        assert_eq!(run("replace('a-b', '-', '+')"), Value::from("a+b"));
        assert_eq!(run("substring('hello', 1, 3)"), Value::from("ell"));
        assert_eq!(run("startsWith('hello', 'he')"), Value::Bool(true));
    }

    #[test]
    fn collection_functions() {
        assert_eq!(run("length([1,2,3])"), Value::Int(3));
        assert_eq!(run("sum([1,2,3])"), Value::Int(6));
        assert_eq!(run("avg([1,2,3])"), Value::Float(2.0));
        assert_eq!(run("min([3,1,2])"), Value::Int(1));
        assert_eq!(run("max([3,1,2])"), Value::Int(3));
        assert_eq!(run("contains([1,2], 2)"), Value::Bool(true));
        assert_eq!(run("contains('abc', 'bc')"), Value::Bool(true));
    }

    #[test]
    fn conversions_and_null_test() {
        assert_eq!(run("toString(12)"), Value::from("12"));
        assert_eq!(run("toNumber('12')"), Value::Int(12));
        assert_eq!(run("toNumber('1.5')"), Value::Float(1.5));
        assert_eq!(run("isNull(missing)"), Value::Bool(true));
        assert_eq!(run("isNull(0)"), Value::Bool(false));
    }

    #[test]
    fn functions_are_not_folded_even_with_constant_arguments() {
        let compiled = Engine::new().compile("abs(-4)").expect("should compile");
        assert!(
            matches!(compiled, Operand::Function { .. }),
            "functions must stay calls, got: {compiled:?}"
        );
    }

    #[test]
    fn bad_argument_type_fails_at_runtime() {
        let err = eval_err("abs('x')", &[]);
        assert!(matches!(err, EvalError::ArgumentType { .. }), "got: {err:?}");
    }
}

mod context_behavior {
    use super::*;

    #[test]
    fn writes_land_in_the_caller_context() {
        let engine = Engine::new();
        let mut ctx = Context::new();
        ctx.insert("n", 1);
        engine.run("n = n + 1", &mut ctx).expect("eval");
        assert_eq!(ctx.get("n"), Some(&Value::Int(2)));
    }

    #[test]
    fn new_variables_land_in_the_root_scope() {
        let engine = Engine::new();
        let mut ctx = Context::new();
        engine.run("while(total == null){ total = 10 }", &mut ctx).expect("eval");
        assert_eq!(ctx.get("total"), Some(&Value::Int(10)));
    }

    #[test]
    fn unknown_variables_read_as_null() {
        assert_eq!(run("missing"), Value::Null);
    }
}
