use indexmap::IndexMap;
use quip::{
    ArgSpec, Category, CompileError, Context, CustomOperator, Engine, EvalError, EvalResult,
    Evaluator, ExpressionError, FunctionEntry, FunctionMetadata, Library, ModelError, NativeFn,
    Operand, OperatorEntry, OperatorMetadata, ParseError, Value, ValueType,
};

fn host_meta(priority: i32, category: Category) -> OperatorMetadata {
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

mod host_functions {
    use super::*;

    fn shout(args: &[Value]) -> EvalResult<Value> {
        match args {
            [Value::String(s)] => Ok(Value::String(format!("{s}!"))),
            _ => Err(EvalError::ArgumentCount {
                function: "shout".to_owned(),
                expected: 1,
                got: args.len(),
            }),
        }
    }

    #[test]
    fn registered_function_is_callable() {
        let mut lib = Library::new("host");
        lib.add_function(
            "shout",
            FunctionEntry::plain(
                shout,
                FunctionMetadata {
                    args: vec![ArgSpec::new("value", ValueType::String)],
                    return_type: ValueType::String,
                    lib: String::new(),
                    is_arrow_function: false,
                },
            ),
        );
        let mut engine = Engine::new();
        engine.add_library(lib);
        let result = engine.run("shout('hi')", &mut Context::new()).expect("eval");
        assert_eq!(result, Value::from("hi!"));
    }
}

mod host_operators {
    use super::*;

    fn larger(args: &[Value]) -> EvalResult<Value> {
        let (left, right) = (&args[0], &args[1]);
        match left.compare(right) {
            Some(std::cmp::Ordering::Less) => Ok(right.clone()),
            Some(_) => Ok(left.clone()),
            None => Err(EvalError::TypeMismatch {
                operator: "<>".to_owned(),
                left: left.value_type(),
                right: right.value_type(),
            }),
        }
    }

    #[test]
    fn new_operator_lexeme_is_learned_by_the_parser() {
        let mut lib = Library::new("host");
        lib.add_operator("<>", 2, OperatorEntry::eager(larger, host_meta(10, Category::Other)));
        let mut engine = Engine::new();
        engine.add_library(lib);
        let result = engine.run("2 <> 5", &mut Context::new()).expect("eval");
        assert_eq!(result, Value::Int(5));
    }

    /// Null-coalescing operator exercising the custom constructor hook:
    /// the right side must only be evaluated when the left is null.
    #[derive(Debug)]
    struct Coalesce;

    impl CustomOperator for Coalesce {
        fn eval<'t, 'c>(
            &self,
            children: &'t [Operand],
            ev: &mut Evaluator<'t, 'c>,
        ) -> EvalResult<Value> {
            let left = ev.eval_value(&children[0])?;
            if matches!(left, Value::Null) {
                ev.eval_value(&children[1])
            } else {
                Ok(left)
            }
        }
    }

    fn coalesce_factory(_name: &str, _base: Option<NativeFn>) -> Box<dyn CustomOperator> {
        Box::new(Coalesce)
    }

    #[test]
    fn custom_constructor_controls_child_evaluation() {
        let mut lib = Library::new("host");
        lib.add_operator(
            "??",
            2,
            OperatorEntry::custom(coalesce_factory, host_meta(2, Category::Logical)),
        );
        let mut engine = Engine::new();
        engine.add_library(lib);

        let mut ctx = Context::new();
        assert_eq!(engine.run("u ?? 5", &mut ctx).expect("eval"), Value::Int(5));
        ctx.insert("u", 7);
        assert_eq!(engine.run("u ?? 5", &mut ctx).expect("eval"), Value::Int(7));
    }
}

mod host_enums {
    use super::*;

    fn color_lib() -> Library {
        let mut lib = Library::new("host");
        let mapping: IndexMap<String, Value> = [
            ("red".to_owned(), Value::Int(1)),
            ("green".to_owned(), Value::Int(2)),
        ]
        .into_iter()
        .collect();
        lib.add_enum("Color", mapping);
        lib
    }

    #[test]
    fn qualified_enum_folds_to_its_constant_at_parse_time() {
        let mut engine = Engine::new();
        engine.add_library(color_lib());
        let node = engine.parse("Color.red").expect("parse");
        assert_eq!(node.name, Value::Int(1));
        assert_eq!(
            engine.run("Color.green + 1", &mut Context::new()).expect("eval"),
            Value::Int(3)
        );
    }

    #[test]
    fn bare_enum_expands_to_an_object_literal() {
        let mut engine = Engine::new();
        engine.add_library(color_lib());
        let result = engine.run("Color", &mut Context::new()).expect("eval");
        assert_eq!(result.to_string(), "{red: 1, green: 2}");
    }

    #[test]
    fn model_answers_enum_queries() {
        let mut engine = Engine::new();
        engine.add_library(color_lib());
        assert!(engine.model().is_enum("Color"));
        assert!(engine.model().is_enum("Color.red"));
        assert!(!engine.model().is_enum("Color.blue"));
        assert_eq!(engine.model().get_enum_value("Color", "red"), Ok(&Value::Int(1)));
    }
}

mod empty_engine {
    use super::*;

    #[test]
    fn unknown_operator_fails_compilation() {
        let err = Engine::empty()
            .run("1 + 2", &mut Context::new())
            .expect_err("nothing is registered");
        assert!(
            matches!(
                err,
                ExpressionError::Compile {
                    source: CompileError::Model(ModelError::UnknownOperator { .. }),
                    ..
                }
            ),
            "got: {err:?}"
        );
    }

    #[test]
    fn unknown_priority_fails_parsing() {
        let err = Engine::empty()
            .parse("1 + 2 * 3")
            .expect_err("priority lookup must fail");
        assert!(
            matches!(
                err,
                ExpressionError::Parse {
                    source: ParseError::UnknownOperator { .. },
                    ..
                }
            ),
            "got: {err:?}"
        );
    }

    #[test]
    fn model_lookups_report_what_is_missing() {
        let engine = Engine::new();
        let err = engine.model().operator_metadata("@@", 2).expect_err("unknown");
        assert_eq!(
            err,
            ModelError::UnknownOperator {
                name: "@@".to_owned(),
                arity: 2
            }
        );
        let err = engine.model().function_metadata("nope").expect_err("unknown");
        assert_eq!(err, ModelError::UnknownFunction { name: "nope".to_owned() });
    }
}
