use quip::{Category, Engine, ValueType};

mod vars {
    use super::*;

    #[test]
    fn comparison_infers_the_sibling_type() {
        let engine = Engine::new();
        let node = engine.parse("a == 1 && b != 'x'").expect("parse");
        let vars = engine.vars(&node);
        assert_eq!(vars.get("a"), Some(&ValueType::Int), "got: {vars:?}");
        assert_eq!(vars.get("b"), Some(&ValueType::String));
    }

    #[test]
    fn function_arguments_infer_their_descriptor_type() {
        let engine = Engine::new();
        let node = engine.parse("upper(s)").expect("parse");
        assert_eq!(engine.vars(&node).get("s"), Some(&ValueType::String));
    }

    #[test]
    fn unparented_variables_are_any() {
        let engine = Engine::new();
        let node = engine.parse("x").expect("parse");
        assert_eq!(engine.vars(&node).get("x"), Some(&ValueType::Any));
    }

    #[test]
    fn works_on_compiled_operands_too() {
        let engine = Engine::new();
        let operand = engine.compile("a == 1 && b != 'x'").expect("compile");
        let vars = engine.vars(&operand);
        assert_eq!(vars.get("a"), Some(&ValueType::Int));
        assert_eq!(vars.get("b"), Some(&ValueType::String));
    }
}

mod constants {
    use super::*;

    #[test]
    fn collects_literals_with_their_types() {
        let engine = Engine::new();
        let node = engine.parse("n + 1 + 'x'").expect("parse");
        let constants = engine.constants(&node);
        assert_eq!(constants.get("1"), Some(&ValueType::Int));
        assert_eq!(constants.get("x"), Some(&ValueType::String));
    }
}

mod operators {
    use super::*;

    #[test]
    fn reports_operator_categories() {
        let engine = Engine::new();
        let node = engine.parse("a + b == 2").expect("parse");
        let operators = engine.operators(&node);
        assert_eq!(operators.get("+"), Some(&Category::Arithmetic));
        assert_eq!(operators.get("=="), Some(&Category::Comparison));
    }

    #[test]
    fn assignment_category() {
        let engine = Engine::new();
        let node = engine.parse("a += 1").expect("parse");
        assert_eq!(engine.operators(&node).get("+="), Some(&Category::Assignment));
    }
}

mod functions {
    use super::*;

    #[test]
    fn reports_referenced_functions_with_metadata() {
        let engine = Engine::new();
        let node = engine.parse("abs(n) + length(s)").expect("parse");
        let functions = engine.functions(&node);
        assert_eq!(functions.len(), 2, "got: {functions:?}");
        assert_eq!(functions.get("length").map(|m| m.return_type), Some(ValueType::Int));
    }

    #[test]
    fn unregistered_methods_are_skipped() {
        let engine = Engine::new();
        let node = engine.parse("'a'.frobnicate()").expect("parse");
        assert!(engine.functions(&node).is_empty());
    }
}

mod operand_type {
    use super::*;

    #[test]
    fn constants_report_their_own_type() {
        let engine = Engine::new();
        let node = engine.parse("'x'").expect("parse");
        assert_eq!(engine.operand_type(&node), ValueType::String);
    }

    #[test]
    fn operators_report_their_declared_return_type() {
        let engine = Engine::new();
        let node = engine.parse("a == b").expect("parse");
        assert_eq!(engine.operand_type(&node), ValueType::Bool);
    }

    #[test]
    fn bare_variables_are_any() {
        let engine = Engine::new();
        let node = engine.parse("whatever").expect("parse");
        assert_eq!(engine.operand_type(&node), ValueType::Any);
    }
}
