use quip::{Context, Engine, ExpressionError, TreeRecord, Value};

mod nodes {
    use super::*;

    #[test]
    fn round_trip_preserves_structure() {
        let engine = Engine::new();
        let node = engine
            .parse("if(a > 0){b = 1}else{b = 2}; b")
            .expect("parse");
        let record = engine.serialize(&node);
        let back = engine.deserialize_node(&record).expect("deserialize");
        assert_eq!(back, node);
    }

    #[test]
    fn round_trip_covers_every_control_construct() {
        let engine = Engine::new();
        for src in [
            "s = 0; for(x in xs){s += x}; s",
            "for(i = 0; i < 3; i += 1){ if(i == 1){continue}; s += i }",
            "switch(k){case 'a': 1; case 'b': 2; default: 0}",
            "while(i < 5){ if(i > 3){break}; i += 1 }",
            "[1,2].map(x => x * x)",
            "{name: 'x', n: 1 + 2}",
        ] {
            let node = engine.parse(src).expect("parse");
            let record = engine.serialize(&node);
            let back = engine.deserialize_node(&record).expect("deserialize");
            assert_eq!(back, node, "round trip changed: {src}");
        }
    }

    #[test]
    fn wire_form_is_the_n_t_c_shape() {
        let engine = Engine::new();
        let node = engine.parse("1 + 2").expect("parse");
        let json = engine.serialize_json(&node).expect("serialize");
        assert_eq!(
            json,
            r#"{"n":"+","t":"operator","c":[{"n":1,"t":"constant"},{"n":2,"t":"constant"}]}"#
        );
    }

    #[test]
    fn json_round_trip() {
        let engine = Engine::new();
        let node = engine.parse("a.b.trim()").expect("parse");
        let json = engine.serialize_json(&node).expect("serialize");
        let back = engine.deserialize_node_json(&json).expect("deserialize");
        assert_eq!(back, node);
    }

    #[test]
    fn unknown_kind_tag_is_rejected() {
        let engine = Engine::new();
        let record = TreeRecord {
            name: Value::from("x"),
            kind: "bogus".to_owned(),
            children: Vec::new(),
        };
        let err = engine.deserialize_node(&record).expect_err("should reject");
        assert!(matches!(err, ExpressionError::Serialize { .. }), "got: {err:?}");
    }

    #[test]
    fn malformed_json_is_rejected() {
        let engine = Engine::new();
        let err = engine.deserialize_node_json("{").expect_err("should reject");
        assert!(matches!(err, ExpressionError::Serialize { .. }), "got: {err:?}");
    }
}

mod operands {
    use super::*;

    #[test]
    fn deserialized_operands_evaluate_like_the_original() {
        let engine = Engine::new();
        let operand = engine.compile("a + 2 * b").expect("compile");
        let json = engine.serialize_json(&operand).expect("serialize");
        let back = engine.deserialize_operand_json(&json).expect("deserialize");

        let mut ctx = Context::new();
        ctx.insert("a", 1);
        ctx.insert("b", 3);
        let original = engine.eval(&operand, &mut ctx).expect("eval original");
        let mut ctx2 = Context::new();
        ctx2.insert("a", 1);
        ctx2.insert("b", 3);
        let rebuilt = engine.eval(&back, &mut ctx2).expect("eval rebuilt");
        assert_eq!(original, Value::Int(7));
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn operand_kind_tags_are_capitalized() {
        let engine = Engine::new();
        let operand = engine.compile("a + 1").expect("compile");
        let json = engine.serialize_json(&operand).expect("serialize");
        assert!(json.contains(r#""t":"Operator""#), "got: {json}");
        assert!(json.contains(r#""t":"Variable""#), "got: {json}");
    }

    #[test]
    fn custom_operators_survive_the_round_trip() {
        let engine = Engine::new();
        let operand = engine.compile("a = 1; a && b").expect("compile");
        let record = engine.serialize(&operand);
        let back = engine.deserialize_operand(&record).expect("deserialize");
        let result = engine.eval(&back, &mut Context::new()).expect("eval");
        // a = 1, then a && b: a is truthy so the result is b, which is null
        assert_eq!(result, Value::Null);
    }
}
