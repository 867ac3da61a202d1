use console_runtime::{ErrorCode, Interpreter, Numeric, RawValue, Value};

fn eval(expression: &str) -> Value {
    Interpreter::new().evaluate(expression)
}

fn error_code(expression: &str) -> ErrorCode {
    match eval(expression) {
        Value::Error(err) => err.code,
        other => panic!("expected an error from {expression:?}, got {other:?}"),
    }
}

#[test]
fn literals_round_trip_to_native_values() {
    assert_eq!(eval("42").raw_value(), Some(RawValue::Int(42)));
    assert_eq!(eval("42L").raw_value(), Some(RawValue::Int(42)));
    assert_eq!(eval("3.14").raw_value(), Some(RawValue::Float(3.14)));
    assert_eq!(eval("3.14f").raw_value(), Some(RawValue::Float(3.14)));
    assert_eq!(eval("true").raw_value(), Some(RawValue::Bool(true)));
    assert_eq!(eval("\"x\"").raw_value(), Some(RawValue::Str("x".into())));
    assert_eq!(eval("\"tab\\there\"").raw_value(), Some(RawValue::Str("tab\there".into())));
    let null = eval("null");
    assert!(null.is_null());
    assert_eq!(null.raw_value(), None);
    assert_eq!(eval("-17").raw_value(), Some(RawValue::Int(-17)));
}

#[test]
fn precedence_and_associativity() {
    assert_eq!(eval("2 + 3 * 4").raw_value(), Some(RawValue::Int(14)));
    assert_eq!(eval("(2+3)*4").raw_value(), Some(RawValue::Int(20)));
    assert_eq!(eval("true || false && false").raw_value(), Some(RawValue::Bool(true)));
    assert_eq!(eval("(true||false)&&false").raw_value(), Some(RawValue::Bool(false)));
    assert_eq!(eval("10 - 4 - 3").raw_value(), Some(RawValue::Int(3)));
    assert_eq!(eval("2 * 3 % 4").raw_value(), Some(RawValue::Int(2)));
    assert_eq!(eval("1 + 2 == 3").raw_value(), Some(RawValue::Bool(true)));
    assert_eq!(eval("1 < 2 == 2 > 1").raw_value(), Some(RawValue::Bool(true)));
    assert_eq!(eval("2 * -3").raw_value(), Some(RawValue::Int(-6)));
    assert_eq!(eval("-(1 + 2) * 2").raw_value(), Some(RawValue::Int(-6)));
}

#[test]
fn division_is_float_and_zero_is_an_error() {
    let quotient = eval("10/3");
    assert!(matches!(quotient.as_numeric(), Some(Numeric::Float(_))));
    assert_eq!(eval("9/3").as_numeric(), Some(Numeric::Float(3.0)));
    assert_eq!(error_code("10/0"), ErrorCode::DivideByZero);
    assert_eq!(error_code("10%0"), ErrorCode::DivideByZero);
    assert_eq!(eval("7 % 3").raw_value(), Some(RawValue::Int(1)));
}

#[test]
fn integer_overflow_is_reported() {
    assert_eq!(error_code("9223372036854775807 + 1"), ErrorCode::Overflow);
    assert_eq!(error_code("99999999999999999999"), ErrorCode::Overflow);
}

#[test]
fn strings_concatenate_and_compare() {
    assert_eq!(eval("\"hp=\" + 3").format(), "hp=3");
    assert_eq!(eval("\"a\" + \"b\" == \"ab\"").format(), "true");
    assert_eq!(eval("\"apple\" < \"banana\"").format(), "true");
    assert_eq!(eval("\"a;b\".Length").format(), "3");
}

#[test]
fn malformed_input_is_a_parse_error() {
    assert_eq!(error_code(""), ErrorCode::ParseError);
    assert_eq!(error_code("(1 + 2"), ErrorCode::ParseError);
    assert_eq!(error_code("1 +"), ErrorCode::ParseError);
    assert_eq!(error_code("\"open"), ErrorCode::ParseError);
    assert_eq!(error_code("a b"), ErrorCode::ParseError);
}

#[test]
fn type_errors_are_classified() {
    assert_eq!(error_code("true + 1"), ErrorCode::InvalidArgumentType);
    assert_eq!(error_code("!3"), ErrorCode::InvalidArgumentType);
    assert_eq!(error_code("-\"x\""), ErrorCode::InvalidArgumentType);
    assert_eq!(error_code("3[0]"), ErrorCode::InvalidArgumentType);
    assert_eq!(error_code("\"abc\"[5]"), ErrorCode::IndexOutOfRange);
}

#[test]
fn errors_expose_no_capabilities() {
    let err = eval("1/0");
    assert!(err.is_error());
    assert!(err.as_numeric().is_none());
    assert!(err.as_string_like().is_none());
    assert!(err.as_indexable().is_none());
    assert!(err.as_member_accessible().is_none());
    assert!(err.as_callable().is_none());
}

#[test]
fn execute_formats_each_statement() {
    let mut console = Interpreter::new();
    insta::assert_snapshot!(console.execute("x = 3+4; y = x * 2; y - x"), @r###"
    x = 7
    y = 14
    7
    "###);
    assert_eq!(console.evaluate("x").raw_value(), Some(RawValue::Int(7)));
    insta::assert_snapshot!(console.execute("x = 1; z = x / 0; x = 2"), @r###"
    x = 1
    error[DivideByZero]: division by zero
    "###);
    assert_eq!(console.evaluate("x").format(), "1");
    insta::assert_snapshot!(console.execute("#frame = 3"), @"error[InvalidArgumentType]: '#frame' is read-only");
}

#[test]
fn variables_can_be_listed_and_cleared() {
    let mut console = Interpreter::new();
    console.execute("b = 2; a = 1");
    assert_eq!(console.variable_names(), vec!["a".to_string(), "b".to_string()]);
    console.clear_variables();
    assert!(console.variable_names().is_empty());
    assert_eq!(
        console.execute("a"),
        "error[MemberNotFound]: 'a' is not a variable, function or type"
    );
}
