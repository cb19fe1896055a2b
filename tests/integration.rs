use chemlang::error::ErrorHandler;
use chemlang::periodic_table::PeriodicTable;
use chemlang::value::{stringify, Value};

fn table() -> PeriodicTable {
    let mut handler = ErrorHandler::new();
    PeriodicTable::from_json_str(
        r#"{
            "H": {"AtomicMass": "1.008"},
            "O": {"AtomicMass": "16.00"},
            "Na": {"AtomicMass": "22.99"},
            "Cl": {"AtomicMass": "35.45"},
            "C": {"AtomicMass": "12.01"}
        }"#,
        &mut handler,
    )
    .unwrap()
}

fn eval(src: &str) -> Value {
    let mut handler = ErrorHandler::new();
    chemlang::run_source(src, table(), &mut handler)
        .unwrap_or_else(|e| panic!("{src:?} failed to evaluate: {e}"))
}

fn eval_err(src: &str) -> String {
    let mut handler = ErrorHandler::new();
    chemlang::run_source(src, table(), &mut handler)
        .expect_err(&format!("{src:?} was expected to fail"))
        .to_string()
}

fn magnitude(v: &Value) -> i64 {
    match v {
        Value::Quantity(q) => q.magnitude.to_i64(),
        other => panic!("expected a quantity, got {other:?}"),
    }
}

#[test]
fn arithmetic_respects_precedence_and_grouping() {
    assert_eq!(magnitude(&eval("2 + 3 * 4\n")), 14);
    assert_eq!(magnitude(&eval("(2 + 3) * 4\n")), 20);
}

#[test]
fn exponentiation_is_repeated_multiplication() {
    assert_eq!(magnitude(&eval("2.000 ^ 10\n")), 1024);
}

#[test]
fn variables_assign_and_compound_assign() {
    let v = eval("x = 10\nx -= 3\nx *= 2\nx\n");
    assert_eq!(magnitude(&v), 14);
}

#[test]
fn recursive_work_computes_factorial() {
    let src = "\
work fact(n)
    exam n <= 1
        submit 1
    fail
        submit n * fact(n - 1)
fact(6)
";
    assert_eq!(magnitude(&eval(src)), 720);
}

#[test]
fn work_falling_through_without_submit_yields_na() {
    let src = "\
work noop(x)
    x + 1
noop(5)
";
    assert_eq!(stringify(&eval(src)), "na");
}

#[test]
fn closures_observe_later_assignment_to_captured_scope() {
    // `adder` is closed over `n`; reassigning `n` after the work is
    // declared is still visible through the closure, matching the
    // in-place-mutation semantics of the environment arena.
    let src = "\
n = 1
work adder(x)
    submit x + n
n = 10
adder(5)
";
    assert_eq!(magnitude(&eval(src)), 15);
}

#[test]
fn during_loop_collects_each_iteration_result() {
    let src = "\
i = 0
during i < 4
    i += 1
";
    match eval(src) {
        Value::List(items) => {
            let rendered: Vec<i64> = items.iter().map(magnitude).collect();
            assert_eq!(rendered, vec![1, 2, 3, 4]);
        }
        other => panic!("expected a list, got {other:?}"),
    }
}

#[test]
fn redo_binds_loop_variable_from_interval() {
    // 1...3 is exclusive of its end, matching Python's range(1, 3): only
    // i=1 and i=2 run.
    let src = "\
total = 0
redo i of 1...3
    total += i
total
";
    assert_eq!(magnitude(&eval(src)), 3);
}

#[test]
fn exam_without_fail_branch_returns_na_when_condition_is_false() {
    assert_eq!(stringify(&eval("exam fail\n    1\n")), "na");
}

#[test]
fn makeup_chains_into_nested_exam() {
    let src = "\
x = 2
exam x == 1
    1
makeup exam x == 2
    2
fail
    3
";
    assert_eq!(magnitude(&eval(src)), 2);
}

#[test]
fn formula_literal_evaluates_to_molecular_mass() {
    // H2O: 2*1.008 + 16.00 = 18.016 gram/mole.
    let v = eval("H2O\n");
    match v {
        Value::Quantity(q) => assert!((q.magnitude.to_f64() - 18.016).abs() < 1e-9),
        other => panic!("expected a quantity, got {other:?}"),
    }
}

#[test]
fn quantity_converts_between_units_of_the_same_dimension() {
    assert_eq!(magnitude(&eval("1 kilogram -> gram\n")), 1000);
}

#[test]
fn quantity_conversion_through_a_balanced_reaction() {
    // 2 H2 + O2 -> 2 H2O; 4 gram of H2 converts through the balanced
    // reaction into moles of H2O, then into grams of H2O.
    let src = "4 gram H2 : H2 + O2 -> H2O : -> H2O -> gram\n";
    match eval(src) {
        Value::Quantity(q) => assert!(q.magnitude.to_f64() > 0.0),
        other => panic!("expected a quantity, got {other:?}"),
    }
}

#[test]
fn comparisons_and_boolean_operators() {
    assert_eq!(stringify(&eval("1 < 2 and 2 < 3\n")), "pass");
    assert_eq!(stringify(&eval("1 > 2 or 3 >= 3\n")), "pass");
    assert_eq!(stringify(&eval("!pass\n")), "fail");
}

#[test]
fn string_interpolation_embeds_expressions() {
    let v = eval("x = 3\ns'x is {x}'\n");
    assert_eq!(stringify(&v), "x is 3");
}

#[test]
fn undefined_variable_is_a_name_error() {
    let message = eval_err("y + 1\n");
    assert!(message.contains("not found"), "unexpected message: {message}");
}

#[test]
fn calling_a_work_with_wrong_arity_is_an_arity_error() {
    let src = "\
work add(a, b)
    submit a + b
add(1)
";
    let message = eval_err(src);
    assert!(message.contains("argument"), "unexpected message: {message}");
}

#[test]
fn adding_a_quantity_to_a_boolean_is_a_type_error() {
    let message = eval_err("1 gram + pass\n");
    assert!(!message.is_empty());
}
