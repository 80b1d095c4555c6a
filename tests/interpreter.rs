use std::{cell::RefCell, rc::Rc};

use calla::{
    diagnostics::{CallaError, Diagnostic, DiagnosticKind},
    runtime::{Interpreter, RuntimeEvent, RuntimeOptions},
    value::{Value, ValueKind},
};

fn eval(source: &str) -> Value {
    let mut interpreter = Interpreter::default();
    interpreter
        .eval_source(source, None)
        .expect("evaluation should succeed")
}

fn eval_with(options: RuntimeOptions, source: &str) -> Result<Value, CallaError> {
    let mut interpreter = Interpreter::new(options);
    interpreter.eval_source(source, None)
}

fn eval_error(source: &str) -> Diagnostic {
    let mut interpreter = Interpreter::default();
    match interpreter.eval_source(source, None) {
        Ok(value) => panic!("expected error, received value {value}"),
        Err(CallaError::Diagnostic(diagnostic)) => diagnostic,
        Err(other) => panic!("expected diagnostic, received {other}"),
    }
}

fn run_output(source: &str) -> Vec<String> {
    let mut interpreter = Interpreter::default();
    let lines = Rc::new(RefCell::new(Vec::new()));
    let sink = lines.clone();
    interpreter.on(move |event| {
        if let RuntimeEvent::Output(line) = event {
            sink.borrow_mut().push(line.clone());
        }
    });
    interpreter
        .eval_source(source, None)
        .expect("evaluation should succeed");
    let lines = lines.borrow();
    lines.clone()
}

fn expect_number(value: &Value) -> f64 {
    match value.0.as_ref() {
        ValueKind::Number(n) => *n,
        _ => panic!("expected Number, found {}", value.type_name()),
    }
}

fn expect_str(value: &Value) -> &str {
    match value.0.as_ref() {
        ValueKind::Str(s) => s,
        _ => panic!("expected Str, found {}", value.type_name()),
    }
}

fn expect_bool(value: &Value) -> bool {
    match value.0.as_ref() {
        ValueKind::Bool(b) => *b,
        _ => panic!("expected Bool, found {}", value.type_name()),
    }
}

fn expect_array(value: &Value) -> &[Value] {
    match value.0.as_ref() {
        ValueKind::Array(elements) => elements,
        _ => panic!("expected Array, found {}", value.type_name()),
    }
}

#[test]
fn multiplication_binds_tighter_than_addition() {
    let value = eval("return 2 + 3 * 4");
    assert_eq!(expect_number(&value), 14.0);
    let value = eval("return (2 + 3) * 4");
    assert_eq!(expect_number(&value), 20.0);
}

#[test]
fn unary_minus_and_modulo() {
    let value = eval("return -7 % 3");
    assert_eq!(expect_number(&value), -1.0);
}

#[test]
fn range_is_inclusive_and_ascending() {
    let value = eval("return 1..4");
    let elements = expect_array(&value);
    assert_eq!(elements.len(), 4);
    assert_eq!(expect_number(&elements[0]), 1.0);
    assert_eq!(expect_number(&elements[3]), 4.0);
}

#[test]
fn descending_range_is_empty() {
    let value = eval("return 3..1");
    assert!(expect_array(&value).is_empty());
}

#[test]
fn plus_concatenates_when_either_side_is_a_string() {
    assert_eq!(expect_str(&eval("return \"n = \" + 42")), "n = 42");
    assert_eq!(expect_str(&eval("return 1 + \"st\"")), "1st");
}

#[test]
fn plus_rejects_non_numeric_non_string_operands() {
    let diagnostic = eval_error("return true + null");
    assert_eq!(diagnostic.message, "Invalid operands for +");
}

#[test]
fn arithmetic_requires_numbers() {
    let diagnostic = eval_error("return \"a\" - 1");
    assert_eq!(diagnostic.message, "Operator '-' requires number operands");
}

#[test]
fn equality_compares_display_strings() {
    assert!(expect_bool(&eval("return 1 == \"1\"")));
    assert!(!expect_bool(&eval("return 1 != \"1\"")));
    assert!(!expect_bool(&eval("return [1, 2] == [1, 3]")));
}

#[test]
fn logical_operators_short_circuit() {
    assert!(expect_bool(&eval("return 1 and \"x\"")));
    assert!(!expect_bool(&eval("return false and missing()")));
    assert!(expect_bool(&eval("return true or missing()")));
    assert!(expect_bool(&eval("return not false")));
}

#[test]
fn ternary_evaluates_one_branch() {
    assert_eq!(expect_number(&eval("return true ? 1 : missing()")), 1.0);
    assert_eq!(expect_number(&eval("return false ? missing() : 2")), 2.0);
}

#[test]
fn nil_coalescing_falls_back_on_null() {
    let value = eval("set x = null\nreturn x ?? 5");
    assert_eq!(expect_number(&value), 5.0);
    let value = eval("set x = 0\nreturn x ?? 5");
    assert_eq!(expect_number(&value), 0.0);
}

#[test]
fn optional_chain_tolerates_null_and_missing_keys() {
    assert_eq!(
        expect_str(&eval("set o = { name: \"amy\" }\nreturn o?.name")),
        "amy"
    );
    assert!(eval("set o = null\nreturn o?.name").is_null());
    assert!(eval("set o = { age: 3 }\nreturn o?.name").is_null());
    let diagnostic = eval_error("set o = 7\nreturn o?.name");
    assert_eq!(diagnostic.message, "Optional chaining only on objects");
}

#[test]
fn const_cannot_be_reassigned() {
    let diagnostic = eval_error("const x = 1\nset x = 2");
    assert_eq!(diagnostic.message, "Cannot reassign const variable 'x'");
}

#[test]
fn undefined_variable_carries_a_hint() {
    let diagnostic = eval_error("return nope");
    assert_eq!(diagnostic.kind, DiagnosticKind::Runtime);
    assert_eq!(diagnostic.message, "Undefined variable 'nope'");
    assert_eq!(
        diagnostic.hint.as_deref(),
        Some("Make sure the variable is defined before use")
    );
}

#[test]
fn callee_writes_do_not_leak_back() {
    let value = eval(
        "set x = 1\n\
         fn bump() {\n\
             set x = x + 2\n\
             return x\n\
         }\n\
         set y = bump()\n\
         return x + y",
    );
    // bump sees a copy of x, mutates only the copy.
    assert_eq!(expect_number(&value), 4.0);
}

#[test]
fn callee_sees_caller_bindings_across_two_levels() {
    let value = eval(
        "set base = 10\n\
         fn inner() {\n\
             return base + 1\n\
         }\n\
         fn outer() {\n\
             set base = base + 100\n\
             return inner()\n\
         }\n\
         return outer()",
    );
    // outer's copy holds 110; inner copies outer's frame.
    assert_eq!(expect_number(&value), 111.0);
}

#[test]
fn default_parameters_fill_omitted_arguments() {
    let value = eval(
        "fn greet(name, punct = \"!\") {\n\
             return name + punct\n\
         }\n\
         return greet(\"amy\")",
    );
    assert_eq!(expect_str(&value), "amy!");
}

#[test]
fn failed_default_does_not_leak_the_callee_frame() {
    // A default expression that errors must still unwind the callee frame,
    // or the enclosing function's locals end up on the caller's stack.
    let prelude = "fn broken(a = nope) {\n\
                       return a\n\
                   }\n\
                   fn wrapper() {\n\
                       set marker = 123\n\
                       try {\n\
                           set unused = broken()\n\
                       } catch err {\n\
                           set unused = 0\n\
                       }\n\
                       return marker\n\
                   }\n";
    let value = eval(&format!("{prelude}return wrapper()"));
    assert_eq!(expect_number(&value), 123.0);

    let diagnostic = eval_error(&format!("{prelude}set result = wrapper()\nreturn marker"));
    assert_eq!(diagnostic.message, "Undefined variable 'marker'");
}

#[test]
fn rest_parameter_collects_extra_arguments() {
    let value = eval(
        "fn tally(first, ...rest) {\n\
             return first + len(rest)\n\
         }\n\
         return tally(10, 1, 2, 3)",
    );
    assert_eq!(expect_number(&value), 13.0);
}

#[test]
fn arity_errors_name_the_expected_count() {
    let diagnostic = eval_error(
        "fn f(a) {\n\
             return a\n\
         }\n\
         return f()",
    );
    assert_eq!(diagnostic.message, "Function 'f' expects 1 arguments, got 0");
    let diagnostic = eval_error(
        "fn f(a, b = 2) {\n\
             return a\n\
         }\n\
         return f(1, 2, 3)",
    );
    assert_eq!(
        diagnostic.message,
        "Function 'f' expects at most 2 arguments, got 3"
    );
}

#[test]
fn builtins_shadow_user_functions() {
    let value = eval(
        "fn len(x) {\n\
             return 42\n\
         }\n\
         return len(\"abc\")",
    );
    assert_eq!(expect_number(&value), 3.0);
}

#[test]
fn registered_builtins_are_callable() {
    let mut interpreter = Interpreter::default();
    interpreter.register_builtin(
        "twice",
        Rc::new(|args: &[Value]| match args.first().and_then(Value::as_number) {
            Some(n) => Ok(Value::number(n * 2.0)),
            None => Err(Diagnostic::runtime("twice expects one number")),
        }),
    );
    let value = interpreter
        .eval_source("return twice(21)", None)
        .expect("evaluation should succeed");
    assert_eq!(expect_number(&value), 42.0);
}

#[test]
fn loop_and_for_honor_break_and_continue() {
    let value = eval(
        "set total = 0\n\
         for i in 1..10 {\n\
             check i == 3 {\n\
                 continue\n\
             }\n\
             check i == 6 {\n\
                 break\n\
             }\n\
             set total = total + i\n\
         }\n\
         return total",
    );
    // 1 + 2 + 4 + 5
    assert_eq!(expect_number(&value), 12.0);
}

#[test]
fn control_signals_are_invisible_to_catch() {
    let value = eval(
        "set total = 0\n\
         for i in 1..5 {\n\
             try {\n\
                 check i == 3 {\n\
                     continue\n\
                 }\n\
             } catch err {\n\
                 set total = total + 100\n\
             }\n\
             set total = total + i\n\
         }\n\
         return total",
    );
    assert_eq!(expect_number(&value), 12.0);
}

#[test]
fn break_outside_a_loop_is_an_error() {
    let diagnostic = eval_error("break");
    assert_eq!(diagnostic.message, "Cannot use 'break' outside of a loop");
}

#[test]
fn catch_binds_the_error_message() {
    let output = run_output(
        "try {\n\
             say nope\n\
         } catch err {\n\
             say err\n\
         }",
    );
    assert_eq!(output, vec!["Undefined variable 'nope'".to_string()]);
}

#[test]
fn finally_runs_even_without_catch() {
    let output = run_output(
        "try {\n\
             try {\n\
                 say missing\n\
             } finally {\n\
                 say \"cleanup\"\n\
             }\n\
         } catch err {\n\
             say \"caught\"\n\
         }",
    );
    assert_eq!(output, vec!["cleanup".to_string(), "caught".to_string()]);
}

#[test]
fn finally_runs_once_when_catch_body_errors() {
    let mut interpreter = Interpreter::default();
    let lines = Rc::new(RefCell::new(Vec::new()));
    let sink = lines.clone();
    interpreter.on(move |event| {
        if let RuntimeEvent::Output(line) = event {
            sink.borrow_mut().push(line.clone());
        }
    });
    let error = interpreter
        .eval_source(
            "try {\n\
                 say first\n\
             } catch err {\n\
                 say second\n\
             } finally {\n\
                 say \"cleanup\"\n\
             }",
            None,
        )
        .expect_err("error raised in the catch body should propagate");
    match error {
        CallaError::Diagnostic(diagnostic) => {
            assert_eq!(diagnostic.message, "Undefined variable 'second'")
        }
        other => panic!("expected diagnostic, received {other}"),
    }
    assert_eq!(lines.borrow().clone(), vec!["cleanup".to_string()]);
}

#[test]
fn switch_matches_by_display_string() {
    let value = eval(
        "set x = 1\n\
         switch x {\n\
             case \"1\":\n\
                 return \"string match\"\n\
             case 1:\n\
                 return \"number match\"\n\
         }\n\
         return \"none\"",
    );
    assert_eq!(expect_str(&value), "string match");
}

#[test]
fn switch_falls_back_to_default() {
    let value = eval(
        "switch 9 {\n\
             case 1:\n\
                 return \"one\"\n\
             default:\n\
                 return \"other\"\n\
         }",
    );
    assert_eq!(expect_str(&value), "other");
}

#[test]
fn conditions_must_be_boolean() {
    let diagnostic = eval_error("check 1 {\nsay 1\n}");
    assert_eq!(diagnostic.message, "Condition must evaluate to boolean");
}

#[test]
fn for_requires_a_syntactic_range() {
    let diagnostic = eval_error("for i in [1, 2] {\nsay i\n}");
    assert_eq!(diagnostic.message, "For loop range must be a range expression");
}

#[test]
fn array_index_is_bounds_checked() {
    let diagnostic = eval_error("set a = [1, 2]\nreturn a[5]");
    assert_eq!(
        diagnostic.message,
        "Cannot access index 5 on array of length 2"
    );
}

#[test]
fn array_index_rejects_nan_and_fractions() {
    let diagnostic = eval_error("set a = [1, 2]\nreturn a[0 / 0]");
    assert_eq!(
        diagnostic.message,
        "Cannot access index NaN on array of length 2"
    );
    let diagnostic = eval_error("set a = [1, 2]\nreturn a[3 / 2]");
    assert_eq!(
        diagnostic.message,
        "Cannot access index 1.5 on array of length 2"
    );
}

#[test]
fn object_index_hints_available_keys() {
    let diagnostic = eval_error("set o = { a: 1, b: 2 }\nreturn o[\"c\"]");
    assert_eq!(diagnostic.message, "Key \"c\" does not exist on object");
    assert_eq!(diagnostic.hint.as_deref(), Some("Available keys: a, b"));
}

#[test]
fn await_passes_its_operand_through() {
    let value = eval("return await 1 + 2");
    assert_eq!(expect_number(&value), 3.0);
}

#[test]
fn say_formats_integral_numbers_without_fraction() {
    assert_eq!(run_output("say 1 + 1"), vec!["2".to_string()]);
    assert_eq!(run_output("say 7 / 2"), vec!["3.5".to_string()]);
}

#[test]
fn step_budget_stops_runaway_loops() {
    let options = RuntimeOptions {
        max_steps: Some(10),
        ..RuntimeOptions::default()
    };
    let error = eval_with(options, "loop true {\nset x = 1\n}")
        .expect_err("budget should trip");
    match error {
        CallaError::Diagnostic(diagnostic) => {
            assert_eq!(diagnostic.message, "Execution step limit exceeded")
        }
        other => panic!("expected diagnostic, received {other}"),
    }
}

#[test]
fn deterministic_mode_pins_time_and_randomness() {
    let options = RuntimeOptions {
        deterministic: true,
        ..RuntimeOptions::default()
    };
    let value = eval_with(options, "use math { random }\nreturn now() + random()")
        .expect("evaluation should succeed");
    assert_eq!(expect_number(&value), 0.5);
}

#[test]
fn trace_emits_call_and_return_events() {
    let mut interpreter = Interpreter::new(RuntimeOptions {
        trace: true,
        ..RuntimeOptions::default()
    });
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    interpreter.on(move |event| {
        let label = match event {
            RuntimeEvent::Call { name, .. } => format!("call {name}"),
            RuntimeEvent::Return { name } => format!("return {name}"),
            RuntimeEvent::Output(_) | RuntimeEvent::Error(_) => return,
        };
        sink.borrow_mut().push(label);
    });
    interpreter
        .eval_source(
            "fn id(x) {\n\
                 return x\n\
             }\n\
             return id(1)",
            None,
        )
        .expect("evaluation should succeed");
    let events = events.borrow();
    assert_eq!(*events, vec!["call id".to_string(), "return id".to_string()]);
}

#[test]
fn runtime_errors_carry_a_stack_trace() {
    let diagnostic = eval_error(
        "fn inner() {\n\
             return missing\n\
         }\n\
         fn outer() {\n\
             return inner()\n\
         }\n\
         return outer()",
    );
    let names: Vec<&str> = diagnostic
        .stack_trace
        .iter()
        .map(|frame| frame.function_name.as_str())
        .collect();
    assert_eq!(names, vec!["outer", "inner"]);
}

#[test]
fn modules_load_lazily_through_the_resolver() {
    let mut interpreter = Interpreter::default();
    interpreter.set_resolver(|name| {
        (name == "greetings").then(|| "export hello \"hi\"\n".to_string())
    });
    let value = interpreter
        .eval_source("use greetings { hello }\nreturn hello", None)
        .expect("module should load");
    assert_eq!(expect_str(&value), "hi");
}

#[test]
fn import_is_an_alias_for_use() {
    let mut interpreter = Interpreter::default();
    interpreter.set_resolver(|name| {
        (name == "greetings").then(|| "export hello \"hi\"\n".to_string())
    });
    let value = interpreter
        .eval_source("import { hello } from \"greetings\"\nreturn hello", None)
        .expect("module should load");
    assert_eq!(expect_str(&value), "hi");
}

#[test]
fn unknown_modules_and_exports_are_errors() {
    let diagnostic = eval_error("use nothere { x }");
    assert_eq!(diagnostic.message, "Module 'nothere' not found");

    let mut interpreter = Interpreter::default();
    interpreter.set_resolver(|_| Some("export hello \"hi\"\n".to_string()));
    let error = interpreter
        .eval_source("use greetings { bye }", None)
        .expect_err("export should be missing");
    match error {
        CallaError::Diagnostic(diagnostic) => assert_eq!(
            diagnostic.message,
            "Module 'greetings' has no export 'bye'"
        ),
        other => panic!("expected diagnostic, received {other}"),
    }
}

#[test]
fn module_bindings_stay_isolated() {
    let mut interpreter = Interpreter::default();
    interpreter.set_resolver(|_| {
        Some("set secret = 7\nexport shown secret + 1\n".to_string())
    });
    let value = interpreter
        .eval_source("use m { shown }\nreturn shown", None)
        .expect("module should load");
    assert_eq!(expect_number(&value), 8.0);
    let diagnostic = eval_error("use m { secret }");
    assert_eq!(diagnostic.message, "Module 'm' not found");
}

#[test]
fn modules_can_export_functions() {
    let mut interpreter = Interpreter::default();
    interpreter.set_resolver(|_| {
        Some(
            "fn double(n) {\n\
                 return n * 2\n\
             }\n\
             export double\n"
                .to_string(),
        )
    });
    let value = interpreter
        .eval_source("use m { double }\nreturn double(21)", None)
        .expect("module should load");
    assert_eq!(expect_number(&value), 42.0);
}

#[test]
fn math_module_is_preloaded() {
    let value = eval("use math { sqrt, pow }\nreturn sqrt(9) + pow(2, 3)");
    assert_eq!(expect_number(&value), 11.0);
}

#[test]
fn builtin_helpers_cover_strings_arrays_and_types() {
    assert_eq!(expect_str(&eval("return upper(trim(\"  hi  \"))")), "HI");
    assert_eq!(expect_number(&eval("return len(split(\"a,b,c\", \",\"))")), 3.0);
    assert_eq!(expect_str(&eval("return type([1])")), "array");
    assert!(expect_bool(&eval("return isNumber(3)")));
    assert!(!expect_bool(&eval("return isString(3)")));
    let value = eval("return keys({ a: 1, b: 2 })");
    assert_eq!(expect_array(&value).len(), 2);
    assert_eq!(expect_str(&expect_array(&value)[0]), "a");
}

#[test]
fn syntax_errors_carry_position_and_hint() {
    let diagnostic = eval_error("set x == 1");
    assert_eq!(diagnostic.kind, DiagnosticKind::Syntax);
    assert_eq!(diagnostic.message, "Expected =");
    assert_eq!(
        diagnostic.hint.as_deref(),
        Some("Use \"=\" for assignment, not \"==\"")
    );
    assert_eq!(diagnostic.line, Some(1));
    assert!(diagnostic.column.is_some());
}

#[test]
fn expressions_are_not_statements() {
    let diagnostic = eval_error("1 + 2");
    assert_eq!(diagnostic.kind, DiagnosticKind::Syntax);
    assert_eq!(diagnostic.message, "Expected statement");
}

#[test]
fn unterminated_strings_are_syntax_errors() {
    let diagnostic = eval_error("say \"oops");
    assert_eq!(diagnostic.kind, DiagnosticKind::Syntax);
    assert_eq!(diagnostic.message, "Unterminated string");
}
