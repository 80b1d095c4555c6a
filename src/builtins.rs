//! Host builtin table and the preloaded `math` module.
//!
//! Builtins report failures as position-free diagnostics; the interpreter
//! stamps the call site onto them.

use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;

use crate::{
    diagnostics::Diagnostic,
    runtime::{Emitter, RuntimeEvent},
    value::{FunctionValue, RuntimeFn, Value, ValueKind},
};

fn add(
    table: &mut IndexMap<String, RuntimeFn>,
    name: &str,
    callback: impl Fn(&[Value]) -> Result<Value, Diagnostic> + 'static,
) {
    table.insert(name.to_string(), Rc::new(callback));
}

/// Builds the default builtin table. These names shadow user function
/// declarations.
pub fn install(emitter: Emitter, deterministic: bool) -> IndexMap<String, RuntimeFn> {
    let mut table = IndexMap::new();

    add(&mut table, "len", |args| {
        let [arg] = args else {
            return Err(Diagnostic::runtime("len expects exactly 1 argument"));
        };
        match &*arg.0 {
            ValueKind::Str(s) => Ok(Value::number(s.chars().count() as f64)),
            ValueKind::Array(elements) => Ok(Value::number(elements.len() as f64)),
            _ => Err(Diagnostic::runtime("len expects a string or array")),
        }
    });

    add(&mut table, "type", |args| {
        let [arg] = args else {
            return Err(Diagnostic::runtime("type expects exactly 1 argument"));
        };
        Ok(Value::string(arg.type_name()))
    });

    add(&mut table, "print", move |args| {
        let [arg] = args else {
            return Err(Diagnostic::runtime("print expects exactly 1 argument"));
        };
        emitter.emit(&RuntimeEvent::Output(arg.to_string()));
        Ok(Value::null())
    });

    add(&mut table, "keys", |args| {
        let [arg] = args else {
            return Err(Diagnostic::runtime("keys expects exactly 1 argument"));
        };
        match &*arg.0 {
            ValueKind::Object(entries) => Ok(Value::array(
                entries.keys().map(|key| Value::string(key.clone())).collect(),
            )),
            _ => Err(Diagnostic::runtime("keys expects an object")),
        }
    });

    add(&mut table, "values", |args| {
        let [arg] = args else {
            return Err(Diagnostic::runtime("values expects exactly 1 argument"));
        };
        match &*arg.0 {
            ValueKind::Object(entries) => {
                Ok(Value::array(entries.values().cloned().collect()))
            }
            _ => Err(Diagnostic::runtime("values expects an object")),
        }
    });

    add(&mut table, "map", |args| {
        let (elements, callback) = array_and_function(args, "map")?;
        let mut mapped = Vec::with_capacity(elements.len());
        for element in elements {
            mapped.push(callback(&[element.clone()])?);
        }
        Ok(Value::array(mapped))
    });

    add(&mut table, "filter", |args| {
        let (elements, callback) = array_and_function(args, "filter")?;
        let mut kept = Vec::new();
        for element in elements {
            if callback(&[element.clone()])?.is_truthy() {
                kept.push(element.clone());
            }
        }
        Ok(Value::array(kept))
    });

    add(&mut table, "trim", |args| {
        Ok(Value::string(one_string(args, "trim")?.trim()))
    });

    add(&mut table, "split", |args| {
        let (subject, delimiter) = match args {
            [a, b] => (a.as_str(), b.as_str()),
            _ => (None, None),
        };
        let (Some(subject), Some(delimiter)) = (subject, delimiter) else {
            return Err(Diagnostic::runtime("split expects string and delimiter"));
        };
        Ok(Value::array(
            subject.split(delimiter).map(Value::string).collect(),
        ))
    });

    add(&mut table, "lower", |args| {
        Ok(Value::string(one_string(args, "lower")?.to_lowercase()))
    });

    add(&mut table, "upper", |args| {
        Ok(Value::string(one_string(args, "upper")?.to_uppercase()))
    });

    add(&mut table, "isNumber", |args| {
        let [arg] = args else {
            return Err(Diagnostic::runtime("isNumber expects one argument"));
        };
        Ok(Value::bool(matches!(&*arg.0, ValueKind::Number(_))))
    });

    add(&mut table, "isString", |args| {
        let [arg] = args else {
            return Err(Diagnostic::runtime("isString expects one argument"));
        };
        Ok(Value::bool(matches!(&*arg.0, ValueKind::Str(_))))
    });

    add(&mut table, "isArray", |args| {
        let [arg] = args else {
            return Err(Diagnostic::runtime("isArray expects one argument"));
        };
        Ok(Value::bool(matches!(&*arg.0, ValueKind::Array(_))))
    });

    add(&mut table, "now", move |args| {
        if !args.is_empty() {
            return Err(Diagnostic::runtime("now expects no arguments"));
        }
        if deterministic {
            return Ok(Value::number(0.0));
        }
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as f64)
            .unwrap_or(0.0);
        Ok(Value::number(millis))
    });

    add(&mut table, "sleep", |args| {
        // The language has no real async; sleep validates and returns.
        match args {
            [arg] if matches!(&*arg.0, ValueKind::Number(_)) => Ok(Value::null()),
            _ => Err(Diagnostic::runtime("sleep expects one number (milliseconds)")),
        }
    });

    table
}

fn one_string<'a>(args: &'a [Value], name: &str) -> Result<&'a str, Diagnostic> {
    match args {
        [arg] => arg
            .as_str()
            .ok_or_else(|| Diagnostic::runtime(format!("{name} expects one string"))),
        _ => Err(Diagnostic::runtime(format!("{name} expects one string"))),
    }
}

fn array_and_function<'a>(
    args: &'a [Value],
    name: &str,
) -> Result<(&'a [Value], RuntimeFn), Diagnostic> {
    let [array, function] = args else {
        return Err(Diagnostic::runtime(format!(
            "{name} expects exactly 2 arguments"
        )));
    };
    let ValueKind::Array(elements) = &*array.0 else {
        return Err(Diagnostic::runtime(format!(
            "{name} expects array and function"
        )));
    };
    match &*function.0 {
        ValueKind::Function(FunctionValue::Native(native)) => {
            Ok((elements, native.callback.clone()))
        }
        _ => Err(Diagnostic::runtime(format!(
            "{name} expects array and function"
        ))),
    }
}

fn math_fn(
    exports: &mut IndexMap<String, Value>,
    name: &'static str,
    callback: impl Fn(&[Value]) -> Result<Value, Diagnostic> + 'static,
) {
    exports.insert(name.to_string(), Value::native_fn(name, Rc::new(callback)));
}

fn one_number(args: &[Value], message: &'static str) -> Result<f64, Diagnostic> {
    match args {
        [arg] => arg.as_number().ok_or_else(|| Diagnostic::runtime(message)),
        _ => Err(Diagnostic::runtime(message)),
    }
}

/// Exports of the preloaded `math` module.
pub fn math_module(deterministic: bool) -> IndexMap<String, Value> {
    let mut exports = IndexMap::new();
    exports.insert("pi".to_string(), Value::number(std::f64::consts::PI));
    math_fn(&mut exports, "sqrt", |args| {
        Ok(Value::number(one_number(args, "sqrt expects one number")?.sqrt()))
    });
    math_fn(&mut exports, "pow", |args| {
        let (Some(base), Some(exponent)) = (match args {
            [a, b] => (a.as_number(), b.as_number()),
            _ => (None, None),
        }) else {
            return Err(Diagnostic::runtime("pow expects two numbers"));
        };
        Ok(Value::number(base.powf(exponent)))
    });
    math_fn(&mut exports, "abs", |args| {
        Ok(Value::number(one_number(args, "abs expects one number")?.abs()))
    });
    math_fn(&mut exports, "round", |args| {
        Ok(Value::number(one_number(args, "round expects one number")?.round()))
    });
    math_fn(&mut exports, "floor", |args| {
        Ok(Value::number(one_number(args, "floor expects one number")?.floor()))
    });
    math_fn(&mut exports, "ceil", |args| {
        Ok(Value::number(one_number(args, "ceil expects one number")?.ceil()))
    });
    math_fn(&mut exports, "random", move |args| {
        if !args.is_empty() {
            return Err(Diagnostic::runtime("random expects no arguments"));
        }
        if deterministic {
            return Ok(Value::number(0.5));
        }
        Ok(Value::number(rand::random::<f64>()))
    });
    exports
}
