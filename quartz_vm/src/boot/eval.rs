//! Slim evaluator for boot source, `compile`, and the REPL.
//!
//! Special forms: `def`, `fn`, `quote`, `if`, `do`, `while`, `set`. Symbols
//! resolve through the environment chain; everything else is a call through
//! the single calling convention. Guest functions close over their
//! definition environment; a `&` marker collects trailing arguments into a
//! rest tuple.

use std::sync::Arc;

use quartz_core::{Arity, Callable, Environment, GuestFn, QuartzError, Result, Value};

use crate::boot::reader::Reader;
use crate::interp;

/// Evaluate one form in `env`.
pub fn eval(env: &Environment, form: &Value) -> Result<Value> {
    match form {
        Value::Symbol(name) => env
            .get(name)
            .ok_or_else(|| QuartzError::symbol(format!("unknown symbol {name}"))),
        Value::Tuple(items) => {
            if items.bracketed() {
                let mut built = Vec::with_capacity(items.len());
                for item in items.iter() {
                    built.push(eval(env, item)?);
                }
                return Ok(Value::bracket_tuple(built));
            }
            if items.is_empty() {
                return Err(QuartzError::value("cannot evaluate an empty form"));
            }
            if let Value::Symbol(head) = &items[0] {
                match &**head {
                    "quote" => return special_quote(&items[1..]),
                    "if" => return special_if(env, &items[1..]),
                    "do" => return eval_body(env, &items[1..]),
                    "def" => return special_def(env, &items[1..]),
                    "set" => return special_set(env, &items[1..]),
                    "while" => return special_while(env, &items[1..]),
                    "fn" => return special_fn(env, &items[1..]),
                    _ => {}
                }
            }
            let fun = eval(env, &items[0])?;
            let mut call_args = Vec::with_capacity(items.len() - 1);
            for item in &items[1..] {
                call_args.push(eval(env, item)?);
            }
            interp::call(&fun, &call_args)
        }
        other => Ok(other.clone()),
    }
}

/// Evaluate every form in `src`, returning the value of the last one.
pub fn eval_source(env: &Environment, src: &str) -> Result<Value> {
    let mut reader = Reader::new(src);
    let mut result = Value::Nil;
    while let Some(form) = reader.next_form()? {
        result = eval(env, &form)?;
    }
    Ok(result)
}

/// Invoke a guest function: bind parameters in a child of the closure
/// environment and evaluate the body.
pub fn call_guest(fun: &Arc<GuestFn>, args: &[Value]) -> Result<Value> {
    let arity = if fun.rest.is_some() {
        Arity::AtLeast(fun.params.len() as u32)
    } else {
        Arity::Exact(fun.params.len() as u32)
    };
    arity.check(&fun.name, args.len())?;

    let env = fun.env.child();
    // Named functions can call themselves without being defined yet.
    env.def(
        &fun.name,
        Value::Function(Callable::Guest(fun.clone())),
        None,
    );
    for (param, arg) in fun.params.iter().zip(args) {
        env.def(param, arg.clone(), None);
    }
    if let Some(rest) = &fun.rest {
        env.def(
            rest,
            Value::tuple(args[fun.params.len()..].to_vec()),
            None,
        );
    }
    eval_body(&env, &fun.body)
}

fn eval_body(env: &Environment, forms: &[Value]) -> Result<Value> {
    let mut result = Value::Nil;
    for form in forms {
        result = eval(env, form)?;
    }
    Ok(result)
}

// =========================================================================
// Special forms
// =========================================================================

fn special_quote(args: &[Value]) -> Result<Value> {
    match args {
        [form] => Ok(form.clone()),
        _ => Err(QuartzError::value("quote expects one form")),
    }
}

fn special_if(env: &Environment, args: &[Value]) -> Result<Value> {
    let (cond, then, otherwise) = match args {
        [cond, then] => (cond, then, None),
        [cond, then, otherwise] => (cond, then, Some(otherwise)),
        _ => return Err(QuartzError::value("if expects two or three forms")),
    };
    if eval(env, cond)?.is_truthy() {
        eval(env, then)
    } else {
        match otherwise {
            Some(form) => eval(env, form),
            None => Ok(Value::Nil),
        }
    }
}

fn special_def(env: &Environment, args: &[Value]) -> Result<Value> {
    let (name, doc, form) = match args {
        [name, form] => (name, None, form),
        [name, Value::Str(doc), form] => (name, Some(&**doc), form),
        _ => {
            return Err(QuartzError::value(
                "def expects a name, an optional docstring, and a value",
            ));
        }
    };
    let Value::Symbol(name) = name else {
        return Err(QuartzError::value(format!(
            "def expects a symbol name, got {}",
            name.type_name()
        )));
    };
    let value = eval(env, form)?;
    env.def(name, value.clone(), doc);
    Ok(value)
}

fn special_set(env: &Environment, args: &[Value]) -> Result<Value> {
    let [name, form] = args else {
        return Err(QuartzError::value("set expects a name and a value"));
    };
    let Value::Symbol(name) = name else {
        return Err(QuartzError::value(format!(
            "set expects a symbol name, got {}",
            name.type_name()
        )));
    };
    let value = eval(env, form)?;
    if !env.set(name, value.clone()) {
        return Err(QuartzError::symbol(format!(
            "cannot set unbound symbol {name}"
        )));
    }
    Ok(value)
}

fn special_while(env: &Environment, args: &[Value]) -> Result<Value> {
    let Some((cond, body)) = args.split_first() else {
        return Err(QuartzError::value("while expects a condition"));
    };
    while eval(env, cond)?.is_truthy() {
        eval_body(env, body)?;
    }
    Ok(Value::Nil)
}

fn special_fn(env: &Environment, args: &[Value]) -> Result<Value> {
    let (name, rest_forms) = match args.first() {
        Some(Value::Symbol(name)) => (name.clone(), &args[1..]),
        _ => (Arc::from("anonymous"), args),
    };
    let Some(Value::Tuple(param_forms)) = rest_forms.first() else {
        return Err(QuartzError::value("fn expects a parameter tuple"));
    };

    let mut params = Vec::new();
    let mut rest = None;
    let mut forms = param_forms.iter();
    while let Some(form) = forms.next() {
        let Value::Symbol(param) = form else {
            return Err(QuartzError::value(format!(
                "fn parameters must be symbols, got {}",
                form.type_name()
            )));
        };
        if &**param == "&" {
            match (forms.next(), forms.next()) {
                (Some(Value::Symbol(tail)), None) => {
                    rest = Some(tail.clone());
                    break;
                }
                _ => {
                    return Err(QuartzError::value(
                        "fn expects exactly one parameter after &",
                    ));
                }
            }
        }
        params.push(param.clone());
    }

    Ok(Value::Function(Callable::Guest(Arc::new(GuestFn {
        name,
        params: params.into_boxed_slice(),
        rest,
        body: rest_forms[1..].to_vec().into_boxed_slice(),
        env: env.clone(),
    }))))
}
