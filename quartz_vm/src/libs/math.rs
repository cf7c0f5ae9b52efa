//! Numeric constants and functions.

use quartz_core::{args, Environment, Result, Value};

use crate::corelib::{install, NativeEntry};

const FUNCTIONS: &[NativeEntry] = &[
    NativeEntry {
        name: "floor",
        doc: "Returns the largest integer less than or equal to x.",
        fun: math_floor,
    },
    NativeEntry {
        name: "ceil",
        doc: "Returns the smallest integer greater than or equal to x.",
        fun: math_ceil,
    },
    NativeEntry {
        name: "sqrt",
        doc: "Returns the square root of x.",
        fun: math_sqrt,
    },
    NativeEntry {
        name: "abs",
        doc: "Returns the absolute value of x.",
        fun: math_abs,
    },
    NativeEntry {
        name: "pow",
        doc: "Returns x raised to the power y.",
        fun: math_pow,
    },
];

pub fn install_lib(env: &Environment) {
    install(env, Some("math"), FUNCTIONS);
    env.def(
        "math/pi",
        Value::Number(std::f64::consts::PI),
        Some("The ratio of a circle's circumference to its diameter."),
    );
    env.def(
        "math/e",
        Value::Number(std::f64::consts::E),
        Some("The base of the natural logarithm."),
    );
    env.def(
        "math/inf",
        Value::Number(f64::INFINITY),
        Some("Positive infinity."),
    );
}

fn unary(name: &str, arguments: &[Value], f: impl Fn(f64) -> f64) -> Result<Value> {
    args::fixarity(name, arguments, 1)?;
    let x = args::number(name, arguments, 0)?;
    Ok(Value::Number(f(x)))
}

fn math_floor(arguments: &[Value]) -> Result<Value> {
    unary("math/floor", arguments, f64::floor)
}

fn math_ceil(arguments: &[Value]) -> Result<Value> {
    unary("math/ceil", arguments, f64::ceil)
}

fn math_sqrt(arguments: &[Value]) -> Result<Value> {
    unary("math/sqrt", arguments, f64::sqrt)
}

fn math_abs(arguments: &[Value]) -> Result<Value> {
    unary("math/abs", arguments, f64::abs)
}

fn math_pow(arguments: &[Value]) -> Result<Value> {
    args::fixarity("math/pow", arguments, 2)?;
    let x = args::number("math/pow", arguments, 0)?;
    let y = args::number("math/pow", arguments, 1)?;
    Ok(Value::Number(x.powf(y)))
}
