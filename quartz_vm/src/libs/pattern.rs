//! Glob-style pattern matching.
//!
//! `*` matches any run of bytes, `?` matches exactly one byte, and
//! everything else matches literally. Matching is iterative with a
//! single backtrack point per star, so pathological patterns stay
//! linear in the subject length.

use quartz_core::{args, Environment, Result, Value};

use crate::corelib::{install, NativeEntry};

const FUNCTIONS: &[NativeEntry] = &[NativeEntry {
    name: "match",
    doc: "(pattern/match pattern subject)\n\nReturns true when the \
          glob pattern matches the whole subject. * matches any run \
          of characters and ? matches exactly one.",
    fun: pattern_match,
}];

pub fn install_lib(env: &Environment) {
    install(env, Some("pattern"), FUNCTIONS);
}

fn pattern_match(arguments: &[Value]) -> Result<Value> {
    args::fixarity("pattern/match", arguments, 2)?;
    let pattern = args::text("pattern/match", arguments, 0)?;
    let subject = args::text("pattern/match", arguments, 1)?;
    Ok(Value::Boolean(glob_match(
        pattern.as_bytes(),
        subject.as_bytes(),
    )))
}

fn glob_match(pattern: &[u8], subject: &[u8]) -> bool {
    let mut p = 0;
    let mut s = 0;
    // Resume points for the most recent star.
    let mut star_p = usize::MAX;
    let mut star_s = 0;
    while s < subject.len() {
        if p < pattern.len() && (pattern[p] == b'?' || pattern[p] == subject[s]) {
            p += 1;
            s += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star_p = p;
            star_s = s;
            p += 1;
        } else if star_p != usize::MAX {
            // Widen the last star by one byte and retry.
            p = star_p + 1;
            star_s += 1;
            s = star_s;
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&b| b == b'*')
}
