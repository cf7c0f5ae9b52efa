//! Library collaborator modules installed during boot.
//!
//! Each module is one static native table registered under a name prefix.

pub mod array;
pub mod buffer;
pub mod compile;
pub mod debug;
pub mod fiber;
pub mod io;
pub mod marsh;
pub mod math;
pub mod os;
pub mod parse;
pub mod string;
pub mod table;
pub mod tuple;

#[cfg(feature = "assembler")]
pub mod asm;
#[cfg(feature = "bigint")]
pub mod bigint;
#[cfg(feature = "pattern")]
pub mod pattern;
#[cfg(feature = "typed-array")]
pub mod typed_array;

use quartz_core::{args, QuartzError, Result, Value};

/// Optional integer argument; an explicit nil counts as absent.
pub(crate) fn opt_integer(name: &str, arguments: &[Value], i: usize) -> Result<Option<i64>> {
    match args::opt(arguments, i) {
        None | Some(Value::Nil) => Ok(None),
        Some(_) => Ok(Some(args::integer(name, arguments, i)?)),
    }
}

/// Resolve one slice boundary. Negative indexes count back from the end,
/// with -1 naming the end itself.
fn half_range(name: &str, which: &str, raw: i64, len: usize) -> Result<usize> {
    let len = len as i64;
    let resolved = if raw < 0 { raw + len + 1 } else { raw };
    if resolved < 0 || resolved > len {
        return Err(QuartzError::range(format!(
            "{name}: slice {which} {raw} out of range for length {len}"
        )));
    }
    Ok(resolved as usize)
}

/// Resolve a start/end slice request against a length. A start past the
/// end yields an empty slice rather than an error.
pub(crate) fn slice_range(
    name: &str,
    len: usize,
    start: Option<i64>,
    end: Option<i64>,
) -> Result<(usize, usize)> {
    let start = half_range(name, "start", start.unwrap_or(0), len)?;
    let mut end = half_range(name, "end", end.unwrap_or(len as i64), len)?;
    if end < start {
        end = start;
    }
    Ok((start, end))
}
