//! Binary value snapshots.
//!
//! A snapshot is `QIMG`, a little-endian u16 format version, one tagged
//! value, and a crc32 trailer over everything before it. Heap values are
//! numbered as they are written and later occurrences become back
//! references, so shared structure and cycles (a table holding itself, the
//! `_env` self-binding) survive a round trip. Mutable containers are
//! numbered before their contents; immutable values after, once their
//! contents exist.
//!
//! Natives are written by registered name and resolved through the native
//! registry on read. Fibers and abstract values do not marshal.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use quartz_core::{
    Arity, BindFlags, Callable, Environment, GuestFn, Instruction, QuartzError, Result, Value,
    ValueMap,
};

use crate::corelib;

const MAGIC: &[u8; 4] = b"QIMG";
const VERSION: u16 = 1;

const TAG_NIL: u8 = 0;
const TAG_FALSE: u8 = 1;
const TAG_TRUE: u8 = 2;
const TAG_NUMBER: u8 = 3;
const TAG_STR: u8 = 4;
const TAG_SYMBOL: u8 = 5;
const TAG_KEYWORD: u8 = 6;
const TAG_BUFFER: u8 = 7;
const TAG_TUPLE: u8 = 8;
const TAG_ARRAY: u8 = 9;
const TAG_TABLE: u8 = 10;
const TAG_STRUCT: u8 = 11;
const TAG_ENVIRONMENT: u8 = 12;
const TAG_NATIVE: u8 = 13;
const TAG_THUNK: u8 = 14;
const TAG_GUEST: u8 = 15;
const TAG_BACKREF: u8 = 16;

const ARITY_EXACT: u8 = 0;
const ARITY_RANGE: u8 = 1;
const ARITY_AT_LEAST: u8 = 2;

/// Nesting bound for both directions; cycles that only pass through
/// immutable values cannot back-reference and would otherwise recurse.
const MAX_DEPTH: usize = 256;

/// Encode one value as a snapshot.
pub fn marshal(value: &Value) -> Result<Vec<u8>> {
    let mut writer = Writer {
        out: Vec::new(),
        seen: FxHashMap::default(),
        next: 0,
        depth: 0,
    };
    writer.out.extend_from_slice(MAGIC);
    writer.out.extend_from_slice(&VERSION.to_le_bytes());
    writer.value(value)?;
    let mut out = writer.out;
    let crc = crc32fast::hash(&out);
    write_u32(&mut out, crc);
    Ok(out)
}

/// Decode a snapshot produced by [`marshal`].
pub fn unmarshal(data: &[u8]) -> Result<Value> {
    if data.len() < MAGIC.len() + 2 + 4 {
        return Err(QuartzError::value("truncated image"));
    }
    let (payload, crc_bytes) = data.split_at(data.len() - 4);
    let mut off = 0;
    let expected = read_u32(crc_bytes, &mut off)?;
    let actual = crc32fast::hash(payload);
    if expected != actual {
        return Err(QuartzError::value(format!(
            "image checksum mismatch: expected {expected:#010x}, found {actual:#010x}"
        )));
    }
    if &payload[..MAGIC.len()] != MAGIC {
        return Err(QuartzError::value("bad image magic"));
    }
    let mut off = MAGIC.len();
    let version = read_u16(payload, &mut off)?;
    if version != VERSION {
        return Err(QuartzError::value(format!(
            "unsupported image version {version}"
        )));
    }
    let mut reader = Reader {
        data: payload,
        off,
        seen: Vec::new(),
        depth: 0,
    };
    let value = reader.value()?;
    if reader.off != payload.len() {
        return Err(QuartzError::value("trailing bytes in image"));
    }
    Ok(value)
}

// =========================================================================
// Writer
// =========================================================================

struct Writer {
    out: Vec<u8>,
    seen: FxHashMap<usize, u32>,
    next: u32,
    depth: usize,
}

impl Writer {
    /// Emit a back reference if `ptr` was numbered already.
    fn backref(&mut self, ptr: usize) -> bool {
        match self.seen.get(&ptr) {
            Some(&index) => {
                self.out.push(TAG_BACKREF);
                write_u32(&mut self.out, index);
                true
            }
            None => false,
        }
    }

    fn mark(&mut self, ptr: usize) {
        self.seen.insert(ptr, self.next);
        self.next += 1;
    }

    fn value(&mut self, v: &Value) -> Result<()> {
        if self.depth >= MAX_DEPTH {
            return Err(QuartzError::value("value nesting too deep to marshal"));
        }
        self.depth += 1;
        let result = self.value_inner(v);
        self.depth -= 1;
        result
    }

    fn value_inner(&mut self, v: &Value) -> Result<()> {
        match v {
            Value::Nil => self.out.push(TAG_NIL),
            Value::Boolean(false) => self.out.push(TAG_FALSE),
            Value::Boolean(true) => self.out.push(TAG_TRUE),
            Value::Number(n) => {
                self.out.push(TAG_NUMBER);
                write_f64(&mut self.out, *n);
            }
            Value::Str(s) => self.text(TAG_STR, s),
            Value::Symbol(s) => self.text(TAG_SYMBOL, s),
            Value::Keyword(s) => self.text(TAG_KEYWORD, s),
            Value::Buffer(b) => {
                let ptr = Arc::as_ptr(b) as usize;
                if self.backref(ptr) {
                    return Ok(());
                }
                self.out.push(TAG_BUFFER);
                write_bytes(&mut self.out, &b.read());
                self.mark(ptr);
            }
            Value::Tuple(items) => {
                let ptr = Arc::as_ptr(items) as *const () as usize;
                if self.backref(ptr) {
                    return Ok(());
                }
                self.out.push(TAG_TUPLE);
                self.out.push(items.bracketed() as u8);
                write_u32(&mut self.out, items.len() as u32);
                for item in items.iter() {
                    self.value(item)?;
                }
                self.mark(ptr);
            }
            Value::Array(items) => {
                let ptr = Arc::as_ptr(items) as usize;
                if self.backref(ptr) {
                    return Ok(());
                }
                self.mark(ptr);
                self.out.push(TAG_ARRAY);
                let items = items.read().clone();
                write_u32(&mut self.out, items.len() as u32);
                for item in &items {
                    self.value(item)?;
                }
            }
            Value::Table(map) => {
                let ptr = Arc::as_ptr(map) as usize;
                if self.backref(ptr) {
                    return Ok(());
                }
                self.mark(ptr);
                self.out.push(TAG_TABLE);
                let map = map.read().clone();
                self.pairs(&map)?;
            }
            Value::Struct(map) => {
                let ptr = Arc::as_ptr(map) as usize;
                if self.backref(ptr) {
                    return Ok(());
                }
                self.out.push(TAG_STRUCT);
                self.pairs(map)?;
                self.mark(ptr);
            }
            Value::Environment(env) => {
                let ptr = env.as_ptr() as usize;
                if self.backref(ptr) {
                    return Ok(());
                }
                self.mark(ptr);
                self.out.push(TAG_ENVIRONMENT);
                match env.parent() {
                    Some(parent) => {
                        self.out.push(1);
                        self.value(&Value::Environment(parent))?;
                    }
                    None => self.out.push(0),
                }
                let entries = env.entries();
                write_u32(&mut self.out, entries.len() as u32);
                for (name, binding) in entries {
                    write_text(&mut self.out, &name);
                    self.value(&binding.value)?;
                    write_opt_text(&mut self.out, binding.doc.as_deref());
                    write_u32(&mut self.out, binding.flags.bits());
                }
            }
            Value::Function(Callable::Native(f)) => {
                let ptr = Arc::as_ptr(f) as usize;
                if self.backref(ptr) {
                    return Ok(());
                }
                self.out.push(TAG_NATIVE);
                write_text(&mut self.out, &f.name);
                self.mark(ptr);
            }
            Value::Function(Callable::Thunk(def)) => {
                let ptr = Arc::as_ptr(def) as usize;
                if self.backref(ptr) {
                    return Ok(());
                }
                self.out.push(TAG_THUNK);
                write_text(&mut self.out, def.name());
                write_opt_text(&mut self.out, def.doc().map(|d| &**d));
                self.arity(def.arity());
                write_u32(&mut self.out, def.flags().bits());
                write_u32(&mut self.out, def.slot_count());
                write_u32(&mut self.out, def.code().len() as u32);
                for inst in def.code() {
                    write_u32(&mut self.out, inst.word());
                }
                self.mark(ptr);
            }
            Value::Function(Callable::Guest(f)) => {
                let ptr = Arc::as_ptr(f) as usize;
                if self.backref(ptr) {
                    return Ok(());
                }
                self.out.push(TAG_GUEST);
                write_text(&mut self.out, &f.name);
                write_u32(&mut self.out, f.params.len() as u32);
                for param in f.params.iter() {
                    write_text(&mut self.out, param);
                }
                write_opt_text(&mut self.out, f.rest.as_deref());
                write_u32(&mut self.out, f.body.len() as u32);
                for form in f.body.iter() {
                    self.value(form)?;
                }
                self.value(&Value::Environment(f.env.clone()))?;
                self.mark(ptr);
            }
            Value::Fiber(_) | Value::Abstract(_) => {
                return Err(QuartzError::value(format!(
                    "cannot marshal a {}",
                    v.type_name()
                )));
            }
        }
        Ok(())
    }

    fn text(&mut self, tag: u8, s: &Arc<str>) {
        let ptr = s.as_ptr() as usize;
        if self.backref(ptr) {
            return;
        }
        self.out.push(tag);
        write_text(&mut self.out, s);
        self.mark(ptr);
    }

    fn pairs(&mut self, map: &ValueMap) -> Result<()> {
        write_u32(&mut self.out, map.len() as u32);
        for (key, value) in map {
            self.value(key)?;
            self.value(value)?;
        }
        Ok(())
    }

    fn arity(&mut self, arity: Arity) {
        match arity {
            Arity::Exact(n) => {
                self.out.push(ARITY_EXACT);
                write_u32(&mut self.out, n);
            }
            Arity::Range(min, max) => {
                self.out.push(ARITY_RANGE);
                write_u32(&mut self.out, min);
                write_u32(&mut self.out, max);
            }
            Arity::AtLeast(min) => {
                self.out.push(ARITY_AT_LEAST);
                write_u32(&mut self.out, min);
            }
        }
    }
}

// =========================================================================
// Reader
// =========================================================================

struct Reader<'a> {
    data: &'a [u8],
    off: usize,
    seen: Vec<Value>,
    depth: usize,
}

impl Reader<'_> {
    fn value(&mut self) -> Result<Value> {
        if self.depth >= MAX_DEPTH {
            return Err(QuartzError::value("value nesting too deep in image"));
        }
        self.depth += 1;
        let result = self.value_inner();
        self.depth -= 1;
        result
    }

    fn value_inner(&mut self) -> Result<Value> {
        let tag = read_u8(self.data, &mut self.off)?;
        match tag {
            TAG_NIL => Ok(Value::Nil),
            TAG_FALSE => Ok(Value::Boolean(false)),
            TAG_TRUE => Ok(Value::Boolean(true)),
            TAG_NUMBER => Ok(Value::Number(read_f64(self.data, &mut self.off)?)),
            TAG_STR => {
                let text = read_text(self.data, &mut self.off)?;
                let value = Value::from(text);
                self.seen.push(value.clone());
                Ok(value)
            }
            TAG_SYMBOL => {
                let text = read_text(self.data, &mut self.off)?;
                let value = Value::symbol(&text);
                self.seen.push(value.clone());
                Ok(value)
            }
            TAG_KEYWORD => {
                let text = read_text(self.data, &mut self.off)?;
                let value = Value::keyword(&text);
                self.seen.push(value.clone());
                Ok(value)
            }
            TAG_BUFFER => {
                let bytes = read_blob(self.data, &mut self.off)?;
                let value = Value::buffer(bytes);
                self.seen.push(value.clone());
                Ok(value)
            }
            TAG_TUPLE => {
                let bracketed = match read_u8(self.data, &mut self.off)? {
                    0 => false,
                    1 => true,
                    other => {
                        return Err(QuartzError::value(format!(
                            "invalid tuple marker {other:#04x} in image"
                        )))
                    }
                };
                let count = read_u32(self.data, &mut self.off)? as usize;
                let mut items = Vec::new();
                for _ in 0..count {
                    items.push(self.value()?);
                }
                let value = if bracketed {
                    Value::bracket_tuple(items)
                } else {
                    Value::tuple(items)
                };
                self.seen.push(value.clone());
                Ok(value)
            }
            TAG_ARRAY => {
                // Shell first so children may refer back to it.
                let value = Value::array(Vec::new());
                self.seen.push(value.clone());
                let count = read_u32(self.data, &mut self.off)? as usize;
                for _ in 0..count {
                    let item = self.value()?;
                    if let Value::Array(items) = &value {
                        items.write().push(item);
                    }
                }
                Ok(value)
            }
            TAG_TABLE => {
                let value = Value::table(ValueMap::default());
                self.seen.push(value.clone());
                let count = read_u32(self.data, &mut self.off)? as usize;
                for _ in 0..count {
                    let key = self.value()?;
                    let item = self.value()?;
                    if let Value::Table(map) = &value {
                        map.write().insert(key, item);
                    }
                }
                Ok(value)
            }
            TAG_STRUCT => {
                let count = read_u32(self.data, &mut self.off)? as usize;
                let mut map = ValueMap::default();
                for _ in 0..count {
                    let key = self.value()?;
                    let item = self.value()?;
                    map.insert(key, item);
                }
                let value = Value::structure(map);
                self.seen.push(value.clone());
                Ok(value)
            }
            TAG_ENVIRONMENT => {
                let env = Environment::new();
                self.seen.push(Value::Environment(env.clone()));
                let has_parent = read_u8(self.data, &mut self.off)?;
                if has_parent == 1 {
                    match self.value()? {
                        Value::Environment(parent) => env.set_parent(Some(parent)),
                        other => {
                            return Err(QuartzError::value(format!(
                                "environment parent must be an environment, got {}",
                                other.type_name()
                            )));
                        }
                    }
                }
                let count = read_u32(self.data, &mut self.off)? as usize;
                for _ in 0..count {
                    let name = read_text(self.data, &mut self.off)?;
                    let value = self.value()?;
                    let doc = read_opt_text(self.data, &mut self.off)?;
                    let flags = BindFlags::from_bits(read_u32(self.data, &mut self.off)?);
                    env.def_binding(
                        quartz_core::symbol::intern(&name),
                        quartz_core::Binding {
                            value,
                            doc: doc.map(Arc::from),
                            flags,
                        },
                    );
                }
                Ok(Value::Environment(env))
            }
            TAG_NATIVE => {
                let name = read_text(self.data, &mut self.off)?;
                let native = corelib::registered(&name).ok_or_else(|| {
                    QuartzError::symbol(format!("unknown native function {name} in image"))
                })?;
                let value = Value::Function(Callable::Native(native));
                self.seen.push(value.clone());
                Ok(value)
            }
            TAG_THUNK => {
                let name = read_text(self.data, &mut self.off)?;
                let doc = read_opt_text(self.data, &mut self.off)?;
                let arity = self.arity()?;
                let flags = quartz_core::DefFlags::from_bits(read_u32(
                    self.data,
                    &mut self.off,
                )?);
                let slots = read_u32(self.data, &mut self.off)?;
                let count = read_u32(self.data, &mut self.off)? as usize;
                let mut code = Vec::new();
                for _ in 0..count {
                    code.push(Instruction::from_word(read_u32(self.data, &mut self.off)?));
                }
                // Assembling re-verifies the program, so a corrupt image
                // cannot smuggle wild slot indices past the interpreter.
                let def = quartz_asm::assemble(&name, doc.as_deref(), arity, flags, slots, &code)?;
                let value = Value::Function(Callable::Thunk(def));
                self.seen.push(value.clone());
                Ok(value)
            }
            TAG_GUEST => {
                let name = read_text(self.data, &mut self.off)?;
                let count = read_u32(self.data, &mut self.off)? as usize;
                let mut params = Vec::new();
                for _ in 0..count {
                    params.push(Arc::<str>::from(read_text(self.data, &mut self.off)?));
                }
                let rest = read_opt_text(self.data, &mut self.off)?.map(Arc::from);
                let body_count = read_u32(self.data, &mut self.off)? as usize;
                let mut body = Vec::new();
                for _ in 0..body_count {
                    body.push(self.value()?);
                }
                let env = match self.value()? {
                    Value::Environment(env) => env,
                    other => {
                        return Err(QuartzError::value(format!(
                            "guest function environment must be an environment, got {}",
                            other.type_name()
                        )));
                    }
                };
                let value = Value::Function(Callable::Guest(Arc::new(GuestFn {
                    name: Arc::from(name),
                    params: params.into_boxed_slice(),
                    rest,
                    body: body.into_boxed_slice(),
                    env,
                })));
                self.seen.push(value.clone());
                Ok(value)
            }
            TAG_BACKREF => {
                let index = read_u32(self.data, &mut self.off)? as usize;
                self.seen.get(index).cloned().ok_or_else(|| {
                    QuartzError::value(format!("invalid back reference {index} in image"))
                })
            }
            other => Err(QuartzError::value(format!(
                "unknown image tag {other:#04x}"
            ))),
        }
    }

    fn arity(&mut self) -> Result<Arity> {
        let tag = read_u8(self.data, &mut self.off)?;
        match tag {
            ARITY_EXACT => Ok(Arity::Exact(read_u32(self.data, &mut self.off)?)),
            ARITY_RANGE => {
                let min = read_u32(self.data, &mut self.off)?;
                let max = read_u32(self.data, &mut self.off)?;
                Ok(Arity::Range(min, max))
            }
            ARITY_AT_LEAST => Ok(Arity::AtLeast(read_u32(self.data, &mut self.off)?)),
            other => Err(QuartzError::value(format!(
                "unknown arity tag {other:#04x}"
            ))),
        }
    }
}

// =========================================================================
// Byte helpers
// =========================================================================

fn write_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn write_f64(buf: &mut Vec<u8>, v: f64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn write_text(buf: &mut Vec<u8>, s: &str) {
    write_bytes(buf, s.as_bytes());
}

fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_u32(buf, bytes.len() as u32);
    buf.extend_from_slice(bytes);
}

fn write_opt_text(buf: &mut Vec<u8>, s: Option<&str>) {
    match s {
        Some(s) => {
            buf.push(1);
            write_text(buf, s);
        }
        None => buf.push(0),
    }
}

fn read_exact<'a>(data: &'a [u8], off: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = off
        .checked_add(len)
        .ok_or_else(|| QuartzError::value("truncated image"))?;
    if end > data.len() {
        return Err(QuartzError::value("truncated image"));
    }
    let bytes = &data[*off..end];
    *off = end;
    Ok(bytes)
}

fn read_u8(data: &[u8], off: &mut usize) -> Result<u8> {
    Ok(read_exact(data, off, 1)?[0])
}

fn read_u16(data: &[u8], off: &mut usize) -> Result<u16> {
    let bytes = read_exact(data, off, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u32(data: &[u8], off: &mut usize) -> Result<u32> {
    let bytes = read_exact(data, off, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_f64(data: &[u8], off: &mut usize) -> Result<f64> {
    let bytes = read_exact(data, off, 8)?;
    Ok(f64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ]))
}

fn read_text(data: &[u8], off: &mut usize) -> Result<String> {
    let bytes = read_blob(data, off)?;
    String::from_utf8(bytes).map_err(|_| QuartzError::value("invalid text in image"))
}

fn read_blob(data: &[u8], off: &mut usize) -> Result<Vec<u8>> {
    let len = read_u32(data, off)? as usize;
    Ok(read_exact(data, off, len)?.to_vec())
}

fn read_opt_text(data: &[u8], off: &mut usize) -> Result<Option<String>> {
    match read_u8(data, off)? {
        0 => Ok(None),
        1 => Ok(Some(read_text(data, off)?)),
        other => Err(QuartzError::value(format!(
            "invalid optional marker {other:#04x} in image"
        ))),
    }
}
