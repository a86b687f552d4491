use crate::error::{IotaError, IotaResult};
use crate::eval::Interp;
use crate::heap::{Heap, Object};
use crate::printer::print_val;
use crate::stream::{Direction, Stream};
use crate::value::Value;

/// Native procedure: `(interp, evaluated args, caller env) -> value`.
pub type NativeFn = fn(&mut Interp, Value, Value) -> IotaResult<Value>;

/// A primitive procedure. `Eval` and `Apply` are tags the evaluator
/// recognizes and handles itself; everything else is a native function.
#[derive(Clone, Copy)]
pub enum Primitive {
    Native { name: &'static str, func: NativeFn },
    Eval,
    Apply,
}

impl Primitive {
    pub fn name(&self) -> &'static str {
        match self {
            Primitive::Native { name, .. } => name,
            Primitive::Eval => "eval",
            Primitive::Apply => "apply",
        }
    }
}

const NATIVES: &[(&str, NativeFn)] = &[
    ("error", prim_error),
    ("null?", prim_is_null),
    ("nil?", prim_is_null),
    ("symbol?", prim_is_symbol),
    ("keyword?", prim_is_keyword),
    ("integer?", prim_is_integer),
    ("char?", prim_is_char),
    ("string?", prim_is_string),
    ("procedure?", prim_is_procedure),
    ("list?", prim_is_list),
    ("atom?", prim_is_atom),
    ("cons?", prim_is_cons),
    ("tagged-list?", prim_is_tagged_list),
    ("eof?", prim_is_eof),
    ("char->integer", prim_char_to_integer),
    ("integer->char", prim_integer_to_char),
    ("number->string", prim_number_to_string),
    ("string->number", prim_string_to_number),
    ("symbol->string", prim_symbol_to_string),
    ("string->symbol", prim_string_to_symbol),
    ("strcat", prim_strcat),
    ("+", prim_add),
    ("-", prim_sub),
    ("*", prim_mul),
    ("/", prim_div),
    ("=", prim_num_eq),
    ("<", prim_lt),
    (">", prim_gt),
    ("cons", prim_cons),
    ("car", prim_car),
    ("cdr", prim_cdr),
    ("set-car!", prim_set_car),
    ("set-cdr!", prim_set_cdr),
    ("list", prim_list),
    ("len", prim_len),
    ("reverse", prim_reverse),
    ("eq?", prim_eq),
    ("macroexpand", prim_macroexpand),
    ("read", prim_read),
    ("write", prim_write),
    ("global-env", prim_global_env),
    ("make-file-stream", prim_make_file_stream),
    ("make-socket-stream", prim_make_socket_stream),
    ("close-stream", prim_close_stream),
    ("gc", prim_gc),
];

/// Bind every primitive in the global environment.
pub fn install(interp: &mut Interp) -> IotaResult<()> {
    for &(name, func) in NATIVES {
        let id = interp
            .heap
            .alloc(Object::Primitive(Primitive::Native { name, func }))?;
        interp.define_global(name, Value::Primitive(id))?;
    }
    for prim in [Primitive::Eval, Primitive::Apply] {
        let id = interp.heap.alloc(Object::Primitive(prim))?;
        interp.define_global(prim.name(), Value::Primitive(id))?;
    }
    Ok(())
}

// ============================================================================
// Argument helpers
// ============================================================================

/// Exactly `N` arguments.
fn fixed<const N: usize>(heap: &Heap, name: &str, args: Value) -> IotaResult<[Value; N]> {
    let items = heap.list_to_vec(args)?;
    <[Value; N]>::try_from(items).map_err(|items| IotaError::arity(name, &N.to_string(), items.len()))
}

/// Between `min` and `max` arguments.
fn ranged(heap: &Heap, name: &str, args: Value, min: usize, max: usize) -> IotaResult<Vec<Value>> {
    let items = heap.list_to_vec(args)?;
    if items.len() < min || items.len() > max {
        return Err(IotaError::arity(
            name,
            &format!("{} to {}", min, max),
            items.len(),
        ));
    }
    Ok(items)
}

fn fixnum(name: &str, val: Value) -> IotaResult<i64> {
    val.as_fixnum()
        .ok_or_else(|| IotaError::type_error(name, "integer", val.type_name()))
}

fn fixnums(heap: &Heap, name: &str, args: Value) -> IotaResult<Vec<i64>> {
    heap.list_to_vec(args)?
        .into_iter()
        .map(|v| fixnum(name, v))
        .collect()
}

fn string_arg<'h>(heap: &'h Heap, name: &str, val: Value) -> IotaResult<&'h [u8]> {
    heap.string_bytes(val)
        .ok_or_else(|| IotaError::type_error(name, "string", val.type_name()))
}

fn truth(interp: &Interp, b: bool) -> Value {
    if b {
        interp.syms.t
    } else {
        Value::Nil
    }
}

// ============================================================================
// Predicates
// ============================================================================

fn predicate(interp: &Interp, name: &str, args: Value, test: fn(Value) -> bool) -> IotaResult<Value> {
    let [x] = fixed(&interp.heap, name, args)?;
    Ok(truth(interp, test(x)))
}

fn prim_is_null(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    predicate(interp, "null?", args, Value::is_nil)
}

fn prim_is_symbol(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    predicate(interp, "symbol?", args, Value::is_symbol)
}

fn prim_is_keyword(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    predicate(interp, "keyword?", args, Value::is_keyword)
}

fn prim_is_integer(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    predicate(interp, "integer?", args, |v| matches!(v, Value::Fixnum(_)))
}

fn prim_is_char(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    predicate(interp, "char?", args, |v| matches!(v, Value::Char(_)))
}

fn prim_is_string(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    predicate(interp, "string?", args, Value::is_string)
}

/// True for primitive and compound procedures alike.
fn prim_is_procedure(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    predicate(interp, "procedure?", args, Value::is_procedure)
}

fn prim_is_list(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    predicate(interp, "list?", args, Value::is_list)
}

fn prim_is_atom(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    predicate(interp, "atom?", args, Value::is_atom)
}

fn prim_is_cons(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    predicate(interp, "cons?", args, Value::is_cons)
}

/// (tagged-list? exp tag): exp is a pair whose car is the symbol tag.
fn prim_is_tagged_list(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    let [exp, tag] = fixed(&interp.heap, "tagged-list?", args)?;
    let tagged = exp.is_cons() && {
        let head = interp.heap.car(exp)?;
        head.is_symbol() && head == tag
    };
    Ok(truth(interp, tagged))
}

fn prim_is_eof(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    let [x] = fixed(&interp.heap, "eof?", args)?;
    Ok(truth(interp, x == interp.eof))
}

// ============================================================================
// Conversions
// ============================================================================

fn prim_char_to_integer(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    match fixed(&interp.heap, "char->integer", args)? {
        [Value::Char(c)] => Ok(Value::Fixnum(c as i64)),
        [other] => Err(IotaError::type_error("char->integer", "character", other.type_name())),
    }
}

fn prim_integer_to_char(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    let [x] = fixed(&interp.heap, "integer->char", args)?;
    let n = fixnum("integer->char", x)?;
    u8::try_from(n)
        .map(Value::Char)
        .map_err(|_| IotaError::Type(format!("integer->char: {} is not a byte", n)))
}

fn prim_number_to_string(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    let [x] = fixed(&interp.heap, "number->string", args)?;
    let n = fixnum("number->string", x)?;
    interp.heap.make_string(n.to_string())
}

/// Optional sign followed by decimal digits.
fn prim_string_to_number(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    let [x] = fixed(&interp.heap, "string->number", args)?;
    let bytes = string_arg(&interp.heap, "string->number", x)?;
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .map(Value::Fixnum)
        .ok_or_else(|| {
            IotaError::Type(format!(
                "string->number: {} is not a number",
                print_val(x, &interp.heap)
            ))
        })
}

fn prim_symbol_to_string(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    let [x] = fixed(&interp.heap, "symbol->string", args)?;
    let name = match x {
        Value::Symbol(_) => interp.heap.symbol_name(x).map(str::to_string),
        _ => None,
    }
    .ok_or_else(|| IotaError::type_error("symbol->string", "symbol", x.type_name()))?;
    interp.heap.make_string(name)
}

fn prim_string_to_symbol(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    let [x] = fixed(&interp.heap, "string->symbol", args)?;
    let name = String::from_utf8_lossy(string_arg(&interp.heap, "string->symbol", x)?).into_owned();
    interp.heap.intern_symbol(&name)
}

fn prim_strcat(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    let mut joined = Vec::new();
    for part in interp.heap.list_to_vec(args)? {
        joined.extend_from_slice(string_arg(&interp.heap, "strcat", part)?);
    }
    interp.heap.make_string(joined)
}

// ============================================================================
// Arithmetic
// ============================================================================

// Fixnum arithmetic wraps on overflow.

fn prim_add(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    let nums = fixnums(&interp.heap, "+", args)?;
    Ok(Value::Fixnum(nums.into_iter().fold(0, i64::wrapping_add)))
}

/// (- x y...): x minus the rest. A lone argument is returned unchanged.
fn prim_sub(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    let nums = fixnums(&interp.heap, "-", args)?;
    let Some((&first, rest)) = nums.split_first() else {
        return Ok(Value::Fixnum(0));
    };
    Ok(Value::Fixnum(rest.iter().fold(first, |acc, &n| acc.wrapping_sub(n))))
}

fn prim_mul(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    let nums = fixnums(&interp.heap, "*", args)?;
    Ok(Value::Fixnum(nums.into_iter().fold(1, i64::wrapping_mul)))
}

/// Truncating division, left to right.
fn prim_div(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    let nums = fixnums(&interp.heap, "/", args)?;
    let Some((&first, rest)) = nums.split_first() else {
        return Err(IotaError::arity("/", "at least 1", 0));
    };
    let mut acc = first;
    for &n in rest {
        if n == 0 {
            return Err(IotaError::Type("/: division by zero".into()));
        }
        acc = acc.wrapping_div(n);
    }
    Ok(Value::Fixnum(acc))
}

fn compare_chain(
    interp: &Interp,
    name: &str,
    args: Value,
    holds: fn(i64, i64) -> bool,
) -> IotaResult<Value> {
    let nums = fixnums(&interp.heap, name, args)?;
    Ok(truth(interp, nums.windows(2).all(|w| holds(w[0], w[1]))))
}

fn prim_num_eq(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    compare_chain(interp, "=", args, |a, b| a == b)
}

fn prim_lt(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    compare_chain(interp, "<", args, |a, b| a < b)
}

fn prim_gt(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    compare_chain(interp, ">", args, |a, b| a > b)
}

// ============================================================================
// Pairs and lists
// ============================================================================

fn prim_cons(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    let [a, b] = fixed(&interp.heap, "cons", args)?;
    interp.heap.cons(a, b)
}

fn prim_car(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    let [x] = fixed(&interp.heap, "car", args)?;
    interp.heap.car(x)
}

fn prim_cdr(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    let [x] = fixed(&interp.heap, "cdr", args)?;
    interp.heap.cdr(x)
}

/// (set-car! pair val): returns val.
fn prim_set_car(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    let [pair, val] = fixed(&interp.heap, "set-car!", args)?;
    interp.heap.set_car(pair, val)?;
    Ok(val)
}

/// (set-cdr! pair val): returns val.
fn prim_set_cdr(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    let [pair, val] = fixed(&interp.heap, "set-cdr!", args)?;
    interp.heap.set_cdr(pair, val)?;
    Ok(val)
}

fn prim_list(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    let items = interp.heap.list_to_vec(args)?;
    interp.heap.list(&items)
}

/// Length of a proper list. Any other atom counts as 1.
fn prim_len(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    let [x] = fixed(&interp.heap, "len", args)?;
    let n = if x.is_list() {
        interp.heap.list_len(x)?
    } else {
        1
    };
    Ok(Value::Fixnum(n as i64))
}

/// A fresh reversed copy; the argument is left untouched.
fn prim_reverse(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    let [list] = fixed(&interp.heap, "reverse", args)?;
    if !list.is_list() {
        return Err(IotaError::type_error("reverse", "list", list.type_name()));
    }
    let mut reversed = Value::Nil;
    let mut current = list;
    while current.is_cons() {
        let item = interp.heap.car(current)?;
        reversed = interp.heap.cons(item, reversed)?;
        current = interp.heap.cdr(current)?;
    }
    Ok(reversed)
}

fn prim_eq(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    let [a, b] = fixed(&interp.heap, "eq?", args)?;
    Ok(truth(interp, interp.heap.is_eq(a, b)))
}

// ============================================================================
// Evaluator access
// ============================================================================

/// (macroexpand '(mac arg...)): the operator is resolved in the caller's
/// environment.
fn prim_macroexpand(interp: &mut Interp, args: Value, env: Value) -> IotaResult<Value> {
    let [form] = fixed(&interp.heap, "macroexpand", args)?;
    let op = interp.heap.car(form)?;
    let mac = interp.eval(op, env)?;
    interp.macroexpand(mac, interp.heap.cdr(form)?)
}

fn prim_global_env(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    fixed::<0>(&interp.heap, "global-env", args)?;
    Ok(interp.global_env)
}

fn prim_error(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    let parts: Vec<String> = interp
        .heap
        .list_to_vec(args)?
        .into_iter()
        .map(|part| match interp.heap.string_bytes(part) {
            Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            None => print_val(part, &interp.heap),
        })
        .collect();
    Err(IotaError::User(parts.join(" ")))
}

fn prim_gc(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    fixed::<0>(&interp.heap, "gc", args)?;
    let stats = interp.heap.collect();
    Ok(Value::Fixnum(stats.free as i64))
}

// ============================================================================
// Streams
// ============================================================================

/// Resolve a stream argument, falling back to the binding of `default`
/// (`*stdin*` or `*stdout*`) in the caller's environment.
fn stream_or_default(
    interp: &mut Interp,
    name: &str,
    given: Option<Value>,
    default: &str,
    env: Value,
) -> IotaResult<Value> {
    let stream = match given {
        Some(s) => s,
        None => {
            let sym = interp.heap.intern_symbol(default)?;
            crate::env::lookup(&interp.heap, sym, env)?
        }
    };
    match stream {
        Value::Stream(_) => Ok(stream),
        other => Err(IotaError::type_error(name, "stream", other.type_name())),
    }
}

/// (read [stream])
fn prim_read(interp: &mut Interp, args: Value, env: Value) -> IotaResult<Value> {
    let items = ranged(&interp.heap, "read", args, 0, 1)?;
    let stream = stream_or_default(interp, "read", items.first().copied(), "*stdin*", env)?;
    interp.read(stream)
}

/// (write obj [stream]): printed form plus a newline. Returns t.
fn prim_write(interp: &mut Interp, args: Value, env: Value) -> IotaResult<Value> {
    let items = ranged(&interp.heap, "write", args, 1, 2)?;
    let stream = stream_or_default(interp, "write", items.get(1).copied(), "*stdout*", env)?;
    let mut text = print_val(items[0], &interp.heap);
    text.push('\n');
    interp.heap.stream_mut(stream)?.write_bytes(text.as_bytes())?;
    Ok(interp.syms.t)
}

fn direction_arg(interp: &Interp, name: &str, val: Value) -> IotaResult<Direction> {
    if !val.is_keyword() {
        return Err(IotaError::type_error(name, "keyword", val.type_name()));
    }
    Ok(if val == interp.syms.output {
        Direction::Output
    } else {
        Direction::Input
    })
}

/// (make-file-stream "path" :input|:output). The names "stdin" and
/// "stdout" give the standard streams.
fn prim_make_file_stream(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    let [path, dir] = fixed(&interp.heap, "make-file-stream", args)?;
    let path = String::from_utf8_lossy(string_arg(&interp.heap, "make-file-stream", path)?)
        .into_owned();
    let direction = direction_arg(interp, "make-file-stream", dir)?;
    match path.as_str() {
        "stdin" => Ok(interp.stdin),
        "stdout" => Ok(interp.stdout),
        _ => {
            let stream = Stream::open_file(&path, direction)?;
            log::debug!("opened file stream {} ({:?})", path, direction);
            interp.heap.make_stream(stream)
        }
    }
}

/// (make-socket-stream "host" port :input|:output)
fn prim_make_socket_stream(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    let [host, port, dir] = fixed(&interp.heap, "make-socket-stream", args)?;
    let host = String::from_utf8_lossy(string_arg(&interp.heap, "make-socket-stream", host)?)
        .into_owned();
    let port = fixnum("make-socket-stream", port)?;
    let port = u16::try_from(port)
        .map_err(|_| IotaError::Type(format!("make-socket-stream: bad port {}", port)))?;
    let direction = direction_arg(interp, "make-socket-stream", dir)?;
    let stream = Stream::connect(&host, port, direction)?;
    log::debug!("connected socket stream {}:{} ({:?})", host, port, direction);
    interp.heap.make_stream(stream)
}

fn prim_close_stream(interp: &mut Interp, args: Value, _env: Value) -> IotaResult<Value> {
    let [stream] = fixed(&interp.heap, "close-stream", args)?;
    interp.heap.stream_mut(stream)?.close()?;
    Ok(interp.syms.t)
}
