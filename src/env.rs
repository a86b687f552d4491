use crate::error::{IotaError, IotaResult};
use crate::heap::Heap;
use crate::value::Value;

// An environment is a list of frames, innermost first. A frame is a pair
// `(vars . vals)` of two lists in matching index order.

/// The global environment: a single empty frame over the empty environment.
pub fn setup(heap: &mut Heap) -> IotaResult<Value> {
    extend(heap, Value::Nil, Value::Nil, Value::Nil)
}

/// Prepend a frame binding `vars` to `vals` onto `base`.
pub fn extend(heap: &mut Heap, vars: Value, vals: Value, base: Value) -> IotaResult<Value> {
    let base = heap.root(base);
    let frame = heap.cons(vars, vals)?;
    heap.cons(frame, base.get())
}

/// The cell of the frame's value list that holds `var`, searching outward.
fn find_binding(heap: &Heap, var: Value, env: Value) -> IotaResult<Option<Value>> {
    let mut frames = env;
    while frames.is_cons() {
        let frame = heap.car(frames)?;
        let mut vars = heap.car(frame)?;
        let mut vals = heap.cdr(frame)?;
        while vars.is_cons() && vals.is_cons() {
            if heap.car(vars)? == var {
                return Ok(Some(vals));
            }
            vars = heap.cdr(vars)?;
            vals = heap.cdr(vals)?;
        }
        frames = heap.cdr(frames)?;
    }
    Ok(None)
}

fn unbound(heap: &Heap, var: Value) -> IotaError {
    IotaError::Unbound(heap.symbol_name(var).unwrap_or("?").to_string())
}

pub fn lookup(heap: &Heap, var: Value, env: Value) -> IotaResult<Value> {
    match find_binding(heap, var, env)? {
        Some(cell) => heap.car(cell),
        None => Err(unbound(heap, var)),
    }
}

/// Mutate the nearest existing binding of `var`.
pub fn set(heap: &mut Heap, var: Value, val: Value, env: Value) -> IotaResult<()> {
    match find_binding(heap, var, env)? {
        Some(cell) => heap.set_car(cell, val),
        None => Err(unbound(heap, var)),
    }
}

/// Bind `var` in the innermost frame, overwriting a binding already there.
pub fn define(heap: &mut Heap, var: Value, val: Value, env: Value) -> IotaResult<()> {
    let frame = heap.car(env)?;
    if !frame.is_cons() {
        return Err(IotaError::Malformed("define outside of any frame".into()));
    }

    let mut vars = heap.car(frame)?;
    let mut vals = heap.cdr(frame)?;
    while vars.is_cons() && vals.is_cons() {
        if heap.car(vars)? == var {
            return heap.set_car(vals, val);
        }
        vars = heap.cdr(vars)?;
        vals = heap.cdr(vals)?;
    }

    let pin = heap.root_all(&[frame, val]);
    let old_vars = heap.car(frame)?;
    let vars = heap.cons(var, old_vars)?;
    heap.set_car(frame, vars)?;
    let old_vals = heap.cdr(frame)?;
    let vals = heap.cons(pin.get_at(1), old_vals)?;
    heap.set_cdr(frame, vals)
}
