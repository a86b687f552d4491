use crate::env;
use crate::error::{IotaError, IotaResult};
use crate::heap::{Closure, Heap, ListBuilder, Object};
use crate::primitives::{self, Primitive};
use crate::printer::print_val;
use crate::reader;
use crate::stream::Stream;
use crate::symbol::WellKnown;
use crate::value::Value;

/// Nested `eval` calls allowed before `RecursionLimit`. Tail positions of
/// special forms and compound calls do not count.
pub const DEFAULT_MAX_DEPTH: usize = 1000;

/// Remaining native stack below which evaluation continues on a fresh segment.
const STACK_RED_ZONE: usize = 128 * 1024;
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// The iota interpreter.
/// All runtime state lives here; instances are fully independent.
pub struct Interp {
    pub heap: Heap,
    pub syms: WellKnown,
    pub global_env: Value,
    /// Standard streams, bound to `*stdin*` and `*stdout*`.
    pub stdin: Value,
    pub stdout: Value,
    /// The end-of-stream sentinel returned by `read`.
    pub eof: Value,
    pub max_depth: usize,
    depth: usize,
}

impl Interp {
    pub fn new(heap_capacity: usize) -> IotaResult<Self> {
        let mut heap = Heap::new(heap_capacity);
        let syms = WellKnown::intern(&mut heap)?;

        let eof = Value::Symbol(heap.alloc_persistent(Object::Symbol("#<eof>".into())));
        let stdin = Value::Stream(heap.alloc_persistent(Object::Stream(Box::new(Stream::stdin()))));
        let stdout =
            Value::Stream(heap.alloc_persistent(Object::Stream(Box::new(Stream::stdout()))));

        let global_env = env::setup(&mut heap)?;
        heap.add_root(global_env);

        let mut interp = Interp {
            heap,
            syms,
            global_env,
            stdin,
            stdout,
            eof,
            max_depth: DEFAULT_MAX_DEPTH,
            depth: 0,
        };

        interp.define_global("nil", Value::Nil)?;
        interp.define_global("t", syms.t)?;
        interp.define_global("*stdin*", stdin)?;
        interp.define_global("*stdout*", stdout)?;
        primitives::install(&mut interp)?;

        log::debug!(
            "interpreter ready: {} symbols, {}/{} cells free",
            interp.heap.symbols.count(),
            interp.heap.free_count(),
            interp.heap.capacity()
        );
        Ok(interp)
    }

    pub fn define_global(&mut self, name: &str, val: Value) -> IotaResult<()> {
        let val = self.heap.root(val);
        let sym = self.heap.intern_symbol(name)?;
        env::define(&mut self.heap, sym, val.get(), self.global_env)
    }

    pub fn print(&self, val: Value) -> String {
        print_val(val, &self.heap)
    }

    // ========================================================================
    // Core evaluation
    // ========================================================================

    pub fn eval(&mut self, exp: Value, env: Value) -> IotaResult<Value> {
        if self.depth >= self.max_depth {
            return Err(IotaError::RecursionLimit(self.max_depth));
        }
        self.depth += 1;
        let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
            self.eval_inner(exp, env)
        });
        self.depth -= 1;
        result
    }

    /// The trampoline. Tail positions overwrite `exp`/`env` in the rooted
    /// frame and loop instead of recursing.
    fn eval_inner(&mut self, exp: Value, env: Value) -> IotaResult<Value> {
        let frame = self.heap.root_all(&[exp, env]);
        let s = self.syms;

        loop {
            let exp = frame.get_at(0);
            let env = frame.get_at(1);

            if log::log_enabled!(log::Level::Trace) {
                log::trace!("eval {}", print_val(exp, &self.heap));
            }

            match exp {
                Value::Symbol(_) => return env::lookup(&self.heap, exp, env),
                Value::Cons(_) => {}
                _ => return Ok(exp),
            }

            let op = self.heap.car(exp)?;
            let args = self.heap.cdr(exp)?;

            if op == s.quote {
                return self.heap.car(args);
            }

            if op == s.backquote {
                let template = self.heap.car(args)?;
                return self.quasiquote(template, env, 1);
            }

            if op == s.pipe {
                let form = self.heap.car(args)?;
                let next = self.eval(form, env)?;
                frame.set_at(0, next);
                continue;
            }

            if op == s.set {
                let var = self.heap.car(args)?;
                if !var.is_symbol() {
                    return Err(IotaError::Malformed(format!("set! of {}", self.print(var))));
                }
                let val = self.eval(self.heap.cadr(args)?, env)?;
                env::set(&mut self.heap, var, val, env)?;
                return Ok(var);
            }

            if op == s.define {
                return self.eval_definition(args, env);
            }

            if op == s.if_ {
                let test = self.eval(self.heap.car(args)?, env)?;
                let branch = if test.is_truthy() {
                    self.heap.cadr(args)?
                } else {
                    self.heap.caddr(args)?
                };
                frame.set_at(0, branch);
                continue;
            }

            if op == s.cond {
                let expanded = self.expand_clauses(args)?;
                frame.set_at(0, expanded);
                continue;
            }

            if op == s.let_ {
                let expanded = self.let_to_application(args)?;
                frame.set_at(0, expanded);
                continue;
            }

            if op == s.begin {
                if args.is_nil() {
                    return Ok(Value::Nil);
                }
                let last = self.eval_prefix(args, env)?;
                frame.set_at(0, last);
                continue;
            }

            if op == s.lambda || op == s.macro_ {
                let params = self.heap.car(args)?;
                let body = self.heap.cdr(args)?;
                if !params.is_list() {
                    return Err(IotaError::Malformed(format!(
                        "parameter list {}",
                        self.print(params)
                    )));
                }
                return self.make_closure(op == s.macro_, params, body, env);
            }

            // ==== Application ====

            let proc = self.eval(op, env)?;
            let proc = self.heap.root(proc);

            match proc.get() {
                Value::Primitive(_) => match self.heap.primitive(proc.get()) {
                    Some(Primitive::Eval) => {
                        let form = self.heap.car(args)?;
                        let next = self.eval(form, env)?;
                        let next = self.heap.root(next);
                        let next_env = match self.heap.cdr(args)? {
                            Value::Nil => env,
                            rest => self.eval(self.heap.car(rest)?, env)?,
                        };
                        if !next_env.is_list() {
                            return Err(IotaError::type_error(
                                "eval",
                                "environment",
                                next_env.type_name(),
                            ));
                        }
                        frame.set_at(0, next.get());
                        frame.set_at(1, next_env);
                        continue;
                    }
                    Some(Primitive::Apply) => {
                        let target = self.eval(self.heap.car(args)?, env)?;
                        let target = self.heap.root(target);
                        let values = self.list_of_values(self.heap.cdr(args)?, env)?;
                        let arglist = self.spread(values)?;
                        return self.apply(target.get(), arglist, env);
                    }
                    _ => {}
                },
                Value::Macro(_) => return self.apply_macro(proc.get(), args, env),
                Value::Compound(_) => {
                    let values = self.list_of_values(args, env)?;
                    let closure = self.closure_of(proc.get())?;
                    let call_env = self.bind_params(closure.params, values, closure.env)?;
                    let call_env = self.heap.root(call_env);
                    if closure.body.is_nil() {
                        return Ok(Value::Nil);
                    }
                    let last = self.eval_prefix(closure.body, call_env.get())?;
                    frame.set_at(0, last);
                    frame.set_at(1, call_env.get());
                    continue;
                }
                _ => {}
            }

            let values = self.list_of_values(args, env)?;
            return self.apply(proc.get(), values, env);
        }
    }

    /// Apply a procedure to an already-evaluated argument list.
    pub fn apply(&mut self, proc: Value, args: Value, env: Value) -> IotaResult<Value> {
        let _pin = self.heap.root_all(&[proc, args, env]);
        match proc {
            Value::Primitive(_) => match self.heap.primitive(proc) {
                Some(Primitive::Native { func, .. }) => func(self, args, env),
                Some(Primitive::Eval) => {
                    let target_env = match self.heap.cdr(args)? {
                        Value::Nil => env,
                        rest => self.heap.car(rest)?,
                    };
                    self.eval(self.heap.car(args)?, target_env)
                }
                Some(Primitive::Apply) => {
                    let target = self.heap.car(args)?;
                    let arglist = self.spread(self.heap.cdr(args)?)?;
                    self.apply(target, arglist, env)
                }
                None => Err(IotaError::NotProcedure(self.print(proc))),
            },
            Value::Compound(_) => {
                let closure = self.closure_of(proc)?;
                let call_env = self.bind_params(closure.params, args, closure.env)?;
                self.eval_sequence(closure.body, call_env)
            }
            Value::Macro(_) => self.apply_macro(proc, args, env),
            other => Err(IotaError::NotProcedure(self.print(other))),
        }
    }

    /// Evaluate every form of `body` in order and return the last value.
    pub fn eval_sequence(&mut self, body: Value, env: Value) -> IotaResult<Value> {
        let pin = self.heap.root_all(&[body, env]);
        if body.is_nil() {
            return Ok(Value::Nil);
        }
        let last = self.eval_prefix(body, env)?;
        self.eval(last, pin.get_at(1))
    }

    /// Evaluate all but the last form for effect and hand back the last one.
    fn eval_prefix(&mut self, body: Value, env: Value) -> IotaResult<Value> {
        let _pin = self.heap.root_all(&[body, env]);
        let mut forms = body;
        loop {
            let rest = self.heap.cdr(forms)?;
            if !rest.is_cons() {
                return self.heap.car(forms);
            }
            self.eval(self.heap.car(forms)?, env)?;
            forms = rest;
        }
    }

    /// Evaluate operand forms left to right into a fresh list.
    fn list_of_values(&mut self, forms: Value, env: Value) -> IotaResult<Value> {
        let _pin = self.heap.root_all(&[forms, env]);
        let mut values = ListBuilder::new(&self.heap);
        let mut current = forms;
        while current.is_cons() {
            let val = self.eval(self.heap.car(current)?, env)?;
            values.push(&mut self.heap, val)?;
            current = self.heap.cdr(current)?;
        }
        if !current.is_nil() {
            return Err(IotaError::Malformed(format!(
                "combination ending in {}",
                self.print(current)
            )));
        }
        Ok(values.finish())
    }

    /// `(a b ... lst)` to `(a b ... . lst)`. The last value must be a list.
    fn spread(&mut self, values: Value) -> IotaResult<Value> {
        let _pin = self.heap.root(values);
        if values.is_nil() {
            return Ok(Value::Nil);
        }
        let mut leading = ListBuilder::new(&self.heap);
        let mut current = values;
        while self.heap.cdr(current)?.is_cons() {
            let item = self.heap.car(current)?;
            leading.push(&mut self.heap, item)?;
            current = self.heap.cdr(current)?;
        }
        let last = self.heap.car(current)?;
        if !last.is_list() {
            return Err(IotaError::type_error("apply", "list", last.type_name()));
        }
        leading.finish_with(&mut self.heap, last)
    }

    // ========================================================================
    // Special forms
    // ========================================================================

    fn eval_definition(&mut self, args: Value, env: Value) -> IotaResult<Value> {
        let target = self.heap.car(args)?;
        let (name, val) = match target {
            Value::Symbol(_) => {
                let val = self.eval(self.heap.cadr(args)?, env)?;
                (target, val)
            }
            // (define (name . params) body...)
            Value::Cons(_) => {
                let name = self.heap.car(target)?;
                let params = self.heap.cdr(target)?;
                let body = self.heap.cdr(args)?;
                (name, self.make_closure(false, params, body, env)?)
            }
            other => {
                return Err(IotaError::Malformed(format!(
                    "define of {}",
                    self.print(other)
                )))
            }
        };
        if !name.is_symbol() {
            return Err(IotaError::Malformed(format!("define of {}", self.print(name))));
        }
        env::define(&mut self.heap, name, val, env)?;
        Ok(name)
    }

    fn make_closure(
        &mut self,
        is_macro: bool,
        params: Value,
        body: Value,
        env: Value,
    ) -> IotaResult<Value> {
        let closure = Closure { params, body, env };
        if is_macro {
            Ok(Value::Macro(self.heap.alloc(Object::Macro(closure))?))
        } else {
            Ok(Value::Compound(self.heap.alloc(Object::Compound(closure))?))
        }
    }

    fn closure_of(&self, proc: Value) -> IotaResult<Closure> {
        self.heap
            .closure(proc)
            .ok_or_else(|| IotaError::NotProcedure(self.print(proc)))
    }

    /// `(cond (p e...) ... (else e...))` to nested `if`.
    fn expand_clauses(&mut self, clauses: Value) -> IotaResult<Value> {
        if clauses.is_nil() {
            return Ok(Value::Nil);
        }
        let first = self.heap.car(clauses)?;
        let rest = self.heap.cdr(clauses)?;
        let test = self.heap.car(first)?;
        let body = self.sequence_to_exp(self.heap.cdr(first)?)?;

        if test == self.syms.else_ {
            return if rest.is_nil() {
                Ok(body)
            } else {
                Err(IotaError::ElseNotLast)
            };
        }

        let body = self.heap.root(body);
        let alternative = self.expand_clauses(rest)?;
        self.heap
            .list(&[self.syms.if_, test, body.get(), alternative])
    }

    fn sequence_to_exp(&mut self, seq: Value) -> IotaResult<Value> {
        if seq.is_nil() {
            Ok(Value::Nil)
        } else if self.heap.cdr(seq)?.is_nil() {
            self.heap.car(seq)
        } else {
            self.heap.cons(self.syms.begin, seq)
        }
    }

    /// `(let ((v e)...) body...)` to `((lambda (v...) body...) e...)`.
    fn let_to_application(&mut self, args: Value) -> IotaResult<Value> {
        let bindings = self.heap.car(args)?;
        let body = self.heap.cdr(args)?;

        let mut vars = ListBuilder::new(&self.heap);
        let mut current = bindings;
        while current.is_cons() {
            let binding = self.heap.car(current)?;
            let item = self.heap.car(binding)?;
            vars.push(&mut self.heap, item)?;
            current = self.heap.cdr(current)?;
        }
        let vars = self.heap.root(vars.finish());

        let mut inits = ListBuilder::new(&self.heap);
        let mut current = bindings;
        while current.is_cons() {
            let binding = self.heap.car(current)?;
            let item = self.heap.cadr(binding)?;
            inits.push(&mut self.heap, item)?;
            current = self.heap.cdr(current)?;
        }
        let inits = self.heap.root(inits.finish());

        let tail = self.heap.cons(vars.get(), body)?;
        let lambda = self.heap.cons(self.syms.lambda, tail)?;
        self.heap.cons(lambda, inits.get())
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    /// Extend `base` with `params` bound to `args`.
    fn bind_params(&mut self, params: Value, args: Value, base: Value) -> IotaResult<Value> {
        let pin = self.heap.root_all(&[args, base]);
        let (vars, fixed, has_rest) = self.parse_params(params)?;
        let vars = self.heap.root(vars);
        let vals = self.parse_args(pin.get_at(0), fixed, has_rest)?;
        env::extend(&mut self.heap, vars.get(), vals, pin.get_at(1))
    }

    /// Strip the `:rest` marker. Returns the variable list, the number of
    /// fixed parameters, and whether a rest parameter follows them.
    fn parse_params(&mut self, params: Value) -> IotaResult<(Value, usize, bool)> {
        let malformed = |interp: &Self| {
            IotaError::Malformed(format!("parameter list {}", interp.print(params)))
        };

        let mut fixed = 0;
        let mut current = params;
        while current.is_cons() {
            let param = self.heap.car(current)?;
            if param == self.syms.rest {
                let rest = self.heap.cdr(current)?;
                if !self.heap.car(rest)?.is_symbol() || !self.heap.cdr(rest)?.is_nil() {
                    return Err(malformed(self));
                }
                return Ok((self.without_rest_marker(params)?, fixed, true));
            }
            if !param.is_symbol() {
                return Err(malformed(self));
            }
            fixed += 1;
            current = self.heap.cdr(current)?;
        }
        if !current.is_nil() {
            return Err(malformed(self));
        }
        Ok((params, fixed, false))
    }

    fn without_rest_marker(&mut self, params: Value) -> IotaResult<Value> {
        let _pin = self.heap.root(params);
        let mut vars = ListBuilder::new(&self.heap);
        let mut current = params;
        while current.is_cons() {
            let param = self.heap.car(current)?;
            if param != self.syms.rest {
                vars.push(&mut self.heap, param)?;
            }
            current = self.heap.cdr(current)?;
        }
        Ok(vars.finish())
    }

    /// Match arguments to `fixed` parameters. With a rest parameter the
    /// remaining tail becomes one extra value. The argument list itself is
    /// never modified.
    fn parse_args(&mut self, args: Value, fixed: usize, has_rest: bool) -> IotaResult<Value> {
        let got = self.heap.list_len(args)?;
        if !has_rest {
            if got != fixed {
                return Err(IotaError::arity("#<procedure>", &fixed.to_string(), got));
            }
            return Ok(args);
        }
        if got < fixed {
            return Err(IotaError::arity(
                "#<procedure>",
                &format!("at least {}", fixed),
                got,
            ));
        }

        let _pin = self.heap.root(args);
        let mut vals = ListBuilder::new(&self.heap);
        let mut current = args;
        for _ in 0..fixed {
            let item = self.heap.car(current)?;
            vals.push(&mut self.heap, item)?;
            current = self.heap.cdr(current)?;
        }
        vals.push(&mut self.heap, current)?;
        Ok(vals.finish())
    }

    // ========================================================================
    // Quasiquote
    // ========================================================================

    /// Expand a backquoted template at nesting `depth` (1 for the outermost).
    pub fn quasiquote(&mut self, template: Value, env: Value, depth: usize) -> IotaResult<Value> {
        let _pin = self.heap.root_all(&[template, env]);
        self.expand_backquote(template, env, depth)
    }

    fn expand_backquote(&mut self, exp: Value, env: Value, depth: usize) -> IotaResult<Value> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
            self.expand_backquote_inner(exp, env, depth)
        })
    }

    fn expand_backquote_inner(
        &mut self,
        exp: Value,
        env: Value,
        depth: usize,
    ) -> IotaResult<Value> {
        if !exp.is_cons() {
            return Ok(exp);
        }
        let s = self.syms;
        let head = self.heap.car(exp)?;

        if head == s.comma {
            let inner = self.heap.cadr(exp)?;
            if depth == 1 {
                return self.eval(inner, env);
            }
            let expanded = self.expand_backquote(inner, env, depth - 1)?;
            return self.heap.list(&[s.comma, expanded]);
        }

        if head == s.backquote {
            let inner = self.heap.cadr(exp)?;
            let expanded = self.expand_backquote(inner, env, depth + 1)?;
            return self.heap.list(&[s.backquote, expanded]);
        }

        if head.is_cons() && self.heap.car(head)? == s.comma_at {
            let inner = self.heap.cadr(head)?;
            if depth > 1 {
                let expanded = self.expand_backquote(inner, env, depth - 1)?;
                let expanded = self.heap.root(expanded);
                let tail = self.expand_backquote(self.heap.cdr(exp)?, env, depth)?;
                let tail = self.heap.root(tail);
                let element = self.heap.list(&[s.comma_at, expanded.get()])?;
                return self.heap.cons(element, tail.get());
            }

            let spliced = self.eval(inner, env)?;
            let spliced = self.heap.root(spliced);
            let tail = self.expand_backquote(self.heap.cdr(exp)?, env, depth)?;
            return self.splice(spliced.get(), tail);
        }

        let first = self.expand_backquote(head, env, depth)?;
        let first = self.heap.root(first);
        let rest = self.expand_backquote(self.heap.cdr(exp)?, env, depth)?;
        self.heap.cons(first.get(), rest)
    }

    /// Link the last cell of the spliced list to `tail` in place. An empty
    /// splice contributes nothing.
    fn splice(&mut self, spliced: Value, tail: Value) -> IotaResult<Value> {
        if spliced.is_nil() {
            return Ok(tail);
        }
        if !spliced.is_cons() {
            return Err(IotaError::Splice(self.print(spliced)));
        }
        let mut last = spliced;
        // A proper list has at most one cell per heap slot.
        for _ in 0..self.heap.capacity() {
            match self.heap.cdr(last)? {
                Value::Nil => {
                    self.heap.set_cdr(last, tail)?;
                    return Ok(spliced);
                }
                next @ Value::Cons(_) => last = next,
                _ => break,
            }
        }
        Err(IotaError::Splice(self.print(spliced)))
    }

    // ========================================================================
    // Macros
    // ========================================================================

    /// Bind the unevaluated `forms` to the macro's parameters and evaluate
    /// its body, producing the expansion.
    pub fn macroexpand(&mut self, mac: Value, forms: Value) -> IotaResult<Value> {
        let _pin = self.heap.root_all(&[mac, forms]);
        let closure = match mac {
            Value::Macro(_) => self.heap.closure(mac),
            _ => None,
        }
        .ok_or_else(|| IotaError::MacroNotFound(self.print(mac)))?;
        let expand_env = self.bind_params(closure.params, forms, closure.env)?;
        self.eval_sequence(closure.body, expand_env)
    }

    /// Expand, then evaluate the expansion in the call-site environment.
    pub fn apply_macro(&mut self, mac: Value, forms: Value, env: Value) -> IotaResult<Value> {
        let env = self.heap.root(env);
        let expansion = self.macroexpand(mac, forms)?;
        self.eval(expansion, env.get())
    }

    // ========================================================================
    // Reading and loading
    // ========================================================================

    /// Read one datum from a stream value; `self.eof` at end of input.
    pub fn read(&mut self, stream: Value) -> IotaResult<Value> {
        reader::read(&mut self.heap, &self.syms, stream, self.eof)
    }

    /// Read and evaluate every form of a stream in the global environment.
    /// Returns the value of the last form.
    pub fn load_stream(&mut self, stream: Value) -> IotaResult<Value> {
        let stream = self.heap.root(stream);
        let last = self.heap.root(Value::Nil);
        loop {
            let form = self.read(stream.get())?;
            if form == self.eof {
                return Ok(last.get());
            }
            let val = self.eval(form, self.global_env)?;
            last.set(val);
        }
    }

    pub fn load_file(&mut self, path: &str) -> IotaResult<Value> {
        log::info!("loading {}", path);
        let stream = Stream::open_existing(path)?;
        let stream = self.heap.make_stream(stream)?;
        let stream = self.heap.root(stream);
        let result = self.load_stream(stream.get());
        self.heap.stream_mut(stream.get())?.close()?;
        result
    }

    /// Evaluate every form in `src`, returning the last value.
    pub fn eval_str(&mut self, src: &str) -> IotaResult<Value> {
        let stream = self.heap.make_stream(Stream::from_bytes(src))?;
        self.load_stream(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interp() -> Interp {
        Interp::new(10_000).unwrap()
    }

    fn run(interp: &mut Interp, src: &str) -> String {
        let val = interp.eval_str(src).unwrap();
        interp.print(val)
    }

    #[test]
    fn special_forms() {
        let mut i = interp();
        assert_eq!(run(&mut i, "(quote (a b))"), "(a b)");
        assert_eq!(run(&mut i, "(if () 1 2)"), "2");
        assert_eq!(run(&mut i, "(if 0 1 2)"), "1");
        assert_eq!(run(&mut i, "(if () 1)"), "()");
        assert_eq!(run(&mut i, "(begin)"), "()");
        assert_eq!(run(&mut i, "(begin 1 2 3)"), "3");
        assert_eq!(run(&mut i, "(define x 4)"), "x");
        assert_eq!(run(&mut i, "(set! x 5)"), "x");
        assert_eq!(run(&mut i, "x"), "5");
        assert_eq!(run(&mut i, "(let ((a 1) (b 2)) (+ a b))"), "3");
        assert_eq!(run(&mut i, "(pipe (quote (+ 1 2)))"), "3");
    }

    #[test]
    fn cond_desugars_to_if() {
        let mut i = interp();
        assert_eq!(run(&mut i, "(cond ((= 1 2) 'a) ((= 1 1) 'b 'c) (else 'd))"), "c");
        assert_eq!(run(&mut i, "(cond ((= 1 2) 'a) (else 'd))"), "d");
        assert_eq!(run(&mut i, "(cond ((= 1 2) 'a))"), "()");
        assert!(matches!(
            i.eval_str("(cond (else 1) (t 2))"),
            Err(IotaError::ElseNotLast)
        ));
    }

    #[test]
    fn define_procedure_and_call() {
        let mut i = interp();
        i.eval_str("(define (add a b) (+ a b))").unwrap();
        assert_eq!(run(&mut i, "(add 2 3)"), "5");
    }

    #[test]
    fn closures_capture_their_environment() {
        let mut i = interp();
        i.eval_str("(define (adder n) (lambda (x) (+ x n)))").unwrap();
        i.eval_str("(define add5 (adder 5))").unwrap();
        assert_eq!(run(&mut i, "(add5 10)"), "15");
    }

    #[test]
    fn inner_define_does_not_leak() {
        let mut i = interp();
        i.eval_str("(define x 10)").unwrap();
        i.eval_str("(define (f) (define x 1) x)").unwrap();
        assert_eq!(run(&mut i, "(f)"), "1");
        assert_eq!(run(&mut i, "x"), "10");
    }

    #[test]
    fn rest_parameters() {
        let mut i = interp();
        assert_eq!(run(&mut i, "((lambda (a :rest b) b) 1 2 3)"), "(2 3)");
        assert_eq!(run(&mut i, "((lambda (a :rest b) b) 1)"), "()");
        assert_eq!(run(&mut i, "((lambda (:rest all) all) 1 2)"), "(1 2)");
        assert!(matches!(
            i.eval_str("((lambda (a b) a) 1)"),
            Err(IotaError::Arity { got: 1, .. })
        ));
        assert!(matches!(
            i.eval_str("((lambda (a :rest b) a))"),
            Err(IotaError::Arity { got: 0, .. })
        ));
    }

    #[test]
    fn rest_binding_leaves_argument_list_intact() {
        let mut i = interp();
        i.eval_str("(define args (list 1 2 3))").unwrap();
        i.eval_str("(define (tail a :rest b) b)").unwrap();
        assert_eq!(run(&mut i, "(apply tail args)"), "(2 3)");
        assert_eq!(run(&mut i, "args"), "(1 2 3)");
    }

    #[test]
    fn quasiquote_splices_and_unquotes() {
        let mut i = interp();
        assert_eq!(run(&mut i, "`(1 ,@(list 2 3) 4)"), "(1 2 3 4)");
        assert_eq!(run(&mut i, "`(1 ,@(list) 2)"), "(1 2)");
        assert_eq!(run(&mut i, "`(a ,(+ 1 2) c)"), "(a 3 c)");
        assert_eq!(run(&mut i, "`x"), "x");
        assert!(matches!(i.eval_str("`(1 ,@5)"), Err(IotaError::Splice(_))));
    }

    #[test]
    fn nested_quasiquote_keeps_inner_commas() {
        let mut i = interp();
        i.eval_str("(define y 2)").unwrap();
        assert_eq!(
            run(&mut i, "`(a `(b ,(c ,y)))"),
            "(a (backquote (b (comma (c 2)))))"
        );
    }

    #[test]
    fn splicing_links_the_spliced_list_into_the_result() {
        let mut i = interp();
        i.eval_str("(define xs (list 1 2))").unwrap();
        i.eval_str("(define ys `(,@xs 3))").unwrap();
        assert_eq!(run(&mut i, "ys"), "(1 2 3)");
        assert_eq!(run(&mut i, "xs"), "(1 2 3)");
        assert_eq!(run(&mut i, "(eq? xs ys)"), "t");
        assert_eq!(run(&mut i, "`(0 ,@() 1)"), "(0 1)");
        assert!(matches!(i.eval_str("`(,@'(1 . 2) 3)"), Err(IotaError::Splice(_))));
        assert!(matches!(i.eval_str("`(,@5)"), Err(IotaError::Splice(_))));
    }

    #[test]
    fn macros_receive_unevaluated_forms() {
        let mut i = interp();
        i.eval_str("(define first-only (macro (a b) a))").unwrap();
        assert_eq!(run(&mut i, "(first-only 1 (error \"evaluated\"))"), "1");
        i.eval_str("(define my-if (macro (p a b) `(cond (,p ,a) (else ,b))))").unwrap();
        assert_eq!(run(&mut i, "(my-if () 1 2)"), "2");
    }

    #[test]
    fn macroexpand_returns_the_expansion() {
        let mut i = interp();
        i.eval_str("(define swap (macro (a b) `(list ,b ,a)))").unwrap();
        assert_eq!(run(&mut i, "(macroexpand '(swap 1 2))"), "(list 2 1)");
        assert!(matches!(
            i.eval_str("(macroexpand '(car 1))"),
            Err(IotaError::MacroNotFound(_))
        ));
    }

    #[test]
    fn meta_eval_and_apply() {
        let mut i = interp();
        assert_eq!(run(&mut i, "(eval '(+ 1 2))"), "3");
        assert_eq!(run(&mut i, "(eval '(+ 1 2) (global-env))"), "3");
        assert_eq!(run(&mut i, "(apply + 1 2 '(3 4))"), "10");
        assert_eq!(run(&mut i, "(apply + '())"), "0");
        assert_eq!(run(&mut i, "(apply list '(a b))"), "(a b)");
        assert!(matches!(i.eval_str("(apply + 1 2)"), Err(IotaError::Type(_))));
    }

    #[test]
    fn eval_uses_the_current_environment_by_default() {
        let mut i = interp();
        assert_eq!(run(&mut i, "(let ((z 7)) (eval 'z))"), "7");
    }

    #[test]
    fn apply_and_eval_as_values() {
        let mut i = interp();
        i.eval_str("(define (call f x) (f x))").unwrap();
        assert_eq!(run(&mut i, "(call eval '(* 6 7))"), "42");
    }

    #[test]
    fn tail_calls_do_not_grow_the_stack() {
        let mut i = interp();
        i.max_depth = 100;
        i.eval_str("(define (count n) (if (= n 0) 'done (count (- n 1))))")
            .unwrap();
        assert_eq!(run(&mut i, "(count 5000)"), "done");
    }

    #[test]
    fn unbounded_recursion_is_an_error() {
        let mut i = interp();
        i.max_depth = 200;
        i.eval_str("(define (f x) (+ 1 (f x)))").unwrap();
        assert!(matches!(
            i.eval_str("(f 1)"),
            Err(IotaError::RecursionLimit(200))
        ));
        // depth accounting recovers after the error
        assert_eq!(run(&mut i, "(+ 1 1)"), "2");
    }

    #[test]
    fn deep_recursion_grows_the_native_stack() {
        let mut i = Interp::new(400_000).unwrap();
        i.max_depth = 5_000;
        i.eval_str("(define (deep n) (if (= n 0) 0 (+ 1 (deep (- n 1)))))")
            .unwrap();
        assert_eq!(run(&mut i, "(deep 3000)"), "3000");
        assert!(matches!(
            i.eval_str("(deep 100000)"),
            Err(IotaError::RecursionLimit(5_000))
        ));
        assert_eq!(run(&mut i, "(deep 10)"), "10");
    }

    #[test]
    fn macro_calls_nest_evaluation() {
        let mut i = interp();
        i.max_depth = 50;
        i.eval_str("(define my-when (macro (c :rest body) `(if ,c (begin ,@body))))")
            .unwrap();
        i.eval_str("(define (walk n) (my-when (> n 0) (walk (- n 1))))")
            .unwrap();
        assert_eq!(run(&mut i, "(walk 5)"), "()");
        assert!(matches!(
            i.eval_str("(walk 1000)"),
            Err(IotaError::RecursionLimit(50))
        ));
    }

    #[test]
    fn applying_a_non_procedure_fails() {
        let mut i = interp();
        assert!(matches!(i.eval_str("(1 2)"), Err(IotaError::NotProcedure(_))));
        assert!(matches!(i.eval_str("(undefined-thing)"), Err(IotaError::Unbound(_))));
    }

    #[test]
    fn evaluation_survives_collections() {
        let mut i = Interp::new(2_000).unwrap();
        i.eval_str("(define (build n acc) (if (= n 0) acc (build (- n 1) (cons n acc))))")
            .unwrap();
        for _ in 0..20 {
            assert_eq!(run(&mut i, "(len (build 50 ()))"), "50");
        }
        assert!(i.heap.collections() > 0);
        assert_eq!(i.heap.root_depth(), 0);
    }
}
