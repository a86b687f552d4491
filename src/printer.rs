use crate::heap::Heap;
use crate::value::Value;

/// Nesting depth past which sublists print as "...".
const MAX_DEPTH: usize = 1000;
/// Elements printed per list before the rest is elided; bounds cdr cycles.
const MAX_LENGTH: usize = 100_000;

/// Print a value in its readable form.
pub fn print_val(val: Value, heap: &Heap) -> String {
    let mut out = String::new();
    print_inner(val, heap, &mut out, 0);
    out
}

fn print_inner(val: Value, heap: &Heap, out: &mut String, depth: usize) {
    if depth > MAX_DEPTH {
        out.push_str("...");
        return;
    }

    match val {
        Value::Nil => out.push_str("()"),
        Value::Fixnum(n) => out.push_str(&n.to_string()),
        Value::Char(c) => print_char(c, out),
        Value::Symbol(_) | Value::Keyword(_) => {
            out.push_str(heap.symbol_name(val).unwrap_or("#<free>"))
        }
        Value::Str(_) => print_string(heap.string_bytes(val).unwrap_or_default(), out),
        Value::Primitive(_) | Value::Compound(_) => out.push_str("#<procedure>"),
        Value::Macro(_) => out.push_str("#<macro>"),
        Value::Stream(_) => out.push_str("#<stream>"),
        Value::Cons(_) => print_list(val, heap, out, depth),
    }
}

fn print_list(val: Value, heap: &Heap, out: &mut String, depth: usize) {
    out.push('(');
    let mut current = val;
    let mut count = 0;
    loop {
        let (Ok(car), Ok(cdr)) = (heap.car(current), heap.cdr(current)) else {
            out.push_str("#<free>");
            break;
        };
        print_inner(car, heap, out, depth + 1);
        count += 1;
        match cdr {
            Value::Nil => break,
            Value::Cons(_) if count >= MAX_LENGTH => {
                out.push_str(" ...");
                break;
            }
            Value::Cons(_) => {
                out.push(' ');
                current = cdr;
            }
            tail => {
                out.push_str(" . ");
                print_inner(tail, heap, out, depth + 1);
                break;
            }
        }
    }
    out.push(')');
}

fn print_char(c: u8, out: &mut String) {
    out.push('#');
    match c {
        b'\n' => out.push_str("\\n"),
        b'\t' => out.push_str("\\t"),
        b' ' => out.push_str("\\s"),
        b'\\' => out.push_str("\\\\"),
        c if c.is_ascii_graphic() => out.push(c as char),
        c => out.push_str(&format!("\\x{:02x}", c)),
    }
}

fn print_string(bytes: &[u8], out: &mut String) {
    out.push('"');
    for ch in String::from_utf8_lossy(bytes).chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            ch => out.push(ch),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atoms() {
        let mut heap = Heap::new(32);
        assert_eq!(print_val(Value::Nil, &heap), "()");
        assert_eq!(print_val(Value::Fixnum(-3), &heap), "-3");
        assert_eq!(print_val(Value::Char(b'z'), &heap), "#z");
        assert_eq!(print_val(Value::Char(b' '), &heap), "#\\s");
        let sym = heap.intern_symbol("abc").unwrap();
        assert_eq!(print_val(sym, &heap), "abc");
        let kw = heap.intern_keyword(":key").unwrap();
        assert_eq!(print_val(kw, &heap), ":key");
        let s = heap.make_string("say \"hi\"\n").unwrap();
        assert_eq!(print_val(s, &heap), "\"say \\\"hi\\\"\\n\"");
    }

    #[test]
    fn proper_and_dotted_lists() {
        let mut heap = Heap::new(32);
        let list = heap.list(&[Value::Fixnum(1), Value::Nil, Value::Fixnum(3)]).unwrap();
        assert_eq!(print_val(list, &heap), "(1 () 3)");
        let pair = heap.cons(Value::Fixnum(1), Value::Fixnum(2)).unwrap();
        assert_eq!(print_val(pair, &heap), "(1 . 2)");
        let nested = heap.cons(pair, list).unwrap();
        assert_eq!(print_val(nested, &heap), "((1 . 2) 1 () 3)");
    }

    #[test]
    fn cyclic_lists_terminate() {
        let mut heap = Heap::new(32);
        let cell = heap.cons(Value::Fixnum(0), Value::Nil).unwrap();
        heap.set_cdr(cell, cell).unwrap();
        let printed = print_val(cell, &heap);
        assert!(printed.starts_with("(0 0 0"));
        assert!(printed.ends_with(" ...)"));

        heap.set_car(cell, cell).unwrap();
        assert!(print_val(cell, &heap).contains("..."));
    }
}
