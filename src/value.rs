use std::fmt;

/// Index into the object heap. This is the GC handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjId(pub u32);

impl ObjId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The fundamental iota value. Copy semantics: fixnums and characters are
/// immediate, everything else is a tagged handle into the heap.
///
/// The derived equality is `eq?` for every kind except strings, which
/// compare by content (see `Heap::is_eq`).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    Nil,
    Fixnum(i64),
    Char(u8),
    Symbol(ObjId),
    Keyword(ObjId),
    Str(ObjId),
    Cons(ObjId),
    Primitive(ObjId),
    Compound(ObjId),
    Macro(ObjId),
    Stream(ObjId),
}

impl Value {
    pub fn is_nil(self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Everything except `Nil` is true.
    pub fn is_truthy(self) -> bool {
        !self.is_nil()
    }

    pub fn is_cons(self) -> bool {
        matches!(self, Value::Cons(_))
    }

    /// True for `Nil` and `Cons`. Says nothing about the tail.
    pub fn is_list(self) -> bool {
        matches!(self, Value::Nil | Value::Cons(_))
    }

    pub fn is_atom(self) -> bool {
        !self.is_list()
    }

    pub fn is_symbol(self) -> bool {
        matches!(self, Value::Symbol(_))
    }

    pub fn is_keyword(self) -> bool {
        matches!(self, Value::Keyword(_))
    }

    pub fn is_string(self) -> bool {
        matches!(self, Value::Str(_))
    }

    pub fn is_procedure(self) -> bool {
        matches!(self, Value::Primitive(_) | Value::Compound(_))
    }

    /// The heap slot behind this value, if it has one.
    pub fn obj_id(self) -> Option<ObjId> {
        match self {
            Value::Nil | Value::Fixnum(_) | Value::Char(_) => None,
            Value::Symbol(id)
            | Value::Keyword(id)
            | Value::Str(id)
            | Value::Cons(id)
            | Value::Primitive(id)
            | Value::Compound(id)
            | Value::Macro(id)
            | Value::Stream(id) => Some(id),
        }
    }

    pub fn as_fixnum(self) -> Option<i64> {
        match self {
            Value::Fixnum(n) => Some(n),
            _ => None,
        }
    }

    pub fn type_name(self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Fixnum(_) => "integer",
            Value::Char(_) => "character",
            Value::Symbol(_) => "symbol",
            Value::Keyword(_) => "keyword",
            Value::Str(_) => "string",
            Value::Cons(_) => "cons",
            Value::Primitive(_) | Value::Compound(_) => "procedure",
            Value::Macro(_) => "macro",
            Value::Stream(_) => "stream",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Fixnum(n) => write!(f, "Fixnum({})", n),
            Value::Char(c) => write!(f, "Char({})", c),
            Value::Symbol(id) => write!(f, "Symbol({})", id.0),
            Value::Keyword(id) => write!(f, "Keyword({})", id.0),
            Value::Str(id) => write!(f, "Str({})", id.0),
            Value::Cons(id) => write!(f, "Cons({})", id.0),
            Value::Primitive(id) => write!(f, "Primitive({})", id.0),
            Value::Compound(id) => write!(f, "Compound({})", id.0),
            Value::Macro(id) => write!(f, "Macro({})", id.0),
            Value::Stream(id) => write!(f, "Stream({})", id.0),
        }
    }
}

impl fmt::Debug for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_nil_is_false() {
        assert!(!Value::Nil.is_truthy());
        assert!(Value::Fixnum(0).is_truthy());
        assert!(Value::Char(0).is_truthy());
        assert!(Value::Cons(ObjId(3)).is_truthy());
    }

    #[test]
    fn lists_and_atoms_partition_values() {
        assert!(Value::Nil.is_list());
        assert!(Value::Cons(ObjId(0)).is_list());
        assert!(Value::Symbol(ObjId(0)).is_atom());
        assert!(Value::Fixnum(7).is_atom());
    }

    #[test]
    fn immediates_have_no_slot() {
        assert_eq!(Value::Fixnum(1).obj_id(), None);
        assert_eq!(Value::Char(b'a').obj_id(), None);
        assert_eq!(Value::Macro(ObjId(9)).obj_id(), Some(ObjId(9)));
    }
}
