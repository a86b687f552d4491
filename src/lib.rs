//! iota: a small Lisp runtime with a fixed-capacity heap, a mark-sweep
//! collector and an eval/apply trampoline.

pub mod env;
pub mod error;
pub mod eval;
pub mod heap;
pub mod primitives;
pub mod printer;
pub mod reader;
pub mod stream;
pub mod symbol;
pub mod value;

pub use error::{IotaError, IotaResult};
pub use eval::Interp;
pub use value::Value;
