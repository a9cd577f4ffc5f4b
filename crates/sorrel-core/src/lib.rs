pub mod dispatch;
pub mod error;
pub mod guard;
pub mod seq;
pub mod value;

pub use dispatch::{apply_callable, call_callable, call_native_fn, VariadicFn};
pub use error::SorrelError;
pub use value::{FnArity, NativeFn, Value};
