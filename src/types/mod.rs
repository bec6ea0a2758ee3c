mod coerce;
mod error;
pub mod grammar;
mod value;

pub use coerce::coerce;
pub(crate) use coerce::cell_text;
pub use error::{CoercionError, TypeGrammarError};
pub use grammar::{BaseKind, TypeDescriptor};
pub use value::{Decimal, FromNative, NativeValue};
