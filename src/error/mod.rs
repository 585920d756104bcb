pub(crate) mod internal;

pub use internal::{Error, ErrorKind};
pub(crate) use internal::IoContext;
