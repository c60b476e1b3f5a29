pub mod error;

pub use error::{ErrorCategory, Result, ResultExt, ScrError};
