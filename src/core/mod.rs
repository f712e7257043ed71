pub mod error;

pub use error::{ColabError, Result};
