pub mod archive;
pub mod commit;
pub mod config;
pub mod detect;
pub mod error;
pub mod feat;
pub mod gate;
pub mod git;
pub mod io;
pub mod lifecycle;
pub mod paths;
pub mod query;
pub mod readiness;
pub mod store;
pub mod task;
pub mod types;
pub mod validate;

pub use error::{ErrorKind, HarnessError, Result};
