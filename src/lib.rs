pub mod constant;
pub mod error;
mod opts;
pub mod protocol;
pub mod tokio;

pub use error::{DbError, Error, ErrorCode, Result};
pub use opts::Opts;
pub use protocol::backtrace::{Backtrace, Frame};
pub use protocol::response::Response;
