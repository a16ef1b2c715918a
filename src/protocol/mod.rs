pub mod backtrace;
pub mod frame;
pub mod handshake;
pub mod primitive;
pub mod query;
pub mod response;

pub use response::Response;
