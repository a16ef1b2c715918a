mod conn;
mod cursor;

pub use conn::Connection;
pub use cursor::{Cursor, WaiterHandle};
