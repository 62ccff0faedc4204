//! Command builders.
//!
//! Each sub-module covers one command group. Argument vectors are built
//! by plain functions so they can be executed alone or queued inside a
//! transaction.

pub mod server;
pub mod streams;

use bytes::Bytes;

use crate::connection::Connection;
use crate::error::Result;
use crate::types::{ToArg, Value};

/// Execute a prepared argument vector.
pub(crate) async fn exec(conn: &mut Connection, args: Vec<Bytes>) -> Result<Value> {
    conn.execute(&args).await
}

/// Helper to create a Bytes arg from anything that implements ToArg.
#[inline]
pub(crate) fn arg<T: ToArg>(val: T) -> Bytes {
    val.to_arg()
}
