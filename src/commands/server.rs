//! Server commands used for health checks.

use bytes::Bytes;

use crate::commands::exec;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::types::Value;

/// PING: returns the server's reply, normally `PONG`.
pub async fn ping(conn: &mut Connection) -> Result<String> {
    match exec(conn, vec![Bytes::from("PING")]).await? {
        Value::Status(s) => Ok(s),
        other => Err(Error::UnexpectedResponse {
            expected: "status",
            actual: other.type_name().to_string(),
        }),
    }
}
