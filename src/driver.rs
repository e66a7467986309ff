//! Driver abstraction.
//!
//! The pool depends on a narrow capability set: open a raw connection,
//! run a validation probe against it, and close it. Everything else the
//! underlying client library offers is out of the pool's sight.

use crate::error::Result;

/// Capabilities the pool requires from a database driver.
///
/// Implementations must be callable from any pool or worker thread. The
/// associated `Conn` type is the opaque raw connection handle; the pool
/// owns each instance exclusively and passes it back to [`Driver::close`]
/// exactly once.
pub trait Driver: Send + Sync + 'static {
    type Conn: Send + 'static;

    /// Open a raw connection. The endpoint has the form
    /// `tcp://<host>:<port>/<database>`; credentials are passed separately.
    fn connect(&self, endpoint: &str, username: &str, password: &str) -> Result<Self::Conn>;

    /// Execute a statement, discarding any result rows.
    fn execute(&self, conn: &mut Self::Conn, query: &str) -> Result<()>;

    /// Run the validation probe. Returns true iff the connection can
    /// service a trivial query.
    fn validate(&self, conn: &mut Self::Conn, probe: &str) -> bool;

    /// Toggle autocommit. Applied once with `true` on every freshly
    /// created connection.
    fn set_autocommit(&self, conn: &mut Self::Conn, enabled: bool) -> Result<()>;

    /// Close the raw connection, releasing its server-side resources.
    fn close(&self, conn: Self::Conn);
}
