//! MySQL driver backed by `sqlx`.

use std::io;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlDatabaseError};
use sqlx::{Connection, Executor};
use tracing::debug;

use crate::connector::{ConnectOptions, Connector, DriverError};

/// Server error numbers that mean the credential itself was refused.
const ACCESS_DENIED_ERRORS: &[u16] = &[
    1044, // ER_DBACCESS_DENIED_ERROR
    1045, // ER_ACCESS_DENIED_ERROR
    1698, // ER_ACCESS_DENIED_NO_PASSWORD_ERROR
];

/// Opens plain `sqlx` MySQL connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlConnector;

#[async_trait]
impl Connector for MySqlConnector {
    type Connection = MySqlConnection;

    async fn connect(&self, options: &ConnectOptions) -> Result<MySqlConnection, DriverError> {
        let opts = MySqlConnectOptions::new()
            .host(&options.host)
            .port(options.port)
            .database(&options.database)
            .username(options.credential.username())
            .password(options.credential.password());

        MySqlConnection::connect_with(&opts).await.map_err(classify)
    }

    async fn validate(&self, conn: &mut MySqlConnection, query: &str) -> Result<(), DriverError> {
        sqlx::query(query)
            .fetch_all(&mut *conn)
            .await
            .map(|_| ())
            .map_err(classify)
    }

    /// Roll back whatever transaction the caller left open.  Sent as a plain
    /// text query, outside the prepared-statement cache.
    async fn reset(&self, conn: &mut MySqlConnection) -> Result<(), DriverError> {
        (&mut *conn).execute("ROLLBACK").await.map(|_| ()).map_err(classify)
    }

    async fn close(&self, conn: MySqlConnection) {
        if let Err(e) = conn.close().await {
            debug!(error = %classify(e), "error while closing connection");
        }
    }
}

/// Map a `sqlx` error onto the pool's retry classification.
///
/// Access-denied server errors and refused TCP connections are
/// authentication-class.  Their messages are rebuilt from the error number
/// alone: the server's text quotes the username.
fn classify(err: sqlx::Error) -> DriverError {
    match &err {
        sqlx::Error::Database(db) => match db.try_downcast_ref::<MySqlDatabaseError>() {
            Some(mysql) if ACCESS_DENIED_ERRORS.contains(&mysql.number()) => {
                DriverError::authentication(format!("access denied (mysql error {})", mysql.number()))
            }
            Some(mysql) => DriverError::other(format!("mysql error {}", mysql.number())),
            None => DriverError::other(err.to_string()),
        },
        sqlx::Error::Io(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
            DriverError::authentication("connection refused")
        }
        _ => DriverError::other(err.to_string()),
    }
}
