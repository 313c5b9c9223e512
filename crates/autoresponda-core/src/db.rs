use std::{env, path::Path, sync::Arc};

use libsql::{Builder, Connection, Database as LibSqlDatabase};
use thiserror::Error;

/// Shared handle to the account/rule database. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    inner: Arc<LibSqlDatabase>,
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("failed to build database: {0}")]
    Build(libsql::Error),
    #[error("failed to open connection: {0}")]
    Connect(libsql::Error),
    #[error("failed to execute statement: {0}")]
    Statement(libsql::Error),
    #[error("missing required LIBSQL_AUTH_TOKEN for remote database")]
    MissingAuthToken,
}

impl Database {
    pub async fn new(database_path: &Path) -> Result<Self, DbError> {
        let location = database_path.to_string_lossy().to_string();
        let builder = if is_remote(&location) {
            let auth_token = env::var("LIBSQL_AUTH_TOKEN")
                .ok()
                .filter(|token| !token.is_empty())
                .ok_or(DbError::MissingAuthToken)?;
            Builder::new_remote(location, auth_token).build().await
        } else {
            Builder::new_local(location).build().await
        };

        let inner = builder.map_err(DbError::Build)?;
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Opens a connection with foreign keys enforced so deleting an account drops its rules.
    pub async fn connection(&self) -> Result<Connection, DbError> {
        let conn = self.inner.connect().map_err(DbError::Connect)?;
        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(DbError::Statement)?;
        Ok(conn)
    }

    pub async fn health_check(&self) -> Result<(), DbError> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query("SELECT 1", ())
            .await
            .map_err(DbError::Statement)?;
        rows.next().await.map_err(DbError::Statement)?;
        Ok(())
    }
}

fn is_remote(path: &str) -> bool {
    ["libsql://", "http://", "https://"]
        .iter()
        .any(|scheme| path.starts_with(scheme))
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use std::sync::Mutex;
    use tempfile::TempDir;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    #[tokio::test]
    async fn connection_enables_foreign_keys() {
        let dir = TempDir::new().expect("temp dir");
        let db = Database::new(&dir.path().join("db.sqlite"))
            .await
            .expect("create db");
        let conn = db.connection().await.expect("open connection");
        let mut rows = conn
            .query("PRAGMA foreign_keys", ())
            .await
            .expect("query pragma");
        let value: i64 = rows
            .next()
            .await
            .expect("row present")
            .expect("row")
            .get(0)
            .expect("get value");
        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn health_check_runs_simple_query() {
        let dir = TempDir::new().expect("temp dir");
        let db = Database::new(&dir.path().join("db.sqlite"))
            .await
            .expect("create db");

        db.health_check().await.expect("health check passes");
    }

    #[test]
    fn remote_schemes_are_detected() {
        assert!(is_remote("libsql://example.turso.io"));
        assert!(is_remote("https://example.com/db"));
        assert!(!is_remote("/var/lib/autoresponda/db.sqlite"));
        assert!(!is_remote(":memory:"));
    }

    #[tokio::test]
    async fn remote_missing_auth_token_errors() {
        let _guard = ENV_LOCK.lock().expect("lock env");
        unsafe { env::remove_var("LIBSQL_AUTH_TOKEN") };
        let result = Database::new(Path::new("libsql://example.com/db")).await;
        assert!(matches!(result, Err(DbError::MissingAuthToken)));
    }
}
