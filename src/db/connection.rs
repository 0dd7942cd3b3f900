use crate::config::DatabaseConfig;
use duckdb::{Connection, Result as DbResult};
use std::sync::{Arc, Mutex};
use tracing::info;

pub type DbPool = Arc<Mutex<Connection>>;

const SCHEMA: &str = r#"
CREATE SEQUENCE IF NOT EXISTS seq_sessions_id;
CREATE SEQUENCE IF NOT EXISTS seq_messages_id;

CREATE TABLE IF NOT EXISTS sessions (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_sessions_id'),
    title VARCHAR NOT NULL,
    created_at TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_messages_id'),
    session_id BIGINT NOT NULL,
    role VARCHAR NOT NULL,
    content TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, id);
"#;

pub fn get_connection(config: &DatabaseConfig) -> DbResult<DbPool> {
    let conn = if config.path == ":memory:" {
        info!("Opening in-memory DuckDB store");
        Connection::open_in_memory()?
    } else {
        info!("Connecting to DuckDB at {}", config.path);
        Connection::open(&config.path)?
    };

    init_schema(&conn)?;

    Ok(Arc::new(Mutex::new(conn)))
}

fn init_schema(conn: &Connection) -> DbResult<()> {
    info!("Initializing database schema");
    conn.execute_batch(SCHEMA)?;
    Ok(())
}
