//! SQL DDL for the tables the pipeline reads.
//!
//! Only `users` and `skills` are declared here; everything else in the
//! application database belongs to the route layer.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    location TEXT
);

CREATE TABLE IF NOT EXISTS skills (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id),
    skill_offered TEXT NOT NULL,
    skill_wanted TEXT
);

CREATE INDEX IF NOT EXISTS idx_skills_user ON skills(user_id);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}
