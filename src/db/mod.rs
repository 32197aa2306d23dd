pub mod schema;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;

/// Open (or create) the application database at the given path with the
/// skill tables initialized.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;

    schema::init_schema(&conn).context("failed to initialize schema")?;

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Open an in-memory database with the schema applied.
pub fn open_memory_database() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::init_schema(&conn).context("failed to initialize schema")?;
    Ok(conn)
}

/// Every offered skill across all users, in insertion order. Duplicates and
/// untrimmed values are returned as stored.
pub fn offered_skills(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT skill_offered FROM skills ORDER BY id")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Where a rebuild reads its raw skill list from.
pub trait SkillSource {
    fn offered_skills(&self) -> rusqlite::Result<Vec<String>>;
}

impl SkillSource for Connection {
    fn offered_skills(&self) -> rusqlite::Result<Vec<String>> {
        offered_skills(self)
    }
}

impl SkillSource for [String] {
    fn offered_skills(&self) -> rusqlite::Result<Vec<String>> {
        Ok(self.to_vec())
    }
}

/// Find a user by name and location, creating it if absent. Returns the user id.
pub fn ensure_user(conn: &Connection, name: &str, location: Option<&str>) -> rusqlite::Result<i64> {
    let existing = conn
        .query_row(
            "SELECT id FROM users WHERE name = ?1 AND location IS ?2",
            params![name, location],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO users (name, location) VALUES (?1, ?2)",
        params![name, location],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Record a skill a user offers. Returns the new skill id.
pub fn insert_skill(
    conn: &Connection,
    user_id: i64,
    skill_offered: &str,
    skill_wanted: Option<&str>,
) -> Result<i64> {
    anyhow::ensure!(!skill_offered.trim().is_empty(), "skill_offered must not be empty");
    let user_exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
        [user_id],
        |row| row.get(0),
    )?;
    anyhow::ensure!(user_exists, "user {user_id} not found");

    conn.execute(
        "INSERT INTO skills (user_id, skill_offered, skill_wanted) VALUES (?1, ?2, ?3)",
        params![user_id, skill_offered, skill_wanted],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Row counts reported by `doctor`.
#[derive(Debug, Serialize)]
pub struct SkillStats {
    pub users: i64,
    pub skill_rows: i64,
    pub distinct_skills: i64,
}

pub fn skill_stats(conn: &Connection) -> rusqlite::Result<SkillStats> {
    let users = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    let skill_rows = conn.query_row("SELECT COUNT(*) FROM skills", [], |row| row.get(0))?;
    let distinct_skills = conn.query_row(
        "SELECT COUNT(DISTINCT lower(trim(skill_offered))) FROM skills WHERE trim(skill_offered) <> ''",
        [],
        |row| row.get(0),
    )?;
    Ok(SkillStats {
        users,
        skill_rows,
        distinct_skills,
    })
}
