use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Result, Row};
use time::OffsetDateTime;

use crate::error::AppError;
use crate::models::{
    AuthUser, CommentResponse, ManagerResponse, NewUser, Session, Todo, TodoResponse, User,
    UserResponse, UserRole,
};

pub type DbPool = Arc<Mutex<Connection>>;

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        email TEXT UNIQUE NOT NULL,
        password TEXT NOT NULL,
        user_role TEXT NOT NULL,
        nickname TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        created_at INTEGER DEFAULT (strftime('%s', 'now')),
        expires_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS todos (
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL,
        contents TEXT NOT NULL,
        weather TEXT NOT NULL,
        user_id INTEGER NOT NULL REFERENCES users(id),
        created_at INTEGER NOT NULL,
        modified_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_todos_created_at ON todos(created_at);
    CREATE INDEX IF NOT EXISTS idx_todos_modified_at ON todos(modified_at);

    CREATE TABLE IF NOT EXISTS managers (
        id INTEGER PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES users(id),
        todo_id INTEGER NOT NULL REFERENCES todos(id) ON DELETE CASCADE,
        UNIQUE (user_id, todo_id)
    );
    CREATE INDEX IF NOT EXISTS idx_managers_todo_id ON managers(todo_id);

    CREATE TABLE IF NOT EXISTS comments (
        id INTEGER PRIMARY KEY,
        contents TEXT NOT NULL,
        user_id INTEGER NOT NULL REFERENCES users(id),
        todo_id INTEGER NOT NULL REFERENCES todos(id) ON DELETE CASCADE,
        created_at INTEGER DEFAULT (strftime('%s', 'now'))
    );
    CREATE INDEX IF NOT EXISTS idx_comments_todo_id ON comments(todo_id);

    CREATE TABLE IF NOT EXISTS logs (
        id INTEGER PRIMARY KEY,
        success INTEGER NOT NULL,
        created_at INTEGER DEFAULT (strftime('%s', 'now'))
    );
";

pub fn open(path: impl AsRef<Path>) -> Result<DbPool> {
    let conn = Connection::open(path)?;
    migrate(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

pub fn open_in_memory() -> Result<DbPool> {
    let conn = Connection::open_in_memory()?;
    migrate(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)
}

pub fn lock(pool: &DbPool) -> Result<MutexGuard<'_, Connection>, AppError> {
    pool.lock()
        .map_err(|_| AppError::Database("connection mutex poisoned".to_string()))
}

/// Timestamps are stored as microseconds since the Unix epoch.
pub fn to_micros(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000) as i64
}

pub fn from_micros(micros: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(micros) * 1_000).ok()
}

fn timestamp(row: &Row<'_>, idx: usize) -> Result<OffsetDateTime> {
    let micros: i64 = row.get(idx)?;
    from_micros(micros).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp out of range: {micros}").into(),
        )
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

// User operations
fn user_from_row(row: &Row<'_>) -> Result<User> {
    let role: String = row.get(3)?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        role: UserRole::parse(&role).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                Type::Text,
                format!("unknown role: {role}").into(),
            )
        })?,
        nickname: row.get(4)?,
    })
}

pub fn create_user(pool: &DbPool, user: &NewUser) -> Result<User, AppError> {
    let conn = lock(pool)?;
    let inserted = conn.execute(
        "INSERT INTO users (email, password, user_role, nickname) VALUES (?1, ?2, ?3, ?4)",
        (
            &user.email,
            &user.password_hash,
            user.role.as_str(),
            &user.nickname,
        ),
    );
    match inserted {
        Ok(_) => {}
        Err(err) if is_constraint_violation(&err) => {
            return Err(AppError::Conflict("Email is already registered".to_string()));
        }
        Err(err) => return Err(err.into()),
    }

    Ok(User {
        id: conn.last_insert_rowid(),
        email: user.email.clone(),
        password_hash: user.password_hash.clone(),
        role: user.role,
        nickname: user.nickname.clone(),
    })
}

/// Inserts users with a single prepared statement, committing one transaction per batch.
pub fn insert_users_batched(
    conn: &mut Connection,
    users: &[NewUser],
    batch_size: usize,
) -> Result<usize> {
    let mut inserted = 0;
    for chunk in users.chunks(batch_size.max(1)) {
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO users (email, password, user_role, nickname) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for user in chunk {
                inserted += stmt.execute((
                    &user.email,
                    &user.password_hash,
                    user.role.as_str(),
                    &user.nickname,
                ))?;
            }
        }
        tx.commit()?;
    }
    Ok(inserted)
}

pub fn get_user(pool: &DbPool, id: i64) -> Result<Option<User>, AppError> {
    let conn = lock(pool)?;
    let user = conn
        .query_row(
            "SELECT id, email, password, user_role, nickname FROM users WHERE id = ?1",
            [id],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn get_user_by_email(pool: &DbPool, email: &str) -> Result<Option<User>, AppError> {
    let conn = lock(pool)?;
    let user = conn
        .query_row(
            "SELECT id, email, password, user_role, nickname FROM users WHERE email = ?1",
            [email],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn count_users(pool: &DbPool) -> Result<i64, AppError> {
    let conn = lock(pool)?;
    Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
}

// Session operations
pub fn create_session(pool: &DbPool, session: &Session) -> Result<(), AppError> {
    let conn = lock(pool)?;
    conn.execute(
        "INSERT INTO sessions (id, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
        (
            &session.id,
            session.user_id,
            session.created_at,
            session.expires_at,
        ),
    )?;
    Ok(())
}

/// Resolves a live session to its user. Expired sessions resolve to `None`.
pub fn get_session_user(pool: &DbPool, id: &str, now: i64) -> Result<Option<AuthUser>, AppError> {
    let conn = lock(pool)?;
    let user = conn
        .query_row(
            "SELECT u.id, u.email, u.password, u.user_role, u.nickname
             FROM sessions s
             INNER JOIN users u ON u.id = s.user_id
             WHERE s.id = ?1 AND s.expires_at > ?2",
            (id, now),
            user_from_row,
        )
        .optional()?;

    Ok(user.map(|u| AuthUser {
        id: u.id,
        email: u.email,
        nickname: u.nickname,
        role: u.role,
    }))
}

pub fn delete_session(pool: &DbPool, id: &str) -> Result<(), AppError> {
    let conn = lock(pool)?;
    conn.execute("DELETE FROM sessions WHERE id = ?1", [id])?;
    Ok(())
}

pub fn cleanup_expired_sessions(pool: &DbPool, now: i64) -> Result<usize, AppError> {
    let conn = lock(pool)?;
    Ok(conn.execute("DELETE FROM sessions WHERE expires_at < ?1", [now])?)
}

// Todo operations
pub(crate) const TODO_RESPONSE_COLUMNS: &str =
    "t.id, t.title, t.contents, t.weather, u.id, u.email, t.created_at, t.modified_at";

pub(crate) fn todo_response_from_row(row: &Row<'_>) -> Result<TodoResponse> {
    Ok(TodoResponse {
        id: row.get(0)?,
        title: row.get(1)?,
        contents: row.get(2)?,
        weather: row.get(3)?,
        user: UserResponse {
            id: row.get(4)?,
            email: row.get(5)?,
        },
        created_at: timestamp(row, 6)?,
        modified_at: timestamp(row, 7)?,
    })
}

fn todo_from_row(row: &Row<'_>) -> Result<Todo> {
    Ok(Todo {
        id: row.get(0)?,
        title: row.get(1)?,
        contents: row.get(2)?,
        weather: row.get(3)?,
        user_id: row.get(4)?,
        created_at: timestamp(row, 5)?,
        modified_at: timestamp(row, 6)?,
    })
}

/// Inserts a todo and registers its owner as the first manager in one transaction.
pub fn create_todo(
    pool: &DbPool,
    user_id: i64,
    title: &str,
    contents: &str,
    weather: &str,
    now: OffsetDateTime,
) -> Result<Todo, AppError> {
    let mut conn = lock(pool)?;
    let at = to_micros(now);

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO todos (title, contents, weather, user_id, created_at, modified_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        (title, contents, weather, user_id, at),
    )?;
    let id = tx.last_insert_rowid();
    tx.execute(
        "INSERT INTO managers (user_id, todo_id) VALUES (?1, ?2)",
        (user_id, id),
    )?;
    let todo = tx.query_row(
        "SELECT id, title, contents, weather, user_id, created_at, modified_at
         FROM todos WHERE id = ?1",
        [id],
        todo_from_row,
    )?;
    tx.commit()?;

    Ok(todo)
}

pub fn get_todo(pool: &DbPool, id: i64) -> Result<Option<Todo>, AppError> {
    let conn = lock(pool)?;
    let todo = conn
        .query_row(
            "SELECT id, title, contents, weather, user_id, created_at, modified_at
             FROM todos WHERE id = ?1",
            [id],
            todo_from_row,
        )
        .optional()?;
    Ok(todo)
}

pub fn get_todo_with_user(pool: &DbPool, id: i64) -> Result<Option<TodoResponse>, AppError> {
    let conn = lock(pool)?;
    let sql = format!(
        "SELECT {TODO_RESPONSE_COLUMNS} FROM todos t
         LEFT JOIN users u ON u.id = t.user_id
         WHERE t.id = ?1"
    );
    let todo = conn
        .query_row(&sql, [id], todo_response_from_row)
        .optional()?;
    Ok(todo)
}

// Log operations
pub fn save_log(pool: &DbPool, success: bool) -> Result<(), AppError> {
    let conn = lock(pool)?;
    conn.execute("INSERT INTO logs (success) VALUES (?1)", [success])?;
    Ok(())
}

pub fn count_logs(pool: &DbPool, success: bool) -> Result<i64, AppError> {
    let conn = lock(pool)?;
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM logs WHERE success = ?1",
        [success],
        |row| row.get(0),
    )?)
}

// Manager operations
fn manager_from_row(row: &Row<'_>) -> Result<ManagerResponse> {
    Ok(ManagerResponse {
        id: row.get(0)?,
        user: UserResponse {
            id: row.get(1)?,
            email: row.get(2)?,
        },
    })
}

pub fn add_manager(pool: &DbPool, todo_id: i64, user_id: i64) -> Result<ManagerResponse, AppError> {
    let conn = lock(pool)?;
    match conn.execute(
        "INSERT INTO managers (user_id, todo_id) VALUES (?1, ?2)",
        (user_id, todo_id),
    ) {
        Ok(_) => {}
        Err(err) if is_constraint_violation(&err) => {
            return Err(AppError::Conflict(
                "User is already a manager of this todo".to_string(),
            ));
        }
        Err(err) => return Err(err.into()),
    }
    let id = conn.last_insert_rowid();

    let manager = conn.query_row(
        "SELECT m.id, u.id, u.email FROM managers m
         INNER JOIN users u ON u.id = m.user_id
         WHERE m.id = ?1",
        [id],
        manager_from_row,
    )?;
    Ok(manager)
}

pub fn list_managers(pool: &DbPool, todo_id: i64) -> Result<Vec<ManagerResponse>, AppError> {
    let conn = lock(pool)?;
    let mut stmt = conn.prepare(
        "SELECT m.id, u.id, u.email FROM managers m
         INNER JOIN users u ON u.id = m.user_id
         WHERE m.todo_id = ?1
         ORDER BY m.id ASC",
    )?;
    let managers = stmt
        .query_map([todo_id], manager_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(managers)
}

pub fn delete_manager(pool: &DbPool, todo_id: i64, manager_id: i64) -> Result<bool, AppError> {
    let conn = lock(pool)?;
    let rows = conn.execute(
        "DELETE FROM managers WHERE id = ?1 AND todo_id = ?2",
        (manager_id, todo_id),
    )?;
    Ok(rows > 0)
}

// Comment operations
fn comment_from_row(row: &Row<'_>) -> Result<CommentResponse> {
    Ok(CommentResponse {
        id: row.get(0)?,
        contents: row.get(1)?,
        user: UserResponse {
            id: row.get(2)?,
            email: row.get(3)?,
        },
    })
}

pub fn create_comment(
    pool: &DbPool,
    todo_id: i64,
    user_id: i64,
    contents: &str,
) -> Result<CommentResponse, AppError> {
    let conn = lock(pool)?;
    conn.execute(
        "INSERT INTO comments (contents, user_id, todo_id) VALUES (?1, ?2, ?3)",
        (contents, user_id, todo_id),
    )?;
    let id = conn.last_insert_rowid();

    let comment = conn.query_row(
        "SELECT c.id, c.contents, u.id, u.email FROM comments c
         INNER JOIN users u ON u.id = c.user_id
         WHERE c.id = ?1",
        [id],
        comment_from_row,
    )?;
    Ok(comment)
}

pub fn list_comments(pool: &DbPool, todo_id: i64) -> Result<Vec<CommentResponse>, AppError> {
    let conn = lock(pool)?;
    let mut stmt = conn.prepare(
        "SELECT c.id, c.contents, u.id, u.email FROM comments c
         INNER JOIN users u ON u.id = c.user_id
         WHERE c.todo_id = ?1
         ORDER BY c.id ASC",
    )?;
    let comments = stmt
        .query_map([todo_id], comment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(comments)
}
