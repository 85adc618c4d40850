use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use super::Store;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::*;

const LINK_COLUMNS: &str = "id, user_id, original_url, short_code, display_name, password_hash,
     expiration_date, clicks, is_active, created_at, updated_at";

const USER_COLUMNS: &str = "id, username, email, password_hash, created_at";

const TOKEN_COLUMNS: &str =
    "id, token_hash, token_lookup, user_id, created_at, expires_at, last_used_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Builds `?1, ?2, ...` starting after `offset` already-bound parameters.
fn placeholders(offset: usize, count: usize) -> String {
    (offset + 1..=offset + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Escapes LIKE wildcards so a search term matches literally.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

fn row_to_token(row: &Row<'_>) -> rusqlite::Result<Token> {
    Ok(Token {
        id: row.get(0)?,
        token_hash: row.get(1)?,
        token_lookup: row.get(2)?,
        user_id: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        expires_at: parse_datetime(&row.get::<_, String>(5)?),
        last_used_at: row.get::<_, Option<String>>(6)?.map(|s| parse_datetime(&s)),
    })
}

fn row_to_link(row: &Row<'_>) -> rusqlite::Result<Link> {
    Ok(Link {
        id: row.get(0)?,
        user_id: row.get(1)?,
        original_url: row.get(2)?,
        short_code: row.get(3)?,
        display_name: row.get(4)?,
        password_hash: row.get(5)?,
        expiration_date: row.get::<_, Option<String>>(6)?.map(|s| parse_datetime(&s)),
        clicks: row.get(7)?,
        is_active: row.get(8)?,
        created_at: parse_datetime(&row.get::<_, String>(9)?),
        updated_at: parse_datetime(&row.get::<_, String>(10)?),
    })
}

fn row_to_click(row: &Row<'_>) -> rusqlite::Result<Click> {
    Ok(Click {
        id: row.get(0)?,
        link_id: row.get(1)?,
        ip_address: row.get(2)?,
        referrer: row.get(3)?,
        user_agent: row.get(4)?,
        clicked_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn create_user(&self, user: &NewUser) -> Result<User> {
        let now = Utc::now();
        let conn = self.conn();
        let result = conn.execute(
            "INSERT INTO users (username, email, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                user.username,
                user.email,
                user.password_hash,
                format_datetime(&now),
            ],
        );

        match result {
            Ok(_) => Ok(User {
                id: conn.last_insert_rowid(),
                username: user.username.clone(),
                email: user.email.clone(),
                password_hash: user.password_hash.clone(),
                created_at: now,
            }),
            Err(e) if is_unique_violation(&e) => Err(Error::AlreadyExists),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_user(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            row_to_user,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
            params![username],
            row_to_user,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_user_by_login(&self, username_or_email: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {USER_COLUMNS} FROM users WHERE username = ?1 OR email = ?1
                 ORDER BY username = ?1 DESC LIMIT 1"
            ),
            params![username_or_email],
            row_to_user,
        )
        .optional()
        .map_err(Error::from)
    }

    fn update_user_password(&self, id: i64, password_hash: &str) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE users SET password_hash = ?1 WHERE id = ?2",
            params![password_hash, id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    // Token operations

    fn create_token(&self, token: &Token) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO tokens (id, token_hash, token_lookup, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                token.id,
                token.token_hash,
                token.token_lookup,
                token.user_id,
                format_datetime(&token.created_at),
                format_datetime(&token.expires_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(Error::TokenLookupCollision),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {TOKEN_COLUMNS} FROM tokens WHERE token_lookup = ?1"),
            params![lookup],
            row_to_token,
        )
        .optional()
        .map_err(Error::from)
    }

    fn delete_token(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM tokens WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn update_token_last_used(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE tokens SET last_used_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(())
    }

    // Link operations

    fn create_link(&self, link: &NewLink) -> Result<Link> {
        let now = Utc::now();
        let conn = self.conn();
        let result = conn.execute(
            "INSERT INTO links (user_id, original_url, short_code, display_name, password_hash,
                                expiration_date, clicks, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 1, ?7, ?7)",
            params![
                link.user_id,
                link.original_url,
                link.short_code,
                link.display_name,
                link.password_hash,
                link.expiration_date.as_ref().map(format_datetime),
                format_datetime(&now),
            ],
        );

        match result {
            Ok(_) => Ok(Link {
                id: conn.last_insert_rowid(),
                user_id: link.user_id,
                original_url: link.original_url.clone(),
                short_code: link.short_code.clone(),
                display_name: link.display_name.clone(),
                password_hash: link.password_hash.clone(),
                expiration_date: link.expiration_date,
                clicks: 0,
                is_active: true,
                created_at: now,
                updated_at: now,
            }),
            Err(e) if is_unique_violation(&e) => Err(Error::ShortCodeTaken),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_link_for_owner(&self, owner_id: i64, id: i64) -> Result<Option<Link>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {LINK_COLUMNS} FROM links WHERE id = ?1 AND user_id = ?2"),
            params![id, owner_id],
            row_to_link,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_link_by_short_code(&self, short_code: &str) -> Result<Option<Link>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {LINK_COLUMNS} FROM links WHERE short_code = ?1"),
            params![short_code],
            row_to_link,
        )
        .optional()
        .map_err(Error::from)
    }

    fn short_code_exists(&self, short_code: &str) -> Result<bool> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM links WHERE short_code = ?1",
            params![short_code],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn list_links(&self, owner_id: i64, search: Option<&str>) -> Result<Vec<Link>> {
        let conn = self.conn();
        let search = search.map(str::trim).filter(|s| !s.is_empty());

        let links = match search {
            Some(term) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {LINK_COLUMNS} FROM links
                     WHERE user_id = ?1
                       AND (display_name LIKE ?2 ESCAPE '\\'
                            OR original_url LIKE ?2 ESCAPE '\\'
                            OR short_code LIKE ?2 ESCAPE '\\')
                     ORDER BY created_at DESC, id DESC"
                ))?;
                stmt.query_map(params![owner_id, like_pattern(term)], row_to_link)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {LINK_COLUMNS} FROM links WHERE user_id = ?1
                     ORDER BY created_at DESC, id DESC"
                ))?;
                stmt.query_map(params![owner_id], row_to_link)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        };

        Ok(links)
    }

    fn count_links(&self, owner_id: i64) -> Result<i64> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM links WHERE user_id = ?1",
            params![owner_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn update_link(&self, owner_id: i64, link: &Link) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE links
             SET original_url = ?1, display_name = ?2, password_hash = ?3,
                 expiration_date = ?4, is_active = ?5, updated_at = ?6
             WHERE id = ?7 AND user_id = ?8",
            params![
                link.original_url,
                link.display_name,
                link.password_hash,
                link.expiration_date.as_ref().map(format_datetime),
                link.is_active,
                format_datetime(&link.updated_at),
                link.id,
                owner_id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn set_links_active(&self, owner_id: i64, ids: &[i64], is_active: bool) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "UPDATE links SET is_active = ?1, updated_at = ?2
             WHERE user_id = ?3 AND is_active != ?1 AND id IN ({})",
            placeholders(3, ids.len())
        );

        let mut values: Vec<rusqlite::types::Value> = vec![
            is_active.into(),
            format_datetime(&Utc::now()).into(),
            owner_id.into(),
        ];
        values.extend(ids.iter().map(|&id| rusqlite::types::Value::from(id)));

        let rows = self.conn().execute(&sql, params_from_iter(values))?;
        Ok(rows)
    }

    fn delete_links(&self, owner_id: i64, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        // Click rows go with their link through ON DELETE CASCADE.
        let sql = format!(
            "DELETE FROM links WHERE user_id = ?1 AND id IN ({})",
            placeholders(1, ids.len())
        );

        let mut values: Vec<rusqlite::types::Value> = vec![owner_id.into()];
        values.extend(ids.iter().map(|&id| rusqlite::types::Value::from(id)));

        let rows = self.conn().execute(&sql, params_from_iter(values))?;
        Ok(rows)
    }

    // Click operations

    fn record_click(&self, link_id: i64, info: &ClickInfo, at: DateTime<Utc>) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO clicks (link_id, ip_address, referrer, user_agent, clicked_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                link_id,
                info.ip_address,
                info.referrer.as_deref().unwrap_or(DIRECT_REFERRER),
                info.user_agent.as_deref().unwrap_or(""),
                format_datetime(&at),
            ],
        )?;

        let rows = tx.execute(
            "UPDATE links SET clicks = clicks + 1 WHERE id = ?1",
            params![link_id],
        )?;
        if rows == 0 {
            return Err(Error::NotFound);
        }

        tx.commit()?;
        Ok(())
    }

    fn list_link_clicks(&self, link_id: i64) -> Result<Vec<Click>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, link_id, ip_address, referrer, user_agent, clicked_at
             FROM clicks WHERE link_id = ?1 ORDER BY id",
        )?;

        let rows = stmt.query_map(params![link_id], row_to_click)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_recent_clicks(&self, owner_id: i64, limit: i64) -> Result<Vec<ClickHistoryEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT c.id, c.link_id, c.ip_address, c.referrer, c.user_agent, c.clicked_at,
                    l.short_code, l.display_name
             FROM clicks c JOIN links l ON l.id = c.link_id
             WHERE l.user_id = ?1
             ORDER BY c.id DESC LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![owner_id, limit], |row| {
            Ok(ClickHistoryEntry {
                click: row_to_click(row)?,
                short_code: row.get(6)?,
                display_name: row.get(7)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }
}
