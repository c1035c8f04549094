use rand::Rng;
use rusqlite::{params, OptionalExtension};

use crate::db::models::Role;
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::state::DbPool;

/// Create a new session for a user. Returns the session token.
pub fn create_session(pool: &DbPool, user_id: &str, hours: u64) -> AppResult<String> {
    let conn = pool.get()?;

    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();

    conn.execute(
        "INSERT INTO sessions (id, user_id, token, expires_at) VALUES (?1, ?2, ?3, datetime('now', ?4))",
        params![id, user_id, token, format!("+{} hours", hours)],
    )?;

    Ok(token)
}

/// Resolve an unexpired session token to its user.
pub fn find_user(pool: &DbPool, token: &str) -> AppResult<Option<CurrentUser>> {
    let conn = pool.get()?;
    let row: Option<(String, String, String)> = conn
        .query_row(
            "SELECT u.id, u.username, u.role FROM sessions s \
             JOIN users u ON u.id = s.user_id \
             WHERE s.token = ?1 AND s.expires_at > datetime('now')",
            params![token],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    Ok(row.map(|(id, username, role)| CurrentUser {
        id,
        role: role.parse().unwrap_or(Role::Member),
        username,
    }))
}

/// Delete a session by token.
pub fn delete_session(pool: &DbPool, token: &str) -> AppResult<()> {
    let conn = pool.get()?;
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

/// Drop sessions past their expiry. Returns how many were removed.
pub fn purge_expired(pool: &DbPool) -> AppResult<usize> {
    let conn = pool.get()?;
    let removed = conn.execute(
        "DELETE FROM sessions WHERE expires_at <= datetime('now')",
        [],
    )?;
    Ok(removed)
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeedUser;
    use crate::db;
    use tempfile::TempDir;

    fn pool_with_user(role: Role) -> (DbPool, String, TempDir) {
        let temp = TempDir::new().unwrap();
        let pool = db::create_pool(&temp.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        db::seed_users(
            &pool,
            &[SeedUser {
                username: "Ana".into(),
                password: "pw".into(),
                role,
            }],
            4,
        )
        .unwrap();
        let id: String = pool
            .get()
            .unwrap()
            .query_row("SELECT id FROM users WHERE username = 'Ana'", [], |r| r.get(0))
            .unwrap();
        (pool, id, temp)
    }

    #[test]
    fn generate_token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generate_token_is_unique() {
        assert_ne!(generate_token(), generate_token());
    }

    #[test]
    fn session_resolves_to_user_until_deleted() {
        let (pool, user_id, _temp) = pool_with_user(Role::Moderator);
        let token = create_session(&pool, &user_id, 1).unwrap();

        let user = find_user(&pool, &token).unwrap().unwrap();
        assert_eq!(user.username, "Ana");
        assert_eq!(user.role, Role::Moderator);

        delete_session(&pool, &token).unwrap();
        assert!(find_user(&pool, &token).unwrap().is_none());
    }

    #[test]
    fn expired_sessions_do_not_resolve_and_are_purged() {
        let (pool, user_id, _temp) = pool_with_user(Role::Member);
        let token = create_session(&pool, &user_id, 0).unwrap();

        assert!(find_user(&pool, &token).unwrap().is_none());
        assert_eq!(purge_expired(&pool).unwrap(), 1);
    }
}
