use rusqlite::{params, OptionalExtension};

use crate::db::models::Role;
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::state::DbPool;

/// Check a username/password pair against the credential store.
///
/// Returns `None` for an unknown user and for a wrong password alike. An
/// unknown user still costs one bcrypt round at `bcrypt_cost`, so both
/// failures take about as long.
pub fn authenticate(
    pool: &DbPool,
    username: &str,
    password: &str,
    bcrypt_cost: u32,
) -> AppResult<Option<CurrentUser>> {
    let conn = pool.get()?;
    let row: Option<(String, String, String, String)> = conn
        .query_row(
            "SELECT id, username, password_hash, role FROM users WHERE username = ?1",
            params![username],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()?;

    let Some((id, username, hash, role)) = row else {
        if let Err(e) = bcrypt::hash(password, bcrypt_cost) {
            tracing::warn!("Dummy hash failed: {}", e);
        }
        tracing::info!("Login failed for unknown user");
        return Ok(None);
    };

    // A malformed stored hash counts as a mismatch.
    if !bcrypt::verify(password, &hash).unwrap_or(false) {
        tracing::info!("Login failed for {}", username);
        return Ok(None);
    }

    let role = role.parse().unwrap_or_else(|e| {
        tracing::warn!("{} has {}; treating as member", username, e);
        Role::Member
    });
    Ok(Some(CurrentUser { id, username, role }))
}
