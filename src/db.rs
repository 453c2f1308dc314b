use std::{fs, path::Path};

use chrono::Utc;
use sqlx::SqlitePool;

use crate::{
    auth::{hash_password, new_id},
    config::Config,
    models::{BookingRow, BookingStatus, Role, BOOKING_SELECT},
    state::{AppState, BookingEvent},
};

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let path = if let Some(path) = db_url.strip_prefix("sqlite://") {
        Some(path)
    } else if let Some(path) = db_url.strip_prefix("sqlite:") {
        Some(path)
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    let db_path = Path::new(path);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

pub async fn seed_defaults(pool: &SqlitePool, config: &Config) -> Result<(), sqlx::Error> {
    seed_admin(pool, config).await?;
    seed_pitch_types(pool).await?;
    Ok(())
}

pub async fn log_activity(
    pool: &SqlitePool,
    kind: &str,
    message: &str,
    user_id: Option<&str>,
    booking_id: Option<&str>,
) {
    let result = sqlx::query(
        r#"INSERT INTO activities (id, kind, message, created_at, user_id, booking_id)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(kind)
    .bind(message)
    .bind(now_rfc3339())
    .bind(user_id)
    .bind(booking_id)
    .execute(pool)
    .await;

    if let Err(err) = result {
        log::warn!("Failed to record activity {kind}: {err}");
    }
}

pub async fn fetch_booking(pool: &SqlitePool, booking_id: &str) -> Option<BookingRow> {
    let sql = format!("{BOOKING_SELECT} WHERE b.id = ? LIMIT 1");
    sqlx::query_as::<_, BookingRow>(&sql)
        .bind(booking_id)
        .fetch_optional(pool)
        .await
        .unwrap_or(None)
}

/// Pushes the current state of a booking to live admin listeners.
pub async fn publish_booking(state: &AppState, kind: &str, booking_id: &str) {
    if let Some(row) = fetch_booking(&state.db, booking_id).await {
        let _ = state.events.send(BookingEvent::from_row(kind, row));
    }
}

/// Moves a booking from `from` to `to`. Returns `false` when the stored
/// status is no longer `from`, leaving the row untouched.
pub async fn transition_booking(
    pool: &SqlitePool,
    booking_id: &str,
    from: BookingStatus,
    to: BookingStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE bookings SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
        .bind(to.as_str())
        .bind(now_rfc3339())
        .bind(booking_id)
        .bind(from.as_str())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Stores an outgoing mail. Delivery is handled outside this process.
pub async fn queue_email(
    pool: &SqlitePool,
    recipient: &str,
    subject: &str,
    body: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO email_outbox (id, recipient, subject, body, created_at)
           VALUES (?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(recipient)
    .bind(subject)
    .bind(body)
    .bind(now_rfc3339())
    .execute(pool)
    .await?;

    log::info!("Queued mail \"{subject}\" for {recipient}");
    Ok(())
}

async fn seed_admin(pool: &SqlitePool, config: &Config) -> Result<(), sqlx::Error> {
    let existing = sqlx::query_as::<_, (String,)>("SELECT id FROM users WHERE role = ? LIMIT 1")
        .bind(Role::Admin.as_str())
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        return Ok(());
    }

    if config.admin_password == "admin" {
        log::warn!("ADMIN_PASSWORD not set. Using default password 'admin'. Set ADMIN_PASSWORD in production.");
    }

    let password_hash = hash_password(&config.admin_password)
        .map_err(|_| sqlx::Error::Protocol("password hash failed".into()))?;
    let now = now_rfc3339();

    sqlx::query(
        r#"INSERT INTO users (id, username, email, full_name, role, password_hash, is_active, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)"#,
    )
    .bind(new_id())
    .bind(&config.admin_user)
    .bind(&config.admin_email)
    .bind("Administrator")
    .bind(Role::Admin.as_str())
    .bind(password_hash)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    log::info!("Seeded admin account {}", config.admin_user);
    Ok(())
}

async fn seed_pitch_types(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let types = [
        ("5-a-side", "Small-sided pitch for five players per team."),
        ("7-a-side", "Mid-size pitch for seven players per team."),
        ("11-a-side", "Full-size pitch."),
    ];

    for (name, description) in types {
        sqlx::query(
            r#"INSERT INTO pitch_types (id, name, description) VALUES (?, ?, ?)
               ON CONFLICT(name) DO NOTHING"#,
        )
        .bind(new_id())
        .bind(name)
        .bind(description)
        .execute(pool)
        .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_dir_is_skipped_for_memory_and_foreign_urls() {
        assert!(ensure_sqlite_dir("sqlite::memory:").is_ok());
        assert!(ensure_sqlite_dir("postgres://localhost/db").is_ok());
    }

    #[actix_web::test]
    async fn seeding_is_idempotent() {
        let pool = crate::testing::pool().await;
        let config = Config::for_tests();
        seed_defaults(&pool, &config).await.unwrap();
        seed_defaults(&pool, &config).await.unwrap();

        let admins: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'Admin'")
            .fetch_one(&pool)
            .await
            .unwrap();
        let types: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pitch_types")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(admins, 1);
        assert_eq!(types, 3);
    }

    #[actix_web::test]
    async fn stale_transitions_leave_the_booking_alone() {
        let state = crate::testing::state().await;
        let user_id =
            crate::testing::create_user(&state.db, "sam", "member-pass", Role::User, true).await;
        let pitch = crate::testing::create_pitch(&state.db, "Riverside", 10_000).await;
        sqlx::query(
            r#"INSERT INTO bookings (id, user_id, pitch_id, booking_date, start_time, end_time,
                                     duration_minutes, final_price_cents, status, created_at, updated_at)
               VALUES ('b1', ?, ?, '2026-06-02', '18:00', '20:00', 120, 20000, 'Pending', '', '')"#,
        )
        .bind(&user_id)
        .bind(&pitch)
        .execute(&state.db)
        .await
        .unwrap();

        // The member cancels first; an admin confirm based on the earlier
        // Pending read must not resurrect the booking.
        let cancelled =
            transition_booking(&state.db, "b1", BookingStatus::Pending, BookingStatus::Cancelled)
                .await
                .unwrap();
        let confirmed =
            transition_booking(&state.db, "b1", BookingStatus::Pending, BookingStatus::Confirmed)
                .await
                .unwrap();
        assert!(cancelled);
        assert!(!confirmed);

        let status: String = sqlx::query_scalar("SELECT status FROM bookings WHERE id = 'b1'")
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(status, "Cancelled");
    }
}
