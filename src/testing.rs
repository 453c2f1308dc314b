//! Fixtures shared by handler tests.

use base64::{engine::general_purpose::STANDARD, Engine};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::{
    auth::{hash_password, new_id},
    config::Config,
    db::{now_rfc3339, run_migrations, seed_defaults},
    models::Role,
    state::AppState,
};

/// A single-connection in-memory database; a second connection would see an
/// empty schema.
pub async fn pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    run_migrations(&pool).await.expect("migrations");
    pool
}

pub async fn state() -> AppState {
    let config = Config::for_tests();
    let pool = pool().await;
    seed_defaults(&pool, &config).await.expect("seed");
    AppState::new(pool, config)
}

pub async fn create_user(
    pool: &SqlitePool,
    username: &str,
    password: &str,
    role: Role,
    active: bool,
) -> String {
    let id = new_id();
    let now = now_rfc3339();
    sqlx::query(
        r#"INSERT INTO users (id, username, email, full_name, role, password_hash, is_active, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(username)
    .bind(format!("{username}@example.com"))
    .bind(username)
    .bind(role.as_str())
    .bind(hash_password(password).unwrap())
    .bind(active as i64)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .expect("insert user");
    id
}

pub async fn create_pitch(pool: &SqlitePool, name: &str, price_per_hour_cents: i64) -> String {
    let pitch_type_id: String = sqlx::query_scalar("SELECT id FROM pitch_types ORDER BY name LIMIT 1")
        .fetch_one(pool)
        .await
        .expect("seeded pitch type");
    let facility_id = new_id();
    let id = new_id();
    let now = now_rfc3339();
    sqlx::query(
        "INSERT INTO facilities (id, name, address, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&facility_id)
    .bind(format!("{name} Park"))
    .bind("1 Stadium Road")
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .expect("insert facility");
    sqlx::query(
        r#"INSERT INTO pitches (id, facility_id, pitch_type_id, name, address, price_per_hour_cents, is_available, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)"#,
    )
    .bind(&id)
    .bind(&facility_id)
    .bind(pitch_type_id)
    .bind(name)
    .bind("1 Stadium Road")
    .bind(price_per_hour_cents)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .expect("insert pitch");
    id
}

pub async fn create_voucher(
    pool: &SqlitePool,
    code: &str,
    discount_percent: i64,
    usage_limit: Option<i64>,
    end_date: Option<&str>,
) -> String {
    let id = new_id();
    sqlx::query(
        r#"INSERT INTO vouchers (id, code, discount_percent, usage_limit, end_date, is_active, created_at)
           VALUES (?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(&id)
    .bind(code)
    .bind(discount_percent)
    .bind(usage_limit)
    .bind(end_date)
    .bind(now_rfc3339())
    .execute(pool)
    .await
    .expect("insert voucher");
    id
}

pub fn basic_auth(username: &str, password: &str) -> (&'static str, String) {
    let encoded = STANDARD.encode(format!("{username}:{password}"));
    ("Authorization", format!("Basic {encoded}"))
}

/// A date far enough ahead that slot validation never trips on the clock.
pub fn future_date(days: i64) -> String {
    (chrono::Local::now().date_naive() + chrono::Duration::days(days))
        .format("%Y-%m-%d")
        .to_string()
}
