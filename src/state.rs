use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::broadcast;

use crate::{booking::format_money, config::Config, models::BookingRow};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub events: broadcast::Sender<BookingEvent>,
    pub config: Config,
}

impl AppState {
    pub fn new(db: SqlitePool, config: Config) -> Self {
        let (events, _) = broadcast::channel(64);
        Self { db, events, config }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct BookingEvent {
    pub kind: String,
    pub booking_id: String,
    pub status: String,
    pub username: String,
    pub pitch_name: String,
    pub booking_date: String,
    pub start_time: String,
    pub end_time: String,
    pub final_price: String,
}

impl BookingEvent {
    pub fn from_row(kind: &str, row: BookingRow) -> Self {
        Self {
            kind: kind.to_string(),
            booking_id: row.id,
            status: row.status,
            username: row.username,
            pitch_name: row.pitch_name,
            booking_date: row.booking_date,
            start_time: row.start_time,
            end_time: row.end_time,
            final_price: format_money(row.final_price_cents),
        }
    }
}
