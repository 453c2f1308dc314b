pub mod account;
pub mod admin;
pub mod events;
pub mod public;

use actix_web::web;

use crate::{
    booking::{check_transition, format_hours, format_money},
    models::{BookingRow, BookingStatus},
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.configure(public::configure)
        .configure(account::configure)
        .configure(admin::configure);
}

#[derive(Clone, Debug)]
pub struct StatCard {
    pub label: String,
    pub value: i64,
}

/// Booking as shown in tables, for both members and admins.
#[derive(Clone, Debug)]
pub struct BookingView {
    pub id: String,
    pub username: String,
    pub pitch_id: String,
    pub pitch_name: String,
    pub booking_date: String,
    pub start_time: String,
    pub end_time: String,
    pub duration_hours: String,
    pub final_price: String,
    pub voucher_code: String,
    pub note: String,
    pub status: String,
    pub can_cancel: bool,
    pub created_at: String,
}

impl From<BookingRow> for BookingView {
    fn from(row: BookingRow) -> Self {
        let can_cancel = BookingStatus::parse(&row.status)
            .is_some_and(|status| check_transition(status, BookingStatus::Cancelled).is_ok());
        Self {
            id: row.id,
            username: row.username,
            pitch_id: row.pitch_id,
            pitch_name: row.pitch_name,
            booking_date: row.booking_date,
            start_time: row.start_time,
            end_time: row.end_time,
            duration_hours: format_hours(row.duration_minutes),
            final_price: format_money(row.final_price_cents),
            voucher_code: row.voucher_code.unwrap_or_default(),
            note: row.note.unwrap_or_default(),
            status: row.status,
            can_cancel,
            created_at: row.created_at,
        }
    }
}
