use chrono::NaiveDate;

use crate::booking::{parse_date, VoucherTerms};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    User,
    Guest,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::User, Role::Guest];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::User => "User",
            Role::Guest => "Guest",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.as_str() == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Rejected,
    Cancelled,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 4] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Rejected,
        BookingStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "Pending",
            BookingStatus::Confirmed => "Confirmed",
            BookingStatus::Rejected => "Rejected",
            BookingStatus::Cancelled => "Cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == value)
    }

    /// Whether a booking in this state holds its slot.
    pub fn holds_slot(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

#[allow(dead_code)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub phone_number: String,
    pub role: String,
    pub password_hash: String,
    pub activation_token: Option<String>,
    pub activation_expiry: Option<String>,
    pub is_active: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FacilityRow {
    pub id: String,
    pub name: String,
    pub address: String,
    pub description: Option<String>,
    pub pitch_count: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PitchTypeRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PitchRow {
    pub id: String,
    pub facility_id: Option<String>,
    pub facility_name: Option<String>,
    pub pitch_type_id: String,
    pub pitch_type_name: String,
    pub name: String,
    pub address: String,
    pub description: Option<String>,
    pub price_per_hour_cents: i64,
    pub is_available: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VoucherRow {
    pub id: String,
    pub code: String,
    pub description: Option<String>,
    pub discount_percent: i64,
    pub min_order_cents: Option<i64>,
    pub usage_limit: Option<i64>,
    pub used_count: i64,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub is_active: i64,
}

impl VoucherRow {
    pub fn terms(&self) -> VoucherTerms {
        VoucherTerms {
            discount_percent: self.discount_percent,
            min_order_cents: self.min_order_cents,
            usage_limit: self.usage_limit,
            used_count: self.used_count,
            start_date: optional_date(self.start_date.as_deref()),
            end_date: optional_date(self.end_date.as_deref()),
            is_active: self.is_active == 1,
        }
    }
}

fn optional_date(value: Option<&str>) -> Option<NaiveDate> {
    value
        .filter(|value| !value.trim().is_empty())
        .and_then(|value| parse_date(value).ok())
}

#[allow(dead_code)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BookingRow {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub pitch_id: String,
    pub pitch_name: String,
    pub booking_date: String,
    pub start_time: String,
    pub end_time: String,
    pub duration_minutes: i64,
    pub final_price_cents: i64,
    pub voucher_code: Option<String>,
    pub note: Option<String>,
    pub status: String,
    pub created_at: String,
}

/// Column list matching [`BookingRow`]; callers append `WHERE`/`ORDER BY`.
pub const BOOKING_SELECT: &str = r#"SELECT b.id, b.user_id, u.username, b.pitch_id, p.name as pitch_name,
                  b.booking_date, b.start_time, b.end_time, b.duration_minutes,
                  b.final_price_cents, v.code as voucher_code, b.note, b.status, b.created_at
           FROM bookings b
           JOIN users u ON b.user_id = u.id
           JOIN pitches p ON b.pitch_id = p.id
           LEFT JOIN vouchers v ON b.voucher_id = v.id"#;

/// Column list matching [`PitchRow`].
pub const PITCH_SELECT: &str = r#"SELECT p.id, p.facility_id, f.name as facility_name, p.pitch_type_id,
                  t.name as pitch_type_name, p.name, p.address, p.description,
                  p.price_per_hour_cents, p.is_available
           FROM pitches p
           JOIN pitch_types t ON p.pitch_type_id = t.id
           LEFT JOIN facilities f ON p.facility_id = f.id"#;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReviewRow {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub pitch_id: String,
    pub pitch_name: String,
    pub rating: i64,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CommentRow {
    pub id: String,
    pub review_id: String,
    pub parent_comment_id: Option<String>,
    pub username: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActivityRow {
    pub message: String,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_round_trip_through_their_labels() {
        for role in Role::ALL {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(BookingStatus::parse("Confirmed"), Some(BookingStatus::Confirmed));
        assert_eq!(BookingStatus::parse("confirmed"), None);
        assert!(BookingStatus::Pending.holds_slot());
        assert!(!BookingStatus::Cancelled.holds_slot());
    }

    #[test]
    fn voucher_row_ignores_blank_dates() {
        let row = VoucherRow {
            id: "v1".into(),
            code: "SUMMER".into(),
            description: None,
            discount_percent: 10,
            min_order_cents: None,
            usage_limit: None,
            used_count: 0,
            start_date: Some(String::new()),
            end_date: Some("2026-08-31".into()),
            is_active: 1,
        };
        let terms = row.terms();
        assert_eq!(terms.start_date, None);
        assert_eq!(terms.end_date, parse_date("2026-08-31").ok());
        assert!(terms.is_active);
    }
}
