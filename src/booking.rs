//! Booking rules: slot validation, pricing and voucher checks.
//!
//! Everything here is pure so the handlers can run it inside a transaction
//! and the tests can run it without a database. Money is carried as integer
//! cents, durations as whole minutes.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use thiserror::Error;

use crate::models::BookingStatus;

/// Shortest bookable slot, 1 hour 30 minutes.
pub const MIN_BOOKING_MINUTES: i64 = 90;

/// Largest amount a price or minimum order may hold, 99 999 999.99.
pub const MAX_MONEY_CENTS: i64 = 9_999_999_999;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookingError {
    #[error("Please pick a valid date.")]
    InvalidDate,
    #[error("Please pick a valid time.")]
    InvalidTime,
    #[error("Bookings cannot be made in the past.")]
    PastDate,
    #[error("The selected start time has already passed.")]
    StartPassed,
    #[error("End time must be after the start time.")]
    EndBeforeStart,
    #[error("The minimum booking length is 1 hour 30 minutes.")]
    TooShort,
    #[error("This pitch is not accepting bookings.")]
    PitchUnavailable,
    #[error("This pitch is already booked for part of the selected time.")]
    SlotTaken,
    #[error("Voucher {0} does not exist.")]
    VoucherNotFound(String),
    #[error("This voucher is no longer active.")]
    VoucherInactive,
    #[error("This voucher has reached its usage limit.")]
    VoucherExhausted,
    #[error("This voucher is not valid yet.")]
    VoucherNotStarted,
    #[error("This voucher has expired.")]
    VoucherExpired,
    #[error("This voucher requires a minimum order of {0}.")]
    MinimumOrderNotMet(String),
    #[error("A booking that is {from} cannot become {to}.")]
    InvalidTransition { from: String, to: String },
}

/// The date/time window a user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRequest {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl SlotRequest {
    pub fn parse(date: &str, start: &str, end: &str) -> Result<Self, BookingError> {
        Ok(Self {
            date: parse_date(date)?,
            start: parse_time(start)?,
            end: parse_time(end)?,
        })
    }

    pub fn duration_minutes(&self) -> i64 {
        duration_minutes(self.start, self.end)
    }

    pub fn start_key(&self) -> String {
        self.start.format(TIME_FORMAT).to_string()
    }

    pub fn end_key(&self) -> String {
        self.end.format(TIME_FORMAT).to_string()
    }

    pub fn date_key(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }
}

/// Checks a requested slot against the clock and the minimum length.
///
/// All failures are returned so a form can show every problem at once.
pub fn validate_slot(slot: &SlotRequest, now: NaiveDateTime) -> Vec<BookingError> {
    let mut errors = Vec::new();
    let today = now.date();

    if slot.date < today {
        errors.push(BookingError::PastDate);
    } else if slot.date == today && slot.start <= now.time() {
        errors.push(BookingError::StartPassed);
    }

    let minutes = slot.duration_minutes();
    if minutes <= 0 {
        errors.push(BookingError::EndBeforeStart);
    } else if minutes < MIN_BOOKING_MINUTES {
        errors.push(BookingError::TooShort);
    }

    errors
}

pub fn duration_minutes(start: NaiveTime, end: NaiveTime) -> i64 {
    (end - start).num_minutes()
}

/// Half-open interval overlap: a slot ending at 10:00 does not clash with
/// one starting at 10:00.
pub fn overlaps(a_start: NaiveTime, a_end: NaiveTime, b_start: NaiveTime, b_end: NaiveTime) -> bool {
    a_start < b_end && b_start < a_end
}

/// Voucher fields that matter for pricing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoucherTerms {
    pub discount_percent: i64,
    pub min_order_cents: Option<i64>,
    pub usage_limit: Option<i64>,
    pub used_count: i64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub is_active: bool,
}

impl VoucherTerms {
    /// Validity ignoring the order amount. A usage limit of zero means
    /// unlimited.
    pub fn check(&self, today: NaiveDate) -> Result<(), BookingError> {
        if !self.is_active {
            return Err(BookingError::VoucherInactive);
        }
        if let Some(limit) = self.usage_limit.filter(|limit| *limit > 0) {
            if self.used_count >= limit {
                return Err(BookingError::VoucherExhausted);
            }
        }
        if self.start_date.is_some_and(|start| today < start) {
            return Err(BookingError::VoucherNotStarted);
        }
        if self.end_date.is_some_and(|end| today > end) {
            return Err(BookingError::VoucherExpired);
        }
        Ok(())
    }

    pub fn is_valid(&self, today: NaiveDate) -> bool {
        self.check(today).is_ok()
    }

    /// Full check including the minimum order value.
    pub fn check_order(&self, base_cents: i64, today: NaiveDate) -> Result<(), BookingError> {
        self.check(today)?;
        match self.min_order_cents {
            Some(minimum) if base_cents < minimum => {
                Err(BookingError::MinimumOrderNotMet(format_money(minimum)))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub duration_minutes: i64,
    pub base_cents: i64,
    pub discount_cents: i64,
    pub final_cents: i64,
    pub voucher_applied: bool,
}

/// Hourly price times duration, rounded to the nearest cent.
pub fn base_price(price_per_hour_cents: i64, minutes: i64) -> i64 {
    let cents = (i128::from(price_per_hour_cents) * i128::from(minutes) + 30) / 60;
    i64::try_from(cents).unwrap_or(if cents < 0 { i64::MIN } else { i64::MAX })
}

/// Prices a slot. The voucher discount is applied only when the voucher is
/// valid today and the base price meets its minimum order; otherwise the
/// base price stands.
pub fn quote(
    price_per_hour_cents: i64,
    minutes: i64,
    voucher: Option<&VoucherTerms>,
    today: NaiveDate,
) -> Quote {
    let base_cents = base_price(price_per_hour_cents, minutes);
    let discount_cents = match voucher {
        Some(terms) if terms.check_order(base_cents, today).is_ok() => {
            let percent = i128::from(terms.discount_percent.clamp(0, 100));
            ((i128::from(base_cents) * percent + 50) / 100) as i64
        }
        _ => 0,
    };

    Quote {
        duration_minutes: minutes,
        base_cents,
        discount_cents,
        final_cents: base_cents - discount_cents,
        voucher_applied: voucher.is_some() && discount_cents > 0,
    }
}

/// Admin and user status changes share one rule set; terminal states are
/// never left.
pub fn check_transition(from: BookingStatus, to: BookingStatus) -> Result<(), BookingError> {
    let allowed = match from {
        BookingStatus::Pending => matches!(
            to,
            BookingStatus::Confirmed | BookingStatus::Rejected | BookingStatus::Cancelled
        ),
        BookingStatus::Confirmed => {
            matches!(to, BookingStatus::Rejected | BookingStatus::Cancelled)
        }
        BookingStatus::Rejected | BookingStatus::Cancelled => false,
    };

    if allowed {
        Ok(())
    } else {
        Err(BookingError::InvalidTransition {
            from: from.as_str().to_lowercase(),
            to: to.as_str().to_lowercase(),
        })
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, BookingError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| BookingError::InvalidDate)
}

pub fn parse_time(value: &str) -> Result<NaiveTime, BookingError> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| BookingError::InvalidTime)
}

/// Parses `"150"`, `"150.5"` or `"150.50"` into cents.
pub fn parse_money(value: &str) -> Option<i64> {
    let value = value.trim().replace(',', "");
    let (whole, fraction) = match value.split_once('.') {
        Some((whole, fraction)) => (whole.to_string(), fraction.to_string()),
        None => (value.clone(), String::new()),
    };
    if whole.is_empty() || fraction.len() > 2 {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }
    let whole: i64 = whole.parse().ok()?;
    let fraction: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().ok()? * 10,
        _ => fraction.parse().ok()?,
    };
    whole.checked_mul(100)?.checked_add(fraction)
}

/// [`parse_money`] limited to [`MAX_MONEY_CENTS`], for amounts admins store.
pub fn parse_price(value: &str) -> Option<i64> {
    parse_money(value).filter(|cents| *cents <= MAX_MONEY_CENTS)
}

pub fn format_money(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.abs();
    format!("{sign}{}.{:02}", cents / 100, cents % 100)
}

pub fn format_hours(minutes: i64) -> String {
    format!("{}.{:02}", minutes / 60, (minutes % 60) * 100 / 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(value: &str) -> NaiveDate {
        parse_date(value).unwrap()
    }

    fn time(value: &str) -> NaiveTime {
        parse_time(value).unwrap()
    }

    fn noon(value: &str) -> NaiveDateTime {
        date(value).and_time(time("12:00"))
    }

    fn voucher() -> VoucherTerms {
        VoucherTerms {
            discount_percent: 20,
            min_order_cents: None,
            usage_limit: Some(10),
            used_count: 0,
            start_date: Some(date("2026-01-01")),
            end_date: Some(date("2026-12-31")),
            is_active: true,
        }
    }

    #[test]
    fn booking_shorter_than_ninety_minutes_is_rejected() {
        let slot = SlotRequest::parse("2026-06-02", "18:00", "19:00").unwrap();
        assert_eq!(validate_slot(&slot, noon("2026-06-01")), vec![BookingError::TooShort]);
    }

    #[test]
    fn ninety_minutes_exactly_is_accepted() {
        let slot = SlotRequest::parse("2026-06-02", "18:00", "19:30").unwrap();
        assert!(validate_slot(&slot, noon("2026-06-01")).is_empty());
        assert_eq!(slot.duration_minutes(), 90);
    }

    #[test]
    fn end_before_start_is_rejected() {
        let slot = SlotRequest::parse("2026-06-02", "20:00", "18:00").unwrap();
        assert_eq!(validate_slot(&slot, noon("2026-06-01")), vec![BookingError::EndBeforeStart]);
    }

    #[test]
    fn past_dates_and_started_slots_are_rejected() {
        let yesterday = SlotRequest::parse("2026-05-31", "18:00", "20:00").unwrap();
        assert_eq!(validate_slot(&yesterday, noon("2026-06-01")), vec![BookingError::PastDate]);

        let this_morning = SlotRequest::parse("2026-06-01", "09:00", "11:00").unwrap();
        assert_eq!(
            validate_slot(&this_morning, noon("2026-06-01")),
            vec![BookingError::StartPassed]
        );

        let tonight = SlotRequest::parse("2026-06-01", "19:00", "21:00").unwrap();
        assert!(validate_slot(&tonight, noon("2026-06-01")).is_empty());
    }

    #[test]
    fn every_problem_is_reported() {
        let slot = SlotRequest::parse("2026-05-01", "18:00", "18:30").unwrap();
        let errors = validate_slot(&slot, noon("2026-06-01"));
        assert_eq!(errors, vec![BookingError::PastDate, BookingError::TooShort]);
    }

    #[test]
    fn overlap_is_half_open() {
        assert!(overlaps(time("18:00"), time("20:00"), time("19:00"), time("21:00")));
        assert!(overlaps(time("18:00"), time("22:00"), time("19:00"), time("20:00")));
        assert!(!overlaps(time("18:00"), time("20:00"), time("20:00"), time("21:30")));
        assert!(!overlaps(time("20:00"), time("21:30"), time("18:00"), time("20:00")));
    }

    #[test]
    fn voucher_window_and_limits() {
        let today = date("2026-06-01");
        assert!(voucher().is_valid(today));

        let expired = VoucherTerms { end_date: Some(date("2026-05-31")), ..voucher() };
        assert_eq!(expired.check(today), Err(BookingError::VoucherExpired));

        let early = VoucherTerms { start_date: Some(date("2026-06-02")), ..voucher() };
        assert_eq!(early.check(today), Err(BookingError::VoucherNotStarted));

        let inactive = VoucherTerms { is_active: false, ..voucher() };
        assert_eq!(inactive.check(today), Err(BookingError::VoucherInactive));

        let used_up = VoucherTerms { used_count: 10, ..voucher() };
        assert_eq!(used_up.check(today), Err(BookingError::VoucherExhausted));

        let unlimited = VoucherTerms { usage_limit: Some(0), used_count: 500, ..voucher() };
        assert!(unlimited.is_valid(today));

        let open = VoucherTerms { start_date: None, end_date: None, usage_limit: None, ..voucher() };
        assert!(open.is_valid(date("2030-01-01")));
    }

    #[test]
    fn voucher_boundaries_are_inclusive() {
        assert!(voucher().is_valid(date("2026-01-01")));
        assert!(voucher().is_valid(date("2026-12-31")));
    }

    #[test]
    fn quote_applies_valid_voucher() {
        let today = date("2026-06-01");
        let quote = quote(100_000, 120, Some(&voucher()), today);
        assert_eq!(quote.base_cents, 200_000);
        assert_eq!(quote.discount_cents, 40_000);
        assert_eq!(quote.final_cents, 160_000);
        assert!(quote.voucher_applied);
    }

    #[test]
    fn quote_ignores_invalid_voucher_and_unmet_minimum() {
        let today = date("2026-06-01");
        let expired = VoucherTerms { end_date: Some(date("2026-05-01")), ..voucher() };
        let priced = quote(100_000, 90, Some(&expired), today);
        assert_eq!(priced.final_cents, 150_000);
        assert!(!priced.voucher_applied);

        let picky = VoucherTerms { min_order_cents: Some(200_000), ..voucher() };
        assert_eq!(
            picky.check_order(150_000, today),
            Err(BookingError::MinimumOrderNotMet("2000.00".into()))
        );
        assert_eq!(quote(100_000, 90, Some(&picky), today).final_cents, 150_000);
        assert_eq!(quote(100_000, 120, Some(&picky), today).final_cents, 160_000);
    }

    #[test]
    fn base_price_rounds_to_cents() {
        assert_eq!(base_price(10_000, 90), 15_000);
        assert_eq!(base_price(999, 100), 1_665);
    }

    #[test]
    fn huge_prices_are_refused_and_never_overflow() {
        assert_eq!(parse_price("99999999.99"), Some(MAX_MONEY_CENTS));
        assert_eq!(parse_price("100000000"), None);
        assert_eq!(parse_price("1000000000000000"), None);

        let today = date("2026-06-01");
        let priced = quote(MAX_MONEY_CENTS, 24 * 60, Some(&voucher()), today);
        assert_eq!(priced.base_cents, MAX_MONEY_CENTS * 24);
        assert_eq!(priced.final_cents, priced.base_cents - priced.discount_cents);

        assert_eq!(base_price(i64::MAX, 120), i64::MAX);
        let saturated = quote(i64::MAX, 120, Some(&voucher()), today);
        assert_eq!(saturated.final_cents, i64::MAX - saturated.discount_cents);
    }

    #[test]
    fn status_transitions() {
        use BookingStatus::*;
        assert!(check_transition(Pending, Confirmed).is_ok());
        assert!(check_transition(Pending, Cancelled).is_ok());
        assert!(check_transition(Confirmed, Cancelled).is_ok());
        assert!(check_transition(Confirmed, Pending).is_err());
        assert!(check_transition(Cancelled, Confirmed).is_err());
        assert!(check_transition(Rejected, Pending).is_err());
    }

    #[test]
    fn money_parsing_and_formatting() {
        assert_eq!(parse_money("150"), Some(15_000));
        assert_eq!(parse_money("150.5"), Some(15_050));
        assert_eq!(parse_money(" 1,500.25 "), Some(150_025));
        assert_eq!(parse_money("-3"), None);
        assert_eq!(parse_money("1.234"), None);
        assert_eq!(parse_money("abc"), None);
        assert_eq!(format_money(150_025), "1500.25");
        assert_eq!(format_money(5), "0.05");
        assert_eq!(format_hours(90), "1.50");
        assert_eq!(format_hours(135), "2.25");
    }

    #[test]
    fn times_accept_seconds() {
        assert_eq!(parse_time("18:30:00"), Ok(time("18:30")));
        assert_eq!(parse_time("25:00"), Err(BookingError::InvalidTime));
        assert_eq!(parse_date("2026-02-30"), Err(BookingError::InvalidDate));
    }
}
