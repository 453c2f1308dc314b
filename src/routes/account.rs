use actix_web::{http::header, http::StatusCode, middleware::from_fn, web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use askama::Template;
use chrono::Local;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{basic_validator, logout_guard, new_id, AuthUser},
    booking::{
        check_transition, format_hours, format_money, quote, validate_slot, BookingError,
        SlotRequest, MIN_BOOKING_MINUTES,
    },
    db::{log_activity, now_rfc3339, publish_booking, transition_booking},
    models::{BookingRow, BookingStatus, PitchRow, VoucherRow, BOOKING_SELECT, PITCH_SELECT},
    routes::{
        public::{fetch_pitch, not_found, MessageTemplate, PitchCard},
        BookingView, StatCard,
    },
    state::AppState,
    templates::{render, render_with_status},
};

#[derive(Template)]
#[template(path = "account_dashboard.html")]
struct AccountDashboardTemplate {
    display_name: String,
    stats: Vec<StatCard>,
    upcoming: Vec<BookingView>,
    is_admin: bool,
}

#[derive(Template)]
#[template(path = "account_bookings.html")]
struct AccountBookingsTemplate {
    bookings: Vec<BookingView>,
    is_admin: bool,
}

#[derive(Clone, Debug, Default)]
struct BookingFormView {
    booking_date: String,
    start_time: String,
    end_time: String,
    voucher_code: String,
    note: String,
}

#[derive(Template)]
#[template(path = "book.html")]
struct BookTemplate {
    pitch: PitchCard,
    form: BookingFormView,
    errors: Vec<String>,
    min_hours: String,
    is_admin: bool,
}

#[derive(Template)]
#[template(path = "book_success.html")]
struct BookSuccessTemplate {
    booking: BookingView,
    base_price: String,
    discount: String,
    has_discount: bool,
    is_admin: bool,
}

#[derive(Template)]
#[template(path = "favorites.html")]
struct FavoritesTemplate {
    pitches: Vec<PitchCard>,
    is_admin: bool,
}

#[derive(Deserialize)]
struct BookingForm {
    booking_date: String,
    start_time: String,
    end_time: String,
    voucher_code: Option<String>,
    note: Option<String>,
}

#[derive(Deserialize)]
struct ReviewForm {
    rating: String,
    content: String,
}

#[derive(Deserialize)]
struct CommentForm {
    content: String,
    parent_comment_id: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/account")
            .wrap(HttpAuthentication::basic(basic_validator))
            .wrap(from_fn(logout_guard))
            .service(web::resource("").route(web::get().to(index)))
            .service(web::resource("/").route(web::get().to(index)))
            .service(web::resource("/dashboard").route(web::get().to(dashboard)))
            .service(web::resource("/bookings").route(web::get().to(list_bookings)))
            .service(web::resource("/bookings/{id}/cancel").route(web::post().to(cancel_booking)))
            .service(
                web::resource("/book/{pitch_id}")
                    .route(web::get().to(show_booking_form))
                    .route(web::post().to(create_booking)),
            )
            .service(web::resource("/favorites").route(web::get().to(list_favorites)))
            .service(web::resource("/favorites/{pitch_id}").route(web::post().to(toggle_favorite)))
            .service(web::resource("/pitches/{pitch_id}/review").route(web::post().to(save_review)))
            .service(web::resource("/reviews/{review_id}/comments").route(web::post().to(add_comment))),
    );
}

async fn index() -> HttpResponse {
    HttpResponse::Found()
        .append_header((header::LOCATION, "/account/dashboard"))
        .finish()
}

async fn dashboard(state: web::Data<AppState>, auth: web::ReqData<AuthUser>) -> Result<HttpResponse> {
    let mut stats = Vec::new();
    for status in BookingStatus::ALL {
        let value = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM bookings WHERE user_id = ? AND status = ?",
        )
        .bind(&auth.id)
        .bind(status.as_str())
        .fetch_one(&state.db)
        .await
        .unwrap_or(0);
        stats.push(StatCard {
            label: status.as_str().to_string(),
            value,
        });
    }
    let favorites = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM favorites WHERE user_id = ?")
        .bind(&auth.id)
        .fetch_one(&state.db)
        .await
        .unwrap_or(0);
    stats.push(StatCard {
        label: "Favorites".to_string(),
        value: favorites,
    });

    let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
    let sql = format!(
        "{BOOKING_SELECT} WHERE b.user_id = ? AND b.booking_date >= ? \
         AND b.status IN ('Pending', 'Confirmed') ORDER BY b.booking_date, b.start_time LIMIT 6"
    );
    let upcoming = sqlx::query_as::<_, BookingRow>(&sql)
        .bind(&auth.id)
        .bind(today)
        .fetch_all(&state.db)
        .await
        .unwrap_or_default()
        .into_iter()
        .map(BookingView::from)
        .collect();

    Ok(render(AccountDashboardTemplate {
        display_name: auth.display_name.clone(),
        stats,
        upcoming,
        is_admin: false,
    }))
}

async fn list_bookings(state: web::Data<AppState>, auth: web::ReqData<AuthUser>) -> Result<HttpResponse> {
    let sql = format!("{BOOKING_SELECT} WHERE b.user_id = ? ORDER BY b.created_at DESC");
    let bookings = sqlx::query_as::<_, BookingRow>(&sql)
        .bind(&auth.id)
        .fetch_all(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?
        .into_iter()
        .map(BookingView::from)
        .collect();

    Ok(render(AccountBookingsTemplate {
        bookings,
        is_admin: false,
    }))
}

fn forbidden_to_book() -> HttpResponse {
    render_with_status(
        StatusCode::FORBIDDEN,
        MessageTemplate::new(
            "Booking not allowed",
            "Only member accounts can book pitches.",
        ),
    )
}

fn booking_form(
    status: StatusCode,
    pitch: PitchRow,
    form: BookingFormView,
    errors: Vec<String>,
) -> HttpResponse {
    render_with_status(
        status,
        BookTemplate {
            pitch: PitchCard::from(pitch),
            form,
            errors,
            min_hours: format_hours(MIN_BOOKING_MINUTES),
            is_admin: false,
        },
    )
}

async fn show_booking_form(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    if !auth.can_book() {
        return Ok(forbidden_to_book());
    }
    let Some(pitch) = fetch_pitch(&state, &path.into_inner()).await else {
        return Ok(not_found("Pitch not found"));
    };
    Ok(booking_form(StatusCode::OK, pitch, BookingFormView::default(), Vec::new()))
}

/// Result of a committed booking, kept for the confirmation page.
struct Placed {
    booking_id: String,
    base_cents: i64,
    discount_cents: i64,
}

async fn create_booking(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Form<BookingForm>,
) -> Result<HttpResponse> {
    if !auth.can_book() {
        return Ok(forbidden_to_book());
    }
    let Some(pitch) = fetch_pitch(&state, &path.into_inner()).await else {
        return Ok(not_found("Pitch not found"));
    };

    let form = form.into_inner();
    let view = BookingFormView {
        booking_date: form.booking_date.clone(),
        start_time: form.start_time.clone(),
        end_time: form.end_time.clone(),
        voucher_code: form.voucher_code.clone().unwrap_or_default(),
        note: form.note.clone().unwrap_or_default(),
    };

    let now = Local::now().naive_local();
    let slot = match SlotRequest::parse(&form.booking_date, &form.start_time, &form.end_time) {
        Ok(slot) => slot,
        Err(err) => {
            return Ok(booking_form(StatusCode::BAD_REQUEST, pitch, view, vec![err.to_string()]));
        }
    };

    let mut errors: Vec<String> = validate_slot(&slot, now)
        .into_iter()
        .map(|err| err.to_string())
        .collect();
    if pitch.is_available != 1 {
        errors.push(BookingError::PitchUnavailable.to_string());
    }
    if !errors.is_empty() {
        return Ok(booking_form(StatusCode::BAD_REQUEST, pitch, view, errors));
    }

    let placed = match place_booking(&state, &auth, &pitch, &slot, &form, now.date()).await {
        Ok(placed) => placed,
        Err(PlaceError::Rule(err)) => {
            return Ok(booking_form(StatusCode::CONFLICT, pitch, view, vec![err.to_string()]));
        }
        Err(PlaceError::Db(err)) => return Err(actix_web::error::ErrorInternalServerError(err)),
    };

    log::info!(
        "{} booked {} on {} {}-{}",
        auth.username,
        pitch.name,
        slot.date_key(),
        slot.start_key(),
        slot.end_key()
    );
    log_activity(
        &state.db,
        "booking_created",
        &format!("{} booked {} on {}.", auth.display_name, pitch.name, slot.date_key()),
        Some(&auth.id),
        Some(&placed.booking_id),
    )
    .await;
    publish_booking(&state, "booking_created", &placed.booking_id).await;

    let Some(row) = crate::db::fetch_booking(&state.db, &placed.booking_id).await else {
        return Ok(not_found("Booking not found"));
    };

    Ok(render(BookSuccessTemplate {
        booking: BookingView::from(row),
        base_price: format_money(placed.base_cents),
        discount: format_money(placed.discount_cents),
        has_discount: placed.discount_cents > 0,
        is_admin: false,
    }))
}

enum PlaceError {
    Rule(BookingError),
    Db(sqlx::Error),
}

impl From<sqlx::Error> for PlaceError {
    fn from(err: sqlx::Error) -> Self {
        PlaceError::Db(err)
    }
}

impl From<BookingError> for PlaceError {
    fn from(err: BookingError) -> Self {
        PlaceError::Rule(err)
    }
}

/// Prices and stores a validated slot in one transaction. The insert only
/// happens when no Pending/Confirmed booking overlaps, and the voucher
/// counter only moves when its limit still has room; either failing rolls
/// the whole booking back.
async fn place_booking(
    state: &AppState,
    auth: &AuthUser,
    pitch: &PitchRow,
    slot: &SlotRequest,
    form: &BookingForm,
    today: chrono::NaiveDate,
) -> Result<Placed, PlaceError> {
    let mut tx = state.db.begin().await?;

    let code = form
        .voucher_code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty());
    let voucher = match code {
        Some(code) => {
            let row = sqlx::query_as::<_, VoucherRow>(
                r#"SELECT id, code, description, discount_percent, min_order_cents, usage_limit,
                          used_count, start_date, end_date, is_active
                   FROM vouchers WHERE UPPER(code) = UPPER(?) LIMIT 1"#,
            )
            .bind(code)
            .fetch_optional(&mut *tx)
            .await?;
            Some(row.ok_or_else(|| BookingError::VoucherNotFound(code.to_string()))?)
        }
        None => None,
    };

    let minutes = slot.duration_minutes();
    let terms = voucher.as_ref().map(VoucherRow::terms);
    let priced = quote(pitch.price_per_hour_cents, minutes, terms.as_ref(), today);
    if let Some(terms) = &terms {
        terms.check_order(priced.base_cents, today)?;
    }

    let booking_id = new_id();
    let now = now_rfc3339();
    let note = form
        .note
        .as_deref()
        .map(str::trim)
        .filter(|note| !note.is_empty());

    let inserted = sqlx::query(
        r#"INSERT INTO bookings
           (id, user_id, pitch_id, booking_date, start_time, end_time, duration_minutes,
            final_price_cents, voucher_id, note, status, created_at, updated_at)
           SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
           WHERE NOT EXISTS (
               SELECT 1 FROM bookings
               WHERE pitch_id = ? AND booking_date = ?
                 AND status IN ('Pending', 'Confirmed')
                 AND start_time < ? AND ? < end_time
           )"#,
    )
    .bind(&booking_id)
    .bind(&auth.id)
    .bind(&pitch.id)
    .bind(slot.date_key())
    .bind(slot.start_key())
    .bind(slot.end_key())
    .bind(minutes)
    .bind(priced.final_cents)
    .bind(voucher.as_ref().map(|voucher| voucher.id.clone()))
    .bind(note)
    .bind(BookingStatus::Pending.as_str())
    .bind(&now)
    .bind(&now)
    .bind(&pitch.id)
    .bind(slot.date_key())
    .bind(slot.end_key())
    .bind(slot.start_key())
    .execute(&mut *tx)
    .await?;

    if inserted.rows_affected() == 0 {
        return Err(BookingError::SlotTaken.into());
    }

    if let Some(voucher) = voucher.as_ref().filter(|_| priced.voucher_applied) {
        let claimed = sqlx::query(
            r#"UPDATE vouchers SET used_count = used_count + 1
               WHERE id = ? AND (usage_limit IS NULL OR usage_limit = 0 OR used_count < usage_limit)"#,
        )
        .bind(&voucher.id)
        .execute(&mut *tx)
        .await?;
        if claimed.rows_affected() == 0 {
            return Err(BookingError::VoucherExhausted.into());
        }
    }

    tx.commit().await?;

    Ok(Placed {
        booking_id,
        base_cents: priced.base_cents,
        discount_cents: priced.discount_cents,
    })
}

async fn cancel_booking(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let booking_id = path.into_inner();
    let current = sqlx::query_scalar::<_, String>(
        "SELECT status FROM bookings WHERE id = ? AND user_id = ?",
    )
    .bind(&booking_id)
    .bind(&auth.id)
    .fetch_optional(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    let Some(status) = current.as_deref().and_then(BookingStatus::parse) else {
        return Ok(not_found("Booking not found"));
    };
    if let Err(err) = check_transition(status, BookingStatus::Cancelled) {
        return Ok(render_with_status(
            StatusCode::CONFLICT,
            MessageTemplate::new("Cannot cancel", &err.to_string())
                .with_link("/account/bookings", "Back to my bookings"),
        ));
    }

    let moved = transition_booking(&state.db, &booking_id, status, BookingStatus::Cancelled)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
    if !moved {
        return Ok(render_with_status(
            StatusCode::CONFLICT,
            MessageTemplate::new("Cannot cancel", "This booking changed in the meantime. Please try again.")
                .with_link("/account/bookings", "Back to my bookings"),
        ));
    }

    log_activity(
        &state.db,
        "booking_cancelled",
        &format!("{} cancelled booking {}.", auth.display_name, booking_id),
        Some(&auth.id),
        Some(&booking_id),
    )
    .await;
    publish_booking(&state, "booking_updated", &booking_id).await;

    Ok(HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/account/bookings"))
        .finish())
}

async fn list_favorites(state: web::Data<AppState>, auth: web::ReqData<AuthUser>) -> Result<HttpResponse> {
    let sql = format!(
        "{PITCH_SELECT} JOIN favorites fav ON fav.pitch_id = p.id \
         WHERE fav.user_id = ? ORDER BY fav.created_at DESC"
    );
    let pitches = sqlx::query_as::<_, PitchRow>(&sql)
        .bind(&auth.id)
        .fetch_all(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?
        .into_iter()
        .map(PitchCard::from)
        .collect();

    Ok(render(FavoritesTemplate {
        pitches,
        is_admin: false,
    }))
}

async fn toggle_favorite(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let pitch_id = path.into_inner();
    if fetch_pitch(&state, &pitch_id).await.is_none() {
        return Ok(HttpResponse::NotFound().json(json!({ "error": "pitch not found" })));
    }

    let removed = sqlx::query("DELETE FROM favorites WHERE user_id = ? AND pitch_id = ?")
        .bind(&auth.id)
        .bind(&pitch_id)
        .execute(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    let favorited = if removed.rows_affected() > 0 {
        false
    } else {
        sqlx::query(
            r#"INSERT INTO favorites (id, user_id, pitch_id, created_at) VALUES (?, ?, ?, ?)
               ON CONFLICT(user_id, pitch_id) DO NOTHING"#,
        )
        .bind(new_id())
        .bind(&auth.id)
        .bind(&pitch_id)
        .bind(now_rfc3339())
        .execute(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
        true
    };

    Ok(HttpResponse::Ok().json(json!({ "pitch_id": pitch_id, "favorited": favorited })))
}

fn parse_rating(value: &str) -> Option<i64> {
    value.trim().parse::<i64>().ok().filter(|rating| (1..=5).contains(rating))
}

async fn save_review(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Form<ReviewForm>,
) -> Result<HttpResponse> {
    let pitch_id = path.into_inner();
    if !auth.can_book() {
        return Ok(render_with_status(
            StatusCode::FORBIDDEN,
            MessageTemplate::new("Review not allowed", "Only member accounts can review pitches."),
        ));
    }
    if fetch_pitch(&state, &pitch_id).await.is_none() {
        return Ok(not_found("Pitch not found"));
    }

    let back = format!("/pitches/{pitch_id}");
    let Some(rating) = parse_rating(&form.rating) else {
        return Ok(render_with_status(
            StatusCode::BAD_REQUEST,
            MessageTemplate::new("Invalid review", "Rating must be between 1 and 5.")
                .with_link(&back, "Back to pitch"),
        ));
    };
    let content = form.content.trim();
    if content.is_empty() {
        return Ok(render_with_status(
            StatusCode::BAD_REQUEST,
            MessageTemplate::new("Invalid review", "Please write a few words about the pitch.")
                .with_link(&back, "Back to pitch"),
        ));
    }

    let now = now_rfc3339();
    sqlx::query(
        r#"INSERT INTO reviews (id, user_id, pitch_id, rating, content, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)
           ON CONFLICT(user_id, pitch_id) DO UPDATE SET
             rating = excluded.rating,
             content = excluded.content,
             updated_at = excluded.updated_at"#,
    )
    .bind(new_id())
    .bind(&auth.id)
    .bind(&pitch_id)
    .bind(rating)
    .bind(content)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    Ok(HttpResponse::SeeOther()
        .append_header((header::LOCATION, back))
        .finish())
}

async fn add_comment(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Form<CommentForm>,
) -> Result<HttpResponse> {
    let review_id = path.into_inner();
    let pitch_id = sqlx::query_scalar::<_, String>("SELECT pitch_id FROM reviews WHERE id = ?")
        .bind(&review_id)
        .fetch_optional(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
    let Some(pitch_id) = pitch_id else {
        return Ok(not_found("Review not found"));
    };
    let back = format!("/pitches/{pitch_id}");

    let content = form.content.trim();
    if content.is_empty() {
        return Ok(render_with_status(
            StatusCode::BAD_REQUEST,
            MessageTemplate::new("Empty comment", "Comments cannot be empty.")
                .with_link(&back, "Back to pitch"),
        ));
    }

    let parent = form
        .parent_comment_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());
    if let Some(parent) = parent {
        let same_review = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM comments WHERE id = ? AND review_id = ?",
        )
        .bind(parent)
        .bind(&review_id)
        .fetch_one(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
        if same_review == 0 {
            return Ok(render_with_status(
                StatusCode::BAD_REQUEST,
                MessageTemplate::new("Invalid reply", "That comment does not belong to this review.")
                    .with_link(&back, "Back to pitch"),
            ));
        }
    }

    let now = now_rfc3339();
    sqlx::query(
        r#"INSERT INTO comments (id, user_id, review_id, parent_comment_id, content, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(&auth.id)
    .bind(&review_id)
    .bind(parent)
    .bind(content)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    Ok(HttpResponse::SeeOther()
        .append_header((header::LOCATION, format!("{back}#review-{review_id}")))
        .finish())
}
