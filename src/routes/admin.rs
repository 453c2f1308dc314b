use actix_web::{http::header, http::StatusCode, middleware::from_fn, web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use askama::Template;
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite};

use crate::{
    auth::{admin_validator, logout_guard, new_id, AuthUser},
    booking::{check_transition, format_money, parse_date, parse_price},
    db::{log_activity, now_rfc3339, publish_booking, transition_booking},
    models::{
        ActivityRow, BookingRow, BookingStatus, FacilityRow, PitchRow, PitchTypeRow, ReviewRow,
        Role, UserRow, VoucherRow, BOOKING_SELECT, PITCH_SELECT,
    },
    routes::{
        events,
        public::{
            facility_options, fetch_facilities, fetch_pitch, not_found, pitch_type_options,
            OptionView, PitchCard,
        },
        BookingView, StatCard,
    },
    state::AppState,
    templates::{render, render_with_status},
};

#[derive(Clone, Debug)]
struct ActivityView {
    message: String,
    created_at: String,
}

#[derive(Template)]
#[template(path = "admin_dashboard.html")]
struct AdminDashboardTemplate {
    admin_name: String,
    stats: Vec<StatCard>,
    recent: Vec<BookingView>,
    activities: Vec<ActivityView>,
    is_admin: bool,
}

#[derive(Clone, Debug, Default)]
struct FacilityFormView {
    name: String,
    address: String,
    description: String,
}

#[derive(Template)]
#[template(path = "admin_facilities.html")]
struct AdminFacilitiesTemplate {
    facilities: Vec<FacilityRow>,
    form: FacilityFormView,
    action: String,
    editing: bool,
    errors: Vec<String>,
    is_admin: bool,
}

#[derive(Template)]
#[template(path = "admin_pitch_types.html")]
struct AdminPitchTypesTemplate {
    pitch_types: Vec<PitchTypeView>,
    errors: Vec<String>,
    is_admin: bool,
}

#[derive(Clone, Debug)]
struct PitchTypeView {
    id: String,
    name: String,
    description: String,
}

#[derive(Clone, Debug, Default)]
struct PitchFormView {
    name: String,
    address: String,
    description: String,
    price: String,
    is_available: bool,
}

#[derive(Template)]
#[template(path = "admin_pitches.html")]
struct AdminPitchesTemplate {
    pitches: Vec<PitchCard>,
    form: PitchFormView,
    facilities: Vec<OptionView>,
    pitch_types: Vec<OptionView>,
    action: String,
    editing: bool,
    errors: Vec<String>,
    is_admin: bool,
}

#[derive(Clone, Debug)]
struct VoucherView {
    id: String,
    code: String,
    discount_percent: i64,
    min_order: String,
    usage: String,
    window: String,
    is_active: bool,
    valid_today: bool,
}

#[derive(Clone, Debug, Default)]
struct VoucherFormView {
    code: String,
    description: String,
    discount_percent: String,
    min_order: String,
    usage_limit: String,
    start_date: String,
    end_date: String,
    is_active: bool,
    used_count: i64,
}

#[derive(Template)]
#[template(path = "admin_vouchers.html")]
struct AdminVouchersTemplate {
    vouchers: Vec<VoucherView>,
    form: VoucherFormView,
    action: String,
    editing: bool,
    errors: Vec<String>,
    is_admin: bool,
}

#[derive(Template)]
#[template(path = "admin_bookings.html")]
struct AdminBookingsTemplate {
    bookings: Vec<BookingView>,
    statuses: Vec<OptionView>,
    date: String,
    q: String,
    is_admin: bool,
}

#[derive(Template)]
#[template(path = "admin_booking_detail.html")]
struct AdminBookingDetailTemplate {
    booking: BookingView,
    statuses: Vec<OptionView>,
    errors: Vec<String>,
    is_admin: bool,
}

#[derive(Clone, Debug)]
struct UserView {
    id: String,
    username: String,
    email: String,
    full_name: String,
    is_active: bool,
    created_at: String,
    roles: Vec<OptionView>,
}

#[derive(Template)]
#[template(path = "admin_users.html")]
struct AdminUsersTemplate {
    users: Vec<UserView>,
    roles: Vec<OptionView>,
    q: String,
    errors: Vec<String>,
    is_admin: bool,
}

#[derive(Clone, Debug)]
struct ReviewView {
    id: String,
    username: String,
    pitch_id: String,
    pitch_name: String,
    rating: i64,
    content: String,
    created_at: String,
}

#[derive(Template)]
#[template(path = "admin_reviews.html")]
struct AdminReviewsTemplate {
    reviews: Vec<ReviewView>,
    is_admin: bool,
}

#[derive(Deserialize)]
struct FacilityForm {
    name: String,
    address: String,
    description: Option<String>,
}

#[derive(Deserialize)]
struct PitchTypeForm {
    name: String,
    description: Option<String>,
}

#[derive(Deserialize)]
struct PitchForm {
    name: String,
    address: String,
    description: Option<String>,
    facility_id: Option<String>,
    pitch_type_id: String,
    price: String,
    is_available: Option<String>,
}

#[derive(Deserialize)]
struct VoucherForm {
    code: String,
    description: Option<String>,
    discount_percent: String,
    min_order: Option<String>,
    usage_limit: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    is_active: Option<String>,
}

#[derive(Deserialize)]
struct BookingFilter {
    status: Option<String>,
    date: Option<String>,
    q: Option<String>,
}

#[derive(Deserialize)]
struct BookingStatusForm {
    status: String,
}

#[derive(Deserialize)]
struct UserFilter {
    role: Option<String>,
    q: Option<String>,
}

#[derive(Deserialize)]
struct UserUpdateForm {
    role: String,
    is_active: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .wrap(HttpAuthentication::basic(admin_validator))
            .wrap(from_fn(logout_guard))
            .service(web::resource("").route(web::get().to(index)))
            .service(web::resource("/").route(web::get().to(index)))
            .service(web::resource("/dashboard").route(web::get().to(dashboard)))
            .service(web::resource("/events").route(web::get().to(events::stream_bookings)))
            .service(
                web::resource("/facilities")
                    .route(web::get().to(list_facilities))
                    .route(web::post().to(create_facility)),
            )
            .service(
                web::resource("/facilities/{id}")
                    .route(web::get().to(edit_facility))
                    .route(web::post().to(update_facility)),
            )
            .service(web::resource("/facilities/{id}/delete").route(web::post().to(delete_facility)))
            .service(
                web::resource("/pitch-types")
                    .route(web::get().to(list_pitch_types))
                    .route(web::post().to(create_pitch_type)),
            )
            .service(web::resource("/pitch-types/{id}/delete").route(web::post().to(delete_pitch_type)))
            .service(
                web::resource("/pitches")
                    .route(web::get().to(list_pitches))
                    .route(web::post().to(create_pitch)),
            )
            .service(
                web::resource("/pitches/{id}")
                    .route(web::get().to(edit_pitch))
                    .route(web::post().to(update_pitch)),
            )
            .service(web::resource("/pitches/{id}/delete").route(web::post().to(delete_pitch)))
            .service(
                web::resource("/vouchers")
                    .route(web::get().to(list_vouchers))
                    .route(web::post().to(create_voucher)),
            )
            .service(
                web::resource("/vouchers/{id}")
                    .route(web::get().to(edit_voucher))
                    .route(web::post().to(update_voucher)),
            )
            .service(web::resource("/vouchers/{id}/delete").route(web::post().to(delete_voucher)))
            .service(web::resource("/bookings").route(web::get().to(list_bookings)))
            .service(
                web::resource("/bookings/{id}")
                    .route(web::get().to(booking_detail))
                    .route(web::post().to(update_booking)),
            )
            .service(web::resource("/users").route(web::get().to(list_users)))
            .service(web::resource("/users/{id}").route(web::post().to(update_user)))
            .service(web::resource("/reviews").route(web::get().to(list_reviews)))
            .service(web::resource("/reviews/{id}/delete").route(web::post().to(delete_review))),
    );
}

async fn index() -> HttpResponse {
    redirect("/admin/dashboard")
}

fn redirect(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .append_header((header::LOCATION, location.to_string()))
        .finish()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

async fn count(state: &AppState, query: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(query)
        .fetch_one(&state.db)
        .await
        .unwrap_or(0)
}

async fn dashboard(state: web::Data<AppState>, auth: web::ReqData<AuthUser>) -> Result<HttpResponse> {
    let stats = vec![
        StatCard {
            label: "Facilities".to_string(),
            value: count(&state, "SELECT COUNT(*) FROM facilities").await,
        },
        StatCard {
            label: "Pitches".to_string(),
            value: count(&state, "SELECT COUNT(*) FROM pitches").await,
        },
        StatCard {
            label: "Pending bookings".to_string(),
            value: count(&state, "SELECT COUNT(*) FROM bookings WHERE status = 'Pending'").await,
        },
        StatCard {
            label: "Confirmed bookings".to_string(),
            value: count(&state, "SELECT COUNT(*) FROM bookings WHERE status = 'Confirmed'").await,
        },
        StatCard {
            label: "Members".to_string(),
            value: count(&state, "SELECT COUNT(*) FROM users WHERE role = 'User'").await,
        },
    ];

    let sql = format!("{BOOKING_SELECT} ORDER BY b.created_at DESC LIMIT 8");
    let recent = sqlx::query_as::<_, BookingRow>(&sql)
        .fetch_all(&state.db)
        .await
        .unwrap_or_default()
        .into_iter()
        .map(BookingView::from)
        .collect();

    let activities = sqlx::query_as::<_, ActivityRow>(
        "SELECT message, created_at FROM activities ORDER BY created_at DESC LIMIT 10",
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default()
    .into_iter()
    .map(|row| ActivityView {
        message: row.message,
        created_at: row.created_at,
    })
    .collect();

    Ok(render(AdminDashboardTemplate {
        admin_name: auth.display_name.clone(),
        stats,
        recent,
        activities,
        is_admin: true,
    }))
}

// Facilities

fn validate_facility(form: &FacilityForm) -> Vec<String> {
    let mut errors = Vec::new();
    if form.name.trim().is_empty() {
        errors.push("Facility name is required.".to_string());
    }
    if form.address.trim().is_empty() {
        errors.push("Facility address is required.".to_string());
    }
    errors
}

async fn facilities_page(
    state: &AppState,
    form: FacilityFormView,
    action: String,
    editing: bool,
    errors: Vec<String>,
) -> HttpResponse {
    let status = if errors.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    render_with_status(
        status,
        AdminFacilitiesTemplate {
            facilities: fetch_facilities(state).await,
            form,
            action,
            editing,
            errors,
            is_admin: true,
        },
    )
}

fn facility_view(form: &FacilityForm) -> FacilityFormView {
    FacilityFormView {
        name: form.name.clone(),
        address: form.address.clone(),
        description: form.description.clone().unwrap_or_default(),
    }
}

async fn list_facilities(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(facilities_page(
        &state,
        FacilityFormView::default(),
        "/admin/facilities".to_string(),
        false,
        Vec::new(),
    )
    .await)
}

async fn create_facility(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Form<FacilityForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let errors = validate_facility(&form);
    if !errors.is_empty() {
        return Ok(facilities_page(
            &state,
            facility_view(&form),
            "/admin/facilities".to_string(),
            false,
            errors,
        )
        .await);
    }

    let now = now_rfc3339();
    sqlx::query(
        r#"INSERT INTO facilities (id, name, address, description, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(form.name.trim())
    .bind(form.address.trim())
    .bind(non_empty(form.description.as_deref()))
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    log_activity(
        &state.db,
        "facility_created",
        &format!("{} added facility {}.", auth.display_name, form.name.trim()),
        Some(&auth.id),
        None,
    )
    .await;

    Ok(redirect("/admin/facilities"))
}

async fn edit_facility(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let facility_id = path.into_inner();
    let row = sqlx::query_as::<_, (String, String, Option<String>)>(
        "SELECT name, address, description FROM facilities WHERE id = ?",
    )
    .bind(&facility_id)
    .fetch_optional(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    let Some((name, address, description)) = row else {
        return Ok(not_found("Facility not found"));
    };

    Ok(facilities_page(
        &state,
        FacilityFormView {
            name,
            address,
            description: description.unwrap_or_default(),
        },
        format!("/admin/facilities/{facility_id}"),
        true,
        Vec::new(),
    )
    .await)
}

async fn update_facility(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Form<FacilityForm>,
) -> Result<HttpResponse> {
    let facility_id = path.into_inner();
    let form = form.into_inner();
    let errors = validate_facility(&form);
    if !errors.is_empty() {
        return Ok(facilities_page(
            &state,
            facility_view(&form),
            format!("/admin/facilities/{facility_id}"),
            true,
            errors,
        )
        .await);
    }

    let result = sqlx::query(
        "UPDATE facilities SET name = ?, address = ?, description = ?, updated_at = ? WHERE id = ?",
    )
    .bind(form.name.trim())
    .bind(form.address.trim())
    .bind(non_empty(form.description.as_deref()))
    .bind(now_rfc3339())
    .bind(&facility_id)
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;
    if result.rows_affected() == 0 {
        return Ok(not_found("Facility not found"));
    }

    log_activity(
        &state.db,
        "facility_updated",
        &format!("{} updated facility {}.", auth.display_name, form.name.trim()),
        Some(&auth.id),
        None,
    )
    .await;

    Ok(redirect("/admin/facilities"))
}

/// Deleting a facility removes its pitches and their bookings with it.
async fn delete_facility(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let facility_id = path.into_inner();
    sqlx::query("DELETE FROM facilities WHERE id = ?")
        .bind(&facility_id)
        .execute(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    log_activity(
        &state.db,
        "facility_deleted",
        &format!("{} deleted facility {}.", auth.display_name, facility_id),
        Some(&auth.id),
        None,
    )
    .await;

    Ok(redirect("/admin/facilities"))
}

// Pitch types

async fn pitch_types_page(state: &AppState, errors: Vec<String>) -> HttpResponse {
    let pitch_types = sqlx::query_as::<_, PitchTypeRow>(
        "SELECT id, name, description FROM pitch_types ORDER BY name",
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default()
    .into_iter()
    .map(|row| PitchTypeView {
        id: row.id,
        name: row.name,
        description: row.description.unwrap_or_default(),
    })
    .collect();

    let status = if errors.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    render_with_status(
        status,
        AdminPitchTypesTemplate {
            pitch_types,
            errors,
            is_admin: true,
        },
    )
}

async fn list_pitch_types(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(pitch_types_page(&state, Vec::new()).await)
}

async fn create_pitch_type(
    state: web::Data<AppState>,
    form: web::Form<PitchTypeForm>,
) -> Result<HttpResponse> {
    let name = form.name.trim();
    if name.is_empty() {
        return Ok(pitch_types_page(&state, vec!["Pitch type name is required.".to_string()]).await);
    }

    let inserted = sqlx::query(
        r#"INSERT INTO pitch_types (id, name, description) VALUES (?, ?, ?)
           ON CONFLICT(name) DO NOTHING"#,
    )
    .bind(new_id())
    .bind(name)
    .bind(non_empty(form.description.as_deref()))
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    if inserted.rows_affected() == 0 {
        return Ok(pitch_types_page(&state, vec![format!("Pitch type {name} already exists.")]).await);
    }

    Ok(redirect("/admin/pitch-types"))
}

async fn delete_pitch_type(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    sqlx::query("DELETE FROM pitch_types WHERE id = ?")
        .bind(path.into_inner())
        .execute(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
    Ok(redirect("/admin/pitch-types"))
}

// Pitches

#[derive(Debug, PartialEq)]
struct PitchInput {
    name: String,
    address: String,
    description: Option<String>,
    facility_id: Option<String>,
    pitch_type_id: String,
    price_per_hour_cents: i64,
    is_available: bool,
}

fn parse_pitch_form(form: &PitchForm) -> Result<PitchInput, Vec<String>> {
    let mut errors = Vec::new();
    if form.name.trim().is_empty() {
        errors.push("Pitch name is required.".to_string());
    }
    if form.address.trim().is_empty() {
        errors.push("Pitch address is required.".to_string());
    }
    if form.pitch_type_id.trim().is_empty() {
        errors.push("Please choose a pitch type.".to_string());
    }
    let price = parse_price(&form.price);
    if price.is_none() {
        errors.push(
            "Price per hour must be an amount up to 99999999.99 with at most two decimals.".to_string(),
        );
    }

    match price {
        Some(price_per_hour_cents) if errors.is_empty() => Ok(PitchInput {
            name: form.name.trim().to_string(),
            address: form.address.trim().to_string(),
            description: non_empty(form.description.as_deref()),
            facility_id: non_empty(form.facility_id.as_deref()),
            pitch_type_id: form.pitch_type_id.trim().to_string(),
            price_per_hour_cents,
            is_available: form.is_available.is_some(),
        }),
        _ => Err(errors),
    }
}

async fn pitches_page(
    state: &AppState,
    form: PitchFormView,
    facility_id: Option<&str>,
    pitch_type_id: Option<&str>,
    action: String,
    editing: bool,
    errors: Vec<String>,
) -> HttpResponse {
    let sql = format!("{PITCH_SELECT} ORDER BY f.name, p.name");
    let pitches = sqlx::query_as::<_, PitchRow>(&sql)
        .fetch_all(&state.db)
        .await
        .unwrap_or_default()
        .into_iter()
        .map(PitchCard::from)
        .collect();

    let status = if errors.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    render_with_status(
        status,
        AdminPitchesTemplate {
            pitches,
            form,
            facilities: facility_options(state, facility_id).await,
            pitch_types: pitch_type_options(state, pitch_type_id).await,
            action,
            editing,
            errors,
            is_admin: true,
        },
    )
}

fn pitch_view(form: &PitchForm) -> PitchFormView {
    PitchFormView {
        name: form.name.clone(),
        address: form.address.clone(),
        description: form.description.clone().unwrap_or_default(),
        price: form.price.clone(),
        is_available: form.is_available.is_some(),
    }
}

async fn list_pitches(state: web::Data<AppState>) -> Result<HttpResponse> {
    let form = PitchFormView {
        is_available: true,
        ..PitchFormView::default()
    };
    Ok(pitches_page(&state, form, None, None, "/admin/pitches".to_string(), false, Vec::new()).await)
}

async fn create_pitch(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Form<PitchForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let input = match parse_pitch_form(&form) {
        Ok(input) => input,
        Err(errors) => {
            return Ok(pitches_page(
                &state,
                pitch_view(&form),
                form.facility_id.as_deref(),
                Some(form.pitch_type_id.as_str()),
                "/admin/pitches".to_string(),
                false,
                errors,
            )
            .await);
        }
    };

    let now = now_rfc3339();
    let result = sqlx::query(
        r#"INSERT INTO pitches
           (id, facility_id, pitch_type_id, name, address, description, price_per_hour_cents,
            is_available, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(&input.facility_id)
    .bind(&input.pitch_type_id)
    .bind(&input.name)
    .bind(&input.address)
    .bind(&input.description)
    .bind(input.price_per_hour_cents)
    .bind(input.is_available as i64)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await;

    if let Err(err) = result {
        return Ok(pitches_page(
            &state,
            pitch_view(&form),
            form.facility_id.as_deref(),
            Some(form.pitch_type_id.as_str()),
            "/admin/pitches".to_string(),
            false,
            vec![format!("Failed to create pitch: {err}")],
        )
        .await);
    }

    log_activity(
        &state.db,
        "pitch_created",
        &format!("{} added pitch {}.", auth.display_name, input.name),
        Some(&auth.id),
        None,
    )
    .await;

    Ok(redirect("/admin/pitches"))
}

async fn edit_pitch(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let pitch_id = path.into_inner();
    let Some(pitch) = fetch_pitch(&state, &pitch_id).await else {
        return Ok(not_found("Pitch not found"));
    };

    let form = PitchFormView {
        name: pitch.name,
        address: pitch.address,
        description: pitch.description.unwrap_or_default(),
        price: format_money(pitch.price_per_hour_cents),
        is_available: pitch.is_available == 1,
    };
    Ok(pitches_page(
        &state,
        form,
        pitch.facility_id.as_deref(),
        Some(pitch.pitch_type_id.as_str()),
        format!("/admin/pitches/{pitch_id}"),
        true,
        Vec::new(),
    )
    .await)
}

async fn update_pitch(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Form<PitchForm>,
) -> Result<HttpResponse> {
    let pitch_id = path.into_inner();
    let form = form.into_inner();
    let input = match parse_pitch_form(&form) {
        Ok(input) => input,
        Err(errors) => {
            return Ok(pitches_page(
                &state,
                pitch_view(&form),
                form.facility_id.as_deref(),
                Some(form.pitch_type_id.as_str()),
                format!("/admin/pitches/{pitch_id}"),
                true,
                errors,
            )
            .await);
        }
    };

    let result = sqlx::query(
        r#"UPDATE pitches SET facility_id = ?, pitch_type_id = ?, name = ?, address = ?,
                  description = ?, price_per_hour_cents = ?, is_available = ?, updated_at = ?
           WHERE id = ?"#,
    )
    .bind(&input.facility_id)
    .bind(&input.pitch_type_id)
    .bind(&input.name)
    .bind(&input.address)
    .bind(&input.description)
    .bind(input.price_per_hour_cents)
    .bind(input.is_available as i64)
    .bind(now_rfc3339())
    .bind(&pitch_id)
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;
    if result.rows_affected() == 0 {
        return Ok(not_found("Pitch not found"));
    }

    log_activity(
        &state.db,
        "pitch_updated",
        &format!("{} updated pitch {}.", auth.display_name, input.name),
        Some(&auth.id),
        None,
    )
    .await;

    Ok(redirect("/admin/pitches"))
}

async fn delete_pitch(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let pitch_id = path.into_inner();
    sqlx::query("DELETE FROM pitches WHERE id = ?")
        .bind(&pitch_id)
        .execute(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    log_activity(
        &state.db,
        "pitch_deleted",
        &format!("{} deleted pitch {}.", auth.display_name, pitch_id),
        Some(&auth.id),
        None,
    )
    .await;

    Ok(redirect("/admin/pitches"))
}

// Vouchers

#[derive(Debug, PartialEq)]
struct VoucherInput {
    code: String,
    description: Option<String>,
    discount_percent: i64,
    min_order_cents: Option<i64>,
    usage_limit: Option<i64>,
    start_date: Option<String>,
    end_date: Option<String>,
    is_active: bool,
}

fn parse_voucher_form(form: &VoucherForm) -> Result<VoucherInput, Vec<String>> {
    let mut errors = Vec::new();

    let code = form.code.trim().to_uppercase();
    if code.is_empty() {
        errors.push("Voucher code is required.".to_string());
    }

    let discount_percent = form
        .discount_percent
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|percent| (0..=100).contains(percent));
    if discount_percent.is_none() {
        errors.push("Discount must be a whole percentage between 0 and 100.".to_string());
    }

    let min_order_cents = match non_empty(form.min_order.as_deref()) {
        None => Ok(None),
        Some(value) => parse_price(&value).map(Some).ok_or(()),
    };
    if min_order_cents.is_err() {
        errors.push(
            "Minimum order must be an amount up to 99999999.99 with at most two decimals.".to_string(),
        );
    }

    let usage_limit = match non_empty(form.usage_limit.as_deref()) {
        None => Ok(None),
        Some(value) => value.parse::<i64>().ok().filter(|limit| *limit >= 0).map(Some).ok_or(()),
    };
    if usage_limit.is_err() {
        errors.push("Usage limit must be a whole number.".to_string());
    }

    let start_date = non_empty(form.start_date.as_deref());
    let end_date = non_empty(form.end_date.as_deref());
    let start = start_date.as_deref().map(parse_date);
    let end = end_date.as_deref().map(parse_date);
    if matches!(start, Some(Err(_))) || matches!(end, Some(Err(_))) {
        errors.push("Dates must use the YYYY-MM-DD format.".to_string());
    }
    if let (Some(Ok(start)), Some(Ok(end))) = (start, end) {
        if start > end {
            errors.push("The start date must not be after the end date.".to_string());
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(VoucherInput {
        code,
        description: non_empty(form.description.as_deref()),
        discount_percent: discount_percent.unwrap_or_default(),
        min_order_cents: min_order_cents.unwrap_or_default(),
        usage_limit: usage_limit.unwrap_or_default(),
        start_date,
        end_date,
        is_active: form.is_active.is_some(),
    })
}

fn voucher_view(form: &VoucherForm, used_count: i64) -> VoucherFormView {
    VoucherFormView {
        code: form.code.clone(),
        description: form.description.clone().unwrap_or_default(),
        discount_percent: form.discount_percent.clone(),
        min_order: form.min_order.clone().unwrap_or_default(),
        usage_limit: form.usage_limit.clone().unwrap_or_default(),
        start_date: form.start_date.clone().unwrap_or_default(),
        end_date: form.end_date.clone().unwrap_or_default(),
        is_active: form.is_active.is_some(),
        used_count,
    }
}

const VOUCHER_COLUMNS: &str = "id, code, description, discount_percent, min_order_cents, \
                               usage_limit, used_count, start_date, end_date, is_active";

async fn vouchers_page(
    state: &AppState,
    form: VoucherFormView,
    action: String,
    editing: bool,
    errors: Vec<String>,
) -> HttpResponse {
    let today = chrono::Local::now().date_naive();
    let sql = format!("SELECT {VOUCHER_COLUMNS} FROM vouchers ORDER BY created_at DESC");
    let vouchers = sqlx::query_as::<_, VoucherRow>(&sql)
        .fetch_all(&state.db)
        .await
        .unwrap_or_default()
        .into_iter()
        .map(|row| {
            let valid_today = row.terms().is_valid(today);
            VoucherView {
                valid_today,
                min_order: row.min_order_cents.map(format_money).unwrap_or_default(),
                usage: match row.usage_limit.filter(|limit| *limit > 0) {
                    Some(limit) => format!("{} / {}", row.used_count, limit),
                    None => format!("{} / unlimited", row.used_count),
                },
                window: format!(
                    "{} to {}",
                    row.start_date.clone().unwrap_or_else(|| "any".to_string()),
                    row.end_date.clone().unwrap_or_else(|| "any".to_string())
                ),
                is_active: row.is_active == 1,
                id: row.id,
                code: row.code,
                discount_percent: row.discount_percent,
            }
        })
        .collect();

    let status = if errors.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    render_with_status(
        status,
        AdminVouchersTemplate {
            vouchers,
            form,
            action,
            editing,
            errors,
            is_admin: true,
        },
    )
}

async fn list_vouchers(state: web::Data<AppState>) -> Result<HttpResponse> {
    let form = VoucherFormView {
        is_active: true,
        discount_percent: "10".to_string(),
        ..VoucherFormView::default()
    };
    Ok(vouchers_page(&state, form, "/admin/vouchers".to_string(), false, Vec::new()).await)
}

async fn create_voucher(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Form<VoucherForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let input = match parse_voucher_form(&form) {
        Ok(input) => input,
        Err(errors) => {
            return Ok(vouchers_page(
                &state,
                voucher_view(&form, 0),
                "/admin/vouchers".to_string(),
                false,
                errors,
            )
            .await);
        }
    };

    let result = sqlx::query(
        r#"INSERT INTO vouchers
           (id, code, description, discount_percent, min_order_cents, usage_limit, used_count,
            start_date, end_date, is_active, created_at)
           VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(&input.code)
    .bind(&input.description)
    .bind(input.discount_percent)
    .bind(input.min_order_cents)
    .bind(input.usage_limit)
    .bind(&input.start_date)
    .bind(&input.end_date)
    .bind(input.is_active as i64)
    .bind(now_rfc3339())
    .execute(&state.db)
    .await;

    if let Err(err) = result {
        let message = match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                format!("Voucher code {} already exists.", input.code)
            }
            _ => format!("Failed to create voucher: {err}"),
        };
        return Ok(vouchers_page(
            &state,
            voucher_view(&form, 0),
            "/admin/vouchers".to_string(),
            false,
            vec![message],
        )
        .await);
    }

    log_activity(
        &state.db,
        "voucher_created",
        &format!("{} created voucher {}.", auth.display_name, input.code),
        Some(&auth.id),
        None,
    )
    .await;

    Ok(redirect("/admin/vouchers"))
}

async fn edit_voucher(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let voucher_id = path.into_inner();
    let sql = format!("SELECT {VOUCHER_COLUMNS} FROM vouchers WHERE id = ?");
    let row = sqlx::query_as::<_, VoucherRow>(&sql)
        .bind(&voucher_id)
        .fetch_optional(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
    let Some(row) = row else {
        return Ok(not_found("Voucher not found"));
    };

    let form = VoucherFormView {
        code: row.code,
        description: row.description.unwrap_or_default(),
        discount_percent: row.discount_percent.to_string(),
        min_order: row.min_order_cents.map(format_money).unwrap_or_default(),
        usage_limit: row.usage_limit.map(|limit| limit.to_string()).unwrap_or_default(),
        start_date: row.start_date.unwrap_or_default(),
        end_date: row.end_date.unwrap_or_default(),
        is_active: row.is_active == 1,
        used_count: row.used_count,
    };
    Ok(vouchers_page(&state, form, format!("/admin/vouchers/{voucher_id}"), true, Vec::new()).await)
}

/// Updates everything except `used_count`, which only bookings move.
async fn update_voucher(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Form<VoucherForm>,
) -> Result<HttpResponse> {
    let voucher_id = path.into_inner();
    let form = form.into_inner();
    let used_count = sqlx::query_scalar::<_, i64>("SELECT used_count FROM vouchers WHERE id = ?")
        .bind(&voucher_id)
        .fetch_optional(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
    let Some(used_count) = used_count else {
        return Ok(not_found("Voucher not found"));
    };

    let action = format!("/admin/vouchers/{voucher_id}");
    let input = match parse_voucher_form(&form) {
        Ok(input) => input,
        Err(errors) => {
            return Ok(vouchers_page(&state, voucher_view(&form, used_count), action, true, errors).await);
        }
    };

    let result = sqlx::query(
        r#"UPDATE vouchers SET code = ?, description = ?, discount_percent = ?, min_order_cents = ?,
                  usage_limit = ?, start_date = ?, end_date = ?, is_active = ?
           WHERE id = ?"#,
    )
    .bind(&input.code)
    .bind(&input.description)
    .bind(input.discount_percent)
    .bind(input.min_order_cents)
    .bind(input.usage_limit)
    .bind(&input.start_date)
    .bind(&input.end_date)
    .bind(input.is_active as i64)
    .bind(&voucher_id)
    .execute(&state.db)
    .await;

    if let Err(err) = result {
        return Ok(vouchers_page(
            &state,
            voucher_view(&form, used_count),
            action,
            true,
            vec![format!("Failed to update voucher: {err}")],
        )
        .await);
    }

    log_activity(
        &state.db,
        "voucher_updated",
        &format!("{} updated voucher {}.", auth.display_name, input.code),
        Some(&auth.id),
        None,
    )
    .await;

    Ok(redirect("/admin/vouchers"))
}

async fn delete_voucher(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    sqlx::query("DELETE FROM vouchers WHERE id = ?")
        .bind(path.into_inner())
        .execute(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
    Ok(redirect("/admin/vouchers"))
}

// Bookings

fn status_options(selected: &str) -> Vec<OptionView> {
    BookingStatus::ALL
        .into_iter()
        .map(|status| OptionView {
            value: status.as_str().to_string(),
            label: status.as_str().to_string(),
            selected: status.as_str() == selected,
        })
        .collect()
}

async fn list_bookings(
    state: web::Data<AppState>,
    query: web::Query<BookingFilter>,
) -> Result<HttpResponse> {
    let status = non_empty(query.status.as_deref()).filter(|value| BookingStatus::parse(value).is_some());
    let date = non_empty(query.date.as_deref()).filter(|value| parse_date(value).is_ok());
    let q = non_empty(query.q.as_deref());

    let mut builder = QueryBuilder::<Sqlite>::new(BOOKING_SELECT);
    builder.push(" WHERE 1 = 1");
    if let Some(status) = &status {
        builder.push(" AND b.status = ").push_bind(status.clone());
    }
    if let Some(date) = &date {
        builder.push(" AND b.booking_date = ").push_bind(date.clone());
    }
    if let Some(q) = &q {
        let pattern = format!("%{q}%");
        builder
            .push(" AND (u.username LIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.name LIKE ")
            .push_bind(pattern)
            .push(")");
    }
    builder.push(" ORDER BY b.booking_date DESC, b.start_time DESC");

    let bookings = builder
        .build_query_as::<BookingRow>()
        .fetch_all(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?
        .into_iter()
        .map(BookingView::from)
        .collect();

    Ok(render(AdminBookingsTemplate {
        bookings,
        statuses: status_options(status.as_deref().unwrap_or_default()),
        date: date.unwrap_or_default(),
        q: q.unwrap_or_default(),
        is_admin: true,
    }))
}

async fn booking_detail(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let Some(row) = crate::db::fetch_booking(&state.db, &path.into_inner()).await else {
        return Ok(not_found("Booking not found"));
    };
    let statuses = status_options(&row.status);
    Ok(render(AdminBookingDetailTemplate {
        booking: BookingView::from(row),
        statuses,
        errors: Vec::new(),
        is_admin: true,
    }))
}

async fn update_booking(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Form<BookingStatusForm>,
) -> Result<HttpResponse> {
    let booking_id = path.into_inner();
    let Some(row) = crate::db::fetch_booking(&state.db, &booking_id).await else {
        return Ok(not_found("Booking not found"));
    };

    let current = BookingStatus::parse(&row.status);
    let requested = BookingStatus::parse(form.status.trim());
    let outcome = match (current, requested) {
        (Some(current), Some(requested)) if current == requested => Ok(None),
        (Some(current), Some(requested)) => check_transition(current, requested)
            .map(|_| Some(requested))
            .map_err(|err| err.to_string()),
        _ => Err("Unknown booking status.".to_string()),
    };

    let next = match outcome {
        Ok(Some(next)) => next,
        Ok(None) => return Ok(redirect(&format!("/admin/bookings/{booking_id}"))),
        Err(message) => {
            let statuses = status_options(&row.status);
            return Ok(render_with_status(
                StatusCode::CONFLICT,
                AdminBookingDetailTemplate {
                    booking: BookingView::from(row),
                    statuses,
                    errors: vec![message],
                    is_admin: true,
                },
            ));
        }
    };

    let Some(current) = current else {
        return Ok(not_found("Booking not found"));
    };
    let moved = transition_booking(&state.db, &booking_id, current, next)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
    if !moved {
        let Some(latest) = crate::db::fetch_booking(&state.db, &booking_id).await else {
            return Ok(not_found("Booking not found"));
        };
        let statuses = status_options(&latest.status);
        return Ok(render_with_status(
            StatusCode::CONFLICT,
            AdminBookingDetailTemplate {
                booking: BookingView::from(latest),
                statuses,
                errors: vec![
                    "This booking changed while you were viewing it. Check its current status."
                        .to_string(),
                ],
                is_admin: true,
            },
        ));
    }

    log::info!("{} set booking {} to {}", auth.username, booking_id, next.as_str());
    log_activity(
        &state.db,
        "booking_updated",
        &format!(
            "{} marked {}'s booking of {} as {}.",
            auth.display_name,
            row.username,
            row.pitch_name,
            next.as_str()
        ),
        Some(&auth.id),
        Some(&booking_id),
    )
    .await;
    publish_booking(&state, "booking_updated", &booking_id).await;

    Ok(redirect(&format!("/admin/bookings/{booking_id}")))
}

// Users

fn role_options(selected: &str) -> Vec<OptionView> {
    Role::ALL
        .into_iter()
        .map(|role| OptionView {
            value: role.as_str().to_string(),
            label: role.as_str().to_string(),
            selected: role.as_str() == selected,
        })
        .collect()
}

async fn users_page(state: &AppState, filter: &UserFilter, errors: Vec<String>) -> Result<HttpResponse> {
    let role = non_empty(filter.role.as_deref()).filter(|value| Role::parse(value).is_some());
    let q = non_empty(filter.q.as_deref());

    let mut builder = QueryBuilder::<Sqlite>::new(
        r#"SELECT id, username, email, full_name, phone_number, role, password_hash,
                  activation_token, activation_expiry, is_active, created_at
           FROM users WHERE 1 = 1"#,
    );
    if let Some(role) = &role {
        builder.push(" AND role = ").push_bind(role.clone());
    }
    if let Some(q) = &q {
        let pattern = format!("%{q}%");
        builder
            .push(" AND (username LIKE ")
            .push_bind(pattern.clone())
            .push(" OR email LIKE ")
            .push_bind(pattern.clone())
            .push(" OR full_name LIKE ")
            .push_bind(pattern)
            .push(")");
    }
    builder.push(" ORDER BY created_at DESC");

    let users = builder
        .build_query_as::<UserRow>()
        .fetch_all(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?
        .into_iter()
        .map(|row| UserView {
            roles: role_options(&row.role),
            id: row.id,
            username: row.username,
            email: row.email,
            full_name: row.full_name,
            is_active: row.is_active == 1,
            created_at: row.created_at,
        })
        .collect();

    let status = if errors.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok(render_with_status(
        status,
        AdminUsersTemplate {
            users,
            roles: role_options(role.as_deref().unwrap_or_default()),
            q: q.unwrap_or_default(),
            errors,
            is_admin: true,
        },
    ))
}

async fn list_users(state: web::Data<AppState>, query: web::Query<UserFilter>) -> Result<HttpResponse> {
    users_page(&state, &query, Vec::new()).await
}

async fn update_user(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Form<UserUpdateForm>,
) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    let no_filter = UserFilter { role: None, q: None };
    let Some(role) = Role::parse(form.role.trim()) else {
        return users_page(&state, &no_filter, vec!["Unknown role.".to_string()]).await;
    };
    let is_active = form.is_active.is_some();
    if user_id == auth.id && (role != Role::Admin || !is_active) {
        return users_page(
            &state,
            &no_filter,
            vec!["You cannot demote or deactivate your own account.".to_string()],
        )
        .await;
    }

    let result = sqlx::query("UPDATE users SET role = ?, is_active = ?, updated_at = ? WHERE id = ?")
        .bind(role.as_str())
        .bind(is_active as i64)
        .bind(now_rfc3339())
        .bind(&user_id)
        .execute(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
    if result.rows_affected() == 0 {
        return Ok(not_found("User not found"));
    }

    log_activity(
        &state.db,
        "user_updated",
        &format!(
            "{} set user {} to {} ({}).",
            auth.display_name,
            user_id,
            role.as_str(),
            if is_active { "active" } else { "inactive" }
        ),
        Some(&auth.id),
        None,
    )
    .await;

    Ok(redirect("/admin/users"))
}

// Reviews

async fn list_reviews(state: web::Data<AppState>) -> Result<HttpResponse> {
    let reviews = sqlx::query_as::<_, ReviewRow>(
        r#"SELECT r.id, r.user_id, u.username, r.pitch_id, p.name as pitch_name,
                  r.rating, r.content, r.created_at
           FROM reviews r
           JOIN users u ON r.user_id = u.id
           JOIN pitches p ON r.pitch_id = p.id
           ORDER BY r.created_at DESC"#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?
    .into_iter()
    .map(|row| ReviewView {
        id: row.id,
        username: row.username,
        pitch_id: row.pitch_id,
        pitch_name: row.pitch_name,
        rating: row.rating,
        content: row.content,
        created_at: row.created_at,
    })
    .collect();

    Ok(render(AdminReviewsTemplate {
        reviews,
        is_admin: true,
    }))
}

async fn delete_review(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let review_id = path.into_inner();
    sqlx::query("DELETE FROM reviews WHERE id = ?")
        .bind(&review_id)
        .execute(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    log_activity(
        &state.db,
        "review_deleted",
        &format!("{} removed review {}.", auth.display_name, review_id),
        Some(&auth.id),
        None,
    )
    .await;

    Ok(redirect("/admin/reviews"))
}

#[cfg(test)]
mod tests {
    use actix_web::{test as web_test, App};

    use super::*;
    use crate::{routes, testing};

    fn voucher_form(discount: &str, start: &str, end: &str) -> VoucherForm {
        VoucherForm {
            code: " summer ".into(),
            description: None,
            discount_percent: discount.into(),
            min_order: Some("100".into()),
            usage_limit: Some(String::new()),
            start_date: Some(start.into()),
            end_date: Some(end.into()),
            is_active: Some("on".into()),
        }
    }

    #[test]
    fn voucher_form_normalises_and_validates() {
        let input = parse_voucher_form(&voucher_form("15", "2026-06-01", "2026-08-31")).unwrap();
        assert_eq!(input.code, "SUMMER");
        assert_eq!(input.discount_percent, 15);
        assert_eq!(input.min_order_cents, Some(10_000));
        assert_eq!(input.usage_limit, None);
        assert!(input.is_active);

        let errors = parse_voucher_form(&voucher_form("150", "2026-09-01", "2026-08-31")).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn pitch_form_requires_a_price() {
        let form = PitchForm {
            name: "North".into(),
            address: "1 Road".into(),
            description: None,
            facility_id: Some(String::new()),
            pitch_type_id: "t1".into(),
            price: "12.5".into(),
            is_available: None,
        };
        let input = parse_pitch_form(&form).unwrap();
        assert_eq!(input.price_per_hour_cents, 1_250);
        assert_eq!(input.facility_id, None);
        assert!(!input.is_available);

        let huge = PitchForm {
            price: "1000000000000000".into(),
            ..form
        };
        assert_eq!(parse_pitch_form(&huge).unwrap_err().len(), 1);

        let broken = PitchForm {
            price: "free".into(),
            ..huge
        };
        assert_eq!(parse_pitch_form(&broken).unwrap_err().len(), 1);
    }

    #[test]
    fn voucher_minimum_order_is_capped() {
        let mut form = voucher_form("10", "2026-06-01", "2026-08-31");
        form.min_order = Some("100000000".into());
        assert_eq!(parse_voucher_form(&form).unwrap_err().len(), 1);

        form.min_order = Some("99999999.99".into());
        let input = parse_voucher_form(&form).unwrap();
        assert_eq!(input.min_order_cents, Some(9_999_999_999));
    }

    #[actix_web::test]
    async fn admin_area_requires_the_admin_role() {
        let state = testing::state().await;
        testing::create_user(&state.db, "sam", "member-pass", Role::User, true).await;
        let app = web_test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(routes::configure),
        )
        .await;

        let req = web_test::TestRequest::get().uri("/admin/dashboard").to_request();
        let resp = web_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = web_test::TestRequest::get()
            .uri("/admin/dashboard")
            .insert_header(testing::basic_auth("sam", "member-pass"))
            .to_request();
        let resp = web_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = web_test::TestRequest::get()
            .uri("/admin/dashboard")
            .insert_header(testing::basic_auth("admin", "admin-secret"))
            .to_request();
        let resp = web_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn admin_confirms_and_cannot_reopen_bookings() {
        let state = testing::state().await;
        let user_id = testing::create_user(&state.db, "sam", "member-pass", Role::User, true).await;
        let pitch = testing::create_pitch(&state.db, "Riverside", 10_000).await;
        sqlx::query(
            r#"INSERT INTO bookings (id, user_id, pitch_id, booking_date, start_time, end_time,
                                     duration_minutes, final_price_cents, status, created_at, updated_at)
               VALUES ('b1', ?, ?, ?, '18:00', '20:00', 120, 20000, 'Pending', '', '')"#,
        )
        .bind(&user_id)
        .bind(&pitch)
        .bind(testing::future_date(5))
        .execute(&state.db)
        .await
        .unwrap();
        let app = web_test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(routes::configure),
        )
        .await;

        let req = web_test::TestRequest::post()
            .uri("/admin/bookings/b1")
            .insert_header(testing::basic_auth("admin", "admin-secret"))
            .set_form([("status", "Confirmed")])
            .to_request();
        let resp = web_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);

        let req = web_test::TestRequest::post()
            .uri("/admin/bookings/b1")
            .insert_header(testing::basic_auth("admin", "admin-secret"))
            .set_form([("status", "Pending")])
            .to_request();
        let resp = web_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let status: String = sqlx::query_scalar("SELECT status FROM bookings WHERE id = 'b1'")
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(status, "Confirmed");
    }

    #[actix_web::test]
    async fn admin_manages_catalogue_and_vouchers() {
        let state = testing::state().await;
        let app = web_test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(routes::configure),
        )
        .await;

        let req = web_test::TestRequest::post()
            .uri("/admin/facilities")
            .insert_header(testing::basic_auth("admin", "admin-secret"))
            .set_form([("name", "Central Park"), ("address", "2 Main St"), ("description", "")])
            .to_request();
        assert_eq!(web_test::call_service(&app, req).await.status(), StatusCode::SEE_OTHER);

        let facility_id: String = sqlx::query_scalar("SELECT id FROM facilities")
            .fetch_one(&state.db)
            .await
            .unwrap();
        let pitch_type_id: String = sqlx::query_scalar("SELECT id FROM pitch_types LIMIT 1")
            .fetch_one(&state.db)
            .await
            .unwrap();

        let req = web_test::TestRequest::post()
            .uri("/admin/pitches")
            .insert_header(testing::basic_auth("admin", "admin-secret"))
            .set_form([
                ("name", "Pitch A"),
                ("address", "2 Main St"),
                ("facility_id", facility_id.as_str()),
                ("pitch_type_id", pitch_type_id.as_str()),
                ("price", "80.00"),
                ("is_available", "on"),
            ])
            .to_request();
        assert_eq!(web_test::call_service(&app, req).await.status(), StatusCode::SEE_OTHER);

        let price: i64 = sqlx::query_scalar("SELECT price_per_hour_cents FROM pitches")
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(price, 8_000);

        for expected in [StatusCode::SEE_OTHER, StatusCode::BAD_REQUEST] {
            let req = web_test::TestRequest::post()
                .uri("/admin/vouchers")
                .insert_header(testing::basic_auth("admin", "admin-secret"))
                .set_form([("code", "spring"), ("discount_percent", "20"), ("is_active", "on")])
                .to_request();
            assert_eq!(web_test::call_service(&app, req).await.status(), expected);
        }

        let req = web_test::TestRequest::post()
            .uri(&format!("/admin/facilities/{facility_id}/delete"))
            .insert_header(testing::basic_auth("admin", "admin-secret"))
            .to_request();
        assert_eq!(web_test::call_service(&app, req).await.status(), StatusCode::SEE_OTHER);
        let pitches: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pitches")
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(pitches, 0);
    }

    #[actix_web::test]
    async fn admins_cannot_lock_themselves_out() {
        let state = testing::state().await;
        let admin_id: String = sqlx::query_scalar("SELECT id FROM users WHERE username = 'admin'")
            .fetch_one(&state.db)
            .await
            .unwrap();
        let app = web_test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(routes::configure),
        )
        .await;

        let req = web_test::TestRequest::post()
            .uri(&format!("/admin/users/{admin_id}"))
            .insert_header(testing::basic_auth("admin", "admin-secret"))
            .set_form([("role", "User"), ("is_active", "on")])
            .to_request();
        assert_eq!(web_test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }
}
