use std::collections::HashMap;

use actix_web::{http::header, http::StatusCode, web, HttpRequest, HttpResponse, Result};
use actix_web::http::header::Header;
use actix_web_httpauth::headers::authorization::{Authorization, Basic};
use askama::Template;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{QueryBuilder, Sqlite};

use crate::{
    auth::{
        authenticate_credentials, clear_logout_cookie, hash_password, logout_cookie,
        new_activation_token, new_id, AUTH_REALM,
    },
    booking::{format_money, overlaps, parse_date, parse_time, SlotRequest},
    db::{log_activity, now_rfc3339, queue_email},
    models::{
        BookingStatus, CommentRow, FacilityRow, PitchRow, PitchTypeRow, ReviewRow, Role, PITCH_SELECT,
    },
    state::AppState,
    templates::{render, render_with_status},
};

pub const PITCHES_PER_PAGE: i64 = 4;

#[derive(Clone, Debug)]
pub struct PitchCard {
    pub id: String,
    pub name: String,
    pub facility_name: String,
    pub pitch_type_name: String,
    pub address: String,
    pub description: String,
    pub price: String,
    pub is_available: bool,
}

impl From<PitchRow> for PitchCard {
    fn from(row: PitchRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            facility_name: row.facility_name.unwrap_or_else(|| "No facility".to_string()),
            pitch_type_name: row.pitch_type_name,
            address: row.address,
            description: row.description.unwrap_or_default(),
            price: format_money(row.price_per_hour_cents),
            is_available: row.is_available == 1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct OptionView {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CommentView {
    pub id: String,
    pub username: String,
    pub content: String,
    pub created_at: String,
    pub indent: usize,
}

#[derive(Clone, Debug)]
struct ReviewView {
    id: String,
    username: String,
    stars: String,
    content: String,
    created_at: String,
    comments: Vec<CommentView>,
}

#[derive(Template)]
#[template(path = "home.html")]
struct HomeTemplate {
    pitches: Vec<PitchCard>,
    facility_count: i64,
    is_admin: bool,
}

#[derive(Template)]
#[template(path = "pitches.html")]
struct PitchesTemplate {
    pitches: Vec<PitchCard>,
    facilities: Vec<OptionView>,
    pitch_types: Vec<OptionView>,
    q: String,
    date: String,
    start: String,
    end: String,
    available_only: bool,
    notice: String,
    page: i64,
    total_pages: i64,
    has_prev: bool,
    has_next: bool,
    prev_page: i64,
    next_page: i64,
    query_string: String,
    is_admin: bool,
}

#[derive(Template)]
#[template(path = "pitch_detail.html")]
struct PitchDetailTemplate {
    pitch: PitchCard,
    average_rating: String,
    review_count: usize,
    reviews: Vec<ReviewView>,
    is_admin: bool,
}

#[derive(Template)]
#[template(path = "facilities.html")]
struct FacilitiesTemplate {
    facilities: Vec<FacilityRow>,
    is_admin: bool,
}

#[derive(Clone, Debug, Default)]
struct SignUpView {
    username: String,
    email: String,
    full_name: String,
    phone_number: String,
}

#[derive(Template)]
#[template(path = "sign_up.html")]
struct SignUpTemplate {
    form: SignUpView,
    errors: Vec<String>,
    is_admin: bool,
}

#[derive(Template)]
#[template(path = "message.html")]
pub struct MessageTemplate {
    pub title: String,
    pub message: String,
    pub link: String,
    pub link_label: String,
    pub is_admin: bool,
}

impl MessageTemplate {
    pub fn new(title: &str, message: &str) -> Self {
        Self {
            title: title.to_string(),
            message: message.to_string(),
            link: "/".to_string(),
            link_label: "Back to home".to_string(),
            is_admin: false,
        }
    }

    pub fn with_link(mut self, link: &str, label: &str) -> Self {
        self.link = link.to_string();
        self.link_label = label.to_string();
        self
    }
}

#[derive(Deserialize, Default)]
struct PitchQuery {
    q: Option<String>,
    facility: Option<String>,
    pitch_type: Option<String>,
    date: Option<String>,
    start: Option<String>,
    end: Option<String>,
    available_only: Option<String>,
    page: Option<String>,
}

#[derive(Deserialize)]
struct SlotQuery {
    date: String,
    start: Option<String>,
    end: Option<String>,
}

#[derive(Deserialize)]
struct SignUpForm {
    username: String,
    email: String,
    full_name: String,
    phone_number: Option<String>,
    password1: String,
    password2: String,
}

#[derive(Deserialize)]
struct LoginQuery {
    next: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(home)))
        .service(web::resource("/home").route(web::get().to(home)))
        .service(web::resource("/pitches").route(web::get().to(list_pitches)))
        .service(web::resource("/pitches/{id}").route(web::get().to(pitch_detail)))
        .service(web::resource("/pitches/{id}/slots").route(web::get().to(pitch_slots)))
        .service(web::resource("/book/{id}").route(web::get().to(book_redirect)))
        .service(web::resource("/facilities").route(web::get().to(list_facilities)))
        .service(
            web::resource("/sign-up")
                .route(web::get().to(show_sign_up))
                .route(web::post().to(sign_up)),
        )
        .service(web::resource("/activate/{token}").route(web::get().to(activate)))
        .service(web::resource("/login").route(web::get().to(login)))
        .service(web::resource("/logout").route(web::get().to(logout)))
        .service(web::resource("/health").route(web::get().to(health)));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

async fn logout(req: HttpRequest) -> HttpResponse {
    HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/"))
        .cookie(logout_cookie(&req))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish()
}

async fn login(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<LoginQuery>,
) -> HttpResponse {
    let auth = match Authorization::<Basic>::parse(&req) {
        Ok(auth) => auth,
        Err(_) => return auth_challenge(),
    };
    let credentials = auth.into_scheme();
    let username = credentials.user_id();
    let password = credentials.password().unwrap_or_default();

    let user = match authenticate_credentials(&state, username, password).await {
        Some(user) => user,
        None => return auth_challenge(),
    };

    let requested = query.next.as_deref().unwrap_or("");
    let requested = if requested.starts_with('/') { requested } else { "" };
    let area = if user.is_admin() { "/admin" } else { "/account" };
    let redirect = if requested.starts_with(area) {
        requested.to_string()
    } else {
        format!("{area}/dashboard")
    };

    HttpResponse::SeeOther()
        .append_header((header::LOCATION, redirect))
        .cookie(clear_logout_cookie(&req))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish()
}

fn auth_challenge() -> HttpResponse {
    HttpResponse::Unauthorized()
        .insert_header((header::WWW_AUTHENTICATE, format!("Basic realm=\"{}\"", AUTH_REALM)))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish()
}

async fn home(state: web::Data<AppState>) -> Result<HttpResponse> {
    let sql = format!("{PITCH_SELECT} WHERE p.is_available = 1 ORDER BY p.created_at DESC LIMIT 6");
    let pitches = sqlx::query_as::<_, PitchRow>(&sql)
        .fetch_all(&state.db)
        .await
        .unwrap_or_default()
        .into_iter()
        .map(PitchCard::from)
        .collect();
    let facility_count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM facilities")
        .fetch_one(&state.db)
        .await
        .unwrap_or(0);

    Ok(render(HomeTemplate {
        pitches,
        facility_count,
        is_admin: false,
    }))
}

/// Filters accepted by the pitch list, already trimmed.
#[derive(Debug, Default)]
struct PitchFilters {
    q: Option<String>,
    facility: Option<String>,
    pitch_type: Option<String>,
    available_only: bool,
    slot: Option<SlotRequest>,
}

/// Active filters carried over into the pager links.
#[derive(Serialize)]
struct PagerQuery<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    q: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    facility: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pitch_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    available_only: Option<&'static str>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn push_pitch_filters(builder: &mut QueryBuilder<'_, Sqlite>, filters: &PitchFilters) {
    builder.push(" WHERE 1 = 1");
    if let Some(q) = &filters.q {
        let pattern = format!("%{q}%");
        builder
            .push(" AND (p.name LIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.address LIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.description LIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(facility) = &filters.facility {
        builder.push(" AND p.facility_id = ").push_bind(facility.clone());
    }
    if let Some(pitch_type) = &filters.pitch_type {
        builder.push(" AND p.pitch_type_id = ").push_bind(pitch_type.clone());
    }
    if filters.available_only || filters.slot.is_some() {
        builder.push(" AND p.is_available = 1");
    }
    if let Some(slot) = &filters.slot {
        builder
            .push(
                " AND NOT EXISTS (SELECT 1 FROM bookings b WHERE b.pitch_id = p.id \
                 AND b.status IN ('Pending', 'Confirmed') AND b.booking_date = ",
            )
            .push_bind(slot.date_key())
            .push(" AND b.start_time < ")
            .push_bind(slot.end_key())
            .push(" AND ")
            .push_bind(slot.start_key())
            .push(" < b.end_time)");
    }
}

/// Resolves the requested page number. A non-numeric page shows the first
/// page; anything out of range shows the last one.
pub fn resolve_page(raw: Option<&str>, total_items: i64, per_page: i64) -> (i64, i64) {
    let total_pages = ((total_items + per_page - 1) / per_page).max(1);
    let page = match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => 1,
        Some(value) => match value.parse::<i64>() {
            Ok(number) if (1..=total_pages).contains(&number) => number,
            Ok(_) => total_pages,
            Err(_) => 1,
        },
    };
    (page, total_pages)
}

async fn list_pitches(
    state: web::Data<AppState>,
    query: web::Query<PitchQuery>,
) -> Result<HttpResponse> {
    let query = query.into_inner();
    let date = non_empty(&query.date).unwrap_or_default();
    let start = non_empty(&query.start).unwrap_or_default();
    let end = non_empty(&query.end).unwrap_or_default();

    let mut notice = String::new();
    let slot = if date.is_empty() && start.is_empty() && end.is_empty() {
        None
    } else {
        match SlotRequest::parse(&date, &start, &end) {
            Ok(slot) if slot.duration_minutes() > 0 => Some(slot),
            _ => {
                notice = "The time filter was ignored: pick a date, a start and a later end time."
                    .to_string();
                None
            }
        }
    };

    let filters = PitchFilters {
        q: non_empty(&query.q),
        facility: non_empty(&query.facility),
        pitch_type: non_empty(&query.pitch_type),
        available_only: query.available_only.is_some(),
        slot,
    };

    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM pitches p");
    push_pitch_filters(&mut count, &filters);
    let total = count
        .build_query_scalar::<i64>()
        .fetch_one(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    let (page, total_pages) = resolve_page(query.page.as_deref(), total, PITCHES_PER_PAGE);

    let mut select = QueryBuilder::<Sqlite>::new(PITCH_SELECT);
    push_pitch_filters(&mut select, &filters);
    select
        .push(" ORDER BY p.name LIMIT ")
        .push_bind(PITCHES_PER_PAGE)
        .push(" OFFSET ")
        .push_bind((page - 1) * PITCHES_PER_PAGE);
    let pitches = select
        .build_query_as::<PitchRow>()
        .fetch_all(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?
        .into_iter()
        .map(PitchCard::from)
        .collect();

    let facilities = facility_options(&state, filters.facility.as_deref()).await;
    let pitch_types = pitch_type_options(&state, filters.pitch_type.as_deref()).await;

    let pager = PagerQuery {
        q: filters.q.as_deref(),
        facility: filters.facility.as_deref(),
        pitch_type: filters.pitch_type.as_deref(),
        date: Some(date.as_str()).filter(|value| !value.is_empty()),
        start: Some(start.as_str()).filter(|value| !value.is_empty()),
        end: Some(end.as_str()).filter(|value| !value.is_empty()),
        available_only: filters.available_only.then_some("on"),
    };
    let query_string = serde_urlencoded::to_string(&pager).unwrap_or_default();

    Ok(render(PitchesTemplate {
        pitches,
        facilities,
        pitch_types,
        q: filters.q.unwrap_or_default(),
        date,
        start,
        end,
        available_only: filters.available_only,
        notice,
        page,
        total_pages,
        has_prev: page > 1,
        has_next: page < total_pages,
        prev_page: page - 1,
        next_page: page + 1,
        query_string,
        is_admin: false,
    }))
}

pub async fn facility_options(state: &AppState, selected: Option<&str>) -> Vec<OptionView> {
    sqlx::query_as::<_, (String, String)>("SELECT id, name FROM facilities ORDER BY name")
        .fetch_all(&state.db)
        .await
        .unwrap_or_default()
        .into_iter()
        .map(|(id, name)| OptionView {
            selected: selected == Some(id.as_str()),
            value: id,
            label: name,
        })
        .collect()
}

pub async fn pitch_type_options(state: &AppState, selected: Option<&str>) -> Vec<OptionView> {
    sqlx::query_as::<_, PitchTypeRow>("SELECT id, name, description FROM pitch_types ORDER BY name")
        .fetch_all(&state.db)
        .await
        .unwrap_or_default()
        .into_iter()
        .map(|row| OptionView {
            selected: selected == Some(row.id.as_str()),
            value: row.id,
            label: row.name,
        })
        .collect()
}

pub async fn fetch_pitch(state: &AppState, pitch_id: &str) -> Option<PitchRow> {
    let sql = format!("{PITCH_SELECT} WHERE p.id = ? LIMIT 1");
    sqlx::query_as::<_, PitchRow>(&sql)
        .bind(pitch_id)
        .fetch_optional(&state.db)
        .await
        .unwrap_or(None)
}

async fn pitch_detail(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let pitch_id = path.into_inner();
    let Some(pitch) = fetch_pitch(&state, &pitch_id).await else {
        return Ok(not_found("Pitch not found"));
    };

    let reviews = sqlx::query_as::<_, ReviewRow>(
        r#"SELECT r.id, r.user_id, u.username, r.pitch_id, p.name as pitch_name,
                  r.rating, r.content, r.created_at
           FROM reviews r
           JOIN users u ON r.user_id = u.id
           JOIN pitches p ON r.pitch_id = p.id
           WHERE r.pitch_id = ?
           ORDER BY r.created_at DESC"#,
    )
    .bind(&pitch_id)
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    let comments = sqlx::query_as::<_, CommentRow>(
        r#"SELECT c.id, c.review_id, c.parent_comment_id, u.username, c.content, c.created_at
           FROM comments c
           JOIN users u ON c.user_id = u.id
           JOIN reviews r ON c.review_id = r.id
           WHERE r.pitch_id = ?
           ORDER BY c.created_at"#,
    )
    .bind(&pitch_id)
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    let review_count = reviews.len();
    let average_rating = if review_count == 0 {
        "No ratings yet".to_string()
    } else {
        let sum: i64 = reviews.iter().map(|review| review.rating).sum();
        format!("{:.1} / 5", sum as f64 / review_count as f64)
    };

    let mut threads = thread_comments(comments);
    let reviews = reviews
        .into_iter()
        .map(|review| ReviewView {
            comments: threads.remove(&review.id).unwrap_or_default(),
            id: review.id,
            username: review.username,
            stars: stars(review.rating),
            content: review.content,
            created_at: review.created_at,
        })
        .collect();

    Ok(render(PitchDetailTemplate {
        pitch: PitchCard::from(pitch),
        average_rating,
        review_count,
        reviews,
        is_admin: false,
    }))
}

fn stars(rating: i64) -> String {
    let filled = rating.clamp(0, 5) as usize;
    format!("{}{}", "★".repeat(filled), "☆".repeat(5 - filled))
}

/// Groups comments per review and flattens each reply tree depth-first, so
/// a reply always follows its parent. Input order (oldest first) is kept
/// among siblings.
pub fn thread_comments(rows: Vec<CommentRow>) -> HashMap<String, Vec<CommentView>> {
    let mut children: HashMap<Option<String>, Vec<CommentRow>> = HashMap::new();
    for row in rows {
        children.entry(row.parent_comment_id.clone()).or_default().push(row);
    }

    let mut threads: HashMap<String, Vec<CommentView>> = HashMap::new();
    let roots = children.remove(&None).unwrap_or_default();
    let mut stack: Vec<(CommentRow, usize)> = roots.into_iter().rev().map(|row| (row, 0)).collect();
    while let Some((row, indent)) = stack.pop() {
        if let Some(replies) = children.remove(&Some(row.id.clone())) {
            stack.extend(replies.into_iter().rev().map(|reply| (reply, indent + 1)));
        }
        threads.entry(row.review_id).or_default().push(CommentView {
            id: row.id,
            username: row.username,
            content: row.content,
            created_at: row.created_at,
            indent,
        });
    }
    threads
}

async fn pitch_slots(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<SlotQuery>,
) -> Result<HttpResponse> {
    let pitch_id = path.into_inner();
    let Ok(date) = parse_date(&query.date) else {
        return Ok(HttpResponse::BadRequest().json(json!({ "error": "invalid date" })));
    };
    if fetch_pitch(&state, &pitch_id).await.is_none() {
        return Ok(HttpResponse::NotFound().json(json!({ "error": "pitch not found" })));
    }

    let date = date.format("%Y-%m-%d").to_string();
    let rows = sqlx::query_as::<_, (String, String, String)>(
        "SELECT start_time, end_time, status FROM bookings WHERE pitch_id = ? AND booking_date = ? ORDER BY start_time",
    )
    .bind(&pitch_id)
    .bind(&date)
    .fetch_all(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    let taken: Vec<(String, String, String)> = rows
        .into_iter()
        .filter(|(_, _, status)| BookingStatus::parse(status).is_some_and(BookingStatus::holds_slot))
        .collect();

    // With a requested range, also answer whether it is free.
    let requested = match (query.start.as_deref(), query.end.as_deref()) {
        (Some(start), Some(end)) => parse_time(start).ok().zip(parse_time(end).ok()),
        _ => None,
    };
    let available = requested.map(|(start, end)| {
        !taken.iter().any(|(taken_start, taken_end, _)| {
            match (parse_time(taken_start), parse_time(taken_end)) {
                (Ok(taken_start), Ok(taken_end)) => overlaps(start, end, taken_start, taken_end),
                _ => false,
            }
        })
    });

    let taken: Vec<_> = taken
        .into_iter()
        .map(|(start, end, status)| json!({ "start": start, "end": end, "status": status }))
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "pitch_id": pitch_id,
        "date": date,
        "taken": taken,
        "available": available,
    })))
}

async fn book_redirect(path: web::Path<String>) -> HttpResponse {
    HttpResponse::Found()
        .append_header((header::LOCATION, format!("/account/book/{}", path.into_inner())))
        .finish()
}

async fn list_facilities(state: web::Data<AppState>) -> Result<HttpResponse> {
    let facilities = fetch_facilities(&state).await;
    Ok(render(FacilitiesTemplate {
        facilities,
        is_admin: false,
    }))
}

pub async fn fetch_facilities(state: &AppState) -> Vec<FacilityRow> {
    sqlx::query_as::<_, FacilityRow>(
        r#"SELECT f.id, f.name, f.address, f.description,
                  (SELECT COUNT(*) FROM pitches p WHERE p.facility_id = f.id) as pitch_count
           FROM facilities f
           ORDER BY f.name"#,
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default()
}

async fn show_sign_up() -> HttpResponse {
    render(SignUpTemplate {
        form: SignUpView::default(),
        errors: Vec::new(),
        is_admin: false,
    })
}

fn validate_sign_up(form: &SignUpForm) -> Vec<String> {
    let mut errors = Vec::new();
    let username = form.username.trim();
    if username.is_empty() {
        errors.push("Username is required.".to_string());
    } else if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-' | '@' | '+'))
    {
        errors.push("Username may only contain letters, digits and . _ - @ +".to_string());
    }
    let email = form.email.trim();
    let looks_like_email = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !looks_like_email {
        errors.push("A valid email address is required.".to_string());
    }
    if form.full_name.trim().is_empty() {
        errors.push("Full name is required.".to_string());
    }
    if form.password1.len() < 8 {
        errors.push("Password must be at least 8 characters.".to_string());
    }
    if form.password1 != form.password2 {
        errors.push("The two passwords do not match.".to_string());
    }
    errors
}

async fn sign_up(state: web::Data<AppState>, form: web::Form<SignUpForm>) -> Result<HttpResponse> {
    let form = form.into_inner();
    let mut errors = validate_sign_up(&form);

    if errors.is_empty() {
        let taken = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE username = ?")
            .bind(form.username.trim())
            .fetch_one(&state.db)
            .await
            .map_err(actix_web::error::ErrorInternalServerError)?;
        if taken > 0 {
            errors.push("That username is already taken.".to_string());
        }
    }

    if !errors.is_empty() {
        return Ok(render_with_status(
            StatusCode::BAD_REQUEST,
            SignUpTemplate {
                form: SignUpView {
                    username: form.username,
                    email: form.email,
                    full_name: form.full_name,
                    phone_number: form.phone_number.unwrap_or_default(),
                },
                errors,
                is_admin: false,
            },
        ));
    }

    let password_hash = hash_password(&form.password1)
        .map_err(|_| actix_web::error::ErrorInternalServerError("hash failure"))?;
    let user_id = new_id();
    let token = new_activation_token();
    let expiry = (Utc::now() + Duration::hours(state.config.activation_ttl_hours)).to_rfc3339();
    let now = now_rfc3339();
    let username = form.username.trim().to_string();
    let email = form.email.trim().to_string();

    sqlx::query(
        r#"INSERT INTO users
           (id, username, email, full_name, phone_number, role, password_hash,
            activation_token, activation_expiry, is_active, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)"#,
    )
    .bind(&user_id)
    .bind(&username)
    .bind(&email)
    .bind(form.full_name.trim())
    .bind(form.phone_number.unwrap_or_default().trim())
    .bind(Role::User.as_str())
    .bind(password_hash)
    .bind(&token)
    .bind(expiry)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    log_activity(
        &state.db,
        "user_signed_up",
        &format!("{username} signed up."),
        Some(&user_id),
        None,
    )
    .await;

    let link = format!("{}/activate/{token}", state.config.base_url.trim_end_matches('/'));
    let body = format!(
        "Hi {username},\n\nConfirm your account within {} hours: {link}\n",
        state.config.activation_ttl_hours
    );
    let message = match queue_email(&state.db, &email, "Activate your Pitchbook account", &body).await {
        Ok(()) => format!("We sent an activation link to {email}. Follow it to start booking."),
        Err(err) => {
            log::error!("Activation mail for {username} failed: {err}");
            "Your account was created but we could not send the activation email. Please contact support.".to_string()
        }
    };

    Ok(render(MessageTemplate::new("Check your inbox", &message)))
}

async fn activate(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let token = path.into_inner();
    let row = sqlx::query_as::<_, (String, Option<String>)>(
        "SELECT id, activation_expiry FROM users WHERE activation_token = ? LIMIT 1",
    )
    .bind(&token)
    .fetch_optional(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    let Some((user_id, expiry)) = row else {
        return Ok(render_with_status(
            StatusCode::NOT_FOUND,
            MessageTemplate::new("Invalid link", "This activation link is not valid."),
        ));
    };

    let expired = expiry
        .as_deref()
        .and_then(|value| chrono::DateTime::parse_from_rfc3339(value).ok())
        .is_some_and(|expiry| expiry < Utc::now());
    if expired {
        return Ok(render_with_status(
            StatusCode::GONE,
            MessageTemplate::new(
                "Link expired",
                "This activation link has expired. Please sign up again.",
            ),
        ));
    }

    sqlx::query(
        r#"UPDATE users SET is_active = 1, activation_token = NULL, activation_expiry = NULL, updated_at = ?
           WHERE id = ?"#,
    )
    .bind(now_rfc3339())
    .bind(&user_id)
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    log_activity(&state.db, "user_activated", "An account was activated.", Some(&user_id), None)
        .await;

    Ok(render(
        MessageTemplate::new("Account activated", "Your account is ready. Log in to book a pitch.")
            .with_link("/login", "Log in"),
    ))
}

pub fn not_found(message: &str) -> HttpResponse {
    render_with_status(StatusCode::NOT_FOUND, MessageTemplate::new("Not found", message))
}
