use actix_web::{
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    error::ErrorUnauthorized,
    http::{header, header::HeaderValue, StatusCode},
    middleware::Next,
    web, Error, HttpMessage, HttpRequest, HttpResponse,
};
use actix_web::cookie::{Cookie, SameSite, time::Duration};
use actix_web_httpauth::extractors::basic::BasicAuth;
use askama::Template;
use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand_core::OsRng;
use uuid::Uuid;

use crate::{
    models::{Role, UserRow},
    state::AppState,
    templates::render_with_status,
};

pub const AUTH_REALM: &str = "Pitchbook";
const LOGOUT_COOKIE: &str = "pb_logged_out";

#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Only regular members may book or review; guests browse.
    pub fn can_book(&self) -> bool {
        self.role == Role::User
    }
}

pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, password_hash: &str) -> bool {
    let parsed_hash = PasswordHash::new(password_hash);
    match parsed_hash {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

async fn authenticate(req: &ServiceRequest, credentials: &BasicAuth) -> Result<AuthUser, Error> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| ErrorUnauthorized("Unauthorized"))?;
    let username = credentials.user_id();
    let password = credentials.password().unwrap_or_default();
    authenticate_credentials(&state, username, password)
        .await
        .ok_or_else(|| ErrorUnauthorized("Unauthorized"))
}

/// Inactive accounts (not yet activated, or disabled by an admin) never
/// authenticate.
pub async fn authenticate_credentials(
    state: &AppState,
    username: &str,
    password: &str,
) -> Option<AuthUser> {
    let user = sqlx::query_as::<_, UserRow>(
        r#"SELECT id, username, email, full_name, phone_number, role, password_hash,
                  activation_token, activation_expiry, is_active, created_at
           FROM users
           WHERE username = ? AND is_active = 1
           LIMIT 1"#,
    )
    .bind(username)
    .fetch_optional(&state.db)
    .await
    .map_err(|err| log::error!("User lookup failed: {err}"))
    .ok()??;

    if !verify_password(password, &user.password_hash) {
        return None;
    }

    let role = Role::parse(&user.role)?;
    let display_name = if user.full_name.trim().is_empty() {
        user.username.clone()
    } else {
        user.full_name
    };

    Some(AuthUser {
        id: user.id,
        username: user.username,
        display_name,
        role,
    })
}

pub async fn basic_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    match authenticate(&req, &credentials).await {
        Ok(user) => {
            req.extensions_mut().insert(user);
            Ok(req)
        }
        Err(err) => Err((err, req)),
    }
}

pub async fn admin_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    match authenticate(&req, &credentials).await {
        Ok(user) => {
            if !user.is_admin() {
                return Err((ErrorUnauthorized("Admin access required"), req));
            }
            req.extensions_mut().insert(user);
            Ok(req)
        }
        Err(err) => Err((err, req)),
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn new_activation_token() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn logout_cookie(req: &HttpRequest) -> Cookie<'static> {
    let mut builder = Cookie::build(LOGOUT_COOKIE, "1")
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::days(365));
    if req.connection_info().scheme() == "https" {
        builder = builder.secure(true);
    }
    builder.finish()
}

pub fn clear_logout_cookie(req: &HttpRequest) -> Cookie<'static> {
    let mut builder = Cookie::build(LOGOUT_COOKIE, "")
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::seconds(0));
    if req.connection_info().scheme() == "https" {
        builder = builder.secure(true);
    }
    builder.finish()
}

pub fn is_logged_out(req: &HttpRequest) -> bool {
    req.cookie(LOGOUT_COOKIE).is_some()
}

#[derive(Template)]
#[template(path = "logged_out.html")]
struct LoggedOutTemplate {
    login_url: String,
    is_admin: bool,
}

pub async fn logout_guard<B>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<BoxBody>, Error>
where
    B: actix_web::body::MessageBody + 'static,
{
    if is_logged_out(req.request()) {
        let path = req.path();
        let login_target = if path.starts_with("/account") {
            "/account/dashboard"
        } else {
            "/admin/dashboard"
        };
        let mut response = render_with_status(
            StatusCode::UNAUTHORIZED,
            LoggedOutTemplate {
                login_url: format!("/login?next={login_target}"),
                is_admin: false,
            },
        );
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        return Ok(req.into_response(response));
    }

    let res = next.call(req).await?;
    Ok(res.map_into_boxed_body())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn password_hashes_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("correct horse", "not-a-hash"));
    }

    #[actix_web::test]
    async fn inactive_accounts_cannot_authenticate() {
        let state = testing::state().await;
        testing::create_user(&state.db, "sam", "secret-pass", Role::User, false).await;
        testing::create_user(&state.db, "kim", "secret-pass", Role::Guest, true).await;

        assert!(authenticate_credentials(&state, "sam", "secret-pass").await.is_none());

        let kim = authenticate_credentials(&state, "kim", "secret-pass").await.unwrap();
        assert_eq!(kim.role, Role::Guest);
        assert!(!kim.can_book());
        assert!(authenticate_credentials(&state, "kim", "nope").await.is_none());
    }

    #[actix_web::test]
    async fn logged_out_cookie_blocks_the_member_area() {
        use actix_web::{cookie::Cookie, test as web_test, App};

        let state = testing::state().await;
        testing::create_user(&state.db, "sam", "secret-pass", Role::User, true).await;
        let app = web_test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(crate::routes::configure),
        )
        .await;

        let req = web_test::TestRequest::get()
            .uri("/account/dashboard")
            .insert_header(testing::basic_auth("sam", "secret-pass"))
            .cookie(Cookie::new(LOGOUT_COOKIE, "1"))
            .to_request();
        let resp = web_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            resp.headers().get(header::CACHE_CONTROL).unwrap().to_str().unwrap(),
            "no-store"
        );
        let body = web_test::read_body(resp).await;
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("/login?next=/account/dashboard"));
    }
}
