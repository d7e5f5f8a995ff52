use actix_web::{HttpResponse, web};
use chrono::{Duration, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::audit::{self, AuditAction, ClientIp};
use crate::auth::AuthUser;
use crate::config::Config;
use crate::crypto::CryptoUtils;
use crate::db::{self, DbPool};
use crate::error::{ApiError, ResultExt};
use crate::models::{NewUser, NewUserSettings, User, UserProfile};
use crate::response;
use crate::schema::{user_settings, users};
use crate::validation::{
    Validator, blank_to_none, is_valid_email, is_valid_password, is_valid_phone, is_valid_role,
    is_valid_username, parse_date,
};

/// Account fields shared by self-registration and admin user creation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUserForm {
    pub username: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
    #[serde(alias = "full_name")]
    pub full_name: Option<String>,
    pub role: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    #[serde(alias = "date_of_birth")]
    pub date_of_birth: Option<String>,
}

impl NewUserForm {
    fn validate(&self) -> Result<(), ApiError> {
        Validator::new()
            .check(
                self.username.as_deref().is_some_and(is_valid_username),
                "username",
                "Username minimal 3 karakter dan hanya boleh berisi huruf, angka, dan underscore",
            )
            .check(
                self.password.as_deref().is_some_and(is_valid_password),
                "password",
                "Password minimal 6 karakter",
            )
            .check(
                self.email.as_deref().is_some_and(is_valid_email),
                "email",
                "Email tidak valid",
            )
            .required(self.full_name.as_deref(), "fullName", "Nama lengkap harus diisi")
            .check(
                self.role.as_deref().is_some_and(is_valid_role),
                "role",
                "Role tidak valid",
            )
            .optional(
                self.phone.as_deref().filter(|p| !p.is_empty()),
                is_valid_phone,
                "phone",
                "Format nomor telepon tidak valid",
            )
            .optional(
                self.date_of_birth.as_deref().filter(|d| !d.is_empty()),
                |d: &str| parse_date(d).is_some(),
                "dateOfBirth",
                "Format tanggal lahir tidak valid",
            )
            .finish()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedAccount {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
}

/// Validates, rejects duplicates, hashes and inserts a user together with
/// its default settings row.
pub fn create_account(
    conn: &mut PgConnection,
    form: NewUserForm,
    bcrypt_rounds: u32,
) -> Result<CreatedAccount, ApiError> {
    form.validate()?;

    let username = form.username.unwrap_or_default().trim().to_string();
    let email = form.email.unwrap_or_default().trim().to_string();

    let taken: bool = diesel::select(diesel::dsl::exists(
        users::table.filter(users::username.eq(&username).or(users::email.eq(&email))),
    ))
    .get_result(conn)?;
    if taken {
        return Err(ApiError::bad_request("Username atau email sudah terdaftar"));
    }

    let password = CryptoUtils::hash_password(&form.password.unwrap_or_default(), bcrypt_rounds)?;
    let new_user = NewUser {
        username,
        password,
        email,
        full_name: form.full_name.unwrap_or_default().trim().to_string(),
        role: form.role.unwrap_or_default(),
        phone: blank_to_none(form.phone),
        address: blank_to_none(form.address),
        date_of_birth: form.date_of_birth.as_deref().and_then(parse_date),
    };

    conn.transaction::<_, ApiError, _>(|conn| {
        let (id, username, email, full_name, role) = diesel::insert_into(users::table)
            .values(&new_user)
            .returning((users::id, users::username, users::email, users::full_name, users::role))
            .get_result::<(i32, String, String, String, String)>(conn)?;

        diesel::insert_into(user_settings::table)
            .values(&NewUserSettings { user_id: id })
            .on_conflict_do_nothing()
            .execute(conn)?;

        Ok(CreatedAccount {
            id,
            username,
            email,
            full_name,
            role,
        })
    })
}

// Handler to register a new account
pub async fn register(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    ip: ClientIp,
    body: web::Json<NewUserForm>,
) -> Result<HttpResponse, ApiError> {
    let form = body.into_inner();
    let rounds = config.bcrypt_rounds;

    let account = db::run(&pool, move |conn| {
        let account = create_account(conn, form, rounds)?;
        audit::record(conn, account.id, AuditAction::Register, "User baru terdaftar", &ip);
        Ok(account)
    })
    .await
    .context("Terjadi kesalahan saat registrasi")?;

    Ok(response::created("Registrasi berhasil", account))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    user: User,
    token: String,
    refresh_token: String,
}

// Handler to log in with a username or email
pub async fn login(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    ip: ClientIp,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let LoginRequest { username, password } = body.into_inner();
    let (Some(identifier), Some(password)) = (
        username.filter(|u| !u.trim().is_empty()),
        password.filter(|p| !p.is_empty()),
    ) else {
        return Err(ApiError::bad_request("Username dan password harus diisi"));
    };

    let user = db::run(&pool, move |conn| {
        let identifier = identifier.trim();
        let mut user = users::table
            .filter(users::username.eq(identifier).or(users::email.eq(identifier)))
            .select(User::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| ApiError::Unauthorized("Username atau password salah".into()))?;

        if !CryptoUtils::verify_password(&password, &user.password)? {
            return Err(ApiError::Unauthorized("Username atau password salah".into()));
        }
        if !user.is_active {
            return Err(ApiError::forbidden("Akun tidak aktif"));
        }

        let now = Utc::now().naive_utc();
        diesel::update(users::table.find(user.id))
            .set(users::last_login.eq(now))
            .execute(conn)?;
        user.last_login = Some(now);

        audit::record(conn, user.id, AuditAction::Login, "User login", &ip);
        Ok(user)
    })
    .await
    .context("Terjadi kesalahan saat login")?;

    let token = CryptoUtils::issue_access_token(
        user.id,
        &user.username,
        &user.role,
        &config.jwt_secret,
        Duration::hours(config.jwt_expires_hours),
    )?;
    let refresh_token = CryptoUtils::issue_refresh_token(
        user.id,
        &config.jwt_refresh_secret,
        Duration::days(config.jwt_refresh_expires_days),
    )?;

    Ok(response::ok_with(
        "Login berhasil",
        LoginResponse {
            user,
            token,
            refresh_token,
        },
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(alias = "refresh_token")]
    pub refresh_token: Option<String>,
}

// Handler to trade a refresh token for a new access token
pub async fn refresh(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    body: web::Json<RefreshRequest>,
) -> Result<HttpResponse, ApiError> {
    let token = body
        .into_inner()
        .refresh_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Refresh token tidak ditemukan".into()))?;

    let claims = CryptoUtils::verify_refresh_token(&token, &config.jwt_refresh_secret)
        .map_err(|_| ApiError::forbidden("Refresh token tidak valid"))?;

    let user_id = claims.user_id;
    let (username, role, is_active) = db::run(&pool, move |conn| {
        users::table
            .find(user_id)
            .select((users::username, users::role, users::is_active))
            .first::<(String, String, bool)>(conn)
            .optional()?
            .ok_or_else(|| ApiError::forbidden("User tidak ditemukan"))
    })
    .await
    .context("Terjadi kesalahan saat memperbarui token")?;

    if !is_active {
        return Err(ApiError::forbidden("Akun tidak aktif"));
    }

    let token = CryptoUtils::issue_access_token(
        user_id,
        &username,
        &role,
        &config.jwt_secret,
        Duration::hours(config.jwt_expires_hours),
    )?;

    Ok(response::ok_with("Token berhasil diperbarui", json!({ "token": token })))
}

// Handler to read the caller's profile
pub async fn profile(pool: web::Data<DbPool>, user: AuthUser) -> Result<HttpResponse, ApiError> {
    let profile = db::run(&pool, move |conn| {
        users::table
            .find(user.id)
            .select(UserProfile::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| ApiError::not_found("User tidak ditemukan"))
    })
    .await
    .context("Terjadi kesalahan saat mengambil profil")?;

    Ok(response::ok(profile))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: Option<String>,
    pub new_password: Option<String>,
}

// Handler to change the caller's password
pub async fn change_password(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    user: AuthUser,
    ip: ClientIp,
    body: web::Json<ChangePasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    let ChangePasswordRequest {
        old_password,
        new_password,
    } = body.into_inner();
    let (Some(old_password), Some(new_password)) = (
        old_password.filter(|p| !p.is_empty()),
        new_password.filter(|p| !p.is_empty()),
    ) else {
        return Err(ApiError::bad_request("Password lama dan baru harus diisi"));
    };

    Validator::new()
        .check(
            is_valid_password(&new_password),
            "newPassword",
            "Password baru minimal 6 karakter",
        )
        .finish()?;

    let rounds = config.bcrypt_rounds;
    db::run(&pool, move |conn| {
        let current: String = users::table
            .find(user.id)
            .select(users::password)
            .first(conn)
            .optional()?
            .ok_or_else(|| ApiError::not_found("User tidak ditemukan"))?;

        if !CryptoUtils::verify_password(&old_password, &current)? {
            return Err(ApiError::Unauthorized("Password lama salah".into()));
        }

        let hashed = CryptoUtils::hash_password(&new_password, rounds)?;
        diesel::update(users::table.find(user.id))
            .set((
                users::password.eq(hashed),
                users::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;

        audit::record(conn, user.id, AuditAction::UpdatePassword, "Password diubah", &ip);
        Ok(())
    })
    .await
    .context("Terjadi kesalahan saat mengubah password")?;

    Ok(response::ok_message("Password berhasil diubah"))
}

// Handler to log out; tokens are discarded client-side
pub async fn logout(
    pool: web::Data<DbPool>,
    user: AuthUser,
    ip: ClientIp,
) -> Result<HttpResponse, ApiError> {
    db::run(&pool, move |conn| {
        audit::record(conn, user.id, AuditAction::Logout, "User logout", &ip);
        Ok(())
    })
    .await
    .context("Terjadi kesalahan saat logout")?;

    Ok(response::ok_message("Logout berhasil"))
}

fn availability(is_available: bool) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "success": true,
        "isAvailable": is_available,
    }))
}

pub async fn check_username(
    pool: web::Data<DbPool>,
    username: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let username = username.into_inner();
    let taken: bool = db::run(&pool, move |conn| {
        diesel::select(diesel::dsl::exists(
            users::table.filter(users::username.eq(username)),
        ))
        .get_result(conn)
        .map_err(ApiError::from)
    })
    .await
    .context("Terjadi kesalahan saat memeriksa username")?;

    Ok(availability(!taken))
}

pub async fn check_email(
    pool: web::Data<DbPool>,
    email: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let email = email.into_inner();
    let taken: bool = db::run(&pool, move |conn| {
        diesel::select(diesel::dsl::exists(users::table.filter(users::email.eq(email))))
            .get_result(conn)
            .map_err(ApiError::from)
    })
    .await
    .context("Terjadi kesalahan saat memeriksa email")?;

    Ok(availability(!taken))
}

#[cfg(test)]
mod tests {
    use actix_web::test as actix_test;
    use actix_web::{App, http::StatusCode};

    use super::*;
    use crate::error::FieldError;

    fn form(json: serde_json::Value) -> NewUserForm {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn registration_form_accepts_snake_and_camel_names() {
        let camel = form(json!({"fullName": "Siti", "dateOfBirth": "1950-01-02"}));
        let snake = form(json!({"full_name": "Siti", "date_of_birth": "1950-01-02"}));
        assert_eq!(camel.full_name, snake.full_name);
        assert_eq!(camel.date_of_birth, snake.date_of_birth);
    }

    #[test]
    fn registration_form_reports_each_bad_field() {
        let bad = form(json!({
            "username": "a b",
            "password": "123",
            "email": "nope",
            "fullName": "",
            "role": "superuser",
            "phone": "555",
        }));

        let Err(ApiError::Validation(errors)) = bad.validate() else {
            panic!("expected validation failure");
        };
        let fields: Vec<&str> = errors.iter().map(|e: &FieldError| e.field.as_str()).collect();
        assert_eq!(fields, ["username", "password", "email", "fullName", "role", "phone"]);
    }

    #[test]
    fn registration_form_accepts_minimal_account() {
        let ok = form(json!({
            "username": "budi_01",
            "password": "rahasia",
            "email": "budi@example.com",
            "fullName": "Budi",
            "role": "family",
            "phone": "",
        }));
        assert!(ok.validate().is_ok());
    }

    #[actix_web::test]
    async fn login_requires_both_fields() {
        let pool = crate::db::build_pool("postgres://localhost/unused", 1).unwrap();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(pool))
                .app_data(web::Data::new(Config::for_tests()))
                .route("/login", web::post().to(login)),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/login")
            .set_json(json!({"username": "budi"}))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["message"], "Username dan password harus diisi");
    }
}
