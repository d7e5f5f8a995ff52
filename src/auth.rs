use std::fmt;
use std::str::FromStr;

use actix_web::{FromRequest, HttpRequest, dev::Payload, http::header, web};
use anyhow::anyhow;
use diesel::prelude::*;
use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::crypto::CryptoUtils;
use crate::db::{self, DbPool};
use crate::error::ApiError;
use crate::models::SessionUser;
use crate::schema::{family_elderly_relations, users};

pub const NO_ROLE_ACCESS: &str = "Anda tidak memiliki akses ke resource ini";
pub const NO_DATA_ACCESS: &str = "Anda tidak memiliki akses ke data ini";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Family,
    Elderly,
    Medical,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Family => "family",
            Role::Elderly => "elderly",
            Role::Medical => "medical",
        }
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "family" => Ok(Role::Family),
            "elderly" => Ok(Role::Elderly),
            "medical" => Ok(Role::Medical),
            other => Err(anyhow!("unknown role: {other}")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The caller behind a verified bearer token, loaded fresh from `users`.
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is(&self, role: Role) -> bool {
        self.role == role
    }

    /// Role gate for a route.
    pub fn require(&self, allowed: &[Role]) -> Result<(), ApiError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(ApiError::forbidden(NO_ROLE_ACCESS))
        }
    }
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let token = bearer_token(req);
        let config = req.app_data::<web::Data<Config>>().cloned();
        let pool = req.app_data::<web::Data<DbPool>>().cloned();

        Box::pin(async move {
            let token = token.ok_or_else(|| ApiError::Unauthorized("Token tidak ditemukan".into()))?;
            let config = config.ok_or_else(|| anyhow!("Config is not registered as app data"))?;

            let claims = CryptoUtils::verify_access_token(&token, &config.jwt_secret).map_err(|e| {
                debug!(error = %e, "rejected bearer token");
                ApiError::forbidden("Token tidak valid")
            })?;

            let pool = pool.ok_or_else(|| anyhow!("Database pool is not registered as app data"))?;
            let user_id = claims.user_id;
            let user = db::run(&pool, move |conn| {
                users::table
                    .find(user_id)
                    .select(SessionUser::as_select())
                    .first(conn)
                    .optional()
                    .map_err(ApiError::from)
            })
            .await?
            .ok_or_else(|| ApiError::forbidden("User tidak ditemukan"))?;

            if !user.is_active {
                return Err(ApiError::forbidden("Akun tidak aktif"));
            }

            let role = user
                .role
                .parse::<Role>()
                .map_err(|_| ApiError::forbidden("Token tidak valid"))?;

            Ok(AuthUser {
                id: user.id,
                username: user.username,
                email: user.email,
                full_name: user.full_name,
                role,
            })
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElderlyAccess {
    Granted,
    Denied,
    RequiresRelation,
}

/// Decides what a caller may see of an elderly user's data before touching
/// the relation table. Medical staff are not scoped to assignments.
pub fn elderly_access(user_id: i32, role: Role, elderly_id: i32) -> ElderlyAccess {
    match role {
        Role::Admin | Role::Medical => ElderlyAccess::Granted,
        Role::Elderly if user_id == elderly_id => ElderlyAccess::Granted,
        Role::Elderly => ElderlyAccess::Denied,
        Role::Family => ElderlyAccess::RequiresRelation,
    }
}

pub fn is_family_of(conn: &mut PgConnection, family_id: i32, elderly_id: i32) -> QueryResult<bool> {
    diesel::select(diesel::dsl::exists(
        family_elderly_relations::table
            .filter(family_elderly_relations::family_user_id.eq(family_id))
            .filter(family_elderly_relations::elderly_user_id.eq(elderly_id)),
    ))
    .get_result(conn)
}

/// Settles `access` first and runs `load` only when it is granted, so a
/// caller without access gets 403 whether or not the record exists.
pub fn guard_elderly<C, T>(
    conn: &mut C,
    access: ElderlyAccess,
    related: impl FnOnce(&mut C) -> QueryResult<bool>,
    load: impl FnOnce(&mut C) -> Result<T, ApiError>,
) -> Result<T, ApiError> {
    let allowed = match access {
        ElderlyAccess::Granted => true,
        ElderlyAccess::Denied => false,
        ElderlyAccess::RequiresRelation => related(conn)?,
    };

    if allowed {
        load(conn)
    } else {
        Err(ApiError::forbidden(NO_DATA_ACCESS))
    }
}

pub fn authorize_elderly_access(
    conn: &mut PgConnection,
    user: &AuthUser,
    elderly_id: i32,
) -> Result<(), ApiError> {
    guard_elderly(
        conn,
        elderly_access(user.id, user.role, elderly_id),
        |conn| is_family_of(conn, user.id, elderly_id),
        |_| Ok(()),
    )
}

/// Profile visibility: self, admin, medical staff, or either side of a
/// family link.
pub fn can_view_user(conn: &mut PgConnection, viewer: &AuthUser, target_id: i32) -> QueryResult<bool> {
    if viewer.id == target_id || viewer.is(Role::Admin) || viewer.is(Role::Medical) {
        return Ok(true);
    }
    match viewer.role {
        Role::Family => is_family_of(conn, viewer.id, target_id),
        Role::Elderly => is_family_of(conn, target_id, viewer.id),
        _ => Ok(false),
    }
}

/// Owner of a record, an admin, or family linked to the owner.
pub fn authorize_owner_or_family(
    conn: &mut PgConnection,
    user: &AuthUser,
    owner_id: i32,
) -> Result<(), ApiError> {
    let allowed = user.id == owner_id
        || user.is(Role::Admin)
        || (user.is(Role::Family) && is_family_of(conn, user.id, owner_id)?);

    if allowed {
        Ok(())
    } else {
        Err(ApiError::forbidden(NO_DATA_ACCESS))
    }
}

/// Elderly id taken from a body field; absent or non-positive ids are a
/// client error.
pub fn require_elderly_id(id: Option<i32>) -> Result<i32, ApiError> {
    id.filter(|id| *id > 0)
        .ok_or_else(|| ApiError::bad_request("Elderly ID diperlukan"))
}

#[cfg(test)]
mod tests {
    use actix_web::test as actix_test;
    use actix_web::{HttpResponse, ResponseError, http::StatusCode};
    use chrono::Duration;

    use super::*;

    #[test]
    fn roles_parse_from_lowercase() {
        assert_eq!("medical".parse::<Role>().unwrap(), Role::Medical);
        assert!("Admin".parse::<Role>().is_err());
        assert_eq!(Role::Elderly.to_string(), "elderly");
    }

    #[test]
    fn access_matrix() {
        assert_eq!(elderly_access(1, Role::Admin, 9), ElderlyAccess::Granted);
        assert_eq!(elderly_access(2, Role::Medical, 9), ElderlyAccess::Granted);
        assert_eq!(elderly_access(9, Role::Elderly, 9), ElderlyAccess::Granted);
        assert_eq!(elderly_access(8, Role::Elderly, 9), ElderlyAccess::Denied);
        assert_eq!(elderly_access(3, Role::Family, 9), ElderlyAccess::RequiresRelation);
    }

    fn guarded(access: ElderlyAccess, linked: bool, exists: bool) -> (Result<(), ApiError>, Vec<&'static str>) {
        let mut calls = Vec::new();
        let result = guard_elderly(
            &mut calls,
            access,
            |calls| {
                calls.push("relation");
                Ok(linked)
            },
            |calls| {
                calls.push("lookup");
                if exists {
                    Ok(())
                } else {
                    Err(ApiError::not_found("Lansia tidak ditemukan"))
                }
            },
        );
        (result, calls)
    }

    #[test]
    fn unlinked_callers_cannot_tell_which_ids_exist() {
        for exists in [true, false] {
            let (result, calls) = guarded(ElderlyAccess::RequiresRelation, false, exists);
            assert!(matches!(result, Err(ApiError::Forbidden(_))));
            assert_eq!(calls, ["relation"]);

            let (result, calls) = guarded(ElderlyAccess::Denied, false, exists);
            assert!(matches!(result, Err(ApiError::Forbidden(_))));
            assert!(calls.is_empty());
        }
    }

    #[test]
    fn permitted_callers_see_missing_ids_as_not_found() {
        let (result, calls) = guarded(ElderlyAccess::RequiresRelation, true, false);
        assert!(matches!(result, Err(ApiError::NotFound(_))));
        assert_eq!(calls, ["relation", "lookup"]);

        let (result, calls) = guarded(ElderlyAccess::Granted, false, true);
        assert!(result.is_ok());
        assert_eq!(calls, ["lookup"]);
    }

    fn user(role: Role) -> AuthUser {
        AuthUser {
            id: 5,
            username: "tester".into(),
            email: "tester@example.com".into(),
            full_name: "Tester".into(),
            role,
        }
    }

    #[test]
    fn role_gate() {
        assert!(user(Role::Admin).require(&[Role::Admin, Role::Medical]).is_ok());

        let err = user(Role::Family)
            .require(&[Role::Admin, Role::Medical])
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(err.to_string(), NO_ROLE_ACCESS);
    }

    #[test]
    fn elderly_id_must_be_present() {
        assert_eq!(require_elderly_id(Some(4)).unwrap(), 4);
        let err = require_elderly_id(None).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(require_elderly_id(Some(0)).is_err());
    }

    async fn whoami(user: AuthUser) -> HttpResponse {
        HttpResponse::Ok().body(user.username)
    }

    #[actix_web::test]
    async fn missing_token_is_unauthorized() {
        let app = actix_test::init_service(
            actix_web::App::new()
                .app_data(web::Data::new(Config::for_tests()))
                .route("/me", web::get().to(whoami)),
        )
        .await;

        let req = actix_test::TestRequest::get().uri("/me").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Token tidak ditemukan");
    }

    #[actix_web::test]
    async fn invalid_token_is_forbidden() {
        let app = actix_test::init_service(
            actix_web::App::new()
                .app_data(web::Data::new(Config::for_tests()))
                .route("/me", web::get().to(whoami)),
        )
        .await;

        let forged =
            CryptoUtils::issue_access_token(1, "admin", "admin", "other-secret", Duration::hours(1))
                .unwrap();
        for token in ["garbage", forged.as_str()] {
            let req = actix_test::TestRequest::get()
                .uri("/me")
                .insert_header((header::AUTHORIZATION, format!("Bearer {token}")))
                .to_request();
            let resp = actix_test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::FORBIDDEN);

            let body: serde_json::Value = actix_test::read_body_json(resp).await;
            assert_eq!(body["message"], "Token tidak valid");
        }
    }

    #[actix_web::test]
    async fn non_bearer_scheme_counts_as_missing() {
        let app = actix_test::init_service(
            actix_web::App::new()
                .app_data(web::Data::new(Config::for_tests()))
                .route("/me", web::get().to(whoami)),
        )
        .await;

        let req = actix_test::TestRequest::get()
            .uri("/me")
            .insert_header((header::AUTHORIZATION, "Basic YWRtaW46YWRtaW4="))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
