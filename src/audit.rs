use actix_web::{FromRequest, HttpRequest, dev::Payload};
use diesel::prelude::*;
use futures::future::{Ready, ready};
use tracing::warn;

use crate::db;
use crate::models::NewActivityLog;
use crate::schema::activity_logs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Register,
    Login,
    Logout,
    UpdatePassword,
    UpdateProfile,
    CreateUser,
    UpdateUser,
    DeleteUser,
    ResetPassword,
    LinkElderly,
    GenerateReport,
    DeleteReport,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Register => "REGISTER",
            AuditAction::Login => "LOGIN",
            AuditAction::Logout => "LOGOUT",
            AuditAction::UpdatePassword => "UPDATE_PASSWORD",
            AuditAction::UpdateProfile => "UPDATE_PROFILE",
            AuditAction::CreateUser => "CREATE_USER",
            AuditAction::UpdateUser => "UPDATE_USER",
            AuditAction::DeleteUser => "DELETE_USER",
            AuditAction::ResetPassword => "RESET_PASSWORD",
            AuditAction::LinkElderly => "LINK_ELDERLY",
            AuditAction::GenerateReport => "GENERATE_REPORT",
            AuditAction::DeleteReport => "DELETE_REPORT",
        }
    }
}

/// Peer address of the request, honouring `X-Forwarded-For`.
#[derive(Debug, Clone, Default)]
pub struct ClientIp(pub Option<String>);

impl ClientIp {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl FromRequest for ClientIp {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let ip = req
            .connection_info()
            .realip_remote_addr()
            .map(str::to_string);
        ready(Ok(ClientIp(ip)))
    }
}

/// Appends to `activity_logs`. An audit failure never fails the operation
/// that triggered it.
pub fn record(
    conn: &mut PgConnection,
    user_id: i32,
    action: AuditAction,
    description: &str,
    ip: &ClientIp,
) {
    let entry = NewActivityLog {
        user_id,
        action: action.as_str(),
        description: Some(description),
        ip_address: ip.as_deref(),
        created_at: db::utc_now(),
    };

    if let Err(e) = diesel::insert_into(activity_logs::table)
        .values(&entry)
        .execute(conn)
    {
        warn!(error = %e, user_id, action = action.as_str(), "failed to write audit log");
    }
}

#[cfg(test)]
mod tests {
    use actix_web::test::TestRequest;

    use super::*;

    #[test]
    fn action_names_are_upper_snake_case() {
        assert_eq!(AuditAction::UpdatePassword.as_str(), "UPDATE_PASSWORD");
        assert_eq!(AuditAction::DeleteReport.as_str(), "DELETE_REPORT");
    }

    #[actix_web::test]
    async fn client_ip_prefers_forwarded_header() {
        let req = TestRequest::default()
            .insert_header(("X-Forwarded-For", "10.0.0.7"))
            .to_http_request();
        let ip = ClientIp::extract(&req).await.unwrap();
        assert_eq!(ip.as_deref(), Some("10.0.0.7"));
    }
}
