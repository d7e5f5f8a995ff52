use actix_web::{Error, web};
use tracing::debug;

use crate::error::ApiError;
use crate::handlers::{
    self, appointments, auth, chats, health, medicines, monitoring, notifications, reports, users,
};

fn rejected(kind: &str, err: impl std::fmt::Display) -> Error {
    debug!(error = %err, kind, "rejected request input");
    ApiError::bad_request(format!("{kind} tidak valid")).into()
}

/// Extractor settings so malformed input answers with the usual error body.
pub fn extractor_config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .limit(1 << 20)
            .error_handler(|err, _| rejected("Data JSON", err)),
    )
    .app_data(web::PathConfig::default().error_handler(|err, _| rejected("Parameter URL", err)))
    .app_data(web::QueryConfig::default().error_handler(|err, _| rejected("Parameter query", err)));
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(handlers::health_check)).service(
        web::scope("/api")
            .route("", web::get().to(handlers::api_info))
            .service(auth_scope())
            .service(users_scope())
            .service(monitoring_scope())
            .service(medicines_scope())
            .service(health_scope())
            .service(appointments_scope())
            .service(chats_scope())
            .service(reports_scope())
            .service(notifications_scope()),
    );
}

fn auth_scope() -> actix_web::Scope {
    web::scope("/auth")
        .route("/register", web::post().to(auth::register))
        .route("/login", web::post().to(auth::login))
        .route("/refresh", web::post().to(auth::refresh))
        .route("/profile", web::get().to(auth::profile))
        .route("/password", web::put().to(auth::change_password))
        .route("/logout", web::post().to(auth::logout))
        .route("/check-username/{username}", web::get().to(auth::check_username))
        .route("/check-email/{email}", web::get().to(auth::check_email))
}

// Fixed segments are registered before the `{id}` catch-alls.
fn users_scope() -> actix_web::Scope {
    web::scope("/users")
        .route("", web::get().to(users::list_users))
        .route("", web::post().to(users::create_user))
        .route("/statistics", web::get().to(users::user_statistics))
        .route("/me", web::get().to(users::my_profile))
        .route("/me", web::put().to(users::update_my_profile))
        .route("/me/export", web::get().to(users::export_my_data))
        .route("/preferences", web::get().to(users::get_preferences))
        .route("/preferences", web::put().to(users::update_preferences))
        .route("/my-elderly", web::get().to(users::my_elderly))
        .route("/link-elderly", web::post().to(users::link_elderly))
        .route("/emergency-contacts/{id}", web::put().to(users::update_emergency_contact))
        .route("/emergency-contacts/{id}", web::delete().to(users::delete_emergency_contact))
        .route("/{id}", web::get().to(users::get_user))
        .route("/{id}", web::put().to(users::update_user))
        .route("/{id}", web::delete().to(users::delete_user))
        .route("/{id}/statistics", web::get().to(users::user_detail_statistics))
        .route("/{id}/activities", web::get().to(users::user_activities))
        .route("/{id}/reset-password", web::post().to(users::reset_password))
        .route("/{id}/emergency-contacts", web::get().to(users::list_emergency_contacts))
        .route("/{id}/emergency-contacts", web::post().to(users::add_emergency_contact))
}

fn monitoring_scope() -> actix_web::Scope {
    web::scope("/monitoring")
        .route("/elderly-list", web::get().to(monitoring::elderly_list))
        .route("/elderly/{id}", web::get().to(monitoring::elderly_detail))
        .route("/elderly/{id}/vitals", web::post().to(monitoring::add_vitals))
        .route("/elderly/{id}/health-history", web::get().to(monitoring::health_history))
        .route("/elderly/{id}/activities", web::get().to(monitoring::list_activities))
        .route("/elderly/{id}/activities", web::post().to(monitoring::add_activity))
        .route("/elderly/{id}/medications", web::post().to(monitoring::add_medication))
        .route("/medications/{id}/log", web::post().to(monitoring::log_medication))
        .route("/alerts", web::post().to(monitoring::create_alert))
        .route("/alerts/{id}/dismiss", web::put().to(monitoring::dismiss_alert))
        .route("/summary", web::get().to(monitoring::summary))
}

fn medicines_scope() -> actix_web::Scope {
    web::scope("/medicines")
        .route("", web::post().to(medicines::create_medicine))
        .route("/user/{id}", web::get().to(medicines::list_for_user))
        .route("/{id}", web::put().to(medicines::update_medicine))
        .route("/{id}", web::delete().to(medicines::delete_medicine))
        .route("/{id}/log", web::post().to(medicines::log_medicine))
        .route("/{id}/logs", web::get().to(medicines::list_logs))
}

fn health_scope() -> actix_web::Scope {
    web::scope("/health")
        .route("", web::post().to(health::add_record))
        .route("/user/{id}", web::get().to(health::list_records))
        .route("/stats/{id}", web::get().to(health::stats))
        .route("/latest/{id}", web::get().to(health::latest))
}

fn appointments_scope() -> actix_web::Scope {
    web::scope("/appointments")
        .route("", web::post().to(appointments::create_appointment))
        .route("/user/{id}", web::get().to(appointments::list_for_user))
        .route("/upcoming/{id}", web::get().to(appointments::upcoming))
        .route("/{id}", web::put().to(appointments::update_appointment))
        .route("/{id}", web::delete().to(appointments::cancel_appointment))
}

fn chats_scope() -> actix_web::Scope {
    web::scope("/chats")
        .route("/conversations", web::get().to(chats::conversations))
        .route("/messages/{id}", web::get().to(chats::messages))
        .route("/send", web::post().to(chats::send))
        .route("/read/{id}", web::put().to(chats::mark_read))
}

fn reports_scope() -> actix_web::Scope {
    web::scope("/reports")
        .route("", web::get().to(reports::list_reports))
        .route("/generate/overall", web::post().to(reports::generate_overall))
        .route("/statistics", web::get().to(reports::statistics))
        .route("/{id}", web::get().to(reports::get_report))
        .route("/{id}", web::delete().to(reports::delete_report))
}

fn notifications_scope() -> actix_web::Scope {
    web::scope("/notifications")
        .route("", web::get().to(notifications::list))
        .route("/unread-count", web::get().to(notifications::unread_count))
        .route("/read-all", web::put().to(notifications::mark_all_read))
        .route("/{id}/read", web::put().to(notifications::mark_read))
}

#[cfg(test)]
mod tests {
    use actix_web::test as actix_test;
    use actix_web::{App, http::StatusCode};
    use serde_json::Value;

    use super::*;
    use crate::config::Config;
    use crate::db;

    // The pool opens no connections until a handler asks for one.
    fn app_state() -> (web::Data<Config>, web::Data<db::DbPool>) {
        let config = Config::for_tests();
        let pool = db::build_pool(&config.database_url, 1).unwrap();
        (web::Data::new(config), web::Data::new(pool))
    }

    #[actix_web::test]
    async fn health_and_info_need_no_database() {
        let app = actix_test::init_service(App::new().configure(configure)).await;

        let res = actix_test::call_service(&app, actix_test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = actix_test::read_body_json(res).await;
        assert_eq!(body["status"], "OK");

        let res = actix_test::call_service(&app, actix_test::TestRequest::get().uri("/api").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = actix_test::read_body_json(res).await;
        assert_eq!(body["success"], true);
    }

    #[actix_web::test]
    async fn protected_routes_require_a_token() {
        let (config, pool) = app_state();
        let app = actix_test::init_service(
            App::new()
                .app_data(config)
                .app_data(pool)
                .configure(configure),
        )
        .await;

        for uri in ["/api/users/me", "/api/monitoring/summary", "/api/notifications/unread-count"] {
            let res = actix_test::call_service(&app, actix_test::TestRequest::get().uri(uri).to_request()).await;
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{uri}");
            let body: Value = actix_test::read_body_json(res).await;
            assert_eq!(body["message"], "Token tidak ditemukan");
        }
    }

    #[actix_web::test]
    async fn invalid_tokens_are_forbidden() {
        let (config, pool) = app_state();
        let app = actix_test::init_service(
            App::new()
                .app_data(config)
                .app_data(pool)
                .configure(configure),
        )
        .await;

        let req = actix_test::TestRequest::get()
            .uri("/api/chats/conversations")
            .insert_header(("authorization", "Bearer not-a-jwt"))
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn malformed_json_is_a_bad_request() {
        let (config, pool) = app_state();
        let app = actix_test::init_service(
            App::new()
                .app_data(config)
                .app_data(pool)
                .configure(extractor_config)
                .configure(configure),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/api/auth/login")
            .insert_header(("content-type", "application/json"))
            .set_payload("{not json")
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: Value = actix_test::read_body_json(res).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Data JSON tidak valid");
    }

    #[actix_web::test]
    async fn unknown_paths_are_not_routed() {
        let app = actix_test::init_service(
            App::new()
                .configure(configure)
                .default_service(web::to(handlers::not_found)),
        )
        .await;

        let res = actix_test::call_service(&app, actix_test::TestRequest::get().uri("/api/nope").to_request()).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body: Value = actix_test::read_body_json(res).await;
        assert_eq!(body["message"], "Endpoint tidak ditemukan");
    }
}
