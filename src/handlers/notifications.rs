use actix_web::{HttpResponse, web};
use diesel::prelude::*;
use serde_json::json;

use crate::auth::AuthUser;
use crate::db::{self, DbPool};
use crate::error::{ApiError, ResultExt};
use crate::models::Notification;
use crate::response::{self, PageQuery};
use crate::schema::notifications;

// Handler to page through the caller's notifications, newest first
pub async fn list(
    pool: web::Data<DbPool>,
    user: AuthUser,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let page = query.resolve(20)?;

    let (rows, total) = db::run(&pool, move |conn| {
        let total: i64 = notifications::table
            .filter(notifications::user_id.eq(user.id))
            .count()
            .get_result(conn)?;
        let rows = notifications::table
            .filter(notifications::user_id.eq(user.id))
            .order(notifications::created_at.desc())
            .limit(page.limit)
            .offset(page.offset())
            .select(Notification::as_select())
            .load(conn)?;
        Ok((rows, total))
    })
    .await
    .context("Gagal mengambil notifikasi")?;

    Ok(response::ok(json!({
        "notifications": rows,
        "pagination": page.describe(total),
    })))
}

pub async fn unread_count(pool: web::Data<DbPool>, user: AuthUser) -> Result<HttpResponse, ApiError> {
    let count: i64 = db::run(&pool, move |conn| {
        Ok(notifications::table
            .filter(notifications::user_id.eq(user.id))
            .filter(notifications::is_read.eq(false))
            .count()
            .get_result(conn)?)
    })
    .await
    .context("Gagal mengambil jumlah notifikasi")?;

    Ok(response::ok(json!({ "unreadCount": count })))
}

pub async fn mark_read(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();

    let updated = db::run(&pool, move |conn| {
        Ok(diesel::update(
            notifications::table
                .find(id)
                .filter(notifications::user_id.eq(user.id)),
        )
        .set(notifications::is_read.eq(true))
        .execute(conn)?)
    })
    .await
    .context("Gagal menandai notifikasi")?;

    if updated == 0 {
        return Err(ApiError::not_found("Notifikasi tidak ditemukan"));
    }
    Ok(response::ok_message("Notifikasi telah dibaca"))
}

pub async fn mark_all_read(pool: web::Data<DbPool>, user: AuthUser) -> Result<HttpResponse, ApiError> {
    db::run(&pool, move |conn| {
        diesel::update(
            notifications::table
                .filter(notifications::user_id.eq(user.id))
                .filter(notifications::is_read.eq(false)),
        )
        .set(notifications::is_read.eq(true))
        .execute(conn)?;
        Ok(())
    })
    .await
    .context("Gagal menandai semua notifikasi")?;

    Ok(response::ok_message("Semua notifikasi telah dibaca"))
}
