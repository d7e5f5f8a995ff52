use actix_web::{HttpResponse, web};
use chrono::NaiveDateTime;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Bool, Int4, Nullable, Text, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::auth::AuthUser;
use crate::db::{self, DbPool};
use crate::error::{ApiError, ResultExt};
use crate::models::{ChatMessage, NewChatMessage};
use crate::response::{self, PageQuery};
use crate::schema::{chats, users};
use crate::validation::Validator;

pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// Latest message exchanged with one counterpart.
#[derive(Debug, Serialize, QueryableByName)]
#[serde(rename_all = "camelCase")]
struct Conversation {
    #[diesel(sql_type = Int4)]
    user_id: i32,
    #[diesel(sql_type = Text)]
    full_name: String,
    #[diesel(sql_type = Text)]
    role: String,
    #[diesel(sql_type = Nullable<Text>)]
    profile_image: Option<String>,
    #[diesel(sql_type = Text)]
    last_message: String,
    #[diesel(sql_type = Timestamp)]
    last_message_at: NaiveDateTime,
    #[diesel(sql_type = Bool)]
    last_message_mine: bool,
    #[diesel(sql_type = BigInt)]
    unread_count: i64,
}

// Handler listing one entry per counterpart with the unread count
pub async fn conversations(pool: web::Data<DbPool>, user: AuthUser) -> Result<HttpResponse, ApiError> {
    let rows = db::run(&pool, move |conn| {
        Ok(diesel::sql_query(
            "SELECT u.id AS user_id, u.full_name, u.role, u.profile_image, \
                    latest.message AS last_message, latest.created_at AS last_message_at, \
                    latest.sender_id = $1 AS last_message_mine, \
                    (SELECT COUNT(*) FROM chats unread \
                     WHERE unread.sender_id = u.id AND unread.receiver_id = $1 \
                       AND unread.is_read = FALSE) AS unread_count \
             FROM ( \
                 SELECT DISTINCT ON (counterpart) c.*, \
                        CASE WHEN c.sender_id = $1 THEN c.receiver_id ELSE c.sender_id END AS counterpart \
                 FROM chats c \
                 WHERE c.sender_id = $1 OR c.receiver_id = $1 \
                 ORDER BY counterpart, c.created_at DESC, c.id DESC \
             ) latest \
             JOIN users u ON u.id = latest.counterpart \
             ORDER BY latest.created_at DESC",
        )
        .bind::<Int4, _>(user.id)
        .load::<Conversation>(conn)?)
    })
    .await
    .context("Gagal mengambil percakapan")?;

    Ok(response::ok(rows))
}

type ChatFilter = Box<dyn diesel::BoxableExpression<chats::table, Pg, SqlType = Bool>>;

/// Messages exchanged in either direction between two users.
fn between(a: i32, b: i32) -> ChatFilter {
    Box::new(
        (chats::sender_id.eq(a).and(chats::receiver_id.eq(b)))
            .or(chats::sender_id.eq(b).and(chats::receiver_id.eq(a))),
    )
}

// Handler for the message thread with one user, oldest first within a page
pub async fn messages(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let other = path.into_inner();
    let page = query.resolve(50)?;

    let (mut rows, total) = db::run(&pool, move |conn| {
        let total: i64 = chats::table
            .filter(between(user.id, other))
            .count()
            .get_result(conn)?;
        let rows = chats::table
            .filter(between(user.id, other))
            .order((chats::created_at.desc(), chats::id.desc()))
            .limit(page.limit)
            .offset(page.offset())
            .select(ChatMessage::as_select())
            .load::<ChatMessage>(conn)?;
        Ok((rows, total))
    })
    .await
    .context("Gagal mengambil pesan")?;

    rows.reverse();
    Ok(response::ok(json!({
        "messages": rows,
        "pagination": page.describe(total),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    #[serde(alias = "receiver_id")]
    pub receiver_id: Option<i32>,
    pub message: Option<String>,
}

impl SendRequest {
    fn validate(&self, sender: i32) -> Result<(i32, String), ApiError> {
        let message = self.message.as_deref().map(str::trim).unwrap_or_default();
        Validator::new()
            .check(self.receiver_id.is_some(), "receiverId", "Penerima harus diisi")
            .check(
                self.receiver_id != Some(sender),
                "receiverId",
                "Tidak bisa mengirim pesan ke diri sendiri",
            )
            .check(!message.is_empty(), "message", "Pesan tidak boleh kosong")
            .check(
                message.chars().count() <= MAX_MESSAGE_LENGTH,
                "message",
                "Pesan terlalu panjang",
            )
            .finish()?;
        Ok((self.receiver_id.unwrap_or_default(), message.to_string()))
    }
}

pub async fn send(
    pool: web::Data<DbPool>,
    user: AuthUser,
    body: web::Json<SendRequest>,
) -> Result<HttpResponse, ApiError> {
    let (receiver_id, message) = body.validate(user.id)?;

    let sent = db::run(&pool, move |conn| {
        let receiver_exists: bool = diesel::select(diesel::dsl::exists(
            users::table
                .find(receiver_id)
                .filter(users::is_active.eq(true)),
        ))
        .get_result(conn)?;
        if !receiver_exists {
            return Err(ApiError::not_found("Penerima tidak ditemukan"));
        }

        Ok(diesel::insert_into(chats::table)
            .values(&NewChatMessage {
                sender_id: user.id,
                receiver_id,
                message,
                created_at: db::utc_now(),
            })
            .returning(ChatMessage::as_returning())
            .get_result(conn)?)
    })
    .await
    .context("Gagal mengirim pesan")?;

    debug!(chat_id = sent.id, "message sent");
    Ok(response::created("Pesan terkirim", sent))
}

// Handler marking everything the given user sent to the caller as read
pub async fn mark_read(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let sender = path.into_inner();

    let updated = db::run(&pool, move |conn| {
        Ok(diesel::update(
            chats::table
                .filter(chats::sender_id.eq(sender))
                .filter(chats::receiver_id.eq(user.id))
                .filter(chats::is_read.eq(false)),
        )
        .set(chats::is_read.eq(true))
        .execute(conn)?)
    })
    .await
    .context("Gagal menandai pesan")?;

    Ok(response::ok_with("Pesan telah dibaca", json!({ "updated": updated })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(receiver: Option<i32>, message: &str) -> SendRequest {
        SendRequest {
            receiver_id: receiver,
            message: Some(message.to_string()),
        }
    }

    #[test]
    fn messages_are_trimmed() {
        assert_eq!(
            request(Some(5), "  Selamat pagi  ").validate(3).unwrap(),
            (5, "Selamat pagi".to_string())
        );
    }

    #[test]
    fn self_and_empty_messages_are_rejected() {
        let Err(ApiError::Validation(errors)) = request(Some(3), "   ").validate(3) else {
            panic!("expected validation failure");
        };
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["receiverId", "message"]);
    }

    #[test]
    fn long_messages_are_rejected() {
        let long = "a".repeat(MAX_MESSAGE_LENGTH + 1);
        assert!(request(Some(5), &long).validate(3).is_err());
    }
}
