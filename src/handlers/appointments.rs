use actix_web::{HttpResponse, web};
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;

use crate::auth::{self, AuthUser};
use crate::db::{self, DbPool};
use crate::error::{ApiError, ResultExt};
use crate::handlers::monitoring::accessible_elderly;
use crate::models::{Appointment, AppointmentChangeset, NewAppointment};
use crate::schema::appointments;
use crate::response;
use crate::validation::{Validator, blank_to_none, double_option, parse_date, parse_time};

const APPOINTMENT_NOT_FOUND: &str = "Jadwal tidak ditemukan";
pub const STATUSES: [&str; 4] = ["scheduled", "completed", "cancelled", "missed"];

fn authorize_appointment(conn: &mut PgConnection, user: &AuthUser, id: i32) -> Result<(), ApiError> {
    let owner: i32 = appointments::table
        .find(id)
        .select(appointments::user_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found(APPOINTMENT_NOT_FOUND))?;
    auth::authorize_elderly_access(conn, user, owner)
}

pub async fn list_for_user(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let elderly_id = path.into_inner();

    let rows = db::run(&pool, move |conn| {
        auth::authorize_elderly_access(conn, &user, elderly_id)?;
        Ok(appointments::table
            .filter(appointments::user_id.eq(elderly_id))
            .order((
                appointments::appointment_date.desc(),
                appointments::appointment_time.desc(),
            ))
            .select(Appointment::as_select())
            .load(conn)?)
    })
    .await
    .context("Gagal mengambil jadwal")?;

    Ok(response::ok(rows))
}

// Handler for scheduled appointments from today on
pub async fn upcoming(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let elderly_id = path.into_inner();

    let rows = db::run(&pool, move |conn| {
        auth::authorize_elderly_access(conn, &user, elderly_id)?;
        Ok(appointments::table
            .filter(appointments::user_id.eq(elderly_id))
            .filter(appointments::status.eq("scheduled"))
            .filter(appointments::appointment_date.ge(Utc::now().date_naive()))
            .order((
                appointments::appointment_date.asc(),
                appointments::appointment_time.asc(),
            ))
            .select(Appointment::as_select())
            .load(conn)?)
    })
    .await
    .context("Gagal mengambil jadwal mendatang")?;

    Ok(response::ok(rows))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentRequest {
    #[serde(alias = "user_id")]
    pub user_id: Option<i32>,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(alias = "appointment_date")]
    pub appointment_date: Option<String>,
    #[serde(alias = "appointment_time")]
    pub appointment_time: Option<String>,
    pub location: Option<String>,
    #[serde(alias = "doctor_name")]
    pub doctor_name: Option<String>,
}

impl AppointmentRequest {
    fn validate(&self) -> Result<(), ApiError> {
        Validator::new()
            .required(self.title.as_deref(), "title", "Judul harus diisi")
            .check(
                self.appointment_date.as_deref().and_then(parse_date).is_some(),
                "appointmentDate",
                "Tanggal jadwal tidak valid",
            )
            .optional(
                self.appointment_time.as_deref().filter(|t| !t.trim().is_empty()),
                |t: &str| parse_time(t).is_some(),
                "appointmentTime",
                "Format waktu harus HH:MM",
            )
            .finish()
    }

    fn into_new(self, user_id: i32, created_by: i32) -> Option<NewAppointment> {
        Some(NewAppointment {
            user_id,
            appointment_date: self.appointment_date.as_deref().and_then(parse_date)?,
            appointment_time: self.appointment_time.as_deref().and_then(parse_time),
            title: self.title.unwrap_or_default().trim().to_string(),
            description: blank_to_none(self.description),
            location: blank_to_none(self.location),
            doctor_name: blank_to_none(self.doctor_name),
            created_by: Some(created_by),
        })
    }
}

pub async fn create_appointment(
    pool: web::Data<DbPool>,
    user: AuthUser,
    body: web::Json<AppointmentRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = body.into_inner();
    let owner = auth::require_elderly_id(request.user_id)?;
    request.validate()?;
    let appointment = request
        .into_new(owner, user.id)
        .ok_or_else(|| ApiError::bad_request("Tanggal jadwal tidak valid"))?;

    let created = db::run(&pool, move |conn| {
        accessible_elderly(conn, &user, owner)?;
        Ok(diesel::insert_into(appointments::table)
            .values(&appointment)
            .returning(Appointment::as_returning())
            .get_result(conn)?)
    })
    .await
    .context("Gagal membuat jadwal")?;

    Ok(response::created("Jadwal berhasil dibuat", created))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentUpdate {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub appointment_date: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub appointment_time: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub location: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub doctor_name: Option<Option<String>>,
    pub status: Option<String>,
}

impl AppointmentUpdate {
    fn validate(&self) -> Result<(), ApiError> {
        Validator::new()
            .optional(
                self.title.as_deref(),
                |t: &str| !t.trim().is_empty(),
                "title",
                "Judul harus diisi",
            )
            .optional(
                self.appointment_date.as_deref(),
                |d: &str| parse_date(d).is_some(),
                "appointmentDate",
                "Tanggal jadwal tidak valid",
            )
            .optional(
                self.appointment_time
                    .as_ref()
                    .and_then(|t| t.as_deref())
                    .filter(|t| !t.trim().is_empty()),
                |t: &str| parse_time(t).is_some(),
                "appointmentTime",
                "Format waktu harus HH:MM",
            )
            .optional(
                self.status.as_deref(),
                |s: &str| STATUSES.contains(&s),
                "status",
                "Status tidak valid",
            )
            .finish()
    }

    fn into_changeset(self) -> AppointmentChangeset {
        let moved = self.appointment_date.is_some() || self.appointment_time.is_some();
        AppointmentChangeset {
            title: self.title.map(|t| t.trim().to_string()),
            description: self.description.map(blank_to_none),
            appointment_date: self.appointment_date.as_deref().and_then(parse_date),
            appointment_time: self
                .appointment_time
                .map(|t| t.as_deref().and_then(parse_time)),
            location: self.location.map(blank_to_none),
            doctor_name: self.doctor_name.map(blank_to_none),
            status: self.status,
            // A rescheduled appointment gets a fresh reminder.
            reminder_sent: moved.then_some(false),
            updated_at: None,
        }
    }
}

pub async fn update_appointment(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
    body: web::Json<AppointmentUpdate>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let update = body.into_inner();
    update.validate()?;
    let mut changes = update.into_changeset();
    changes.updated_at = Some(Utc::now().naive_utc());

    let updated = db::run(&pool, move |conn| {
        authorize_appointment(conn, &user, id)?;
        Ok(diesel::update(appointments::table.find(id))
            .set(&changes)
            .returning(Appointment::as_returning())
            .get_result(conn)?)
    })
    .await
    .context("Gagal mengupdate jadwal")?;

    Ok(response::ok_with("Jadwal berhasil diupdate", updated))
}

// Handler to cancel an appointment; the row is kept
pub async fn cancel_appointment(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();

    db::run(&pool, move |conn| {
        authorize_appointment(conn, &user, id)?;
        diesel::update(appointments::table.find(id))
            .set((
                appointments::status.eq("cancelled"),
                appointments::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;
        Ok(())
    })
    .await
    .context("Gagal membatalkan jadwal")?;

    Ok(response::ok_message("Jadwal berhasil dibatalkan"))
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};
    use serde_json::json;

    use super::*;

    #[test]
    fn new_appointment_needs_title_and_date() {
        let request: AppointmentRequest =
            serde_json::from_value(json!({"userId": 4, "appointmentDate": "besok"})).unwrap();
        let Err(ApiError::Validation(errors)) = request.validate() else {
            panic!("expected validation failure");
        };
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["title", "appointmentDate"]);
    }

    #[test]
    fn new_appointment_parses_date_and_time() {
        let request: AppointmentRequest = serde_json::from_value(json!({
            "userId": 4,
            "title": "Kontrol gula darah",
            "appointment_date": "2024-07-01",
            "appointmentTime": "09:30",
            "location": "",
        }))
        .unwrap();
        assert!(request.validate().is_ok());

        let appointment = request.into_new(4, 1).unwrap();
        assert_eq!(appointment.appointment_date, NaiveDate::from_ymd_opt(2024, 7, 1).unwrap());
        assert_eq!(appointment.appointment_time, NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(appointment.location, None);
    }

    #[test]
    fn rescheduling_resets_the_reminder() {
        let update: AppointmentUpdate =
            serde_json::from_value(json!({"appointmentDate": "2024-07-02"})).unwrap();
        assert_eq!(update.into_changeset().reminder_sent, Some(false));

        let update: AppointmentUpdate =
            serde_json::from_value(json!({"status": "completed"})).unwrap();
        assert!(update.validate().is_ok());
        assert_eq!(update.into_changeset().reminder_sent, None);
    }

    #[test]
    fn unknown_status_is_rejected() {
        let update: AppointmentUpdate =
            serde_json::from_value(json!({"status": "postponed"})).unwrap();
        assert!(update.validate().is_err());
    }
}
