use actix_web::{HttpResponse, web};
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;

use crate::auth::{self, AuthUser};
use crate::db::{self, DbPool};
use crate::error::{ApiError, ResultExt};
use crate::handlers::monitoring::accessible_elderly;
use crate::models::{Medicine, MedicineChangeset, MedicineLog, NewMedicine, NewMedicineLog};
use crate::response::{self, PageQuery};
use crate::schema::{medicine_logs, medicines};
use crate::validation::{Validator, blank_to_none, double_option, parse_date, parse_time};

const MEDICINE_NOT_FOUND: &str = "Obat tidak ditemukan";
pub const LOG_STATUSES: [&str; 3] = ["taken", "missed", "skipped"];

/// Owner of a medicine, checked against the caller's elderly access.
fn authorize_medicine(conn: &mut PgConnection, user: &AuthUser, id: i32) -> Result<i32, ApiError> {
    let owner: i32 = medicines::table
        .find(id)
        .select(medicines::user_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found(MEDICINE_NOT_FOUND))?;
    auth::authorize_elderly_access(conn, user, owner)?;
    Ok(owner)
}

fn blank_as_absent(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

// Handler to list an elderly user's medicines
pub async fn list_for_user(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let elderly_id = path.into_inner();

    let rows = db::run(&pool, move |conn| {
        auth::authorize_elderly_access(conn, &user, elderly_id)?;
        Ok(medicines::table
            .filter(medicines::user_id.eq(elderly_id))
            .order((medicines::is_active.desc(), medicines::time_schedule.asc()))
            .select(Medicine::as_select())
            .load(conn)?)
    })
    .await
    .context("Gagal mengambil data obat")?;

    Ok(response::ok(rows))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicineRequest {
    #[serde(alias = "user_id")]
    pub user_id: Option<i32>,
    #[serde(alias = "medicine_name")]
    pub medicine_name: Option<String>,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    #[serde(alias = "time_schedule")]
    pub time_schedule: Option<String>,
    #[serde(alias = "start_date")]
    pub start_date: Option<String>,
    #[serde(alias = "end_date")]
    pub end_date: Option<String>,
    pub notes: Option<String>,
}

impl MedicineRequest {
    fn validate(&self) -> Result<(), ApiError> {
        Validator::new()
            .required(self.medicine_name.as_deref(), "medicineName", "Nama obat harus diisi")
            .required(self.dosage.as_deref(), "dosage", "Dosis harus diisi")
            .required(self.frequency.as_deref(), "frequency", "Frekuensi harus diisi")
            .optional(
                blank_as_absent(self.time_schedule.as_deref()),
                |t: &str| parse_time(t).is_some(),
                "timeSchedule",
                "Format waktu harus HH:MM",
            )
            .optional(
                blank_as_absent(self.start_date.as_deref()),
                |d: &str| parse_date(d).is_some(),
                "startDate",
                "Format tanggal tidak valid",
            )
            .optional(
                blank_as_absent(self.end_date.as_deref()),
                |d: &str| parse_date(d).is_some(),
                "endDate",
                "Format tanggal tidak valid",
            )
            .finish()
    }

    fn into_new(self, user_id: i32, created_by: i32) -> NewMedicine {
        NewMedicine {
            user_id,
            medicine_name: self.medicine_name.unwrap_or_default().trim().to_string(),
            dosage: self.dosage.unwrap_or_default().trim().to_string(),
            frequency: self.frequency.unwrap_or_default().trim().to_string(),
            time_schedule: self.time_schedule.as_deref().and_then(parse_time),
            start_date: self.start_date.as_deref().and_then(parse_date),
            end_date: self.end_date.as_deref().and_then(parse_date),
            notes: blank_to_none(self.notes),
            created_by: Some(created_by),
        }
    }
}

pub async fn create_medicine(
    pool: web::Data<DbPool>,
    user: AuthUser,
    body: web::Json<MedicineRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = body.into_inner();
    let owner = auth::require_elderly_id(request.user_id)?;
    request.validate()?;
    let medicine = request.into_new(owner, user.id);

    if let (Some(start), Some(end)) = (medicine.start_date, medicine.end_date) {
        if end < start {
            return Err(ApiError::bad_request(
                "Tanggal selesai tidak boleh sebelum tanggal mulai",
            ));
        }
    }

    let created = db::run(&pool, move |conn| {
        accessible_elderly(conn, &user, owner)?;
        Ok(diesel::insert_into(medicines::table)
            .values(&medicine)
            .returning(Medicine::as_returning())
            .get_result(conn)?)
    })
    .await
    .context("Gagal menambahkan obat")?;

    Ok(response::created("Obat berhasil ditambahkan", created))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicineUpdate {
    pub medicine_name: Option<String>,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub time_schedule: Option<Option<String>>,
    pub start_date: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub end_date: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
    pub is_active: Option<bool>,
}

impl MedicineUpdate {
    fn validate(&self) -> Result<(), ApiError> {
        let not_blank = |v: &str| !v.trim().is_empty();
        Validator::new()
            .optional(self.medicine_name.as_deref(), not_blank, "medicineName", "Nama obat harus diisi")
            .optional(self.dosage.as_deref(), not_blank, "dosage", "Dosis harus diisi")
            .optional(self.frequency.as_deref(), not_blank, "frequency", "Frekuensi harus diisi")
            .optional(
                blank_as_absent(self.time_schedule.as_ref().and_then(|t| t.as_deref())),
                |t: &str| parse_time(t).is_some(),
                "timeSchedule",
                "Format waktu harus HH:MM",
            )
            .optional(
                self.start_date.as_deref(),
                |d: &str| parse_date(d).is_some(),
                "startDate",
                "Format tanggal tidak valid",
            )
            .optional(
                blank_as_absent(self.end_date.as_ref().and_then(|d| d.as_deref())),
                |d: &str| parse_date(d).is_some(),
                "endDate",
                "Format tanggal tidak valid",
            )
            .finish()
    }

    fn into_changeset(self) -> MedicineChangeset {
        MedicineChangeset {
            medicine_name: self.medicine_name.map(|n| n.trim().to_string()),
            dosage: self.dosage.map(|d| d.trim().to_string()),
            frequency: self.frequency.map(|f| f.trim().to_string()),
            time_schedule: self.time_schedule.map(|t| t.as_deref().and_then(parse_time)),
            start_date: self.start_date.as_deref().and_then(parse_date),
            end_date: self.end_date.map(|d| d.as_deref().and_then(parse_date)),
            notes: self.notes.map(blank_to_none),
            is_active: self.is_active,
            updated_at: None,
        }
    }
}

pub async fn update_medicine(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
    body: web::Json<MedicineUpdate>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let update = body.into_inner();
    update.validate()?;
    let mut changes = update.into_changeset();
    changes.updated_at = Some(Utc::now().naive_utc());

    let updated = db::run(&pool, move |conn| {
        authorize_medicine(conn, &user, id)?;
        Ok(diesel::update(medicines::table.find(id))
            .set(&changes)
            .returning(Medicine::as_returning())
            .get_result(conn)?)
    })
    .await
    .context("Gagal mengupdate obat")?;

    Ok(response::ok_with("Obat berhasil diupdate", updated))
}

// Handler to deactivate a medicine; logs are kept
pub async fn delete_medicine(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();

    db::run(&pool, move |conn| {
        authorize_medicine(conn, &user, id)?;
        diesel::update(medicines::table.find(id))
            .set((
                medicines::is_active.eq(false),
                medicines::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;
        Ok(())
    })
    .await
    .context("Gagal menghapus obat")?;

    Ok(response::ok_message("Obat berhasil dihapus"))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRequest {
    pub status: Option<String>,
    pub notes: Option<String>,
    #[serde(alias = "taken_at")]
    pub taken_at: Option<chrono::NaiveDateTime>,
}

fn log_status(requested: Option<&str>) -> Result<String, ApiError> {
    let status = requested.unwrap_or("taken");
    Validator::new()
        .check(
            LOG_STATUSES.contains(&status),
            "status",
            "Status harus taken, missed, atau skipped",
        )
        .finish()?;
    Ok(status.to_string())
}

pub async fn log_medicine(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
    body: Option<web::Json<LogRequest>>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let request = body.map(web::Json::into_inner).unwrap_or_default();
    let entry = NewMedicineLog {
        medicine_id: id,
        taken_at: request.taken_at.unwrap_or_else(|| Utc::now().naive_utc()),
        status: log_status(request.status.as_deref())?,
        notes: blank_to_none(request.notes),
        marked_by: Some(user.id),
    };

    let log = db::run(&pool, move |conn| {
        authorize_medicine(conn, &user, id)?;
        Ok(diesel::insert_into(medicine_logs::table)
            .values(&entry)
            .returning(MedicineLog::as_returning())
            .get_result(conn)?)
    })
    .await
    .context("Gagal mencatat log obat")?;

    Ok(response::created("Log obat berhasil dicatat", log))
}

pub async fn list_logs(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let page = query.resolve(30)?;

    let (logs, total) = db::run(&pool, move |conn| {
        authorize_medicine(conn, &user, id)?;
        let total: i64 = medicine_logs::table
            .filter(medicine_logs::medicine_id.eq(id))
            .count()
            .get_result(conn)?;
        let logs = medicine_logs::table
            .filter(medicine_logs::medicine_id.eq(id))
            .order(medicine_logs::taken_at.desc())
            .limit(page.limit)
            .offset(page.offset())
            .select(MedicineLog::as_select())
            .load(conn)?;
        Ok((logs, total))
    })
    .await
    .context("Gagal mengambil log obat")?;

    Ok(response::ok(serde_json::json!({
        "logs": logs,
        "pagination": page.describe(total),
    })))
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};
    use serde_json::json;

    use super::*;

    #[test]
    fn new_medicine_parses_schedule_and_dates() {
        let request: MedicineRequest = serde_json::from_value(json!({
            "userId": 4,
            "medicineName": " Metformin ",
            "dosage": "500 mg",
            "frequency": "2x sehari",
            "timeSchedule": "07:30",
            "startDate": "2024-06-01",
        }))
        .unwrap();
        assert!(request.validate().is_ok());

        let medicine = request.into_new(4, 1);
        assert_eq!(medicine.medicine_name, "Metformin");
        assert_eq!(medicine.time_schedule, NaiveTime::from_hms_opt(7, 30, 0));
        assert_eq!(medicine.start_date, NaiveDate::from_ymd_opt(2024, 6, 1));
        assert_eq!(medicine.end_date, None);
    }

    #[test]
    fn new_medicine_requires_core_fields() {
        let request: MedicineRequest =
            serde_json::from_value(json!({"userId": 4, "timeSchedule": "jam 7"})).unwrap();
        let Err(ApiError::Validation(errors)) = request.validate() else {
            panic!("expected validation failure");
        };
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["medicineName", "dosage", "frequency", "timeSchedule"]);
    }

    #[test]
    fn update_can_clear_schedule() {
        let update: MedicineUpdate =
            serde_json::from_value(json!({"timeSchedule": null, "isActive": true})).unwrap();
        assert!(update.validate().is_ok());
        let changes = update.into_changeset();
        assert_eq!(changes.time_schedule, Some(None));
        assert_eq!(changes.is_active, Some(true));
        assert_eq!(changes.dosage, None);
    }

    #[test]
    fn log_status_defaults_to_taken() {
        assert_eq!(log_status(None).unwrap(), "taken");
        assert_eq!(log_status(Some("skipped")).unwrap(), "skipped");
        assert!(log_status(Some("lupa")).is_err());
    }
}
