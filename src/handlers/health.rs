use actix_web::{HttpResponse, web};
use chrono::{Duration, NaiveTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Float8, Int4, Nullable, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::{self, AuthUser};
use crate::db::{self, DbPool};
use crate::error::{ApiError, ResultExt};
use crate::handlers::monitoring::{
    HistoryQuery, accessible_elderly, history_days, latest_vitals, raise_vital_alerts,
};
use crate::models::{HealthRecord, NewHealthRecord};
use crate::monitoring::VitalReading;
use crate::response::{self, PageQuery};
use crate::schema::health_records;
use crate::validation::blank_to_none;

// Handler to page through an elderly user's health records
pub async fn list_records(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let elderly_id = path.into_inner();
    let page = query.resolve(10)?;

    let (records, total) = db::run(&pool, move |conn| {
        auth::authorize_elderly_access(conn, &user, elderly_id)?;
        let total: i64 = health_records::table
            .filter(health_records::user_id.eq(elderly_id))
            .count()
            .get_result(conn)?;
        let records = health_records::table
            .filter(health_records::user_id.eq(elderly_id))
            .order(health_records::recorded_at.desc())
            .limit(page.limit)
            .offset(page.offset())
            .select(HealthRecord::as_select())
            .load(conn)?;
        Ok((records, total))
    })
    .await
    .context("Gagal mengambil data kesehatan")?;

    Ok(response::ok(json!({
        "records": records,
        "pagination": page.describe(total),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecordRequest {
    #[serde(alias = "user_id")]
    pub user_id: Option<i32>,
    #[serde(alias = "blood_pressure_systolic")]
    pub blood_pressure_systolic: Option<i32>,
    #[serde(alias = "blood_pressure_diastolic")]
    pub blood_pressure_diastolic: Option<i32>,
    #[serde(alias = "heart_rate")]
    pub heart_rate: Option<i32>,
    #[serde(alias = "blood_sugar_level")]
    pub blood_sugar_level: Option<f64>,
    pub temperature: Option<f64>,
    pub weight: Option<f64>,
    pub notes: Option<String>,
}

impl HealthRecordRequest {
    fn into_new(self, user_id: i32, recorded_by: i32) -> NewHealthRecord {
        NewHealthRecord {
            user_id,
            blood_pressure_systolic: self.blood_pressure_systolic,
            blood_pressure_diastolic: self.blood_pressure_diastolic,
            heart_rate: self.heart_rate,
            blood_sugar_level: self.blood_sugar_level,
            temperature: self.temperature,
            weight: self.weight,
            notes: blank_to_none(self.notes),
            recorded_by: Some(recorded_by),
            recorded_at: Utc::now().naive_utc(),
        }
    }
}

impl From<&NewHealthRecord> for VitalReading {
    fn from(r: &NewHealthRecord) -> Self {
        Self {
            systolic: r.blood_pressure_systolic,
            diastolic: r.blood_pressure_diastolic,
            heart_rate: r.heart_rate,
            blood_sugar: r.blood_sugar_level,
        }
    }
}

// Handler to add a health record; thresholds apply as for vitals
pub async fn add_record(
    pool: web::Data<DbPool>,
    user: AuthUser,
    body: web::Json<HealthRecordRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = body.into_inner();
    let elderly_id = auth::require_elderly_id(request.user_id)?;
    let record = request.into_new(elderly_id, user.id);

    let (created, alerts_created) = db::run(&pool, move |conn| {
        let elderly = accessible_elderly(conn, &user, elderly_id)?;

        let created = diesel::insert_into(health_records::table)
            .values(&record)
            .returning(HealthRecord::as_returning())
            .get_result(conn)?;
        let alerts_created =
            raise_vital_alerts(conn, &elderly, &VitalReading::from(&record), user.id)?;
        Ok((created, alerts_created))
    })
    .await
    .context("Gagal mencatat data kesehatan")?;

    Ok(response::created(
        "Data kesehatan berhasil dicatat",
        json!({ "record": created, "alerts_created": alerts_created }),
    ))
}

#[derive(Debug, Serialize, QueryableByName)]
#[serde(rename_all = "camelCase")]
struct HealthStats {
    #[diesel(sql_type = BigInt)]
    total_readings: i64,
    #[diesel(sql_type = Nullable<Float8>)]
    avg_systolic: Option<f64>,
    #[diesel(sql_type = Nullable<Int4>)]
    min_systolic: Option<i32>,
    #[diesel(sql_type = Nullable<Int4>)]
    max_systolic: Option<i32>,
    #[diesel(sql_type = Nullable<Float8>)]
    avg_diastolic: Option<f64>,
    #[diesel(sql_type = Nullable<Int4>)]
    min_diastolic: Option<i32>,
    #[diesel(sql_type = Nullable<Int4>)]
    max_diastolic: Option<i32>,
    #[diesel(sql_type = Nullable<Float8>)]
    avg_heart_rate: Option<f64>,
    #[diesel(sql_type = Nullable<Int4>)]
    min_heart_rate: Option<i32>,
    #[diesel(sql_type = Nullable<Int4>)]
    max_heart_rate: Option<i32>,
    #[diesel(sql_type = Nullable<Float8>)]
    avg_blood_sugar: Option<f64>,
    #[diesel(sql_type = Nullable<Float8>)]
    min_blood_sugar: Option<f64>,
    #[diesel(sql_type = Nullable<Float8>)]
    max_blood_sugar: Option<f64>,
    #[diesel(sql_type = Nullable<Float8>)]
    avg_temperature: Option<f64>,
    #[diesel(sql_type = Nullable<Float8>)]
    avg_weight: Option<f64>,
}

// Handler for aggregate statistics over the last N days. Every vitals
// submission is mirrored into health_records, so that table alone is read.
pub async fn stats(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, ApiError> {
    let elderly_id = path.into_inner();
    let days = history_days(query.days);

    let stats = db::run(&pool, move |conn| {
        auth::authorize_elderly_access(conn, &user, elderly_id)?;
        let since = (Utc::now().date_naive() - Duration::days(days)).and_time(NaiveTime::MIN);

        Ok(diesel::sql_query(
            "SELECT COUNT(*) AS total_readings, \
                    ROUND(AVG(blood_pressure_systolic), 1)::float8 AS avg_systolic, \
                    MIN(blood_pressure_systolic) AS min_systolic, \
                    MAX(blood_pressure_systolic) AS max_systolic, \
                    ROUND(AVG(blood_pressure_diastolic), 1)::float8 AS avg_diastolic, \
                    MIN(blood_pressure_diastolic) AS min_diastolic, \
                    MAX(blood_pressure_diastolic) AS max_diastolic, \
                    ROUND(AVG(heart_rate), 1)::float8 AS avg_heart_rate, \
                    MIN(heart_rate) AS min_heart_rate, \
                    MAX(heart_rate) AS max_heart_rate, \
                    ROUND(AVG(blood_sugar_level)::numeric, 1)::float8 AS avg_blood_sugar, \
                    MIN(blood_sugar_level) AS min_blood_sugar, \
                    MAX(blood_sugar_level) AS max_blood_sugar, \
                    ROUND(AVG(temperature)::numeric, 1)::float8 AS avg_temperature, \
                    ROUND(AVG(weight)::numeric, 1)::float8 AS avg_weight \
             FROM health_records \
             WHERE user_id = $1 AND recorded_at >= $2",
        )
        .bind::<Int4, _>(elderly_id)
        .bind::<Timestamp, _>(since)
        .get_result::<HealthStats>(conn)?)
    })
    .await
    .context("Gagal mengambil statistik kesehatan")?;

    Ok(response::ok(json!({ "days": days, "stats": stats })))
}

pub async fn latest(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let elderly_id = path.into_inner();

    let vitals = db::run(&pool, move |conn| {
        auth::authorize_elderly_access(conn, &user, elderly_id)?;
        Ok(latest_vitals(conn, elderly_id)?)
    })
    .await
    .context("Gagal mengambil data vital terbaru")?;

    Ok(response::ok(vitals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::evaluate_vitals;

    #[test]
    fn record_body_feeds_threshold_rules() {
        let request: HealthRecordRequest = serde_json::from_value(json!({
            "userId": 4,
            "bloodPressureSystolic": 120,
            "bloodPressureDiastolic": 80,
            "blood_sugar_level": 140.0,
            "notes": "  ",
        }))
        .unwrap();

        let record = request.into_new(4, 2);
        assert_eq!(record.notes, None);
        assert_eq!(record.recorded_by, Some(2));

        let alerts = evaluate_vitals(&VitalReading::from(&record));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].category, "blood_sugar");
    }
}
