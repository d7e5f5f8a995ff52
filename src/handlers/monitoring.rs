use actix_web::{HttpResponse, web};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use diesel::dsl::count;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Date, Int4, Nullable, Text, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::auth::{self, AuthUser, Role};
use crate::db::{self, DbPool};
use crate::error::{ApiError, ResultExt};
use crate::models::{
    Activity, HealthRecord, MonitoredMedication, MonitoringAlert, NewActivity,
    NewHealthRecord, NewMedicationMonitoringLog, NewMonitoredMedication, NewMonitoringAlert,
    NewVitalSign, VitalSign,
};
use crate::monitoring::{
    self, AlertLevel, DailyVitals, LatestVitals, VitalReading, activity_value, adherence_rate,
    age_on, evaluate_vitals, format_activity_time, last_check_label, merge_vital_history,
    relative_time,
};
use crate::notifications::{KIND_MONITORING_ALERT, notify_family};
use crate::response;
use crate::schema::{
    activities, family_elderly_relations, health_records, medication_monitoring_logs,
    medications_monitoring, monitoring_alerts, users, vital_signs,
};
use crate::validation::{Validator, blank_to_none, is_valid_time_list};

pub const ELDERLY_NOT_FOUND: &str = "Lansia tidak ditemukan";

const STAFF: &[Role] = &[Role::Admin, Role::Medical];
const CAREGIVERS: &[Role] = &[Role::Admin, Role::Medical, Role::Family];

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ElderlyRow {
    pub id: i32,
    pub full_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

/// Loads a user holding the elderly role, 404 otherwise.
pub fn find_elderly(conn: &mut PgConnection, id: i32) -> Result<ElderlyRow, ApiError> {
    users::table
        .find(id)
        .filter(users::role.eq(Role::Elderly.as_str()))
        .select(ElderlyRow::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found(ELDERLY_NOT_FOUND))
}

/// `find_elderly` behind the access check. Callers without access get 403
/// for unknown ids too.
pub fn accessible_elderly(
    conn: &mut PgConnection,
    user: &AuthUser,
    id: i32,
) -> Result<ElderlyRow, ApiError> {
    auth::guard_elderly(
        conn,
        auth::elderly_access(user.id, user.role, id),
        |conn| auth::is_family_of(conn, user.id, id),
        |conn| find_elderly(conn, id),
    )
}

/// Stores threshold alerts for a reading and tells the family about each.
/// Returns how many alerts were written.
pub fn raise_vital_alerts(
    conn: &mut PgConnection,
    elderly: &ElderlyRow,
    reading: &VitalReading,
    created_by: i32,
) -> QueryResult<usize> {
    let pending = evaluate_vitals(reading);

    for alert in &pending {
        diesel::insert_into(monitoring_alerts::table)
            .values(&NewMonitoringAlert {
                elderly_id: elderly.id,
                alert_type: alert.level.as_str().to_string(),
                category: Some(alert.category.to_string()),
                message: alert.message.clone(),
                created_by,
                created_at: db::utc_now(),
            })
            .execute(conn)?;

        let text = alert_notification(alert.level, &elderly.full_name, &alert.message);
        notify_family(conn, elderly.id, KIND_MONITORING_ALERT, "Alert Monitoring", &text)?;
    }

    if !pending.is_empty() {
        warn!(elderly_id = elderly.id, alerts = pending.len(), "abnormal vitals recorded");
    }
    Ok(pending.len())
}

pub fn alert_notification(level: AlertLevel, elderly_name: &str, message: &str) -> String {
    format!("Alert {level} untuk {elderly_name}: {message}")
}

#[derive(Debug, QueryableByName)]
struct ElderlyListRow {
    #[diesel(sql_type = Int4)]
    id: i32,
    #[diesel(sql_type = Text)]
    full_name: String,
    #[diesel(sql_type = Nullable<Text>)]
    phone: Option<String>,
    #[diesel(sql_type = Nullable<Date>)]
    date_of_birth: Option<NaiveDate>,
    #[diesel(sql_type = Nullable<Text>)]
    address: Option<String>,
    #[diesel(sql_type = BigInt)]
    family_count: i64,
    #[diesel(sql_type = Nullable<Timestamp>)]
    last_vitals_check: Option<NaiveDateTime>,
    #[diesel(sql_type = Nullable<Timestamp>)]
    last_health_check: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize)]
struct ElderlyListItem {
    id: i32,
    full_name: String,
    phone: Option<String>,
    date_of_birth: Option<NaiveDate>,
    address: Option<String>,
    family_count: i64,
    last_vitals_check: Option<NaiveDateTime>,
    last_health_check: Option<NaiveDateTime>,
    age: Option<i32>,
    last_vitals: String,
}

impl ElderlyListItem {
    fn from_row(row: ElderlyListRow, now: NaiveDateTime) -> Self {
        let last_check = row.last_vitals_check.max(row.last_health_check);
        Self {
            age: row.date_of_birth.map(|dob| age_on(dob, now.date())),
            last_vitals: last_check_label(last_check, now),
            id: row.id,
            full_name: row.full_name,
            phone: row.phone,
            date_of_birth: row.date_of_birth,
            address: row.address,
            family_count: row.family_count,
            last_vitals_check: row.last_vitals_check,
            last_health_check: row.last_health_check,
        }
    }
}

// Handler to list every elderly user with their last check
pub async fn elderly_list(pool: web::Data<DbPool>, user: AuthUser) -> Result<HttpResponse, ApiError> {
    user.require(STAFF)?;

    let items = db::run(&pool, move |conn| {
        let rows = diesel::sql_query(
            "SELECT u.id, u.full_name, u.phone, u.date_of_birth, u.address, \
                    (SELECT COUNT(*) FROM family_elderly_relations WHERE elderly_user_id = u.id) AS family_count, \
                    (SELECT MAX(created_at) FROM vital_signs WHERE elderly_id = u.id) AS last_vitals_check, \
                    (SELECT MAX(recorded_at) FROM health_records WHERE user_id = u.id) AS last_health_check \
             FROM users u \
             WHERE u.role = 'elderly' \
             ORDER BY u.full_name",
        )
        .load::<ElderlyListRow>(conn)?;

        let now = Utc::now().naive_utc();
        Ok(rows
            .into_iter()
            .map(|row| ElderlyListItem::from_row(row, now))
            .collect::<Vec<_>>())
    })
    .await
    .context("Gagal mengambil daftar lansia")?;

    info!(count = items.len(), "elderly list loaded");
    Ok(response::ok(items))
}

#[derive(Debug, Serialize, QueryableByName)]
struct TodayMedication {
    #[diesel(sql_type = Int4)]
    id: i32,
    #[diesel(sql_type = Text)]
    source: String,
    #[diesel(sql_type = Text)]
    name: String,
    #[diesel(sql_type = Text)]
    dose: String,
    #[diesel(sql_type = Text)]
    frequency: String,
    #[diesel(sql_type = Nullable<Text>)]
    time: Option<String>,
    #[diesel(sql_type = Text)]
    status: String,
    #[diesel(sql_type = Nullable<Text>)]
    notes: Option<String>,
}

#[derive(Debug, Serialize)]
struct ActivityView {
    time: String,
    #[serde(rename = "type")]
    activity_type: String,
    value: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct AlertView {
    id: i32,
    #[serde(rename = "type")]
    alert_type: String,
    category: Option<String>,
    message: String,
    created_at: String,
    created_by: String,
    is_dismissed: bool,
}

impl AlertView {
    fn new(alert: MonitoringAlert, created_by: Option<String>, now: NaiveDateTime) -> Self {
        Self {
            id: alert.id,
            created_at: relative_time(alert.created_at, now),
            alert_type: alert.alert_type,
            category: alert.category,
            message: alert.message,
            created_by: created_by.unwrap_or_else(|| "Unknown".to_string()),
            is_dismissed: alert.is_dismissed,
        }
    }
}

#[derive(Debug, Serialize, Queryable)]
struct FamilyContact {
    name: String,
    email: String,
    phone: Option<String>,
    relationship: String,
}

#[derive(Debug, Serialize)]
struct ElderlyCard {
    id: i32,
    full_name: String,
    age: Option<i32>,
    phone: Option<String>,
    address: Option<String>,
}

#[derive(Debug, Serialize)]
struct ElderlyMonitoring {
    elderly: ElderlyCard,
    vitals: LatestVitals,
    medications: Vec<TodayMedication>,
    activities: Vec<ActivityView>,
    alerts: Vec<AlertView>,
    family_contacts: Vec<FamilyContact>,
    vital_history: Vec<DailyVitals>,
}

fn daily_vitals_since(
    conn: &mut PgConnection,
    elderly_id: i32,
    since: NaiveDateTime,
) -> QueryResult<Vec<DailyVitals>> {
    let primary = diesel::sql_query(
        "SELECT measurement_date::date AS date, \
                AVG(blood_pressure_sys)::float8 AS avg_sys, \
                AVG(blood_pressure_dia)::float8 AS avg_dia, \
                AVG(heart_rate)::float8 AS avg_hr, \
                AVG(blood_sugar)::float8 AS avg_bs \
         FROM vital_signs \
         WHERE elderly_id = $1 AND measurement_date >= $2 \
         GROUP BY measurement_date::date",
    )
    .bind::<Int4, _>(elderly_id)
    .bind::<Timestamp, _>(since)
    .load::<DailyVitals>(conn)?;

    let legacy = diesel::sql_query(
        "SELECT recorded_at::date AS date, \
                AVG(blood_pressure_systolic)::float8 AS avg_sys, \
                AVG(blood_pressure_diastolic)::float8 AS avg_dia, \
                AVG(heart_rate)::float8 AS avg_hr, \
                AVG(blood_sugar_level)::float8 AS avg_bs \
         FROM health_records \
         WHERE user_id = $1 AND recorded_at >= $2 \
         GROUP BY recorded_at::date",
    )
    .bind::<Int4, _>(elderly_id)
    .bind::<Timestamp, _>(since)
    .load::<DailyVitals>(conn)?;

    Ok(merge_vital_history(primary, legacy))
}

/// Newest reading across both vitals tables.
pub fn latest_vitals(conn: &mut PgConnection, elderly_id: i32) -> QueryResult<LatestVitals> {
    let primary = vital_signs::table
        .filter(vital_signs::elderly_id.eq(elderly_id))
        .order(vital_signs::measurement_date.desc())
        .select(VitalSign::as_select())
        .first(conn)
        .optional()?;
    let legacy = health_records::table
        .filter(health_records::user_id.eq(elderly_id))
        .order(health_records::recorded_at.desc())
        .select(HealthRecord::as_select())
        .first(conn)
        .optional()?;

    Ok(monitoring::latest_of(
        primary.as_ref().map(LatestVitals::from),
        legacy.as_ref().map(LatestVitals::from),
    ))
}

// Handler for the monitoring dashboard of one elderly user
pub async fn elderly_detail(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    user.require(CAREGIVERS)?;
    let elderly_id = path.into_inner();

    let data = db::run(&pool, move |conn| {
        let elderly = accessible_elderly(conn, &user, elderly_id)?;

        let now = Utc::now().naive_utc();
        let today = now.date();
        let start_of_day = today.and_time(NaiveTime::MIN);

        let vitals = latest_vitals(conn, elderly_id)?;

        let medications = diesel::sql_query(
            "SELECT mm.id, 'monitoring' AS source, mm.medication_name AS name, mm.dose, mm.frequency, \
                    mm.times AS time, \
                    CASE WHEN EXISTS (SELECT 1 FROM medication_monitoring_logs mml \
                                      WHERE mml.medication_id = mm.id AND mml.taken_at::date = $2) \
                         THEN 'taken' ELSE 'pending' END AS status, \
                    mm.notes \
             FROM medications_monitoring mm \
             WHERE mm.elderly_id = $1 AND mm.is_active = TRUE \
             UNION ALL \
             SELECT m.id, 'medicine' AS source, m.medicine_name, m.dosage, m.frequency, \
                    to_char(m.time_schedule, 'HH24:MI'), \
                    CASE WHEN EXISTS (SELECT 1 FROM medicine_logs ml \
                                      WHERE ml.medicine_id = m.id AND ml.taken_at::date = $2) \
                         THEN 'taken' ELSE 'pending' END, \
                    m.notes \
             FROM medicines m \
             WHERE m.user_id = $1 AND m.is_active = TRUE \
               AND (m.end_date IS NULL OR m.end_date >= $2)",
        )
        .bind::<Int4, _>(elderly_id)
        .bind::<Date, _>(today)
        .load::<TodayMedication>(conn)?;

        let activities = activities::table
            .filter(activities::elderly_id.eq(elderly_id))
            .filter(activities::activity_date.ge(start_of_day))
            .order(activities::activity_date.desc())
            .select(Activity::as_select())
            .load(conn)?
            .into_iter()
            .map(|a| ActivityView {
                time: format_activity_time(a.activity_date),
                value: activity_value(a.value, a.unit.as_deref()),
                activity_type: a.activity_type,
                description: a.description,
            })
            .collect();

        // The creator may have been deleted since; the alert still shows.
        let alerts = monitoring_alerts::table
            .left_join(users::table.on(users::id.eq(monitoring_alerts::created_by)))
            .filter(monitoring_alerts::elderly_id.eq(elderly_id))
            .order(monitoring_alerts::created_at.desc())
            .limit(10)
            .select((MonitoringAlert::as_select(), users::full_name.nullable()))
            .load::<(MonitoringAlert, Option<String>)>(conn)?
            .into_iter()
            .map(|(alert, created_by)| AlertView::new(alert, created_by, now))
            .collect();

        let family_contacts = family_elderly_relations::table
            .inner_join(users::table.on(users::id.eq(family_elderly_relations::family_user_id)))
            .filter(family_elderly_relations::elderly_user_id.eq(elderly_id))
            .select((
                users::full_name,
                users::email,
                users::phone,
                family_elderly_relations::relationship,
            ))
            .load::<FamilyContact>(conn)?;

        let week_ago = (today - Duration::days(7)).and_time(NaiveTime::MIN);
        let vital_history = daily_vitals_since(conn, elderly_id, week_ago)?;

        Ok(ElderlyMonitoring {
            elderly: ElderlyCard {
                id: elderly.id,
                age: elderly.date_of_birth.map(|dob| age_on(dob, today)),
                full_name: elderly.full_name,
                phone: elderly.phone,
                address: elderly.address,
            },
            vitals,
            medications,
            activities,
            alerts,
            family_contacts,
            vital_history,
        })
    })
    .await
    .context("Gagal mengambil data monitoring")?;

    Ok(response::ok(data))
}

#[derive(Debug, Default, Deserialize)]
pub struct VitalsRequest {
    #[serde(alias = "bloodPressureSys")]
    pub blood_pressure_sys: Option<i32>,
    #[serde(alias = "bloodPressureDia")]
    pub blood_pressure_dia: Option<i32>,
    #[serde(alias = "heartRate")]
    pub heart_rate: Option<i32>,
    #[serde(alias = "bloodSugar")]
    pub blood_sugar: Option<f64>,
    pub temperature: Option<f64>,
    pub weight: Option<f64>,
    #[serde(alias = "oxygenSaturation")]
    pub oxygen_saturation: Option<i32>,
    pub notes: Option<String>,
}

impl VitalsRequest {
    fn into_new(self, elderly_id: i32, recorded_by: i32, at: NaiveDateTime) -> NewVitalSign {
        NewVitalSign {
            elderly_id,
            measurement_date: at,
            blood_pressure_sys: self.blood_pressure_sys,
            blood_pressure_dia: self.blood_pressure_dia,
            heart_rate: self.heart_rate,
            blood_sugar: self.blood_sugar,
            temperature: self.temperature,
            weight: self.weight,
            oxygen_saturation: self.oxygen_saturation,
            notes: blank_to_none(self.notes),
            recorded_by: Some(recorded_by),
            created_at: db::utc_now(),
        }
    }
}

impl From<&NewVitalSign> for VitalReading {
    fn from(v: &NewVitalSign) -> Self {
        Self {
            systolic: v.blood_pressure_sys,
            diastolic: v.blood_pressure_dia,
            heart_rate: v.heart_rate,
            blood_sugar: v.blood_sugar,
        }
    }
}

// Handler to record vitals, raise threshold alerts and mirror the reading
// into health_records
pub async fn add_vitals(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
    body: web::Json<VitalsRequest>,
) -> Result<HttpResponse, ApiError> {
    user.require(CAREGIVERS)?;
    let elderly_id = path.into_inner();
    let vitals = body
        .into_inner()
        .into_new(elderly_id, user.id, Utc::now().naive_utc());

    let (id, alerts_created) = db::run(&pool, move |conn| {
        let elderly = accessible_elderly(conn, &user, elderly_id)?;

        let id: i32 = diesel::insert_into(vital_signs::table)
            .values(&vitals)
            .returning(vital_signs::id)
            .get_result(conn)?;

        let alerts_created = raise_vital_alerts(conn, &elderly, &VitalReading::from(&vitals), user.id)?;

        diesel::insert_into(health_records::table)
            .values(&NewHealthRecord::from(&vitals))
            .execute(conn)?;

        Ok((id, alerts_created))
    })
    .await
    .context("Gagal mencatat vital signs")?;

    info!(elderly_id, vital_id = id, alerts_created, "vital signs recorded");
    Ok(response::ok_with(
        "Vital signs berhasil dicatat",
        json!({ "id": id, "alerts_created": alerts_created }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub days: Option<i64>,
}

pub const DEFAULT_HISTORY_DAYS: i64 = 30;
pub const MAX_HISTORY_DAYS: i64 = 365;

pub fn history_days(requested: Option<i64>) -> i64 {
    requested
        .unwrap_or(DEFAULT_HISTORY_DAYS)
        .clamp(1, MAX_HISTORY_DAYS)
}

// Handler for chart data over the last N days
pub async fn health_history(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, ApiError> {
    user.require(CAREGIVERS)?;
    let elderly_id = path.into_inner();
    let days = history_days(query.days);

    let history = db::run(&pool, move |conn| {
        accessible_elderly(conn, &user, elderly_id)?;

        let since = (Utc::now().date_naive() - Duration::days(days)).and_time(NaiveTime::MIN);
        Ok(daily_vitals_since(conn, elderly_id, since)?)
    })
    .await
    .context("Gagal mengambil riwayat kesehatan")?;

    Ok(response::ok(json!({ "days": days, "history": history })))
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

pub async fn list_activities(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
    query: web::Query<LimitQuery>,
) -> Result<HttpResponse, ApiError> {
    user.require(CAREGIVERS)?;
    let elderly_id = path.into_inner();
    let limit = query.limit.unwrap_or(20);
    Validator::new()
        .check((1..=100).contains(&limit), "limit", "Limit harus antara 1 dan 100")
        .finish()?;

    let rows = db::run(&pool, move |conn| {
        accessible_elderly(conn, &user, elderly_id)?;
        Ok(activities::table
            .filter(activities::elderly_id.eq(elderly_id))
            .order(activities::activity_date.desc())
            .limit(limit)
            .select(Activity::as_select())
            .load(conn)?)
    })
    .await
    .context("Gagal mengambil aktivitas")?;

    Ok(response::ok(rows))
}

#[derive(Debug, Deserialize)]
pub struct ActivityRequest {
    #[serde(alias = "activityType")]
    pub activity_type: Option<String>,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub description: Option<String>,
}

pub async fn add_activity(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
    body: web::Json<ActivityRequest>,
) -> Result<HttpResponse, ApiError> {
    user.require(CAREGIVERS)?;
    let elderly_id = path.into_inner();
    let request = body.into_inner();
    Validator::new()
        .required(request.activity_type.as_deref(), "activity_type", "Jenis aktivitas harus diisi")
        .finish()?;

    let activity = NewActivity {
        elderly_id,
        activity_type: request.activity_type.unwrap_or_default().trim().to_string(),
        activity_date: Utc::now().naive_utc(),
        value: request.value,
        unit: blank_to_none(request.unit),
        description: blank_to_none(request.description),
        recorded_by: Some(user.id),
    };

    let created = db::run(&pool, move |conn| {
        accessible_elderly(conn, &user, elderly_id)?;
        Ok(diesel::insert_into(activities::table)
            .values(&activity)
            .returning(Activity::as_returning())
            .get_result(conn)?)
    })
    .await
    .context("Gagal mencatat aktivitas")?;

    Ok(response::ok_with("Aktivitas berhasil dicatat", created))
}

#[derive(Debug, Deserialize)]
pub struct MedicationRequest {
    #[serde(alias = "medicationName")]
    pub medication_name: Option<String>,
    pub dose: Option<String>,
    pub frequency: Option<String>,
    pub times: Option<String>,
    pub notes: Option<String>,
}

impl MedicationRequest {
    fn validate(&self) -> Result<(), ApiError> {
        Validator::new()
            .required(self.medication_name.as_deref(), "medication_name", "Nama obat harus diisi")
            .required(self.dose.as_deref(), "dose", "Dosis harus diisi")
            .required(self.frequency.as_deref(), "frequency", "Frekuensi harus diisi")
            .optional(
                self.times.as_deref().filter(|t| !t.trim().is_empty()),
                is_valid_time_list,
                "times",
                "Format waktu harus HH:MM, dipisahkan koma",
            )
            .finish()
    }
}

/// Normalises `8:00 ,20:00` to `08:00, 20:00`.
fn normalize_times(times: &str) -> String {
    times
        .split(',')
        .filter_map(crate::validation::parse_time)
        .map(|t| t.format("%H:%M").to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

// Handler to add a monitored medication schedule
pub async fn add_medication(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
    body: web::Json<MedicationRequest>,
) -> Result<HttpResponse, ApiError> {
    user.require(STAFF)?;
    let elderly_id = path.into_inner();
    let request = body.into_inner();
    request.validate()?;

    let medication = NewMonitoredMedication {
        elderly_id,
        medication_name: request.medication_name.unwrap_or_default().trim().to_string(),
        dose: request.dose.unwrap_or_default().trim().to_string(),
        frequency: request.frequency.unwrap_or_default().trim().to_string(),
        times: blank_to_none(request.times).map(|t| normalize_times(&t)),
        notes: blank_to_none(request.notes),
        created_by: Some(user.id),
    };

    let created = db::run(&pool, move |conn| {
        find_elderly(conn, elderly_id)?;
        Ok(diesel::insert_into(medications_monitoring::table)
            .values(&medication)
            .returning(MonitoredMedication::as_returning())
            .get_result(conn)?)
    })
    .await
    .context("Gagal menambahkan obat")?;

    Ok(response::created("Obat berhasil ditambahkan", created))
}

#[derive(Debug, Default, Deserialize)]
pub struct MedicationLogRequest {
    pub notes: Option<String>,
}

// Handler to mark a monitored medication as taken now
pub async fn log_medication(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
    body: Option<web::Json<MedicationLogRequest>>,
) -> Result<HttpResponse, ApiError> {
    let medication_id = path.into_inner();
    let notes = body.and_then(|b| blank_to_none(b.into_inner().notes));

    db::run(&pool, move |conn| {
        let elderly_id: i32 = medications_monitoring::table
            .find(medication_id)
            .select(medications_monitoring::elderly_id)
            .first(conn)
            .optional()?
            .ok_or_else(|| ApiError::not_found("Obat tidak ditemukan"))?;
        auth::authorize_elderly_access(conn, &user, elderly_id)?;

        diesel::insert_into(medication_monitoring_logs::table)
            .values(&NewMedicationMonitoringLog {
                medication_id,
                taken_at: Utc::now().naive_utc(),
                marked_by: Some(user.id),
                notes,
            })
            .execute(conn)?;
        Ok(())
    })
    .await
    .context("Gagal mencatat log obat")?;

    Ok(response::ok_message("Log obat berhasil dicatat"))
}

#[derive(Debug, Deserialize)]
pub struct AlertRequest {
    #[serde(alias = "elderlyId")]
    pub elderly_id: Option<i32>,
    #[serde(alias = "alertType")]
    pub alert_type: Option<String>,
    pub message: Option<String>,
    pub category: Option<String>,
}

impl AlertRequest {
    fn validate(&self) -> Result<(i32, AlertLevel), ApiError> {
        let elderly_id = auth::require_elderly_id(self.elderly_id)?;
        let level = self.alert_type.as_deref().and_then(|t| t.parse::<AlertLevel>().ok());
        Validator::new()
            .check(level.is_some(), "alert_type", "Tipe alert harus high, medium, atau low")
            .required(self.message.as_deref(), "message", "Pesan alert harus diisi")
            .finish()?;
        Ok((elderly_id, level.unwrap_or(AlertLevel::Low)))
    }
}

// Handler for staff to raise a manual alert
pub async fn create_alert(
    pool: web::Data<DbPool>,
    user: AuthUser,
    body: web::Json<AlertRequest>,
) -> Result<HttpResponse, ApiError> {
    user.require(STAFF)?;
    let request = body.into_inner();
    let (elderly_id, level) = request.validate()?;
    let message = request.message.unwrap_or_default().trim().to_string();
    let category = blank_to_none(request.category);

    let alert = db::run(&pool, move |conn| {
        let elderly = find_elderly(conn, elderly_id)?;

        let alert = diesel::insert_into(monitoring_alerts::table)
            .values(&NewMonitoringAlert {
                elderly_id,
                alert_type: level.as_str().to_string(),
                category,
                message: message.clone(),
                created_by: user.id,
                created_at: db::utc_now(),
            })
            .returning(MonitoringAlert::as_returning())
            .get_result(conn)?;

        let text = alert_notification(level, &elderly.full_name, &message);
        let notified = notify_family(conn, elderly_id, KIND_MONITORING_ALERT, "Alert Monitoring", &text)?;
        info!(alert_id = alert.id, elderly_id, notified, "manual alert created");
        Ok(alert)
    })
    .await
    .context("Gagal menambahkan alert")?;

    Ok(response::created("Alert berhasil ditambahkan", alert))
}

pub async fn dismiss_alert(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    user.require(CAREGIVERS)?;
    let alert_id = path.into_inner();

    db::run(&pool, move |conn| {
        let elderly_id: i32 = monitoring_alerts::table
            .find(alert_id)
            .select(monitoring_alerts::elderly_id)
            .first(conn)
            .optional()?
            .ok_or_else(|| ApiError::not_found("Alert tidak ditemukan"))?;
        auth::authorize_elderly_access(conn, &user, elderly_id)?;

        diesel::update(monitoring_alerts::table.find(alert_id))
            .set((
                monitoring_alerts::is_dismissed.eq(true),
                monitoring_alerts::dismissed_by.eq(Some(user.id)),
                monitoring_alerts::dismissed_at.eq(Some(Utc::now().naive_utc())),
            ))
            .execute(conn)?;
        Ok(())
    })
    .await
    .context("Gagal dismiss alert")?;

    Ok(response::ok_message("Alert berhasil di-dismiss"))
}

#[derive(Debug, QueryableByName)]
struct AdherenceCounts {
    #[diesel(sql_type = BigInt)]
    total_medications: i64,
    #[diesel(sql_type = BigInt)]
    taken_medications: i64,
}

#[derive(Debug, Serialize)]
struct MonitoringSummary {
    critical_elderly: i64,
    no_recent_checkup: i64,
    medication_adherence: i64,
    alerts_today: i64,
}

// Handler for the staff dashboard counters
pub async fn summary(pool: web::Data<DbPool>, user: AuthUser) -> Result<HttpResponse, ApiError> {
    user.require(STAFF)?;

    let summary = db::run(&pool, move |conn| {
        let now = Utc::now().naive_utc();

        let critical_elderly: i64 = monitoring_alerts::table
            .filter(monitoring_alerts::alert_type.eq(AlertLevel::High.as_str()))
            .filter(monitoring_alerts::is_dismissed.eq(false))
            .filter(monitoring_alerts::created_at.ge(now - Duration::hours(24)))
            .select(count(monitoring_alerts::elderly_id).aggregate_distinct())
            .get_result(conn)?;

        let no_recent_checkup: i64 = users::table
            .filter(users::role.eq(Role::Elderly.as_str()))
            .filter(
                users::id.ne_all(
                    vital_signs::table
                        .filter(vital_signs::measurement_date.ge(now - Duration::days(3)))
                        .select(vital_signs::elderly_id),
                ),
            )
            .count()
            .get_result(conn)?;

        let counts = diesel::sql_query(
            "SELECT COUNT(DISTINCT mm.id) AS total_medications, \
                    COUNT(DISTINCT mml.medication_id) AS taken_medications \
             FROM medications_monitoring mm \
             LEFT JOIN medication_monitoring_logs mml ON mm.id = mml.medication_id \
                  AND mml.taken_at >= $1 \
             WHERE mm.is_active = TRUE",
        )
        .bind::<Timestamp, _>(now - Duration::days(7))
        .get_result::<AdherenceCounts>(conn)?;

        let alerts_today: i64 = monitoring_alerts::table
            .filter(monitoring_alerts::created_at.ge(now.date().and_time(NaiveTime::MIN)))
            .count()
            .get_result(conn)?;

        Ok(MonitoringSummary {
            critical_elderly,
            no_recent_checkup,
            medication_adherence: adherence_rate(counts.total_medications, counts.taken_medications),
            alerts_today,
        })
    })
    .await
    .context("Gagal mengambil summary monitoring")?;

    Ok(response::ok(summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_window_is_clamped() {
        assert_eq!(history_days(None), 30);
        assert_eq!(history_days(Some(7)), 7);
        assert_eq!(history_days(Some(1000)), 365);
        assert_eq!(history_days(Some(0)), 1);
    }

    fn alert(created_at: NaiveDateTime) -> MonitoringAlert {
        MonitoringAlert {
            id: 11,
            elderly_id: 4,
            alert_type: "high".into(),
            category: Some("blood_pressure".into()),
            message: "Tekanan darah tinggi terdeteksi: 150/95 mmHg".into(),
            created_by: 7,
            is_dismissed: false,
            dismissed_by: None,
            dismissed_at: None,
            created_at,
        }
    }

    #[test]
    fn alerts_from_deleted_staff_keep_showing() {
        let now = NaiveDate::from_ymd_opt(2024, 6, 10)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();

        let view = AlertView::new(alert(now - Duration::hours(2)), None, now);
        assert_eq!(view.created_by, "Unknown");
        assert_eq!(view.created_at, "2 jam lalu");

        let view = AlertView::new(alert(now), Some("dr. Rina".into()), now);
        let body = serde_json::to_value(&view).unwrap();
        assert_eq!(body["created_by"], "dr. Rina");
        assert_eq!(body["type"], "high");
    }

    #[test]
    fn alert_notifications_name_level_and_elderly() {
        assert_eq!(
            alert_notification(AlertLevel::High, "Siti Aminah", "Tekanan darah tinggi terdeteksi: 150/95 mmHg"),
            "Alert high untuk Siti Aminah: Tekanan darah tinggi terdeteksi: 150/95 mmHg"
        );
    }

    #[test]
    fn alert_requests_need_level_and_message() {
        let request: AlertRequest =
            serde_json::from_value(json!({"elderlyId": 4, "alert_type": "urgent"})).unwrap();
        let Err(ApiError::Validation(errors)) = request.validate() else {
            panic!("expected validation failure");
        };
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["alert_type", "message"]);

        let missing_id: AlertRequest =
            serde_json::from_value(json!({"alert_type": "low", "message": "cek"})).unwrap();
        assert!(matches!(missing_id.validate(), Err(ApiError::BadRequest(_))));

        let ok: AlertRequest = serde_json::from_value(
            json!({"elderly_id": 4, "alert_type": "medium", "message": "Lupa minum obat"}),
        )
        .unwrap();
        assert_eq!(ok.validate().unwrap(), (4, AlertLevel::Medium));
    }

    #[test]
    fn medication_times_are_validated_and_normalised() {
        let request: MedicationRequest = serde_json::from_value(json!({
            "medication_name": "Amlodipine",
            "dose": "5 mg",
            "frequency": "2x sehari",
            "times": "8:00,20:00",
        }))
        .unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(normalize_times("8:00,20:00"), "08:00, 20:00");

        let bad: MedicationRequest = serde_json::from_value(json!({
            "medication_name": "Amlodipine",
            "dose": "5 mg",
            "frequency": "2x sehari",
            "times": "pagi",
        }))
        .unwrap();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn vitals_body_accepts_both_spellings() {
        let snake: VitalsRequest =
            serde_json::from_value(json!({"blood_pressure_sys": 150, "heart_rate": 72})).unwrap();
        let camel: VitalsRequest =
            serde_json::from_value(json!({"bloodPressureSys": 150, "heartRate": 72})).unwrap();
        assert_eq!(snake.blood_pressure_sys, camel.blood_pressure_sys);

        let at = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_time(NaiveTime::MIN);
        let new = snake.into_new(4, 1, at);
        let reading = VitalReading::from(&new);
        assert_eq!(reading.systolic, Some(150));
        assert_eq!(evaluate_vitals(&reading).len(), 1);
    }

    #[test]
    fn list_items_use_newest_check() {
        let now = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let row = ElderlyListRow {
            id: 4,
            full_name: "Siti Aminah".into(),
            phone: None,
            date_of_birth: NaiveDate::from_ymd_opt(1950, 1, 1),
            address: None,
            family_count: 2,
            last_vitals_check: Some(now - Duration::days(3)),
            last_health_check: Some(now - Duration::hours(2)),
        };
        let item = ElderlyListItem::from_row(row, now);
        assert_eq!(item.last_vitals, "2 jam lalu");
        assert_eq!(item.age, Some(74));
    }
}
