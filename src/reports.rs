use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Date, Float8, Int4, Nullable, Text, Timestamp};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::warn;

use crate::models::VitalSign;
use crate::monitoring::age_on;
use crate::schema::{activities, family_elderly_relations, medicines, users, vital_signs};

pub const OVERALL_REPORT: &str = "overall";

#[derive(Debug, Clone, QueryableByName, Serialize)]
pub struct OverallStats {
    #[diesel(sql_type = BigInt)]
    pub total_elderly: i64,
    #[diesel(sql_type = BigInt)]
    pub total_family: i64,
    #[diesel(sql_type = BigInt)]
    pub total_medical_staff: i64,
    #[diesel(sql_type = Nullable<Float8>)]
    pub average_age: Option<f64>,
}

#[derive(Debug, Clone, QueryableByName, Serialize)]
pub struct VitalsSummary {
    #[diesel(sql_type = BigInt)]
    pub elderly_with_vitals: i64,
    #[diesel(sql_type = BigInt)]
    pub total_measurements: i64,
    #[diesel(sql_type = Nullable<Float8>)]
    pub avg_sys: Option<f64>,
    #[diesel(sql_type = Nullable<Float8>)]
    pub avg_dia: Option<f64>,
    #[diesel(sql_type = Nullable<Float8>)]
    pub avg_heart_rate: Option<f64>,
    #[diesel(sql_type = Nullable<Float8>)]
    pub avg_blood_sugar: Option<f64>,
    #[diesel(sql_type = Nullable<Float8>)]
    pub avg_oxygen: Option<f64>,
}

#[derive(Debug, Clone, QueryableByName, Serialize)]
pub struct CriticalVitals {
    #[diesel(sql_type = BigInt)]
    pub critical_bp: i64,
    #[diesel(sql_type = BigInt)]
    pub critical_hr: i64,
    #[diesel(sql_type = BigInt)]
    pub critical_oxygen: i64,
}

#[derive(Debug, Clone, QueryableByName, Serialize)]
pub struct MedicationCompliance {
    #[diesel(sql_type = BigInt)]
    pub elderly_with_medication: i64,
    #[diesel(sql_type = BigInt)]
    pub total_medicines: i64,
    #[diesel(sql_type = BigInt)]
    pub taken_count: i64,
    #[diesel(sql_type = BigInt)]
    pub missed_count: i64,
    #[diesel(sql_type = Nullable<Float8>)]
    pub compliance_rate: Option<f64>,
}

#[derive(Debug, Clone, QueryableByName, Serialize)]
pub struct ActivitySummary {
    #[diesel(sql_type = Text)]
    pub activity_type: String,
    #[diesel(sql_type = BigInt)]
    pub count: i64,
    #[diesel(sql_type = Nullable<Float8>)]
    pub avg_value: Option<f64>,
}

#[derive(Debug, Clone, QueryableByName, Serialize)]
pub struct AppointmentStats {
    #[diesel(sql_type = BigInt)]
    pub total_appointments: i64,
    #[diesel(sql_type = BigInt)]
    pub scheduled: i64,
    #[diesel(sql_type = BigInt)]
    pub completed: i64,
    #[diesel(sql_type = BigInt)]
    pub cancelled: i64,
    #[diesel(sql_type = BigInt)]
    pub missed: i64,
}

#[derive(Debug, Clone, QueryableByName, Serialize)]
pub struct AlertSummary {
    #[diesel(sql_type = Text)]
    pub alert_type: String,
    #[diesel(sql_type = BigInt)]
    pub count: i64,
    #[diesel(sql_type = BigInt)]
    pub active_count: i64,
}

#[derive(Debug, Clone, Queryable, Serialize)]
pub struct ElderlyProfile {
    pub id: i32,
    pub full_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub blood_type: Option<String>,
    pub medical_conditions: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Queryable, Serialize)]
pub struct FamilyMember {
    pub full_name: String,
    pub phone: Option<String>,
    pub relationship: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElderlyDetail {
    #[serde(flatten)]
    pub profile: ElderlyProfile,
    pub age: Option<i32>,
    pub latest_vital: Option<VitalSign>,
    pub family_members: Vec<FamilyMember>,
    pub active_medicines: i64,
    pub last_activity: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    pub report_type: String,
    pub generated_at: NaiveDateTime,
    pub period: Period,
    pub generated_by: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VitalsSection {
    #[serde(flatten)]
    pub summary: VitalsSummary,
    pub critical: CriticalVitals,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub overall: OverallStats,
    pub vitals: VitalsSection,
    pub medication: MedicationCompliance,
    pub appointments: AppointmentStats,
    pub alerts: Vec<AlertSummary>,
}

/// The document persisted in `health_reports.report_data`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportData {
    pub metadata: ReportMetadata,
    pub summary: ReportSummary,
    pub activities: Vec<ActivitySummary>,
    pub elderly_details: Vec<ElderlyDetail>,
}

/// Runs every aggregate for the period and assembles the report.
pub fn build_overall_report(
    conn: &mut PgConnection,
    start: NaiveDate,
    end: NaiveDate,
    generated_by: &str,
    now: NaiveDateTime,
) -> QueryResult<ReportData> {
    let overall = diesel::sql_query(
        "SELECT COUNT(DISTINCT u.id) AS total_elderly, \
                COUNT(DISTINCT fer.family_user_id) AS total_family, \
                COUNT(DISTINCT ma.medical_id) AS total_medical_staff, \
                AVG(EXTRACT(YEAR FROM CURRENT_DATE) - EXTRACT(YEAR FROM u.date_of_birth))::float8 AS average_age \
         FROM users u \
         LEFT JOIN family_elderly_relations fer ON u.id = fer.elderly_user_id \
         LEFT JOIN medical_assignments ma ON u.id = ma.elderly_id AND ma.is_active = TRUE \
         WHERE u.role = 'elderly' AND u.is_active = TRUE",
    )
    .get_result::<OverallStats>(conn)?;

    let vitals = diesel::sql_query(
        "SELECT COUNT(DISTINCT elderly_id) AS elderly_with_vitals, \
                COUNT(*) AS total_measurements, \
                AVG(blood_pressure_sys)::float8 AS avg_sys, \
                AVG(blood_pressure_dia)::float8 AS avg_dia, \
                AVG(heart_rate)::float8 AS avg_heart_rate, \
                AVG(blood_sugar)::float8 AS avg_blood_sugar, \
                AVG(oxygen_saturation)::float8 AS avg_oxygen \
         FROM vital_signs \
         WHERE measurement_date::date BETWEEN $1 AND $2",
    )
    .bind::<Date, _>(start)
    .bind::<Date, _>(end)
    .get_result::<VitalsSummary>(conn)?;

    let critical = diesel::sql_query(
        "SELECT COUNT(*) FILTER (WHERE vs.blood_pressure_sys > COALESCE(vt.sys_max, 140) \
                                    OR vs.blood_pressure_sys < COALESCE(vt.sys_min, 90)) AS critical_bp, \
                COUNT(*) FILTER (WHERE vs.heart_rate > COALESCE(vt.heart_rate_max, 100) \
                                    OR vs.heart_rate < COALESCE(vt.heart_rate_min, 60)) AS critical_hr, \
                COUNT(*) FILTER (WHERE vs.oxygen_saturation < COALESCE(vt.oxygen_min, 95)) AS critical_oxygen \
         FROM vital_signs vs \
         LEFT JOIN vital_thresholds vt ON vs.elderly_id = vt.elderly_id \
         WHERE vs.measurement_date::date BETWEEN $1 AND $2",
    )
    .bind::<Date, _>(start)
    .bind::<Date, _>(end)
    .get_result::<CriticalVitals>(conn)?;

    let medication = diesel::sql_query(
        "SELECT COUNT(DISTINCT m.user_id) AS elderly_with_medication, \
                COUNT(DISTINCT m.id) AS total_medicines, \
                COUNT(ml.id) FILTER (WHERE ml.status = 'taken') AS taken_count, \
                COUNT(ml.id) FILTER (WHERE ml.status = 'missed') AS missed_count, \
                ROUND(COUNT(ml.id) FILTER (WHERE ml.status = 'taken') * 100.0 \
                      / NULLIF(COUNT(ml.id), 0), 2)::float8 AS compliance_rate \
         FROM medicines m \
         LEFT JOIN medicine_logs ml ON m.id = ml.medicine_id \
              AND ml.taken_at::date BETWEEN $1 AND $2 \
         WHERE m.is_active = TRUE",
    )
    .bind::<Date, _>(start)
    .bind::<Date, _>(end)
    .get_result::<MedicationCompliance>(conn)?;

    let activity_summary = diesel::sql_query(
        "SELECT activity_type, COUNT(*) AS count, AVG(value)::float8 AS avg_value \
         FROM activities \
         WHERE activity_date::date BETWEEN $1 AND $2 \
         GROUP BY activity_type \
         ORDER BY activity_type",
    )
    .bind::<Date, _>(start)
    .bind::<Date, _>(end)
    .load::<ActivitySummary>(conn)?;

    let appointments = diesel::sql_query(
        "SELECT COUNT(*) AS total_appointments, \
                COUNT(*) FILTER (WHERE status = 'scheduled') AS scheduled, \
                COUNT(*) FILTER (WHERE status = 'completed') AS completed, \
                COUNT(*) FILTER (WHERE status = 'cancelled') AS cancelled, \
                COUNT(*) FILTER (WHERE status = 'missed') AS missed \
         FROM appointments \
         WHERE appointment_date BETWEEN $1 AND $2",
    )
    .bind::<Date, _>(start)
    .bind::<Date, _>(end)
    .get_result::<AppointmentStats>(conn)?;

    let alerts = diesel::sql_query(
        "SELECT alert_type, COUNT(*) AS count, \
                COUNT(*) FILTER (WHERE is_dismissed = FALSE) AS active_count \
         FROM monitoring_alerts \
         WHERE created_at::date BETWEEN $1 AND $2 \
         GROUP BY alert_type \
         ORDER BY alert_type",
    )
    .bind::<Date, _>(start)
    .bind::<Date, _>(end)
    .load::<AlertSummary>(conn)?;

    let elderly_details = elderly_details(conn, now.date())?;

    Ok(ReportData {
        metadata: ReportMetadata {
            report_type: OVERALL_REPORT.to_string(),
            generated_at: now,
            period: Period { start, end },
            generated_by: generated_by.to_string(),
        },
        summary: ReportSummary {
            overall,
            vitals: VitalsSection {
                summary: vitals,
                critical,
            },
            medication,
            appointments,
            alerts,
        },
        activities: activity_summary,
        elderly_details,
    })
}

fn elderly_details(conn: &mut PgConnection, today: NaiveDate) -> QueryResult<Vec<ElderlyDetail>> {
    let profiles: Vec<ElderlyProfile> = users::table
        .filter(users::role.eq("elderly"))
        .filter(users::is_active.eq(true))
        .order(users::full_name.asc())
        .select((
            users::id,
            users::full_name,
            users::date_of_birth,
            users::blood_type,
            users::medical_conditions,
            users::phone,
            users::address,
        ))
        .load(conn)?;

    let mut details = Vec::with_capacity(profiles.len());
    for profile in profiles {
        let latest_vital = vital_signs::table
            .filter(vital_signs::elderly_id.eq(profile.id))
            .order(vital_signs::measurement_date.desc())
            .select(VitalSign::as_select())
            .first(conn)
            .optional()?;

        let family_members = family_elderly_relations::table
            .inner_join(users::table.on(users::id.eq(family_elderly_relations::family_user_id)))
            .filter(family_elderly_relations::elderly_user_id.eq(profile.id))
            .select((
                users::full_name,
                users::phone,
                family_elderly_relations::relationship,
            ))
            .load::<FamilyMember>(conn)?;

        let active_medicines = medicines::table
            .filter(medicines::user_id.eq(profile.id))
            .filter(medicines::is_active.eq(true))
            .count()
            .get_result(conn)?;

        let last_activity = activities::table
            .filter(activities::elderly_id.eq(profile.id))
            .select(diesel::dsl::max(activities::activity_date))
            .first(conn)?;

        details.push(ElderlyDetail {
            age: profile.date_of_birth.map(|dob| age_on(dob, today)),
            profile,
            latest_vital,
            family_members,
            active_medicines,
            last_activity,
        });
    }

    Ok(details)
}

/// A saved report joined with the names of its subject and creator.
#[derive(Debug, Clone, QueryableByName)]
pub struct SavedReportRow {
    #[diesel(sql_type = Int4)]
    pub id: i32,
    #[diesel(sql_type = Nullable<Int4>)]
    pub elderly_id: Option<i32>,
    #[diesel(sql_type = Nullable<Text>)]
    pub elderly_name: Option<String>,
    #[diesel(sql_type = Text)]
    pub report_type: String,
    #[diesel(sql_type = Date)]
    pub start_date: NaiveDate,
    #[diesel(sql_type = Date)]
    pub end_date: NaiveDate,
    #[diesel(sql_type = Nullable<Text>)]
    pub report_data: Option<String>,
    #[diesel(sql_type = Int4)]
    pub created_by: i32,
    #[diesel(sql_type = Nullable<Text>)]
    pub created_by_name: Option<String>,
    #[diesel(sql_type = Timestamp)]
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct SavedReport {
    pub id: i32,
    pub elderly_id: Option<i32>,
    pub elderly_name: Option<String>,
    pub report_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub created_at: NaiveDateTime,
    pub created_by: i32,
    pub created_by_name: Option<String>,
    pub report_data: Value,
}

impl From<SavedReportRow> for SavedReport {
    fn from(row: SavedReportRow) -> Self {
        let report_data = parse_report_data(&row);
        Self {
            id: row.id,
            elderly_id: row.elderly_id,
            elderly_name: row.elderly_name,
            report_type: row.report_type,
            start_date: row.start_date,
            end_date: row.end_date,
            created_at: row.created_at,
            created_by: row.created_by,
            created_by_name: row.created_by_name,
            report_data,
        }
    }
}

/// Reads a stored report blob. Anything that is not a JSON object becomes
/// `{}`, and older reports without `metadata` get one rebuilt from the row.
pub fn parse_report_data(row: &SavedReportRow) -> Value {
    let parsed = match row.report_data.as_deref() {
        None => None,
        Some(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(report_id = row.id, error = %e, "unreadable report data");
                None
            }
        },
    };

    let mut data = parsed
        .filter(Value::is_object)
        .unwrap_or_else(|| json!({}));

    if !data.get("metadata").is_some_and(Value::is_object) {
        data["metadata"] = json!({
            "reportType": row.report_type,
            "generatedAt": row.created_at,
            "period": { "start": row.start_date, "end": row.end_date },
            "generatedBy": row.created_by_name.as_deref().unwrap_or("Unknown"),
        });
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(report_data: Option<&str>) -> SavedReportRow {
        SavedReportRow {
            id: 12,
            elderly_id: None,
            elderly_name: None,
            report_type: "overall".into(),
            start_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 6, 7).unwrap(),
            report_data: report_data.map(str::to_string),
            created_by: 1,
            created_by_name: Some("Dr. Admin".into()),
            created_at: NaiveDate::from_ymd_opt(2024, 6, 8)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
        }
    }

    #[test]
    fn intact_reports_pass_through() {
        let raw = r#"{"metadata":{"reportType":"overall","generatedBy":"Siti"},"summary":{"x":1}}"#;
        let data = parse_report_data(&row(Some(raw)));
        assert_eq!(data["metadata"]["generatedBy"], "Siti");
        assert_eq!(data["summary"]["x"], 1);
    }

    #[test]
    fn legacy_reports_get_metadata_from_row() {
        let data = parse_report_data(&row(Some(r#"{"summary":{"overall":{}}}"#)));
        assert_eq!(data["metadata"]["reportType"], "overall");
        assert_eq!(data["metadata"]["period"]["start"], "2024-06-01");
        assert_eq!(data["metadata"]["period"]["end"], "2024-06-07");
        assert_eq!(data["metadata"]["generatedBy"], "Dr. Admin");
        assert!(data["summary"]["overall"].is_object());
    }

    #[test]
    fn garbage_and_missing_blobs_become_metadata_only() {
        for raw in [Some("not json"), Some("[1,2,3]"), Some("null"), None] {
            let data = parse_report_data(&row(raw));
            let keys: Vec<_> = data.as_object().unwrap().keys().cloned().collect();
            assert_eq!(keys, ["metadata"]);
        }
    }

    #[test]
    fn generated_report_serializes_in_camel_case() {
        let data = ReportData {
            metadata: ReportMetadata {
                report_type: OVERALL_REPORT.into(),
                generated_at: row(None).created_at,
                period: Period {
                    start: row(None).start_date,
                    end: row(None).end_date,
                },
                generated_by: "Dr. Admin".into(),
            },
            summary: ReportSummary {
                overall: OverallStats {
                    total_elderly: 3,
                    total_family: 2,
                    total_medical_staff: 1,
                    average_age: Some(71.5),
                },
                vitals: VitalsSection {
                    summary: VitalsSummary {
                        elderly_with_vitals: 2,
                        total_measurements: 9,
                        avg_sys: Some(131.0),
                        avg_dia: Some(84.0),
                        avg_heart_rate: None,
                        avg_blood_sugar: None,
                        avg_oxygen: None,
                    },
                    critical: CriticalVitals {
                        critical_bp: 1,
                        critical_hr: 0,
                        critical_oxygen: 0,
                    },
                },
                medication: MedicationCompliance {
                    elderly_with_medication: 0,
                    total_medicines: 0,
                    taken_count: 0,
                    missed_count: 0,
                    compliance_rate: None,
                },
                appointments: AppointmentStats {
                    total_appointments: 0,
                    scheduled: 0,
                    completed: 0,
                    cancelled: 0,
                    missed: 0,
                },
                alerts: vec![],
            },
            activities: vec![],
            elderly_details: vec![],
        };

        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["metadata"]["reportType"], "overall");
        assert_eq!(value["summary"]["vitals"]["total_measurements"], 9);
        assert_eq!(value["summary"]["vitals"]["critical"]["critical_bp"], 1);
        assert!(value["summary"]["medication"]["compliance_rate"].is_null());
        assert!(value["elderlyDetails"].as_array().unwrap().is_empty());
    }
}
