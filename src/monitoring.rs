use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use diesel::QueryableByName;
use diesel::sql_types::{Date, Float8, Nullable};
use serde::{Deserialize, Serialize};

pub const SYSTOLIC_HIGH: i32 = 140;
pub const DIASTOLIC_HIGH: i32 = 90;
pub const BLOOD_SUGAR_HIGH: f64 = 125.0;
pub const HEART_RATE_MIN: i32 = 60;
pub const HEART_RATE_MAX: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    High,
    Medium,
    Low,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::High => "high",
            AlertLevel::Medium => "medium",
            AlertLevel::Low => "low",
        }
    }
}

impl FromStr for AlertLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(AlertLevel::High),
            "medium" => Ok(AlertLevel::Medium),
            "low" => Ok(AlertLevel::Low),
            other => Err(anyhow!("unknown alert level: {other}")),
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The subset of a measurement the alert rules look at.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VitalReading {
    pub systolic: Option<i32>,
    pub diastolic: Option<i32>,
    pub heart_rate: Option<i32>,
    pub blood_sugar: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingAlert {
    pub level: AlertLevel,
    pub category: &'static str,
    pub message: String,
}

fn show<T: fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Threshold rules applied on every vitals submission. Missing values never
/// trigger a rule.
pub fn evaluate_vitals(reading: &VitalReading) -> Vec<PendingAlert> {
    let mut alerts = Vec::new();

    let sys_high = reading.systolic.is_some_and(|v| v > SYSTOLIC_HIGH);
    let dia_high = reading.diastolic.is_some_and(|v| v > DIASTOLIC_HIGH);
    if sys_high || dia_high {
        alerts.push(PendingAlert {
            level: AlertLevel::High,
            category: "blood_pressure",
            message: format!(
                "Tekanan darah tinggi terdeteksi: {}/{} mmHg",
                show(reading.systolic),
                show(reading.diastolic)
            ),
        });
    }

    if let Some(sugar) = reading.blood_sugar.filter(|v| *v > BLOOD_SUGAR_HIGH) {
        alerts.push(PendingAlert {
            level: AlertLevel::High,
            category: "blood_sugar",
            message: format!("Gula darah tinggi terdeteksi: {sugar} mg/dL"),
        });
    }

    if let Some(hr) = reading
        .heart_rate
        .filter(|v| *v < HEART_RATE_MIN || *v > HEART_RATE_MAX)
    {
        alerts.push(PendingAlert {
            level: AlertLevel::Medium,
            category: "heart_rate",
            message: format!("Detak jantung abnormal: {hr} bpm"),
        });
    }

    alerts
}

/// Whole years between `birth` and `today`.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    age
}

pub fn last_check_label(last: Option<NaiveDateTime>, now: NaiveDateTime) -> String {
    let Some(last) = last else {
        return "Belum ada".to_string();
    };

    let hours = (now - last).num_hours();
    if hours < 1 {
        "Kurang dari 1 jam lalu".to_string()
    } else if hours < 24 {
        format!("{hours} jam lalu")
    } else {
        format!("{} hari lalu", hours / 24)
    }
}

pub fn relative_time(at: NaiveDateTime, now: NaiveDateTime) -> String {
    let elapsed = now - at;
    let minutes = elapsed.num_minutes();
    let hours = elapsed.num_hours();
    let days = elapsed.num_days();

    if minutes < 60 {
        format!("{} menit lalu", minutes.max(0))
    } else if hours < 24 {
        format!("{hours} jam lalu")
    } else if days < 7 {
        format!("{days} hari lalu")
    } else {
        format!("{}/{}/{}", at.day(), at.month(), at.year())
    }
}

pub fn format_activity_time(at: NaiveDateTime) -> String {
    at.format("%H.%M").to_string()
}

/// Activity reading as shown on the dashboard, e.g. `3500 langkah`.
pub fn activity_value(value: Option<f64>, unit: Option<&str>) -> Option<String> {
    let value = value?;
    match unit.filter(|u| !u.trim().is_empty()) {
        Some(unit) => Some(format!("{value} {unit}")),
        None => Some(value.to_string()),
    }
}

/// Percentage of active medications with at least one logged dose, rounded.
pub fn adherence_rate(total: i64, taken: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    ((taken as f64 / total as f64) * 100.0).round() as i64
}

/// One day of averaged vitals, as returned by the chart queries.
#[derive(Debug, Clone, PartialEq, QueryableByName, Serialize)]
pub struct DailyVitals {
    #[diesel(sql_type = Date)]
    pub date: NaiveDate,
    #[diesel(sql_type = Nullable<Float8>)]
    pub avg_sys: Option<f64>,
    #[diesel(sql_type = Nullable<Float8>)]
    pub avg_dia: Option<f64>,
    #[diesel(sql_type = Nullable<Float8>)]
    pub avg_hr: Option<f64>,
    #[diesel(sql_type = Nullable<Float8>)]
    pub avg_bs: Option<f64>,
}

/// Merges the per-day averages of both vitals tables. The first row seen for
/// a day wins unless it has no systolic average.
pub fn merge_vital_history(
    primary: Vec<DailyVitals>,
    legacy: Vec<DailyVitals>,
) -> Vec<DailyVitals> {
    let mut by_day: BTreeMap<NaiveDate, DailyVitals> = BTreeMap::new();

    for row in primary.into_iter().chain(legacy) {
        let replace = by_day
            .get(&row.date)
            .is_none_or(|existing| existing.avg_sys.is_none());
        if replace {
            by_day.insert(row.date, row);
        }
    }

    by_day.into_values().collect()
}

/// Most recent reading in the shape the dashboard expects; every field is
/// null when nothing has been recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatestVitals {
    pub blood_pressure_sys: Option<i32>,
    pub blood_pressure_dia: Option<i32>,
    pub heart_rate: Option<i32>,
    pub blood_sugar: Option<f64>,
    pub temperature: Option<f64>,
    pub weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oxygen_saturation: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement_date: Option<NaiveDateTime>,
}

impl From<&crate::models::VitalSign> for LatestVitals {
    fn from(v: &crate::models::VitalSign) -> Self {
        Self {
            blood_pressure_sys: v.blood_pressure_sys,
            blood_pressure_dia: v.blood_pressure_dia,
            heart_rate: v.heart_rate,
            blood_sugar: v.blood_sugar,
            temperature: v.temperature,
            weight: v.weight,
            oxygen_saturation: v.oxygen_saturation,
            measurement_date: Some(v.measurement_date),
        }
    }
}

impl From<&crate::models::HealthRecord> for LatestVitals {
    fn from(r: &crate::models::HealthRecord) -> Self {
        Self {
            blood_pressure_sys: r.blood_pressure_systolic,
            blood_pressure_dia: r.blood_pressure_diastolic,
            heart_rate: r.heart_rate,
            blood_sugar: r.blood_sugar_level,
            temperature: r.temperature,
            weight: r.weight,
            oxygen_saturation: None,
            measurement_date: Some(r.recorded_at),
        }
    }
}

/// Picks the newer of the two schemas' latest readings; ties go to the
/// legacy row.
pub fn latest_of(primary: Option<LatestVitals>, legacy: Option<LatestVitals>) -> LatestVitals {
    match (primary, legacy) {
        (Some(p), Some(l)) => {
            if p.measurement_date > l.measurement_date {
                p
            } else {
                l
            }
        }
        (Some(v), None) | (None, Some(v)) => v,
        (None, None) => LatestVitals::default(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveTime};

    use super::*;

    fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDateTime::new(
            NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            NaiveTime::parse_from_str(time, "%H:%M").unwrap(),
        )
    }

    #[test]
    fn normal_vitals_raise_nothing() {
        let reading = VitalReading {
            systolic: Some(120),
            diastolic: Some(80),
            heart_rate: Some(72),
            blood_sugar: Some(100.0),
        };
        assert!(evaluate_vitals(&reading).is_empty());
        assert!(evaluate_vitals(&VitalReading::default()).is_empty());
    }

    #[test]
    fn every_rule_can_fire_together() {
        let reading = VitalReading {
            systolic: Some(150),
            diastolic: Some(85),
            heart_rate: Some(110),
            blood_sugar: Some(180.5),
        };
        let alerts = evaluate_vitals(&reading);

        assert_eq!(alerts.len(), 3);
        assert_eq!(alerts[0].level, AlertLevel::High);
        assert_eq!(alerts[0].message, "Tekanan darah tinggi terdeteksi: 150/85 mmHg");
        assert_eq!(alerts[1].level, AlertLevel::High);
        assert_eq!(alerts[1].message, "Gula darah tinggi terdeteksi: 180.5 mg/dL");
        assert_eq!(alerts[2].level, AlertLevel::Medium);
        assert_eq!(alerts[2].message, "Detak jantung abnormal: 110 bpm");
    }

    #[test]
    fn thresholds_are_exclusive() {
        let reading = VitalReading {
            systolic: Some(140),
            diastolic: Some(90),
            heart_rate: Some(60),
            blood_sugar: Some(125.0),
        };
        assert!(evaluate_vitals(&reading).is_empty());

        let diastolic_only = VitalReading {
            diastolic: Some(95),
            ..Default::default()
        };
        let alerts = evaluate_vitals(&diastolic_only);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].message, "Tekanan darah tinggi terdeteksi: -/95 mmHg");

        let slow = VitalReading {
            heart_rate: Some(55),
            ..Default::default()
        };
        assert_eq!(evaluate_vitals(&slow)[0].level, AlertLevel::Medium);
    }

    #[test]
    fn whole_sugar_values_print_without_fraction() {
        let reading = VitalReading {
            blood_sugar: Some(130.0),
            ..Default::default()
        };
        assert_eq!(
            evaluate_vitals(&reading)[0].message,
            "Gula darah tinggi terdeteksi: 130 mg/dL"
        );
    }

    #[test]
    fn age_counts_birthdays() {
        let birth = NaiveDate::from_ymd_opt(1950, 6, 15).unwrap();
        assert_eq!(age_on(birth, NaiveDate::from_ymd_opt(2024, 6, 14).unwrap()), 73);
        assert_eq!(age_on(birth, NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()), 74);
        assert_eq!(age_on(birth, NaiveDate::from_ymd_opt(2024, 12, 1).unwrap()), 74);
    }

    #[test]
    fn last_check_labels() {
        let now = at("2024-06-10", "12:00");
        assert_eq!(last_check_label(None, now), "Belum ada");
        assert_eq!(
            last_check_label(Some(now - Duration::minutes(30)), now),
            "Kurang dari 1 jam lalu"
        );
        assert_eq!(last_check_label(Some(now - Duration::hours(5)), now), "5 jam lalu");
        assert_eq!(last_check_label(Some(now - Duration::hours(50)), now), "2 hari lalu");
    }

    #[test]
    fn relative_times() {
        let now = at("2024-06-10", "12:00");
        assert_eq!(relative_time(now - Duration::minutes(5), now), "5 menit lalu");
        assert_eq!(relative_time(now - Duration::hours(3), now), "3 jam lalu");
        assert_eq!(relative_time(now - Duration::days(2), now), "2 hari lalu");
        assert_eq!(relative_time(at("2024-05-03", "08:00"), now), "3/5/2024");
    }

    #[test]
    fn activity_time_uses_dot_separator() {
        assert_eq!(format_activity_time(at("2024-06-10", "07:05")), "07.05");
    }

    #[test]
    fn activity_values_join_unit() {
        assert_eq!(activity_value(Some(3500.0), Some("langkah")).as_deref(), Some("3500 langkah"));
        assert_eq!(activity_value(Some(7.5), None).as_deref(), Some("7.5"));
        assert_eq!(activity_value(None, Some("jam")), None);
    }

    #[test]
    fn adherence_rounds_and_handles_empty() {
        assert_eq!(adherence_rate(0, 0), 0);
        assert_eq!(adherence_rate(3, 2), 67);
        assert_eq!(adherence_rate(4, 4), 100);
    }

    fn day(d: &str, sys: Option<f64>) -> DailyVitals {
        DailyVitals {
            date: NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap(),
            avg_sys: sys,
            avg_dia: None,
            avg_hr: Some(70.0),
            avg_bs: None,
        }
    }

    #[test]
    fn history_merge_prefers_rows_with_systolic() {
        let primary = vec![day("2024-06-09", None), day("2024-06-07", Some(130.0))];
        let legacy = vec![
            day("2024-06-09", Some(125.0)),
            day("2024-06-07", Some(110.0)),
            day("2024-06-08", None),
        ];

        let merged = merge_vital_history(primary, legacy);
        let dates: Vec<_> = merged.iter().map(|d| d.date.to_string()).collect();
        assert_eq!(dates, ["2024-06-07", "2024-06-08", "2024-06-09"]);
        assert_eq!(merged[0].avg_sys, Some(130.0));
        assert_eq!(merged[2].avg_sys, Some(125.0));
    }

    #[test]
    fn latest_reading_comes_from_newer_schema() {
        let older = LatestVitals {
            heart_rate: Some(80),
            measurement_date: Some(at("2024-06-01", "08:00")),
            ..Default::default()
        };
        let newer = LatestVitals {
            heart_rate: Some(65),
            measurement_date: Some(at("2024-06-02", "08:00")),
            ..Default::default()
        };

        assert_eq!(latest_of(Some(older.clone()), Some(newer.clone())).heart_rate, Some(65));
        assert_eq!(latest_of(Some(newer), Some(older)).heart_rate, Some(65));
        assert_eq!(latest_of(None, None), LatestVitals::default());
    }

    #[test]
    fn empty_vitals_serialize_as_nulls() {
        let value = serde_json::to_value(LatestVitals::default()).unwrap();
        assert!(value["blood_pressure_sys"].is_null());
        assert!(value["weight"].is_null());
        assert!(value.get("measurement_date").is_none());
    }
}
