use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use diesel::prelude::*;
use serde::Serialize;

use crate::db;
use crate::schema::{
    activities, activity_logs, appointments, chats, emergency_contacts, family_elderly_relations,
    health_records, health_reports, medication_monitoring_logs, medications_monitoring,
    medicine_logs, medicines, monitoring_alerts, notifications, user_settings, users,
    vital_signs,
};

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: i32,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub profile_image: Option<String>,
    pub blood_type: Option<String>,
    pub medical_conditions: Option<String>,
    pub allergies: Option<String>,
    pub is_active: bool,
    pub last_login: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// The columns loaded for every authenticated request.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SessionUser {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserSummary {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub phone: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserProfile {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub profile_image: Option<String>,
    pub blood_type: Option<String>,
    pub medical_conditions: Option<String>,
    pub allergies: Option<String>,
    pub last_login: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

/// Partial update. Outer `None` leaves a column alone, `Some(None)` clears
/// a nullable one.
#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = users)]
pub struct UserChangeset {
    pub username: Option<String>,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: Option<String>,
    pub phone: Option<Option<String>>,
    pub address: Option<Option<String>>,
    pub date_of_birth: Option<Option<NaiveDate>>,
    pub blood_type: Option<Option<String>>,
    pub medical_conditions: Option<Option<String>>,
    pub allergies: Option<Option<String>>,
    pub updated_at: Option<NaiveDateTime>,
}

impl UserChangeset {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.full_name.is_none()
            && self.role.is_none()
            && self.phone.is_none()
            && self.address.is_none()
            && self.date_of_birth.is_none()
            && self.blood_type.is_none()
            && self.medical_conditions.is_none()
            && self.allergies.is_none()
    }
}

/// A user on the other side of a family/elderly link.
#[derive(Debug, Clone, Queryable, Serialize)]
pub struct RelatedUser {
    pub id: i32,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub relationship: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = family_elderly_relations)]
pub struct NewFamilyRelation {
    pub family_user_id: i32,
    pub elderly_user_id: i32,
    pub relationship: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = user_settings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    pub user_id: i32,
    pub email_notifications: bool,
    pub sms_notifications: bool,
    pub push_notifications: bool,
    pub theme: String,
    pub language: String,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = user_settings)]
pub struct NewUserSettings {
    pub user_id: i32,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = user_settings)]
pub struct UserSettingsChangeset {
    pub email_notifications: Option<bool>,
    pub sms_notifications: Option<bool>,
    pub push_notifications: Option<bool>,
    pub theme: Option<String>,
    pub language: Option<String>,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = emergency_contacts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct EmergencyContact {
    pub id: i32,
    pub user_id: i32,
    pub contact_name: String,
    pub contact_phone: String,
    pub relationship: Option<String>,
    pub priority: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = emergency_contacts)]
pub struct NewEmergencyContact {
    pub user_id: i32,
    pub contact_name: String,
    pub contact_phone: String,
    pub relationship: Option<String>,
    pub priority: i32,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = emergency_contacts)]
pub struct EmergencyContactChangeset {
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub relationship: Option<Option<String>>,
    pub priority: Option<i32>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = notifications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Notification {
    pub id: i32,
    pub user_id: i32,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = notifications)]
pub struct NewNotification {
    pub user_id: i32,
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub created_at: NaiveDateTime,
}

impl NewNotification {
    pub fn new(user_id: i32, kind: &str, title: &str, message: impl Into<String>) -> Self {
        Self {
            user_id,
            notification_type: kind.to_string(),
            title: title.to_string(),
            message: message.into(),
            created_at: db::utc_now(),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = activity_logs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ActivityLog {
    pub id: i32,
    pub user_id: i32,
    pub action: String,
    pub description: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = activity_logs)]
pub struct NewActivityLog<'a> {
    pub user_id: i32,
    pub action: &'a str,
    pub description: Option<&'a str>,
    pub ip_address: Option<&'a str>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = medicines)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Medicine {
    pub id: i32,
    pub user_id: i32,
    pub medicine_name: String,
    pub dosage: String,
    pub frequency: String,
    pub time_schedule: Option<NaiveTime>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_by: Option<i32>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = medicines)]
pub struct NewMedicine {
    pub user_id: i32,
    pub medicine_name: String,
    pub dosage: String,
    pub frequency: String,
    pub time_schedule: Option<NaiveTime>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_by: Option<i32>,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = medicines)]
pub struct MedicineChangeset {
    pub medicine_name: Option<String>,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub time_schedule: Option<Option<NaiveTime>>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<Option<NaiveDate>>,
    pub notes: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = medicine_logs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MedicineLog {
    pub id: i32,
    pub medicine_id: i32,
    pub taken_at: NaiveDateTime,
    pub status: String,
    pub notes: Option<String>,
    pub marked_by: Option<i32>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = medicine_logs)]
pub struct NewMedicineLog {
    pub medicine_id: i32,
    pub taken_at: NaiveDateTime,
    pub status: String,
    pub notes: Option<String>,
    pub marked_by: Option<i32>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = medications_monitoring)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MonitoredMedication {
    pub id: i32,
    pub elderly_id: i32,
    pub medication_name: String,
    pub dose: String,
    pub frequency: String,
    pub times: Option<String>,
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_by: Option<i32>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = medications_monitoring)]
pub struct NewMonitoredMedication {
    pub elderly_id: i32,
    pub medication_name: String,
    pub dose: String,
    pub frequency: String,
    pub times: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<i32>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = medication_monitoring_logs)]
pub struct NewMedicationMonitoringLog {
    pub medication_id: i32,
    pub taken_at: NaiveDateTime,
    pub marked_by: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = vital_signs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct VitalSign {
    pub id: i32,
    pub elderly_id: i32,
    pub measurement_date: NaiveDateTime,
    pub blood_pressure_sys: Option<i32>,
    pub blood_pressure_dia: Option<i32>,
    pub heart_rate: Option<i32>,
    pub blood_sugar: Option<f64>,
    pub temperature: Option<f64>,
    pub weight: Option<f64>,
    pub oxygen_saturation: Option<i32>,
    pub notes: Option<String>,
    pub recorded_by: Option<i32>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = vital_signs)]
pub struct NewVitalSign {
    pub elderly_id: i32,
    pub measurement_date: NaiveDateTime,
    pub blood_pressure_sys: Option<i32>,
    pub blood_pressure_dia: Option<i32>,
    pub heart_rate: Option<i32>,
    pub blood_sugar: Option<f64>,
    pub temperature: Option<f64>,
    pub weight: Option<f64>,
    pub oxygen_saturation: Option<i32>,
    pub notes: Option<String>,
    pub recorded_by: Option<i32>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = health_records)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct HealthRecord {
    pub id: i32,
    pub user_id: i32,
    pub blood_pressure_systolic: Option<i32>,
    pub blood_pressure_diastolic: Option<i32>,
    pub heart_rate: Option<i32>,
    pub blood_sugar_level: Option<f64>,
    pub temperature: Option<f64>,
    pub weight: Option<f64>,
    pub notes: Option<String>,
    pub recorded_by: Option<i32>,
    pub recorded_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = health_records)]
pub struct NewHealthRecord {
    pub user_id: i32,
    pub blood_pressure_systolic: Option<i32>,
    pub blood_pressure_diastolic: Option<i32>,
    pub heart_rate: Option<i32>,
    pub blood_sugar_level: Option<f64>,
    pub temperature: Option<f64>,
    pub weight: Option<f64>,
    pub notes: Option<String>,
    pub recorded_by: Option<i32>,
    pub recorded_at: NaiveDateTime,
}

impl From<&NewVitalSign> for NewHealthRecord {
    fn from(vitals: &NewVitalSign) -> Self {
        Self {
            user_id: vitals.elderly_id,
            blood_pressure_systolic: vitals.blood_pressure_sys,
            blood_pressure_diastolic: vitals.blood_pressure_dia,
            heart_rate: vitals.heart_rate,
            blood_sugar_level: vitals.blood_sugar,
            temperature: vitals.temperature,
            weight: vitals.weight,
            notes: vitals.notes.clone(),
            recorded_by: vitals.recorded_by,
            recorded_at: vitals.measurement_date,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = activities)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Activity {
    pub id: i32,
    pub elderly_id: i32,
    pub activity_type: String,
    pub activity_date: NaiveDateTime,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub description: Option<String>,
    pub recorded_by: Option<i32>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = activities)]
pub struct NewActivity {
    pub elderly_id: i32,
    pub activity_type: String,
    pub activity_date: NaiveDateTime,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub description: Option<String>,
    pub recorded_by: Option<i32>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = monitoring_alerts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MonitoringAlert {
    pub id: i32,
    pub elderly_id: i32,
    pub alert_type: String,
    pub category: Option<String>,
    pub message: String,
    pub created_by: i32,
    pub is_dismissed: bool,
    pub dismissed_by: Option<i32>,
    pub dismissed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = monitoring_alerts)]
pub struct NewMonitoringAlert {
    pub elderly_id: i32,
    pub alert_type: String,
    pub category: Option<String>,
    pub message: String,
    pub created_by: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = appointments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Appointment {
    pub id: i32,
    pub user_id: i32,
    pub title: String,
    pub description: Option<String>,
    pub appointment_date: NaiveDate,
    pub appointment_time: Option<NaiveTime>,
    pub location: Option<String>,
    pub doctor_name: Option<String>,
    pub status: String,
    pub reminder_sent: bool,
    pub created_by: Option<i32>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = appointments)]
pub struct NewAppointment {
    pub user_id: i32,
    pub title: String,
    pub description: Option<String>,
    pub appointment_date: NaiveDate,
    pub appointment_time: Option<NaiveTime>,
    pub location: Option<String>,
    pub doctor_name: Option<String>,
    pub created_by: Option<i32>,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = appointments)]
pub struct AppointmentChangeset {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub appointment_date: Option<NaiveDate>,
    pub appointment_time: Option<Option<NaiveTime>>,
    pub location: Option<Option<String>>,
    pub doctor_name: Option<Option<String>>,
    pub status: Option<String>,
    pub reminder_sent: Option<bool>,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = chats)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ChatMessage {
    pub id: i32,
    pub sender_id: i32,
    pub receiver_id: i32,
    pub message: String,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = chats)]
pub struct NewChatMessage {
    pub sender_id: i32,
    pub receiver_id: i32,
    pub message: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = health_reports)]
pub struct NewHealthReport {
    pub elderly_id: Option<i32>,
    pub report_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub report_data: Option<String>,
    pub created_by: i32,
}
