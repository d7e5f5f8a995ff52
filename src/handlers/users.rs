use actix_web::{HttpResponse, web};
use chrono::{Duration, NaiveTime, Utc};
use diesel::dsl::{count, count_star, exists};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::audit::{self, AuditAction, ClientIp};
use crate::auth::{self, AuthUser, NO_DATA_ACCESS, Role};
use crate::config::Config;
use crate::crypto::CryptoUtils;
use crate::db::{self, DbPool};
use crate::error::{ApiError, ResultExt};
use crate::handlers::auth::{NewUserForm, create_account};
use crate::models::{
    ActivityLog, Appointment, EmergencyContact, EmergencyContactChangeset, Medicine,
    NewEmergencyContact, NewFamilyRelation, NewUserSettings, Notification, RelatedUser,
    UserChangeset, UserProfile, UserSettings, UserSettingsChangeset, UserSummary, VitalSign,
};
use crate::response::{self, PageQuery};
use crate::schema::{
    activities, activity_logs, appointments, chats, emergency_contacts, family_elderly_relations,
    health_records, health_reports, medical_assignments, medication_monitoring_logs,
    medications_monitoring, medicine_logs, medicines, monitoring_alerts, notifications,
    user_settings, users, vital_signs, vital_thresholds,
};
use crate::validation::{
    LANGUAGES, THEMES, Validator, blank_to_none, double_option, is_valid_blood_type,
    is_valid_email, is_valid_password, is_valid_phone, is_valid_role, is_valid_username,
    parse_date,
};

const USER_NOT_FOUND: &str = "User tidak ditemukan";

fn find_profile(conn: &mut PgConnection, id: i32) -> Result<UserProfile, ApiError> {
    users::table
        .find(id)
        .select(UserProfile::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found(USER_NOT_FOUND))
}

fn elderly_of_family(conn: &mut PgConnection, family_id: i32) -> QueryResult<Vec<RelatedUser>> {
    family_elderly_relations::table
        .inner_join(users::table.on(users::id.eq(family_elderly_relations::elderly_user_id)))
        .filter(family_elderly_relations::family_user_id.eq(family_id))
        .select((
            users::id,
            users::username,
            users::full_name,
            users::email,
            users::phone,
            family_elderly_relations::relationship,
        ))
        .load(conn)
}

fn family_of_elderly(conn: &mut PgConnection, elderly_id: i32) -> QueryResult<Vec<RelatedUser>> {
    family_elderly_relations::table
        .inner_join(users::table.on(users::id.eq(family_elderly_relations::family_user_id)))
        .filter(family_elderly_relations::elderly_user_id.eq(elderly_id))
        .select((
            users::id,
            users::username,
            users::full_name,
            users::email,
            users::phone,
            family_elderly_relations::relationship,
        ))
        .load(conn)
}

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub role: Option<String>,
}

impl UserListQuery {
    fn filtered(&self) -> users::BoxedQuery<'static, Pg> {
        let mut query = users::table.into_boxed();

        if let Some(search) = self.search.as_deref().filter(|s| !s.trim().is_empty()) {
            let pattern = format!("%{}%", search.trim());
            query = query.filter(
                users::username
                    .ilike(pattern.clone())
                    .or(users::email.ilike(pattern.clone()))
                    .or(users::full_name.ilike(pattern)),
            );
        }
        if let Some(role) = self.role.as_deref().filter(|r| !r.trim().is_empty()) {
            query = query.filter(users::role.eq(role.to_string()));
        }

        query
    }
}

// Handler to list users with paging, search and role filter
pub async fn list_users(
    pool: web::Data<DbPool>,
    user: AuthUser,
    query: web::Query<UserListQuery>,
) -> Result<HttpResponse, ApiError> {
    user.require(&[Role::Admin])?;
    let query = query.into_inner();
    let page = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .resolve(10)?;

    let (rows, total) = db::run(&pool, move |conn| {
        let total: i64 = query.filtered().count().get_result(conn)?;
        let rows = query
            .filtered()
            .order(users::created_at.desc())
            .limit(page.limit)
            .offset(page.offset())
            .select(UserSummary::as_select())
            .load(conn)?;
        Ok((rows, total))
    })
    .await
    .context("Gagal mengambil data user")?;

    Ok(response::ok(json!({
        "users": rows,
        "pagination": page.describe(total),
    })))
}

#[derive(Debug, Serialize, Queryable)]
struct RoleCount {
    role: String,
    count: i64,
}

// Handler for the admin user dashboard numbers
pub async fn user_statistics(
    pool: web::Data<DbPool>,
    user: AuthUser,
) -> Result<HttpResponse, ApiError> {
    user.require(&[Role::Admin])?;

    let stats = db::run(&pool, move |conn| {
        let now = Utc::now().naive_utc();
        let start_of_day = now.date().and_time(NaiveTime::MIN);

        let total_users: i64 = users::table.count().get_result(conn)?;
        let active_today: i64 = activity_logs::table
            .filter(activity_logs::created_at.ge(start_of_day))
            .select(count(activity_logs::user_id).aggregate_distinct())
            .get_result(conn)?;
        let new_users_week: i64 = users::table
            .filter(users::created_at.ge(now - Duration::days(7)))
            .count()
            .get_result(conn)?;
        let role_distribution: Vec<RoleCount> = users::table
            .group_by(users::role)
            .select((users::role, count_star()))
            .order(users::role.asc())
            .load(conn)?;

        Ok(json!({
            "totalUsers": total_users,
            "activeToday": active_today,
            "newUsersWeek": new_users_week,
            "roleDistribution": role_distribution,
        }))
    })
    .await
    .context("Gagal mengambil statistik")?;

    Ok(response::ok(stats))
}

pub async fn my_profile(pool: web::Data<DbPool>, user: AuthUser) -> Result<HttpResponse, ApiError> {
    let profile = db::run(&pool, move |conn| find_profile(conn, user.id))
        .await
        .context("Gagal mengambil profil")?;
    Ok(response::ok(profile))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub email: Option<String>,
    pub full_name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub address: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub date_of_birth: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub blood_type: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub medical_conditions: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub allergies: Option<Option<String>>,
}

fn present(value: &Option<Option<String>>) -> Option<&str> {
    value.as_ref().and_then(|v| v.as_deref()).filter(|v| !v.trim().is_empty())
}

impl ProfileUpdate {
    fn validate(&self) -> Result<(), ApiError> {
        Validator::new()
            .optional(self.email.as_deref(), is_valid_email, "email", "Email tidak valid")
            .optional(
                self.full_name.as_deref(),
                |n: &str| !n.trim().is_empty(),
                "fullName",
                "Nama lengkap tidak boleh kosong",
            )
            .optional(present(&self.phone), is_valid_phone, "phone", "Format nomor telepon tidak valid")
            .optional(
                present(&self.date_of_birth),
                |d: &str| parse_date(d).is_some(),
                "dateOfBirth",
                "Format tanggal tidak valid",
            )
            .optional(
                present(&self.blood_type),
                is_valid_blood_type,
                "bloodType",
                "Golongan darah tidak valid",
            )
            .finish()
    }

    fn into_changeset(self) -> UserChangeset {
        UserChangeset {
            email: self.email.map(|e| e.trim().to_string()),
            full_name: self.full_name.map(|n| n.trim().to_string()),
            phone: self.phone.map(blank_to_none),
            address: self.address.map(blank_to_none),
            date_of_birth: self
                .date_of_birth
                .map(|d| d.as_deref().and_then(parse_date)),
            blood_type: self.blood_type.map(blank_to_none),
            medical_conditions: self.medical_conditions.map(blank_to_none),
            allergies: self.allergies.map(blank_to_none),
            ..Default::default()
        }
    }
}

// Handler to update the caller's own profile
pub async fn update_my_profile(
    pool: web::Data<DbPool>,
    user: AuthUser,
    ip: ClientIp,
    body: web::Json<ProfileUpdate>,
) -> Result<HttpResponse, ApiError> {
    let update = body.into_inner();
    update.validate()?;

    let mut changes = update.into_changeset();
    if changes.is_empty() {
        return Err(ApiError::bad_request("Tidak ada data yang diupdate"));
    }
    changes.updated_at = Some(Utc::now().naive_utc());

    let profile = db::run(&pool, move |conn| {
        if let Some(email) = changes.email.as_deref() {
            let taken: bool = diesel::select(exists(
                users::table
                    .filter(users::email.eq(email))
                    .filter(users::id.ne(user.id)),
            ))
            .get_result(conn)?;
            if taken {
                return Err(ApiError::bad_request("Email sudah digunakan"));
            }
        }

        diesel::update(users::table.find(user.id))
            .set(&changes)
            .execute(conn)?;
        audit::record(conn, user.id, AuditAction::UpdateProfile, "Profil diperbarui", &ip);
        find_profile(conn, user.id)
    })
    .await
    .context("Gagal mengupdate profil")?;

    Ok(response::ok_with("Profil berhasil diupdate", profile))
}

fn ensure_settings(conn: &mut PgConnection, user_id: i32) -> QueryResult<UserSettings> {
    diesel::insert_into(user_settings::table)
        .values(&NewUserSettings { user_id })
        .on_conflict_do_nothing()
        .execute(conn)?;
    user_settings::table
        .find(user_id)
        .select(UserSettings::as_select())
        .first(conn)
}

pub async fn get_preferences(
    pool: web::Data<DbPool>,
    user: AuthUser,
) -> Result<HttpResponse, ApiError> {
    let settings = db::run(&pool, move |conn| Ok(ensure_settings(conn, user.id)?))
        .await
        .context("Gagal mengambil preferensi")?;
    Ok(response::ok(settings))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesUpdate {
    pub email_notifications: Option<bool>,
    pub sms_notifications: Option<bool>,
    pub push_notifications: Option<bool>,
    pub theme: Option<String>,
    pub language: Option<String>,
}

pub async fn update_preferences(
    pool: web::Data<DbPool>,
    user: AuthUser,
    body: web::Json<PreferencesUpdate>,
) -> Result<HttpResponse, ApiError> {
    let update = body.into_inner();
    Validator::new()
        .optional(
            update.theme.as_deref(),
            |t: &str| THEMES.contains(&t),
            "theme",
            "Tema tidak valid",
        )
        .optional(
            update.language.as_deref(),
            |l: &str| LANGUAGES.contains(&l),
            "language",
            "Bahasa tidak valid",
        )
        .finish()?;

    let changes = UserSettingsChangeset {
        email_notifications: update.email_notifications,
        sms_notifications: update.sms_notifications,
        push_notifications: update.push_notifications,
        theme: update.theme,
        language: update.language,
        updated_at: Some(Utc::now().naive_utc()),
    };

    let settings = db::run(&pool, move |conn| {
        ensure_settings(conn, user.id)?;
        let settings = diesel::update(user_settings::table.find(user.id))
            .set(&changes)
            .returning(UserSettings::as_returning())
            .get_result(conn)?;
        Ok(settings)
    })
    .await
    .context("Gagal menyimpan preferensi")?;

    Ok(response::ok_with("Preferensi berhasil disimpan", settings))
}

// Handler to export everything stored about the caller
pub async fn export_my_data(
    pool: web::Data<DbPool>,
    user: AuthUser,
) -> Result<HttpResponse, ApiError> {
    let export = db::run(&pool, move |conn| {
        let profile = find_profile(conn, user.id)?;
        let settings = user_settings::table
            .find(user.id)
            .select(UserSettings::as_select())
            .first(conn)
            .optional()?;
        let contacts = emergency_contacts::table
            .filter(emergency_contacts::user_id.eq(user.id))
            .order(emergency_contacts::priority.asc())
            .select(EmergencyContact::as_select())
            .load(conn)?;
        let mut relations = elderly_of_family(conn, user.id)?;
        relations.extend(family_of_elderly(conn, user.id)?);
        let vitals = vital_signs::table
            .filter(vital_signs::elderly_id.eq(user.id))
            .order(vital_signs::measurement_date.desc())
            .select(VitalSign::as_select())
            .load(conn)?;
        let medicines = medicines::table
            .filter(medicines::user_id.eq(user.id))
            .order(medicines::created_at.desc())
            .select(Medicine::as_select())
            .load(conn)?;
        let appointments = appointments::table
            .filter(appointments::user_id.eq(user.id))
            .order(appointments::appointment_date.desc())
            .select(Appointment::as_select())
            .load(conn)?;
        let notifications = notifications::table
            .filter(notifications::user_id.eq(user.id))
            .order(notifications::created_at.desc())
            .select(Notification::as_select())
            .load(conn)?;
        let activity = activity_logs::table
            .filter(activity_logs::user_id.eq(user.id))
            .order(activity_logs::created_at.desc())
            .select(ActivityLog::as_select())
            .load(conn)?;

        Ok(json!({
            "exportDate": Utc::now().naive_utc(),
            "profile": profile,
            "settings": settings,
            "emergencyContacts": contacts,
            "relations": relations,
            "vitalSigns": vitals,
            "medicines": medicines,
            "appointments": appointments,
            "notifications": notifications,
            "activityLogs": activity,
        }))
    })
    .await
    .context("Gagal mengekspor data")?;

    Ok(response::ok(export))
}

pub async fn my_elderly(pool: web::Data<DbPool>, user: AuthUser) -> Result<HttpResponse, ApiError> {
    user.require(&[Role::Family])?;
    let elderly = db::run(&pool, move |conn| Ok(elderly_of_family(conn, user.id)?))
        .await
        .context("Gagal mengambil data lansia")?;
    Ok(response::ok(elderly))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserDetail {
    #[serde(flatten)]
    user: UserProfile,
    emergency_contacts: Vec<EmergencyContact>,
    family_relations: Vec<RelatedUser>,
}

// Handler to read one user with contacts and family links
pub async fn get_user(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();

    let detail = db::run(&pool, move |conn| {
        if !auth::can_view_user(conn, &user, id)? {
            return Err(ApiError::forbidden(NO_DATA_ACCESS));
        }
        let profile = find_profile(conn, id)?;

        let (emergency_contacts, family_relations) = match profile.role.as_str() {
            "elderly" => (
                emergency_contacts::table
                    .filter(emergency_contacts::user_id.eq(id))
                    .order(emergency_contacts::priority.asc())
                    .select(EmergencyContact::as_select())
                    .load(conn)?,
                family_of_elderly(conn, id)?,
            ),
            "family" => (Vec::new(), elderly_of_family(conn, id)?),
            _ => (Vec::new(), Vec::new()),
        };

        Ok(UserDetail {
            user: profile,
            emergency_contacts,
            family_relations,
        })
    })
    .await
    .context("Gagal mengambil data user")?;

    Ok(response::ok(detail))
}

// Handler for per-user counters
pub async fn user_detail_statistics(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();

    let stats = db::run(&pool, move |conn| {
        if !auth::can_view_user(conn, &user, id)? {
            return Err(ApiError::forbidden(NO_DATA_ACCESS));
        }
        find_profile(conn, id)?;
        let today = Utc::now().date_naive();

        let vital_signs_recorded: i64 = vital_signs::table
            .filter(vital_signs::elderly_id.eq(id))
            .count()
            .get_result(conn)?;
        let health_records_recorded: i64 = health_records::table
            .filter(health_records::user_id.eq(id))
            .count()
            .get_result(conn)?;
        let active_medicines: i64 = medicines::table
            .filter(medicines::user_id.eq(id))
            .filter(medicines::is_active.eq(true))
            .count()
            .get_result(conn)?;
        let upcoming_appointments: i64 = appointments::table
            .filter(appointments::user_id.eq(id))
            .filter(appointments::status.eq("scheduled"))
            .filter(appointments::appointment_date.ge(today))
            .count()
            .get_result(conn)?;
        let unread_notifications: i64 = notifications::table
            .filter(notifications::user_id.eq(id))
            .filter(notifications::is_read.eq(false))
            .count()
            .get_result(conn)?;
        let open_alerts: i64 = monitoring_alerts::table
            .filter(monitoring_alerts::elderly_id.eq(id))
            .filter(monitoring_alerts::is_dismissed.eq(false))
            .count()
            .get_result(conn)?;

        Ok(json!({
            "vitalSignsRecorded": vital_signs_recorded + health_records_recorded,
            "activeMedicines": active_medicines,
            "upcomingAppointments": upcoming_appointments,
            "unreadNotifications": unread_notifications,
            "openAlerts": open_alerts,
        }))
    })
    .await
    .context("Gagal mengambil statistik user")?;

    Ok(response::ok(stats))
}

// Handler for a user's audit trail
pub async fn user_activities(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    if user.id != id && !user.is(Role::Admin) {
        return Err(ApiError::forbidden(NO_DATA_ACCESS));
    }
    let page = query.resolve(10)?;

    let (rows, total) = db::run(&pool, move |conn| {
        let total: i64 = activity_logs::table
            .filter(activity_logs::user_id.eq(id))
            .count()
            .get_result(conn)?;
        let rows = activity_logs::table
            .filter(activity_logs::user_id.eq(id))
            .order(activity_logs::created_at.desc())
            .limit(page.limit)
            .offset(page.offset())
            .select(ActivityLog::as_select())
            .load(conn)?;
        Ok((rows, total))
    })
    .await
    .context("Gagal mengambil aktivitas user")?;

    Ok(response::ok(json!({
        "activities": rows,
        "pagination": page.describe(total),
    })))
}

// Handler for admins to create an account
pub async fn create_user(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    user: AuthUser,
    ip: ClientIp,
    body: web::Json<NewUserForm>,
) -> Result<HttpResponse, ApiError> {
    user.require(&[Role::Admin])?;
    let form = body.into_inner();
    let rounds = config.bcrypt_rounds;

    let account = db::run(&pool, move |conn| {
        let account = create_account(conn, form, rounds)?;
        let description = format!("Admin membuat user baru: {}", account.username);
        audit::record(conn, user.id, AuditAction::CreateUser, &description, &ip);
        Ok(account)
    })
    .await
    .context("Gagal membuat user baru")?;

    Ok(response::created("User berhasil dibuat", account))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub address: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub date_of_birth: Option<Option<String>>,
}

impl AdminUserUpdate {
    fn validate(&self) -> Result<(), ApiError> {
        Validator::new()
            .optional(
                self.username.as_deref().filter(|u| !u.trim().is_empty()),
                is_valid_username,
                "username",
                "Username minimal 3 karakter dan hanya boleh berisi huruf, angka, dan underscore",
            )
            .optional(
                self.email.as_deref().filter(|e| !e.trim().is_empty()),
                is_valid_email,
                "email",
                "Email tidak valid",
            )
            .optional(
                self.role.as_deref().filter(|r| !r.trim().is_empty()),
                is_valid_role,
                "role",
                "Role tidak valid",
            )
            .optional(present(&self.phone), is_valid_phone, "phone", "Format nomor telepon tidak valid")
            .optional(
                present(&self.date_of_birth),
                |d: &str| parse_date(d).is_some(),
                "dateOfBirth",
                "Format tanggal tidak valid",
            )
            .finish()
    }

    fn into_changeset(self) -> UserChangeset {
        let non_blank = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        UserChangeset {
            username: non_blank(self.username),
            email: non_blank(self.email),
            full_name: non_blank(self.full_name),
            role: non_blank(self.role),
            phone: self.phone.map(blank_to_none),
            address: self.address.map(blank_to_none),
            date_of_birth: self
                .date_of_birth
                .map(|d| d.as_deref().and_then(parse_date)),
            ..Default::default()
        }
    }
}

// Handler for admins to edit an account
pub async fn update_user(
    pool: web::Data<DbPool>,
    user: AuthUser,
    ip: ClientIp,
    path: web::Path<i32>,
    body: web::Json<AdminUserUpdate>,
) -> Result<HttpResponse, ApiError> {
    user.require(&[Role::Admin])?;
    let id = path.into_inner();
    let update = body.into_inner();
    update.validate()?;

    let mut changes = update.into_changeset();

    db::run(&pool, move |conn| {
        let (current_username, current_email): (String, String) = users::table
            .find(id)
            .select((users::username, users::email))
            .first(conn)
            .optional()?
            .ok_or_else(|| ApiError::not_found(USER_NOT_FOUND))?;

        if changes.username.is_some() || changes.email.is_some() {
            let username = changes.username.clone().unwrap_or_else(|| current_username.clone());
            let email = changes.email.clone().unwrap_or(current_email);
            let conflict: bool = diesel::select(exists(
                users::table
                    .filter(users::username.eq(username).or(users::email.eq(email)))
                    .filter(users::id.ne(id)),
            ))
            .get_result(conn)?;
            if conflict {
                return Err(ApiError::bad_request("Username atau email sudah digunakan"));
            }
        }

        if changes.is_empty() {
            return Err(ApiError::bad_request("Tidak ada data yang diupdate"));
        }
        changes.updated_at = Some(Utc::now().naive_utc());

        diesel::update(users::table.find(id)).set(&changes).execute(conn)?;

        let description = format!("Admin mengupdate user: {current_username}");
        audit::record(conn, user.id, AuditAction::UpdateUser, &description, &ip);
        Ok(())
    })
    .await
    .context("Gagal mengupdate user")?;

    Ok(response::ok_message("User berhasil diupdate"))
}

/// Removes a user and everything that references them.
fn delete_user_cascade(conn: &mut PgConnection, id: i32) -> QueryResult<()> {
    conn.transaction(|conn| {
        let owned_medicines = medicines::table
            .filter(medicines::user_id.eq(id))
            .select(medicines::id);
        diesel::delete(medicine_logs::table.filter(medicine_logs::medicine_id.eq_any(owned_medicines)))
            .execute(conn)?;

        let monitored = medications_monitoring::table
            .filter(medications_monitoring::elderly_id.eq(id))
            .select(medications_monitoring::id);
        diesel::delete(
            medication_monitoring_logs::table
                .filter(medication_monitoring_logs::medication_id.eq_any(monitored)),
        )
        .execute(conn)?;

        diesel::delete(medications_monitoring::table.filter(medications_monitoring::elderly_id.eq(id)))
            .execute(conn)?;
        diesel::delete(emergency_contacts::table.filter(emergency_contacts::user_id.eq(id)))
            .execute(conn)?;
        diesel::delete(
            family_elderly_relations::table.filter(
                family_elderly_relations::family_user_id
                    .eq(id)
                    .or(family_elderly_relations::elderly_user_id.eq(id)),
            ),
        )
        .execute(conn)?;
        diesel::delete(medicines::table.filter(medicines::user_id.eq(id))).execute(conn)?;
        diesel::delete(health_records::table.filter(health_records::user_id.eq(id))).execute(conn)?;
        diesel::delete(vital_signs::table.filter(vital_signs::elderly_id.eq(id))).execute(conn)?;
        diesel::delete(vital_thresholds::table.filter(vital_thresholds::elderly_id.eq(id)))
            .execute(conn)?;
        diesel::delete(activities::table.filter(activities::elderly_id.eq(id))).execute(conn)?;
        diesel::delete(monitoring_alerts::table.filter(monitoring_alerts::elderly_id.eq(id)))
            .execute(conn)?;
        diesel::delete(appointments::table.filter(appointments::user_id.eq(id))).execute(conn)?;
        diesel::delete(
            chats::table.filter(chats::sender_id.eq(id).or(chats::receiver_id.eq(id))),
        )
        .execute(conn)?;
        diesel::delete(notifications::table.filter(notifications::user_id.eq(id))).execute(conn)?;
        diesel::delete(user_settings::table.filter(user_settings::user_id.eq(id))).execute(conn)?;
        diesel::delete(
            medical_assignments::table.filter(
                medical_assignments::medical_id
                    .eq(id)
                    .or(medical_assignments::elderly_id.eq(id)),
            ),
        )
        .execute(conn)?;
        diesel::delete(health_reports::table.filter(health_reports::elderly_id.eq(id)))
            .execute(conn)?;
        diesel::delete(activity_logs::table.filter(activity_logs::user_id.eq(id))).execute(conn)?;

        diesel::delete(users::table.find(id)).execute(conn)?;
        Ok(())
    })
}

// Handler for admins to delete an account and its data
pub async fn delete_user(
    pool: web::Data<DbPool>,
    user: AuthUser,
    ip: ClientIp,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    user.require(&[Role::Admin])?;
    let id = path.into_inner();

    db::run(&pool, move |conn| {
        let username: String = users::table
            .find(id)
            .select(users::username)
            .first(conn)
            .optional()?
            .ok_or_else(|| ApiError::not_found(USER_NOT_FOUND))?;

        if id == user.id {
            return Err(ApiError::bad_request("Tidak bisa menghapus akun sendiri"));
        }

        delete_user_cascade(conn, id).map_err(|e| match e {
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                ApiError::bad_request("User tidak bisa dihapus karena masih memiliki data terkait")
            }
            other => ApiError::from(other),
        })?;
        info!(user_id = id, "user deleted");

        let description = format!("Admin menghapus user: {username} (ID: {id})");
        audit::record(conn, user.id, AuditAction::DeleteUser, &description, &ip);
        Ok(())
    })
    .await
    .context("Gagal menghapus user")?;

    Ok(response::ok_message("User berhasil dihapus"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub new_password: Option<String>,
}

pub async fn reset_password(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    user: AuthUser,
    ip: ClientIp,
    path: web::Path<i32>,
    body: web::Json<ResetPasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    user.require(&[Role::Admin])?;
    let id = path.into_inner();
    let new_password = body.into_inner().new_password.unwrap_or_default();
    Validator::new()
        .check(
            is_valid_password(&new_password),
            "newPassword",
            "Password minimal 6 karakter",
        )
        .finish()?;

    let rounds = config.bcrypt_rounds;
    db::run(&pool, move |conn| {
        let username: String = users::table
            .find(id)
            .select(users::username)
            .first(conn)
            .optional()?
            .ok_or_else(|| ApiError::not_found(USER_NOT_FOUND))?;

        let hashed = CryptoUtils::hash_password(&new_password, rounds)?;
        diesel::update(users::table.find(id))
            .set((
                users::password.eq(hashed),
                users::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;

        let description = format!("Admin reset password untuk: {username}");
        audit::record(conn, user.id, AuditAction::ResetPassword, &description, &ip);
        Ok(())
    })
    .await
    .context("Gagal reset password")?;

    Ok(response::ok_message("Password berhasil direset"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRequest {
    pub family_user_id: Option<i32>,
    pub elderly_user_id: Option<i32>,
    pub relationship: Option<String>,
}

// Handler for admins to link a family account to an elderly account
pub async fn link_elderly(
    pool: web::Data<DbPool>,
    user: AuthUser,
    ip: ClientIp,
    body: web::Json<LinkRequest>,
) -> Result<HttpResponse, ApiError> {
    user.require(&[Role::Admin])?;
    let request = body.into_inner();
    Validator::new()
        .check(
            request.family_user_id.is_some(),
            "familyUserId",
            "Family user ID harus berupa angka",
        )
        .check(
            request.elderly_user_id.is_some(),
            "elderlyUserId",
            "Elderly user ID harus berupa angka",
        )
        .finish()?;
    let (family_id, elderly_id) = (
        request.family_user_id.unwrap_or_default(),
        request.elderly_user_id.unwrap_or_default(),
    );
    let relationship = blank_to_none(request.relationship).unwrap_or_else(|| "Keluarga".to_string());

    db::run(&pool, move |conn| {
        let role_of = |conn: &mut PgConnection, id: i32| -> QueryResult<Option<String>> {
            users::table.find(id).select(users::role).first(conn).optional()
        };
        let (Some(family_role), Some(elderly_role)) =
            (role_of(conn, family_id)?, role_of(conn, elderly_id)?)
        else {
            return Err(ApiError::not_found(USER_NOT_FOUND));
        };

        if family_role != Role::Family.as_str() {
            return Err(ApiError::bad_request("User pertama harus memiliki role family"));
        }
        if elderly_role != Role::Elderly.as_str() {
            return Err(ApiError::bad_request("User kedua harus memiliki role elderly"));
        }
        if auth::is_family_of(conn, family_id, elderly_id)? {
            return Err(ApiError::bad_request("Relasi sudah ada"));
        }

        diesel::insert_into(family_elderly_relations::table)
            .values(&NewFamilyRelation {
                family_user_id: family_id,
                elderly_user_id: elderly_id,
                relationship,
            })
            .execute(conn)?;

        let description = format!("Admin menghubungkan keluarga {family_id} dengan lansia {elderly_id}");
        audit::record(conn, user.id, AuditAction::LinkElderly, &description, &ip);
        Ok(())
    })
    .await
    .context("Gagal membuat relasi")?;

    Ok(response::ok_message("Relasi berhasil dibuat"))
}

const CONTACT_NOT_FOUND: &str = "Kontak darurat tidak ditemukan";

fn valid_priority(priority: &i32) -> bool {
    (1..=10).contains(priority)
}

pub async fn list_emergency_contacts(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let owner_id = path.into_inner();

    let contacts = db::run(&pool, move |conn| {
        auth::authorize_owner_or_family(conn, &user, owner_id)?;
        Ok(emergency_contacts::table
            .filter(emergency_contacts::user_id.eq(owner_id))
            .order((emergency_contacts::priority.asc(), emergency_contacts::id.asc()))
            .select(EmergencyContact::as_select())
            .load(conn)?)
    })
    .await
    .context("Gagal mengambil kontak darurat")?;

    Ok(response::ok(contacts))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRequest {
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub relationship: Option<Option<String>>,
    pub priority: Option<i32>,
}

pub async fn add_emergency_contact(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
    body: web::Json<ContactRequest>,
) -> Result<HttpResponse, ApiError> {
    let owner_id = path.into_inner();
    let request = body.into_inner();
    Validator::new()
        .required(request.contact_name.as_deref(), "contactName", "Nama kontak harus diisi")
        .check(
            request.contact_phone.as_deref().is_some_and(is_valid_phone),
            "contactPhone",
            "Format nomor telepon tidak valid",
        )
        .optional(request.priority.as_ref(), valid_priority, "priority", "Prioritas harus antara 1 dan 10")
        .finish()?;

    let contact = NewEmergencyContact {
        user_id: owner_id,
        contact_name: request.contact_name.unwrap_or_default().trim().to_string(),
        contact_phone: request.contact_phone.unwrap_or_default(),
        relationship: request.relationship.and_then(blank_to_none),
        priority: request.priority.unwrap_or(1),
    };

    let created = db::run(&pool, move |conn| {
        auth::authorize_owner_or_family(conn, &user, owner_id)?;
        Ok(diesel::insert_into(emergency_contacts::table)
            .values(&contact)
            .returning(EmergencyContact::as_returning())
            .get_result(conn)?)
    })
    .await
    .context("Gagal menambahkan kontak darurat")?;

    Ok(response::created("Kontak darurat berhasil ditambahkan", created))
}

pub async fn update_emergency_contact(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
    body: web::Json<ContactRequest>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let request = body.into_inner();
    Validator::new()
        .optional(
            request.contact_name.as_deref(),
            |n: &str| !n.trim().is_empty(),
            "contactName",
            "Nama kontak harus diisi",
        )
        .optional(
            request.contact_phone.as_deref(),
            is_valid_phone,
            "contactPhone",
            "Format nomor telepon tidak valid",
        )
        .optional(request.priority.as_ref(), valid_priority, "priority", "Prioritas harus antara 1 dan 10")
        .finish()?;

    let changes = EmergencyContactChangeset {
        contact_name: request.contact_name.map(|n| n.trim().to_string()),
        contact_phone: request.contact_phone,
        relationship: request.relationship.map(blank_to_none),
        priority: request.priority,
    };
    if changes.contact_name.is_none()
        && changes.contact_phone.is_none()
        && changes.relationship.is_none()
        && changes.priority.is_none()
    {
        return Err(ApiError::bad_request("Tidak ada data yang diupdate"));
    }

    let updated = db::run(&pool, move |conn| {
        let owner_id: i32 = emergency_contacts::table
            .find(id)
            .select(emergency_contacts::user_id)
            .first(conn)
            .optional()?
            .ok_or_else(|| ApiError::not_found(CONTACT_NOT_FOUND))?;
        auth::authorize_owner_or_family(conn, &user, owner_id)?;

        Ok(diesel::update(emergency_contacts::table.find(id))
            .set(&changes)
            .returning(EmergencyContact::as_returning())
            .get_result(conn)?)
    })
    .await
    .context("Gagal mengupdate kontak darurat")?;

    Ok(response::ok_with("Kontak darurat berhasil diupdate", updated))
}

pub async fn delete_emergency_contact(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();

    db::run(&pool, move |conn| {
        let owner_id: i32 = emergency_contacts::table
            .find(id)
            .select(emergency_contacts::user_id)
            .first(conn)
            .optional()?
            .ok_or_else(|| ApiError::not_found(CONTACT_NOT_FOUND))?;
        auth::authorize_owner_or_family(conn, &user, owner_id)?;

        diesel::delete(emergency_contacts::table.find(id)).execute(conn)?;
        Ok(())
    })
    .await
    .context("Gagal menghapus kontak darurat")?;

    Ok(response::ok_message("Kontak darurat berhasil dihapus"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_update_distinguishes_null_from_absent() {
        let update: ProfileUpdate =
            serde_json::from_value(json!({"phone": null, "address": "Jl. Melati 3"})).unwrap();
        let changes = update.into_changeset();

        assert_eq!(changes.phone, Some(None));
        assert_eq!(changes.address, Some(Some("Jl. Melati 3".to_string())));
        assert_eq!(changes.allergies, None);
        assert!(!changes.is_empty());
    }

    #[test]
    fn empty_profile_update_is_detected() {
        let changes = ProfileUpdate::default().into_changeset();
        assert!(changes.is_empty());
    }

    #[test]
    fn profile_update_rejects_bad_fields() {
        let update: ProfileUpdate = serde_json::from_value(json!({
            "email": "bukan-email",
            "bloodType": "Z",
            "phone": "12",
            "dateOfBirth": "kemarin",
        }))
        .unwrap();

        let Err(ApiError::Validation(errors)) = update.validate() else {
            panic!("expected validation failure");
        };
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["email", "phone", "dateOfBirth", "bloodType"]);
    }

    #[test]
    fn blank_admin_fields_are_ignored() {
        let update: AdminUserUpdate =
            serde_json::from_value(json!({"username": "  ", "email": " ", "role": "medical"})).unwrap();
        assert!(update.validate().is_ok());

        let update: AdminUserUpdate = serde_json::from_value(json!({"role": "   "})).unwrap();
        assert!(update.validate().is_ok());
        assert_eq!(update.into_changeset().role, None);

        let update: AdminUserUpdate =
            serde_json::from_value(json!({"username": "  ", "role": "medical"})).unwrap();

        let changes = update.into_changeset();
        assert_eq!(changes.username, None);
        assert_eq!(changes.role.as_deref(), Some("medical"));
    }

    #[test]
    fn contact_priority_bounds() {
        assert!(valid_priority(&1));
        assert!(valid_priority(&10));
        assert!(!valid_priority(&0));
        assert!(!valid_priority(&11));
    }
}
