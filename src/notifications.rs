use std::time::Duration as StdDuration;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use diesel::prelude::*;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

use crate::db::{self, DbPool};
use crate::models::{Appointment, Medicine, NewNotification};
use crate::schema::{appointments, family_elderly_relations, medicine_logs, medicines, notifications};

pub const KIND_MONITORING_ALERT: &str = "monitoring_alert";
pub const KIND_MEDICINE_REMINDER: &str = "medicine_reminder";
pub const KIND_APPOINTMENT_REMINDER: &str = "appointment_reminder";

/// Sends one notification to every family member linked to `elderly_id`.
pub fn notify_family(
    conn: &mut PgConnection,
    elderly_id: i32,
    kind: &str,
    title: &str,
    message: &str,
) -> QueryResult<usize> {
    let family: Vec<i32> = family_elderly_relations::table
        .filter(family_elderly_relations::elderly_user_id.eq(elderly_id))
        .select(family_elderly_relations::family_user_id)
        .load(conn)?;

    let rows: Vec<NewNotification> = family
        .into_iter()
        .map(|user_id| NewNotification::new(user_id, kind, title, message))
        .collect();

    if rows.is_empty() {
        return Ok(0);
    }
    diesel::insert_into(notifications::table)
        .values(&rows)
        .execute(conn)
}

/// Whether a dose scheduled at `schedule` falls in the hour starting at
/// `now`. The window wraps past midnight.
pub fn in_reminder_window(schedule: NaiveTime, now: NaiveTime) -> bool {
    let (end, wrapped) = now.overflowing_add_signed(Duration::hours(1));
    if wrapped == 0 {
        schedule >= now && schedule < end
    } else {
        schedule >= now || schedule < end
    }
}

pub fn medicine_reminder_message(medicine: &Medicine) -> String {
    format!(
        "Waktunya minum obat: {} ({})",
        medicine.medicine_name, medicine.dosage
    )
}

pub fn appointment_reminder_message(appointment: &Appointment) -> String {
    let location = appointment
        .location
        .as_deref()
        .filter(|l| !l.trim().is_empty())
        .unwrap_or("lokasi yang telah ditentukan");

    match appointment.appointment_time {
        Some(time) => format!(
            "Jadwal besok: {} pukul {} di {}",
            appointment.title,
            time.format("%H:%M"),
            location
        ),
        None => format!("Jadwal besok: {} di {}", appointment.title, location),
    }
}

/// Reminds owners of active medicines due within the coming hour that have
/// not been logged today. Returns the number of notifications written.
pub fn send_medicine_reminders(conn: &mut PgConnection, now: NaiveDateTime) -> QueryResult<usize> {
    let today = now.date();
    let due: Vec<Medicine> = medicines::table
        .filter(medicines::is_active.eq(true))
        .filter(medicines::time_schedule.is_not_null())
        .filter(medicines::start_date.le(today))
        .filter(medicines::end_date.is_null().or(medicines::end_date.ge(today)))
        .select(Medicine::as_select())
        .load(conn)?
        .into_iter()
        .filter(|m| m.time_schedule.is_some_and(|t| in_reminder_window(t, now.time())))
        .collect();

    let start_of_day = today.and_time(NaiveTime::MIN);
    let mut sent = 0;
    for medicine in due {
        let logged_today: bool = diesel::select(diesel::dsl::exists(
            medicine_logs::table
                .filter(medicine_logs::medicine_id.eq(medicine.id))
                .filter(medicine_logs::taken_at.ge(start_of_day)),
        ))
        .get_result(conn)?;
        if logged_today {
            continue;
        }

        diesel::insert_into(notifications::table)
            .values(&NewNotification::new(
                medicine.user_id,
                KIND_MEDICINE_REMINDER,
                "Pengingat Obat",
                medicine_reminder_message(&medicine),
            ))
            .execute(conn)?;
        debug!(medicine_id = medicine.id, user_id = medicine.user_id, "medicine reminder sent");
        sent += 1;
    }

    Ok(sent)
}

/// Reminds owners of tomorrow's scheduled appointments once each.
pub fn send_appointment_reminders(conn: &mut PgConnection, today: NaiveDate) -> QueryResult<usize> {
    let Some(tomorrow) = today.succ_opt() else {
        return Ok(0);
    };

    let pending: Vec<Appointment> = appointments::table
        .filter(appointments::appointment_date.eq(tomorrow))
        .filter(appointments::status.eq("scheduled"))
        .filter(appointments::reminder_sent.eq(false))
        .select(Appointment::as_select())
        .load(conn)?;

    let mut sent = 0;
    for appointment in pending {
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            diesel::insert_into(notifications::table)
                .values(&NewNotification::new(
                    appointment.user_id,
                    KIND_APPOINTMENT_REMINDER,
                    "Pengingat Jadwal",
                    appointment_reminder_message(&appointment),
                ))
                .execute(conn)?;
            diesel::update(appointments::table.find(appointment.id))
                .set(appointments::reminder_sent.eq(true))
                .execute(conn)?;
            Ok(())
        })?;
        debug!(appointment_id = appointment.id, user_id = appointment.user_id, "appointment reminder sent");
        sent += 1;
    }

    Ok(sent)
}

/// Starts the periodic reminder job on the current runtime.
pub fn spawn_reminders(pool: DbPool, every: StdDuration) {
    info!(interval_secs = every.as_secs(), "Starting reminder scheduler");

    actix_web::rt::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let now = Utc::now().naive_utc();

            let result = db::run(&pool, move |conn| {
                let medicines = send_medicine_reminders(conn, now)?;
                let appointments = send_appointment_reminders(conn, now.date())?;
                Ok((medicines, appointments))
            })
            .await;

            match result {
                Ok((medicines, appointments)) => {
                    info!(medicines, appointments, "Reminder run finished");
                }
                Err(e) => error!(error = %e, "Reminder run failed"),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    #[test]
    fn window_covers_the_coming_hour() {
        let now = t("08:00");
        assert!(in_reminder_window(t("08:00"), now));
        assert!(in_reminder_window(t("08:59"), now));
        assert!(!in_reminder_window(t("09:00"), now));
        assert!(!in_reminder_window(t("07:59"), now));
    }

    #[test]
    fn window_wraps_past_midnight() {
        let now = t("23:30");
        assert!(in_reminder_window(t("23:45"), now));
        assert!(in_reminder_window(t("00:15"), now));
        assert!(!in_reminder_window(t("00:30"), now));
        assert!(!in_reminder_window(t("12:00"), now));
    }

    fn appointment(time: Option<&str>, location: Option<&str>) -> Appointment {
        let stamp = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        Appointment {
            id: 1,
            user_id: 2,
            title: "Kontrol jantung".into(),
            description: None,
            appointment_date: NaiveDate::from_ymd_opt(2024, 6, 2).unwrap(),
            appointment_time: time.map(t),
            location: location.map(str::to_string),
            doctor_name: None,
            status: "scheduled".into(),
            reminder_sent: false,
            created_by: None,
            created_at: stamp,
            updated_at: stamp,
        }
    }

    #[test]
    fn appointment_messages() {
        assert_eq!(
            appointment_reminder_message(&appointment(Some("09:30"), Some("RS Harapan"))),
            "Jadwal besok: Kontrol jantung pukul 09:30 di RS Harapan"
        );
        assert_eq!(
            appointment_reminder_message(&appointment(None, None)),
            "Jadwal besok: Kontrol jantung di lokasi yang telah ditentukan"
        );
    }

    #[test]
    fn new_notifications_share_the_readers_clock() {
        let row = NewNotification::new(4, KIND_MONITORING_ALERT, "Alert Monitoring", "Tekanan darah tinggi");
        assert_eq!(row.notification_type, "monitoring_alert");

        let now = Utc::now().naive_utc();
        assert!(row.created_at <= now);
        assert_eq!(crate::monitoring::relative_time(row.created_at, now), "0 menit lalu");
        assert!(now - row.created_at < Duration::minutes(1));
    }
}
