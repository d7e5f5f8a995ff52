use actix_web::{HttpResponse, web};
use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Date, Int4, Nullable, Text, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::audit::{self, AuditAction, ClientIp};
use crate::auth::{AuthUser, Role};
use crate::db::{self, DbPool};
use crate::error::{ApiError, ResultExt};
use crate::models::NewHealthReport;
use crate::reports::{OVERALL_REPORT, SavedReport, SavedReportRow, build_overall_report};
use crate::response::{self, PageQuery};
use crate::schema::health_reports;
use crate::validation::{Validator, parse_date};

const REPORT_NOT_FOUND: &str = "Laporan tidak ditemukan";

const SAVED_REPORT_SELECT: &str = "SELECT hr.id, hr.elderly_id, u.full_name AS elderly_name, hr.report_type, \
            hr.start_date, hr.end_date, hr.report_data, hr.created_by, \
            creator.full_name AS created_by_name, hr.created_at \
     FROM health_reports hr \
     LEFT JOIN users u ON hr.elderly_id = u.id \
     LEFT JOIN users creator ON hr.created_by = creator.id";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl PeriodQuery {
    /// Defaults to the seven days ending today.
    fn resolve(&self, today: NaiveDate) -> Result<(NaiveDate, NaiveDate), ApiError> {
        let start = self.start_date.as_deref().filter(|s| !s.is_empty());
        let end = self.end_date.as_deref().filter(|s| !s.is_empty());
        Validator::new()
            .optional(start, |d: &str| parse_date(d).is_some(), "startDate", "Format tanggal tidak valid")
            .optional(end, |d: &str| parse_date(d).is_some(), "endDate", "Format tanggal tidak valid")
            .finish()?;

        let start = start.and_then(parse_date).unwrap_or(today - Duration::days(7));
        let end = end.and_then(parse_date).unwrap_or(today);
        if start > end {
            return Err(ApiError::bad_request(
                "Tanggal mulai tidak boleh setelah tanggal selesai",
            ));
        }
        Ok((start, end))
    }
}

// Handler to build, store and return the overall elderly report
pub async fn generate_overall(
    pool: web::Data<DbPool>,
    user: AuthUser,
    ip: ClientIp,
    query: web::Query<PeriodQuery>,
) -> Result<HttpResponse, ApiError> {
    user.require(&[Role::Admin])?;
    let now = Utc::now().naive_utc();
    let (start, end) = query.resolve(now.date())?;

    let (report_id, report) = db::run(&pool, move |conn| {
        let report = build_overall_report(conn, start, end, &user.full_name, now)?;
        let blob = serde_json::to_string(&report).map_err(anyhow::Error::from)?;

        let report_id: i32 = diesel::insert_into(health_reports::table)
            .values(&NewHealthReport {
                elderly_id: None,
                report_type: OVERALL_REPORT.to_string(),
                start_date: start,
                end_date: end,
                report_data: Some(blob),
                created_by: user.id,
            })
            .returning(health_reports::id)
            .get_result(conn)?;

        let description = format!("Membuat laporan {OVERALL_REPORT} periode {start} s/d {end}");
        audit::record(conn, user.id, AuditAction::GenerateReport, &description, &ip);
        Ok((report_id, report))
    })
    .await
    .context("Gagal membuat laporan")?;

    info!(report_id, %start, %end, "overall report generated");
    Ok(response::ok_with(
        "Laporan berhasil dibuat",
        json!({ "reportId": report_id, "report": report }),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub report_type: Option<String>,
}

#[derive(Debug, QueryableByName)]
struct Total {
    #[diesel(sql_type = BigInt)]
    total: i64,
}

pub async fn list_reports(
    pool: web::Data<DbPool>,
    user: AuthUser,
    query: web::Query<ReportListQuery>,
) -> Result<HttpResponse, ApiError> {
    user.require(&[Role::Admin, Role::Medical])?;
    let query = query.into_inner();
    let page = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .resolve(10)?;
    let report_type = query.report_type.filter(|t| !t.is_empty());

    let (reports, total) = db::run(&pool, move |conn| {
        let Total { total } = diesel::sql_query(
            "SELECT COUNT(*) AS total FROM health_reports \
             WHERE ($1::text IS NULL OR report_type = $1)",
        )
        .bind::<Nullable<Text>, _>(report_type.clone())
        .get_result::<Total>(conn)?;

        let rows = diesel::sql_query(format!(
            "{SAVED_REPORT_SELECT} \
             WHERE ($1::text IS NULL OR hr.report_type = $1) \
             ORDER BY hr.created_at DESC \
             LIMIT $2 OFFSET $3"
        ))
        .bind::<Nullable<Text>, _>(report_type)
        .bind::<BigInt, _>(page.limit)
        .bind::<BigInt, _>(page.offset())
        .load::<SavedReportRow>(conn)?;

        let reports: Vec<SavedReport> = rows.into_iter().map(SavedReport::from).collect();
        Ok((reports, total))
    })
    .await
    .context("Gagal mengambil laporan")?;

    Ok(response::ok(json!({
        "reports": reports,
        "pagination": page.describe(total),
    })))
}

#[derive(Debug, Serialize, QueryableByName)]
struct TypeCount {
    #[diesel(sql_type = Text)]
    report_type: String,
    #[diesel(sql_type = BigInt)]
    count: i64,
}

#[derive(Debug, Serialize, QueryableByName)]
struct RecentReport {
    #[diesel(sql_type = Int4)]
    id: i32,
    #[diesel(sql_type = Text)]
    report_type: String,
    #[diesel(sql_type = Date)]
    start_date: NaiveDate,
    #[diesel(sql_type = Date)]
    end_date: NaiveDate,
    #[diesel(sql_type = Timestamp)]
    created_at: NaiveDateTime,
    #[diesel(sql_type = Nullable<Text>)]
    elderly_name: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    created_by_name: Option<String>,
}

pub async fn statistics(pool: web::Data<DbPool>, user: AuthUser) -> Result<HttpResponse, ApiError> {
    user.require(&[Role::Admin])?;

    let (statistics, recent_reports) = db::run(&pool, move |conn| {
        let statistics = diesel::sql_query(
            "SELECT report_type, COUNT(*) AS count \
             FROM health_reports \
             GROUP BY report_type \
             ORDER BY report_type",
        )
        .load::<TypeCount>(conn)?;

        let recent = diesel::sql_query(
            "SELECT hr.id, hr.report_type, hr.start_date, hr.end_date, hr.created_at, \
                    u.full_name AS elderly_name, creator.full_name AS created_by_name \
             FROM health_reports hr \
             LEFT JOIN users u ON hr.elderly_id = u.id \
             LEFT JOIN users creator ON hr.created_by = creator.id \
             ORDER BY hr.created_at DESC \
             LIMIT 5",
        )
        .load::<RecentReport>(conn)?;

        Ok((statistics, recent))
    })
    .await
    .context("Gagal mengambil statistik laporan")?;

    Ok(response::ok(json!({
        "statistics": statistics,
        "recentReports": recent_reports,
    })))
}

pub async fn get_report(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    user.require(&[Role::Admin, Role::Medical])?;
    let id = path.into_inner();

    let report = db::run(&pool, move |conn| {
        diesel::sql_query(format!("{SAVED_REPORT_SELECT} WHERE hr.id = $1"))
            .bind::<Int4, _>(id)
            .get_result::<SavedReportRow>(conn)
            .optional()?
            .map(SavedReport::from)
            .ok_or_else(|| ApiError::not_found(REPORT_NOT_FOUND))
    })
    .await
    .context("Gagal mengambil laporan")?;

    Ok(response::ok(report))
}

pub async fn delete_report(
    pool: web::Data<DbPool>,
    user: AuthUser,
    ip: ClientIp,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    user.require(&[Role::Admin])?;
    let id = path.into_inner();

    db::run(&pool, move |conn| {
        let deleted = diesel::delete(health_reports::table.find(id)).execute(conn)?;
        if deleted == 0 {
            return Err(ApiError::not_found(REPORT_NOT_FOUND));
        }
        let description = format!("Menghapus laporan ID: {id}");
        audit::record(conn, user.id, AuditAction::DeleteReport, &description, &ip);
        Ok(())
    })
    .await
    .context("Gagal menghapus laporan")?;

    info!(report_id = id, "report deleted");
    Ok(response::ok_message("Laporan berhasil dihapus"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    #[test]
    fn period_defaults_to_last_week() {
        let (start, end) = PeriodQuery::default().resolve(today()).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 6, 8).unwrap());
        assert_eq!(end, today());
    }

    #[test]
    fn explicit_period_is_used() {
        let query = PeriodQuery {
            start_date: Some("2024-05-01".into()),
            end_date: Some("2024-05-31".into()),
        };
        let (start, end) = query.resolve(today()).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 5, 31).unwrap());
    }

    #[test]
    fn inverted_or_malformed_periods_are_rejected() {
        let inverted = PeriodQuery {
            start_date: Some("2024-06-10".into()),
            end_date: Some("2024-06-01".into()),
        };
        assert!(matches!(inverted.resolve(today()), Err(ApiError::BadRequest(_))));

        let malformed = PeriodQuery {
            start_date: Some("kemarin".into()),
            end_date: None,
        };
        assert!(matches!(malformed.resolve(today()), Err(ApiError::Validation(_))));
    }
}
