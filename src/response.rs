use actix_web::HttpResponse;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, FieldError};

/// The `{success, message, data}` envelope every endpoint answers with.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

pub fn ok<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse {
        success: true,
        message: None,
        data: Some(data),
    })
}

pub fn ok_with<T: Serialize>(message: &str, data: T) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse {
        success: true,
        message: Some(message.to_string()),
        data: Some(data),
    })
}

pub fn ok_message(message: &str) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::<()> {
        success: true,
        message: Some(message.to_string()),
        data: None,
    })
}

pub fn created<T: Serialize>(message: &str, data: T) -> HttpResponse {
    HttpResponse::Created().json(ApiResponse {
        success: true,
        message: Some(message.to_string()),
        data: Some(data),
    })
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub const MAX_PAGE_LIMIT: i64 = 100;

/// Resolved paging window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }

    pub fn describe(&self, total: i64) -> Pagination {
        Pagination {
            page: self.page,
            limit: self.limit,
            total,
            total_pages: (total + self.limit - 1) / self.limit,
        }
    }
}

impl PageQuery {
    pub fn resolve(&self, default_limit: i64) -> Result<Page, ApiError> {
        let page = self.page.unwrap_or(1);
        let limit = self.limit.unwrap_or(default_limit);

        let mut errors = Vec::new();
        if page < 1 {
            errors.push(FieldError::new("page", "Halaman minimal 1"));
        }
        if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
            errors.push(FieldError::new("limit", "Limit harus antara 1 dan 100"));
        } else if page >= 1 && (page - 1).checked_mul(limit).is_none() {
            errors.push(FieldError::new("page", "Halaman terlalu besar"));
        }

        if errors.is_empty() {
            Ok(Page { page, limit })
        } else {
            Err(ApiError::Validation(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_defaults_and_offsets() {
        let page = PageQuery::default().resolve(10).unwrap();
        assert_eq!(page, Page { page: 1, limit: 10 });
        assert_eq!(page.offset(), 0);

        let page = PageQuery {
            page: Some(3),
            limit: Some(20),
        }
        .resolve(10)
        .unwrap();
        assert_eq!(page.offset(), 40);
    }

    #[test]
    fn total_pages_rounds_up() {
        let page = Page { page: 1, limit: 10 };
        assert_eq!(page.describe(0).total_pages, 0);
        assert_eq!(page.describe(10).total_pages, 1);
        assert_eq!(page.describe(11).total_pages, 2);
    }

    #[test]
    fn rejects_out_of_range_paging() {
        let query = PageQuery {
            page: Some(0),
            limit: Some(500),
        };
        match query.resolve(10) {
            Err(ApiError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_pages_whose_offset_overflows() {
        let query = PageQuery {
            page: Some(i64::MAX),
            limit: Some(100),
        };
        match query.resolve(10) {
            Err(ApiError::Validation(errors)) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "page");
            }
            other => panic!("expected validation error, got {other:?}"),
        }

        let last = PageQuery {
            page: Some(i64::MAX / 100),
            limit: Some(100),
        }
        .resolve(10)
        .unwrap();
        assert!(last.offset() > 0);
    }

    #[test]
    fn pagination_serializes_camel_case() {
        let value = serde_json::to_value(Page { page: 2, limit: 5 }.describe(12)).unwrap();
        assert_eq!(value["totalPages"], 3);
        assert_eq!(value["page"], 2);
    }
}
