use std::time::Instant;

use actix_web::{
    Error,
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next,
};
use tracing::{Instrument, info, info_span, warn};
use tracing_subscriber::{EnvFilter, fmt};
use uuid::Uuid;

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
}

/// Wraps every request in a span tagged with a fresh request id and logs the
/// outcome once the handler finishes.
pub async fn trace_requests(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let request_id = Uuid::new_v4();
    let span = info_span!(
        "request",
        %request_id,
        method = %req.method(),
        path = %req.path(),
    );
    let started = Instant::now();

    let result = next.call(req).instrument(span.clone()).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match &result {
        Ok(response) if response.status().is_server_error() => {
            warn!(parent: &span, status = response.status().as_u16(), elapsed_ms, "request failed");
        }
        Ok(response) => {
            info!(parent: &span, status = response.status().as_u16(), elapsed_ms, "request completed");
        }
        Err(e) => {
            warn!(parent: &span, error = %e, elapsed_ms, "request errored");
        }
    }

    result
}
