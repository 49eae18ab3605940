use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use poem::handler;
use poem::http::StatusCode;
use poem::web::Data;
use poem::web::Json;
use poem::IntoResponse;
use poem::Response;
use serde::Serialize;

/// Shared readiness flag, raised once startup checks passed.
pub type Readiness = Arc<AtomicBool>;

#[derive(Debug, Serialize)]
pub struct ProbeStatus {
    pub status: &'static str,
}

#[handler]
pub fn liveness_probe() -> Json<ProbeStatus> {
    Json(ProbeStatus { status: "alive" })
}

#[handler]
pub fn readiness_probe(readiness: Data<&Readiness>) -> Response {
    if readiness.load(Ordering::SeqCst) {
        Json(ProbeStatus { status: "ready" }).into_response()
    } else {
        Json(ProbeStatus { status: "starting" })
            .with_status(StatusCode::SERVICE_UNAVAILABLE)
            .into_response()
    }
}
