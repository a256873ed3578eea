use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{routing, Json, Router};
use health::{HealthRegistry, HealthStatus};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

use crate::metrics_utils::track_metrics;
use crate::native_writer::Writer;

pub const SYSTEM_CODE: &str = "native-ingester";
const NAME: &str = "Native Ingester";
const DESCRIPTION: &str =
    "Consumes native publish events from Kafka and writes their content to the native store.";

#[derive(Clone)]
pub struct AppState {
    pub writer: Arc<dyn Writer>,
    pub liveness: HealthRegistry,
}

pub fn app(state: AppState, metrics: Option<PrometheusHandle>) -> Router {
    Router::new()
        .route("/__health", routing::get(health_report))
        .route("/__gtg", routing::get(gtg))
        .route("/_liveness", routing::get(liveness))
        .route(
            "/metrics",
            routing::get(move || match metrics {
                Some(ref recorder_handle) => std::future::ready(recorder_handle.render()),
                None => std::future::ready("no metrics recorder installed".to_owned()),
            }),
        )
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state)
}

/// One entry of the `/__health` report.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Check {
    pub id: &'static str,
    pub name: &'static str,
    pub ok: bool,
    pub severity: u8,
    pub business_impact: &'static str,
    pub technical_summary: &'static str,
    pub panic_guide: &'static str,
    pub check_output: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub schema_version: u8,
    pub system_code: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub ok: bool,
    pub checks: Vec<Check>,
}

async fn writer_check(writer: &dyn Writer) -> Check {
    let (ok, check_output) = match writer.connectivity_check().await {
        Ok(output) => (true, output),
        Err(error) => (false, error.to_string()),
    };

    Check {
        id: "native-writer",
        name: "Native writer is reachable",
        ok,
        severity: 1,
        business_impact: "Content will not be written to the native store",
        technical_summary: "Checks that the native writer answers its good-to-go endpoint",
        panic_guide: "https://runbooks.in.ft.com/native-ingester",
        check_output,
    }
}

fn consumer_check(status: &HealthStatus) -> Check {
    let check_output = if status.healthy {
        "Consumer is polling Kafka.".to_owned()
    } else {
        let failing: Vec<String> = status
            .failing()
            .map(|(component, status)| format!("{component} is {status}"))
            .collect();
        if failing.is_empty() {
            "No consumer registered.".to_owned()
        } else {
            failing.join(", ")
        }
    };

    Check {
        id: "kafka-consumer",
        name: "Kafka consumer is alive",
        ok: status.healthy,
        severity: 1,
        business_impact: "Native publish events will not be consumed",
        technical_summary: "Checks that the consumer loop and the Kafka client report within their deadlines",
        panic_guide: "https://runbooks.in.ft.com/native-ingester",
        check_output,
    }
}

async fn checks(state: &AppState) -> Vec<Check> {
    vec![
        writer_check(state.writer.as_ref()).await,
        consumer_check(&state.liveness.get_status()),
    ]
}

pub async fn health_report(State(state): State<AppState>) -> impl IntoResponse {
    let checks = checks(&state).await;
    let ok = checks.iter().all(|check| check.ok);

    let report = HealthReport {
        schema_version: 1,
        system_code: SYSTEM_CODE,
        name: NAME,
        description: DESCRIPTION,
        ok,
        checks,
    };

    let status = match ok {
        true => StatusCode::OK,
        false => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(report))
}

pub async fn gtg(State(state): State<AppState>) -> impl IntoResponse {
    let failing: Vec<String> = checks(&state)
        .await
        .into_iter()
        .filter(|check| !check.ok)
        .map(|check| check.check_output)
        .collect();

    match failing.is_empty() {
        true => (StatusCode::OK, "OK".to_owned()),
        false => (StatusCode::SERVICE_UNAVAILABLE, failing.join("\n")),
    }
}

pub async fn liveness(State(state): State<AppState>) -> HealthStatus {
    state.liveness.get_status()
}
