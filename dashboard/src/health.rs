use crate::state::{DashboardState, SourceHealth};
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use serde::Serialize;
use shared::sheets::SheetSource;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SourceReport {
    healthy: bool,
    #[serde(flatten)]
    health: SourceHealth,
}

#[derive(Debug, Serialize)]
struct HealthReport {
    healthy: bool,
    sources: BTreeMap<&'static str, SourceReport>,
}

/// 200 while every sheet source has succeeded within three of its intervals, 500 otherwise.
pub async fn health_check(State(state): State<DashboardState>) -> impl IntoResponse {
    let now = Utc::now();
    let sources: BTreeMap<_, _> = SheetSource::ALL
        .into_iter()
        .map(|source| {
            let health = state.health.source(source).read().clone();
            let report = SourceReport {
                healthy: health.is_healthy(now),
                health,
            };
            (source.name(), report)
        })
        .collect();

    let healthy = sources.values().all(|report| report.healthy);
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    (status, Json(HealthReport { healthy, sources }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use shared::Config;

    #[tokio::test]
    async fn unhealthy_until_every_source_succeeds() {
        let state = DashboardState::new(&Config::default());
        let response = health_check(State(state.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        for source in SheetSource::ALL {
            state.health.source(source).write().last_successful = Some(Utc::now());
        }
        let response = health_check(State(state.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        state.health.calls.write().last_successful = Some(Utc::now() - TimeDelta::minutes(5));
        let response = health_check(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
