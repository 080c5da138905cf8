mod error;
mod handlers;
mod views;

use crate::state::DashboardState;
use axum::Router;
use axum::routing::get;
use handlers::{get_calls, get_duty, get_map, get_personnel, get_vehicles, get_weather};

pub fn router() -> Router<DashboardState> {
    Router::<DashboardState>::new()
        .route("/vehicles", get(get_vehicles))
        .route("/duty", get(get_duty))
        .route("/calls", get(get_calls))
        .route("/personnel", get(get_personnel))
        .route("/map", get(get_map))
        .route("/weather", get(get_weather))
}
