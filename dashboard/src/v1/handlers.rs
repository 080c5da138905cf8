use crate::map::MapOverlay;
use crate::state::DashboardState;
use crate::v1::error::ApiError;
use crate::v1::views::{CallView, DutyEventView, VehicleView};
use axum::Json;
use axum::extract::State;
use chrono::{Local, NaiveDateTime};
use shared::sheets::calls::displayed_calls;
use shared::sheets::duty::upcoming_duty_events;
use shared::sheets::personnel::PersonnelCategory;
use shared::weather::WeatherReport;

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

pub async fn get_vehicles(State(state): State<DashboardState>) -> Result<Json<Vec<VehicleView>>, ApiError> {
    let vehicles = state.vehicles.read().clone().ok_or(ApiError::NotLoaded("vehicles"))?;
    let prefix = &state.display.radio_prefix;

    Ok(Json(vehicles.iter().map(|v| VehicleView::new(v, prefix)).collect()))
}

pub async fn get_duty(State(state): State<DashboardState>) -> Result<Json<Vec<DutyEventView>>, ApiError> {
    let events = state.duty.read().clone().ok_or(ApiError::NotLoaded("duty"))?;
    let now = local_now();

    Ok(Json(
        upcoming_duty_events(&events, now, state.display.max_duty_events)
            .into_iter()
            .map(|event| DutyEventView {
                current: event.is_current(now),
                event,
            })
            .collect(),
    ))
}

pub async fn get_calls(State(state): State<DashboardState>) -> Result<Json<Vec<CallView>>, ApiError> {
    let calls = state.calls.read().clone().ok_or(ApiError::NotLoaded("calls"))?;

    Ok(Json(
        displayed_calls(&calls, local_now(), state.display.max_calls)
            .into_iter()
            .map(CallView::from)
            .collect(),
    ))
}

pub async fn get_personnel(
    State(state): State<DashboardState>,
) -> Result<Json<Vec<PersonnelCategory>>, ApiError> {
    let personnel = state.personnel.read().clone().ok_or(ApiError::NotLoaded("personnel"))?;
    Ok(Json(personnel.to_vec()))
}

pub async fn get_map(State(state): State<DashboardState>) -> Result<Json<MapOverlay>, ApiError> {
    let overlay = state.map.read().clone().ok_or(ApiError::NotLoaded("map"))?;
    Ok(Json(overlay))
}

pub async fn get_weather(State(state): State<DashboardState>) -> Result<Json<WeatherReport>, ApiError> {
    if !state.weather_enabled {
        return Err(ApiError::WeatherDisabled);
    }
    let report = state.weather.read().clone().ok_or(ApiError::NotLoaded("weather"))?;
    Ok(Json(report))
}
