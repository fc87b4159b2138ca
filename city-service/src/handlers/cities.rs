use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;

use crate::dtos::{validate_city_param, CityPayload, CityPopulationResponse, UpsertCityResponse};
use crate::startup::AppState;

/// `POST /city`: insert the city, update its population, or leave it as is.
#[tracing::instrument(skip(state, request), fields(city = %request.city))]
pub async fn upsert_city(
    State(state): State<AppState>,
    CityPayload(request): CityPayload,
) -> Result<Json<UpsertCityResponse>, AppError> {
    let outcome = state
        .population
        .upsert(&request.city, request.population)
        .await?;

    Ok(Json(outcome.into()))
}

/// `GET /population/:city`
#[tracing::instrument(skip(state))]
pub async fn get_population(
    State(state): State<AppState>,
    Path(city): Path<String>,
) -> Result<Json<CityPopulationResponse>, AppError> {
    validate_city_param(&city)?;

    match state.population.get(&city).await? {
        Some(record) => Ok(Json(record.into())),
        None => {
            tracing::debug!("City not found");
            Err(AppError::NotFound("City not found".to_string()))
        }
    }
}
