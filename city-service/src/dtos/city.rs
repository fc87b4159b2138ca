use crate::models::CityRecord;
use crate::services::UpsertOutcome;
use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
};
use serde::Serialize;
use serde_json::{Map, Value};
use service_core::error::AppError;
use thiserror::Error;
use validator::Validate;

/// Rejection reasons for city payloads, in the order they are checked.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("Invalid data. 'city' and 'population' are required.")]
    MissingFields,

    #[error("Invalid type. '{field}' must be {expected}.")]
    InvalidType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("Invalid value. 'population' must be a non-negative integer.")]
    NegativePopulation,

    #[error("Invalid request. 'city' parameter is missing.")]
    MissingCityParam,

    #[error("Invalid value. 'city' must not be '.' or '..'.")]
    ReservedCity,
}

/// Names that cannot be used as a document id in a URL path.
fn is_reserved_city(city: &str) -> bool {
    matches!(city, "." | "..")
}

impl From<PayloadError> for AppError {
    fn from(err: PayloadError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

/// Body of `POST /city` once it has passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct UpsertCityRequest {
    #[validate(length(min = 1, message = "Invalid value. 'city' must not be empty."))]
    pub city: String,
    pub population: u64,
}

/// Returns the value under `key` unless it is absent or `null`.
fn required<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object.get(key).filter(|v| !v.is_null())
}

impl TryFrom<&Value> for UpsertCityRequest {
    type Error = PayloadError;

    fn try_from(payload: &Value) -> Result<Self, Self::Error> {
        let object = payload.as_object().ok_or(PayloadError::MissingFields)?;

        let (city, population) = match (required(object, "city"), required(object, "population")) {
            (Some(city), Some(population)) => (city, population),
            _ => return Err(PayloadError::MissingFields),
        };

        let city = city.as_str().ok_or(PayloadError::InvalidType {
            field: "city",
            expected: "a string",
        })?;

        let population = match population {
            Value::Number(n) if n.is_u64() => n.as_u64().ok_or(PayloadError::NegativePopulation)?,
            Value::Number(n) if n.is_i64() => return Err(PayloadError::NegativePopulation),
            _ => {
                return Err(PayloadError::InvalidType {
                    field: "population",
                    expected: "an integer",
                })
            }
        };

        if is_reserved_city(city) {
            return Err(PayloadError::ReservedCity);
        }

        Ok(Self {
            city: city.to_string(),
            population,
        })
    }
}

/// Extractor that parses and validates a city payload before the handler runs.
pub struct CityPayload(pub UpsertCityRequest);

#[async_trait]
impl<S> FromRequest<S> for CityPayload
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read request body: {}", e)))?;

        // An absent or unparseable body carries neither field.
        let payload: Value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).map_err(|_| PayloadError::MissingFields)?
        };

        let request = UpsertCityRequest::try_from(&payload)?;
        request.validate()?;

        Ok(CityPayload(request))
    }
}

/// Checks the `{city}` path segment of `GET /population/{city}`.
pub fn validate_city_param(city: &str) -> Result<(), PayloadError> {
    if city.is_empty() {
        return Err(PayloadError::MissingCityParam);
    }
    if is_reserved_city(city) {
        return Err(PayloadError::ReservedCity);
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct UpsertCityResponse {
    pub message: String,
    pub operation: String,
}

impl From<UpsertOutcome> for UpsertCityResponse {
    fn from(outcome: UpsertOutcome) -> Self {
        Self {
            message: outcome.message().to_string(),
            operation: outcome.operation().to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CityPopulationResponse {
    pub city: String,
    pub population: u64,
}

impl From<CityRecord> for CityPopulationResponse {
    fn from(record: CityRecord) -> Self {
        Self {
            city: record.city,
            population: record.population,
        }
    }
}
