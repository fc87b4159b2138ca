pub mod city;

pub use city::{
    validate_city_param, CityPayload, CityPopulationResponse, PayloadError, UpsertCityRequest,
    UpsertCityResponse,
};
