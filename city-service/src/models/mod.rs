pub mod city;

pub use city::{CityRecord, Revision, StoredCity};
