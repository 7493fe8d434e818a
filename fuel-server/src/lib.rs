//! Fuel station finder server.
//!
//! Answers "where is the cheapest fuel of this kind near this city?" by
//! combining the Italian government's station registry and price list with
//! a geocoder, both behind retry, caching and local fallbacks.

pub mod config;
pub mod fuel;
pub mod geo;
pub mod geocoding;
pub mod prices;
pub mod retry;
pub mod search;
pub mod web;
