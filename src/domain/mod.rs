//! Domain layer: the sensor model, decoded-reading state, events, and
//! settings. No transport types leak in here beyond the characteristic
//! UUID used as the session handle.

pub mod models;
pub mod readings;
pub mod sensors;
pub mod settings;
