//! HTTP and live-channel surface of the artisan marketplace, backed by SQLite.

pub mod accounts;
pub mod api;
pub mod auth;
pub mod bookings;
pub mod config;
pub mod db;
pub mod error;
pub mod messages;
pub mod model;
pub mod payments;
pub mod reviews;
pub mod ws;
