pub mod api;
pub mod auth;
pub mod config;
pub mod geo;
pub mod models;
pub mod pop;
pub mod storage;
