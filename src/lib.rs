pub mod auth;
pub mod config;
pub mod consensus;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod store;
