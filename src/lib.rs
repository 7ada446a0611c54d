pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod persistence;
pub mod progress;
pub mod repository;
pub mod services;
pub mod state;
pub mod users;
