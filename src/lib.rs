pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod models;
pub mod service;
pub mod stats;
pub mod ui;

pub use error::{AppError, Result};
