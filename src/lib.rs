//! Librarium Library Management System
//!
//! A Rust REST API server for managing a library catalog of books, authors,
//! and categories, its registered users, and the loan lifecycle
//! (borrow, return, extend, overdue accounting).

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
