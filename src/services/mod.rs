pub mod auth_service;
pub mod persist_service;
