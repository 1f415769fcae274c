//! Business logic services.

pub mod image_service;
pub mod record_service;
