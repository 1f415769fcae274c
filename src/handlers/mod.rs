//! HTTP request handlers.

pub mod health;
pub mod records;
pub mod track;
