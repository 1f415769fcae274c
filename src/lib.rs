//! scanlink - QR link-tracking service.
//!
//! Mints short sortable identifiers for destination addresses, renders QR
//! images encoding the tracking address, counts every scan atomically, and
//! redirects scanners to the destination.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx behind the `RecordStore` trait
//! - **Protection**: fixed-window rate limiting and a tag-invalidated TTL
//!   cache, both process-local
//! - **Images**: QR SVGs in a filesystem object store, served via
//!   HMAC-signed, time-boxed references

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod rate_limit;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod validation;
