//! Data models organized by domain entity.

pub mod record;
pub mod scan_event;
