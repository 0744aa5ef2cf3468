//! Data models.

pub mod config;
pub mod invoice;
pub mod page;
pub mod report;
