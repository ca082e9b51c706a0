//! Per-owner storage quota.

pub mod service;

pub use service::QuotaService;
