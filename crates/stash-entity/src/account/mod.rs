//! Storage account (quota ledger row).

pub mod model;

pub use model::StorageAccount;
