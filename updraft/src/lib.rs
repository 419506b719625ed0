//! Core of the updraft distribution backend.
//!
//! Release artifacts are placed into a [`storage::BlobStore`] by the
//! [`positioner::Positioner`], which also keeps the static update feeds that
//! desktop auto-updaters poll in sync. Durable state lives behind the
//! [`catalog::ReleaseCatalog`] contract and [`releases::ReleaseManager`]
//! ties the two together under the per-application lock.

pub mod catalog;
pub mod cdn;
pub mod config;
pub mod drafts;
pub mod error;
pub mod hashing;
pub mod lock;
pub mod paths;
pub mod positioner;
pub mod releases;
pub mod shutdown;
pub mod storage;
pub mod version_order;

pub use error::{Error, Result};
