//! Dead-Letter Store (C7) — file-per-entry JSON persistence for parked
//! failed runs.

pub mod store;
pub mod types;

pub use store::DlqStore;
pub use types::{
    DlqEntry, DlqError, DlqFilter, DlqMetadata, EntryStatus, ErrorDetails, FailureReason,
};
