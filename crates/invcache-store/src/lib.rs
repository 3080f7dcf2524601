//! # invcache-store
//!
//! Persistent, cross-process cache of inventory metadata: hosts, group
//! memberships and per-host variables, kept in a single JSON document.
//!
//! Concurrent processes coordinate through an advisory lock on the backing
//! file (see `invcache-lock`). Writers hold the exclusive lock for the whole
//! load-modify-store cycle; readers share. A missing or unparseable file
//! heals itself from the default template.
//!
//! ## Layout
//!
//! - [`document`]: typed model and deterministic JSON encoding
//! - [`template`]: default document and reserved localhost keys
//! - [`ops`]: host add/update/delete/query rules on a document
//! - [`persist`]: load-or-default and store through a held lock
//! - [`cache`]: the [`InvCache`] handle

pub mod cache;
pub mod document;
pub mod hostvars;
pub mod ops;
pub mod persist;
pub mod template;

pub use cache::InvCache;
pub use document::{
    decode, render, DecodeError, Group, HostVars, InventoryDocument, MetaSection, META_KEY,
};
pub use hostvars::{take_join_groups, JOIN_GROUPS_KEY};
pub use invcache_lock::{LockError, LockMode};
pub use ops::HostEntry;
pub use persist::Loaded;
pub use template::{
    Template, ALL_GROUP, CACHE_VERSION, DEFAULT_GROUPS, LOCALHOST, RESERVED_FILE_KEY,
    RESERVED_KEYS, RESERVED_VERSION_KEY,
};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid inventory document {path}: {reason}")]
    InvalidDocument { path: PathBuf, reason: String },

    #[error("error loading or parsing default 'empty' cache after writing it to {path}: {reason}")]
    RecoveryFailed { path: PathBuf, reason: String },

    #[error("incompatible cache {path}: {reason}")]
    IncompatibleCache { path: PathBuf, reason: String },

    #[error("'{name}' is reserved and cannot be used as a group name")]
    ReservedGroupName { name: String },

    #[error("join_groups must be a list of group names, got {found}")]
    InvalidJoinGroups { found: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;
