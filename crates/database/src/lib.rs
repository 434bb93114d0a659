//! # Clusterstore Database Crate
//!
//! This crate is the persistence layer for cluster configuration records,
//! logic-cluster mappings and query history.
//!
//! ## Architectural Principles
//!
//! - **Pluggable backend:** callers program against the [`Persistent`] trait.
//!   [`SqlPersistent`] implements it on top of `sqlx`'s runtime-selected
//!   driver, so postgres and sqlite share one code path.
//! - **Explicit transactions:** a handle is either detached or inside exactly
//!   one transaction; `begin`/`commit`/`rollback` out of sequence fail with
//!   [`ErrorKind::TransactionState`].
//! - **Normalized errors:** backend errors are classified once, on entry,
//!   into the small [`ErrorKind`] taxonomy.
//! - **Secrets at rest:** every write encodes the config passwords through a
//!   [`PasswordCodec`] and every read decodes them, always on copies.
//!
//! ## Public API
//!
//! - `connect` / `create_schema`: pool creation and idempotent schema bootstrap.
//! - `SqlPersistent::init`: both of the above plus the handle.
//! - `DbError` / `ErrorKind`: the errors returned by this crate.

// Declare the modules that constitute this crate.
pub mod codec;
pub mod connection;
pub mod error;
pub mod mapper;
pub mod repository;

// Re-export the key components to create a clean, public-facing API.
pub use codec::{CodecError, ObscuringCodec, PasswordCodec};
pub use connection::{connect, create_schema};
pub use error::{DbError, ErrorKind, TransactionStateError};
pub use repository::{Persistent, QUERY_HISTORY_PAGE_LIMIT, SqlPersistent};
