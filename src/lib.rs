//! # ArchGate Core Library
//!
//! This crate implements the archive operations subsystem of a multi-user
//! storage platform: sandboxed automation scripts inspect, create, and
//! extract compressed archives (zip, tar, tar.gz, gzip) against a
//! permission-checked virtual path namespace, and every file materialized
//! by such an operation is attributed to an owning principal afterwards.
//!
//! ## Key Modules
//!
//! - [`gateway`]: The script-facing boundary: argument normalization, the
//!   permission gate, and the dual failure channels.
//! - [`vfs`]: Virtual paths, the filesystem abstraction, the mount router,
//!   and the ownership store.
//! - [`detect`]: Archive format classification and the codec probe.
//! - [`codec`]: Per-format archive/unarchive/compress/decompress primitives.
//! - [`ops`]: The operation executor dispatching over the closed format set.
//! - [`zipview`]: The zip content indexer (tree, directory listing, single
//!   entry extraction).
//! - [`owner`]: Post-write ownership propagation.
//!
//! Every call is synchronous and runs on the invoking script's thread; the
//! subsystem spawns no background work and holds no cross-call state beyond
//! the ownership store inside [`vfs::Vfs`].

pub mod codec;
pub mod detect;
pub mod error;
pub mod gateway;
pub mod ops;
pub mod owner;
pub mod user;
pub mod vfs;
pub mod zipview;

pub use error::{OpError, PermissionViolation};
