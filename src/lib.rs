//! # Nodekit Core Library
//!
//! This crate contains the building blocks for acquiring and running a
//! project-local JavaScript toolchain: it resolves which Node version a
//! project wants, downloads and verifies the matching release, installs
//! node/npm/yarn/pnpm/bun/corepack under a project directory without any
//! system-wide state, and runs build tasks through those local tools.
//!
//! This library is built for the `nodekit` CLI, but you can also reuse it
//! as a backend in other tools.
//!
//! ## Modules Overview
//! - [`version`] – Pinned-version resolution (`.nvmrc` and friends) and
//!   normalization against the Node release index
//! - [`platform`] – Host OS/architecture detection and download naming
//! - [`cache`] – Shared download cache keyed by artifact descriptors
//! - [`download`] – HTTP(S)/file downloads with proxy and auth support
//! - [`checksum`] – SHASUMS256 manifest verification
//! - [`archive`] – Safe zip/tar.gz extraction
//! - [`install`] – Idempotent per-tool installers
//! - [`process`] – Running child processes with the local tools on `PATH`
//! - [`args`] – Quote-aware argument string parsing
//! - [`digest`] – Incremental-build change detection
//! - [`task`] – Running build tasks from the project's `node_modules`
//! - [`error`] – The error taxonomy shared by all of the above

pub mod archive;
pub mod args;
pub mod cache;
pub mod checksum;
pub mod digest;
pub mod download;
pub mod error;
pub mod install;
pub mod platform;
pub mod process;
pub mod task;
pub mod version;

pub use cache::*;
pub use download::*;
pub use install::*;
pub use platform::*;
pub use process::*;
