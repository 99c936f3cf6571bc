// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Self-updating distribution client for the Cadenza plugin suite.
//!
//! Cadenza ships a set of local plugin artifacts (hook scripts, command
//! definitions, agent descriptors, docs, config) from a central server into
//! a managed installation root. This crate is the client half: it reads the
//! local version record, asks the server what is current, and reconciles the
//! installed tree against the server's manifest.
//!
//! The reconciliation engine is the heart of the crate. It decides what to
//! download, back up, overwrite, or delete, and it carries the invariants
//! that matter: never lose user data, never leave a half-updated tree, and
//! never delete a file the distribution did not create.

pub mod client;
pub mod config;
pub mod digest;
pub mod install;
pub mod manifest;
pub mod mutate;
pub mod path;
pub mod reconcile;

pub use client::{HttpSource, RemoteSource, VersionComparison};
pub use config::Settings;
pub use install::{InstallOptions, InstallOutcome, Installer, UpdateNotice};
pub use manifest::{read_current_version, Category, ComponentInfo, Manifest};
pub use mutate::Mutator;
pub use reconcile::{Outcome, OperationResult, Summary};
