// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Replication package toolkit.
//!
//! Repokit keeps two artifacts of a research replication package honest:
//!
//! - A __dependency manifest__ listing every external package the analysis
//!   code imports, with the version installed in the runtime it was scanned
//!   against. See [`scan`], [`runtime`], and [`manifest`].
//! - A __metadata document__, i.e., a machine-actionable data management plan
//!   following the RDA DMP Common Standard. See [`dmp`].
//!
//! Both are produced from an explicit [`config::ProjectConfig`] that is
//! loaded once per invocation and handed down. A lockfile of record can be
//! reconciled against scanned imports and installed packages through
//! [`lockfile`].

pub mod config;
pub mod dmp;
pub mod lockfile;
pub mod manifest;
pub mod path;
pub mod runtime;
pub mod scan;
