// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Strap application installs onto the native package manager.
//!
//! Applications describe how they are installed through a manifest. The
//! system format of a manifest is a list of packages, repositories, and
//! package manager choices, each of which can be restricted to a subset of
//! platforms by OS name, OS version, and CPU architecture. Strapon figures out
//! which platform it runs on, merges whatever applies into installer
//! metadata, and dispatches install, remove, or purge to the package manager
//! of the running distribution.
//!
//! # See Also
//!
//! - [os-release(5)](https://www.freedesktop.org/software/systemd/man/latest/os-release.html)

pub mod app;
pub mod config;
pub mod identity;
pub mod installer;
pub mod metadata;
pub mod path;
pub mod target;
