// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Application management.
//!
//! An __application__ is anything strapon can install, remove, or purge. Each
//! application is described by a manifest that lists the install formats it
//! provides. An application can be provided through three formats:
//!
//! 1. __system__: packages of the native package manager.
//! 2. __standalone__: self-contained release artifacts.
//! 3. __source__: build from upstream source code.
//!
//! Only the system format can be dispatched right now. Selecting any other
//! format, or a format the manifest does not declare, is reported as an
//! unsupported format.
//!
//! # See Also
//!
//! - [`crate::config::AppManifest`]
//! - [`crate::installer::InstallerHandle`]

use crate::{
    config::{AppManifest, ConfigError, Settings},
    identity::Platform,
    installer::{
        process::{ProcessOutput, Runner},
        Action, DispatchError, InstallerError, InstallerHandle,
    },
    metadata::InstallerMetadata,
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    io,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, info, instrument};

/// Install format of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Standalone,
    System,
    Source,
}

impl Display for Format {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::Standalone => "standalone",
            Self::System => "system",
            Self::Source => "source",
        })
    }
}

impl FromStr for Format {
    type Err = AppError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        match data {
            "standalone" => Ok(Self::Standalone),
            "system" => Ok(Self::System),
            "source" => Ok(Self::Source),
            _ => Err(AppError::UnknownFormat(data.to_string())),
        }
    }
}

/// Application loaded from its manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    manifest: AppManifest,
}

impl Application {
    /// Construct new application from manifest.
    pub fn new(manifest: AppManifest) -> Self {
        Self { manifest }
    }

    /// Load application from manifest file.
    ///
    /// # Errors
    ///
    /// - Return [`AppError::Read`] if manifest file cannot be read.
    /// - Return [`AppError::Config`] if manifest is malformed.
    #[instrument(skip(path), level = "debug")]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("load manifest {path:?}");
        let data = fs::read_to_string(path).map_err(|source| AppError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self::new(data.parse()?))
    }

    pub fn name(&self) -> &str {
        &self.manifest.application.name
    }

    pub fn description(&self) -> &str {
        &self.manifest.application.description
    }

    /// Install formats declared by manifest.
    pub fn formats(&self) -> Vec<Format> {
        [
            (Format::Standalone, self.manifest.standalone.is_some()),
            (Format::System, self.manifest.system.is_some()),
            (Format::Source, self.manifest.source.is_some()),
        ]
        .into_iter()
        .filter_map(|(format, declared)| declared.then_some(format))
        .collect()
    }

    /// Resolve system metadata for platform.
    ///
    /// # Errors
    ///
    /// - Return [`AppError::UnsupportedFormat`] if manifest has no system
    ///   section.
    pub fn system_metadata(&self, platform: &Platform) -> Result<InstallerMetadata> {
        let system = self
            .manifest
            .system
            .as_ref()
            .ok_or_else(|| self.unsupported(Format::System))?;

        Ok(InstallerMetadata::resolve(platform, &system.declarations()))
    }

    /// Bind installer for format.
    ///
    /// Nothing is executed yet.
    ///
    /// # Errors
    ///
    /// - Return [`AppError::UnsupportedFormat`] if format cannot be
    ///   dispatched for this application.
    /// - Return [`AppError::Dispatch`] if no package manager can be selected.
    #[instrument(skip(self, platform, runner), fields(app = self.name()), level = "debug")]
    pub fn bind<R>(&self, format: Format, platform: &Platform, runner: R) -> Result<InstallerHandle<R>>
    where
        R: Runner,
    {
        match format {
            Format::System => {
                let metadata = self.system_metadata(platform)?;
                Ok(InstallerHandle::bind(metadata, platform, runner)?)
            }
            Format::Standalone | Format::Source => Err(self.unsupported(format)),
        }
    }

    /// Take action on application through format.
    ///
    /// # Errors
    ///
    /// - Return [`AppError::UnsupportedFormat`] if format cannot be
    ///   dispatched for this application.
    /// - Return [`AppError::Dispatch`] if no package manager can be selected.
    /// - Return [`AppError::Installer`] if package manager fails.
    pub async fn exec<R>(
        &self,
        format: Format,
        action: Action,
        platform: &Platform,
        runner: R,
        options: &ExecOptions,
    ) -> Result<ProcessOutput>
    where
        R: Runner,
    {
        let mut handle = self.bind(format, platform, runner)?;
        if let Some(program) = &options.escalate {
            handle = handle.escalate_with(program);
        }
        if options.assume_yes {
            handle = handle.assume_yes();
        }

        info!("{action} {} through {}", self.name(), handle.installer_name());
        Ok(handle.exec(action).await?)
    }

    fn unsupported(&self, format: Format) -> AppError {
        AppError::UnsupportedFormat {
            app: self.name().to_string(),
            format,
        }
    }
}

/// Options for taking action on an application.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExecOptions {
    /// Program to escalate privileges with, e.g., "sudo".
    pub escalate: Option<String>,

    /// Answer confirmation prompts of the package manager with yes.
    pub assume_yes: bool,
}

impl ExecOptions {
    /// Derive options from user settings.
    ///
    /// Captured output hides confirmation prompts, so capturing always
    /// answers them with yes.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            escalate: settings.escalate.clone(),
            assume_yes: settings.assume_yes || settings.capture_output,
        }
    }
}

/// Load user settings.
///
/// A missing settings file is not an error, the defaults are used instead.
///
/// # Errors
///
/// - Return [`AppError::Read`] if settings file exists but cannot be read.
/// - Return [`AppError::Config`] if settings are malformed.
pub fn load_settings(path: impl AsRef<Path>) -> Result<Settings> {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(data) => Ok(data.parse()?),
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            debug!("no settings at {path:?}, using defaults");
            Ok(Settings::default())
        }
        Err(source) => Err(AppError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// All possible error types for application management.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Format cannot be dispatched for application.
    #[error("{app} cannot be handled through {format} format")]
    UnsupportedFormat { app: String, format: Format },

    /// Format name is not known.
    #[error("unknown format {0:?}, expected standalone, system, or source")]
    UnknownFormat(String),

    /// Configuration file cannot be read.
    #[error("failed to read {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Configuration file is malformed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No installer can be selected.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Installer failed.
    #[error(transparent)]
    Installer(#[from] InstallerError),
}

/// Friendly result alias :3
type Result<T, E = AppError> = std::result::Result<T, E>;
