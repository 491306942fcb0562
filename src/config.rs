// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout for configuration files that strapon uses to simplify
//! the process of serialization and deserialization. File I/O is left to the
//! caller to figure out.

use crate::{
    metadata::{Declaration, Tag},
    target::TargetSpec,
};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

/// Default number of seconds to wait on an external process.
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Application manifest layout.
///
/// Every application that strapon can manage comes with a __manifest__. The
/// manifest describes the application, and lists the install formats it
/// supports along with the metadata of each format.
///
/// # General Layout
///
/// A manifest is composed of an application section and one section per
/// install format. Only the system format carries metadata for now. The
/// standalone and source sections merely mark the application as providing
/// those formats.
///
/// ```toml
/// [application]
/// name = "profanity"
/// description = "console based XMPP client"
///
/// [system]
/// index_before_action = true
///
/// [[system.installer]]
/// name = "pacman"
/// os_name = "arch"
///
/// [[system.package]]
/// name = "profanity"
///
/// [[system.repository]]
/// name = "ppa:profanity/stable"
/// os_name = "ubuntu"
/// ```
///
/// Target fields, i.e., `os_name`, `os_version`, and `cpu`, can be attached
/// to any installer, package, or repository entry.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct AppManifest {
    /// General information about the application.
    pub application: ApplicationSection,

    /// Metadata for native package managers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemSection>,

    /// Marker for standalone install format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standalone: Option<FormatSection>,

    /// Marker for install from source format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<FormatSection>,
}

impl FromStr for AppManifest {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let manifest: AppManifest = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Fallback packages must name the distributions they compete over.
        if let Some(system) = &manifest.system {
            for package in system.packages.iter().filter(|package| package.fallback) {
                if package.target.os_name.as_ref().is_none_or(Vec::is_empty) {
                    return Err(ConfigError::FallbackWithoutOsName(package.name.clone()));
                }
            }
        }

        Ok(manifest)
    }
}

impl Display for AppManifest {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// General application information.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ApplicationSection {
    /// Name of the application.
    pub name: String,

    /// Brief description of what the application is.
    #[serde(default)]
    pub description: String,
}

/// Metadata of the system install format.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct SystemSection {
    /// Package managers to strap onto, last match wins.
    #[serde(default, rename = "installer", skip_serializing_if = "Vec::is_empty")]
    pub installers: Vec<InstallerEntry>,

    /// Index package sources before installing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_before_action: Option<bool>,

    /// Package repositories to register before indexing.
    #[serde(default, rename = "repository", skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<RepositoryEntry>,

    /// Packages to install, remove, or purge.
    #[serde(default, rename = "package", skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<PackageEntry>,
}

impl SystemSection {
    /// Convert section into declarations for metadata merging.
    ///
    /// Installer choice and index flag come first, then repositories, then
    /// packages, each in the order they were written.
    pub fn declarations(&self) -> Vec<Declaration> {
        let installers = self
            .installers
            .iter()
            .map(|entry| Declaration::strap_on(&entry.name).when(entry.target.clone()));
        let index = self
            .index_before_action
            .map(Declaration::index_before_action);
        let repositories = self
            .repositories
            .iter()
            .map(|entry| Declaration::register_repository(&entry.name).when(entry.target.clone()));
        let packages = self.packages.iter().map(|entry| {
            let tag = if entry.fallback {
                Tag::FallbackPackage(entry.name.clone())
            } else {
                Tag::Package(entry.name.clone())
            };
            Declaration::new(tag).when(entry.target.clone())
        });

        installers
            .chain(index)
            .chain(repositories)
            .chain(packages)
            .collect()
    }
}

/// Conditional package manager choice.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct InstallerEntry {
    /// Name of package manager, or "default".
    pub name: String,

    #[serde(flatten)]
    pub target: TargetSpec,
}

/// Conditional package entry.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct PackageEntry {
    /// Name of package.
    pub name: String,

    /// Compete with other fallback packages by distribution closeness.
    #[serde(default, skip_serializing_if = "is_false")]
    pub fallback: bool,

    #[serde(flatten)]
    pub target: TargetSpec,
}

/// Conditional repository entry.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct RepositoryEntry {
    /// Repository identifier passed to the registrar, e.g., a PPA.
    pub name: String,

    #[serde(flatten)]
    pub target: TargetSpec,
}

/// Install format without metadata of its own.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct FormatSection {}

fn is_false(flag: &bool) -> bool {
    !flag
}

/// User settings layout.
///
/// Every field is optional. Command-line flags take precedence over
/// whatever is set here.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Seconds to wait on external processes, zero waits forever.
    pub timeout_secs: u64,

    /// Capture output of external processes instead of inheriting it.
    ///
    /// Implies `assume_yes`, since prompts would be hidden.
    pub capture_output: bool,

    /// Answer confirmation prompts of the package manager with yes.
    pub assume_yes: bool,

    /// Alternative OS release-info file to read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_release: Option<PathBuf>,

    /// Program to escalate privileges with, e.g., "sudo".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalate: Option<String>,

    /// Directory to look up application manifests in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            capture_output: false,
            assume_yes: false,
            os_release: None,
            escalate: None,
            manifest_dir: None,
        }
    }
}

impl Settings {
    /// Process timeout, `None` if disabled.
    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on all path fields.
        settings.os_release = settings.os_release.as_deref().map(expand).transpose()?;
        settings.manifest_dir = settings.manifest_dir.as_deref().map(expand).transpose()?;

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

fn expand(path: &Path) -> Result<PathBuf> {
    shellexpand::full(path.to_string_lossy().as_ref())
        .map(|path| PathBuf::from(path.into_owned()))
        .map_err(ConfigError::ShellExpansion)
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Fallback package does not name any distribution.
    #[error("fallback package {0:?} must set os_name")]
    FallbackWithoutOsName(String),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::VersionSpec;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[test]
    fn deserialize_app_manifest() -> anyhow::Result<()> {
        let result: AppManifest = r#"
            [application]
            name = "profanity"
            description = "console based XMPP client"

            [system]
            index_before_action = false

            [[system.installer]]
            name = "pacman"
            os_name = ["arch", "manjaro"]

            [[system.repository]]
            name = "ppa:profanity/stable"
            os_name = "ubuntu"
            os_version = ">=20.04"

            [[system.package]]
            name = "profanity"

            [[system.package]]
            name = "profanity-git"
            fallback = true
            os_name = "arch"
            cpu = "x86_64"

            [source]
        "#
        .parse()?;

        let expect = AppManifest {
            application: ApplicationSection {
                name: "profanity".into(),
                description: "console based XMPP client".into(),
            },
            system: Some(SystemSection {
                installers: vec![InstallerEntry {
                    name: "pacman".into(),
                    target: TargetSpec::any().os_name(["arch", "manjaro"]),
                }],
                index_before_action: Some(false),
                repositories: vec![RepositoryEntry {
                    name: "ppa:profanity/stable".into(),
                    target: TargetSpec::any()
                        .os_name(["ubuntu"])
                        .os_version(">=20.04".parse::<VersionSpec>()?),
                }],
                packages: vec![
                    PackageEntry {
                        name: "profanity".into(),
                        fallback: false,
                        target: TargetSpec::any(),
                    },
                    PackageEntry {
                        name: "profanity-git".into(),
                        fallback: true,
                        target: TargetSpec::any().os_name(["arch"]).cpu(["x86_64"]),
                    },
                ],
            }),
            standalone: None,
            source: Some(FormatSection {}),
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn serialize_app_manifest() {
        let result = AppManifest {
            application: ApplicationSection {
                name: "profanity".into(),
                description: "console based XMPP client".into(),
            },
            system: Some(SystemSection {
                installers: Vec::new(),
                index_before_action: Some(true),
                repositories: Vec::new(),
                packages: vec![PackageEntry {
                    name: "profanity".into(),
                    fallback: false,
                    target: TargetSpec::any().os_name(["debian", "ubuntu"]),
                }],
            }),
            standalone: None,
            source: None,
        }
        .to_string();

        let expect = indoc! {r#"
            [application]
            name = "profanity"
            description = "console based XMPP client"

            [system]
            index_before_action = true

            [[system.package]]
            name = "profanity"
            os_name = [
                "debian",
                "ubuntu",
            ]
        "#};

        assert_eq!(result, expect);
    }

    #[test]
    fn reject_fallback_without_os_name() {
        let result = indoc! {r#"
            [application]
            name = "broken"

            [[system.package]]
            name = "orphan"
            fallback = true
        "#}
        .parse::<AppManifest>();

        assert!(matches!(result, Err(ConfigError::FallbackWithoutOsName(name)) if name == "orphan"));
    }

    #[test]
    fn system_section_declaration_order() -> anyhow::Result<()> {
        let manifest: AppManifest = indoc! {r#"
            [application]
            name = "profanity"

            [system]
            index_before_action = false

            [[system.package]]
            name = "profanity"

            [[system.package]]
            name = "profanity-git"
            fallback = true
            os_name = "arch"

            [[system.repository]]
            name = "ppa:profanity/stable"

            [[system.installer]]
            name = "apt-get"
        "#}
        .parse()?;

        let result = manifest.system.unwrap_or_default().declarations();
        let expect = vec![
            Declaration::strap_on("apt-get"),
            Declaration::index_before_action(false),
            Declaration::register_repository("ppa:profanity/stable"),
            Declaration::stage_package("profanity"),
            Declaration::fallback_package(["arch"], "profanity-git"),
        ];
        assert_eq!(result, expect);

        Ok(())
    }

    #[sealed_test(env = [("STRAPON_HOME", "/home/awkless")])]
    fn deserialize_settings() -> anyhow::Result<()> {
        let result: Settings = indoc! {r#"
            timeout_secs = 0
            capture_output = true
            escalate = "doas"
            os_release = "$STRAPON_HOME/os-release"
            manifest_dir = "${STRAPON_HOME}/apps"
        "#}
        .parse()?;

        let expect = Settings {
            timeout_secs: 0,
            capture_output: true,
            assume_yes: false,
            os_release: Some("/home/awkless/os-release".into()),
            escalate: Some("doas".into()),
            manifest_dir: Some("/home/awkless/apps".into()),
        };
        assert_eq!(result, expect);
        assert_eq!(result.timeout(), None);

        Ok(())
    }

    #[test]
    fn empty_settings_use_defaults() -> anyhow::Result<()> {
        let result: Settings = "".parse()?;
        assert_eq!(result, Settings::default());
        assert_eq!(result.timeout(), Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)));

        Ok(())
    }
}
