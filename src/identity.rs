// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! OS identity resolution.
//!
//! Strapon decides which package names, repositories, and package manager to
//! use for an application based on the __identity__ of the running operating
//! system. The identity is the set of fields that the os-release format
//! exposes: name, version, version id, codenames, and most importantly the
//! __id chain__.
//!
//! # Id Chain
//!
//! Every distribution has an `ID`, and most derivative distributions list the
//! distributions they are based on in `ID_LIKE`, closest ancestor first. The
//! id chain is simply `ID` followed by `ID_LIKE`. Ubuntu for example yields
//! `["ubuntu", "debian"]`, and Pop!_OS yields `["pop", "ubuntu", "debian"]`.
//! The position of an id in this chain is how strapon figures out which of
//! several declarations is the most specific for the running machine.
//!
//! # Sources
//!
//! Identity fields are first read out of the process environment, because
//! the shell may have already sourced the release-info file for us. If any of
//! the fields are missing, then the release-info file is parsed directly.
//!
//! # See Also
//!
//! - [os-release](https://www.freedesktop.org/software/systemd/man/latest/os-release.html)

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Environment variables that make up a complete identity.
pub const IDENTITY_VARS: [&str; 7] = [
    "NAME",
    "VERSION",
    "VERSION_ID",
    "VERSION_CODENAME",
    "ID",
    "ID_LIKE",
    "UBUNTU_CODENAME",
];

/// Identity of the running operating system.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OsIdentity {
    /// Human readable name, e.g., "Ubuntu".
    pub name: Option<String>,

    /// Human readable version, e.g., "22.04.3 LTS (Jammy Jellyfish)".
    pub version: Option<String>,

    /// Machine readable version, e.g., "22.04".
    pub version_id: Option<String>,

    /// Release codename, e.g., "jammy".
    pub version_codename: Option<String>,

    /// Machine readable distribution id, e.g., "ubuntu".
    pub id: String,

    /// Ancestor distribution ids, closest ancestor first.
    pub id_like: Vec<String>,

    /// Ubuntu release codename that derivatives expose, e.g., "jammy".
    pub ubuntu_codename: Option<String>,
}

impl OsIdentity {
    /// Construct new identity from distribution id and its ancestors.
    pub fn new(
        id: impl Into<String>,
        id_like: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            id: id.into(),
            id_like: id_like.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Resolve identity of running system.
    ///
    /// Tries the process environment first, then falls back to parsing the
    /// release-info file at `release_path`.
    ///
    /// # Errors
    ///
    /// - Return [`IdentityError`] if the release-info file cannot be read,
    ///   contains malformed quoting, or lacks an `ID` field.
    #[instrument(skip(release_path), level = "debug")]
    pub fn resolve(release_path: impl AsRef<Path>) -> Result<Self> {
        if let Some(identity) = Self::from_env() {
            debug!("identity resolved from environment: {identity}");
            return Ok(identity);
        }

        let identity = Self::from_release_file(release_path)?;
        debug!("identity resolved from release file: {identity}");
        Ok(identity)
    }

    /// Read identity from process environment.
    ///
    /// Returns `None` unless all of [`IDENTITY_VARS`] are set and `ID` is not
    /// empty.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read identity from arbitrary key lookup.
    ///
    /// Returns `None` unless all of [`IDENTITY_VARS`] can be looked up, and
    /// `ID` is not empty.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let identity = Self {
            name: Some(lookup("NAME")?),
            version: Some(lookup("VERSION")?),
            version_id: Some(lookup("VERSION_ID")?),
            version_codename: Some(lookup("VERSION_CODENAME")?),
            id: lookup("ID")?,
            id_like: split_id_like(&lookup("ID_LIKE")?),
            ubuntu_codename: Some(lookup("UBUNTU_CODENAME")?),
        };

        (!identity.id.is_empty()).then_some(identity)
    }

    /// Read identity from release-info file.
    ///
    /// # Errors
    ///
    /// - Return [`IdentityError::Read`] if file cannot be read.
    /// - Return [`IdentityError`] variants from [`OsIdentity::parse_release`].
    pub fn from_release_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = read_to_string(path.as_ref()).map_err(|source| IdentityError::Read {
            path: path.as_ref().to_path_buf(),
            source,
        })?;

        Self::parse_release(&content)
    }

    /// Parse release-info file content.
    ///
    /// Each line is a `KEY=VALUE` assignment where the value follows POSIX
    /// shell quoting rules. Blank lines and comments are skipped. Lines that
    /// are not assignments are skipped with a warning.
    ///
    /// # Errors
    ///
    /// - Return [`IdentityError::Unescape`] if a value has broken quoting.
    /// - Return [`IdentityError::MissingId`] if no usable `ID` was found.
    pub fn parse_release(content: &str) -> Result<Self> {
        let mut identity = Self::default();

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, raw)) = line.split_once('=') else {
                warn!("skip malformed release line {}: {line:?}", index + 1);
                continue;
            };

            let value = shell_words::split(raw)
                .map_err(|source| IdentityError::Unescape {
                    line: index + 1,
                    source,
                })?
                .into_iter()
                .next()
                .unwrap_or_default();

            match key.trim() {
                "NAME" => identity.name = Some(value),
                "VERSION" => identity.version = Some(value),
                "VERSION_ID" => identity.version_id = Some(value),
                "VERSION_CODENAME" => identity.version_codename = Some(value),
                "ID" => identity.id = value,
                "ID_LIKE" => identity.id_like = split_id_like(&value),
                "UBUNTU_CODENAME" => identity.ubuntu_codename = Some(value),
                _ => continue,
            }
        }

        if identity.id.is_empty() {
            return Err(IdentityError::MissingId);
        }

        Ok(identity)
    }

    /// Iterate through id chain, i.e., `ID` followed by `ID_LIKE`.
    pub fn id_chain(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.id.as_str()).chain(self.id_like.iter().map(String::as_str))
    }

    /// Position of target id in id chain.
    ///
    /// Lower is closer to the running system. Returns `None` if target is
    /// not part of the chain at all.
    pub fn chain_index(&self, target: impl AsRef<str>) -> Option<usize> {
        self.id_chain().position(|id| id == target.as_ref())
    }
}

impl Display for OsIdentity {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.name.as_deref().unwrap_or(&self.id))?;
        if let Some(version) = &self.version_id {
            write!(fmt, " {version}")?;
        }

        write!(fmt, " [{}]", self.id_chain().collect::<Vec<_>>().join(" -> "))
    }
}

/// Identity of the running machine.
///
/// Pairs OS identity with processor architecture. Computed once at startup,
/// and passed along to anything that needs to make targeting decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: OsIdentity,
    pub cpu: String,
}

impl Platform {
    /// Construct new platform from OS identity and CPU architecture.
    pub fn new(os: OsIdentity, cpu: impl Into<String>) -> Self {
        Self {
            os,
            cpu: cpu.into(),
        }
    }

    /// Detect platform of running machine.
    ///
    /// # Errors
    ///
    /// - Return [`IdentityError`] if OS identity cannot be resolved.
    pub fn detect(release_path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(
            OsIdentity::resolve(release_path)?,
            std::env::consts::ARCH,
        ))
    }
}

fn split_id_like(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_owned).collect()
}

/// Cannot determine OS identity.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// Release-info file cannot be read.
    #[error("cannot read release-info file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Value in release-info file has broken shell quoting.
    #[error("cannot unescape release-info value at line {line}")]
    Unescape {
        line: usize,
        #[source]
        source: shell_words::ParseError,
    },

    /// Neither environment nor release-info file provide distribution id.
    #[error("cannot determine OS identity: no ID field found")]
    MissingId,
}

/// Friendly result alias :3
pub type Result<T, E = IdentityError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::collections::HashMap;

    const UBUNTU: &str = indoc! {r#"
        PRETTY_NAME="Ubuntu 22.04.3 LTS"
        NAME="Ubuntu"
        VERSION_ID="22.04"
        VERSION="22.04.3 LTS (Jammy Jellyfish)"
        VERSION_CODENAME=jammy
        ID=ubuntu
        ID_LIKE=debian
        HOME_URL="https://www.ubuntu.com/"
        UBUNTU_CODENAME=jammy
    "#};

    #[test]
    fn parse_release_ubuntu() -> anyhow::Result<()> {
        let result = OsIdentity::parse_release(UBUNTU)?;
        let expect = OsIdentity {
            name: Some("Ubuntu".into()),
            version: Some("22.04.3 LTS (Jammy Jellyfish)".into()),
            version_id: Some("22.04".into()),
            version_codename: Some("jammy".into()),
            id: "ubuntu".into(),
            id_like: vec!["debian".into()],
            ubuntu_codename: Some("jammy".into()),
        };
        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn parse_release_shell_quoting() -> anyhow::Result<()> {
        let content = indoc! {r#"
            # comment line

            NAME='Pop!_OS'
            VERSION="22.04 \"LTS\""
            ID=pop
            ID_LIKE="ubuntu debian"
            VERSION_CODENAME=
            garbage line
        "#};
        let result = OsIdentity::parse_release(content)?;
        assert_eq!(result.name.as_deref(), Some("Pop!_OS"));
        assert_eq!(result.version.as_deref(), Some("22.04 \"LTS\""));
        assert_eq!(result.version_codename.as_deref(), Some(""));
        assert_eq!(result.id_chain().collect::<Vec<_>>(), ["pop", "ubuntu", "debian"]);

        Ok(())
    }

    #[test]
    fn parse_release_broken_quoting() {
        let result = OsIdentity::parse_release("ID=\"ubuntu\nNAME=x");
        assert!(matches!(result, Err(IdentityError::Unescape { line: 1, .. })));
    }

    #[test]
    fn parse_release_without_id() {
        let content = indoc! {r#"
            NAME="Mystery"
            VERSION_ID=1
        "#};
        assert!(matches!(
            OsIdentity::parse_release(content),
            Err(IdentityError::MissingId)
        ));
        assert!(matches!(
            OsIdentity::parse_release("ID=\"\""),
            Err(IdentityError::MissingId)
        ));
    }

    #[test]
    fn lookup_requires_every_field() {
        let mut env = HashMap::from([
            ("NAME", "Debian GNU/Linux"),
            ("VERSION", "12 (bookworm)"),
            ("VERSION_ID", "12"),
            ("VERSION_CODENAME", "bookworm"),
            ("ID", "debian"),
            ("ID_LIKE", ""),
            ("UBUNTU_CODENAME", ""),
        ]);

        let result = OsIdentity::from_lookup(|key| env.get(key).map(|value| value.to_string()));
        assert_eq!(result.map(|identity| identity.id), Some("debian".to_string()));

        env.remove("UBUNTU_CODENAME");
        let result = OsIdentity::from_lookup(|key| env.get(key).map(|value| value.to_string()));
        assert_eq!(result, None);
    }

    #[test]
    fn id_chain_index() {
        let identity = OsIdentity::new("pop", ["ubuntu", "debian"]);
        assert_eq!(identity.chain_index("pop"), Some(0));
        assert_eq!(identity.chain_index("debian"), Some(2));
        assert_eq!(identity.chain_index("arch"), None);
    }

    #[sealed_test(env = [
        ("NAME", "Linux Mint"),
        ("VERSION", "21.2 (Victoria)"),
        ("VERSION_ID", "21.2"),
        ("VERSION_CODENAME", "victoria"),
        ("ID", "linuxmint"),
        ("ID_LIKE", "ubuntu debian"),
        ("UBUNTU_CODENAME", "jammy"),
    ])]
    fn resolve_prefers_environment() -> anyhow::Result<()> {
        let identity = OsIdentity::resolve("does-not-exist")?;
        assert_eq!(identity.id, "linuxmint");
        assert_eq!(identity.id_like, vec!["ubuntu".to_string(), "debian".to_string()]);

        Ok(())
    }

    #[sealed_test(env = [("ID", "ubuntu")])]
    fn resolve_partial_environment_reads_file() -> anyhow::Result<()> {
        std::fs::write("os-release", "ID=arch\nNAME=\"Arch Linux\"\n")?;
        let identity = OsIdentity::resolve("os-release")?;
        assert_eq!(identity.id, "arch");
        assert_eq!(identity.version_id, None);

        Ok(())
    }
}
