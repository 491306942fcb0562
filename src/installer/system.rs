// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! System package manager backends.
//!
//! Every backend maps the four installer actions onto the subcommands of a
//! native package manager. Only package managers listed in [`BACKENDS`] are
//! known to strapon. Repository registration is only possible where the
//! distribution ships a helper for it, i.e., `add-apt-repository` on the
//! Ubuntu family.

use crate::{
    identity::Platform,
    installer::{command::CommandTemplate, DispatchError, Installer},
};

use tracing::debug;

/// Subcommands of a known package manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backend {
    pub name: &'static str,
    pub install: &'static [&'static str],
    pub remove: &'static [&'static str],
    pub purge: &'static [&'static str],
    pub index: &'static [&'static str],
    pub assume_yes: &'static str,
}

/// Package managers that strapon knows how to drive.
pub const BACKENDS: &[Backend] = &[
    Backend {
        name: "apt",
        install: &["install"],
        remove: &["remove"],
        purge: &["purge"],
        index: &["update"],
        assume_yes: "-y",
    },
    Backend {
        name: "apt-get",
        install: &["install"],
        remove: &["remove"],
        purge: &["purge"],
        index: &["update"],
        assume_yes: "-y",
    },
    Backend {
        name: "pacman",
        install: &["-S"],
        remove: &["-R"],
        purge: &["-Rns"],
        index: &["-Sy"],
        assume_yes: "--noconfirm",
    },
    Backend {
        name: "dnf",
        install: &["install"],
        remove: &["remove"],
        purge: &["remove"],
        index: &["makecache"],
        assume_yes: "-y",
    },
    Backend {
        name: "zypper",
        install: &["install"],
        remove: &["remove"],
        purge: &["remove", "--clean-deps"],
        index: &["refresh"],
        assume_yes: "--non-interactive",
    },
];

/// Default package manager of distribution ids.
const DEFAULTS: &[(&str, &str)] = &[
    ("debian", "apt"),
    ("ubuntu", "apt"),
    ("linuxmint", "apt"),
    ("mint", "apt"),
    ("galliumos", "apt"),
    ("pop", "apt"),
    ("raspbian", "apt"),
    ("arch", "pacman"),
    ("manjaro", "pacman"),
    ("endeavouros", "pacman"),
    ("instantos", "pacman"),
    ("fedora", "dnf"),
    ("rhel", "dnf"),
    ("centos", "dnf"),
    ("suse", "zypper"),
    ("opensuse", "zypper"),
    ("opensuse-leap", "zypper"),
    ("opensuse-tumbleweed", "zypper"),
];

/// Distribution ids that ship `add-apt-repository`.
const APT_REPOSITORY_HOSTS: &[&str] = &["ubuntu", "galliumos", "mint", "linuxmint", "pop"];

/// Native package manager of the running system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInstaller {
    backend: Backend,
    registrar: Option<CommandTemplate>,
}

impl SystemInstaller {
    /// Construct new system installer for named package manager.
    ///
    /// # Errors
    ///
    /// - Return [`DispatchError::UnknownInstaller`] if package manager is not
    ///   known to strapon.
    pub fn new(name: impl AsRef<str>, platform: &Platform) -> Result<Self, DispatchError> {
        let backend = BACKENDS
            .iter()
            .find(|backend| backend.name == name.as_ref())
            .copied()
            .ok_or_else(|| DispatchError::UnknownInstaller(name.as_ref().to_string()))?;

        let registrar = match backend.name {
            "apt" | "apt-get" if platform.matching_os(APT_REPOSITORY_HOSTS) => {
                Some(CommandTemplate::new("add-apt-repository").bake(["-y", "-n"]))
            }
            _ => None,
        };

        Ok(Self { backend, registrar })
    }

    /// Construct system installer for the default package manager of the
    /// running distribution.
    ///
    /// Walks the id chain from most to least specific, and picks the first
    /// distribution id with a known package manager.
    ///
    /// # Errors
    ///
    /// - Return [`DispatchError::NoDefaultInstaller`] if no distribution id in
    ///   the id chain has a known package manager.
    pub fn default_for(platform: &Platform) -> Result<Self, DispatchError> {
        let name = default_installer_name(platform)
            .ok_or_else(|| DispatchError::NoDefaultInstaller(platform.os.to_string()))?;
        debug!("default package manager for {} is {name}", platform.os);

        Self::new(name, platform)
    }

    fn template(&self, args: &[&str]) -> CommandTemplate {
        CommandTemplate::new(self.backend.name).bake(args.iter().copied())
    }
}

impl Installer for SystemInstaller {
    fn name(&self) -> &str {
        self.backend.name
    }

    fn install(&self) -> CommandTemplate {
        self.template(self.backend.install)
    }

    fn remove(&self) -> CommandTemplate {
        self.template(self.backend.remove)
    }

    fn purge(&self) -> CommandTemplate {
        self.template(self.backend.purge)
    }

    fn index(&self) -> CommandTemplate {
        self.template(self.backend.index)
    }

    fn repository_registrar(&self) -> Option<CommandTemplate> {
        self.registrar.clone()
    }

    fn assume_yes(&self) -> Option<&str> {
        Some(self.backend.assume_yes)
    }
}

/// Name of default package manager for platform.
pub fn default_installer_name(platform: &Platform) -> Option<&'static str> {
    platform.os.id_chain().find_map(|id| {
        DEFAULTS
            .iter()
            .find(|(distro, _)| *distro == id)
            .map(|(_, installer)| *installer)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::OsIdentity;
    use simple_test_case::test_case;

    fn platform(id: &str, id_like: &[&str]) -> Platform {
        Platform::new(OsIdentity::new(id, id_like.iter().copied()), "x86_64")
    }

    #[test_case("ubuntu", &["debian"], Some("apt"); "ubuntu")]
    #[test_case("neon", &["ubuntu", "debian"], Some("apt"); "unknown ubuntu derivative")]
    #[test_case("garuda", &["arch"], Some("pacman"); "arch derivative")]
    #[test_case("rocky", &["rhel", "centos", "fedora"], Some("dnf"); "rhel derivative")]
    #[test_case("opensuse-tumbleweed", &["opensuse", "suse"], Some("zypper"); "tumbleweed")]
    #[test_case("gentoo", &[], None; "unsupported")]
    #[test]
    fn default_installer_by_id_chain(id: &str, id_like: &[&str], expect: Option<&str>) {
        pretty_assertions::assert_eq!(default_installer_name(&platform(id, id_like)), expect);
    }

    #[test]
    fn apt_commands() -> anyhow::Result<()> {
        let installer = SystemInstaller::new("apt", &platform("debian", &[]))?;
        pretty_assertions::assert_eq!(installer.name(), "apt");
        pretty_assertions::assert_eq!(installer.install().to_argv(), vec!["apt", "install"]);
        pretty_assertions::assert_eq!(installer.remove().to_argv(), vec!["apt", "remove"]);
        pretty_assertions::assert_eq!(installer.purge().to_argv(), vec!["apt", "purge"]);
        pretty_assertions::assert_eq!(installer.index().to_argv(), vec!["apt", "update"]);

        Ok(())
    }

    #[test]
    fn apt_registrar_only_on_ubuntu_family() -> anyhow::Result<()> {
        let debian = SystemInstaller::new("apt", &platform("debian", &[]))?;
        pretty_assertions::assert_eq!(debian.repository_registrar(), None);

        let mint = SystemInstaller::new("apt-get", &platform("linuxmint", &["ubuntu", "debian"]))?;
        let registrar = mint.repository_registrar().map(|registrar| registrar.to_argv());
        pretty_assertions::assert_eq!(
            registrar,
            Some(vec![
                "add-apt-repository".to_string(),
                "-y".to_string(),
                "-n".to_string()
            ])
        );

        Ok(())
    }

    #[test]
    fn every_backend_can_skip_prompts() -> anyhow::Result<()> {
        let platform = platform("debian", &[]);
        for backend in BACKENDS {
            let installer = SystemInstaller::new(backend.name, &platform)?;
            assert!(installer.assume_yes().is_some_and(|flag| flag.starts_with('-')));
        }

        Ok(())
    }

    #[test]
    fn unknown_installer() {
        let result = SystemInstaller::new("brew", &platform("ubuntu", &["debian"]));
        assert!(matches!(result, Err(DispatchError::UnknownInstaller(name)) if name == "brew"));
    }

    #[test]
    fn no_default_installer() {
        let result = SystemInstaller::default_for(&platform("gentoo", &[]));
        assert!(matches!(result, Err(DispatchError::NoDefaultInstaller(_))));
    }
}
