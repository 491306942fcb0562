// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Installer metadata resolution.
//!
//! Every install handler of an application is described by a sequence of
//! __declarations__. A declaration pairs a __tag__, e.g., "stage this package"
//! or "use this package manager", with a [`TargetSpec`] that restricts which
//! platforms the tag applies to. Declarations are merged in order into one
//! [`InstallerMetadata`] record that the installer dispatcher consumes.
//!
//! # Merge Rules
//!
//! - Tags whose target does not match the running platform are dropped.
//! - List tags (packages, repositories) append in declaration order, skipping
//!   values that are already present.
//! - Scalar tags (installer, index before action) overwrite.
//!
//! # Fallback Chains
//!
//! Distributions do not always agree on package names. A fallback package is
//! bound to one or more distribution ids, and of all matching fallback
//! packages only the one whose id sits closest to the running distribution in
//! the id chain is kept. Say a handler declares "pkgA" for ubuntu and "pkgB"
//! for debian. Ubuntu installs "pkgA", while Debian and Raspbian install
//! "pkgB".

use crate::{identity::Platform, target::TargetSpec};

use tracing::{debug, instrument};

/// Single piece of installer metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    /// Package to install, remove, or purge.
    Package(String),

    /// Package that competes with other fallback packages by OS closeness.
    FallbackPackage(String),

    /// Package repository to register before indexing.
    Repository(String),

    /// Name of package manager to use.
    Installer(String),

    /// Whether to index package repositories before acting.
    IndexBeforeAction(bool),
}

/// Tag bound to the platforms it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub tag: Tag,
    pub target: TargetSpec,
}

impl Declaration {
    /// Construct new declaration that applies to any platform.
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            target: TargetSpec::any(),
        }
    }

    /// Declare package to stage for installation.
    pub fn stage_package(name: impl Into<String>) -> Self {
        Self::new(Tag::Package(name.into()))
    }

    /// Declare fallback package for target distribution ids.
    pub fn fallback_package(
        os_name: impl IntoIterator<Item = impl Into<String>>,
        name: impl Into<String>,
    ) -> Self {
        Self::new(Tag::FallbackPackage(name.into())).when(TargetSpec::any().os_name(os_name))
    }

    /// Declare package repository to register.
    pub fn register_repository(name: impl Into<String>) -> Self {
        Self::new(Tag::Repository(name.into()))
    }

    /// Declare package manager to strap the handler onto.
    pub fn strap_on(installer: impl Into<String>) -> Self {
        Self::new(Tag::Installer(installer.into()))
    }

    /// Declare whether to index before acting.
    pub fn index_before_action(flag: bool) -> Self {
        Self::new(Tag::IndexBeforeAction(flag))
    }

    /// Restrict declaration to target.
    ///
    /// Keeps any fallback distribution ids that were already bound if the
    /// new target does not name its own.
    pub fn when(mut self, target: TargetSpec) -> Self {
        let os_name = self.target.os_name.take();
        self.target = target;
        if self.target.os_name.is_none() {
            self.target.os_name = os_name;
        }

        self
    }
}

/// Resolved metadata of an install handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallerMetadata {
    /// Packages in declaration order.
    pub packages: Vec<String>,

    /// Repositories in declaration order.
    pub repositories: Vec<String>,

    /// Package manager name, `None` means use the platform default.
    pub installer: Option<String>,

    /// Index package repositories before install.
    pub index_before_action: bool,
}

impl Default for InstallerMetadata {
    fn default() -> Self {
        Self {
            packages: Vec::new(),
            repositories: Vec::new(),
            installer: None,
            index_before_action: true,
        }
    }
}

impl InstallerMetadata {
    /// Resolve declarations against platform in one go.
    pub fn resolve<'a>(
        platform: &Platform,
        declarations: impl IntoIterator<Item = &'a Declaration>,
    ) -> Self {
        let mut merger = MetadataMerger::new(platform);
        for declaration in declarations {
            merger.apply(declaration);
        }

        merger.finish()
    }
}

/// Fallback packages with the distribution ids they are bound to.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FallbackChain {
    entries: Vec<(Vec<String>, String)>,
}

impl FallbackChain {
    /// Construct new empty fallback chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append fallback package for target distribution ids.
    pub fn push(
        &mut self,
        os_name: impl IntoIterator<Item = impl Into<String>>,
        package: impl Into<String>,
    ) {
        self.entries.push((
            os_name.into_iter().map(Into::into).collect(),
            package.into(),
        ));
    }

    /// Pick package whose distribution id is closest in id chain.
    ///
    /// Earlier entries win ties. Entries with no id in the chain never win.
    pub fn resolve(&self, platform: &Platform) -> Option<&str> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(order, (os_name, package))| {
                platform
                    .closest_os(os_name.as_slice())
                    .map(|index| ((index, order), package.as_str()))
            })
            .min_by_key(|(rank, _)| *rank)
            .map(|(_, package)| package)
    }
}

/// Merge declarations into installer metadata.
///
/// Consumed by [`MetadataMerger::finish`] once all declarations of a handler
/// have been applied.
#[derive(Debug)]
pub struct MetadataMerger<'p> {
    platform: &'p Platform,
    metadata: InstallerMetadata,
    fallbacks: FallbackChain,
    fallback_slot: Option<usize>,
}

impl<'p> MetadataMerger<'p> {
    /// Construct new merger for target platform.
    pub fn new(platform: &'p Platform) -> Self {
        Self {
            platform,
            metadata: InstallerMetadata::default(),
            fallbacks: FallbackChain::new(),
            fallback_slot: None,
        }
    }

    /// Apply declaration if its target matches the platform.
    ///
    /// Returns true if the declaration was applied.
    #[instrument(skip(self), level = "debug")]
    pub fn apply(&mut self, declaration: &Declaration) -> bool {
        if !self.platform.matching_all(&declaration.target) {
            debug!("drop declaration, target does not match platform");
            return false;
        }

        match &declaration.tag {
            Tag::Package(name) => append_unique(&mut self.metadata.packages, name),
            Tag::Repository(name) => append_unique(&mut self.metadata.repositories, name),
            Tag::Installer(name) => self.metadata.installer = Some(name.clone()),
            Tag::IndexBeforeAction(flag) => self.metadata.index_before_action = *flag,
            Tag::FallbackPackage(name) => {
                let os_name = declaration.target.os_name.clone().unwrap_or_default();
                if os_name.is_empty() {
                    return false;
                }

                // INVARIANT: Winner takes the place of the first fallback declared.
                if self.fallback_slot.is_none() {
                    self.fallback_slot = Some(self.metadata.packages.len());
                }
                self.fallbacks.push(os_name, name.as_str());
            }
        }

        true
    }

    /// Finish merging, and place winning fallback package into package list.
    pub fn finish(self) -> InstallerMetadata {
        let mut metadata = self.metadata;
        let winner = self.fallbacks.resolve(self.platform);
        if let (Some(package), Some(slot)) = (winner, self.fallback_slot) {
            debug!("fallback {package:?} is closest match for {}", self.platform.os);
            if !metadata.packages.iter().any(|entry| entry == package) {
                metadata.packages.insert(slot, package.to_string());
            }
        }

        metadata
    }
}

fn append_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|entry| entry == value) {
        list.push(value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::OsIdentity;
    use pretty_assertions::assert_eq;

    fn platform(id: &str, id_like: &[&str]) -> Platform {
        Platform::new(OsIdentity::new(id, id_like.iter().copied()), "x86_64")
    }

    #[test]
    fn merge_preserves_declaration_order() {
        let platform = platform("ubuntu", &["debian"]);
        let result = InstallerMetadata::resolve(
            &platform,
            &[
                Declaration::stage_package("a"),
                Declaration::register_repository("ppa:one/two"),
                Declaration::stage_package("b"),
            ],
        );
        assert_eq!(result.packages, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(result.repositories, vec!["ppa:one/two".to_string()]);
        assert_eq!(result.installer, None);
        assert!(result.index_before_action);
    }

    #[test]
    fn merge_is_idempotent() {
        let platform = platform("ubuntu", &["debian"]);
        let declarations = [
            Declaration::stage_package("profanity"),
            Declaration::register_repository("ppa:profanity/stable"),
            Declaration::strap_on("apt"),
            Declaration::fallback_package(["debian"], "profanity-deb"),
        ];

        let once = InstallerMetadata::resolve(&platform, &declarations);
        let twice = InstallerMetadata::resolve(
            &platform,
            declarations.iter().flat_map(|declaration| [declaration, declaration]),
        );
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_drops_unmatched_targets() {
        let platform = platform("arch", &[]);
        let mut merger = MetadataMerger::new(&platform);
        assert!(!merger.apply(
            &Declaration::stage_package("apt-only").when(TargetSpec::any().os_name(["debian"]))
        ));
        assert!(merger.apply(&Declaration::stage_package("everywhere")));
        assert!(!merger.apply(
            &Declaration::stage_package("arm-only").when(TargetSpec::any().cpu(["aarch64"]))
        ));
        assert_eq!(merger.finish().packages, vec!["everywhere".to_string()]);
    }

    #[test]
    fn merge_scalar_tags_overwrite() {
        let platform = platform("debian", &[]);
        let result = InstallerMetadata::resolve(
            &platform,
            &[
                Declaration::strap_on("apt"),
                Declaration::index_before_action(false),
                Declaration::strap_on("apt-get"),
            ],
        );
        assert_eq!(result.installer.as_deref(), Some("apt-get"));
        assert!(!result.index_before_action);
    }

    #[test]
    fn fallback_closest_ancestor_wins() {
        let declarations = [
            Declaration::fallback_package(["ubuntu"], "pkgA"),
            Declaration::fallback_package(["debian"], "pkgB"),
        ];

        let raspbian = platform("raspbian", &["debian"]);
        let result = InstallerMetadata::resolve(&raspbian, &declarations);
        assert_eq!(result.packages, vec!["pkgB".to_string()]);

        let ubuntu = platform("ubuntu", &["debian"]);
        let result = InstallerMetadata::resolve(&ubuntu, &declarations);
        assert_eq!(result.packages, vec!["pkgA".to_string()]);

        // Declaration order does not matter for precedence.
        let result = InstallerMetadata::resolve(&ubuntu, declarations.iter().rev());
        assert_eq!(result.packages, vec!["pkgA".to_string()]);

        let fedora = platform("fedora", &[]);
        let result = InstallerMetadata::resolve(&fedora, &declarations);
        assert!(result.packages.is_empty());
    }

    #[test]
    fn fallback_keeps_first_declaration_slot() {
        let platform = platform("pop", &["ubuntu", "debian"]);
        let result = InstallerMetadata::resolve(
            &platform,
            &[
                Declaration::stage_package("first"),
                Declaration::fallback_package(["debian"], "lib-debian"),
                Declaration::stage_package("last"),
                Declaration::fallback_package(["pop"], "lib-pop"),
            ],
        );
        assert_eq!(
            result.packages,
            vec!["first".to_string(), "lib-pop".to_string(), "last".to_string()]
        );
    }

    #[test]
    fn fallback_chain_resolution() {
        let mut chain = FallbackChain::new();
        chain.push(["ubuntu"], "pkgA");
        chain.push(["debian"], "pkgB");
        chain.push(["linuxmint", "debian"], "pkgC");

        assert_eq!(chain.resolve(&platform("raspbian", &["debian"])), Some("pkgB"));
        assert_eq!(chain.resolve(&platform("ubuntu", &["debian"])), Some("pkgA"));
        assert_eq!(
            chain.resolve(&platform("linuxmint", &["ubuntu", "debian"])),
            Some("pkgC")
        );
        assert_eq!(chain.resolve(&platform("arch", &[])), None);
    }
}
