// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Installer dispatch.
//!
//! An __installer__ is anything that can install, remove, and purge the
//! packages of an application, and index its package sources beforehand.
//! The [`Installer`] trait models this capability. Currently only native
//! system package managers implement it through [`SystemInstaller`].
//!
//! # Dispatch
//!
//! The [`InstallerHandle`] binds resolved [`InstallerMetadata`] to one
//! installer. Binding selects the package manager named by the metadata, or
//! the default package manager of the running distribution, and bakes the
//! staged packages into its install, remove, and purge commands. Nothing is
//! executed at this point. Thus an unknown package manager is reported before
//! any external process is spawned.
//!
//! Executing an action walks through the following states:
//!
//! ```text
//! MetadataBound --> [Indexed] --> Executed
//! ```
//!
//! The indexed state is only visited when installing with indexing enabled.
//! Before indexing, any pending repositories are registered. A handle can be
//! reused for another action after execution.

pub mod command;
pub mod process;
pub mod system;

use crate::{
    identity::Platform,
    installer::{
        command::CommandTemplate,
        process::{ProcessError, ProcessOutput, ProcessRunner, Runner},
        system::SystemInstaller,
    },
    metadata::InstallerMetadata,
};

use std::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    str::FromStr,
};
use tracing::{debug, info, instrument, warn};

/// Installer name that selects the platform default.
pub const DEFAULT_INSTALLER: &str = "default";

/// Capability of installing packages.
pub trait Installer: Debug {
    /// Name of installer, e.g., "apt".
    fn name(&self) -> &str;

    /// Command to install packages, without package arguments.
    fn install(&self) -> CommandTemplate;

    /// Command to remove packages, without package arguments.
    fn remove(&self) -> CommandTemplate;

    /// Command to remove packages along with their configuration, without
    /// package arguments.
    fn purge(&self) -> CommandTemplate;

    /// Command to refresh package sources.
    fn index(&self) -> CommandTemplate;

    /// Command to register a package repository, without repository
    /// argument. `None` if repositories cannot be registered.
    fn repository_registrar(&self) -> Option<CommandTemplate> {
        None
    }

    /// Option that answers every confirmation prompt with yes. `None` if the
    /// installer never prompts.
    fn assume_yes(&self) -> Option<&str> {
        None
    }
}

/// Action to take on the packages of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Install,
    Remove,
    Purge,
}

impl Display for Action {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::Install => "install",
            Self::Remove => "remove",
            Self::Purge => "purge",
        })
    }
}

impl FromStr for Action {
    type Err = DispatchError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        match data {
            "install" => Ok(Self::Install),
            "remove" => Ok(Self::Remove),
            "purge" => Ok(Self::Purge),
            _ => Err(DispatchError::UnknownAction(data.to_string())),
        }
    }
}

/// Lifecycle state of an installer handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// Metadata is bound, nothing has run yet.
    MetadataBound,

    /// Repositories were registered, and package sources indexed.
    Indexed,

    /// Action was executed.
    Executed,
}

/// Installer bound to resolved metadata.
#[derive(Debug)]
pub struct InstallerHandle<R = ProcessRunner>
where
    R: Runner,
{
    backend: Box<dyn Installer>,
    runner: R,
    escalate: Option<String>,
    packages: Vec<String>,
    repositories: Vec<String>,
    index_before_action: bool,
    install: CommandTemplate,
    remove: CommandTemplate,
    purge: CommandTemplate,
    state: DispatchState,
}

impl<R> InstallerHandle<R>
where
    R: Runner,
{
    /// Bind metadata to installer.
    ///
    /// # Errors
    ///
    /// - Return [`DispatchError::UnknownInstaller`] if metadata names a
    ///   package manager that strapon does not know.
    /// - Return [`DispatchError::NoDefaultInstaller`] if metadata does not
    ///   name a package manager, and the platform has no default one.
    #[instrument(skip(metadata, platform, runner), level = "debug")]
    pub fn bind(
        metadata: InstallerMetadata,
        platform: &Platform,
        runner: R,
    ) -> Result<Self, DispatchError> {
        let backend = match metadata.installer.as_deref() {
            None | Some(DEFAULT_INSTALLER) => SystemInstaller::default_for(platform)?,
            Some(name) => SystemInstaller::new(name, platform)?,
        };
        debug!("bind metadata to {}", backend.name());

        Ok(Self::with_backend(metadata, Box::new(backend), runner))
    }

    /// Bind metadata to arbitrary installer backend.
    pub fn with_backend(metadata: InstallerMetadata, backend: Box<dyn Installer>, runner: R) -> Self {
        let mut handle = Self {
            install: backend.install(),
            remove: backend.remove(),
            purge: backend.purge(),
            backend,
            runner,
            escalate: None,
            packages: Vec::new(),
            repositories: metadata.repositories,
            index_before_action: metadata.index_before_action,
            state: DispatchState::MetadataBound,
        };

        for package in metadata.packages {
            handle.add_package(package);
        }

        handle
    }

    /// Run every command through privilege escalation program, e.g., "sudo".
    pub fn escalate_with(mut self, program: impl Into<String>) -> Self {
        self.escalate = Some(program.into());
        self
    }

    /// Answer confirmation prompts of install, remove, and purge with yes.
    ///
    /// Needed whenever output is captured, because the prompt would be
    /// hidden while the package manager waits on it.
    pub fn assume_yes(mut self) -> Self {
        if let Some(option) = self.backend.assume_yes() {
            self.install = self.install.with_option(option);
            self.remove = self.remove.with_option(option);
            self.purge = self.purge.with_option(option);
        }

        self
    }

    /// Stage package for install, remove, and purge.
    ///
    /// Packages that are already staged are ignored.
    pub fn add_package(&mut self, package: impl Into<String>) {
        let package = package.into();
        if self.packages.contains(&package) {
            return;
        }

        self.install = self.install.bake([package.as_str()]);
        self.remove = self.remove.bake([package.as_str()]);
        self.purge = self.purge.bake([package.as_str()]);
        self.packages.push(package);
    }

    /// Stage repository to register before next install.
    ///
    /// Re-enables indexing before install so packages provided by the new
    /// repository can be found.
    pub fn add_repository(&mut self, repository: impl Into<String>) {
        let repository = repository.into();
        if !self.repositories.contains(&repository) {
            self.repositories.push(repository);
        }

        self.index_before_action = true;
    }

    /// Execute action through bound installer.
    ///
    /// # Errors
    ///
    /// - Return [`InstallerError::Dispatch`] if no packages are staged.
    /// - Return [`InstallerError::Process`] if any external command fails.
    #[instrument(skip(self), level = "debug")]
    pub async fn exec(&mut self, action: Action) -> Result<ProcessOutput> {
        self.state = DispatchState::MetadataBound;
        if self.packages.is_empty() {
            return Err(DispatchError::NoPackages(action).into());
        }

        if action == Action::Install && self.index_before_action {
            self.register_repositories().await?;
            self.run(&self.backend.index()).await?;
            self.index_before_action = false;
            self.state = DispatchState::Indexed;
        }

        info!("{action} {}", self.packages.join(" "));
        let command = match action {
            Action::Install => self.install.clone(),
            Action::Remove => self.remove.clone(),
            Action::Purge => self.purge.clone(),
        };
        let output = self.run(&command).await?;
        self.state = DispatchState::Executed;

        Ok(output)
    }

    /// Name of bound installer.
    pub fn installer_name(&self) -> &str {
        self.backend.name()
    }

    /// Packages staged so far.
    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    /// Repositories waiting for registration.
    pub fn repositories(&self) -> &[String] {
        &self.repositories
    }

    /// Whether next install indexes package sources first.
    pub fn index_before_action(&self) -> bool {
        self.index_before_action
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    async fn register_repositories(&mut self) -> Result<()> {
        if self.repositories.is_empty() {
            return Ok(());
        }

        let Some(registrar) = self.backend.repository_registrar() else {
            warn!(
                "{} cannot register repositories, skipping {}",
                self.backend.name(),
                self.repositories.join(", ")
            );
            self.repositories.clear();
            return Ok(());
        };

        // INVARIANT: Only forget repositories that were actually registered.
        while let Some(repository) = self.repositories.first().cloned() {
            info!("register repository {repository}");
            self.run(&registrar.bake([repository])).await?;
            self.repositories.remove(0);
        }

        Ok(())
    }

    async fn run(&self, command: &CommandTemplate) -> Result<ProcessOutput, ProcessError> {
        match &self.escalate {
            Some(program) => self.runner.run(&command.escalate(program)).await,
            None => self.runner.run(command).await,
        }
    }
}

/// No installer can serve the request.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Package manager is not known to strapon.
    #[error("unknown package manager {0:?}")]
    UnknownInstaller(String),

    /// Running distribution has no known default package manager.
    #[error("no default package manager known for {0}")]
    NoDefaultInstaller(String),

    /// Action is not one of install, remove, or purge.
    #[error("unknown action {0:?}")]
    UnknownAction(String),

    /// Nothing was staged for current platform.
    #[error("no packages staged to {0} for this platform")]
    NoPackages(Action),
}

/// All possible error types for installer dispatch.
#[derive(Debug, thiserror::Error)]
pub enum InstallerError {
    /// Dispatch logic fails.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// External package manager process fails.
    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Friendly result alias :3
type Result<T, E = InstallerError> = std::result::Result<T, E>;
