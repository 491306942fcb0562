// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use strapon::{
    app::{load_settings, AppError, Application, ExecOptions, Format},
    identity::Platform,
    installer::{
        process::{Interrupt, ProcessError, ProcessOutput, ProcessRunner, EXIT_SIGINT},
        Action, InstallerError,
    },
    path::{default_manifest_dir, default_settings_file, manifest_path, os_release_file},
};

use anyhow::Result;
use clap::Parser;
use std::{
    io::{self, Write},
    path::PathBuf,
    process::exit,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "strapon [options] --app <name|path> <format> <action>",
    version
)]
struct Cli {
    /// Application name, or path to its manifest.
    #[arg(short, long, value_name = "name|path")]
    pub app: String,

    /// Install format to use: standalone, system, or source.
    #[arg(value_name = "format")]
    pub format: Format,

    /// Action to take: install, remove, or purge.
    #[arg(value_name = "action")]
    pub action: Action,

    /// Show debug logs.
    #[arg(short, long)]
    pub verbose: bool,

    /// Seconds to wait on package manager, zero waits forever.
    #[arg(short, long, value_name = "secs")]
    pub timeout: Option<u64>,

    /// Capture package manager output instead of showing it, implies --yes.
    #[arg(short, long)]
    pub capture: bool,

    /// Answer package manager prompts with yes.
    #[arg(short, long)]
    pub yes: bool,

    /// Path to settings file.
    #[arg(long, value_name = "path")]
    pub config: Option<PathBuf>,
}

impl Cli {
    async fn run(self) -> Result<()> {
        let settings_file = match self.config {
            Some(path) => path,
            None => default_settings_file()?,
        };
        let mut settings = load_settings(settings_file)?;
        if let Some(secs) = self.timeout {
            settings.timeout_secs = secs;
        }
        settings.capture_output |= self.capture;
        settings.assume_yes |= self.yes;

        let manifest_dir = match settings.manifest_dir.clone() {
            Some(path) => path,
            None => default_manifest_dir()?,
        };
        let app = Application::load(manifest_path(manifest_dir, &self.app))?;

        let release = settings.os_release.clone().unwrap_or_else(os_release_file);
        let platform = Platform::detect(release)?;
        info!("running on {} ({})", platform.os, platform.cpu);

        let interrupt = Interrupt::new();
        interrupt.listen_ctrl_c();
        let runner = ProcessRunner::new(settings.timeout(), settings.capture_output)
            .with_interrupt(interrupt);
        let options = ExecOptions::from_settings(&settings);
        let output = app
            .exec(self.format, self.action, &platform, runner, &options)
            .await?;

        write_output(&output, &mut io::stdout().lock(), &mut io::stderr().lock())?;

        Ok(())
    }
}

/// Replay captured output, stdout to `out` and stderr to `err`.
fn write_output(output: &ProcessOutput, out: &mut impl Write, err: &mut impl Write) -> Result<()> {
    replay(output.stdout.as_deref(), out)?;
    replay(output.stderr.as_deref(), err)?;
    Ok(())
}

fn replay(stream: Option<&str>, sink: &mut impl Write) -> io::Result<()> {
    match stream {
        None | Some("") => Ok(()),
        // INVARIANT: Each stream ends on its own line.
        Some(text) if text.ends_with('\n') => write!(sink, "{text}"),
        Some(text) => writeln!(sink, "{text}"),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = cli.run().await {
        error!("{error:?}");
        exit(exit_code(&error));
    }

    exit(0)
}

fn exit_code(error: &anyhow::Error) -> i32 {
    let interrupted = matches!(
        error.downcast_ref::<AppError>(),
        Some(AppError::Installer(InstallerError::Process(
            ProcessError::Interrupted { .. }
        )))
    );

    if interrupted {
        EXIT_SIGINT
    } else {
        1
    }
}
