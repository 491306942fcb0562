// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Command templates.
//!
//! A package manager action is a program plus a fixed set of arguments,
//! e.g., `apt install`, that more arguments are __baked__ onto, e.g., the
//! package names of an application. Baking never mutates a template, it
//! always hands back a new one. Thus the bare `apt install` template of a
//! backend can be shared by every handler that uses it.

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Program with accumulated argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    program: String,
    args: Vec<String>,
}

impl CommandTemplate {
    /// Construct new template for program without arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Bake more arguments onto copy of template.
    pub fn bake(&self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut baked = self.clone();
        baked.args.extend(args.into_iter().map(Into::into));
        baked
    }

    /// Insert option right after program on copy of template.
    ///
    /// Package managers accept global options before their subcommand, e.g.,
    /// `apt -y install`.
    pub fn with_option(&self, option: impl Into<String>) -> Self {
        let mut baked = self.clone();
        baked.args.insert(0, option.into());
        baked
    }

    /// Run template through another program, e.g., "sudo".
    pub fn escalate(&self, program: impl Into<String>) -> Self {
        let mut args = Vec::with_capacity(self.args.len() + 1);
        args.push(self.program.clone());
        args.extend(self.args.iter().cloned());

        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Full command line as list of words.
    pub fn to_argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

impl Display for CommandTemplate {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(&shell_words::join(self.to_argv()))
    }
}
