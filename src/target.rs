// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Platform targeting predicates.
//!
//! Declarations in an application manifest can be restricted to a subset of
//! platforms through a __target__. A target is made of three independent
//! predicates: OS name, OS version, and CPU architecture. Any predicate left
//! unset is vacuously true, so the empty target applies everywhere.
//!
//! # Version Comparison
//!
//! OS versions are compared through [`VersionSpec`]. Numeric dot-separated
//! versions are compared component-wise as integers with missing components
//! treated as zero, so "20.4" equals "20.04.0". If either side is not numeric,
//! e.g., the running system is a rolling release without `VERSION_ID`, or the
//! specifier names a codename like "jammy", then only equality against the
//! codename fields of the identity is possible. Ordering a codename never
//! matches.

use crate::identity::Platform;

use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

/// Platform restriction of a declaration.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct TargetSpec {
    /// Distribution ids of which at least one must be in the id chain.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "one_or_many")]
    pub os_name: Option<Vec<String>>,

    /// Version constraint for the running distribution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<VersionSpec>,

    /// CPU architectures of which one must match the running machine.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "one_or_many")]
    pub cpu: Option<Vec<String>>,
}

impl TargetSpec {
    /// Target that applies to any platform.
    pub fn any() -> Self {
        Self::default()
    }

    /// Restrict target to distribution ids.
    pub fn os_name(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.os_name = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict target to OS version constraint.
    pub fn os_version(mut self, spec: VersionSpec) -> Self {
        self.os_version = Some(spec);
        self
    }

    /// Restrict target to CPU architectures.
    pub fn cpu(mut self, archs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.cpu = Some(archs.into_iter().map(Into::into).collect());
        self
    }

    /// Check if target has no predicates at all.
    pub fn is_any(&self) -> bool {
        self.os_name.is_none() && self.os_version.is_none() && self.cpu.is_none()
    }
}

impl Platform {
    /// Check if any target id is part of the id chain.
    pub fn matching_os(&self, targets: &[impl AsRef<str>]) -> bool {
        targets
            .iter()
            .any(|target| self.os.chain_index(target).is_some())
    }

    /// Check if CPU architecture is one of the targets.
    pub fn matching_cpu(&self, targets: &[impl AsRef<str>]) -> bool {
        targets.iter().any(|target| target.as_ref() == self.cpu)
    }

    /// Check if OS version satisfies every clause of version specifier.
    pub fn matching_version(&self, spec: &VersionSpec) -> bool {
        spec.clauses.iter().all(|clause| self.matching_clause(clause))
    }

    /// Check if platform satisfies all predicates of target.
    pub fn matching_all(&self, target: &TargetSpec) -> bool {
        let os = target
            .os_name
            .as_ref()
            .is_none_or(|names| self.matching_os(names.as_slice()));
        let version = target
            .os_version
            .as_ref()
            .is_none_or(|spec| self.matching_version(spec));
        let cpu = target
            .cpu
            .as_ref()
            .is_none_or(|archs| self.matching_cpu(archs.as_slice()));

        os && version && cpu
    }

    /// Closest position of any target id in id chain.
    pub fn closest_os(&self, targets: &[impl AsRef<str>]) -> Option<usize> {
        targets
            .iter()
            .filter_map(|target| self.os.chain_index(target))
            .min()
    }

    fn matching_clause(&self, clause: &VersionClause) -> bool {
        let numeric = self
            .os
            .version_id
            .as_deref()
            .and_then(parse_numeric)
            .zip(parse_numeric(&clause.value));

        if let Some((current, wanted)) = numeric {
            return clause.op.holds(compare_numeric(&current, &wanted));
        }

        if clause.op != VersionOp::Eq {
            return false;
        }

        [&self.os.version_codename, &self.os.ubuntu_codename]
            .into_iter()
            .flatten()
            .any(|codename| codename.eq_ignore_ascii_case(&clause.value))
    }
}

/// Comparison operator of a version clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOp {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

impl VersionOp {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Lt => ordering.is_lt(),
            Self::Le => ordering.is_le(),
            Self::Eq => ordering.is_eq(),
            Self::Ge => ordering.is_ge(),
            Self::Gt => ordering.is_gt(),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Ge => ">=",
            Self::Gt => ">",
        }
    }
}

/// Single `op value` pair of a version specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionClause {
    pub op: VersionOp,
    pub value: String,
}

/// OS version specifier, e.g., ">=18.04, <=22.04" or "jammy".
///
/// Made of comma-separated clauses that must all hold. A clause without an
/// operator means equality.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionSpec {
    clauses: Vec<VersionClause>,
}

impl VersionSpec {
    /// Clauses of specifier in declaration order.
    pub fn clauses(&self) -> &[VersionClause] {
        &self.clauses
    }
}

impl FromStr for VersionSpec {
    type Err = VersionSpecError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut clauses = Vec::new();
        for raw in data.split(',') {
            let raw = raw.trim();

            // INVARIANT: Two character operators must be checked first.
            let (op, value) = [
                ("<=", VersionOp::Le),
                (">=", VersionOp::Ge),
                ("==", VersionOp::Eq),
                ("<", VersionOp::Lt),
                (">", VersionOp::Gt),
                ("=", VersionOp::Eq),
            ]
            .into_iter()
            .find_map(|(prefix, op)| raw.strip_prefix(prefix).map(|value| (op, value)))
            .unwrap_or((VersionOp::Eq, raw));

            let value = value.trim();
            if value.is_empty() || value.contains(['<', '>', '=']) {
                return Err(VersionSpecError(data.to_string()));
            }

            clauses.push(VersionClause {
                op,
                value: value.to_string(),
            });
        }

        Ok(Self { clauses })
    }
}

impl TryFrom<String> for VersionSpec {
    type Error = VersionSpecError;

    fn try_from(data: String) -> Result<Self, Self::Error> {
        data.parse()
    }
}

impl From<VersionSpec> for String {
    fn from(spec: VersionSpec) -> Self {
        spec.to_string()
    }
}

impl Display for VersionSpec {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let clauses = self
            .clauses
            .iter()
            .map(|clause| format!("{}{}", clause.op.as_str(), clause.value))
            .collect::<Vec<_>>();
        fmt.write_str(&clauses.join(", "))
    }
}

fn parse_numeric(version: &str) -> Option<Vec<u64>> {
    version
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect()
}

fn compare_numeric(left: &[u64], right: &[u64]) -> Ordering {
    let len = left.len().max(right.len());
    let pad = |parts: &[u64], index: usize| parts.get(index).copied().unwrap_or(0);

    (0..len)
        .map(|index| pad(left, index).cmp(&pad(right, index)))
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Version specifier cannot be parsed.
#[derive(Clone, Debug, thiserror::Error)]
#[error("invalid OS version specifier {0:?}")]
pub struct VersionSpecError(pub String);

// Accept both `os_name = "ubuntu"` and `os_name = ["ubuntu", "debian"]`.
mod one_or_many {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(
            Option::<OneOrMany>::deserialize(deserializer)?.map(|value| match value {
                OneOrMany::One(one) => vec![one],
                OneOrMany::Many(many) => many,
            }),
        )
    }

    pub fn serialize<S>(value: &Option<Vec<String>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value.as_deref() {
            Some([one]) => one.serialize(serializer),
            Some(many) => many.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }
}
