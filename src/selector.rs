//! Turns a discovered pool of scripts into an explicit deployment sequence.
//!
//! Only scripts named in the ordered inclusion list are deployed, in exactly that
//! order. Each selected script is renamed `{ordinal}-{name}` with a zero-padded
//! ordinal so the runner's lexicographic view matches the intended order. Inclusions
//! that do not resolve are skipped without consuming an ordinal.

use itertools::Itertools;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::constants::ORDINAL_WIDTH;
use crate::error::{DuplicateKind, FixtureError, Result};
use crate::resources::ScriptResource;

/// A script tagged with its deployment position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderedScript {
    ordinal: usize,
    name: String,
    content: String,
}

impl OrderedScript {
    fn new(ordinal: usize, script: &ScriptResource) -> Self {
        Self {
            ordinal,
            name: format!("{}-{}", format_ordinal(ordinal), script.name),
            content: script.content.clone(),
        }
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// The zero-padded ordinal, e.g. `00003`.
    pub fn prefix(&self) -> String {
        format_ordinal(self.ordinal)
    }

    /// Prefixed name, e.g. `00003-Tables.Users`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the underlying script without its ordinal.
    pub fn source_name(&self) -> &str {
        self.name
            .split_once('-')
            .map(|(_, rest)| rest)
            .unwrap_or(&self.name)
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

pub fn format_ordinal(ordinal: usize) -> String {
    format!("{:0width$}", ordinal, width = ORDINAL_WIDTH)
}

/// How duplicate names are treated during selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// Reject duplicate script names and duplicate inclusions.
    #[default]
    Strict,
    /// Last discovered script wins; a repeated inclusion deploys again.
    Permissive,
}

impl SelectionPolicy {
    pub fn from_allow_duplicates(allow_duplicates: bool) -> Self {
        if allow_duplicates {
            SelectionPolicy::Permissive
        } else {
            SelectionPolicy::Strict
        }
    }
}

/// Filter `all_scripts` down to `ordered_inclusions`, in inclusion order.
pub fn select_scripts<S: AsRef<str>>(
    all_scripts: &[ScriptResource],
    ordered_inclusions: &[S],
    policy: SelectionPolicy,
) -> Result<Vec<OrderedScript>> {
    if policy == SelectionPolicy::Strict {
        reject_duplicates(all_scripts, ordered_inclusions)?;
    }

    let by_name: HashMap<&str, &ScriptResource> = all_scripts
        .iter()
        .map(|script| (script.name.as_str(), script))
        .collect();

    let mut selected = Vec::new();
    for inclusion in ordered_inclusions {
        let inclusion = inclusion.as_ref();
        match by_name.get(inclusion) {
            Some(script) => selected.push(OrderedScript::new(selected.len(), script)),
            None => debug!("Inclusion '{}' did not match any script; skipping", inclusion),
        }
    }

    Ok(selected)
}

/// Inclusions that do not name any discovered script, in inclusion order.
pub fn unresolved_inclusions<S: AsRef<str>>(
    all_scripts: &[ScriptResource],
    ordered_inclusions: &[S],
) -> Vec<String> {
    ordered_inclusions
        .iter()
        .map(|inclusion| inclusion.as_ref())
        .filter(|inclusion| !all_scripts.iter().any(|script| script.name == *inclusion))
        .map(str::to_string)
        .collect()
}

fn reject_duplicates<S: AsRef<str>>(
    all_scripts: &[ScriptResource],
    ordered_inclusions: &[S],
) -> Result<()> {
    if let Some(name) = all_scripts.iter().map(|script| &script.name).duplicates().next() {
        return Err(FixtureError::DuplicateName {
            kind: DuplicateKind::Script,
            name: name.clone(),
        });
    }

    if let Some(name) = ordered_inclusions
        .iter()
        .map(|inclusion| inclusion.as_ref())
        .duplicates()
        .next()
    {
        return Err(FixtureError::DuplicateName {
            kind: DuplicateKind::Inclusion,
            name: name.to_string(),
        });
    }

    Ok(())
}
