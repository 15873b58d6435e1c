// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provider and CLI definitions consumed by the dispatch backends

use crate::tier::Tier;
use serde::{Deserialize, Serialize};

/// How a CLI receives its prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    /// Prompt substituted for `{prompt}` directly in the argv.
    #[default]
    Arg,
    /// Prompt streamed to the child's stdin through a wrapper script.
    Stdin,
    /// Prompt written to a temp file whose path replaces `{prompt_file}`.
    File,
}

/// A named external agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub model: String,
    pub tier: Tier,
    /// Authed providers count against the global rate-limit windows.
    #[serde(default)]
    pub authed: bool,
}

/// A pluggable CLI definition (`dispatch.cli.<name>`).
///
/// `args`, `model_flag`, and `approval_flags` are argument templates; the
/// only placeholders the command builder accepts are `{prompt}`,
/// `{prompt_file}`, and `{model}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    pub cmd: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub prompt_mode: PromptMode,
    /// Template carrying `{model}`, e.g. `"--model={model}"`. Appended after
    /// `args` when set.
    #[serde(default)]
    pub model_flag: Option<String>,
    #[serde(default)]
    pub approval_flags: Vec<String>,
}

impl CliConfig {
    /// The full ordered flag-template list handed to the command builder.
    pub fn flag_templates(&self) -> Vec<String> {
        let mut templates = self.args.clone();
        if let Some(ref model_flag) = self.model_flag {
            templates.push(model_flag.clone());
        }
        templates.extend(self.approval_flags.iter().cloned());
        templates
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
