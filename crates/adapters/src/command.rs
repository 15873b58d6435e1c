// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hardened command construction.
//!
//! Translates a CLI definition into a validated argument vector. Placeholder
//! substitution is literal string replacement on the already-split argv
//! entry; the result is handed to an exec-family call and is never re-joined
//! into a shell string. Prompt text therefore crosses into the child intact,
//! no matter what shell metacharacters it contains.

use thiserror::Error;

/// Placeholders accepted in flag templates.
pub const PLACEHOLDER_PROMPT: &str = "{prompt}";
pub const PLACEHOLDER_PROMPT_FILE: &str = "{prompt_file}";
pub const PLACEHOLDER_MODEL: &str = "{model}";

/// Errors from command construction. These are configuration bugs: callers
/// log them as `gateway_critical` and never retry.
#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("provider command is empty")]
    EmptyCommand,
    #[error("{field} contains a NUL byte")]
    NulByte { field: &'static str },
    #[error("prompt is empty")]
    EmptyPrompt,
    #[error("flag template {index} is empty")]
    EmptyFlag { index: usize },
    #[error("unknown placeholder {{{placeholder}}} in flag {flag:?}")]
    UnknownPlaceholder { placeholder: String, flag: String },
    #[error("a flag references {{model}} but no model is configured")]
    MissingModel,
    #[error("model {model:?} is configured but no flag references {{model}}")]
    UnusedModel { model: String },
    #[error("a flag references {{prompt_file}} but no prompt file was provided")]
    MissingPromptFile,
}

/// Build the argv for a provider invocation.
///
/// `flags` is the ordered template list; `prompt_file` is the temp-file path
/// a backend supplies when the CLI takes its prompt from a file. The first
/// entry of the returned vector is the command itself.
pub fn build_argv(
    cmd: &str,
    model: &str,
    prompt: &str,
    prompt_file: Option<&str>,
    flags: &[String],
) -> Result<Vec<String>, CommandError> {
    let cmd = cmd.trim();
    if cmd.is_empty() {
        return Err(CommandError::EmptyCommand);
    }
    check_nul("command", cmd)?;

    let model = model.trim();
    check_nul("model", model)?;

    if prompt.is_empty() {
        return Err(CommandError::EmptyPrompt);
    }
    check_nul("prompt", prompt)?;

    let mut references_model = false;
    let mut argv = Vec::with_capacity(flags.len() + 1);
    argv.push(cmd.to_string());

    for (index, flag) in flags.iter().enumerate() {
        if flag.trim().is_empty() {
            return Err(CommandError::EmptyFlag { index });
        }
        check_nul("flag", flag)?;

        if flag.contains(PLACEHOLDER_MODEL) {
            if model.is_empty() {
                return Err(CommandError::MissingModel);
            }
            references_model = true;
        }

        argv.push(substitute(flag, model, prompt, prompt_file)?);
    }

    if !model.is_empty() && !references_model {
        return Err(CommandError::UnusedModel {
            model: model.to_string(),
        });
    }

    Ok(argv)
}

fn check_nul(field: &'static str, value: &str) -> Result<(), CommandError> {
    if value.contains('\0') {
        return Err(CommandError::NulByte { field });
    }
    Ok(())
}

/// Substitute placeholders in a single template entry.
///
/// Walks the template in one pass so placeholder-shaped text inside a
/// substituted *value* is never re-interpreted. Any `{...}` token outside
/// the known set fails the build; an unterminated `{` is literal text.
fn substitute(
    flag: &str,
    model: &str,
    prompt: &str,
    prompt_file: Option<&str>,
) -> Result<String, CommandError> {
    let mut out = String::with_capacity(flag.len());
    let mut rest = flag;

    while let Some(open) = rest.find('{') {
        let tail = &rest[open + 1..];
        let Some(close) = tail.find('}') else {
            break;
        };
        let token = &tail[..close];
        out.push_str(&rest[..open]);
        match token {
            "prompt" => out.push_str(prompt),
            "model" => out.push_str(model),
            "prompt_file" => {
                out.push_str(prompt_file.ok_or(CommandError::MissingPromptFile)?);
            }
            other => {
                return Err(CommandError::UnknownPlaceholder {
                    placeholder: other.to_string(),
                    flag: flag.to_string(),
                });
            }
        }
        rest = &tail[close + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
