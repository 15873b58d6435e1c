// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn flag_templates_orders_args_model_approval() {
    let cli = CliConfig {
        cmd: "claude".into(),
        args: vec!["-p".into(), "{prompt}".into()],
        prompt_mode: PromptMode::Arg,
        model_flag: Some("--model={model}".into()),
        approval_flags: vec!["--dangerously-skip-permissions".into()],
    };

    assert_eq!(
        cli.flag_templates(),
        vec![
            "-p",
            "{prompt}",
            "--model={model}",
            "--dangerously-skip-permissions"
        ]
    );
}

#[test]
fn flag_templates_without_model_flag() {
    let cli = CliConfig {
        cmd: "aider".into(),
        args: vec!["--message-file".into(), "{prompt_file}".into()],
        prompt_mode: PromptMode::File,
        model_flag: None,
        approval_flags: vec![],
    };
    assert_eq!(cli.flag_templates(), vec!["--message-file", "{prompt_file}"]);
}

#[test]
fn prompt_mode_defaults_to_arg() {
    let cli: CliConfig = toml_like(r#"{"cmd": "claude"}"#);
    assert_eq!(cli.prompt_mode, PromptMode::Arg);
    assert!(cli.args.is_empty());
}

#[test]
fn provider_authed_defaults_false() {
    let p: ProviderConfig = toml_like(r#"{"model": "gpt-5", "tier": "fast"}"#);
    assert!(!p.authed);
    assert_eq!(p.tier, Tier::Fast);
}

fn toml_like<T: serde::de::DeserializeOwned>(json: &str) -> T {
    serde_json::from_str(json).unwrap()
}
