// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command construction stays safe under hostile prompt content.

use cortex_adapters::build_argv;

#[test]
fn hostile_prompt_is_a_single_untouched_argv_entry() {
    let prompt = "complex \"quote\"\nline2\n2>&1 $(echo x); ( test )";
    let template: Vec<String> = ["--message", "{prompt}", "--model", "{model}", "--danger"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let argv = build_argv("agent", "gpt-5", prompt, None, &template).unwrap();

    assert_eq!(argv[2], prompt);
    assert_eq!(argv[4], "gpt-5");
    assert_eq!(
        argv,
        vec!["agent", "--message", prompt, "--model", "gpt-5", "--danger"]
    );
    // No entry concatenates the prompt with anything else
    assert_eq!(argv.iter().filter(|e| e.contains("echo x")).count(), 1);
}
