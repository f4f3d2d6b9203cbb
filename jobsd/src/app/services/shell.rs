// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

/// Very small, safe-ish shell escaper for paths and arguments.
pub fn sh_escape(p: &str) -> String {
    let mut out = String::from("'");
    out.push_str(&p.replace('\'', r"'\''"));
    out.push('\'');
    out
}

/// Escape every argument and join them with single spaces.
pub fn join_escaped<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|arg| sh_escape(arg.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Join a directory and a file name without doubling the separator.
pub fn join_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}
