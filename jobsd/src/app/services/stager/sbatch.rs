// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::errors::{AppResult, staging_error};
use crate::app::services::shell::sh_escape;
use crate::app::types::Job;

/// Directives the platform writes itself, with their short aliases.
const MANAGED: &[(&str, &str)] = &[
    ("-J", "--job-name"),
    ("-o", "--output"),
    ("-e", "--error"),
    ("-t", "--time"),
];

/// Render the `#SBATCH` header: managed directives first, then the user's options.
pub fn render_directives(
    job: &Job,
    output_path: &str,
    user_options: &[String],
) -> AppResult<String> {
    let mut out = String::new();
    out.push_str(&format!("#SBATCH --job-name={}\n", slurm_job_name(job)));
    out.push_str(&format!("#SBATCH --output={}\n", sh_escape(output_path)));
    out.push_str(&format!("#SBATCH --error={}\n", sh_escape(output_path)));
    if let Some(limit) = time_limit(job.max_minutes) {
        out.push_str(&format!("#SBATCH --time={limit}\n"));
    }
    for option in user_options {
        for directive in directives_from_option(option)? {
            out.push_str("#SBATCH ");
            out.push_str(&directive);
            out.push('\n');
        }
    }
    Ok(out)
}

/// `HH:MM:00` wall-clock limit; `None` when the job has no limit.
pub fn time_limit(max_minutes: i64) -> Option<String> {
    (max_minutes > 0).then(|| format!("{:02}:{:02}:00", max_minutes / 60, max_minutes % 60))
}

fn slurm_job_name(job: &Job) -> String {
    let name: String = job
        .name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.trim_matches('_').is_empty() {
        job.uuid.clone()
    } else {
        name
    }
}

/// Split one user option string into directives, each a flag with its optional value.
fn directives_from_option(option: &str) -> AppResult<Vec<String>> {
    let tokens = split_sbatch_args(option);
    let mut directives: Vec<String> = Vec::new();
    let mut iter = tokens.into_iter().peekable();
    while let Some(token) = iter.next() {
        if !token.starts_with('-') || token == "-" || token == "--" {
            return Err(staging_error(format!(
                "invalid scheduler option '{option}': expected a flag, found '{token}'"
            )));
        }
        let flag = token.split('=').next().unwrap_or(&token);
        if is_managed(flag) {
            return Err(staging_error(format!(
                "scheduler option '{flag}' is managed by the platform and cannot be set"
            )));
        }
        let directive = match token.split_once('=') {
            Some((flag, value)) => format!("{flag}={}", quote_if_needed(value)),
            None => match iter.next_if(|next| !next.starts_with('-')) {
                Some(value) => format!("{token} {}", quote_if_needed(&value)),
                None => token.clone(),
            },
        };
        directives.push(directive);
    }
    Ok(directives)
}

fn is_managed(flag: &str) -> bool {
    MANAGED.iter().any(|(short, long)| {
        flag == *long
            || flag == *short
            || (flag.starts_with(short) && flag.len() > 2 && !flag.starts_with("--"))
    })
}

fn quote_if_needed(value: &str) -> String {
    if value.chars().any(char::is_whitespace) {
        sh_escape(value)
    } else {
        value.to_string()
    }
}

fn split_sbatch_args(input: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut escape = false;

    for ch in input.chars() {
        if escape {
            buf.push(ch);
            escape = false;
            continue;
        }
        if ch == '\\' {
            escape = true;
            continue;
        }
        if in_single {
            if ch == '\'' {
                in_single = false;
            } else {
                buf.push(ch);
            }
            continue;
        }
        if in_double {
            if ch == '"' {
                in_double = false;
            } else {
                buf.push(ch);
            }
            continue;
        }
        match ch {
            '\'' => in_single = true,
            '"' => in_double = true,
            ch if ch.is_whitespace() => {
                if !buf.is_empty() {
                    out.push(std::mem::take(&mut buf));
                }
            }
            _ => buf.push(ch),
        }
    }

    if escape {
        buf.push('\\');
    }
    if !buf.is_empty() {
        out.push(buf);
    }
    out
}
