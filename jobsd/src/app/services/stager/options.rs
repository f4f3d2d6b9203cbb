// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Translation of free-form container CLI options into a validated run model.
//!
//! Each option is split once into `(flag, value)` and dispatched through a fixed
//! whitelist table. Anything not in the table, or reserved for the platform,
//! rejects the whole option list.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::app::errors::{AppError, staging_error};

static OPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(--?[A-Za-z0-9][A-Za-z0-9-]*)(?:[=\s]\s*(.*?))?\s*$")
        .expect("option pattern compiles")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionError {
    #[error("unable to parse container option '{0}'")]
    Unparsable(String),
    #[error("container option '{0}' is managed by the platform and cannot be set")]
    Reserved(String),
    #[error("container option '{0}' is not supported")]
    Unsupported(String),
    #[error("container option '{0}' requires a value")]
    MissingValue(String),
    #[error("container option '{0}' does not take a value")]
    UnexpectedValue(String),
    #[error("invalid label '{0}': expected key=text")]
    InvalidLabel(String),
}

impl From<OptionError> for AppError {
    fn from(err: OptionError) -> Self {
        staging_error(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Must carry a non-blank value.
    Value,
    /// Boolean switch; a value is rejected.
    Switch,
}

pub type Apply<M> = fn(&mut M, String) -> Result<(), OptionError>;

/// One whitelist row: every alias of a flag maps to the same setter.
pub struct OptionSpec<M> {
    pub names: &'static [&'static str],
    pub arity: Arity,
    pub apply: Apply<M>,
}

/// Split `--flag=value`, `--flag value` or `-f value` into flag and (possibly empty) value.
pub fn parse_option(raw: &str) -> Result<(String, String), OptionError> {
    let caps = OPTION_RE
        .captures(raw)
        .ok_or_else(|| OptionError::Unparsable(raw.trim().to_string()))?;
    let flag = caps[1].to_string();
    let value = caps
        .get(2)
        .map(|m| unquote(m.as_str()).to_string())
        .unwrap_or_default();
    Ok((flag, value))
}

pub fn translate<M: Default>(
    raw_options: &[String],
    table: &[OptionSpec<M>],
    reserved: &[&str],
) -> Result<M, OptionError> {
    let mut model = M::default();
    for raw in raw_options.iter().filter(|raw| !raw.trim().is_empty()) {
        let (flag, value) = parse_option(raw)?;
        if reserved.contains(&flag.as_str()) {
            return Err(OptionError::Reserved(flag));
        }
        let spec = table
            .iter()
            .find(|spec| spec.names.contains(&flag.as_str()))
            .ok_or_else(|| OptionError::Unsupported(flag.clone()))?;
        match spec.arity {
            Arity::Value if value.trim().is_empty() => {
                return Err(OptionError::MissingValue(flag));
            }
            Arity::Switch if !value.is_empty() => {
                return Err(OptionError::UnexpectedValue(flag));
            }
            _ => {}
        }
        (spec.apply)(&mut model, value)?;
    }
    Ok(model)
}

/// Split a label at the first `=`; the text part may be empty.
pub fn split_label(value: &str) -> Result<(String, String), OptionError> {
    match value.split_once('=') {
        Some((key, text)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), text.to_string()))
        }
        _ => Err(OptionError::InvalidLabel(value.to_string())),
    }
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' || first == b'\'') && first == last {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_option_handles_separators() {
        assert_eq!(
            parse_option("--cpus=2").unwrap(),
            ("--cpus".into(), "2".into())
        );
        assert_eq!(
            parse_option("-p 80:8080").unwrap(),
            ("-p".into(), "80:8080".into())
        );
        assert_eq!(
            parse_option("  --label=env=").unwrap(),
            ("--label".into(), "env=".into())
        );
        assert_eq!(parse_option("--init").unwrap(), ("--init".into(), "".into()));
        assert_eq!(
            parse_option("--workdir \"/data dir\"").unwrap(),
            ("--workdir".into(), "/data dir".into())
        );
    }

    #[test]
    fn parse_option_rejects_non_flags() {
        assert!(matches!(
            parse_option("cpus=2"),
            Err(OptionError::Unparsable(_))
        ));
    }

    #[test]
    fn split_label_keeps_text_after_first_equals() {
        assert_eq!(split_label("env=").unwrap(), ("env".into(), "".into()));
        assert_eq!(split_label("a=b=c").unwrap(), ("a".into(), "b=c".into()));
        assert!(split_label("novalue").is_err());
        assert!(split_label("=x").is_err());
    }
}
