// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::PathBuf;

use clap::{CommandFactory, FromArgMatches, Parser};

#[derive(Parser, Debug)]
#[command(
    name = "jobsd",
    version,
    about = "Stages, launches, monitors and recovers container jobs on remote HPC hosts.",
    long_about = None,
    after_help = "Configuration precedence: defaults < config file < command-line flags.\n\
Config path precedence: defaults < JOBSD_CONFIG_PATH < command-line flags.\n\
If --config is omitted, jobsd tries JOBSD_CONFIG_PATH, then the default config file location; missing default config is OK.\n\
Paths in the config file are resolved relative to the config file directory; paths passed as flags are resolved relative to the current working directory.\n\
Logging is controlled with JOBSD_LOG, JOBSD_LOG_FORMAT, JOBSD_LOG_SPAN_EVENTS and JOBSD_LOG_FILE."
)]
pub struct Opts {
    #[arg(
        short,
        long,
        value_name = "PATH",
        help = "Path to a TOML config file. When omitted, jobsd uses JOBSD_CONFIG_PATH if set, otherwise the default config file location if available."
    )]
    pub config: Option<PathBuf>,
    #[arg(
        long,
        value_name = "PATH",
        help = "Path to the SQLite database file. Overrides `database_path` from the config file."
    )]
    pub database_path: Option<PathBuf>,
    #[arg(
        long,
        value_name = "SECS",
        value_parser = clap::value_parser!(u64).range(1..),
        help = "How often to scan for jobs to process. Overrides `poll_interval_secs` from the config file."
    )]
    pub poll_interval_secs: Option<u64>,
    #[arg(
        short,
        long,
        action = clap::ArgAction::SetTrue,
        help = "Enable debug logging. Overrides `verbose` from the config file."
    )]
    pub verbose: bool,
}

pub struct ParsedOpts {
    pub opts: Opts,
    /// `Some(true)` only when the flag was given, so the config file value survives otherwise.
    pub verbose_override: Option<bool>,
}

pub fn parse_opts() -> ParsedOpts {
    parse_from(std::env::args_os()).unwrap_or_else(|err| err.exit())
}

fn parse_from<I, T>(args: I) -> Result<ParsedOpts, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let matches = Opts::command().try_get_matches_from(args)?;
    let verbose_override = matches.get_flag("verbose").then_some(true);
    let opts = Opts::from_arg_matches(&matches)?;
    Ok(ParsedOpts {
        opts,
        verbose_override,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_to_overrides() {
        let parsed = parse_from([
            "jobsd",
            "--config",
            "/etc/jobsd.toml",
            "--database-path",
            "/var/lib/jobsd/db.sqlite",
            "--poll-interval-secs",
            "3",
            "-v",
        ])
        .unwrap();
        assert_eq!(parsed.opts.config, Some(PathBuf::from("/etc/jobsd.toml")));
        assert_eq!(parsed.opts.poll_interval_secs, Some(3));
        assert_eq!(parsed.verbose_override, Some(true));
    }

    #[test]
    fn absent_verbose_flag_leaves_config_value_alone() {
        let parsed = parse_from(["jobsd"]).unwrap();
        assert_eq!(parsed.verbose_override, None);
        assert!(parsed.opts.database_path.is_none());
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        assert!(parse_from(["jobsd", "--poll-interval-secs", "0"]).is_err());
    }

    #[test]
    fn command_definition_is_consistent() {
        Opts::command().debug_assert();
    }
}
