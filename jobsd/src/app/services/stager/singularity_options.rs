// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::services::shell::sh_escape;
use crate::app::services::stager::options::{Arity, OptionError, OptionSpec, translate};

const RESERVED: &[&str] = &["--pid-file", "--pidfile", "--app", "--writable", "-w"];

/// User-controllable part of a `singularity run` / `instance start` invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SingularityRunOptions {
    pub binds: Vec<String>,
    pub mounts: Vec<String>,
    pub overlays: Vec<String>,
    pub scratch: Vec<String>,
    pub env: Vec<String>,
    pub home: Option<String>,
    pub workdir: Option<String>,
    pub pwd: Option<String>,
    pub hostname: Option<String>,
    pub cleanenv: bool,
    pub contain: bool,
    pub containall: bool,
    pub no_home: bool,
    pub nv: bool,
    pub rocm: bool,
    pub writable_tmpfs: bool,
}

macro_rules! append {
    ($field:ident) => {
        |m: &mut SingularityRunOptions, v: String| {
            m.$field.push(v);
            Ok(())
        }
    };
}

macro_rules! set {
    ($field:ident) => {
        |m: &mut SingularityRunOptions, v: String| {
            m.$field = Some(v);
            Ok(())
        }
    };
}

macro_rules! switch {
    ($field:ident) => {
        |m: &mut SingularityRunOptions, _v: String| {
            m.$field = true;
            Ok(())
        }
    };
}

static TABLE: &[OptionSpec<SingularityRunOptions>] = &[
    OptionSpec {
        names: &["--bind", "-B"],
        arity: Arity::Value,
        apply: append!(binds),
    },
    OptionSpec {
        names: &["--mount"],
        arity: Arity::Value,
        apply: append!(mounts),
    },
    OptionSpec {
        names: &["--overlay", "-o"],
        arity: Arity::Value,
        apply: append!(overlays),
    },
    OptionSpec {
        names: &["--scratch", "-S"],
        arity: Arity::Value,
        apply: append!(scratch),
    },
    OptionSpec {
        names: &["--env"],
        arity: Arity::Value,
        apply: append!(env),
    },
    OptionSpec {
        names: &["--home", "-H"],
        arity: Arity::Value,
        apply: set!(home),
    },
    OptionSpec {
        names: &["--workdir", "-W"],
        arity: Arity::Value,
        apply: set!(workdir),
    },
    OptionSpec {
        names: &["--pwd"],
        arity: Arity::Value,
        apply: set!(pwd),
    },
    OptionSpec {
        names: &["--hostname"],
        arity: Arity::Value,
        apply: set!(hostname),
    },
    OptionSpec {
        names: &["--cleanenv", "-e"],
        arity: Arity::Switch,
        apply: switch!(cleanenv),
    },
    OptionSpec {
        names: &["--contain", "-c"],
        arity: Arity::Switch,
        apply: switch!(contain),
    },
    OptionSpec {
        names: &["--containall", "-C"],
        arity: Arity::Switch,
        apply: switch!(containall),
    },
    OptionSpec {
        names: &["--no-home"],
        arity: Arity::Switch,
        apply: switch!(no_home),
    },
    OptionSpec {
        names: &["--nv"],
        arity: Arity::Switch,
        apply: switch!(nv),
    },
    OptionSpec {
        names: &["--rocm"],
        arity: Arity::Switch,
        apply: switch!(rocm),
    },
    OptionSpec {
        names: &["--writable-tmpfs"],
        arity: Arity::Switch,
        apply: switch!(writable_tmpfs),
    },
];

impl SingularityRunOptions {
    pub fn from_user_options(raw: &[String]) -> Result<Self, OptionError> {
        translate(raw, TABLE, RESERVED)
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        let repeated = [
            ("--bind", &self.binds),
            ("--mount", &self.mounts),
            ("--overlay", &self.overlays),
            ("--scratch", &self.scratch),
            ("--env", &self.env),
        ];
        for (flag, values) in repeated {
            args.extend(values.iter().map(|v| format!("{flag} {}", sh_escape(v))));
        }
        let valued = [
            ("--home", &self.home),
            ("--workdir", &self.workdir),
            ("--pwd", &self.pwd),
            ("--hostname", &self.hostname),
        ];
        for (flag, value) in valued {
            if let Some(value) = value {
                args.push(format!("{flag} {}", sh_escape(value)));
            }
        }
        let switches = [
            ("--cleanenv", self.cleanenv),
            ("--contain", self.contain),
            ("--containall", self.containall),
            ("--no-home", self.no_home),
            ("--nv", self.nv),
            ("--rocm", self.rocm),
            ("--writable-tmpfs", self.writable_tmpfs),
        ];
        args.extend(
            switches
                .into_iter()
                .filter(|(_, on)| *on)
                .map(|(flag, _)| flag.to_string()),
        );
        args
    }
}
