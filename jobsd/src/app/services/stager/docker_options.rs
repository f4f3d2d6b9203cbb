// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::services::shell::sh_escape;
use crate::app::services::stager::options::{
    Arity, OptionError, OptionSpec, split_label, translate,
};

/// Flags the wrapper script sets itself.
const RESERVED: &[&str] = &[
    "--cidfile",
    "--name",
    "--rm",
    "--user",
    "-u",
    "--detach",
    "-d",
    "--env-file",
];

/// User-controllable part of a `docker run` invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DockerRunOptions {
    pub labels: Vec<(String, String)>,
    pub mounts: Vec<String>,
    pub volumes: Vec<String>,
    pub publish: Vec<String>,
    pub group_add: Vec<String>,
    pub tmpfs: Vec<String>,
    pub cpus: Option<String>,
    pub memory: Option<String>,
    pub gpus: Option<String>,
    pub hostname: Option<String>,
    pub network: Option<String>,
    pub workdir: Option<String>,
    pub entrypoint: Option<String>,
    pub shm_size: Option<String>,
    pub init: bool,
    pub read_only: bool,
}

static TABLE: &[OptionSpec<DockerRunOptions>] = &[
    OptionSpec {
        names: &["--label", "-l"],
        arity: Arity::Value,
        apply: |m, v| {
            m.labels.push(split_label(&v)?);
            Ok(())
        },
    },
    OptionSpec {
        names: &["--mount"],
        arity: Arity::Value,
        apply: |m, v| {
            m.mounts.push(v);
            Ok(())
        },
    },
    OptionSpec {
        names: &["--volume", "-v"],
        arity: Arity::Value,
        apply: |m, v| {
            m.volumes.push(v);
            Ok(())
        },
    },
    OptionSpec {
        names: &["--publish", "-p"],
        arity: Arity::Value,
        apply: |m, v| {
            m.publish.push(v);
            Ok(())
        },
    },
    OptionSpec {
        names: &["--group-add"],
        arity: Arity::Value,
        apply: |m, v| {
            m.group_add.push(v);
            Ok(())
        },
    },
    OptionSpec {
        names: &["--tmpfs"],
        arity: Arity::Value,
        apply: |m, v| {
            m.tmpfs.push(v);
            Ok(())
        },
    },
    OptionSpec {
        names: &["--cpus"],
        arity: Arity::Value,
        apply: |m, v| {
            m.cpus = Some(v);
            Ok(())
        },
    },
    OptionSpec {
        names: &["--memory", "-m"],
        arity: Arity::Value,
        apply: |m, v| {
            m.memory = Some(v);
            Ok(())
        },
    },
    OptionSpec {
        names: &["--gpus"],
        arity: Arity::Value,
        apply: |m, v| {
            m.gpus = Some(v);
            Ok(())
        },
    },
    OptionSpec {
        names: &["--hostname", "-h"],
        arity: Arity::Value,
        apply: |m, v| {
            m.hostname = Some(v);
            Ok(())
        },
    },
    OptionSpec {
        names: &["--network", "--net"],
        arity: Arity::Value,
        apply: |m, v| {
            m.network = Some(v);
            Ok(())
        },
    },
    OptionSpec {
        names: &["--workdir", "-w"],
        arity: Arity::Value,
        apply: |m, v| {
            m.workdir = Some(v);
            Ok(())
        },
    },
    OptionSpec {
        names: &["--entrypoint"],
        arity: Arity::Value,
        apply: |m, v| {
            m.entrypoint = Some(v);
            Ok(())
        },
    },
    OptionSpec {
        names: &["--shm-size"],
        arity: Arity::Value,
        apply: |m, v| {
            m.shm_size = Some(v);
            Ok(())
        },
    },
    OptionSpec {
        names: &["--init"],
        arity: Arity::Switch,
        apply: |m, _| {
            m.init = true;
            Ok(())
        },
    },
    OptionSpec {
        names: &["--read-only"],
        arity: Arity::Switch,
        apply: |m, _| {
            m.read_only = true;
            Ok(())
        },
    },
];

impl DockerRunOptions {
    pub fn from_user_options(raw: &[String]) -> Result<Self, OptionError> {
        translate(raw, TABLE, RESERVED)
    }

    /// Render as escaped `docker run` arguments.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        let mut push = |flag: &str, value: &str| {
            args.push(format!("{flag} {}", sh_escape(value)));
        };
        for (key, text) in &self.labels {
            push("--label", &format!("{key}={text}"));
        }
        for mount in &self.mounts {
            push("--mount", mount);
        }
        for volume in &self.volumes {
            push("--volume", volume);
        }
        for publish in &self.publish {
            push("--publish", publish);
        }
        for group in &self.group_add {
            push("--group-add", group);
        }
        for tmpfs in &self.tmpfs {
            push("--tmpfs", tmpfs);
        }
        let valued = [
            ("--cpus", &self.cpus),
            ("--memory", &self.memory),
            ("--gpus", &self.gpus),
            ("--hostname", &self.hostname),
            ("--network", &self.network),
            ("--workdir", &self.workdir),
            ("--entrypoint", &self.entrypoint),
            ("--shm-size", &self.shm_size),
        ];
        for (flag, value) in valued {
            if let Some(value) = value {
                push(flag, value);
            }
        }
        if self.init {
            args.push("--init".to_string());
        }
        if self.read_only {
            args.push("--read-only".to_string());
        }
        args
    }
}
