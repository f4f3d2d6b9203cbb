// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Pieces shared by every wrapper script: standard variables, mounts, names.

use std::sync::LazyLock;

use regex::Regex;

use crate::app::errors::{AppResult, staging_error};
use crate::app::services::shell::{join_escaped, sh_escape};
use crate::app::types::Job;

pub const SCRIPT_FILE: &str = "jobrun.sh";
pub const ENV_FILE: &str = "jobrun.env";
pub const CID_FILE: &str = "jobrun.cid";
pub const OUTPUT_FILE: &str = "jobrun.out";
pub const EXIT_CODE_FILE: &str = "jobrun.exitcode";

pub const INPUT_MOUNT: &str = "/JobInputs";
pub const OUTPUT_MOUNT: &str = "/JobOutputs";
pub const EXEC_MOUNT: &str = "/JobExec";

/// Prefix reserved for variables the platform injects.
pub const RESERVED_ENV_PREFIX: &str = "JOB_";

static ENV_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("env name pattern compiles"));

static IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9./_][A-Za-z0-9._/:@+-]*$").expect("image pattern compiles")
});

/// Host directory bound to a fixed path inside the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host: String,
    pub container: &'static str,
}

pub fn standard_mounts(job: &Job) -> AppResult<Vec<Mount>> {
    let required = [
        ("input directory", &job.input_dir, INPUT_MOUNT),
        ("output directory", &job.output_dir, OUTPUT_MOUNT),
        ("execution directory", &job.exec_dir, EXEC_MOUNT),
    ];
    required
        .into_iter()
        .map(|(what, host, container)| {
            let host = host.trim();
            if host.is_empty() {
                return Err(staging_error(format!("job {} has no {what}", job.uuid)));
            }
            if !host.starts_with('/') {
                return Err(staging_error(format!(
                    "job {} {what} must be absolute: {host}",
                    job.uuid
                )));
            }
            Ok(Mount {
                host: host.to_string(),
                container,
            })
        })
        .collect()
}

pub fn container_image(job: &Job) -> AppResult<&str> {
    let image = job
        .app
        .container_image
        .as_deref()
        .map(str::trim)
        .filter(|image| !image.is_empty())
        .ok_or_else(|| {
            staging_error(format!(
                "application {}-{} has no container image",
                job.app.id, job.app.version
            ))
        })?;
    if !IMAGE_RE.is_match(image) {
        return Err(staging_error(format!("invalid container image reference '{image}'")));
    }
    Ok(image)
}

/// Variables every job sees, in a stable order.
pub fn standard_env(job: &Job) -> Vec<(String, String)> {
    let vars = [
        ("JOB_UUID", job.uuid.clone()),
        ("JOB_NAME", job.name.clone()),
        ("JOB_TENANT", job.tenant.clone()),
        ("JOB_OWNER", job.owner.clone()),
        ("JOB_SYS_ID", job.exec_system_id.clone()),
        ("JOB_APP_ID", job.app.id.clone()),
        ("JOB_APP_VERSION", job.app.version.clone()),
        ("JOB_MAX_MINUTES", job.max_minutes.to_string()),
        ("JOB_INPUT_DIR", INPUT_MOUNT.to_string()),
        ("JOB_OUTPUT_DIR", OUTPUT_MOUNT.to_string()),
        ("JOB_EXEC_DIR", EXEC_MOUNT.to_string()),
    ];
    vars.into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// User variables, validated against the reserved prefix and shell naming rules.
pub fn user_env(job: &Job) -> AppResult<Vec<(String, String)>> {
    let mut out = Vec::with_capacity(job.parameters.env_variables.len());
    for var in &job.parameters.env_variables {
        let key = var.key.trim();
        if !ENV_NAME_RE.is_match(key) {
            return Err(staging_error(format!("invalid environment variable name '{key}'")));
        }
        if key.starts_with(RESERVED_ENV_PREFIX) {
            return Err(staging_error(format!(
                "environment variable '{key}' uses the reserved prefix {RESERVED_ENV_PREFIX}"
            )));
        }
        if var.value.contains('\n') {
            return Err(staging_error(format!(
                "environment variable '{key}' must not contain newlines"
            )));
        }
        out.push((key.to_string(), var.value.clone()));
    }
    Ok(out)
}

pub fn all_env(job: &Job) -> AppResult<Vec<(String, String)>> {
    let mut vars = standard_env(job);
    vars.extend(user_env(job)?);
    Ok(vars)
}

/// `KEY=value` lines as read by `docker run --env-file`.
pub fn env_file_contents(vars: &[(String, String)]) -> String {
    vars.iter()
        .map(|(key, value)| format!("{key}={value}\n"))
        .collect()
}

/// `export` lines for the wrapper; `prefix` is prepended to every name.
pub fn export_lines(prefix: &str, vars: &[(String, String)]) -> String {
    vars.iter()
        .map(|(key, value)| format!("export {prefix}{key}={}\n", sh_escape(value)))
        .collect()
}

pub fn app_args(job: &Job) -> String {
    join_escaped(&job.parameters.app_args)
}

pub fn script_header(shell: &str, job: &Job) -> String {
    format!("#!{shell}\n# job {} ({})\n", job.uuid, job.tenant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::sample_job;
    use crate::app::types::{EnvVariable, JobStatus, JobType, Runtime};

    fn job() -> Job {
        sample_job(JobType::Fork, Runtime::Docker, JobStatus::StagingJob)
    }

    #[test]
    fn mounts_map_directories_to_fixed_paths() {
        let mounts = standard_mounts(&job()).unwrap();
        assert_eq!(mounts[0].container, INPUT_MOUNT);
        assert_eq!(mounts[2].host, "/scratch/alice/job1");

        let mut bad = job();
        bad.output_dir = " ".into();
        assert!(standard_mounts(&bad).is_err());
        bad.output_dir = "relative/out".into();
        assert!(standard_mounts(&bad).is_err());
    }

    #[test]
    fn missing_or_malformed_image_aborts() {
        let mut j = job();
        assert_eq!(container_image(&j).unwrap(), "docker.io/library/busybox:1.36");
        j.app.container_image = Some("bad image; rm -rf /".into());
        assert!(container_image(&j).is_err());
        j.app.container_image = None;
        assert!(container_image(&j).is_err());
    }

    #[test]
    fn user_env_rejects_reserved_prefix_and_bad_names() {
        let mut j = job();
        j.parameters.env_variables = vec![EnvVariable {
            key: "OMP_NUM_THREADS".into(),
            value: "4".into(),
        }];
        assert_eq!(user_env(&j).unwrap(), vec![("OMP_NUM_THREADS".into(), "4".into())]);

        j.parameters.env_variables[0].key = "JOB_UUID".into();
        assert!(user_env(&j).is_err());
        j.parameters.env_variables[0].key = "1BAD".into();
        assert!(user_env(&j).is_err());
    }

    #[test]
    fn export_lines_quote_values() {
        let vars = vec![("A".to_string(), "x y".to_string())];
        assert_eq!(export_lines("", &vars), "export A='x y'\n");
        assert_eq!(export_lines("PRE_", &vars), "export PRE_A='x y'\n");
        assert_eq!(env_file_contents(&vars), "A=x y\n");
    }
}
