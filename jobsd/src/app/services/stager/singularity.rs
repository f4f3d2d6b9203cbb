// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::errors::AppResult;
use crate::app::services::context::ExecutionContext;
use crate::app::services::shell::sh_escape;
use crate::app::services::stager::script::{self, CID_FILE, EXIT_CODE_FILE, OUTPUT_FILE};
use crate::app::services::stager::singularity_options::SingularityRunOptions;
use crate::app::services::stager::{JobStager, StagedArtifacts, sbatch};

/// Singularity moves `SINGULARITYENV_X` into the container as `X`, also under
/// `--cleanenv` and `--containall`, which drop the rest of the host environment.
const CONTAINER_ENV_PREFIX: &str = "SINGULARITYENV_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingularityMode {
    /// `singularity run` inside a Slurm batch script.
    Slurm,
    /// Detached `singularity instance start`, named after the job.
    Instance,
    /// Foreground `singularity run` tracked by PID.
    Run,
}

pub struct SingularityStager {
    mode: SingularityMode,
}

impl SingularityStager {
    pub fn new(mode: SingularityMode) -> Self {
        Self { mode }
    }
}

/// Bare registry references are pulled from Docker Hub style registries.
fn image_uri(image: &str) -> String {
    if image.contains("://") || image.starts_with('/') || image.ends_with(".sif") {
        image.to_string()
    } else {
        format!("docker://{image}")
    }
}

impl JobStager for SingularityStager {
    fn build(&self, ctx: &ExecutionContext) -> AppResult<StagedArtifacts> {
        let job = ctx.job();
        let image = image_uri(script::container_image(job)?);
        let mounts = script::standard_mounts(job)?;
        let options = SingularityRunOptions::from_user_options(&job.parameters.container_args)?;
        let env = script::all_env(job)?;

        let mut out = match self.mode {
            SingularityMode::Slurm => {
                let mut header = script::script_header("/bin/bash", job);
                header.push_str(&sbatch::render_directives(
                    job,
                    &ctx.exec_path(OUTPUT_FILE),
                    &job.parameters.scheduler_options,
                )?);
                header
            }
            SingularityMode::Instance | SingularityMode::Run => {
                script::script_header("/bin/sh", job)
            }
        };
        out.push_str(&script::export_lines(CONTAINER_ENV_PREFIX, &env));
        out.push_str(&format!("cd {}\n", sh_escape(&job.exec_dir)));

        let mut cmd = match self.mode {
            SingularityMode::Instance => vec![
                "singularity instance start".to_string(),
                format!("--pid-file {}", sh_escape(&ctx.exec_path(CID_FILE))),
            ],
            SingularityMode::Slurm | SingularityMode::Run => vec!["singularity run".to_string()],
        };
        cmd.extend(options.to_args());
        cmd.extend(
            mounts
                .iter()
                .map(|m| format!("--bind {}", sh_escape(&format!("{}:{}", m.host, m.container)))),
        );
        cmd.push(sh_escape(&image));
        if self.mode == SingularityMode::Instance {
            cmd.push(sh_escape(&job.uuid));
        }
        let args = script::app_args(job);
        if !args.is_empty() {
            cmd.push(args);
        }
        out.push_str(&cmd.join(" \\\n  "));
        out.push('\n');

        if self.mode == SingularityMode::Run {
            out.push_str("rc=$?\n");
            out.push_str(&format!(
                "echo \"$rc\" > {}\n",
                sh_escape(&ctx.exec_path(EXIT_CODE_FILE))
            ));
            out.push_str("exit \"$rc\"\n");
        }

        Ok(StagedArtifacts {
            script: out,
            env_file: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::app::testing::{ScriptedRemote, sample_job, sample_system};
    use crate::app::types::{EnvVariable, JobStatus, JobType, Runtime};

    fn ctx(job_type: JobType) -> ExecutionContext {
        let mut job = sample_job(job_type, Runtime::Singularity, JobStatus::StagingJob);
        job.parameters.container_args = vec!["--nv".into()];
        ExecutionContext::new(job, sample_system(), Arc::new(ScriptedRemote::default()))
    }

    #[test]
    fn instance_script_names_instance_after_job() {
        let staged = SingularityStager::new(SingularityMode::Instance)
            .build(&ctx(JobType::Fork))
            .unwrap();
        let s = &staged.script;
        assert!(staged.env_file.is_none());
        assert!(s.contains(
            "export SINGULARITYENV_JOB_UUID='7c0e9b3a-1111-4c4c-9a9a-000000000001'\n"
        ));
        assert!(s.contains("singularity instance start"));
        assert!(s.contains("--pid-file '/scratch/alice/job1/jobrun.cid'"));
        assert!(s.contains("--nv"));
        assert!(s.contains(
            "'docker://docker.io/library/busybox:1.36' \\\n  '7c0e9b3a-1111-4c4c-9a9a-000000000001'"
        ));
    }

    #[test]
    fn slurm_script_uses_run_with_directives() {
        let staged = SingularityStager::new(SingularityMode::Slurm)
            .build(&ctx(JobType::Batch))
            .unwrap();
        assert!(staged.script.contains("#SBATCH --job-name=sleep_test\n"));
        assert!(staged.script.contains("singularity run"));
        assert!(staged.script.contains("--bind '/scratch/alice/job1/out:/JobOutputs'"));
    }

    #[test]
    fn clean_environment_still_receives_job_variables() {
        let mut job = sample_job(JobType::Batch, Runtime::Singularity, JobStatus::StagingJob);
        job.parameters.container_args = vec!["--cleanenv".into(), "--containall".into()];
        job.parameters.env_variables = vec![EnvVariable {
            key: "MODE".into(),
            value: "fast run".into(),
        }];
        let ctx = ExecutionContext::new(job, sample_system(), Arc::new(ScriptedRemote::default()));

        let staged = SingularityStager::new(SingularityMode::Slurm).build(&ctx).unwrap();
        let s = &staged.script;
        assert!(s.contains("--cleanenv"));
        assert!(s.contains("export SINGULARITYENV_JOB_OUTPUT_DIR='/JobOutputs'\n"));
        assert!(s.contains("export SINGULARITYENV_MODE='fast run'\n"));
        assert!(!s.contains("export JOB_"));
        let exports = s.find("export SINGULARITYENV_MODE").unwrap();
        assert!(exports < s.find("singularity run").unwrap());
    }

    #[test]
    fn image_uri_keeps_explicit_sources() {
        assert_eq!(image_uri("/images/app.sif"), "/images/app.sif");
        assert_eq!(image_uri("library://lolcow"), "library://lolcow");
        assert_eq!(image_uri("busybox:1.36"), "docker://busybox:1.36");
    }
}
