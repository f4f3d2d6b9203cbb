// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::errors::AppResult;
use crate::app::services::context::ExecutionContext;
use crate::app::services::shell::sh_escape;
use crate::app::services::stager::docker_options::DockerRunOptions;
use crate::app::services::stager::script::{self, CID_FILE, ENV_FILE, EXIT_CODE_FILE, OUTPUT_FILE};
use crate::app::services::stager::{JobStager, StagedArtifacts, sbatch};

/// Docker either run directly on the host or submitted through Slurm.
pub struct DockerStager {
    scheduled: bool,
}

impl DockerStager {
    pub fn native() -> Self {
        Self { scheduled: false }
    }

    pub fn slurm() -> Self {
        Self { scheduled: true }
    }
}

impl JobStager for DockerStager {
    fn build(&self, ctx: &ExecutionContext) -> AppResult<StagedArtifacts> {
        let job = ctx.job();
        let image = script::container_image(job)?;
        let mounts = script::standard_mounts(job)?;
        let options = DockerRunOptions::from_user_options(&job.parameters.container_args)?;
        let env = script::all_env(job)?;

        let mut out = if self.scheduled {
            let mut header = script::script_header("/bin/bash", job);
            header.push_str(&sbatch::render_directives(
                job,
                &ctx.exec_path(OUTPUT_FILE),
                &job.parameters.scheduler_options,
            )?);
            header
        } else {
            script::script_header("/bin/sh", job)
        };

        let cid_path = ctx.exec_path(CID_FILE);
        out.push_str(&format!("cd {}\n", sh_escape(&job.exec_dir)));
        out.push_str(&format!("rm -f {}\n", sh_escape(&cid_path)));

        let mut run = vec![
            "docker run --rm".to_string(),
            format!("--name {}", sh_escape(&job.uuid)),
            "--user \"$(id -u):$(id -g)\"".to_string(),
            format!("--cidfile {}", sh_escape(&cid_path)),
            format!("--env-file {}", sh_escape(&ctx.exec_path(ENV_FILE))),
        ];
        run.extend(
            mounts
                .iter()
                .map(|m| format!("-v {}", sh_escape(&format!("{}:{}", m.host, m.container)))),
        );
        run.extend(options.to_args());
        run.push(sh_escape(image));
        let args = script::app_args(job);
        if !args.is_empty() {
            run.push(args);
        }
        out.push_str(&run.join(" \\\n  "));
        out.push('\n');

        if !self.scheduled {
            out.push_str("rc=$?\n");
            out.push_str(&format!(
                "echo \"$rc\" > {}\n",
                sh_escape(&ctx.exec_path(EXIT_CODE_FILE))
            ));
            out.push_str("exit \"$rc\"\n");
        }

        Ok(StagedArtifacts {
            script: out,
            env_file: Some(script::env_file_contents(&env)),
        })
    }
}
