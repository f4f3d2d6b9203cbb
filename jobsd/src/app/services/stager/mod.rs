// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod docker;
pub mod docker_options;
pub mod options;
pub mod sbatch;
pub mod script;
pub mod singularity;
pub mod singularity_options;

use crate::app::errors::AppResult;
use crate::app::services::context::ExecutionContext;

pub use docker::DockerStager;
pub use options::OptionError;
pub use singularity::{SingularityMode, SingularityStager};

const SCRIPT_MODE: u32 = 0o700;
const ENV_FILE_MODE: u32 = 0o600;

/// Remote artifacts produced for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedArtifacts {
    pub script: String,
    pub env_file: Option<String>,
}

/// Builds the wrapper script (and env file, when the runtime takes one) for a job.
pub trait JobStager: Send + Sync {
    fn build(&self, ctx: &ExecutionContext) -> AppResult<StagedArtifacts>;
}

/// Build everything first, then install; a build error leaves nothing on the host.
pub async fn stage_job(
    stager: &dyn JobStager,
    ctx: &ExecutionContext,
) -> AppResult<StagedArtifacts> {
    let artifacts = stager.build(ctx)?;
    if let Some(env_file) = &artifacts.env_file {
        ctx.install_exec_file(env_file, script::ENV_FILE, ENV_FILE_MODE)
            .await?;
    }
    let path = ctx
        .install_exec_file(&artifacts.script, script::SCRIPT_FILE, SCRIPT_MODE)
        .await?;
    tracing::info!(job = %ctx.job().uuid, "installed wrapper script {path}");
    Ok(artifacts)
}
