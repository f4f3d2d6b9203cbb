// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Resolves a job's runtime and scheduler combination to its stager and launcher.

use std::collections::HashMap;
use std::sync::Arc;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::services::launcher::{BatchLauncher, InstanceLauncher, JobLauncher, PidLauncher};
use crate::app::services::stager::{DockerStager, JobStager, SingularityMode, SingularityStager};
use crate::app::types::{ExecSystem, Job, JobType, Runtime, RuntimeOption, SchedulerType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuntimeKey {
    pub job_type: JobType,
    pub runtime: Runtime,
    pub option: Option<RuntimeOption>,
    pub scheduler: Option<SchedulerType>,
}

impl RuntimeKey {
    /// Batch jobs carry the system's scheduler; fork jobs never do.
    pub fn for_job(job: &Job, system: &ExecSystem) -> Self {
        let option = match job.app.runtime {
            Runtime::Docker => None,
            Runtime::Singularity => job.app.runtime_options.first().copied(),
        };
        let scheduler = match job.job_type {
            JobType::Fork => None,
            JobType::Batch => system.scheduler,
        };
        Self {
            job_type: job.job_type,
            runtime: job.app.runtime,
            option,
            scheduler,
        }
    }
}

/// Stager and launcher resolved for one job.
#[derive(Clone)]
pub struct RuntimeBinding {
    pub name: &'static str,
    pub stager: Arc<dyn JobStager>,
    pub launcher: Arc<dyn JobLauncher>,
}

pub struct RuntimeRegistry {
    bindings: HashMap<RuntimeKey, RuntimeBinding>,
}

impl Default for RuntimeRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl RuntimeRegistry {
    pub fn empty() -> Self {
        Self {
            bindings: HashMap::new(),
        }
    }

    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(
            RuntimeKey {
                job_type: JobType::Fork,
                runtime: Runtime::Docker,
                option: None,
                scheduler: None,
            },
            "docker-native",
            Arc::new(DockerStager::native()),
            Arc::new(PidLauncher),
        );
        registry.register(
            RuntimeKey {
                job_type: JobType::Batch,
                runtime: Runtime::Docker,
                option: None,
                scheduler: Some(SchedulerType::Slurm),
            },
            "docker-slurm",
            Arc::new(DockerStager::slurm()),
            Arc::new(BatchLauncher),
        );
        for option in [
            None,
            Some(RuntimeOption::SingularityRun),
            Some(RuntimeOption::SingularityStart),
        ] {
            registry.register(
                RuntimeKey {
                    job_type: JobType::Batch,
                    runtime: Runtime::Singularity,
                    option,
                    scheduler: Some(SchedulerType::Slurm),
                },
                "singularity-slurm",
                Arc::new(SingularityStager::new(SingularityMode::Slurm)),
                Arc::new(BatchLauncher),
            );
        }
        registry.register(
            RuntimeKey {
                job_type: JobType::Fork,
                runtime: Runtime::Singularity,
                option: Some(RuntimeOption::SingularityStart),
                scheduler: None,
            },
            "singularity-instance",
            Arc::new(SingularityStager::new(SingularityMode::Instance)),
            Arc::new(InstanceLauncher),
        );
        registry.register(
            RuntimeKey {
                job_type: JobType::Fork,
                runtime: Runtime::Singularity,
                option: Some(RuntimeOption::SingularityRun),
                scheduler: None,
            },
            "singularity-run",
            Arc::new(SingularityStager::new(SingularityMode::Run)),
            Arc::new(PidLauncher),
        );
        registry
    }

    pub fn register(
        &mut self,
        key: RuntimeKey,
        name: &'static str,
        stager: Arc<dyn JobStager>,
        launcher: Arc<dyn JobLauncher>,
    ) {
        self.bindings.insert(
            key,
            RuntimeBinding {
                name,
                stager,
                launcher,
            },
        );
    }

    pub fn resolve(&self, key: &RuntimeKey) -> AppResult<RuntimeBinding> {
        self.bindings.get(key).cloned().ok_or_else(|| {
            AppError::with_message(
                AppErrorKind::Unsupported,
                codes::UNSUPPORTED_CONFIGURATION,
                format!(
                    "unsupported configuration: job type {}, runtime {:?}, option {}, scheduler {}",
                    key.job_type.as_str(),
                    key.runtime,
                    key.option
                        .map(|o| format!("{o:?}"))
                        .unwrap_or_else(|| "none".to_string()),
                    key.scheduler.map(|s| s.as_str()).unwrap_or("none"),
                ),
            )
        })
    }

    pub fn resolve_job(&self, job: &Job, system: &ExecSystem) -> AppResult<RuntimeBinding> {
        self.resolve(&RuntimeKey::for_job(job, system))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::{sample_job, sample_system};
    use crate::app::types::JobStatus;

    fn binding(
        job_type: JobType,
        runtime: Runtime,
        option: Option<RuntimeOption>,
    ) -> AppResult<RuntimeBinding> {
        let mut job = sample_job(job_type, runtime, JobStatus::Pending);
        job.app.runtime_options = option.into_iter().collect();
        RuntimeRegistry::standard().resolve_job(&job, &sample_system())
    }

    #[test]
    fn supported_combinations_resolve() {
        let cases = [
            (JobType::Fork, Runtime::Docker, None, "docker-native", false),
            (JobType::Batch, Runtime::Docker, None, "docker-slurm", true),
            (JobType::Batch, Runtime::Singularity, None, "singularity-slurm", true),
            (
                JobType::Fork,
                Runtime::Singularity,
                Some(RuntimeOption::SingularityStart),
                "singularity-instance",
                false,
            ),
            (
                JobType::Fork,
                Runtime::Singularity,
                Some(RuntimeOption::SingularityRun),
                "singularity-run",
                false,
            ),
        ];
        for (job_type, runtime, option, name, scheduled) in cases {
            let b = binding(job_type, runtime, option).unwrap();
            assert_eq!(b.name, name);
            assert_eq!(b.launcher.scheduled(), scheduled, "{name}");
        }
    }

    #[test]
    fn unsupported_combinations_are_explicit_errors() {
        let err = binding(JobType::Fork, Runtime::Singularity, None).err().unwrap();
        assert_eq!(err.code(), codes::UNSUPPORTED_CONFIGURATION);
        assert_eq!(err.kind(), AppErrorKind::Unsupported);

        let mut system = sample_system();
        system.scheduler = None;
        let job = sample_job(JobType::Batch, Runtime::Docker, JobStatus::Pending);
        let err = RuntimeRegistry::standard()
            .resolve_job(&job, &system)
            .err()
            .unwrap();
        assert!(err.message().contains("scheduler none"), "{err}");
    }
}
