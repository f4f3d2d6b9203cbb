// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Fakes and fixtures shared by the service and usecase tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::app::errors::{AppError, AppResult};
use crate::app::ports::{ClockPort, ExecCapture, RemoteExecPort};
use crate::app::types::{
    AppSpec, EnvVariable, ExecSystem, Job, JobParameters, JobStatus, JobType, NewJob, NewSystem,
    Runtime, SchedulerType, SshConfig,
};

#[derive(Clone)]
pub enum Reply {
    Capture(ExecCapture),
    Error(AppError),
}

pub fn ok(stdout: &str) -> Reply {
    Reply::Capture(ExecCapture {
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
        exit_code: 0,
    })
}

pub fn exit(code: i32, stdout: &str, stderr: &str) -> Reply {
    Reply::Capture(ExecCapture {
        stdout: stdout.as_bytes().to_vec(),
        stderr: stderr.as_bytes().to_vec(),
        exit_code: code,
    })
}

/// Remote executor answering commands by substring match.
/// The last queued reply of a rule repeats once the others are consumed.
#[derive(Default)]
pub struct ScriptedRemote {
    rules: Mutex<Vec<(String, VecDeque<Reply>)>>,
    pub commands: Mutex<Vec<String>>,
    pub installed: Mutex<Vec<(String, String, u32)>>,
    pub removed_sessions: Mutex<Vec<String>>,
}

impl ScriptedRemote {
    pub fn on(&self, needle: &str, reply: Reply) -> &Self {
        let mut rules = self.rules.lock().unwrap();
        match rules.iter_mut().find(|(n, _)| n == needle) {
            Some((_, replies)) => replies.push_back(reply),
            None => rules.push((needle.to_string(), VecDeque::from([reply]))),
        }
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn installed_file(&self, suffix: &str) -> Option<String> {
        self.installed
            .lock()
            .unwrap()
            .iter()
            .find(|(path, _, _)| path.ends_with(suffix))
            .map(|(_, content, _)| content.clone())
    }
}

#[async_trait]
impl RemoteExecPort for ScriptedRemote {
    async fn exec_capture(&self, _config: &SshConfig, command: &str) -> AppResult<ExecCapture> {
        self.commands.lock().unwrap().push(command.to_string());
        let mut rules = self.rules.lock().unwrap();
        let reply = rules
            .iter_mut()
            .find(|(needle, _)| command.contains(needle.as_str()))
            .map(|(_, replies)| {
                if replies.len() > 1 {
                    replies.pop_front().unwrap()
                } else {
                    replies.front().cloned().unwrap()
                }
            });
        match reply {
            Some(Reply::Capture(capture)) => Ok(capture),
            Some(Reply::Error(err)) => Err(err),
            None => Ok(ExecCapture::default()),
        }
    }

    async fn install_file(
        &self,
        _config: &SshConfig,
        remote_path: &str,
        content: &[u8],
        mode: u32,
    ) -> AppResult<()> {
        self.installed.lock().unwrap().push((
            remote_path.to_string(),
            String::from_utf8_lossy(content).into_owned(),
            mode,
        ));
        Ok(())
    }

    async fn needs_connect(&self, _config: &SshConfig) -> AppResult<bool> {
        Ok(false)
    }

    async fn remove_session(&self, session_name: &str) -> AppResult<bool> {
        self.removed_sessions
            .lock()
            .unwrap()
            .push(session_name.to_string());
        Ok(true)
    }
}

pub fn sample_system() -> ExecSystem {
    ExecSystem {
        tenant: "dev".into(),
        id: "hpc1".into(),
        host: "login.hpc1.example.org".into(),
        port: 22,
        effective_user: "alice".into(),
        identity_path: None,
        enabled: true,
        scheduler: Some(SchedulerType::Slurm),
        max_jobs_per_user: Some(4),
        created_at: "2026-01-01T00:00:00Z".into(),
        updated_at: "2026-01-01T00:00:00Z".into(),
    }
}

pub fn sample_job(job_type: JobType, runtime: Runtime, status: JobStatus) -> Job {
    Job {
        id: 1,
        tenant: "dev".into(),
        uuid: "7c0e9b3a-1111-4c4c-9a9a-000000000001".into(),
        name: "sleep test".into(),
        owner: "alice".into(),
        status,
        job_type,
        max_minutes: 60,
        exec_system_id: "hpc1".into(),
        exec_dir: "/scratch/alice/job1".into(),
        input_dir: "/scratch/alice/job1/in".into(),
        output_dir: "/scratch/alice/job1/out".into(),
        app: AppSpec {
            id: "sleeper".into(),
            version: "1.0".into(),
            runtime,
            runtime_options: Vec::new(),
            container_image: Some("docker.io/library/busybox:1.36".into()),
        },
        parameters: JobParameters::default(),
        remote_job_id: None,
        remote_checks_success: 0,
        remote_checks_failed: 0,
        last_message: None,
        cancel_requested: false,
        created_at: "2026-01-01T00:00:00Z".into(),
        updated_at: "2026-01-01T00:00:00Z".into(),
    }
}

/// Store payload for system `id` of tenant "dev".
pub fn new_system(id: &str) -> NewSystem {
    NewSystem {
        tenant: "dev".into(),
        id: id.into(),
        host: format!("login.{id}.example.org"),
        port: 22,
        effective_user: "alice".into(),
        identity_path: Some("/home/alice/.ssh/id_ed25519".into()),
        enabled: true,
        scheduler: Some(SchedulerType::Slurm),
        max_jobs_per_user: Some(2),
    }
}

/// Store payload for a job on system "hpc1" owned by alice.
pub fn new_job(uuid: &str, job_type: JobType, runtime: Runtime) -> NewJob {
    NewJob {
        tenant: "dev".into(),
        uuid: uuid.into(),
        name: "sleeper".into(),
        owner: "alice".into(),
        job_type,
        max_minutes: 10,
        exec_system_id: "hpc1".into(),
        exec_dir: format!("/scratch/alice/{uuid}"),
        input_dir: format!("/scratch/alice/{uuid}/in"),
        output_dir: format!("/scratch/alice/{uuid}/out"),
        app: AppSpec {
            id: "sleeper".into(),
            version: "1.0".into(),
            runtime,
            runtime_options: Vec::new(),
            container_image: Some("docker.io/library/busybox:1.36".into()),
        },
        parameters: JobParameters {
            app_args: vec!["sleep".into(), "5".into()],
            env_variables: vec![EnvVariable {
                key: "GREETING".into(),
                value: "hi".into(),
            }],
            ..Default::default()
        },
    }
}

/// Wall clock that follows tokio's (possibly paused) timer.
pub struct PausedClock {
    base: OffsetDateTime,
    start: tokio::time::Instant,
}

impl PausedClock {
    pub fn new() -> Self {
        Self {
            base: OffsetDateTime::now_utc(),
            start: tokio::time::Instant::now(),
        }
    }
}

impl ClockPort for PausedClock {
    fn now_utc(&self) -> OffsetDateTime {
        self.base + self.start.elapsed()
    }
}
