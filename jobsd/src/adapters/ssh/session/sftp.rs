// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use anyhow::{Context, Result, anyhow};
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::{FileAttributes, OpenFlags, StatusCode};
use tokio::io::AsyncWriteExt;

use super::SessionManager;

const DIR_MODE: u32 = 0o700;

/// Ancestor directories of `path`, outermost first, excluding `/` and the file itself.
fn parent_dirs(path: &str) -> Vec<String> {
    let absolute = path.starts_with('/');
    let segments: Vec<&str> = path
        .split('/')
        .filter(|seg| !seg.is_empty() && *seg != ".")
        .collect();
    let mut dirs = Vec::new();
    let mut cur = String::new();
    for seg in segments.iter().take(segments.len().saturating_sub(1)) {
        if absolute || !cur.is_empty() {
            cur.push('/');
        }
        cur.push_str(seg);
        dirs.push(cur.clone());
    }
    dirs
}

fn is_missing(err: &russh_sftp::client::error::Error) -> bool {
    matches!(
        err,
        russh_sftp::client::error::Error::Status(status)
            if status.status_code == StatusCode::NoSuchFile
    )
}

fn is_permission_denied(err: &russh_sftp::client::error::Error) -> bool {
    matches!(
        err,
        russh_sftp::client::error::Error::Status(status)
            if status.status_code == StatusCode::PermissionDenied
    )
}

impl SessionManager {
    async fn sftp(&self) -> Result<SftpSession> {
        let guard = self.handle.lock().await;
        let handle = guard
            .as_ref()
            .ok_or_else(|| anyhow!("SSH handle lost before opening SFTP"))?;
        let channel = handle.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        let sftp = SftpSession::new(channel.into_stream()).await?;
        Ok(sftp)
    }

    async fn ensure_remote_dirs(&self, sftp: &SftpSession, path: &str) -> Result<()> {
        for cur in parent_dirs(path) {
            match sftp.metadata(&cur).await {
                Ok(meta) if meta.is_dir() => {}
                Ok(_) => {
                    return Err(anyhow!(
                        "remote path exists but is not a directory: {cur}"
                    ));
                }
                Err(err) if is_missing(&err) => {
                    sftp.create_dir(&cur)
                        .await
                        .with_context(|| format!("creating directory {cur}"))?;
                    let attrs = FileAttributes {
                        permissions: Some(DIR_MODE),
                        ..Default::default()
                    };
                    if let Err(err) = sftp.set_metadata(&cur, attrs).await {
                        if is_permission_denied(&err) {
                            tracing::debug!("permission denied setting mode on {cur}: {err}");
                        } else {
                            tracing::warn!("error setting mode on {cur}: {err}");
                        }
                    }
                }
                // Unreadable ancestors (e.g. /home on some sites) are fine to skip.
                Err(err) if is_permission_denied(&err) => {}
                Err(err) => {
                    return Err(err).with_context(|| format!("stat {cur}"));
                }
            }
        }
        Ok(())
    }

    /// Write `content` to `remote_path`, replacing any previous file, and apply `mode`.
    pub async fn install_file(&self, remote_path: &str, content: &[u8], mode: u32) -> Result<()> {
        let sftp = self.sftp().await?;
        self.ensure_remote_dirs(&sftp, remote_path).await?;
        let flags = OpenFlags::WRITE
            .union(OpenFlags::CREATE)
            .union(OpenFlags::TRUNCATE);
        let attrs = FileAttributes {
            permissions: Some(mode),
            ..Default::default()
        };
        let mut file = sftp
            .open_with_flags_and_attributes(remote_path, flags, attrs.clone())
            .await
            .with_context(|| format!("open remote file {remote_path}"))?;
        file.write_all(content)
            .await
            .with_context(|| format!("write remote file {remote_path}"))?;
        file.flush().await?;
        file.shutdown().await?;
        // Open attributes only apply to new files; force the mode on replaced ones.
        sftp.set_metadata(remote_path, attrs)
            .await
            .with_context(|| format!("chmod {mode:o} {remote_path}"))?;
        let _ = sftp.close().await;
        Ok(())
    }
}
