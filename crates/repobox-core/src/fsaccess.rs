//! Read-only filesystem access inside sandboxes.
//!
//! Both operations resolve the requested path lexically against the
//! sandbox workspace before anything is dispatched; a path that escapes
//! the workspace is rejected outright. Only inspection commands (`find`,
//! `stat`, `base64`) ever run — nothing here can mutate sandbox content.

use crate::error::Error;
use crate::registry::Registry;
use crate::runtime::{shell_quote, ExecOutput, ExecSpec, SandboxRuntime};
use crate::settings::Settings;
use crate::types::{DirEntry, EntryKind, FileContent};
use crate::Result;
use base64::Engine;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Deadline for the short inspection commands.
const FS_EXEC_TIMEOUT: Duration = Duration::from_secs(10);

/// Browse and read files inside a sandbox, constrained to its workspace.
pub struct FsAccessor {
    registry: Arc<Registry>,
    runtime: Arc<dyn SandboxRuntime>,
    settings: Arc<Settings>,
}

impl FsAccessor {
    pub fn new(
        registry: Arc<Registry>,
        runtime: Arc<dyn SandboxRuntime>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            registry,
            runtime,
            settings,
        }
    }

    /// List the entries of a directory, ordered by name.
    pub async fn browse(&self, id: &str, path: &str) -> Result<(String, Vec<DirEntry>)> {
        let record = self.registry.get(id)?;
        let resolved = resolve(&record.working_directory, path)?;
        debug!("Browsing {resolved} in {id}");

        let command = format!(
            "find {} -maxdepth 1 -mindepth 1 -printf '%y\\t%s\\t%f\\n'",
            shell_quote(&resolved)
        );
        let out = self.inspect_exec(&record.handle, command).await?;
        if out.exit_code != 0 {
            return Err(browse_failure(&resolved, &out.stderr));
        }

        let mut entries: Vec<DirEntry> = out
            .stdout
            .lines()
            .filter_map(parse_find_line)
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok((resolved, entries))
    }

    /// Read a regular file's bytes, enforcing the size ceiling.
    pub async fn read_file(&self, id: &str, file_path: &str) -> Result<FileContent> {
        let record = self.registry.get(id)?;
        let resolved = resolve(&record.working_directory, file_path)?;
        debug!("Reading {resolved} in {id}");

        let stat = self
            .inspect_exec(
                &record.handle,
                format!("stat -c '%F:%s' {}", shell_quote(&resolved)),
            )
            .await?;
        if stat.exit_code != 0 {
            return Err(Error::NotFound(format!("file {resolved}")));
        }
        let (file_type, size) = parse_stat(&stat.stdout).ok_or_else(|| {
            Error::Infrastructure(format!("unparsable stat output: {:?}", stat.stdout.trim()))
        })?;
        if !file_type.starts_with("regular") {
            return Err(Error::Validation(format!(
                "{resolved} is a {file_type}, not a regular file"
            )));
        }
        if size > self.settings.max_file_bytes {
            return Err(Error::SizeExceeded {
                size,
                limit: self.settings.max_file_bytes,
            });
        }

        // base64 keeps arbitrary bytes intact across the exec boundary
        let content = self
            .inspect_exec(
                &record.handle,
                format!("base64 -w0 {}", shell_quote(&resolved)),
            )
            .await?;
        if content.exit_code != 0 {
            return Err(Error::Infrastructure(format!(
                "failed to read {resolved}: {}",
                content.stderr.trim()
            )));
        }
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(content.stdout.trim())
            .map_err(|e| {
                Error::Infrastructure(format!("invalid content encoding from sandbox: {e}"))
            })?;

        Ok(FileContent {
            path: resolved,
            size,
            bytes,
        })
    }

    async fn inspect_exec(
        &self,
        handle: &crate::runtime::SandboxHandle,
        command: String,
    ) -> Result<ExecOutput> {
        let out = self
            .runtime
            .exec(
                handle,
                ExecSpec {
                    command,
                    working_dir: self.settings.workspace_dir.clone(),
                    timeout: FS_EXEC_TIMEOUT,
                },
            )
            .await?;
        if out.timed_out {
            return Err(Error::Timeout {
                seconds: FS_EXEC_TIMEOUT.as_secs(),
            });
        }
        Ok(out)
    }
}

/// Lexically resolve `requested` against the workspace root.
///
/// Relative paths are joined to the root; absolute paths must already
/// lie under it. `.` and `..` are normalized without touching the
/// sandbox, and any result outside the root is a traversal error.
fn resolve(root: &str, requested: &str) -> Result<String> {
    let root = root.trim_end_matches('/');
    let target = if requested.starts_with('/') {
        requested.to_string()
    } else {
        format!("{root}/{requested}")
    };

    let mut stack: Vec<&str> = Vec::new();
    for component in target.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if stack.pop().is_none() {
                    return Err(Error::PathTraversal(requested.to_string()));
                }
            }
            name => stack.push(name),
        }
    }

    let normalized = format!("/{}", stack.join("/"));
    if normalized == root || normalized.starts_with(&format!("{root}/")) {
        Ok(normalized)
    } else {
        Err(Error::PathTraversal(requested.to_string()))
    }
}

fn browse_failure(path: &str, stderr: &str) -> Error {
    if stderr.contains("No such file or directory") {
        Error::NotFound(format!("directory {path}"))
    } else {
        Error::Validation(format!("cannot browse {path}: {}", stderr.trim()))
    }
}

/// Parse one `find -printf '%y\t%s\t%f'` line.
fn parse_find_line(line: &str) -> Option<DirEntry> {
    let mut parts = line.splitn(3, '\t');
    let kind = EntryKind::from_find_type(parts.next()?.chars().next()?);
    let size: u64 = parts.next()?.parse().ok()?;
    let name = parts.next()?.to_string();
    Some(DirEntry {
        name,
        kind,
        size: (kind == EntryKind::File).then_some(size),
    })
}

/// Parse `stat -c '%F:%s'` output into (file type, size).
fn parse_stat(stdout: &str) -> Option<(String, u64)> {
    let trimmed = stdout.trim();
    let (file_type, size) = trimmed.rsplit_once(':')?;
    Some((file_type.to_string(), size.parse().ok()?))
}
