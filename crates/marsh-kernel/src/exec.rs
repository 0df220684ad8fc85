//! External command execution and the host override hooks.
//!
//! The interpreter resolves a command name (special builtin → alias →
//! function → builtin → `$PATH`) and hands external commands to the
//! [`ExecHandler`]. File opens go through the [`OpenHandler`], every
//! command invocation can be observed through the [`CallHandler`], and
//! text that needs parsing at runtime (`source`, `eval`, `trap`,
//! aliases) goes to the [`ParseHandler`].

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;

use crate::ast::File;
use crate::io::FdFile;

/// Exit status meaning "command not found".
pub const STATUS_NOT_FOUND: u8 = 127;
/// Exit status meaning "found but not executable".
pub const STATUS_NOT_EXECUTABLE: u8 = 126;

/// Snapshot of the shell state a handler may observe.
pub struct HandlerContext {
    /// Exported environment, sorted by name.
    pub env: Vec<(String, String)>,
    /// Working directory (absolute).
    pub dir: PathBuf,
    pub stdin: FdFile,
    pub stdout: FdFile,
    pub stderr: FdFile,
}

/// What an exec handler did with the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    /// Command ran and exited with this status.
    Status(u8),
    /// The handler wants the whole shell to exit (an `exec`'d command
    /// replacing the shell).
    ExitRequested(u8),
}

/// Runs external commands. `path` is the resolved executable path; the
/// original command word stays in `argv[0]`.
#[async_trait]
pub trait ExecHandler: Send + Sync {
    async fn exec(
        &self,
        ctx: HandlerContext,
        path: &Path,
        argv: Vec<String>,
    ) -> Result<ExecOutcome, String>;
}

/// How a redirection wants its file opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub create: bool,
    pub truncate: bool,
    /// Creation mode before the umask is applied.
    pub mode: u32,
}

impl OpenFlags {
    pub fn read_only() -> Self {
        Self { read: true, write: false, append: false, create: false, truncate: false, mode: 0 }
    }

    pub fn write_only(append: bool) -> Self {
        Self { read: false, write: true, append, create: true, truncate: !append, mode: 0o666 }
    }

    pub fn read_write() -> Self {
        Self { read: true, write: true, append: false, create: true, truncate: false, mode: 0o666 }
    }
}

/// Opens files for redirections.
#[async_trait]
pub trait OpenHandler: Send + Sync {
    async fn open(&self, path: &Path, flags: OpenFlags) -> io::Result<FdFile>;
}

/// Observes (and may rewrite) every command invocation before
/// resolution. Useful for tracing and mocking.
#[async_trait]
pub trait CallHandler: Send + Sync {
    async fn call(&self, argv: Vec<String>) -> Vec<String>;
}

/// Parses shell text on behalf of `source`, `eval`, `trap`, and alias
/// expansion. The parser itself lives in the host.
pub trait ParseHandler: Send + Sync {
    fn parse(&self, src: &str, name: &str) -> Result<File, String>;
}

// --- Defaults ---

/// Default exec handler: spawn a real OS process and bridge the shell's
/// fd handles to its stdio.
pub struct OsExecHandler;

#[async_trait]
impl ExecHandler for OsExecHandler {
    async fn exec(
        &self,
        ctx: HandlerContext,
        path: &Path,
        argv: Vec<String>,
    ) -> Result<ExecOutcome, String> {
        let mut cmd = tokio::process::Command::new(path);
        if argv.len() > 1 {
            cmd.args(&argv[1..]);
        }
        cmd.env_clear()
            .envs(ctx.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&ctx.dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                let status = match err.kind() {
                    io::ErrorKind::NotFound => STATUS_NOT_FOUND,
                    io::ErrorKind::PermissionDenied => STATUS_NOT_EXECUTABLE,
                    _ => STATUS_NOT_EXECUTABLE,
                };
                let msg = format!("{}: {}\n", argv[0], err);
                let _ = ctx.stderr.write_all(msg.as_bytes()).await;
                return Ok(ExecOutcome::Status(status));
            }
        };

        // Bridge stdio concurrently; a stage ahead in the pipeline may
        // only finish once we stop reading.
        let stdin_task = child.stdin.take().map(|mut child_in| {
            let fd = ctx.stdin.clone();
            tokio::spawn(async move {
                let _ = fd.copy_to(&mut child_in).await;
            })
        });
        let stdout_task = child.stdout.take().map(|mut child_out| {
            let fd = ctx.stdout.clone();
            tokio::spawn(async move {
                let _ = fd.copy_from(&mut child_out).await;
            })
        });
        let stderr_task = child.stderr.take().map(|mut child_err| {
            let fd = ctx.stderr.clone();
            tokio::spawn(async move {
                let _ = fd.copy_from(&mut child_err).await;
            })
        });

        let status = child.wait().await.map_err(|e| e.to_string())?;
        // Let output copies drain before reporting the status.
        if let Some(t) = stdout_task {
            let _ = t.await;
        }
        if let Some(t) = stderr_task {
            let _ = t.await;
        }
        if let Some(t) = stdin_task {
            t.abort();
        }

        Ok(ExecOutcome::Status(exit_code(status)))
    }
}

fn exit_code(status: std::process::ExitStatus) -> u8 {
    if let Some(code) = status.code() {
        return (code & 0xff) as u8;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128u8.wrapping_add((sig & 0x7f) as u8);
        }
    }
    1
}

/// Default open handler: the real filesystem via tokio.
pub struct FsOpenHandler;

#[async_trait]
impl OpenHandler for FsOpenHandler {
    async fn open(&self, path: &Path, flags: OpenFlags) -> io::Result<FdFile> {
        let mut opts = tokio::fs::OpenOptions::new();
        opts.read(flags.read)
            .write(flags.write)
            .append(flags.append)
            .create(flags.create)
            .truncate(flags.truncate);
        #[cfg(unix)]
        if flags.create {
            opts.mode(flags.mode);
        }
        let file = opts.open(path).await?;
        Ok(if flags.write && !flags.read {
            FdFile::writer(file)
        } else {
            FdFile::reader(file)
        })
    }
}

// --- $PATH lookup ---

/// Locate `name` the way the shell does: slash-bearing names resolve
/// against `dir` as-is; bare names search each `$PATH` entry (an empty
/// entry means the working directory). No `$PATH` means no lookup.
pub fn lookup_path(dir: &Path, path_var: Option<&str>, name: &str) -> Option<PathBuf> {
    if name.contains('/') {
        let candidate = if name.starts_with('/') {
            PathBuf::from(name)
        } else {
            dir.join(name)
        };
        return Some(candidate);
    }
    let path_var = path_var?;
    for entry in path_var.split(':') {
        let base = if entry.is_empty() { dir.to_path_buf() } else { PathBuf::from(entry) };
        let candidate = if base.is_absolute() { base.join(name) } else { dir.join(base).join(name) };
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Executable-file check used by `$PATH` search and `type`/`command -v`.
pub fn is_executable(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    true
}
