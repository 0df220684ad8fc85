//! The public entry point: configure a [`Runner`], feed it AST nodes.
//!
//! One `run` call executes one script. A non-zero outcome is reported
//! as [`RunError::ExitStatus`]; `Ok(())` always means status 0.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::ast::File;
use crate::error::RunError;
use crate::exec::{CallHandler, ExecHandler, OpenHandler, ParseHandler};
use crate::interp::{Handlers, Interp};
use crate::io::FdFile;
use crate::vars::{Env, SetMode};

/// Version string surfaced as `$BASH_VERSION` for scripts that sniff it.
const COMPAT_VERSION: &str = "5.2.15(1)-release";

/// Construction-time settings, builder style.
#[derive(Default)]
pub struct RunnerConfig {
    env: Vec<String>,
    dir: Option<PathBuf>,
    stdin: Option<FdFile>,
    stdout: Option<FdFile>,
    stderr: Option<FdFile>,
    params: Vec<String>,
    handlers: HandlerOverrides,
    cancel: Option<CancellationToken>,
}

#[derive(Default)]
struct HandlerOverrides {
    exec: Option<Arc<dyn ExecHandler>>,
    open: Option<Arc<dyn OpenHandler>>,
    call: Option<Arc<dyn CallHandler>>,
    parse: Option<Arc<dyn ParseHandler>>,
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial environment, as `NAME=value` strings. All are exported.
    pub fn env(mut self, vars: impl IntoIterator<Item = String>) -> Self {
        self.env.extend(vars);
        self
    }

    /// Initial working directory; must exist.
    pub fn dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.dir = Some(path.into());
        self
    }

    /// Default streams for fds 0, 1, 2.
    pub fn stdio(mut self, stdin: FdFile, stdout: FdFile, stderr: FdFile) -> Self {
        self.stdin = Some(stdin);
        self.stdout = Some(stdout);
        self.stderr = Some(stderr);
        self
    }

    /// Initial positional parameters. Leading `-x`-style flags before
    /// `--` set shell options instead.
    pub fn params(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.params.extend(args);
        self
    }

    pub fn exec_handler(mut self, handler: Arc<dyn ExecHandler>) -> Self {
        self.handlers.exec = Some(handler);
        self
    }

    pub fn open_handler(mut self, handler: Arc<dyn OpenHandler>) -> Self {
        self.handlers.open = Some(handler);
        self
    }

    pub fn call_handler(mut self, handler: Arc<dyn CallHandler>) -> Self {
        self.handlers.call = Some(handler);
        self
    }

    pub fn parse_handler(mut self, handler: Arc<dyn ParseHandler>) -> Self {
        self.handlers.parse = Some(handler);
        self
    }

    /// External cancellation signal; checked at statement boundaries
    /// and suspension points.
    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// An embeddable shell.
pub struct Runner {
    interp: Interp,
    config: RunnerConfig,
}

impl Runner {
    /// Validate the configuration and build a runner.
    pub fn new(config: RunnerConfig) -> Result<Self, RunError> {
        let interp = build_interp(&config)?;
        Ok(Self { interp, config })
    }

    /// Execute a file node as one script. Returns `Ok(())` for final
    /// status 0; `Err(ExitStatus)` when the script called `exit` (any
    /// status), errexit fired, or it ended non-zero.
    pub async fn run(&mut self, file: &File) -> Result<(), RunError> {
        let result = self.interp.run_file(file).await;
        match result {
            Ok(()) => {}
            Err(RunError::Cancelled) => {
                self.interp.jobs.abort_all();
                self.interp.fire_exit_trap().await;
                return Err(RunError::Cancelled);
            }
            Err(other) => return Err(other),
        }
        let exited = self.interp.exited;
        let status = self.interp.last_status;
        self.interp.fire_exit_trap().await;
        self.interp.last_status = status;
        if exited {
            return Err(RunError::ExitStatus(status));
        }
        if status != 0 {
            return Err(RunError::ExitStatus(status));
        }
        Ok(())
    }

    /// Restore post-construction state, re-applying the configuration.
    pub fn reset(&mut self) -> Result<(), RunError> {
        self.interp = build_interp(&self.config)?;
        Ok(())
    }

    /// An independent runner seeded with a snapshot of this one's
    /// state: subshell semantics for embedders.
    pub fn subshell(&self) -> Runner {
        Runner {
            interp: self.interp.clone(),
            config: RunnerConfig {
                env: self.config.env.clone(),
                dir: self.config.dir.clone(),
                stdin: self.config.stdin.clone(),
                stdout: self.config.stdout.clone(),
                stderr: self.config.stderr.clone(),
                params: self.config.params.clone(),
                handlers: HandlerOverrides {
                    exec: self.config.handlers.exec.clone(),
                    open: self.config.handlers.open.clone(),
                    call: self.config.handlers.call.clone(),
                    parse: self.config.handlers.parse.clone(),
                },
                cancel: self.config.cancel.clone(),
            },
        }
    }

    /// Whether the script asked the shell to stop.
    pub fn exited(&self) -> bool {
        self.interp.exited
    }

    /// The last command's exit status (`$?`).
    pub fn last_status(&self) -> u8 {
        self.interp.last_status
    }

    /// Read access to the variable store.
    pub fn vars(&self) -> &Env {
        &self.interp.env
    }

    /// Scalar value of one variable.
    pub fn var(&self, name: &str) -> Option<String> {
        self.interp.env.get_str(name)
    }

    /// The shell's working directory.
    pub fn dir(&self) -> &std::path::Path {
        &self.interp.cwd
    }

    /// Replace one open fd (embedders swapping stdin between runs).
    pub fn set_fd(&mut self, fd: u32, file: FdFile) {
        self.interp.fds.set(fd, file);
    }
}

fn build_interp(config: &RunnerConfig) -> Result<Interp, RunError> {
    let dir = match &config.dir {
        Some(dir) => {
            let meta = std::fs::metadata(dir)
                .map_err(|e| RunError::Handler(format!("dir {}: {}", dir.display(), e)))?;
            if !meta.is_dir() {
                return Err(RunError::Handler(format!(
                    "dir {}: not a directory",
                    dir.display()
                )));
            }
            let abs = if dir.is_absolute() {
                dir.clone()
            } else {
                std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")).join(dir)
            };
            crate::interp::normalize_path(&abs)
        }
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
    };

    let mut handlers = Handlers::default();
    if let Some(h) = &config.handlers.exec {
        handlers.exec = h.clone();
    }
    if let Some(h) = &config.handlers.open {
        handlers.open = h.clone();
    }
    handlers.call = config.handlers.call.clone();
    handlers.parse = config.handlers.parse.clone();

    let cancel = config.cancel.clone().unwrap_or_default();
    let mut interp = Interp::new(handlers, cancel, dir.clone());

    // Seed the environment: every configured pair is exported.
    for pair in &config.env {
        let (name, value) = match pair.split_once('=') {
            Some((n, v)) => (n, v),
            None => (pair.as_str(), ""),
        };
        if name.is_empty() {
            continue;
        }
        let _ = interp.env.set_scalar(name, value, SetMode::Global);
        let _ = interp.env.with_flags(name, |f| f.exported = true);
    }

    // Shell-managed variables, unless the embedder provided them.
    if interp.env.get_str("IFS").is_none() {
        let _ = interp.env.set_scalar("IFS", " \t\n", SetMode::Global);
    }
    let _ = interp.env.set_scalar("PWD", dir.display().to_string(), SetMode::Global);
    let _ = interp.env.with_flags("PWD", |f| f.exported = true);
    let _ = interp.env.set_scalar("OPTIND", "1", SetMode::Global);
    let _ = interp.env.set_scalar("BASH_VERSION", COMPAT_VERSION, SetMode::Global);
    #[cfg(unix)]
    {
        let uid = unsafe { libc::getuid() };
        let gid = unsafe { libc::getgid() };
        let _ = interp.env.set_scalar("UID", uid.to_string(), SetMode::Global);
        let _ = interp.env.set_scalar("GID", gid.to_string(), SetMode::Global);
    }

    // Positional parameters; leading option flags apply to the shell.
    let mut params: Vec<String> = Vec::new();
    let mut iter = config.params.iter().peekable();
    while let Some(arg) = iter.peek() {
        if arg.as_str() == "--" {
            iter.next();
            break;
        }
        let Some(rest) = arg.strip_prefix('-') else { break };
        if rest.is_empty() || !rest.chars().all(|c| "eufxa".contains(c)) {
            break;
        }
        for c in rest.chars() {
            if let Some(slot) = interp.opts.by_letter(c) {
                *slot = true;
            }
        }
        iter.next();
    }
    params.extend(iter.cloned());
    interp.env.set_positional(params);

    // Default stdio.
    interp.fds.set(
        0,
        config.stdin.clone().unwrap_or_else(|| FdFile::reader(tokio::io::stdin())),
    );
    interp.fds.set(
        1,
        config.stdout.clone().unwrap_or_else(|| FdFile::writer(tokio::io::stdout())),
    );
    interp.fds.set(
        2,
        config.stderr.clone().unwrap_or_else(|| FdFile::writer(tokio::io::stderr())),
    );

    Ok(interp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_dir_is_rejected() {
        let config = RunnerConfig::new().dir("/definitely/not/a/dir");
        assert!(Runner::new(config).is_err());
    }

    #[test]
    fn env_pairs_are_exported() {
        let config = RunnerConfig::new().env(vec!["FOO=bar".to_string()]).dir("/");
        let runner = Runner::new(config).unwrap();
        assert_eq!(runner.var("FOO").as_deref(), Some("bar"));
        assert!(runner.vars().iter_exported().iter().any(|(n, _)| n == "FOO"));
    }

    #[test]
    fn params_with_option_flags() {
        let config = RunnerConfig::new()
            .dir("/")
            .params(vec!["-e".to_string(), "--".to_string(), "a".to_string(), "b".to_string()]);
        let runner = Runner::new(config).unwrap();
        assert_eq!(runner.vars().positional(), ["a", "b"]);
    }

    #[test]
    fn defaults_are_seeded() {
        let runner = Runner::new(RunnerConfig::new().dir("/")).unwrap();
        assert_eq!(runner.var("IFS").as_deref(), Some(" \t\n"));
        assert_eq!(runner.var("PWD").as_deref(), Some("/"));
        assert!(runner.var("BASH_VERSION").is_some());
        assert!(!runner.exited());
    }
}
