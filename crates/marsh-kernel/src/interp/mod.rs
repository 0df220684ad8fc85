//! Interpreter state and the statement evaluator.
//!
//! [`Interp`] is the whole of one shell's mutable state. Subshells are
//! `clone()`s of it: every container is either owned (copied) or an
//! `Arc` handle whose sharing matches what a forked shell would share
//! (open files, the job table, the host handlers).

mod eval;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::ast::{File, Stmt};
use crate::error::RunError;
use crate::exec::{
    CallHandler, ExecHandler, FsOpenHandler, OpenFlags, OpenHandler, OsExecHandler, ParseHandler,
};
use crate::expand::ExpandError;
use crate::io::{FdFile, FdMap, MemWriter};
use crate::options::Options;
use crate::scheduler::{JobId, JobManager, SharedJobs};
use crate::vars::{Env, SetMode, Value};

/// Control-flow outcomes a statement can raise. `exit` is tracked as
/// interpreter state instead, so it unwinds through everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Normal,
    /// `break N` — consumed by the Nth enclosing loop.
    Break(u32),
    /// `continue N`.
    Continue(u32),
    /// `return` — consumed by the enclosing function or sourced script.
    Return,
}

/// One installed trap.
#[derive(Debug, Clone)]
pub struct Trap {
    pub text: String,
    pub ast: Option<Arc<File>>,
}

/// The host hooks, shared by every subshell copy.
#[derive(Clone)]
pub struct Handlers {
    pub exec: Arc<dyn ExecHandler>,
    pub open: Arc<dyn OpenHandler>,
    pub call: Option<Arc<dyn CallHandler>>,
    pub parse: Option<Arc<dyn ParseHandler>>,
}

impl Default for Handlers {
    fn default() -> Self {
        Self {
            exec: Arc::new(OsExecHandler),
            open: Arc::new(FsOpenHandler),
            call: None,
            parse: None,
        }
    }
}

impl std::fmt::Debug for Handlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handlers")
            .field("call", &self.call.is_some())
            .field("parse", &self.parse.is_some())
            .finish()
    }
}

/// Interpreter state for one logical shell.
#[derive(Debug, Clone)]
pub struct Interp {
    pub env: Env,
    pub opts: Options,
    /// Working directory: always absolute, lexically cleaned, tracked
    /// independently of the process cwd.
    pub cwd: PathBuf,
    pub fds: FdMap,
    pub last_status: u8,
    /// Status of the most recent command substitution in the current
    /// command's expansions (the status of a bare `a=$(cmd)`).
    pub(crate) last_cmdsub_status: u8,
    /// Line of the statement being evaluated (`$LINENO`).
    pub line: u32,
    pub exited: bool,
    pub funcs: HashMap<String, Arc<Stmt>>,
    pub aliases: HashMap<String, String>,
    pub(crate) traps: HashMap<String, Trap>,
    /// `pushd` stack, most recent first; `$DIRSTACK[0]` is the cwd and
    /// lives implicitly in `cwd`.
    pub(crate) dirstack: Vec<PathBuf>,
    pub(crate) jobs: SharedJobs,
    pub(crate) last_bg: Option<JobId>,
    pub(crate) handlers: Handlers,
    pub(crate) cancel: CancellationToken,
    rng: u32,
    pid: u32,
    pub(crate) umask: u32,
    /// Live process-substitution pipes by virtual path.
    pub(crate) proc_subst: HashMap<String, FdFile>,
    pub(crate) proc_counter: u32,
    /// Depth of condition contexts (if/while conditions, `&&`/`||`
    /// left sides, `!`): suppresses errexit and the ERR trap.
    pub(crate) no_errexit: u32,
    pub(crate) loop_depth: u32,
    pub(crate) func_depth: u32,
    pub(crate) source_depth: u32,
    pub(crate) in_trap: bool,
    pub(crate) exit_trap_fired: bool,
    /// Flow raised by a builtin (`break`/`continue`/`return`), consumed
    /// by the statement that ran the command.
    pub(crate) pending_flow: Option<Flow>,
    /// Set by `exec` with no command words: its redirections outlive the
    /// statement.
    pub(crate) keep_redirs: bool,
    /// `getopts` scan position: (OPTIND it belongs to, char offset
    /// within the current option word).
    pub(crate) getopts_state: (i64, usize),
}

impl Interp {
    pub(crate) fn new(handlers: Handlers, cancel: CancellationToken, cwd: PathBuf) -> Self {
        let pid = std::process::id();
        Self {
            env: Env::new(),
            opts: Options::default(),
            cwd,
            fds: FdMap::new(),
            last_status: 0,
            last_cmdsub_status: 0,
            line: 1,
            exited: false,
            funcs: HashMap::new(),
            aliases: HashMap::new(),
            traps: HashMap::new(),
            dirstack: Vec::new(),
            jobs: Arc::new(JobManager::new()),
            last_bg: None,
            handlers,
            cancel,
            rng: pid.wrapping_mul(2654435761).wrapping_add(1) | 1,
            pid,
            umask: 0o022,
            proc_subst: HashMap::new(),
            proc_counter: 0,
            no_errexit: 0,
            loop_depth: 0,
            func_depth: 0,
            source_depth: 0,
            in_trap: false,
            exit_trap_fired: false,
            pending_flow: None,
            keep_redirs: false,
            getopts_state: (1, 0),
        }
    }

    // --- Accessors used by the expansion engine ---

    pub fn script_name(&self) -> &str {
        &self.env.script_name
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn last_bg_job(&self) -> Option<JobId> {
        self.last_bg
    }

    /// `$RANDOM`: xorshift over 32 bits, folded to 0..=32767.
    pub fn random_next(&mut self) -> u16 {
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.rng = x;
        (x & 0x7fff) as u16
    }

    /// Assigning to `RANDOM` reseeds the generator.
    pub(crate) fn reseed_random(&mut self, seed: &str) {
        let n: u32 = seed.parse().unwrap_or(0);
        self.rng = n.wrapping_mul(2654435761).wrapping_add(12345) | 1;
    }

    /// Store `BASH_REMATCH` after a successful `=~`.
    pub fn set_rematch(&mut self, groups: Vec<String>) {
        let _ = self.env.set_value("BASH_REMATCH", Value::indexed_from(groups), SetMode::Global);
    }

    /// Arithmetic over raw text, as expansion and subscripts need it.
    pub fn eval_arith_text(&mut self, expr: &str) -> Result<i64, ExpandError> {
        let nounset = self.opts.nounset;
        crate::arith::eval_arith(expr, &mut self.env, nounset)
            .map_err(|e| ExpandError::msg(e.to_string()))
    }

    // --- Output helpers ---

    pub async fn write_stdout(&mut self, text: &str) -> bool {
        match self.fds.stdout().write_all(text.as_bytes()).await {
            Ok(()) => true,
            Err(_) => false,
        }
    }

    pub async fn write_stderr(&mut self, text: &str) {
        let _ = self.fds.stderr().write_all(text.as_bytes()).await;
    }

    /// One diagnostic line on stderr, shell-prefixed.
    pub async fn stderr_line(&mut self, msg: &str) {
        let text = format!("marsh: {}\n", msg);
        let _ = self.fds.stderr().write_all(text.as_bytes()).await;
    }

    // --- Subshell plumbing ---

    /// The logical fork: a deep copy of this shell's state. Traps reset
    /// to their defaults, as they do in a real subshell, and transient
    /// per-command state never crosses over.
    pub(crate) fn subshell_clone(&self) -> Interp {
        let mut child = self.clone();
        child.traps.clear();
        child.exit_trap_fired = false;
        child.pending_flow = None;
        child.keep_redirs = false;
        child
    }

    /// Run statements in a subshell with stdout captured: the engine of
    /// `$(...)`.
    pub async fn capture_stmts(&mut self, stmts: &[Stmt]) -> Result<String, ExpandError> {
        let capture = MemWriter::new();
        let mut child = self.subshell_clone();
        child.fds.set(1, FdFile::writer(capture.clone()));
        match child.run_stmts_boxed(stmts.to_vec()).await {
            Ok(_) => {}
            Err(RunError::Cancelled) => return Err(ExpandError::Run(RunError::Cancelled)),
            Err(other) => return Err(ExpandError::Run(other)),
        }
        self.last_cmdsub_status = child.last_status;
        self.last_bg = child.last_bg;
        Ok(capture.text())
    }

    /// Start `<(...)` / `>(...)`: the command runs concurrently, and the
    /// returned virtual path names the connected pipe end.
    pub async fn start_proc_subst(
        &mut self,
        write: bool,
        stmts: &[Stmt],
    ) -> Result<String, ExpandError> {
        let (pipe_w, pipe_r) = crate::scheduler::pipe_default();
        self.proc_counter += 1;
        let path = format!("/dev/fd/{}", 62 + self.proc_counter);

        let mut child = self.subshell_clone();
        let fd_for_consumer = if write {
            // `>(cmd)`: the consumer writes into the pipe; the command
            // reads its stdin from it.
            child.fds.set(0, FdFile::reader(pipe_r));
            FdFile::writer(pipe_w)
        } else {
            // `<(cmd)`: the command writes the pipe; the consumer reads.
            child.fds.set(1, FdFile::writer(pipe_w));
            FdFile::reader(pipe_r)
        };
        let stmts = stmts.to_vec();
        tokio::spawn(async move {
            let _ = child.run_stmts_boxed(stmts).await;
        });
        self.proc_subst.insert(path.clone(), fd_for_consumer);
        Ok(path)
    }

    async fn run_stmts_boxed(&mut self, stmts: Vec<Stmt>) -> Result<Flow, RunError> {
        self.run_stmts(&stmts).await
    }

    // --- Files ---

    /// Resolve a path against the shell's cwd, lexically.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let raw = if path.starts_with('/') {
            PathBuf::from(path)
        } else {
            self.cwd.join(path)
        };
        normalize_path(&raw)
    }

    /// Open a file for a redirection, honoring process-substitution
    /// paths and `/dev/null` before consulting the open handler.
    pub async fn open_file(&mut self, path: &str, flags: OpenFlags) -> std::io::Result<FdFile> {
        if let Some(fd) = self.proc_subst.remove(path) {
            return Ok(fd);
        }
        if path == "/dev/null" {
            return Ok(FdFile::Null);
        }
        let mut flags = flags;
        if flags.create {
            flags.mode &= !self.umask;
        }
        let resolved = self.resolve_path(path);
        self.handlers.open.clone().open(&resolved, flags).await
    }

    // --- Traps ---

    pub(crate) fn trap_set(&mut self, name: &str, trap: Option<Trap>) {
        match trap {
            Some(t) => {
                self.traps.insert(name.to_string(), t);
            }
            None => {
                self.traps.remove(name);
            }
        }
    }

    /// Run a trap's command list; the trap's own status does not leak
    /// into `$?` except through what it runs.
    pub(crate) async fn fire_trap(&mut self, name: &str) {
        if self.in_trap {
            return;
        }
        let Some(trap) = self.traps.get(name).cloned() else {
            return;
        };
        let Some(ast) = trap.ast else {
            return;
        };
        self.in_trap = true;
        let saved_status = self.last_status;
        let _ = self.run_stmts_boxed(ast.stmts.clone()).await;
        if name == "ERR" || name == "DEBUG" {
            self.last_status = saved_status;
        }
        self.in_trap = false;
    }

    /// EXIT trap: fires exactly once per runner lifetime.
    pub(crate) async fn fire_exit_trap(&mut self) {
        if self.exit_trap_fired {
            return;
        }
        self.exit_trap_fired = true;
        // A second `exit` inside the trap must not recurse.
        let was_exited = self.exited;
        self.exited = false;
        self.fire_trap("EXIT").await;
        self.exited = was_exited;
    }

    // --- Cwd ---

    /// Change directory bookkeeping shared by `cd`/`pushd`/`popd`:
    /// validates the target, updates `$PWD`/`$OLDPWD`.
    pub(crate) fn chdir(&mut self, target: PathBuf) -> Result<(), String> {
        let meta = std::fs::metadata(&target).map_err(|e| e.to_string())?;
        if !meta.is_dir() {
            return Err("not a directory".to_string());
        }
        let old = self.cwd.clone();
        self.cwd = normalize_path(&target);
        let _ = self.env.set_scalar("OLDPWD", old.display().to_string(), SetMode::Global);
        let _ = self.env.set_scalar("PWD", self.cwd.display().to_string(), SetMode::Global);
        Ok(())
    }
}

/// Resolve `.` and `..` lexically; symlinks are preserved.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut parts: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = parts.last() {
                    parts.pop();
                } else if parts.is_empty() {
                    parts.push(Component::RootDir);
                }
            }
            _ => parts.push(component),
        }
    }
    if parts.is_empty() {
        PathBuf::from("/")
    } else {
        parts.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interp() -> Interp {
        Interp::new(Handlers::default(), CancellationToken::new(), PathBuf::from("/tmp"))
    }

    #[test]
    fn normalize_cleans_dots() {
        assert_eq!(normalize_path(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
        assert_eq!(normalize_path(Path::new("/../x")), PathBuf::from("/x"));
        assert_eq!(normalize_path(Path::new("/a/..")), PathBuf::from("/"));
    }

    #[test]
    fn resolve_is_cwd_relative() {
        let i = interp();
        assert_eq!(i.resolve_path("x/y"), PathBuf::from("/tmp/x/y"));
        assert_eq!(i.resolve_path("/abs"), PathBuf::from("/abs"));
        assert_eq!(i.resolve_path("../up"), PathBuf::from("/up"));
    }

    #[test]
    fn random_is_bounded_and_reseedable() {
        let mut i = interp();
        for _ in 0..100 {
            assert!(i.random_next() < 32768);
        }
        i.reseed_random("42");
        let a = i.random_next();
        i.reseed_random("42");
        let b = i.random_next();
        assert_eq!(a, b);
    }

    #[test]
    fn subshell_clone_is_independent() {
        let mut parent = interp();
        parent.env.set_scalar("X", "1", SetMode::Auto).unwrap();
        parent.trap_set("EXIT", Some(Trap { text: "echo".into(), ast: None }));
        let mut child = parent.subshell_clone();
        child.env.set_scalar("X", "2", SetMode::Auto).unwrap();
        child.cwd = PathBuf::from("/elsewhere");
        child.last_status = 9;
        assert_eq!(parent.env.get_str("X").as_deref(), Some("1"));
        assert_eq!(parent.cwd, PathBuf::from("/tmp"));
        assert_eq!(parent.last_status, 0);
        // Traps reset in the copy but survive in the parent.
        assert!(child.traps.is_empty());
        assert!(!parent.traps.is_empty());
    }

    #[tokio::test]
    async fn chdir_rejects_missing_dir() {
        let mut i = interp();
        assert!(i.chdir(PathBuf::from("/definitely/not/here")).is_err());
        assert_eq!(i.cwd, PathBuf::from("/tmp"));
    }

    #[tokio::test]
    async fn chdir_updates_pwd_vars() {
        let mut i = interp();
        i.chdir(PathBuf::from("/")).unwrap();
        assert_eq!(i.env.get_str("PWD").as_deref(), Some("/"));
        assert_eq!(i.env.get_str("OLDPWD").as_deref(), Some("/tmp"));
    }
}
