//! Directory builtins: cd, pwd, pushd, popd, dirs.
//!
//! The shell's cwd is a lexically-clean absolute string kept apart from
//! the process cwd, so `-L` (the default) is just string math and `-P`
//! asks the filesystem to resolve symlinks.

use std::path::PathBuf;

use crate::error::RunError;
use crate::interp::Interp;
use crate::vars::{SetMode, Value};

pub(crate) async fn cd(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    let mut physical = false;
    let mut dir: Option<&str> = None;
    for arg in args {
        match arg.as_str() {
            "-P" => physical = true,
            "-L" => physical = false,
            "--" => {}
            other => {
                if dir.is_some() {
                    return Ok(super::usage(interp, "cd", "[-L|-P] [dir]").await);
                }
                dir = Some(other);
            }
        }
    }

    let (target, announce) = match dir {
        None => match interp.env.get_str("HOME") {
            Some(home) => (home, false),
            None => {
                interp.stderr_line("cd: HOME not set").await;
                return Ok(1);
            }
        },
        Some("-") => match interp.env.get_str("OLDPWD") {
            Some(old) => (old, true),
            None => {
                interp.stderr_line("cd: OLDPWD not set").await;
                return Ok(1);
            }
        },
        Some(path) => (path.to_string(), false),
    };

    let mut resolved = interp.resolve_path(&target);
    if physical {
        match std::fs::canonicalize(&resolved) {
            Ok(real) => resolved = real,
            Err(e) => {
                interp.stderr_line(&format!("cd: {}: {}", target, e)).await;
                return Ok(1);
            }
        }
    }
    if let Err(e) = interp.chdir(resolved) {
        interp.stderr_line(&format!("cd: {}: {}", target, e)).await;
        return Ok(1);
    }
    if announce {
        let cwd = interp.cwd.display().to_string();
        interp.write_stdout(&format!("{}\n", cwd)).await;
    }
    Ok(0)
}

pub(crate) async fn pwd(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    let mut physical = false;
    for arg in args {
        match arg.as_str() {
            "-P" => physical = true,
            "-L" => physical = false,
            _ => return Ok(super::usage(interp, "pwd", "[-L|-P]").await),
        }
    }
    let shown = if physical {
        std::fs::canonicalize(&interp.cwd).unwrap_or_else(|_| interp.cwd.clone())
    } else {
        interp.cwd.clone()
    };
    interp.write_stdout(&format!("{}\n", shown.display())).await;
    Ok(0)
}

pub(crate) async fn pushd(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    match args.first().map(|s| s.as_str()) {
        Some(dir) => {
            let old = interp.cwd.clone();
            let resolved = interp.resolve_path(dir);
            if let Err(e) = interp.chdir(resolved) {
                interp.stderr_line(&format!("pushd: {}: {}", dir, e)).await;
                return Ok(1);
            }
            interp.dirstack.insert(0, old);
        }
        None => {
            // Swap the top two entries.
            if interp.dirstack.is_empty() {
                interp.stderr_line("pushd: no other directory").await;
                return Ok(1);
            }
            let top = interp.dirstack.remove(0);
            let old = interp.cwd.clone();
            if let Err(e) = interp.chdir(top.clone()) {
                interp.dirstack.insert(0, top);
                interp.stderr_line(&format!("pushd: {}", e)).await;
                return Ok(1);
            }
            interp.dirstack.insert(0, old);
        }
    }
    sync_dirstack(interp);
    print_stack(interp).await;
    Ok(0)
}

pub(crate) async fn popd(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    if !args.is_empty() {
        return Ok(super::usage(interp, "popd", "").await);
    }
    if interp.dirstack.is_empty() {
        interp.stderr_line("popd: directory stack empty").await;
        return Ok(1);
    }
    let target = interp.dirstack.remove(0);
    if let Err(e) = interp.chdir(target.clone()) {
        interp.dirstack.insert(0, target);
        interp.stderr_line(&format!("popd: {}", e)).await;
        return Ok(1);
    }
    sync_dirstack(interp);
    print_stack(interp).await;
    Ok(0)
}

pub(crate) async fn dirs_cmd(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    let clear = args.iter().any(|a| a == "-c");
    if clear {
        interp.dirstack.clear();
        sync_dirstack(interp);
        return Ok(0);
    }
    print_stack(interp).await;
    Ok(0)
}

async fn print_stack(interp: &mut Interp) {
    let mut parts = vec![interp.cwd.display().to_string()];
    parts.extend(interp.dirstack.iter().map(|p| p.display().to_string()));
    let line = format!("{}\n", parts.join(" "));
    interp.write_stdout(&line).await;
}

/// Keep `$DIRSTACK` in step: element 0 is the cwd.
fn sync_dirstack(interp: &mut Interp) {
    let items: Vec<String> = std::iter::once(interp.cwd.display().to_string())
        .chain(interp.dirstack.iter().map(|p: &PathBuf| p.display().to_string()))
        .collect();
    let _ = interp
        .env
        .set_value("DIRSTACK", Value::indexed_from(items), SetMode::Global);
}
