//! alias, unalias, command, type, trap, builtin, times, umask.

use std::sync::Arc;

use crate::error::RunError;
use crate::exec::{is_executable, lookup_path};
use crate::interp::{Interp, Trap};
use crate::vars::SetMode;

/// Words the parser treats as reserved; `type` reports them.
const KEYWORDS: &[&str] = &[
    "if", "then", "elif", "else", "fi", "for", "while", "until", "do", "done", "case", "esac",
    "in", "function", "time", "{", "}", "!", "[[", "]]",
];

/// Always-single-quoted form used when printing alias definitions.
fn sq(s: &str) -> String {
    let mut out = String::from("'");
    for c in s.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}

pub(crate) async fn alias(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    if args.is_empty() || args == ["-p"] {
        let mut pairs: Vec<_> = interp.aliases.iter().collect();
        pairs.sort();
        let mut out = String::new();
        for (name, value) in pairs {
            out.push_str(&format!("alias {}={}\n", name, sq(value)));
        }
        interp.write_stdout(&out).await;
        return Ok(0);
    }
    let mut status = 0u8;
    for arg in args {
        if arg == "-p" {
            continue;
        }
        match arg.split_once('=') {
            Some((name, value)) => {
                interp.aliases.insert(name.to_string(), value.to_string());
            }
            None => match interp.aliases.get(arg.as_str()) {
                Some(value) => {
                    let line = format!("alias {}={}\n", arg, sq(value));
                    interp.write_stdout(&line).await;
                }
                None => {
                    interp.stderr_line(&format!("alias: {}: not found", arg)).await;
                    status = 1;
                }
            },
        }
    }
    Ok(status)
}

pub(crate) async fn unalias(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    if args.iter().any(|a| a == "-a") {
        interp.aliases.clear();
        return Ok(0);
    }
    let mut status = 0u8;
    for arg in args {
        if interp.aliases.remove(arg.as_str()).is_none() {
            interp.stderr_line(&format!("unalias: {}: not found", arg)).await;
            status = 1;
        }
    }
    Ok(status)
}

// --- command / type ---

/// Classification of a command name, in resolution order.
enum Resolution {
    Alias(String),
    Keyword,
    Function,
    Builtin,
    File(std::path::PathBuf),
}

fn classify(interp: &Interp, name: &str) -> Option<Resolution> {
    if let Some(text) = interp.aliases.get(name) {
        return Some(Resolution::Alias(text.clone()));
    }
    if KEYWORDS.contains(&name) {
        return Some(Resolution::Keyword);
    }
    if interp.funcs.contains_key(name) {
        return Some(Resolution::Function);
    }
    if crate::builtins::is_builtin(name) {
        return Some(Resolution::Builtin);
    }
    let path_var = interp.env.get_str("PATH");
    let found = lookup_path(&interp.cwd, path_var.as_deref(), name)?;
    is_executable(&found).then_some(Resolution::File(found))
}

pub(crate) async fn command(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    let mut verify = false;
    let mut verbose = false;
    let mut default_path = false;
    let mut idx = 0;
    while let Some(arg) = args.get(idx) {
        match arg.as_str() {
            "-v" => verify = true,
            "-V" => verbose = true,
            "-p" => default_path = true,
            "--" => {
                idx += 1;
                break;
            }
            _ => break,
        }
        idx += 1;
    }
    let rest = &args[idx..];
    let Some(name) = rest.first() else {
        return Ok(super::usage(interp, "command", "[-pVv] command [arg ...]").await);
    };

    if verify || verbose {
        let mut status = 0u8;
        for name in rest {
            match classify(interp, name) {
                Some(res) => {
                    let line = if verbose {
                        match res {
                            Resolution::Alias(text) => {
                                format!("{} is aliased to `{}'\n", name, text)
                            }
                            Resolution::Keyword => format!("{} is a shell keyword\n", name),
                            Resolution::Function => format!("{} is a function\n", name),
                            Resolution::Builtin => format!("{} is a shell builtin\n", name),
                            Resolution::File(path) => {
                                format!("{} is {}\n", name, path.display())
                            }
                        }
                    } else {
                        match res {
                            Resolution::Alias(text) => format!("alias {}={}\n", name, sq(&text)),
                            Resolution::File(path) => format!("{}\n", path.display()),
                            _ => format!("{}\n", name),
                        }
                    };
                    interp.write_stdout(&line).await;
                }
                None => status = 1,
            }
        }
        return Ok(status);
    }

    // Run, bypassing functions.
    let saved_path = default_path.then(|| interp.env.get_str("PATH"));
    if default_path {
        let _ = interp
            .env
            .set_scalar("PATH", "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin", SetMode::Auto);
    }
    let status = if crate::builtins::is_builtin(name) {
        Box::pin(crate::builtins::run(interp, &name.clone(), &rest[1..])).await?
    } else {
        interp.run_external(rest.to_vec()).await?;
        interp.last_status
    };
    if let Some(saved) = saved_path {
        match saved {
            Some(p) => {
                let _ = interp.env.set_scalar("PATH", p, SetMode::Auto);
            }
            None => {
                let _ = interp.env.unset("PATH");
            }
        }
    }
    Ok(status)
}

pub(crate) async fn type_cmd(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    let mut short = false;
    let mut path_only = false;
    let mut all = false;
    let mut idx = 0;
    while let Some(arg) = args.get(idx) {
        match arg.as_str() {
            "-t" => short = true,
            "-p" => path_only = true,
            "-a" => all = true,
            "--" => {
                idx += 1;
                break;
            }
            _ => break,
        }
        idx += 1;
    }
    let names = &args[idx..];
    if names.is_empty() {
        return Ok(super::usage(interp, "type", "[-tap] name [name ...]").await);
    }

    let mut status = 0u8;
    for name in names {
        let mut resolutions: Vec<Resolution> = Vec::new();
        match classify(interp, name) {
            Some(res) => resolutions.push(res),
            None => {
                if !short {
                    interp.stderr_line(&format!("type: {}: not found", name)).await;
                }
                status = 1;
                continue;
            }
        }
        if all {
            // Also every PATH hit, behind whatever shadowed it.
            if !matches!(resolutions[0], Resolution::File(_)) {
                let path_var = interp.env.get_str("PATH");
                if let Some(found) = lookup_path(&interp.cwd, path_var.as_deref(), name) {
                    if is_executable(&found) {
                        resolutions.push(Resolution::File(found));
                    }
                }
            }
        }
        for res in resolutions {
            let line = if short {
                match res {
                    Resolution::Alias(_) => "alias\n".to_string(),
                    Resolution::Keyword => "keyword\n".to_string(),
                    Resolution::Function => "function\n".to_string(),
                    Resolution::Builtin => "builtin\n".to_string(),
                    Resolution::File(_) => "file\n".to_string(),
                }
            } else if path_only {
                match res {
                    Resolution::File(path) => format!("{}\n", path.display()),
                    _ => continue,
                }
            } else {
                match res {
                    Resolution::Alias(text) => format!("{} is aliased to `{}'\n", name, text),
                    Resolution::Keyword => format!("{} is a shell keyword\n", name),
                    Resolution::Function => format!("{} is a function\n", name),
                    Resolution::Builtin => format!("{} is a shell builtin\n", name),
                    Resolution::File(path) => format!("{} is {}\n", name, path.display()),
                }
            };
            interp.write_stdout(&line).await;
        }
    }
    Ok(status)
}

// --- trap ---

/// Accepted trap names, after normalization.
const SIGNALS: &[&str] = &[
    "EXIT", "ERR", "DEBUG", "HUP", "INT", "QUIT", "ABRT", "KILL", "ALRM", "TERM", "USR1", "USR2",
    "PIPE", "CHLD", "CONT", "STOP", "TSTP", "WINCH",
];

fn normalize_signal(name: &str) -> Option<String> {
    let upper = name.to_uppercase();
    let upper = upper.strip_prefix("SIG").unwrap_or(&upper).to_string();
    if SIGNALS.contains(&upper.as_str()) {
        return Some(upper);
    }
    match name {
        "0" => Some("EXIT".to_string()),
        "1" => Some("HUP".to_string()),
        "2" => Some("INT".to_string()),
        "3" => Some("QUIT".to_string()),
        "13" => Some("PIPE".to_string()),
        "14" => Some("ALRM".to_string()),
        "15" => Some("TERM".to_string()),
        _ => None,
    }
}

pub(crate) async fn trap(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    let args: Vec<&String> = args.iter().filter(|a| a.as_str() != "--").collect();
    if args.is_empty() || args[0] == "-p" {
        let mut entries: Vec<_> = interp.traps.iter().collect();
        entries.sort_by_key(|(name, _)| name.to_string());
        let mut out = String::new();
        for (name, trap) in entries {
            out.push_str(&format!("trap -- {} {}\n", sq(&trap.text), name));
        }
        interp.write_stdout(&out).await;
        return Ok(0);
    }

    let action = args[0].as_str();
    let signals = &args[1..];

    // `trap INT` resets that signal.
    if signals.is_empty() {
        match normalize_signal(action) {
            Some(sig) => {
                interp.trap_set(&sig, None);
                return Ok(0);
            }
            None => {
                return Ok(super::usage(interp, "trap", "[-lp] [action signal ...]").await);
            }
        }
    }

    let mut status = 0u8;
    for raw in signals {
        let Some(sig) = normalize_signal(raw) else {
            interp
                .stderr_line(&format!("trap: {}: invalid signal specification", raw))
                .await;
            status = 1;
            continue;
        };
        if action == "-" {
            interp.trap_set(&sig, None);
            continue;
        }
        if action.is_empty() {
            interp.trap_set(&sig, Some(Trap { text: String::new(), ast: None }));
            continue;
        }
        let Some(parser) = interp.handlers.parse.clone() else {
            interp.stderr_line("trap: no parser installed").await;
            return Ok(2);
        };
        match parser.parse(action, "trap") {
            Ok(file) => {
                interp.trap_set(
                    &sig,
                    Some(Trap { text: action.to_string(), ast: Some(Arc::new(file)) }),
                );
            }
            Err(err) => {
                interp.stderr_line(&format!("trap: {}", err)).await;
                status = 1;
            }
        }
    }
    Ok(status)
}

// --- builtin / times / umask ---

pub(crate) async fn builtin_cmd(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    let Some(name) = args.first() else {
        return Ok(0);
    };
    if !crate::builtins::is_builtin(name) {
        interp
            .stderr_line(&format!("builtin: {}: not a shell builtin", name))
            .await;
        return Ok(1);
    }
    Box::pin(crate::builtins::run(interp, &name.clone(), &args[1..])).await
}

pub(crate) async fn times(interp: &mut Interp, _args: &[String]) -> Result<u8, RunError> {
    let (self_u, self_s) = rusage(false);
    let (child_u, child_s) = rusage(true);
    let report = format!(
        "{} {}\n{} {}\n",
        fmt_times(self_u),
        fmt_times(self_s),
        fmt_times(child_u),
        fmt_times(child_s),
    );
    interp.write_stdout(&report).await;
    Ok(0)
}

fn fmt_times(secs: f64) -> String {
    let minutes = (secs / 60.0) as u64;
    format!("{}m{:.3}s", minutes, secs - minutes as f64 * 60.0)
}

fn rusage(children: bool) -> (f64, f64) {
    #[cfg(unix)]
    unsafe {
        let who = if children { libc::RUSAGE_CHILDREN } else { libc::RUSAGE_SELF };
        let mut usage: libc::rusage = std::mem::zeroed();
        if libc::getrusage(who, &mut usage) == 0 {
            return (
                usage.ru_utime.tv_sec as f64 + usage.ru_utime.tv_usec as f64 / 1e6,
                usage.ru_stime.tv_sec as f64 + usage.ru_stime.tv_usec as f64 / 1e6,
            );
        }
    }
    #[cfg(not(unix))]
    let _ = children;
    (0.0, 0.0)
}

pub(crate) async fn umask(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    let symbolic = args.first().map(|a| a == "-S").unwrap_or(false);
    let value = if symbolic { args.get(1) } else { args.first() };

    match value {
        None => {
            if symbolic {
                let mode = !interp.umask & 0o777;
                let part = |shift: u32| {
                    let bits = (mode >> shift) & 0o7;
                    let mut s = String::new();
                    if bits & 0o4 != 0 {
                        s.push('r');
                    }
                    if bits & 0o2 != 0 {
                        s.push('w');
                    }
                    if bits & 0o1 != 0 {
                        s.push('x');
                    }
                    s
                };
                let line = format!("u={},g={},o={}\n", part(6), part(3), part(0));
                interp.write_stdout(&line).await;
            } else {
                let line = format!("{:04o}\n", interp.umask);
                interp.write_stdout(&line).await;
            }
            Ok(0)
        }
        Some(arg) => match u32::from_str_radix(arg, 8) {
            Ok(mask) if mask <= 0o777 => {
                interp.umask = mask;
                Ok(0)
            }
            _ => {
                interp
                    .stderr_line(&format!("umask: {}: octal number out of range", arg))
                    .await;
                Ok(1)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_quoting() {
        assert_eq!(sq("ls -l"), "'ls -l'");
        assert_eq!(sq("it's"), "'it'\\''s'");
        assert_eq!(sq(""), "''");
    }

    #[test]
    fn signal_normalization() {
        assert_eq!(normalize_signal("EXIT").as_deref(), Some("EXIT"));
        assert_eq!(normalize_signal("sigint").as_deref(), Some("INT"));
        assert_eq!(normalize_signal("term").as_deref(), Some("TERM"));
        assert_eq!(normalize_signal("0").as_deref(), Some("EXIT"));
        assert_eq!(normalize_signal("2").as_deref(), Some("INT"));
        assert_eq!(normalize_signal("nope"), None);
    }

    #[test]
    fn times_format() {
        assert_eq!(fmt_times(0.0), "0m0.000s");
        assert_eq!(fmt_times(61.5), "1m1.500s");
    }
}
