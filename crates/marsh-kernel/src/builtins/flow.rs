//! Flow builtins: exit, return, break, continue, shift, eval, source,
//! exec, wait.

use crate::error::RunError;
use crate::interp::{Flow, Interp};
use crate::vars::FrameKind;

pub(crate) async fn exit(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    let status = match args.first() {
        Some(arg) => match arg.parse::<i64>() {
            // `exit N` truncates modulo 256.
            Ok(n) => (n.rem_euclid(256)) as u8,
            Err(_) => {
                interp
                    .stderr_line(&format!("exit: {}: numeric argument required", arg))
                    .await;
                2
            }
        },
        None => interp.last_status,
    };
    interp.last_status = status;
    interp.fire_exit_trap().await;
    interp.last_status = status;
    interp.exited = true;
    Ok(status)
}

pub(crate) async fn return_cmd(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    if interp.func_depth == 0 && interp.source_depth == 0 {
        interp
            .stderr_line("return: can only be used in a function or sourced script")
            .await;
        return Ok(1);
    }
    let status = match args.first() {
        Some(arg) => match arg.parse::<i64>() {
            Ok(n) => n.rem_euclid(256) as u8,
            Err(_) => {
                interp
                    .stderr_line(&format!("return: {}: numeric argument required", arg))
                    .await;
                return Ok(2);
            }
        },
        None => interp.last_status,
    };
    interp.pending_flow = Some(Flow::Return);
    Ok(status)
}

pub(crate) async fn break_cmd(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    level_flow(interp, args, "break", Flow::Break).await
}

pub(crate) async fn continue_cmd(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    level_flow(interp, args, "continue", Flow::Continue).await
}

async fn level_flow(
    interp: &mut Interp,
    args: &[String],
    name: &str,
    make: fn(u32) -> Flow,
) -> Result<u8, RunError> {
    if interp.loop_depth == 0 {
        interp
            .stderr_line(&format!("{}: only meaningful in a loop", name))
            .await;
        return Ok(1);
    }
    let level = match args.first() {
        Some(arg) => match arg.parse::<u32>() {
            Ok(n) if n >= 1 => n,
            _ => {
                interp
                    .stderr_line(&format!("{}: {}: loop count out of range", name, arg))
                    .await;
                return Ok(1);
            }
        },
        None => 1,
    };
    interp.pending_flow = Some(make(level));
    Ok(0)
}

pub(crate) async fn shift(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    let n = match args.first() {
        Some(arg) => match arg.parse::<i64>() {
            Ok(n) if n >= 0 => n as usize,
            _ => {
                interp
                    .stderr_line(&format!("shift: {}: shift count out of range", arg))
                    .await;
                return Ok(1);
            }
        },
        None => 1,
    };
    Ok(if interp.env.shift(n) { 0 } else { 1 })
}

pub(crate) async fn eval(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    let src = args.join(" ");
    if src.trim().is_empty() {
        return Ok(0);
    }
    let Some(parser) = interp.handlers.parse.clone() else {
        interp.stderr_line("eval: no parser installed").await;
        return Ok(2);
    };
    let file = match parser.parse(&src, "eval") {
        Ok(file) => file,
        Err(err) => {
            interp.stderr_line(&format!("eval: {}", err)).await;
            return Ok(2);
        }
    };
    let flow = interp.run_stmts(&file.stmts).await?;
    if flow != Flow::Normal {
        interp.pending_flow = Some(flow);
    }
    Ok(interp.last_status)
}

pub(crate) async fn source(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    let Some(target) = args.first() else {
        return Ok(super::usage(interp, "source", "filename [arguments]").await);
    };
    let Some(parser) = interp.handlers.parse.clone() else {
        interp.stderr_line("source: no parser installed").await;
        return Ok(2);
    };

    let path = resolve_script(interp, target);
    let text = match tokio::fs::read_to_string(&path).await {
        Ok(text) => text,
        Err(e) => {
            interp
                .stderr_line(&format!("source: {}: {}", target, e))
                .await;
            return Ok(1);
        }
    };
    let file = match parser.parse(&text, target) {
        Ok(file) => file,
        Err(err) => {
            interp.stderr_line(&format!("source: {}: {}", target, err)).await;
            return Ok(1);
        }
    };

    // Extra arguments override the positional parameters for the
    // sourced script only.
    let positional = if args.len() > 1 { Some(args[1..].to_vec()) } else { None };
    interp.env.push_frame(FrameKind::Source, positional, interp.opts);
    interp.source_depth += 1;
    let result = interp.run_stmts(&file.stmts).await;
    interp.source_depth -= 1;
    interp.env.pop_frame();
    let flow = result?;
    // `return` stops the sourced script; anything else keeps going up.
    if flow != Flow::Normal && flow != Flow::Return {
        interp.pending_flow = Some(flow);
    }
    Ok(interp.last_status)
}

/// `source name` searches `$PATH` for a readable file, then the cwd.
fn resolve_script(interp: &Interp, name: &str) -> std::path::PathBuf {
    if name.contains('/') {
        return interp.resolve_path(name);
    }
    if let Some(path_var) = interp.env.get_str("PATH") {
        for entry in path_var.split(':') {
            if entry.is_empty() {
                continue;
            }
            let candidate = std::path::Path::new(entry).join(name);
            if candidate.is_file() {
                return candidate;
            }
        }
    }
    interp.resolve_path(name)
}

pub(crate) async fn exec(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    if args.is_empty() {
        // Bare `exec`: its redirections become permanent.
        interp.keep_redirs = true;
        return Ok(0);
    }
    interp.run_external(args.to_vec()).await?;
    // The external command replaced the shell; its status is final.
    let status = interp.last_status;
    interp.fire_exit_trap().await;
    interp.last_status = status;
    interp.exited = true;
    Ok(status)
}

pub(crate) async fn wait(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    if args.is_empty() {
        interp.jobs.wait_all().await;
        return Ok(0);
    }
    let mut status = 0u8;
    for arg in args {
        let Ok(id) = arg.parse::<u64>() else {
            interp
                .stderr_line(&format!("wait: {}: not a valid job id", arg))
                .await;
            status = 2;
            continue;
        };
        match interp.jobs.wait(id).await {
            Some(s) => status = s,
            None => {
                interp
                    .stderr_line(&format!("wait: {}: not a child of this shell", id))
                    .await;
                status = 127;
            }
        }
    }
    Ok(status)
}
