//! Variable-facing builtins: set, shopt, unset, export, readonly,
//! declare/typeset, local, getopts.

use crate::ast::Word;
use crate::error::RunError;
use crate::expand::ExpandError;
use crate::interp::Interp;
use crate::options::{SET_OPTION_NAMES, SHOPT_OPTION_NAMES};
use crate::vars::{Flags, SetMode, Value, Variable};

/// `NAME` must be a valid shell identifier.
fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Split `a[expr]` into name and subscript text.
fn split_subscript(arg: &str) -> Option<(&str, &str)> {
    let open = arg.find('[')?;
    let close = arg.rfind(']')?;
    if close != arg.len() - 1 || close <= open {
        return None;
    }
    Some((&arg[..open], &arg[open + 1..close]))
}

/// `\`, `"`, `$`, and backquote need escaping inside a printed
/// double-quoted value.
fn dq_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// One `declare -p`-style line.
fn declaration_line(name: &str, var: &Variable) -> String {
    let mut letters = String::new();
    match &var.value {
        Value::Indexed(_) => letters.push('a'),
        Value::Assoc(_) => letters.push('A'),
        Value::NameRef(_) => letters.push('n'),
        Value::Scalar(_) => {}
    }
    if var.flags.exported {
        letters.push('x');
    }
    if var.flags.readonly {
        letters.push('r');
    }
    if var.flags.lower {
        letters.push('l');
    }
    if var.flags.upper {
        letters.push('u');
    }
    let flags = if letters.is_empty() { "--".to_string() } else { format!("-{}", letters) };
    let value = match &var.value {
        Value::Scalar(s) => format!("=\"{}\"", dq_escape(s)),
        Value::NameRef(t) => format!("=\"{}\"", dq_escape(t)),
        Value::Indexed(map) => {
            let body: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("[{}]=\"{}\"", k, dq_escape(v)))
                .collect();
            format!("=({})", body.join(" "))
        }
        Value::Assoc(map) => {
            let body: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("[{}]=\"{}\"", k, dq_escape(v)))
                .collect();
            format!("=({})", body.join(" "))
        }
    };
    format!("declare {} {}{}", flags, name, value)
}

// --- set ---

pub(crate) async fn set(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    if args.is_empty() {
        let mut out = String::new();
        for (name, var) in interp.env.visible() {
            if let Value::Scalar(s) = &var.value {
                out.push_str(&format!("{}={}\n", name, s));
            }
        }
        interp.write_stdout(&out).await;
        return Ok(0);
    }

    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        match arg {
            "--" | "-" => {
                interp.env.set_positional(args[i + 1..].to_vec());
                return Ok(0);
            }
            "-o" | "+o" => {
                let enable = arg.starts_with('-');
                i += 1;
                match args.get(i) {
                    None => {
                        let mut out = String::new();
                        for name in SET_OPTION_NAMES {
                            let on = interp.opts.get(name).unwrap_or(false);
                            out.push_str(&format!(
                                "{}\t{}\n",
                                name,
                                if on { "on" } else { "off" }
                            ));
                        }
                        interp.write_stdout(&out).await;
                    }
                    Some(name) => match interp.opts.by_name(name) {
                        Some(slot) => *slot = enable,
                        None => {
                            interp
                                .stderr_line(&format!("set: {}: invalid option name", name))
                                .await;
                            return Ok(2);
                        }
                    },
                }
            }
            _ if arg.starts_with('-') || arg.starts_with('+') => {
                let enable = arg.starts_with('-');
                for c in arg.chars().skip(1) {
                    match interp.opts.by_letter(c) {
                        Some(slot) => *slot = enable,
                        None => {
                            interp
                                .stderr_line(&format!("set: -{}: invalid option", c))
                                .await;
                            return Ok(2);
                        }
                    }
                }
            }
            _ => {
                interp.env.set_positional(args[i..].to_vec());
                return Ok(0);
            }
        }
        i += 1;
    }
    Ok(0)
}

// --- shopt ---

pub(crate) async fn shopt(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    let mut enable = false;
    let mut disable = false;
    let mut print = false;
    let mut quiet = false;
    let mut set_o = false;
    let mut names: Vec<&str> = Vec::new();
    for arg in args {
        match arg.as_str() {
            "-s" => enable = true,
            "-u" => disable = true,
            "-p" => print = true,
            "-q" => quiet = true,
            "-o" => set_o = true,
            other if other.starts_with('-') => {
                return Ok(super::usage(interp, "shopt", "[-pqsu] [-o] [optname ...]").await);
            }
            other => names.push(other),
        }
    }

    let known: &[&str] = if set_o { SET_OPTION_NAMES } else { SHOPT_OPTION_NAMES };
    if names.is_empty() {
        let mut out = String::new();
        for name in known {
            let on = interp.opts.get(name).unwrap_or(false);
            if print {
                out.push_str(&format!("shopt {} {}\n", if on { "-s" } else { "-u" }, name));
            } else {
                out.push_str(&format!("{}\t{}\n", name, if on { "on" } else { "off" }));
            }
        }
        if !quiet {
            interp.write_stdout(&out).await;
        }
        return Ok(0);
    }

    let mut status = 0u8;
    for name in names {
        if !known.contains(&name) {
            interp
                .stderr_line(&format!("shopt: {}: invalid shell option name", name))
                .await;
            status = 1;
            continue;
        }
        if enable || disable {
            if let Some(slot) = interp.opts.by_name(name) {
                *slot = enable;
            }
        } else {
            let on = interp.opts.get(name).unwrap_or(false);
            if print {
                let line = format!("shopt {} {}\n", if on { "-s" } else { "-u" }, name);
                interp.write_stdout(&line).await;
            } else if !quiet {
                let line = format!("{}\t{}\n", name, if on { "on" } else { "off" });
                interp.write_stdout(&line).await;
            }
            if !on {
                status = 1;
            }
        }
    }
    Ok(status)
}

// --- unset ---

pub(crate) async fn unset(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    let mut funcs = false;
    let mut status = 0u8;
    for arg in args {
        match arg.as_str() {
            "-f" => {
                funcs = true;
                continue;
            }
            "-v" => {
                funcs = false;
                continue;
            }
            _ => {}
        }
        if funcs {
            interp.funcs.remove(arg.as_str());
            continue;
        }
        if let Some((base, sub)) = split_subscript(arg) {
            let base = base.to_string();
            match interp.subscript_key(&base, &Word::lit(sub)).await {
                Ok(key) => {
                    if let Err(e) = interp.env.unset_element(&base, &key) {
                        interp
                            .stderr_line(&format!("unset: {}: cannot unset: {}", arg, e))
                            .await;
                        status = 1;
                    }
                }
                Err(ExpandError::Run(e)) => return Err(e),
                Err(_) => {
                    interp.stderr_line(&format!("unset: {}: bad array subscript", arg)).await;
                    status = 1;
                }
            }
        } else if let Err(e) = interp.env.unset(arg) {
            interp
                .stderr_line(&format!("unset: {}: cannot unset: {}", arg, e))
                .await;
            status = 1;
        }
    }
    Ok(status)
}

// --- export / readonly ---

pub(crate) async fn export(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    attr_builtin(interp, args, "export", |f, on| f.exported = on).await
}

pub(crate) async fn readonly(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    attr_builtin(interp, args, "readonly", |f, on| f.readonly = on).await
}

async fn attr_builtin(
    interp: &mut Interp,
    args: &[String],
    name: &str,
    apply: fn(&mut Flags, bool),
) -> Result<u8, RunError> {
    let mut remove = false;
    let mut plain_args: Vec<&str> = Vec::new();
    for arg in args {
        match arg.as_str() {
            "-n" if name == "export" => remove = true,
            "-p" => {}
            _ => plain_args.push(arg),
        }
    }

    if plain_args.is_empty() {
        let want_readonly = name == "readonly";
        let mut out = String::new();
        for (var_name, var) in interp.env.visible() {
            let show = if want_readonly { var.flags.readonly } else { var.flags.exported };
            if show {
                out.push_str(&declaration_line(&var_name, &var));
                out.push('\n');
            }
        }
        interp.write_stdout(&out).await;
        return Ok(0);
    }

    let mut status = 0u8;
    for arg in plain_args {
        let (var_name, value) = match arg.split_once('=') {
            Some((n, v)) => (n, Some(v.to_string())),
            None => (arg, None),
        };
        if !valid_name(var_name) {
            interp
                .stderr_line(&format!("{}: `{}': not a valid identifier", name, arg))
                .await;
            status = 1;
            continue;
        }
        if let Some(value) = value {
            if let Err(e) = interp.env.set_scalar(var_name, value, SetMode::Auto) {
                interp.stderr_line(&format!("{}: {}", name, e)).await;
                status = 1;
                continue;
            }
        }
        let _ = interp.env.with_flags(var_name, |f| apply(f, !remove));
    }
    Ok(status)
}

// --- declare / typeset / local ---

pub(crate) async fn local(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    if interp.func_depth == 0 {
        interp.stderr_line("local: can only be used in a function").await;
        return Ok(1);
    }
    declare(interp, args, true).await
}

pub(crate) async fn declare(
    interp: &mut Interp,
    args: &[String],
    force_local: bool,
) -> Result<u8, RunError> {
    let mut indexed = false;
    let mut assoc = false;
    let mut integer = false;
    let mut nameref = false;
    let mut global = false;
    let mut print = false;
    let mut sets: Vec<(char, bool)> = Vec::new();
    let mut rest: Vec<&str> = Vec::new();
    let mut seen_ddash = false;

    for arg in args {
        let s = arg.as_str();
        if seen_ddash || !(s.starts_with('-') || s.starts_with('+')) || s.len() < 2 {
            if s == "--" {
                seen_ddash = true;
            } else {
                rest.push(s);
            }
            continue;
        }
        let on = s.starts_with('-');
        for c in s.chars().skip(1) {
            match c {
                'a' => indexed = on,
                'A' => assoc = on,
                'i' => integer = on,
                'n' => nameref = on,
                'g' => global = on,
                'p' => print = on,
                'x' | 'r' | 'l' | 'u' => sets.push((c, on)),
                _ => {
                    return Ok(super::usage(
                        interp,
                        "declare",
                        "[-aAilnrtux] [-p] [name[=value] ...]",
                    )
                    .await)
                }
            }
        }
    }

    if print && rest.is_empty() {
        let mut out = String::new();
        for (name, var) in interp.env.visible() {
            out.push_str(&declaration_line(&name, &var));
            out.push('\n');
        }
        interp.write_stdout(&out).await;
        return Ok(0);
    }
    if print {
        let mut status = 0u8;
        let mut out = String::new();
        for name in rest {
            match interp.env.lookup(name) {
                Some(var) => {
                    out.push_str(&declaration_line(name, var));
                    out.push('\n');
                }
                None => {
                    status = 1;
                }
            }
        }
        interp.write_stdout(&out).await;
        if status != 0 {
            interp.stderr_line("declare: not found").await;
        }
        return Ok(status);
    }

    let local_target = force_local || (interp.func_depth > 0 && !global);
    let mode = if global {
        SetMode::Global
    } else if local_target {
        SetMode::Local
    } else {
        SetMode::Auto
    };

    let mut status = 0u8;
    for arg in rest {
        let (lhs, value) = match arg.split_once('=') {
            Some((l, v)) => (l, Some(v.to_string())),
            None => (arg, None),
        };
        let (name, append) = match lhs.strip_suffix('+') {
            Some(n) => (n, true),
            None => (lhs, false),
        };
        if !valid_name(name) {
            interp
                .stderr_line(&format!("declare: `{}': not a valid identifier", arg))
                .await;
            status = 1;
            continue;
        }

        // Refuse to weaken readonly before touching anything.
        let currently_readonly = interp
            .env
            .lookup(name)
            .map(|v| v.flags.readonly)
            .unwrap_or(false);
        if currently_readonly && (value.is_some() || sets.iter().any(|&(c, on)| c == 'r' && !on)) {
            interp
                .stderr_line(&format!("declare: {}: readonly variable", name))
                .await;
            status = 1;
            continue;
        }

        if local_target && interp.env.lookup(name).is_none() {
            let _ = interp.env.declare_local(name, None);
        }

        if nameref {
            let target = value.clone().unwrap_or_default();
            if let Err(e) = interp.env.set_value(name, Value::NameRef(target), mode) {
                interp.stderr_line(&format!("declare: {}", e)).await;
                status = 1;
                continue;
            }
        } else if (indexed || assoc) && !matches!(
            interp.env.lookup(name).map(|v| &v.value),
            Some(Value::Indexed(_)) | Some(Value::Assoc(_))
        ) {
            let fresh = if assoc {
                Value::Assoc(Default::default())
            } else {
                Value::Indexed(Default::default())
            };
            if let Err(e) = interp.env.set_value(name, fresh, mode) {
                interp.stderr_line(&format!("declare: {}", e)).await;
                status = 1;
                continue;
            }
        }

        // Attribute flags before the value so transforms apply on write.
        let _ = interp.env.with_flags(name, |f| {
            for &(c, on) in &sets {
                match c {
                    'x' => f.exported = on,
                    'r' => f.readonly = on,
                    'l' => {
                        f.lower = on;
                        if on {
                            f.upper = false;
                        }
                    }
                    'u' => {
                        f.upper = on;
                        if on {
                            f.lower = false;
                        }
                    }
                    _ => {}
                }
            }
        });

        if !nameref {
            if let Some(mut value) = value {
                if integer {
                    match interp.eval_arith_text(&value) {
                        Ok(n) => value = n.to_string(),
                        Err(ExpandError::Run(e)) => return Err(e),
                        Err(_) => {
                            interp
                                .stderr_line(&format!("declare: {}: expression error", arg))
                                .await;
                            status = 1;
                            continue;
                        }
                    }
                }
                let write = if append {
                    interp.env.append_scalar(name, &value, mode)
                } else {
                    interp.env.set_scalar(name, value, mode)
                };
                if let Err(e) = write {
                    interp.stderr_line(&format!("declare: {}", e)).await;
                    status = 1;
                }
            }
        }
    }
    Ok(status)
}

// --- getopts ---

pub(crate) async fn getopts(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    let (Some(optstring), Some(var)) = (args.first(), args.get(1)) else {
        return Ok(super::usage(interp, "getopts", "optstring name [arg ...]").await);
    };
    let var = var.clone();
    let silent = optstring.starts_with(':');
    let spec: Vec<char> = optstring.trim_start_matches(':').chars().collect();
    let words: Vec<String> = if args.len() > 2 {
        args[2..].to_vec()
    } else {
        interp.env.positional().to_vec()
    };

    let mut optind: i64 = interp
        .env
        .get_str("OPTIND")
        .and_then(|s| s.parse().ok())
        .unwrap_or(1);
    if optind < 1 {
        optind = 1;
    }
    // A caller resetting OPTIND restarts the scan.
    if interp.getopts_state.0 != optind {
        interp.getopts_state = (optind, 0);
    }
    let mut pos = interp.getopts_state.1;

    let finish = |interp: &mut Interp, optind: i64, pos: usize| {
        let _ = interp.env.set_scalar("OPTIND", optind.to_string(), SetMode::Global);
        interp.getopts_state = (optind, pos);
    };

    // Find the next option character.
    if pos == 0 {
        let Some(word) = words.get((optind - 1) as usize) else {
            let _ = interp.env.set_scalar(&var, "?", SetMode::Auto);
            finish(interp, optind, 0);
            return Ok(1);
        };
        if word == "--" {
            let _ = interp.env.set_scalar(&var, "?", SetMode::Auto);
            finish(interp, optind + 1, 0);
            return Ok(1);
        }
        if !word.starts_with('-') || word == "-" {
            let _ = interp.env.set_scalar(&var, "?", SetMode::Auto);
            finish(interp, optind, 0);
            return Ok(1);
        }
        pos = 1;
    }

    let Some(word_str) = words.get((optind - 1) as usize) else {
        let _ = interp.env.set_scalar(&var, "?", SetMode::Auto);
        finish(interp, optind, 0);
        return Ok(1);
    };
    let word: Vec<char> = word_str.chars().collect();
    let Some(&opt) = word.get(pos) else {
        let _ = interp.env.set_scalar(&var, "?", SetMode::Auto);
        finish(interp, optind + 1, 0);
        return Ok(1);
    };
    pos += 1;
    let advance = pos >= word.len();

    let takes_arg = spec
        .windows(2)
        .any(|w| w[0] == opt && w[1] == ':');
    let known = spec.iter().any(|&c| c == opt) && opt != ':';

    if !known {
        let _ = interp.env.set_scalar(&var, "?", SetMode::Auto);
        if silent {
            let _ = interp.env.set_scalar("OPTARG", opt.to_string(), SetMode::Global);
        } else {
            let _ = interp.env.unset("OPTARG");
            interp.stderr_line(&format!("getopts: illegal option -- {}", opt)).await;
        }
        if advance {
            finish(interp, optind + 1, 0);
        } else {
            finish(interp, optind, pos);
        }
        return Ok(0);
    }

    if takes_arg {
        let optarg = if !advance {
            // Rest of this word is the argument.
            let rest: String = word[pos..].iter().collect();
            Some(rest)
        } else {
            words.get(optind as usize).cloned().map(|w| {
                optind += 1;
                w
            })
        };
        match optarg {
            Some(value) => {
                let _ = interp.env.set_scalar(&var, opt.to_string(), SetMode::Auto);
                let _ = interp.env.set_scalar("OPTARG", value, SetMode::Global);
            }
            None => {
                if silent {
                    let _ = interp.env.set_scalar(&var, ":", SetMode::Auto);
                    let _ = interp.env.set_scalar("OPTARG", opt.to_string(), SetMode::Global);
                } else {
                    let _ = interp.env.set_scalar(&var, "?", SetMode::Auto);
                    let _ = interp.env.unset("OPTARG");
                    interp
                        .stderr_line(&format!("getopts: option requires an argument -- {}", opt))
                        .await;
                }
            }
        }
        finish(interp, optind + 1, 0);
        return Ok(0);
    }

    let _ = interp.env.set_scalar(&var, opt.to_string(), SetMode::Auto);
    let _ = interp.env.unset("OPTARG");
    if advance {
        finish(interp, optind + 1, 0);
    } else {
        finish(interp, optind, pos);
    }
    Ok(0)
}
