//! echo and printf.

use crate::error::RunError;
use crate::expand::{ansi_decode, shell_quote};
use crate::interp::Interp;
use crate::vars::SetMode;

pub(crate) async fn echo(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    let mut newline = true;
    let mut escapes = false;
    let mut idx = 0;
    // Flag words are only flags when every char is one of `neE`.
    while let Some(arg) = args.get(idx) {
        let Some(rest) = arg.strip_prefix('-') else { break };
        if rest.is_empty() || !rest.chars().all(|c| matches!(c, 'n' | 'e' | 'E')) {
            break;
        }
        for c in rest.chars() {
            match c {
                'n' => newline = false,
                'e' => escapes = true,
                'E' => escapes = false,
                _ => unreachable!(),
            }
        }
        idx += 1;
    }

    let raw = args[idx..].join(" ");
    let mut text = raw.clone();
    let mut suppress_newline = !newline;
    if escapes {
        // `\c` stops output, including the trailing newline.
        match echo_cut(&raw) {
            Some(pos) => {
                text = ansi_decode(&raw[..pos]);
                suppress_newline = true;
            }
            None => text = ansi_decode(&raw),
        }
    }
    if !suppress_newline {
        text.push('\n');
    }
    let ok = interp.write_stdout(&text).await;
    Ok(if ok { 0 } else { 1 })
}

/// Position of an unescaped `\c` in echo -e input, if any.
fn echo_cut(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'\\' {
            if bytes[i + 1] == b'c' {
                return Some(i);
            }
            i += 2;
        } else {
            i += 1;
        }
    }
    None
}

pub(crate) async fn printf(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    let mut args = args;
    let mut target_var: Option<String> = None;
    if args.first().map(|s| s.as_str()) == Some("-v") {
        match args.get(1) {
            Some(name) => {
                target_var = Some(name.clone());
                args = &args[2..];
            }
            None => {
                return Ok(super::usage(interp, "printf", "[-v var] format [arguments]").await);
            }
        }
    }
    let Some(format) = args.first() else {
        return Ok(super::usage(interp, "printf", "[-v var] format [arguments]").await);
    };
    let rest = &args[1..];

    let mut out = String::new();
    let mut errors = false;
    let mut consumed = 0usize;
    loop {
        let used = render_format(format, rest, consumed, &mut out, &mut errors);
        consumed += used;
        // The format is reused while arguments remain, but only if it
        // consumes at least one per pass.
        if used == 0 || consumed >= rest.len() {
            break;
        }
    }

    match target_var {
        Some(name) => {
            if let Err(e) = interp.env.set_scalar(&name, out, SetMode::Auto) {
                interp.stderr_line(&e.to_string()).await;
                return Ok(1);
            }
        }
        None => {
            if !interp.write_stdout(&out).await {
                return Ok(1);
            }
        }
    }
    Ok(if errors { 1 } else { 0 })
}

/// Render the format once. Returns how many arguments were consumed.
fn render_format(
    format: &str,
    args: &[String],
    offset: usize,
    out: &mut String,
    errors: &mut bool,
) -> usize {
    let chars: Vec<char> = format.chars().collect();
    let mut i = 0;
    let mut used = 0usize;
    let empty = String::new();
    let mut next_arg = || {
        let arg = args.get(offset + used).unwrap_or(&empty).clone();
        used += 1;
        arg
    };

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                // Escapes in the format are always processed.
                let rest: String = chars[i..].iter().collect();
                let mut taken = 2;
                if let Some(next) = chars.get(i + 1) {
                    match next {
                        'x' => taken = escape_len(&rest, 2, 2, 16),
                        'u' => taken = escape_len(&rest, 2, 4, 16),
                        'U' => taken = escape_len(&rest, 2, 8, 16),
                        '0'..='7' => taken = escape_len(&rest, 1, 3, 8),
                        _ => {}
                    }
                } else {
                    taken = 1;
                }
                let piece: String = chars[i..i + taken].iter().collect();
                out.push_str(&ansi_decode(&piece));
                i += taken;
            }
            '%' => {
                let (spec, next) = parse_spec(&chars, i);
                i = next;
                match spec {
                    None => out.push('%'),
                    Some(spec) => render_one(&spec, &mut next_arg, out, errors),
                }
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    used
}

/// Length in chars of an escape sequence with a bounded digit run.
fn escape_len(s: &str, prefix: usize, max_digits: usize, radix: u32) -> usize {
    let chars: Vec<char> = s.chars().collect();
    let mut n = prefix;
    while n < chars.len() && n - prefix < max_digits && chars[n].is_digit(radix) {
        n += 1;
    }
    n
}

struct Spec {
    minus: bool,
    plus: bool,
    space: bool,
    zero: bool,
    alt: bool,
    width: Option<usize>,
    precision: Option<usize>,
    conv: char,
}

/// Parse `%[flags][width][.precision]conv` starting at `chars[start]`
/// (a `%`). Returns the spec (or `None` for `%%`) and the next index.
fn parse_spec(chars: &[char], start: usize) -> (Option<Spec>, usize) {
    let mut i = start + 1;
    if chars.get(i) == Some(&'%') {
        return (None, i + 1);
    }
    let mut spec = Spec {
        minus: false,
        plus: false,
        space: false,
        zero: false,
        alt: false,
        width: None,
        precision: None,
        conv: 's',
    };
    while let Some(&c) = chars.get(i) {
        match c {
            '-' => spec.minus = true,
            '+' => spec.plus = true,
            ' ' => spec.space = true,
            '0' => spec.zero = true,
            '#' => spec.alt = true,
            _ => break,
        }
        i += 1;
    }
    let mut width = String::new();
    while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
        width.push(chars[i]);
        i += 1;
    }
    if !width.is_empty() {
        spec.width = width.parse().ok();
    }
    if chars.get(i) == Some(&'.') {
        i += 1;
        let mut prec = String::new();
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            prec.push(chars[i]);
            i += 1;
        }
        spec.precision = Some(prec.parse().unwrap_or(0));
    }
    match chars.get(i) {
        Some(&c) => {
            spec.conv = c;
            (Some(spec), i + 1)
        }
        // Trailing bare `%`: print it literally.
        None => (None, i),
    }
}

fn render_one(spec: &Spec, next_arg: &mut impl FnMut() -> String, out: &mut String, errors: &mut bool) {
    let arg = next_arg();
    let rendered = match spec.conv {
        's' => {
            let mut s = arg;
            if let Some(p) = spec.precision {
                s = s.chars().take(p).collect();
            }
            pad(spec, s, false)
        }
        'b' => pad(spec, ansi_decode(&arg), false),
        'q' => pad(spec, shell_quote(&arg), false),
        'c' => pad(spec, arg.chars().next().map(|c| c.to_string()).unwrap_or_default(), false),
        'd' | 'i' => {
            let n = int_arg(&arg, errors);
            let body = n.unsigned_abs().to_string();
            let sign = if n < 0 {
                "-"
            } else if spec.plus {
                "+"
            } else if spec.space {
                " "
            } else {
                ""
            };
            pad_num(spec, sign, body)
        }
        'u' => pad_num(spec, "", (int_arg(&arg, errors) as u64).to_string()),
        'o' => {
            let body = format!("{:o}", int_arg(&arg, errors) as u64);
            let body = if spec.alt { format!("0{}", body) } else { body };
            pad_num(spec, "", body)
        }
        'x' => {
            let body = format!("{:x}", int_arg(&arg, errors) as u64);
            let body = if spec.alt { format!("0x{}", body) } else { body };
            pad_num(spec, "", body)
        }
        'X' => {
            let body = format!("{:X}", int_arg(&arg, errors) as u64);
            let body = if spec.alt { format!("0X{}", body) } else { body };
            pad_num(spec, "", body)
        }
        'e' => float_fmt(spec, &arg, errors, |v, p| c_exponent(format!("{:.*e}", p, v))),
        'f' => float_fmt(spec, &arg, errors, |v, p| format!("{:.*}", p, v)),
        'g' => {
            let v = float_arg(&arg, errors);
            pad_num(spec, if v < 0.0 { "" } else { sign_prefix(spec) }, format!("{}", v))
        }
        other => {
            *errors = true;
            format!("%{}", other)
        }
    };
    out.push_str(&rendered);
}

fn sign_prefix(spec: &Spec) -> &'static str {
    if spec.plus {
        "+"
    } else if spec.space {
        " "
    } else {
        ""
    }
}

fn float_fmt(
    spec: &Spec,
    arg: &str,
    errors: &mut bool,
    f: impl Fn(f64, usize) -> String,
) -> String {
    let v = float_arg(arg, errors);
    let prec = spec.precision.unwrap_or(6);
    let body = f(v.abs(), prec);
    let sign = if v < 0.0 { "-" } else { sign_prefix(spec) };
    pad_num(spec, sign, body)
}

/// Numeric argument: shell printf accepts `'c` for a char code and the
/// usual integer bases.
fn int_arg(arg: &str, errors: &mut bool) -> i64 {
    let arg = arg.trim();
    if arg.is_empty() {
        return 0;
    }
    if let Some(rest) = arg.strip_prefix('\'').or_else(|| arg.strip_prefix('"')) {
        return rest.chars().next().map(|c| c as i64).unwrap_or(0);
    }
    let (neg, digits) = match arg.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, arg.strip_prefix('+').unwrap_or(arg)),
    };
    match crate::arith::parse_number(digits) {
        Ok(v) => {
            if neg {
                -v
            } else {
                v
            }
        }
        Err(_) => {
            *errors = true;
            0
        }
    }
}

/// Rust renders `1.5e3`; printf wants `1.5e+03`.
fn c_exponent(s: String) -> String {
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exp.abs())
        }
        None => s,
    }
}

fn float_arg(arg: &str, errors: &mut bool) -> f64 {
    let arg = arg.trim();
    if arg.is_empty() {
        return 0.0;
    }
    match arg.parse() {
        Ok(v) => v,
        Err(_) => {
            *errors = true;
            0.0
        }
    }
}

fn pad(spec: &Spec, s: String, _numeric: bool) -> String {
    let Some(width) = spec.width else { return s };
    let len = s.chars().count();
    if len >= width {
        return s;
    }
    let fill = " ".repeat(width - len);
    if spec.minus {
        format!("{}{}", s, fill)
    } else {
        format!("{}{}", fill, s)
    }
}

/// Numeric padding: zero fill goes between the sign and the digits.
fn pad_num(spec: &Spec, sign: &str, body: String) -> String {
    let Some(width) = spec.width else {
        return format!("{}{}", sign, body);
    };
    let len = sign.chars().count() + body.chars().count();
    if len >= width {
        return format!("{}{}", sign, body);
    }
    let missing = width - len;
    if spec.minus {
        format!("{}{}{}", sign, body, " ".repeat(missing))
    } else if spec.zero {
        format!("{}{}{}", sign, "0".repeat(missing), body)
    } else {
        format!("{}{}{}", " ".repeat(missing), sign, body)
    }
}
