//! The read builtin.

use std::time::Duration;

use crate::error::RunError;
use crate::interp::Interp;
use crate::io::FdFile;
use crate::vars::{SetMode, Value};

/// Exit status for `read -t` expiry (128 + SIGALRM).
const STATUS_TIMED_OUT: u8 = 142;

struct ReadOpts {
    raw: bool,
    prompt: Option<String>,
    delim: Option<u8>,
    count: Option<usize>,
    /// `-N`: exact count, delimiter not special.
    exact: bool,
    silent: bool,
    array: Option<String>,
    timeout: Option<f64>,
    vars: Vec<String>,
}

fn parse_args(args: &[String]) -> Result<ReadOpts, String> {
    let mut opts = ReadOpts {
        raw: false,
        prompt: None,
        delim: None,
        count: None,
        exact: false,
        silent: false,
        array: None,
        timeout: None,
        vars: Vec::new(),
    };
    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        let mut take_value = |i: &mut usize| -> Result<String, String> {
            *i += 1;
            args.get(*i)
                .cloned()
                .ok_or_else(|| format!("{}: option requires an argument", arg))
        };
        match arg {
            "-r" => opts.raw = true,
            "-s" => opts.silent = true,
            "-p" => opts.prompt = Some(take_value(&mut i)?),
            "-d" => {
                let v = take_value(&mut i)?;
                opts.delim = Some(v.bytes().next().unwrap_or(0));
            }
            "-n" => {
                let v = take_value(&mut i)?;
                opts.count = Some(v.parse().map_err(|_| format!("{}: invalid number", v))?);
                opts.exact = false;
            }
            "-N" => {
                let v = take_value(&mut i)?;
                opts.count = Some(v.parse().map_err(|_| format!("{}: invalid number", v))?);
                opts.exact = true;
            }
            "-a" => opts.array = Some(take_value(&mut i)?),
            "-t" => {
                let v = take_value(&mut i)?;
                opts.timeout = Some(v.parse().map_err(|_| format!("{}: invalid timeout", v))?);
            }
            "--" => {
                opts.vars.extend(args[i + 1..].iter().cloned());
                break;
            }
            _ => opts.vars.push(arg.to_string()),
        }
        i += 1;
    }
    Ok(opts)
}

pub(crate) async fn read(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    let opts = match parse_args(args) {
        Ok(opts) => opts,
        Err(msg) => {
            interp.stderr_line(&format!("read: {}", msg)).await;
            return Ok(2);
        }
    };

    if let Some(prompt) = &opts.prompt {
        interp.write_stderr(prompt).await;
    }

    let fd = interp.fds.stdin();
    let delim = opts.delim.unwrap_or(b'\n');
    let collect = collect_input(fd, delim, opts.raw, opts.count, opts.exact);
    let (line, eof) = match opts.timeout {
        Some(secs) => {
            match tokio::time::timeout(Duration::from_secs_f64(secs.max(0.0)), collect).await {
                Ok(result) => result,
                Err(_) => return Ok(STATUS_TIMED_OUT),
            }
        }
        None => collect.await,
    };

    let ifs = interp.env.get_str("IFS").unwrap_or_else(|| " \t\n".to_string());

    if let Some(array) = &opts.array {
        let fields = split_all(&line, &ifs);
        if let Err(e) = interp.env.set_value(array, Value::indexed_from(fields), SetMode::Auto) {
            interp.stderr_line(&format!("read: {}", e)).await;
            return Ok(1);
        }
        return Ok(if eof && line.is_empty() { 1 } else { 0 });
    }

    let vars: Vec<String> = if opts.vars.is_empty() {
        vec!["REPLY".to_string()]
    } else {
        opts.vars.clone()
    };
    let fields = split_for_vars(&line, &ifs, vars.len());
    for (i, var) in vars.iter().enumerate() {
        let value = fields.get(i).cloned().unwrap_or_default();
        if let Err(e) = interp.env.set_scalar(var, value, SetMode::Auto) {
            interp.stderr_line(&format!("read: {}", e)).await;
            return Ok(1);
        }
    }
    Ok(if eof { 1 } else { 0 })
}

/// Pull bytes one at a time until the delimiter, EOF, or the count.
/// Returns the collected text and whether EOF cut the read short.
async fn collect_input(
    fd: FdFile,
    delim: u8,
    raw: bool,
    count: Option<usize>,
    exact: bool,
) -> (String, bool) {
    let mut bytes: Vec<u8> = Vec::new();
    let mut eof = false;
    loop {
        if let Some(max) = count {
            if bytes.len() >= max {
                break;
            }
        }
        let b = match fd.read_byte().await {
            Ok(Some(b)) => b,
            _ => {
                eof = true;
                break;
            }
        };
        if !raw && b == b'\\' {
            match fd.read_byte().await {
                Ok(Some(b'\n')) => continue, // line continuation
                Ok(Some(next)) => {
                    bytes.push(next);
                    continue;
                }
                _ => {
                    eof = true;
                    break;
                }
            }
        }
        if b == delim && !(exact && count.is_some()) {
            return (String::from_utf8_lossy(&bytes).into_owned(), false);
        }
        bytes.push(b);
    }
    (String::from_utf8_lossy(&bytes).into_owned(), eof)
}

fn is_ifs_ws(c: char, ifs: &str) -> bool {
    ifs.contains(c) && c.is_whitespace()
}

/// Split into exactly `nvars` pieces: the last one keeps the remainder.
fn split_for_vars(line: &str, ifs: &str, nvars: usize) -> Vec<String> {
    if ifs.is_empty() || nvars == 0 {
        return vec![line.to_string()];
    }
    let trimmed = line
        .trim_start_matches(|c| is_ifs_ws(c, ifs))
        .trim_end_matches(|c| is_ifs_ws(c, ifs));
    if nvars == 1 {
        return vec![trimmed.to_string()];
    }
    let mut fields = Vec::new();
    let chars: Vec<char> = trimmed.chars().collect();
    let mut i = 0;
    while fields.len() < nvars - 1 && i < chars.len() {
        let mut field = String::new();
        while i < chars.len() && !ifs.contains(chars[i]) {
            field.push(chars[i]);
            i += 1;
        }
        fields.push(field);
        // Consume one separator (plus surrounding whitespace).
        while i < chars.len() && is_ifs_ws(chars[i], ifs) {
            i += 1;
        }
        if i < chars.len() && ifs.contains(chars[i]) && !is_ifs_ws(chars[i], ifs) {
            i += 1;
            while i < chars.len() && is_ifs_ws(chars[i], ifs) {
                i += 1;
            }
        }
    }
    let rest: String = chars[i..].iter().collect();
    fields.push(rest.trim_end_matches(|c| is_ifs_ws(c, ifs)).to_string());
    fields
}

/// Split into every field (`read -a`).
fn split_all(line: &str, ifs: &str) -> Vec<String> {
    if ifs.is_empty() {
        if line.is_empty() {
            return Vec::new();
        }
        return vec![line.to_string()];
    }
    let trimmed = line
        .trim_start_matches(|c| is_ifs_ws(c, ifs))
        .trim_end_matches(|c| is_ifs_ws(c, ifs));
    if trimmed.is_empty() {
        return Vec::new();
    }
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = trimmed.chars().peekable();
    while let Some(c) = chars.next() {
        if ifs.contains(c) {
            fields.push(std::mem::take(&mut current));
            // Whitespace runs (and whitespace around one non-ws
            // separator) count once.
            if is_ifs_ws(c, ifs) {
                while chars.peek().is_some_and(|&n| is_ifs_ws(n, ifs)) {
                    chars.next();
                }
                if chars.peek().is_some_and(|&n| ifs.contains(n) && !is_ifs_ws(n, ifs)) {
                    chars.next();
                    while chars.peek().is_some_and(|&n| is_ifs_ws(n, ifs)) {
                        chars.next();
                    }
                }
            } else {
                while chars.peek().is_some_and(|&n| is_ifs_ws(n, ifs)) {
                    chars.next();
                }
            }
        } else {
            current.push(c);
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_two_vars_keeps_rest() {
        let got = split_for_vars("x y z", " \t\n", 2);
        assert_eq!(got, vec!["x", "y z"]);
    }

    #[test]
    fn split_trims_edges() {
        let got = split_for_vars("  a b  ", " \t\n", 2);
        assert_eq!(got, vec!["a", "b"]);
        let got = split_for_vars("  solo  ", " \t\n", 1);
        assert_eq!(got, vec!["solo"]);
    }

    #[test]
    fn split_more_vars_than_fields() {
        let got = split_for_vars("only", " \t\n", 3);
        assert_eq!(got, vec!["only", ""]);
    }

    #[test]
    fn split_with_colon_ifs() {
        let got = split_for_vars("a:b:c", ":", 2);
        assert_eq!(got, vec!["a", "b:c"]);
    }

    #[test]
    fn split_all_fields() {
        assert_eq!(split_all("a b  c", " \t\n"), vec!["a", "b", "c"]);
        assert_eq!(split_all("a::b", ":"), vec!["a", "", "b"]);
        assert!(split_all("   ", " \t\n").is_empty());
    }

    #[tokio::test]
    async fn collect_stops_at_delimiter() {
        let fd = FdFile::from_bytes(b"line one\nline two\n".to_vec());
        let (line, eof) = collect_input(fd.clone(), b'\n', true, None, false).await;
        assert_eq!(line, "line one");
        assert!(!eof);
        // Following read continues where the first stopped.
        let (line, _) = collect_input(fd, b'\n', true, None, false).await;
        assert_eq!(line, "line two");
    }

    #[tokio::test]
    async fn collect_reports_eof() {
        let fd = FdFile::from_bytes(b"partial".to_vec());
        let (line, eof) = collect_input(fd, b'\n', true, None, false).await;
        assert_eq!(line, "partial");
        assert!(eof);
    }

    #[tokio::test]
    async fn collect_backslash_escapes() {
        // `\n` in the input protects the delimiter.
        let fd = FdFile::from_bytes(b"a\\\nb\nrest".to_vec());
        let (line, _) = collect_input(fd, b'\n', false, None, false).await;
        assert_eq!(line, "ab");
    }

    #[tokio::test]
    async fn collect_counts_chars() {
        let fd = FdFile::from_bytes(b"abcdef".to_vec());
        let (line, _) = collect_input(fd, b'\n', true, Some(3), false).await;
        assert_eq!(line, "abc");
    }

    #[tokio::test]
    async fn exact_count_ignores_delimiter() {
        let fd = FdFile::from_bytes(b"ab\ncd".to_vec());
        let (line, _) = collect_input(fd, b'\n', true, Some(4), true).await;
        assert_eq!(line, "ab\ncd"[..4].to_string());
    }
}
