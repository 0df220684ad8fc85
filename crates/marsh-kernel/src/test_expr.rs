//! Test expressions: `[[ ... ]]` over the AST, and the classic
//! `test` / `[` argv grammar evaluated at runtime.
//!
//! Both share the same unary and binary operator implementations. In
//! `[[ ]]`, the right-hand side of `==`/`!=` is a pattern unless it was
//! quoted, and `=~` compiles an extended regex.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use marsh_glob::Pattern;

use crate::ast::TestExpr;
use crate::expand::{expand_pattern, expand_single, ExpandError};
use crate::interp::Interp;

/// Evaluate a `[[ ... ]]` expression tree.
pub async fn eval_test_ast(interp: &mut Interp, expr: &TestExpr) -> Result<bool, ExpandError> {
    match expr {
        TestExpr::Not(inner) => Ok(!Box::pin(eval_test_ast(interp, inner)).await?),
        TestExpr::And(a, b) => {
            if !Box::pin(eval_test_ast(interp, a)).await? {
                return Ok(false);
            }
            Box::pin(eval_test_ast(interp, b)).await
        }
        TestExpr::Or(a, b) => {
            if Box::pin(eval_test_ast(interp, a)).await? {
                return Ok(true);
            }
            Box::pin(eval_test_ast(interp, b)).await
        }
        TestExpr::Unary { op, operand } => {
            let value = expand_single(interp, operand).await?;
            unary_test(interp, op, &value)
        }
        TestExpr::Binary { op, lhs, rhs } => {
            let left = expand_single(interp, lhs).await?;
            match op.as_str() {
                "==" | "=" | "!=" => {
                    let pat_text = expand_pattern(interp, rhs).await?;
                    let pattern = if interp.opts.nocasematch {
                        Pattern::case_insensitive(&pat_text)
                    } else {
                        Pattern::new(&pat_text)
                    };
                    let hit = pattern.matches(&left);
                    Ok(if op == "!=" { !hit } else { hit })
                }
                "=~" => {
                    let regex_text = expand_single(interp, rhs).await?;
                    regex_match(interp, &left, &regex_text)
                }
                _ => {
                    let right = expand_single(interp, rhs).await?;
                    binary_test(interp, op, &left, &right)
                }
            }
        }
    }
}

/// Evaluate `test` / `[` arguments with the POSIX argument-count rules
/// plus `! ( ) -a -o`.
pub fn eval_test_cli(interp: &mut Interp, args: &[String]) -> Result<bool, ExpandError> {
    if args.is_empty() {
        return Ok(false);
    }
    let mut parser = CliParser { interp, args, pos: 0 };
    let value = parser.or_expr()?;
    if parser.pos != args.len() {
        return Err(syntax(format!("too many arguments near {:?}", args[parser.pos])));
    }
    Ok(value)
}

fn syntax(text: impl Into<String>) -> ExpandError {
    ExpandError::Message { status: 2, fatal: false, text: text.into() }
}

struct CliParser<'a> {
    interp: &'a mut Interp,
    args: &'a [String],
    pos: usize,
}

impl<'a> CliParser<'a> {
    fn peek(&self) -> Option<&str> {
        self.args.get(self.pos).map(|s| s.as_str())
    }

    fn bump(&mut self) -> Option<&'a str> {
        let s = self.args.get(self.pos).map(|s| s.as_str());
        if s.is_some() {
            self.pos += 1;
        }
        s
    }

    fn or_expr(&mut self) -> Result<bool, ExpandError> {
        let mut left = self.and_expr()?;
        while self.peek() == Some("-o") {
            self.bump();
            let right = self.and_expr()?;
            left = left || right;
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<bool, ExpandError> {
        let mut left = self.not_expr()?;
        while self.peek() == Some("-a") {
            self.bump();
            let right = self.not_expr()?;
            left = left && right;
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<bool, ExpandError> {
        // `!` only negates when something follows it.
        if self.peek() == Some("!") && self.pos + 1 < self.args.len() {
            self.bump();
            return Ok(!self.not_expr()?);
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<bool, ExpandError> {
        if self.peek() == Some("(") {
            self.bump();
            let value = self.or_expr()?;
            if self.bump() != Some(")") {
                return Err(syntax("expected `)'"));
            }
            return Ok(value);
        }
        let first = match self.bump() {
            Some(s) => s,
            None => return Err(syntax("argument expected")),
        };
        // Binary form: `a op b`.
        if let Some(op) = self.peek().filter(|op| is_binary_op(op)) {
            let op = op.to_string();
            self.bump();
            let rhs = self
                .bump()
                .ok_or_else(|| syntax(format!("{}: argument expected", op)))?
                .to_string();
            if op == "=" || op == "==" {
                return Ok(first == rhs);
            }
            if op == "!=" {
                return Ok(first != rhs);
            }
            return binary_test(self.interp, &op, first, &rhs);
        }
        // Unary form: `-f path`.
        if is_unary_op(first) {
            match self.bump() {
                Some(operand) => {
                    let operand = operand.to_string();
                    return unary_test(self.interp, first, &operand);
                }
                // `test -n` with no operand: the op itself is the
                // (non-empty) string.
                None => return Ok(true),
            }
        }
        Ok(!first.is_empty())
    }
}

fn is_unary_op(s: &str) -> bool {
    matches!(
        s,
        "-e" | "-f" | "-d" | "-r" | "-w" | "-x" | "-s" | "-L" | "-h" | "-p" | "-b" | "-c"
            | "-S" | "-t" | "-k" | "-u" | "-g" | "-N" | "-z" | "-n" | "-v" | "-o"
    )
}

fn is_binary_op(s: &str) -> bool {
    matches!(
        s,
        "=" | "==" | "!=" | "<" | ">" | "-eq" | "-ne" | "-lt" | "-le" | "-gt" | "-ge" | "-ef"
            | "-nt" | "-ot"
    )
}

/// Apply a unary test operator.
pub fn unary_test(interp: &mut Interp, op: &str, operand: &str) -> Result<bool, ExpandError> {
    Ok(match op {
        "-z" => operand.is_empty(),
        "-n" => !operand.is_empty(),
        "-v" => interp.env.is_set(operand),
        "-o" => interp.opts.get(operand).unwrap_or(false),
        "-t" => false, // virtualized fds are never a tty
        _ => {
            let path = resolve(interp, operand);
            file_test(op, &path)?
        }
    })
}

fn file_test(op: &str, path: &Path) -> Result<bool, ExpandError> {
    let meta = fs::metadata(path);
    let sym = fs::symlink_metadata(path);
    Ok(match op {
        "-e" => meta.is_ok(),
        "-f" => meta.map(|m| m.is_file()).unwrap_or(false),
        "-d" => meta.map(|m| m.is_dir()).unwrap_or(false),
        "-s" => meta.map(|m| m.len() > 0).unwrap_or(false),
        "-L" | "-h" => sym.map(|m| m.file_type().is_symlink()).unwrap_or(false),
        #[cfg(unix)]
        "-r" => unix_access(path, libc::R_OK),
        #[cfg(unix)]
        "-w" => unix_access(path, libc::W_OK),
        #[cfg(unix)]
        "-x" => unix_access(path, libc::X_OK),
        #[cfg(unix)]
        "-p" => {
            use std::os::unix::fs::FileTypeExt;
            meta.map(|m| m.file_type().is_fifo()).unwrap_or(false)
        }
        #[cfg(unix)]
        "-b" => {
            use std::os::unix::fs::FileTypeExt;
            meta.map(|m| m.file_type().is_block_device()).unwrap_or(false)
        }
        #[cfg(unix)]
        "-c" => {
            use std::os::unix::fs::FileTypeExt;
            meta.map(|m| m.file_type().is_char_device()).unwrap_or(false)
        }
        #[cfg(unix)]
        "-S" => {
            use std::os::unix::fs::FileTypeExt;
            meta.map(|m| m.file_type().is_socket()).unwrap_or(false)
        }
        #[cfg(unix)]
        "-k" => mode_bit(path, 0o1000),
        #[cfg(unix)]
        "-u" => mode_bit(path, 0o4000),
        #[cfg(unix)]
        "-g" => mode_bit(path, 0o2000),
        #[cfg(unix)]
        "-N" => {
            use std::os::unix::fs::MetadataExt;
            meta.map(|m| m.mtime() > m.atime()
                || (m.mtime() == m.atime() && m.mtime_nsec() > m.atime_nsec()))
                .unwrap_or(false)
        }
        _ => return Err(syntax(format!("{}: unary operator expected", op))),
    })
}

#[cfg(unix)]
fn unix_access(path: &Path, mode: libc::c_int) -> bool {
    use std::os::unix::ffi::OsStrExt;
    let Ok(cpath) = std::ffi::CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    unsafe { libc::access(cpath.as_ptr(), mode) == 0 }
}

#[cfg(unix)]
fn mode_bit(path: &Path, bit: u32) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.permissions().mode() & bit != 0)
        .unwrap_or(false)
}

/// Apply a binary test operator (string compare was handled upstream
/// for `==`/`!=`; this covers string ordering, numeric, and file ops).
pub fn binary_test(
    interp: &mut Interp,
    op: &str,
    left: &str,
    right: &str,
) -> Result<bool, ExpandError> {
    Ok(match op {
        "<" => left < right,
        ">" => left > right,
        "-eq" | "-ne" | "-lt" | "-le" | "-gt" | "-ge" => {
            let l = interp.eval_arith_text(left)?;
            let r = interp.eval_arith_text(right)?;
            match op {
                "-eq" => l == r,
                "-ne" => l != r,
                "-lt" => l < r,
                "-le" => l <= r,
                "-gt" => l > r,
                _ => l >= r,
            }
        }
        "-ef" => same_file(&resolve(interp, left), &resolve(interp, right)),
        "-nt" => newer_than(&resolve(interp, left), &resolve(interp, right)),
        "-ot" => newer_than(&resolve(interp, right), &resolve(interp, left)),
        _ => return Err(syntax(format!("{}: binary operator expected", op))),
    })
}

fn regex_match(interp: &mut Interp, subject: &str, pattern: &str) -> Result<bool, ExpandError> {
    let re = regex::Regex::new(pattern)
        .map_err(|e| syntax(format!("invalid regex {:?}: {}", pattern, e)))?;
    match re.captures(subject) {
        Some(caps) => {
            // BASH_REMATCH gets the whole match plus capture groups.
            let groups: Vec<String> = caps
                .iter()
                .map(|g| g.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect();
            interp.set_rematch(groups);
            Ok(true)
        }
        None => Ok(false),
    }
}

fn resolve(interp: &Interp, path: &str) -> PathBuf {
    if path.starts_with('/') {
        PathBuf::from(path)
    } else {
        interp.cwd.join(path)
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        match (fs::metadata(a), fs::metadata(b)) {
            (Ok(ma), Ok(mb)) => ma.dev() == mb.dev() && ma.ino() == mb.ino(),
            _ => false,
        }
    }
    #[cfg(not(unix))]
    {
        a == b
    }
}

fn newer_than(a: &Path, b: &Path) -> bool {
    let mtime = |p: &Path| -> Option<SystemTime> { fs::metadata(p).and_then(|m| m.modified()).ok() };
    match (mtime(a), mtime(b)) {
        (Some(ta), Some(tb)) => ta > tb,
        // `a -nt b` is true when b is missing and a exists.
        (Some(_), None) => true,
        _ => false,
    }
}
