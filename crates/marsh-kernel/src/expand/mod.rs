//! The expansion engine: words in, fields out.
//!
//! Stages, in order: brace expansion (on the unexpanded word), tilde,
//! parameter/command/arithmetic expansion, IFS field splitting of
//! unquoted expansion results, pathname expansion, quote removal.
//!
//! Every field is tracked twice while it is built: `val` is the final
//! text after quote removal, `pat` is the pattern form where characters
//! that came from quotes are backslash-escaped. Globbing and `case`
//! matching consume `pat`; everything else consumes `val`.

mod brace;
mod param;
mod quote;

pub use brace::expand_braces;
pub use quote::{ansi_decode, shell_quote};

pub(crate) use param::eval_param;

use marsh_glob as glob;

use crate::ast::{Word, WordPart};
use crate::error::RunError;
use crate::interp::Interp;

/// Expansion failure.
#[derive(Debug)]
pub enum ExpandError {
    /// A diagnostic to print; aborts the current command with `status`.
    /// `fatal` escalates to a script abort (unbound variable, `${v:?}`).
    Message { status: u8, fatal: bool, text: String },
    /// Propagated runner error (cancellation, handler failure).
    Run(RunError),
}

impl ExpandError {
    pub fn msg(text: impl Into<String>) -> Self {
        ExpandError::Message { status: 1, fatal: false, text: text.into() }
    }

    pub fn fatal(text: impl Into<String>) -> Self {
        ExpandError::Message { status: 1, fatal: true, text: text.into() }
    }
}

impl From<RunError> for ExpandError {
    fn from(e: RunError) -> Self {
        ExpandError::Run(e)
    }
}

/// How the caller wants the expansion result shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Full treatment: splitting and pathname expansion.
    Fields,
    /// One field, no splitting, no globbing (redirect targets, `case`
    /// words, heredoc bodies).
    Single,
    /// Like `Single`, but the caller wants the pattern form.
    Pattern,
    /// Like `Single`, plus tilde expansion after `:` and `=` (assignment
    /// right-hand sides).
    Assign,
}

/// Expand words into fields: the argv construction path.
pub async fn expand_fields(interp: &mut Interp, words: &[Word]) -> Result<Vec<String>, ExpandError> {
    let mut out = Vec::new();
    for word in words {
        for braced in expand_braces(word) {
            let fields = run(interp, &braced, Mode::Fields).await?;
            out.extend(fields.into_iter().map(|f| f.val));
        }
    }
    Ok(out)
}

/// Expand one word into exactly one field, joining `$@`-style expansions
/// with spaces. No splitting, no globbing, no brace expansion.
pub async fn expand_single(interp: &mut Interp, word: &Word) -> Result<String, ExpandError> {
    let fields = run(interp, word, Mode::Single).await?;
    Ok(fields.into_iter().map(|f| f.val).collect::<Vec<_>>().join(" "))
}

/// Expand an assignment value (`v=~/x:~/y` tilde rules).
pub async fn expand_assign(interp: &mut Interp, word: &Word) -> Result<String, ExpandError> {
    let fields = run(interp, word, Mode::Assign).await?;
    Ok(fields.into_iter().map(|f| f.val).collect::<Vec<_>>().join(" "))
}

/// Expand one word into pattern text: quoted characters come out
/// escaped, unquoted wildcards stay live.
pub async fn expand_pattern(interp: &mut Interp, word: &Word) -> Result<String, ExpandError> {
    let fields = run(interp, word, Mode::Pattern).await?;
    Ok(fields.into_iter().map(|f| f.pat).collect::<Vec<_>>().join(" "))
}

/// One field under construction.
#[derive(Debug, Default, Clone)]
pub(crate) struct Field {
    pub val: String,
    pub pat: String,
}

struct Expander<'i> {
    interp: &'i mut Interp,
    mode: Mode,
    fields: Vec<Field>,
    cur: Field,
    started: bool,
    /// The previous split was a whitespace-IFS close; a following
    /// non-whitespace separator merges with it.
    ws_closed: bool,
    /// A quoted `$@`-style expansion produced zero elements; `"$@"`
    /// alone must then yield zero fields.
    empty_list_expansion: bool,
}

async fn run(interp: &mut Interp, word: &Word, mode: Mode) -> Result<Vec<Field>, ExpandError> {
    let mut ex = Expander {
        interp,
        mode,
        fields: Vec::new(),
        cur: Field::default(),
        started: false,
        ws_closed: false,
        empty_list_expansion: false,
    };
    ex.word(word, true).await?;
    ex.finish()
}

impl<'i> Expander<'i> {
    fn splitting(&self) -> bool {
        self.mode == Mode::Fields
    }

    fn ifs(&self) -> String {
        self.interp
            .env
            .get_str("IFS")
            .unwrap_or_else(|| " \t\n".to_string())
    }

    // --- Field accumulation ---

    fn close_field(&mut self) {
        self.fields.push(std::mem::take(&mut self.cur));
        self.started = false;
    }

    /// Text that is immune to splitting and globbing.
    fn add_quoted(&mut self, text: &str) {
        self.started = true;
        self.ws_closed = false;
        self.cur.val.push_str(text);
        self.cur.pat.push_str(&glob::escape(text));
    }

    /// Unquoted literal text: quote-removal strips backslashes from
    /// `val`; `pat` keeps them so escaped wildcards stay escaped.
    fn add_lit(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.started = true;
        self.ws_closed = false;
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some(next) => {
                        self.cur.val.push(next);
                        self.cur.pat.push('\\');
                        self.cur.pat.push(next);
                    }
                    None => {
                        self.cur.val.push('\\');
                        self.cur.pat.push_str("\\\\");
                    }
                }
            } else {
                self.cur.val.push(c);
                self.cur.pat.push(c);
            }
        }
    }

    /// Unquoted expansion output: split on IFS when splitting is on;
    /// wildcards in the text stay live for globbing.
    fn add_expansion(&mut self, text: &str) {
        if !self.splitting() {
            if !text.is_empty() {
                self.started = true;
            }
            self.cur.val.push_str(text);
            self.cur.pat.push_str(text);
            return;
        }
        let ifs = self.ifs();
        if ifs.is_empty() {
            if !text.is_empty() {
                self.started = true;
                self.cur.val.push_str(text);
                self.cur.pat.push_str(text);
            }
            return;
        }
        for c in text.chars() {
            if ifs.contains(c) {
                if c.is_whitespace() {
                    if self.started {
                        self.close_field();
                        self.ws_closed = true;
                    }
                } else if self.ws_closed {
                    // Whitespace already delimited here; absorb.
                    self.ws_closed = false;
                } else {
                    self.close_field();
                }
            } else {
                self.started = true;
                self.ws_closed = false;
                self.cur.val.push(c);
                self.cur.pat.push(c);
            }
        }
    }

    /// Multi-element expansion (`"$@"`, `"${a[@]}"`): elements stay
    /// separate fields when quoted, and split individually when not.
    fn add_elems(&mut self, elems: &[String], quoted: bool) {
        if quoted && elems.is_empty() {
            self.empty_list_expansion = true;
        }
        for (i, elem) in elems.iter().enumerate() {
            if i > 0 {
                self.close_field();
            }
            if quoted {
                self.add_quoted(elem);
            } else {
                self.add_expansion(elem);
            }
        }
    }

    // --- Word walk ---

    async fn word(&mut self, word: &Word, tilde_ok: bool) -> Result<(), ExpandError> {
        for (i, part) in word.parts.iter().enumerate() {
            let first = i == 0;
            self.part(part, first && tilde_ok, false).await?;
        }
        Ok(())
    }

    fn part<'a>(
        &'a mut self,
        part: &'a WordPart,
        tilde_ok: bool,
        quoted: bool,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), ExpandError>> + Send + 'a>>
    {
        Box::pin(async move {
            match part {
                WordPart::Lit(text) => {
                    if quoted {
                        self.add_quoted(text);
                    } else if self.mode == Mode::Assign {
                        self.assign_lit(text);
                    } else if tilde_ok {
                        let (home, rest) = self.tilde_split(text);
                        if let Some(home) = home {
                            self.add_quoted(&home);
                        }
                        self.add_lit(&rest);
                    } else {
                        self.add_lit(text);
                    }
                }
                WordPart::SglQuoted(text) => self.add_quoted(text),
                WordPart::AnsiQuoted(text) => self.add_quoted(&ansi_decode(text)),
                WordPart::DblQuoted(parts) => {
                    if parts.is_empty() {
                        // A bare "" produces an empty field.
                        self.started = true;
                        self.ws_closed = false;
                    } else {
                        let outer = self.empty_list_expansion;
                        self.empty_list_expansion = false;
                        for part in parts {
                            self.part(part, false, true).await?;
                        }
                        // Quotes force a field, except when the region
                        // was nothing but a zero-element `$@`.
                        if !self.empty_list_expansion {
                            self.started = true;
                            self.ws_closed = false;
                        }
                        self.empty_list_expansion = outer;
                    }
                }
                WordPart::Param(pe) => {
                    match eval_param(self.interp, pe, quoted).await? {
                        param::ParamValue::Single(s) => {
                            if quoted {
                                self.add_quoted(&s);
                            } else {
                                self.add_expansion(&s);
                            }
                        }
                        param::ParamValue::Elems(elems) => self.add_elems(&elems, quoted),
                    }
                }
                WordPart::CmdSubst(stmts) => {
                    let out = self.interp.capture_stmts(stmts).await?;
                    let trimmed = out.trim_end_matches('\n').replace('\0', "");
                    if quoted {
                        self.add_quoted(&trimmed);
                    } else {
                        self.add_expansion(&trimmed);
                    }
                }
                WordPart::Arith(expr) => {
                    let n = self.interp.eval_arith_text(expr)?;
                    let s = n.to_string();
                    if quoted {
                        self.add_quoted(&s);
                    } else {
                        self.add_expansion(&s);
                    }
                }
                WordPart::ProcSubst { write, stmts } => {
                    let path = self.interp.start_proc_subst(*write, stmts).await?;
                    self.add_quoted(&path);
                }
            }
            Ok(())
        })
    }

    /// Split a leading tilde prefix off an unquoted literal, resolving
    /// it when the prefix names a known directory.
    fn tilde_split(&self, text: &str) -> (Option<String>, String) {
        if !text.starts_with('~') {
            return (None, text.to_string());
        }
        let (prefix, rest) = match text.find('/') {
            Some(i) => (&text[..i], &text[i..]),
            None => (text, ""),
        };
        match self.resolve_tilde(&prefix[1..]) {
            Some(dir) => (Some(dir), rest.to_string()),
            None => (None, text.to_string()),
        }
    }

    fn resolve_tilde(&self, name: &str) -> Option<String> {
        match name {
            "" => self.interp.env.get_str("HOME"),
            "+" => self.interp.env.get_str("PWD"),
            "-" => self.interp.env.get_str("OLDPWD"),
            // Unknown users stay unexpanded, as a shell without the
            // passwd database would leave them.
            _ => None,
        }
    }

    /// Assignment-value literal: tilde expands at the start and after
    /// every `:` (PATH-style values).
    fn assign_lit(&mut self, text: &str) {
        let mut first = self.cur.val.is_empty() && !self.started;
        let mut segment = String::new();
        for c in text.chars() {
            if c == ':' {
                self.assign_segment(&segment, first);
                self.add_lit(":");
                segment.clear();
                first = true;
            } else {
                segment.push(c);
            }
        }
        self.assign_segment(&segment, first);
    }

    fn assign_segment(&mut self, segment: &str, tilde_ok: bool) {
        if tilde_ok {
            let (home, rest) = self.tilde_split(segment);
            if let Some(home) = home {
                self.add_quoted(&home);
            }
            self.add_lit(&rest);
        } else {
            self.add_lit(segment);
        }
    }

    // --- Finish: glob + collect ---

    fn finish(mut self) -> Result<Vec<Field>, ExpandError> {
        if self.started {
            let field = std::mem::take(&mut self.cur);
            self.fields.push(field);
        }
        if self.mode != Mode::Fields || self.interp.opts.noglob {
            return Ok(self.fields);
        }
        let opts = glob::WalkOptions {
            globstar: self.interp.opts.globstar,
            dotglob: self.interp.opts.dotglob,
            casefold: self.interp.opts.nocaseglob,
        };
        let nullglob = self.interp.opts.nullglob;
        let cwd = self.interp.cwd.clone();
        let mut globbed = Vec::new();
        for field in self.fields.drain(..) {
            if !glob::has_meta(&field.pat) {
                globbed.push(field);
                continue;
            }
            let matches = glob::expand_pathname(&cwd, &field.pat, opts);
            if matches.is_empty() {
                if !nullglob {
                    globbed.push(field);
                }
            } else {
                globbed.extend(matches.into_iter().map(|m| Field { pat: glob::escape(&m), val: m }));
            }
        }
        Ok(globbed)
    }
}
