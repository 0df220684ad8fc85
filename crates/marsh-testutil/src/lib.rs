//! Test helpers for driving the marsh kernel without a parser.
//!
//! The kernel consumes pre-parsed ASTs, so tests build them here with
//! small combinators, and `source`/`eval`/`trap` get a scripted
//! [`ParseHandler`] that either replays registered ASTs or falls back
//! to a whitespace-level reading of plain commands.

use std::collections::HashMap;
use std::sync::Mutex;

use marsh_kernel::ast::{
    ArrayElem, Assign, AssignValue, CaseItem, Cmd, File, IfClause, ListOp, ParamExp, Pipeline,
    PipeStage, Redirect, RedirOp, SimpleCmd, Stmt, TestExpr, Word, WordPart,
};
use marsh_kernel::exec::ParseHandler;
use marsh_kernel::io::{FdFile, MemWriter};
use marsh_kernel::runner::{Runner, RunnerConfig};
use marsh_kernel::RunError;

// --- Words ---

pub fn lit(s: &str) -> Word {
    Word::lit(s)
}

pub fn word(parts: Vec<WordPart>) -> Word {
    Word { parts }
}

/// `$name`, unquoted.
pub fn var(name: &str) -> Word {
    word(vec![WordPart::Param(Box::new(ParamExp::plain(name)))])
}

/// `"..."` around arbitrary parts.
pub fn dq(parts: Vec<WordPart>) -> Word {
    word(vec![WordPart::DblQuoted(parts)])
}

/// `"$name"`.
pub fn dq_var(name: &str) -> Word {
    dq(vec![WordPart::Param(Box::new(ParamExp::plain(name)))])
}

/// `"text"`.
pub fn dq_lit(s: &str) -> Word {
    dq(vec![WordPart::Lit(s.to_string())])
}

/// `'text'`.
pub fn sq(s: &str) -> Word {
    word(vec![WordPart::SglQuoted(s.to_string())])
}

/// A parameter expansion part, for composing words.
pub fn param_part(pe: ParamExp) -> WordPart {
    WordPart::Param(Box::new(pe))
}

/// `$(( expr ))`.
pub fn arith_word(expr: &str) -> Word {
    word(vec![WordPart::Arith(expr.to_string())])
}

/// `$( stmts )`.
pub fn cmdsub(stmts: Vec<Stmt>) -> Word {
    word(vec![WordPart::CmdSubst(stmts)])
}

// --- Simple commands ---

pub struct CmdBuilder {
    assigns: Vec<Assign>,
    words: Vec<Word>,
    redirs: Vec<Redirect>,
    line: u32,
}

/// `cmd("echo").arg("hi").stmt()`.
pub fn cmd(name: &str) -> CmdBuilder {
    CmdBuilder { assigns: vec![], words: vec![Word::lit(name)], redirs: vec![], line: 1 }
}

/// A bare assignment command (`NAME=value` with no words).
pub fn assigns() -> CmdBuilder {
    CmdBuilder { assigns: vec![], words: vec![], redirs: vec![], line: 1 }
}

impl CmdBuilder {
    pub fn arg(mut self, s: &str) -> Self {
        self.words.push(Word::lit(s));
        self
    }

    pub fn argw(mut self, w: Word) -> Self {
        self.words.push(w);
        self
    }

    pub fn args(mut self, items: &[&str]) -> Self {
        self.words.extend(items.iter().map(|s| Word::lit(*s)));
        self
    }

    pub fn assign(mut self, name: &str, value: &str) -> Self {
        self.assigns.push(Assign {
            name: name.to_string(),
            subscript: None,
            append: false,
            value: AssignValue::Scalar(Word::lit(value)),
        });
        self
    }

    pub fn assignw(mut self, name: &str, value: Word) -> Self {
        self.assigns.push(Assign {
            name: name.to_string(),
            subscript: None,
            append: false,
            value: AssignValue::Scalar(value),
        });
        self
    }

    pub fn append(mut self, name: &str, value: &str) -> Self {
        self.assigns.push(Assign {
            name: name.to_string(),
            subscript: None,
            append: true,
            value: AssignValue::Scalar(Word::lit(value)),
        });
        self
    }

    pub fn array(mut self, name: &str, items: &[&str]) -> Self {
        self.assigns.push(Assign {
            name: name.to_string(),
            subscript: None,
            append: false,
            value: AssignValue::Array(
                items
                    .iter()
                    .map(|s| ArrayElem { key: None, value: Word::lit(*s) })
                    .collect(),
            ),
        });
        self
    }

    pub fn arrayw(mut self, name: &str, items: Vec<Word>) -> Self {
        self.assigns.push(Assign {
            name: name.to_string(),
            subscript: None,
            append: false,
            value: AssignValue::Array(
                items.into_iter().map(|value| ArrayElem { key: None, value }).collect(),
            ),
        });
        self
    }

    pub fn subscript_assign(mut self, name: &str, sub: &str, value: &str) -> Self {
        self.assigns.push(Assign {
            name: name.to_string(),
            subscript: Some(Word::lit(sub)),
            append: false,
            value: AssignValue::Scalar(Word::lit(value)),
        });
        self
    }

    pub fn redir(mut self, fd: Option<u32>, op: RedirOp, target: Word) -> Self {
        self.redirs.push(Redirect { fd, op, target, heredoc: None });
        self
    }

    pub fn heredoc(mut self, body: Word, strip_tabs: bool, quoted: bool) -> Self {
        self.redirs.push(Redirect {
            fd: None,
            op: RedirOp::Heredoc { strip_tabs, quoted },
            target: Word::lit("EOF"),
            heredoc: Some(body),
        });
        self
    }

    pub fn line(mut self, line: u32) -> Self {
        self.line = line;
        self
    }

    pub fn stmt(self) -> Stmt {
        Stmt {
            line: self.line,
            negated: false,
            background: false,
            redirs: self.redirs,
            cmd: Cmd::Simple(SimpleCmd { assigns: self.assigns, words: self.words }),
        }
    }
}

// --- Compound statements ---

pub fn file(stmts: Vec<Stmt>) -> File {
    File::new("test", stmts)
}

pub fn pipeline(stages: Vec<Stmt>) -> Stmt {
    Stmt::of(Cmd::Pipeline(Pipeline {
        stages: stages
            .into_iter()
            .map(|stmt| PipeStage { stmt, stderr_too: false })
            .collect(),
    }))
}

pub fn and(left: Stmt, right: Stmt) -> Stmt {
    Stmt::of(Cmd::List { op: ListOp::And, left: Box::new(left), right: Box::new(right) })
}

pub fn or(left: Stmt, right: Stmt) -> Stmt {
    Stmt::of(Cmd::List { op: ListOp::Or, left: Box::new(left), right: Box::new(right) })
}

pub fn negate(mut stmt: Stmt) -> Stmt {
    stmt.negated = true;
    stmt
}

pub fn background(mut stmt: Stmt) -> Stmt {
    stmt.background = true;
    stmt
}

pub fn block(stmts: Vec<Stmt>) -> Stmt {
    Stmt::of(Cmd::Block(stmts))
}

pub fn subshell(stmts: Vec<Stmt>) -> Stmt {
    Stmt::of(Cmd::Subshell(stmts))
}

pub fn if_else(cond: Vec<Stmt>, then_body: Vec<Stmt>, else_body: Option<Vec<Stmt>>) -> Stmt {
    Stmt::of(Cmd::If(IfClause { cond, then_body, elifs: vec![], else_body }))
}

pub fn while_loop(cond: Vec<Stmt>, body: Vec<Stmt>) -> Stmt {
    Stmt::of(Cmd::While { until: false, cond, body })
}

pub fn until_loop(cond: Vec<Stmt>, body: Vec<Stmt>) -> Stmt {
    Stmt::of(Cmd::While { until: true, cond, body })
}

pub fn for_in(var: &str, items: Vec<Word>, body: Vec<Stmt>) -> Stmt {
    Stmt::of(Cmd::ForIn { var: var.to_string(), words: Some(items), body })
}

pub fn for_args(var: &str, body: Vec<Stmt>) -> Stmt {
    Stmt::of(Cmd::ForIn { var: var.to_string(), words: None, body })
}

pub fn for_arith(
    init: Option<&str>,
    cond: Option<&str>,
    post: Option<&str>,
    body: Vec<Stmt>,
) -> Stmt {
    Stmt::of(Cmd::ForArith {
        init: init.map(String::from),
        cond: cond.map(String::from),
        post: post.map(String::from),
        body,
    })
}

pub fn case_stmt(subject: Word, items: Vec<(Vec<Word>, Vec<Stmt>)>) -> Stmt {
    Stmt::of(Cmd::Case {
        word: subject,
        items: items
            .into_iter()
            .map(|(patterns, body)| CaseItem { patterns, body })
            .collect(),
    })
}

pub fn func(name: &str, body: Stmt) -> Stmt {
    Stmt::of(Cmd::FuncDecl { name: name.to_string(), body: std::sync::Arc::new(body) })
}

pub fn test_stmt(expr: TestExpr) -> Stmt {
    Stmt::of(Cmd::Test(expr))
}

pub fn arith_stmt(expr: &str) -> Stmt {
    Stmt::of(Cmd::Arith(expr.to_string()))
}

// --- Scripted parser ---

/// Parse handler for tests: replays registered ASTs by exact source
/// text, and falls back to reading plain `word word; word` commands.
#[derive(Default)]
pub struct ScriptedParser {
    scripts: Mutex<HashMap<String, File>>,
}

impl ScriptedParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the AST to hand back for one exact source string.
    pub fn register(&self, src: &str, file: File) {
        self.scripts.lock().expect("scripts lock").insert(src.to_string(), file);
    }
}

impl ParseHandler for ScriptedParser {
    fn parse(&self, src: &str, name: &str) -> Result<File, String> {
        if let Some(file) = self.scripts.lock().expect("scripts lock").get(src) {
            return Ok(file.clone());
        }
        parse_plain(src, name)
    }
}

/// Whitespace-level reading of simple commands: statements split on
/// newlines and `;`, words on whitespace, `NAME=value` prefixes become
/// assignments. Enough for `trap 'echo bye' EXIT` and friends.
pub fn parse_plain(src: &str, name: &str) -> Result<File, String> {
    let mut stmts = Vec::new();
    for (lineno, line) in src.lines().enumerate() {
        for piece in line.split(';') {
            let tokens: Vec<&str> = piece.split_whitespace().collect();
            if tokens.is_empty() {
                continue;
            }
            let mut assigns = Vec::new();
            let mut words = Vec::new();
            for token in tokens {
                if words.is_empty() {
                    if let Some((n, v)) = token.split_once('=') {
                        if !n.is_empty()
                            && n.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                        {
                            assigns.push(Assign {
                                name: n.to_string(),
                                subscript: None,
                                append: false,
                                value: AssignValue::Scalar(token_word(v)),
                            });
                            continue;
                        }
                    }
                }
                words.push(token_word(token));
            }
            stmts.push(Stmt {
                line: (lineno + 1) as u32,
                negated: false,
                background: false,
                redirs: vec![],
                cmd: Cmd::Simple(SimpleCmd { assigns, words }),
            });
        }
    }
    if stmts.is_empty() {
        return Ok(File::new(name, vec![]));
    }
    Ok(File::new(name, stmts))
}

/// `$name` tokens become parameter expansions so sourced snippets can
/// read variables.
fn token_word(token: &str) -> Word {
    if let Some(name) = token.strip_prefix('$') {
        if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return var(name);
        }
    }
    Word::lit(token)
}

// --- Shell harness ---

/// A runner wired to in-memory stdio and the scripted parser.
pub struct TestShell {
    pub runner: Runner,
    pub out: MemWriter,
    pub err: MemWriter,
    pub parser: std::sync::Arc<ScriptedParser>,
}

/// Build a harness shell rooted at `/` with captured stdout/stderr.
pub fn shell() -> TestShell {
    shell_at("/")
}

/// Build a harness shell with a specific working directory.
pub fn shell_at(dir: &str) -> TestShell {
    let out = MemWriter::new();
    let err = MemWriter::new();
    let parser = std::sync::Arc::new(ScriptedParser::new());
    let config = RunnerConfig::new()
        .dir(dir)
        .env(vec![
            "PATH=/usr/local/bin:/usr/bin:/bin".to_string(),
            "HOME=/root".to_string(),
        ])
        .stdio(
            FdFile::Null,
            FdFile::writer(out.clone()),
            FdFile::writer(err.clone()),
        )
        .parse_handler(parser.clone());
    let runner = Runner::new(config).expect("harness runner");
    TestShell { runner, out, err, parser }
}

impl TestShell {
    /// Run statements; map the outcome to a final status byte.
    pub async fn run(&mut self, stmts: Vec<Stmt>) -> u8 {
        match self.runner.run(&file(stmts)).await {
            Ok(()) => 0,
            Err(RunError::ExitStatus(n)) => n,
            Err(other) => panic!("unexpected runner error: {other}"),
        }
    }

    pub fn stdout(&self) -> String {
        self.out.text()
    }

    pub fn stderr(&self) -> String {
        self.err.text()
    }

    /// Feed the next run a fresh stdin.
    pub fn set_stdin(&mut self, data: &str) {
        // The fd table is rebuilt per call through the runner config, so
        // reach into the current interpreter state instead.
        let fd = FdFile::from_bytes(data.as_bytes().to_vec());
        self.runner.set_fd(0, fd);
    }
}
