//! AST type definitions.
//!
//! The AST is the input surface of the interpreter: a host parser builds
//! these nodes and hands them to [`crate::runner::Runner::run`]. Statements
//! carry 1-based line numbers so `$LINENO` works.

use std::sync::Arc;

/// A parsed script: a named sequence of statements.
#[derive(Debug, Clone, PartialEq)]
pub struct File {
    /// Script name, becomes `$0` context for diagnostics.
    pub name: String,
    pub stmts: Vec<Stmt>,
}

impl File {
    pub fn new(name: impl Into<String>, stmts: Vec<Stmt>) -> Self {
        Self { name: name.into(), stmts }
    }
}

/// A single statement: a command with its prefix/suffix decorations.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    /// 1-based source line.
    pub line: u32,
    /// `!` prefix: invert the exit status.
    pub negated: bool,
    /// `&` suffix: run in the background.
    pub background: bool,
    /// Redirections applied around the command.
    pub redirs: Vec<Redirect>,
    pub cmd: Cmd,
}

impl Stmt {
    /// Wrap a command in an undecorated statement.
    pub fn of(cmd: Cmd) -> Self {
        Self { line: 1, negated: false, background: false, redirs: Vec::new(), cmd }
    }
}

/// Command kinds the evaluator dispatches on.
#[derive(Debug, Clone, PartialEq)]
pub enum Cmd {
    /// `name args... >redir` with optional leading assignments.
    Simple(SimpleCmd),
    /// `a | b | c`, possibly with `|&` connections.
    Pipeline(Pipeline),
    /// `left && right` / `left || right`.
    List { op: ListOp, left: Box<Stmt>, right: Box<Stmt> },
    /// `{ ...; }` — same environment, grouped redirections.
    Block(Vec<Stmt>),
    /// `( ... )` — isolated copy of the environment.
    Subshell(Vec<Stmt>),
    /// `if cond; then ...; elif ...; else ...; fi`.
    If(IfClause),
    /// `while cond; do ...; done`, or `until` when inverted.
    While { until: bool, cond: Vec<Stmt>, body: Vec<Stmt> },
    /// `for name in words...; do ...; done`. `words: None` means `in "$@"`.
    ForIn { var: String, words: Option<Vec<Word>>, body: Vec<Stmt> },
    /// `for ((init; cond; post)); do ...; done`. Missing parts are empty.
    ForArith {
        init: Option<String>,
        cond: Option<String>,
        post: Option<String>,
        body: Vec<Stmt>,
    },
    /// `case word in pattern) ...;; esac`.
    Case { word: Word, items: Vec<CaseItem> },
    /// `name() { body; }`.
    FuncDecl { name: String, body: Arc<Stmt> },
    /// `[[ ... ]]`.
    Test(TestExpr),
    /// `(( expr ))` — status 0 when the value is non-zero.
    Arith(String),
    /// `time cmd` (or bare `time`).
    Time(Option<Box<Stmt>>),
}

/// `&&` / `||` list connectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOp {
    And,
    Or,
}

/// A simple command: assignment prefix plus words.
///
/// With no words the assignments mutate the shell; with words they are
/// exported into just that command's environment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimpleCmd {
    pub assigns: Vec<Assign>,
    pub words: Vec<Word>,
}

/// One `name=value` (or `name+=value`, `name[sub]=value`, `name=(...)`).
#[derive(Debug, Clone, PartialEq)]
pub struct Assign {
    pub name: String,
    /// `name[sub]=...` subscript, if present.
    pub subscript: Option<Word>,
    /// `+=` append.
    pub append: bool,
    pub value: AssignValue,
}

/// Right-hand side of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignValue {
    /// `name=word` (a missing value is an empty word).
    Scalar(Word),
    /// `name=(elem...)`, each optionally `[key]=value`.
    Array(Vec<ArrayElem>),
}

/// One element of an array literal.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayElem {
    /// `[key]=` prefix: arithmetic for indexed, string for associative.
    pub key: Option<Word>,
    pub value: Word,
}

/// A pipeline of two or more stages (a single stage is a plain `Stmt`).
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub stages: Vec<PipeStage>,
}

/// One pipeline stage. `stderr_too` records a `|&` connection: this
/// stage's stderr joins its stdout into the pipe feeding the next stage.
#[derive(Debug, Clone, PartialEq)]
pub struct PipeStage {
    pub stmt: Stmt,
    pub stderr_too: bool,
}

/// `if`/`elif`/`else` chains.
#[derive(Debug, Clone, PartialEq)]
pub struct IfClause {
    pub cond: Vec<Stmt>,
    pub then_body: Vec<Stmt>,
    pub elifs: Vec<(Vec<Stmt>, Vec<Stmt>)>,
    pub else_body: Option<Vec<Stmt>>,
}

/// One `pattern|pattern) body ;;` branch of a `case`.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseItem {
    pub patterns: Vec<Word>,
    pub body: Vec<Stmt>,
}

/// A word: the unit of expansion. Parts preserve quoting structure.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Word {
    pub parts: Vec<WordPart>,
}

impl Word {
    /// A single unquoted literal.
    pub fn lit(s: impl Into<String>) -> Self {
        Self { parts: vec![WordPart::Lit(s.into())] }
    }

    /// The word's literal text when it is one unquoted literal part.
    pub fn as_lit(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [WordPart::Lit(s)] => Some(s),
            _ => None,
        }
    }
}

/// One syntactic piece of a word.
#[derive(Debug, Clone, PartialEq)]
pub enum WordPart {
    /// Unquoted text; may still contain `\` escapes and brace patterns.
    Lit(String),
    /// `'...'` — fully literal.
    SglQuoted(String),
    /// `"..."` — inner expansions allowed, no splitting or globbing.
    /// `$"..."` is represented the same way.
    DblQuoted(Vec<WordPart>),
    /// `$'...'` — ANSI-C escapes, decoded at expansion time.
    AnsiQuoted(String),
    /// `$name`, `${name}`, and every `${name<op>}` form.
    Param(Box<ParamExp>),
    /// `$(...)` or backquotes.
    CmdSubst(Vec<Stmt>),
    /// `$(( ... ))`, body kept as text for the arithmetic evaluator.
    Arith(String),
    /// `<(...)` / `>(...)` — expands to a path naming a live pipe.
    ProcSubst { write: bool, stmts: Vec<Stmt> },
}

/// A parameter expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamExp {
    /// Variable name, or a special parameter (`@ * # ? $ ! 0 1 ...`).
    pub name: String,
    /// `name[...]` subscript.
    pub index: Option<ParamIndex>,
    pub op: ParamOp,
}

impl ParamExp {
    /// Plain `$name`.
    pub fn plain(name: impl Into<String>) -> Self {
        Self { name: name.into(), index: None, op: ParamOp::Plain }
    }
}

/// Array subscript inside `${name[...]}`.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamIndex {
    /// `[@]`
    All,
    /// `[*]`
    Star,
    /// `[expr]`: arithmetic for indexed arrays, a key for associative.
    Word(Word),
}

/// The `${...}` modifier applied to a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamOp {
    /// `${v}`
    Plain,
    /// `${#v}`
    Length,
    /// `${v-w}` / `${v:-w}`
    Default { word: Word, colon: bool },
    /// `${v=w}` / `${v:=w}`
    AssignDefault { word: Word, colon: bool },
    /// `${v+w}` / `${v:+w}`
    Alternate { word: Word, colon: bool },
    /// `${v?w}` / `${v:?w}`
    ErrorIfUnset { word: Word, colon: bool },
    /// `${v:off}` / `${v:off:len}`; offsets are arithmetic text.
    Substring { offset: String, length: Option<String> },
    /// `${v#pat}` `${v##pat}` `${v%pat}` `${v%%pat}`
    Strip { pat: Word, suffix: bool, longest: bool },
    /// `${v/pat/rep}` / `${v//pat/rep}`
    Replace { pat: Word, with: Word, all: bool },
    /// `${v^pat}` `${v^^pat}` `${v,pat}` `${v,,pat}`
    ChangeCase { upper: bool, all: bool, pat: Option<Word> },
    /// `${!v}`
    Indirect,
    /// `${!prefix*}` / `${!prefix@}` — `name` holds the prefix.
    NamesWithPrefix { star: bool },
    /// `${v@Q}`
    Quote,
    /// `${v@E}`
    Unescape,
}

/// `[[ ... ]]` expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum TestExpr {
    /// `-f word`, `-z word`, ...
    Unary { op: String, operand: Word },
    /// `lhs -eq rhs`, `lhs == rhs`, `lhs =~ rhs`, ...
    Binary { op: String, lhs: Word, rhs: Word },
    Not(Box<TestExpr>),
    And(Box<TestExpr>, Box<TestExpr>),
    Or(Box<TestExpr>, Box<TestExpr>),
}

/// An I/O redirection attached to a statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Redirect {
    /// Explicit fd (`2>`); defaults per operator when absent.
    pub fd: Option<u32>,
    pub op: RedirOp,
    /// Target word: a path, a fd number for dups, or the here-string body.
    pub target: Word,
    /// Here-document body for the heredoc operators.
    pub heredoc: Option<Word>,
}

/// Redirection operators.
#[derive(Debug, Clone, PartialEq)]
pub enum RedirOp {
    /// `>`
    Out,
    /// `>>`
    Append,
    /// `<`
    In,
    /// `<>`
    ReadWrite,
    /// `&>` — stdout and stderr to the file.
    OutBoth,
    /// `&>>`
    AppendBoth,
    /// `N>&M` / `N>&-`
    DupOut,
    /// `N<&M` / `N<&-`
    DupIn,
    /// `<<` / `<<-`. `quoted` records a quoted delimiter (no expansion).
    Heredoc { strip_tabs: bool, quoted: bool },
    /// `<<<`
    HereString,
}

impl RedirOp {
    /// Default fd this operator applies to when none is written.
    pub fn default_fd(&self) -> u32 {
        match self {
            RedirOp::In
            | RedirOp::ReadWrite
            | RedirOp::DupIn
            | RedirOp::Heredoc { .. }
            | RedirOp::HereString => 0,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_lit_round_trip() {
        let w = Word::lit("hello");
        assert_eq!(w.as_lit(), Some("hello"));
    }

    #[test]
    fn quoted_word_is_not_lit() {
        let w = Word { parts: vec![WordPart::SglQuoted("hello".into())] };
        assert_eq!(w.as_lit(), None);
    }

    #[test]
    fn default_fds() {
        assert_eq!(RedirOp::Out.default_fd(), 1);
        assert_eq!(RedirOp::Append.default_fd(), 1);
        assert_eq!(RedirOp::In.default_fd(), 0);
        assert_eq!(RedirOp::HereString.default_fd(), 0);
        assert_eq!(RedirOp::DupOut.default_fd(), 1);
    }

    #[test]
    fn stmt_of_is_undecorated() {
        let s = Stmt::of(Cmd::Block(vec![]));
        assert!(!s.negated);
        assert!(!s.background);
        assert!(s.redirs.is_empty());
    }
}
