//! The recursive statement evaluator.
//!
//! Dispatches on AST node kind, owns the errexit/ERR-trap decision, and
//! spawns the concurrent tasks behind pipelines and `&`.

use std::sync::Arc;
use std::time::Instant;

use crate::ast::{
    Assign, AssignValue, Cmd, File, IfClause, ListOp, Pipeline, SimpleCmd, Stmt, Word,
};
use crate::builtins;
use crate::error::RunError;
use crate::exec::{lookup_path, ExecOutcome, HandlerContext, STATUS_NOT_FOUND};
use crate::expand::{expand_assign, expand_fields, expand_pattern, expand_single, ExpandError};
use crate::io::FdFile;
use crate::scheduler::pipe_default;
use crate::vars::{ArrayKey, SetMode, Value};

use super::{Flow, Interp};

type BoxFlow<'a> = std::pin::Pin<
    Box<dyn std::future::Future<Output = Result<Flow, RunError>> + Send + 'a>,
>;

impl Interp {
    /// Run a whole file node. The caller (the runner facade) decides
    /// what the final status means and fires the EXIT trap.
    pub async fn run_file(&mut self, file: &File) -> Result<(), RunError> {
        if self.env.script_name.is_empty() {
            self.env.script_name = file.name.clone();
        }
        self.run_stmts(&file.stmts).await?;
        Ok(())
    }

    /// Run a statement list, stopping at the first raised flow or exit.
    pub(crate) async fn run_stmts(&mut self, stmts: &[Stmt]) -> Result<Flow, RunError> {
        for stmt in stmts {
            let flow = self.run_stmt(stmt).await?;
            if flow != Flow::Normal {
                return Ok(flow);
            }
            if self.exited {
                break;
            }
        }
        Ok(Flow::Normal)
    }

    /// Evaluate one statement with its decorations (background, `!`,
    /// redirections). This is the recursion point, hence the boxing.
    pub(crate) fn run_stmt<'a>(&'a mut self, stmt: &'a Stmt) -> BoxFlow<'a> {
        Box::pin(async move {
            if self.cancel.is_cancelled() {
                return Err(RunError::Cancelled);
            }
            if self.exited {
                return Ok(Flow::Normal);
            }
            self.line = stmt.line;

            if stmt.background {
                return self.run_background(stmt).await;
            }

            // Redirections apply for the duration of the command and are
            // unwound on every exit path.
            let saved_fds = if stmt.redirs.is_empty() { None } else { Some(self.fds.clone()) };
            if let Some(err) = self.try_apply_redirects(&stmt.redirs).await? {
                if let Some(saved) = saved_fds {
                    self.fds = saved;
                }
                self.report_expand_err(err).await;
                self.after_command(stmt).await;
                return Ok(Flow::Normal);
            }

            let result = self.eval_cmd(&stmt.cmd).await;

            if let Some(saved) = saved_fds {
                if self.keep_redirs {
                    self.keep_redirs = false;
                } else {
                    self.fds = saved;
                }
            }

            let flow = result?;
            if stmt.negated {
                self.last_status = if self.last_status == 0 { 1 } else { 0 };
            }
            // `&&`/`||` lists never trigger errexit themselves: a failed
            // left side is exempt, and the branch statements already ran
            // their own check, so a list-level one would only re-report
            // the left operand's status.
            if flow == Flow::Normal && !matches!(stmt.cmd, Cmd::List { .. }) {
                self.after_command(stmt).await;
            }
            Ok(flow)
        })
    }

    async fn try_apply_redirects(
        &mut self,
        redirs: &[crate::ast::Redirect],
    ) -> Result<Option<ExpandError>, RunError> {
        match self.apply_redirects(redirs).await {
            Ok(()) => Ok(None),
            Err(ExpandError::Run(err)) => Err(err),
            Err(other) => Ok(Some(other)),
        }
    }

    /// ERR trap and errexit, applied after a completed command.
    async fn after_command(&mut self, stmt: &Stmt) {
        if self.last_status == 0 || stmt.negated || self.no_errexit > 0 || self.exited {
            return;
        }
        self.fire_trap("ERR").await;
        if self.opts.errexit {
            self.exited = true;
        }
    }

    async fn report_expand_err(&mut self, err: ExpandError) {
        if let ExpandError::Message { status, fatal, text } = err {
            self.stderr_line(&text).await;
            self.last_status = status;
            if fatal {
                self.exited = true;
            }
        }
    }

    async fn run_background(&mut self, stmt: &Stmt) -> Result<Flow, RunError> {
        let mut child = self.subshell_clone();
        let mut inner = stmt.clone();
        inner.background = false;
        let label = format!("job @ line {}", stmt.line);
        let handle = tokio::spawn(async move {
            let _ = child.run_stmt(&inner).await;
            child.last_status
        });
        let id = self.jobs.register(label, handle);
        self.last_bg = Some(id);
        self.last_status = 0;
        Ok(Flow::Normal)
    }

    async fn eval_cmd(&mut self, cmd: &Cmd) -> Result<Flow, RunError> {
        match cmd {
            Cmd::Simple(sc) => self.run_simple(sc).await,
            Cmd::Pipeline(p) => {
                self.run_pipeline(p).await?;
                Ok(Flow::Normal)
            }
            Cmd::List { op, left, right } => self.run_list(*op, left, right).await,
            Cmd::Block(stmts) => self.run_stmts(stmts).await,
            Cmd::Subshell(stmts) => {
                let mut child = self.subshell_clone();
                let stmts = stmts.to_vec();
                child.run_stmts(&stmts).await?;
                self.last_status = child.last_status;
                self.last_bg = child.last_bg;
                Ok(Flow::Normal)
            }
            Cmd::If(clause) => self.run_if(clause).await,
            Cmd::While { until, cond, body } => self.run_while(*until, cond, body).await,
            Cmd::ForIn { var, words, body } => self.run_for_in(var, words.as_deref(), body).await,
            Cmd::ForArith { init, cond, post, body } => {
                self.run_for_arith(init.as_deref(), cond.as_deref(), post.as_deref(), body).await
            }
            Cmd::Case { word, items } => self.run_case(word, items).await,
            Cmd::FuncDecl { name, body } => {
                self.funcs.insert(name.clone(), body.clone());
                self.last_status = 0;
                Ok(Flow::Normal)
            }
            Cmd::Test(expr) => {
                match crate::test_expr::eval_test_ast(self, expr).await {
                    Ok(true) => self.last_status = 0,
                    Ok(false) => self.last_status = 1,
                    Err(ExpandError::Run(err)) => return Err(err),
                    Err(err) => self.report_expand_err(err).await,
                }
                Ok(Flow::Normal)
            }
            Cmd::Arith(expr) => {
                match self.eval_arith_text(expr) {
                    Ok(v) => self.last_status = if v != 0 { 0 } else { 1 },
                    Err(ExpandError::Run(err)) => return Err(err),
                    Err(err) => self.report_expand_err(err).await,
                }
                Ok(Flow::Normal)
            }
            Cmd::Time(inner) => self.run_time(inner.as_deref()).await,
        }
    }

    // --- Lists and conditionals ---

    async fn run_list(&mut self, op: ListOp, left: &Stmt, right: &Stmt) -> Result<Flow, RunError> {
        self.no_errexit += 1;
        let flow = self.run_stmt(left).await;
        self.no_errexit -= 1;
        let flow = flow?;
        if flow != Flow::Normal {
            return Ok(flow);
        }
        let proceed = match op {
            ListOp::And => self.last_status == 0,
            ListOp::Or => self.last_status != 0,
        };
        if proceed && !self.exited {
            return self.run_stmt(right).await;
        }
        Ok(Flow::Normal)
    }

    /// Run a condition list: errexit and the ERR trap are off inside.
    async fn run_cond(&mut self, stmts: &[Stmt]) -> Result<Flow, RunError> {
        self.no_errexit += 1;
        let result = self.run_stmts(stmts).await;
        self.no_errexit -= 1;
        result
    }

    async fn run_if(&mut self, clause: &IfClause) -> Result<Flow, RunError> {
        let flow = self.run_cond(&clause.cond).await?;
        if flow != Flow::Normal {
            return Ok(flow);
        }
        if self.last_status == 0 {
            return self.run_stmts(&clause.then_body).await;
        }
        for (cond, body) in &clause.elifs {
            let flow = self.run_cond(cond).await?;
            if flow != Flow::Normal {
                return Ok(flow);
            }
            if self.last_status == 0 {
                return self.run_stmts(body).await;
            }
        }
        if let Some(body) = &clause.else_body {
            return self.run_stmts(body).await;
        }
        self.last_status = 0;
        Ok(Flow::Normal)
    }

    // --- Loops ---

    async fn run_while(
        &mut self,
        until: bool,
        cond: &[Stmt],
        body: &[Stmt],
    ) -> Result<Flow, RunError> {
        self.loop_depth += 1;
        let mut body_status = 0u8;
        let flow = loop {
            if self.cancel.is_cancelled() {
                self.loop_depth -= 1;
                return Err(RunError::Cancelled);
            }
            let flow = self.run_cond(cond).await?;
            if flow != Flow::Normal {
                match Self::loop_ctl(flow) {
                    LoopCtl::Break => break Flow::Normal,
                    LoopCtl::Next => continue,
                    LoopCtl::Raise(f) => break f,
                }
            }
            let truthy = (self.last_status == 0) != until;
            if !truthy || self.exited {
                break Flow::Normal;
            }
            let flow = self.run_stmts(body).await?;
            body_status = self.last_status;
            match Self::loop_ctl(flow) {
                LoopCtl::Break => break Flow::Normal,
                LoopCtl::Next => continue,
                LoopCtl::Raise(f) => break f,
            }
        };
        self.loop_depth -= 1;
        self.last_status = body_status;
        Ok(flow)
    }

    async fn run_for_in(
        &mut self,
        var: &str,
        words: Option<&[Word]>,
        body: &[Stmt],
    ) -> Result<Flow, RunError> {
        let items = match words {
            Some(words) => match expand_fields(self, words).await {
                Ok(items) => items,
                Err(ExpandError::Run(err)) => return Err(err),
                Err(err) => {
                    self.report_expand_err(err).await;
                    return Ok(Flow::Normal);
                }
            },
            None => self.env.positional().to_vec(),
        };

        self.loop_depth += 1;
        let mut body_status = 0u8;
        let mut raised = Flow::Normal;
        for item in items {
            if self.cancel.is_cancelled() {
                self.loop_depth -= 1;
                return Err(RunError::Cancelled);
            }
            if self.exited {
                break;
            }
            if let Err(e) = self.env.set_scalar(var, item, SetMode::Auto) {
                self.stderr_line(&e.to_string()).await;
                body_status = 1;
                break;
            }
            let flow = self.run_stmts(body).await?;
            body_status = self.last_status;
            match Self::loop_ctl(flow) {
                LoopCtl::Break => break,
                LoopCtl::Next => continue,
                LoopCtl::Raise(f) => {
                    raised = f;
                    break;
                }
            }
        }
        self.loop_depth -= 1;
        self.last_status = body_status;
        Ok(raised)
    }

    async fn run_for_arith(
        &mut self,
        init: Option<&str>,
        cond: Option<&str>,
        post: Option<&str>,
        body: &[Stmt],
    ) -> Result<Flow, RunError> {
        if let Some(init) = init {
            if let Err(err) = self.eval_arith_text(init) {
                self.report_expand_err(err).await;
                return Ok(Flow::Normal);
            }
        }
        self.loop_depth += 1;
        let mut body_status = 0u8;
        let flow = loop {
            if self.cancel.is_cancelled() {
                self.loop_depth -= 1;
                return Err(RunError::Cancelled);
            }
            // A missing condition is true.
            if let Some(cond) = cond {
                match self.eval_arith_text(cond) {
                    Ok(v) => {
                        if v == 0 {
                            break Flow::Normal;
                        }
                    }
                    Err(err) => {
                        self.report_expand_err(err).await;
                        break Flow::Normal;
                    }
                }
            }
            if self.exited {
                break Flow::Normal;
            }
            let flow = self.run_stmts(body).await?;
            body_status = self.last_status;
            match Self::loop_ctl(flow) {
                LoopCtl::Break => break Flow::Normal,
                LoopCtl::Next => {}
                LoopCtl::Raise(f) => break f,
            }
            if let Some(post) = post {
                if let Err(err) = self.eval_arith_text(post) {
                    self.report_expand_err(err).await;
                    break Flow::Normal;
                }
            }
        };
        self.loop_depth -= 1;
        self.last_status = body_status;
        Ok(flow)
    }

    fn loop_ctl(flow: Flow) -> LoopCtl {
        match flow {
            Flow::Normal => LoopCtl::Next,
            Flow::Break(n) if n <= 1 => LoopCtl::Break,
            Flow::Break(n) => LoopCtl::Raise(Flow::Break(n - 1)),
            Flow::Continue(n) if n <= 1 => LoopCtl::Next,
            Flow::Continue(n) => LoopCtl::Raise(Flow::Continue(n - 1)),
            Flow::Return => LoopCtl::Raise(Flow::Return),
        }
    }

    // --- Case ---

    async fn run_case(
        &mut self,
        word: &Word,
        items: &[crate::ast::CaseItem],
    ) -> Result<Flow, RunError> {
        let subject = match expand_single(self, word).await {
            Ok(s) => s,
            Err(ExpandError::Run(err)) => return Err(err),
            Err(err) => {
                self.report_expand_err(err).await;
                return Ok(Flow::Normal);
            }
        };
        for item in items {
            for pat_word in &item.patterns {
                let pat_text = match expand_pattern(self, pat_word).await {
                    Ok(s) => s,
                    Err(ExpandError::Run(err)) => return Err(err),
                    Err(err) => {
                        self.report_expand_err(err).await;
                        return Ok(Flow::Normal);
                    }
                };
                let pattern = if self.opts.nocasematch {
                    marsh_glob::Pattern::case_insensitive(&pat_text)
                } else {
                    marsh_glob::Pattern::new(&pat_text)
                };
                if pattern.matches(&subject) {
                    self.last_status = 0;
                    return self.run_stmts(&item.body).await;
                }
            }
        }
        self.last_status = 0;
        Ok(Flow::Normal)
    }

    // --- Pipelines ---

    async fn run_pipeline(&mut self, pipeline: &Pipeline) -> Result<(), RunError> {
        let stages = &pipeline.stages;
        if stages.is_empty() {
            self.last_status = 0;
            return Ok(());
        }
        if stages.len() == 1 {
            self.run_stmt(&stages[0].stmt).await?;
            return Ok(());
        }

        // Every stage runs concurrently in its own subshell copy,
        // chained by in-memory pipes.
        let mut tasks = Vec::with_capacity(stages.len());
        let mut prev_reader: Option<FdFile> = None;
        for (i, stage) in stages.iter().enumerate() {
            let mut child = self.subshell_clone();
            if let Some(reader) = prev_reader.take() {
                child.fds.set(0, reader);
            }
            if i < stages.len() - 1 {
                let (writer, reader) = pipe_default();
                let write_fd = FdFile::writer(writer);
                child.fds.set(1, write_fd.clone());
                if stage.stderr_too {
                    child.fds.set(2, write_fd);
                }
                prev_reader = Some(FdFile::reader(reader));
            }
            let stmt = stage.stmt.clone();
            tasks.push(tokio::spawn(async move {
                let result = child.run_stmt(&stmt).await;
                match result {
                    Ok(_) => child.last_status,
                    Err(RunError::Cancelled) => 130,
                    Err(e) => e.status(),
                }
            }));
        }

        let mut statuses = Vec::with_capacity(tasks.len());
        for task in tasks {
            statuses.push(task.await.unwrap_or(1));
        }

        self.last_status = if self.opts.pipefail {
            statuses.iter().rev().find(|&&s| s != 0).copied().unwrap_or(0)
        } else {
            statuses.last().copied().unwrap_or(0)
        };
        Ok(())
    }

    // --- time ---

    async fn run_time(&mut self, inner: Option<&Stmt>) -> Result<Flow, RunError> {
        let wall = Instant::now();
        let usage_before = cpu_times();
        let flow = match inner {
            Some(stmt) => self.run_stmt(stmt).await?,
            None => Flow::Normal,
        };
        let elapsed = wall.elapsed();
        let usage_after = cpu_times();
        let report = format!(
            "\nreal\t{}\nuser\t{}\nsys\t{}\n",
            fmt_duration(elapsed.as_secs_f64()),
            fmt_duration(usage_after.0 - usage_before.0),
            fmt_duration(usage_after.1 - usage_before.1),
        );
        self.write_stderr(&report).await;
        Ok(flow)
    }

    // --- Simple commands ---

    async fn run_simple(&mut self, sc: &SimpleCmd) -> Result<Flow, RunError> {
        self.last_cmdsub_status = 0;
        self.pending_flow = None;

        let words = self.alias_resolve(&sc.words);
        let fields = match expand_fields(self, &words).await {
            Ok(fields) => fields,
            Err(ExpandError::Run(err)) => return Err(err),
            Err(err) => {
                self.report_expand_err(err).await;
                return Ok(Flow::Normal);
            }
        };

        if fields.is_empty() {
            // Assignment-only command: mutations persist.
            for assign in &sc.assigns {
                if let Err(err) = self.apply_assign(assign, false).await {
                    match err {
                        ExpandError::Run(e) => return Err(e),
                        err => {
                            self.report_expand_err(err).await;
                            return Ok(Flow::Normal);
                        }
                    }
                }
            }
            self.last_status = self.last_cmdsub_status;
            return Ok(Flow::Normal);
        }

        // Temporary assignments: exported into this command only.
        let saved: Vec<(String, Option<crate::vars::Variable>)> = sc
            .assigns
            .iter()
            .map(|a| (a.name.clone(), self.env.lookup(&a.name).cloned()))
            .collect();
        for assign in &sc.assigns {
            if let Err(err) = self.apply_assign(assign, true).await {
                match err {
                    ExpandError::Run(e) => return Err(e),
                    err => {
                        self.report_expand_err(err).await;
                        return Ok(Flow::Normal);
                    }
                }
            }
        }

        let mut argv = fields;
        if let Some(call) = self.handlers.call.clone() {
            argv = call.call(argv).await;
        }

        if self.opts.xtrace {
            let ps4 = self.env.get_str("PS4").unwrap_or_else(|| "+ ".to_string());
            let line = format!("{}{}\n", ps4, argv.join(" "));
            self.write_stderr(&line).await;
        }

        self.fire_trap("DEBUG").await;

        let result = if argv.is_empty() {
            self.last_status = self.last_cmdsub_status;
            Ok(Flow::Normal)
        } else {
            self.exec_command(argv).await
        };

        // Unwind temporary assignments.
        if !sc.assigns.is_empty() {
            for (name, old) in saved {
                match old {
                    Some(var) => {
                        let _ = self.env.set_value(&name, var.value.clone(), SetMode::Auto);
                        let flags = var.flags;
                        let _ = self.env.with_flags(&name, |f| *f = flags);
                    }
                    None => {
                        let _ = self.env.unset(&name);
                    }
                }
            }
        }

        result
    }

    /// Expand aliases at the head of a simple command, each name at most
    /// once.
    fn alias_resolve(&self, words: &[Word]) -> Vec<Word> {
        if !self.opts.expand_aliases || words.is_empty() {
            return words.to_vec();
        }
        let mut words = words.to_vec();
        let mut seen = std::collections::HashSet::new();
        loop {
            let Some(first) = words.first().and_then(|w| w.as_lit().map(|s| s.to_string()))
            else {
                return words;
            };
            let Some(replacement) = self.aliases.get(&first) else {
                return words;
            };
            if !seen.insert(first) {
                return words;
            }
            let mut expanded = self.parse_alias(replacement);
            expanded.extend(words.into_iter().skip(1));
            words = expanded;
        }
    }

    /// Turn alias replacement text into words: through the host parser
    /// when one is installed, by whitespace otherwise.
    fn parse_alias(&self, text: &str) -> Vec<Word> {
        if let Some(parser) = &self.handlers.parse {
            if let Ok(file) = parser.parse(text, "alias") {
                if file.stmts.len() == 1 {
                    if let Cmd::Simple(sc) = &file.stmts[0].cmd {
                        if sc.assigns.is_empty() {
                            return sc.words.clone();
                        }
                    }
                }
            }
        }
        text.split_whitespace().map(Word::lit).collect()
    }

    async fn apply_assign(&mut self, assign: &Assign, export: bool) -> Result<(), ExpandError> {
        let name = &assign.name;
        match &assign.value {
            AssignValue::Scalar(word) => {
                let value = expand_assign(self, word).await?;
                if name == "RANDOM" {
                    self.reseed_random(&value);
                }
                match &assign.subscript {
                    Some(sub) => {
                        let key = self.subscript_key(name, sub).await?;
                        self.env
                            .set_element(name, key, value, SetMode::Auto)
                            .map_err(|e| ExpandError::msg(e.to_string()))?;
                    }
                    None => {
                        if assign.append {
                            self.env
                                .append_scalar(name, &value, SetMode::Auto)
                                .map_err(|e| ExpandError::msg(e.to_string()))?;
                        } else {
                            self.env
                                .set_scalar(name, value, SetMode::Auto)
                                .map_err(|e| ExpandError::msg(e.to_string()))?;
                        }
                    }
                }
            }
            AssignValue::Array(elems) => {
                let mut positional: Vec<String> = Vec::new();
                let mut keyed: Vec<(ArrayKey, String)> = Vec::new();
                for elem in elems {
                    match &elem.key {
                        Some(key_word) => {
                            let key = self.subscript_key(name, key_word).await?;
                            let value = expand_assign(self, &elem.value).await?;
                            keyed.push((key, value));
                        }
                        None => {
                            let fields = expand_fields(self, &[elem.value.clone()]).await?;
                            positional.extend(fields);
                        }
                    }
                }
                if !assign.append {
                    let fresh = if self.is_assoc(name) {
                        Value::Assoc(Default::default())
                    } else {
                        Value::Indexed(Default::default())
                    };
                    self.env
                        .set_value(name, fresh, SetMode::Auto)
                        .map_err(|e| ExpandError::msg(e.to_string()))?;
                }
                if !positional.is_empty() {
                    self.env
                        .append_elements(name, positional, SetMode::Auto)
                        .map_err(|e| ExpandError::msg(e.to_string()))?;
                }
                for (key, value) in keyed {
                    self.env
                        .set_element(name, key, value, SetMode::Auto)
                        .map_err(|e| ExpandError::msg(e.to_string()))?;
                }
            }
        }
        if export || self.opts.allexport {
            let _ = self.env.with_flags(name, |f| f.exported = true);
        }
        Ok(())
    }

    fn is_assoc(&self, name: &str) -> bool {
        matches!(
            self.env.get(name).map(|v| &v.value),
            Some(Value::Assoc(_))
        )
    }

    /// Evaluate a subscript word: a string key for associative arrays,
    /// an arithmetic index otherwise.
    pub(crate) async fn subscript_key(
        &mut self,
        name: &str,
        word: &Word,
    ) -> Result<ArrayKey, ExpandError> {
        let text = expand_single(self, word).await?;
        if self.is_assoc(name) {
            Ok(ArrayKey::Key(text))
        } else {
            let idx = self.eval_arith_text(&text)?;
            Ok(ArrayKey::Index(idx))
        }
    }

    /// Resolve and run a command: special builtin, function, builtin,
    /// then `$PATH`.
    async fn exec_command(&mut self, argv: Vec<String>) -> Result<Flow, RunError> {
        let name = argv[0].clone();

        if builtins::is_special_builtin(&name) {
            let status = builtins::run(self, &name, &argv[1..]).await?;
            self.last_status = status;
            if let Some(flow) = self.pending_flow.take() {
                return Ok(flow);
            }
            return Ok(Flow::Normal);
        }

        if let Some(body) = self.funcs.get(&name).cloned() {
            return self.call_function(&name, body, &argv[1..]).await;
        }

        if builtins::is_builtin(&name) {
            let status = builtins::run(self, &name, &argv[1..]).await?;
            self.last_status = status;
            if let Some(flow) = self.pending_flow.take() {
                return Ok(flow);
            }
            return Ok(Flow::Normal);
        }

        self.run_external(argv).await?;
        Ok(Flow::Normal)
    }

    pub(crate) async fn call_function(
        &mut self,
        _name: &str,
        body: Arc<Stmt>,
        args: &[String],
    ) -> Result<Flow, RunError> {
        self.env.push_frame(
            crate::vars::FrameKind::Function,
            Some(args.to_vec()),
            self.opts,
        );
        self.func_depth += 1;
        let result = self.run_stmt(&body).await;
        self.func_depth -= 1;
        self.env.pop_frame();
        let flow = result?;
        match flow {
            Flow::Return => Ok(Flow::Normal),
            other => Ok(other),
        }
    }

    pub(crate) async fn run_external(&mut self, argv: Vec<String>) -> Result<(), RunError> {
        let name = argv[0].clone();
        let path_var = self.env.get_str("PATH");
        let resolved = lookup_path(&self.cwd, path_var.as_deref(), &name);
        let Some(path) = resolved else {
            self.write_stderr(&format!("marsh: {}: command not found\n", name)).await;
            self.last_status = STATUS_NOT_FOUND;
            return Ok(());
        };

        let ctx = HandlerContext {
            env: self.env.iter_exported(),
            dir: self.cwd.clone(),
            stdin: self.fds.stdin(),
            stdout: self.fds.stdout(),
            stderr: self.fds.stderr(),
        };
        let handler = self.handlers.exec.clone();
        match handler.exec(ctx, &path, argv).await {
            Ok(ExecOutcome::Status(status)) => {
                self.last_status = status;
                Ok(())
            }
            Ok(ExecOutcome::ExitRequested(status)) => {
                self.last_status = status;
                self.exited = true;
                Ok(())
            }
            Err(msg) => Err(RunError::Handler(msg)),
        }
    }
}

enum LoopCtl {
    Next,
    Break,
    Raise(Flow),
}

/// (user, system) CPU seconds for this process.
fn cpu_times() -> (f64, f64) {
    #[cfg(unix)]
    unsafe {
        let mut usage: libc::rusage = std::mem::zeroed();
        if libc::getrusage(libc::RUSAGE_SELF, &mut usage) == 0 {
            let user = usage.ru_utime.tv_sec as f64 + usage.ru_utime.tv_usec as f64 / 1e6;
            let sys = usage.ru_stime.tv_sec as f64 + usage.ru_stime.tv_usec as f64 / 1e6;
            return (user, sys);
        }
    }
    (0.0, 0.0)
}

/// `0m0.003s`, the `time` keyword's format.
pub(crate) fn fmt_duration(secs: f64) -> String {
    let secs = if secs < 0.0 { 0.0 } else { secs };
    let minutes = (secs / 60.0) as u64;
    let rest = secs - minutes as f64 * 60.0;
    format!("{}m{:.3}s", minutes, rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_formatting() {
        assert_eq!(fmt_duration(0.0), "0m0.000s");
        assert_eq!(fmt_duration(1.5), "0m1.500s");
        assert_eq!(fmt_duration(65.25), "1m5.250s");
        assert_eq!(fmt_duration(-1.0), "0m0.000s");
    }

    #[test]
    fn loop_ctl_levels() {
        assert!(matches!(Interp::loop_ctl(Flow::Break(1)), LoopCtl::Break));
        assert!(matches!(Interp::loop_ctl(Flow::Break(2)), LoopCtl::Raise(Flow::Break(1))));
        assert!(matches!(Interp::loop_ctl(Flow::Continue(1)), LoopCtl::Next));
        assert!(matches!(Interp::loop_ctl(Flow::Return), LoopCtl::Raise(Flow::Return)));
    }
}
