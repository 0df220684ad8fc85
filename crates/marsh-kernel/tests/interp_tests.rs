//! Control flow, errexit, traps, redirections, functions, and jobs.

use marsh_kernel::ast::{Cmd, ParamExp, RedirOp, Stmt, TestExpr, WordPart};
use marsh_testutil::*;

// --- Conditionals and loops ---

#[tokio::test]
async fn if_else_branches() {
    let mut sh = shell();
    sh.run(vec![
        if_else(
            vec![cmd("true").stmt()],
            vec![cmd("echo").arg("yes").stmt()],
            Some(vec![cmd("echo").arg("no").stmt()]),
        ),
        if_else(
            vec![cmd("false").stmt()],
            vec![cmd("echo").arg("yes").stmt()],
            Some(vec![cmd("echo").arg("no").stmt()]),
        ),
    ])
    .await;
    assert_eq!(sh.stdout(), "yes\nno\n");
}

#[tokio::test]
async fn while_loop_with_arithmetic() {
    let mut sh = shell();
    let status = sh
        .run(vec![while_loop(
            vec![arith_stmt("i < 3")],
            vec![
                cmd("echo").argw(var("i")).stmt(),
                arith_stmt("i = i + 1"),
            ],
        )])
        .await;
    assert_eq!(status, 0);
    assert_eq!(sh.stdout(), "\n1\n2\n");
}

#[tokio::test]
async fn until_loop_runs_until_true() {
    let mut sh = shell();
    sh.run(vec![
        assigns().assign("n", "0").stmt(),
        until_loop(
            vec![arith_stmt("n >= 2")],
            vec![cmd("echo").argw(var("n")).stmt(), arith_stmt("n += 1")],
        ),
    ])
    .await;
    assert_eq!(sh.stdout(), "0\n1\n");
}

#[tokio::test]
async fn arith_for_loop() {
    let mut sh = shell();
    sh.run(vec![for_arith(
        Some("i = 0"),
        Some("i < 3"),
        Some("i++"),
        vec![cmd("echo").argw(var("i")).stmt()],
    )])
    .await;
    assert_eq!(sh.stdout(), "0\n1\n2\n");
}

#[tokio::test]
async fn arith_for_without_condition_needs_break() {
    let mut sh = shell();
    sh.run(vec![for_arith(
        Some("i = 0"),
        None,
        Some("i++"),
        vec![
            if_else(
                vec![arith_stmt("i >= 2")],
                vec![cmd("break").stmt()],
                None,
            ),
            cmd("echo").argw(var("i")).stmt(),
        ],
    )])
    .await;
    assert_eq!(sh.stdout(), "0\n1\n");
}

#[tokio::test]
async fn break_and_continue_levels() {
    let mut sh = shell();
    sh.run(vec![for_in(
        "outer",
        vec![lit("1"), lit("2")],
        vec![for_in(
            "inner",
            vec![lit("a"), lit("b")],
            vec![
                if_else(
                    vec![test_stmt(TestExpr::Binary {
                        op: "==".into(),
                        lhs: var("inner"),
                        rhs: lit("b"),
                    })],
                    vec![cmd("continue").arg("2").stmt()],
                    None,
                ),
                cmd("echo")
                    .argw(var("outer"))
                    .argw(var("inner"))
                    .stmt(),
            ],
        )],
    )])
    .await;
    assert_eq!(sh.stdout(), "1 a\n2 a\n");
}

#[tokio::test]
async fn break_two_levels_exits_both() {
    let mut sh = shell();
    sh.run(vec![
        for_in(
            "i",
            vec![lit("1"), lit("2")],
            vec![for_in(
                "j",
                vec![lit("x")],
                vec![cmd("break").arg("2").stmt()],
            )],
        ),
        cmd("echo").arg("after").stmt(),
    ])
    .await;
    assert_eq!(sh.stdout(), "after\n");
}

#[tokio::test]
async fn case_matches_patterns_in_order() {
    let mut sh = shell();
    sh.run(vec![
        assigns().assign("x", "hello.rs").stmt(),
        case_stmt(
            var("x"),
            vec![
                (vec![lit("*.go")], vec![cmd("echo").arg("go").stmt()]),
                (vec![lit("*.rs"), lit("*.rlib")], vec![cmd("echo").arg("rust").stmt()]),
                (vec![lit("*")], vec![cmd("echo").arg("other").stmt()]),
            ],
        ),
    ])
    .await;
    assert_eq!(sh.stdout(), "rust\n");
}

// --- Functions ---

#[tokio::test]
async fn function_args_and_return_status() {
    let mut sh = shell();
    let body = block(vec![
        cmd("echo")
            .argw(var("#"))
            .argw(var("1"))
            .argw(var("2"))
            .stmt(),
        cmd("return").arg("7").stmt(),
        cmd("echo").arg("unreachable").stmt(),
    ]);
    let status = sh
        .run(vec![
            func("f", body),
            cmd("f").args(&["one", "two"]).stmt(),
            cmd("echo").argw(var("?")).stmt(),
        ])
        .await;
    assert_eq!(status, 0);
    assert_eq!(sh.stdout(), "2 one two\n7\n");
}

#[tokio::test]
async fn function_sees_and_mutates_globals() {
    let mut sh = shell();
    let body = block(vec![assigns().assign("g", "changed").stmt()]);
    sh.run(vec![
        assigns().assign("g", "orig").stmt(),
        func("mutate", body),
        cmd("mutate").stmt(),
        cmd("echo").argw(var("g")).stmt(),
    ])
    .await;
    assert_eq!(sh.stdout(), "changed\n");
}

#[tokio::test]
async fn nested_function_positional_restore() {
    let mut sh = shell();
    let inner = block(vec![cmd("echo").arg("in").argw(var("1")).stmt()]);
    let outer = block(vec![
        cmd("inner").arg("deep").stmt(),
        cmd("echo").arg("out").argw(var("1")).stmt(),
    ]);
    sh.run(vec![
        func("inner", inner),
        func("outer", outer),
        cmd("outer").arg("top").stmt(),
    ])
    .await;
    assert_eq!(sh.stdout(), "in deep\nout top\n");
}

#[tokio::test]
async fn exit_inside_function_stops_script() {
    let mut sh = shell();
    let status = sh
        .run(vec![
            func("f", block(vec![cmd("exit").arg("3").stmt()])),
            cmd("f").stmt(),
            cmd("echo").arg("no").stmt(),
        ])
        .await;
    assert_eq!(status, 3);
    assert_eq!(sh.stdout(), "");
}

#[tokio::test]
async fn return_outside_function_is_an_error() {
    let mut sh = shell();
    let status = sh.run(vec![cmd("return").stmt()]).await;
    assert_eq!(status, 1);
    assert!(sh.stderr().contains("can only be used in a function"));
}

#[tokio::test]
async fn break_outside_loop_is_an_error() {
    let mut sh = shell();
    let status = sh
        .run(vec![cmd("break").stmt(), cmd("echo").arg("still here").stmt()])
        .await;
    assert_eq!(status, 0);
    assert_eq!(sh.stdout(), "still here\n");
    assert!(sh.stderr().contains("only meaningful in a loop"));
}

// --- errexit and traps ---

#[tokio::test]
async fn errexit_stops_the_script() {
    let mut sh = shell();
    let status = sh
        .run(vec![
            cmd("set").arg("-e").stmt(),
            cmd("false").stmt(),
            cmd("echo").arg("unreachable").stmt(),
        ])
        .await;
    assert_eq!(status, 1);
    assert_eq!(sh.stdout(), "");
}

#[tokio::test]
async fn errexit_spares_conditions_and_lists() {
    let mut sh = shell();
    let status = sh
        .run(vec![
            cmd("set").arg("-e").stmt(),
            if_else(
                vec![cmd("false").stmt()],
                vec![cmd("echo").arg("then").stmt()],
                Some(vec![cmd("echo").arg("else").stmt()]),
            ),
            or(cmd("false").stmt(), cmd("echo").arg("rescued").stmt()),
            negate(cmd("false").stmt()),
            cmd("echo").arg("done").stmt(),
        ])
        .await;
    assert_eq!(status, 0);
    assert_eq!(sh.stdout(), "else\nrescued\ndone\n");
}

#[tokio::test]
async fn errexit_ignores_short_circuited_left_side() {
    let mut sh = shell();
    let status = sh
        .run(vec![
            cmd("set").arg("-e").stmt(),
            and(cmd("false").stmt(), cmd("echo").arg("hi").stmt()),
            cmd("echo").arg("after").stmt(),
        ])
        .await;
    assert_eq!(status, 0);
    assert_eq!(sh.stdout(), "after\n");
}

#[tokio::test]
async fn err_trap_skips_short_circuited_left_side() {
    let mut sh = shell();
    let status = sh
        .run(vec![
            cmd("trap").argw(sq("echo caught")).arg("ERR").stmt(),
            and(cmd("false").stmt(), cmd("echo").arg("hi").stmt()),
            cmd("echo").arg("done").stmt(),
        ])
        .await;
    assert_eq!(status, 0);
    assert_eq!(sh.stdout(), "done\n");
}

#[tokio::test]
async fn errexit_ignored_in_function_called_from_condition() {
    let mut sh = shell();
    let body = block(vec![
        cmd("false").stmt(),
        cmd("echo").arg("kept going").stmt(),
    ]);
    let status = sh
        .run(vec![
            cmd("set").arg("-e").stmt(),
            func("f", body),
            if_else(vec![cmd("f").stmt()], vec![cmd("echo").arg("ok").stmt()], None),
        ])
        .await;
    assert_eq!(status, 0);
    assert_eq!(sh.stdout(), "kept going\nok\n");
}

#[tokio::test]
async fn err_trap_fires_without_errexit() {
    let mut sh = shell();
    let status = sh
        .run(vec![
            cmd("trap").argw(sq("echo caught")).arg("ERR").stmt(),
            cmd("false").stmt(),
        ])
        .await;
    assert_eq!(status, 1);
    assert_eq!(sh.stdout(), "caught\n");
}

#[tokio::test]
async fn err_trap_skips_condition_contexts() {
    let mut sh = shell();
    let status = sh
        .run(vec![
            cmd("trap").argw(sq("echo caught")).arg("ERR").stmt(),
            if_else(vec![cmd("false").stmt()], vec![], Some(vec![cmd("echo").arg("else").stmt()])),
        ])
        .await;
    assert_eq!(status, 0);
    assert_eq!(sh.stdout(), "else\n");
}

#[tokio::test]
async fn exit_trap_fires_on_errexit_abort() {
    let mut sh = shell();
    let status = sh
        .run(vec![
            cmd("trap").argw(sq("echo cleanup")).arg("EXIT").stmt(),
            cmd("set").arg("-e").stmt(),
            cmd("false").stmt(),
        ])
        .await;
    assert_eq!(status, 1);
    assert_eq!(sh.stdout(), "cleanup\n");
}

// --- Pipelines, subshells, jobs ---

#[tokio::test]
async fn pipeline_passes_data_between_stages() {
    let mut sh = shell();
    let status = sh
        .run(vec![
            pipeline(vec![
                cmd("echo").arg("first second").stmt(),
                cmd("read").args(&["a", "b"]).stmt(),
            ]),
            // Pipeline stages run in subshells: `a` must not leak.
            cmd("echo").argw(word(vec![
                WordPart::Lit("a=".into()),
                param_part(ParamExp::plain("a")),
            ])).stmt(),
        ])
        .await;
    assert_eq!(status, 0);
    assert_eq!(sh.stdout(), "a=\n");
}

#[tokio::test]
async fn negated_pipeline_status() {
    let mut sh = shell();
    let status = sh
        .run(vec![
            negate(cmd("false").stmt()),
            cmd("echo").argw(var("?")).stmt(),
            negate(cmd("true").stmt()),
            cmd("echo").argw(var("?")).stmt(),
        ])
        .await;
    assert_eq!(status, 0);
    assert_eq!(sh.stdout(), "0\n1\n");
}

#[tokio::test]
async fn background_job_and_wait() {
    let mut sh = shell();
    let status = sh
        .run(vec![
            background(subshell(vec![cmd("exit").arg("9").stmt()])),
            cmd("wait").argw(var("!")).stmt(),
            cmd("echo").argw(var("?")).stmt(),
        ])
        .await;
    assert_eq!(status, 0);
    assert_eq!(sh.stdout(), "9\n");
}

#[tokio::test]
async fn wait_unknown_job_is_127() {
    let mut sh = shell();
    let status = sh.run(vec![cmd("wait").arg("4242").stmt()]).await;
    assert_eq!(status, 127);
}

#[tokio::test]
async fn command_substitution_captures_and_trims() {
    let mut sh = shell();
    let status = sh
        .run(vec![
            assigns()
                .assignw("x", cmdsub(vec![cmd("echo").arg("hi").stmt()]))
                .stmt(),
            cmd("echo").argw(word(vec![
                WordPart::Lit("[".into()),
                param_part(ParamExp::plain("x")),
                WordPart::Lit("]".into()),
            ])).stmt(),
        ])
        .await;
    assert_eq!(status, 0);
    assert_eq!(sh.stdout(), "[hi]\n");
}

#[tokio::test]
async fn assignment_status_comes_from_substitution() {
    let mut sh = shell();
    sh.run(vec![
        assigns().assignw("x", cmdsub(vec![cmd("false").stmt()])).stmt(),
        cmd("echo").argw(var("?")).stmt(),
    ])
    .await;
    assert_eq!(sh.stdout(), "1\n");
}

#[tokio::test]
async fn process_substitution_feeds_redirect() {
    let mut sh = shell();
    let target = word(vec![WordPart::ProcSubst {
        write: false,
        stmts: vec![cmd("echo").arg("from-pipe").stmt()],
    }]);
    let status = sh
        .run(vec![
            cmd("read").arg("x").redir(None, RedirOp::In, target).stmt(),
            cmd("echo").argw(var("x")).stmt(),
        ])
        .await;
    assert_eq!(status, 0);
    assert_eq!(sh.stdout(), "from-pipe\n");
}

// --- Redirections ---

#[tokio::test]
async fn output_redirect_writes_file() {
    let tmp = tempfile::tempdir().unwrap();
    let mut sh = shell_at(tmp.path().to_str().unwrap());
    let status = sh
        .run(vec![
            cmd("echo").arg("content").redir(None, RedirOp::Out, lit("out.txt")).stmt(),
            cmd("echo").arg("more").redir(None, RedirOp::Append, lit("out.txt")).stmt(),
        ])
        .await;
    assert_eq!(status, 0);
    let data = std::fs::read_to_string(tmp.path().join("out.txt")).unwrap();
    assert_eq!(data, "content\nmore\n");
    // Nothing reached the captured stdout.
    assert_eq!(sh.stdout(), "");
}

#[tokio::test]
async fn input_redirect_reads_file() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("in.txt"), "payload here\n").unwrap();
    let mut sh = shell_at(tmp.path().to_str().unwrap());
    sh.run(vec![
        cmd("read").arg("x").redir(None, RedirOp::In, lit("in.txt")).stmt(),
        cmd("echo").argw(var("x")).stmt(),
    ])
    .await;
    assert_eq!(sh.stdout(), "payload here\n");
}

#[tokio::test]
async fn quoted_redirect_target_with_space() {
    let tmp = tempfile::tempdir().unwrap();
    let mut sh = shell_at(tmp.path().to_str().unwrap());
    let status = sh
        .run(vec![cmd("echo")
            .arg("content")
            .redir(None, RedirOp::Out, dq_lit("a b.txt"))
            .stmt()])
        .await;
    assert_eq!(status, 0);
    let data = std::fs::read_to_string(tmp.path().join("a b.txt")).unwrap();
    assert_eq!(data, "content\n");
}

#[tokio::test]
async fn multi_field_redirect_target_is_ambiguous() {
    let tmp = tempfile::tempdir().unwrap();
    let mut sh = shell_at(tmp.path().to_str().unwrap());
    let status = sh
        .run(vec![
            // An unset variable expands to zero fields.
            cmd("echo")
                .arg("x")
                .redir(None, RedirOp::Out, var("no_such_target"))
                .stmt(),
            // An unquoted value that splits in two is just as bad.
            assigns().assignw("two", sq("a b")).stmt(),
            cmd("echo").arg("x").redir(None, RedirOp::Out, var("two")).stmt(),
            cmd("echo").arg("alive").stmt(),
        ])
        .await;
    assert_eq!(status, 0);
    assert!(sh.stderr().contains("ambiguous redirect"));
    assert_eq!(sh.stdout(), "alive\n");
    assert!(std::fs::read_dir(tmp.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn missing_input_file_fails_command() {
    let mut sh = shell();
    let status = sh
        .run(vec![
            cmd("read").arg("x").redir(None, RedirOp::In, lit("/no/such/file")).stmt(),
            cmd("echo").arg("alive").stmt(),
        ])
        .await;
    assert_eq!(status, 0);
    assert!(sh.stderr().contains("/no/such/file"));
    assert_eq!(sh.stdout(), "alive\n");
}

#[tokio::test]
async fn stderr_dup_merges_streams() {
    let mut sh = shell();
    sh.run(vec![cmd("cd")
        .arg("/definitely/missing")
        .redir(Some(2), RedirOp::DupOut, lit("1"))
        .stmt()])
    .await;
    assert!(sh.stdout().contains("cd:"));
    assert_eq!(sh.stderr(), "");
}

#[tokio::test]
async fn fd_table_restored_after_command() {
    let tmp = tempfile::tempdir().unwrap();
    let mut sh = shell_at(tmp.path().to_str().unwrap());
    sh.run(vec![
        cmd("echo").arg("redirected").redir(None, RedirOp::Out, lit("f.txt")).stmt(),
        cmd("echo").arg("normal").stmt(),
    ])
    .await;
    assert_eq!(sh.stdout(), "normal\n");
}

#[tokio::test]
async fn heredoc_feeds_stdin() {
    let mut sh = shell();
    sh.run(vec![
        cmd("read")
            .arg("x")
            .heredoc(lit("line one\nline two\n"), false, true)
            .stmt(),
        cmd("echo").argw(var("x")).stmt(),
    ])
    .await;
    assert_eq!(sh.stdout(), "line one\n");
}

#[tokio::test]
async fn heredoc_strip_tabs() {
    let mut sh = shell();
    sh.run(vec![
        cmd("read")
            .arg("x")
            .heredoc(lit("\tindented\n"), true, true)
            .stmt(),
        cmd("echo").argw(var("x")).stmt(),
    ])
    .await;
    assert_eq!(sh.stdout(), "indented\n");
}

// --- Misc builtins through the evaluator ---

#[tokio::test]
async fn xtrace_prints_commands() {
    let mut sh = shell();
    sh.run(vec![
        cmd("set").arg("-x").stmt(),
        cmd("echo").arg("traced").stmt(),
    ])
    .await;
    assert!(sh.stderr().contains("+ echo traced"));
    assert_eq!(sh.stdout(), "traced\n");
}

#[tokio::test]
async fn nounset_aborts_on_missing_var() {
    let mut sh = shell();
    let status = sh
        .run(vec![
            cmd("set").arg("-u").stmt(),
            cmd("echo").argw(var("never_set")).stmt(),
            cmd("echo").arg("unreachable").stmt(),
        ])
        .await;
    assert_eq!(status, 1);
    assert!(sh.stderr().contains("unbound variable"));
    assert_eq!(sh.stdout(), "");
}

#[tokio::test]
async fn readonly_rejects_reassignment() {
    let mut sh = shell();
    let status = sh
        .run(vec![
            cmd("readonly").arg("x=1").stmt(),
            assigns().assign("x", "2").stmt(),
            cmd("echo").argw(var("x")).stmt(),
        ])
        .await;
    assert_eq!(status, 0);
    assert!(sh.stderr().contains("readonly"));
    assert_eq!(sh.stdout(), "1\n");
}

#[tokio::test]
async fn eval_runs_parsed_text() {
    let mut sh = shell();
    sh.run(vec![
        cmd("eval").argw(sq("x=5")).stmt(),
        cmd("echo").argw(var("x")).stmt(),
    ])
    .await;
    assert_eq!(sh.stdout(), "5\n");
}

#[tokio::test]
async fn source_runs_file_with_args() {
    let tmp = tempfile::tempdir().unwrap();
    let script = tmp.path().join("lib.sh");
    std::fs::write(&script, "sourced=$1\n").unwrap();
    let mut sh = shell_at(tmp.path().to_str().unwrap());
    let status = sh
        .run(vec![
            cmd("source").arg("lib.sh").arg("hello").stmt(),
            cmd("echo").argw(var("sourced")).stmt(),
        ])
        .await;
    assert_eq!(status, 0);
    assert_eq!(sh.stdout(), "hello\n");
}

#[tokio::test]
async fn alias_expansion_when_enabled() {
    let mut sh = shell();
    sh.run(vec![
        cmd("shopt").args(&["-s", "expand_aliases"]).stmt(),
        cmd("alias").arg("greet=echo hello").stmt(),
        cmd("greet").arg("world").stmt(),
    ])
    .await;
    assert_eq!(sh.stdout(), "hello world\n");
}

#[tokio::test]
async fn shift_moves_positionals() {
    let mut sh = shell();
    sh.run(vec![
        cmd("set").args(&["--", "a", "b", "c"]).stmt(),
        cmd("shift").stmt(),
        cmd("echo").argw(var("1")).argw(var("#")).stmt(),
    ])
    .await;
    assert_eq!(sh.stdout(), "b 2\n");
}

#[tokio::test]
async fn cd_updates_pwd_and_oldpwd() {
    let tmp = tempfile::tempdir().unwrap();
    let sub = tmp.path().join("inner");
    std::fs::create_dir(&sub).unwrap();
    let mut sh = shell_at(tmp.path().to_str().unwrap());
    sh.run(vec![
        cmd("cd").arg("inner").stmt(),
        cmd("pwd").stmt(),
        cmd("cd").arg("-").stmt(),
    ])
    .await;
    let out = sh.stdout();
    let mut lines = out.lines();
    assert!(lines.next().unwrap().ends_with("/inner"));
    // `cd -` announces the directory it switched to.
    assert_eq!(lines.next().unwrap(), sh.runner.dir().to_str().unwrap());
}

#[tokio::test]
async fn pushd_popd_maintain_stack() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir(tmp.path().join("a")).unwrap();
    let mut sh = shell_at(tmp.path().to_str().unwrap());
    let start = sh.runner.dir().to_path_buf();
    sh.run(vec![
        cmd("pushd").arg("a").stmt(),
        cmd("popd").stmt(),
    ])
    .await;
    assert_eq!(sh.runner.dir(), start);
    assert!(sh.stdout().contains("/a "));
}

#[tokio::test]
async fn lineno_tracks_statement_lines() {
    let mut sh = shell();
    sh.run(vec![cmd("echo").argw(var("LINENO")).line(41).stmt()]).await;
    assert_eq!(sh.stdout(), "41\n");
}

#[tokio::test]
async fn time_reports_to_stderr() {
    let mut sh = shell();
    let inner = cmd("true").stmt();
    sh.run(vec![Stmt::of(Cmd::Time(Some(Box::new(inner))))]).await;
    assert!(sh.stderr().contains("real"));
    assert!(sh.stderr().contains("user"));
}

#[tokio::test]
async fn getopts_walks_options() {
    let mut sh = shell();
    sh.run(vec![
        cmd("getopts").args(&["ab:", "opt", "-a", "-b", "val"]).stmt(),
        cmd("echo").argw(var("opt")).stmt(),
        cmd("getopts").args(&["ab:", "opt", "-a", "-b", "val"]).stmt(),
        cmd("echo").argw(var("opt")).argw(var("OPTARG")).stmt(),
        cmd("getopts").args(&["ab:", "opt", "-a", "-b", "val"]).stmt(),
        cmd("echo").argw(var("?")).stmt(),
    ])
    .await;
    assert_eq!(sh.stdout(), "a\nb val\n1\n");
}

#[tokio::test]
async fn umask_prints_and_sets() {
    let mut sh = shell();
    sh.run(vec![
        cmd("umask").stmt(),
        cmd("umask").arg("077").stmt(),
        cmd("umask").stmt(),
    ])
    .await;
    assert_eq!(sh.stdout(), "0022\n0077\n");
}

#[tokio::test]
async fn type_classifies_builtins_and_functions() {
    let mut sh = shell();
    sh.run(vec![
        func("myfn", block(vec![])),
        cmd("type").args(&["-t", "echo"]).stmt(),
        cmd("type").args(&["-t", "myfn"]).stmt(),
        cmd("type").args(&["-t", "if"]).stmt(),
    ])
    .await;
    assert_eq!(sh.stdout(), "builtin\nfunction\nkeyword\n");
}
