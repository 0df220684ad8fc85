//! End-to-end scenarios driven through the public runner.

use marsh_kernel::ast::{ParamExp, ParamIndex, ParamOp, RedirOp, WordPart};
use marsh_testutil::*;

#[tokio::test]
async fn assign_and_echo() {
    let mut sh = shell();
    let status = sh
        .run(vec![
            assigns().assign("foo", "bar").stmt(),
            cmd("echo").argw(var("foo")).stmt(),
        ])
        .await;
    assert_eq!(status, 0);
    assert_eq!(sh.stdout(), "bar\n");
    assert_eq!(sh.stderr(), "");
}

#[tokio::test]
async fn for_loop_over_words() {
    let mut sh = shell();
    let status = sh
        .run(vec![for_in(
            "i",
            vec![lit("1"), lit("2"), lit("3")],
            vec![cmd("echo").argw(var("i")).stmt()],
        )])
        .await;
    assert_eq!(status, 0);
    assert_eq!(sh.stdout(), "1\n2\n3\n");
}

#[tokio::test]
async fn brace_expansion() {
    let mut sh = shell();
    sh.run(vec![cmd("echo").arg("a{b,c}d").stmt()]).await;
    assert_eq!(sh.stdout(), "abd acd\n");
}

#[tokio::test]
async fn array_slice() {
    let mut sh = shell();
    let slice = word(vec![param_part(ParamExp {
        name: "arr".into(),
        index: Some(ParamIndex::All),
        op: ParamOp::Substring { offset: "1".into(), length: None },
    })]);
    let status = sh
        .run(vec![
            assigns().array("arr", &["x", "y", "z"]).stmt(),
            cmd("echo").argw(slice).stmt(),
        ])
        .await;
    assert_eq!(status, 0);
    assert_eq!(sh.stdout(), "y z\n");
}

#[tokio::test]
async fn function_local_shadows_global() {
    let mut sh = shell();
    let body = block(vec![
        cmd("local").arg("a=inner").stmt(),
        cmd("echo").argw(var("a")).stmt(),
    ]);
    let status = sh
        .run(vec![
            func("f", body),
            assigns().assign("a", "outer").stmt(),
            cmd("f").stmt(),
            cmd("echo").argw(var("a")).stmt(),
        ])
        .await;
    assert_eq!(status, 0);
    assert_eq!(sh.stdout(), "inner\nouter\n");
}

#[tokio::test]
async fn pipefail_propagates_failure() {
    let mut sh = shell();
    let status = sh
        .run(vec![
            cmd("set").args(&["-o", "pipefail"]).stmt(),
            pipeline(vec![cmd("false").stmt(), cmd("true").stmt()]),
        ])
        .await;
    assert_eq!(status, 1);
    assert_eq!(sh.stdout(), "");
}

#[tokio::test]
async fn pipeline_status_without_pipefail() {
    let mut sh = shell();
    let status = sh
        .run(vec![pipeline(vec![cmd("false").stmt(), cmd("true").stmt()])])
        .await;
    assert_eq!(status, 0);
}

#[tokio::test]
async fn unicode_uppercasing() {
    let mut sh = shell();
    let upper = word(vec![param_part(ParamExp {
        name: "a".into(),
        index: None,
        op: ParamOp::ChangeCase { upper: true, all: true, pat: None },
    })]);
    let status = sh
        .run(vec![
            assigns().assignw("a", sq("àÉñ")).stmt(),
            cmd("echo").argw(upper).stmt(),
        ])
        .await;
    assert_eq!(status, 0);
    assert_eq!(sh.stdout(), "ÀÉÑ\n");
}

#[tokio::test]
async fn arithmetic_expansion() {
    let mut sh = shell();
    sh.run(vec![cmd("echo").argw(arith_word("1+2*3")).stmt()]).await;
    assert_eq!(sh.stdout(), "7\n");
}

#[tokio::test]
async fn exit_trap_fires_once() {
    let mut sh = shell();
    let status = sh
        .run(vec![
            cmd("trap").argw(sq("echo bye")).arg("EXIT").stmt(),
            cmd("true").stmt(),
        ])
        .await;
    assert_eq!(status, 0);
    assert_eq!(sh.stdout(), "bye\n");
}

#[tokio::test]
async fn read_from_here_string() {
    let mut sh = shell();
    let echo = cmd("echo").argw(dq(vec![
        param_part(ParamExp::plain("a")),
        WordPart::Lit("|".into()),
        param_part(ParamExp::plain("b")),
    ]));
    let status = sh
        .run(vec![
            cmd("read")
                .args(&["a", "b"])
                .redir(None, RedirOp::HereString, sq("x y z"))
                .stmt(),
            echo.stmt(),
        ])
        .await;
    assert_eq!(status, 0);
    assert_eq!(sh.stdout(), "x|y z\n");
}

// --- Invariants ---

#[tokio::test]
async fn reset_restores_initial_state() {
    let mut sh = shell();
    let script = || {
        vec![
            assigns().assignw("n", cmdsub(vec![cmd("echo").arg("once").stmt()])).stmt(),
            cmd("echo").argw(var("n")).stmt(),
        ]
    };
    sh.run(script()).await;
    let first = sh.out.take();
    sh.runner.reset().unwrap();
    sh.runner.set_fd(1, marsh_kernel::FdFile::writer(sh.out.clone()));
    sh.runner.set_fd(2, marsh_kernel::FdFile::writer(sh.err.clone()));
    sh.run(script()).await;
    let second = sh.out.take();
    assert_eq!(first, second);
    // Reset also dropped the variable.
    assert_eq!(sh.runner.var("n").as_deref(), Some("once"));
}

#[tokio::test]
async fn subshell_leaves_parent_untouched() {
    let mut sh = shell();
    let status = sh
        .run(vec![
            assigns().assign("x", "1").stmt(),
            subshell(vec![
                assigns().assign("x", "2").stmt(),
                cmd("cd").arg("/").stmt(),
                cmd("exit").arg("5").stmt(),
            ]),
            cmd("echo")
                .argw(var("x"))
                .argw(var("?"))
                .stmt(),
        ])
        .await;
    assert_eq!(status, 0);
    assert_eq!(sh.stdout(), "1 5\n");
    assert_eq!(sh.runner.var("x").as_deref(), Some("1"));
}

#[tokio::test]
async fn pipefail_takes_rightmost_nonzero() {
    let mut sh = shell();
    let status = sh
        .run(vec![
            cmd("set").args(&["-o", "pipefail"]).stmt(),
            pipeline(vec![
                subshell(vec![cmd("exit").arg("2").stmt()]),
                subshell(vec![cmd("exit").arg("3").stmt()]),
                cmd("true").stmt(),
            ]),
        ])
        .await;
    assert_eq!(status, 3);
}

#[tokio::test]
async fn exit_truncates_modulo_256() {
    let mut sh = shell();
    let status = sh.run(vec![cmd("exit").arg("260").stmt()]).await;
    assert_eq!(status, 4);

    let mut sh = shell();
    let status = sh.run(vec![cmd("exit").arg("256").stmt()]).await;
    assert_eq!(status, 0);
    assert!(sh.runner.exited());
}

#[tokio::test]
async fn glob_without_wildcards_is_identity() {
    let mut sh = shell();
    sh.run(vec![cmd("echo").arg("no-such-file.txt").stmt()]).await;
    assert_eq!(sh.stdout(), "no-such-file.txt\n");
}

#[tokio::test]
async fn unmatched_glob_keeps_pattern() {
    let tmp = tempfile::tempdir().unwrap();
    let mut sh = shell_at(tmp.path().to_str().unwrap());
    sh.run(vec![cmd("echo").arg("*.doesnotexist").stmt()]).await;
    assert_eq!(sh.stdout(), "*.doesnotexist\n");
}

#[tokio::test]
async fn glob_expands_and_sorts() {
    let tmp = tempfile::tempdir().unwrap();
    for name in ["b.txt", "a.txt", "c.log"] {
        std::fs::write(tmp.path().join(name), "").unwrap();
    }
    let mut sh = shell_at(tmp.path().to_str().unwrap());
    sh.run(vec![cmd("echo").arg("*.txt").stmt()]).await;
    assert_eq!(sh.stdout(), "a.txt b.txt\n");
}

#[tokio::test]
async fn nullglob_removes_unmatched() {
    let tmp = tempfile::tempdir().unwrap();
    let mut sh = shell_at(tmp.path().to_str().unwrap());
    sh.run(vec![
        cmd("shopt").args(&["-s", "nullglob"]).stmt(),
        cmd("echo").arg("*.doesnotexist").arg("end").stmt(),
    ])
    .await;
    assert_eq!(sh.stdout(), "end\n");
}

#[tokio::test]
async fn command_not_found_is_127() {
    let mut sh = shell();
    let status = sh.run(vec![cmd("no-such-command-here").stmt()]).await;
    assert_eq!(status, 127);
    assert!(sh.stderr().contains("command not found"));
}
