//! test, [ and let.

use crate::error::RunError;
use crate::expand::ExpandError;
use crate::interp::Interp;
use crate::test_expr::eval_test_cli;

pub(crate) async fn test(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    run_test(interp, args).await
}

pub(crate) async fn bracket(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    match args.split_last() {
        Some((last, rest)) if last == "]" => run_test(interp, rest).await,
        _ => {
            interp.stderr_line("[: missing `]'").await;
            Ok(2)
        }
    }
}

async fn run_test(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    match eval_test_cli(interp, args) {
        Ok(true) => Ok(0),
        Ok(false) => Ok(1),
        Err(ExpandError::Run(e)) => Err(e),
        Err(ExpandError::Message { status, text, .. }) => {
            interp.stderr_line(&format!("test: {}", text)).await;
            Ok(status)
        }
    }
}

pub(crate) async fn let_cmd(interp: &mut Interp, args: &[String]) -> Result<u8, RunError> {
    if args.is_empty() {
        return Ok(super::usage(interp, "let", "expression [expression ...]").await);
    }
    let mut last = 0i64;
    for expr in args {
        match interp.eval_arith_text(expr) {
            Ok(v) => last = v,
            Err(ExpandError::Run(e)) => return Err(e),
            Err(ExpandError::Message { text, .. }) => {
                interp.stderr_line(&format!("let: {}", text)).await;
                return Ok(1);
            }
        }
    }
    Ok(if last != 0 { 0 } else { 1 })
}
