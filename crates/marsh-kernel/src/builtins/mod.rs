//! Builtin commands.
//!
//! Builtins share the external-command contract: argv in, streams from
//! the fd table, an exit status out. Flow-control builtins additionally
//! raise a [`Flow`](crate::interp::Flow) through the interpreter's
//! pending-flow slot.

mod dirs;
mod flow;
mod misc;
mod print;
mod read_cmd;
mod test_cmd;
mod vars_cmd;

use crate::error::RunError;
use crate::interp::Interp;

/// Builtins resolved before functions, because they change parse-time
/// or flow state.
pub fn is_special_builtin(name: &str) -> bool {
    matches!(name, "break" | "continue" | "return" | "eval" | "exec" | "source" | ".")
}

/// Every builtin this shell implements.
pub fn is_builtin(name: &str) -> bool {
    is_special_builtin(name)
        || matches!(
            name,
            ":" | "true"
                | "false"
                | "echo"
                | "printf"
                | "cd"
                | "pwd"
                | "pushd"
                | "popd"
                | "dirs"
                | "exit"
                | "shift"
                | "set"
                | "shopt"
                | "unset"
                | "export"
                | "readonly"
                | "declare"
                | "typeset"
                | "local"
                | "read"
                | "test"
                | "["
                | "let"
                | "alias"
                | "unalias"
                | "command"
                | "type"
                | "getopts"
                | "trap"
                | "wait"
                | "builtin"
                | "times"
                | "umask"
        )
}

/// Dispatch one builtin invocation.
pub async fn run(interp: &mut Interp, name: &str, args: &[String]) -> Result<u8, RunError> {
    match name {
        ":" | "true" => Ok(0),
        "false" => Ok(1),
        "echo" => print::echo(interp, args).await,
        "printf" => print::printf(interp, args).await,
        "cd" => dirs::cd(interp, args).await,
        "pwd" => dirs::pwd(interp, args).await,
        "pushd" => dirs::pushd(interp, args).await,
        "popd" => dirs::popd(interp, args).await,
        "dirs" => dirs::dirs_cmd(interp, args).await,
        "exit" => flow::exit(interp, args).await,
        "return" => flow::return_cmd(interp, args).await,
        "break" => flow::break_cmd(interp, args).await,
        "continue" => flow::continue_cmd(interp, args).await,
        "shift" => flow::shift(interp, args).await,
        "eval" => flow::eval(interp, args).await,
        "source" | "." => flow::source(interp, args).await,
        "exec" => flow::exec(interp, args).await,
        "wait" => flow::wait(interp, args).await,
        "set" => vars_cmd::set(interp, args).await,
        "shopt" => vars_cmd::shopt(interp, args).await,
        "unset" => vars_cmd::unset(interp, args).await,
        "export" => vars_cmd::export(interp, args).await,
        "readonly" => vars_cmd::readonly(interp, args).await,
        "declare" | "typeset" => vars_cmd::declare(interp, args, false).await,
        "local" => vars_cmd::local(interp, args).await,
        "getopts" => vars_cmd::getopts(interp, args).await,
        "read" => read_cmd::read(interp, args).await,
        "test" => test_cmd::test(interp, args).await,
        "[" => test_cmd::bracket(interp, args).await,
        "let" => test_cmd::let_cmd(interp, args).await,
        "alias" => misc::alias(interp, args).await,
        "unalias" => misc::unalias(interp, args).await,
        "command" => misc::command(interp, args).await,
        "type" => misc::type_cmd(interp, args).await,
        "trap" => misc::trap(interp, args).await,
        "builtin" => misc::builtin_cmd(interp, args).await,
        "times" => misc::times(interp, args).await,
        "umask" => misc::umask(interp, args).await,
        _ => {
            interp.stderr_line(&format!("{}: not a shell builtin", name)).await;
            Ok(1)
        }
    }
}

/// Report a usage error: prints `name: usage: ...`, returns status 2.
pub(crate) async fn usage(interp: &mut Interp, name: &str, usage: &str) -> u8 {
    interp
        .write_stderr(&format!("marsh: {}: usage: {} {}\n", name, name, usage))
        .await;
    2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn special_builtins_are_builtins() {
        for name in ["break", "continue", "return", "eval", "exec", "source", "."] {
            assert!(is_special_builtin(name));
            assert!(is_builtin(name));
        }
    }

    #[test]
    fn regular_builtins_are_not_special() {
        for name in ["echo", "cd", "set", "read", "["] {
            assert!(is_builtin(name));
            assert!(!is_special_builtin(name));
        }
    }

    #[test]
    fn unknown_names_are_not_builtins() {
        assert!(!is_builtin("grep"));
        assert!(!is_builtin(""));
    }
}
