//! External command execution.

use crate::error::{Result, StylistError};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

pub trait CommandRunner {
    /// Run `argv` in `cwd` with extra environment, stdio inherited. Returns
    /// the exit code, `-1` when the process was killed by a signal.
    fn run(&self, argv: &[String], cwd: &Path, env: &BTreeMap<String, String>) -> Result<i32>;
}

/// Spawns real processes, resolving the program with `which`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, argv: &[String], cwd: &Path, env: &BTreeMap<String, String>) -> Result<i32> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| StylistError::CommandFailed {
                command: String::new(),
                code: None,
            })?;
        let binary =
            which::which(program).map_err(|_| StylistError::ToolNotInstalled(program.clone()))?;

        tracing::info!(command = %argv.join(" "), cwd = %cwd.display(), "executing");
        let status = Command::new(binary)
            .args(args)
            .current_dir(cwd)
            .envs(env)
            .status()?;
        Ok(status.code().unwrap_or(-1))
    }
}

/// Run and fail with `CommandFailed` on a non-zero exit.
pub fn run_checked(
    runner: &dyn CommandRunner,
    argv: &[String],
    cwd: &Path,
    env: &BTreeMap<String, String>,
) -> Result<()> {
    let code = runner.run(argv, cwd, env)?;
    if code != 0 {
        return Err(StylistError::CommandFailed {
            command: argv.join(" "),
            code: Some(code),
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::path::PathBuf;

    /// Records invocations instead of spawning anything.
    #[derive(Default)]
    pub struct RecordingRunner {
        pub calls: RefCell<Vec<(Vec<String>, PathBuf)>>,
        pub exit_codes: RefCell<BTreeMap<String, i32>>,
    }

    impl RecordingRunner {
        /// Make any invocation whose argv contains `arg` exit with `code`.
        pub fn fail_on(&self, arg: &str, code: i32) {
            self.exit_codes.borrow_mut().insert(arg.to_string(), code);
        }

        pub fn commands(&self) -> Vec<String> {
            self.calls.borrow().iter().map(|(argv, _)| argv.join(" ")).collect()
        }
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, argv: &[String], cwd: &Path, _env: &BTreeMap<String, String>) -> Result<i32> {
            self.calls
                .borrow_mut()
                .push((argv.to_vec(), cwd.to_path_buf()));
            let codes = self.exit_codes.borrow();
            Ok(argv
                .iter()
                .find_map(|a| codes.get(a).copied())
                .unwrap_or(0))
        }
    }
}
