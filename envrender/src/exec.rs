//! Replaces the current process with the workload command.
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Error};

/// A command that replaces this process once the output is written.
#[derive(Debug, Clone)]
pub struct ExecCommand {
    program: PathBuf,
    args: Vec<OsString>,
    clear_env: bool,
}

impl ExecCommand {
    /// Builds the command from the trailing command line arguments.
    ///
    /// Programs that are not absolute paths are looked up in `$PATH`.
    pub fn resolve(argv: Vec<OsString>, clear_env: bool) -> Result<ExecCommand, Error> {
        let mut iter = argv.into_iter();
        let program = match iter.next() {
            Some(program) => program,
            None => bail!("--exec is specified but no command was provided"),
        };
        Ok(ExecCommand {
            program: resolve_program(&program)?,
            args: iter.collect(),
            clear_env,
        })
    }

    #[cfg(test)]
    pub fn program(&self) -> &Path {
        &self.program
    }

    #[cfg(test)]
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// The full command line, used in error messages.
    pub fn command_line(&self) -> String {
        let mut rv = self.program.display().to_string();
        for arg in &self.args {
            rv.push(' ');
            rv.push_str(&arg.to_string_lossy());
        }
        rv
    }

    fn to_command(&self) -> Command {
        // the resolved path is also passed as argv[0]
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if self.clear_env {
            cmd.env_clear();
        }
        cmd
    }

    /// Replaces the current process image.  Only returns on failure.
    #[cfg(unix)]
    pub fn exec(self) -> Result<i32, Error> {
        use std::os::unix::process::CommandExt;

        tracing::debug!(
            clear_env = self.clear_env,
            "replacing process with {}",
            self.command_line()
        );
        let err = self.to_command().exec();
        Err(Error::new(err).context(format!(
            "couldn't exec command '{}'",
            self.command_line()
        )))
    }

    /// Runs the command as a child and returns its exit code.
    ///
    /// This platform cannot replace the process image, so the child gets a
    /// new process id.
    #[cfg(not(unix))]
    pub fn exec(self) -> Result<i32, Error> {
        tracing::debug!(
            clear_env = self.clear_env,
            "spawning {}",
            self.command_line()
        );
        let status = self
            .to_command()
            .status()
            .with_context(|| format!("couldn't exec command '{}'", self.command_line()))?;
        Ok(status.code().unwrap_or(1))
    }
}

fn resolve_program(program: &OsStr) -> Result<PathBuf, Error> {
    let path = Path::new(program);
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    which::which(program).with_context(|| {
        format!(
            "couldn't find command '{}' in $PATH",
            program.to_string_lossy()
        )
    })
}
