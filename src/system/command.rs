//! Typed shell commands.
//!
//! Commands are kept as argv vectors until the moment they are written to the
//! privileged shell, where every argument is single-quoted. Module ids are
//! additionally validated before any command or path is built from them.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::path::Path;

static MODULE_ID_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9._-]+$").ok());

/// Module ids double as directory names and shell arguments.
pub fn is_valid_module_id(id: &str) -> bool {
    MODULE_ID_RE.as_ref().map_or(false, |re| re.is_match(id))
}

/// Quote one argument for a POSIX shell.
pub fn shell_quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._-/=:+,@%".contains(c))
    {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// A single program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    argv: Vec<String>,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        ShellCommand {
            argv: vec![program.into()],
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.argv.push(arg.into());
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn render(&self) -> String {
        self.argv
            .iter()
            .map(|a| shell_quote(a))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// A sequence of commands; each must succeed for the next to run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellScript {
    steps: Vec<ShellCommand>,
}

impl ShellScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, command: ShellCommand) -> Self {
        self.steps.push(command);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn render(&self) -> String {
        self.steps
            .iter()
            .map(ShellCommand::render)
            .collect::<Vec<_>>()
            .join(" && ")
    }
}

impl From<ShellCommand> for ShellScript {
    fn from(command: ShellCommand) -> Self {
        ShellScript::new().then(command)
    }
}
