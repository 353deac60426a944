use poshconsole_types::PsValue;

mod render;
#[cfg(test)]
mod test;

pub use render::{quote_literal, render_value};

/// Represents a single parameter for a command
#[derive(Debug, Clone, PartialEq)]
pub enum Parameter {
    Named { name: String, value: PsValue },
    Positional { value: PsValue },
    Switch { name: String, value: bool },
}

impl Parameter {
    pub fn named(name: impl Into<String>, value: impl Into<PsValue>) -> Self {
        Self::Named {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn positional(value: impl Into<PsValue>) -> Self {
        Self::Positional {
            value: value.into(),
        }
    }

    pub fn switch(name: impl Into<String>) -> Self {
        Self::Switch {
            name: name.into(),
            value: true,
        }
    }
}

/// One stage of a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SubCommand {
    /// Script text handed to the engine's parser.
    Script(String),
    /// A command looked up by name, with already-bound parameters.
    Command {
        name: String,
        parameters: Vec<Parameter>,
    },
}

impl SubCommand {
    pub fn script(text: impl Into<String>) -> Self {
        Self::Script(text.into())
    }

    pub fn command(name: impl Into<String>, parameters: Vec<Parameter>) -> Self {
        Self::Command {
            name: name.into(),
            parameters,
        }
    }

    pub fn is_script(&self) -> bool {
        matches!(self, Self::Script(_))
    }
}

/// What the worker appends to a submission before running it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Nothing appended; objects come back in the result.
    #[default]
    Collect,
    /// Append the session's default output command so objects reach the host.
    Default,
    /// Append the content output command: rendered to the host and also returned.
    Tee,
    /// Append `Out-Null`.
    Suppress,
}

/// An ordered pipeline of sub-commands submitted as one unit of work.
///
/// A secret command is never echoed and, when it produces nothing, does not
/// cause the prompt to be regenerated. Profile scripts are submitted this way.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Command {
    sub_commands: Vec<SubCommand>,
    secret: bool,
}

impl Command {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(text: impl Into<String>) -> Self {
        Self::new().pipe(SubCommand::script(text))
    }

    pub fn command(name: impl Into<String>, parameters: Vec<Parameter>) -> Self {
        Self::new().pipe(SubCommand::command(name, parameters))
    }

    /// Appends a stage; its input is the previous stage's output.
    #[must_use]
    pub fn pipe(mut self, sub_command: SubCommand) -> Self {
        self.sub_commands.push(sub_command);
        self
    }

    #[must_use]
    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    pub fn is_secret(&self) -> bool {
        self.secret
    }

    pub fn sub_commands(&self) -> &[SubCommand] {
        &self.sub_commands
    }

    pub fn is_empty(&self) -> bool {
        self.sub_commands.is_empty()
    }
}

impl From<&str> for Command {
    fn from(text: &str) -> Self {
        Self::script(text)
    }
}

impl From<String> for Command {
    fn from(text: String) -> Self {
        Self::script(text)
    }
}
