use smallvec::SmallVec;
use std::fmt::{self, Display, Formatter};

/// Shortcut function for creating a command.
#[must_use]
#[inline(always)]
pub fn cmd(name: &'static str) -> Command {
    Command::new(name)
}

/// Collection of arguments of [`Command`]
pub type CommandArgs = SmallVec<[Vec<u8>; 4]>;

/// Generic command meant to be sent to a Redis or Sentinel server
#[derive(Debug, Clone)]
pub struct Command {
    pub name: &'static str,
    pub args: CommandArgs,
}

impl Command {
    #[must_use]
    #[inline(always)]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            args: CommandArgs::new(),
        }
    }

    /// Builder function to add an argument to an existing command.
    #[must_use]
    pub fn arg(mut self, arg: impl ToArg) -> Self {
        arg.write_arg(&mut self.args);
        self
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)?;
        for arg in &self.args {
            f.write_fmt(format_args!(" {}", String::from_utf8_lossy(arg)))?;
        }
        Ok(())
    }
}

/// Types accepted as command arguments
pub trait ToArg {
    fn write_arg(self, args: &mut CommandArgs);
}

impl ToArg for &str {
    fn write_arg(self, args: &mut CommandArgs) {
        args.push(self.as_bytes().to_vec());
    }
}

impl ToArg for String {
    fn write_arg(self, args: &mut CommandArgs) {
        args.push(self.into_bytes());
    }
}

impl ToArg for u16 {
    fn write_arg(self, args: &mut CommandArgs) {
        let mut buffer = itoa::Buffer::new();
        args.push(buffer.format(self).as_bytes().to_vec());
    }
}

impl ToArg for usize {
    fn write_arg(self, args: &mut CommandArgs) {
        let mut buffer = itoa::Buffer::new();
        args.push(buffer.format(self).as_bytes().to_vec());
    }
}
