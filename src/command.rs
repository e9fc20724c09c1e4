// SPDX-License-Identifier: MIT

//! What to launch: the command line, where, and how visible.
//!
//! The command line is a single already-escaped string.  Building it from
//! separate arguments follows the Windows argv quoting rules; see
//! "Everyone quotes command line arguments the wrong way":
//!   https://learn.microsoft.com/en-us/archive/blogs/twistylittlepassagesallalike/everyone-quotes-command-line-arguments-the-wrong-way

use std::{fmt, path::{Path, PathBuf}, str::FromStr};

use crate::error::{Error, Result};

/// A pre-escaped command line, passed to the OS as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    line: String,
}

impl CommandLine {
    /// Take an already escaped command line verbatim.
    pub fn new(line: impl Into<String>) -> Self {
        Self { line: line.into() }
    }

    /// Quote and join an ordered argument list; the first entry is the program.
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut line = String::new();
        for (idx, arg) in args.into_iter().enumerate() {
            if idx > 0 {
                line.push(' ');
            }
            append_arg(&mut line, arg.as_ref())?;
        }
        Ok(Self { line })
    }

    pub fn as_str(&self) -> &str {
        &self.line
    }

    pub fn is_empty(&self) -> bool {
        self.line.trim().is_empty()
    }

    /// Mutable access, for callers that append to the line in place.
    pub fn as_mut_string(&mut self) -> &mut String {
        &mut self.line
    }

    /// Split the line into the program token and the untouched remainder.
    ///
    /// A leading quoted token ends at the next quote; an unquoted one at the
    /// first space or tab.  The program is returned without its quotes.
    pub fn split_program(&self) -> (String, String) {
        let line = self.line.trim_start();
        if let Some(rest) = line.strip_prefix('"') {
            return match rest.find('"') {
                Some(end) => (rest[..end].to_string(), rest[end + 1..].trim_start().to_string()),
                None => (rest.to_string(), String::new()),
            };
        }
        match line.find([' ', '\t']) {
            Some(end) => (line[..end].to_string(), line[end..].trim_start().to_string()),
            None => (line.to_string(), String::new()),
        }
    }

    /// Just the program token.
    pub fn program(&self) -> String {
        self.split_program().0
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}

impl From<&str> for CommandLine {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CommandLine {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}


/// Window visibility requested for the child.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VisibleMode {
    /// Not set; the OS default applies.
    #[default]
    None,
    NewConsole,
    Hide,
}

impl FromStr for VisibleMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "none" | "default" => Ok(Self::None),
            "newconsole" | "new-console" | "console" => Ok(Self::NewConsole),
            "hide" | "hidden" => Ok(Self::Hide),
            other => Err(format!("unknown visible mode '{other}'")),
        }
    }
}

impl fmt::Display for VisibleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::NewConsole => "newconsole",
            Self::Hide => "hide",
        })
    }
}


/// Describes how to launch the child process.
///
/// Owned by the request entity and read-only once a launch begins.
#[derive(Debug, Clone, Default)]
pub struct CommandDescriptor {
    pub commandline: CommandLine,
    /// Defaults to the caller's current directory when unset.
    pub cwd: Option<PathBuf>,
    pub visible: VisibleMode,
}

impl CommandDescriptor {
    pub fn new(commandline: CommandLine) -> Self {
        Self { commandline, cwd: None, visible: VisibleMode::None }
    }

    /// Working directory to hand to the OS, resolving the default.
    pub fn resolved_cwd(&self) -> Result<PathBuf> {
        match &self.cwd {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir()
                .map_err(|e| Error::Launch(format!("no current directory: {e}"))),
        }
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }
}


fn append_arg(line: &mut String, arg: &str) -> Result<()> {
    if arg.contains('\0') {
        return Err(Error::Launch("nul character found in argument".to_string()));
    }
    if !requires_quoting(arg) {
        line.push_str(arg);
        return Ok(());
    }

    line.push('"');
    let mut backslash_count = 0;
    for c in arg.chars() {
        if c == '\\' {
            backslash_count += 1;
            continue;
        }
        if c == '"' {
            // The pending backslashes and the quote itself all need escaping.
            push_backslashes(line, backslash_count * 2 + 1);
        } else {
            push_backslashes(line, backslash_count);
        }
        line.push(c);
        backslash_count = 0;
    }

    // Trailing backslashes must not escape the closing quote.
    push_backslashes(line, backslash_count * 2);
    line.push('"');
    Ok(())
}

fn push_backslashes(line: &mut String, count: usize) {
    line.extend(std::iter::repeat_n('\\', count));
}

fn requires_quoting(arg: &str) -> bool {
    arg.is_empty() || arg.chars().any(|c| matches!(c, ' ' | '\t' | '\n' | '\x0b' | '"'))
}
