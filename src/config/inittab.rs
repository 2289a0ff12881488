// Inittab parsing: one absolute command per line

use crate::error::{MinderError, Result};
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Inittab location used when none is given on the command line
pub const DEFAULT_INITTAB: &str = "/etc/inittab";

/// A syntax problem in an inittab, located by line (1-based)
#[derive(Debug, Error)]
pub enum InittabError {
    #[error("{}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}:{line}: command '{text}' must be absolutely qualified", .path.display())]
    NotAbsolute {
        path: PathBuf,
        line: usize,
        text: String,
    },

    #[error("{}", render_suspicious(.path, .line, .text, .column))]
    Suspicious {
        path: PathBuf,
        line: usize,
        text: String,
        /// Byte offset of the first offending character within `text`
        column: usize,
    },
}

impl InittabError {
    pub fn line(&self) -> Option<usize> {
        match self {
            InittabError::Unreadable { .. } => None,
            InittabError::NotAbsolute { line, .. } | InittabError::Suspicious { line, .. } => {
                Some(*line)
            }
        }
    }
}

fn render_suspicious(path: &Path, line: &usize, text: &str, column: &usize) -> String {
    let column = *column;
    let lead = format!("{}:{}: command '", path.display(), line);
    let pad = lead.chars().count() + text.get(..column).map_or(column, |s| s.chars().count());
    format!(
        "{}:{}: command '{}' looks suspicious\n{:pad$}^~~ problem starts here...",
        path.display(),
        line,
        text,
        "",
        pad = pad
    )
}

// isspace(3) in the C locale
fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | 0x0b | 0x0c | b'\r')
}

// isprint(3) in the C locale
fn is_print(b: u8) -> bool {
    (0x20..=0x7e).contains(&b)
}

/// Parse inittab contents. `path` is only used to label errors.
///
/// Blank lines and `#` comments are skipped. Every other line must hold
/// exactly one absolute path made of printable, non-space characters;
/// the first violation aborts the whole parse.
pub fn parse(path: &Path, contents: &[u8]) -> std::result::Result<Vec<PathBuf>, InittabError> {
    let mut commands = Vec::new();

    for (index, raw) in contents.split(|&b| b == b'\n').enumerate() {
        let line = index + 1;

        let start = raw.iter().position(|&b| !is_space(b)).unwrap_or(raw.len());
        let body = &raw[start..];
        if body.is_empty() || body[0] == b'#' {
            continue;
        }

        let text = String::from_utf8_lossy(body).into_owned();
        if body[0] != b'/' {
            return Err(InittabError::NotAbsolute {
                path: path.to_path_buf(),
                line,
                text,
            });
        }

        let end = body
            .iter()
            .position(|&b| is_space(b) || !is_print(b))
            .unwrap_or(body.len());
        if end < body.len() {
            return Err(InittabError::Suspicious {
                path: path.to_path_buf(),
                line,
                column: String::from_utf8_lossy(&body[..end]).len(),
                text,
            });
        }

        commands.push(PathBuf::from(OsStr::from_bytes(body)));
    }

    Ok(commands)
}

/// The parsed, immutable list of commands to supervise
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inittab {
    pub path: PathBuf,
    pub commands: Vec<PathBuf>,
}

impl Inittab {
    /// Read and parse an inittab; an empty one is a configuration error
    pub fn load(path: &Path) -> Result<Inittab> {
        let contents = std::fs::read(path).map_err(|source| InittabError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        let commands = parse(path, &contents)?;
        for command in &commands {
            info!("- [{}]", command.display());
        }

        if commands.is_empty() {
            return Err(MinderError::NoCommands(path.to_path_buf()));
        }

        Ok(Inittab {
            path: path.to_path_buf(),
            commands,
        })
    }
}
