use std::fmt;
use std::path::{Path, PathBuf};

/// A single icon resource: a file plus the icon's index inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IconRef {
    pub path: PathBuf,
    pub index: u32,
}

impl IconRef {
    pub fn new(path: impl Into<PathBuf>, index: u32) -> Self {
        Self {
            path: path.into(),
            index,
        }
    }

    /// Parse the ledger form `"<path>,<index>"`.
    ///
    /// A missing index means 0. An index that is negative or not a number
    /// is replaced by 0 with a warning. If the text after the last comma is
    /// not numeric at all, the comma is taken to be part of the path.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        let Some((head, tail)) = s.rsplit_once(',') else {
            return Self::new(s, 0);
        };

        let tail = tail.trim();
        if tail.is_empty() {
            return Self::new(head.trim(), 0);
        }

        match tail.parse::<i64>() {
            Ok(n) => match u32::try_from(n) {
                Ok(index) => Self::new(head.trim(), index),
                Err(_) => {
                    tracing::warn!(location = s, "icon index {} out of range, using 0", n);
                    Self::new(head.trim(), 0)
                }
            },
            Err(_) => {
                tracing::warn!(location = s, "no numeric icon index, using 0");
                Self::new(s, 0)
            }
        }
    }

    /// Same reference with `%VAR%` environment references expanded in the path.
    pub fn expanded(&self) -> Self {
        Self {
            path: PathBuf::from(expand_env_vars(&self.path.to_string_lossy())),
            index: self.index,
        }
    }

    pub fn is_inside(&self, dir: &Path) -> bool {
        self.path.starts_with(dir)
    }
}

impl fmt::Display for IconRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.path.display(), self.index)
    }
}

/// Expand Windows-style `%NAME%` references. Unknown names stay verbatim.
pub fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(end) if end > 0 => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(value) => out.push_str(&value),
                    Err(_) => {
                        out.push('%');
                        out.push_str(name);
                        out.push('%');
                    }
                }
                rest = &after[end + 1..];
            }
            _ => {
                out.push('%');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
