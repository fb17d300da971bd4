//! Nested name/args/children directive tree: parser, equality, and
//! persistence, per the nginx-style configuration grammar.

mod compat;
mod parser;
mod validate;

pub use compat::apply_compat_transforms;
pub use parser::{parse, parse_str, ParseError};
pub use validate::validate;

use std::path::{Path, PathBuf};

/// One node of the directive tree. The synthetic root has an empty `name`
/// and no `args`.
#[derive(Clone, Debug)]
pub struct Directive {
    pub name: String,
    pub args: Vec<String>,
    pub children: Vec<Directive>,
    /// 1-based source line, for `ConfigInvalid` diagnostics. The root and
    /// any directive substituted by `compat` transforms may carry the line
    /// of the original directive it replaced.
    pub line: usize,
    /// Originating file, preserved through `include` resolution so error
    /// messages point at the file that actually wrote the directive.
    pub file: PathBuf,
}

impl Directive {
    pub fn root(file: impl Into<PathBuf>) -> Self {
        Self {
            name: String::new(),
            args: Vec::new(),
            children: Vec::new(),
            line: 0,
            file: file.into(),
        }
    }

    pub fn new(name: impl Into<String>, args: Vec<String>, line: usize, file: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            args,
            children: Vec::new(),
            line,
            file: file.into(),
        }
    }

    /// First child directive named `name`, if any.
    pub fn get(&self, name: &str) -> Option<&Directive> {
        self.children.iter().find(|d| d.name == name)
    }

    /// First child directive named `name` whose first argument is `arg0`.
    pub fn get_with_arg(&self, name: &str, arg0: &str) -> Option<&Directive> {
        self.children
            .iter()
            .find(|d| d.name == name && d.args.first().map(String::as_str) == Some(arg0))
    }

    /// All children named `name`, in document order. Used for
    /// multi-instance blocks (`transcode`, `ingest`) keyed by first arg.
    pub fn get_all<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Directive> {
        self.children.iter().filter(move |d| d.name == name)
    }

    /// Returns the existing child matching `name` (and `arg0` if given),
    /// or appends and returns a new one.
    pub fn get_or_create(&mut self, name: &str, arg0: Option<&str>) -> &mut Directive {
        let idx = self.children.iter().position(|d| {
            d.name == name
                && match arg0 {
                    Some(a0) => d.args.first().map(String::as_str) == Some(a0),
                    None => true,
                }
        });
        match idx {
            Some(i) => &mut self.children[i],
            None => {
                let args = arg0.map(|a| vec![a.to_string()]).unwrap_or_default();
                self.children.push(Directive::new(name, args, self.line, self.file.clone()));
                self.children.last_mut().expect("just pushed")
            }
        }
    }

    /// Deep clone, optionally omitting every top-level child named
    /// `except`. Used before handing a tree to the reload engine so the
    /// previous tree's identity is untouched by later mutation.
    pub fn copy(&self, except: Option<&str>) -> Self {
        Self {
            name: self.name.clone(),
            args: self.args.clone(),
            line: self.line,
            file: self.file.clone(),
            children: self
                .children
                .iter()
                .filter(|d| except.map_or(true, |n| d.name != n))
                .map(|d| d.copy(None))
                .collect(),
        }
    }

    /// Structural equality, ignoring `line`/`file`. `except`, if given,
    /// excludes top-level children with that name from comparison (used
    /// by the reload diff to compare "everything but vhosts", say).
    pub fn equals(&self, other: &Directive, except: Option<&str>) -> bool {
        if self.name != other.name || self.args != other.args {
            return false;
        }
        let mine: Vec<&Directive> = self
            .children
            .iter()
            .filter(|d| except.map_or(true, |n| d.name != n))
            .collect();
        let theirs: Vec<&Directive> = other
            .children
            .iter()
            .filter(|d| except.map_or(true, |n| d.name != n))
            .collect();
        if mine.len() != theirs.len() {
            return false;
        }
        mine.iter().zip(theirs.iter()).all(|(a, b)| a.equals(b, None))
    }

    /// Re-emits the canonical textual form with 4-space indent per nesting
    /// level, quoting any argument containing whitespace, `;`, `{`, `}`,
    /// `#`, or a quote character.
    pub fn persistence(&self, out: &mut dyn std::fmt::Write, indent: usize) -> std::fmt::Result {
        if !self.name.is_empty() {
            write!(out, "{}{}", "    ".repeat(indent), self.name)?;
            for arg in &self.args {
                write!(out, " {}", quote_if_needed(arg))?;
            }
        }
        if self.children.is_empty() {
            if !self.name.is_empty() {
                writeln!(out, ";")?;
            }
        } else {
            if !self.name.is_empty() {
                writeln!(out, " {{")?;
            }
            for child in &self.children {
                child.persistence(out, indent + if self.name.is_empty() { 0 } else { 1 })?;
            }
            if !self.name.is_empty() {
                writeln!(out, "{}}}", "    ".repeat(indent))?;
            }
        }
        Ok(())
    }
}

fn needs_quoting(s: &str) -> bool {
    s.is_empty()
        || s.chars()
            .any(|c| c.is_whitespace() || matches!(c, ';' | '{' | '}' | '#' | '"' | '\''))
}

fn quote_if_needed(s: &str) -> String {
    if needs_quoting(s) {
        format!("\"{}\"", s.replace('"', "\\\""))
    } else {
        s.to_string()
    }
}

/// Resolves `path` relative to `including_file`'s directory, per the
/// include-resolution rule: relative paths are relative to the including
/// file, not the process's working directory.
pub fn resolve_include_path(including_file: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        including_file
            .parent()
            .map(|dir| dir.join(p))
            .unwrap_or_else(|| p.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equals_is_structural_and_ignores_line() {
        let mut a = Directive::root("a.conf");
        a.children.push(Directive::new("listen", vec!["1935".into()], 1, "a.conf"));
        let mut b = Directive::root("b.conf");
        b.children.push(Directive::new("listen", vec!["1935".into()], 99, "b.conf"));
        assert!(a.equals(&b, None));
    }

    #[test]
    fn equals_except_ignores_named_subtree() {
        let mut a = Directive::root("a.conf");
        a.children.push(Directive::new("listen", vec!["1935".into()], 1, "a.conf"));
        a.children.push(Directive::new("vhost", vec!["v".into()], 2, "a.conf"));
        let mut b = Directive::root("a.conf");
        b.children.push(Directive::new("listen", vec!["1935".into()], 1, "a.conf"));
        assert!(!a.equals(&b, None));
        assert!(a.equals(&b, Some("vhost")));
    }

    #[test]
    fn persistence_quotes_args_with_special_chars() {
        let mut root = Directive::root("a.conf");
        let mut vhost = Directive::new("vhost", vec!["v".into()], 1, "a.conf");
        vhost.children.push(Directive::new(
            "refer",
            vec!["a b".into(), "plain".into()],
            2,
            "a.conf",
        ));
        root.children.push(vhost);
        let mut out = String::new();
        root.persistence(&mut out, 0).unwrap();
        assert!(out.contains("\"a b\""));
        assert!(out.contains("plain;"));
    }

    #[test]
    fn get_or_create_reuses_existing_child() {
        let mut root = Directive::root("a.conf");
        root.get_or_create("vhost", Some("v1"));
        assert_eq!(root.children.len(), 1);
        root.get_or_create("vhost", Some("v1"));
        assert_eq!(root.children.len(), 1);
        root.get_or_create("vhost", Some("v2"));
        assert_eq!(root.children.len(), 2);
    }
}
