//! Stateful recursive-descent parser for the nginx-style directive grammar:
//!
//! ```text
//! directive := NAME (SP ARG)* (';' | '{' directive* '}')
//! ARG       := bare_token | "double-quoted" | 'single-quoted'
//! comment   := '#' ... LF
//! include   := 'include' PATH+ ';'
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::directive::{resolve_include_path, Directive};

/// Explicit parser states, named to match the grammar's shape rather than
/// any particular implementation's internals.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    Init,
    EntireEnd,
    BlockStart,
    BlockEnd,
    Eof,
}

#[derive(Clone, Debug)]
pub struct ParseError {
    pub file: PathBuf,
    pub line: usize,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.file.display(), self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parses `path`, resolving any `include` directives found along the way
/// relative to the file that contains them. Returns a root [`Directive`]
/// with all `include` nodes replaced by their resolved contents.
pub fn parse(path: &Path) -> Result<Directive, ParseError> {
    let text = fs::read_to_string(path).map_err(|e| ParseError {
        file: path.to_path_buf(),
        line: 0,
        message: format!("failed to read {}: {}", path.display(), e),
    })?;
    let mut root = parse_str(&text, path)?;
    resolve_includes(&mut root, path)?;
    Ok(root)
}

/// Parses already-loaded text as if it came from `file` (used for tests
/// and for files already read by the caller). Does not resolve includes;
/// call [`resolve_includes`] separately if needed.
pub fn parse_str(text: &str, file: &Path) -> Result<Directive, ParseError> {
    let mut lexer = Lexer::new(text);
    let mut root = Directive::root(file.to_path_buf());
    parse_block(&mut lexer, file, &mut root, true)?;
    Ok(root)
}

fn resolve_includes(node: &mut Directive, current_file: &Path) -> Result<(), ParseError> {
    let mut resolved = Vec::with_capacity(node.children.len());
    for child in node.children.drain(..) {
        if child.name == "include" {
            for path_arg in &child.args {
                let include_path = resolve_include_path(current_file, path_arg);
                let included = parse(&include_path)?;
                for mut grandchild in included.children {
                    // Preserve the including directive's synthetic line if
                    // the included tree did not record one more specific.
                    if grandchild.line == 0 {
                        grandchild.line = child.line;
                    }
                    resolved.push(grandchild);
                }
            }
        } else {
            let mut child = child;
            resolve_includes(&mut child, current_file)?;
            resolved.push(child);
        }
    }
    node.children = resolved;
    Ok(())
}

struct Lexer<'a> {
    bytes: &'a [u8],
    pos: usize,
    line: usize,
}

#[derive(Debug, Eq, PartialEq)]
enum Token {
    Word(String),
    Semicolon,
    BlockOpen,
    BlockClose,
    Eof,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
            line: 1,
        }
    }

    fn peek_byte(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek_byte()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
        }
        Some(b)
    }

    fn skip_ws_and_comments(&mut self) {
        loop {
            match self.peek_byte() {
                Some(b) if b.is_ascii_whitespace() => {
                    self.advance();
                }
                Some(b'#') => {
                    while let Some(b) = self.peek_byte() {
                        if b == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    /// Reads the next token. A quoted argument's terminating quote is
    /// consumed and not included in the token text; an unterminated quote
    /// still yields whatever was read (the empty string if nothing was).
    fn next_token(&mut self) -> Token {
        self.skip_ws_and_comments();
        match self.peek_byte() {
            None => Token::Eof,
            Some(b';') => {
                self.advance();
                Token::Semicolon
            }
            Some(b'{') => {
                self.advance();
                Token::BlockOpen
            }
            Some(b'}') => {
                self.advance();
                Token::BlockClose
            }
            Some(q @ (b'"' | b'\'')) => {
                self.advance();
                let mut s = String::new();
                loop {
                    match self.peek_byte() {
                        None => break,
                        Some(b) if b == q => {
                            self.advance();
                            break;
                        }
                        Some(b'\\') if self.bytes.get(self.pos + 1) == Some(&q) => {
                            self.advance();
                            s.push(q as char);
                            self.advance();
                        }
                        Some(_) => {
                            s.push(self.advance().unwrap() as char);
                        }
                    }
                }
                Token::Word(s)
            }
            Some(_) => {
                let mut s = String::new();
                loop {
                    match self.peek_byte() {
                        Some(b) if b.is_ascii_whitespace() || matches!(b, b';' | b'{' | b'}' | b'#') => {
                            break;
                        }
                        None => break,
                        Some(_) => s.push(self.advance().unwrap() as char),
                    }
                }
                Token::Word(s)
            }
        }
    }
}

fn parse_block(
    lexer: &mut Lexer<'_>,
    file: &Path,
    parent: &mut Directive,
    is_root: bool,
) -> Result<(), ParseError> {
    let mut state = State::Init;
    loop {
        state = match state {
            State::Init | State::EntireEnd | State::BlockEnd => {
                let start_line = lexer.line;
                match lexer.next_token() {
                    Token::Eof => {
                        if is_root {
                            State::Eof
                        } else {
                            return Err(ParseError {
                                file: file.to_path_buf(),
                                line: start_line,
                                message: "unexpected end of file inside block".into(),
                            });
                        }
                    }
                    Token::BlockClose => {
                        if is_root {
                            return Err(ParseError {
                                file: file.to_path_buf(),
                                line: start_line,
                                message: "unexpected '}' at top level".into(),
                            });
                        }
                        State::Eof
                    }
                    Token::Word(name) => {
                        let mut args = Vec::new();
                        let directive_line = start_line;
                        let end = loop {
                            match lexer.next_token() {
                                Token::Word(arg) => args.push(arg),
                                Token::Semicolon => break State::EntireEnd,
                                Token::BlockOpen => break State::BlockStart,
                                Token::Eof => {
                                    return Err(ParseError {
                                        file: file.to_path_buf(),
                                        line: lexer.line,
                                        message: format!(
                                            "unterminated directive '{}'",
                                            name
                                        ),
                                    })
                                }
                                Token::BlockClose => {
                                    return Err(ParseError {
                                        file: file.to_path_buf(),
                                        line: lexer.line,
                                        message: format!(
                                            "unexpected '}}' in directive '{}'",
                                            name
                                        ),
                                    })
                                }
                            }
                        };
                        let mut node = Directive::new(name, args, directive_line, file.to_path_buf());
                        if end == State::BlockStart {
                            parse_block(lexer, file, &mut node, false)?;
                        }
                        parent.children.push(node);
                        if end == State::BlockStart {
                            State::BlockEnd
                        } else {
                            State::EntireEnd
                        }
                    }
                    Token::Semicolon => State::EntireEnd,
                    Token::BlockOpen => {
                        return Err(ParseError {
                            file: file.to_path_buf(),
                            line: start_line,
                            message: "'{' without a preceding directive name".into(),
                        })
                    }
                }
            }
            State::Eof => return Ok(()),
            State::BlockStart => unreachable!("BlockStart is consumed inline"),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_text(text: &str) -> Directive {
        parse_str(text, Path::new("test.conf")).unwrap()
    }

    #[test]
    fn parses_simple_scalar_directive() {
        let root = parse_text("listen 1935;");
        let d = root.get("listen").unwrap();
        assert_eq!(d.args, vec!["1935"]);
    }

    #[test]
    fn parses_nested_block() {
        let root = parse_text("vhost v { hls { enabled on; hls_fragment 10; } }");
        let vhost = root.get("vhost").unwrap();
        assert_eq!(vhost.args, vec!["v"]);
        let hls = vhost.get("hls").unwrap();
        assert_eq!(hls.get("hls_fragment").unwrap().args, vec!["10"]);
    }

    #[test]
    fn parses_quoted_args_verbatim() {
        let root = parse_text(r#"refer "a b;c" ;"#);
        let d = root.get("refer").unwrap();
        assert_eq!(d.args, vec!["a b;c"]);
    }

    #[test]
    fn comments_terminate_at_newline() {
        let root = parse_text("listen 1935; # comment here\npid ./srs.pid;");
        assert!(root.get("listen").is_some());
        assert!(root.get("pid").is_some());
    }

    #[test]
    fn empty_quoted_arg_yields_empty_string() {
        let root = parse_text(r#"candidate "";"#);
        let d = root.get("candidate").unwrap();
        assert_eq!(d.args, vec![""]);
    }

    #[test]
    fn unterminated_directive_is_a_parse_error() {
        let err = parse_str("listen 1935", Path::new("test.conf")).unwrap_err();
        assert!(err.message.contains("unterminated"));
    }
}
