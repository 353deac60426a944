use poshconsole_types::PsValue;

use super::ast::{ParseError, Span};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Command names, keywords and bareword arguments
    Word(String),
    /// `-Name`, or `-Name:` when a value is glued on
    Parameter {
        name: String,
        colon: bool,
    },
    Variable(String),
    Number(PsValue),
    /// Single-quoted, already unescaped
    Str(String),
    /// Double-quoted body, expanded by the parser
    ExpandableStr(String),
    DollarParen,
    AtParen,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Pipe,
    Semi,
    NewLine,
    Comma,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Dot,
    Ampersand,
    Bang,
    Eof,
}

impl TokenKind {
    /// Source-ish form used in "Unexpected token" messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Word(w) => w.clone(),
            Self::Parameter { name, .. } => format!("-{name}"),
            Self::Variable(v) => format!("${v}"),
            Self::Number(n) => n.to_string(),
            Self::Str(s) => format!("'{s}'"),
            Self::ExpandableStr(s) => format!("\"{s}\""),
            Self::DollarParen => "$(".to_string(),
            Self::AtParen => "@(".to_string(),
            Self::LParen => "(".to_string(),
            Self::RParen => ")".to_string(),
            Self::LBrace => "{".to_string(),
            Self::RBrace => "}".to_string(),
            Self::LBracket => "[".to_string(),
            Self::RBracket => "]".to_string(),
            Self::Pipe => "|".to_string(),
            Self::Semi => ";".to_string(),
            Self::NewLine => "newline".to_string(),
            Self::Comma => ",".to_string(),
            Self::Assign => "=".to_string(),
            Self::Plus => "+".to_string(),
            Self::Minus => "-".to_string(),
            Self::Star => "*".to_string(),
            Self::Slash => "/".to_string(),
            Self::Dot => ".".to_string(),
            Self::Ampersand => "&".to_string(),
            Self::Bang => "!".to_string(),
            Self::Eof => "end of input".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// Whitespace (or start of input) precedes the token
    pub space_before: bool,
}

pub struct Lexer<'s> {
    src: &'s str,
    pos: usize,
    line: usize,
    column: usize,
    /// The last token was a `.` glued to its left operand
    member_next: bool,
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Characters that end a bareword.
fn ends_word(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            ';' | '|' | '(' | ')' | '{' | '}' | ',' | '=' | '&' | '"' | '\'' | '$' | '`' | '[' | ']'
        )
}

impl<'s> Lexer<'s> {
    pub fn new(src: &'s str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            column: 1,
            member_next: false,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            let space_before = self.skip_trivia()?;
            let start = self.mark();
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    span: start,
                    space_before,
                });
                return Ok(tokens);
            };

            let kind = if self.member_next && is_ident_char(c) {
                TokenKind::Word(self.take_while(is_ident_char))
            } else {
                self.next_kind(c, space_before, start)?
            };
            self.member_next = kind == TokenKind::Dot && !space_before && !tokens.is_empty();
            let span = Span {
                end: self.pos,
                ..start
            };
            tokens.push(Token {
                kind,
                span,
                space_before: space_before || tokens.is_empty(),
            });
        }
    }

    fn next_kind(&mut self, c: char, space_before: bool, start: Span) -> Result<TokenKind, ParseError> {
        let kind = match c {
            '\n' => self.single(TokenKind::NewLine),
            ';' => self.single(TokenKind::Semi),
            '|' => self.single(TokenKind::Pipe),
            ',' => self.single(TokenKind::Comma),
            '(' => self.single(TokenKind::LParen),
            ')' => self.single(TokenKind::RParen),
            '{' => self.single(TokenKind::LBrace),
            '}' => self.single(TokenKind::RBrace),
            '[' => self.single(TokenKind::LBracket),
            ']' => self.single(TokenKind::RBracket),
            '=' => self.single(TokenKind::Assign),
            '+' => self.single(TokenKind::Plus),
            '&' => self.single(TokenKind::Ampersand),
            '!' => self.single(TokenKind::Bang),
            '%' | '?' if self.peek_at(1).is_none_or(ends_word) => {
                self.bump();
                TokenKind::Word(c.to_string())
            }
            '*' if !(space_before && self.peek_at(1).is_some_and(|n| n == '.' || n.is_alphabetic())) => {
                self.single(TokenKind::Star)
            }
            '/' if !(space_before && self.peek_at(1).is_some_and(|n| is_ident_char(n) || n == '.' || n == '~')) => {
                self.single(TokenKind::Slash)
            }
            '$' => self.variable(start)?,
            '@' => {
                if self.peek_at(1) == Some('(') {
                    self.bump();
                    self.bump();
                    TokenKind::AtParen
                } else {
                    return Err(ParseError::new(
                        "Unrecognized token in source text.",
                        "UnrecognizedToken",
                        start,
                    ));
                }
            }
            '\'' => self.single_quoted(start)?,
            '"' => self.double_quoted(start)?,
            '-' => {
                if self.peek_at(1).is_some_and(char::is_alphabetic) {
                    self.bump();
                    let name = self.take_while(|c| is_ident_char(c) || c == '-');
                    let colon = self.peek() == Some(':');
                    if colon {
                        self.bump();
                    }
                    TokenKind::Parameter { name, colon }
                } else {
                    self.single(TokenKind::Minus)
                }
            }
            '.' => match self.peek_at(1) {
                Some(d) if d.is_ascii_digit() => self.number(),
                Some('/' | '\\') => self.word(),
                Some('.') if matches!(self.peek_at(2), Some('/' | '\\')) => self.word(),
                _ => self.single(TokenKind::Dot),
            },
            d if d.is_ascii_digit() => {
                let save = (self.pos, self.line, self.column);
                let number = self.number();
                if self.peek().is_some_and(|n| n.is_alphabetic() || n == '_') {
                    (self.pos, self.line, self.column) = save;
                    self.word()
                } else {
                    number
                }
            }
            _ => self.word(),
        };
        Ok(kind)
    }

    fn mark(&self) -> Span {
        Span {
            start: self.pos,
            end: self.pos,
            line: self.line,
            column: self.column,
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.bump();
        kind
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
        self.src[start..self.pos].to_string()
    }

    /// Skips spaces, comments and line continuations. Returns whether anything was skipped.
    fn skip_trivia(&mut self) -> Result<bool, ParseError> {
        let mut skipped = false;
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r') => {
                    self.bump();
                }
                Some('`') if matches!(self.peek_at(1), Some('\n' | '\r')) => {
                    self.bump();
                    while matches!(self.peek(), Some('\r')) {
                        self.bump();
                    }
                    self.bump();
                }
                Some('<') if self.peek_at(1) == Some('#') => {
                    let start = self.mark();
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('#') if self.peek() == Some('>') => {
                                self.bump();
                                break;
                            }
                            Some(_) => {}
                            None => {
                                return Err(ParseError::new(
                                    "Missing end of comment block '#>'.",
                                    "MissingEndOfCommentBlock",
                                    start,
                                ));
                            }
                        }
                    }
                }
                Some('#') => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.bump();
                    }
                }
                _ => return Ok(skipped),
            }
            skipped = true;
        }
    }

    fn variable(&mut self, start: Span) -> Result<TokenKind, ParseError> {
        self.bump();
        match self.peek() {
            Some('(') => {
                self.bump();
                Ok(TokenKind::DollarParen)
            }
            Some('{') => {
                self.bump();
                let name = self.take_while(|c| c != '}');
                if self.bump() != Some('}') {
                    return Err(ParseError::new(
                        "Missing '}' in variable name.",
                        "MissingEndCurlyBrace",
                        start,
                    ));
                }
                Ok(TokenKind::Variable(name))
            }
            Some('_' | '?' | '$' | '^') if self.peek_at(1).is_none_or(|c| !is_ident_char(c)) => {
                let c = self.bump().unwrap_or('_');
                Ok(TokenKind::Variable(c.to_string()))
            }
            Some(c) if is_ident_char(c) => {
                let mut name = self.take_while(is_ident_char);
                // scope or drive qualifier: $env:HOME, $global:x
                if self.peek() == Some(':') && self.peek_at(1).is_some_and(is_ident_char) {
                    self.bump();
                    name.push(':');
                    name.push_str(&self.take_while(is_ident_char));
                }
                Ok(TokenKind::Variable(name))
            }
            _ => Ok(TokenKind::Word("$".to_string())),
        }
    }

    fn single_quoted(&mut self, start: Span) -> Result<TokenKind, ParseError> {
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('\'') if self.peek() == Some('\'') => {
                    self.bump();
                    out.push('\'');
                }
                Some('\'') => return Ok(TokenKind::Str(out)),
                Some(c) => out.push(c),
                None => {
                    return Err(ParseError::new(
                        "The string is missing the terminator: '.",
                        "TerminatorExpectedAtEndOfString",
                        start,
                    ));
                }
            }
        }
    }

    /// Keeps the body raw. Quotes inside `$( ... )` do not terminate the string.
    fn double_quoted(&mut self, start: Span) -> Result<TokenKind, ParseError> {
        self.bump();
        let body_start = self.pos;
        let mut depth = 0usize;
        let mut in_inner_quote = false;
        loop {
            let Some(c) = self.bump() else {
                return Err(ParseError::new(
                    "The string is missing the terminator: \".",
                    "TerminatorExpectedAtEndOfString",
                    start,
                ));
            };
            match c {
                '`' => {
                    self.bump();
                }
                '$' if self.peek() == Some('(') && !in_inner_quote => {
                    self.bump();
                    depth += 1;
                }
                '(' if depth > 0 && !in_inner_quote => depth += 1,
                ')' if depth > 0 && !in_inner_quote => depth -= 1,
                '"' if depth > 0 => in_inner_quote = !in_inner_quote,
                '"' if self.peek() == Some('"') => {
                    self.bump();
                }
                '"' => {
                    let body = self.src[body_start..self.pos - 1].to_string();
                    return Ok(TokenKind::ExpandableStr(body));
                }
                _ => {}
            }
        }
    }

    fn number(&mut self) -> TokenKind {
        let start = self.pos;
        self.take_while(|c| c.is_ascii_digit());
        let mut is_float = false;
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.bump();
            self.take_while(|c| c.is_ascii_digit());
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let digits_at = if matches!(self.peek_at(1), Some('+' | '-')) { 2 } else { 1 };
            if self.peek_at(digits_at).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                for _ in 0..digits_at {
                    self.bump();
                }
                self.take_while(|c| c.is_ascii_digit());
            }
        }
        let text = &self.src[start..self.pos];
        if !is_float && let Ok(v) = text.parse::<i64>() {
            return TokenKind::Number(
                i32::try_from(v).map_or_else(|_| PsValue::from(v), PsValue::from),
            );
        }
        TokenKind::Number(PsValue::from(text.parse::<f64>().unwrap_or(f64::NAN)))
    }

    fn word(&mut self) -> TokenKind {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if ends_word(c) {
                break;
            }
            out.push(c);
            self.bump();
        }
        if out.is_empty() {
            // a lone character no other rule claims
            if let Some(c) = self.bump() {
                out.push(c);
            }
        }
        TokenKind::Word(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn command_with_parameters() {
        assert_eq!(
            kinds("Write-Host -ForegroundColor:Red 'x' 42"),
            vec![
                TokenKind::Word("Write-Host".into()),
                TokenKind::Parameter {
                    name: "ForegroundColor".into(),
                    colon: true
                },
                TokenKind::Word("Red".into()),
                TokenKind::Str("x".into()),
                TokenKind::Number(PsValue::from(42)),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn variables_and_operators() {
        assert_eq!(
            kinds("$a = $env:HOME + 1.5 # trailing"),
            vec![
                TokenKind::Variable("a".into()),
                TokenKind::Assign,
                TokenKind::Variable("env:HOME".into()),
                TokenKind::Plus,
                TokenKind::Number(PsValue::from(1.5)),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn exponent_literals_are_doubles() {
        assert_eq!(
            kinds("1e19 2.5E-1 3e+2 4e"),
            vec![
                TokenKind::Number(PsValue::from(1e19)),
                TokenKind::Number(PsValue::from(0.25)),
                TokenKind::Number(PsValue::from(300.0)),
                TokenKind::Word("4e".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn quoted_strings() {
        assert_eq!(
            kinds(r#"'it''s' "say ""hi"" $(1 + "x")""#),
            vec![
                TokenKind::Str("it's".into()),
                TokenKind::ExpandableStr(r#"say ""hi"" $(1 + "x")"#.into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unterminated_string_reports_position() {
        let err = Lexer::new("\n  'abc").tokenize().unwrap_err();
        assert_eq!(err.error_id, "TerminatorExpectedAtEndOfString");
        assert_eq!((err.span.line, err.span.column), (2, 3));
    }

    #[test]
    fn paths_and_dot_source() {
        assert_eq!(
            kinds(". ./profile.ps1"),
            vec![
                TokenKind::Dot,
                TokenKind::Word("./profile.ps1".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn line_continuation_and_comments() {
        assert_eq!(
            kinds("a `\n b <# c #> ; d"),
            vec![
                TokenKind::Word("a".into()),
                TokenKind::Word("b".into()),
                TokenKind::Semi,
                TokenKind::Word("d".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn member_chain_splits_on_dots() {
        assert_eq!(
            kinds("$x.Name.Length"),
            vec![
                TokenKind::Variable("x".into()),
                TokenKind::Dot,
                TokenKind::Word("Name".into()),
                TokenKind::Dot,
                TokenKind::Word("Length".into()),
                TokenKind::Eof,
            ]
        );
    }
}
