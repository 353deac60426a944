use std::sync::Arc;

use poshconsole_types::{
    ErrorCategory, ErrorCategoryKind, ErrorRecord, InvocationInfo, PsValue,
};

/// Byte range plus 1-based position of its start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn to(self, other: Self) -> Self {
        Self {
            start: self.start,
            end: other.end.max(self.end),
            line: self.line,
            column: self.column,
        }
    }

    /// Position info for an error raised at this span of `source`.
    pub fn invocation_info(&self, source: &str) -> InvocationInfo {
        let line_text = source
            .lines()
            .nth(self.line.saturating_sub(1))
            .unwrap_or_default()
            .to_string();
        let remaining = line_text
            .chars()
            .count()
            .saturating_sub(self.column.saturating_sub(1));
        let length = self.end.saturating_sub(self.start).clamp(1, remaining.max(1));
        InvocationInfo::builder()
            .line_text(line_text)
            .line(self.line)
            .column(self.column)
            .length(length)
            .build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub error_id: &'static str,
    pub span: Span,
}

impl ParseError {
    pub fn new(message: impl Into<String>, error_id: &'static str, span: Span) -> Self {
        Self {
            message: message.into(),
            error_id,
            span,
        }
    }

    pub fn into_error_record(self, source: &str) -> ErrorRecord {
        ErrorRecord::builder()
            .message(self.message)
            .fully_qualified_error_id(self.error_id)
            .category(
                ErrorCategory::builder()
                    .kind(ErrorCategoryKind::ParserError)
                    .reason("ParentContainsErrorRecordException")
                    .build(),
            )
            .invocation_info(self.span.invocation_info(source))
            .build()
    }
}

/// A parsed script block. `source` is the text every span inside indexes into.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptBlockAst {
    pub text: String,
    pub source: Arc<str>,
    pub params: Vec<ParamDecl>,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: String,
    pub switch: bool,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Pipeline(Pipeline),
    Assignment {
        name: String,
        value: Pipeline,
    },
    Function {
        name: String,
        body: Arc<ScriptBlockAst>,
    },
    If {
        clauses: Vec<(Pipeline, Vec<Statement>)>,
        else_body: Option<Vec<Statement>>,
    },
    Foreach {
        variable: String,
        items: Pipeline,
        body: Vec<Statement>,
    },
    While {
        condition: Pipeline,
        body: Vec<Statement>,
    },
    Throw {
        value: Option<Pipeline>,
        span: Span,
    },
    Exit(Option<Pipeline>),
    Return(Option<Pipeline>),
    Break,
    Continue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub elements: Vec<Element>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Expression(Expr),
    Command(CommandCall),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation {
    Direct,
    /// `& name`: runs in a child scope
    Call,
    /// `. name`: runs in the caller's scope
    DotSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandCall {
    pub invocation: Invocation,
    pub name: CommandName,
    pub args: Vec<Argument>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandName {
    Bare(String),
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    /// `-Name` or `-Name:value`
    Parameter { name: String, value: Option<Expr> },
    Value(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    NotLike,
    Contains,
    NotContains,
    And,
    Or,
}

impl BinaryOp {
    pub fn from_operator(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "eq" | "ieq" => Self::Eq,
            "ne" | "ine" => Self::Ne,
            "gt" | "igt" => Self::Gt,
            "ge" | "ige" => Self::Ge,
            "lt" | "ilt" => Self::Lt,
            "le" | "ile" => Self::Le,
            "like" | "ilike" => Self::Like,
            "notlike" | "inotlike" => Self::NotLike,
            "contains" | "icontains" => Self::Contains,
            "notcontains" | "inotcontains" => Self::NotContains,
            "and" => Self::And,
            "or" => Self::Or,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Eq => "-eq",
            Self::Ne => "-ne",
            Self::Gt => "-gt",
            Self::Ge => "-ge",
            Self::Lt => "-lt",
            Self::Le => "-le",
            Self::Like => "-like",
            Self::NotLike => "-notlike",
            Self::Contains => "-contains",
            Self::NotContains => "-notcontains",
            Self::And => "-and",
            Self::Or => "-or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StringPart {
    Text(String),
    Variable(String),
    SubExpr(Vec<Statement>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(PsValue),
    Expandable(Vec<StringPart>),
    Variable(String),
    Array(Vec<Expr>),
    /// `$( ... )`
    SubExpr(Vec<Statement>),
    /// `@( ... )`
    ArrayExpr(Vec<Statement>),
    /// `( ... )`
    Paren(Vec<Statement>),
    /// `{ ... }`, kept as text and re-parsed when invoked
    ScriptBlock(String),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Member {
        object: Box<Expr>,
        name: String,
    },
    MethodCall {
        object: Box<Expr>,
        name: String,
        args: Vec<Expr>,
        span: Span,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
}
