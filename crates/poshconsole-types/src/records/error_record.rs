use std::fmt::Write;

use crate::ps_value::{PsObject, PsValue};

/// Error category, mirroring the `ErrorCategory` enumeration the console
/// prints in `CategoryInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorCategoryKind {
    #[default]
    NotSpecified,
    OperationStopped,
    ParserError,
    InvalidArgument,
    InvalidOperation,
    ObjectNotFound,
    ReadError,
    WriteError,
    InvalidData,
}

impl ErrorCategoryKind {
    pub const ALL: [Self; 9] = [
        Self::NotSpecified,
        Self::OperationStopped,
        Self::ParserError,
        Self::InvalidArgument,
        Self::InvalidOperation,
        Self::ObjectNotFound,
        Self::ReadError,
        Self::WriteError,
        Self::InvalidData,
    ];

    /// Case-insensitive lookup by name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name.trim()))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotSpecified => "NotSpecified",
            Self::OperationStopped => "OperationStopped",
            Self::ParserError => "ParserError",
            Self::InvalidArgument => "InvalidArgument",
            Self::InvalidOperation => "InvalidOperation",
            Self::ObjectNotFound => "ObjectNotFound",
            Self::ReadError => "ReadError",
            Self::WriteError => "WriteError",
            Self::InvalidData => "InvalidData",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, typed_builder::TypedBuilder)]
pub struct ErrorCategory {
    #[builder(default)]
    pub kind: ErrorCategoryKind,
    /// The command that was running, e.g. `Write-Error`
    #[builder(default, setter(strip_option, into))]
    pub activity: Option<String>,
    /// Short exception type name, e.g. `RuntimeException`
    #[builder(default, setter(strip_option, into))]
    pub reason: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub target_name: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub target_type: Option<String>,
}

impl ErrorCategory {
    /// `CategoryInfo` text: `Kind: (target:type) [activity], reason`.
    pub fn message(&self) -> String {
        let mut out = format!("{}: ", self.kind.as_str());
        let target = self.target_name.as_deref().unwrap_or_default();
        let target_type = self.target_type.as_deref().unwrap_or_default();
        let _ = write!(out, "({target}:{target_type})");
        if let Some(activity) = &self.activity {
            let _ = write!(out, " [{activity}]");
        }
        if let Some(reason) = &self.reason {
            let _ = write!(out, ", {reason}");
        }
        out
    }
}

/// Where in the submitted text an error was raised.
#[derive(Debug, Clone, PartialEq, Eq, typed_builder::TypedBuilder)]
pub struct InvocationInfo {
    /// The full source line containing the failing construct
    pub line_text: String,
    /// 1-based
    pub line: usize,
    /// 1-based
    pub column: usize,
    #[builder(default = 1)]
    pub length: usize,
    #[builder(default, setter(strip_option, into))]
    pub command_name: Option<String>,
}

impl InvocationInfo {
    /// `At line:1 char:5` followed by the line and a `~` underline.
    pub fn position_message(&self) -> String {
        let mut out = format!("At line:{} char:{}\n", self.line, self.column);
        let _ = writeln!(out, "+ {}", self.line_text.trim_end());
        let pad = " ".repeat(self.column.saturating_sub(1));
        let _ = write!(out, "+ {pad}{}", "~".repeat(self.length.max(1)));
        out
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Include the `CategoryInfo` and `FullyQualifiedErrorId` lines.
    pub include_category: bool,
    /// Include position info (line:char + underline block) when available.
    pub include_position: bool,
    /// If true, trim trailing newlines from each section.
    pub trim: bool,
}

#[derive(Debug, Clone, PartialEq, typed_builder::TypedBuilder)]
pub struct ErrorRecord {
    /// The error message
    #[builder(setter(into))]
    pub message: String,
    /// The fully qualified error ID
    #[builder(default, setter(strip_option, into))]
    pub fully_qualified_error_id: Option<String>,
    /// The target object that caused the error
    #[builder(default, setter(strip_option))]
    pub target_object: Option<PsValue>,
    #[builder(default)]
    pub category: ErrorCategory,
    /// Whether this was raised by a `throw` statement
    #[builder(default = false)]
    pub was_thrown_from_throw_statement: bool,
    #[builder(default, setter(strip_option))]
    pub invocation_info: Option<InvocationInfo>,
}

impl ErrorRecord {
    /// Shorthand for an error with only a message and an id.
    pub fn new(message: impl Into<String>, error_id: impl Into<String>) -> Self {
        Self::builder()
            .message(message)
            .fully_qualified_error_id(error_id)
            .build()
    }

    /// PS 7 "ConciseView": just the main message.
    pub fn render_concise(&self) -> String {
        normalize(&self.message)
    }

    /// Classic "NormalView": position, message, category and error id.
    pub fn render_normal(&self) -> String {
        self.render_with_options(RenderOptions {
            include_category: true,
            include_position: true,
            trim: true,
        })
    }

    pub fn render_with_options(&self, opts: RenderOptions) -> String {
        let mut out = String::new();

        if opts.include_position
            && let Some(info) = &self.invocation_info
        {
            push_line(&mut out, &info.position_message(), opts.trim);
        }

        push_line(&mut out, &normalize(&self.message), opts.trim);

        if opts.include_category {
            push_line(
                &mut out,
                &format!("    + CategoryInfo          : {}", self.category.message()),
                opts.trim,
            );
            if let Some(id) = &self.fully_qualified_error_id {
                push_line(
                    &mut out,
                    &format!("    + FullyQualifiedErrorId : {id}"),
                    opts.trim,
                );
            }
        }

        if opts.trim {
            while out.ends_with('\n') {
                out.pop();
            }
        }
        out
    }

    /// The record as a pipeline object, so `$error`-style consumers and
    /// `Out-Default` can treat it like any other value.
    pub fn to_ps_object(&self) -> PsObject {
        let mut obj = PsObject::new("System.Management.Automation.ErrorRecord")
            .with_to_string(self.message.clone())
            .with_property("Message", self.message.clone())
            .with_property("CategoryInfo", self.category.message());
        if let Some(id) = &self.fully_qualified_error_id {
            obj.set("FullyQualifiedErrorId", id.clone());
        }
        if let Some(target) = &self.target_object {
            obj.set("TargetObject", target.clone());
        }
        obj
    }
}

impl std::fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render_concise())
    }
}

fn normalize(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\r', "\n")
}

fn push_line(out: &mut String, text: &str, trim: bool) {
    let text = if trim { text.trim_end_matches('\n') } else { text };
    if text.is_empty() {
        return;
    }
    out.push_str(text);
    out.push('\n');
}
