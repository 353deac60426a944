#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressRecordType {
    #[default]
    Processing = 0,
    Completed = 1,
}

impl ProgressRecordType {
    pub fn as_string(&self) -> &'static str {
        match self {
            Self::Processing => "Processing",
            Self::Completed => "Completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, typed_builder::TypedBuilder)]
pub struct ProgressRecord {
    #[builder(setter(into))]
    pub activity: String,
    #[builder(default)]
    pub activity_id: i32,
    #[builder(default, setter(strip_option, into))]
    pub status_description: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub current_operation: Option<String>,
    #[builder(default, setter(transform = |x: Option<i32>| x.filter(|&v| v >= 0)))]
    pub parent_activity_id: Option<i32>,
    #[builder(default = -1, setter(transform = |x: i32| if (-1..=100).contains(&x) { x } else { -1 }))]
    pub percent_complete: i32,
    #[builder(default)]
    pub progress_type: ProgressRecordType,
    #[builder(default, setter(strip_option))]
    pub seconds_remaining: Option<i32>,
}

impl ProgressRecord {
    /// One-line summary used by text front ends.
    pub fn summary(&self) -> String {
        let status = self.status_description.as_deref().unwrap_or_default();
        match (self.progress_type, self.percent_complete) {
            (ProgressRecordType::Completed, _) => format!("{}: completed", self.activity),
            (_, -1) => format!("{}: {status}", self.activity),
            (_, percent) => format!("{}: {status} ({percent}%)", self.activity),
        }
    }
}
