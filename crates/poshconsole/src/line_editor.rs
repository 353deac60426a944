use poshconsole_core::script::is_incomplete;
use poshconsole_types::KeyInfo;

/// What the UI does after a key reached the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    Redraw,
    /// The input parses; run it.
    Submit(String),
    /// The input stops early; keep reading under the continuation prompt.
    Continue,
    Nothing,
}

/// The line typed at the console prompt, plus recall of earlier submissions.
#[derive(Debug, Default)]
pub struct LineEditor {
    line: String,
    continued: Vec<String>,
    history: Vec<String>,
    recall: Option<usize>,
}

impl LineEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn is_continuing(&self) -> bool {
        !self.continued.is_empty()
    }

    pub fn apply(&mut self, key: KeyInfo) -> Edit {
        if key.is_enter() {
            self.recall = None;
            self.continued.push(std::mem::take(&mut self.line));
            let text = self.continued.join("\n");
            if is_incomplete(&text) {
                return Edit::Continue;
            }
            self.continued.clear();
            Edit::Submit(text)
        } else if key.is_backspace() {
            if self.line.pop().is_some() {
                Edit::Redraw
            } else {
                Edit::Nothing
            }
        } else if key.is_escape() {
            self.line.clear();
            Edit::Redraw
        } else if key.is_printable() {
            self.line.push(key.character);
            Edit::Redraw
        } else {
            Edit::Nothing
        }
    }

    /// Drops the line and any continuation lines.
    pub fn cancel(&mut self) {
        self.line.clear();
        self.continued.clear();
        self.recall = None;
    }

    pub fn record(&mut self, text: impl Into<String>) {
        let text = text.into();
        if self.history.last() != Some(&text) {
            self.history.push(text);
        }
    }

    /// Replaces the line with the previous history entry. False at the oldest one.
    pub fn recall_previous(&mut self) -> bool {
        let next = match self.recall {
            None if self.history.is_empty() => return false,
            None => self.history.len() - 1,
            Some(0) => return false,
            Some(i) => i - 1,
        };
        self.recall = Some(next);
        self.line.clone_from(&self.history[next]);
        true
    }

    pub fn recall_next(&mut self) -> bool {
        let Some(i) = self.recall else {
            return false;
        };
        if i + 1 < self.history.len() {
            self.recall = Some(i + 1);
            self.line.clone_from(&self.history[i + 1]);
        } else {
            self.recall = None;
            self.line.clear();
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_text(editor: &mut LineEditor, text: &str) {
        for c in text.chars() {
            editor.apply(KeyInfo::from_char(c));
        }
    }

    #[test]
    fn enter_submits_the_line() {
        let mut editor = LineEditor::new();
        type_text(&mut editor, "'hi'");
        assert_eq!(editor.apply(KeyInfo::enter()), Edit::Submit("'hi'".to_string()));
        assert_eq!(editor.line(), "");
    }

    #[test]
    fn unfinished_blocks_continue_on_the_next_line() {
        let mut editor = LineEditor::new();
        type_text(&mut editor, "function f {");
        assert_eq!(editor.apply(KeyInfo::enter()), Edit::Continue);
        assert!(editor.is_continuing());

        type_text(&mut editor, "'yes' }");
        assert_eq!(
            editor.apply(KeyInfo::enter()),
            Edit::Submit("function f {\n'yes' }".to_string())
        );
        assert!(!editor.is_continuing());
    }

    #[test]
    fn backspace_and_escape_edit_the_line() {
        let mut editor = LineEditor::new();
        type_text(&mut editor, "abc");
        assert_eq!(editor.apply(KeyInfo::backspace()), Edit::Redraw);
        assert_eq!(editor.line(), "ab");
        editor.apply(KeyInfo::escape());
        assert_eq!(editor.line(), "");
        assert_eq!(editor.apply(KeyInfo::backspace()), Edit::Nothing);
    }

    #[test]
    fn history_walks_back_and_forth() {
        let mut editor = LineEditor::new();
        editor.record("first");
        editor.record("second");
        editor.record("second");

        assert!(editor.recall_previous());
        assert_eq!(editor.line(), "second");
        assert!(editor.recall_previous());
        assert_eq!(editor.line(), "first");
        assert!(!editor.recall_previous());

        assert!(editor.recall_next());
        assert_eq!(editor.line(), "second");
        assert!(editor.recall_next());
        assert_eq!(editor.line(), "");
        assert!(!editor.recall_next());
    }
}
