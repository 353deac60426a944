use std::io::Write;

use crossterm::style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType, SetTitle};
use crossterm::{cursor, queue};
use poshconsole_core::HostEvent;
use poshconsole_types::{ConsoleColor, Style};

pub fn to_color(color: ConsoleColor) -> Color {
    match color {
        ConsoleColor::Black => Color::Black,
        ConsoleColor::DarkBlue => Color::DarkBlue,
        ConsoleColor::DarkGreen => Color::DarkGreen,
        ConsoleColor::DarkCyan => Color::DarkCyan,
        ConsoleColor::DarkRed => Color::DarkRed,
        ConsoleColor::DarkMagenta => Color::DarkMagenta,
        ConsoleColor::DarkYellow => Color::DarkYellow,
        ConsoleColor::Gray => Color::Grey,
        ConsoleColor::DarkGray => Color::DarkGrey,
        ConsoleColor::Blue => Color::Blue,
        ConsoleColor::Green => Color::Green,
        ConsoleColor::Cyan => Color::Cyan,
        ConsoleColor::Red => Color::Red,
        ConsoleColor::Magenta => Color::Magenta,
        ConsoleColor::Yellow => Color::Yellow,
        ConsoleColor::White => Color::White,
    }
}

/// Draws host events onto a terminal stream.
///
/// In raw mode line feeds need an explicit carriage return; in plain mode
/// (one-shot `-c` runs, piped output) prompts are not drawn at all.
#[derive(Debug)]
pub struct Renderer<W: Write> {
    out: W,
    raw: bool,
    at_line_start: bool,
    prompt: String,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W, raw: bool) -> Self {
        Self {
            out,
            raw,
            at_line_start: true,
            prompt: String::new(),
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn render(&mut self, event: &HostEvent) -> std::io::Result<()> {
        match event {
            HostEvent::Write { text, style } => self.write_styled(text, *style),
            HostEvent::WriteLine { text, style } => {
                self.write_styled(text, *style)?;
                self.newline()
            }
            HostEvent::ErrorLine(text) => self.line(text, ConsoleColor::Red),
            HostEvent::WarningLine(text) => self.line(&format!("WARNING: {text}"), ConsoleColor::Yellow),
            HostEvent::VerboseLine(text) => self.line(&format!("VERBOSE: {text}"), ConsoleColor::Yellow),
            HostEvent::DebugLine(text) => self.line(&format!("DEBUG: {text}"), ConsoleColor::Yellow),
            HostEvent::Progress { record, .. } => self.line(&record.summary(), ConsoleColor::DarkCyan),
            HostEvent::Echo(text) => {
                self.write_styled(text, Style::DEFAULT)?;
                self.newline()
            }
            HostEvent::SetPrompt(text) => {
                self.prompt.clone_from(text);
                if self.raw {
                    self.write_styled(text, Style::DEFAULT)?;
                }
                Ok(())
            }
            HostEvent::NewParagraph => {
                if self.at_line_start {
                    Ok(())
                } else {
                    self.newline()
                }
            }
            HostEvent::SetWindowTitle(title) => {
                if self.raw {
                    queue!(self.out, SetTitle(title))?;
                }
                Ok(())
            }
            HostEvent::ClearScreen => {
                if self.raw {
                    queue!(self.out, Clear(ClearType::All), cursor::MoveTo(0, 0))?;
                    self.at_line_start = true;
                }
                Ok(())
            }
            HostEvent::InputRequested(_)
            | HostEvent::InputFinished
            | HostEvent::ShouldExit(_)
            | HostEvent::HistoryAdded(_) => Ok(()),
        }
    }

    pub fn write_styled(&mut self, text: &str, style: Style) -> std::io::Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        if let Some(fg) = style.foreground {
            queue!(self.out, SetForegroundColor(to_color(fg)))?;
        }
        if let Some(bg) = style.background {
            queue!(self.out, SetBackgroundColor(to_color(bg)))?;
        }
        let mut lines = text.split('\n').peekable();
        while let Some(line) = lines.next() {
            queue!(self.out, Print(line))?;
            if lines.peek().is_some() {
                self.newline()?;
            }
        }
        if style != Style::DEFAULT {
            queue!(self.out, ResetColor)?;
        }
        self.at_line_start = text.ends_with('\n');
        Ok(())
    }

    fn line(&mut self, text: &str, color: ConsoleColor) -> std::io::Result<()> {
        self.write_styled(text, Style::fg(color))?;
        self.newline()
    }

    pub fn newline(&mut self) -> std::io::Result<()> {
        let eol = if self.raw { "\r\n" } else { "\n" };
        queue!(self.out, Print(eol))?;
        self.at_line_start = true;
        Ok(())
    }

    /// Redraws the input line under the last line of the prompt.
    pub fn redraw_input(&mut self, continuation: bool, line: &str) -> std::io::Result<()> {
        let prompt = if continuation {
            ">> "
        } else {
            self.prompt.rsplit('\n').next().unwrap_or_default()
        };
        queue!(
            self.out,
            cursor::MoveToColumn(0),
            Clear(ClearType::CurrentLine),
            Print(prompt),
            Print(line)
        )?;
        self.at_line_start = prompt.is_empty() && line.is_empty();
        Ok(())
    }

    pub fn erase_chars(&mut self, count: usize) -> std::io::Result<()> {
        for _ in 0..count {
            queue!(self.out, Print("\u{8} \u{8}"))?;
        }
        Ok(())
    }

    pub fn print(&mut self, text: &str) -> std::io::Result<()> {
        queue!(self.out, Print(text))?;
        self.at_line_start = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use poshconsole_types::ProgressRecord;

    use super::*;

    fn plain(events: &[HostEvent]) -> String {
        let mut renderer = Renderer::new(Vec::new(), false);
        for event in events {
            renderer.render(event).expect("render to memory");
        }
        String::from_utf8(renderer.into_inner()).expect("utf-8")
    }

    #[test]
    fn plain_output_skips_prompts() {
        let text = plain(&[
            HostEvent::SetPrompt("PS> ".to_string()),
            HostEvent::WriteLine {
                text: "hello".to_string(),
                style: Style::DEFAULT,
            },
            HostEvent::Write {
                text: "no newline".to_string(),
                style: Style::DEFAULT,
            },
            HostEvent::NewParagraph,
            HostEvent::NewParagraph,
        ]);
        assert_eq!(text, "hello\nno newline\n");
    }

    #[test]
    fn stream_lines_carry_their_labels() {
        let text = plain(&[
            HostEvent::WarningLine("careful".to_string()),
            HostEvent::VerboseLine("details".to_string()),
            HostEvent::Progress {
                source_id: 1,
                record: ProgressRecord::builder().activity("Copy").percent_complete(50).build(),
            },
        ]);
        assert!(text.contains("WARNING: careful"));
        assert!(text.contains("VERBOSE: details"));
        assert!(text.contains("Copy"));
    }

    #[test]
    fn raw_mode_uses_carriage_returns() {
        let mut renderer = Renderer::new(Vec::new(), true);
        renderer
            .render(&HostEvent::WriteLine {
                text: "a\nb".to_string(),
                style: Style::DEFAULT,
            })
            .expect("render to memory");
        let text = String::from_utf8(renderer.into_inner()).expect("utf-8");
        assert_eq!(text, "a\r\nb\r\n");
    }
}
