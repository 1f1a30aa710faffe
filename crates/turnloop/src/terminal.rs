//! A colored progress surface for terminals.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use indicatif::ProgressBar;
use owo_colors::OwoColorize;
use turnloop_core::stage::{ContentSink, Progress, Segment};
use turnloop_model::Attachment;

const BAR_CHAR: &str = "▎";

#[derive(Default)]
struct Console {
    spinner: Option<ProgressBar>,
    /// Whether the cursor is in the middle of assistant text.
    mid_line: bool,
}

impl Console {
    fn with_stdout(&mut self, f: impl FnOnce(&mut io::StdoutLock<'_>)) {
        // Finish the spinner before printing anything else.
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
        let mut stdout = io::stdout().lock();
        f(&mut stdout);
        stdout.flush().ok();
    }

    fn break_line(&mut self) {
        if self.mid_line {
            self.mid_line = false;
            self.with_stdout(|out| {
                writeln!(out).ok();
            });
        }
    }
}

/// Prints the assistant answer and tool segments to stdout.
///
/// A spinner is shown until the first output arrives.
#[derive(Clone)]
pub struct TerminalProgress {
    console: Arc<Mutex<Console>>,
}

impl TerminalProgress {
    /// Creates a surface that clears `spinner` on first output.
    pub fn new(spinner: ProgressBar) -> Self {
        Self {
            console: Arc::new(Mutex::new(Console {
                spinner: Some(spinner),
                mid_line: false,
            })),
        }
    }

    /// Clears the spinner and terminates the current line.
    pub fn finish(&self) {
        self.with_console(|console| {
            if let Some(spinner) = console.spinner.take() {
                spinner.finish_and_clear();
            }
            console.break_line();
        });
    }

    fn with_console<R>(&self, f: impl FnOnce(&mut Console) -> R) -> R {
        let mut console =
            self.console.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut console)
    }
}

impl ContentSink for TerminalProgress {
    fn append_text(&self, text: &str) {
        self.with_console(|console| {
            let first = !console.mid_line;
            console.mid_line = true;
            console.with_stdout(|out| {
                if first {
                    write!(out, "{}🤖 ", BAR_CHAR.bright_cyan()).ok();
                }
                write!(out, "{}", text.bright_white()).ok();
            });
        });
    }

    fn add_attachment(&self, attachment: &Attachment) {
        self.with_console(|console| {
            console.break_line();
            console.with_stdout(|out| print_attachment(out, None, attachment));
        });
    }
}

impl Progress for TerminalProgress {
    fn open_segment(&self, label: &str) -> Arc<dyn Segment> {
        self.with_console(|console| {
            console.break_line();
            console.with_stdout(|out| {
                writeln!(
                    out,
                    "{}🔧 {}",
                    BAR_CHAR.bright_yellow(),
                    label.bright_white().bold()
                )
                .ok();
            });
        });
        Arc::new(TerminalSegment {
            console: Arc::clone(&self.console),
            label: label.to_owned(),
            pending: Mutex::new(String::new()),
        })
    }
}

/// Prints the output of one tool call line by line, each line tagged with
/// the tool name so that concurrent calls stay readable.
struct TerminalSegment {
    console: Arc<Mutex<Console>>,
    label: String,
    pending: Mutex<String>,
}

impl TerminalSegment {
    fn print_lines(&self, lines: &[&str]) {
        if lines.is_empty() {
            return;
        }
        let mut console =
            self.console.lock().unwrap_or_else(PoisonError::into_inner);
        console.break_line();
        console.with_stdout(|out| {
            for line in lines {
                writeln!(
                    out,
                    "{}{} {}",
                    BAR_CHAR.bright_yellow(),
                    format!("[{}]", self.label).dimmed(),
                    line.dimmed()
                )
                .ok();
            }
        });
    }
}

impl ContentSink for TerminalSegment {
    fn append_text(&self, text: &str) {
        let mut pending =
            self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.push_str(text);
        let Some(last_newline) = pending.rfind('\n') else {
            return;
        };
        let complete: String = pending.drain(..=last_newline).collect();
        drop(pending);
        let lines: Vec<_> = complete.lines().collect();
        self.print_lines(&lines);
    }

    fn add_attachment(&self, attachment: &Attachment) {
        let mut console =
            self.console.lock().unwrap_or_else(PoisonError::into_inner);
        console.break_line();
        console.with_stdout(|out| {
            print_attachment(out, Some(&self.label), attachment)
        });
    }
}

impl Segment for TerminalSegment {
    fn close(&self) {
        let rest = std::mem::take(
            &mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if !rest.is_empty() {
            self.print_lines(&[rest.as_str()]);
        }
    }
}

fn print_attachment(
    out: &mut io::StdoutLock<'_>,
    label: Option<&str>,
    attachment: &Attachment,
) {
    let title = attachment
        .title
        .as_deref()
        .or(attachment.mime_type.as_deref())
        .unwrap_or("attachment");
    let prefix = label.map(|label| format!("[{label}] ")).unwrap_or_default();
    writeln!(
        out,
        "{}{}📎 {} {}",
        BAR_CHAR.bright_magenta(),
        prefix.dimmed(),
        title.bright_white(),
        attachment.url.as_deref().unwrap_or_default().underline()
    )
    .ok();
}
