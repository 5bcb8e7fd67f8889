//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use notegraph_core::{Link, NoteInfo};
use serde::Serialize;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// One row of the note listing
#[derive(Debug, Clone, Serialize)]
pub struct NoteRow {
    pub path: String,
    pub placeholder: bool,
    pub forward: usize,
    pub back: usize,
    pub saved_at: Option<String>,
}

impl From<&NoteInfo> for NoteRow {
    fn from(info: &NoteInfo) -> Self {
        Self {
            path: info.note.path.to_string(),
            placeholder: info.note.placeholder,
            forward: info.forward_count,
            back: info.back_count,
            saved_at: info.saved_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Print a list of notes
    pub fn print_notes(&self, notes: &[NoteRow]) {
        match self.format {
            OutputFormat::Human => {
                if notes.is_empty() {
                    println!("No notes found.");
                    return;
                }
                for note in notes {
                    let marker = if note.placeholder { "?" } else { " " };
                    println!(
                        "{} {} | out {} | in {}",
                        marker,
                        truncate(&note.path, 50),
                        note.forward,
                        note.back
                    );
                }
                let placeholders = notes.iter().filter(|n| n.placeholder).count();
                println!(
                    "\n{} note(s), {} placeholder(s)",
                    notes.len() - placeholders,
                    placeholders
                );
            }
            OutputFormat::Json => print_json(notes),
            OutputFormat::Quiet => {
                for note in notes {
                    println!("{}", note.path);
                }
            }
        }
    }

    /// Print the forward and back links of one note
    pub fn print_note_links(&self, path: &str, forward: &[Link], back: &[Link]) {
        match self.format {
            OutputFormat::Human => {
                println!("Links for: {}", path);
                println!();
                println!("── Outgoing ({}) ──", forward.len());
                for link in forward {
                    println!("  → {}{}", link.target, format_ranges(link));
                }
                println!();
                println!("── Incoming ({}) ──", back.len());
                for link in back {
                    println!("  ← {}{}", link.source, format_ranges(link));
                }
            }
            OutputFormat::Json => {
                print_json(&serde_json::json!({
                    "path": path,
                    "forward": forward,
                    "back": back,
                }));
            }
            OutputFormat::Quiet => {
                for link in forward {
                    println!("{}", link.target);
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize output: {}", e),
    }
}

/// Line numbers (1-based) where a link occurs, e.g. " (L3, L7)"
fn format_ranges(link: &Link) -> String {
    if link.ranges.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = link
        .ranges
        .iter()
        .map(|r| format!("L{}", r.start.line + 1))
        .collect();
    format!(" ({})", lines.join(", "))
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Human-readable byte size
pub fn human_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
