//! Colored output helpers for CLI
//!
//! Provides consistent, colored terminal output for the quest-server CLI:
//! status lines, the live event stream and the final report.

use crate::types::{AgentEvent, EventKind, Report, SessionStatusView};
use owo_colors::OwoColorize;

/// Output style configuration
pub struct Output {
    /// Whether to use colored output
    pub colored: bool,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    /// Create a new output helper with colors enabled
    pub fn new() -> Self {
        Self { colored: true }
    }

    /// Create a new output helper with colors disabled
    pub fn no_color() -> Self {
        Self { colored: false }
    }

    /// Print the banner
    pub fn banner(&self) {
        if self.colored {
            println!(
                "\n   {} {}\n",
                "quest".bright_cyan().bold(),
                format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
            );
        } else {
            println!("\n   quest v{}\n", env!("CARGO_PKG_VERSION"));
        }
    }

    /// Print a success message with a checkmark
    pub fn success(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "✓".green().bold(), message.green());
        } else {
            println!("  [OK] {}", message);
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "•".blue(), message);
        } else {
            println!("  [INFO] {}", message);
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "⚠".yellow().bold(), message.yellow());
        } else {
            println!("  [WARN] {}", message);
        }
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        if self.colored {
            eprintln!("  {} {}", "✗".red().bold(), message.red());
        } else {
            eprintln!("  [ERROR] {}", message);
        }
    }

    /// Print a header for a section
    pub fn header(&self, title: &str) {
        if self.colored {
            println!("\n  {}", title.bright_white().bold().underline());
        } else {
            println!("\n  === {} ===", title);
        }
    }

    /// Print a subheader
    pub fn subheader(&self, title: &str) {
        if self.colored {
            println!("\n  {}", title.cyan().bold());
        } else {
            println!("\n  --- {} ---", title);
        }
    }

    /// Print a key-value pair
    pub fn kv(&self, key: &str, value: &str) {
        if self.colored {
            println!("    {}: {}", key.dimmed(), value.bright_white());
        } else {
            println!("    {}: {}", key, value);
        }
    }

    /// Print a list item
    pub fn list_item(&self, item: &str) {
        if self.colored {
            println!("    {} {}", "•".blue(), item);
        } else {
            println!("    - {}", item);
        }
    }

    /// One line of the live event stream
    pub fn event(&self, event: &AgentEvent) {
        println!("{}", self.format_event(event));
    }

    /// Render an event as `[seq] stage kind: payload (confidence)`.
    pub fn format_event(&self, event: &AgentEvent) -> String {
        let prefix = format!("[{:>3}] {:<13}", event.sequence, event.stage.as_str());
        let confidence = event
            .confidence
            .map(|c| format!(" ({:.0}%)", c * 100.0))
            .unwrap_or_default();

        if !self.colored {
            return format!(
                "  {} {}: {}{}",
                prefix,
                event.kind.as_str(),
                event.payload,
                confidence
            );
        }

        let body = match event.kind {
            EventKind::Thinking => event.payload.dimmed().italic().to_string(),
            EventKind::Progress => event.payload.bright_cyan().bold().to_string(),
            EventKind::Result => event.payload.green().to_string(),
            EventKind::Error => event.payload.red().to_string(),
        };
        format!("  {} {}{}", prefix.dimmed(), body, confidence.dimmed())
    }

    /// Print a session status summary
    pub fn status(&self, status: &SessionStatusView) {
        self.kv("session", &status.session_id.to_string());
        self.kv("status", status.status.as_str());
        self.kv("confidence", &format!("{:.2}", status.confidence));
        if let Some(error) = &status.error {
            self.error(&format!("{}: {}", error.kind, error.error));
        }
    }

    /// Print a report: sections with bodies, then the citation list
    pub fn report(&self, report: &Report) {
        self.header(&report.query);
        self.kv("confidence", &format!("{:.2}", report.confidence));
        if report.degraded {
            self.warning("Some sections could not be synthesized and list raw findings");
        }

        for section in &report.sections {
            self.subheader(&section.heading);
            for line in section.body.lines() {
                println!("    {}", line);
            }
            let mut meta = format!(
                "confidence {:.2}, {} corroborated",
                section.confidence, section.corroborated
            );
            if !section.disputed.is_empty() {
                meta.push_str(&format!(", {} disputed", section.disputed.len()));
            }
            if self.colored {
                println!("    {}", meta.dimmed());
            } else {
                println!("    ({})", meta);
            }
        }

        if !report.citations.is_empty() {
            self.subheader("Sources");
            for citation in &report.citations {
                self.list_item(&format!(
                    "[{}] {} - {}",
                    citation.index, citation.title, citation.url
                ));
            }
        }
    }

    /// Print an empty line
    pub fn newline(&self) {
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Stage;
    use chrono::Utc;
    use uuid::Uuid;

    fn event(kind: EventKind, confidence: Option<f32>) -> AgentEvent {
        AgentEvent {
            session_id: Uuid::new_v4(),
            sequence: 7,
            stage: Stage::Research,
            kind,
            payload: "Sub-query 1 returned 3 findings".to_string(),
            confidence,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_output_new() {
        let output = Output::new();
        assert!(output.colored);
    }

    #[test]
    fn test_output_no_color() {
        let output = Output::no_color();
        assert!(!output.colored);
    }

    #[test]
    fn test_format_event_plain() {
        let output = Output::no_color();

        let line = output.format_event(&event(EventKind::Result, Some(0.8)));

        assert_eq!(
            line,
            "  [  7] research      result: Sub-query 1 returned 3 findings (80%)"
        );
    }

    #[test]
    fn test_format_event_colored_keeps_payload() {
        let output = Output::new();
        let line = output.format_event(&event(EventKind::Error, None));
        assert!(line.contains("Sub-query 1 returned 3 findings"));
    }

    #[test]
    fn test_output_methods_no_panic() {
        let output = Output::no_color();

        output.banner();
        output.success("test success");
        output.info("test info");
        output.warning("test warning");
        output.error("test error");
        output.header("Test Header");
        output.subheader("Test Subheader");
        output.kv("key", "value");
        output.list_item("item");
        output.event(&event(EventKind::Thinking, None));
        output.newline();
    }
}
