//! Output formatting abstraction for text vs JSON rendering
//!
//! Every report flows through [`OutputWriter`], so command handlers never
//! branch on the output format themselves.

use std::io::Write;

use serde::Serialize;

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Writes reports as text or pretty JSON.
pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    /// # Examples
    ///
    /// ```no_run
    /// use watchpost_cli::cli::OutputFormat;
    /// use watchpost_cli::output::OutputWriter;
    ///
    /// let writer = OutputWriter::new(OutputFormat::Json);
    /// ```
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Render a report to stdout.
    pub fn render<T: Render + Serialize>(&self, payload: &T) -> Result<(), CliError> {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        self.render_to(&mut handle, payload)
    }

    /// Render a report into any writer.
    pub fn render_to<T: Render + Serialize>(
        &self,
        w: &mut dyn Write,
        payload: &T,
    ) -> Result<(), CliError> {
        match self.format {
            OutputFormat::Text => payload.render_text(w)?,
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut *w, payload)?;
                writeln!(w)?;
            }
        }
        Ok(())
    }
}

/// Human-readable text rendering, implemented by every report next to `Serialize`.
pub trait Render {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()>;
}

/// Colorize a severity label for text output.
pub fn severity_label(severity: &str) -> colored::ColoredString {
    use colored::Colorize;

    match severity {
        "critical" => severity.red().bold(),
        "high" => severity.red(),
        "medium" => severity.yellow(),
        "low" => severity.cyan(),
        _ => severity.normal(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct TestPayload {
        field1: String,
        field2: u32,
    }

    impl Render for TestPayload {
        fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
            writeln!(w, "Field1: {}", self.field1)?;
            writeln!(w, "Field2: {}", self.field2)
        }
    }

    fn payload() -> TestPayload {
        TestPayload {
            field1: "test value".to_owned(),
            field2: 42,
        }
    }

    #[test]
    fn test_render_to_text() {
        let writer = OutputWriter::new(OutputFormat::Text);
        let mut buffer = Vec::new();
        writer
            .render_to(&mut buffer, &payload())
            .expect("text rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("Field1: test value"));
        assert!(output.contains("Field2: 42"));
    }

    #[test]
    fn test_render_to_json_is_pretty_and_parseable() {
        let writer = OutputWriter::new(OutputFormat::Json);
        let mut buffer = Vec::new();
        writer
            .render_to(&mut buffer, &payload())
            .expect("json rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("\n  "), "pretty JSON should be indented");
        let parsed: serde_json::Value = serde_json::from_str(&output).expect("should parse");
        assert_eq!(parsed["field1"], "test value");
        assert_eq!(parsed["field2"], 42);
    }

    #[test]
    fn test_severity_label_keeps_text() {
        colored::control::set_override(false);
        assert_eq!(severity_label("high").to_string(), "high");
        assert_eq!(severity_label("unknown").to_string(), "unknown");
    }
}
