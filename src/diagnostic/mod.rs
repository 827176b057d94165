//! Error reporting against the gcode source

use std::io::{self, Write};
use std::ops::Range;

use ariadne::{Config, Label, Report, ReportKind, Source};

use crate::error::ChangeError;

/// Character span of a 1-based line, terminator excluded
pub fn line_span(source: &str, line: usize) -> Option<Range<usize>> {
    let mut start = 0;
    for (n, text) in source.split_inclusive('\n').enumerate() {
        let len = text.trim_end_matches(['\r', '\n']).chars().count();
        if n + 1 == line {
            return Some(start..start + len);
        }
        start += text.chars().count();
    }
    None
}

fn hint(error: &ChangeError) -> Option<&'static str> {
    match error {
        ChangeError::NoLayersDetected => {
            Some("the file is unchanged; re-export the gcode after fixing the slicer setup")
        }
        ChangeError::InvalidLayerValue { .. } => {
            Some("run with --list to see the layer heights in this file")
        }
        _ => None,
    }
}

/// Write a human-readable report of `error` to `out`. Errors tied to a line
/// are drawn against `source`.
pub fn write_report<W: Write>(error: &ChangeError, source: &str, color: bool, mut out: W) -> io::Result<()> {
    if let ChangeError::MalformedLayerBlock { z, line } = error {
        if let Some(span) = line_span(source, *line) {
            return Report::<Range<usize>>::build(ReportKind::Error, (), span.start)
                .with_config(Config::default().with_color(color))
                .with_message(error.to_string())
                .with_label(Label::new(span).with_message(format!("layer Z={} starts here", z)))
                .with_note("a targeted layer needs a `G1 ... E0...` move after its marker; the file is unchanged")
                .finish()
                .write(Source::from(source), out);
        }
    }

    writeln!(out, "error: {}", error)?;
    if let Some(hint) = hint(error) {
        writeln!(out, "  = note: {}", hint)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(error: &ChangeError, source: &str) -> String {
        let mut out = Vec::new();
        write_report(error, source, false, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_line_span() {
        let source = "G28\r\n; Layer Z=0.2\nG1 Z0.2";
        assert_eq!(line_span(source, 1), Some(0..3));
        assert_eq!(line_span(source, 2), Some(5..18));
        assert_eq!(line_span(source, 3), Some(19..26));
        assert_eq!(line_span(source, 4), None);
    }

    #[test]
    fn test_malformed_block_report() {
        let source = "G28\n; Layer Z=0.2\nG1 Z0.2\n";
        let error = ChangeError::MalformedLayerBlock { z: "0.2".to_string(), line: 2 };
        let report = render(&error, source);

        assert!(report.contains("layer Z=0.2 at line 2"));
        assert!(report.contains("layer Z=0.2 starts here"));
        assert!(report.contains("; Layer Z=0.2"));
    }

    #[test]
    fn test_plain_report() {
        let error = ChangeError::InvalidLayerValue { value: "5.00".to_string() };
        let report = render(&error, "");

        assert!(report.starts_with("error: invalid layer value: 5.00"));
        assert!(report.contains("--list"));
    }

    #[test]
    fn test_no_layers_report() {
        let report = render(&ChangeError::NoLayersDetected, "G28\n");
        assert!(report.contains("; Layer Z=[layer_z]"));
    }
}
