//! Filament change splicing
//!
//! Slic3r output around a layer change looks like this:
//!
//! ```text
//! ; Layer Z=2.15 N=20
//! G1 F5760
//! G1 X80.515 Y98.846 E-0.76000
//! G1 E-0.04000 F2100.00000
//! G1 Z2.200 F7200.000
//! G1 X102.308 Y109.134 F7200.000 ; Move to first perimeter point
//! G1 Z2.150 F7200.000 ; restore layer Z
//! G1 E0.80000 F2100.00000 ; Unretract
//! ```
//!
//! `M600` goes right before the unretract: the retraction, lift and travel
//! have run, and nothing has been extruded on the new layer yet. The printer
//! primes the nozzle itself after the change, so an unretract that only
//! extrudes is commented out instead of piling a blob on top of the prime.
//!
//! A marker met while still looking for the previous block's extrusion is
//! copied through as-is, even when its height is targeted.

use tracing::info;

use crate::error::{ChangeError, Result};
use crate::gcode_file::LineEnding;
use crate::layers::TargetSet;
use crate::pattern::{self, ExtrusionMatch};

pub const CHANGE_DIRECTIVE: &str = "M600 ; Filament change gcode";
pub const MARKER_ANNOTATION: &str = "; Change Filament at this layer ";
pub const BLOB_ANNOTATION: &str = "; Prevent blob - Ignore extrude gcode : ";

/// Where a filament change was inserted
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSite {
    pub z: f64,
    /// Zero-based index of the marker in the input
    pub marker_line: usize,
    /// Zero-based index of the directive in the output
    pub directive_line: usize,
    /// The extrusion line after the directive was commented out
    pub suppressed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpliceOutput {
    pub lines: Vec<String>,
    pub changes: Vec<ChangeSite>,
}

impl std::fmt::Display for SpliceOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Lines carry their own terminators
        for line in &self.lines {
            f.write_str(line)?;
        }
        Ok(())
    }
}

pub struct Splicer {
    matching: ExtrusionMatch,
    line_ending: LineEnding,
}

impl Default for Splicer {
    fn default() -> Self {
        Self {
            matching: ExtrusionMatch::Loose,
            line_ending: LineEnding::Lf,
        }
    }
}

impl Splicer {
    pub fn new(matching: ExtrusionMatch) -> Self {
        Self {
            matching,
            ..Self::default()
        }
    }

    /// Terminator for the inserted directive line
    pub fn with_line_ending(mut self, line_ending: LineEnding) -> Self {
        self.line_ending = line_ending;
        self
    }

    /// Single forward pass over `lines`, inserting a change at each marker
    /// whose height is in `targets`. Fails without producing output if a
    /// targeted layer never extrudes before the end of the file.
    pub fn splice<S: AsRef<str>>(&self, lines: &[S], targets: &TargetSet) -> Result<SpliceOutput> {
        let mut out = Vec::with_capacity(lines.len() + 2 * targets.len());
        let mut changes = Vec::new();
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i].as_ref();
            let marker = match pattern::layer_marker(line) {
                Some(m) if targets.contains(m.z) => m,
                _ => {
                    out.push(line.to_string());
                    i += 1;
                    continue;
                }
            };

            out.push(format!("{MARKER_ANNOTATION}{line}"));

            // Travel, lift and retract moves stay in front of the change
            let mut j = i + 1;
            let qualifying = loop {
                let next = lines
                    .get(j)
                    .map(|l| l.as_ref())
                    .ok_or_else(|| ChangeError::MalformedLayerBlock {
                        z: marker.text.to_string(),
                        line: i + 1,
                    })?;
                if pattern::is_forward_extrusion(next, self.matching) {
                    break next;
                }
                out.push(next.to_string());
                j += 1;
            };

            let directive_line = out.len();
            out.push(format!("{CHANGE_DIRECTIVE}{}", self.line_ending.as_str()));

            let suppressed = pattern::is_extrusion_only(qualifying);
            if suppressed {
                out.push(format!("{BLOB_ANNOTATION}{qualifying}"));
            } else {
                out.push(qualifying.to_string());
            }

            changes.push(ChangeSite {
                z: marker.z,
                marker_line: i,
                directive_line,
                suppressed,
            });
            i = j + 1;
        }

        info!(changes = changes.len(), "spliced filament changes");
        Ok(SpliceOutput { lines: out, changes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{resolve_targets, scan_layers};
    use pretty_assertions::assert_eq;

    const SLIC3R: &str = "\
G28 ; home
; Layer Z=0.2 N=1
G1 Z0.200 F7200.000
G1 X10 Y10 F7200.000
G1 E0.80000 F2100.00000 ; Unretract
G1 X20 Y10 E0.52000
; Layer Z=2.15 N=20
G1 F5760
G1 X80.515 Y98.846 E-0.76000
G1 E-0.04000 F2100.00000
G1 Z2.200 F7200.000
G1 X102.308 Y109.134 F7200.000 ; Move to first perimeter point
G1 Z2.150 F7200.000 ; restore layer Z
G1 E0.80000 F2100.00000 ; Unretract
G1 X103 Y109 E0.05000
M84
";

    fn lines(source: &str) -> Vec<&str> {
        source.split_inclusive('\n').collect()
    }

    fn splice(source: &str, requested: &[&str]) -> Result<SpliceOutput> {
        let lines = lines(source);
        let layers = scan_layers(&lines)?;
        let targets = resolve_targets(requested, &layers)?;
        Splicer::default().splice(&lines, &targets)
    }

    #[test]
    fn test_short_layer_block() {
        let input = "; Layer Z=2.15 N=20\nG1 F5760\nG1 X80 Y90 E-0.5\nG1 E0.8 F2100\n";
        let output = splice(input, &["2.15"]).unwrap();

        assert_eq!(output.to_string(), "\
; Change Filament at this layer ; Layer Z=2.15 N=20
G1 F5760
G1 X80 Y90 E-0.5
M600 ; Filament change gcode
; Prevent blob - Ignore extrude gcode : G1 E0.8 F2100
");
        assert_eq!(output.changes, vec![ChangeSite {
            z: 2.15,
            marker_line: 0,
            directive_line: 3,
            suppressed: true,
        }]);
    }

    #[test]
    fn test_full_slic3r_layer_change() {
        let output = splice(SLIC3R, &["2.15"]).unwrap();
        let expected = SLIC3R
            .replace("; Layer Z=2.15", "; Change Filament at this layer ; Layer Z=2.15")
            .replace(
                "G1 Z2.150 F7200.000 ; restore layer Z\nG1 E0.80000 F2100.00000 ; Unretract\n",
                "G1 Z2.150 F7200.000 ; restore layer Z\nM600 ; Filament change gcode\n; Prevent blob - Ignore extrude gcode : G1 E0.80000 F2100.00000 ; Unretract\n",
            );

        assert_eq!(output.to_string(), expected);
        assert_eq!(output.changes.len(), 1);
        assert_eq!(output.lines.len(), lines(SLIC3R).len() + 1);
    }

    #[test]
    fn test_directive_placement() {
        let input = lines(SLIC3R);
        let output = splice(SLIC3R, &["2.15"]).unwrap();
        let site = &output.changes[0];

        // Everything between the marker and the directive is copied verbatim
        let between = &output.lines[site.marker_line + 1..site.directive_line];
        assert_eq!(between, &input[site.marker_line + 1..site.directive_line]);
        assert!(between
            .iter()
            .all(|l| !pattern::is_forward_extrusion(l, ExtrusionMatch::Loose)));
        assert!(output.lines[site.marker_line].starts_with(MARKER_ANNOTATION));
    }

    #[test]
    fn test_multiple_targets() {
        let output = splice(SLIC3R, &["0.2", "2.15"]).unwrap();
        let directives = output
            .lines
            .iter()
            .filter(|l| l.starts_with(CHANGE_DIRECTIVE))
            .count();

        assert_eq!(directives, 2);
        assert_eq!(output.changes[0].directive_line, 4);
        assert!(output.changes.iter().all(|c| c.suppressed));
    }

    #[test]
    fn test_moving_extrusion_passes_through() {
        let input = "; Layer Z=0.4\nG1 Z0.4\nG1 X5 Y5 E0.3\nM84\n";
        let output = splice(input, &["0.4"]).unwrap();

        assert_eq!(output.to_string(), "\
; Change Filament at this layer ; Layer Z=0.4
G1 Z0.4
M600 ; Filament change gcode
G1 X5 Y5 E0.3
M84
");
        assert!(!output.changes[0].suppressed);
    }

    #[test]
    fn test_untargeted_file_unchanged() {
        let lines = lines(SLIC3R);
        let output = Splicer::default().splice(&lines, &TargetSet::default()).unwrap();
        assert_eq!(output.to_string(), SLIC3R);
        assert!(output.changes.is_empty());
    }

    #[test]
    fn test_crlf_preserved() {
        let input = "; Layer Z=0.2\r\nG1 Z0.2\r\nG1 E0.8 F2100\r\n";
        let lines = lines(input);
        let layers = scan_layers(&lines).unwrap();
        let targets = resolve_targets(&["0.2"], &layers).unwrap();
        let output = Splicer::default()
            .with_line_ending(LineEnding::CrLf)
            .splice(&lines, &targets)
            .unwrap();

        assert_eq!(output.to_string(), "\
; Change Filament at this layer ; Layer Z=0.2\r
G1 Z0.2\r
M600 ; Filament change gcode\r
; Prevent blob - Ignore extrude gcode : G1 E0.8 F2100\r
");
    }

    #[test]
    fn test_truncated_layer_block() {
        let input = "G28\n; Layer Z=0.2\nG1 Z0.2\nG1 X1 Y1 E-0.5\n";
        let err = splice(input, &["0.2"]).unwrap_err();
        assert_eq!(err, ChangeError::MalformedLayerBlock { z: "0.2".to_string(), line: 2 });
    }

    #[test]
    fn test_marker_on_last_line() {
        let err = splice("G28\n; Layer Z=0.2", &["0.2"]).unwrap_err();
        assert!(matches!(err, ChangeError::MalformedLayerBlock { line: 2, .. }));
    }

    #[test]
    fn test_strict_skips_commented_extrusion() {
        let input = "; Layer Z=0.2\n; G1 E0.8\nG1 Z0.2\nG1 E0.8 F2100\n";
        let lines = lines(input);
        let layers = scan_layers(&lines).unwrap();
        let targets = resolve_targets(&["0.2"], &layers).unwrap();

        let loose = Splicer::new(ExtrusionMatch::Loose).splice(&lines, &targets).unwrap();
        assert_eq!(loose.changes[0].directive_line, 1);

        let strict = Splicer::new(ExtrusionMatch::Strict).splice(&lines, &targets).unwrap();
        assert_eq!(strict.changes[0].directive_line, 3);
        assert!(strict.changes[0].suppressed);
    }

    #[test]
    fn test_marker_inside_open_block() {
        // The 0.4 marker turns up before the 0.2 layer has extruded, so it is
        // copied as part of the 0.2 block and gets no change of its own
        let input = "; Layer Z=0.2\nG1 Z0.2\n; Layer Z=0.4\nG1 Z0.4\nG1 E0.8 F2100\n";
        let output = splice(input, &["0.2", "0.4"]).unwrap();

        assert_eq!(output.to_string(), "\
; Change Filament at this layer ; Layer Z=0.2
G1 Z0.2
; Layer Z=0.4
G1 Z0.4
M600 ; Filament change gcode
; Prevent blob - Ignore extrude gcode : G1 E0.8 F2100
");
        assert_eq!(output.changes, vec![ChangeSite {
            z: 0.2,
            marker_line: 0,
            directive_line: 4,
            suppressed: true,
        }]);
    }
}
