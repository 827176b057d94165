//! Line predicates for slicer gcode
//!
//! Each predicate looks at a single line (terminator included or not) and
//! holds no state, so the scanner and the splicer can share them.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::lexer;

/// `; Layer Z=2.15` with anything after the value separated by whitespace
static LAYER_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*;\s*Layer\s+Z\s*=\s*(\d+(?:\.\d*)?|\.\d+)(?:\s|$)")
        .expect("layer marker pattern is valid")
});

/// A linear move followed anywhere later by an `E0...` field
static LOOSE_EXTRUSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"G0?1\s.*E0").expect("extrusion pattern is valid"));

/// How the splicer recognises the first extruding move after a marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtrusionMatch {
    /// Substring match for `G1 ... E0`, comments included
    #[default]
    Loose,
    /// Tokenised match: leading `G1` word with a non-negative `E` word
    Strict,
}

/// A matched layer marker line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerMatch<'a> {
    /// The Z value as written in the file
    pub text: &'a str,
    pub z: f64,
}

pub fn layer_marker(line: &str) -> Option<MarkerMatch<'_>> {
    let caps = LAYER_MARKER.captures(line)?;
    let text = caps.get(1)?.as_str();
    let z = text.parse::<f64>().ok()?;
    Some(MarkerMatch { text, z })
}

/// Whether `line` is the move where material starts flowing again
pub fn is_forward_extrusion(line: &str, mode: ExtrusionMatch) -> bool {
    match mode {
        ExtrusionMatch::Loose => LOOSE_EXTRUSION.is_match(line),
        ExtrusionMatch::Strict => {
            let words = lexer::words(line);
            match words.split_first() {
                Some((first, rest)) if first.is_linear_move() => rest
                    .iter()
                    .any(|w| w.is('E') && w.value.is_some_and(|e| e >= 0.0)),
                _ => false,
            }
        }
    }
}

/// A move whose only operative field is the extrusion amount: the `E` word
/// directly follows `G1`, so the nozzle does not travel while extruding.
pub fn is_extrusion_only(line: &str) -> bool {
    let words = lexer::words(line);
    match words.as_slice() {
        [first, second, ..] => first.is_linear_move() && second.is('E'),
        _ => false,
    }
}
