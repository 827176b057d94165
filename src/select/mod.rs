//! Target layer selection
//!
//! How the heights are chosen is independent of the splice itself: a
//! selector sees the scanned layers and hands back the heights the user
//! picked, as text. An empty list means nothing was selected.

use std::collections::BTreeSet;
use std::io::{self, BufRead, Write};

use serde::{Deserialize, Serialize};

use crate::layers::{find_layer, LayerMarker};

/// Selector trait - implemented for each way of picking layers
pub trait TargetSelector {
    /// Pick heights among `layers`
    fn select(&mut self, layers: &[LayerMarker]) -> io::Result<Vec<String>>;

    /// Short name for logs
    fn name(&self) -> &str;
}

/// Interactive prompt styles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptKind {
    /// Numbered checklist of every layer
    #[default]
    Multi,
    /// Type in a single height
    Single,
}

impl PromptKind {
    /// Prompt on the process terminal. Questions go to stderr so stdout stays
    /// free for gcode.
    pub fn terminal_selector(&self) -> Box<dyn TargetSelector> {
        let input = io::stdin().lock();
        let output = io::stderr();
        match self {
            PromptKind::Multi => Box::new(ChecklistPrompt::new(input, output)),
            PromptKind::Single => Box::new(SingleValuePrompt::new(input, output)),
        }
    }
}

/// Heights given up front, e.g. on the command line
pub struct ExplicitValues {
    values: Vec<String>,
}

impl ExplicitValues {
    pub fn new(values: Vec<String>) -> Self {
        Self { values }
    }
}

impl TargetSelector for ExplicitValues {
    fn select(&mut self, _layers: &[LayerMarker]) -> io::Result<Vec<String>> {
        // Validation happens in target resolution so a bad value aborts the run
        Ok(self.values.clone())
    }

    fn name(&self) -> &str {
        "arguments"
    }
}

/// Numbered list of all layers; the user answers with the numbers to change at
pub struct ChecklistPrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> ChecklistPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> TargetSelector for ChecklistPrompt<R, W> {
    fn select(&mut self, layers: &[LayerMarker]) -> io::Result<Vec<String>> {
        writeln!(self.output, "Change filament at?")?;
        for (n, layer) in layers.iter().enumerate() {
            writeln!(self.output, "  [{:>3}] Z={}", n + 1, layer.text)?;
        }
        write!(self.output, "Pick filament change layers (numbers, blank for none): ")?;
        self.output.flush()?;

        let mut answer = String::new();
        self.input.read_line(&mut answer)?;

        let mut picked = BTreeSet::new();
        for item in answer.split(|c: char| c == ',' || c.is_whitespace()) {
            if item.is_empty() {
                continue;
            }
            match item.parse::<usize>() {
                Ok(n) if (1..=layers.len()).contains(&n) => {
                    picked.insert(n - 1);
                }
                _ => writeln!(self.output, "ignoring invalid selection: {}", item)?,
            }
        }

        Ok(picked.into_iter().map(|n| layers[n].text.clone()).collect())
    }

    fn name(&self) -> &str {
        "checklist"
    }
}

/// Free-text entry of one height, re-asked until valid or aborted
pub struct SingleValuePrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> SingleValuePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn read_answer(&mut self, question: &str) -> io::Result<Option<String>> {
        write!(self.output, "{}", question)?;
        self.output.flush()?;
        let mut answer = String::new();
        if self.input.read_line(&mut answer)? == 0 {
            return Ok(None);
        }
        Ok(Some(answer.trim().to_string()))
    }
}

impl<R: BufRead, W: Write> TargetSelector for SingleValuePrompt<R, W> {
    fn select(&mut self, layers: &[LayerMarker]) -> io::Result<Vec<String>> {
        loop {
            let Some(value) = self.read_answer("Enter color change Z: ")? else {
                return Ok(Vec::new());
            };
            if find_layer(&value, layers).is_some() {
                return Ok(vec![value]);
            }

            writeln!(self.output, "Please enter a valid layer value")?;
            match self.read_answer("[r]etry or [a]bort? ")? {
                Some(choice) if choice.to_ascii_lowercase().starts_with('r') => continue,
                _ => return Ok(Vec::new()),
            }
        }
    }

    fn name(&self) -> &str {
        "single value"
    }
}
