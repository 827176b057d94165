//! Whole-file gcode I/O
//!
//! The file is read in one go and only replaced once the new contents are
//! complete. Replacement goes through a temporary file in the same directory
//! so readers see either the old or the new gcode, never a partial write.
//!
//! Slicers on Windows may leave codepage bytes in comments (filament or
//! profile names). A file that is not valid UTF-8 is held with one char per
//! byte and written back the same way, so untouched lines keep their exact
//! bytes.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{info, warn};

/// Line terminator style of a gcode file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    /// Style of the first terminated line, `\n` when there is none
    pub fn detect(source: &str) -> Self {
        match source.find('\n') {
            Some(pos) if source[..pos].ends_with('\r') => LineEnding::CrLf,
            _ => LineEnding::Lf,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

/// How the bytes of a gcode file map to text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    #[default]
    Utf8,
    /// One char per byte (U+0000..=U+00FF)
    Latin1,
}

impl TextEncoding {
    pub fn decode(bytes: Vec<u8>) -> (String, Self) {
        match String::from_utf8(bytes) {
            Ok(text) => (text, TextEncoding::Utf8),
            Err(e) => {
                let text = e.into_bytes().into_iter().map(char::from).collect();
                (text, TextEncoding::Latin1)
            }
        }
    }

    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            // Only ASCII is ever added to a decoded file
            TextEncoding::Latin1 => text.chars().map(|c| u8::try_from(c).unwrap_or(b'?')).collect(),
        }
    }
}

/// A gcode file held in memory
#[derive(Debug, Clone)]
pub struct GcodeFile {
    pub path: PathBuf,
    pub source: String,
    pub encoding: TextEncoding,
}

impl GcodeFile {
    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (source, encoding) = TextEncoding::decode(fs::read(&path)?);
        if encoding != TextEncoding::Utf8 {
            warn!(path = %path.display(), "gcode is not valid UTF-8, keeping raw bytes");
        }
        info!(path = %path.display(), bytes = source.len(), "loaded gcode");
        Ok(Self { path, source, encoding })
    }

    /// `contents` as bytes in the file's own encoding
    pub fn encode(&self, contents: &str) -> Vec<u8> {
        self.encoding.encode(contents)
    }

    /// Lines with their terminators; concatenating them gives back `source`
    pub fn lines(&self) -> Vec<&str> {
        self.source.split_inclusive('\n').collect()
    }

    pub fn line_ending(&self) -> LineEnding {
        LineEnding::detect(&self.source)
    }

    /// Replace the file on disk with `contents`
    pub fn overwrite(&self, contents: &str) -> io::Result<()> {
        let bytes = self.encode(contents);
        write_atomic(&self.path, &bytes)?;
        info!(path = %self.path.display(), bytes = bytes.len(), "wrote gcode");
        Ok(())
    }
}

/// Write `contents` to `path` via a sibling temporary file
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;

    // Keep the original file's permissions
    if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(tmp.path(), meta.permissions())?;
    }

    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
