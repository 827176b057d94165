use thiserror::Error;

/// Fatal conditions of a filament change run. None of them touch the file.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChangeError {
    #[error(
        "no layers were detected in the gcode; set the slicer's \"Before layer change G-code\" to \"; Layer Z=[layer_z]\""
    )]
    NoLayersDetected,

    #[error("no valid layer(s) have been selected, gcode is unchanged")]
    NoLayersSelected,

    #[error("invalid layer value: {value} matches no layer in the gcode")]
    InvalidLayerValue { value: String },

    #[error("layer Z={z} at line {line} has no extrusion move before the end of the file")]
    MalformedLayerBlock { z: String, line: usize },
}

pub type Result<T> = std::result::Result<T, ChangeError>;
