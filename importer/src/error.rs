use std::path::PathBuf;

/// Failures the importer recognizes by name
///
/// Apart from [ImportError::SourceDirectory], each of these aborts only the file being imported.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("no GPS location found in {}", .0.display())]
    MissingLocation(PathBuf),

    #[error("no time zone found at {lat}, {lng}")]
    NoTimezone { lat: f64, lng: f64 },

    #[error("unable to convert {} without the platform converter", .0.display())]
    ConverterUnavailable(PathBuf),

    #[error("unsupported file type: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("{0} already exists in the originals folder with different content")]
    ArchiveConflict(String),

    #[error("source directory {} does not exist or is not a directory", .0.display())]
    SourceDirectory(PathBuf),

    #[error("error running {tool}: {message}")]
    NativeTool { tool: &'static str, message: String },
}
