use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompositeError {
    #[error("Failed to parse PDF: {0}")]
    InvalidDocument(String),

    #[error("PDF contains no pages")]
    EmptyDocument,

    #[error("PDF has too many pages ({count}, max {max})")]
    TooManyPages { count: u32, max: u32 },

    #[error("Unsupported replacement image: {0}")]
    UnsupportedMediaType(String),

    #[error("Invalid color '{0}': expected #RRGGBB")]
    InvalidColor(String),

    #[error("Invalid band geometry: {0}")]
    InvalidGeometry(String),

    #[error("No usable replacement: provide an image, a background color or text")]
    MissingReplacement,

    #[error("PDF operation failed: {0}")]
    OperationError(String),
}

impl CompositeError {
    /// Stable machine-readable code, used by the HTTP layer.
    pub fn code(&self) -> &'static str {
        match self {
            CompositeError::InvalidDocument(_) => "INVALID_DOCUMENT",
            CompositeError::EmptyDocument => "EMPTY_DOCUMENT",
            CompositeError::TooManyPages { .. } => "TOO_MANY_PAGES",
            CompositeError::UnsupportedMediaType(_) => "UNSUPPORTED_MEDIA_TYPE",
            CompositeError::InvalidColor(_) => "INVALID_COLOR",
            CompositeError::InvalidGeometry(_) => "INVALID_GEOMETRY",
            CompositeError::MissingReplacement => "MISSING_REPLACEMENT",
            CompositeError::OperationError(_) => "OPERATION_ERROR",
        }
    }
}

impl From<lopdf::Error> for CompositeError {
    fn from(err: lopdf::Error) -> Self {
        CompositeError::OperationError(err.to_string())
    }
}
