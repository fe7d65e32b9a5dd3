use std::{fmt, path::PathBuf};

#[derive(Debug)]
pub struct InvalidRange {
    pub(crate) min: f64,
    pub(crate) max: f64,
    pub(crate) value: f64,
    pub(crate) name: &'static str,
}

impl fmt::Display for InvalidRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "parameter '{}' - value '{}' is outside the range of {}-{}",
            self.name, self.value, self.min, self.max
        )
    }
}

#[derive(Debug)]
pub enum Error {
    /// An error in the image library occurred, eg failed to load/save
    Image(image::ImageError),
    /// Io is notoriously error free with no problems, but we cover it just in case!
    Io(std::io::Error),
    /// An image source could not be fetched or read from anywhere
    Fetch(String),
    /// Reading or writing a specific file failed
    Resource {
        /// What was being done, eg "write the result"
        stage: &'static str,
        path: PathBuf,
        source: Box<Error>,
    },
    /// A required input image was never added to the session
    MissingInput(&'static str),
    /// An input parameter had an invalid range specified
    InvalidRange(InvalidRange),
    /// The content/style layer selection doesn't fit the network
    InvalidLayers(String),
    /// The feature extractor was handed a tensor that isn't a 3 channel image
    InvalidShape {
        expected: usize,
        actual: Vec<usize>,
    },
    /// The total loss became NaN or infinite
    Diverged { iteration: usize, loss: f32 },
    /// The pretrained network weights could not be loaded
    Weights(String),
    /// The user specified an image format we don't support as the output
    UnsupportedOutputFormat(String),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Image(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Resource { source, .. } => Some(&**source),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image(ie) => write!(f, "{}", ie),
            Self::Io(io) => write!(f, "{}", io),
            Self::Fetch(msg) => write!(f, "failed to load image: {}", msg),
            Self::Resource {
                stage,
                path,
                source,
            } => write!(f, "failed to {} '{}': {}", stage, path.display(), source),
            Self::MissingInput(which) => write!(f, "no {} image was provided", which),
            Self::InvalidRange(ir) => write!(f, "{}", ir),
            Self::InvalidLayers(msg) => write!(f, "invalid layer selection: {}", msg),
            Self::InvalidShape { expected, actual } => write!(
                f,
                "invalid input shape {:?}, expected [batch, {}, height, width]",
                actual, expected
            ),
            Self::Diverged { iteration, loss } => write!(
                f,
                "optimization diverged at iteration {} (loss = {})",
                iteration, loss
            ),
            Self::Weights(msg) => write!(f, "failed to load network weights: {}", msg),
            Self::UnsupportedOutputFormat(fmt) => {
                write!(f, "the output format '{}' is not supported", fmt)
            }
        }
    }
}

impl Error {
    pub(crate) fn resource<E: Into<Error>>(
        stage: &'static str,
        path: &std::path::Path,
        err: E,
    ) -> Self {
        Self::Resource {
            stage,
            path: path.to_path_buf(),
            source: Box::new(err.into()),
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(ie: image::ImageError) -> Self {
        Self::Image(ie)
    }
}

impl From<std::io::Error> for Error {
    fn from(io: std::io::Error) -> Self {
        Self::Io(io)
    }
}
