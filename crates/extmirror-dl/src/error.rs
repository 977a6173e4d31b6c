use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum DownloadError {
    #[error("Invalid URL: {url}")]
    #[diagnostic(code(extmirror_dl::invalid_url))]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error(transparent)]
    #[diagnostic(
        code(extmirror_dl::network),
        help("Check your internet connection or try again later")
    )]
    Network(#[from] Box<ureq::Error>),

    #[error("HTTP {status}: {url}")]
    #[diagnostic(code(extmirror_dl::http_error))]
    HttpError { status: u16, url: String },

    #[error("I/O error: {0}")]
    #[diagnostic(code(extmirror_dl::io))]
    Io(#[from] std::io::Error),

    #[error("Invalid response from {url}: {reason}")]
    #[diagnostic(code(extmirror_dl::invalid_response))]
    InvalidResponse { url: String, reason: String },

    #[error("Malformed JSON from {url}")]
    #[diagnostic(code(extmirror_dl::malformed_json))]
    MalformedJson {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid header: {0}")]
    #[diagnostic(
        code(extmirror_dl::invalid_header),
        help("Headers are given as `Name: value`")
    )]
    InvalidHeader(String),

    #[error("Invalid proxy: {proxy}")]
    #[diagnostic(code(extmirror_dl::invalid_proxy))]
    InvalidProxy {
        proxy: String,
        #[source]
        source: Box<ureq::Error>,
    },
}

impl DownloadError {
    /// Whether another attempt at the same request may succeed.
    ///
    /// Client errors (4xx) and bodies that were read in full but do not
    /// decode are permanent. Server errors, transport failures and bodies
    /// that could not be read are not.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::HttpError { status, .. } => !(400..500).contains(status),
            Self::Network(_) | Self::Io(_) | Self::InvalidResponse { .. } => true,
            Self::InvalidUrl { .. }
            | Self::InvalidHeader(_)
            | Self::InvalidProxy { .. }
            | Self::MalformedJson { .. } => false,
        }
    }
}

impl From<ureq::Error> for DownloadError {
    fn from(e: ureq::Error) -> Self {
        Self::Network(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;
