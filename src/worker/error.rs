//! Worker-internal error classification. Every variant's `Display` is the
//! exact `errorMessage` text recorded on the `UploadRecord`; nothing here
//! crosses the Worker's top-level boundary as an exception — `process_task`
//! catches everything and translates it into a status transition.

use failure::{Backtrace, Context, Fail};
use std::{fmt, result};

pub type Result<T> = result::Result<T, Error>;

#[derive(Debug)]
pub struct Error {
    ctx: Context<ErrorKind>,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.ctx.get_context()
    }
}

impl Fail for Error {
    fn cause(&self) -> Option<&dyn Fail> {
        self.ctx.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.ctx.backtrace()
    }
}

impl Clone for Error {
    fn clone(&self) -> Self {
        self.kind().clone().into()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.ctx.fmt(f)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Fail)]
pub enum ErrorKind {
    #[fail(display = "Invalid parameters")]
    InvalidArgument,

    #[fail(display = "AWS SDK not initialized")]
    NotInitialized,

    #[fail(display = "Local file does not exist")]
    NotFound,

    #[fail(display = "Cannot read file size")]
    CannotReadFileSize,

    #[fail(display = "Cannot open file for reading: {}", path)]
    CannotOpenFile { path: String },

    #[fail(display = "{}", _0)]
    CredentialError(crate::credentials::ErrorKind),

    #[fail(display = "S3 upload failed (attempt {}): {}", attempt, provider_message)]
    RemoteRejection {
        attempt: u32,
        provider_message: String,
    },

    #[fail(display = "Upload cancelled")]
    Cancelled,

    #[fail(display = "Upload failed with exception: {}", what)]
    Internal { what: String },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error::from(Context::new(kind))
    }
}

impl From<Context<ErrorKind>> for Error {
    fn from(ctx: Context<ErrorKind>) -> Error {
        Error { ctx }
    }
}

impl From<crate::pool::Error> for Error {
    fn from(err: crate::pool::Error) -> Error {
        match err.kind() {
            crate::pool::ErrorKind::Credentials(kind) => {
                Error::from(ErrorKind::CredentialError(kind.clone()))
            }
            crate::pool::ErrorKind::ClientBuildFailed { reason } => {
                Error::from(ErrorKind::Internal {
                    what: reason.clone(),
                })
            }
        }
    }
}
