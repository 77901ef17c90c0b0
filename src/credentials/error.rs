//! Errors raised by a `CredentialsSource` implementation.

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

    pub fn fetch_failed<S: Into<String>, R: Into<String>>(tenant_id: S, reason: R) -> Error {
        ErrorKind::FetchFailed {
            tenant_id: tenant_id.into(),
            reason: reason.into(),
        }
        .into()
    }

    pub fn not_configured() -> Error {
        ErrorKind::NotConfigured.into()
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
    #[fail(display = "failed to fetch credentials for tenant {}: {}", tenant_id, reason)]
    FetchFailed { tenant_id: String, reason: String },

    #[fail(display = "credentials source is not configured")]
    NotConfigured,
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
