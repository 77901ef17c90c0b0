//! Errors raised building or refreshing a per-tenant object-store client.

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

    pub fn client_build_failed<S: Into<String>>(reason: S) -> Error {
        ErrorKind::ClientBuildFailed {
            reason: reason.into(),
        }
        .into()
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
    #[fail(display = "{}", _0)]
    Credentials(crate::credentials::ErrorKind),

    #[fail(display = "failed to build object-store client: {}", reason)]
    ClientBuildFailed { reason: String },
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

impl From<crate::credentials::Error> for Error {
    fn from(err: crate::credentials::Error) -> Error {
        Error::from(ErrorKind::Credentials(err.kind().clone()))
    }
}
