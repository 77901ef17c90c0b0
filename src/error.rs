//! Top-level error type. Aggregates every module's `ErrorKind` behind one
//! `Error`/`ErrorKind` pair so callers outside the crate have a single type
//! to match on, while each module keeps its own focused error enum.

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
    #[fail(display = "{}", _0)]
    Config(crate::config::ErrorKind),

    #[fail(display = "{}", _0)]
    Credentials(crate::credentials::ErrorKind),

    #[fail(display = "{}", _0)]
    Pool(crate::pool::ErrorKind),

    #[fail(display = "{}", _0)]
    Worker(crate::worker::ErrorKind),

    #[fail(display = "{}", _0)]
    Scheduler(crate::scheduler::ErrorKind),

    #[fail(display = "the engine has not been initialized")]
    NotInitialized,

    #[fail(display = "the engine is shutting down")]
    ShuttingDown,
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

macro_rules! forward_error {
    ($module_error:ty, $module_kind:ty, $variant:ident) => {
        impl From<$module_error> for Error {
            fn from(err: $module_error) -> Error {
                Error::from(ErrorKind::$variant(err.kind().clone()))
            }
        }

        impl From<$module_kind> for Error {
            fn from(kind: $module_kind) -> Error {
                Error::from(ErrorKind::$variant(kind))
            }
        }
    };
}

forward_error!(crate::config::Error, crate::config::ErrorKind, Config);
forward_error!(
    crate::credentials::Error,
    crate::credentials::ErrorKind,
    Credentials
);
forward_error!(crate::pool::Error, crate::pool::ErrorKind, Pool);
forward_error!(crate::worker::Error, crate::worker::ErrorKind, Worker);
forward_error!(
    crate::scheduler::Error,
    crate::scheduler::ErrorKind,
    Scheduler
);
