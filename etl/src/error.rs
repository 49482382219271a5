use std::{fmt, process::ExitCode};

use error_stack::{report, Context, Report, Result, ResultExt};

/// Pipeline error.
///
/// Component errors (client, fetcher, store, schema) are converted into one of these kinds
/// before they reach the run loop. The kind decides whether the failing ledger is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtlError {
    /// Configuration error. Should not retry.
    Configuration,
    /// Temporary error. Should retry the same ledger.
    Temporary,
    /// Fatal error. Should not retry.
    Fatal,
}

impl error_stack::Context for EtlError {}

impl fmt::Display for EtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EtlError::Configuration => f.write_str("etl error: configuration"),
            EtlError::Temporary => f.write_str("etl error: temporary"),
            EtlError::Fatal => f.write_str("etl error: fatal"),
        }
    }
}

pub trait ReportExt {
    fn to_exit_code(&self) -> ExitCode;
}

impl<T> ReportExt for Result<T, EtlError> {
    fn to_exit_code(&self) -> ExitCode {
        match self {
            Ok(_) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("{:?}", err);
                let status = err
                    .downcast_ref::<EtlError>()
                    .map(EtlError::exit_status)
                    .unwrap_or(1);
                ExitCode::from(status)
            }
        }
    }
}

impl EtlError {
    /// Exit status based on sysexits.h
    pub fn exit_status(&self) -> u8 {
        match self {
            EtlError::Configuration => 78,
            EtlError::Temporary => 75,
            EtlError::Fatal => 1,
        }
    }

    pub fn configuration(reason: &str) -> Report<EtlError> {
        report!(EtlError::Configuration).attach_printable(reason.to_string())
    }

    pub fn temporary(reason: &str) -> Report<EtlError> {
        report!(EtlError::Temporary).attach_printable(reason.to_string())
    }

    pub fn fatal(reason: &str) -> Report<EtlError> {
        report!(EtlError::Fatal).attach_printable(reason.to_string())
    }
}

pub trait EtlErrorResultExt {
    type Ok;

    fn configuration(self, reason: &str) -> Result<Self::Ok, EtlError>;
    fn temporary(self, reason: &str) -> Result<Self::Ok, EtlError>;
    fn fatal(self, reason: &str) -> Result<Self::Ok, EtlError>;
}

impl<T, C> EtlErrorResultExt for core::result::Result<T, C>
where
    C: Context,
{
    type Ok = T;

    fn configuration(self, reason: &str) -> Result<T, EtlError> {
        self.change_context(EtlError::Configuration)
            .attach_printable(reason.to_string())
    }

    fn temporary(self, reason: &str) -> Result<T, EtlError> {
        self.change_context(EtlError::Temporary)
            .attach_printable(reason.to_string())
    }

    fn fatal(self, reason: &str) -> Result<T, EtlError> {
        self.change_context(EtlError::Fatal)
            .attach_printable(reason.to_string())
    }
}

pub trait EtlErrorReportExt {
    fn configuration(self, reason: &str) -> Report<EtlError>;
    fn temporary(self, reason: &str) -> Report<EtlError>;
    fn fatal(self, reason: &str) -> Report<EtlError>;
}

impl<C> EtlErrorReportExt for Report<C> {
    fn configuration(self, reason: &str) -> Report<EtlError> {
        self.change_context(EtlError::Configuration)
            .attach_printable(reason.to_string())
    }

    fn temporary(self, reason: &str) -> Report<EtlError> {
        self.change_context(EtlError::Temporary)
            .attach_printable(reason.to_string())
    }

    fn fatal(self, reason: &str) -> Report<EtlError> {
        self.change_context(EtlError::Fatal)
            .attach_printable(reason.to_string())
    }
}

pub trait EtlErrorOptionExt {
    type Some;

    /// Missing required value: a configuration error.
    fn configuration(self, reason: &str) -> Result<Self::Some, EtlError>;
}

impl<T> EtlErrorOptionExt for Option<T> {
    type Some = T;

    fn configuration(self, reason: &str) -> Result<T, EtlError> {
        self.ok_or_else(|| EtlError::configuration(reason))
    }
}
