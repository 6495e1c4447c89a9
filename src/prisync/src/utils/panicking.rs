use crate::error::ResultCode;

/// Report a contract violation and panic.
///
/// The panic message has the form `"{operation}: {code:?}"`, e.g.,
/// `"Lock::release: NotOwner"`.
#[cold]
#[track_caller]
pub(crate) fn contract_violation(operation: &'static str, code: ResultCode) -> ! {
    log::error!("{operation}: contract violation: {code}");
    panic!("{operation}: {code:?}");
}

/// Extension for the checked internal operations whose errors are contract
/// violations.
pub(crate) trait ResultExt<T> {
    /// Unwrap the value or report a contract violation attributed to
    /// `operation`.
    fn or_violation(self, operation: &'static str) -> T;
}

impl<T, E: Into<ResultCode>> ResultExt<T> for Result<T, E> {
    #[inline]
    #[track_caller]
    fn or_violation(self, operation: &'static str) -> T {
        match self {
            Ok(x) => x,
            Err(e) => contract_violation(operation, e.into()),
        }
    }
}
