use crate::{error::BadContextError, KernelTraits};

/// If the current context is not waitable, return `Err(BadContext)`.
pub(crate) fn expect_waitable_context<Traits: KernelTraits>() -> Result<(), BadContextError> {
    if Traits::is_interrupt_context() {
        Err(BadContextError::BadContext)
    } else {
        Ok(())
    }
}
