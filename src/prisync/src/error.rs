//! Error codes
//!
//! Every error in this crate is a contract violation. The public operations
//! never return them; instead they are logged and turned into a panic (see
//! [`crate::Lock::acquire`] for an example). The types are exposed so that the
//! panic messages can be matched against their names.
use core::fmt;

/// All result codes that can be produced by this crate.
#[repr(i8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ResultCode {
    /// The current context disallows the operation: it's an interrupt
    /// context, or CPU Lock is already active.
    BadContext = -25,
    /// A parameter is out of range.
    BadParam = -17,
    /// The operation would make the current thread wait for itself, e.g., by
    /// acquiring a lock it already holds.
    WouldDeadlock = -38,
    /// The current thread does not own the lock it is trying to release or
    /// wait on.
    NotOwner = -41,
}

impl ResultCode {
    /// Get the short name of the result code.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BadContext => "BadContext",
            Self::BadParam => "BadParam",
            Self::WouldDeadlock => "WouldDeadlock",
            Self::NotOwner => "NotOwner",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BadContext => "the operation is not allowed in the current context",
            Self::BadParam => "a parameter is out of range",
            Self::WouldDeadlock => "the current thread already holds the lock",
            Self::NotOwner => "the current thread does not hold the lock",
        })
    }
}

macro_rules! define_suberror {
    (
        $( #[doc $( $doc:tt )*] )*
        $( #[into( $Supererror:path )] )*
        $vis:vis enum $Name:ident {
            $( $Variant:ident, )*
        }
    ) => {
        $( #[doc $( $doc )*] )*
        #[repr(i8)]
        #[derive(PartialEq, Eq, Copy, Clone)]
        $vis enum $Name {
            $( $Variant = ResultCode::$Variant as _ ),*
        }

        impl fmt::Debug for $Name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                ResultCode::from(*self).fmt(f)
            }
        }

        impl fmt::Display for $Name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&ResultCode::from(*self), f)
            }
        }

        define_suberror! {
            @into
            #[into(ResultCode)]
            $( #[into( $Supererror )] )*
            enum $Name {
                $( $Variant, )*
            }
        }
    };

    (
        @into
        #[into( $Supererror0:path )]
        $( #[into( $Supererror:path )] )*
        enum $Name:ident {
            $( $Variant:ident, )*
        }
    ) => {
        impl From<$Name> for $Supererror0 {
            #[inline]
            fn from(x: $Name) -> Self {
                match x {
                    $( $Name::$Variant => Self::$Variant ),*
                }
            }
        }

        define_suberror! {
            @into
            $( #[into( $Supererror )] )*
            enum $Name {
                $( $Variant, )*
            }
        }
    };

    ( @into enum $($_:tt)* ) => {};
}

// Operation errors

define_suberror! {
    /// Error type for [`Semaphore::down`](crate::Semaphore::down).
    pub enum DownError {
        BadContext,
    }
}

define_suberror! {
    /// Error type for [`Semaphore::try_down`](crate::Semaphore::try_down),
    /// [`Semaphore::up`](crate::Semaphore::up), and the query methods.
    pub enum PollError {
        BadContext,
    }
}

define_suberror! {
    /// Error type for [`Lock::acquire`](crate::Lock::acquire).
    pub enum AcquireError {
        BadContext,
        WouldDeadlock,
    }
}

define_suberror! {
    /// Error type for [`Lock::try_acquire`](crate::Lock::try_acquire).
    pub enum TryAcquireError {
        BadContext,
        WouldDeadlock,
    }
}

define_suberror! {
    /// Error type for [`Lock::release`](crate::Lock::release).
    pub enum ReleaseError {
        BadContext,
        NotOwner,
    }
}

define_suberror! {
    /// Error type for [`Condvar::wait`](crate::Condvar::wait).
    pub enum WaitError {
        BadContext,
        NotOwner,
    }
}

define_suberror! {
    /// Error type for [`Condvar::signal`](crate::Condvar::signal) and
    /// [`Condvar::broadcast`](crate::Condvar::broadcast).
    pub enum SignalError {
        BadContext,
        NotOwner,
    }
}

define_suberror! {
    /// Error type for
    /// [`thread::set_current_priority`](crate::thread::set_current_priority).
    pub enum SetPriorityError {
        BadContext,
        BadParam,
    }
}

// Suberrors

define_suberror! {
    /// `BadContext`
    #[into(DownError)]
    #[into(PollError)]
    #[into(AcquireError)]
    #[into(TryAcquireError)]
    #[into(ReleaseError)]
    #[into(WaitError)]
    #[into(SignalError)]
    #[into(SetPriorityError)]
    pub(crate) enum BadContextError {
        BadContext,
    }
}

define_suberror! {
    /// `WouldDeadlock`
    #[into(AcquireError)]
    #[into(TryAcquireError)]
    pub(crate) enum WouldDeadlockError {
        WouldDeadlock,
    }
}

define_suberror! {
    /// `NotOwner`
    #[into(ReleaseError)]
    #[into(WaitError)]
    #[into(SignalError)]
    pub(crate) enum NotOwnerError {
        NotOwner,
    }
}
