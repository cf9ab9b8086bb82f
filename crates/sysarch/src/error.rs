//! Error taxonomy shared by every port.
//!
//! Expected outcomes (`Full`, `Empty`, `Timeout`) are ordinary values for the
//! protocol stack; only `OutOfResources` and `Usage` indicate a fault.

use core::fmt;

/// Kind of object a pool or kernel ran out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResourceKind {
    Thread,
    Stack,
    Mailbox,
    Semaphore,
    Mutex,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Thread => "thread",
            Self::Stack => "stack",
            Self::Mailbox => "mailbox",
            Self::Semaphore => "semaphore",
            Self::Mutex => "mutex",
        };
        f.write_str(name)
    }
}

/// Contract violations by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsageError {
    /// A suspending operation was called from interrupt context.
    BlockingInIsr,
    /// Requested stack exceeds the largest stack the backend can provide.
    StackTooLarge { requested: usize, max: usize },
    /// Initial semaphore count is above the requested maximum.
    CountAboveMax { count: u32, max: u32 },
    /// Mutex released by a thread that does not hold it.
    NotOwner,
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlockingInIsr => write!(f, "suspending call from interrupt context"),
            Self::StackTooLarge { requested, max } => {
                write!(f, "stack of {requested} exceeds maximum of {max}")
            }
            Self::CountAboveMax { count, max } => {
                write!(f, "initial count {count} exceeds maximum {max}")
            }
            Self::NotOwner => write!(f, "mutex released by a non-owner"),
        }
    }
}

/// Errors returned by [`SysArch`](crate::SysArch) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SysError {
    /// Pool exhausted or kernel refused to create the object.
    OutOfResources(ResourceKind),
    /// Mailbox full on a non-blocking post.
    Full,
    /// Mailbox empty on a non-blocking fetch.
    Empty,
    /// Timed wait expired.
    Timeout,
    Usage(UsageError),
    /// Operation not provided by this backend.
    Unsupported,
    /// Handle refers to an object that no longer exists.
    InvalidHandle,
}

impl fmt::Display for SysError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfResources(kind) => write!(f, "out of {kind} resources"),
            Self::Full => write!(f, "mailbox is full"),
            Self::Empty => write!(f, "mailbox is empty"),
            Self::Timeout => write!(f, "operation timed out"),
            Self::Usage(usage) => write!(f, "usage error: {usage}"),
            Self::Unsupported => write!(f, "operation not supported by this backend"),
            Self::InvalidHandle => write!(f, "invalid or stale handle"),
        }
    }
}

impl From<UsageError> for SysError {
    fn from(usage: UsageError) -> Self {
        Self::Usage(usage)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SysError {}

pub type SysResult<T> = Result<T, SysError>;

/// A rejected non-blocking post. The message is handed back untouched.
pub struct TryPostError<M> {
    error: SysError,
    message: M,
}

impl<M> TryPostError<M> {
    pub fn new(error: SysError, message: M) -> Self {
        Self { error, message }
    }

    pub fn full(message: M) -> Self {
        Self::new(SysError::Full, message)
    }

    pub fn error(&self) -> SysError {
        self.error
    }

    pub fn into_message(self) -> M {
        self.message
    }
}

impl<M> fmt::Debug for TryPostError<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TryPostError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<M> fmt::Display for TryPostError<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "post rejected: {}", self.error)
    }
}

#[cfg(feature = "std")]
impl<M> std::error::Error for TryPostError<M> {}

/// A refused mailbox destroy. The caller gets the handle back.
pub struct MailboxBusy<H> {
    pub mailbox: H,
    /// Messages still queued when the destroy was attempted.
    pub pending: usize,
}

impl<H> fmt::Debug for MailboxBusy<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxBusy")
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl<H> fmt::Display for MailboxBusy<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mailbox still holds {} message(s)", self.pending)
    }
}

#[cfg(feature = "std")]
impl<H> std::error::Error for MailboxBusy<H> {}
