//! Remote message flags
//!
//! Strongly-typed system flags instead of raw protocol strings. The
//! engine only ever sets `Seen` (read state) and `Deleted` (message
//! removal), but the full system set is represented so provider
//! implementations can report whatever the server stores.

use std::fmt;

/// A remote message flag.
///
/// # Examples
///
/// ```
/// use mailtree::Flag;
///
/// assert_eq!(Flag::Seen.as_imap_str(), "\\Seen");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Message has been read (`\Seen`).
    Seen,
    /// Message has been answered (`\Answered`).
    Answered,
    /// Message is flagged for attention (`\Flagged`).
    Flagged,
    /// Message is marked for deletion (`\Deleted`).
    Deleted,
    /// Message is a draft (`\Draft`).
    Draft,
}

impl Flag {
    /// The IMAP wire representation of this flag, including the
    /// leading backslash.
    #[must_use]
    pub const fn as_imap_str(self) -> &'static str {
        match self {
            Self::Seen => "\\Seen",
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_imap_str())
    }
}
