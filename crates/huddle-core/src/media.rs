//! Media stream handles.

use std::fmt;

/// Opaque token for a camera/microphone stream or a received remote stream.
///
/// Issued by the media backend. Whoever holds a handle owns the stream and must
/// hand it back for release exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MediaHandle(u64);

impl MediaHandle {
    /// Wrap a backend-assigned token.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Backend-assigned token.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "media#{:x}", self.0)
    }
}
