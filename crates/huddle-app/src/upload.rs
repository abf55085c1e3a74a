//! Out-of-band file upload.
//!
//! Files travel over HTTP, not the event channel. A successful upload yields
//! the descriptor that is then posted with `message:send`. Failures are
//! reported and never retried.

use std::future::Future;

use huddle_proto::{FileAttachment, RoomId};
use thiserror::Error;

/// A local file picked by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingFile {
    /// File name as shown to the user
    pub name: String,
    /// MIME type
    pub mime_type: String,
    /// Contents
    pub bytes: Vec<u8>,
}

impl OutgoingFile {
    /// Create an outgoing file.
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { name: name.into(), mime_type: mime_type.into(), bytes }
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Upload failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UploadError {
    /// The upload endpoint answered with a non-success status
    #[error("upload rejected with status {status}")]
    Rejected {
        /// HTTP status code
        status: u16,
    },

    /// The request never completed
    #[error("upload transport failed: {0}")]
    Transport(String),

    /// The endpoint answered with something that is not a file descriptor
    #[error("invalid upload response: {0}")]
    InvalidResponse(String),
}

/// Uploads files for a room.
pub trait FileUploader: Send {
    /// Upload `file` for `room_id` and return its descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError`] on any failure; the caller does not retry.
    fn upload(
        &mut self,
        room_id: &RoomId,
        file: OutgoingFile,
    ) -> impl Future<Output = Result<FileAttachment, UploadError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_counts_bytes() {
        assert_eq!(OutgoingFile::new("cat.png", "image/png", vec![0; 3]).size(), 3);
        assert_eq!(OutgoingFile::new("empty.txt", "text/plain", Vec::new()).size(), 0);
    }
}
