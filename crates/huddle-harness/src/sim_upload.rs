//! Upload backend that never leaves memory.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use huddle_app::{FileUploader, OutgoingFile, UploadError};
use huddle_proto::{FileAttachment, RoomId};

#[derive(Default)]
struct UploadState {
    failure: Option<UploadError>,
    uploaded: Vec<(RoomId, FileAttachment)>,
}

/// Fake uploader returning deterministic URLs.
#[derive(Clone, Default)]
pub struct FakeUploader {
    state: Arc<Mutex<UploadState>>,
}

impl FakeUploader {
    /// Create an uploader that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, UploadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next upload fail.
    pub fn fail_next(&self, error: UploadError) {
        self.lock().failure = Some(error);
    }

    /// Successful uploads so far.
    pub fn uploaded(&self) -> Vec<(RoomId, FileAttachment)> {
        self.lock().uploaded.clone()
    }
}

impl FileUploader for FakeUploader {
    async fn upload(
        &mut self,
        room_id: &RoomId,
        file: OutgoingFile,
    ) -> Result<FileAttachment, UploadError> {
        let mut state = self.lock();
        if let Some(error) = state.failure.take() {
            return Err(error);
        }

        let attachment = FileAttachment {
            url: format!("https://files.test/{room_id}/{}/{}", state.uploaded.len() + 1, file.name),
            size: file.size(),
            name: file.name,
            mime_type: file.mime_type,
        };
        state.uploaded.push((room_id.clone(), attachment.clone()));
        Ok(attachment)
    }
}
