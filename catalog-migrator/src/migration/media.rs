use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::source::{MediaKind, MediaSource};
use crate::target::{MediaFileName, TargetClient, TargetError};

#[derive(Debug, Default)]
struct UploadState {
    media_ids: HashMap<(MediaKind, String), String>,
    uploaded: u32,
    failed: u32,
}

/// Uploads legacy pictures alongside the entity creates.
///
/// A picture that cannot be read or is refused by the target is logged and skipped, so
/// its owner is still created without it. Only fatal target errors end the run. A
/// reference uploaded once is reused for every later owner and retry.
pub(super) struct MediaUploader<'a> {
    target: &'a TargetClient,
    source: Option<&'a dyn MediaSource>,
    folder_id: Option<&'a str>,
    state: Mutex<UploadState>,
}

impl<'a> MediaUploader<'a> {
    /// With no `source` every upload is skipped.
    pub(super) fn new(
        target: &'a TargetClient,
        source: Option<&'a dyn MediaSource>,
        folder_id: Option<&'a str>,
    ) -> Self {
        Self {
            target,
            source,
            folder_id,
            state: Mutex::new(UploadState::default()),
        }
    }

    /// Uploads `reference` for `owner_id` and returns the media id, or `None` when the
    /// picture was skipped.
    pub(super) async fn upload(
        &self,
        owner_id: &str,
        kind: MediaKind,
        reference: &str,
    ) -> Result<Option<String>, TargetError> {
        let Some(source) = self.source else {
            return Ok(None);
        };

        let key = (kind, reference.to_string());
        if let Some(media_id) = self.state.lock().await.media_ids.get(&key) {
            return Ok(Some(media_id.clone()));
        }

        let bytes = match source.read_media(kind, reference.to_string()) {
            Ok(bytes) => bytes,
            Err(e) => {
                crate::warn!(
                    "media.read_failed owner_id={owner_id} kind={kind} reference={reference:?} error={e}"
                );
                self.state.lock().await.failed += 1;
                return Ok(None);
            }
        };

        let file = MediaFileName::parse(reference);
        match self.target.upload_media(&file, bytes, self.folder_id).await {
            Ok(media_id) => {
                crate::info!(
                    "media.uploaded owner_id={owner_id} kind={kind} media_id={media_id}"
                );
                let mut state = self.state.lock().await;
                state.uploaded += 1;
                state.media_ids.insert(key, media_id.clone());
                Ok(Some(media_id))
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                crate::error!(
                    "media.upload_failed owner_id={owner_id} kind={kind} reference={reference:?} error={e}"
                );
                self.state.lock().await.failed += 1;
                Ok(None)
            }
        }
    }

    /// Pictures uploaded and pictures skipped after a failure, so far.
    pub(super) async fn counts(&self) -> (u32, u32) {
        let state = self.state.lock().await;
        (state.uploaded, state.failed)
    }
}

/// Dry runs only report the uploads they would make.
pub(super) fn log_would_upload(owner_id: &str, kind: MediaKind, reference: &str) {
    crate::info!("media.would_upload owner_id={owner_id} kind={kind} reference={reference:?}");
}
