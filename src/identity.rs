//! Matches elementary streams across files into shared stream slots.

use std::collections::HashSet;

use tracing::info;

use crate::error::{EbpError, Result};
use crate::types::{EsEntry, FileScan, IdentityKey, StreamSlot};

#[derive(Debug, Clone)]
pub struct SlotPlan {
    pub use_language: bool,
    pub slots: Vec<StreamSlot>,
}

impl SlotPlan {
    /// Resolves the stream matching `slot` in one file, if the file has it.
    pub fn stream_for<'a>(&self, file: &'a FileScan, slot: &StreamSlot) -> Option<&'a EsEntry> {
        match &slot.key {
            IdentityKey::Video => file.video(),
            key => file.streams.iter().find(|s| s.is_audio() && audio_key(s, self.use_language) == *key),
        }
    }
}

fn audio_key(es: &EsEntry, use_language: bool) -> IdentityKey {
    if use_language {
        IdentityKey::Language(es.language_key.clone())
    } else {
        IdentityKey::Pid(es.pid)
    }
}

/// Builds the slot list: slot 0 is video, then unique audio identities in
/// file order. Language keys are used unless one file repeats a key.
pub fn resolve(files: &[FileScan]) -> Result<SlotPlan> {
    let mut use_language = true;
    for (idx, file) in files.iter().enumerate() {
        if file.streams.iter().filter(|s| s.is_video()).count() > 1 {
            return Err(EbpError::MultipleVideoStreams { file: idx });
        }
        let mut seen = HashSet::new();
        for es in file.streams.iter().filter(|s| s.is_audio()) {
            if !seen.insert(es.language_key.as_str()) {
                info!(file = idx, pid = es.pid, key = %es.language_key, "non-unique audio language, matching audio by PID");
                use_language = false;
            }
        }
    }

    let mut slots = vec![StreamSlot { index: 0, is_video: true, key: IdentityKey::Video }];
    for file in files {
        for es in file.streams.iter().filter(|s| s.is_audio()) {
            let key = audio_key(es, use_language);
            if !slots.iter().any(|s| s.key == key) {
                info!(slot = slots.len(), %key, "adding audio slot");
                slots.push(StreamSlot { index: slots.len(), is_video: false, key });
            }
        }
    }

    Ok(SlotPlan { use_language, slots })
}
