//! Part assembler: concatenates committed parts into one final object.

use std::io;
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{info, warn};

use stash_core::error::AppError;
use stash_core::result::AppResult;
use stash_core::traits::storage::StorageProvider;
use stash_core::types::SessionId;
use stash_entity::upload::UploadPart;

use crate::layout;
use crate::parts::PartStore;

/// Streams parts in ascending part-number order into a final object.
#[derive(Debug, Clone)]
pub struct PartAssembler {
    provider: Arc<dyn StorageProvider>,
    parts: PartStore,
}

impl PartAssembler {
    /// Create a new assembler.
    pub fn new(provider: Arc<dyn StorageProvider>) -> Self {
        Self {
            parts: PartStore::new(provider.clone()),
            provider,
        }
    }

    /// Check that every recorded part has a slot of exactly its recorded size.
    pub async fn verify(&self, session: SessionId, parts: &[UploadPart]) -> AppResult<()> {
        for part in parts {
            let stored = match self.parts.part_size(session, part.part_number).await {
                Ok(size) => size as i64,
                Err(e) if e.is_not_found() => {
                    return Err(AppError::integrity(format!(
                        "Part {} of session {session} is missing from storage",
                        part.part_number
                    )));
                }
                Err(e) => return Err(e),
            };

            if stored != part.size_bytes {
                return Err(AppError::integrity(format!(
                    "Part {} of session {session} holds {stored} bytes, expected {}",
                    part.part_number, part.size_bytes
                )));
            }
        }
        Ok(())
    }

    /// Concatenate `parts` into `target_key` and return the bytes written.
    ///
    /// Parts are read lazily one after another. The written total must equal
    /// the sum of recorded sizes; on any failure the partial target is
    /// removed before the error returns.
    pub async fn assemble(
        &self,
        session: SessionId,
        parts: &[UploadPart],
        target_key: &str,
    ) -> AppResult<u64> {
        let mut ordered: Vec<&UploadPart> = parts.iter().collect();
        ordered.sort_by_key(|p| p.part_number);
        let expected: i64 = ordered.iter().map(|p| p.size_bytes).sum();
        let keys: Vec<String> = ordered
            .iter()
            .map(|p| layout::part_key(session, p.part_number))
            .collect();

        info!(
            session_id = %session,
            parts = keys.len(),
            target_key,
            "Assembling parts"
        );

        let provider = self.provider.clone();
        let body = stream::iter(keys)
            .then(move |key| {
                let provider = provider.clone();
                async move { provider.read(&key).await.map_err(io::Error::other) }
            })
            .try_flatten();

        let result = match self.provider.write_stream(target_key, Box::pin(body)).await {
            Ok(written) if written as i64 == expected => Ok(written),
            Ok(written) => Err(AppError::integrity(format!(
                "Assembled {written} bytes for session {session}, expected {expected}"
            ))),
            Err(e) => Err(e),
        };

        if result.is_err() {
            if let Err(cleanup) = self.provider.delete(target_key).await {
                warn!(target_key, error = %cleanup, "Failed to remove partial object");
            }
        }

        let written = result?;
        info!(session_id = %session, bytes = written, "Assembly complete");
        Ok(written)
    }
}
