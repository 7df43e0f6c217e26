//! UTXO output list and spent key images.

use std::sync::Arc;

use commonware_codec::{DecodeExt, Encode};
use hyla_domain::{KeyImage, UtxoOutput};
use hyla_traits::{KvStore, StoreError, WriteBatch};
use tracing::debug;

use crate::BackendError;

const OUTPUT_PREFIX: u8 = b'u';
const KEY_IMAGE_PREFIX: u8 = b'k';
const COUNT_KEY: &[u8] = b"UtxoCount";

fn output_key(index: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(OUTPUT_PREFIX);
    key.extend_from_slice(&index.to_be_bytes());
    key
}

fn key_image_key(image: &KeyImage) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.push(KEY_IMAGE_PREFIX);
    key.extend_from_slice(image.0.as_slice());
    key
}

/// Append-only UTXO outputs indexed by insertion order, and the set of spent key images.
#[derive(Clone, Debug)]
pub struct UtxoStore {
    db: Arc<dyn KvStore>,
}

impl UtxoStore {
    /// Open a UTXO store over `db`.
    pub fn new(db: Arc<dyn KvStore>) -> Self {
        Self { db }
    }

    /// Number of stored outputs.
    pub fn len(&self) -> Result<u64, BackendError> {
        let Some(bytes) = self.db.get(COUNT_KEY)? else {
            return Ok(0);
        };
        let bytes: [u8; 8] =
            bytes.as_slice().try_into().map_err(|_| StoreError::corrupt(COUNT_KEY, "bad count"))?;
        Ok(u64::from_be_bytes(bytes))
    }

    /// Whether no output has been stored.
    pub fn is_empty(&self) -> Result<bool, BackendError> {
        Ok(self.len()? == 0)
    }

    /// Output at global `index`.
    pub fn output(&self, index: u64) -> Result<Option<UtxoOutput>, BackendError> {
        self.db
            .get(&output_key(index))?
            .map(|bytes| UtxoOutput::decode(bytes.as_slice()).map_err(BackendError::from))
            .transpose()
    }

    /// Whether `image` has been spent.
    pub fn is_spent(&self, image: &KeyImage) -> Result<bool, BackendError> {
        Ok(self.db.contains(&key_image_key(image))?)
    }

    /// Append outputs and mark key images spent in one batch.
    ///
    /// Returns the global index of the first appended output. Fails without writing if any
    /// image is already spent.
    pub fn apply(&self, outputs: &[UtxoOutput], images: &[KeyImage]) -> Result<u64, BackendError> {
        for image in images {
            if self.is_spent(image)? {
                return Err(BackendError::KeyImageSpent(image.0));
            }
        }
        let first = self.len()?;
        let mut batch = WriteBatch::new();
        for (offset, output) in outputs.iter().enumerate() {
            batch.put(output_key(first + offset as u64), output.encode().to_vec());
        }
        for image in images {
            batch.put(key_image_key(image), vec![1u8]);
        }
        let count = first + outputs.len() as u64;
        batch.put(COUNT_KEY, count.to_be_bytes().to_vec());
        self.db.write(batch)?;
        debug!(first, outputs = outputs.len(), key_images = images.len(), "stored utxo changes");
        Ok(first)
    }
}
