use bytes::{Bytes, BytesMut};
use futures::future::try_join_all;
use scanflow_host_kv::KvStore;

use crate::error::BlobError;

/// Key under which chunk `index` of the blob `prefix` is stored.
pub fn chunk_key(prefix: &str, index: usize) -> String {
  format!("{prefix}-{index}")
}

/// Partition `payload` into contiguous slices of at most `chunk_size` bytes.
///
/// The last slice may be shorter. An empty payload yields no chunks. Slices
/// share the payload's buffer; nothing is copied.
pub fn split(payload: &Bytes, chunk_size: usize) -> Result<Vec<Bytes>, BlobError> {
  if chunk_size == 0 {
    return Err(BlobError::InvalidChunkSize);
  }

  Ok(
    (0..payload.len())
      .step_by(chunk_size)
      .map(|start| payload.slice(start..(start + chunk_size).min(payload.len())))
      .collect(),
  )
}

/// Concatenate chunks in slice order. Zero chunks yield an empty payload.
pub fn reassemble(chunks: &[Bytes]) -> Bytes {
  match chunks {
    [] => Bytes::new(),
    [only] => only.clone(),
    _ => {
      let total = chunks.iter().map(Bytes::len).sum();
      let mut out = BytesMut::with_capacity(total);
      for chunk in chunks {
        out.extend_from_slice(chunk);
      }
      out.freeze()
    }
  }
}

/// Reassemble chunks that arrive as `(index, bytes)` pairs in any order.
///
/// Every index in `[0, count)` must appear exactly once.
pub fn reassemble_indexed(
  chunks: impl IntoIterator<Item = (usize, Bytes)>,
  count: usize,
) -> Result<Bytes, BlobError> {
  let mut slots: Vec<Option<Bytes>> = vec![None; count];

  for (index, chunk) in chunks {
    let slot = slots
      .get_mut(index)
      .ok_or(BlobError::IndexOutOfRange { index, count })?;
    if slot.is_some() {
      return Err(BlobError::DuplicateChunk { index });
    }
    *slot = Some(chunk);
  }

  let ordered = slots
    .into_iter()
    .enumerate()
    .map(|(index, slot)| slot.ok_or(BlobError::MissingIndex { index }))
    .collect::<Result<Vec<_>, _>>()?;

  Ok(reassemble(&ordered))
}

/// Write chunk `i` under `prefix-i` for every chunk.
pub async fn persist(store: &dyn KvStore, prefix: &str, chunks: &[Bytes]) -> Result<(), BlobError> {
  try_join_all(chunks.iter().enumerate().map(|(index, chunk)| {
    let key = chunk_key(prefix, index);
    async move { store.put(&key, chunk.clone()).await }
  }))
  .await?;
  Ok(())
}

/// Read chunks `0..count` of `prefix`, returned in index order.
///
/// Reads are issued concurrently; any missing or unreadable chunk fails the
/// whole fetch.
pub async fn fetch(store: &dyn KvStore, prefix: &str, count: usize) -> Result<Vec<Bytes>, BlobError> {
  try_join_all((0..count).map(|index| {
    let key = chunk_key(prefix, index);
    async move {
      match store.get(&key).await {
        Ok(Some(entry)) => Ok(entry.value),
        Ok(None) => Err(BlobError::MissingChunk { key }),
        Err(source) => Err(BlobError::UnreadableChunk { key, source }),
      }
    }
  }))
  .await
}

/// Remove chunks `0..count` of `prefix`.
pub async fn delete(store: &dyn KvStore, prefix: &str, count: usize) -> Result<(), BlobError> {
  try_join_all((0..count).map(|index| {
    let key = chunk_key(prefix, index);
    async move { store.delete(&key).await }
  }))
  .await?;
  Ok(())
}
