//! Loading and saving versioned records through a [`KeyValueStore`].

use crate::error::SyncResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tallysync_protocol::{decode_record, encode_record};
use tallysync_store::KeyValueStore;

/// Reads and decodes the record under `key`, or returns `T::default()` if
/// the key was never written.
pub(crate) async fn load_or_default<S, T>(store: &S, key: &str) -> SyncResult<T>
where
    S: KeyValueStore + ?Sized,
    T: DeserializeOwned + Default,
{
    match store.get(key).await? {
        Some(bytes) => Ok(decode_record(&bytes)?),
        None => Ok(T::default()),
    }
}

/// Encodes `value` as a current-version record and writes it under `key`.
pub(crate) async fn save<S, T>(store: &S, key: &str, value: &T) -> SyncResult<()>
where
    S: KeyValueStore + ?Sized,
    T: Serialize,
{
    let bytes = encode_record(value)?;
    store.set(key, bytes).await?;
    Ok(())
}
