use serde::{Deserialize, Deserializer};

/// Deserializer for nullable fields of partial-update payloads.
///
/// Combined with `#[serde(default)]` it yields `None` when the key is absent,
/// `Some(None)` for an explicit `null` and `Some(Some(v))` otherwise.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
