use rowsync_core::PointId;
use uuid::Uuid;

/// Stable identity of a document: UUIDv5 of `source|owner_id|data_id` in the
/// URL namespace.
pub fn deterministic_id(source: &str, owner_id: &str, data_id: &str) -> PointId {
    let name = format!("{source}|{owner_id}|{data_id}");
    PointId::from(Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()))
}
