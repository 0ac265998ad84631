use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{CdpError, Result};

/// Document field holding the item id.
pub const ITEM_ID_FIELD: &str = "itemId";
/// Document field holding the item type discriminator.
pub const ITEM_TYPE_FIELD: &str = "itemType";
/// Document field holding the tenant scope.
pub const SCOPE_FIELD: &str = "scope";

/// A persisted entity.
///
/// `ITEM_TYPE` is the discriminator used to pick the physical index,
/// partitioning and routing for the type.
pub trait Item: Serialize + DeserializeOwned + Send + Sync {
    const ITEM_TYPE: &'static str;

    fn item_id(&self) -> &str;

    fn set_item_id(&mut self, id: String);

    /// Tenant scope, stamped into the stored document when present.
    fn scope(&self) -> Option<&str> {
        None
    }

    /// Timestamp deciding the daily partition. Types stored in daily
    /// partitions must return `Some`.
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        None
    }
}

/// Serialize an item into its stored document form, stamping `itemId`,
/// `itemType` and, when the item has one, `scope`.
pub fn to_document<T: Item>(item: &T) -> Result<Value> {
    let mut doc = serde_json::to_value(item)?;
    let obj = doc.as_object_mut().ok_or_else(|| {
        CdpError::Serialize(format!("{} did not serialize to an object", T::ITEM_TYPE))
    })?;
    obj.insert(ITEM_ID_FIELD.to_string(), Value::String(item.item_id().to_string()));
    obj.insert(ITEM_TYPE_FIELD.to_string(), Value::String(T::ITEM_TYPE.to_string()));
    if let Some(scope) = item.scope() {
        obj.insert(SCOPE_FIELD.to_string(), Value::String(scope.to_string()));
    }
    Ok(doc)
}

/// Deserialize a stored document, forcing the item id to the physical id the
/// store reported.
pub fn from_document<T: Item>(id: &str, source: Value) -> Result<T> {
    let mut item: T = serde_json::from_value(source)?;
    item.set_item_id(id.to_string());
    Ok(item)
}
