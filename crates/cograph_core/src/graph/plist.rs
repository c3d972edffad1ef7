//! Serialization boundary between property storage and property lists.
//!
//! # Invariants
//! - Only persistent properties are written to snapshots.
//! - Decoding never registers anything until the whole payload decoded.
//! - References decode to the instance already registered under the same
//!   identity; unknown identities become faults.

use crate::graph::context::EditingContext;
use crate::graph::error::{GraphError, GraphResult};
use crate::graph::fault::normalize_value;
use crate::graph::loader::{PropertyList, StoredObject, StoredOwner};
use crate::graph::object::{ObjectRecord, ObjectState};
use crate::model::record::{parse_reference_marker, reference_marker};
use crate::model::schema::EntityDescriptor;
use crate::model::value::{ObjectHandle, ObjectId, Value};
use serde_json::{Number, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Faults that must be registered for a decoded payload to resolve.
pub(super) type PendingFaults = Vec<(ObjectId, Arc<EntityDescriptor>)>;

pub(super) struct DecodedObject {
    pub(super) storage: BTreeMap<String, Value>,
    pub(super) pending_faults: PendingFaults,
}

impl EditingContext {
    pub fn serialized_value_for_property(
        &mut self,
        object: ObjectHandle,
        property: &str,
    ) -> GraphResult<JsonValue> {
        let value = self.value_for_property(object, property)?;
        self.encode_value(&value)
            .map_err(|message| invalid_value(property, message))
    }

    /// Decodes a property-list value and writes it through `set_value`.
    pub fn set_serialized_value(
        &mut self,
        object: ObjectHandle,
        property: &str,
        plist: &JsonValue,
    ) -> GraphResult<()> {
        let mut pending = PendingFaults::new();
        let value = self
            .decode_value(plist, &mut pending)
            .map_err(|message| invalid_value(property, message))?;
        let registered: Vec<ObjectId> = pending.iter().map(|(id, _)| *id).collect();
        self.register_pending(pending);
        let outcome = self.set_value(object, property, value);
        if outcome.is_err() {
            for id in registered {
                self.objects.remove(&id);
            }
        }
        outcome
    }

    /// Serialized form of a persistent object, as handed to the backing store.
    pub fn snapshot(&mut self, object: ObjectHandle) -> GraphResult<StoredObject> {
        self.unfault_if_needed(object)?;
        let record = self.record(object)?;
        if !record.state.is_persistent() {
            return Err(GraphError::InvalidState {
                id: object.id(),
                state: record.state,
                operation: "snapshot",
            });
        }

        let mut properties = PropertyList::new();
        for descriptor in record.entity.properties().iter().filter(|p| p.persistent) {
            if let Some(value) = record.storage.get(descriptor.name.as_str()) {
                let encoded = self
                    .encode_value(value)
                    .map_err(|message| invalid_value(descriptor.name.as_str(), message))?;
                properties.insert(descriptor.name.clone(), encoded);
            }
        }

        Ok(StoredObject {
            id: object.id(),
            entity: record.entity.name().to_string(),
            root: record.root,
            owner: record.owner.as_ref().map(|owner| StoredOwner {
                parent: owner.parent,
                property: owner.property.clone(),
            }),
            properties,
        })
    }

    /// Serializes one property and decodes it back; diagnostics helper.
    pub fn round_trip_value(&mut self, object: ObjectHandle, property: &str) -> GraphResult<Value> {
        let encoded = self.serialized_value_for_property(object, property)?;
        let mut pending = PendingFaults::new();
        let decoded = self
            .decode_value(&encoded, &mut pending)
            .map_err(|message| invalid_value(property, message))?;
        self.register_pending(pending);
        Ok(decoded)
    }

    pub(super) fn encode_value(&self, value: &Value) -> Result<JsonValue, String> {
        Ok(match value {
            Value::Null => JsonValue::Null,
            Value::Bool(flag) => JsonValue::Bool(*flag),
            Value::Int(number) => JsonValue::from(*number),
            Value::Float(number) => Number::from_f64(*number)
                .map(JsonValue::Number)
                .ok_or_else(|| format!("non-finite float {number} cannot be serialized"))?,
            Value::Text(text) => JsonValue::String(text.clone()),
            Value::Object(handle) => {
                let record = self.record(*handle).map_err(|err| err.to_string())?;
                reference_marker(handle.id(), record.entity.name())
            }
            Value::List(items) => JsonValue::Array(
                items
                    .iter()
                    .map(|item| self.encode_value(item))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
        })
    }

    pub(super) fn decode_value(
        &self,
        plist: &JsonValue,
        pending: &mut PendingFaults,
    ) -> Result<Value, String> {
        match plist {
            JsonValue::Null => Ok(Value::Null),
            JsonValue::Bool(flag) => Ok(Value::Bool(*flag)),
            JsonValue::Number(number) => {
                if let Some(integer) = number.as_i64() {
                    Ok(Value::Int(integer))
                } else {
                    number
                        .as_f64()
                        .map(Value::Float)
                        .ok_or_else(|| format!("unsupported number {number}"))
                }
            }
            JsonValue::String(text) => Ok(Value::Text(text.clone())),
            JsonValue::Array(items) => Ok(Value::List(
                items
                    .iter()
                    .map(|item| self.decode_value(item, pending))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            JsonValue::Object(map) => {
                let Some((id, entity_name)) =
                    parse_reference_marker(map).map_err(|err| err.to_string())?
                else {
                    return Err("nested maps are not property values".to_string());
                };
                if let Some(record) = self.objects.get(&id) {
                    if record.entity.name() != entity_name {
                        return Err(format!(
                            "reference {id} names entity `{entity_name}` but object is `{}`",
                            record.entity.name()
                        ));
                    }
                } else if !pending.iter().any(|(pending_id, _)| *pending_id == id) {
                    let entity = self
                        .schema
                        .get(entity_name.as_str())
                        .cloned()
                        .ok_or_else(|| format!("unknown entity `{entity_name}`"))?;
                    pending.push((id, entity));
                }
                Ok(Value::Object(self.handle(id)))
            }
        }
    }

    pub(super) fn decode_stored(
        &self,
        object: ObjectHandle,
        stored: &StoredObject,
    ) -> Result<DecodedObject, String> {
        let record = self
            .objects
            .get(&object.id())
            .ok_or_else(|| format!("object {} is not registered", object.id()))?;
        if stored.id != object.id() {
            return Err(format!(
                "stored id {} does not match requested {}",
                stored.id,
                object.id()
            ));
        }
        if stored.entity != record.entity.name() {
            return Err(format!(
                "stored entity `{}` does not match `{}`",
                stored.entity,
                record.entity.name()
            ));
        }

        let mut pending = PendingFaults::new();
        let mut storage = BTreeMap::new();
        for (key, plist) in &stored.properties {
            let descriptor = record
                .entity
                .property(key.as_str())
                .ok_or_else(|| format!("unknown property `{key}`"))?;
            if !descriptor.persistent {
                return Err(format!("transient property `{key}` in stored data"));
            }
            let value = self.decode_value(plist, &mut pending)?;
            let value = normalize_value(descriptor, value).map_err(|err| err.to_string())?;
            if !value.is_null() {
                storage.insert(key.clone(), value);
            }
        }

        Ok(DecodedObject {
            storage,
            pending_faults: pending,
        })
    }

    pub(super) fn register_pending(&mut self, pending: PendingFaults) {
        for (id, entity) in pending {
            self.objects
                .entry(id)
                .or_insert_with(|| ObjectRecord::new(entity, ObjectState::Fault));
        }
    }
}

fn invalid_value(property: &str, message: String) -> GraphError {
    GraphError::InvalidValue {
        property: property.to_string(),
        message,
    }
}
