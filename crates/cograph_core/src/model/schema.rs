//! Entity schema descriptors.
//!
//! # Responsibility
//! - Describe per-entity properties: kind, containment and cardinality.
//! - Provide the name-keyed registry used to resolve stored references.
//!
//! # Invariants
//! - Descriptors are immutable once built.
//! - Property names are unique within one entity and match `IDENTIFIER_RE`.
//! - Every entity declares the built-in `name` attribute first.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Built-in attribute carried by every entity.
pub const NAME_PROPERTY: &str = "name";

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));
static ENTITY_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("valid entity name regex")
});

pub type SchemaResult<T> = Result<T, SchemaError>;

/// Schema declaration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    InvalidEntityName(String),
    InvalidPropertyName(String),
    DuplicateProperty { entity: String, property: String },
    /// A different descriptor is already registered under this name.
    DuplicateEntity(String),
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEntityName(name) => write!(f, "invalid entity name `{name}`"),
            Self::InvalidPropertyName(name) => write!(f, "invalid property name `{name}`"),
            Self::DuplicateProperty { entity, property } => {
                write!(f, "property `{property}` declared twice on entity `{entity}`")
            }
            Self::DuplicateEntity(name) => write!(f, "entity already registered: {name}"),
        }
    }
}

impl Error for SchemaError {}

/// What a property holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// Primitive values (bool, numbers, text).
    Attribute,
    /// References to other objects. Composite references own their targets.
    Reference { composite: bool },
}

/// How many values a property holds and whether order matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Ordered,
    /// Set semantics: duplicates are ignored, positions carry no meaning.
    Unordered,
}

/// Schema of one declared property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub kind: PropertyKind,
    pub cardinality: Cardinality,
    /// Transient properties are never serialized and never damage the owner.
    pub persistent: bool,
}

impl PropertyDescriptor {
    pub fn is_composite(&self) -> bool {
        matches!(self.kind, PropertyKind::Reference { composite: true })
    }

    pub fn is_reference(&self) -> bool {
        matches!(self.kind, PropertyKind::Reference { .. })
    }

    pub fn is_multivalued(&self) -> bool {
        self.cardinality != Cardinality::One
    }

    pub fn is_ordered(&self) -> bool {
        self.cardinality == Cardinality::Ordered
    }
}

/// Immutable per-entity schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    name: String,
    properties: Vec<PropertyDescriptor>,
}

impl EntityDescriptor {
    /// Starts a descriptor declaration. The `name` attribute is pre-declared.
    pub fn builder(name: impl Into<String>) -> EntityBuilder {
        EntityBuilder {
            name: name.into(),
            properties: vec![PropertyDescriptor {
                name: NAME_PROPERTY.to_string(),
                kind: PropertyKind::Attribute,
                cardinality: Cardinality::One,
                persistent: true,
            }],
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|property| property.name == name)
    }

    /// Properties in declaration order.
    pub fn properties(&self) -> &[PropertyDescriptor] {
        self.properties.as_slice()
    }

    pub fn property_names(&self) -> Vec<&str> {
        self.properties
            .iter()
            .map(|property| property.name.as_str())
            .collect()
    }

    pub fn persistent_property_names(&self) -> Vec<&str> {
        self.properties
            .iter()
            .filter(|property| property.persistent)
            .map(|property| property.name.as_str())
            .collect()
    }

    pub fn composite_properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties
            .iter()
            .filter(|property| property.is_composite())
    }
}

/// Declaration-time builder for `EntityDescriptor`.
#[derive(Debug, Clone)]
pub struct EntityBuilder {
    name: String,
    properties: Vec<PropertyDescriptor>,
}

impl EntityBuilder {
    /// Declares a single-valued persistent attribute.
    pub fn attribute(self, name: impl Into<String>) -> Self {
        self.property(name, PropertyKind::Attribute, Cardinality::One, true)
    }

    /// Declares a single-valued attribute that is never persisted.
    pub fn transient_attribute(self, name: impl Into<String>) -> Self {
        self.property(name, PropertyKind::Attribute, Cardinality::One, false)
    }

    /// Declares a persistent attribute collection.
    pub fn attributes(self, name: impl Into<String>, cardinality: Cardinality) -> Self {
        self.property(name, PropertyKind::Attribute, cardinality, true)
    }

    /// Declares a persistent non-owning reference property.
    pub fn reference(self, name: impl Into<String>, cardinality: Cardinality) -> Self {
        self.property(
            name,
            PropertyKind::Reference { composite: false },
            cardinality,
            true,
        )
    }

    /// Declares a persistent composite (owning) reference property.
    pub fn composite(self, name: impl Into<String>, cardinality: Cardinality) -> Self {
        self.property(
            name,
            PropertyKind::Reference { composite: true },
            cardinality,
            true,
        )
    }

    pub fn property(
        mut self,
        name: impl Into<String>,
        kind: PropertyKind,
        cardinality: Cardinality,
        persistent: bool,
    ) -> Self {
        self.properties.push(PropertyDescriptor {
            name: name.into(),
            kind,
            cardinality,
            persistent,
        });
        self
    }

    /// Validates declarations and freezes the descriptor.
    pub fn build(self) -> SchemaResult<Arc<EntityDescriptor>> {
        if !ENTITY_NAME_RE.is_match(self.name.as_str()) {
            return Err(SchemaError::InvalidEntityName(self.name));
        }

        for (index, property) in self.properties.iter().enumerate() {
            if !IDENTIFIER_RE.is_match(property.name.as_str()) {
                return Err(SchemaError::InvalidPropertyName(property.name.clone()));
            }
            if self.properties[..index]
                .iter()
                .any(|earlier| earlier.name == property.name)
            {
                return Err(SchemaError::DuplicateProperty {
                    entity: self.name.clone(),
                    property: property.name.clone(),
                });
            }
        }

        Ok(Arc::new(EntityDescriptor {
            name: self.name,
            properties: self.properties,
        }))
    }
}

/// Name-keyed set of entity descriptors known to one context.
#[derive(Debug, Default, Clone)]
pub struct SchemaRegistry {
    entities: BTreeMap<String, Arc<EntityDescriptor>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one descriptor. Re-registering an identical descriptor is a no-op.
    pub fn register(&mut self, entity: Arc<EntityDescriptor>) -> SchemaResult<()> {
        if let Some(existing) = self.entities.get(entity.name()) {
            if *existing == entity {
                return Ok(());
            }
            return Err(SchemaError::DuplicateEntity(entity.name().to_string()));
        }
        self.entities.insert(entity.name().to_string(), entity);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<EntityDescriptor>> {
        self.entities.get(name)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entities.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{Cardinality, EntityDescriptor, SchemaError, SchemaRegistry, NAME_PROPERTY};

    #[test]
    fn builder_predeclares_name_attribute() {
        let entity = EntityDescriptor::builder("Folder")
            .composite("contents", Cardinality::Ordered)
            .transient_attribute("selection")
            .build()
            .expect("valid descriptor");

        assert_eq!(
            entity.property_names(),
            vec![NAME_PROPERTY, "contents", "selection"]
        );
        assert_eq!(
            entity.persistent_property_names(),
            vec![NAME_PROPERTY, "contents"]
        );
        let contents = entity.property("contents").expect("declared");
        assert!(contents.is_composite());
        assert!(contents.is_ordered());
    }

    #[test]
    fn builder_rejects_duplicate_and_malformed_names() {
        let err = EntityDescriptor::builder("Folder")
            .attribute("name")
            .build()
            .expect_err("duplicate name must fail");
        assert!(matches!(err, SchemaError::DuplicateProperty { .. }));

        let err = EntityDescriptor::builder("Folder")
            .attribute("bad-name")
            .build()
            .expect_err("malformed name must fail");
        assert_eq!(err, SchemaError::InvalidPropertyName("bad-name".to_string()));

        let err = EntityDescriptor::builder("9Folder")
            .build()
            .expect_err("malformed entity must fail");
        assert!(matches!(err, SchemaError::InvalidEntityName(_)));
    }

    #[test]
    fn registry_rejects_conflicting_descriptor() {
        let mut registry = SchemaRegistry::new();
        let first = EntityDescriptor::builder("doc.Item").build().unwrap();
        let conflicting = EntityDescriptor::builder("doc.Item")
            .attribute("title")
            .build()
            .unwrap();

        registry.register(first.clone()).unwrap();
        registry.register(first).expect("identical descriptor is a no-op");
        let err = registry.register(conflicting).unwrap_err();
        assert_eq!(err, SchemaError::DuplicateEntity("doc.Item".to_string()));
        assert_eq!(registry.len(), 1);
    }
}
