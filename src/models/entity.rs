//! In-memory entity records and their EAV properties.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::state::{ArtifactState, ExecutionState};

/// Typed value of a single EAV property row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyValue {
    Int(i64),
    Double(f64),
    String(String),
    Bool(bool),
    Bytes(Vec<u8>),
    /// Serialized protobuf `Any` payload.
    Proto(Vec<u8>),
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: PropertyValue,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Column-backed attributes shared by every family's attribute struct.
pub trait EntityAttributes: Clone + Default + fmt::Debug + Send + Sync + 'static {
    fn name(&self) -> Option<&str>;
    fn external_id(&self) -> Option<&str>;
    fn create_time(&self) -> Option<i64>;
    fn last_update_time(&self) -> Option<i64>;
    fn set_create_time(&mut self, millis: i64);
    fn set_last_update_time(&mut self, millis: i64);
}

/// A persisted (or about to be persisted) entity.
///
/// `id` is `None` until the first save. `custom_properties` set to `None` means
/// the caller did not declare custom properties, so a save leaves the stored
/// ones untouched; `Some` (even empty) makes the given set authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity<A> {
    pub id: Option<i32>,
    pub type_id: i32,
    pub attributes: A,
    pub properties: Vec<Property>,
    pub custom_properties: Option<Vec<Property>>,
}

impl<A: Default> Default for Entity<A> {
    fn default() -> Self {
        Self {
            id: None,
            type_id: 0,
            attributes: A::default(),
            properties: Vec::new(),
            custom_properties: None,
        }
    }
}

impl<A> Entity<A> {
    pub fn new(attributes: A) -> Self {
        Self {
            id: None,
            type_id: 0,
            attributes,
            properties: Vec::new(),
            custom_properties: None,
        }
    }

    pub fn with_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Self {
        self.properties.push(Property::new(name, value));
        self
    }

    pub fn with_custom_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Self {
        self.custom_properties
            .get_or_insert_with(Vec::new)
            .push(Property::new(name, value));
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    pub fn custom_property(&self, name: &str) -> Option<&PropertyValue> {
        self.custom_properties
            .as_deref()
            .and_then(|props| props.iter().find(|p| p.name == name))
            .map(|p| &p.value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextAttributes {
    pub name: String,
    pub external_id: Option<String>,
    pub create_time_since_epoch: Option<i64>,
    pub last_update_time_since_epoch: Option<i64>,
}

impl ContextAttributes {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactAttributes {
    pub name: Option<String>,
    pub uri: Option<String>,
    pub state: Option<ArtifactState>,
    pub external_id: Option<String>,
    pub create_time_since_epoch: Option<i64>,
    pub last_update_time_since_epoch: Option<i64>,
}

impl ArtifactAttributes {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionAttributes {
    pub name: Option<String>,
    pub last_known_state: Option<ExecutionState>,
    pub external_id: Option<String>,
    pub create_time_since_epoch: Option<i64>,
    pub last_update_time_since_epoch: Option<i64>,
}

impl ExecutionAttributes {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }
}

macro_rules! impl_entity_attributes {
    ($ty:ty, |$this:ident| $name:expr) => {
        impl EntityAttributes for $ty {
            fn name(&self) -> Option<&str> {
                let $this = self;
                $name
            }

            fn external_id(&self) -> Option<&str> {
                self.external_id.as_deref()
            }

            fn create_time(&self) -> Option<i64> {
                self.create_time_since_epoch
            }

            fn last_update_time(&self) -> Option<i64> {
                self.last_update_time_since_epoch
            }

            fn set_create_time(&mut self, millis: i64) {
                self.create_time_since_epoch = Some(millis);
            }

            fn set_last_update_time(&mut self, millis: i64) {
                self.last_update_time_since_epoch = Some(millis);
            }
        }
    };
}

impl_entity_attributes!(ContextAttributes, |this| Some(this.name.as_str()));
impl_entity_attributes!(ArtifactAttributes, |this| this.name.as_deref());
impl_entity_attributes!(ExecutionAttributes, |this| this.name.as_deref());

pub type Context = Entity<ContextAttributes>;
pub type Artifact = Entity<ArtifactAttributes>;
pub type Execution = Entity<ExecutionAttributes>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_properties_are_undeclared_until_added() {
        let ctx = Context::new(ContextAttributes::named("mnist"));
        assert!(ctx.custom_properties.is_none());

        let ctx = ctx
            .with_property("description", "digits")
            .with_custom_property("epochs", 10_i64);
        assert_eq!(ctx.property("description"), Some(&PropertyValue::from("digits")));
        assert_eq!(ctx.custom_property("epochs"), Some(&PropertyValue::Int(10)));
        assert_eq!(ctx.attributes.name(), Some("mnist"));
    }

    #[test]
    fn timestamps_are_settable_through_trait() {
        let mut attrs = ArtifactAttributes::named("weights");
        assert_eq!(attrs.create_time(), None);
        attrs.set_create_time(5);
        attrs.set_last_update_time(6);
        assert_eq!(attrs.create_time(), Some(5));
        assert_eq!(attrs.last_update_time(), Some(6));
    }
}
