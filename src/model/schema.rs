use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::Document;

/// Declared type of a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    ObjectId,
    Array,
    Object,
    Mixed,
}

/// Name/type pair declaring a field that request bodies may set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub unique: bool,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Ordered set of field descriptors
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<FieldDescriptor>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field. Redeclaring a name replaces the earlier descriptor in place.
    pub fn field(self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.with(FieldDescriptor::new(name, field_type))
    }

    pub fn unique_field(self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.with(FieldDescriptor::new(name, field_type).unique())
    }

    pub fn with(mut self, descriptor: FieldDescriptor) -> Self {
        match self.fields.iter_mut().find(|f| f.name == descriptor.name) {
            Some(existing) => *existing = descriptor,
            None => self.fields.push(descriptor),
        }
        self
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn unique_fields(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.unique)
            .map(|f| f.name.clone())
            .collect()
    }

    /// Copy every body key that is a declared field onto `target`.
    ///
    /// Values are copied verbatim; declared fields missing from the body are
    /// left as they are on `target`.
    pub fn copy_declared(&self, target: &mut Document, body: &Document) {
        for field in &self.fields {
            if let Some(value) = body.get(&field.name) {
                target.insert(field.name.clone(), value.clone());
            }
        }
    }

    /// Fresh document carrying only the declared fields present in `body`
    pub fn instantiate(&self, body: &Document) -> Document {
        let mut doc = Document::new();
        self.copy_declared(&mut doc, body);
        doc
    }
}

/// Reduce a JSON body to an object; non-object bodies carry no fields
pub fn body_fields(body: Value) -> Document {
    match body {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}
