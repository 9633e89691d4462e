//! Caches of remote metadata used while executing a plan.

use std::collections::HashMap;

use catbridge_catalog::{RemoteAttribute, RemoteAttributeValue, RemoteUnit, normalize_name};
use catbridge_core::RemoteId;

use crate::task::{MigrationTask, TaskPayload, TaskStatus};

/// Remote attributes, values and units keyed by remote identity.
///
/// Attributes are keyed by normalized name, values by
/// `(attribute_id, normalized name)`. Not persisted: rebuilt from the remote
/// plus the successful tasks of the current plan.
#[derive(Debug, Clone, Default)]
pub struct RemoteCaches {
    attributes: HashMap<String, RemoteAttribute>,
    values: HashMap<(RemoteId, String), RemoteAttributeValue>,
    units: Vec<RemoteUnit>,
    template_names: Vec<String>,
    loaded: bool,
}

impl RemoteCaches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything with a fresh remote snapshot.
    pub fn prime(
        &mut self,
        attributes: Vec<RemoteAttribute>,
        values: Vec<RemoteAttributeValue>,
        units: Vec<RemoteUnit>,
    ) {
        self.attributes.clear();
        self.values.clear();
        for attribute in attributes {
            self.insert_attribute(attribute);
        }
        for value in values {
            self.insert_value(value);
        }
        self.units = units;
        self.loaded = true;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn insert_attribute(&mut self, attribute: RemoteAttribute) {
        self.attributes
            .insert(normalize_name(&attribute.name), attribute);
    }

    pub fn find_attribute(&self, name: &str) -> Option<&RemoteAttribute> {
        self.attributes.get(&normalize_name(name))
    }

    pub fn insert_value(&mut self, value: RemoteAttributeValue) {
        self.values
            .insert((value.attribute_id, normalize_name(&value.name)), value);
    }

    pub fn find_value(&self, attribute_id: RemoteId, name: &str) -> Option<&RemoteAttributeValue> {
        self.values.get(&(attribute_id, normalize_name(name)))
    }

    pub fn insert_unit(&mut self, unit: RemoteUnit) {
        match self.units.iter_mut().find(|u| u.id == unit.id) {
            Some(existing) => *existing = unit,
            None => self.units.push(unit),
        }
    }

    pub fn units(&self) -> &[RemoteUnit] {
        &self.units
    }

    pub fn attributes(&self) -> Vec<RemoteAttribute> {
        self.attributes.values().cloned().collect()
    }

    pub fn values(&self) -> Vec<RemoteAttributeValue> {
        self.values.values().cloned().collect()
    }

    pub fn set_template_names(&mut self, names: Vec<String>) {
        self.template_names = names;
    }

    pub fn template_names(&self) -> &[String] {
        &self.template_names
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    /// Add entities created by successful tasks of a persisted plan.
    ///
    /// Entries already known from the remote are kept as they are.
    pub fn overlay_completed(&mut self, tasks: &[MigrationTask]) {
        for task in tasks {
            if task.status != TaskStatus::Success {
                continue;
            }
            let Some(id) = task.remote_id else {
                continue;
            };

            match &task.data {
                TaskPayload::Attribute { name } => {
                    if self.find_attribute(name).is_none() {
                        self.insert_attribute(RemoteAttribute {
                            id,
                            name: name.clone(),
                        });
                    }
                }
                TaskPayload::Value { attribute, value } => {
                    let Some(attribute_id) = self.find_attribute(attribute).map(|a| a.id) else {
                        continue;
                    };
                    if self.find_value(attribute_id, value).is_none() {
                        self.insert_value(RemoteAttributeValue {
                            id,
                            name: value.clone(),
                            attribute_id,
                        });
                    }
                }
                TaskPayload::Template { .. } => {}
            }
        }
    }
}
