//! Declarative field metadata.
//!
//! Each field carries a small static [`FieldInfo`] describing how it is used
//! outside the job table: whether it is handed to the pipeline, under which
//! name, whether the engine may overwrite it, and under which key it shows up
//! in result files. A [`FieldTable`] is the union of the declarations of the
//! groups a job variant is composed from. Parameter maps, the updatable set
//! and result-key translation are all derived from it.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::{Map, Value};

use super::FieldKind;

/// Metadata vocabulary attached to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoKey {
    /// Field feeds the pipeline's parameter file.
    IsParameter,
    /// External parameter name, when it differs from the field name.
    ParameterKey,
    /// Field may be overwritten by the engine after creation.
    IsUpdatable,
    /// Result-file key mapping to this field, when it differs from the field name.
    ResultKey,
    /// Field is a sequence filter folded into the composite `filter` list.
    IsFilter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldInfo {
    pub is_parameter: bool,
    pub parameter_key: Option<&'static str>,
    pub is_updatable: bool,
    pub result_key: Option<&'static str>,
    pub is_filter: bool,
}

impl FieldInfo {
    const NONE: FieldInfo = FieldInfo {
        is_parameter: false,
        parameter_key: None,
        is_updatable: false,
        result_key: None,
        is_filter: false,
    };

    /// Whether the given key is set on this field.
    pub fn has(&self, key: InfoKey) -> bool {
        match key {
            InfoKey::IsParameter => self.is_parameter,
            InfoKey::ParameterKey => self.parameter_key.is_some(),
            InfoKey::IsUpdatable => self.is_updatable,
            InfoKey::ResultKey => self.result_key.is_some(),
            InfoKey::IsFilter => self.is_filter,
        }
    }
}

/// Static declaration of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub info: FieldInfo,
}

impl FieldSpec {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            info: FieldInfo::NONE,
        }
    }

    pub const fn parameter(mut self) -> Self {
        self.info.is_parameter = true;
        self
    }

    pub const fn parameter_key(mut self, key: &'static str) -> Self {
        self.info.is_parameter = true;
        self.info.parameter_key = Some(key);
        self
    }

    pub const fn updatable(mut self) -> Self {
        self.info.is_updatable = true;
        self
    }

    pub const fn result_key(mut self, key: &'static str) -> Self {
        self.info.is_updatable = true;
        self.info.result_key = Some(key);
        self
    }

    /// Filters reach the pipeline through the parameter map, so this also
    /// marks the field as a parameter.
    pub const fn filter(mut self) -> Self {
        self.info.is_parameter = true;
        self.info.is_filter = true;
        self
    }

    /// Name used in the parameter file.
    pub fn external_parameter_name(&self) -> &'static str {
        self.info.parameter_key.unwrap_or(self.name)
    }

    /// Key used in result files.
    pub fn external_result_name(&self) -> &'static str {
        self.info.result_key.unwrap_or(self.name)
    }
}

/// A named, reusable set of field declarations.
#[derive(Debug)]
pub struct FieldGroup {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

/// Ordered union of field declarations for one job variant.
#[derive(Debug)]
pub struct FieldTable {
    fields: Vec<FieldSpec>,
    index: HashMap<&'static str, usize>,
}

impl FieldTable {
    /// Builds a table from groups in order. A field declared by several
    /// groups refers to the same column; the first declaration is kept.
    pub fn from_groups(groups: &[&FieldGroup]) -> Self {
        let mut fields = Vec::new();
        let mut index = HashMap::new();
        for group in groups {
            for spec in group.fields {
                if index.contains_key(spec.name) {
                    continue;
                }
                index.insert(spec.name, fields.len());
                fields.push(*spec);
            }
        }
        Self { fields, index }
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter()
    }

    /// Fields with the given metadata key set, in declaration order.
    pub fn fields_with(&self, key: InfoKey) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(move |f| f.info.has(key))
    }

    pub fn is_updatable(&self, name: &str) -> bool {
        self.get(name).is_some_and(|f| f.info.is_updatable)
    }

    /// Names of every field the engine may overwrite.
    pub fn updatable_fields(&self) -> BTreeSet<&'static str> {
        self.fields_with(InfoKey::IsUpdatable).map(|f| f.name).collect()
    }

    /// External result key -> field name, for every updatable field.
    pub fn result_key_map(&self) -> BTreeMap<&'static str, &'static str> {
        self.fields_with(InfoKey::IsUpdatable)
            .map(|f| (f.external_result_name(), f.name))
            .collect()
    }

    /// Names of the fields folded into the composite `filter` parameter.
    pub fn filter_fields(&self) -> Vec<&'static str> {
        self.fields_with(InfoKey::IsFilter).map(|f| f.name).collect()
    }

    /// Moves every filter field out of `params` into a single `filter` list of
    /// `"name=value"` strings. Null values are dropped. The list is always
    /// present, even when empty.
    pub fn fold_filters(&self, params: &mut Map<String, Value>) {
        let mut filter = Vec::new();
        for spec in self.fields_with(InfoKey::IsFilter) {
            let key = spec.external_parameter_name();
            match params.remove(key) {
                None | Some(Value::Null) => {}
                Some(Value::String(s)) => filter.push(Value::String(format!("{}={}", key, s))),
                Some(other) => filter.push(Value::String(format!("{}={}", key, other))),
            }
        }
        params.insert("filter".to_string(), Value::Array(filter));
    }
}
