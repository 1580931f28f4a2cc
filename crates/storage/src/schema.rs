//! Explicit schema descriptors.
//!
//! A [`Schema`] maps field names to a kind, an optional default and a
//! transient flag, plus an optional validity predicate evaluated against the
//! documents already stored in the table. Tables use it to construct
//! documents from loosely-shaped candidates.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::document::{Document, ID_FIELD};
use crate::{Error, Result};

/// Type tag of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Auto-incremented identity, assigned by the owning table.
    Id,
    Integer,
    Number,
    String,
    Boolean,
    Array,
    Object,
    /// RFC 3339 timestamp stored as a string.
    Date,
}

impl FieldKind {
    /// Whether `value` is acceptable for this kind. `null` is accepted for
    /// everything but ids.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (FieldKind::Id, v) => v.as_u64().is_some(),
            (_, Value::Null) => true,
            (FieldKind::Integer, v) => v.is_i64() || v.is_u64(),
            (FieldKind::Number, v) => v.is_number(),
            (FieldKind::String, v) => v.is_string(),
            (FieldKind::Boolean, v) => v.is_boolean(),
            (FieldKind::Array, v) => v.is_array(),
            (FieldKind::Object, v) => v.is_object(),
            (FieldKind::Date, Value::String(s)) => DateTime::parse_from_rfc3339(s).is_ok(),
            (FieldKind::Date, _) => false,
        }
    }
}

/// Built-in default generators usable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Generator {
    /// Current time as an RFC 3339 string.
    Now,
    /// Random 32 hex character token.
    Token,
    EmptyArray,
    EmptyObject,
    Null,
}

impl Generator {
    pub fn generate(self) -> Value {
        match self {
            Generator::Now => Value::String(Utc::now().to_rfc3339()),
            Generator::Token => Value::String(Uuid::new_v4().simple().to_string()),
            Generator::EmptyArray => Value::Array(Vec::new()),
            Generator::EmptyObject => Value::Object(Default::default()),
            Generator::Null => Value::Null,
        }
    }
}

type Factory = Arc<dyn Fn() -> Value + Send + Sync>;

/// How a missing field gets its value at construction time.
#[derive(Clone)]
pub enum DefaultValue {
    Literal(Value),
    Generate(Generator),
    Factory(Factory),
}

impl DefaultValue {
    pub fn factory(f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        DefaultValue::Factory(Arc::new(f))
    }

    fn produce(&self) -> Value {
        match self {
            DefaultValue::Literal(v) => v.clone(),
            DefaultValue::Generate(g) => g.generate(),
            DefaultValue::Factory(f) => f(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Literal(v) => write!(f, "Literal({v})"),
            DefaultValue::Generate(g) => write!(f, "Generate({g:?})"),
            DefaultValue::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// One column of a schema.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    pub default: Option<DefaultValue>,
    /// Kept in memory only, stripped before persisting.
    pub transient: bool,
}

/// Validity predicate: candidate document and the table's current contents.
pub type Validity = Arc<dyn Fn(&Document, &[Document]) -> bool + Send + Sync>;

/// A named document shape.
#[derive(Clone)]
pub struct Schema {
    name: String,
    fields: Vec<Field>,
    validity: Option<Validity>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("validity", &self.validity.is_some())
            .finish()
    }
}

impl Schema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            fields: Vec::new(),
            validity: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether documents of this schema carry an auto-incremented id.
    pub fn has_id(&self) -> bool {
        self.fields.iter().any(|f| f.kind == FieldKind::Id)
    }

    /// Shape a candidate into a document of this schema.
    ///
    /// Undeclared fields are dropped, missing fields receive their default
    /// (or `null`), and the id is left unset for the table to assign. Returns
    /// `None` when a supplied value has the wrong kind.
    pub fn conform(&self, candidate: &Document) -> Option<Document> {
        let mut doc = Document::new();
        for field in &self.fields {
            if field.kind == FieldKind::Id {
                continue;
            }
            match candidate.get(&field.name) {
                Some(value) if field.kind.accepts(value) => {
                    doc.insert(field.name.clone(), value.clone());
                }
                Some(_) => return None,
                None => {
                    doc.insert(field.name.clone(), self.default_for(field));
                }
            }
        }
        Some(doc)
    }

    /// Rebuild a persisted document, filling fields that were stripped or
    /// added to the schema since it was written. Ids are kept as stored.
    pub fn restore(&self, stored: &Document) -> Document {
        let mut doc = Document::new();
        for field in &self.fields {
            let value = match stored.get(&field.name) {
                Some(value) if field.kind.accepts(value) => value.clone(),
                _ if field.kind == FieldKind::Id => continue,
                _ => self.default_for(field),
            };
            doc.insert(field.name.clone(), value);
        }
        doc
    }

    /// Copy of `doc` without transient fields.
    pub fn persisted(&self, doc: &Document) -> Document {
        let mut out = doc.clone();
        for field in self.fields.iter().filter(|f| f.transient) {
            out.remove(&field.name);
        }
        out
    }

    pub fn is_valid(&self, candidate: &Document, existing: &[Document]) -> bool {
        self.validity
            .as_ref()
            .is_none_or(|check| check(candidate, existing))
    }

    fn default_for(&self, field: &Field) -> Value {
        field
            .default
            .as_ref()
            .map(DefaultValue::produce)
            .unwrap_or(Value::Null)
    }
}

/// Fluent constructor for [`Schema`].
pub struct SchemaBuilder {
    name: String,
    fields: Vec<Field>,
    validity: Option<Validity>,
}

impl SchemaBuilder {
    /// Add the auto-incremented `id` field.
    pub fn id(self) -> Self {
        self.push(ID_FIELD, FieldKind::Id, None, false)
    }

    pub fn field(self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.push(name, kind, None, false)
    }

    pub fn field_or(self, name: impl Into<String>, kind: FieldKind, default: DefaultValue) -> Self {
        self.push(name, kind, Some(default), false)
    }

    pub fn transient(self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.push(name, kind, None, true)
    }

    /// Reject candidates whose values for `fields` equal those of an
    /// existing document. `null` compares equal to `null`.
    pub fn unique(mut self, fields: &[&str]) -> Self {
        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        self.validity = Some(Arc::new(move |candidate, existing| {
            let key = |doc: &Document| {
                fields
                    .iter()
                    .map(|f| doc.get(f).cloned().unwrap_or(Value::Null))
                    .collect::<Vec<_>>()
            };
            let wanted = key(candidate);
            !existing.iter().any(|doc| key(doc) == wanted)
        }));
        self
    }

    pub fn validity(
        mut self,
        check: impl Fn(&Document, &[Document]) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.validity = Some(Arc::new(check));
        self
    }

    pub fn build(self) -> Schema {
        Schema {
            name: self.name,
            fields: self.fields,
            validity: self.validity,
        }
    }

    fn push(
        mut self,
        name: impl Into<String>,
        kind: FieldKind,
        default: Option<DefaultValue>,
        transient: bool,
    ) -> Self {
        let name = name.into();
        self.fields.retain(|f| f.name != name);
        self.fields.push(Field {
            name,
            kind,
            default,
            transient,
        });
        self
    }
}

/// Schemas known to a store, looked up case-insensitively by name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<Schema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: Schema) -> &mut Self {
        self.schemas
            .insert(schema.name().to_lowercase(), Arc::new(schema));
        self
    }

    pub fn with(mut self, schema: Schema) -> Self {
        self.register(schema);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<Schema>> {
        self.schemas.get(&name.to_lowercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(&name.to_lowercase())
    }
}

/// Schema declaration as it appears in configuration files.
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaDecl {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
    /// Field tuple that must be unique across the table.
    #[serde(default)]
    pub unique: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub generate: Option<Generator>,
    #[serde(default)]
    pub transient: bool,
}

impl TryFrom<SchemaDecl> for Schema {
    type Error = Error;

    fn try_from(decl: SchemaDecl) -> Result<Self> {
        if decl.name.trim().is_empty() {
            return Err(Error::InvalidSchema("schema name is empty".to_string()));
        }
        let mut builder = Schema::builder(&decl.name);
        for field in &decl.fields {
            if builder.fields.iter().any(|f| f.name == field.name) {
                return Err(Error::InvalidSchema(format!(
                    "{}: duplicate field '{}'",
                    decl.name, field.name
                )));
            }
            let default = match (&field.default, field.generate) {
                (Some(_), Some(_)) => {
                    return Err(Error::InvalidSchema(format!(
                        "{}.{}: set either default or generate, not both",
                        decl.name, field.name
                    )));
                }
                (Some(value), None) => Some(DefaultValue::Literal(value.clone())),
                (None, Some(generator)) => Some(DefaultValue::Generate(generator)),
                (None, None) => None,
            };
            builder = builder.push(&field.name, field.kind, default, field.transient);
        }
        if let Some(missing) = decl
            .unique
            .iter()
            .find(|u| !builder.fields.iter().any(|f| &f.name == *u))
        {
            return Err(Error::InvalidSchema(format!(
                "{}: unique key references unknown field '{missing}'",
                decl.name
            )));
        }
        if !decl.unique.is_empty() {
            let unique: Vec<&str> = decl.unique.iter().map(String::as_str).collect();
            builder = builder.unique(&unique);
        }
        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn widget() -> Schema {
        Schema::builder("Widget")
            .id()
            .field("name", FieldKind::String)
            .field_or("tags", FieldKind::Array, DefaultValue::Generate(Generator::EmptyArray))
            .transient("online", FieldKind::Boolean)
            .unique(&["name"])
            .build()
    }

    #[test]
    fn test_conform_fills_defaults_and_drops_unknown() {
        let candidate = Document::new().with("name", "a").with("color", "red");
        let doc = widget().conform(&candidate).unwrap();
        assert_eq!(doc.get("tags"), Some(&json!([])));
        assert_eq!(doc.get("online"), Some(&Value::Null));
        assert!(!doc.contains("color"));
        assert!(doc.id().is_none());
    }

    #[test]
    fn test_conform_rejects_wrong_kind() {
        let candidate = Document::new().with("name", 12);
        assert!(widget().conform(&candidate).is_none());
    }

    #[test]
    fn test_unique_treats_null_as_equal() {
        let schema = Schema::builder("Pair")
            .field("name", FieldKind::String)
            .field("domain", FieldKind::String)
            .unique(&["name", "domain"])
            .build();
        let existing = vec![Document::new().with("name", "x").with("domain", Value::Null)];
        let same = Document::new().with("name", "x").with("domain", Value::Null);
        let other = Document::new().with("name", "x").with("domain", "shop");
        assert!(!schema.is_valid(&same, &existing));
        assert!(schema.is_valid(&other, &existing));
    }

    #[test]
    fn test_persisted_strips_transient() {
        let doc = Document::new().with("name", "a").with("online", true);
        let stored = widget().persisted(&doc);
        assert!(!stored.contains("online"));
        assert!(stored.contains("name"));
    }

    #[test]
    fn test_date_kind_requires_rfc3339() {
        assert!(FieldKind::Date.accepts(&json!("2024-05-01T10:00:00Z")));
        assert!(!FieldKind::Date.accepts(&json!("yesterday")));
        assert!(FieldKind::Date.accepts(&Generator::Now.generate()));
    }

    #[test]
    fn test_registry_is_case_insensitive() {
        let registry = SchemaRegistry::new().with(widget());
        assert!(registry.get("widget").is_some());
        assert!(registry.contains("WIDGET"));
        assert!(registry.get("gadget").is_none());
    }

    #[test]
    fn test_decl_from_toml() {
        let decl: SchemaDecl = toml::from_str(
            r#"
name = "Token"
unique = ["token"]

[[fields]]
name = "id"
kind = "id"

[[fields]]
name = "token"
kind = "string"
generate = "token"

[[fields]]
name = "uses"
kind = "integer"
default = 0
"#,
        )
        .unwrap();
        let schema = Schema::try_from(decl).unwrap();
        assert!(schema.has_id());
        let doc = schema.conform(&Document::new()).unwrap();
        assert_eq!(doc.get_str("token").map(str::len), Some(32));
        assert_eq!(doc.get("uses"), Some(&json!(0)));
    }

    #[test]
    fn test_decl_rejects_unknown_unique_field() {
        let decl = SchemaDecl {
            name: "Broken".to_string(),
            fields: vec![],
            unique: vec!["missing".to_string()],
        };
        assert!(matches!(Schema::try_from(decl), Err(Error::InvalidSchema(_))));
    }
}
