//! Schemas: named field sets plus query configuration.
//!
//! A schema is built once, wrapped in an `Arc`, and shared by every
//! record and query that uses it. The builder checks everything up front
//! so a built schema can be trusted at access time: paths parse, field
//! names are unique, finder templates have one placeholder per argument.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Error;
use crate::field::{FieldDecl, FieldSpec};
use crate::record::Record;

/// How query responses for a schema are encoded on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Payload {
    Xml,
    Json,
}

/// A registered finder: a URL template and the substitution order of its
/// argument names (declaration order, not sorted order).
#[derive(Clone, Debug)]
pub(crate) struct Finder {
    pub(crate) template: String,
    pub(crate) arg_order: Vec<String>,
}

/// Validation hook run whenever a record of this schema is constructed.
pub type Validator = Arc<dyn Fn(&Record) -> Result<(), String> + Send + Sync>;

/// A built, immutable schema.
pub struct Schema {
    name: String,
    namespace: Option<String>,
    collection_node: Option<String>,
    payload: Payload,
    fields: Vec<FieldSpec>,
    index: HashMap<String, usize>,
    finders: HashMap<Vec<String>, Finder>,
    headers: HashMap<String, String>,
    validator: Option<Validator>,
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("fields", &self.fields.len())
            .field("finders", &self.finders.len())
            .finish()
    }
}

impl Schema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            namespace: None,
            collection_node: None,
            payload: Payload::Xml,
            fields: Vec::new(),
            finders: Vec::new(),
            headers: HashMap::new(),
            validator: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Tag that wraps the repeated record elements in collection
    /// responses, if responses are wrapped.
    pub fn collection_node(&self) -> Option<&str> {
        self.collection_node.as_deref()
    }

    pub fn payload(&self) -> Payload {
        self.payload
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub(crate) fn index_of(&self, name: &str) -> Result<usize, Error> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownField {
                name: name.to_string(),
            })
    }

    pub(crate) fn field_at(&self, index: usize) -> &FieldSpec {
        &self.fields[index]
    }

    /// Look up the finder registered for this sorted set of argument
    /// names.
    pub(crate) fn finder(&self, key: &[String]) -> Option<&Finder> {
        self.finders.get(key)
    }

    pub(crate) fn validator(&self) -> Option<&Validator> {
        self.validator.as_ref()
    }
}

/// Collects declarations, then validates the lot in [`SchemaBuilder::build`].
pub struct SchemaBuilder {
    name: String,
    namespace: Option<String>,
    collection_node: Option<String>,
    payload: Payload,
    fields: Vec<(String, FieldDecl)>,
    finders: Vec<(Vec<String>, String)>,
    headers: HashMap<String, String>,
    validator: Option<Validator>,
}

impl SchemaBuilder {
    /// Default namespace the source documents declare. Matching is by
    /// local name either way; this is carried for callers that need it.
    pub fn namespace(mut self, uri: impl Into<String>) -> Self {
        self.namespace = Some(uri.into());
        self
    }

    /// Tag wrapping the repeated elements in collection responses.
    pub fn collection_node(mut self, tag: impl Into<String>) -> Self {
        self.collection_node = Some(tag.into());
        self
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn field(mut self, name: impl Into<String>, decl: FieldDecl) -> Self {
        self.fields.push((name.into(), decl));
        self
    }

    /// Register a URL template for a set of filter argument names. The
    /// template holds one `%s` per argument; values substitute in the
    /// order the names are given here, while lookup is by the sorted
    /// name set.
    pub fn finder(mut self, args: &[&str], template: impl Into<String>) -> Self {
        self.finders.push((
            args.iter().map(|s| s.to_string()).collect(),
            template.into(),
        ));
        self
    }

    /// Header sent with every fetch for this schema.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Hook run after each record construction, before the record is
    /// handed out.
    pub fn validate_with<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Record) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Result<Arc<Schema>, Error> {
        let mut fields = Vec::with_capacity(self.fields.len());
        let mut index = HashMap::with_capacity(self.fields.len());
        for (name, decl) in self.fields {
            if index.contains_key(&name) {
                return Err(Error::Construction {
                    message: format!("duplicate field '{}'", name),
                });
            }
            index.insert(name.clone(), fields.len());
            fields.push(FieldSpec::build(&name, decl)?);
        }

        let mut finders = HashMap::with_capacity(self.finders.len());
        for (arg_order, template) in self.finders {
            let placeholders = template.matches("%s").count();
            if placeholders != arg_order.len() {
                return Err(Error::Construction {
                    message: format!(
                        "finder '{}' has {} placeholders for {} arguments",
                        template,
                        placeholders,
                        arg_order.len()
                    ),
                });
            }
            let mut key = arg_order.clone();
            key.sort();
            key.dedup();
            if key.len() != arg_order.len() {
                return Err(Error::Construction {
                    message: format!("finder '{}' repeats an argument name", template),
                });
            }
            if finders
                .insert(key.clone(), Finder { template, arg_order })
                .is_some()
            {
                return Err(Error::Construction {
                    message: format!("duplicate finder for argument names {:?}", key),
                });
            }
        }

        Ok(Arc::new(Schema {
            name: self.name,
            namespace: self.namespace,
            collection_node: self.collection_node,
            payload: self.payload,
            fields,
            index,
            finders,
            headers: self.headers,
            validator: self.validator,
        }))
    }
}

/// Substitute values into a `%s` template, first value at the first
/// placeholder. Counts were checked at build time.
pub(crate) fn substitute(template: &str, values: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut parts = template.split("%s");
    if let Some(first) = parts.next() {
        out.push_str(first);
    }
    let mut values = values.iter();
    for part in parts {
        if let Some(value) = values.next() {
            out.push_str(value);
        }
        out.push_str(part);
    }
    out
}
