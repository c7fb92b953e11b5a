//! Records: lazily-decoded views over one XML document.
//!
//! A record keeps its source text and parses it at most once, on the
//! first field access. Decoded values are cached per field; `set`
//! overwrites the cache entry and the tree is only touched again when the
//! record is serialized back out. Records are single-owner values, but
//! they also sit inside schema field defaults, so the caches are behind
//! locks and a record can cross threads with the schema that holds it.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use xmlrecord_tree::Document;

use crate::error::Error;
use crate::schema::Schema;
use crate::value::Value;

#[derive(Clone, Debug, PartialEq)]
enum DocState {
    Unparsed,
    Ready(Document),
    Failed(String),
}

/// One record bound to a schema.
#[derive(Debug)]
pub struct Record {
    schema: Arc<Schema>,
    source: Option<String>,
    synthetic: bool,
    state: Mutex<DocState>,
    cache: Mutex<BTreeMap<usize, Value>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Record {
    /// A fresh record with no source document. Serialization starts from
    /// a placeholder root that is unwrapped if the written fields leave a
    /// single element under it.
    pub fn new(schema: Arc<Schema>) -> Result<Self, Error> {
        Record::construct(schema, None, true, DocState::Unparsed)
    }

    /// A record over serialized XML text. Parsing happens on first field
    /// access; a parse failure surfaces there and is not retried.
    pub fn from_xml(schema: Arc<Schema>, xml: impl Into<String>) -> Result<Self, Error> {
        Record::construct(schema, Some(xml.into()), false, DocState::Unparsed)
    }

    /// A record over an already-parsed element, as produced for nested
    /// bindings and collection elements.
    pub fn from_element(schema: Arc<Schema>, element: xmlrecord_tree::Element) -> Result<Self, Error> {
        Record::construct(
            schema,
            None,
            false,
            DocState::Ready(Document::from_root(element)),
        )
    }

    fn construct(
        schema: Arc<Schema>,
        source: Option<String>,
        synthetic: bool,
        state: DocState,
    ) -> Result<Self, Error> {
        let record = Record {
            schema,
            source,
            synthetic,
            state: Mutex::new(state),
            cache: Mutex::new(BTreeMap::new()),
        };
        if let Some(hook) = record.schema.validator() {
            hook(&record).map_err(|message| Error::Validation { message })?;
        }
        Ok(record)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The source text this record was built from, if any.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub(crate) fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    /// Decode a field, from cache when it was read or written before.
    ///
    /// The cache is a snapshot: once a field has been read, later tree
    /// mutations do not show through it.
    pub fn get(&self, field: &str) -> Result<Value, Error> {
        let index = self.schema.index_of(field)?;
        if let Some(value) = lock(&self.cache).get(&index) {
            return Ok(value.clone());
        }
        let spec = self.schema.field_at(index);
        let value = self.with_document(|doc| spec.decode(doc.root()))?;
        lock(&self.cache).insert(index, value.clone());
        Ok(value)
    }

    /// Overwrite a field's cached value. The tree is not touched until
    /// serialization.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<(), Error> {
        let index = self.schema.index_of(field)?;
        lock(&self.cache).insert(index, value.into());
        Ok(())
    }

    pub fn get_str(&self, field: &str) -> Result<Option<String>, Error> {
        match self.get(field)? {
            Value::Null => Ok(None),
            Value::Str(s) => Ok(Some(s)),
            other => Err(mismatch("string", &other)),
        }
    }

    pub fn get_int(&self, field: &str) -> Result<Option<i64>, Error> {
        match self.get(field)? {
            Value::Null => Ok(None),
            Value::Int(i) => Ok(Some(i)),
            other => Err(mismatch("integer", &other)),
        }
    }

    pub fn get_float(&self, field: &str) -> Result<Option<f64>, Error> {
        match self.get(field)? {
            Value::Null => Ok(None),
            Value::Float(f) => Ok(Some(f)),
            other => Err(mismatch("float", &other)),
        }
    }

    pub fn get_bool(&self, field: &str) -> Result<Option<bool>, Error> {
        match self.get(field)? {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(b)),
            other => Err(mismatch("boolean", &other)),
        }
    }

    pub fn get_datetime(
        &self,
        field: &str,
    ) -> Result<Option<chrono::DateTime<chrono::FixedOffset>>, Error> {
        match self.get(field)? {
            Value::Null => Ok(None),
            Value::DateTime(d) => Ok(Some(d)),
            other => Err(mismatch("datetime", &other)),
        }
    }

    pub fn get_list(&self, field: &str) -> Result<Vec<Value>, Error> {
        match self.get(field)? {
            Value::Null => Ok(Vec::new()),
            Value::List(items) => Ok(items),
            other => Err(mismatch("list", &other)),
        }
    }

    pub fn get_record(&self, field: &str) -> Result<Option<Record>, Error> {
        match self.get(field)? {
            Value::Null => Ok(None),
            Value::Record(r) => Ok(Some(r)),
            other => Err(mismatch("record", &other)),
        }
    }

    /// Cached field values in declaration order. This is what write-back
    /// serialization replays onto the tree.
    pub(crate) fn cached(&self) -> Vec<(usize, Value)> {
        lock(&self.cache)
            .iter()
            .map(|(&i, v)| (i, v.clone()))
            .collect()
    }

    pub(crate) fn with_document<T>(
        &self,
        f: impl FnOnce(&Document) -> Result<T, Error>,
    ) -> Result<T, Error> {
        self.ensure_parsed()?;
        let state = lock(&self.state);
        match &*state {
            DocState::Ready(doc) => f(doc),
            DocState::Unparsed | DocState::Failed(_) => Err(Error::Tree(
                xmlrecord_tree::Error::Malformed("document unavailable".to_string()),
            )),
        }
    }

    fn ensure_parsed(&self) -> Result<(), Error> {
        let unparsed = matches!(&*lock(&self.state), DocState::Unparsed);
        if unparsed {
            let text = self.source.as_deref().unwrap_or("<x/>");
            log::trace!("parsing source document for '{}'", self.schema.name());
            let next = match Document::parse(text) {
                Ok(doc) => DocState::Ready(doc),
                Err(e) => DocState::Failed(e.to_string()),
            };
            *lock(&self.state) = next;
        }
        match &*lock(&self.state) {
            DocState::Failed(message) => Err(Error::Tree(xmlrecord_tree::Error::Malformed(
                message.clone(),
            ))),
            _ => Ok(()),
        }
    }
}

impl Clone for Record {
    fn clone(&self) -> Self {
        Record {
            schema: self.schema.clone(),
            source: self.source.clone(),
            synthetic: self.synthetic,
            state: Mutex::new(lock(&self.state).clone()),
            cache: Mutex::new(lock(&self.cache).clone()),
        }
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        Arc::ptr_eq(&self.schema, &other.schema)
            && self.source == other.source
            && *lock(&self.state) == *lock(&other.state)
            && *lock(&self.cache) == *lock(&other.cache)
    }
}

fn mismatch(expected: &'static str, found: &Value) -> Error {
    Error::TypeMismatch {
        expected,
        found: found.kind_name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{ElementKind, FieldDecl};
    use crate::schema::Schema;

    fn muppet_schema() -> Arc<Schema> {
        Schema::builder("Muppet")
            .field("name", FieldDecl::char("/root/kiddie/value"))
            .field("age", FieldDecl::int("/root/kiddie/age"))
            .field(
                "nicknames",
                FieldDecl::collection("/root/kiddie/nick", ElementKind::Char),
            )
            .build()
            .unwrap()
    }

    const XML: &str =
        "<root><kiddie><value>Gonzo</value><age>3</age><nick>Weirdo</nick></kiddie></root>";

    #[test]
    fn fields_decode_lazily_and_cache() {
        let record = Record::from_xml(muppet_schema(), XML).unwrap();
        assert_eq!(record.get_str("name").unwrap().as_deref(), Some("Gonzo"));
        assert_eq!(record.get_int("age").unwrap(), Some(3));
        // Second read comes from the cache and stays identical.
        assert_eq!(record.get_str("name").unwrap().as_deref(), Some("Gonzo"));
    }

    #[test]
    fn set_overwrites_the_cached_value() {
        let mut record = Record::from_xml(muppet_schema(), XML).unwrap();
        record.set("name", "Kermit").unwrap();
        assert_eq!(record.get_str("name").unwrap().as_deref(), Some("Kermit"));
    }

    #[test]
    fn unknown_field_errors() {
        let record = Record::from_xml(muppet_schema(), XML).unwrap();
        assert!(matches!(
            record.get("species"),
            Err(Error::UnknownField { .. })
        ));
    }

    #[test]
    fn typed_accessor_rejects_wrong_type() {
        let record = Record::from_xml(muppet_schema(), XML).unwrap();
        assert!(matches!(
            record.get_int("name"),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn parse_failure_surfaces_on_first_access_and_sticks() {
        let record = Record::from_xml(muppet_schema(), "<root>").unwrap();
        assert!(record.get("name").is_err());
        assert!(record.get("name").is_err());
    }

    #[test]
    fn sourceless_record_reads_defaults() {
        let schema = Schema::builder("Muppet")
            .field("name", FieldDecl::char("/root/value").default("nobody"))
            .build()
            .unwrap();
        let record = Record::new(schema).unwrap();
        assert_eq!(record.get_str("name").unwrap().as_deref(), Some("nobody"));
    }

    #[test]
    fn validation_hook_rejects_bad_records() {
        let schema = Schema::builder("Muppet")
            .field("name", FieldDecl::char("/root/value"))
            .validate_with(|record| match record.get_str("name") {
                Ok(Some(_)) => Ok(()),
                _ => Err("name is required".to_string()),
            })
            .build()
            .unwrap();
        let good = Record::from_xml(schema.clone(), "<root><value>Rowlf</value></root>");
        assert!(good.is_ok());
        let bad = Record::from_xml(schema, "<root><other/></root>");
        assert!(matches!(bad, Err(Error::Validation { .. })));
    }
}
