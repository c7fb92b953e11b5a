//! The lazy query layer: finder resolution, fetch caching, and streaming
//! records out of collection responses.
//!
//! A [`RecordQuery`] does nothing until a terminal call. `count` and
//! `records` resolve the filter set to a URL through the schema's
//! finders, fetch it once, and pull fragments out of the body only as far
//! as the consumer advances; extracted fragments are cached so later
//! consumers replay them without refetching or rescanning. `get` fetches
//! a single record document instead.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use xmlrecord_tree::{Document, Fragments};

use crate::error::Error;
use crate::record::Record;
use crate::schema::{substitute, Payload, Schema};
use crate::transport::{FetchResponse, Transport};

/// Entry point for queries against one schema over one transport.
pub struct QueryManager {
    schema: Arc<Schema>,
    transport: Arc<dyn Transport>,
}

impl QueryManager {
    /// Fails for schemas whose payload form the query layer cannot
    /// stream records out of.
    pub fn new(schema: Arc<Schema>, transport: Arc<dyn Transport>) -> Result<Self, Error> {
        match schema.payload() {
            Payload::Xml => Ok(QueryManager { schema, transport }),
            Payload::Json => Err(Error::UnsupportedSchema {
                schema: schema.name().to_string(),
            }),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn query(&self) -> RecordQuery {
        RecordQuery {
            schema: self.schema.clone(),
            transport: self.transport.clone(),
            args: BTreeMap::new(),
            headers: self.schema.headers().clone(),
            custom_url: None,
            fetch_cache: RefCell::new(HashMap::new()),
            stream: RefCell::new(None),
        }
    }

    /// Start a query filtered on one argument.
    pub fn filter(&self, name: impl Into<String>, value: impl ToString) -> RecordQuery {
        self.query().filter(name, value)
    }

    /// Start a query with no filter arguments, for finders registered on
    /// the empty argument set.
    pub fn all(&self) -> RecordQuery {
        self.query()
    }

    /// Start a query against an explicit URL, bypassing the finder table.
    pub fn filter_custom(&self, url: impl Into<String>) -> RecordQuery {
        self.query().custom(url)
    }

    /// Fetch the single record matching these arguments.
    pub fn get(&self, args: &[(&str, &str)]) -> Result<Record, Error> {
        self.query().get(args)
    }
}

/// An accumulating, lazily-evaluated query.
pub struct RecordQuery {
    schema: Arc<Schema>,
    transport: Arc<dyn Transport>,
    args: BTreeMap<String, String>,
    headers: HashMap<String, String>,
    custom_url: Option<String>,
    fetch_cache: RefCell<HashMap<String, FetchResponse>>,
    stream: RefCell<Option<FragmentStream>>,
}

/// Incremental extraction state: the scanner, what it has produced so
/// far, and whether it ever failed.
struct FragmentStream {
    fragments: Fragments,
    cache: Vec<String>,
    done: bool,
    failed: Option<String>,
}

impl RecordQuery {
    /// Add a filter argument. Chaining accumulates; the full set picks
    /// the finder at evaluation time.
    pub fn filter(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.args.insert(name.into(), value.to_string());
        self
    }

    fn custom(mut self, url: impl Into<String>) -> Self {
        self.custom_url = Some(url.into());
        self
    }

    /// Add a header for this query's fetches on top of the schema's.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn args(&self) -> &BTreeMap<String, String> {
        &self.args
    }

    /// The URL this query resolves to, without fetching it.
    pub fn url(&self) -> Result<String, Error> {
        if let Some(url) = &self.custom_url {
            return Ok(url.clone());
        }
        let key: Vec<String> = self.args.keys().cloned().collect();
        let finder = self
            .schema
            .finder(&key)
            .ok_or_else(|| Error::NoRegisteredFinder { key: key.clone() })?;
        let mut values = Vec::with_capacity(finder.arg_order.len());
        for name in &finder.arg_order {
            match self.args.get(name) {
                Some(value) => values.push(value.as_str()),
                None => return Err(Error::NoRegisteredFinder { key }),
            }
        }
        Ok(substitute(&finder.template, &values))
    }

    /// Number of fragments in the collection response. Counting drains
    /// the extraction to the end of the input.
    pub fn count(&self) -> Result<usize, Error> {
        self.fragment_at(usize::MAX)?;
        let slot = self.stream.borrow();
        Ok(slot.as_ref().map_or(0, |s| s.cache.len()))
    }

    /// Iterate the matched records. The response is fetched on the first
    /// call; fragments are extracted and records constructed one at a
    /// time as the iterator advances.
    pub fn records(&self) -> Result<RecordIter<'_>, Error> {
        self.ensure_stream()?;
        Ok(RecordIter {
            query: self,
            index: 0,
            pending_error: None,
            exhausted: false,
        })
    }

    /// Fetch the single record matching the accumulated arguments plus
    /// `args`. A missing document (404 or an empty body) is
    /// [`Error::DoesNotExist`].
    pub fn get(mut self, args: &[(&str, &str)]) -> Result<Record, Error> {
        for (name, value) in args {
            self.args.insert(name.to_string(), value.to_string());
        }
        let response = self.fetch()?;
        if response.status == 404 {
            return Err(self.does_not_exist());
        }
        let content = response.text()?.to_string();
        if content.trim().is_empty() {
            return Err(self.does_not_exist());
        }
        let source = match self.schema.collection_node() {
            // A wrapped single-record response: unwrap down to the one
            // child of the wrapper.
            Some(tag) => {
                let doc = Document::parse(&content)?;
                let wrapper = doc
                    .root()
                    .find_descendant(tag)
                    .ok_or_else(|| self.does_not_exist())?;
                let children: Vec<_> = wrapper.child_elements().collect();
                match children.len() {
                    0 => return Err(self.does_not_exist()),
                    1 => children[0].to_xml()?,
                    _ => {
                        return Err(Error::MultipleMatches {
                            path: tag.to_string(),
                        })
                    }
                }
            }
            None => content,
        };
        Record::from_xml(self.schema.clone(), source)
    }

    /// Fetch the resolved URL, once per distinct URL for this query's
    /// lifetime.
    fn fetch(&self) -> Result<FetchResponse, Error> {
        let url = self.url()?;
        if let Some(cached) = self.fetch_cache.borrow().get(&url) {
            log::trace!("fetch cache hit for {}", url);
            return Ok(cached.clone());
        }
        log::debug!("fetching {}", url);
        let response = self.transport.fetch(&url, &self.headers)?;
        self.fetch_cache.borrow_mut().insert(url, response.clone());
        Ok(response)
    }

    /// Fetch the collection response and stand up the fragment scanner,
    /// once. Nothing is extracted yet.
    fn ensure_stream(&self) -> Result<(), Error> {
        if self.stream.borrow().is_some() {
            return Ok(());
        }
        let response = self.fetch()?;
        let body = response.text()?;
        if body.trim().is_empty() {
            return Err(self.does_not_exist());
        }
        log::debug!("streaming fragments for schema '{}'", self.schema.name());
        *self.stream.borrow_mut() = Some(FragmentStream {
            fragments: Fragments::new(body, self.schema.collection_node()),
            cache: Vec::new(),
            done: false,
            failed: None,
        });
        Ok(())
    }

    /// Extract fragments until `index` is cached or the input ends. A
    /// scan failure is sticky: later pulls re-raise it instead of serving
    /// a silently short collection.
    fn fragment_at(&self, index: usize) -> Result<Option<String>, Error> {
        self.ensure_stream()?;
        let mut slot = self.stream.borrow_mut();
        let Some(stream) = slot.as_mut() else {
            return Ok(None);
        };
        if let Some(message) = &stream.failed {
            return Err(Error::Tree(xmlrecord_tree::Error::Malformed(
                message.clone(),
            )));
        }
        while !stream.done && stream.cache.len() <= index {
            match stream.fragments.next() {
                Some(Ok(fragment)) => stream.cache.push(fragment),
                Some(Err(e)) => {
                    stream.done = true;
                    stream.failed = Some(e.to_string());
                    return Err(e.into());
                }
                None => stream.done = true,
            }
        }
        Ok(stream.cache.get(index).cloned())
    }

    fn does_not_exist(&self) -> Error {
        Error::DoesNotExist {
            schema: self.schema.name().to_string(),
            args: self.args.clone(),
        }
    }
}

/// Pulls one fragment and constructs one record per step.
pub struct RecordIter<'a> {
    query: &'a RecordQuery,
    index: usize,
    pending_error: Option<Error>,
    exhausted: bool,
}

impl Iterator for RecordIter<'_> {
    type Item = Result<Record, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        if let Some(error) = self.pending_error.take() {
            self.exhausted = true;
            return Some(Err(error));
        }
        match self.query.fragment_at(self.index) {
            Ok(Some(fragment)) => {
                self.index += 1;
                Some(Record::from_xml(self.query.schema.clone(), fragment))
            }
            Ok(None) => {
                self.exhausted = true;
                None
            }
            Err(e) => {
                self.exhausted = true;
                Some(Err(e))
            }
        }
    }
}

impl<'a> IntoIterator for &'a RecordQuery {
    type Item = Result<Record, Error>;
    type IntoIter = RecordIter<'a>;

    /// `for` loop support. A failed fetch becomes the single yielded
    /// item; scan failures surface at the record they interrupt.
    fn into_iter(self) -> RecordIter<'a> {
        let pending_error = self.ensure_stream().err();
        RecordIter {
            query: self,
            index: 0,
            pending_error,
            exhausted: false,
        }
    }
}
