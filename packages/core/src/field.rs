//! Field declarations and decoding.
//!
//! A [`FieldDecl`] is what a schema builder collects: a path expression,
//! a type, and optional knobs (default, date format, collection ordering).
//! Building the schema turns each into a [`FieldSpec`] with the path
//! parsed and the declaration checked. Decoding evaluates the path against
//! a record's tree and converts the match into a [`Value`].

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use xmlrecord_tree::{evaluate, Element, PathExpr, PathMatch};

use crate::error::Error;
use crate::record::Record;
use crate::schema::Schema;
use crate::value::Value;

/// The type of a single-valued field binding.
#[derive(Clone, Debug)]
pub enum FieldKind {
    Char,
    Int,
    Float,
    Bool,
    Date { format: Option<String> },
    Collection { element: ElementKind },
    OneToOne { schema: Arc<Schema> },
}

/// The element type of a collection binding.
#[derive(Clone, Debug)]
pub enum ElementKind {
    Char,
    Int,
    Float,
    Bool,
    Date { format: Option<String> },
    Record(Arc<Schema>),
}

/// A field as declared on a schema builder, before validation.
#[derive(Clone, Debug)]
pub struct FieldDecl {
    path: String,
    default: Value,
    kind: FieldKind,
    order_by: Option<String>,
}

impl FieldDecl {
    fn new(path: impl Into<String>, kind: FieldKind) -> Self {
        FieldDecl {
            path: path.into(),
            default: Value::Null,
            kind,
            order_by: None,
        }
    }

    pub fn char(path: impl Into<String>) -> Self {
        FieldDecl::new(path, FieldKind::Char)
    }

    pub fn int(path: impl Into<String>) -> Self {
        FieldDecl::new(path, FieldKind::Int)
    }

    pub fn float(path: impl Into<String>) -> Self {
        FieldDecl::new(path, FieldKind::Float)
    }

    pub fn bool(path: impl Into<String>) -> Self {
        FieldDecl::new(path, FieldKind::Bool)
    }

    /// A date field parsed from RFC 3339 text, or from naive local text
    /// taken as UTC.
    pub fn date(path: impl Into<String>) -> Self {
        FieldDecl::new(path, FieldKind::Date { format: None })
    }

    /// A date field parsed with an explicit strftime-style format. The
    /// parsed value is taken as UTC.
    pub fn date_format(path: impl Into<String>, format: impl Into<String>) -> Self {
        FieldDecl::new(
            path,
            FieldKind::Date {
                format: Some(format.into()),
            },
        )
    }

    /// A multi-valued binding: every path match becomes one element.
    pub fn collection(path: impl Into<String>, element: ElementKind) -> Self {
        FieldDecl::new(path, FieldKind::Collection { element })
    }

    /// A nested record decoded from the single matched subtree.
    pub fn one_to_one(path: impl Into<String>, schema: Arc<Schema>) -> Self {
        FieldDecl::new(path, FieldKind::OneToOne { schema })
    }

    /// Value returned when the path matches nothing (or matches only
    /// empty text).
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }

    /// Sort a decoded collection by this key. For record elements the key
    /// names a field on the element schema; for scalar elements it is
    /// ignored in favor of the element value itself.
    pub fn order_by(mut self, key: impl Into<String>) -> Self {
        self.order_by = Some(key.into());
        self
    }
}

/// A validated field binding on a built schema.
#[derive(Clone, Debug)]
pub struct FieldSpec {
    name: String,
    path: PathExpr,
    default: Value,
    kind: FieldKind,
    order_by: Option<String>,
}

impl FieldSpec {
    pub(crate) fn build(name: &str, decl: FieldDecl) -> Result<FieldSpec, Error> {
        let path = PathExpr::parse(&decl.path).map_err(|e| Error::Construction {
            message: format!("field '{}': {}", name, e),
        })?;
        if decl.order_by.is_some() && !matches!(decl.kind, FieldKind::Collection { .. }) {
            return Err(Error::Construction {
                message: format!("field '{}': order_by is only valid on collections", name),
            });
        }
        Ok(FieldSpec {
            name: name.to_string(),
            path,
            default: decl.default,
            kind: decl.kind,
            order_by: decl.order_by,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &PathExpr {
        &self.path
    }

    pub fn default(&self) -> &Value {
        &self.default
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// Evaluate this field against a record's tree.
    pub(crate) fn decode(&self, root: &Element) -> Result<Value, Error> {
        match &self.kind {
            FieldKind::Char => Ok(match self.single_text(root)? {
                Some(text) => Value::Str(text),
                None => self.default.clone(),
            }),
            FieldKind::Int => match self.single_text(root)? {
                Some(text) => parse_int(&self.name, &text),
                None => Ok(self.default.clone()),
            },
            FieldKind::Float => match self.single_text(root)? {
                Some(text) => parse_float(&self.name, &text),
                None => Ok(self.default.clone()),
            },
            FieldKind::Bool => Ok(match self.single_text(root)? {
                Some(text) => parse_bool(&text).unwrap_or_else(|| self.default.clone()),
                None => self.default.clone(),
            }),
            FieldKind::Date { format } => match self.single_text(root)? {
                Some(text) => parse_date(&self.name, &text, format.as_deref()),
                None => Ok(self.default.clone()),
            },
            FieldKind::Collection { element } => {
                let matches = evaluate(root, &self.path);
                let mut values = Vec::with_capacity(matches.len());
                for m in matches {
                    values.push(self.decode_element(element, &m)?);
                }
                if let Some(key) = &self.order_by {
                    sort_by_order_key(&mut values, key)?;
                }
                Ok(Value::List(values))
            }
            FieldKind::OneToOne { schema } => {
                let matches = evaluate(root, &self.path);
                match matches.len() {
                    0 => Ok(self.default.clone()),
                    1 => match &matches[0] {
                        PathMatch::Node(e) => {
                            Record::from_element(schema.clone(), (*e).clone()).map(Value::Record)
                        }
                        PathMatch::Text(text) => Err(Error::Conversion {
                            field: self.name.clone(),
                            value: text.clone(),
                            expected: "element",
                        }),
                    },
                    _ => Err(Error::MultipleMatches {
                        path: self.path.raw().to_string(),
                    }),
                }
            }
        }
    }

    /// Trimmed text of the single match, `None` for no match or empty
    /// text.
    fn single_text(&self, root: &Element) -> Result<Option<String>, Error> {
        let matches = evaluate(root, &self.path);
        match matches.len() {
            0 => Ok(None),
            1 => {
                let text = matches[0].text().trim().to_string();
                Ok(if text.is_empty() { None } else { Some(text) })
            }
            _ => Err(Error::MultipleMatches {
                path: self.path.raw().to_string(),
            }),
        }
    }

    fn decode_element(&self, element: &ElementKind, m: &PathMatch<'_>) -> Result<Value, Error> {
        if let ElementKind::Record(schema) = element {
            return match m {
                PathMatch::Node(e) => {
                    Record::from_element(schema.clone(), (*e).clone()).map(Value::Record)
                }
                PathMatch::Text(text) => Err(Error::Conversion {
                    field: self.name.clone(),
                    value: text.clone(),
                    expected: "element",
                }),
            };
        }

        let text = m.text().trim().to_string();
        if text.is_empty() {
            return Ok(Value::Null);
        }
        match element {
            ElementKind::Char => Ok(Value::Str(text)),
            ElementKind::Int => parse_int(&self.name, &text),
            ElementKind::Float => parse_float(&self.name, &text),
            ElementKind::Bool => Ok(parse_bool(&text).unwrap_or(Value::Null)),
            ElementKind::Date { format } => parse_date(&self.name, &text, format.as_deref()),
            ElementKind::Record(_) => unreachable!("handled above"),
        }
    }
}

fn parse_int(field: &str, text: &str) -> Result<Value, Error> {
    text.parse::<i64>()
        .map(Value::Int)
        .map_err(|_| Error::Conversion {
            field: field.to_string(),
            value: text.to_string(),
            expected: "integer",
        })
}

fn parse_float(field: &str, text: &str) -> Result<Value, Error> {
    text.parse::<f64>()
        .map(Value::Float)
        .map_err(|_| Error::Conversion {
            field: field.to_string(),
            value: text.to_string(),
            expected: "float",
        })
}

/// `true`/`false` in any case; anything else is no parse at all.
fn parse_bool(text: &str) -> Option<Value> {
    if text.eq_ignore_ascii_case("true") {
        Some(Value::Bool(true))
    } else if text.eq_ignore_ascii_case("false") {
        Some(Value::Bool(false))
    } else {
        None
    }
}

fn parse_date(field: &str, text: &str, format: Option<&str>) -> Result<Value, Error> {
    let conversion = || Error::Conversion {
        field: field.to_string(),
        value: text.to_string(),
        expected: "date",
    };
    let parsed = match format {
        Some(fmt) => NaiveDateTime::parse_from_str(text, fmt)
            .map(|naive| naive.and_utc().fixed_offset())
            .map_err(|_| conversion())?,
        None => parse_date_generic(text).ok_or_else(conversion)?,
    };
    Ok(Value::DateTime(parsed))
}

/// Accept RFC 3339 text with an embedded offset, or naive timestamp text
/// taken as UTC, with or without fractional seconds.
fn parse_date_generic(text: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed);
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(naive.and_utc().fixed_offset());
        }
    }
    None
}

fn sort_by_order_key(values: &mut Vec<Value>, key: &str) -> Result<(), Error> {
    let mut keyed: Vec<(Value, Value)> = Vec::with_capacity(values.len());
    for value in values.drain(..) {
        let sort_key = match &value {
            Value::Record(record) => record.get(key)?,
            other => other.clone(),
        };
        keyed.push((sort_key, value));
    }
    keyed.sort_by(|a, b| a.0.order_cmp(&b.0));
    *values = keyed.into_iter().map(|(_, v)| v).collect();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn spec(name: &str, decl: FieldDecl) -> FieldSpec {
        FieldSpec::build(name, decl).unwrap()
    }

    fn root(xml: &str) -> Element {
        xmlrecord_tree::Document::parse(xml).unwrap().into_root()
    }

    #[test]
    fn char_reads_trimmed_text() {
        let root = root("<root><name>  Muppets rock  </name></root>");
        let field = spec("name", FieldDecl::char("/root/name"));
        assert_eq!(field.decode(&root).unwrap(), Value::Str("Muppets rock".to_string()));
    }

    #[test]
    fn missing_and_empty_fall_back_to_default() {
        let root = root("<root><empty></empty></root>");
        let field = spec("name", FieldDecl::char("/root/name").default("nothing"));
        assert_eq!(field.decode(&root).unwrap(), Value::Str("nothing".to_string()));
        let field = spec("empty", FieldDecl::char("/root/empty").default("nothing"));
        assert_eq!(field.decode(&root).unwrap(), Value::Str("nothing".to_string()));
    }

    #[test]
    fn int_parses_or_fails_loudly() {
        let root = root("<root><age>21</age><bad>NaN</bad></root>");
        let field = spec("age", FieldDecl::int("/root/age"));
        assert_eq!(field.decode(&root).unwrap(), Value::Int(21));
        let field = spec("bad", FieldDecl::int("/root/bad"));
        assert!(matches!(
            field.decode(&root),
            Err(Error::Conversion { expected: "integer", .. })
        ));
    }

    #[test]
    fn float_parses() {
        let root = root("<root><ratio>11.11</ratio></root>");
        let field = spec("ratio", FieldDecl::float("/root/ratio"));
        assert_eq!(field.decode(&root).unwrap(), Value::Float(11.11));
    }

    #[test]
    fn bool_is_lax() {
        let root = root("<root><a>TRUE</a><b>false</b><c>maybe</c></root>");
        assert_eq!(
            spec("a", FieldDecl::bool("/root/a")).decode(&root).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            spec("b", FieldDecl::bool("/root/b")).decode(&root).unwrap(),
            Value::Bool(false)
        );
        let field = spec("c", FieldDecl::bool("/root/c").default(false));
        assert_eq!(field.decode(&root).unwrap(), Value::Bool(false));
    }

    #[test]
    fn date_with_offset_keeps_the_instant() {
        let root = root("<root><at>2008-06-21T10:36:12-06:00</at></root>");
        let field = spec("at", FieldDecl::date("/root/at"));
        let expected = Utc.with_ymd_and_hms(2008, 6, 21, 16, 36, 12).unwrap();
        assert_eq!(field.decode(&root).unwrap().as_datetime().unwrap(), expected);
    }

    #[test]
    fn naive_date_is_taken_as_utc() {
        let root = root("<root><at>2008-06-21T10:36:12</at></root>");
        let field = spec("at", FieldDecl::date("/root/at"));
        let expected = Utc.with_ymd_and_hms(2008, 6, 21, 10, 36, 12).unwrap();
        assert_eq!(field.decode(&root).unwrap().as_datetime().unwrap(), expected);
    }

    #[test]
    fn custom_date_format() {
        let root = root("<root><at>21-06-2008 10:36</at></root>");
        let field = spec("at", FieldDecl::date_format("/root/at", "%d-%m-%Y %H:%M"));
        let expected = Utc.with_ymd_and_hms(2008, 6, 21, 10, 36, 0).unwrap();
        assert_eq!(field.decode(&root).unwrap().as_datetime().unwrap(), expected);
    }

    #[test]
    fn attribute_binding() {
        let root = root(r#"<root><char comment="Nice">x</char></root>"#);
        let field = spec("comment", FieldDecl::char("/root/char/@comment"));
        assert_eq!(field.decode(&root).unwrap(), Value::Str("Nice".to_string()));
    }

    #[test]
    fn multiple_matches_on_single_binding_error() {
        let root = root("<root><v>1</v><v>2</v></root>");
        let field = spec("v", FieldDecl::int("/root/v"));
        assert!(matches!(field.decode(&root), Err(Error::MultipleMatches { .. })));
    }

    #[test]
    fn scalar_collection_keeps_document_order() {
        let root = root("<root><v>c</v><v>a</v><v>b</v></root>");
        let field = spec("vs", FieldDecl::collection("/root/v", ElementKind::Char));
        let decoded = field.decode(&root).unwrap();
        let items = decoded.as_list().unwrap();
        assert_eq!(items[0], Value::Str("c".to_string()));
        assert_eq!(items[2], Value::Str("b".to_string()));
    }

    #[test]
    fn scalar_collection_orders_by_value() {
        let root = root("<root><v>c</v><v>a</v><v>b</v></root>");
        let field = spec(
            "vs",
            FieldDecl::collection("/root/v", ElementKind::Char).order_by("v"),
        );
        let decoded = field.decode(&root).unwrap();
        let items = decoded.as_list().unwrap();
        assert_eq!(items[0], Value::Str("a".to_string()));
        assert_eq!(items[2], Value::Str("c".to_string()));
    }

    #[test]
    fn ordered_collection_decode_is_idempotent() {
        let root = root("<root><v>c</v><v>a</v><v>b</v></root>");
        let field = spec(
            "vs",
            FieldDecl::collection("/root/v", ElementKind::Char).order_by("v"),
        );
        let first = field.decode(&root).unwrap();
        let second = field.decode(&root).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_collection_is_an_empty_list() {
        let root = root("<root/>");
        let field = spec("vs", FieldDecl::collection("/root/v", ElementKind::Int));
        assert_eq!(field.decode(&root).unwrap(), Value::List(Vec::new()));
    }

    #[test]
    fn order_by_on_scalar_field_is_rejected_at_build() {
        assert!(FieldSpec::build("v", FieldDecl::int("/root/v").order_by("x")).is_err());
    }

    #[test]
    fn bad_path_is_rejected_at_build() {
        assert!(FieldSpec::build("v", FieldDecl::char("")).is_err());
    }
}
