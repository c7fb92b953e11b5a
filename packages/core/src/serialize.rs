//! Write-back serialization.
//!
//! Only fields that were read or written (that is, fields with a cache
//! entry) are replayed onto the tree; everything else in the source
//! document passes through untouched. Missing intermediate elements on a
//! written path are created on the way down.

use xmlrecord_tree::{Document, Element};

use crate::error::Error;
use crate::field::{ElementKind, FieldKind, FieldSpec};
use crate::record::Record;
use crate::value::Value;

impl Record {
    /// Apply every cached field to a copy of the tree and return it.
    pub fn to_tree(&self) -> Result<Document, Error> {
        let mut doc = self.with_document(|doc| Ok(doc.clone()))?;
        let synthetic = self.is_synthetic();
        for (index, value) in self.cached() {
            let spec = self.schema().field_at(index);
            apply_field(doc.root_mut(), synthetic, spec, &value)?;
        }
        if synthetic {
            doc = unwrap_placeholder(doc);
        }
        Ok(doc)
    }

    /// Serialize back to XML text.
    pub fn to_xml(&self) -> Result<String, Error> {
        self.to_tree()?.to_xml().map_err(Error::Tree)
    }
}

/// A record built without a source starts from a placeholder root. When
/// the written fields all hang off one real root under it, that root
/// becomes the document.
fn unwrap_placeholder(doc: Document) -> Document {
    let root = doc.root();
    if root.attributes().is_empty() && root.child_elements().count() == 1 {
        let only = root
            .child_elements()
            .next()
            .cloned()
            .unwrap_or_else(|| root.clone());
        return Document::from_root(only);
    }
    doc
}

fn apply_field(
    root: &mut Element,
    synthetic: bool,
    spec: &FieldSpec,
    value: &Value,
) -> Result<(), Error> {
    let path = spec.path();
    if let Some(attr) = path.attribute() {
        let target = vivify(root, path.segments(), synthetic);
        target.set_attr(attr, text_for(spec, value));
        return Ok(());
    }
    match spec.kind() {
        FieldKind::OneToOne { .. } => write_nested(root, synthetic, spec, value),
        FieldKind::Collection { .. } => write_collection(root, synthetic, spec, value),
        _ => {
            let target = vivify(root, path.segments(), synthetic);
            target.set_text(&text_for(spec, value));
            Ok(())
        }
    }
}

/// Render a scalar the way the field reads it back: a date field with an
/// explicit format writes that format, everything else writes the value's
/// canonical text.
fn text_for(spec: &FieldSpec, value: &Value) -> String {
    let format = match spec.kind() {
        FieldKind::Date { format } => format.as_deref(),
        FieldKind::Collection {
            element: ElementKind::Date { format },
        } => format.as_deref(),
        _ => None,
    };
    match (format, value) {
        (Some(fmt), Value::DateTime(d)) => d.naive_utc().format(fmt).to_string(),
        _ => value.to_text(),
    }
}

/// Walk the path's element steps from the root, creating what is missing.
///
/// For a record with a real source the first step names the root element
/// itself and is skipped; a synthetic placeholder root carries the whole
/// path beneath it instead.
fn vivify<'a>(root: &'a mut Element, segments: &[String], synthetic: bool) -> &'a mut Element {
    let skip = if synthetic { 0 } else { 1 };
    let mut current = root;
    for segment in segments.iter().skip(skip) {
        current = current.ensure_child(segment);
    }
    current
}

fn split_last(segments: &[String]) -> Option<(&[String], &str)> {
    let (last, parents) = segments.split_last()?;
    Some((parents, last.as_str()))
}

fn write_nested(
    root: &mut Element,
    synthetic: bool,
    spec: &FieldSpec,
    value: &Value,
) -> Result<(), Error> {
    let Some((parents, tag)) = split_last(spec.path().segments()) else {
        return Err(Error::Construction {
            message: format!("field '{}': nested binding needs an element step", spec.name()),
        });
    };
    let parent = vivify(root, parents, synthetic);
    let positions = parent.element_positions(tag);
    match value {
        Value::Record(record) => {
            let subtree = record.to_tree()?.into_root();
            match positions.first() {
                Some(&index) => parent.replace_at(index, subtree),
                None => {
                    parent.append_element(subtree);
                }
            }
            Ok(())
        }
        Value::Null => {
            for &index in positions.iter().rev() {
                parent.remove_at(index);
            }
            Ok(())
        }
        other => Err(Error::TypeMismatch {
            expected: "record",
            found: other.kind_name(),
        }),
    }
}

/// Align old repeated elements with the new list positionally: rewrite
/// the overlap in place, append the growth, drop the excess.
fn write_collection(
    root: &mut Element,
    synthetic: bool,
    spec: &FieldSpec,
    value: &Value,
) -> Result<(), Error> {
    let empty = Vec::new();
    let items: &Vec<Value> = match value {
        Value::List(items) => items,
        Value::Null => &empty,
        other => {
            return Err(Error::TypeMismatch {
                expected: "list",
                found: other.kind_name(),
            })
        }
    };
    let Some((_, tag)) = split_last(spec.path().segments()) else {
        return Err(Error::Construction {
            message: format!("field '{}': collection binding needs an element step", spec.name()),
        });
    };
    let segments = spec.path().segments();
    let parent = vivify(root, &segments[..segments.len() - 1], synthetic);
    let positions = parent.element_positions(tag);
    let overlap = positions.len().min(items.len());

    // Replacements keep indices stable, so the position list stays valid
    // until the removal pass.
    for i in 0..overlap {
        let index = positions[i];
        match &items[i] {
            Value::Record(record) => parent.replace_at(index, record.to_tree()?.into_root()),
            scalar => {
                let text = text_for(spec, scalar);
                if let Some(element) = parent.element_at_mut(index) {
                    element.set_text(&text);
                }
            }
        }
    }
    for item in items.iter().skip(overlap) {
        match item {
            Value::Record(record) => {
                parent.append_element(record.to_tree()?.into_root());
            }
            scalar => {
                parent
                    .append_element(Element::new(tag))
                    .set_text(&text_for(spec, scalar));
            }
        }
    }
    for &index in positions[overlap..].iter().rev() {
        parent.remove_at(index);
    }
    Ok(())
}
