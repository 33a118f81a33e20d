//! The fixed tantivy schema every index shares, and the encoding of a
//! [`Document`] into it.
//!
//! Tantivy schemas cannot grow after creation, while documents carry
//! arbitrary field names. Each document therefore becomes three JSON
//! objects keyed by the normalized field name: one tokenized by the index
//! analyzer, one of exact terms, and one that is only stored.

use std::collections::BTreeMap;

use tantivy::{
    TantivyDocument,
    schema::{
        Field,
        IndexRecordOption,
        JsonObjectOptions,
        OwnedValue,
        STORED,
        STRING,
        Schema,
        TextFieldIndexing,
    },
};

use crate::{
    document::{Document, FieldOptions, FieldValue},
    text_util,
};

/// Name under which the index analyzer is registered with tantivy.
pub const ANALYZER_NAME: &str = "index_analyzer";

/// Field names used in the schema.
pub mod fields {
    pub const DOCUMENT_ID: &str = "document_id";
    pub const ANALYZED: &str = "analyzed";
    pub const EXACT: &str = "exact";
    pub const STORED: &str = "stored";
}

/// Resolved field handles for the schema.
#[derive(Debug, Clone, Copy)]
pub struct SchemaFields {
    pub document_id: Field,
    pub analyzed: Field,
    pub exact: Field,
    pub stored: Field,
}

pub fn build_schema() -> (Schema, SchemaFields) {
    let mut builder = Schema::builder();

    let document_id =
        builder.add_text_field(fields::DOCUMENT_ID, STRING | STORED);

    let analyzed_opts = JsonObjectOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(ANALYZER_NAME)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );
    let analyzed = builder.add_json_field(fields::ANALYZED, analyzed_opts);

    let exact_opts = JsonObjectOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer("raw")
                .set_index_option(IndexRecordOption::Basic),
        )
        .set_fast(Some("raw"));
    let exact = builder.add_json_field(fields::EXACT, exact_opts);

    let stored = builder.add_json_field(
        fields::STORED,
        JsonObjectOptions::default().set_stored(),
    );

    let schema = builder.build();
    let fields = SchemaFields {
        document_id,
        analyzed,
        exact,
        stored,
    };

    (schema, fields)
}

/// The value a field is indexed as, after sanitizing and date
/// normalization. `None` for values the index cannot represent.
///
/// Dates and booleans become plain strings. Values are handed to tantivy
/// already typed, so a string is never reinterpreted as a date or number.
pub fn encode_value(
    value: &FieldValue,
    options: FieldOptions,
) -> Option<OwnedValue> {
    match value {
        FieldValue::Integer(v) => Some(OwnedValue::I64(i64::from(*v))),
        FieldValue::Number(v) if v.is_finite() => Some(OwnedValue::F64(*v)),
        FieldValue::Number(v) => {
            tracing::warn!(value = %v, "skipping non-finite number");
            None
        }
        FieldValue::Text(v) if options.contains(FieldOptions::SANITIZE) => {
            Some(OwnedValue::Str(text_util::strip_markup(v)))
        }
        FieldValue::Text(v) => Some(OwnedValue::Str(v.clone())),
        FieldValue::DateTime(v) => {
            Some(OwnedValue::Str(text_util::format_utc(v)))
        }
        FieldValue::Boolean(v) => Some(OwnedValue::Str(v.to_string())),
    }
}

/// A document split into the three JSON objects of the schema, keyed by
/// normalized field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodedDocument {
    pub id: String,
    pub analyzed: BTreeMap<String, OwnedValue>,
    pub exact: BTreeMap<String, OwnedValue>,
    pub stored: BTreeMap<String, OwnedValue>,
}

impl EncodedDocument {
    /// Empty objects are left out.
    pub fn into_tantivy(self, fields: &SchemaFields) -> TantivyDocument {
        let mut doc = TantivyDocument::new();
        doc.add_text(fields.document_id, &self.id);

        for (field, object) in [
            (fields.analyzed, self.analyzed),
            (fields.exact, self.exact),
            (fields.stored, self.stored),
        ] {
            if !object.is_empty() {
                doc.add_object(field, object);
            }
        }

        doc
    }
}

pub fn encode_document(doc: &Document) -> EncodedDocument {
    let mut encoded = EncodedDocument {
        id: doc.id().to_string(),
        ..EncodedDocument::default()
    };

    for (key, entry) in doc.fields() {
        let Some(value) = entry.value.as_ref() else {
            continue;
        };
        let Some(indexed) = encode_value(value, entry.options) else {
            continue;
        };

        let tokenized = matches!(value, FieldValue::Text(_))
            && entry.options.contains(FieldOptions::ANALYZE);

        if entry.options.contains(FieldOptions::STORE) {
            encoded.stored.insert(key.to_string(), indexed.clone());
        }
        if tokenized {
            encoded.analyzed.insert(key.to_string(), indexed);
        } else {
            encoded.exact.insert(key.to_string(), indexed);
        }
    }

    encoded
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone};

    use super::*;
    use crate::document::FieldKind;

    fn str_value(text: &str) -> OwnedValue {
        OwnedValue::Str(text.to_string())
    }

    #[test]
    fn schema_has_all_fields() {
        let (schema, fields) = build_schema();
        let f = |name: &str| schema.get_field(name).unwrap();
        assert_eq!(f(fields::DOCUMENT_ID), fields.document_id);
        assert_eq!(f(fields::ANALYZED), fields.analyzed);
        assert_eq!(f(fields::EXACT), fields.exact);
        assert_eq!(f(fields::STORED), fields.stored);
    }

    #[test]
    fn id_is_always_present() {
        let out = encode_document(&Document::new("doc-1"));
        assert_eq!(out.id, "doc-1");
        assert!(out.analyzed.is_empty());
        assert!(out.exact.is_empty());
        assert!(out.stored.is_empty());
    }

    #[test]
    fn analyzed_text_goes_to_analyzed_object() {
        let mut doc = Document::new("a");
        doc.set_text("Body", "Hello World", FieldOptions::ANALYZE);

        let out = encode_document(&doc);
        assert_eq!(out.analyzed["body"], str_value("Hello World"));
        assert!(out.exact.is_empty());
        assert!(out.stored.is_empty());
    }

    #[test]
    fn plain_text_is_an_exact_term() {
        let mut doc = Document::new("a");
        doc.set_text("status", "In Review", FieldOptions::STORE);

        let out = encode_document(&doc);
        assert_eq!(out.exact["status"], str_value("In Review"));
        assert_eq!(out.stored["status"], str_value("In Review"));
        assert!(out.analyzed.is_empty());
    }

    #[test]
    fn sanitize_strips_markup_before_store() {
        let mut doc = Document::new("a");
        doc.set_text(
            "body",
            "<p>Hello <em>there</em></p>",
            FieldOptions::ANALYZE
                | FieldOptions::SANITIZE
                | FieldOptions::STORE,
        );

        let out = encode_document(&doc);
        assert_eq!(out.analyzed["body"], str_value("Hello there"));
        assert_eq!(out.stored["body"], str_value("Hello there"));
    }

    #[test]
    fn dates_are_utc_strings() {
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        let when = offset.with_ymd_and_hms(2023, 12, 31, 22, 0, 5).unwrap();
        let mut doc = Document::new("a");
        doc.set_date_time("created", when, FieldOptions::NONE);

        assert_eq!(
            encode_document(&doc).exact["created"],
            str_value("2024-01-01T03:00:05Z")
        );
    }

    #[test]
    fn date_like_text_stays_text() {
        let mut doc = Document::new("a");
        doc.set_text("code", "2024-05-01T12:00:00Z", FieldOptions::NONE);

        assert_eq!(
            encode_document(&doc).exact["code"],
            str_value("2024-05-01T12:00:00Z")
        );
    }

    #[test]
    fn booleans_are_lowercase_tokens() {
        let mut doc = Document::new("a");
        doc.set_boolean("draft", true, FieldOptions::NONE);
        doc.set_boolean("public", false, FieldOptions::ANALYZE);

        let out = encode_document(&doc);
        assert_eq!(out.exact["draft"], str_value("true"));
        // ANALYZE only applies to text.
        assert_eq!(out.exact["public"], str_value("false"));
    }

    #[test]
    fn numbers_stay_numeric() {
        let mut doc = Document::new("a");
        doc.set_integer("age", -42, FieldOptions::STORE);
        doc.set_number("price", 9.0, FieldOptions::NONE);

        let out = encode_document(&doc);
        assert_eq!(out.exact["age"], OwnedValue::I64(-42));
        assert_eq!(out.exact["price"], OwnedValue::F64(9.0));
        assert_eq!(out.stored["age"], OwnedValue::I64(-42));
    }

    #[test]
    fn absent_and_non_finite_values_are_skipped() {
        let mut doc = Document::new("a");
        doc.set_absent("age", FieldKind::Integer, FieldOptions::STORE);
        doc.set_number("ratio", f64::NAN, FieldOptions::STORE);

        let out = encode_document(&doc);
        assert!(out.exact.is_empty());
        assert!(out.stored.is_empty());
    }

    #[test]
    fn tantivy_document_carries_the_id() {
        let (_, fields) = build_schema();
        let mut doc = Document::new("a");
        doc.set_text("status", "open", FieldOptions::STORE);

        let encoded = encode_document(&doc).into_tantivy(&fields);
        let ids: Vec<_> = encoded.get_all(fields.document_id).collect();
        assert_eq!(ids.len(), 1);
        assert_eq!(encoded.get_all(fields.stored).count(), 1);
        assert_eq!(encoded.get_all(fields.analyzed).count(), 0);
    }
}
