use std::{
    collections::BTreeMap,
    fmt,
    ops::{BitOr, BitOrAssign},
};

use chrono::{DateTime, FixedOffset, TimeZone};

/// Per-field indexing options, combinable with `|`.
///
/// ```
/// use indexkit::document::FieldOptions;
///
/// let opts = FieldOptions::STORE | FieldOptions::ANALYZE;
/// assert!(opts.contains(FieldOptions::STORE));
/// assert!(!opts.contains(FieldOptions::SANITIZE));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FieldOptions(u8);

impl FieldOptions {
    /// Index only, as an exact term.
    pub const NONE: Self = Self(0);
    /// The value can be read back from a search hit.
    pub const STORE: Self = Self(1);
    /// Text is tokenized by the index analyzer instead of kept whole.
    pub const ANALYZE: Self = Self(1 << 1);
    /// Markup is stripped from text before it is indexed or stored.
    pub const SANITIZE: Self = Self(1 << 2);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for FieldOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for FieldOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for FieldOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (Self::STORE, "STORE"),
            (Self::ANALYZE, "ANALYZE"),
            (Self::SANITIZE, "SANITIZE"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
        .collect();

        if names.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", names.join(" | "))
        }
    }
}

/// The scalar kinds a field can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Text,
    DateTime,
    Boolean,
    Number,
}

/// A field value as supplied by the indexing client.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(i32),
    Text(String),
    DateTime(DateTime<FixedOffset>),
    Boolean(bool),
    Number(f64),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Integer(_) => FieldKind::Integer,
            Self::Text(_) => FieldKind::Text,
            Self::DateTime(_) => FieldKind::DateTime,
            Self::Boolean(_) => FieldKind::Boolean,
            Self::Number(_) => FieldKind::Number,
        }
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for FieldValue {
    fn from(value: DateTime<Tz>) -> Self {
        Self::DateTime(value.fixed_offset())
    }
}

/// One named field of a [`Document`].
#[derive(Debug, Clone, PartialEq)]
pub struct FieldEntry {
    /// The field name as the client spelled it.
    pub name: String,
    /// `None` when the client set an absent value; such fields are skipped
    /// at indexing time.
    pub value: Option<FieldValue>,
    pub kind: FieldKind,
    pub options: FieldOptions,
}

/// A write-side record submitted to an index.
///
/// Field names are case-insensitive: setting `"Title"` after `"title"`
/// replaces the earlier entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    id: String,
    fields: BTreeMap<String, FieldEntry>,
}

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_integer(
        &mut self,
        name: &str,
        value: i32,
        options: FieldOptions,
    ) -> &mut Self {
        self.set_value(name, value, options)
    }

    pub fn set_number(
        &mut self,
        name: &str,
        value: f64,
        options: FieldOptions,
    ) -> &mut Self {
        self.set_value(name, value, options)
    }

    pub fn set_boolean(
        &mut self,
        name: &str,
        value: bool,
        options: FieldOptions,
    ) -> &mut Self {
        self.set_value(name, value, options)
    }

    pub fn set_text(
        &mut self,
        name: &str,
        value: &str,
        options: FieldOptions,
    ) -> &mut Self {
        self.set_value(name, value, options)
    }

    pub fn set_date_time<Tz: TimeZone>(
        &mut self,
        name: &str,
        value: DateTime<Tz>,
        options: FieldOptions,
    ) -> &mut Self {
        self.set_value(name, value, options)
    }

    pub fn set_value(
        &mut self,
        name: &str,
        value: impl Into<FieldValue>,
        options: FieldOptions,
    ) -> &mut Self {
        let value = value.into();
        self.set(name, value.kind(), Some(value), options)
    }

    /// Declare a field whose value is missing. It replaces any earlier
    /// entry of the same name and is skipped at indexing time.
    pub fn set_absent(
        &mut self,
        name: &str,
        kind: FieldKind,
        options: FieldOptions,
    ) -> &mut Self {
        self.set(name, kind, None, options)
    }

    fn set(
        &mut self,
        name: &str,
        kind: FieldKind,
        value: Option<FieldValue>,
        options: FieldOptions,
    ) -> &mut Self {
        self.fields.insert(
            field_key(name),
            FieldEntry {
                name: name.to_string(),
                value,
                kind,
                options,
            },
        );
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldEntry> {
        self.fields.get(&field_key(name))
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldEntry> {
        self.fields.remove(&field_key(name))
    }

    /// Iterate `(key, entry)` pairs, where `key` is the normalized name.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldEntry)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// The case-insensitive key under which a field name is indexed.
pub fn field_key(name: &str) -> String {
    name.to_lowercase()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn options_combine() {
        let opts = FieldOptions::STORE | FieldOptions::SANITIZE;
        assert!(opts.contains(FieldOptions::STORE));
        assert!(opts.contains(FieldOptions::SANITIZE));
        assert!(!opts.contains(FieldOptions::ANALYZE));
        assert!(opts.contains(FieldOptions::NONE));
        assert_eq!(format!("{opts:?}"), "STORE | SANITIZE");
        assert_eq!(format!("{:?}", FieldOptions::NONE), "NONE");
    }

    #[test]
    fn names_are_case_insensitive() {
        let mut doc = Document::new("a");
        doc.set_text("Title", "first", FieldOptions::STORE);
        doc.set_text("TITLE", "second", FieldOptions::STORE);

        assert_eq!(doc.len(), 1);
        let entry = doc.get("title").unwrap();
        assert_eq!(entry.value, Some(FieldValue::Text("second".into())));
        assert_eq!(entry.name, "TITLE");
    }

    #[test]
    fn last_write_wins_across_kinds() {
        let mut doc = Document::new("a");
        doc.set_integer("age", 3, FieldOptions::STORE);
        doc.set_text("age", "three", FieldOptions::NONE);

        let entry = doc.get("age").unwrap();
        assert_eq!(entry.kind, FieldKind::Text);
        assert_eq!(entry.options, FieldOptions::NONE);
    }

    #[test]
    fn absent_values_keep_their_kind() {
        let mut doc = Document::new("a");
        doc.set_integer("count", 1, FieldOptions::STORE);
        doc.set_absent("count", FieldKind::Integer, FieldOptions::STORE);
        doc.set_absent("seen", FieldKind::DateTime, FieldOptions::STORE);

        assert_eq!(doc.get("count").unwrap().kind, FieldKind::Integer);
        assert_eq!(doc.get("count").unwrap().value, None);
        assert_eq!(doc.get("seen").unwrap().kind, FieldKind::DateTime);
    }

    #[test]
    fn date_times_keep_their_offset() {
        let mut doc = Document::new("a");
        let now = Utc::now();
        doc.set_date_time("seen", now, FieldOptions::STORE);

        match &doc.get("seen").unwrap().value {
            Some(FieldValue::DateTime(value)) => assert_eq!(*value, now),
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn set_value_infers_kind() {
        let mut doc = Document::new("a");
        doc.set_value("score", 1.5, FieldOptions::STORE)
            .set_value("flag", true, FieldOptions::NONE);

        assert_eq!(doc.get("score").unwrap().kind, FieldKind::Number);
        assert_eq!(doc.get("flag").unwrap().kind, FieldKind::Boolean);
    }

    #[test]
    fn fields_iterate_in_key_order() {
        let mut doc = Document::new("a");
        doc.set_text("b", "x", FieldOptions::NONE);
        doc.set_text("A", "y", FieldOptions::NONE);

        let keys: Vec<&str> = doc.fields().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn remove_is_case_insensitive() {
        let mut doc = Document::new("a");
        doc.set_boolean("Draft", true, FieldOptions::NONE);
        assert!(doc.remove("draft").is_some());
        assert!(doc.is_empty());
    }
}
