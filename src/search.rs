use std::{fmt, ops::Bound, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tantivy::{
    Document as _,
    Searcher,
    TantivyDocument,
    Term,
    collector::{Count, DocSetCollector, TopDocs},
    query::{
        AllQuery,
        BooleanQuery,
        EmptyQuery,
        Occur,
        Query,
        RangeQuery,
        TermQuery,
    },
    schema::{IndexRecordOption, OwnedValue, Schema},
    tokenizer::TextAnalyzer,
};

use crate::{
    analyzer,
    document::{FieldOptions, FieldValue, field_key},
    error::Result,
    schema::{self, SchemaFields},
    search_bit::DocBitSet,
    text_util,
};

/// Number of hits returned when the caller does not ask for a page size.
pub const DEFAULT_TAKE: usize = 10;

/// Resolves the searcher at the moment a query runs. `None` means the index
/// has never been written to.
pub type SearcherFactory =
    Arc<dyn Fn() -> Result<Option<Searcher>> + Send + Sync>;

/// One matched document.
///
/// Only fields indexed with [`FieldOptions::STORE`] can be read back. Every
/// getter is total: a missing or unconvertible field yields the type's
/// zero value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    document_id: String,
    score: f32,
    fields: Map<String, Value>,
}

impl SearchHit {
    pub fn new(
        document_id: impl Into<String>,
        score: f32,
        fields: Map<String, Value>,
    ) -> Self {
        let fields = fields
            .into_iter()
            .map(|(name, value)| (field_key(&name), value))
            .collect();

        Self {
            document_id: document_id.into(),
            score,
            fields,
        }
    }

    pub(crate) fn from_document(
        doc: &TantivyDocument,
        index_schema: &Schema,
        score: f32,
    ) -> Result<Self> {
        let mut json: Map<String, Value> =
            serde_json::from_str(&doc.to_json(index_schema))?;

        let mut first = |name: &str| match json.remove(name) {
            Some(Value::Array(mut values)) if !values.is_empty() => {
                Some(values.swap_remove(0))
            }
            _ => None,
        };

        let document_id = match first(schema::fields::DOCUMENT_ID) {
            Some(Value::String(id)) => id,
            _ => String::new(),
        };
        let stored = match first(schema::fields::STORED) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };

        Ok(Self::new(document_id, score, stored))
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn get_int(&self, name: &str) -> i32 {
        match self.field(name) {
            Some(Value::Number(n)) => n
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .or_else(|| {
                    n.as_f64().filter(|v| v.is_finite()).map(|v| v as i32)
                })
                .unwrap_or(0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        }
    }

    /// Never returns NaN.
    pub fn get_double(&self, name: &str) -> f64 {
        let value = match self.field(name) {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };
        value.filter(|v| !v.is_nan()).unwrap_or(0.0)
    }

    pub fn get_boolean(&self, name: &str) -> bool {
        match self.field(name) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    pub fn get_string(&self, name: &str) -> String {
        match self.field(name) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => String::new(),
        }
    }

    /// Stored dates are UTC; returns [`DateTime::<Utc>::MIN_UTC`] when the
    /// field is absent or not a date.
    pub fn get_date_time(&self, name: &str) -> DateTime<Utc> {
        let Some(Value::String(s)) = self.field(name) else {
            return DateTime::<Utc>::MIN_UTC;
        };
        text_util::parse_utc(s)
            .or_else(|| {
                DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|v| v.with_timezone(&Utc))
            })
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(&field_key(name))
    }
}

#[derive(Debug, Clone)]
enum Clause {
    Text { field: String, text: String },
    Term { field: String, value: FieldValue },
    RangeI64 { field: String, lower: Bound<i64>, upper: Bound<i64> },
    RangeF64 { field: String, lower: Bound<f64>, upper: Bound<f64> },
}

/// Builds and runs a query against one index.
///
/// Clauses are required (`Must`) unless added through one of the
/// `exclude_*` methods. A builder without required clauses matches every
/// document not excluded.
///
/// The searcher is requested only when [`search`](Self::search),
/// [`count`](Self::count) or [`bits`](Self::bits) runs, so a builder kept
/// around across writes still queries the latest committed state.
pub struct SearchBuilder {
    analyzer: TextAnalyzer,
    fields: SchemaFields,
    searcher: SearcherFactory,
    clauses: Vec<(Occur, Clause)>,
    skip: usize,
    take: usize,
}

impl SearchBuilder {
    pub fn new(
        analyzer: TextAnalyzer,
        fields: SchemaFields,
        searcher: SearcherFactory,
    ) -> Self {
        Self {
            analyzer,
            fields,
            searcher,
            clauses: Vec::new(),
            skip: 0,
            take: DEFAULT_TAKE,
        }
    }

    /// Relevance match of `text` against an analyzed field. Any token of
    /// `text` may match.
    pub fn text(self, field: &str, text: &str) -> Self {
        self.push(Occur::Must, Clause::Text {
            field: field.to_string(),
            text: text.to_string(),
        })
    }

    /// Exact match on a field indexed without [`FieldOptions::ANALYZE`].
    pub fn term(self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.push(Occur::Must, Clause::Term {
            field: field.to_string(),
            value: value.into(),
        })
    }

    pub fn exclude_term(
        self,
        field: &str,
        value: impl Into<FieldValue>,
    ) -> Self {
        self.push(Occur::MustNot, Clause::Term {
            field: field.to_string(),
            value: value.into(),
        })
    }

    pub fn exclude_text(self, field: &str, text: &str) -> Self {
        self.push(Occur::MustNot, Clause::Text {
            field: field.to_string(),
            text: text.to_string(),
        })
    }

    /// Integer field within `[lower, upper]`; `None` leaves a side open.
    pub fn range_i64(
        self,
        field: &str,
        lower: Option<i64>,
        upper: Option<i64>,
    ) -> Self {
        self.push(Occur::Must, Clause::RangeI64 {
            field: field.to_string(),
            lower: inclusive(lower),
            upper: inclusive(upper),
        })
    }

    /// Number field within `[lower, upper]`; `None` leaves a side open.
    pub fn range_f64(
        self,
        field: &str,
        lower: Option<f64>,
        upper: Option<f64>,
    ) -> Self {
        self.push(Occur::Must, Clause::RangeF64 {
            field: field.to_string(),
            lower: inclusive(lower),
            upper: inclusive(upper),
        })
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn take(mut self, take: usize) -> Self {
        self.take = take;
        self
    }

    fn push(mut self, occur: Occur, clause: Clause) -> Self {
        self.clauses.push((occur, clause));
        self
    }

    /// The page of hits selected by `skip`/`take`, best first.
    pub fn search(&self) -> Result<Vec<SearchHit>> {
        if self.take == 0 {
            return Ok(Vec::new());
        }
        let Some(searcher) = (self.searcher)()? else {
            return Ok(Vec::new());
        };

        let query = self.build_query();
        let collector = TopDocs::with_limit(self.take).and_offset(self.skip);
        let top_docs = searcher.search(&query, &collector)?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            let hit = SearchHit::from_document(&doc, searcher.schema(), score)?;
            hits.push(hit);
        }
        Ok(hits)
    }

    /// Total number of matches, ignoring paging.
    pub fn count(&self) -> Result<usize> {
        let Some(searcher) = (self.searcher)()? else {
            return Ok(0);
        };
        Ok(searcher.search(&self.build_query(), &Count)?)
    }

    /// Ordinals of every match within the searcher's snapshot, for
    /// combining with other result sets.
    pub fn bits(&self) -> Result<DocBitSet> {
        let Some(searcher) = (self.searcher)()? else {
            return Ok(DocBitSet::new());
        };

        let mut bases = Vec::with_capacity(searcher.segment_readers().len());
        let mut base = 0u32;
        for reader in searcher.segment_readers() {
            bases.push(base);
            base += reader.max_doc();
        }

        let matches = searcher.search(&self.build_query(), &DocSetCollector)?;
        Ok(matches
            .into_iter()
            .map(|addr| bases[addr.segment_ord as usize] + addr.doc_id)
            .collect())
    }

    fn build_query(&self) -> BooleanQuery {
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = self
            .clauses
            .iter()
            .map(|(occur, clause)| (*occur, self.clause_query(clause)))
            .collect();

        if !clauses.iter().any(|(occur, _)| *occur != Occur::MustNot) {
            clauses.push((Occur::Must, Box::new(AllQuery)));
        }
        BooleanQuery::new(clauses)
    }

    fn clause_query(&self, clause: &Clause) -> Box<dyn Query> {
        match clause {
            Clause::Text { field, text } => self.text_query(field, text),
            Clause::Term { field, value } => self.term_query(field, value),
            Clause::RangeI64 { field, lower, upper } => {
                let term = |v: &i64| {
                    let mut term = self.exact_term(field);
                    term.append_type_and_fast_value(*v);
                    term
                };
                Box::new(RangeQuery::new(
                    lower.as_ref().map(term),
                    upper.as_ref().map(term),
                ))
            }
            Clause::RangeF64 { field, lower, upper } => {
                let term = |v: &f64| {
                    let mut term = self.exact_term(field);
                    term.append_type_and_fast_value(*v);
                    term
                };
                Box::new(RangeQuery::new(
                    lower.as_ref().map(term),
                    upper.as_ref().map(term),
                ))
            }
        }
    }

    fn text_query(&self, field: &str, text: &str) -> Box<dyn Query> {
        let path = field_key(field);
        let mut queries: Vec<Box<dyn Query>> =
            analyzer::tokenize(&self.analyzer, text)
                .into_iter()
                .map(|token| {
                    let mut term = Term::from_field_json_path(
                        self.fields.analyzed,
                        &path,
                        false,
                    );
                    term.append_type_and_str(&token);
                    Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs))
                        as Box<dyn Query>
                })
                .collect();

        match queries.len() {
            0 => Box::new(EmptyQuery),
            1 => queries.remove(0),
            _ => Box::new(BooleanQuery::union(queries)),
        }
    }

    fn term_query(&self, field: &str, value: &FieldValue) -> Box<dyn Query> {
        match value {
            FieldValue::Integer(v) => {
                let v = i64::from(*v);
                self.clause_query(&Clause::RangeI64 {
                    field: field.to_string(),
                    lower: Bound::Included(v),
                    upper: Bound::Included(v),
                })
            }
            FieldValue::Number(v) => self.clause_query(&Clause::RangeF64 {
                field: field.to_string(),
                lower: Bound::Included(*v),
                upper: Bound::Included(*v),
            }),
            _ => match schema::encode_value(value, FieldOptions::NONE) {
                Some(OwnedValue::Str(encoded)) => {
                    self.exact_str_query(field, &encoded)
                }
                _ => Box::new(EmptyQuery),
            },
        }
    }

    fn exact_str_query(&self, field: &str, value: &str) -> Box<dyn Query> {
        let mut term = self.exact_term(field);
        term.append_type_and_str(value);
        Box::new(TermQuery::new(term, IndexRecordOption::Basic))
    }

    fn exact_term(&self, field: &str) -> Term {
        Term::from_field_json_path(self.fields.exact, &field_key(field), false)
    }
}

impl fmt::Debug for SearchBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchBuilder")
            .field("clauses", &self.clauses)
            .field("skip", &self.skip)
            .field("take", &self.take)
            .finish_non_exhaustive()
    }
}

fn inclusive<T>(value: Option<T>) -> Bound<T> {
    value.map_or(Bound::Unbounded, Bound::Included)
}
