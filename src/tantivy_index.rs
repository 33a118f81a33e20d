use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::Mutex;
use serde::Serialize;
use tantivy::{
    Index,
    IndexReader,
    IndexWriter,
    ReloadPolicy,
    Searcher,
    Term,
    directory::MmapDirectory,
    query::{BooleanQuery, Occur, Query, TermQuery},
    schema::{IndexRecordOption, Schema},
    tokenizer::TextAnalyzer,
};

use crate::{
    data_dir::DataDir,
    document::Document,
    error::{Error, Result},
    schema::{self, ANALYZER_NAME, SchemaFields},
    search::{SearchBuilder, SearcherFactory},
};

/// Largest number of id clauses put in one delete query. Longer id lists
/// are deleted page by page.
pub const MAX_CLAUSES: usize = 1024;

/// Default memory budget of the index writer, in bytes.
pub const DEFAULT_WRITER_MEMORY: usize = 50_000_000;

/// File tantivy writes once an index has been created in a directory.
pub(crate) const META_FILE: &str = "meta.json";

/// Where indexes live and how they are written.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    root: PathBuf,
    writer_memory_budget: usize,
}

impl EngineSettings {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if root.as_os_str().is_empty() {
            return Err(Error::Config("storage root must not be empty".into()));
        }
        Ok(Self {
            root,
            writer_memory_budget: DEFAULT_WRITER_MEMORY,
        })
    }

    pub fn from_data_dir(data_dir: &DataDir) -> Result<Self> {
        Self::new(data_dir.index_root()?)
    }

    pub fn with_writer_memory_budget(mut self, bytes: usize) -> Self {
        self.writer_memory_budget = bytes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn writer_memory_budget(&self) -> usize {
        self.writer_memory_budget
    }
}

/// Outcome of a batched deletion.
///
/// Deletion is best-effort: a page that fails is logged and skipped, and
/// the remaining pages still run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    /// Number of delete queries issued.
    pub pages: usize,
    /// Pages whose delete query was rejected.
    pub failed_pages: usize,
}

impl DeleteReport {
    pub fn is_complete(&self) -> bool {
        self.failed_pages == 0
    }
}

/// Reject names that are empty or would escape the storage root.
pub fn validate_index_name(name: &str) -> Result<()> {
    let invalid = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\']);
    if invalid {
        return Err(Error::Config(format!("invalid index name: {name:?}")));
    }
    Ok(())
}

/// State reachable from both the engine and the searcher factories it
/// hands out.
struct Shared {
    name: String,
    path: PathBuf,
    schema: Schema,
    fields: SchemaFields,
    analyzer: TextAnalyzer,
    writer_memory_budget: usize,
    disposed: AtomicBool,
    index: Mutex<Option<Index>>,
    reader: Mutex<Option<IndexReader>>,
}

impl Shared {
    fn ensure_live(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(Error::Disposed {
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    fn has_index_on_disk(&self) -> bool {
        self.path.join(META_FILE).is_file()
    }

    /// The index handle, creating the index on disk when `create` is set.
    fn open_index(&self, create: bool) -> Result<Option<Index>> {
        let mut slot = self.index.lock();
        // Checked under the slot lock so a concurrent dispose cannot be
        // followed by a fresh handle.
        self.ensure_live()?;
        if let Some(index) = slot.as_ref() {
            return Ok(Some(index.clone()));
        }
        if !create && !self.has_index_on_disk() {
            return Ok(None);
        }

        std::fs::create_dir_all(&self.path)?;
        let dir = MmapDirectory::open(&self.path)?;
        let index = if Index::exists(&dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?
        {
            tracing::debug!(index = %self.name, "opening index");
            Index::open(dir)?
        } else {
            tracing::debug!(
                index = %self.name,
                path = %self.path.display(),
                "creating index"
            );
            Index::create(
                dir,
                self.schema.clone(),
                tantivy::IndexSettings::default(),
            )?
        };

        index.tokenizers().register(ANALYZER_NAME, self.analyzer.clone());
        *slot = Some(index.clone());
        Ok(Some(index))
    }

    fn create_index(&self) -> Result<Index> {
        self.open_index(true)?.ok_or_else(|| {
            Error::Config(format!("index {} could not be created", self.name))
        })
    }

    /// A searcher over the latest committed state, or `None` before the
    /// first write.
    ///
    /// The reader is opened once and reused until the next mutation
    /// invalidates it. The returned searcher is a snapshot: invalidation
    /// does not affect a searcher already handed out.
    fn searcher(&self) -> Result<Option<Searcher>> {
        let Some(index) = self.open_index(false)? else {
            return Ok(None);
        };

        let mut slot = self.reader.lock();
        self.ensure_live()?;
        if slot.is_none() {
            tracing::debug!(index = %self.name, "opening reader");
            let reader: IndexReader = index
                .reader_builder()
                .reload_policy(ReloadPolicy::Manual)
                .try_into()?;
            *slot = Some(reader);
        }
        Ok(slot.as_ref().map(IndexReader::searcher))
    }

    fn invalidate_reader(&self) {
        if self.reader.lock().take().is_some() {
            tracing::debug!(index = %self.name, "reader invalidated");
        }
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Reader first: it holds segment files open through the index.
        self.reader.lock().take();
        self.index.lock().take();
        tracing::debug!(index = %self.name, "disposed");
    }
}

/// One named, disk-resident full-text index.
///
/// Reads go through a cached reader that every mutation invalidates, so a
/// searcher obtained after a write returns always observes that write.
/// Mutations are serialized per engine; concurrent writers see
/// last-writer-wins ordering.
pub struct IndexEngine {
    shared: Arc<Shared>,
    writer_lock: Mutex<()>,
}

impl IndexEngine {
    /// Bind an engine to `<root>/<name>`. Nothing is written until the
    /// first mutation or [`ensure_storage`](Self::ensure_storage).
    pub fn open(
        name: &str,
        settings: &EngineSettings,
        analyzer: TextAnalyzer,
    ) -> Result<Self> {
        validate_index_name(name)?;
        let (schema, fields) = schema::build_schema();

        Ok(Self {
            shared: Arc::new(Shared {
                name: name.to_string(),
                path: settings.root().join(name),
                schema,
                fields,
                analyzer,
                writer_memory_budget: settings.writer_memory_budget(),
                disposed: AtomicBool::new(false),
                index: Mutex::new(None),
                reader: Mutex::new(None),
            }),
            writer_lock: Mutex::new(()),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }

    /// Create the index on disk if needed and open and close a writer, so
    /// an unwritable root fails here rather than on first use.
    pub fn ensure_storage(&self) -> Result<()> {
        let index = self.shared.create_index()?;
        let _guard = self.writer_lock.lock();
        drop(self.writer(&index)?);
        Ok(())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.total_documents()? <= 0)
    }

    /// Live documents in the index, or `-1` when nothing has been created
    /// in its directory yet.
    pub fn total_documents(&self) -> Result<i64> {
        match self.shared.searcher()? {
            Some(searcher) => Ok(searcher.num_docs() as i64),
            None => Ok(-1),
        }
    }

    pub fn new_document(&self, id: impl Into<String>) -> Document {
        Document::new(id)
    }

    /// Insert `documents`, replacing any stored document with the same id.
    ///
    /// When an id appears more than once in `documents` the last
    /// occurrence wins.
    pub fn store_documents(&self, documents: &[Document]) -> Result<()> {
        self.shared.ensure_live()?;
        if documents.is_empty() {
            return Ok(());
        }
        if documents.iter().any(|doc| doc.id().is_empty()) {
            return Err(Error::Config("document id must not be empty".into()));
        }

        let mut last_seen: HashMap<&str, usize> = HashMap::new();
        for (pos, doc) in documents.iter().enumerate() {
            last_seen.insert(doc.id(), pos);
        }
        let latest: Vec<&Document> = documents
            .iter()
            .enumerate()
            .filter(|(pos, doc)| last_seen[doc.id()] == *pos)
            .map(|(_, doc)| doc)
            .collect();

        let index = self.shared.create_index()?;
        let _guard = self.writer_lock.lock();
        let mut writer = self.writer(&index)?;

        let ids: Vec<&str> = latest.iter().map(|doc| doc.id()).collect();
        self.delete_pages(&writer, &ids);

        for doc in &latest {
            let encoded = schema::encode_document(doc)
                .into_tantivy(&self.shared.fields);
            writer.add_document(encoded)?;
        }

        writer.commit()?;
        self.shared.invalidate_reader();
        tracing::debug!(
            index = %self.shared.name,
            documents = latest.len(),
            "stored documents"
        );
        Ok(())
    }

    /// Delete every document whose id is in `ids`.
    ///
    /// Ids are deleted in pages of [`MAX_CLAUSES`]; a failing page does not
    /// stop the others. Nothing happens when the index has never been
    /// created.
    pub fn delete_documents<S: AsRef<str>>(
        &self,
        ids: &[S],
    ) -> Result<DeleteReport> {
        self.shared.ensure_live()?;
        if ids.is_empty() {
            return Ok(DeleteReport::default());
        }
        let Some(index) = self.shared.open_index(false)? else {
            return Ok(DeleteReport::default());
        };

        let ids: Vec<&str> = ids.iter().map(AsRef::as_ref).collect();
        let _guard = self.writer_lock.lock();
        let mut writer = self.writer(&index)?;

        let report = self.delete_pages(&writer, &ids);
        writer.commit()?;
        self.shared.invalidate_reader();

        tracing::debug!(
            index = %self.shared.name,
            ids = ids.len(),
            pages = report.pages,
            failed_pages = report.failed_pages,
            "deleted documents"
        );
        Ok(report)
    }

    /// A searcher over the latest committed state; `None` before the index
    /// has been created.
    pub fn searcher(&self) -> Result<Option<Searcher>> {
        self.shared.searcher()
    }

    /// A query builder bound to this index's analyzer. The searcher is
    /// resolved when the query runs, never captured here.
    pub fn create_search_builder(&self) -> SearchBuilder {
        let shared = Arc::clone(&self.shared);
        let factory: SearcherFactory = Arc::new(move || shared.searcher());
        SearchBuilder::new(
            self.shared.analyzer.clone(),
            self.shared.fields,
            factory,
        )
    }

    /// Release the reader and the index handle. Idempotent; later
    /// operations fail with [`Error::Disposed`].
    pub fn dispose(&self) {
        self.shared.dispose();
    }

    fn writer(&self, index: &Index) -> Result<IndexWriter> {
        Ok(index.writer_with_num_threads(1, self.shared.writer_memory_budget)?)
    }

    fn delete_pages(&self, writer: &IndexWriter, ids: &[&str]) -> DeleteReport {
        let fields = &self.shared.fields;
        delete_in_pages(&self.shared.name, ids, |page| {
            let clauses: Vec<(Occur, Box<dyn Query>)> = page
                .iter()
                .map(|id| {
                    let term = Term::from_field_text(fields.document_id, id);
                    let query = TermQuery::new(term, IndexRecordOption::Basic);
                    (Occur::Should, Box::new(query) as Box<dyn Query>)
                })
                .collect();
            writer.delete_query(Box::new(BooleanQuery::new(clauses)))
        })
    }
}

/// Run `delete_page` over `ids` in chunks of [`MAX_CLAUSES`]. A failing
/// page is logged and counted; the remaining pages still run.
fn delete_in_pages<T, E: fmt::Display>(
    index_name: &str,
    ids: &[&str],
    mut delete_page: impl FnMut(&[&str]) -> std::result::Result<T, E>,
) -> DeleteReport {
    let mut report = DeleteReport::default();

    for page in ids.chunks(MAX_CLAUSES) {
        report.pages += 1;
        if let Err(err) = delete_page(page) {
            report.failed_pages += 1;
            tracing::warn!(
                index = index_name,
                page = report.pages,
                error = %err,
                "delete page failed"
            );
        }
    }

    report
}

impl Drop for IndexEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for IndexEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexEngine")
            .field("name", &self.shared.name)
            .field("path", &self.shared.path)
            .finish_non_exhaustive()
    }
}
