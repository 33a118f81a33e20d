//! Per-index resolution of the text analyzer.
//!
//! The same analyzer must tokenize text when it is indexed and when it is
//! queried, so an index resolves it exactly once, at construction, from an
//! [`AnalyzerChain`].

use std::{collections::HashSet, fmt, sync::Arc};

use tantivy::tokenizer::{
    AsciiFoldingFilter,
    Language,
    LowerCaser,
    RemoveLongFilter,
    SimpleTokenizer,
    Stemmer,
    TextAnalyzer,
    TokenStream,
};

/// Priority of [`DefaultAnalyzerSelector`]. Any selector that wants to win
/// over the default must return something greater.
pub const DEFAULT_PRIORITY: i32 = -5;

/// Tokens longer than this many bytes are dropped.
const MAX_TOKEN_LEN: usize = 40;

/// An analyzer offered by a selector, with the priority it bids.
#[derive(Clone)]
pub struct AnalyzerSelection {
    pub priority: i32,
    pub analyzer: TextAnalyzer,
}

impl AnalyzerSelection {
    pub fn new(priority: i32, analyzer: TextAnalyzer) -> Self {
        Self { priority, analyzer }
    }
}

impl fmt::Debug for AnalyzerSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerSelection")
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Offers an analyzer for an index name.
///
/// Implementations must be pure functions of `index_name`: the chain may
/// ask the same question more than once.
pub trait AnalyzerSelector: Send + Sync {
    fn select(&self, index_name: &str) -> Option<AnalyzerSelection>;
}

impl<F> AnalyzerSelector for F
where
    F: Fn(&str) -> Option<AnalyzerSelection> + Send + Sync,
{
    fn select(&self, index_name: &str) -> Option<AnalyzerSelection> {
        self(index_name)
    }
}

/// The generic, locale-neutral analyzer every index falls back to.
pub fn default_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
        .filter(LowerCaser)
        .filter(AsciiFoldingFilter)
        .build()
}

/// Like [`default_analyzer`], with a stemmer for `language` at the end.
pub fn stemming_analyzer(language: Language) -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
        .filter(LowerCaser)
        .filter(AsciiFoldingFilter)
        .filter(Stemmer::new(language))
        .build()
}

/// Run `text` through `analyzer` and collect the token texts.
pub fn tokenize(analyzer: &TextAnalyzer, text: &str) -> Vec<String> {
    let mut analyzer = analyzer.clone();
    let mut stream = analyzer.token_stream(text);
    let mut tokens = Vec::new();
    while stream.advance() {
        tokens.push(stream.token().text.clone());
    }
    tokens
}

/// Always offers [`default_analyzer`] at [`DEFAULT_PRIORITY`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAnalyzerSelector;

impl AnalyzerSelector for DefaultAnalyzerSelector {
    fn select(&self, _index_name: &str) -> Option<AnalyzerSelection> {
        Some(AnalyzerSelection::new(DEFAULT_PRIORITY, default_analyzer()))
    }
}

/// Offers a stemming analyzer for a fixed set of index names.
#[derive(Debug, Clone)]
pub struct LanguageAnalyzerSelector {
    language: Language,
    priority: i32,
    index_names: HashSet<String>,
}

impl LanguageAnalyzerSelector {
    pub fn new<I, S>(language: Language, priority: i32, index_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            language,
            priority,
            index_names: index_names
                .into_iter()
                .map(|name| name.as_ref().to_lowercase())
                .collect(),
        }
    }
}

impl AnalyzerSelector for LanguageAnalyzerSelector {
    fn select(&self, index_name: &str) -> Option<AnalyzerSelection> {
        if !self.index_names.contains(&index_name.to_lowercase()) {
            return None;
        }
        Some(AnalyzerSelection::new(
            self.priority,
            stemming_analyzer(self.language),
        ))
    }
}

/// Registered selectors, consulted in registration order.
#[derive(Clone, Default)]
pub struct AnalyzerChain {
    selectors: Vec<Arc<dyn AnalyzerSelector>>,
}

impl AnalyzerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_selector(
        mut self,
        selector: impl AnalyzerSelector + 'static,
    ) -> Self {
        self.register(selector);
        self
    }

    pub fn register(&mut self, selector: impl AnalyzerSelector + 'static) {
        self.selectors.push(Arc::new(selector));
    }

    /// The highest-priority selection for `index_name`.
    ///
    /// Ties go to the selector registered first. [`DefaultAnalyzerSelector`]
    /// is consulted after every registered selector, so the result is
    /// never empty.
    pub fn resolve(&self, index_name: &str) -> AnalyzerSelection {
        let mut best: Option<AnalyzerSelection> = None;

        let candidates = self
            .selectors
            .iter()
            .filter_map(|selector| selector.select(index_name))
            .chain(DefaultAnalyzerSelector.select(index_name));

        for candidate in candidates {
            match &best {
                Some(current) if current.priority >= candidate.priority => {}
                _ => best = Some(candidate),
            }
        }

        let best = best.unwrap_or_else(|| {
            AnalyzerSelection::new(DEFAULT_PRIORITY, default_analyzer())
        });
        tracing::debug!(
            index = index_name,
            priority = best.priority,
            "resolved analyzer"
        );
        best
    }

    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }
}

impl fmt::Debug for AnalyzerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerChain")
            .field("selectors", &self.selectors.len())
            .finish()
    }
}
