//! Engine orchestration: ingest, query, deduplication and persistence.
//!
//! [`RagEngine`] owns the index, the chunker and the persistence store and
//! coordinates the external providers. Embeddings are computed outside the
//! index lock with bounded concurrency; snapshot writes are serialized so
//! two flushes never interleave on disk.

use crate::chunker::TextChunker;
use crate::config::{EngineConfig, IngestPolicy};
use crate::context::{AssembledContext, ContextAssembler};
use crate::dedup::{DeduplicationService, DuplicateMatch};
use crate::providers::{embed_with_retry, AnswerGenerator, EmbeddingProvider, ProviderError};
use crate::types::{
    CancelSignal, ChunkFailure, EngineState, IngestReport, QueryOptions, QueryOutcome, RagError,
    Result,
};
use parking_lot::RwLock;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::sync::OnceLock;
use tessera_vector::{Chunk, FlatIndex, PersistenceStore, RecordId};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// The retrieval-augmented-generation engine.
///
/// # Lifecycle
///
/// [`RagEngine::open`] loads the last snapshot when a data path is
/// configured. A corrupt or unwritable store moves the engine to
/// [`EngineState::Degraded`]: reads keep working against whatever is in
/// memory, writes are rejected, and a successful [`RagEngine::rebuild`]
/// (or [`RagEngine::remove_source`]) restores normal operation by writing
/// a fresh snapshot.
pub struct RagEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn AnswerGenerator>,
    index: Arc<FlatIndex>,
    store: Option<PersistenceStore>,
    chunker: TextChunker,
    dedup: DeduplicationService,
    config: EngineConfig,
    state: RwLock<EngineState>,
    embed_slots: Arc<Semaphore>,
    // Serializes snapshot writes; the index lock is never held across one.
    flush_lock: Mutex<()>,
}

impl std::fmt::Debug for RagEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RagEngine {
    /// Open an engine, loading the last snapshot when `config.data_path`
    /// is set.
    ///
    /// A snapshot written by a different embedding provider, with a
    /// different dimensionality or under a different metric than the live
    /// configuration is a hard error: mixing vector spaces produces
    /// garbage rankings. A snapshot with an incompatible schema version is
    /// likewise refused. A corrupt snapshot is not fatal: the engine
    /// starts empty and degraded, and a rebuild reclaims it.
    #[instrument(skip(embedder, generator, config), fields(provider = embedder.id()))]
    pub async fn open(
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn AnswerGenerator>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;

        let store = config.data_path.as_ref().map(PersistenceStore::new);

        let mut degraded = false;
        let index = match &store {
            Some(store) => match store.load().await {
                Ok(Some((index, manifest))) => {
                    if manifest.provider_id != embedder.id() {
                        return Err(RagError::Config(format!(
                            "snapshot was written by provider '{}' but the engine runs '{}'",
                            manifest.provider_id,
                            embedder.id()
                        )));
                    }
                    if manifest.dimensions != embedder.dimensions() {
                        return Err(RagError::Config(format!(
                            "snapshot holds {}-dimensional vectors but the provider produces {}",
                            manifest.dimensions,
                            embedder.dimensions()
                        )));
                    }
                    if manifest.metric != config.metric {
                        return Err(RagError::Config(format!(
                            "snapshot uses metric '{}' but the engine is configured for '{}'",
                            manifest.metric, config.metric
                        )));
                    }
                    index
                }
                Ok(None) => FlatIndex::new(embedder.dimensions(), config.metric)?,
                Err(e @ tessera_vector::Error::SchemaVersionMismatch { .. }) => {
                    return Err(e.into());
                }
                Err(e) => {
                    warn!(error = %e, "Snapshot unreadable; starting degraded with an empty index");
                    degraded = true;
                    FlatIndex::new(embedder.dimensions(), config.metric)?
                }
            },
            None => FlatIndex::new(embedder.dimensions(), config.metric)?,
        };
        let index = Arc::new(index);

        let state = if degraded {
            EngineState::Degraded
        } else if index.is_empty() {
            EngineState::Empty
        } else {
            EngineState::Indexed
        };
        info!(records = index.len(), state = ?state, "Engine opened");

        let dedup = DeduplicationService::new(
            Arc::clone(&embedder),
            Arc::clone(&index),
            config.dedup_top_n,
            config.retry.clone(),
        );

        Ok(Self {
            chunker: TextChunker::new(config.chunk_size, config.chunk_overlap),
            embed_slots: Arc::new(Semaphore::new(config.embed_concurrency)),
            embedder,
            generator,
            index,
            store,
            dedup,
            config,
            state: RwLock::new(state),
            flush_lock: Mutex::new(()),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        *self.state.read()
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// The configuration the engine was opened with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ingest a document. See [`RagEngine::ingest_with_cancel`].
    pub async fn ingest(&self, source_id: &str, text: &str) -> Result<IngestReport> {
        self.ingest_with_cancel(source_id, text, &CancelSignal::new())
            .await
    }

    /// Chunk, embed and index a document.
    ///
    /// Embedding runs with bounded concurrency and never holds the index
    /// lock. Chunk-level failures are collected into the report; under
    /// [`IngestPolicy::AllOrNothing`] any failure aborts the whole
    /// document with the index untouched. Cancellation stops embedding at
    /// chunk granularity and commits what already succeeded (nothing,
    /// under all-or-nothing).
    #[instrument(skip(self, text, cancel), fields(len = text.len()))]
    pub async fn ingest_with_cancel(
        &self,
        source_id: &str,
        text: &str,
        cancel: &CancelSignal,
    ) -> Result<IngestReport> {
        if self.state() == EngineState::Degraded {
            return Err(RagError::Degraded);
        }

        let texts = self.chunker.chunk(text);
        let total = texts.len();
        if total == 0 {
            debug!(source_id, "Nothing to ingest");
            return Ok(IngestReport {
                source_id: source_id.to_string(),
                chunks_added: 0,
                failures: Vec::new(),
                cancelled: cancel.is_cancelled(),
            });
        }

        let chunks: Vec<Chunk> = texts
            .iter()
            .enumerate()
            .map(|(i, piece)| Chunk::new(source_id, i, total, piece.as_str()))
            .collect();

        // None marks a chunk skipped by cancellation.
        let mut outcomes: Vec<Option<std::result::Result<Vec<f32>, ProviderError>>> =
            (0..total).map(|_| None).collect();

        let mut tasks = JoinSet::new();
        for (i, piece) in texts.iter().enumerate() {
            let embedder = Arc::clone(&self.embedder);
            let slots = Arc::clone(&self.embed_slots);
            let retry = self.config.retry.clone();
            let cancel = cancel.clone();
            let piece = piece.clone();
            tasks.spawn(async move {
                let Ok(_permit) = slots.acquire_owned().await else {
                    return (i, None);
                };
                if cancel.is_cancelled() {
                    return (i, None);
                }
                let outcome = embed_with_retry(embedder.as_ref(), &piece, &retry).await;
                (i, Some(outcome))
            });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((i, outcome)) => outcomes[i] = outcome,
                Err(e) => warn!(error = %e, "Embedding task aborted"),
            }
        }
        let cancelled = cancel.is_cancelled();

        let mut items = Vec::new();
        let mut failures = Vec::new();
        for (chunk, outcome) in chunks.into_iter().zip(outcomes) {
            match outcome {
                Some(Ok(vector)) => items.push((vector, chunk)),
                Some(Err(e)) => failures.push(ChunkFailure {
                    chunk_id: chunk.id,
                    position: chunk.position,
                    error: e.to_string(),
                    retryable: e.is_retryable(),
                }),
                None => {} // skipped by cancellation
            }
        }

        if self.config.ingest_policy == IngestPolicy::AllOrNothing {
            if !failures.is_empty() {
                return Err(RagError::IngestAborted {
                    source_id: source_id.to_string(),
                    failed: failures.len(),
                    total,
                });
            }
            if cancelled {
                // Partial commits would break the policy's guarantee.
                return Ok(IngestReport {
                    source_id: source_id.to_string(),
                    chunks_added: 0,
                    failures,
                    cancelled: true,
                });
            }
        }

        let added = items.len();
        if added > 0 {
            self.index.add_batch(items)?;
            self.flush().await?;
            *self.state.write() = EngineState::Indexed;
        }

        info!(
            source_id,
            added,
            failed = failures.len(),
            cancelled,
            "Ingestion finished"
        );
        Ok(IngestReport {
            source_id: source_id.to_string(),
            chunks_added: added,
            failures,
            cancelled,
        })
    }

    /// Answer a question. See [`RagEngine::query_with_cancel`].
    pub async fn query(&self, question: &str, options: &QueryOptions) -> Result<QueryOutcome> {
        self.query_with_cancel(question, options, &CancelSignal::new())
            .await
    }

    /// Retrieve relevant chunks, assemble a citation-numbered context and
    /// generate an answer.
    ///
    /// An empty index is not an error: the generator is asked to answer
    /// against an explicit no-context marker. Cancellation between stages
    /// returns the partial outcome (ranked context without an answer)
    /// with the `cancelled` flag set.
    #[instrument(skip(self, question, options, cancel), fields(len = question.len(), k = options.k))]
    pub async fn query_with_cancel(
        &self,
        question: &str,
        options: &QueryOptions,
        cancel: &CancelSignal,
    ) -> Result<QueryOutcome> {
        let query_vector =
            embed_with_retry(self.embedder.as_ref(), question, &self.config.retry).await?;
        if cancel.is_cancelled() {
            return Ok(cancelled_outcome(ContextAssembler::assemble(
                &[],
                options.max_chars,
            )));
        }

        // Overfetch so the similarity floor does not starve the context.
        let fetch = options.k.saturating_mul(2).max(options.k);
        let mut results = self.index.search(&query_vector, fetch)?;
        results.retain(|r| r.similarity >= options.min_similarity);
        results.truncate(options.k);
        for (i, result) in results.iter_mut().enumerate() {
            result.rank = i + 1;
        }

        let context = ContextAssembler::assemble(&results, options.max_chars);
        if cancel.is_cancelled() {
            return Ok(cancelled_outcome(context));
        }

        let prompt = build_prompt(question, &context.text);
        let answer = self.generator.generate(&prompt).await?;

        let citations_used = extract_citations(&answer, context.entries.len());
        let uncited = !context.is_empty() && citations_used.is_empty();
        if uncited {
            debug!("Answer carries no citation markers");
        }

        Ok(QueryOutcome {
            answer,
            citations_used,
            context,
            uncited,
            cancelled: false,
        })
    }

    /// Check whether `text` is a near-duplicate of already-indexed content,
    /// using the configured similarity threshold. Never mutates the index.
    pub async fn check_duplicate(&self, text: &str) -> Result<Option<DuplicateMatch>> {
        self.dedup
            .check_duplicate(text, self.config.dedup_threshold)
            .await
    }

    /// Remove every chunk of a source document.
    ///
    /// Deletion is a full rebuild excluding the source's records; a
    /// successful rebuild also clears a degraded state. Returns the number
    /// of chunks removed.
    #[instrument(skip(self))]
    pub async fn remove_source(&self, source_id: &str) -> Result<usize> {
        let excluding: HashSet<RecordId> = self
            .index
            .records()
            .iter()
            .enumerate()
            .filter(|(_, record)| record.chunk.source_id == source_id)
            .map(|(id, _)| id)
            .collect();

        if excluding.is_empty() {
            return Ok(0);
        }
        self.rebuild(&excluding).await
    }

    /// Rebuild the index excluding the given record ids and write a fresh
    /// snapshot. Success clears a degraded state; a failed snapshot write
    /// leaves (or puts) the engine in it. Returns the number of records
    /// removed.
    #[instrument(skip(self, excluding), fields(excluded = excluding.len()))]
    pub async fn rebuild(&self, excluding: &HashSet<RecordId>) -> Result<usize> {
        let removed = self.index.rebuild(excluding);
        self.flush().await?;

        *self.state.write() = if self.index.is_empty() {
            EngineState::Empty
        } else {
            EngineState::Indexed
        };
        info!(removed, remaining = self.index.len(), "Rebuild committed");
        Ok(removed)
    }

    /// Write a snapshot if persistence is configured. A failed write moves
    /// the engine to [`EngineState::Degraded`].
    async fn flush(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let _guard = self.flush_lock.lock().await;
        match store
            .save(
                &self.index,
                self.embedder.id(),
                self.config.dedup_threshold,
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Snapshot write failed; engine is degraded");
                *self.state.write() = EngineState::Degraded;
                Err(e.into())
            }
        }
    }
}

fn cancelled_outcome(context: AssembledContext) -> QueryOutcome {
    QueryOutcome {
        answer: String::new(),
        citations_used: Vec::new(),
        context,
        uncited: false,
        cancelled: true,
    }
}

fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "Answer the question using only the numbered context below. \
         Cite every piece of context you rely on with its [n] marker. \
         If the context does not contain the answer, say so.\n\n\
         Context:\n{context}\n\nQuestion: {question}\n\nAnswer:"
    )
}

/// Distinct `[n]` markers present in `answer`, ascending, restricted to
/// the valid range `1..=max_ref`.
fn extract_citations(answer: &str, max_ref: usize) -> Vec<usize> {
    static CITATION_RE: OnceLock<Regex> = OnceLock::new();
    let re = CITATION_RE.get_or_init(|| Regex::new(r"\[(\d+)\]").expect("citation pattern"));

    let mut seen = BTreeSet::new();
    for capture in re.captures_iter(answer) {
        if let Ok(n) = capture[1].parse::<usize>() {
            if (1..=max_ref).contains(&n) {
                seen.insert(n);
            }
        }
    }
    seen.into_iter().collect()
}
