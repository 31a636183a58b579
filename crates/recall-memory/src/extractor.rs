// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM-based fact extraction and knowledge consolidation.
//!
//! Extracted facts are reconciled against the nearest existing knowledge
//! before they are written. Candidates above the similarity threshold are
//! shown to the model, which decides whether the new fact is added, replaces
//! an old one, retires an old one, or is already known. Every failure along
//! the decision path falls back to adding the fact, so nothing extracted is
//! silently lost.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use recall_config::MemoryConfig;
use recall_core::error::RecallError;
use recall_core::traits::ProviderAdapter;
use recall_core::types::{ProviderMessage, ProviderRequest};
use serde::Deserialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::chunk;
use crate::decode::{decode_list, decode_object};
use crate::metrics;
use crate::relations::RelationStore;
use crate::store::VectorStore;
use crate::types::{ExtractedFact, KnowledgeIndexOpts, MemoryResult, Relation, truncate_runes};

const EXTRACTION_PROMPT: &str = r#"Extract key facts about the user from this conversation. Look for:
- Biographical details (name, location, occupation, plans)
- Preferences and opinions
- Tasks, deadlines, and goals
- People the user mentions and how they relate
- Important context such as events, decisions, or current state

Return a JSON array. Every fact must be a standalone statement.
Return [] when there is nothing worth remembering.

Categories: biographical, preference, task, relationship, contextual

Example:
[
  {"fact": "User studies at QMUL", "category": "biographical"},
  {"fact": "User prefers dark mode in all apps", "category": "preference"}
]

CONVERSATION:
User: {user}
Assistant: {assistant}

Return ONLY valid JSON with no markdown fences or commentary."#;

const SPECIALIST_EXTRACTION_PROMPT: &str = r#"Extract key facts and information from the content below. Keep:
- Names, dates, amounts, places, and deadlines
- Agreements, decisions, and commitments
- Relationships between people and organisations
- Concrete details such as prices, quantities, schedules, and contact info

Each fact must stand alone and say WHO said or did it and WHEN.
Categories: financial, operational, logistic, contractual, relationship, decision, contact, contextual

Return a JSON array, or [] when there is nothing worth keeping.

Example:
[
  {"fact": "Charlie confirmed the venue booking for June 15th at The Grand Hall", "category": "logistic"},
  {"fact": "Sarah approved a $5,000 catering budget on 2024-03-01", "category": "financial"}
]

CONTENT:
{content}

Return ONLY valid JSON with no markdown fences or commentary."#;

const CONSOLIDATION_PROMPT: &str = r#"You maintain a knowledge base. A new fact was extracted and similar facts already exist.

NEW FACT: {fact}

EXISTING SIMILAR FACTS:
{existing}

Choose one action:
- UPDATE: the new fact supersedes an existing one (e.g. a new address). Give the merged fact.
- DELETE: an existing fact is now obsolete because of the new fact. Name it.
- NOOP: the new fact says the same thing as an existing one.
- ADD: the new fact is related but distinct. Keep both.

Return ONLY valid JSON:
{"action": "UPDATE|DELETE|NOOP|ADD", "fact_id": "id of the existing fact, if any", "new_fact": "merged text for UPDATE"}"#;

const RELATION_PROMPT: &str = r#"List the relationships between named entities (people, organisations, places, projects) stated in the text below.

Return a JSON array of triples using short lowercase predicates:
[{"s": "Alice", "p": "works_at", "o": "Acme"}]

Return [] when no relationship is stated.

TEXT:
{text}

Return ONLY valid JSON with no markdown fences or commentary."#;

/// Tunables for extraction and consolidation.
#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    /// Model used for every extraction and decision call.
    pub model: String,
    /// Candidates must score strictly above this to reach the decision step.
    pub consolidation_threshold: f32,
    /// Nearest facts fetched per new fact.
    pub consolidation_candidates: usize,
    pub decision_timeout: Duration,
    /// Shorter inputs are never sent for extraction.
    pub min_chars: usize,
    pub assistant_max_runes: usize,
    pub window_size: usize,
    pub window_overlap: usize,
    /// Hold a per-scope lock across search-then-write.
    pub serialize_consolidation: bool,
}

impl ExtractorSettings {
    /// Defaults for everything except the model.
    pub fn new(model: impl Into<String>) -> Self {
        Self::from_config(&MemoryConfig::default(), model)
    }

    pub fn from_config(config: &MemoryConfig, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            consolidation_threshold: config.consolidation_threshold,
            consolidation_candidates: config.consolidation_candidates,
            decision_timeout: Duration::from_secs(config.decision_timeout_secs),
            min_chars: config.extraction_min_chars,
            assistant_max_runes: config.assistant_max_runes,
            window_size: config.window_size,
            window_overlap: config.window_overlap,
            serialize_consolidation: config.serialize_consolidation,
        }
    }
}

/// The action a consolidation decision resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsolidationAction {
    Add,
    Update,
    Delete,
    Noop,
}

impl ConsolidationAction {
    /// Parse a model-provided action. Unknown values resolve to `Add`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "UPDATE" => ConsolidationAction::Update,
            "DELETE" => ConsolidationAction::Delete,
            "NOOP" => ConsolidationAction::Noop,
            _ => ConsolidationAction::Add,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            ConsolidationAction::Add => "add",
            ConsolidationAction::Update => "update",
            ConsolidationAction::Delete => "delete",
            ConsolidationAction::Noop => "noop",
        }
    }
}

/// The decision object returned by the model.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConsolidationDecision {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub fact_id: String,
    #[serde(default)]
    pub new_fact: String,
}

/// What consolidating one fact did to the knowledge collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsolidationOutcome {
    /// A new document was inserted.
    Added { id: String },
    /// The referenced fact was removed (best effort) and a merged fact inserted.
    Updated { replaced: Option<String>, id: String },
    /// The referenced fact was removed and nothing was inserted.
    Deleted { id: String },
    /// No mutation.
    Unchanged,
}

/// Summary of a document ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub windows: usize,
    pub failed_windows: usize,
    pub facts_extracted: usize,
    pub outcomes: Vec<ConsolidationOutcome>,
}

/// Extracts facts with an LLM and consolidates them into the knowledge base.
pub struct KnowledgeExtractor {
    provider: Arc<dyn ProviderAdapter>,
    store: Arc<VectorStore>,
    settings: ExtractorSettings,
    scope_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KnowledgeExtractor {
    pub fn new(
        provider: Arc<dyn ProviderAdapter>,
        store: Arc<VectorStore>,
        settings: ExtractorSettings,
    ) -> Self {
        Self {
            provider,
            store,
            settings,
            scope_locks: DashMap::new(),
        }
    }

    pub fn settings(&self) -> &ExtractorSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    /// Extract user-centric facts from one conversation turn.
    pub async fn extract_facts(
        &self,
        user_msg: &str,
        assistant_msg: &str,
    ) -> Result<Vec<ExtractedFact>, RecallError> {
        if user_msg.chars().count() < self.settings.min_chars {
            return Ok(Vec::new());
        }

        let prompt = EXTRACTION_PROMPT
            .replace("{user}", user_msg)
            .replace(
                "{assistant}",
                &truncate_with_ellipsis(assistant_msg, self.settings.assistant_max_runes),
            );
        self.extract_with_prompt(prompt).await
    }

    /// Extract provenance-preserving facts from arbitrary content.
    pub async fn extract_specialist_facts(
        &self,
        content: &str,
    ) -> Result<Vec<ExtractedFact>, RecallError> {
        if content.chars().count() < self.settings.min_chars {
            return Ok(Vec::new());
        }

        let prompt = SPECIALIST_EXTRACTION_PROMPT.replace("{content}", content);
        self.extract_with_prompt(prompt).await
    }

    async fn extract_with_prompt(&self, prompt: String) -> Result<Vec<ExtractedFact>, RecallError> {
        let response = self.provider.complete(self.request(prompt, 1024)).await?;
        let facts: Vec<ExtractedFact> =
            decode_list(&response.content, |f: &ExtractedFact| !f.fact.is_empty())?;
        let facts: Vec<ExtractedFact> = facts
            .into_iter()
            .filter(|f| !f.fact.trim().is_empty())
            .collect();
        metrics::record_facts_extracted(facts.len());
        Ok(facts)
    }

    /// Reconcile one fact with the knowledge already stored in `specialist`'s scope.
    pub async fn consolidate_fact(
        &self,
        fact: &ExtractedFact,
        specialist: &str,
        opts: &KnowledgeIndexOpts,
    ) -> Result<ConsolidationOutcome, RecallError> {
        let mut opts = opts.clone();
        opts.specialist = (!specialist.is_empty()).then(|| specialist.to_string());

        let _guard = self.scope_guard(specialist).await;

        let existing = match self
            .store
            .search_knowledge_scoped(&fact.fact, self.settings.consolidation_candidates, specialist)
            .await
        {
            Ok(existing) => existing,
            Err(e) => {
                debug!(error = %e, "similarity search failed, adding fact as new");
                return self.add(&fact.fact, &fact.category, &opts).await;
            }
        };

        let similar: Vec<MemoryResult> = existing
            .into_iter()
            .filter(|r| r.score > self.settings.consolidation_threshold)
            .collect();

        if similar.is_empty() {
            return self.add(&fact.fact, &fact.category, &opts).await;
        }

        let decision = match self.decide(fact, &similar).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(error = %e, "consolidation decision failed, adding as new");
                return self.add(&fact.fact, &fact.category, &opts).await;
            }
        };

        let action = ConsolidationAction::parse(&decision.action);
        debug!(
            action = action.as_str(),
            fact_id = %decision.fact_id,
            candidates = similar.len(),
            "consolidation decision"
        );

        match action {
            ConsolidationAction::Add => self.add(&fact.fact, &fact.category, &opts).await,
            ConsolidationAction::Update => {
                let text = if decision.new_fact.trim().is_empty() {
                    fact.fact.as_str()
                } else {
                    decision.new_fact.as_str()
                };
                // Insert first: a failed write must leave the old fact in place.
                let id = self
                    .store
                    .index_knowledge_with_opts(None, text, &fact.category, &opts)
                    .await?;
                let replaced = (!decision.fact_id.is_empty()).then(|| decision.fact_id.clone());
                if let Some(old) = &replaced
                    && let Err(e) = self.store.delete_knowledge(old).await
                {
                    debug!(error = %e, fact_id = %old, "could not remove superseded fact");
                }
                metrics::record_consolidation("update");
                Ok(ConsolidationOutcome::Updated { replaced, id })
            }
            ConsolidationAction::Delete => {
                if decision.fact_id.is_empty() {
                    metrics::record_consolidation("noop");
                    return Ok(ConsolidationOutcome::Unchanged);
                }
                self.store.delete_knowledge(&decision.fact_id).await?;
                metrics::record_consolidation("delete");
                Ok(ConsolidationOutcome::Deleted {
                    id: decision.fact_id,
                })
            }
            ConsolidationAction::Noop => {
                metrics::record_consolidation("noop");
                Ok(ConsolidationOutcome::Unchanged)
            }
        }
    }

    /// Extract facts from a turn and consolidate them one at a time.
    ///
    /// Runs on the background path: failures are logged, and the outcomes
    /// of the facts that did consolidate are returned.
    pub async fn extract_and_consolidate(
        &self,
        user_msg: &str,
        assistant_msg: &str,
        session_key: &str,
        specialist: &str,
        opts: &KnowledgeIndexOpts,
    ) -> Vec<ConsolidationOutcome> {
        let facts = match self.extract_facts(user_msg, assistant_msg).await {
            Ok(facts) => facts,
            Err(e) => {
                warn!(error = %e, session_key = %session_key, specialist = %specialist, "knowledge extraction failed");
                return Vec::new();
            }
        };

        if facts.is_empty() {
            debug!(session_key = %session_key, "no facts extracted from conversation");
            return Vec::new();
        }

        info!(count = facts.len(), session_key = %session_key, specialist = %specialist, "extracted facts from conversation");
        self.consolidate_all(&facts, specialist, opts).await
    }

    /// Specialist pipeline: window the content, extract per window, and
    /// consolidate every fact into the specialist's scope.
    pub async fn extract_and_consolidate_specialist(
        &self,
        content: &str,
        question: &str,
        session_key: &str,
        specialist: &str,
        opts: &KnowledgeIndexOpts,
    ) -> Vec<ConsolidationOutcome> {
        let combined = if question.is_empty() {
            content.to_string()
        } else {
            format!("Question: {question}\n\nResponse: {content}")
        };

        let mut outcomes = Vec::new();
        for window in chunk::windows(&combined, self.settings.window_size, self.settings.window_overlap) {
            let facts = match self.extract_specialist_facts(window).await {
                Ok(facts) => facts,
                Err(e) => {
                    warn!(error = %e, session_key = %session_key, specialist = %specialist, "specialist knowledge extraction failed");
                    continue;
                }
            };
            if facts.is_empty() {
                continue;
            }
            info!(count = facts.len(), specialist = %specialist, "extracted specialist facts");
            outcomes.extend(self.consolidate_all(&facts, specialist, opts).await);
        }
        outcomes
    }

    /// Synchronously ingest a document into the scope named by `opts`.
    ///
    /// Facts without a category get `default_category`. Returns an error only
    /// when every window failed to extract.
    pub async fn ingest_document(
        &self,
        content: &str,
        default_category: &str,
        opts: &KnowledgeIndexOpts,
    ) -> Result<IngestReport, RecallError> {
        if content.trim().is_empty() {
            return Err(RecallError::InvalidArgument(
                "content must not be empty".to_string(),
            ));
        }

        let specialist = opts.scope().unwrap_or("").to_string();
        let default_category = if default_category.is_empty() {
            "contextual"
        } else {
            default_category
        };

        let windows = chunk::windows(content, self.settings.window_size, self.settings.window_overlap);
        let mut report = IngestReport {
            windows: windows.len(),
            ..IngestReport::default()
        };
        let mut last_error = None;

        for window in windows {
            let facts = match self.extract_specialist_facts(window).await {
                Ok(facts) => facts,
                Err(e) => {
                    warn!(error = %e, specialist = %specialist, "failed to extract facts from window");
                    report.failed_windows += 1;
                    last_error = Some(e);
                    continue;
                }
            };

            report.facts_extracted += facts.len();
            for mut fact in facts {
                if fact.category.is_empty() {
                    fact.category = default_category.to_string();
                }
                match self.consolidate_fact(&fact, &specialist, opts).await {
                    Ok(outcome) => report.outcomes.push(outcome),
                    Err(e) => warn!(error = %e, fact = %fact.fact, "failed to consolidate ingested fact"),
                }
            }
        }

        if report.failed_windows == report.windows
            && let Some(e) = last_error
        {
            return Err(e);
        }

        info!(
            specialist = %specialist,
            windows = report.windows,
            facts = report.facts_extracted,
            "document ingested"
        );
        Ok(report)
    }

    /// Ask the model for entity relations stated in `text`.
    pub async fn extract_relations(&self, text: &str) -> Result<Vec<Relation>, RecallError> {
        if text.chars().count() < self.settings.min_chars {
            return Ok(Vec::new());
        }

        #[derive(Deserialize)]
        struct Triple {
            #[serde(default)]
            s: String,
            #[serde(default)]
            p: String,
            #[serde(default)]
            o: String,
        }

        let prompt = RELATION_PROMPT.replace("{text}", text);
        let response = self.provider.complete(self.request(prompt, 512)).await?;
        let triples: Vec<Triple> = decode_list(&response.content, |t: &Triple| !t.s.is_empty())?;

        Ok(triples
            .into_iter()
            .filter_map(|t| {
                let (s, p, o) = (t.s.trim(), t.p.trim(), t.o.trim());
                (!s.is_empty() && !p.is_empty() && !o.is_empty()).then(|| Relation::new(s, p, o))
            })
            .collect())
    }

    /// Extract relations from `text` and add them to `relations` under `specialist`.
    ///
    /// Returns how many were new.
    pub async fn extract_and_store_relations(
        &self,
        text: &str,
        specialist: &str,
        relations: &RelationStore,
    ) -> Result<usize, RecallError> {
        let mut added = 0;
        for relation in self.extract_relations(text).await? {
            if relations.add(relation.scoped(specialist)).await? {
                added += 1;
            }
        }
        Ok(added)
    }

    async fn consolidate_all(
        &self,
        facts: &[ExtractedFact],
        specialist: &str,
        opts: &KnowledgeIndexOpts,
    ) -> Vec<ConsolidationOutcome> {
        let mut outcomes = Vec::with_capacity(facts.len());
        for fact in facts {
            match self.consolidate_fact(fact, specialist, opts).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!(error = %e, fact = %fact.fact, "failed to consolidate fact"),
            }
        }
        outcomes
    }

    async fn add(
        &self,
        fact: &str,
        category: &str,
        opts: &KnowledgeIndexOpts,
    ) -> Result<ConsolidationOutcome, RecallError> {
        let id = self
            .store
            .index_knowledge_with_opts(None, fact, category, opts)
            .await?;
        metrics::record_consolidation("add");
        Ok(ConsolidationOutcome::Added { id })
    }

    async fn decide(
        &self,
        fact: &ExtractedFact,
        similar: &[MemoryResult],
    ) -> Result<ConsolidationDecision, RecallError> {
        let existing = similar
            .iter()
            .map(|s| format!("- [ID: {}] {} (score: {:.2})", s.id, s.content, s.score))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = CONSOLIDATION_PROMPT
            .replace("{fact}", &fact.fact)
            .replace("{existing}", &existing);

        let timeout = self.settings.decision_timeout;
        let response = tokio::time::timeout(timeout, self.provider.complete(self.request(prompt, 256)))
            .await
            .map_err(|_| RecallError::Timeout { duration: timeout })??;

        decode_object(&response.content)
    }

    /// Serializes search-then-write per scope when enabled.
    async fn scope_guard(&self, specialist: &str) -> Option<OwnedMutexGuard<()>> {
        if !self.settings.serialize_consolidation {
            return None;
        }
        let lock = self
            .scope_locks
            .entry(specialist.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        Some(lock.lock_owned().await)
    }

    fn request(&self, prompt: String, max_tokens: u32) -> ProviderRequest {
        ProviderRequest {
            model: self.settings.model.clone(),
            system_prompt: None,
            messages: vec![ProviderMessage::user(prompt)],
            max_tokens,
            temperature: Some(0.1),
        }
    }
}

fn truncate_with_ellipsis(text: &str, max: usize) -> String {
    let truncated = truncate_runes(text, max);
    if truncated.len() == text.len() {
        text.to_string()
    } else {
        format!("{truncated}...")
    }
}
