use crate::config::AnalysisOptions;
use crate::context::assemble;
use crate::extraction::{ExtractionStage, Extractor};
use crate::policy::{PolicyDecision, PolicyGate};
use crate::schema::DocumentSummary;
use crate::traits::{ChunkRetriever, CompletionProvider};
use crate::PipelineError;
use std::time::Instant;
use tracing::{info, warn};

/// Policy gate, retrieval, context assembly and extraction, run in that order
/// for each query. Holds no per-query state, so one instance serves many queries.
pub struct DocumentAnalyzer<R, C> {
    policy: PolicyGate,
    retriever: R,
    extractor: Extractor<C>,
    options: AnalysisOptions,
}

impl<R, C> DocumentAnalyzer<R, C>
where
    R: ChunkRetriever,
    C: CompletionProvider,
{
    pub fn new(policy: PolicyGate, retriever: R, completions: C, options: AnalysisOptions) -> Self {
        Self {
            policy,
            retriever,
            extractor: Extractor::new(completions, options.clone()),
            options,
        }
    }

    pub fn evaluate_policy(&self, query: &str) -> PolicyDecision {
        self.policy.evaluate(query)
    }

    pub fn retriever(&self) -> &R {
        &self.retriever
    }

    pub fn extractor(&self) -> &Extractor<C> {
        &self.extractor
    }

    pub async fn analyze(&self, query: &str, top_k: usize) -> Result<DocumentSummary, PipelineError> {
        let started = Instant::now();
        info!(query_len = query.chars().count(), top_k, "analyze_document");

        let decision = self.policy.evaluate(query);
        if decision.is_refusal() {
            let reason = decision
                .primary_reason()
                .map(|reason| reason.as_str())
                .unwrap_or("policy_refusal");
            warn!(reason, "query refused by policy, skipping retrieval and extraction");
            return Ok(DocumentSummary::refusal(reason));
        }

        let search_started = Instant::now();
        let chunks = self.retriever.search(query, top_k).await?;
        let context = assemble(&chunks, self.options.max_context_chars);
        info!(
            chunks_returned = chunks.len(),
            context_chars = context.chars().count(),
            search_ms = search_started.elapsed().as_secs_f64() * 1000.0,
            "retrieval"
        );

        let parse_started = Instant::now();
        let extraction = self.extractor.extract(&context).await?;
        if extraction.stage != ExtractionStage::EmptyContext {
            info!(
                stage = ?extraction.stage,
                parse_ms = parse_started.elapsed().as_secs_f64() * 1000.0,
                total_ms = started.elapsed().as_secs_f64() * 1000.0,
                "done"
            );
        }

        Ok(extraction.summary)
    }
}
