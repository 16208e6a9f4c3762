//! Retrieval-augmented answer generation.
//!
//! One [`RetrievalChain::ask`] call answers one user query: embed the
//! query, fetch the top-k most similar chunks from the index, assemble a
//! bounded context window, and hand everything to the language model
//! together with the recent conversation. The conversation state is only
//! mutated after the model answers — a failed call leaves it untouched,
//! so the caller can simply retry.

use anyhow::{bail, Result};

use crate::config::RetrievalConfig;
use crate::conversation::{ConversationState, ConversationTurn};
use crate::embedding::Embedder;
use crate::index::{QueryMatch, VectorIndex};
use crate::llm::{GenerationRequest, LanguageModel};

/// Instructions handed to the model with every request; the retrieved
/// context is appended to these.
pub const SYSTEM_PROMPT: &str = "You are an assistant for question-answering tasks. \
Use the following pieces of retrieved context to answer the question. \
If you don't know the answer, just say that you don't know.";

/// Where an answer came from: one retrieved chunk that made it into the
/// context window.
#[derive(Debug, Clone)]
pub struct Citation {
    pub document_id: String,
    pub chunk_index: usize,
    pub score: f32,
    pub snippet: String,
}

/// A synthesized answer plus the sources behind it.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<Citation>,
}

pub struct RetrievalChain {
    embedder: Box<dyn Embedder>,
    index: Box<dyn VectorIndex>,
    llm: Box<dyn LanguageModel>,
    retrieval: RetrievalConfig,
}

impl RetrievalChain {
    pub fn new(
        embedder: Box<dyn Embedder>,
        index: Box<dyn VectorIndex>,
        llm: Box<dyn LanguageModel>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            llm,
            retrieval,
        }
    }

    /// Answer one query against the index and the given conversation.
    ///
    /// On success the query and the answer are appended to `state` as new
    /// turns. On any failure — index, embedding, or model — the state is
    /// unchanged and no partial turn is appended.
    pub async fn ask(&self, query: &str, state: &mut ConversationState) -> Result<Answer> {
        if query.trim().is_empty() {
            bail!("query must not be empty");
        }

        // Retrieval against a differently-dimensioned index would return
        // meaningless similarity scores; halt instead.
        if self.embedder.dims() != self.index.dims() {
            bail!(
                "embedding dimension {} does not match index dimension {} — \
                 the index was built with a different embedding model",
                self.embedder.dims(),
                self.index.dims()
            );
        }

        let query_vec = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("empty embedding response"))?;

        let matches = self.index.query(&query_vec, self.retrieval.top_k).await?;

        let (context, kept) = assemble_context(&matches, self.retrieval.context_budget);

        let request = GenerationRequest {
            system: SYSTEM_PROMPT.to_string(),
            context,
            history: state.recent(self.retrieval.history_depth).to_vec(),
            query: query.to_string(),
        };

        let answer_text = self.llm.generate(&request).await?;

        state.append(ConversationTurn::user(query));
        state.append(ConversationTurn::assistant(answer_text.clone()));

        Ok(Answer {
            text: answer_text,
            sources: citations(&matches[..kept]),
        })
    }
}

/// Concatenate retrieved chunk texts, highest similarity first, up to
/// `budget` characters. When the budget would be exceeded the
/// lowest-similarity chunks are the ones dropped; the best match is
/// always kept even if it alone exceeds the budget, since an empty
/// context helps nobody. Returns the assembled text and how many matches
/// were kept.
fn assemble_context(matches: &[QueryMatch], budget: usize) -> (String, usize) {
    let mut context = String::new();
    let mut kept = 0;

    for m in matches {
        let addition = m.text.chars().count() + if context.is_empty() { 0 } else { 2 };
        if kept > 0 && context.chars().count() + addition > budget {
            break;
        }
        if !context.is_empty() {
            context.push_str("\n\n");
        }
        context.push_str(&m.text);
        kept += 1;
    }

    (context, kept)
}

/// Deduplicated source references for the chunks that made it into the
/// context, preserving descending-similarity order.
fn citations(matches: &[QueryMatch]) -> Vec<Citation> {
    let mut seen = std::collections::HashSet::new();
    matches
        .iter()
        .filter(|m| seen.insert((m.document_id.clone(), m.chunk_index)))
        .map(|m| Citation {
            document_id: m.document_id.clone(),
            chunk_index: m.chunk_index,
            score: m.score,
            snippet: m.text.chars().take(200).collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbedError;
    use crate::index::{IndexError, IndexRecord};
    use crate::llm::LlmError;
    use async_trait::async_trait;

    // ============ Test doubles ============

    /// Maps known texts to fixed 3-dimensional vectors.
    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        fn model_name(&self) -> &str {
            "stub"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            if texts.is_empty() {
                return Err(EmbedError::InvalidInput("empty batch".into()));
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
        }
    }

    /// Serves a fixed set of scored matches regardless of the vector.
    struct StubIndex {
        dims: usize,
        matches: Vec<QueryMatch>,
    }

    impl StubIndex {
        fn with_scores(scores: &[(f32, &str)]) -> Self {
            let mut matches: Vec<QueryMatch> = scores
                .iter()
                .enumerate()
                .map(|(i, (score, text))| QueryMatch {
                    id: format!("c{}", i),
                    score: *score,
                    text: text.to_string(),
                    document_id: "doc.pdf".to_string(),
                    chunk_index: i,
                })
                .collect();
            matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
            Self { dims: 3, matches }
        }
    }

    #[async_trait]
    impl VectorIndex for StubIndex {
        fn dims(&self) -> usize {
            self.dims
        }
        async fn upsert(&self, _records: &[IndexRecord]) -> Result<(), IndexError> {
            Ok(())
        }
        async fn query(&self, _vector: &[f32], k: usize) -> Result<Vec<QueryMatch>, IndexError> {
            Ok(self.matches.iter().take(k).cloned().collect())
        }
    }

    struct CannedLlm;

    #[async_trait]
    impl LanguageModel for CannedLlm {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String, LlmError> {
            Ok("the canned answer".to_string())
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LanguageModel for FailingLlm {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String, LlmError> {
            Err(LlmError::Unavailable("provider down".into()))
        }
    }

    fn chain_with(index: StubIndex, llm: Box<dyn LanguageModel>) -> RetrievalChain {
        RetrievalChain::new(
            Box::new(StubEmbedder),
            Box::new(index),
            llm,
            RetrievalConfig {
                top_k: 3,
                context_budget: 6000,
                history_depth: 6,
            },
        )
    }

    fn five_record_index() -> StubIndex {
        StubIndex::with_scores(&[
            (0.9, "alpha"),
            (0.1, "epsilon"),
            (0.7, "beta"),
            (0.5, "gamma"),
            (0.3, "delta"),
        ])
    }

    // ============ Retrieval properties ============

    #[tokio::test]
    async fn top_k_of_five_returns_three_in_non_increasing_order() {
        let chain = chain_with(five_record_index(), Box::new(CannedLlm));
        let mut state = ConversationState::new();

        let answer = chain.ask("what is alpha?", &mut state).await.unwrap();
        assert_eq!(answer.sources.len(), 3);
        for pair in answer.sources.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert_eq!(answer.sources[0].snippet, "alpha");
    }

    #[tokio::test]
    async fn underfilled_index_returns_fewer_not_error() {
        let index = StubIndex::with_scores(&[(0.8, "alpha"), (0.6, "beta")]);
        let chain = RetrievalChain::new(
            Box::new(StubEmbedder),
            Box::new(index),
            Box::new(CannedLlm),
            RetrievalConfig {
                top_k: 10,
                context_budget: 6000,
                history_depth: 6,
            },
        );
        let mut state = ConversationState::new();

        let answer = chain.ask("anything", &mut state).await.unwrap();
        assert_eq!(answer.sources.len(), 2);
    }

    #[tokio::test]
    async fn successful_ask_appends_both_turns() {
        let chain = chain_with(five_record_index(), Box::new(CannedLlm));
        let mut state = ConversationState::new();

        let answer = chain.ask("what is alpha?", &mut state).await.unwrap();
        assert_eq!(answer.text, "the canned answer");
        assert_eq!(state.len(), 2);
        let turns = state.recent(2);
        assert_eq!(turns[0].text, "what is alpha?");
        assert_eq!(turns[1].text, "the canned answer");
    }

    #[tokio::test]
    async fn llm_failure_leaves_conversation_untouched() {
        let chain = chain_with(five_record_index(), Box::new(FailingLlm));
        let mut state = ConversationState::new();
        state.append(ConversationTurn::user("earlier question"));
        state.append(ConversationTurn::assistant("earlier answer"));

        let err = chain.ask("what is beta?", &mut state).await.unwrap_err();
        assert!(err.to_string().contains("unavailable"));
        assert_eq!(state.len(), 2);
        assert_eq!(state.recent(2)[0].text, "earlier question");
        assert_eq!(state.recent(2)[1].text, "earlier answer");
    }

    #[tokio::test]
    async fn dimension_mismatch_halts_retrieval() {
        let index = StubIndex {
            dims: 384,
            matches: Vec::new(),
        };
        let chain = chain_with(index, Box::new(CannedLlm));
        let mut state = ConversationState::new();

        let err = chain.ask("anything", &mut state).await.unwrap_err();
        assert!(err.to_string().contains("dimension"));
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn empty_query_rejected() {
        let chain = chain_with(five_record_index(), Box::new(CannedLlm));
        let mut state = ConversationState::new();
        assert!(chain.ask("   ", &mut state).await.is_err());
        assert!(state.is_empty());
    }

    // ============ Context assembly ============

    fn scored(score: f32, text: &str, index: usize) -> QueryMatch {
        QueryMatch {
            id: format!("c{}", index),
            score,
            text: text.to_string(),
            document_id: "doc.pdf".to_string(),
            chunk_index: index,
        }
    }

    #[test]
    fn context_keeps_highest_similarity_within_budget() {
        let matches = vec![
            scored(0.9, "aaaaaaaaaa", 0),
            scored(0.8, "bbbbbbbbbb", 1),
            scored(0.7, "cccccccccc", 2),
        ];
        // Budget fits two 10-char chunks plus one separator.
        let (context, kept) = assemble_context(&matches, 22);
        assert_eq!(kept, 2);
        assert_eq!(context, "aaaaaaaaaa\n\nbbbbbbbbbb");
    }

    #[test]
    fn oversized_best_match_is_kept_alone() {
        let matches = vec![scored(0.9, "a very long best chunk", 0), scored(0.5, "x", 1)];
        let (context, kept) = assemble_context(&matches, 5);
        assert_eq!(kept, 1);
        assert_eq!(context, "a very long best chunk");
    }

    #[test]
    fn no_matches_is_empty_context() {
        let (context, kept) = assemble_context(&[], 100);
        assert!(context.is_empty());
        assert_eq!(kept, 0);
    }

    #[test]
    fn citations_deduplicate_by_document_and_position() {
        let matches = vec![scored(0.9, "same chunk", 0), scored(0.8, "same chunk", 0)];
        let cites = citations(&matches);
        assert_eq!(cites.len(), 1);
        assert_eq!(cites[0].chunk_index, 0);
    }
}
