use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use super::prompt::{build_prompt, fit_context};
use crate::llm::LanguageModel;
use crate::models::{Answer, RetrievalResult};

pub const NO_CONTEXT_MESSAGE: &str = "No relevant information found in the knowledge base.";

pub const LLM_FALLBACK_MESSAGE: &str =
    "The answer could not be generated because the language model is unavailable. Please try again later.";

/// Turns ranked context into a grounded, provenance-annotated answer.
pub struct AnswerEngine {
    llm: Arc<dyn LanguageModel>,
    generate_timeout: Duration,
}

impl AnswerEngine {
    pub fn new(llm: Arc<dyn LanguageModel>, generate_timeout: Duration) -> Self {
        Self { llm, generate_timeout }
    }

    /// Never fails: model errors become `AnswerStatus::LlmError`, and an empty context
    /// short-circuits to `AnswerStatus::NoContext` without calling the model.
    pub async fn answer(&self, question: &str, context: &RetrievalResult, max_context_chars: usize) -> Answer {
        self.answer_since(Instant::now(), question, context, max_context_chars)
            .await
    }

    pub(crate) async fn answer_since(
        &self,
        started: Instant,
        question: &str,
        context: &RetrievalResult,
        max_context_chars: usize,
    ) -> Answer {
        let elapsed = || started.elapsed().as_millis() as u64;

        let window = fit_context(context, max_context_chars);
        if window.is_empty() {
            tracing::debug!(retrieved = context.len(), "no usable context, skipping generation");
            return Answer::no_context(NO_CONTEXT_MESSAGE, elapsed());
        }

        tracing::debug!(
            included = window.sources.len(),
            retrieved = context.len(),
            context_chars = window.char_len(),
            "prompting language model"
        );
        let prompt = build_prompt(question, &window);

        let outcome = match timeout(self.generate_timeout, self.llm.generate(&prompt)).await {
            Ok(result) => result.map_err(|e| format!("{:#}", e)),
            Err(_) => Err(format!("generation timed out after {:?}", self.generate_timeout)),
        };

        match outcome {
            Ok(text) => Answer::ok(text, window.sources, elapsed()),
            Err(error) => {
                tracing::warn!("Language model failed: {}", error);
                Answer::llm_error(LLM_FALLBACK_MESSAGE, error, elapsed())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnswerStatus;
    use crate::testing::{ranked, CountingModel, FailingModel, SlowModel};

    fn engine(llm: Arc<dyn LanguageModel>) -> AnswerEngine {
        AnswerEngine::new(llm, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_empty_context_skips_the_model() {
        let model = Arc::new(CountingModel::new("unused"));
        let answer = engine(model.clone())
            .answer("anything", &RetrievalResult::empty(), 1000)
            .await;

        assert_eq!(answer.status(), AnswerStatus::NoContext);
        assert_eq!(answer.text(), NO_CONTEXT_MESSAGE);
        assert!(answer.sources().is_empty());
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_ok_answer_lists_included_sources_in_rank_order() {
        let model = Arc::new(CountingModel::new("Because of Rayleigh scattering."));
        let context = ranked(&[("c1", "The sky is blue."), ("c2", "Light scatters.")]);
        let answer = engine(model.clone()).answer("Why is the sky blue?", &context, 1000).await;

        assert_eq!(answer.status(), AnswerStatus::Ok);
        assert_eq!(answer.text(), "Because of Rayleigh scattering.");
        assert_eq!(answer.sources(), &["c1".to_string(), "c2".to_string()]);
        assert_eq!(model.calls(), 1);

        let prompt = model.last_prompt().unwrap();
        assert!(prompt.contains("Why is the sky blue?"));
        assert!(prompt.find("The sky is blue.") < prompt.find("Light scatters."));
    }

    #[tokio::test]
    async fn test_truncation_limits_sources() {
        let model = Arc::new(CountingModel::new("ok"));
        let long = "a".repeat(1000);
        let context = ranked(&[("c1", &long), ("c2", &long), ("c3", &long)]);
        let answer = engine(model.clone()).answer("q", &context, 1500).await;

        assert_eq!(answer.status(), AnswerStatus::Ok);
        assert_eq!(answer.sources(), &["c1".to_string()]);
        for id in answer.sources() {
            assert!(context.contains(id));
        }
        // one 1000-char chunk in the prompt, not two
        let prompt = model.last_prompt().unwrap();
        assert_eq!(prompt.matches(&long).count(), 1);
    }

    #[tokio::test]
    async fn test_model_failure_degrades_to_llm_error() {
        let context = ranked(&[("c1", "text")]);
        let answer = engine(Arc::new(FailingModel)).answer("q", &context, 1000).await;

        assert_eq!(answer.status(), AnswerStatus::LlmError);
        assert_eq!(answer.text(), LLM_FALLBACK_MESSAGE);
        assert!(answer.sources().is_empty());
        assert!(answer.error().is_some());
    }

    #[tokio::test]
    async fn test_model_timeout_degrades_to_llm_error() {
        let context = ranked(&[("c1", "text")]);
        let engine = AnswerEngine::new(Arc::new(SlowModel::new(Duration::from_secs(5))), Duration::from_millis(50));
        let answer = engine.answer("q", &context, 1000).await;

        assert_eq!(answer.status(), AnswerStatus::LlmError);
        assert!(!answer.text().is_empty());
        assert!(answer.sources().is_empty());
        assert!(answer.error().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_budget_too_small_for_any_chunk_is_no_context() {
        let model = Arc::new(CountingModel::new("unused"));
        let context = ranked(&[("c1", "text")]);
        let answer = engine(model.clone()).answer("q", &context, 3).await;

        assert_eq!(answer.status(), AnswerStatus::NoContext);
        assert_eq!(model.calls(), 0);
    }
}
