
use itertools::Itertools;
use tracing::debug;

use crate::Result;
use crate::config::TOP_K;

/// Instruction placed between the retrieved context and the question.
const PROMPT_INSTRUCTION: &str = "Please answer the question using the above text. Question: ";

/// One passage returned by the similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPassage {
    pub distance: f32,
    pub text: String,
}

/// Converts text to a fixed-length embedding vector.
pub trait Embed {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Nearest-neighbor search over stored passages, nearest-first.
pub trait SearchPassages {
    fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredPassage>>;
}

/// Hosted text generation with fixed decoding parameters.
pub trait GenerateText {
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// The generated answer for one question, together with the passage block the
/// prompt was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct RagAnswer {
    pub answer: String,
    pub context: String,
}

/// Object-safe entry point for the presentation layer.
pub trait QuestionAnswerer: Send + Sync {
    fn answer(&self, question: &str) -> Result<RagAnswer>;
}

/// Join retrieved passages and the question into the generation prompt.
///
/// Passages are separated by one blank line; the question is appended verbatim
/// after the fixed instruction. No escaping, no truncation. With no passages
/// the prompt degenerates to the instruction and question alone.
#[inline]
pub fn compose_prompt(passages: &[String], question: &str) -> String {
    format!(
        "{}\n\n{PROMPT_INSTRUCTION}{question}",
        passages.iter().join("\n\n")
    )
}

/// The retrieval-to-generation pipeline: embed the question, search for the
/// nearest passages, compose the prompt, generate the answer.
///
/// The three collaborators are injected so tests can substitute stubs for the
/// remote services.
pub struct RagPipeline<E, S, G> {
    embedder: E,
    store: S,
    generator: G,
}

impl<E, S, G> RagPipeline<E, S, G>
where
    E: Embed,
    S: SearchPassages,
    G: GenerateText,
{
    #[inline]
    pub fn new(embedder: E, store: S, generator: G) -> Self {
        Self {
            embedder,
            store,
            generator,
        }
    }

    /// Fetch the nearest passages for `question`, nearest-first.
    ///
    /// Never returns more than [`TOP_K`] passages. Fewer hits yield a shorter
    /// list; zero hits yield an empty one, which is not an error.
    #[inline]
    pub fn retrieve(&self, question: &str) -> Result<Vec<String>> {
        let vector = self.embedder.embed(question)?;
        let hits = self.store.search(&vector, TOP_K)?;

        let passages: Vec<String> = hits
            .into_iter()
            .take(TOP_K)
            .map(|hit| hit.text)
            .collect();

        debug!("Retrieved {} passages", passages.len());
        Ok(passages)
    }

    /// Run the full pipeline for one question, blocking until each remote
    /// call returns.
    #[inline]
    pub fn answer(&self, question: &str) -> Result<RagAnswer> {
        let passages = self.retrieve(question)?;
        let prompt = compose_prompt(&passages, question);
        let answer = self.generator.generate(&prompt)?;
        let context = passages.iter().join("\n\n");

        Ok(RagAnswer { answer, context })
    }
}

impl<E, S, G> QuestionAnswerer for RagPipeline<E, S, G>
where
    E: Embed + Send + Sync,
    S: SearchPassages + Send + Sync,
    G: GenerateText + Send + Sync,
{
    fn answer(&self, question: &str) -> Result<RagAnswer> {
        RagPipeline::answer(self, question)
    }
}
