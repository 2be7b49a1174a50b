//! Scripted in-process provider
//!
//! A programmable [`LlmProvider`] used by the test suites and by local
//! development setups that need a deterministic back-end. Outcomes are
//! enqueued per operation; when a script runs dry the provider answers
//! with a canned echo response.

use super::{
    ChunkStream, FineTuningJob, FineTuningJobStatus, FineTuningProvider, LlmProvider, ModelInfo,
    ProviderCapability,
};
use crate::core::types::{
    ChatChoice, ChatChunk, ChatDelta, ChatMessage, ChatStreamChoice, CompletionRequest,
    CompletionResponse, EmbeddingData, EmbeddingRequest, EmbeddingResponse, FinishReason,
    MessageRole, ProviderError, RequestContext, Usage,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use uuid::Uuid;

/// Scripted outcome for a unary call
#[derive(Debug, Clone)]
pub enum CompletionScript {
    /// Answer with the given text and usage
    Respond {
        /// Completion text
        text: String,
        /// Usage reported by the provider
        usage: Usage,
    },
    /// Fail with the given error
    Fail(ProviderError),
}

/// Scripted outcome for a streaming call
#[derive(Debug, Clone)]
pub struct StreamScript {
    /// Fail the stream call itself, before any chunk exists
    pub error_before_first_chunk: Option<ProviderError>,
    /// Chunk texts to emit in order
    pub chunks: Vec<String>,
    /// Emit an error after this many chunks instead of finishing
    pub fail_after: Option<usize>,
    /// Usage attached to the final chunk
    pub usage: Usage,
}

impl Default for StreamScript {
    fn default() -> Self {
        Self {
            error_before_first_chunk: None,
            chunks: vec!["Hello".to_string(), " world".to_string()],
            fail_after: None,
            usage: Usage::completion(10, 5),
        }
    }
}

/// Programmable provider for tests and local development
#[derive(Debug)]
pub struct MockProvider {
    name: String,
    capabilities: Vec<ProviderCapability>,
    models: Vec<ModelInfo>,
    completion_script: Mutex<VecDeque<CompletionScript>>,
    embedding_errors: Mutex<VecDeque<ProviderError>>,
    stream_script: Mutex<VecDeque<StreamScript>>,
    /// Uploaded training files: file id -> estimated token count
    uploaded_files: Mutex<HashMap<String, u64>>,
    fine_tuning_jobs: Mutex<HashMap<String, FineTuningJob>>,
    completion_calls: AtomicUsize,
    embedding_calls: AtomicUsize,
    stream_calls: AtomicUsize,
    cancellation_observed: Arc<AtomicBool>,
}

impl MockProvider {
    /// Create a provider with every capability and no scripted outcomes
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            models: vec![ModelInfo {
                id: format!("{}-default", name),
                display_name: None,
                context_window: Some(8192),
            }],
            name,
            capabilities: vec![
                ProviderCapability::Completion,
                ProviderCapability::Streaming,
                ProviderCapability::Embedding,
                ProviderCapability::FunctionCalling,
                ProviderCapability::MultiModal,
                ProviderCapability::Vision,
                ProviderCapability::FineTuning,
            ],
            completion_script: Mutex::new(VecDeque::new()),
            embedding_errors: Mutex::new(VecDeque::new()),
            stream_script: Mutex::new(VecDeque::new()),
            uploaded_files: Mutex::new(HashMap::new()),
            fine_tuning_jobs: Mutex::new(HashMap::new()),
            completion_calls: AtomicUsize::new(0),
            embedding_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
            cancellation_observed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Restrict the capability set
    pub fn with_capabilities(mut self, capabilities: Vec<ProviderCapability>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Replace the advertised model list
    pub fn with_models(mut self, models: Vec<ModelInfo>) -> Self {
        self.models = models;
        self
    }

    /// Enqueue a successful completion outcome
    pub fn enqueue_response(&self, text: impl Into<String>, usage: Usage) {
        self.completion_script
            .lock()
            .push_back(CompletionScript::Respond {
                text: text.into(),
                usage,
            });
    }

    /// Enqueue a failed completion outcome
    pub fn enqueue_error(&self, error: ProviderError) {
        self.completion_script
            .lock()
            .push_back(CompletionScript::Fail(error));
    }

    /// Enqueue a failed embedding outcome
    pub fn enqueue_embedding_error(&self, error: ProviderError) {
        self.embedding_errors.lock().push_back(error);
    }

    /// Enqueue a streaming outcome
    pub fn enqueue_stream(&self, script: StreamScript) {
        self.stream_script.lock().push_back(script);
    }

    /// Number of unary completion calls received
    pub fn completion_calls(&self) -> usize {
        self.completion_calls.load(Ordering::SeqCst)
    }

    /// Number of embedding calls received
    pub fn embedding_calls(&self) -> usize {
        self.embedding_calls.load(Ordering::SeqCst)
    }

    /// Number of streaming calls received
    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    /// Whether a stream was cancelled before reaching its final chunk
    pub fn cancellation_observed(&self) -> bool {
        self.cancellation_observed.load(Ordering::SeqCst)
    }

    fn echo_response(&self, request: &CompletionRequest) -> CompletionResponse {
        let prompt = request
            .messages
            .last()
            .and_then(|m| m.content.as_ref())
            .map(|c| c.as_text())
            .unwrap_or_default();
        self.build_response(
            request,
            format!("{}: {}", self.name, prompt),
            Usage::completion(10, 5),
        )
    }

    fn build_response(
        &self,
        request: &CompletionRequest,
        text: String,
        usage: Usage,
    ) -> CompletionResponse {
        CompletionResponse {
            id: format!("chatcmpl-{}", Uuid::new_v4()),
            object: "chat.completion".to_string(),
            created: chrono::Utc::now().timestamp(),
            model: request.model.clone(),
            provider: self.name.clone(),
            choices: vec![ChatChoice {
                index: 0,
                message: ChatMessage::assistant(text),
                finish_reason: Some(FinishReason::Stop),
            }],
            usage,
        }
    }
}

/// Flags the provider-side cancellation signal when a stream is dropped
/// before its final chunk was produced.
struct StreamGuard {
    completed: Arc<AtomicBool>,
    cancellation_observed: Arc<AtomicBool>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if !self.completed.load(Ordering::SeqCst) {
            self.cancellation_observed.store(true, Ordering::SeqCst);
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &[ProviderCapability] {
        &self.capabilities
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        Ok(self.models.clone())
    }

    async fn create_completion(
        &self,
        request: CompletionRequest,
        _ctx: RequestContext,
    ) -> Result<CompletionResponse, ProviderError> {
        self.completion_calls.fetch_add(1, Ordering::SeqCst);
        match self.completion_script.lock().pop_front() {
            Some(CompletionScript::Respond { text, usage }) => {
                Ok(self.build_response(&request, text, usage))
            }
            Some(CompletionScript::Fail(error)) => Err(error),
            None => Ok(self.echo_response(&request)),
        }
    }

    async fn create_completion_stream(
        &self,
        request: CompletionRequest,
        ctx: RequestContext,
    ) -> Result<ChunkStream, ProviderError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.stream_script.lock().pop_front().unwrap_or_default();

        if let Some(error) = script.error_before_first_chunk {
            return Err(error);
        }

        let id = format!("chatcmpl-{}", Uuid::new_v4());
        let created = chrono::Utc::now().timestamp();
        let model = request.model.clone();
        let provider = self.name.clone();
        let completed = Arc::new(AtomicBool::new(false));
        let guard = StreamGuard {
            completed: completed.clone(),
            cancellation_observed: self.cancellation_observed.clone(),
        };

        let stream = async_stream::stream! {
            let _guard = guard;
            let make_chunk = |delta: ChatDelta, finish: Option<FinishReason>, usage: Option<Usage>| ChatChunk {
                id: id.clone(),
                object: "chat.completion.chunk".to_string(),
                created,
                model: model.clone(),
                provider: provider.clone(),
                choices: vec![ChatStreamChoice {
                    index: 0,
                    delta,
                    finish_reason: finish,
                }],
                usage,
            };

            for (i, text) in script.chunks.iter().enumerate() {
                if ctx.cancellation.is_cancelled() {
                    return;
                }
                if script.fail_after == Some(i) {
                    yield Err(ProviderError::unavailable(provider.clone(), "stream interrupted"));
                    return;
                }
                let delta = ChatDelta {
                    role: (i == 0).then_some(MessageRole::Assistant),
                    content: Some(text.clone()),
                };
                yield Ok(make_chunk(delta, None, None));
                // Yield to the scheduler so consumer-side cancellation can interleave.
                tokio::task::yield_now().await;
            }

            if ctx.cancellation.is_cancelled() {
                return;
            }

            completed.store(true, Ordering::SeqCst);
            yield Ok(make_chunk(ChatDelta::default(), Some(FinishReason::Stop), Some(script.usage)));
        };

        Ok(Box::pin(stream))
    }

    fn as_fine_tuning(&self) -> Option<&dyn FineTuningProvider> {
        Some(self)
    }

    async fn create_embedding(
        &self,
        request: EmbeddingRequest,
        _ctx: RequestContext,
    ) -> Result<EmbeddingResponse, ProviderError> {
        self.embedding_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.embedding_errors.lock().pop_front() {
            return Err(error);
        }

        let texts = request.input.texts();
        let count = texts.len().max(1);
        let dims = request.dimensions.unwrap_or(4) as usize;
        let data = (0..count)
            .map(|i| EmbeddingData {
                index: i as u32,
                embedding: vec![0.1 * (i as f32 + 1.0); dims],
            })
            .collect();

        let prompt_tokens: u32 = texts.iter().map(|t| (t.len() as u32 / 4).max(1)).sum();
        Ok(EmbeddingResponse {
            model: request.model.clone(),
            provider: self.name.clone(),
            data,
            usage: Usage::embedding(prompt_tokens.max(1)),
        })
    }
}

#[async_trait::async_trait]
impl FineTuningProvider for MockProvider {
    async fn create_job(
        &self,
        base_model: &str,
        training_file: &str,
    ) -> Result<FineTuningJob, ProviderError> {
        if !self.uploaded_files.lock().contains_key(training_file) {
            return Err(ProviderError::unknown(
                self.name.clone(),
                format!("training file not found: {}", training_file),
            ));
        }
        let job = FineTuningJob {
            id: format!("ftjob-{}", Uuid::new_v4()),
            base_model: base_model.to_string(),
            fine_tuned_model: None,
            status: FineTuningJobStatus::Running,
            training_file: training_file.to_string(),
            trained_tokens: None,
            created_at: chrono::Utc::now(),
        };
        self.fine_tuning_jobs.lock().insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn cancel_job(&self, job_id: &str) -> Result<FineTuningJob, ProviderError> {
        let mut jobs = self.fine_tuning_jobs.lock();
        let job = jobs.get_mut(job_id).ok_or_else(|| {
            ProviderError::unknown(self.name.clone(), format!("job not found: {}", job_id))
        })?;
        if matches!(
            job.status,
            FineTuningJobStatus::Queued | FineTuningJobStatus::Running
        ) {
            job.status = FineTuningJobStatus::Cancelled;
        }
        Ok(job.clone())
    }

    /// Training completes on the first poll: a queued or running job
    /// reports success with its file's token count.
    async fn get_job(&self, job_id: &str) -> Result<FineTuningJob, ProviderError> {
        let tokens = {
            let jobs = self.fine_tuning_jobs.lock();
            let job = jobs.get(job_id).ok_or_else(|| {
                ProviderError::unknown(self.name.clone(), format!("job not found: {}", job_id))
            })?;
            self.uploaded_files.lock().get(&job.training_file).copied()
        };

        let mut jobs = self.fine_tuning_jobs.lock();
        let job = jobs.get_mut(job_id).ok_or_else(|| {
            ProviderError::unknown(self.name.clone(), format!("job not found: {}", job_id))
        })?;
        if matches!(
            job.status,
            FineTuningJobStatus::Queued | FineTuningJobStatus::Running
        ) {
            job.status = FineTuningJobStatus::Succeeded;
            job.trained_tokens = tokens;
            job.fine_tuned_model = Some(format!("ft:{}:{}", job.base_model, job.id));
        }
        Ok(job.clone())
    }

    async fn upload_file(&self, _name: &str, content: &[u8]) -> Result<String, ProviderError> {
        let file_id = format!("file-{}", Uuid::new_v4());
        let tokens = (content.len() as u64 / 4).max(1);
        self.uploaded_files.lock().insert(file_id.clone(), tokens);
        Ok(file_id)
    }

    async fn supported_base_models(&self) -> Result<Vec<String>, ProviderError> {
        Ok(self.models.iter().map(|m| m.id.clone()).collect())
    }

    async fn delete_fine_tuned_model(&self, _model_id: &str) -> Result<(), ProviderError> {
        Ok(())
    }
}
