//! Deterministic [`TextGenerator`]s for tests and offline runs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{GenerationError, TextGenerator};

/// Answers every prompt with the same text.
#[derive(Debug, Clone)]
pub struct StaticGenerator {
    response: String,
    delay: Option<Duration>,
}

impl StaticGenerator {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            delay: None,
        }
    }

    /// Sleep before answering, to simulate model latency.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl TextGenerator for StaticGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.response.clone())
    }
}

/// Replays a queue of canned results, then keeps repeating the fallback.
///
/// Also records how many calls were made and the prompts it saw.
#[derive(Debug)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<String, String>>>,
    fallback: String,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: fallback.into(),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful response.
    pub fn then_respond(self, response: impl Into<String>) -> Self {
        self.push(Ok(response.into()));
        self
    }

    /// Queue a transport failure.
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.push(Err(message.into()));
        self
    }

    pub fn push(&self, step: Result<String, String>) {
        self.script
            .lock()
            .expect("script lock poisoned")
            .push_back(step);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompt lock poisoned").clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .expect("prompt lock poisoned")
            .push(prompt.to_string());

        let step = self
            .script
            .lock()
            .expect("script lock poisoned")
            .pop_front();
        match step {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(GenerationError::Transport(message)),
            None => Ok(self.fallback.clone()),
        }
    }
}

/// Computes the response from the prompt.
pub struct FnGenerator<F> {
    respond: F,
}

impl<F> FnGenerator<F>
where
    F: Fn(&str) -> Result<String, GenerationError> + Send + Sync,
{
    pub fn new(respond: F) -> Self {
        Self { respond }
    }
}

#[async_trait]
impl<F> TextGenerator for FnGenerator<F>
where
    F: Fn(&str) -> Result<String, GenerationError> + Send + Sync,
{
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        (self.respond)(prompt)
    }
}

/// Fails every call.
#[derive(Debug, Clone)]
pub struct FailingGenerator {
    message: String,
}

impl FailingGenerator {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Default for FailingGenerator {
    fn default() -> Self {
        Self::new("model unavailable")
    }
}

#[async_trait]
impl TextGenerator for FailingGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        Err(GenerationError::Transport(self.message.clone()))
    }
}
