// Scripted invocation double

use async_trait::async_trait;
use palisade_core::failure::{FAILURE, FailureType};
use palisade_core::{Failure, Invocation, MethodSignature};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// What one call of a [`ScriptedInvocation`] does.
#[derive(Debug, Clone)]
pub enum Step<T> {
    Succeed(T),
    Fail(&'static FailureType, String),
    Panic(String),
}

/// An [`Invocation`] that plays back a list of outcomes.
///
/// Each call takes the next step. Once the script runs out every further
/// call repeats the fallthrough step, which fails with the root type unless
/// set with [`otherwise`](Self::otherwise).
///
/// ```rust,ignore
/// let invocation = ScriptedInvocation::new(MethodSignature::new("Svc", "op"))
///     .fail_times(2, &IO_FAILURE, "refused")
///     .succeed(42)
///     .into_arc();
///
/// assert_eq!(pipeline.invoke(invocation.clone()).await?, 42);
/// assert_eq!(invocation.calls(), 3);
/// ```
pub struct ScriptedInvocation<T> {
    signature: MethodSignature,
    parameters: Vec<Value>,
    target_type: Option<String>,
    latency: Duration,
    steps: Mutex<VecDeque<Step<T>>>,
    otherwise: Step<T>,
    calls: AtomicUsize,
    call_log: Mutex<Vec<Instant>>,
}

impl<T: Clone + Send + Sync + 'static> ScriptedInvocation<T> {
    pub fn new(signature: MethodSignature) -> Self {
        Self {
            signature,
            parameters: Vec::new(),
            target_type: None,
            latency: Duration::ZERO,
            steps: Mutex::new(VecDeque::new()),
            otherwise: Step::Fail(&FAILURE, "script exhausted".to_string()),
            calls: AtomicUsize::new(0),
            call_log: Mutex::new(Vec::new()),
        }
    }

    /// Append a step.
    pub fn then(self, step: Step<T>) -> Self {
        self.steps.lock().push_back(step);
        self
    }

    pub fn succeed(self, value: T) -> Self {
        self.then(Step::Succeed(value))
    }

    pub fn fail(self, ty: &'static FailureType, message: &str) -> Self {
        self.then(Step::Fail(ty, message.to_string()))
    }

    /// Append `times` identical failures.
    pub fn fail_times(mut self, times: usize, ty: &'static FailureType, message: &str) -> Self {
        for _ in 0..times {
            self = self.fail(ty, message);
        }
        self
    }

    pub fn panic(self, message: &str) -> Self {
        self.then(Step::Panic(message.to_string()))
    }

    /// Step repeated after the script runs out.
    pub fn otherwise(mut self, step: Step<T>) -> Self {
        self.otherwise = step;
        self
    }

    /// Sleep this long inside every call before resolving it.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_parameters(mut self, parameters: Vec<Value>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_target_type(mut self, target_type: &str) -> Self {
        self.target_type = Some(target_type.to_string());
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Number of times the business logic ran.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Start time of every call, in order.
    pub fn call_instants(&self) -> Vec<Instant> {
        self.call_log.lock().clone()
    }

    /// Steps not yet played.
    pub fn remaining(&self) -> usize {
        self.steps.lock().len()
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Invocation for ScriptedInvocation<T> {
    type Output = T;

    fn signature(&self) -> &MethodSignature {
        &self.signature
    }

    fn parameters(&self) -> &[Value] {
        &self.parameters
    }

    fn target_type(&self) -> &str {
        self.target_type
            .as_deref()
            .unwrap_or_else(|| self.signature.declaring_type())
    }

    async fn proceed(&self) -> Result<T, Failure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_log.lock().push(Instant::now());
        let step = self
            .steps
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.otherwise.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match step {
            Step::Succeed(value) => Ok(value),
            Step::Fail(ty, message) => Err(Failure::new(ty, message)),
            Step::Panic(message) => panic!("{message}"),
        }
    }
}
