//! The invocation abstraction consumed by the policy layers.
//!
//! An interception mechanism outside this crate turns each intercepted call
//! into an [`Invocation`]. It is responsible for surfacing the root business
//! failure from `proceed`, never a wrapper produced by the interception
//! machinery itself.

use crate::error::Failure;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Declared return contract of a guarded method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReturnType {
    /// A plain value.
    #[default]
    Value,
    /// A cancellable, awaitable future handle.
    Future,
    /// A composable promise-like handle.
    Promise,
}

/// Identity of a guarded method.
///
/// Used as the key for per-method state such as circuit breaker windows and
/// bulkhead limiters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    declaring_type: String,
    method: String,
    parameter_types: Vec<String>,
    return_type: ReturnType,
}

impl MethodSignature {
    /// Create a signature with no parameters returning a value.
    pub fn new(declaring_type: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            method: method.into(),
            parameter_types: Vec::new(),
            return_type: ReturnType::Value,
        }
    }

    /// Set the parameter types.
    pub fn with_parameters<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameter_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Set the declared return contract.
    pub fn returning(mut self, return_type: ReturnType) -> Self {
        self.return_type = return_type;
        self
    }

    /// Same method name and parameters, declared on another type.
    pub fn on_type(&self, declaring_type: impl Into<String>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            ..self.clone()
        }
    }

    /// Same declaring type and parameters, another method name.
    pub fn renamed(&self, method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            ..self.clone()
        }
    }

    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn parameter_types(&self) -> &[String] {
        &self.parameter_types
    }

    pub fn return_type(&self) -> ReturnType {
        self.return_type
    }

    /// Configuration key, `Type/method`.
    pub fn config_key(&self) -> String {
        format!("{}/{}", self.declaring_type, self.method)
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{}({})",
            self.declaring_type,
            self.method,
            self.parameter_types.join(", ")
        )
    }
}

/// A single intercepted call.
#[async_trait]
pub trait Invocation: Send + Sync + 'static {
    /// Value produced by a successful call.
    type Output: Send + 'static;

    /// Identity of the guarded method.
    fn signature(&self) -> &MethodSignature;

    /// Arguments of this call.
    fn parameters(&self) -> &[Value] {
        &[]
    }

    /// Runtime type of the call target. Defaults to the declaring type.
    fn target_type(&self) -> &str {
        self.signature().declaring_type()
    }

    /// Run the business logic. May be called more than once by retries.
    async fn proceed(&self) -> std::result::Result<Self::Output, Failure>;
}

/// Per-call data handed to interceptors.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    signature: MethodSignature,
    parameters: Vec<Value>,
    target_type: String,
}

impl InvocationContext {
    pub fn new(signature: MethodSignature, parameters: Vec<Value>, target_type: String) -> Self {
        Self {
            signature,
            parameters,
            target_type,
        }
    }

    /// Capture the context of an invocation.
    pub fn of<I: Invocation + ?Sized>(invocation: &I) -> Self {
        Self::new(
            invocation.signature().clone(),
            invocation.parameters().to_vec(),
            invocation.target_type().to_string(),
        )
    }

    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }

    pub fn parameters(&self) -> &[Value] {
        &self.parameters
    }

    pub fn target_type(&self) -> &str {
        &self.target_type
    }
}

/// An [`Invocation`] backed by a closure.
pub struct FnInvocation<T, F> {
    signature: MethodSignature,
    parameters: Vec<Value>,
    target_type: Option<String>,
    call: F,
    _output: PhantomData<fn() -> T>,
}

impl<T, F, Fut> FnInvocation<T, F>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<T, Failure>> + Send + 'static,
{
    pub fn new(signature: MethodSignature, call: F) -> Self {
        Self {
            signature,
            parameters: Vec::new(),
            target_type: None,
            call,
            _output: PhantomData,
        }
    }

    /// Attach call arguments.
    pub fn with_parameters(mut self, parameters: Vec<Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Set the runtime target type.
    pub fn with_target_type(mut self, target_type: impl Into<String>) -> Self {
        self.target_type = Some(target_type.into());
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl<T, F, Fut> Invocation for FnInvocation<T, F>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<T, Failure>> + Send + 'static,
{
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

    async fn proceed(&self) -> std::result::Result<T, Failure> {
        (self.call)().await
    }
}
