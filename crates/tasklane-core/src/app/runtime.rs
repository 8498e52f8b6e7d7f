//! Runtime - タスク実行（handler の登録とディスパッチ）
//!
//! Handler はブローカーに触れません。キュー状態の記録はワーカーループの責務です。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::TaskName;

/// Failure reported by a handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// A unit of work for a parsed task.
///
/// May run for a long time; the worker awaits it to completion before polling again.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn execute(&self, task: &TaskName) -> Result<(), HandlerError>;
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("handler for nature '{0}' is already registered")]
    AlreadyRegistered(String),
}

#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("no handler for nature '{0}'")]
    HandlerNotFound(String),

    #[error(transparent)]
    Handler(#[from] HandlerError),
}

/// Registry of handlers (nature -> handler), with an optional fallback.
///
/// Design:
/// - Built during initialization (mutable).
/// - Used during runtime (immutable).
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
    fallback: Option<Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: None,
        }
    }

    pub fn register(
        &mut self,
        nature: impl Into<String>,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<(), RegistryError> {
        let nature = nature.into();
        if self.handlers.contains_key(&nature) {
            return Err(RegistryError::AlreadyRegistered(nature));
        }
        self.handlers.insert(nature, handler);
        Ok(())
    }

    /// Handler used for every nature without a dedicated one. Last call wins.
    pub fn set_fallback(&mut self, handler: Arc<dyn TaskHandler>) {
        self.fallback = Some(handler);
    }

    pub fn get(&self, nature: &str) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers.get(nature).or(self.fallback.as_ref())
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    pub fn registered_natures(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    /// Dedicated handlers plus the fallback, if any.
    pub fn len(&self) -> usize {
        self.handlers.len() + usize::from(self.fallback.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty() && self.fallback.is_none()
    }
}

/// Runtime executes a parsed task by dispatching on its nature.
#[derive(Clone)]
pub struct Runtime {
    registry: Arc<HandlerRegistry>,
}

impl Runtime {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub async fn execute(&self, task: &TaskName) -> Result<(), ExecuteError> {
        let handler = self
            .registry
            .get(task.nature())
            .ok_or_else(|| ExecuteError::HandlerNotFound(task.nature().to_owned()))?;

        handler.execute(task).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records the names it was given.
    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TaskHandler for Recording {
        async fn execute(&self, task: &TaskName) -> Result<(), HandlerError> {
            self.seen.lock().unwrap().push(task.to_string());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl TaskHandler for Failing {
        async fn execute(&self, _task: &TaskName) -> Result<(), HandlerError> {
            Err(HandlerError::new("saw blade jammed"))
        }
    }

    fn task(s: &str) -> TaskName {
        TaskName::parse(s).unwrap()
    }

    #[tokio::test]
    async fn dispatches_on_nature() {
        let widget = Arc::new(Recording::default());
        let trt = Arc::new(Recording::default());

        let mut reg = HandlerRegistry::new();
        reg.register("widget", widget.clone()).unwrap();
        reg.register("trt", trt.clone()).unwrap();
        let rt = Runtime::new(Arc::new(reg));

        rt.execute(&task("widget/cutting/partA")).await.unwrap();
        rt.execute(&task("trt/plantA/1234")).await.unwrap();

        assert_eq!(*widget.seen.lock().unwrap(), vec!["widget/cutting/partA"]);
        assert_eq!(*trt.seen.lock().unwrap(), vec!["trt/plantA/1234"]);
    }

    #[tokio::test]
    async fn falls_back_when_nature_is_unknown() {
        let fallback = Arc::new(Recording::default());
        let mut reg = HandlerRegistry::new();
        reg.set_fallback(fallback.clone());
        let rt = Runtime::new(Arc::new(reg));

        rt.execute(&task("anything/p/q")).await.unwrap();
        assert_eq!(fallback.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_handler_is_an_error() {
        let rt = Runtime::new(Arc::new(HandlerRegistry::new()));
        let err = rt.execute(&task("widget/cutting/partA")).await.unwrap_err();
        assert!(matches!(err, ExecuteError::HandlerNotFound(n) if n == "widget"));
    }

    #[tokio::test]
    async fn handler_failure_is_passed_through() {
        let mut reg = HandlerRegistry::new();
        reg.register("widget", Arc::new(Failing)).unwrap();
        let rt = Runtime::new(Arc::new(reg));

        let err = rt.execute(&task("widget/cutting/partA")).await.unwrap_err();
        assert_eq!(err.to_string(), "saw blade jammed");
    }

    #[test]
    fn fallback_counts_as_a_handler() {
        let mut reg = HandlerRegistry::new();
        assert_eq!(reg.len(), 0);
        assert!(reg.is_empty());

        reg.set_fallback(Arc::new(Failing));
        assert_eq!(reg.len(), 1);
        assert!(!reg.is_empty());

        reg.register("widget", Arc::new(Failing)).unwrap();
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.registered_natures(), vec!["widget".to_string()]);
    }

    #[test]
    fn double_registration_is_rejected() {
        let mut reg = HandlerRegistry::new();
        reg.register("widget", Arc::new(Failing)).unwrap();
        let result = reg.register("widget", Arc::new(Failing));
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(n)) if n == "widget"));
        assert_eq!(reg.registered_natures(), vec!["widget".to_string()]);
    }
}
