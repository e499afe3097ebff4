//! Node abstraction
//!
//! A node consumes N signals and produces M signals. Nodes declare their
//! input/output arity so compositions can reject miswired pipelines while
//! they are being built, and every node re-checks its inputs when it runs.

use std::sync::Arc;

use tracing::debug;

use crate::diagnostics::Diagnostics;
use crate::error::{PipelineError, Result};
use crate::types::Signal;

/// Unit of computation in a pipeline
pub trait Node: Send + Sync {
    /// Human-readable node name, defaults to the type name
    fn name(&self) -> String {
        short_type_name(std::any::type_name::<Self>())
    }

    /// Number of inputs the node requires, `None` when it accepts any count
    fn input_arity(&self) -> Option<usize> {
        None
    }

    /// Number of outputs produced for a given input count, `None` when unknown
    fn output_arity(&self, inputs: Option<usize>) -> Option<usize> {
        inputs
    }

    /// Run the node over its inputs
    fn process(&self, inputs: &[Signal], diagnostics: &Diagnostics) -> Result<Vec<Signal>>;
}

/// Shared ownership of a node.
///
/// Cloning the `Arc` places the same instance in several branches of a
/// pipeline, which is how one epoch segmenter keeps two branches aligned.
impl<N: Node + ?Sized> Node for Arc<N> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn input_arity(&self) -> Option<usize> {
        (**self).input_arity()
    }

    fn output_arity(&self, inputs: Option<usize>) -> Option<usize> {
        (**self).output_arity(inputs)
    }

    fn process(&self, inputs: &[Signal], diagnostics: &Diagnostics) -> Result<Vec<Signal>> {
        (**self).process(inputs, diagnostics)
    }
}

impl Node for Box<dyn Node> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn input_arity(&self) -> Option<usize> {
        (**self).input_arity()
    }

    fn output_arity(&self, inputs: Option<usize>) -> Option<usize> {
        (**self).output_arity(inputs)
    }

    fn process(&self, inputs: &[Signal], diagnostics: &Diagnostics) -> Result<Vec<Signal>> {
        (**self).process(inputs, diagnostics)
    }
}

/// Result observer, invoked with the node's outputs after a successful call
pub type Observer = Box<dyn Fn(&[Signal]) -> Result<()> + Send + Sync>;

/// Node wrapper running observers after every successful `process`
pub struct Observed<N> {
    inner: N,
    observers: Vec<Observer>,
}

impl<N: Node> Observed<N> {
    pub fn new(inner: N) -> Self {
        Self {
            inner,
            observers: Vec::new(),
        }
    }

    /// Register another observer; observers run in registration order
    pub fn observe<F>(mut self, observer: F) -> Self
    where
        F: Fn(&[Signal]) -> Result<()> + Send + Sync + 'static,
    {
        self.observers.push(Box::new(observer));
        self
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl<N: Node> Node for Observed<N> {
    fn name(&self) -> String {
        self.inner.name()
    }

    fn input_arity(&self) -> Option<usize> {
        self.inner.input_arity()
    }

    fn output_arity(&self, inputs: Option<usize>) -> Option<usize> {
        self.inner.output_arity(inputs)
    }

    fn process(&self, inputs: &[Signal], diagnostics: &Diagnostics) -> Result<Vec<Signal>> {
        let outputs = self.inner.process(inputs, diagnostics)?;
        for observer in &self.observers {
            observer(&outputs).map_err(|e| PipelineError::Observer {
                node: self.inner.name(),
                message: e.to_string(),
            })?;
        }
        Ok(outputs)
    }
}

/// Node wrapper overriding the reported name
pub struct Named<N> {
    name: String,
    inner: N,
}

impl<N: Node> Node for Named<N> {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn input_arity(&self) -> Option<usize> {
        self.inner.input_arity()
    }

    fn output_arity(&self, inputs: Option<usize>) -> Option<usize> {
        self.inner.output_arity(inputs)
    }

    fn process(&self, inputs: &[Signal], diagnostics: &Diagnostics) -> Result<Vec<Signal>> {
        debug!(node = %self.name, "processing");
        self.inner.process(inputs, diagnostics)
    }
}

/// Builder helpers available on every sized node
pub trait NodeExt: Node + Sized + 'static {
    fn boxed(self) -> Box<dyn Node> {
        Box::new(self)
    }

    fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn named(self, name: impl Into<String>) -> Named<Self> {
        Named {
            name: name.into(),
            inner: self,
        }
    }

    fn observe<F>(self, observer: F) -> Observed<Self>
    where
        F: Fn(&[Signal]) -> Result<()> + Send + Sync + 'static,
    {
        Observed::new(self).observe(observer)
    }
}

impl<N: Node + Sized + 'static> NodeExt for N {}

/// Fail with an arity error unless exactly `expected` inputs were given
pub(crate) fn expect_inputs(node: &str, inputs: &[Signal], expected: usize) -> Result<()> {
    if inputs.len() != expected {
        return Err(PipelineError::Arity {
            node: node.to_string(),
            expected,
            actual: inputs.len(),
        });
    }
    Ok(())
}

fn short_type_name(full: &str) -> String {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}
