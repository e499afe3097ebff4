//! Node compositions
//!
//! Viewed as a graph, compositions are the directed edges between nodes.
//! Both compositions are nodes themselves, so trees of any depth nest.
//!
//! - [`Sequential`]: outputs of child `i` become the inputs of child `i + 1`
//! - [`Parallel`]: every child receives the same inputs, outputs are
//!   concatenated in declaration order
//!
//! "Parallel" describes data fan-out only; children run one after another.

use tracing::debug;

use crate::diagnostics::Diagnostics;
use crate::error::{PipelineError, Result};
use crate::node::Node;
use crate::types::Signal;

fn labels(children: &[Box<dyn Node>]) -> Vec<String> {
    children
        .iter()
        .enumerate()
        .map(|(i, child)| format!("{}_{}", i, child.name()))
        .collect()
}

/// Chain of nodes where each child's outputs feed the next child
pub struct Sequential {
    children: Vec<Box<dyn Node>>,
}

impl Sequential {
    /// Build a chain, validating every edge whose arity is known up front
    pub fn new(children: Vec<Box<dyn Node>>) -> Result<Self> {
        if children.is_empty() {
            return Err(PipelineError::Configuration(
                "at least one node must be provided to a sequential composition".to_string(),
            ));
        }

        let mut produced = children[0].output_arity(children[0].input_arity());
        for (i, child) in children.iter().enumerate().skip(1) {
            if let (Some(expected), Some(actual)) = (child.input_arity(), produced) {
                if expected != actual {
                    return Err(PipelineError::Arity {
                        node: format!("{}_{}", i, child.name()),
                        expected,
                        actual,
                    });
                }
            }
            produced = child.output_arity(produced);
        }

        Ok(Self { children })
    }

    /// Child labels in the form `{index}_{name}`
    pub fn children(&self) -> Vec<String> {
        labels(&self.children)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl Node for Sequential {
    fn input_arity(&self) -> Option<usize> {
        self.children.first().and_then(|c| c.input_arity())
    }

    fn output_arity(&self, inputs: Option<usize>) -> Option<usize> {
        self.children
            .iter()
            .fold(inputs, |count, child| child.output_arity(count))
    }

    fn process(&self, inputs: &[Signal], diagnostics: &Diagnostics) -> Result<Vec<Signal>> {
        let (first, rest) = match self.children.split_first() {
            Some(split) => split,
            None => {
                return Err(PipelineError::Configuration(
                    "sequential composition has no nodes".to_string(),
                ))
            }
        };

        debug!(node = %first.name(), inputs = inputs.len(), "sequential step");
        let mut data = first.process(inputs, diagnostics)?;
        for child in rest {
            debug!(node = %child.name(), inputs = data.len(), "sequential step");
            data = child.process(&data, diagnostics)?;
        }
        Ok(data)
    }
}

/// Fan-out of the same inputs into several children
pub struct Parallel {
    children: Vec<Box<dyn Node>>,
}

impl Parallel {
    pub fn new(children: Vec<Box<dyn Node>>) -> Result<Self> {
        if children.is_empty() {
            return Err(PipelineError::Configuration(
                "at least one node must be provided to a parallel composition".to_string(),
            ));
        }

        // All children see the same inputs, so their fixed arities must agree.
        let mut required: Option<(usize, String)> = None;
        for (i, child) in children.iter().enumerate() {
            if let Some(expected) = child.input_arity() {
                match &required {
                    Some((count, first)) if *count != expected => {
                        return Err(PipelineError::Configuration(format!(
                            "parallel children disagree on input count: {} expects {}, {}_{} expects {}",
                            first,
                            count,
                            i,
                            child.name(),
                            expected
                        )));
                    }
                    Some(_) => {}
                    None => required = Some((expected, format!("{}_{}", i, child.name()))),
                }
            }
        }

        Ok(Self { children })
    }

    /// Child labels in the form `{index}_{name}`
    pub fn children(&self) -> Vec<String> {
        labels(&self.children)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl Node for Parallel {
    fn input_arity(&self) -> Option<usize> {
        self.children.iter().find_map(|c| c.input_arity())
    }

    fn output_arity(&self, inputs: Option<usize>) -> Option<usize> {
        self.children
            .iter()
            .map(|child| child.output_arity(inputs))
            .sum()
    }

    fn process(&self, inputs: &[Signal], diagnostics: &Diagnostics) -> Result<Vec<Signal>> {
        let mut outputs = Vec::new();
        for child in &self.children {
            debug!(node = %child.name(), inputs = inputs.len(), "parallel branch");
            outputs.extend(child.process(inputs, diagnostics)?);
        }
        Ok(outputs)
    }
}
