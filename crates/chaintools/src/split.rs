use chaincore::{ChainNode, Generate, GeneratorNode};
use std::sync::Arc;

/// Splits a batch of strings into individual envelopes, one per element
pub struct SplitStrings;

impl Generate for SplitStrings {
    type Input = String;
    type Output = String;

    fn name(&self) -> &str {
        "split-strings"
    }

    fn expand(&self, inputs: Vec<String>) -> Box<dyn Iterator<Item = String> + Send> {
        Box::new(inputs.into_iter())
    }
}

pub fn split_strings() -> Arc<dyn ChainNode> {
    Arc::new(GeneratorNode::new(SplitStrings))
}
