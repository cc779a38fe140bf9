use chaincore::{ChainNode, ToolError, Transform, TransformNode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Wrapper struct demonstrating a structured sink output type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringHolder {
    pub value: String,
}

/// Wraps a string into a [`StringHolder`]
pub struct HoldString;

impl Transform for HoldString {
    type Input = String;
    type Output = StringHolder;

    fn name(&self) -> &str {
        "hold-string"
    }

    fn apply(&self, input: String) -> Result<StringHolder, ToolError> {
        Ok(StringHolder { value: input })
    }
}

pub fn hold_string() -> Arc<dyn ChainNode> {
    Arc::new(TransformNode::new(HoldString))
}
