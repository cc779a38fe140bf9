use chaincore::{ChainNode, ToolError, Transform, TransformNode};
use std::sync::Arc;

/// Parses a decimal string into an integer
pub struct ParseInt;

impl Transform for ParseInt {
    type Input = String;
    type Output = i64;

    fn name(&self) -> &str {
        "parse-int"
    }

    fn apply(&self, input: String) -> Result<i64, ToolError> {
        input
            .parse::<i64>()
            .map_err(|e| ToolError::new(format!("cannot parse {input:?} as integer: {e}")))
    }
}

pub fn parse_int() -> Arc<dyn ChainNode> {
    Arc::new(TransformNode::new(ParseInt))
}

/// Multiplies every integer by a fixed factor
pub struct MultiplyBy {
    pub factor: i64,
}

impl Transform for MultiplyBy {
    type Input = i64;
    type Output = i64;

    fn name(&self) -> &str {
        "multiply"
    }

    fn apply(&self, input: i64) -> Result<i64, ToolError> {
        input
            .checked_mul(self.factor)
            .ok_or_else(|| ToolError::new(format!("{input} * {} overflows", self.factor)))
    }
}

pub fn multiply_by(factor: i64) -> Arc<dyn ChainNode> {
    Arc::new(TransformNode::new(MultiplyBy { factor }))
}

/// Formats an integer as its decimal string
pub struct IntToString;

impl Transform for IntToString {
    type Input = i64;
    type Output = String;

    fn name(&self) -> &str {
        "int-to-string"
    }

    fn apply(&self, input: i64) -> Result<String, ToolError> {
        Ok(input.to_string())
    }
}

pub fn int_to_string() -> Arc<dyn ChainNode> {
    Arc::new(TransformNode::new(IntToString))
}
