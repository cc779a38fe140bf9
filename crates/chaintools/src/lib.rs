//! Standard tool library
//!
//! Concrete transformations that plug into the chain engine: splitting a
//! batch of strings, integer parsing and arithmetic, and string holding.
//! Each tool ships with a constructor helper returning a ready-to-subscribe
//! node.

mod numbers;
mod split;
mod strings;

pub use numbers::{int_to_string, multiply_by, parse_int, IntToString, MultiplyBy, ParseInt};
pub use split::{split_strings, SplitStrings};
pub use strings::{hold_string, HoldString, StringHolder};
