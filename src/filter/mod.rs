//! Filter normalization, classification and evaluation
//!
//! - `normalizer` clips geometry and time predicates to the index domain
//! - `classifier` maps them to a `KeyPlanningFilter` and decides whether the
//!   residual predicate can drive an attribute-index scan
//! - `evaluate` runs residual predicates against decoded records
//! - `transform` parses and applies projection descriptors

mod classifier;
mod evaluate;
mod normalizer;
pub mod transform;

pub use classifier::{classify, classify_attribute_filter, like_prefix, AttributeShape, KeyPlanningFilter, LikePattern};
pub use evaluate::{like_regex, Evaluator};
pub use normalizer::{is_empty_polygon, is_outside_interval, net_interval, net_polygon, IndexDomain};
pub use transform::Transform;
