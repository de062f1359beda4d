//! Model representation: trees and forests used for inference.

mod forest;
mod tree;

pub use forest::{Forest, ForestValidationError};
pub use tree::{NodeId, Tree, TreeBuilder, TreeValidationError};
