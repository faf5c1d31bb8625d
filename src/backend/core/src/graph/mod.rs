//! Versioned object graph of the network.
//!
//! This module handles:
//! - The arena of route and utility elements, indexed by stable id
//! - Projecting domain events onto the arena while enforcing its invariants
//! - Neighbour and reachability lookups used by queries and traces

mod object;
mod projection;

pub use object::{ElementData, ElementKind, GraphObject, Link, LinkKind};
pub use projection::{GraphStats, NetworkGraph};

pub use petgraph::Direction;
