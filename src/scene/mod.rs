//! Shared scene graph: the one drawing-command tree both renderers consume.

/// Page/element list → ordered scene graph.
pub mod builder;
/// Scene node types and structural-clone semantics.
pub mod graph;
/// Declarative pattern tile synthesis.
pub mod pattern;
/// Seeded hand-drawn stroke jitter.
pub mod sketch;
