/// Wire event normalization.
pub mod ingress;
/// Async session loop around the engine.
pub mod session;
