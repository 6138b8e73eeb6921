//! Engine-wide tunables.
//!
//! Settings are injected at query construction and carried by value; there is
//! no ambient global configuration.

/// Query engine settings.
#[derive(Debug, Clone, Default)]
pub struct QueryEngineSettings {
    /// Enables an experimental extra normalisation pass over the constraint
    /// tree before cost-based planning (NOT pushed through AND/OR, then
    /// re-simplified). Off by default.
    pub normalise_constraints: bool,
}

impl QueryEngineSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_constraint_normalisation(mut self, enabled: bool) -> Self {
        self.normalise_constraints = enabled;
        self
    }
}
