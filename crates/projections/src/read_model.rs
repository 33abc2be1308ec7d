//! Read model trait for query-side views.

/// A read model providing query access to denormalized data.
///
/// Read models are rebuilt from the event log by replay, so they must be
/// able to return to their empty state.
pub trait ReadModel: Send + Sync {
    /// Returns the name of this read model.
    fn name(&self) -> &'static str;

    /// Returns the number of entries in this read model.
    fn count(&self) -> usize;

    /// Drops every entry.
    fn reset(&self);
}
