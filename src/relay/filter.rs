//! The pluggable byte-stream filter.
//!
//! The filter capability is `{onClientData, onServerData}`: after an
//! unwrap/read yields a plaintext chunk, the owning `Direction` calls the
//! matching hook with a read-only view of that chunk and a lazily
//! allocated, writable replacement buffer. If the filter writes nothing to
//! the replacement and reports the chunk modified, the chunk is dropped;
//! otherwise the replacement (if modified) or the original (if untouched)
//! is forwarded.
//!
//! There is no reflective class-loader in Rust, so `filter.class` from the
//! configuration is resolved through a small build-time registry
//! (`FilterRegistry`) instead of a fully-qualified class name.

/// The outcome of a single filter invocation.
pub enum FilterOutcome {
    /// Forward the original chunk unchanged.
    Unchanged,
    /// Forward `replacement` instead of the original chunk.
    Replaced(Vec<u8>),
    /// Drop the chunk entirely.
    Dropped,
}

/// A payload filter inspecting/rewriting bytes flowing in one direction of
/// a Connection.
pub trait Filter: Send + Sync {
    /// Called with a chunk read from the client and about to flow toward
    /// the server (after TLS unwrap on the client side, if any).
    fn on_client_data(&self, data: &[u8]) -> FilterOutcome;

    /// Called with a chunk read from the server and about to flow toward
    /// the client.
    fn on_server_data(&self, data: &[u8]) -> FilterOutcome;
}

/// A filter that forwards every chunk unchanged; the default when no
/// `filter.class` is configured.
pub struct PassthroughFilter;

impl Filter for PassthroughFilter {
    fn on_client_data(&self, _data: &[u8]) -> FilterOutcome {
        FilterOutcome::Unchanged
    }

    fn on_server_data(&self, _data: &[u8]) -> FilterOutcome {
        FilterOutcome::Unchanged
    }
}

/// Build-time registry standing in for the configured-class-name loader:
/// register named filter constructors once, then resolve `filter.class`
/// against the registry at startup.
pub struct FilterRegistry {
    builders: Vec<(&'static str, fn() -> Box<dyn Filter>)>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self {
            builders: Vec::new(),
        }
    }

    pub fn register(&mut self, name: &'static str, builder: fn() -> Box<dyn Filter>) {
        self.builders.push((name, builder));
    }

    pub fn build(&self, name: &str) -> Option<Box<dyn Filter>> {
        self.builders
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, b)| b())
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
