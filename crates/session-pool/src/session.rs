//! The session handle contract.

/// An authenticated session that can sit idle in a pool.
pub trait PooledSession: Send + 'static {
    /// Release the underlying connection. Called for every session the pool
    /// discards: overflow, expiry, disabled pooling, or a cleared registry.
    fn close(self);

    /// Whether the session can still be handed out. Checked on release and
    /// before reuse.
    fn is_usable(&self) -> bool {
        true
    }
}
