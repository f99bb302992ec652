/// Why the pool is being asked to refill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Startup, login, scheduled refresh, or an exhaustion signal.
    FreshRequest,
    /// Re-delivery after a failed or deferred publish. Never generates keys.
    RetryAfterBackoff,
}

/// A request to bring the pool up to size and optionally publish it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolIntent {
    pub kind: RequestKind,
    pub upload: bool,
}

impl PoolIntent {
    pub fn fresh() -> Self {
        Self {
            kind: RequestKind::FreshRequest,
            upload: true,
        }
    }

    pub fn retry() -> Self {
        Self {
            kind: RequestKind::RetryAfterBackoff,
            upload: true,
        }
    }

    /// Same intent, generation only.
    pub fn without_upload(self) -> Self {
        Self {
            upload: false,
            ..self
        }
    }

    pub fn into_retry(self) -> Self {
        Self {
            kind: RequestKind::RetryAfterBackoff,
            ..self
        }
    }

    pub fn is_retry(&self) -> bool {
        self.kind == RequestKind::RetryAfterBackoff
    }
}

impl Default for PoolIntent {
    fn default() -> Self {
        Self::fresh()
    }
}
