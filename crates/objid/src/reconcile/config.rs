use core::time::Duration;

/// Tuning knobs for a [`Reconciler`](crate::Reconciler).
///
/// # Example
/// ```
/// use core::time::Duration;
/// use objid::ReconcileConfig;
///
/// let config = ReconcileConfig::new()
///     .with_max_attempts(8)
///     .with_deadline(Duration::from_secs(10))
///     .with_lease(true);
/// assert_eq!(config.max_attempts(), 8);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileConfig {
    max_attempts: u32,
    deadline: Option<Duration>,
    backoff: Duration,
    use_lease: bool,
}

impl ReconcileConfig {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
    pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(50);

    pub const fn new() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            deadline: None,
            backoff: Self::DEFAULT_BACKOFF,
            use_lease: false,
        }
    }

    /// Maximum number of fetch-merge-commit attempts per run. Clamped to at
    /// least one.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = if max_attempts == 0 { 1 } else { max_attempts };
        self
    }

    /// Wall-clock budget for a whole run, measured from its start.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Pause between a conflicting attempt and the next fetch.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Whether to take the store's update lease around merge and commit.
    #[must_use]
    pub const fn with_lease(mut self, use_lease: bool) -> Self {
        self.use_lease = use_lease;
        self
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub const fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub const fn backoff(&self) -> Duration {
        self.backoff
    }

    pub const fn use_lease(&self) -> bool {
        self.use_lease
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self::new()
    }
}
