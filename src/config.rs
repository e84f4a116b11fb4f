//! Configuration for a fork point.

/// What a freshly cloned handle does with an item that is already cached but
/// not yet delivered to every sibling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LateJoin {
    /// The clone only receives items fetched after it was created.
    #[default]
    Exclude,
    /// The clone starts where the handle it was cloned from stands: if the
    /// parent has not taken the cached item yet, neither has the clone.
    Inherit,
}

/// Settings shared by every handle of one fork point.
///
/// ```
/// use stream_fork::{ForkConfig, LateJoin};
///
/// let config = ForkConfig::new()
///     .late_join(LateJoin::Inherit)
///     .label("ticks");
///
/// assert_eq!(config.late_join, LateJoin::Inherit);
/// assert_eq!(config.label.as_deref(), Some("ticks"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForkConfig {
    /// Late-joiner policy applied on every `clone()`.
    pub late_join: LateJoin,
    /// Optional name attached to log events of this fork point.
    pub label: Option<String>,
}

impl ForkConfig {
    /// Default configuration: [`LateJoin::Exclude`], no label.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the late-joiner policy.
    pub fn late_join(mut self, policy: LateJoin) -> Self {
        self.late_join = policy;
        self
    }

    /// Set the label used in log events.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}
