//! Peer cache configuration

use crate::error::{PeerError, PeerResult};

/// Maximum number of records of each kind the cache may hold at once.
///
/// The counts are shared by all peers: a single peer with a large attribute
/// table can use the whole service or descriptor budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolCapacities {
    pub max_peers: usize,
    pub max_services: usize,
    pub max_included_services: usize,
    pub max_characteristics: usize,
    pub max_descriptors: usize,
}

impl PoolCapacities {
    pub const fn new(
        max_peers: usize,
        max_services: usize,
        max_characteristics: usize,
        max_descriptors: usize,
    ) -> Self {
        Self {
            max_peers,
            max_services,
            max_included_services: 0,
            max_characteristics,
            max_descriptors,
        }
    }

    pub const fn with_included_services(mut self, max_included_services: usize) -> Self {
        self.max_included_services = max_included_services;
        self
    }

    pub(crate) fn validate(&self) -> PeerResult<()> {
        if self.max_peers == 0 {
            return Err(PeerError::InvalidConfig(
                "max_peers must be at least 1".into(),
            ));
        }
        match self.total() {
            Some(total) if u32::try_from(total).is_ok() => Ok(()),
            Some(total) => Err(PeerError::InvalidConfig(format!(
                "{} records exceed the addressable pool size",
                total
            ))),
            None => Err(PeerError::InvalidConfig(
                "record count overflows usize".into(),
            )),
        }
    }

    /// Total number of records across all pools, `None` on overflow
    pub fn total(&self) -> Option<usize> {
        [
            self.max_services,
            self.max_included_services,
            self.max_characteristics,
            self.max_descriptors,
        ]
        .into_iter()
        .try_fold(self.max_peers, usize::checked_add)
    }
}

impl Default for PoolCapacities {
    fn default() -> Self {
        Self {
            max_peers: 4,
            max_services: 64,
            max_included_services: 0,
            max_characteristics: 64,
            max_descriptors: 64,
        }
    }
}

/// What happens to the nodes linked by a discovery session that fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Keep whatever was discovered before the failure
    #[default]
    RetainPartial,
    /// Release the partial tree before reporting the failure
    DiscardPartial,
}

/// Configuration for a [`PeerCache`](crate::PeerCache)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PeerCacheConfig {
    /// Pool sizes, fixed for the lifetime of the cache
    pub capacities: PoolCapacities,
    /// Run an included-service round before each service's characteristics
    pub discover_included: bool,
    /// Handling of partial trees on failed sessions
    pub failure_policy: FailurePolicy,
}

impl PeerCacheConfig {
    pub fn new(capacities: PoolCapacities) -> Self {
        Self {
            capacities,
            ..Default::default()
        }
    }

    pub fn with_included_discovery(mut self, enabled: bool) -> Self {
        self.discover_included = enabled;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_zero_peers() {
        let capacities = PoolCapacities::new(0, 4, 4, 4);
        assert!(matches!(
            capacities.validate(),
            Err(PeerError::InvalidConfig(_))
        ));
        assert!(PoolCapacities::new(1, 0, 0, 0).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_overflowing_capacities() {
        let capacities = PoolCapacities::new(usize::MAX, 1, 1, 1);
        assert_eq!(capacities.total(), None);
        assert!(matches!(
            capacities.validate(),
            Err(PeerError::InvalidConfig(_))
        ));

        let capacities = PoolCapacities::new(1, usize::MAX, usize::MAX, usize::MAX)
            .with_included_services(usize::MAX);
        assert!(matches!(
            capacities.validate(),
            Err(PeerError::InvalidConfig(_))
        ));

        let capacities = PoolCapacities::new(1, u32::MAX as usize, 1, 1);
        assert!(matches!(
            capacities.validate(),
            Err(PeerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_builders() {
        let config = PeerCacheConfig::new(PoolCapacities::new(1, 2, 3, 4).with_included_services(2))
            .with_included_discovery(true)
            .with_failure_policy(FailurePolicy::DiscardPartial);

        assert_eq!(config.capacities.max_included_services, 2);
        assert_eq!(config.capacities.total(), Some(12));
        assert!(config.discover_included);
        assert_eq!(config.failure_policy, FailurePolicy::DiscardPartial);
    }
}
