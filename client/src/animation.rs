use std::time::Duration;

use artisan_shared::{Gazetteer, Viewport};

use crate::config::EngineConfig;
use crate::viewport::district_target;

/// Second half of a district focus, due after `delay`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingFocus {
    pub generation: u64,
    pub target: Viewport,
    pub delay: Duration,
}

/// A two-phase district focus: reset to the default view right away, then
/// (if the district is known) move onto it once the delay has passed.
///
/// Passing through the default view gives the provider a visible transition
/// instead of a jump cut.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusPlan {
    pub immediate: Viewport,
    pub pending: Option<PendingFocus>,
}

/// Tracks district focus requests so only the latest one lands.
#[derive(Debug, Default)]
pub struct FocusAnimator {
    generation: u64,
}

impl FocusAnimator {
    pub fn plan(&mut self, district: &str, gazetteer: &Gazetteer, config: &EngineConfig) -> FocusPlan {
        self.generation += 1;
        let pending = gazetteer.lookup(district).map(|found| PendingFocus {
            generation: self.generation,
            target: district_target(found, config),
            delay: config.focus_delay,
        });
        FocusPlan {
            immediate: config.default_viewport,
            pending,
        }
    }

    /// Whether a delayed step from `generation` is still the latest request.
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// Drop any focus still waiting on its delay.
    pub fn cancel(&mut self) {
        self.generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use artisan_shared::Gazetteer;

    use super::FocusAnimator;
    use crate::config::EngineConfig;

    #[test]
    fn known_district_resets_then_targets_centroid() {
        let config = EngineConfig::default();
        let mut animator = FocusAnimator::default();
        let plan = animator.plan("Lahore", &Gazetteer::punjab(), &config);

        assert_eq!(plan.immediate, config.default_viewport);
        let pending = plan.pending.expect("Lahore is in the gazetteer");
        assert_eq!(pending.delay, Duration::from_millis(500));
        assert_eq!(pending.target.zoom, config.district_zoom);
        assert_eq!(pending.target.center.lat, 31.5204);
        assert_eq!(pending.target.center.lng, 74.3587);
        assert!(animator.is_current(pending.generation));
    }

    #[test]
    fn unknown_district_only_resets() {
        let config = EngineConfig::default();
        let mut animator = FocusAnimator::default();
        let plan = animator.plan("Nonexistent", &Gazetteer::punjab(), &config);
        assert_eq!(plan.immediate, config.default_viewport);
        assert!(plan.pending.is_none());
    }

    #[test]
    fn newer_focus_supersedes_pending_one() {
        let config = EngineConfig::default();
        let gazetteer = Gazetteer::punjab();
        let mut animator = FocusAnimator::default();

        let first = animator.plan("Lahore", &gazetteer, &config).pending.expect("known");
        let second = animator.plan("Multan", &gazetteer, &config).pending.expect("known");

        assert!(!animator.is_current(first.generation));
        assert!(animator.is_current(second.generation));

        animator.cancel();
        assert!(!animator.is_current(second.generation));
    }
}
