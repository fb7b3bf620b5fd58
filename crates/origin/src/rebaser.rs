use glam::{DVec3, I64Vec3};
use largemap_common::{ConfigError, MapConfig};
use serde::{Deserialize, Serialize};

use crate::coords::OriginState;

/// Receives synchronous notifications around an origin shift.
///
/// Collaborators holding their own cached local coordinates (physics, audio,
/// network relevancy) use the pre-notification to prepare and the
/// post-notification to re-derive. Both default to no-ops.
pub trait OriginListener {
    fn on_origin_will_change(&mut self, _old: I64Vec3, _new: I64Vec3) {}
    fn on_origin_changed(&mut self, _old: I64Vec3, _new: I64Vec3) {}
}

/// Record of one completed rebase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RebaseEvent {
    pub old: OriginState,
    pub new: OriginState,
}

/// Owns the session origin and shifts it when observers wander too far.
///
/// A rebase runs start to finish inside [`OriginRebaser::check`]; there is no
/// partially rebased state visible to anyone but the listeners.
pub struct OriginRebaser {
    origin: OriginState,
    rebase_distance: f64,
    rebase_unit: f64,
    listeners: Vec<Box<dyn OriginListener>>,
    rebase_count: u64,
}

impl OriginRebaser {
    /// Create a rebaser at the zero origin.
    pub fn new(rebase_distance: f64, rebase_unit: f64) -> Self {
        assert!(rebase_distance > 0.0, "rebase_distance must be positive");
        assert!(rebase_unit > 0.0, "rebase_unit must be positive");
        assert!(
            rebase_unit <= rebase_distance,
            "rebase_unit must not exceed rebase_distance"
        );
        Self {
            origin: OriginState::ZERO,
            rebase_distance,
            rebase_unit,
            listeners: Vec::new(),
            rebase_count: 0,
        }
    }

    /// Create a rebaser from a session config, validating it first.
    pub fn from_config(config: &MapConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(config.rebase_distance, config.rebase_unit))
    }

    /// Current origin.
    pub fn origin(&self) -> &OriginState {
        &self.origin
    }

    /// Number of rebases performed this session.
    pub fn rebase_count(&self) -> u64 {
        self.rebase_count
    }

    pub fn add_listener(&mut self, listener: Box<dyn OriginListener>) {
        self.listeners.push(listener);
    }

    /// True when any position lies farther than the threshold from the
    /// coarse offset.
    pub fn needs_rebase(&self, positions: &[DVec3]) -> bool {
        let coarse = self.origin.coarse().as_dvec3();
        positions
            .iter()
            .any(|p| p.distance(coarse) > self.rebase_distance)
    }

    /// Origin a rebase would move to: the multiple of the rebase unit closest
    /// to the center of the positions' bounding box.
    pub fn target_for(&self, positions: &[DVec3]) -> Option<OriginState> {
        let first = *positions.first()?;
        let (min, max) = positions
            .iter()
            .fold((first, first), |(lo, hi), p| (lo.min(*p), hi.max(*p)));
        let center = (min + max) * 0.5;
        let snapped = (center / self.rebase_unit).round() * self.rebase_unit;
        Some(OriginState::from_translation(snapped))
    }

    /// Rebase if needed.
    ///
    /// `relocate` runs between the two listener notifications with the new
    /// origin already in place; callers use it to rewrite the local frame of
    /// everything they track. Returns the event when a shift happened.
    pub fn check<F>(&mut self, positions: &[DVec3], relocate: F) -> Option<RebaseEvent>
    where
        F: FnOnce(&OriginState),
    {
        if !self.needs_rebase(positions) {
            return None;
        }
        let new = self.target_for(positions)?;
        let old = self.origin;
        if new == old {
            // Only reachable with several observers spread wider than the
            // threshold around the origin; a lone observer always moves it.
            tracing::debug!(?old, "rebase target equals current origin, skipping");
            return None;
        }

        let _span = tracing::info_span!("rebase").entered();
        for listener in &mut self.listeners {
            listener.on_origin_will_change(old.coarse(), new.coarse());
        }
        self.origin = new;
        relocate(&self.origin);
        for listener in &mut self.listeners {
            listener.on_origin_changed(old.coarse(), new.coarse());
        }
        self.rebase_count += 1;

        tracing::info!(
            old = ?old.coarse(),
            new = ?new.coarse(),
            count = self.rebase_count,
            "origin rebased"
        );
        Some(RebaseEvent { old, new })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        calls: Rc<RefCell<Vec<(&'static str, I64Vec3, I64Vec3)>>>,
    }

    impl OriginListener for Recorder {
        fn on_origin_will_change(&mut self, old: I64Vec3, new: I64Vec3) {
            self.calls.borrow_mut().push(("will", old, new));
        }
        fn on_origin_changed(&mut self, old: I64Vec3, new: I64Vec3) {
            self.calls.borrow_mut().push(("did", old, new));
        }
    }

    #[test]
    fn no_rebase_within_threshold() {
        let mut rebaser = OriginRebaser::new(1000.0, 100.0);
        let positions = [DVec3::new(999.0, 0.0, 0.0), DVec3::new(-500.0, 500.0, 0.0)];
        let mut relocated = false;
        assert!(rebaser.check(&positions, |_| relocated = true).is_none());
        assert!(!relocated);
        assert_eq!(rebaser.rebase_count(), 0);
        assert_eq!(*rebaser.origin(), OriginState::ZERO);
    }

    #[test]
    fn no_rebase_without_observers() {
        let mut rebaser = OriginRebaser::new(1000.0, 100.0);
        assert!(rebaser.check(&[], |_| {}).is_none());
    }

    #[test]
    fn rebase_moves_origin_onto_observer() {
        let mut rebaser = OriginRebaser::new(1000.0, 100.0);
        let absolute = DVec3::new(1200.0, 0.0, 0.0);
        let before = rebaser.origin().to_local(absolute);

        let mut after = None;
        let event = rebaser
            .check(&[absolute], |origin| after = Some(origin.to_local(absolute)))
            .expect("rebase should fire");

        assert_eq!(event.old, OriginState::ZERO);
        assert_eq!(event.new.coarse(), I64Vec3::new(1200, 0, 0));
        let after = after.unwrap();
        assert!(after.length() < before.length());
        assert_eq!(after, glam::Vec3::ZERO);
        // Absolute position is unchanged by the shift.
        let restored = rebaser.origin().to_absolute(after);
        assert!((restored - absolute).length() < 1e-6);
    }

    #[test]
    fn rebase_preserves_absolute_positions() {
        let mut rebaser = OriginRebaser::new(500.0, 64.0);
        let positions = [
            DVec3::new(10_000.3, -2_500.7, 12.0),
            DVec3::new(10_300.0, -2_400.0, 0.0),
        ];
        let old = *rebaser.origin();
        let locals_before: Vec<_> = positions.iter().map(|p| old.to_local(*p)).collect();

        let event = rebaser.check(&positions, |_| {}).unwrap();
        for (p, local_before) in positions.iter().zip(&locals_before) {
            let before = event.old.to_absolute(*local_before);
            let after = event.new.to_absolute(event.new.to_local(*p));
            assert!((before - after).length() < 1e-2, "{before} vs {after}");
        }
    }

    #[test]
    fn listeners_bracket_the_shift() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut rebaser = OriginRebaser::new(1000.0, 1000.0);
        rebaser.add_listener(Box::new(Recorder {
            calls: calls.clone(),
        }));

        let seen_during = Rc::new(RefCell::new(0usize));
        let seen = seen_during.clone();
        let log = calls.clone();
        rebaser.check(&[DVec3::new(0.0, 3100.0, 0.0)], move |_| {
            *seen.borrow_mut() = log.borrow().len();
        });

        let calls = calls.borrow();
        let expected = I64Vec3::new(0, 3000, 0);
        assert_eq!(
            *calls,
            vec![
                ("will", I64Vec3::ZERO, expected),
                ("did", I64Vec3::ZERO, expected)
            ]
        );
        // relocate ran after the pre-notification and before the post one
        assert_eq!(*seen_during.borrow(), 1);
    }

    #[test]
    fn target_is_bounding_box_center() {
        let rebaser = OriginRebaser::new(1000.0, 100.0);
        let target = rebaser
            .target_for(&[DVec3::new(0.0, 0.0, 0.0), DVec3::new(2000.0, 420.0, 0.0)])
            .unwrap();
        assert_eq!(target.coarse(), I64Vec3::new(1000, 200, 0));
    }

    #[test]
    fn fractional_unit_keeps_split_invariant() {
        let mut rebaser = OriginRebaser::new(10.0, 0.25);
        let event = rebaser.check(&[DVec3::new(20.6, 0.0, 0.0)], |_| {}).unwrap();
        assert_eq!(event.new.coarse(), I64Vec3::new(20, 0, 0));
        assert_eq!(event.new.fraction(), DVec3::new(0.5, 0.0, 0.0));
        assert_eq!(event.new.translation(), DVec3::new(20.5, 0.0, 0.0));
    }

    #[test]
    fn spread_observers_do_not_rebase_in_place() {
        // Centered pair farther apart than the threshold: the best origin is
        // where we already are, so nothing fires.
        let mut rebaser = OriginRebaser::new(100.0, 50.0);
        let positions = [DVec3::new(-150.0, 0.0, 0.0), DVec3::new(150.0, 0.0, 0.0)];
        assert!(rebaser.needs_rebase(&positions));
        assert!(rebaser.check(&positions, |_| {}).is_none());
    }

    #[test]
    fn large_tile_config_still_rebases_past_threshold() {
        let mut rebaser = OriginRebaser::from_config(&MapConfig::with_tile_side(9_000.0)).unwrap();
        let absolute = DVec3::new(3000.0, 0.0, 0.0);
        assert!(rebaser.needs_rebase(&[absolute]));

        let event = rebaser.check(&[absolute], |_| {}).expect("rebase should fire");
        assert_eq!(event.new.coarse(), I64Vec3::new(4000, 0, 0));
        assert!(!rebaser.needs_rebase(&[absolute]));
    }

    #[test]
    fn lone_observer_just_past_threshold_is_pulled_back() {
        // Largest valid unit, observer barely outside on a diagonal.
        let mut rebaser = OriginRebaser::new(1000.0, 1000.0);
        let absolute = DVec3::new(1.0, 1.0, 1.0).normalize() * 1000.5;
        assert!(rebaser.needs_rebase(&[absolute]));
        assert!(rebaser.check(&[absolute], |_| {}).is_some());
        assert!(!rebaser.needs_rebase(&[absolute]));
    }

    #[test]
    #[should_panic(expected = "rebase_unit must not exceed rebase_distance")]
    fn unit_coarser_than_threshold_panics() {
        OriginRebaser::new(2000.0, 9000.0);
    }

    #[test]
    fn from_config_rejects_coarse_unit() {
        let config = MapConfig {
            rebase_unit: 9_000.0,
            ..MapConfig::default()
        };
        assert!(matches!(
            OriginRebaser::from_config(&config),
            Err(ConfigError::RebaseUnitTooCoarse { .. })
        ));
    }

    #[test]
    fn from_config_rejects_bad_values() {
        let config = MapConfig {
            rebase_unit: 0.0,
            ..MapConfig::default()
        };
        assert!(OriginRebaser::from_config(&config).is_err());
    }
}
