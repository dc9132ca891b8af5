//! Smoothing of remote entity motion between sparse updates
//!
//! Each tick the displayed position covers a fixed fraction of the remaining
//! distance to the latest reported target. Large jumps (respawns, teleports)
//! snap straight to the target and tiny residuals settle onto it exactly.

use crate::config::InterpolationConfig;
use crate::Vec2;

/// Displayed position of a remote entity and the target it is approaching
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    pub position: Vec2,
    pub target: Vec2,
}

impl Motion {
    /// Starts at rest on `position`
    pub fn at(position: Vec2) -> Self {
        Self {
            position,
            target: position,
        }
    }

    /// Replaces the target; the approach restarts from the current position
    pub fn retarget(&mut self, target: Vec2) {
        self.target = target;
    }

    pub fn remaining(&self) -> f32 {
        self.position.distance(self.target)
    }
}

/// What a single interpolation step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    AtRest,
    Snapped,
    Approached,
    Settled,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Interpolator {
    config: InterpolationConfig,
}

impl Interpolator {
    pub fn new(config: InterpolationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InterpolationConfig {
        &self.config
    }

    /// Advances one tick
    pub fn step(&self, motion: &mut Motion) -> Step {
        let remaining = motion.remaining();

        if remaining == 0.0 {
            Step::AtRest
        } else if remaining > self.config.snap_threshold {
            motion.position = motion.target;
            Step::Snapped
        } else if remaining < self.config.settle_threshold {
            motion.position = motion.target;
            Step::Settled
        } else {
            let delta = motion.target - motion.position;
            motion.position = motion.position + delta * self.config.approach_factor;
            Step::Approached
        }
    }

    pub fn step_all<'a>(&self, motions: impl IntoIterator<Item = &'a mut Motion>) {
        for motion in motions {
            self.step(motion);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn moving(from: Vec2, to: Vec2) -> Motion {
        let mut motion = Motion::at(from);
        motion.retarget(to);
        motion
    }

    #[test]
    fn test_first_step_covers_thirty_percent() {
        let interpolator = Interpolator::default();
        let mut motion = moving(Vec2::new(0.0, 0.0), Vec2::new(30.0, 40.0));

        assert_eq!(interpolator.step(&mut motion), Step::Approached);
        assert_approx_eq!(motion.position.distance(Vec2::ZERO), 0.3 * 50.0, 1e-4);
        assert_approx_eq!(motion.remaining(), 0.7 * 50.0, 1e-4);
    }

    #[test]
    fn test_large_jump_snaps() {
        let interpolator = Interpolator::default();
        let target = Vec2::new(100.0, 0.0);
        let mut motion = moving(Vec2::ZERO, target);

        assert_eq!(interpolator.step(&mut motion), Step::Snapped);
        assert_eq!(motion.position, target);
    }

    #[test]
    fn test_exact_threshold_is_smoothed() {
        let interpolator = Interpolator::default();
        let mut motion = moving(Vec2::ZERO, Vec2::new(50.0, 0.0));

        assert_eq!(interpolator.step(&mut motion), Step::Approached);
        assert_approx_eq!(motion.position.x, 15.0, 1e-4);
    }

    #[test]
    fn test_repeated_steps_converge() {
        let interpolator = Interpolator::default();
        let mut motion = moving(Vec2::ZERO, Vec2::new(40.0, 0.0));

        let mut previous = motion.remaining();
        for _ in 0..5 {
            interpolator.step(&mut motion);
            let remaining = motion.remaining();
            assert!(remaining < previous);
            assert_approx_eq!(remaining, previous * 0.7, 1e-3);
            previous = remaining;
        }
    }

    #[test]
    fn test_small_residual_settles_exactly() {
        let interpolator = Interpolator::default();
        let target = Vec2::new(10.4, 0.0);
        let mut motion = moving(Vec2::new(10.0, 0.0), target);

        assert_eq!(interpolator.step(&mut motion), Step::Settled);
        assert_eq!(motion.position, target);
        assert_eq!(interpolator.step(&mut motion), Step::AtRest);
    }

    #[test]
    fn test_retarget_restarts_approach() {
        let interpolator = Interpolator::default();
        let mut motion = moving(Vec2::ZERO, Vec2::new(20.0, 0.0));
        interpolator.step(&mut motion);
        assert_approx_eq!(motion.position.x, 6.0, 1e-4);

        motion.retarget(Vec2::new(6.0, 10.0));
        interpolator.step(&mut motion);
        assert_approx_eq!(motion.position.x, 6.0, 1e-4);
        assert_approx_eq!(motion.position.y, 3.0, 1e-4);
    }

    #[test]
    fn test_step_all() {
        let interpolator = Interpolator::new(InterpolationConfig {
            approach_factor: 0.5,
            ..InterpolationConfig::default()
        });
        let mut motions = vec![
            moving(Vec2::ZERO, Vec2::new(10.0, 0.0)),
            moving(Vec2::ZERO, Vec2::new(0.0, 20.0)),
        ];
        interpolator.step_all(motions.iter_mut());
        assert_approx_eq!(motions[0].position.x, 5.0, 1e-4);
        assert_approx_eq!(motions[1].position.y, 10.0, 1e-4);
    }
}
