use glam::{DVec3, I64Vec3, Vec3};
use serde::{Deserialize, Serialize};

/// World-space translation currently applied to every local coordinate.
///
/// Split into an integer coarse offset and a fractional remainder so the
/// origin can sit arbitrarily far from the nominal center without losing the
/// sub-unit part. Absolute positions are `DVec3`; local positions are the
/// engine-native `Vec3`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OriginState {
    coarse: I64Vec3,
    fraction: DVec3,
}

impl OriginState {
    pub const ZERO: Self = Self {
        coarse: I64Vec3::ZERO,
        fraction: DVec3::ZERO,
    };

    /// Split a translation into coarse and fractional parts.
    /// The fraction ends up in `[0, 1)` on every axis.
    pub fn from_translation(translation: DVec3) -> Self {
        let coarse = translation.floor().as_i64vec3();
        Self {
            coarse,
            fraction: translation - coarse.as_dvec3(),
        }
    }

    /// Integer part of the origin.
    pub fn coarse(&self) -> I64Vec3 {
        self.coarse
    }

    /// Fractional remainder of the origin.
    pub fn fraction(&self) -> DVec3 {
        self.fraction
    }

    /// Total translation, `coarse + fraction`.
    pub fn translation(&self) -> DVec3 {
        self.coarse.as_dvec3() + self.fraction
    }

    /// `origin + local`
    pub fn to_absolute(&self, local: Vec3) -> DVec3 {
        self.coarse.as_dvec3() + (self.fraction + local.as_dvec3())
    }

    /// `absolute - origin`, narrowed to engine precision.
    pub fn to_local(&self, absolute: DVec3) -> Vec3 {
        ((absolute - self.coarse.as_dvec3()) - self.fraction).as_vec3()
    }
}
