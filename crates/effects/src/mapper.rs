//! Normalized (UI) parameter values to the physical values shaders consume.
//!
//! Every `(effect, parameter)` pair maps linearly onto a fixed range. Pairs
//! without an entry fall back to the identity range so custom effects receive
//! their normalized values unchanged.

/// Closed interval a normalized value is stretched onto.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterRange {
    pub min: f32,
    pub max: f32,
}

impl ParameterRange {
    pub const IDENTITY: Self = Self { min: 0.0, max: 1.0 };

    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Clamps `normalized` into [0, 1] (NaN counts as 0) and interpolates.
    pub fn map(self, normalized: f32) -> f32 {
        let t = if normalized.is_nan() {
            0.0
        } else {
            normalized.clamp(0.0, 1.0)
        };
        self.min + (self.max - self.min) * t
    }
}

const RANGES: &[(&str, &str, ParameterRange)] = &[
    ("fisheye", "strength", ParameterRange::new(0.2, 2.0)),
    ("fisheye", "radius", ParameterRange::new(0.3, 1.0)),
    ("horizontal_stretch", "strength", ParameterRange::new(0.1, 0.8)),
    ("vertical_stretch", "strength", ParameterRange::new(0.1, 0.8)),
    ("twist", "strength", ParameterRange::new(1.0, 1.4)),
    ("twist", "radius", ParameterRange::new(0.4, 1.0)),
    ("bulge", "strength", ParameterRange::new(0.1, 0.8)),
    ("bulge", "radius", ParameterRange::new(0.2, 0.9)),
    ("wave", "strength", ParameterRange::new(0.05, 0.3)),
    ("wave", "frequency", ParameterRange::new(4.0, 12.0)),
    ("wave", "speed", ParameterRange::new(1.0, 4.0)),
    ("barrel", "strength", ParameterRange::new(0.1, 1.5)),
    ("barrel", "radius", ParameterRange::new(0.2, 1.0)),
    ("pincushion", "strength", ParameterRange::new(0.1, 1.0)),
    ("pincushion", "radius", ParameterRange::new(0.2, 1.0)),
    ("ripple", "strength", ParameterRange::new(0.3, 5.0)),
    ("ripple", "frequency", ParameterRange::new(4.0, 20.0)),
    ("ripple", "speed", ParameterRange::new(2.0, 12.0)),
    ("slim_face", "strength", ParameterRange::new(0.1, 0.7)),
    ("slim_face", "radius", ParameterRange::new(0.05, 0.15)),
    ("stretch", "strength", ParameterRange::new(0.1, 1.0)),
    ("stretch", "radius", ParameterRange::new(0.08, 0.3)),
    ("distort", "strength", ParameterRange::new(0.1, 0.4)),
    ("distort", "frequency", ParameterRange::new(4.0, 12.0)),
];

pub fn range_for(effect_id: &str, parameter: &str) -> ParameterRange {
    RANGES
        .iter()
        .find(|(effect, name, _)| *effect == effect_id && *name == parameter)
        .map(|(_, _, range)| *range)
        .unwrap_or(ParameterRange::IDENTITY)
}

pub fn map_parameter(effect_id: &str, parameter: &str, normalized: f32) -> f32 {
    range_for(effect_id, parameter).map(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::builtin_effects;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn every_builtin_parameter_has_a_range() {
        for effect in builtin_effects() {
            for name in effect.parameters().keys() {
                let known = RANGES
                    .iter()
                    .any(|(id, param, _)| *id == effect.id() && param == name);
                assert!(known, "{}.{name} has no range", effect.id());
            }
        }
    }

    #[test]
    fn mapping_is_monotonic() {
        for (effect, param, _) in RANGES {
            let mut previous = f32::NEG_INFINITY;
            for step in 0..=20 {
                let value = map_parameter(effect, param, step as f32 / 20.0);
                assert!(value >= previous, "{effect}.{param} decreased at step {step}");
                previous = value;
            }
        }
    }

    #[test]
    fn out_of_range_input_clamps_to_endpoints() {
        for (effect, param, range) in RANGES {
            assert!(approx(map_parameter(effect, param, -3.0), range.min));
            assert!(approx(map_parameter(effect, param, 7.5), range.max));
            assert!(approx(map_parameter(effect, param, f32::NAN), range.min));
        }
    }

    #[test]
    fn known_pairs_interpolate() {
        assert!(approx(map_parameter("fisheye", "strength", 0.5), 1.1));
        assert!(approx(map_parameter("wave", "frequency", 0.75), 10.0));
        assert!(approx(map_parameter("twist", "strength", 0.0), 1.0));
        assert!(approx(map_parameter("slim_face", "radius", 1.0), 0.15));
    }

    #[test]
    fn unknown_pairs_pass_through() {
        assert_eq!(range_for("custom_1", "glow"), ParameterRange::IDENTITY);
        assert!(approx(map_parameter("fisheye", "glow", 0.4), 0.4));
        assert!(approx(map_parameter("custom_1", "glow", 2.0), 1.0));
    }
}
