use std::collections::BTreeMap;

use crate::error::ValidationError;

/// Number of scalar parameter slots the renderer reserves per effect.
pub const MAX_PARAMETERS: usize = 8;

/// Parameter names that would shadow uniforms the renderer always provides.
const RESERVED_PARAMETERS: [&str; 5] = ["time", "aspect", "resolution", "center", "texture"];

/// Immutable description of a single effect: identity, fragment program text,
/// and the normalized defaults for every parameter it reads.
///
/// Parameters are kept in a `BTreeMap` so their iteration order (and with it
/// the uniform slot each one occupies) is stable across runs.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectDescriptor {
    id: String,
    name: String,
    shader_source: String,
    parameters: BTreeMap<String, f32>,
}

impl EffectDescriptor {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        shader_source: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            shader_source: shader_source.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Adds (or replaces) a parameter and its normalized default.
    pub fn with_parameter(mut self, name: impl Into<String>, default: f32) -> Self {
        self.parameters.insert(name.into(), default);
        self
    }

    pub fn with_parameters<I, K>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = (K, f32)>,
        K: Into<String>,
    {
        for (name, default) in parameters {
            self.parameters.insert(name.into(), default);
        }
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shader_source(&self) -> &str {
        &self.shader_source
    }

    pub fn parameters(&self) -> &BTreeMap<String, f32> {
        &self.parameters
    }

    pub fn parameter_default(&self, name: &str) -> Option<f32> {
        self.parameters.get(name).copied()
    }

    /// Checks the invariants a descriptor must hold before registration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::EmptyId);
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName {
                id: self.id.clone(),
            });
        }
        if self.parameters.len() > MAX_PARAMETERS {
            return Err(ValidationError::TooManyParameters {
                id: self.id.clone(),
                count: self.parameters.len(),
                max: MAX_PARAMETERS,
            });
        }
        for (name, value) in &self.parameters {
            if !is_valid_parameter_name(name) {
                return Err(ValidationError::InvalidParameterName {
                    id: self.id.clone(),
                    name: name.clone(),
                });
            }
            if !value.is_finite() || !(0.0..=1.0).contains(value) {
                return Err(ValidationError::ParameterOutOfRange {
                    id: self.id.clone(),
                    name: name.clone(),
                    value: *value,
                });
            }
        }
        Ok(())
    }
}

/// Accepts lowercase identifiers (`[a-z][a-z0-9_]*`) that do not collide with
/// renderer-provided uniforms.
pub fn is_valid_parameter_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_lowercase() {
        return false;
    }
    if !chars.all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_') {
        return false;
    }
    !RESERVED_PARAMETERS.contains(&name)
}

/// Shader-side uniform name for a parameter: `slim_amount` becomes `uSlimAmount`.
pub fn uniform_name(parameter: &str) -> String {
    let mut out = String::with_capacity(parameter.len() + 1);
    out.push('u');
    let mut upper_next = true;
    for ch in parameter.chars() {
        if ch == '_' {
            upper_next = true;
            continue;
        }
        if upper_next {
            out.push(ch.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_names_are_pascal_cased() {
        assert_eq!(uniform_name("strength"), "uStrength");
        assert_eq!(uniform_name("slim_amount"), "uSlimAmount");
        assert_eq!(uniform_name("band2_width"), "uBand2Width");
    }

    #[test]
    fn rejects_reserved_and_malformed_parameter_names() {
        assert!(is_valid_parameter_name("strength"));
        assert!(is_valid_parameter_name("band_2"));
        assert!(!is_valid_parameter_name("time"));
        assert!(!is_valid_parameter_name("Strength"));
        assert!(!is_valid_parameter_name("2band"));
        assert!(!is_valid_parameter_name(""));
    }

    #[test]
    fn validate_flags_out_of_range_defaults() {
        let descriptor = EffectDescriptor::new("glow", "Glow", "void main() {}")
            .with_parameter("strength", 1.5);
        assert!(matches!(
            descriptor.validate(),
            Err(ValidationError::ParameterOutOfRange { .. })
        ));

        let nan = EffectDescriptor::new("glow", "Glow", "void main() {}")
            .with_parameter("strength", f32::NAN);
        assert!(matches!(
            nan.validate(),
            Err(ValidationError::ParameterOutOfRange { .. })
        ));
    }

    #[test]
    fn validate_limits_parameter_count() {
        let descriptor = EffectDescriptor::new("busy", "Busy", "void main() {}").with_parameters(
            (0..=MAX_PARAMETERS).map(|index| (format!("p{index}"), 0.5)),
        );
        assert!(matches!(
            descriptor.validate(),
            Err(ValidationError::TooManyParameters { count, .. }) if count == MAX_PARAMETERS + 1
        ));
    }
}
