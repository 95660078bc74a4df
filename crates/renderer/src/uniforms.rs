use std::collections::BTreeMap;

use bytemuck::{Pod, Zeroable};
use effects::{map_parameter, uniform_name, EffectDescriptor, MAX_PARAMETERS};

use crate::types::Viewport;

/// CPU mirror of the `FunhouseParams` std140 block declared by the wrapped
/// fragment prelude.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct EffectUniforms {
    /// time, aspect, width, height
    pub frame: [f32; 4],
    /// center.x, center.y, unused, unused
    pub extra: [f32; 4],
    pub params: [f32; MAX_PARAMETERS],
}

impl EffectUniforms {
    pub fn new(viewport: Viewport) -> Self {
        let mut uniforms = Self::zeroed();
        uniforms.set_viewport(viewport);
        uniforms.set_center([0.5, 0.5]);
        uniforms
    }

    pub fn time(&self) -> f32 {
        self.frame[0]
    }

    pub fn set_time(&mut self, seconds: f32) {
        self.frame[0] = seconds;
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.frame[1] = viewport.aspect();
        self.frame[2] = viewport.width as f32;
        self.frame[3] = viewport.height as f32;
    }

    pub fn set_center(&mut self, center: [f32; 2]) {
        self.extra[0] = center[0];
        self.extra[1] = center[1];
    }

    pub fn set_slot(&mut self, slot: usize, value: f32) {
        if let Some(target) = self.params.get_mut(slot) {
            *target = value;
        }
    }
}

/// Assigns each descriptor parameter a scalar slot in `params`, in the
/// descriptor's (sorted) parameter order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniformLayout {
    slots: Vec<String>,
}

impl UniformLayout {
    pub fn from_descriptor(descriptor: &EffectDescriptor) -> Self {
        Self {
            slots: descriptor
                .parameters()
                .keys()
                .take(MAX_PARAMETERS)
                .cloned()
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, parameter: &str) -> Option<usize> {
        self.slots.iter().position(|name| name == parameter)
    }

    /// `(parameter, shader uniform name, slot)` triples.
    pub fn bindings(&self) -> impl Iterator<Item = (&str, String, usize)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(slot, name)| (name.as_str(), uniform_name(name), slot))
    }

    /// GLSL expression reading `slot` out of the uniform block.
    pub fn slot_expression(slot: usize) -> String {
        const LANES: [char; 4] = ['x', 'y', 'z', 'w'];
        format!("funhouse.params[{}].{}", slot / 4, LANES[slot % 4])
    }

    /// Maps normalized `values` through the parameter mapper into `uniforms`.
    /// Parameters missing from `values` read as zero.
    pub fn apply(
        &self,
        effect_id: &str,
        values: &BTreeMap<String, f32>,
        uniforms: &mut EffectUniforms,
    ) {
        uniforms.params = [0.0; MAX_PARAMETERS];
        for (slot, name) in self.slots.iter().enumerate() {
            let normalized = values.get(name).copied().unwrap_or(0.0);
            uniforms.set_slot(slot, map_parameter(effect_id, name, normalized));
        }
    }
}
