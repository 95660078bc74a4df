//! Effects compiled into the binary. Shader text lives under `shaders/` and
//! reads physical parameter values; the mapper converts from UI units.

use crate::descriptor::EffectDescriptor;

/// Identity program used whenever no effect is installed or compilation fails.
pub const PASSTHROUGH_SOURCE: &str = include_str!("../shaders/passthrough.frag");

struct Builtin {
    id: &'static str,
    name: &'static str,
    source: &'static str,
    parameters: &'static [(&'static str, f32)],
}

const BUILTINS: &[Builtin] = &[
    Builtin {
        id: "fisheye",
        name: "Fisheye",
        source: include_str!("../shaders/fisheye.frag"),
        parameters: &[("strength", 0.8), ("radius", 0.5)],
    },
    Builtin {
        id: "horizontal_stretch",
        name: "Horizontal Stretch",
        source: include_str!("../shaders/horizontal_stretch.frag"),
        parameters: &[("strength", 0.5)],
    },
    Builtin {
        id: "vertical_stretch",
        name: "Vertical Stretch",
        source: include_str!("../shaders/vertical_stretch.frag"),
        parameters: &[("strength", 0.5)],
    },
    Builtin {
        id: "twist",
        name: "Kaleidoscope",
        source: include_str!("../shaders/twist.frag"),
        parameters: &[("strength", 0.5), ("radius", 0.5)],
    },
    Builtin {
        id: "bulge",
        name: "Bulge",
        source: include_str!("../shaders/bulge.frag"),
        parameters: &[("strength", 0.6), ("radius", 0.5)],
    },
    Builtin {
        id: "wave",
        name: "Wave",
        source: include_str!("../shaders/wave.frag"),
        parameters: &[("strength", 0.2), ("frequency", 0.75), ("speed", 0.33)],
    },
    Builtin {
        id: "barrel",
        name: "Barrel",
        source: include_str!("../shaders/barrel.frag"),
        parameters: &[("strength", 0.3), ("radius", 0.5)],
    },
    Builtin {
        id: "pincushion",
        name: "Pincushion",
        source: include_str!("../shaders/pincushion.frag"),
        parameters: &[("strength", 0.4), ("radius", 0.5)],
    },
    Builtin {
        id: "ripple",
        name: "Ripple",
        source: include_str!("../shaders/ripple.frag"),
        parameters: &[("strength", 0.0), ("frequency", 0.69), ("speed", 0.0)],
    },
    Builtin {
        id: "slim_face",
        name: "Slim Face",
        source: include_str!("../shaders/slim_face.frag"),
        parameters: &[("strength", 0.2), ("radius", 0.5)],
    },
    Builtin {
        id: "stretch",
        name: "Stretch",
        source: include_str!("../shaders/stretch.frag"),
        parameters: &[("strength", 0.3), ("radius", 0.5)],
    },
    Builtin {
        id: "distort",
        name: "Distort",
        source: include_str!("../shaders/distort.frag"),
        parameters: &[("strength", 0.1), ("frequency", 0.5)],
    },
    Builtin {
        id: "mirror",
        name: "Mirror",
        source: include_str!("../shaders/mirror.frag"),
        parameters: &[],
    },
];

/// Built-in effects in catalog order.
pub fn builtin_effects() -> Vec<EffectDescriptor> {
    BUILTINS
        .iter()
        .map(|builtin| {
            EffectDescriptor::new(builtin.id, builtin.name, builtin.source)
                .with_parameters(builtin.parameters.iter().copied())
        })
        .collect()
}

/// Descriptor for the pass-through program. It never appears in a catalog.
pub fn passthrough() -> EffectDescriptor {
    EffectDescriptor::new("passthrough", "Pass-through", PASSTHROUGH_SOURCE)
}
