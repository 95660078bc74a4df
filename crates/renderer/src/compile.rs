//! Turns GLSL-ES style effect sources into Vulkan GLSL the GPU backend can
//! build, and validates the result with naga before any GPU work happens.
//!
//! Effect sources are written against the classic WebGL contract (`uniform`
//! declarations, `varying vec2 vTextureCoord`, `texture2D`, `gl_FragColor`).
//! Wrapping blanks out the declarations the prelude replaces and maps every
//! contract name onto the std140 block, texture, and sampler via macros.
//! Blanked lines stay in place so naga's line numbers match the effect file.
use effects::EffectDescriptor;
use wgpu::naga;

use crate::error::{ShaderError, ShaderStage};
use crate::uniforms::UniformLayout;

/// Uniforms every effect may read without a descriptor parameter.
const PROVIDED_UNIFORMS: [&str; 5] = ["uTexture", "uTime", "uAspect", "uResolution", "uCenter"];

const PRECISION_QUALIFIERS: [&str; 3] = ["lowp", "mediump", "highp"];

/// Wrapped, validated fragment source plus the slot layout it was wrapped
/// against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedProgram {
    pub effect_id: String,
    pub fragment: String,
    pub layout: UniformLayout,
}

/// Wraps and validates `descriptor` for the GPU.
pub fn prepare(descriptor: &EffectDescriptor) -> Result<PreparedProgram, ShaderError> {
    let layout = UniformLayout::from_descriptor(descriptor);
    let fragment = wrap_fragment(descriptor.shader_source(), &layout);
    validate_glsl(&fragment, ShaderStage::Fragment)?;
    Ok(PreparedProgram {
        effect_id: descriptor.id().to_string(),
        fragment,
        layout,
    })
}

/// Parses and validates GLSL 450 with naga.
pub fn validate_glsl(source: &str, stage: ShaderStage) -> Result<naga::Module, ShaderError> {
    let naga_stage = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    };
    let mut frontend = naga::front::glsl::Frontend::default();
    let module = frontend
        .parse(&naga::front::glsl::Options::from(naga_stage), source)
        .map_err(|err| ShaderError::Compile {
            stage,
            message: err.emit_to_string(source),
        })?;

    // GLSL carries no uniformity requirement for implicit-derivative sampling.
    let flags = naga::valid::ValidationFlags::all()
        - naga::valid::ValidationFlags::CONTROL_FLOW_UNIFORMITY;
    naga::valid::Validator::new(flags, naga::valid::Capabilities::all())
        .validate(&module)
        .map_err(|err| ShaderError::Compile {
            stage,
            message: err.emit_to_string(source),
        })?;
    Ok(module)
}

/// Produces a self-contained GLSL 450 fragment shader from an effect source.
pub fn wrap_fragment(source: &str, layout: &UniformLayout) -> String {
    let bound: Vec<String> = layout.bindings().map(|(_, uniform, _)| uniform).collect();
    let mut defaults = String::new();
    let mut body = String::with_capacity(source.len());

    for line in source.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("#version")
            || trimmed.starts_with("#extension")
            || trimmed.starts_with("precision ")
        {
            body.push('\n');
            continue;
        }

        let declaration = trimmed
            .strip_prefix("uniform ")
            .or_else(|| trimmed.strip_prefix("varying "));
        if let Some(declaration) = declaration {
            if let Some((ty, names)) = parse_declaration(declaration) {
                for (name, array_len) in names {
                    if name == "vTextureCoord"
                        || PROVIDED_UNIFORMS.contains(&name.as_str())
                        || bound.contains(&name)
                    {
                        continue;
                    }
                    defaults.push_str(&default_macro(&ty, &name, array_len));
                }
                body.push('\n');
                continue;
            }
        }

        body.push_str(line);
        body.push('\n');
    }

    let mut parameters = String::new();
    for (_, uniform, slot) in layout.bindings() {
        parameters.push_str(&format!(
            "#define {uniform} {}\n",
            UniformLayout::slot_expression(slot)
        ));
    }

    format!("{HEADER}{parameters}{defaults}#line 1\n{body}")
}

/// Splits `[precision] TYPE name[, name[N]...];` into the type and names.
fn parse_declaration(declaration: &str) -> Option<(String, Vec<(String, Option<u32>)>)> {
    let declaration = declaration
        .split("//")
        .next()
        .unwrap_or_default()
        .trim()
        .trim_end_matches(';')
        .trim();
    let mut tokens = declaration.splitn(2, char::is_whitespace);
    let mut ty = tokens.next()?.trim();
    let mut rest = tokens.next()?.trim();
    if PRECISION_QUALIFIERS.contains(&ty) {
        let mut remaining = rest.splitn(2, char::is_whitespace);
        ty = remaining.next()?.trim();
        rest = remaining.next()?.trim();
    }

    let names = rest
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| match name.split_once('[') {
            Some((base, len)) => (
                base.trim().to_string(),
                len.trim_end_matches(']').trim().parse().ok(),
            ),
            None => (name.to_string(), None),
        })
        .collect::<Vec<_>>();
    if names.is_empty() {
        return None;
    }
    Some((ty.to_string(), names))
}

/// Macro giving an unbound declaration the zero value of its type. Samplers
/// alias the frame texture.
fn default_macro(ty: &str, name: &str, array_len: Option<u32>) -> String {
    if ty == "sampler2D" {
        return format!("#define {name} sampler2D(funhouse_texture, funhouse_sampler)\n");
    }
    let zero = match ty {
        "int" | "ivec2" | "ivec3" | "ivec4" => format!("{ty}(0)"),
        "uint" | "uvec2" | "uvec3" | "uvec4" => format!("{ty}(0u)"),
        "bool" | "bvec2" | "bvec3" | "bvec4" => format!("{ty}(false)"),
        _ => format!("{ty}(0.0)"),
    };
    match array_len {
        Some(len) if len > 0 => {
            let elements = vec![zero; len as usize].join(", ");
            format!("#define {name} {ty}[{len}]({elements})\n")
        }
        _ => format!("#define {name} {zero}\n"),
    }
}

/// Fragment prelude. The block layout must match [`EffectUniforms`](crate::uniforms::EffectUniforms).
const HEADER: &str = r"#version 450
layout(location = 0) in vec2 funhouse_tex_coord;
layout(location = 0) out vec4 funhouse_frag_color;

layout(std140, set = 0, binding = 0) uniform FunhouseParams {
    vec4 frame;
    vec4 extra;
    vec4 params[2];
} funhouse;

layout(set = 1, binding = 0) uniform texture2D funhouse_texture;
layout(set = 1, binding = 1) uniform sampler funhouse_sampler;

#define vTextureCoord funhouse_tex_coord
#define gl_FragColor funhouse_frag_color
#define texture2D texture
#define uTexture sampler2D(funhouse_texture, funhouse_sampler)
#define uTime funhouse.frame.x
#define uAspect funhouse.frame.y
#define uResolution funhouse.frame.zw
#define uCenter funhouse.extra.xy
";

/// Full-screen quad vertex stage: position at location 0, texcoord at 1.
pub(crate) const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 aPosition;
layout(location = 1) in vec2 aTextureCoord;
layout(location = 0) out vec2 vTextureCoord;

void main() {
    vTextureCoord = aTextureCoord;
    gl_Position = vec4(aPosition, 0.0, 1.0);
}
";

#[cfg(test)]
mod tests {
    use super::*;
    use effects::{builtin_effects, passthrough};

    #[test]
    fn every_builtin_effect_validates() {
        for descriptor in builtin_effects().iter().chain([&passthrough()]) {
            if let Err(err) = prepare(descriptor) {
                panic!("{} failed to validate: {err}", descriptor.id());
            }
        }
    }

    #[test]
    fn vertex_stage_validates() {
        validate_glsl(VERTEX_SHADER_GLSL, ShaderStage::Vertex).expect("vertex shader");
    }

    #[test]
    fn wrap_blanks_declarations_and_keeps_line_numbers() {
        let source = "precision mediump float;\nuniform sampler2D uTexture;\nuniform float uStrength;\nvarying vec2 vTextureCoord;\nvoid main() { gl_FragColor = texture2D(uTexture, vTextureCoord) * uStrength; }\n";
        let descriptor = EffectDescriptor::new("glow", "Glow", source).with_parameter("strength", 0.5);
        let layout = UniformLayout::from_descriptor(&descriptor);
        let wrapped = wrap_fragment(source, &layout);

        assert!(!wrapped.contains("uniform float uStrength"));
        assert!(!wrapped.contains("precision mediump"));
        assert!(wrapped.contains("#define uStrength funhouse.params[0].x"));
        let body = wrapped.split("#line 1\n").nth(1).expect("body follows #line");
        assert_eq!(body.lines().nth(4).map(str::trim_start), Some("void main() { gl_FragColor = texture2D(uTexture, vTextureCoord) * uStrength; }"));
    }

    #[test]
    fn undeclared_uniforms_read_zero_and_samplers_alias_frame() {
        let source = "uniform highp vec3 uTint, uGlow;\nuniform int uMode;\nuniform sampler2D uMask;\nvoid main() { gl_FragColor = vec4(uTint + uGlow, float(uMode)) * texture2D(uMask, vTextureCoord); }\n";
        let descriptor = EffectDescriptor::new("odd", "Odd", source);
        let prepared = prepare(&descriptor).expect("wrapped shader validates");

        assert!(prepared.fragment.contains("#define uTint vec3(0.0)"));
        assert!(prepared.fragment.contains("#define uGlow vec3(0.0)"));
        assert!(prepared.fragment.contains("#define uMode int(0)"));
        assert!(prepared
            .fragment
            .contains("#define uMask sampler2D(funhouse_texture, funhouse_sampler)"));

        let arrays = wrap_fragment("uniform float uWeights[3]; // per band\n", &UniformLayout::default());
        assert!(arrays.contains("#define uWeights float[3](float(0.0), float(0.0), float(0.0))"));
    }

    #[test]
    fn radial_builtins_read_the_center_from_the_block() {
        for id in ["fisheye", "bulge", "twist", "barrel", "pincushion"] {
            let descriptor = builtin_effects()
                .into_iter()
                .find(|effect| effect.id() == id)
                .expect("builtin exists");
            let prepared = prepare(&descriptor).expect("validates");
            assert!(prepared.fragment.contains("#define uCenter funhouse.extra.xy"));
            assert!(!prepared.fragment.contains("uniform vec2 uCenter"), "{id}");
            assert!(prepared.fragment.contains("vec2 center = uCenter;"), "{id}");
        }
    }

    #[test]
    fn parameters_without_declarations_are_still_bound() {
        let source = "void main() { gl_FragColor = vec4(uSpeed); }\n";
        let descriptor = EffectDescriptor::new("bare", "Bare", source).with_parameter("speed", 0.1);
        prepare(&descriptor).expect("parameter macro resolves");
    }

    #[test]
    fn syntax_errors_surface_as_fragment_compile_errors() {
        let descriptor = EffectDescriptor::new("broken", "Broken", "void main() { gl_FragColor = vec4(1.0) }");
        match prepare(&descriptor) {
            Err(ShaderError::Compile { stage, message }) => {
                assert_eq!(stage, ShaderStage::Fragment);
                assert!(!message.is_empty());
            }
            other => panic!("expected compile error, got {other:?}"),
        }
    }
}
