//! Procedural terrain shader synthesis.
//!
//! The shader body is assembled as plain text from an explicit feature
//! struct. Identical inputs produce byte-identical output, so the result is
//! golden-text testable without a graphics context. The text is a build
//! artifact consumed by the render backend, not a stable API.

/// Feature flags the generated shader reflects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShaderFeatures {
    /// True iff the last surface rebuild produced a non-empty albedo array
    pub surfaces_enabled: bool,
    /// Procedural noise terrain beyond painted regions
    pub noise_enabled: bool,
}

/// Build the terrain shader source for the given feature set
pub fn generate_shader_code(features: &ShaderFeatures) -> String {
    let mut code = String::new();

    code.push_str("// Generated terrain shader. Do not edit by hand.\n");
    code.push_str("\n");

    // Uniforms
    code.push_str("struct TerrainParams {\n");
    code.push_str("    terrain_height: f32,\n");
    code.push_str("    region_size: f32,\n");
    code.push_str("    region_pixel_size: f32,\n");
    code.push_str("    region_map_size: f32,\n");
    if features.noise_enabled {
        code.push_str("    noise_scale: f32,\n");
        code.push_str("    noise_height: f32,\n");
        code.push_str("    noise_blend_near: f32,\n");
        code.push_str("    noise_blend_far: f32,\n");
    }
    code.push_str("    region_offsets: array<vec4<f32>, 256>,\n");
    if features.surfaces_enabled {
        code.push_str("    texture_uv_scale_array: array<vec4<f32>, 256>,\n");
        code.push_str("    texture_color_array: array<vec4<f32>, 256>,\n");
    }
    code.push_str("}\n");
    code.push_str("\n");

    code.push_str("@group(0) @binding(0) var<uniform> params: TerrainParams;\n");
    code.push_str("@group(0) @binding(1) var region_map: texture_2d<f32>;\n");
    code.push_str("@group(0) @binding(2) var height_maps: texture_2d_array<f32>;\n");
    code.push_str("@group(0) @binding(3) var control_maps: texture_2d_array<f32>;\n");
    code.push_str("@group(0) @binding(4) var map_sampler: sampler;\n");
    if features.noise_enabled {
        code.push_str("@group(0) @binding(5) var region_blend_map: texture_2d<f32>;\n");
    }
    if features.surfaces_enabled {
        code.push_str("@group(1) @binding(0) var texture_array_albedo: texture_2d_array<f32>;\n");
        code.push_str("@group(1) @binding(1) var texture_array_normal: texture_2d_array<f32>;\n");
        code.push_str("@group(1) @binding(2) var surface_sampler: sampler;\n");
    }
    code.push_str("\n");

    if features.noise_enabled {
        code.push_str("fn hash_v2(v: vec2<f32>) -> f32 {\n");
        code.push_str("    return fract(1e4 * sin(17.0 * v.x + v.y * 0.1) * (0.1 + abs(sin(v.y * 13.0 + v.x))));\n");
        code.push_str("}\n");
        code.push_str("\n");

        code.push_str("fn noise_2d(st: vec2<f32>) -> f32 {\n");
        code.push_str("    let i = floor(st);\n");
        code.push_str("    let f = fract(st);\n");
        code.push_str("    let a = hash_v2(i);\n");
        code.push_str("    let b = hash_v2(i + vec2<f32>(1.0, 0.0));\n");
        code.push_str("    let c = hash_v2(i + vec2<f32>(0.0, 1.0));\n");
        code.push_str("    let d = hash_v2(i + vec2<f32>(1.0, 1.0));\n");
        code.push_str("    let u = f * f * (3.0 - 2.0 * f);\n");
        code.push_str("    return mix(a, b, u.x) + (c - a) * u.y * (1.0 - u.x) + (d - b) * u.x * u.y;\n");
        code.push_str("}\n");
        code.push_str("\n");
    }

    // Functions
    code.push_str("fn unpack_normal(rgba: vec4<f32>) -> vec3<f32> {\n");
    code.push_str("    var n = rgba.xzy * 2.0 - vec3<f32>(1.0);\n");
    code.push_str("    n.z = n.z * -1.0;\n");
    code.push_str("    return n;\n");
    code.push_str("}\n");
    code.push_str("\n");

    code.push_str("fn pack_normal(n_in: vec3<f32>, a: f32) -> vec4<f32> {\n");
    code.push_str("    var n = n_in;\n");
    code.push_str("    n.z = n.z * -1.0;\n");
    code.push_str("    return vec4<f32>((n.xzy + vec3<f32>(1.0)) * 0.5, a);\n");
    code.push_str("}\n");
    code.push_str("\n");

    // World uv -> texel coordinate and layer within the region stack
    code.push_str("fn get_region(uv: vec2<f32>) -> vec3<i32> {\n");
    code.push_str("    let map_center = vec2<i32>(i32(params.region_map_size) / 2);\n");
    code.push_str("    let fetch = textureLoad(region_map, vec2<i32>(floor(uv)) + map_center, 0);\n");
    code.push_str("    let index = floor(fetch.r * 255.0) - 1.0;\n");
    code.push_str("    let offset = params.region_offsets[i32(index)].xy;\n");
    code.push_str("    return vec3<i32>(vec2<i32>((uv - offset) * params.region_size), i32(index));\n");
    code.push_str("}\n");
    code.push_str("\n");

    // World uv -> filtered uv and layer within the region stack
    code.push_str("fn get_regionf(uv: vec2<f32>) -> vec3<f32> {\n");
    code.push_str("    let map_center = vec2<i32>(i32(params.region_map_size) / 2);\n");
    code.push_str("    let fetch = textureLoad(region_map, vec2<i32>(floor(uv)) + map_center, 0);\n");
    code.push_str("    let index = floor(fetch.r * 255.0) - 1.0;\n");
    code.push_str("    let offset = params.region_offsets[i32(index)].xy;\n");
    code.push_str("    return vec3<f32>(uv - offset, index);\n");
    code.push_str("}\n");
    code.push_str("\n");

    code.push_str("fn get_height(uv: vec2<f32>, filtered: bool) -> f32 {\n");
    code.push_str("    var height = 0.0;\n");
    code.push_str("    if (!filtered) {\n");
    code.push_str("        let region = get_region(uv);\n");
    code.push_str("        height = textureLoad(height_maps, region.xy, region.z, 0).r;\n");
    code.push_str("    } else {\n");
    code.push_str("        let region = get_regionf(uv);\n");
    code.push_str("        height = textureSampleLevel(height_maps, map_sampler, region.xy, i32(region.z), 0.0).r;\n");
    code.push_str("    }\n");
    if features.noise_enabled {
        code.push_str("    let blend_uv = (uv / params.region_map_size) + vec2<f32>(0.5);\n");
        code.push_str("    let weight = textureSampleLevel(region_blend_map, map_sampler, blend_uv, 0.0).r;\n");
        code.push_str("    let fade = clamp(smoothstep(params.noise_blend_near, params.noise_blend_far, 1.0 - weight), 0.0, 1.0);\n");
        code.push_str("    height = mix(height, noise_2d(uv * params.noise_scale) * params.noise_height, fade);\n");
    }
    code.push_str("    return height * params.terrain_height;\n");
    code.push_str("}\n");
    code.push_str("\n");

    if features.surfaces_enabled {
        code.push_str("fn random_v2(xy: vec2<f32>) -> f32 {\n");
        code.push_str("    return fract(sin(dot(xy, vec2<f32>(12.9898, 78.233))) * 43758.5453);\n");
        code.push_str("}\n");
        code.push_str("\n");

        code.push_str("fn blend_weights(weight_in: f32, detail: f32) -> f32 {\n");
        code.push_str("    let weight = sqrt(weight_in * 0.5);\n");
        code.push_str("    return max(0.1 * weight, 10.0 * (weight + detail) + 1.0 - (detail + 10.0));\n");
        code.push_str("}\n");
        code.push_str("\n");

        code.push_str("fn depth_blend(a_value: vec4<f32>, a_bump: f32, b_value: vec4<f32>, b_bump: f32, t: f32) -> vec4<f32> {\n");
        code.push_str("    let ma = max(a_bump + (1.0 - t), b_bump + t) - 0.1;\n");
        code.push_str("    let ba = max(a_bump + (1.0 - t) - ma, 0.0);\n");
        code.push_str("    let bb = max(b_bump + t - ma, 0.0);\n");
        code.push_str("    return (a_value * ba + b_value * bb) / (ba + bb);\n");
        code.push_str("}\n");
        code.push_str("\n");

        code.push_str("fn rotate_v2(v: vec2<f32>, cosa: f32, sina: f32) -> vec2<f32> {\n");
        code.push_str("    return vec2<f32>(cosa * v.x - sina * v.y, sina * v.x + cosa * v.y);\n");
        code.push_str("}\n");
        code.push_str("\n");

        // Indexed splat: base layer, optional overlay layer, depth blended
        code.push_str("fn get_material(uv: vec2<f32>, index: vec4<f32>, uv_center: vec2<f32>, weight_in: f32, total_weight: ptr<function, f32>, out_normal: ptr<function, vec4<f32>>) -> vec4<f32> {\n");
        code.push_str("    let material = index.r * 255.0;\n");
        code.push_str("    let material_overlay = index.g * 255.0;\n");
        code.push_str("    let rand = random_v2(uv_center) * 3.14159265;\n");
        code.push_str("    let rot = vec2<f32>(sin(rand), cos(rand));\n");
        code.push_str("    let mat_uv = rotate_v2(uv, rot.x, rot.y) * params.texture_uv_scale_array[i32(material)].xy;\n");
        code.push_str("    var albedo = textureSample(texture_array_albedo, surface_sampler, mat_uv, i32(material));\n");
        code.push_str("    var normal = textureSample(texture_array_normal, surface_sampler, mat_uv, i32(material));\n");
        code.push_str("    if (index.b > 0.0) {\n");
        code.push_str("        let albedo2 = textureSample(texture_array_albedo, surface_sampler, mat_uv, i32(material_overlay));\n");
        code.push_str("        let normal2 = textureSample(texture_array_normal, surface_sampler, mat_uv, i32(material_overlay));\n");
        code.push_str("        albedo = depth_blend(albedo, albedo.a, albedo2, albedo2.a, index.b);\n");
        code.push_str("        normal = depth_blend(normal, albedo.a, normal2, albedo.a, index.b);\n");
        code.push_str("    }\n");
        code.push_str("    var n = unpack_normal(normal);\n");
        code.push_str("    let n_xz = rotate_v2(n.xz, rot.x, -rot.y);\n");
        code.push_str("    n = vec3<f32>(n_xz.x, n.y, n_xz.y);\n");
        code.push_str("    normal = pack_normal(n, normal.a);\n");
        code.push_str("    let tint = params.texture_color_array[i32(material)];\n");
        code.push_str("    let weight = blend_weights(weight_in, albedo.a);\n");
        code.push_str("    *out_normal = *out_normal + normal * weight;\n");
        code.push_str("    *total_weight = *total_weight + weight;\n");
        code.push_str("    return albedo * tint * weight;\n");
        code.push_str("}\n");
        code.push_str("\n");
    }

    // Vertex stage
    code.push_str("struct VertexOutput {\n");
    code.push_str("    @builtin(position) clip_position: vec4<f32>,\n");
    code.push_str("    @location(0) world_uv: vec2<f32>,\n");
    code.push_str("    @location(1) detail_uv: vec2<f32>,\n");
    code.push_str("}\n");
    code.push_str("\n");

    code.push_str("@vertex\n");
    code.push_str("fn vs_main(@location(0) position: vec3<f32>, @builtin(instance_index) instance: u32) -> VertexOutput {\n");
    code.push_str("    var out: VertexOutput;\n");
    code.push_str("    out.world_uv = (position.xz / vec2<f32>(params.region_size)) + vec2<f32>(0.5);\n");
    code.push_str("    out.detail_uv = position.xz * 0.5;\n");
    code.push_str("    let displaced = vec3<f32>(position.x, get_height(out.world_uv, false), position.z);\n");
    code.push_str("    out.clip_position = vec4<f32>(displaced, 1.0);\n");
    code.push_str("    return out;\n");
    code.push_str("}\n");
    code.push_str("\n");

    // Fragment stage
    code.push_str("@fragment\n");
    code.push_str("fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {\n");

    // Normal from four filtered height taps around the fragment
    code.push_str("    let left = get_height(in.world_uv + vec2<f32>(-params.region_pixel_size, 0.0), true);\n");
    code.push_str("    let right = get_height(in.world_uv + vec2<f32>(params.region_pixel_size, 0.0), true);\n");
    code.push_str("    let back = get_height(in.world_uv + vec2<f32>(0.0, -params.region_pixel_size), true);\n");
    code.push_str("    let fore = get_height(in.world_uv + vec2<f32>(0.0, params.region_pixel_size), true);\n");
    code.push_str("    let horizontal = vec3<f32>(2.0, right - left, 0.0);\n");
    code.push_str("    let vertical = vec3<f32>(0.0, back - fore, 2.0);\n");
    code.push_str("    var normal = normalize(cross(vertical, horizontal));\n");
    code.push_str("    normal.z = normal.z * -1.0;\n");
    code.push_str("\n");

    if features.surfaces_enabled {
        // Index-map sampling: four mirrored control taps, weight blended
        code.push_str("    let pos_texel = in.world_uv * params.region_size + 0.5;\n");
        code.push_str("    let pos_texel00 = floor(pos_texel);\n");
        code.push_str("    var mirror = vec4<f32>(fract(pos_texel00 * 0.5) * 2.0, 1.0, 1.0);\n");
        code.push_str("    mirror.z = 1.0 - mirror.x;\n");
        code.push_str("    mirror.w = 1.0 - mirror.y;\n");
        code.push_str("\n");
        code.push_str("    let index00_uv = get_region((pos_texel00 + mirror.xy) * params.region_pixel_size);\n");
        code.push_str("    let index01_uv = get_region((pos_texel00 + mirror.xw) * params.region_pixel_size);\n");
        code.push_str("    let index10_uv = get_region((pos_texel00 + mirror.zy) * params.region_pixel_size);\n");
        code.push_str("    let index11_uv = get_region((pos_texel00 + mirror.zw) * params.region_pixel_size);\n");
        code.push_str("\n");
        code.push_str("    let index00 = textureLoad(control_maps, index00_uv.xy, index00_uv.z, 0);\n");
        code.push_str("    let index01 = textureLoad(control_maps, index01_uv.xy, index01_uv.z, 0);\n");
        code.push_str("    let index10 = textureLoad(control_maps, index10_uv.xy, index10_uv.z, 0);\n");
        code.push_str("    let index11 = textureLoad(control_maps, index11_uv.xy, index11_uv.z, 0);\n");
        code.push_str("\n");
        code.push_str("    var weights1 = clamp(pos_texel - pos_texel00, vec2<f32>(0.0), vec2<f32>(1.0));\n");
        code.push_str("    weights1 = mix(weights1, vec2<f32>(1.0) - weights1, mirror.xy);\n");
        code.push_str("    let weights0 = vec2<f32>(1.0) - weights1;\n");
        code.push_str("\n");
        code.push_str("    var total_weight = 0.0;\n");
        code.push_str("    var in_normal = vec4<f32>(0.0);\n");
        code.push_str("    var color = vec3<f32>(0.0);\n");
        code.push_str("\n");
        code.push_str("    color = get_material(in.detail_uv, index00, vec2<f32>(index00_uv.xy), weights0.x * weights0.y, &total_weight, &in_normal).rgb;\n");
        code.push_str("    color = color + get_material(in.detail_uv, index01, vec2<f32>(index01_uv.xy), weights0.x * weights1.y, &total_weight, &in_normal).rgb;\n");
        code.push_str("    color = color + get_material(in.detail_uv, index10, vec2<f32>(index10_uv.xy), weights1.x * weights0.y, &total_weight, &in_normal).rgb;\n");
        code.push_str("    color = color + get_material(in.detail_uv, index11, vec2<f32>(index11_uv.xy), weights1.x * weights1.y, &total_weight, &in_normal).rgb;\n");
        code.push_str("\n");
        code.push_str("    let inv_weight = 1.0 / total_weight;\n");
        code.push_str("    in_normal = in_normal * inv_weight;\n");
        code.push_str("    color = color * inv_weight;\n");
        code.push_str("\n");
        code.push_str("    return vec4<f32>(color, 1.0);\n");
    } else {
        // No surfaces configured: checkerboard so the terrain is visible
        code.push_str("    let p = in.detail_uv * 4.0;\n");
        code.push_str("    let i = 2.0 * (abs(fract(p / 2.0) - 0.5) - abs(fract(p / 2.0 + 0.25) - 0.5));\n");
        code.push_str("    let checker = (0.5 - 0.5 * i.x * i.y) * 0.2 + 0.2;\n");
        code.push_str("    return vec4<f32>(vec3<f32>(checker), 1.0);\n");
    }
    code.push_str("}\n");

    code
}
