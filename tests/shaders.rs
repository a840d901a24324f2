//! Every WGSL module the renderer builds pipelines from must parse and
//! validate, and expose the entry points its pipelines name.

use rstest::rstest;

use deferred_renderer::culling::CULLING_SHADER;
use deferred_renderer::renderer::{
    DEFERRED_LIGHTING_SHADER, HDR_TO_LDR_SHADER, LUMINANCE_COMMON, STATIC_MESH_SHADER,
    TERRAIN_SHADER, TONEMAP_DISTRIBUTION_SHADER, TONEMAP_HISTOGRAM_SHADER, TONEMAP_MIN_MAX_SHADER,
};

fn validate(source: &str) -> naga::Module {
    let module = match naga::front::wgsl::parse_str(source) {
        Ok(module) => module,
        Err(err) => panic!("{}", err.emit_to_string(source)),
    };
    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::PUSH_CONSTANT,
    );
    if let Err(err) = validator.validate(&module) {
        panic!("validation failed: {err:?}");
    }
    module
}

#[rstest]
#[case::culling(CULLING_SHADER.to_owned(), &["cs_main"])]
#[case::static_mesh(STATIC_MESH_SHADER.to_owned(), &["vs_main", "fs_gbuffer", "fs_forward"])]
#[case::terrain(TERRAIN_SHADER.to_owned(), &["vs_main", "fs_gbuffer", "fs_forward"])]
#[case::lighting(DEFERRED_LIGHTING_SHADER.to_owned(), &["vs_main", "fs_main"])]
#[case::tonemap_min_max([LUMINANCE_COMMON, TONEMAP_MIN_MAX_SHADER].concat(), &["cs_main"])]
#[case::tonemap_histogram([LUMINANCE_COMMON, TONEMAP_HISTOGRAM_SHADER].concat(), &["cs_main"])]
#[case::tonemap_distribution([LUMINANCE_COMMON, TONEMAP_DISTRIBUTION_SHADER].concat(), &["cs_main"])]
#[case::present([LUMINANCE_COMMON, HDR_TO_LDR_SHADER].concat(), &["vs_main", "fs_main"])]
fn shader_validates(#[case] source: String, #[case] entry_points: &[&str]) {
    let module = validate(&source);
    for name in entry_points {
        assert!(
            module.entry_points.iter().any(|ep| ep.name == *name),
            "missing entry point {name}"
        );
    }
}
