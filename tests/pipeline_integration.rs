//! Pipeline integration tests
//!
//! These tests run whole shader families through the generator, from the files on disk to the files it
//! writes.
//!
//! ```sh
//! cargo test --test pipeline_integration
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use variantgen::codec::lz4;
use variantgen::config::GeneratorConfig;
use variantgen::make::{Generator, ShaderFamily};
use variantgen::{expand, generate_all_variants, scan, FlagRules, ShaderSource, Stage, VariantKey};
use walkdir::WalkDir;

const VERT: &str = "#version 450
#ifdef GL_ES
precision mediump float;
#endif
in vec3 pos;
#ifdef _Skinning
in vec4 bone;
in vec4 weight;
#endif
#ifdef _Instancing
in vec3 off;
#endif
uniform mat4 WVP;
#ifdef _Skinning
uniform vec4 skinBones[128];
#endif
void main() {}
";

const FRAG: &str = "#version 450
uniform sampler2D albedo;
#ifndef _NoShadows
uniform sampler2D shadowMap;
#endif
void main() {}
";

const SHADOW_VERT: &str = "#version 450
in vec3 pos;
uniform mat4 LWVP;
void main() {}
";

const DESCRIPTOR: &str = r#"{
    "contexts": [
        {
            "id": "mesh",
            "vertex_shader": "mesh.vert.glsl",
            "fragment_shader": "mesh.frag.glsl",
            "depth_write": true,
            "compare_mode": "less",
            "links": [
                { "id": "WVP", "link": "_worldViewProjectionMatrix" },
                { "id": "skinBones", "link": "_skinBones", "ifdef": ["_Skinning"] },
                { "id": "shadowMap", "link": "_shadowMap" }
            ]
        },
        {
            "id": "shadowmap",
            "vertex_shader": "shadowmap.vert.glsl",
            "fragment_shader": "mesh.frag.glsl",
            "params": [{ "id": "depth_write", "value": "true" }],
            "links": [{ "id": "LWVP", "link": "_lightWorldViewProjectionMatrix" }]
        }
    ]
}"#;

/// A fresh directory under the system temp dir, unique per test and process.
fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("variantgen-{}-{}", name, std::process::id()));
    if dir.exists() {
        fs::remove_dir_all(&dir).unwrap();
    }
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_family(dir: &Path) -> PathBuf {
    fs::write(dir.join("mesh.vert.glsl"), VERT).unwrap();
    fs::write(dir.join("mesh.frag.glsl"), FRAG).unwrap();
    fs::write(dir.join("shadowmap.vert.glsl"), SHADOW_VERT).unwrap();
    let descriptor = dir.join("mesh.json");
    fs::write(&descriptor, DESCRIPTOR).unwrap();
    descriptor
}

fn relative_files(root: &Path) -> BTreeSet<String> {
    WalkDir::new(root)
        .into_iter()
        .map(|entry| entry.unwrap())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            entry
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect()
}

#[test]
fn two_variant_scenario() {
    let source = ShaderSource::new(
        Stage::Vertex,
        "bar.vert.glsl",
        "#version 450\n#ifdef _Bar\nin vec3 nor;\n#endif\nin vec3 pos;",
    );

    let flags = scan(vec![&source], &FlagRules::default()).unwrap();
    let keys = generate_all_variants(&flags);
    let suffixes: Vec<String> = keys.iter().map(VariantKey::suffix).collect();
    assert_eq!(suffixes, vec!["", "_Bar"]);

    let base = expand(&source, &keys[0]).unwrap();
    assert_eq!(base.text(), "#version 450\nin vec3 pos;\n");

    let bar = expand(&source, &keys[1]).unwrap();
    assert_eq!(bar.text(), "#version 450\n#define _Bar\nin vec3 nor;\nin vec3 pos;\n");
}

#[test]
fn writes_every_variant() {
    let dir = scratch_dir("writes");
    let descriptor = write_family(&dir);
    let out = dir.join("out");

    let mut config = GeneratorConfig::new();
    config.out_dir = out.clone();
    config.combined = true;
    let written = Generator::new(config).make(&descriptor).unwrap();

    let files = relative_files(&out);
    assert_eq!(files.len(), written.len());

    // _Instancing, _NoShadows, _Skinning: 8 variants, 3 shaders and 1 resource each, plus the combined file
    assert_eq!(files.len(), 8 * 4 + 1);
    for expected in &[
        "Shaders/mesh/mesh.vert.glsl",
        "Shaders/mesh/mesh.frag.glsl",
        "Shaders/mesh/shadowmap.vert.glsl",
        "Shaders/mesh/mesh_Instancing_NoShadows_Skinning.vert.glsl",
        "Shaders/mesh/shadowmap_NoShadows.vert.glsl",
        "ShaderResources/mesh/mesh.json",
        "ShaderResources/mesh/mesh_NoShadows_Skinning.json",
        "ShaderResources/mesh/mesh_resource.json",
    ] {
        assert!(files.contains(*expected), "missing {}", expected);
    }

    let skinning = fs::read_to_string(out.join("Shaders/mesh/mesh_Skinning.vert.glsl")).unwrap();
    assert!(skinning.starts_with("#version 450\n#define _Skinning\n#ifdef GL_ES\n"));
    assert!(skinning.contains("in vec4 bone;"));
    assert!(!skinning.contains("#ifdef _Skinning"));

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("ShaderResources/mesh/mesh_Instancing_Skinning.json")).unwrap())
            .unwrap();
    let resource = &json["shader_resources"][0];
    assert_eq!(resource["id"], "mesh_Instancing_Skinning");

    let layout: Vec<&str> = resource["vertex_structure"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert_eq!(layout, vec!["pos", "bone", "weight"]);

    let mesh = &resource["contexts"][0];
    assert_eq!(mesh["vertex_shader"], "mesh_Instancing_Skinning.vert");
    assert_eq!(mesh["depth_write"], true);
    let bones = mesh["constants"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["id"] == "skinBones")
        .unwrap();
    assert_eq!(bones["type"], "floats");
    assert_eq!(bones["size"], 128);
    assert_eq!(bones["link"], "_skinBones");

    let shadowmap = &resource["contexts"][1];
    assert_eq!(shadowmap["id"], "shadowmap");
    assert_eq!(shadowmap["vertex_structure"].as_array().unwrap().len(), 1);
    assert_eq!(shadowmap["depth_write"], true);

    let combined: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("ShaderResources/mesh/mesh_resource.json")).unwrap())
            .unwrap();
    assert_eq!(combined["shader_resources"].as_array().unwrap().len(), 8);
    assert_eq!(combined["shader_resources"][0]["id"], "mesh");
    assert_eq!(combined["shader_resources"][7]["id"], "mesh_Instancing_NoShadows_Skinning");

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn combined_file_matches_descriptor() {
    let dir = scratch_dir("combined");
    let descriptor = write_family(&dir);

    let combined = format!(
        "// same family as mesh.json\n@context mesh\n-set depth_write = true\n-set compare_mode = less\n\
         -link WVP = _worldViewProjectionMatrix\n-link shadowMap = _shadowMap\n-vert mesh.vert.glsl\n{}-frag mesh.frag.glsl\n{}",
        VERT, FRAG
    );

    let from_json = ShaderFamily::load(&descriptor).unwrap();
    let from_shader = ShaderFamily::from_shader_file("mesh", &combined).unwrap();

    let generator = Generator::new(GeneratorConfig::new());
    let json_output = generator.generate(&from_json).unwrap();
    let shader_output = generator.generate(&from_shader).unwrap();
    assert_eq!(json_output.flags, shader_output.flags);

    for (a, b) in json_output.variants.iter().zip(&shader_output.variants) {
        assert_eq!(a.key, b.key);

        let mesh_a = &a.resource.contexts[0];
        let mut mesh_b = b.resource.contexts[0].clone();
        // the combined file has no guarded skinning link
        mesh_b.constants = mesh_a.constants.clone();
        assert_eq!(mesh_a, &mesh_b);

        let vert_a = a.shaders.iter().find(|s| s.name() == "mesh" && s.stage() == Stage::Vertex).unwrap();
        let vert_b = b.shaders.iter().find(|s| s.name() == "mesh" && s.stage() == Stage::Vertex).unwrap();
        assert_eq!(vert_a, vert_b);
    }

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn packed_resources_round_trip_through_lz4() {
    let dir = scratch_dir("packed");
    let descriptor = write_family(&dir);
    let out = dir.join("out");

    let mut config = GeneratorConfig::new();
    config.out_dir = out.clone();
    config.pack = true;
    config.compress = true;
    Generator::new(config).make(&descriptor).unwrap();

    let resources = out.join("ShaderResources/mesh");
    let packed = fs::read(resources.join("mesh_Skinning.arm")).unwrap();
    let compressed = fs::read(resources.join("mesh_Skinning.arm.lz4")).unwrap();

    // a map with a single `shader_resources` key
    assert_eq!(packed[0], 0x81);
    assert_eq!(&packed[1..18], b"\xb0shader_resources");
    assert_eq!(lz4::decode(&compressed, packed.len()).unwrap(), packed);

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn compression_implies_packing() {
    let dir = scratch_dir("compress-only");
    let descriptor = write_family(&dir);
    let out = dir.join("out");

    let mut config = GeneratorConfig::new();
    config.out_dir = out.clone();
    config.compress = true;
    Generator::new(config).make(&descriptor).unwrap();

    let files = relative_files(&out.join("ShaderResources/mesh"));
    assert!(files.contains("mesh.arm"));
    assert!(files.contains("mesh.arm.lz4"));
    assert!(files.contains("mesh_Instancing_NoShadows_Skinning.arm.lz4"));

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn broken_shaders_fail_the_family() {
    let dir = scratch_dir("broken");
    fs::write(dir.join("broken.vert.glsl"), "#version 450\n#ifdef _A\nin vec3 pos;\n").unwrap();
    fs::write(
        dir.join("broken.json"),
        r#"{ "contexts": [{ "id": "broken", "vertex_shader": "broken.vert.glsl" }] }"#,
    )
    .unwrap();

    let mut config = GeneratorConfig::new();
    config.out_dir = dir.join("out");
    let result = Generator::new(config).make(&dir.join("broken.json"));
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("unbalanced conditional"));
    assert!(!dir.join("out").exists());

    fs::remove_dir_all(&dir).unwrap();
}
