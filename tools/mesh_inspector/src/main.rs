//! Mesh Inspector
//!
//! Runs the host-side half of geometry loading on an OBJ file and reports
//! what the renderer would upload: unique vertices, index count, material
//! runs and the textures each material references. No GPU is touched.
//!
//! Usage: cargo run --bin mesh_inspector -- model.obj [--no-flip] [--check-textures]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use instanced_renderer::assets::{ImageData, LoadedObj, MaterialSource, ObjLoader};
use instanced_renderer::config::{Config, RendererConfig};
use instanced_renderer::foundation::logging;
use log::info;

fn main() -> Result<()> {
    logging::init();

    let matches = Command::new("mesh_inspector")
        .about("Reports vertex deduplication and submesh statistics for an OBJ file")
        .arg(
            Arg::new("input")
                .value_name("OBJ")
                .help("OBJ file to inspect")
                .required(true),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Renderer config (.toml or .ron) to take load options from"),
        )
        .arg(
            Arg::new("no-flip")
                .long("no-flip")
                .help("Keep texture V coordinates as stored in the file")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("check-textures")
                .long("check-textures")
                .help("Decode every referenced texture and report failures")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let config = match matches.get_one::<String>("config") {
        Some(path) => RendererConfig::load_from_file(path)
            .with_context(|| format!("Failed to read config {path}"))?,
        None => RendererConfig::default(),
    };
    let flip_v = config.flip_texcoord_v && !matches.get_flag("no-flip");

    let input = matches
        .get_one::<String>("input")
        .map(PathBuf::from)
        .context("No input file given")?;
    info!("Inspecting {} (flip V: {})", input.display(), flip_v);

    let loaded = ObjLoader::load_file(&input, flip_v)
        .with_context(|| format!("Failed to load {}", input.display()))?;

    print_geometry(&input, &loaded);
    print_materials(&loaded, matches.get_flag("check-textures"));
    Ok(())
}

fn print_geometry(input: &Path, loaded: &LoadedObj) {
    let mesh = &loaded.mesh;
    let corners = mesh.indices.len();
    let unique = mesh.vertices.len();
    let reuse = if unique == 0 { 0.0 } else { corners as f64 / unique as f64 };

    println!("Mesh: {}", input.display());
    println!("   Triangles:       {}", mesh.triangle_count());
    println!("   Face corners:    {corners}");
    println!("   Unique vertices: {unique} ({reuse:.2} corners per vertex)");
    println!(
        "   Vertex buffer:   {} bytes",
        unique * std::mem::size_of::<instanced_renderer::render::Vertex>()
    );
    println!("   Index buffer:    {} bytes", corners * std::mem::size_of::<u32>());
    println!("   Submeshes:       {}", mesh.submeshes.len());

    for (i, submesh) in mesh.submeshes.iter().enumerate() {
        let material = submesh
            .material_id
            .and_then(|id| loaded.materials.get(id))
            .map_or("<none>", |m| m.name.as_str());
        println!(
            "      [{i}] indices {}..{} material {material}",
            submesh.start_index,
            submesh.start_index + submesh.index_count
        );
    }
}

fn print_materials(loaded: &LoadedObj, check_textures: bool) {
    println!("Materials: {}", loaded.materials.len());
    for material in &loaded.materials {
        println!("   {}", material.name);
        println!(
            "      Kd {:?}  Ka {:?}  Ks {:?}",
            material.diffuse, material.ambient, material.specular
        );
        for (slot, path) in texture_slots(material) {
            println!("      {slot}: {}", describe_texture(path, check_textures));
        }
    }
}

fn texture_slots(material: &MaterialSource) -> Vec<(&'static str, Option<&Path>)> {
    vec![
        ("diffuse", material.diffuse_texture.as_deref()),
        ("specular", material.specular_texture.as_deref()),
        ("bump", material.bump_texture.as_deref()),
    ]
}

fn describe_texture(path: Option<&Path>, check: bool) -> String {
    let Some(path) = path else {
        return "-".to_string();
    };
    if !check {
        return path.display().to_string();
    }
    match ImageData::from_file(path) {
        Ok(image) => format!("{} ({}x{})", path.display(), image.width, image.height),
        Err(e) => format!("{} (unusable: {e})", path.display()),
    }
}
