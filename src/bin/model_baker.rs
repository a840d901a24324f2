//! Offline baker: rewrites a glTF asset so its meshes use the packed vertex
//! format, writing `<name>_baked.gltf` and `<name>_baked.bin` next to it.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;

use deferred_renderer::assets::load_document;
use deferred_renderer::bake::{bake_document, BakedPaths};

#[derive(Parser, Debug)]
#[command(name = "model_baker")]
#[command(about = "Bake a glTF/GLB asset into packed vertex buffers")]
struct Cli {
    /// Source .gltf or .glb file
    path: PathBuf,
}

fn bake(path: &Path) -> Result<BakedPaths, Box<dyn std::error::Error>> {
    log::info!("Loading {}...", path.display());
    let doc = load_document(path)?;
    let out_dir = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(bake_document(&doc, out_dir)?)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match bake(&cli.path) {
        Ok(paths) => {
            log::info!("Wrote {} and {}", paths.gltf.display(), paths.bin.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Failed to bake {}: {}", cli.path.display(), e);
            ExitCode::FAILURE
        }
    }
}
