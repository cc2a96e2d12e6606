//! ovo - OVO scene tool
//!
//! Exports scene manifests (TOML + OBJ + images) to .ovo files, imports
//! .ovo files back and lists their chunks.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use ovo_common::formats::{ChunkReader, NodeHeader, OvoFileHeader, PayloadReader};
use ovo_convert::{
    FsTextureProvider, NodeId, NodeKind, OvoConfig, Scene, TextureAsset, export_to_file,
    import_file, manifest,
};

#[derive(Parser)]
#[command(name = "ovo")]
#[command(about = "OVO scene exporter/importer")]
#[command(version)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides applied on top of the config file.
#[derive(Args, Default)]
struct ConfigArgs {
    /// Config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Store textures as uncompressed RGBA8
    #[arg(long)]
    no_compress: bool,

    /// Compress textures as BC7 (BC5 for normal maps) instead of DXT1/DXT5
    #[arg(long)]
    bc7: bool,

    /// Do not flip textures vertically
    #[arg(long)]
    no_flip: bool,

    /// Write path-only texture references instead of pixels
    #[arg(long)]
    reference_textures: bool,

    /// Write mesh nodes as empty nodes
    #[arg(long)]
    no_meshes: bool,

    /// Write light nodes as empty nodes
    #[arg(long)]
    no_lights: bool,

    /// LOD levels to generate
    #[arg(long)]
    lod_levels: Option<u32>,

    /// Maximum collapse error per LOD level (mesh units, 0 = unlimited)
    #[arg(long)]
    lod_error: Option<f32>,

    /// Triangle budget for generated physics proxy hulls
    #[arg(long)]
    physics_proxy: Option<u32>,

    /// Fail on unsupported light/material kinds instead of skipping them
    #[arg(long)]
    strict: bool,
}

impl ConfigArgs {
    fn resolve(&self) -> Result<OvoConfig> {
        let mut config = match &self.config {
            Some(path) => OvoConfig::load(path)?,
            None => OvoConfig::default(),
        };
        config.compress_textures &= !self.no_compress;
        config.use_legacy_compression &= !self.bc7;
        config.flip_textures_vertically &= !self.no_flip;
        config.embed_textures &= !self.reference_textures;
        config.include_meshes &= !self.no_meshes;
        config.include_lights &= !self.no_lights;
        config.strict |= self.strict;
        if let Some(levels) = self.lod_levels {
            config.lod_levels = levels;
        }
        if let Some(error) = self.lod_error {
            config.lod_error_threshold = error;
        }
        if self.physics_proxy.is_some() {
            config.physics_proxy_triangles = self.physics_proxy;
        }
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid options: {e}"))?;
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Export a scene manifest to an .ovo file
    Export {
        /// Path to scene.toml manifest
        #[arg(default_value = "scene.toml")]
        manifest: PathBuf,

        /// Output .ovo file
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        options: ConfigArgs,
    },

    /// Import an .ovo file, print its hierarchy and extract textures
    Import {
        /// Input .ovo file
        input: PathBuf,

        /// Directory to write embedded textures to (PNG)
        #[arg(short, long)]
        textures: Option<PathBuf>,

        #[command(flatten)]
        options: ConfigArgs,
    },

    /// List the header and chunks of an .ovo file
    Inspect {
        /// Input .ovo file
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    match cli.command {
        Commands::Export {
            manifest,
            output,
            options,
        } => {
            let config = options.resolve()?;
            let output = output.unwrap_or_else(|| manifest.with_extension("ovo"));
            tracing::info!("Exporting {:?} -> {:?}", manifest, output);

            let scene = manifest::load_manifest(&manifest)?;
            let root = manifest.parent().unwrap_or(Path::new("."));
            let textures = FsTextureProvider::new(root);
            let exported = export_to_file(&output, &scene, &textures, &config)
                .with_context(|| format!("Failed to export {}", manifest.display()))?;
            tracing::info!(
                "Done! {} chunks, {} warnings",
                exported.stats.chunks,
                exported.report.len()
            );
        }

        Commands::Import {
            input,
            textures,
            options,
        } => {
            let config = options.resolve()?;
            if let Some(dir) = &textures {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }

            let mut failures = Vec::new();
            let mut sink = |tex: &TextureAsset| {
                if let Some(dir) = &textures {
                    if let Err(e) = save_texture(dir, tex) {
                        failures.push(e);
                    }
                }
            };
            let imported = import_file(&input, &mut sink, &config)
                .with_context(|| format!("Failed to import {}", input.display()))?;
            if let Some(e) = failures.into_iter().next() {
                return Err(e);
            }

            print_hierarchy(&imported.scene);
            tracing::info!("Done! {} warnings", imported.report.len());
        }

        Commands::Inspect { input } => inspect(&input)?,
    }

    Ok(())
}

fn save_texture(dir: &Path, tex: &TextureAsset) -> Result<()> {
    if !tex.is_embedded() {
        tracing::info!("Texture #{} '{}' is a reference", tex.index, tex.source_path);
        return Ok(());
    }
    let stem = Path::new(&tex.source_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("texture");
    let path = dir.join(format!("{:03}_{stem}.png", tex.index));
    image::save_buffer(
        &path,
        &tex.pixels,
        tex.width,
        tex.height,
        image::ExtendedColorType::Rgba8,
    )
    .with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!("Wrote {}", path.display());
    Ok(())
}

fn print_hierarchy(scene: &Scene) {
    fn walk(scene: &Scene, id: NodeId, depth: usize) {
        let Some(node) = scene.node(id) else {
            return;
        };
        let detail = match node.kind {
            NodeKind::Mesh => scene.meshes.get(&id).map(|m| {
                format!(
                    " ({} tris, {} LODs, material {})",
                    m.geometry.triangle_count(),
                    m.lods.len(),
                    m.material.as_deref().unwrap_or("-")
                )
            }),
            NodeKind::Light => scene.lights.get(&id).map(|l| format!(" ({:?})", l.light_type)),
            _ => None,
        };
        println!(
            "{}{} [{:?}]{}",
            "  ".repeat(depth),
            node.name,
            node.kind,
            detail.unwrap_or_default()
        );
        for &child in &node.children {
            walk(scene, child, depth + 1);
        }
    }

    for root in scene.roots() {
        walk(scene, root.id, 0);
    }
    for material in &scene.materials {
        println!("material {} ({} slots)", material.name, material.slots.len());
    }
}

fn inspect(input: &Path) -> Result<()> {
    let bytes = std::fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let header = OvoFileHeader::parse(&bytes)?;
    println!(
        "OVO v{}: {} chunks, {} nodes, {} materials, {} textures",
        header.version,
        header.chunk_count,
        header.node_count,
        header.material_count,
        header.texture_count
    );

    let body = &bytes[OvoFileHeader::SIZE..];
    for chunk in ChunkReader::new(body, OvoFileHeader::SIZE as u64) {
        let chunk = chunk?;
        let name = if chunk.kind.is_node() {
            let mut r = PayloadReader::new(&chunk.payload, chunk.payload_offset());
            NodeHeader::read(&mut r)
                .map(|n| format!(" '{}'", n.name))
                .unwrap_or_default()
        } else {
            String::new()
        };
        println!(
            "{:>10}  {:<12} flags={:#06x} len={}{}",
            chunk.offset,
            chunk.kind.to_string(),
            chunk.flags,
            chunk.payload.len(),
            name
        );
    }
    Ok(())
}
