use std::path::PathBuf;

use clap::Parser;
use meshview::{ModelAsset, ViewerConfig, resources::draco::DecoderConfig};

/// Interactive viewer for glTF, GLB and OBJ models.
///
/// Drag with the left mouse button to orbit, scroll to zoom, press V to
/// toggle the model and F to frame it. Files can also be dropped onto the window.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Model to open on start (.gltf, .glb or .obj)
    model: Option<PathBuf>,

    /// Vertical field of view in degrees
    #[arg(long, default_value_t = 75.0)]
    fov: f32,

    /// Margin around the model when framing it, as a factor on the tight fit
    #[arg(long, default_value_t = meshview::fit::DEFAULT_PADDING)]
    padding: f32,

    /// URL or directory the Draco decoder module is loaded from
    #[arg(long)]
    draco_decoder: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ViewerConfig {
        fovy: cgmath::Deg(cli.fov),
        padding: cli.padding,
        ..Default::default()
    };
    if let Some(location) = &cli.draco_decoder {
        config.decoder = DecoderConfig::new(location);
    }

    let initial = cli
        .model
        .as_deref()
        .map(ModelAsset::from_file)
        .transpose()?;

    meshview::run(config, initial)
}
