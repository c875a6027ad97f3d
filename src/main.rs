//! `variantgen`, writes every flag variant of GLSL shader families along with their resource descriptors.
//!
//! ```sh
//! variantgen mesh.json                 # JSON context descriptor
//! variantgen blender.shader --combined # combined shader file
//! RUST_LOG=debug variantgen -o build --pack --compress deferred.json
//! ```

use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use variantgen::config::{GeneratorConfig, DEFAULT_CONFIG_PATH};
use variantgen::make::Generator;
use variantgen::variants::ExpandMode;

/// Shader variant and resource generator
#[derive(Parser)]
#[command(name = "variantgen", version, about = "Generates GLSL shader variants and their resource descriptors")]
struct Cli {
    /// JSON context descriptors or combined `.shader` files.
    #[arg(required = true, value_name = "INPUT")]
    inputs: Vec<PathBuf>,

    /// Output directory (default: `dir` from the config file, else `compiled`).
    #[arg(short, long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Configuration file (default: variantgen.ini, if present).
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Keep conditional blocks in the generated shaders, only inject defines.
    #[arg(long)]
    preserve: bool,

    /// Do not inject `#define` lines.
    #[arg(long)]
    no_defines: bool,

    /// Also write one resource file holding every variant.
    #[arg(long)]
    combined: bool,

    /// Also write armpack resources.
    #[arg(long)]
    pack: bool,

    /// LZ4 compress armpack resources, implies `--pack`.
    #[arg(long)]
    compress: bool,
}

fn load_config(cli: &Cli) -> Result<GeneratorConfig, String> {
    let config = match &cli.config {
        Some(path) => {
            let mut config = GeneratorConfig::with_path(path);
            config.load_from_file()?;
            config
        }
        None => {
            let mut config = GeneratorConfig::new();
            if config.config_path.exists() {
                config.load_from_file()?;
            } else {
                info!("No {} found, using defaults", DEFAULT_CONFIG_PATH);
            }
            config
        }
    };

    Ok(apply_flags(cli, config))
}

/// Command line flags win over the configuration file.
fn apply_flags(cli: &Cli, mut config: GeneratorConfig) -> GeneratorConfig {
    if let Some(out) = &cli.out {
        config.out_dir = out.clone();
    }
    if cli.preserve {
        config.mode = ExpandMode::Preserve;
    }
    if cli.no_defines {
        config.inject_defines = false;
    }
    config.combined |= cli.combined;
    config.pack |= cli.pack;
    config.compress |= cli.compress;
    config
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let generator = Generator::new(config);
    let mut failed = 0;

    for input in &cli.inputs {
        if let Err(e) = generator.make(input) {
            error!("{}: {}", input.display(), e);
            failed += 1;
        }
    }

    if failed > 0 {
        error!("{} of {} inputs failed", failed, cli.inputs.len());
        std::process::exit(1);
    }
}
