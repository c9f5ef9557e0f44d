// extractors - JMXV client asset tools
// Consolidated entrypoint for:
// - BMS mesh inspection and rewrite (navmesh grid and normals regenerated)
// - .m terrain, .o/.o2 placement and .nvm navmesh inspection
// - object id resolution through object.ifo, CPD, RES and BMT
// - DDJ to DDS texture conversion

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

mod batch;
mod mesh_dump;
mod navmesh_dump;
mod placement_dump;
mod settings;
mod terrain_dump;
mod texture_convert;

use jmx_shared::log::{initialize_logging, map_log_level};
use settings::{DEFAULT_CONFIG_FILE, Settings};

#[derive(Parser, Debug)]
#[command(name = "extractors")]
#[command(about = "JMXV client asset tools")]
#[command(version)]
struct Cli {
    /// Console log level override (0=Error, 1=Warn, 2=Info, 3=Debug, 4=Trace)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<i32>,

    /// Configuration file (DataDir, MapDir, LogsDir, LogFile, LogLevel, TerrainTextureMask, Overwrite)
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode BMS meshes and log a summary
    Mesh(MeshArgs),
    /// Decode a BMS mesh and write it back out
    MeshRewrite(MeshRewriteArgs),
    /// Decode .m terrain files
    Terrain(TerrainArgs),
    /// Decode .o/.o2 object placement files
    Placements(PlacementArgs),
    /// Decode standalone region navmeshes (JMXVNVM 1000)
    Navmesh(NavmeshArgs),
    /// Strip DDJ headers to plain DDS
    Texture(TextureArgs),
}

#[derive(Args, Debug)]
struct MeshArgs {
    /// BMS files
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Print each decoded mesh as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct MeshRewriteArgs {
    input: PathBuf,

    output: PathBuf,

    /// Replace the output if it exists
    #[arg(long)]
    overwrite: bool,
}

#[derive(Args, Debug)]
struct TerrainArgs {
    /// .m files, laid out as Map/<row>/<column>.m
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Unpack texture ids with the 20-bit mask instead of 10-bit
    #[arg(long)]
    legacy_texture_mask: bool,

    /// Print each decoded file as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct PlacementArgs {
    /// .o or .o2 files
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Entries carry a trailing region id (.o2 layout) whatever the extension
    #[arg(long)]
    region_ids: bool,

    /// Resolve every object id through object.ifo and the resource chain
    #[arg(long)]
    resolve: bool,

    /// With --resolve, decode each reached mesh as well
    #[arg(long, requires = "resolve")]
    decode_meshes: bool,
}

#[derive(Args, Debug)]
struct NavmeshArgs {
    /// .nvm files
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Print each decoded file as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct TextureArgs {
    /// .ddj files
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Write the .dds files here instead of next to their input
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Replace existing .dds files
    #[arg(long)]
    overwrite: bool,
}

fn init_logging(log_level: Option<i32>, settings: &Settings) {
    let console_level = map_log_level(log_level.unwrap_or(settings.log_level));
    initialize_logging(settings.logs_dir.as_deref(), console_level, settings.log_file.as_deref());
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(&cli.config)?;
    init_logging(cli.log_level, &settings);
    match &settings.source {
        Some(file) => tracing::debug!("settings read from {}", file),
        None => tracing::debug!("{} not found, using defaults and environment", cli.config),
    }

    match cli.command {
        Command::Mesh(args) => mesh_dump::run_mesh(args, &settings),
        Command::MeshRewrite(args) => mesh_dump::run_mesh_rewrite(args, &settings),
        Command::Terrain(args) => terrain_dump::run_terrain(args, &settings),
        Command::Placements(args) => placement_dump::run_placements(args, &settings),
        Command::Navmesh(args) => navmesh_dump::run_navmesh(args, &settings),
        Command::Texture(args) => texture_convert::run_texture(args, &settings),
    }
}
