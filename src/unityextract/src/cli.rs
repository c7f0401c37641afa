//! CLI argument definitions for unityextract

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use unitypack::{KindSet, ResourceKind};

#[derive(Parser)]
#[command(name = "unityextract")]
#[command(about = "Extract resources from Unity asset bundles", long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to <config dir>/unityextract/config.toml)
    #[arg(long, global = true, env = "UNITYEXTRACT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract audio, textures, meshes and other resources
    #[command(visible_alias = "x")]
    Extract(ExtractArgs),

    /// List the container index (path_id, file_id, type, path)
    #[command(visible_alias = "ls")]
    List {
        /// Bundle or asset files, or directories to walk
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Treat inputs as bare serialized assets
        #[arg(long)]
        as_asset: bool,

        /// Print JSON instead of tab-separated lines
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
pub struct ExtractArgs {
    /// Bundle or asset files, or directories to walk
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    #[command(flatten)]
    pub kinds: KindFlags,

    /// Kind by class name or alias (e.g. AudioClip, images); repeatable
    #[arg(long = "kind", value_name = "KIND")]
    pub kind: Vec<ResourceKind>,

    /// Only extract objects whose name contains this (case-insensitive); repeatable
    #[arg(long)]
    pub filter: Vec<String>,

    /// Output directory
    #[arg(short, long)]
    pub outdir: Option<PathBuf>,

    /// Treat inputs as bare serialized assets
    #[arg(long)]
    pub as_asset: bool,

    /// Report what would be written without writing
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Decode objects on all cores before writing
    #[arg(long)]
    pub parallel: bool,

    /// Write legacy audio sample banks as-is instead of failing them
    #[arg(long)]
    pub raw_samples: bool,
}

/// Per-kind selection flags
#[derive(Args, Debug, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct KindFlags {
    /// Extract every supported kind
    #[arg(long)]
    pub all: bool,

    /// Extract AudioClip objects
    #[arg(long)]
    pub audio: bool,

    /// Extract Font objects
    #[arg(long)]
    pub fonts: bool,

    /// Extract Texture2D objects
    #[arg(long)]
    pub images: bool,

    /// Extract Mesh objects
    #[arg(long)]
    pub models: bool,

    /// Extract Shader objects
    #[arg(long)]
    pub shaders: bool,

    /// Extract TextAsset objects
    #[arg(long)]
    pub text: bool,

    /// Extract MovieTexture objects
    #[arg(long)]
    pub video: bool,
}

impl KindFlags {
    pub fn selected(&self) -> KindSet {
        if self.all {
            return KindSet::all();
        }
        [
            (self.audio, ResourceKind::AudioClip),
            (self.fonts, ResourceKind::Font),
            (self.images, ResourceKind::Texture2D),
            (self.models, ResourceKind::Mesh),
            (self.shaders, ResourceKind::Shader),
            (self.text, ResourceKind::TextAsset),
            (self.video, ResourceKind::MovieTexture),
        ]
        .into_iter()
        .filter_map(|(on, kind)| on.then_some(kind))
        .collect()
    }
}
