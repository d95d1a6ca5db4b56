use std::path::PathBuf;

use clap::{Parser, Subcommand};
use flat_fs::DISK_BLOCKS;

#[derive(Parser)]
#[command(version, about = "Make, fill and inspect flat-fs images")]
pub struct Cli {
    /// Directory holding the images
    #[arg(long, short, default_value = ".")]
    pub dir: PathBuf,

    /// Image file name
    #[arg(long, short = 'n', default_value = "fs.img")]
    pub store: String,

    /// Block count of newly made images
    #[arg(long, short, default_value_t = DISK_BLOCKS)]
    pub blocks: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Make an empty image
    Mkfs,
    /// Make an image holding every regular file of a host directory
    Pack {
        /// Host source directory
        source: PathBuf,
    },
    /// Copy a host file into the image, replacing any file of the same name
    Put {
        host: PathBuf,
        /// Name inside the image, defaults to the host file name
        name: Option<String>,
    },
    /// Write a file's content to stdout
    Cat { name: String },
    /// List files and their sizes
    Ls,
    /// Delete a file
    Rm { name: String },
    /// Shrink a file to the given length
    Truncate { name: String, len: usize },
    /// Show space usage
    Df,
}
