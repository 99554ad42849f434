use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    /// Disk image
    #[arg(long, short, default_value = "disk.img")]
    pub image: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a fresh image and format it
    Format {
        /// Number of sectors on the disk
        #[arg(long, short = 'n', default_value_t = sector_fs::NUM_SECTORS)]
        sectors: u32,
    },

    /// Copy a host file into a new file and print its header sector
    Put { source: PathBuf },

    /// Append a host file onto an existing file
    Append { sector: u32, source: PathBuf },

    /// Write a file's contents to stdout
    Cat { sector: u32 },

    /// Print a file header and its contents
    Info { sector: u32 },

    /// Remove a file
    Rm { sector: u32 },

    /// Print the free-space bitmap
    Bitmap,
}
