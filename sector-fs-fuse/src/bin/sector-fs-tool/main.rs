mod cli;

use std::fs;
use std::io::{self, Write};

use clap::Parser;
use cli::{Cli, Command};
use sector_fs_fuse::io_error;

fn main() -> io::Result<()> {
    env_logger::init();
    let Cli { image, command } = Cli::parse();
    let mount = || sector_fs_fuse::mount(&image);
    let mut stdout = io::stdout().lock();

    match command {
        Command::Format { sectors } => {
            sector_fs_fuse::format(&image, sectors)?;
            log::info!("image={image:?} sectors={sectors}");
        }
        Command::Put { source } => {
            let data = fs::read(&source)?;
            let sector = sector_fs_fuse::put(&mount()?, &data)?;
            log::info!("source={source:?} bytes={}", data.len());
            writeln!(stdout, "{sector}")?;
        }
        Command::Append { sector, source } => {
            let data = fs::read(&source)?;
            let len = sector_fs_fuse::append(&mount()?, sector, &data)?;
            log::info!("source={source:?} sector={sector} length={len}");
        }
        Command::Cat { sector } => {
            stdout.write_all(&sector_fs_fuse::read_all(&mount()?, sector)?)?;
        }
        Command::Info { sector } => sector_fs_fuse::dump_file(&mount()?, sector, &mut stdout)?,
        Command::Rm { sector } => mount()?.remove(sector).map_err(io_error)?,
        Command::Bitmap => sector_fs_fuse::dump_bitmap(&mount()?, &mut stdout)?,
    }

    Ok(())
}
