
mod block_file;

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use sector_fs::{FileSystem, FsConfig, SECTOR_SIZE};

pub use self::block_file::{BlockFile, MAGIC};

/// Host files are copied in chunks of this many bytes, so that large files
/// grow through repeated writes.
pub const TRANSFER_SIZE: usize = 100;

pub fn io_error(err: sector_fs::Error) -> io::Error {
    io::Error::other(err)
}

/// Creates a fresh image at `path` and formats it.
pub fn format(path: impl AsRef<Path>, num_sectors: u32) -> io::Result<FileSystem> {
    let block_file = Arc::new(BlockFile::create(path, num_sectors)?);
    let config = FsConfig {
        num_sectors,
        ..Default::default()
    };
    FileSystem::format(block_file, config).map_err(io_error)
}

pub fn mount(path: impl AsRef<Path>) -> io::Result<FileSystem> {
    let block_file = Arc::new(BlockFile::open(path)?);
    let config = FsConfig {
        num_sectors: block_file.num_sectors(),
        ..Default::default()
    };
    FileSystem::mount(block_file, config).map_err(io_error)
}

/// Stores `data` as a new file and returns its header sector.
pub fn put(fs: &FileSystem, data: &[u8]) -> io::Result<u32> {
    let sector = fs.create(data.len()).map_err(io_error)?;
    let mut file = fs.open(sector).map_err(io_error)?;
    for chunk in data.chunks(TRANSFER_SIZE) {
        file.write(chunk).map_err(io_error)?;
    }

    Ok(sector)
}

/// Appends `data` to the file at `sector`, growing it as needed.
///
/// The header is written back even if a chunk fails, so that sectors taken
/// by the chunks that did fit stay owned by the file.
pub fn append(fs: &FileSystem, sector: u32, data: &[u8]) -> io::Result<usize> {
    let mut file = fs.open(sector).map_err(io_error)?;
    file.seek(file.len());
    let written = data
        .chunks(TRANSFER_SIZE)
        .try_for_each(|chunk| file.write(chunk).map(drop));
    file.write_back();
    written.map_err(io_error)?;

    Ok(file.len())
}

pub fn read_all(fs: &FileSystem, sector: u32) -> io::Result<Vec<u8>> {
    let file = fs.open(sector).map_err(io_error)?;
    let mut data = vec![0; file.len()];
    let len = file.read_at(&mut data, 0);
    data.truncate(len);

    Ok(data)
}

/// Prints a file header, its sectors and its contents.
pub fn dump_file(fs: &FileSystem, sector: u32, out: &mut impl Write) -> io::Result<()> {
    let file = fs.open(sector).map_err(io_error)?;
    let index = file.index();

    writeln!(
        out,
        "File header at sector {sector}.  File size: {}.  File blocks:",
        index.file_length()
    )?;
    let sectors = index.data_sectors(fs.disk());
    let list: Vec<String> = sectors.iter().map(u32::to_string).collect();
    writeln!(out, "{}", list.join(" "))?;
    if let Some(block) = index.indirect_sector() {
        writeln!(out, "Indirect block: {block}")?;
    }

    writeln!(out, "File contents:")?;
    let mut data = vec![0; file.len()];
    file.read_at(&mut data, 0);
    for chunk in data.chunks(SECTOR_SIZE) {
        let line: String = chunk
            .iter()
            .map(|&byte| match byte {
                b' '..=b'~' => (byte as char).to_string(),
                _ => format!("\\{byte:x}"),
            })
            .collect();
        writeln!(out, "{line}")?;
    }

    Ok(())
}

/// Prints the used sectors of the free-space bitmap.
pub fn dump_bitmap(fs: &FileSystem, out: &mut impl Write) -> io::Result<()> {
    let bitmap = fs.bitmap().map_err(io_error)?;
    let used: Vec<String> = bitmap.used_sectors().map(|s| s.to_string()).collect();

    writeln!(
        out,
        "Bitmap: {} of {} sectors free, set: {}",
        bitmap.num_clear(),
        bitmap.capacity(),
        used.join(", ")
    )
}
