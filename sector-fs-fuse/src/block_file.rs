use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use block_dev::BlockDevice;
use sector_fs::SECTOR_SIZE;

/// Written at the front of every disk image, so that a random host file is
/// not mistaken for a disk.
pub const MAGIC: u32 = 0x456789ab;
const MAGIC_SIZE: u64 = 4;

/// A disk image backed by a host file.
#[derive(Debug)]
pub struct BlockFile {
    file: Mutex<File>,
    num_sectors: u32,
}

impl BlockFile {
    /// Creates (or truncates) an image of `num_sectors` zeroed sectors.
    pub fn create(path: impl AsRef<Path>, num_sectors: u32) -> io::Result<Self> {
        let mut fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        fd.write_all(&MAGIC.to_le_bytes())?;
        fd.set_len(MAGIC_SIZE + num_sectors as u64 * SECTOR_SIZE as u64)?;

        Ok(Self {
            file: Mutex::new(fd),
            num_sectors,
        })
    }

    /// Opens an existing image, checking its magic number.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let mut fd = OpenOptions::new().read(true).write(true).open(path)?;

        let mut magic = [0; MAGIC_SIZE as usize];
        fd.read_exact(&mut magic)?;
        if u32::from_le_bytes(magic) != MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "not a disk image: bad magic number",
            ));
        }

        let len = fd.metadata()?.len();
        let num_sectors = ((len - MAGIC_SIZE) / SECTOR_SIZE as u64) as u32;

        Ok(Self {
            file: Mutex::new(fd),
            num_sectors,
        })
    }

    #[inline]
    pub fn num_sectors(&self) -> u32 {
        self.num_sectors
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(MAGIC_SIZE + (block_id * SECTOR_SIZE) as u64))
            .expect("seeking error");
        file.read_exact(buf).expect("not a complete block!");
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(MAGIC_SIZE + (block_id * SECTOR_SIZE) as u64))
            .expect("seeking error");
        file.write_all(buf).expect("not a complete block!");
    }
}
