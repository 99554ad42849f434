//! 测试用的内存盘

use std::sync::Mutex;
use std::vec;
use std::vec::Vec;

use block_dev::BlockDevice;

use crate::SECTOR_SIZE;

pub struct RamDisk(Mutex<Vec<u8>>);

impl RamDisk {
    pub fn new(sectors: usize) -> Self {
        Self(Mutex::new(vec![0; sectors * SECTOR_SIZE]))
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let data = self.0.lock().unwrap();
        let start = block_id * SECTOR_SIZE;
        buf.copy_from_slice(&data[start..start + SECTOR_SIZE]);
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let mut data = self.0.lock().unwrap();
        let start = block_id * SECTOR_SIZE;
        data[start..start + SECTOR_SIZE].copy_from_slice(buf);
    }
}

/// 在一块全新的内存盘上格式化文件系统
pub fn format(sectors: u32) -> crate::FileSystem {
    let device = std::sync::Arc::new(RamDisk::new(sectors as usize));
    let config = crate::FsConfig {
        num_sectors: sectors,
        ..Default::default()
    };
    crate::FileSystem::format(device, config).unwrap()
}
