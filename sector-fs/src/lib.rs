#![cfg_attr(not(test), no_std)]

extern crate alloc;

/* sector-fs 的整体架构，自上而下 */

// 打开文件层：游标、按字节读写、按需扩容
mod file;

// 空闲空间管理：位图文件的加载、分配事务与写回
mod free_map;

// 文件系统引导：格式化、挂载、按扇区创建/打开/删除文件
mod fs;

// 磁盘数据结构层：文件索引与位图
mod layout;

// 同步磁盘层：对块设备的串行化访问与统计
mod disk;

// 扇区缓冲区
mod sector;

mod error;

#[cfg(test)]
mod test_util;

pub use self::{
    disk::{DiskStats, SynchDisk},
    error::{Error, Result},
    file::FileHandle,
    free_map::{FreeMap, FreeMapTxn},
    fs::{FileSystem, FsConfig},
    layout::{Bitmap, DIRECT_COUNT, FileIndex, INDIRECT_COUNT, MAX_FILE_SECTORS, MAX_FILE_SIZE},
    sector::SectorBuf,
};

/// 扇区字节数
pub const SECTOR_SIZE: usize = 128;
/// 每条磁道的扇区数
pub const SECTORS_PER_TRACK: u32 = 32;
/// 磁道数
pub const NUM_TRACKS: u32 = 32;
/// 默认磁盘扇区总数
pub const NUM_SECTORS: u32 = SECTORS_PER_TRACK * NUM_TRACKS;
/// 空闲位图文件头所在扇区
pub const FREE_MAP_SECTOR: u32 = 0;
