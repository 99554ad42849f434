//! 文件索引（文件头）
//!
//! 每个文件在磁盘上恰好占用一个扇区的文件头，记录文件的字节数与数据扇区表：
//! - 直接索引：文件头内的 [`DIRECT_COUNT`] 项扇区号；
//! - 一级间接索引：文件超过 `DIRECT_COUNT - 1` 个扇区后，直接索引的**最后一项**
//!   改为指向一个间接索引块，块内连续存放至多 [`INDIRECT_COUNT`] 个扇区号。
//!
//! 最后一项的两种含义在内存中用 `SectorTable` 区分，只在落盘时才合并回同一个槽位。

use alloc::vec::Vec;
use core::mem;

use log::{debug, warn};

use crate::{Bitmap, Error, Result, SECTOR_SIZE, SectorBuf, SynchDisk};

/// 文件头中直接索引表的项数，使整个文件头恰好放进一个扇区
pub const DIRECT_COUNT: usize = (SECTOR_SIZE - 2 * mem::size_of::<u32>()) / mem::size_of::<u32>();
/// 间接索引块的编号容量
pub const INDIRECT_COUNT: usize = SECTOR_SIZE / mem::size_of::<u32>();
/// 直接索引可编号的数据扇区数，最后一项留给间接索引块
const DIRECT_CAP: usize = DIRECT_COUNT - 1;
/// 单个文件最多拥有的数据扇区数
pub const MAX_FILE_SECTORS: usize = DIRECT_CAP + INDIRECT_COUNT;
/// 单个文件的最大字节数
pub const MAX_FILE_SIZE: usize = MAX_FILE_SECTORS * SECTOR_SIZE;

/// 尚未使用间接索引时，直接索引最后一项的取值
const NO_INDIRECT: u32 = u32::MAX;

/// 间接索引块
type IndirectBlock = [u32; INDIRECT_COUNT];

/// 文件头在磁盘上的布局
#[derive(Clone, Copy)]
#[repr(C)]
struct DiskFileIndex {
    byte_length: u32,
    sector_count: u32,
    direct: [u32; DIRECT_COUNT],
}

const _: () = assert!(mem::size_of::<DiskFileIndex>() <= SECTOR_SIZE);
const _: () = assert!(mem::size_of::<IndirectBlock>() <= SECTOR_SIZE);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileIndex {
    /// 文件字节数
    byte_length: u32,
    table: SectorTable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SectorTable {
    /// 至多 `DIRECT_CAP` 个数据扇区，全部直接索引
    Direct(Vec<u32>),
    /// 前 `DIRECT_CAP` 个数据扇区直接索引，其余 `indirect_len` 个在间接索引块中
    Indirect {
        direct: Vec<u32>,
        block: u32,
        indirect_len: usize,
    },
}

impl Default for SectorTable {
    fn default() -> Self {
        Self::Direct(Vec::new())
    }
}

impl FileIndex {
    /// 为新建文件分配 `file_size` 字节所需的数据扇区
    ///
    /// 失败时位图不做任何改动。
    pub fn allocate(bitmap: &mut Bitmap, disk: &SynchDisk, file_size: usize) -> Result<Self> {
        let mut index = Self::default();
        index.extend(bitmap, disk, file_size)?;
        index.set_length(file_size);

        Ok(index)
    }

    /// 把文件拥有的全部扇区归还位图：数据扇区与间接索引块
    pub fn deallocate(self, bitmap: &mut Bitmap, disk: &SynchDisk) {
        let mut release = |sector: u32| {
            assert!(
                bitmap.test(sector),
                "sector {sector} owned by a file is marked free"
            );
            bitmap.clear(sector);
        };

        match &self.table {
            SectorTable::Direct(sectors) => {
                for &sector in sectors {
                    release(sector);
                }
            }
            SectorTable::Indirect {
                direct,
                block,
                indirect_len,
            } => {
                let indirect = read_indirect(disk, *block);
                for &sector in direct.iter().chain(&indirect[..*indirect_len]) {
                    release(sector);
                }
                release(*block);
            }
        }

        debug!(
            "released {} sectors of a {} byte file",
            Self::count_total_sectors(self.sector_count()),
            self.byte_length
        );
    }

    /// 从磁盘读出文件头
    ///
    /// 扇区数、字节数以及所有扇区号（直接索引、间接索引块及块内的有效项）
    /// 都须落在磁盘范围内，否则返回 [`Error::CorruptIndex`]。
    /// 带间接索引的文件会多读一次间接索引块。
    pub fn fetch_from(disk: &SynchDisk, sector: u32) -> Result<Self> {
        let mut buf = SectorBuf::zeroed();
        disk.read_sector(sector, &mut buf);
        let record: DiskFileIndex = buf.get(0);

        let sector_count = record.sector_count as usize;
        let in_disk = |s: &u32| *s < disk.num_sectors();
        if sector_count > MAX_FILE_SECTORS
            || record.byte_length as usize > sector_count * SECTOR_SIZE
            || !record.direct[..sector_count.min(DIRECT_COUNT)]
                .iter()
                .all(in_disk)
        {
            return Err(Error::CorruptIndex(sector));
        }

        let table = if sector_count <= DIRECT_CAP {
            SectorTable::Direct(record.direct[..sector_count].to_vec())
        } else {
            let block = record.direct[DIRECT_CAP];
            let indirect_len = sector_count - DIRECT_CAP;
            disk.read_sector(block, &mut buf);
            if !buf.map(0, |indirect: &IndirectBlock| {
                indirect[..indirect_len].iter().all(in_disk)
            }) {
                return Err(Error::CorruptIndex(sector));
            }

            SectorTable::Indirect {
                direct: record.direct[..DIRECT_CAP].to_vec(),
                block,
                indirect_len,
            }
        };

        Ok(Self {
            byte_length: record.byte_length,
            table,
        })
    }

    /// 把文件头写回磁盘
    pub fn write_back(&self, disk: &SynchDisk, sector: u32) {
        let mut slots = [0; DIRECT_COUNT];
        match &self.table {
            SectorTable::Direct(sectors) => {
                slots[..sectors.len()].copy_from_slice(sectors);
                slots[DIRECT_CAP] = NO_INDIRECT;
            }
            SectorTable::Indirect { direct, block, .. } => {
                slots[..DIRECT_CAP].copy_from_slice(direct);
                slots[DIRECT_CAP] = *block;
            }
        }

        let mut buf = SectorBuf::zeroed();
        buf.set(
            0,
            &DiskFileIndex {
                byte_length: self.byte_length,
                sector_count: self.sector_count() as u32,
                direct: slots,
            },
        );
        disk.write_sector(sector, &buf);
    }

    /// 文件内的字节偏移 → 存放该字节的磁盘扇区
    ///
    /// 偏移必须落在已分配的扇区内。偏移位于间接索引部分时会读一次间接索引块。
    pub fn byte_to_sector(&self, offset: usize, disk: &SynchDisk) -> u32 {
        let index = offset / SECTOR_SIZE;
        assert!(
            index < self.sector_count(),
            "offset {offset} lies beyond the {} allocated sectors",
            self.sector_count()
        );

        match &self.table {
            SectorTable::Direct(sectors) => sectors[index],
            SectorTable::Indirect { direct, .. } if index < DIRECT_CAP => direct[index],
            SectorTable::Indirect { block, .. } => read_indirect(disk, *block)[index - DIRECT_CAP],
        }
    }

    #[inline]
    pub fn file_length(&self) -> usize {
        self.byte_length as usize
    }

    /// 只修改文件字节数，不分配扇区
    pub fn set_length(&mut self, length: usize) {
        debug_assert!(Self::count_sectors(length) <= self.sector_count());
        self.byte_length = length as u32;
    }

    /// 已分配的数据扇区数
    pub fn sector_count(&self) -> usize {
        match &self.table {
            SectorTable::Direct(sectors) => sectors.len(),
            SectorTable::Indirect { indirect_len, .. } => DIRECT_CAP + indirect_len,
        }
    }

    /// 间接索引块所在扇区
    pub fn indirect_sector(&self) -> Option<u32> {
        match self.table {
            SectorTable::Direct(_) => None,
            SectorTable::Indirect { block, .. } => Some(block),
        }
    }

    /// 按文件顺序列出全部数据扇区
    pub fn data_sectors(&self, disk: &SynchDisk) -> Vec<u32> {
        match &self.table {
            SectorTable::Direct(sectors) => sectors.clone(),
            SectorTable::Indirect {
                direct,
                block,
                indirect_len,
            } => {
                let indirect = read_indirect(disk, *block);
                direct
                    .iter()
                    .chain(&indirect[..*indirect_len])
                    .copied()
                    .collect()
            }
        }
    }

    /// 为文件追加 `append_bytes` 字节的扇区容量，不修改文件字节数
    ///
    /// 先校验索引容量与空闲扇区数，任何一项不满足都原样返回，不动位图和索引。
    pub fn extend(
        &mut self,
        bitmap: &mut Bitmap,
        disk: &SynchDisk,
        append_bytes: usize,
    ) -> Result<()> {
        let additional = Self::count_sectors(append_bytes);
        if additional == 0 {
            return Ok(());
        }

        let old_total = self.sector_count();
        let new_total = old_total + additional;
        if new_total > MAX_FILE_SECTORS {
            warn!("refusing to grow a file to {new_total} sectors");
            return Err(Error::FileTooLarge {
                sectors: new_total,
                max: MAX_FILE_SECTORS,
            });
        }

        // 越过直接索引容量时，间接索引块本身也要占一个扇区
        let needed = Self::count_total_sectors(new_total) - Self::count_total_sectors(old_total);
        let available = bitmap.num_clear();
        if available < needed {
            warn!("refusing to grow a file by {needed} sectors, {available} free");
            return Err(Error::NoSpace { needed, available });
        }

        debug!("extending file index from {old_total} to {new_total} sectors");

        let mut find = || bitmap.find().ok_or(Error::NoSpace { needed, available });
        match &mut self.table {
            SectorTable::Direct(sectors) if new_total <= DIRECT_CAP => {
                for _ in 0..additional {
                    sectors.push(find()?);
                }
            }
            SectorTable::Direct(sectors) => {
                // 这次扩容越过了直接索引容量，建立间接索引块
                while sectors.len() < DIRECT_CAP {
                    sectors.push(find()?);
                }
                let block = find()?;

                let indirect_len = new_total - DIRECT_CAP;
                let mut indirect: IndirectBlock = [0; INDIRECT_COUNT];
                for entry in &mut indirect[..indirect_len] {
                    *entry = find()?;
                }
                write_indirect(disk, block, &indirect);

                let direct = mem::take(sectors);
                self.table = SectorTable::Indirect {
                    direct,
                    block,
                    indirect_len,
                };
            }
            SectorTable::Indirect {
                block,
                indirect_len,
                ..
            } => {
                let new_len = new_total - DIRECT_CAP;
                let mut buf = SectorBuf::zeroed();
                disk.read_sector(*block, &mut buf);
                buf.map_mut(0, |indirect: &mut IndirectBlock| {
                    indirect[*indirect_len..new_len]
                        .iter_mut()
                        .try_for_each(|entry| find().map(|sector| *entry = sector))
                })?;
                disk.write_sector(*block, &buf);
                *indirect_len = new_len;
            }
        }

        Ok(())
    }

    /// 容纳指定字节数需要多少个**数据扇区**
    #[inline]
    pub fn count_sectors(size: usize) -> usize {
        size.div_ceil(SECTOR_SIZE)
    }

    /// 拥有指定数据扇区数的文件共占用多少扇区：数据扇区与间接索引块
    #[inline]
    pub fn count_total_sectors(data_sectors: usize) -> usize {
        data_sectors + usize::from(data_sectors > DIRECT_CAP)
    }
}

fn read_indirect(disk: &SynchDisk, block: u32) -> IndirectBlock {
    let mut buf = SectorBuf::zeroed();
    disk.read_sector(block, &mut buf);
    buf.get(0)
}

fn write_indirect(disk: &SynchDisk, block: u32, indirect: &IndirectBlock) {
    let mut buf = SectorBuf::zeroed();
    buf.set(0, indirect);
    disk.write_sector(block, &buf);
}
