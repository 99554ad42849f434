//! # 打开文件层
//!
//! [`FileHandle`] 是一个打开的文件：文件头常驻内存，外加一个读写游标。
//!
//! 磁盘只能整扇区读写，而请求不一定落在扇区边界上：
//! - 读：读入涉及的所有整扇区，只拷出需要的部分；
//! - 写：先读入将被部分改写的首尾扇区，拷入新数据，再写回涉及的所有扇区。
//!
//! 写越过文件尾时文件自动增长，所需扇区向空闲位图借用。
//! 文件头的改动不会自动落盘，需由持有者调用 [`FileHandle::write_back`]。

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use log::debug;

use crate::{
    Error, FileIndex, FreeMap, MAX_FILE_SECTORS, MAX_FILE_SIZE, Result, SECTOR_SIZE, SectorBuf,
    SynchDisk,
};

#[derive(Debug)]
pub struct FileHandle {
    index: FileIndex,
    /// 文件头所在扇区
    origin: u32,
    /// 下一次 `read`/`write` 的起始字节
    cursor: usize,
    disk: Arc<SynchDisk>,
    /// 扩容能力；位图文件自身没有，避免扩容时再去打开自己
    free_map: Option<Arc<FreeMap>>,
}

impl FileHandle {
    /// 打开文件头位于 `sector` 的文件
    pub fn open(disk: Arc<SynchDisk>, free_map: Option<Arc<FreeMap>>, sector: u32) -> Result<Self> {
        let index = FileIndex::fetch_from(&disk, sector)?;

        Ok(Self {
            index,
            origin: sector,
            cursor: 0,
            disk,
            free_map,
        })
    }

    /// 移动游标，不检查文件长度：越过文件尾的写会使文件增长
    #[inline]
    pub fn seek(&mut self, position: usize) {
        self.cursor = position;
    }

    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let read_size = self.read_at(buf, self.cursor);
        self.cursor += read_size;
        read_size
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let written_size = self.write_at(buf, self.cursor)?;
        self.cursor += written_size;
        Ok(written_size)
    }

    /// 从 `position` 开始读出数据填充 `buf`，返回实际读出的字节数
    ///
    /// 越过文件尾的部分被截去。
    pub fn read_at(&self, buf: &mut [u8], position: usize) -> usize {
        let file_length = self.index.file_length();
        if buf.is_empty() || position >= file_length {
            return 0;
        }

        let num_bytes = buf.len().min(file_length - position);
        debug!("reading {num_bytes} bytes at {position}, from file of length {file_length}");

        let first_sector = position / SECTOR_SIZE;
        let last_sector = (position + num_bytes - 1) / SECTOR_SIZE;

        // 读入涉及的全部整扇区
        let mut staging = Vec::with_capacity((last_sector - first_sector + 1) * SECTOR_SIZE);
        let mut sector_buf = SectorBuf::zeroed();
        for block_index in first_sector..=last_sector {
            let sector = self.index.byte_to_sector(block_index * SECTOR_SIZE, &self.disk);
            self.disk.read_sector(sector, &mut sector_buf);
            staging.extend_from_slice(sector_buf.as_bytes());
        }

        let start = position - first_sector * SECTOR_SIZE;
        buf[..num_bytes].copy_from_slice(&staging[start..start + num_bytes]);

        num_bytes
    }

    /// 把 `buf` 写到 `position` 处，返回写入的字节数
    ///
    /// 写的末尾越过文件尾时文件先增长；扇区不足则向位图申请。
    /// 申请失败时返回错误，文件长度与扇区表保持原样。
    /// `position` 越过原文件尾留下的空洞以 0 填充。
    /// 写的末尾超出单个文件的最大字节数时返回 [`Error::FileTooLarge`]。
    pub fn write_at(&mut self, buf: &[u8], position: usize) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let end = match position.checked_add(buf.len()) {
            Some(end) if end <= MAX_FILE_SIZE => end,
            _ => {
                return Err(Error::FileTooLarge {
                    sectors: FileIndex::count_sectors(position.saturating_add(buf.len())),
                    max: MAX_FILE_SECTORS,
                });
            }
        };

        let old_length = self.index.file_length();
        if end > old_length {
            let covered = self.index.sector_count() * SECTOR_SIZE;
            if end > covered {
                self.allocate_space(end - covered)?;
            }
            self.index.set_length(end);

            if position > old_length {
                self.write_sectors(&vec![0; position - old_length], old_length);
            }
        }

        debug!(
            "writing {} bytes at {position}, to file of length {}",
            buf.len(),
            self.index.file_length()
        );
        self.write_sectors(buf, position);

        Ok(buf.len())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.index.file_length()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 把内存中的文件头写回其所在扇区
    pub fn write_back(&self) {
        self.index.write_back(&self.disk, self.origin);
    }

    #[inline]
    pub fn origin(&self) -> u32 {
        self.origin
    }

    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn index(&self) -> &FileIndex {
        &self.index
    }
}

impl FileHandle {
    /// 为文件追加至少 `size` 字节的扇区容量
    ///
    /// 打开位图文件、扩展索引、写回位图；整个过程持有空闲位图的锁。
    fn allocate_space(&mut self, size: usize) -> Result<()> {
        let Some(free_map) = self.free_map.clone() else {
            return Err(Error::FixedSize(self.origin));
        };

        let mut txn = free_map.begin()?;
        self.index.extend(txn.bitmap(), &self.disk, size)?;
        txn.commit()
    }

    /// 把 `buf` 写入 `position` 起的扇区，涉及的扇区必须已分配
    fn write_sectors(&self, buf: &[u8], position: usize) {
        let end = position + buf.len();
        let first_sector = position / SECTOR_SIZE;
        let last_sector = (end - 1) / SECTOR_SIZE;

        let first_aligned = position == first_sector * SECTOR_SIZE;
        let last_aligned = end == (last_sector + 1) * SECTOR_SIZE;

        let mut staging: Vec<(u32, SectorBuf)> = (first_sector..=last_sector)
            .map(|block_index| {
                let sector = self.index.byte_to_sector(block_index * SECTOR_SIZE, &self.disk);
                (sector, SectorBuf::zeroed())
            })
            .collect();

        // 读入将被部分改写的首尾扇区
        if !first_aligned {
            let (sector, data) = &mut staging[0];
            self.disk.read_sector(*sector, data);
        }
        if !last_aligned && (first_sector != last_sector || first_aligned) {
            let last = staging.len() - 1;
            let (sector, data) = &mut staging[last];
            self.disk.read_sector(*sector, data);
        }

        // 拷入要修改的字节
        let mut start = position;
        let mut written_size = 0;
        for (_, data) in &mut staging {
            let offset = start % SECTOR_SIZE;
            let block_write_size = (SECTOR_SIZE - offset).min(buf.len() - written_size);
            data.as_bytes_mut()[offset..offset + block_write_size]
                .copy_from_slice(&buf[written_size..written_size + block_write_size]);

            written_size += block_write_size;
            start += block_write_size;
        }

        for (sector, data) in &staging {
            self.disk.write_sector(*sector, data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DIRECT_COUNT;
    use crate::test_util::format;

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
    }

    #[test]
    fn grows_zero_length_file_on_write() {
        let fs = format(1024);
        let sector = fs.create(0).unwrap();
        let mut file = fs.open(sector).unwrap();
        let free = fs.free_sectors().unwrap();

        let data = pattern(200, 1);
        file.seek(0);
        assert_eq!(file.write(&data).unwrap(), 200);
        assert_eq!(file.len(), 200);
        assert_eq!(file.cursor(), 200);
        assert_eq!(file.index().sector_count(), 2);
        assert_eq!(fs.free_sectors().unwrap(), free - 2);

        let mut back = vec![0; 200];
        file.seek(0);
        assert_eq!(file.read(&mut back), 200);
        assert_eq!(back, data);
    }

    #[test]
    fn growth_is_lost_without_write_back() {
        let fs = format(1024);
        let sector = fs.create(0).unwrap();

        let mut file = fs.open(sector).unwrap();
        file.write(&pattern(50, 2)).unwrap();
        drop(file);
        assert_eq!(fs.open(sector).unwrap().len(), 0);

        let mut file = fs.open(sector).unwrap();
        file.write(&pattern(50, 2)).unwrap();
        file.write_back();
        drop(file);
        assert_eq!(fs.open(sector).unwrap().len(), 50);
    }

    #[test]
    fn round_trips_across_sector_shapes() {
        let fs = format(1024);
        let sector = fs.create(MAX_FILE_SIZE).unwrap();
        let mut file = fs.open(sector).unwrap();

        let boundary = (DIRECT_COUNT - 1) * SECTOR_SIZE;
        let cases = [
            // 单个扇区内部
            (10, 50),
            // 恰好两个对齐的扇区
            (SECTOR_SIZE, 2 * SECTOR_SIZE),
            // 首尾都不对齐的两个扇区
            (100, 100),
            // 跨越直接/间接索引边界
            (boundary - 20, 60),
        ];

        for (seed, &(position, len)) in cases.iter().enumerate() {
            let data = pattern(len, seed as u8);
            assert_eq!(file.write_at(&data, position).unwrap(), len);

            let mut back = vec![0; len];
            assert_eq!(file.read_at(&mut back, position), len);
            assert_eq!(back, data, "position={position} len={len}");
        }
    }

    #[test]
    fn partial_write_preserves_neighbours() {
        let fs = format(1024);
        let sector = fs.create(3 * SECTOR_SIZE).unwrap();
        let mut file = fs.open(sector).unwrap();

        let data = pattern(3 * SECTOR_SIZE, 7);
        file.write_at(&data, 0).unwrap();
        file.write_at(&[0xee], SECTOR_SIZE + 40).unwrap();

        let mut back = vec![0; 3 * SECTOR_SIZE];
        file.read_at(&mut back, 0);
        let mut expected = data;
        expected[SECTOR_SIZE + 40] = 0xee;
        assert_eq!(back, expected);
    }

    #[test]
    fn aligned_write_skips_read_back() {
        let fs = format(1024);
        let sector = fs.create(4 * SECTOR_SIZE).unwrap();
        let mut file = fs.open(sector).unwrap();

        let stats = fs.disk().stats();
        let (reads, writes) = (stats.reads(), stats.writes());
        file.write_at(&pattern(2 * SECTOR_SIZE, 3), SECTOR_SIZE).unwrap();
        assert_eq!(stats.reads(), reads);
        assert_eq!(stats.writes(), writes + 2);

        // 首尾各读一次
        file.write_at(&pattern(SECTOR_SIZE, 4), SECTOR_SIZE / 2).unwrap();
        assert_eq!(stats.reads(), reads + 2);
    }

    #[test]
    fn read_past_end_does_no_io() {
        let fs = format(1024);
        let sector = fs.create(100).unwrap();
        let file = fs.open(sector).unwrap();

        let reads = fs.disk().stats().reads();
        let mut buf = [0; 16];
        assert_eq!(file.read_at(&mut buf, 100), 0);
        assert_eq!(file.read_at(&mut buf, 5000), 0);
        assert_eq!(file.read_at(&mut [0u8; 0], 0), 0);
        assert_eq!(fs.disk().stats().reads(), reads);
    }

    #[test]
    fn empty_write_is_a_no_op() {
        let fs = format(1024);
        let sector = fs.create(0).unwrap();
        let mut file = fs.open(sector).unwrap();

        let (reads, writes) = (fs.disk().stats().reads(), fs.disk().stats().writes());
        assert_eq!(file.write_at(&[0u8; 0], 300).unwrap(), 0);
        assert_eq!(file.len(), 0);
        assert_eq!(fs.disk().stats().reads(), reads);
        assert_eq!(fs.disk().stats().writes(), writes);
    }

    #[test]
    fn read_is_truncated_at_end_of_file() {
        let fs = format(1024);
        let sector = fs.create(0).unwrap();
        let mut file = fs.open(sector).unwrap();
        let data = pattern(150, 9);
        file.write(&data).unwrap();

        file.seek(100);
        let mut back = vec![0; 100];
        assert_eq!(file.read(&mut back), 50);
        assert_eq!(file.cursor(), 150);
        assert_eq!(&back[..50], &data[100..]);
        assert_eq!(file.read(&mut back), 0);
    }

    #[test]
    fn explicit_position_past_end_grows_and_zero_fills() {
        let fs = format(1024);
        let sector = fs.create(0).unwrap();
        let mut file = fs.open(sector).unwrap();
        file.write_at(&[0xff; 10], 0).unwrap();

        // 游标仍在 0，由写的末尾决定是否增长
        assert_eq!(file.cursor(), 0);
        file.write_at(&[0xaa; 20], 300).unwrap();
        assert_eq!(file.len(), 320);
        assert_eq!(file.index().sector_count(), 3);

        let mut back = vec![0xcc; 320];
        assert_eq!(file.read_at(&mut back, 0), 320);
        assert_eq!(&back[..10], &[0xff; 10]);
        assert!(back[10..300].iter().all(|&b| b == 0));
        assert_eq!(&back[300..], &[0xaa; 20]);
    }

    #[test]
    fn overwrite_inside_file_does_not_grow() {
        let fs = format(1024);
        let sector = fs.create(500).unwrap();
        let mut file = fs.open(sector).unwrap();
        let free = fs.free_sectors().unwrap();

        file.write_at(&pattern(100, 5), 200).unwrap();
        assert_eq!(file.len(), 500);
        assert_eq!(fs.free_sectors().unwrap(), free);
    }

    #[test]
    fn growth_into_indirect_tier() {
        let fs = format(1024);
        let sector = fs.create((DIRECT_COUNT - 2) * SECTOR_SIZE).unwrap();
        let mut file = fs.open(sector).unwrap();
        assert_eq!(file.index().indirect_sector(), None);

        let head = pattern(file.len(), 11);
        file.write_at(&head, 0).unwrap();
        let tail = pattern(3 * SECTOR_SIZE, 12);
        file.seek(file.len());
        file.write(&tail).unwrap();

        assert_eq!(file.index().sector_count(), DIRECT_COUNT + 1);
        assert!(file.index().indirect_sector().is_some());
        file.write_back();

        let reopened = fs.open(sector).unwrap();
        let mut back = vec![0; reopened.len()];
        assert_eq!(reopened.read_at(&mut back, 0), head.len() + tail.len());
        assert_eq!(&back[..head.len()], &head[..]);
        assert_eq!(&back[head.len()..], &tail[..]);
    }

    #[test]
    fn growth_past_capacity_leaves_file_untouched() {
        let fs = format(1024);
        let sector = fs.create(MAX_FILE_SIZE - 10).unwrap();
        let mut file = fs.open(sector).unwrap();
        let free = fs.free_sectors().unwrap();

        assert_eq!(file.write_at(&[1; 10], MAX_FILE_SIZE - 10).unwrap(), 10);
        assert!(matches!(
            file.write_at(&[1], MAX_FILE_SIZE),
            Err(Error::FileTooLarge { .. })
        ));
        assert_eq!(file.len(), MAX_FILE_SIZE);
        assert_eq!(fs.free_sectors().unwrap(), free);
    }

    #[test]
    fn write_at_huge_position_is_an_error() {
        let fs = format(1024);
        let sector = fs.create(10).unwrap();
        let mut file = fs.open(sector).unwrap();
        let free = fs.free_sectors().unwrap();
        let writes = fs.disk().stats().writes();

        for position in [usize::MAX, usize::MAX - 1, MAX_FILE_SIZE] {
            assert!(matches!(
                file.write_at(&[1, 2], position),
                Err(Error::FileTooLarge { max: MAX_FILE_SECTORS, .. })
            ));
        }
        file.seek(usize::MAX);
        assert!(file.write(&[3]).is_err());
        assert_eq!(file.cursor(), usize::MAX);

        assert_eq!(file.len(), 10);
        assert_eq!(fs.free_sectors().unwrap(), free);
        assert_eq!(fs.disk().stats().writes(), writes);
    }

    #[test]
    fn growth_without_free_sectors_leaves_file_untouched() {
        let fs = format(64);
        let sector = fs.create(SECTOR_SIZE).unwrap();
        while fs.free_sectors().unwrap() > 0 {
            fs.create(0).unwrap();
        }

        let mut file = fs.open(sector).unwrap();
        let snapshot = file.index().clone();
        assert_eq!(
            file.write_at(&[1; 10], SECTOR_SIZE),
            Err(Error::NoSpace {
                needed: 1,
                available: 0
            })
        );
        assert_eq!(file.index(), &snapshot);

        // 仍在已分配扇区内的写照常进行
        assert_eq!(file.write_at(&[2; 10], 0).unwrap(), 10);
    }

    #[test]
    fn free_map_file_cannot_grow() {
        let fs = format(1024);
        let mut file = FileHandle::open(fs.disk().clone(), None, crate::FREE_MAP_SECTOR).unwrap();
        let len = file.len();

        assert_eq!(file.write_at(&[0], len), Err(Error::FixedSize(0)));
        assert_eq!(file.len(), len);
    }
}
