use alloc::vec;
use alloc::vec::Vec;

use crate::{Error, FileHandle, Result};

/// 空闲空间位图：每个扇区一位，0 为空闲，1 为已占用
///
/// 位图本身作为一个普通文件的数据存放在磁盘上，
/// 通过 [`Bitmap::fetch_from`]/[`Bitmap::write_back`] 与该文件同步。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    words: Vec<u64>,
    /// 位图覆盖的扇区数
    num_bits: usize,
}

impl Bitmap {
    /// 全部空闲的位图
    pub fn new(num_bits: usize) -> Self {
        Self {
            words: vec![0; num_bits.div_ceil(64)],
            num_bits,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.num_bits
    }

    /// 位图持久化后的字节数
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.num_bits.div_ceil(8)
    }

    /// 找到一个空闲扇区，标记为占用并返回其编号；
    /// 位图已满则返回空
    pub fn find(&mut self) -> Option<u32> {
        let (group_index, ingroup_index) = self
            .words
            .iter()
            .enumerate()
            .find_map(|(group_index, &bits)| {
                (bits != u64::MAX).then_some((group_index, bits.trailing_ones() as usize))
            })?;

        let sector = group_index * 64 + ingroup_index;
        if sector >= self.num_bits {
            return None;
        }

        self.words[group_index] |= 1 << ingroup_index;
        Some(sector as u32)
    }

    pub fn mark(&mut self, sector: u32) {
        let (group_index, ingroup_index) = self.locate(sector);
        self.words[group_index] |= 1 << ingroup_index;
    }

    pub fn clear(&mut self, sector: u32) {
        let (group_index, ingroup_index) = self.locate(sector);

        // 释放的扇区一定得是已占用的
        assert_ne!(
            self.words[group_index] & (1 << ingroup_index),
            0,
            "sector {sector} is already free"
        );

        self.words[group_index] &= !(1 << ingroup_index);
    }

    pub fn test(&self, sector: u32) -> bool {
        let (group_index, ingroup_index) = self.locate(sector);
        self.words[group_index] & (1 << ingroup_index) != 0
    }

    pub fn num_clear(&self) -> usize {
        let used: u32 = self.words.iter().map(|bits| bits.count_ones()).sum();
        self.num_bits - used as usize
    }

    /// 所有已占用的扇区，升序
    pub fn used_sectors(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.num_bits as u32).filter(|&sector| self.test(sector))
    }

    /// 从位图文件中读出位图
    pub fn fetch_from(&mut self, file: &FileHandle) -> Result<()> {
        let mut bytes = vec![0; self.byte_len()];
        if file.read_at(&mut bytes, 0) != bytes.len() {
            return Err(Error::CorruptIndex(file.origin()));
        }

        self.words.fill(0);
        for (index, &byte) in bytes.iter().enumerate() {
            self.words[index / 8] |= (byte as u64) << (index % 8 * 8);
        }

        // 超出磁盘的尾部位不参与分配
        let tail = self.num_bits % 64;
        if tail != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1 << tail) - 1;
            }
        }

        Ok(())
    }

    /// 把位图写回位图文件
    pub fn write_back(&self, file: &mut FileHandle) -> Result<()> {
        let bytes: Vec<u8> = self
            .words
            .iter()
            .flat_map(|bits| bits.to_le_bytes())
            .take(self.byte_len())
            .collect();
        file.write_at(&bytes, 0)?;

        Ok(())
    }
}

impl Bitmap {
    #[inline]
    fn locate(&self, sector: u32) -> (usize, usize) {
        let sector = sector as usize;
        assert!(
            sector < self.num_bits,
            "sector {sector} outside bitmap of {} bits",
            self.num_bits
        );
        (sector / 64, sector % 64)
    }
}
