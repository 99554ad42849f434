//! 扇区缓冲区
//!
//! 磁盘只能整扇区读写，[`SectorBuf`] 是一次传输的载体。
//! 磁盘上的定长结构通过 `get`/`set` 或 `map`/`map_mut` 按偏移访问。

use alloc::boxed::Box;
use alloc::vec;
use core::mem;
use core::ptr;

use crate::SECTOR_SIZE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectorBuf {
    data: Box<[u8]>,
}

impl SectorBuf {
    #[inline]
    pub fn zeroed() -> Self {
        Self {
            data: vec![0; SECTOR_SIZE].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// 把偏移处的字节解释为 `T` 并复制出来
    ///
    /// `T` 必须是所有位模式都合法的 `#[repr(C)]` 整数结构。
    pub fn get<T: Copy>(&self, offset: usize) -> T {
        let type_size = mem::size_of::<T>();
        assert!(type_size + offset <= SECTOR_SIZE);
        // 缓冲区只保证按字节对齐
        unsafe { ptr::read_unaligned(self.data[offset..].as_ptr().cast()) }
    }

    pub fn set<T: Copy>(&mut self, offset: usize, value: &T) {
        let type_size = mem::size_of::<T>();
        assert!(type_size + offset <= SECTOR_SIZE);
        unsafe { ptr::write_unaligned(self.data[offset..].as_mut_ptr().cast(), *value) }
    }

    #[inline]
    pub fn map<T: Copy, V>(&self, offset: usize, f: impl FnOnce(&T) -> V) -> V {
        f(&self.get(offset))
    }

    #[inline]
    pub fn map_mut<T: Copy, V>(&mut self, offset: usize, f: impl FnOnce(&mut T) -> V) -> V {
        let mut value = self.get(offset);
        let ret = f(&mut value);
        self.set(offset, &value);
        ret
    }
}

impl Default for SectorBuf {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl AsRef<[u8]> for SectorBuf {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_view_at_unaligned_offset() {
        let mut buf = SectorBuf::zeroed();
        buf.set(3, &[0x1122_3344u32, 7]);
        assert_eq!(buf.get::<[u32; 2]>(3), [0x1122_3344, 7]);
        assert_eq!(buf.as_bytes()[3], 0x44);

        buf.map_mut(3, |pair: &mut [u32; 2]| pair[1] += 1);
        assert_eq!(buf.map(3, |pair: &[u32; 2]| pair[1]), 8);
    }

    #[test]
    #[should_panic]
    fn view_past_end_panics() {
        SectorBuf::zeroed().get::<u64>(SECTOR_SIZE - 4);
    }
}
