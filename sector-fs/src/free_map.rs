//! # 空闲空间管理
//!
//! 位图作为一个普通文件保存在磁盘上，文件头位于众所周知的扇区。
//! 所有影响分配状态的操作都要先通过 [`FreeMap::begin`] 取得一个 [`FreeMapTxn`]：
//! 它持有锁、载入位图，只有它能交出 `&mut Bitmap`。

use alloc::sync::Arc;

use log::trace;
use spin::{Mutex, MutexGuard};

use crate::{Bitmap, FileHandle, Result, SynchDisk};

#[derive(Debug)]
pub struct FreeMap {
    disk: Arc<SynchDisk>,
    /// 位图文件头所在扇区
    sector: u32,
    lock: Mutex<()>,
}

/// 一次分配事务：持有空闲位图的锁与载入的位图
///
/// 只有 [`FreeMapTxn::commit`] 会把位图写回磁盘，直接丢弃则放弃全部改动。
pub struct FreeMapTxn<'a> {
    _guard: MutexGuard<'a, ()>,
    file: FileHandle,
    bitmap: Bitmap,
}

impl FreeMap {
    pub fn new(disk: Arc<SynchDisk>, sector: u32) -> Self {
        Self {
            disk,
            sector,
            lock: Mutex::new(()),
        }
    }

    #[inline]
    pub fn sector(&self) -> u32 {
        self.sector
    }

    /// 加锁并从位图文件载入位图
    pub fn begin(&self) -> Result<FreeMapTxn<'_>> {
        let guard = self.lock.lock();
        // 位图文件长度固定，打开时不给它扩容能力
        let file = FileHandle::open(self.disk.clone(), None, self.sector)?;
        let mut bitmap = Bitmap::new(self.disk.num_sectors() as usize);
        bitmap.fetch_from(&file)?;
        trace!("free map loaded, {} sectors free", bitmap.num_clear());

        Ok(FreeMapTxn {
            _guard: guard,
            file,
            bitmap,
        })
    }
}

impl FreeMapTxn<'_> {
    #[inline]
    pub fn bitmap(&mut self) -> &mut Bitmap {
        &mut self.bitmap
    }

    /// 把位图写回位图文件并释放锁
    pub fn commit(mut self) -> Result<()> {
        self.bitmap.write_back(&mut self.file)?;
        trace!("free map written back, {} sectors free", self.bitmap.num_clear());
        Ok(())
    }
}
