//! # 同步磁盘层
//!
//! 块设备可能以中断方式完成请求，而文件层需要阻塞式的读写：
//! [`SynchDisk`] 一次只放行一个请求，并在请求完成后才返回。
//! 读写计数随磁盘对象注入，不再是全局统计。

use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

use block_dev::BlockDevice;
use log::trace;
use spin::Mutex;

use crate::SectorBuf;

pub struct SynchDisk {
    device: Arc<dyn BlockDevice>,
    /// 磁盘扇区总数
    num_sectors: u32,
    /// 同一时刻只允许一个请求
    lock: Mutex<()>,
    stats: DiskStats,
}

#[derive(Debug, Default)]
pub struct DiskStats {
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl SynchDisk {
    pub fn new(device: Arc<dyn BlockDevice>, num_sectors: u32) -> Self {
        Self {
            device,
            num_sectors,
            lock: Mutex::new(()),
            stats: DiskStats::default(),
        }
    }

    #[inline]
    pub fn num_sectors(&self) -> u32 {
        self.num_sectors
    }

    pub fn read_sector(&self, sector: u32, buf: &mut SectorBuf) {
        assert!(
            sector < self.num_sectors,
            "read from sector {sector} beyond disk of {} sectors",
            self.num_sectors
        );
        trace!("reading from sector {sector}");

        let _guard = self.lock.lock();
        self.device.read_block(sector as usize, buf.as_bytes_mut());
        self.stats.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn write_sector(&self, sector: u32, buf: &SectorBuf) {
        assert!(
            sector < self.num_sectors,
            "write to sector {sector} beyond disk of {} sectors",
            self.num_sectors
        );
        trace!("writing to sector {sector}");

        let _guard = self.lock.lock();
        self.device.write_block(sector as usize, buf.as_bytes());
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn stats(&self) -> &DiskStats {
        &self.stats
    }
}

impl fmt::Debug for SynchDisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynchDisk")
            .field("num_sectors", &self.num_sectors)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl DiskStats {
    #[inline]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}
