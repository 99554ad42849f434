//! # 文件系统引导
//!
//! 构建出磁盘的布局并使用：0 号扇区是位图文件的文件头，位图数据紧随其后，
//! 其余扇区按需分配给各个文件。文件以文件头所在扇区来标识，
//! 目录与文件名不在这一层。

use alloc::sync::Arc;

use block_dev::BlockDevice;
use log::{debug, info};

use crate::{
    Bitmap, Error, FREE_MAP_SECTOR, FileHandle, FileIndex, FreeMap, NUM_SECTORS, Result,
    SectorBuf, SynchDisk,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsConfig {
    /// 磁盘扇区总数
    pub num_sectors: u32,
    /// 位图文件头所在扇区
    pub free_map_sector: u32,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            num_sectors: NUM_SECTORS,
            free_map_sector: FREE_MAP_SECTOR,
        }
    }
}

#[derive(Debug)]
pub struct FileSystem {
    disk: Arc<SynchDisk>,
    free_map: Arc<FreeMap>,
}

impl FileSystem {
    /// 清空磁盘并建立空的文件系统
    pub fn format(device: Arc<dyn BlockDevice>, config: FsConfig) -> Result<Self> {
        let disk = Arc::new(SynchDisk::new(device, config.num_sectors));

        let zero = SectorBuf::zeroed();
        for sector in 0..config.num_sectors {
            disk.write_sector(sector, &zero);
        }

        // 位图文件头不经由位图分配
        let mut bitmap = Bitmap::new(config.num_sectors as usize);
        bitmap.mark(config.free_map_sector);
        let byte_len = bitmap.byte_len();
        let index = FileIndex::allocate(&mut bitmap, &disk, byte_len)?;
        index.write_back(&disk, config.free_map_sector);

        let mut file = FileHandle::open(disk.clone(), None, config.free_map_sector)?;
        bitmap.write_back(&mut file)?;

        info!(
            "formatted {} sectors, free map at sector {} spans {} data sectors",
            config.num_sectors,
            config.free_map_sector,
            index.sector_count()
        );

        Ok(Self::new(disk, config))
    }

    /// 打开已格式化的磁盘
    pub fn mount(device: Arc<dyn BlockDevice>, config: FsConfig) -> Result<Self> {
        let disk = Arc::new(SynchDisk::new(device, config.num_sectors));

        let index = FileIndex::fetch_from(&disk, config.free_map_sector)
            .map_err(|_| Error::NotFormatted)?;
        if index.file_length() != Bitmap::new(config.num_sectors as usize).byte_len() {
            return Err(Error::NotFormatted);
        }

        let fs = Self::new(disk, config);
        if !fs.bitmap()?.test(config.free_map_sector) {
            return Err(Error::NotFormatted);
        }

        info!("mounted {} sectors", config.num_sectors);
        Ok(fs)
    }

    /// 新建一个 `size` 字节的文件，返回其文件头所在扇区
    pub fn create(&self, size: usize) -> Result<u32> {
        let mut txn = self.free_map.begin()?;
        let bitmap = txn.bitmap();

        let available = bitmap.num_clear();
        let sector = bitmap.find().ok_or(Error::NoSpace {
            needed: 1,
            available,
        })?;
        // 失败时事务被丢弃，连同刚找到的文件头扇区
        let index = FileIndex::allocate(bitmap, &self.disk, size)?;
        index.write_back(&self.disk, sector);
        txn.commit()?;

        debug!("created a {size} byte file with header at sector {sector}");
        Ok(sector)
    }

    pub fn open(&self, sector: u32) -> Result<FileHandle> {
        FileHandle::open(self.disk.clone(), Some(self.free_map.clone()), sector)
    }

    /// 删除文件：归还它的全部扇区以及文件头扇区
    ///
    /// `sector` 越界或在位图中空闲时，它不可能是文件头，返回 [`Error::CorruptIndex`]。
    pub fn remove(&self, sector: u32) -> Result<()> {
        if sector == self.free_map.sector() {
            return Err(Error::FixedSize(sector));
        }
        if sector >= self.disk.num_sectors() {
            return Err(Error::CorruptIndex(sector));
        }

        let mut txn = self.free_map.begin()?;
        if !txn.bitmap().test(sector) {
            return Err(Error::CorruptIndex(sector));
        }
        let index = FileIndex::fetch_from(&self.disk, sector)?;
        index.deallocate(txn.bitmap(), &self.disk);
        txn.bitmap().clear(sector);
        txn.commit()?;

        debug!("removed file with header at sector {sector}");
        Ok(())
    }

    /// 当前位图的一份快照
    pub fn bitmap(&self) -> Result<Bitmap> {
        let mut txn = self.free_map.begin()?;
        Ok(txn.bitmap().clone())
    }

    pub fn free_sectors(&self) -> Result<usize> {
        Ok(self.bitmap()?.num_clear())
    }

    #[inline]
    pub fn disk(&self) -> &Arc<SynchDisk> {
        &self.disk
    }

    #[inline]
    pub fn free_map(&self) -> &Arc<FreeMap> {
        &self.free_map
    }
}

impl FileSystem {
    fn new(disk: Arc<SynchDisk>, config: FsConfig) -> Self {
        let free_map = Arc::new(FreeMap::new(disk.clone(), config.free_map_sector));
        Self { disk, free_map }
    }
}
