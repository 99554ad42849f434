//! # 磁盘数据结构层
//!
//! 磁盘布局：
//! 位图文件头(扇区 0) | 位图数据 | 其余文件的文件头、间接索引块与数据扇区
//!
//! 除 0 号扇区外，所有扇区都由位图统一分配。

mod bitmap;
pub use bitmap::Bitmap;

mod file_index;
pub use file_index::{DIRECT_COUNT, FileIndex, INDIRECT_COUNT, MAX_FILE_SECTORS, MAX_FILE_SIZE};
