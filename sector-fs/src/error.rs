use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// 位图中的空闲扇区不足
    #[error("not enough free sectors: need {needed}, {available} available")]
    NoSpace { needed: usize, available: usize },
    /// 超出单个文件的索引容量
    #[error("file would need {sectors} sectors, at most {max} are addressable")]
    FileTooLarge { sectors: usize, max: usize },
    /// 磁盘上的文件索引自相矛盾
    #[error("file index at sector {0} is corrupted")]
    CorruptIndex(u32),
    /// 没有扩容能力的文件（位图文件）试图增长
    #[error("file at sector {0} cannot grow")]
    FixedSize(u32),
    #[error("disk is not formatted")]
    NotFormatted,
}
