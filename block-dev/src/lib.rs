//! # Block device interface
//!
//! A block device stores data in fixed-size **sectors** (a disk image, a
//! virtio disk, a RAM disk). [`BlockDevice`] abstracts reading and writing
//! those sectors; a type implementing it is a **block device driver**.
//!
//! `sector-fs` talks to the disk only through this trait.

#![no_std]

use core::any::Any;

/// Block device driver.
///
/// Both calls transfer exactly one sector and block until the transfer has
/// completed. `buf` is always exactly one sector long.
pub trait BlockDevice: Send + Sync + Any {
    fn read_block(&self, block_id: usize, buf: &mut [u8]);
    fn write_block(&self, block_id: usize, buf: &[u8]);
}
