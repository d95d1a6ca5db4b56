//! # 文件读写层
//!
//! 基于句柄的字节流操作。每个句柄有自己的游标，
//! 读写从游标处开始，并把游标推进实际处理的字节数。

use alloc::vec;
use alloc::vec::Vec;

use enumflags2::{BitFlags, bitflags};

use crate::layout::DiskInode;
use crate::{BLOCK_SIZE, Error, FileHandle, FileSystem, Result};

#[allow(clippy::upper_case_acronyms)]
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFlag {
    /// 文件不存在时创建
    CREATE = 0b0000_0001,
    /// 打开时清空文件
    TRUNC = 0b0000_0010,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub inode: u32,
    /// 文件大小（字节）
    pub size: usize,
    /// 占用的数据块与索引块总数
    pub blocks: usize,
    pub block_size: usize,
}

impl FileSystem {
    /// 打开已有的文件，游标位于开头
    #[inline]
    pub fn open(&mut self, name: &str) -> Result<FileHandle> {
        self.open_with(name, BitFlags::empty())
    }

    pub fn open_with(
        &mut self,
        name: &str,
        flags: impl Into<BitFlags<OpenFlag>>,
    ) -> Result<FileHandle> {
        let flags = flags.into();
        // 先确认句柄表有空位，失败时不留下新建或清空的文件
        if self.files.is_full() {
            return Err(Error::TooManyOpenFiles);
        }

        let inode_id = match self.lookup(name) {
            Ok(inode_id) => {
                if flags.contains(OpenFlag::TRUNC) {
                    if self.files.is_referenced(inode_id) {
                        return Err(Error::FileInUse);
                    }
                    self.truncate_inode(inode_id, 0)?;
                }
                inode_id
            }
            Err(Error::NotFound) if flags.contains(OpenFlag::CREATE) => {
                self.create_inode(name)?
            }
            Err(e) => return Err(e),
        };

        let handle = self.files.open(inode_id)?;
        log::debug!("opened {name:?} as handle {}", handle.index());
        Ok(handle)
    }

    #[inline]
    pub fn close(&mut self, handle: FileHandle) -> Result<()> {
        self.files.close(handle).map(|_| ())
    }

    #[inline]
    pub fn is_open(&self, handle: FileHandle) -> bool {
        self.files.get(handle).is_ok()
    }

    /// 从游标处读出至多`len`字节，只在文件末尾处少读
    pub fn read(&mut self, handle: FileHandle, len: usize) -> Result<Vec<u8>> {
        let file = *self.files.get(handle)?;
        let size = self.disk_inode(file.inode_id)?.len();
        let mut buf = vec![0; len.min(size.saturating_sub(file.offset))];
        let read_size = self.read_into(handle, &mut buf)?;
        buf.truncate(read_size);
        Ok(buf)
    }

    /// 从游标处读入`buf`，返回读出的字节数
    pub fn read_into(&mut self, handle: FileHandle, buf: &mut [u8]) -> Result<usize> {
        let file = *self.files.get(handle)?;
        let inode = self.disk_inode(file.inode_id)?;

        let mut start = file.offset;
        let end = (start + buf.len()).min(inode.len());
        if start >= end {
            return Ok(0);
        }

        let mut read_size = 0;
        loop {
            // 计算当前块的末尾
            let block_index = start / BLOCK_SIZE;
            let current_block_end = ((block_index + 1) * BLOCK_SIZE).min(end);
            // 读取当前块
            let block_read_size = current_block_end - start;
            let block = self.read_block(self.block_id(&inode, block_index)?)?;
            let offset = start % BLOCK_SIZE;
            buf[read_size..read_size + block_read_size]
                .copy_from_slice(&block[offset..offset + block_read_size]);
            read_size += block_read_size;

            if current_block_end == end {
                break;
            }
            // 移动到下一个块
            start = current_block_end;
        }

        self.files.get_mut(handle)?.offset += read_size;
        Ok(read_size)
    }

    /// 从游标处写入`buf`，按需扩展文件。
    ///
    /// 空间耗尽或超出最大文件大小时只写入能写下的部分并返回其字节数；
    /// 一个字节也写不下时返回错误。
    pub fn write(&mut self, handle: FileHandle, buf: &[u8]) -> Result<usize> {
        let file = *self.files.get(handle)?;
        if buf.is_empty() {
            return Ok(0);
        }
        let mut inode = self.disk_inode(file.inode_id)?;

        let mut written = 0;
        let mut fresh = Vec::new();
        let result = self.write_blocks(&mut inode, file.offset, buf, &mut written, &mut fresh);

        // 已写入的部分无论成败都计入文件
        inode.size = inode.size.max((file.offset + written) as u64);
        self.store_inode(file.inode_id, inode)?;
        self.files.get_mut(handle)?.offset += written;

        // 新分配却未被文件大小覆盖的块归还位图
        if result.is_err() {
            let kept = DiskInode::count_data_block(inode.len());
            let unused: Vec<u32> = fresh
                .into_iter()
                .filter(|&(needed, _)| needed > kept)
                .map(|(_, block_id)| block_id)
                .collect();
            log::debug!(
                "inode {}: returned {} blocks of a failed write",
                file.inode_id,
                unused.len()
            );
            self.release(unused)?;
        }

        match result {
            Ok(()) => Ok(written),
            Err(e @ (Error::StoreFull | Error::FileTooLarge)) if written > 0 => {
                log::warn!(
                    "short write on inode {}: {written} of {} bytes ({e})",
                    file.inode_id,
                    buf.len()
                );
                Ok(written)
            }
            Err(e) => Err(e),
        }
    }

    /// 把游标移到`offset`，不能越过文件末尾
    pub fn seek(&mut self, handle: FileHandle, offset: usize) -> Result<()> {
        let file = *self.files.get(handle)?;
        if offset > self.disk_inode(file.inode_id)?.len() {
            return Err(Error::InvalidOffset);
        }
        self.files.get_mut(handle)?.offset = offset;
        Ok(())
    }

    #[inline]
    pub fn tell(&self, handle: FileHandle) -> Result<usize> {
        self.files.get(handle).map(|file| file.offset)
    }

    /// 把文件截短到`len`字节，只能缩小
    pub fn truncate(&mut self, handle: FileHandle, len: usize) -> Result<()> {
        let file = *self.files.get(handle)?;
        self.truncate_inode(file.inode_id, len)
    }

    pub fn filesize(&self, handle: FileHandle) -> Result<usize> {
        let file = self.files.get(handle)?;
        Ok(self.disk_inode(file.inode_id)?.len())
    }

    pub fn fstat(&self, handle: FileHandle) -> Result<Stat> {
        let file = self.files.get(handle)?;
        let size = self.disk_inode(file.inode_id)?.len();
        Ok(Stat {
            inode: file.inode_id,
            size,
            blocks: DiskInode::count_total_block(size),
            block_size: BLOCK_SIZE,
        })
    }
}

impl FileSystem {
    /// 逐块写入，`written`记录已落盘的字节数
    fn write_blocks(
        &mut self,
        inode: &mut DiskInode,
        offset: usize,
        buf: &[u8],
        written: &mut usize,
        fresh: &mut Vec<(usize, u32)>,
    ) -> Result<()> {
        // 文件大小覆盖的数据块数，在此之后的块都是新分配的
        let allocated = DiskInode::count_data_block(inode.len());
        let mut start = offset;
        let end = offset + buf.len();

        while start < end {
            let block_index = start / BLOCK_SIZE;
            let current_block_end = ((block_index + 1) * BLOCK_SIZE).min(end);
            let block_write_size = current_block_end - start;

            // 游标不越过文件末尾，此前的块都已存在
            let present = block_index.max(allocated);
            let block_id = self.block_id_or_alloc(inode, block_index, present, fresh)?;
            // 新块从零开始，整块覆盖时无需读出旧内容
            let mut block = if block_index >= allocated || block_write_size == BLOCK_SIZE {
                [0; BLOCK_SIZE]
            } else {
                self.read_block(block_id)?
            };
            let block_offset = start % BLOCK_SIZE;
            block[block_offset..block_offset + block_write_size]
                .copy_from_slice(&buf[*written..*written + block_write_size]);
            self.write_block(block_id, &block)?;

            *written += block_write_size;
            start = current_block_end;
        }

        Ok(())
    }

    pub(crate) fn truncate_inode(&mut self, inode_id: u32, len: usize) -> Result<()> {
        let mut inode = self.disk_inode(inode_id)?;
        if len > inode.len() {
            return Err(Error::InvalidLength);
        }
        if len == inode.len() {
            return Ok(());
        }

        // 保留的最后一块中，新长度之后的部分清零
        if len % BLOCK_SIZE != 0 {
            let block_id = self.block_id(&inode, len / BLOCK_SIZE)?;
            let mut block = self.read_block(block_id)?;
            block[len % BLOCK_SIZE..].fill(0);
            self.write_block(block_id, &block)?;
        }

        let dropped = self.shrink_to(&mut inode, DiskInode::count_data_block(len))?;
        self.release(dropped)?;
        inode.size = len as u64;
        self.store_inode(inode_id, inode)?;
        self.files.clamp_offsets(inode_id, len);

        log::debug!("truncated inode {inode_id} to {len} bytes");
        Ok(())
    }
}
