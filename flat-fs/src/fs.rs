//! # 会话层
//!
//! 构建出磁盘的布局并使用。
//!
//! 挂载时全部元数据被读入内存，会话期间只修改内存中的副本，
//! 卸载时再整体写回各自的固定块；数据块则在每次调用中立即读写。
//! 因此挂载与卸载之间的异常退出会丢失本次会话的全部元数据修改。

use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::mem;

use block_dev::{BlockDevice, BlockStore};

use crate::file_table::FileTable;
use crate::layout::*;
use crate::{
    BLOCK_SIZE, DIRECT_COUNT, DataBlock, Error, INDIRECT_COUNT, INODE_COUNT, Result,
};

/// 直接索引与一级索引合计的编号容量
const SINGLE_CAP: usize = DIRECT_COUNT + INDIRECT_COUNT;

/// 一次挂载的会话，持有全部内存中的元数据
pub struct FileSystem {
    block_device: Arc<dyn BlockDevice>,
    super_block: SuperBlock,
    inode_bitmap: Bitmap,
    data_bitmap: Bitmap,
    inodes: InodeTable,
    directory: Directory,
    pub(crate) files: FileTable,
    /// 在用的目录项个数
    used_files: usize,
}

/// 存储空间的使用情况
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStat {
    pub total_blocks: usize,
    pub free_blocks: usize,
    pub free_inodes: usize,
    pub files: usize,
}

impl FileSystem {
    /// 创建名为`name`的新存储并写入初始元数据，完成后设备处于关闭状态
    pub fn make_store(store: &dyn BlockStore, name: &str) -> Result<()> {
        store.create_store(name)?;
        let block_device = store.open_store(name)?;

        let formatted = Self::format(block_device.as_ref());
        let closed = block_device.close();
        formatted?;
        closed?;

        log::info!(
            "made store {name:?}: {} blocks of {BLOCK_SIZE} bytes",
            block_device.block_count()
        );
        Ok(())
    }

    /// 打开存储并把全部元数据读入内存
    pub fn mount(store: &dyn BlockStore, name: &str) -> Result<Self> {
        let block_device = store.open_store(name)?;

        match Self::load(block_device.clone()) {
            Ok(fs) => {
                log::info!(
                    "mounted store {name:?}: {} files, {} free blocks",
                    fs.used_files,
                    fs.data_bitmap.free_count()
                );
                Ok(fs)
            }
            Err(e) => {
                if let Err(close) = block_device.close() {
                    log::warn!("failed to close {name:?} after a failed mount: {close}");
                }
                Err(e)
            }
        }
    }

    /// 写回全部元数据，关闭所有句柄与设备
    pub fn unmount(mut self) -> Result<()> {
        let persisted = self.sync();
        self.files.clear();
        let closed = self.block_device.close();

        if let Err(e) = persisted {
            if let Err(close) = closed {
                log::warn!("failed to close device after a failed unmount: {close}");
            }
            return Err(e);
        }
        closed?;

        log::info!("unmounted store: {} files", self.used_files);
        Ok(())
    }

    /// 把 inode 表、目录表、两张位图依次写回各自的块，会话继续
    pub fn sync(&mut self) -> Result<()> {
        let super_block = &self.super_block;
        self.write_block(super_block.inode_table_block, &self.inodes.to_block())?;
        self.write_block(super_block.directory_block, &self.directory.to_block())?;
        self.write_block(super_block.inode_bitmap_block, &self.inode_bitmap.to_block())?;
        self.write_block(super_block.data_bitmap_block, &self.data_bitmap.to_block())?;
        Ok(())
    }

    pub fn create(&mut self, name: &str) -> Result<()> {
        self.create_inode(name).map(|_| ())
    }

    /// 删除文件并释放其全部数据块；文件仍被打开时拒绝删除
    pub fn delete(&mut self, name: &str) -> Result<()> {
        let (slot, inode_id) = self.directory.find_by_name(name).ok_or(Error::NotFound)?;
        if self.files.is_referenced(inode_id) {
            return Err(Error::FileInUse);
        }

        let mut inode = self.disk_inode(inode_id)?;
        let dropped = self.shrink_to(&mut inode, 0)?;
        self.release(dropped)?;

        self.directory.remove(slot);
        self.used_files -= 1;
        self.store_inode(inode_id, DiskInode::default())?;
        self.inode_bitmap.dealloc(inode_id as usize)?;

        log::debug!("deleted {name:?} (inode {inode_id})");
        Ok(())
    }

    /// 按目录表槽位顺序列出全部文件名
    pub fn list_names(&self) -> Vec<String> {
        self.directory
            .iter()
            .map(|entry| entry.name().to_string())
            .collect()
    }

    pub fn statfs(&self) -> FsStat {
        FsStat {
            total_blocks: self.super_block.total_blocks as usize,
            free_blocks: self.data_bitmap.free_count(),
            free_inodes: self.inode_bitmap.free_count(),
            files: self.used_files,
        }
    }
}

impl FileSystem {
    fn format(block_device: &dyn BlockDevice) -> Result<()> {
        let total_blocks = block_device.block_count();
        if !SuperBlock::fits(total_blocks) {
            return Err(Error::UnsupportedGeometry {
                block_count: total_blocks,
            });
        }

        let super_block = SuperBlock::new(total_blocks as u32);
        let mut data_bitmap = Bitmap::with_free(total_blocks);
        for block_id in 0..super_block.reserved_blocks as usize {
            data_bitmap.set(block_id, false)?;
        }

        let blocks: [(u32, DataBlock); 5] = [
            (SuperBlock::BLOCK_ID as u32, super_block.to_block()),
            (super_block.directory_block, Directory::default().to_block()),
            (
                super_block.inode_bitmap_block,
                Bitmap::with_free(INODE_COUNT).to_block(),
            ),
            (super_block.data_bitmap_block, data_bitmap.to_block()),
            (super_block.inode_table_block, InodeTable::default().to_block()),
        ];
        for (block_id, block) in &blocks {
            block_device.write_block(*block_id as usize, block)?;
        }

        Ok(())
    }

    fn load(block_device: Arc<dyn BlockDevice>) -> Result<Self> {
        let mut block = [0; BLOCK_SIZE];
        block_device.read_block(SuperBlock::BLOCK_ID, &mut block)?;
        let super_block = SuperBlock::from_block(&block);
        if !super_block.is_valid() {
            return Err(Error::InvalidStore);
        }
        if super_block.total_blocks as usize != block_device.block_count() {
            return Err(Error::UnsupportedGeometry {
                block_count: block_device.block_count(),
            });
        }

        block_device.read_block(super_block.inode_table_block as usize, &mut block)?;
        let inodes = InodeTable::from_block(&block);
        block_device.read_block(super_block.directory_block as usize, &mut block)?;
        let directory = Directory::from_block(&block);
        block_device.read_block(super_block.inode_bitmap_block as usize, &mut block)?;
        let inode_bitmap = Bitmap::from_block(&block, INODE_COUNT);
        block_device.read_block(super_block.data_bitmap_block as usize, &mut block)?;
        let data_bitmap = Bitmap::from_block(&block, super_block.total_blocks as usize);

        // 每个目录项都要指向一个在用的 inode
        for entry in directory.iter() {
            let id = entry.inode_id();
            let in_use = inodes.get(id).is_some_and(|inode| !inode.is_free());
            if !in_use || inode_bitmap.get(id as usize)? {
                return Err(Error::InvalidStore);
            }
        }
        let used_files = directory.iter().count();

        Ok(Self {
            block_device,
            super_block,
            inode_bitmap,
            data_bitmap,
            inodes,
            directory,
            files: FileTable::default(),
            used_files,
        })
    }

    /// 分配 inode 与目录项，返回 inode ID
    pub(crate) fn create_inode(&mut self, name: &str) -> Result<u32> {
        DirEntry::validate_name(name)?;
        if self.directory.find_by_name(name).is_some() {
            return Err(Error::AlreadyExists);
        }
        let slot = self.directory.find_free_slot().ok_or(Error::DirectoryFull)?;
        let inode_id = self.inode_bitmap.alloc().ok_or(Error::NoFreeInodes)? as u32;

        let mut inode = DiskInode::default();
        inode.init();
        self.store_inode(inode_id, inode)?;
        self.directory.insert(slot, DirEntry::new(name, inode_id));
        self.used_files += 1;

        log::debug!("created {name:?} (inode {inode_id})");
        Ok(inode_id)
    }

    pub(crate) fn lookup(&self, name: &str) -> Result<u32> {
        self.directory
            .find_by_name(name)
            .map(|(_, inode_id)| inode_id)
            .ok_or(Error::NotFound)
    }

    pub(crate) fn disk_inode(&self, inode_id: u32) -> Result<DiskInode> {
        self.inodes.get(inode_id).copied().ok_or(Error::InvalidStore)
    }

    pub(crate) fn store_inode(&mut self, inode_id: u32, inode: DiskInode) -> Result<()> {
        *self.inodes.get_mut(inode_id).ok_or(Error::InvalidStore)? = inode;
        Ok(())
    }

    pub(crate) fn read_block(&self, block_id: u32) -> Result<DataBlock> {
        let mut block = [0; BLOCK_SIZE];
        self.block_device.read_block(block_id as usize, &mut block)?;
        Ok(block)
    }

    pub(crate) fn write_block(&self, block_id: u32, block: &DataBlock) -> Result<()> {
        self.block_device.write_block(block_id as usize, block)?;
        Ok(())
    }
}

/* 数据块的分配与寻址 */
impl FileSystem {
    /// 逻辑上 inode 指向一系列数据块，此处传入的是这些数据块的索引（逻辑索引），
    /// 返回其在设备上的块ID。只用于文件大小以内的块
    pub(crate) fn block_id(&self, inode: &DiskInode, block_index: usize) -> Result<u32> {
        let block_id = match BlockAddr::locate(block_index) {
            BlockAddr::Direct(index) => inode.direct[index],
            BlockAddr::Single(slot) => self.read_indirect(inode.indirect1)?.get(slot),
            BlockAddr::Double(outer, inner) => {
                let indirect1 = self.read_indirect(inode.indirect2)?.get(outer);
                self.read_indirect(indirect1)?.get(inner)
            }
            BlockAddr::OutOfRange => return Err(Error::FileTooLarge),
        };
        Self::allocated(block_id)
    }

    /// 同 [`FileSystem::block_id`]，但尚未分配的数据块及其所需的索引块会被分配。
    ///
    /// `present`是已确认存在的数据块数：逻辑索引小于它的块及其索引块都已分配，
    /// 其余的指针不论取值一律视为未分配。每个新分配的块连同“文件至少要有多少个
    /// 数据块才会引用它”一并记入`fresh`，写入失败时据此归还未被文件覆盖的块。
    ///
    /// 分配前先确认空闲块足以容纳数据块及所缺的索引块，
    /// 因此空间不足时不会留下无主的索引块。
    pub(crate) fn block_id_or_alloc(
        &mut self,
        inode: &mut DiskInode,
        block_index: usize,
        present: usize,
        fresh: &mut Vec<(usize, u32)>,
    ) -> Result<u32> {
        match BlockAddr::locate(block_index) {
            BlockAddr::Direct(index) => {
                if block_index >= present {
                    inode.direct[index] = self.alloc_data()?;
                    fresh.push((block_index + 1, inode.direct[index]));
                }
                Self::allocated(inode.direct[index])
            }
            BlockAddr::Single(slot) => {
                if present <= DIRECT_COUNT {
                    self.reserve(2)?;
                    inode.indirect1 = self.alloc_indirect()?;
                    fresh.push((DIRECT_COUNT + 1, inode.indirect1));
                }
                self.slot_or_alloc(inode.indirect1, slot, block_index, present, fresh)
            }
            BlockAddr::Double(outer, inner) => {
                if present <= SINGLE_CAP {
                    self.reserve(3)?;
                    inode.indirect2 = self.alloc_indirect()?;
                    fresh.push((SINGLE_CAP + 1, inode.indirect2));
                }
                // 该一级索引块负责的第一个逻辑块
                let first = SINGLE_CAP + outer * INDIRECT_COUNT;
                let mut indirect2 = self.read_indirect(inode.indirect2)?;
                let mut indirect1 = indirect2.get(outer);
                if present <= first {
                    self.reserve(2)?;
                    indirect1 = self.alloc_indirect()?;
                    fresh.push((first + 1, indirect1));
                    indirect2.set(outer, indirect1);
                    self.write_block(inode.indirect2, &indirect2.to_block())?;
                }
                self.slot_or_alloc(indirect1, inner, block_index, present, fresh)
            }
            BlockAddr::OutOfRange => Err(Error::FileTooLarge),
        }
    }

    /// 释放逻辑索引不小于`keep`的全部数据块，以及因此变空的索引块。
    ///
    /// 被释放的块数由文件大小推出。返回被释放的块ID，
    /// 由调用者在更新 inode 后交给 [`FileSystem::release`]。
    pub(crate) fn shrink_to(&self, inode: &mut DiskInode, keep: usize) -> Result<Vec<u32>> {
        let total = DiskInode::count_data_block(inode.len());
        let mut dropped = Vec::new();
        if keep >= total {
            return Ok(dropped);
        }

        /******************** 直接索引 ********************/
        dropped.extend(
            inode
                .direct
                .iter_mut()
                .take(total)
                .skip(keep)
                .map(mem::take),
        );
        /******************** END ********************/

        if total <= DIRECT_COUNT {
            return Ok(dropped);
        }

        /******************** 一级索引 ********************/
        let start = keep.saturating_sub(DIRECT_COUNT);
        let end = (total - DIRECT_COUNT).min(INDIRECT_COUNT);
        if start < end {
            let mut indirect1 = self.read_indirect(inode.indirect1)?;
            for slot in start..end {
                dropped.push(indirect1.get(slot));
                indirect1.set(slot, 0);
            }
            if start == 0 {
                dropped.push(mem::take(&mut inode.indirect1));
            } else {
                self.write_block(inode.indirect1, &indirect1.to_block())?;
            }
        }
        /******************** END ********************/

        if total <= SINGLE_CAP {
            return Ok(dropped);
        }

        /******************** 二级索引 ********************/
        let start = keep.saturating_sub(SINGLE_CAP);
        let end = total - SINGLE_CAP;
        let mut indirect2 = self.read_indirect(inode.indirect2)?;
        for outer in start / INDIRECT_COUNT..end.div_ceil(INDIRECT_COUNT) {
            let base = outer * INDIRECT_COUNT;
            // 只有第一个一级索引块可能被部分保留
            let inner_start = start.saturating_sub(base);
            let inner_end = (end - base).min(INDIRECT_COUNT);

            let indirect1_id = indirect2.get(outer);
            let mut indirect1 = self.read_indirect(indirect1_id)?;
            for slot in inner_start..inner_end {
                dropped.push(indirect1.get(slot));
                indirect1.set(slot, 0);
            }
            if inner_start == 0 {
                dropped.push(indirect1_id);
                indirect2.set(outer, 0);
            } else {
                self.write_block(indirect1_id, &indirect1.to_block())?;
            }
        }
        if start == 0 {
            dropped.push(mem::take(&mut inode.indirect2));
        } else {
            self.write_block(inode.indirect2, &indirect2.to_block())?;
        }
        /******************** END ********************/

        Ok(dropped)
    }

    /// 把块归还给数据块位图。任一块不在数据区内时一块也不归还
    pub(crate) fn release(&mut self, blocks: Vec<u32>) -> Result<()> {
        let data_area = self.super_block.reserved_blocks..self.super_block.total_blocks;
        if !blocks.iter().all(|block_id| data_area.contains(block_id)) {
            return Err(Error::InvalidStore);
        }

        for block_id in blocks {
            self.data_bitmap.dealloc(block_id as usize)?;
            log::trace!("released block {block_id}");
        }
        Ok(())
    }

    /// 在数据区分配新块并返回其ID
    fn alloc_data(&mut self) -> Result<u32> {
        let block_id = self.data_bitmap.alloc().ok_or(Error::StoreFull)? as u32;
        log::trace!("allocated block {block_id}");
        Ok(block_id)
    }

    /// 分配一个清零的索引块
    fn alloc_indirect(&mut self) -> Result<u32> {
        let block_id = self.alloc_data()?;
        if let Err(e) = self.write_block(block_id, &IndirectBlock::default().to_block()) {
            self.data_bitmap.dealloc(block_id as usize)?;
            return Err(e);
        }
        Ok(block_id)
    }

    #[inline]
    fn reserve(&self, blocks: usize) -> Result<()> {
        if self.data_bitmap.free_count() < blocks {
            return Err(Error::StoreFull);
        }
        Ok(())
    }

    fn read_indirect(&self, block_id: u32) -> Result<IndirectBlock> {
        let block = self.read_block(Self::allocated(block_id)?)?;
        Ok(IndirectBlock::from_block(&block))
    }

    /// 一级索引块`indirect1`的第`slot`项，不存在时分配数据块并写回索引块
    fn slot_or_alloc(
        &mut self,
        indirect1_id: u32,
        slot: usize,
        block_index: usize,
        present: usize,
        fresh: &mut Vec<(usize, u32)>,
    ) -> Result<u32> {
        let mut indirect1 = self.read_indirect(indirect1_id)?;
        if block_index < present {
            return Self::allocated(indirect1.get(slot));
        }

        let block_id = self.alloc_data()?;
        fresh.push((block_index + 1, block_id));
        indirect1.set(slot, block_id);
        self.write_block(indirect1_id, &indirect1.to_block())?;
        Ok(block_id)
    }

    /// 文件大小以内的块编号不可能为 0
    #[inline]
    fn allocated(block_id: u32) -> Result<u32> {
        match block_id {
            0 => Err(Error::InvalidStore),
            id => Ok(id),
        }
    }
}
