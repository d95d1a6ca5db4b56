use alloc::vec;
use alloc::vec::Vec;

use crate::{BLOCK_BITS, BLOCK_SIZE, DataBlock, Error, Result};

/// 位图，记录其指示区域的分配情况：1 表示空闲，0 表示占用。
///
/// 位的编号在字节内是高位优先的，即第 0 位是第 0 字节的最高位。
/// 整个位图最多占据一块，故长度不超过 [`BLOCK_BITS`]。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    bytes: Vec<u8>,
    /// 有效位数
    len: usize,
    /// 值为 1 的位数
    free: usize,
}

impl Bitmap {
    /// 全部位都已占用的位图
    pub fn new(len: usize) -> Self {
        assert!(len <= BLOCK_BITS, "bitmap of {len} bits doesn't fit in a block");
        Self {
            bytes: vec![0; len.div_ceil(8)],
            len,
            free: 0,
        }
    }

    /// 全部位都空闲的位图
    pub fn with_free(len: usize) -> Self {
        let mut bitmap = Self::new(len);
        bitmap.bytes.fill(u8::MAX);
        bitmap.mask_tail();
        bitmap.free = len;
        bitmap
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 空闲位的个数
    #[inline]
    pub fn free_count(&self) -> usize {
        self.free
    }

    pub fn get(&self, index: usize) -> Result<bool> {
        self.check(index)?;
        Ok(self.bytes[index / 8] & Self::mask(index) != 0)
    }

    pub fn set(&mut self, index: usize, bit: bool) -> Result<()> {
        if self.get(index)? == bit {
            return Ok(());
        }

        let byte = &mut self.bytes[index / 8];
        if bit {
            *byte |= Self::mask(index);
            self.free += 1;
        } else {
            *byte &= !Self::mask(index);
            self.free -= 1;
        }

        Ok(())
    }

    /// 线性扫描，返回第一个空闲位
    pub fn find_first_free(&self) -> Option<usize> {
        self.bytes
            .iter()
            .enumerate()
            .find_map(|(byte_index, &byte)| {
                (byte != 0).then(|| byte_index * 8 + byte.leading_zeros() as usize)
            })
            .filter(|&index| index < self.len)
    }

    /// 占用第一个空闲位并返回其编号，位图耗尽时返回空
    pub fn alloc(&mut self) -> Option<usize> {
        let index = self.find_first_free()?;
        self.bytes[index / 8] &= !Self::mask(index);
        self.free -= 1;
        Some(index)
    }

    /// 释放一位。释放本就空闲的位意味着元数据已经损坏
    pub fn dealloc(&mut self, index: usize) -> Result<()> {
        debug_assert!(!self.get(index)?, "double free of bit {index}");
        self.set(index, true)
    }

    /// 从磁盘块中读出长为`len`的位图，超出`len`的位一律视为占用
    pub fn from_block(block: &DataBlock, len: usize) -> Self {
        let mut bitmap = Self::new(len);
        let byte_len = bitmap.bytes.len();
        bitmap.bytes.copy_from_slice(&block[..byte_len]);
        bitmap.mask_tail();
        bitmap.free = bitmap.bytes.iter().map(|byte| byte.count_ones() as usize).sum();
        bitmap
    }

    pub fn to_block(&self) -> DataBlock {
        let mut block = [0; BLOCK_SIZE];
        block[..self.bytes.len()].copy_from_slice(&self.bytes);
        block
    }
}

impl Bitmap {
    #[inline]
    fn mask(index: usize) -> u8 {
        0x80 >> (index % 8)
    }

    #[inline]
    fn check(&self, index: usize) -> Result<()> {
        if index < self.len {
            Ok(())
        } else {
            Err(Error::OutOfRange {
                index,
                len: self.len,
            })
        }
    }

    /// 最后一个字节中不属于位图的低位清零
    fn mask_tail(&mut self) {
        let rem = self.len % 8;
        if rem != 0 {
            if let Some(last) = self.bytes.last_mut() {
                *last &= !(u8::MAX >> rem);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msb_first() {
        let mut bitmap = Bitmap::new(16);
        bitmap.set(0, true).unwrap();
        bitmap.set(9, true).unwrap();
        assert_eq!(bitmap.to_block()[..2], [0x80, 0x40]);
        assert!(bitmap.get(0).unwrap());
        assert!(!bitmap.get(1).unwrap());
        assert!(bitmap.get(9).unwrap());
        assert_eq!(bitmap.free_count(), 2);
    }

    #[test]
    fn out_of_range() {
        let mut bitmap = Bitmap::with_free(10);
        assert!(matches!(
            bitmap.get(10),
            Err(Error::OutOfRange { index: 10, len: 10 })
        ));
        assert!(matches!(
            bitmap.set(64, false),
            Err(Error::OutOfRange { index: 64, len: 10 })
        ));
        assert_eq!(bitmap.free_count(), 10);
    }

    #[test]
    fn find_first_free() {
        let mut bitmap = Bitmap::with_free(20);
        for i in 0..13 {
            bitmap.set(i, false).unwrap();
        }
        assert_eq!(bitmap.find_first_free(), Some(13));

        bitmap.set(4, true).unwrap();
        assert_eq!(bitmap.find_first_free(), Some(4));
    }

    #[test]
    fn alloc_until_exhausted() {
        let mut bitmap = Bitmap::with_free(11);
        for i in 0..11 {
            assert_eq!(bitmap.alloc(), Some(i));
        }
        assert_eq!(bitmap.alloc(), None);
        assert_eq!(bitmap.find_first_free(), None);
        assert_eq!(bitmap.free_count(), 0);

        bitmap.dealloc(7).unwrap();
        assert_eq!(bitmap.alloc(), Some(7));
    }

    #[test]
    fn set_is_idempotent() {
        let mut bitmap = Bitmap::new(8);
        bitmap.set(3, true).unwrap();
        bitmap.set(3, true).unwrap();
        assert_eq!(bitmap.free_count(), 1);
        bitmap.set(3, false).unwrap();
        bitmap.set(3, false).unwrap();
        assert_eq!(bitmap.free_count(), 0);
    }

    #[test]
    fn block_ignores_bits_past_len() {
        let mut block = [0; BLOCK_SIZE];
        block[0] = 0xff;
        block[1] = 0xff;
        block[2] = 0xff;

        let bitmap = Bitmap::from_block(&block, 12);
        assert_eq!(bitmap.free_count(), 12);
        assert_eq!(bitmap.to_block()[..3], [0xff, 0xf0, 0x00]);
    }

    #[test]
    fn with_free_masks_tail() {
        let bitmap = Bitmap::with_free(5);
        assert_eq!(bitmap.to_block()[0], 0xf8);
        assert_eq!(bitmap, Bitmap::from_block(&bitmap.to_block(), 5));
    }
}
