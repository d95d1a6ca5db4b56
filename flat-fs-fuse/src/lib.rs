//! 在宿主机上以普通文件充当块设备，用于制作与检查 flat-fs 镜像。


use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use block_dev::{BLOCK_SIZE, BlockDevice, BlockStore, DeviceError, check_access};

/// 以宿主文件为镜像的块设备，关闭后文件句柄即被释放
#[derive(Debug)]
pub struct BlockFile {
    inner: Mutex<Option<File>>,
    block_count: usize,
}

impl BlockFile {
    pub fn new(fd: File, block_count: usize) -> Self {
        Self {
            inner: Mutex::new(Some(fd)),
            block_count,
        }
    }

    fn with_file<T>(
        &self,
        block_id: usize,
        buf_len: usize,
        f: impl FnOnce(&mut File) -> io::Result<T>,
    ) -> Result<T, DeviceError> {
        let mut inner = self.inner.lock().map_err(backend)?;
        let file = inner.as_mut().ok_or(DeviceError::NotOpen)?;
        check_access(true, block_id, self.block_count, buf_len)?;
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .map_err(backend)?;
        f(file).map_err(backend)
    }
}

impl BlockDevice for BlockFile {
    #[inline]
    fn block_count(&self) -> usize {
        self.block_count
    }

    fn is_open(&self) -> bool {
        self.inner.lock().is_ok_and(|inner| inner.is_some())
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), DeviceError> {
        self.with_file(block_id, buf.len(), |file| file.read_exact(buf))
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), DeviceError> {
        self.with_file(block_id, buf.len(), |file| file.write_all(buf))
    }

    fn close(&self) -> Result<(), DeviceError> {
        let file = self
            .inner
            .lock()
            .map_err(backend)?
            .take()
            .ok_or(DeviceError::NotOpen)?;
        file.sync_all().map_err(backend)
    }
}

/// 宿主目录下的一组镜像文件
#[derive(Debug, Clone)]
pub struct HostStore {
    dir: PathBuf,
    /// 新建镜像的块数；已有镜像的块数由文件长度决定
    block_count: usize,
}

impl HostStore {
    pub fn new(dir: impl AsRef<Path>, block_count: usize) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            block_count,
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl BlockStore for HostStore {
    fn create_store(&self, name: &str) -> Result<(), DeviceError> {
        let fd = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.path(name))
            .map_err(backend)?;
        fd.set_len((self.block_count * BLOCK_SIZE) as u64)
            .map_err(backend)?;

        log::debug!("created image {:?}", self.path(name));
        Ok(())
    }

    fn open_store(&self, name: &str) -> Result<Arc<dyn BlockDevice>, DeviceError> {
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.path(name))
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => DeviceError::NotFound(name.to_string()),
                _ => backend(e),
            })?;
        let block_count = fd.metadata().map_err(backend)?.len() as usize / BLOCK_SIZE;

        Ok(Arc::new(BlockFile::new(fd, block_count)))
    }
}

fn backend(e: impl Display) -> DeviceError {
    DeviceError::Backend(e.to_string())
}
