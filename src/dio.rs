//! dio — обёртка над файлом/блочным устройством с прямым позиционным I/O.
//!
//! Контракт: offset и длина буфера кратны BLOCK_SIZE. Файл открывается с
//! O_DIRECT, если платформа/ФС его поддерживают (иначе тихий fallback на
//! буферизованный режим — контракт выравнивания тот же). Буфер вызывающего,
//! не выровненный в памяти до BLOCK_SIZE, обслуживается через bounce-буфер
//! AlignedBuf той же длины.

use anyhow::{anyhow, Context, Result};
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::fs::{File, OpenOptions};
use std::ops::{Deref, DerefMut};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use crate::consts::BLOCK_SIZE;

/// Кусок кучи, выровненный до BLOCK_SIZE (аналог directio.AlignedBlock).
pub struct AlignedBuf {
    ptr: *mut u8,
    len: usize,
    layout: Layout,
}

impl AlignedBuf {
    /// Выделить обнулённый буфер длиной `len` (кратной BLOCK_SIZE).
    pub fn zeroed(len: usize) -> Self {
        assert!(len > 0 && len % BLOCK_SIZE == 0, "AlignedBuf len {}", len);
        let layout = Layout::from_size_align(len, BLOCK_SIZE).expect("layout");
        // Единственный unsafe в крейте: выровненная аллокация для DMA.
        let ptr = unsafe { alloc_zeroed(layout) };
        assert!(!ptr.is_null(), "aligned alloc of {} bytes failed", len);
        Self { ptr, len, layout }
    }
}

impl Deref for AlignedBuf {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

impl DerefMut for AlignedBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr, self.layout) };
    }
}

// Буфер не содержит ссылок, владеет памятью целиком.
unsafe impl Send for AlignedBuf {}

#[inline]
fn mem_aligned(buf: &[u8]) -> bool {
    (buf.as_ptr() as usize) % BLOCK_SIZE == 0
}

/// Файл с выровненным позиционным чтением/записью.
pub struct DirectFile {
    file: File,
    path: PathBuf,
}

impl DirectFile {
    /// Открыть backing object на чтение/запись. O_DIRECT — best-effort:
    /// tmpfs и часть ФС его не принимают, тогда открываем без флага.
    pub fn open(path: &Path) -> Result<Self> {
        let file = Self::open_direct(path)
            .or_else(|_| OpenOptions::new().read(true).write(true).open(path))
            .with_context(|| format!("cannot open {}", path.display()))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    #[cfg(unix)]
    fn open_direct(path: &Path) -> std::io::Result<File> {
        use std::os::unix::fs::OpenOptionsExt;
        OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_DIRECT)
            .open(path)
    }

    #[cfg(not(unix))]
    fn open_direct(path: &Path) -> std::io::Result<File> {
        OpenOptions::new().read(true).write(true).open(path)
    }

    /// Размер backing object в байтах.
    pub fn size(&self) -> Result<u64> {
        let md = self
            .file
            .metadata()
            .with_context(|| format!("cannot stat {}", self.path.display()))?;
        Ok(md.len())
    }

    fn check_span(&self, len: usize, offset: u64) -> Result<()> {
        if len % BLOCK_SIZE != 0 || offset % BLOCK_SIZE as u64 != 0 {
            return Err(anyhow!(
                "unaligned I/O span ({} B at {}) on {}",
                len,
                offset,
                self.path.display()
            ));
        }
        Ok(())
    }

    /// Прочитать ровно buf.len() байт с позиции offset.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        self.check_span(buf.len(), offset)?;
        if mem_aligned(buf) {
            self.file.read_exact_at(buf, offset).with_context(|| {
                format!(
                    "read {} B at offset {} from {}",
                    buf.len(),
                    offset,
                    self.path.display()
                )
            })?;
            return Ok(());
        }
        let mut abuf = AlignedBuf::zeroed(buf.len());
        self.file.read_exact_at(&mut abuf, offset).with_context(|| {
            format!(
                "read {} B at offset {} from {}",
                buf.len(),
                offset,
                self.path.display()
            )
        })?;
        buf.copy_from_slice(&abuf);
        Ok(())
    }

    /// Записать весь buf по позиции offset.
    pub fn write_at(&self, buf: &[u8], offset: u64) -> Result<()> {
        self.check_span(buf.len(), offset)?;
        if mem_aligned(buf) {
            self.file.write_all_at(buf, offset).with_context(|| {
                format!(
                    "write {} B at offset {} to {}",
                    buf.len(),
                    offset,
                    self.path.display()
                )
            })?;
            return Ok(());
        }
        let mut abuf = AlignedBuf::zeroed(buf.len());
        abuf.copy_from_slice(buf);
        self.file.write_all_at(&abuf, offset).with_context(|| {
            format!(
                "write {} B at offset {} to {}",
                buf.len(),
                offset,
                self.path.display()
            )
        })?;
        Ok(())
    }

    /// Сбросить данные и метаданные файла на носитель.
    pub fn sync(&self) -> Result<()> {
        self.file
            .sync_all()
            .with_context(|| format!("cannot sync {}", self.path.display()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_buf_is_aligned_and_zeroed() {
        let buf = AlignedBuf::zeroed(BLOCK_SIZE * 2);
        assert_eq!(buf.len(), BLOCK_SIZE * 2);
        assert_eq!((buf.as_ptr() as usize) % BLOCK_SIZE, 0);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn rw_roundtrip_with_unaligned_caller_buf() -> Result<()> {
        let path = std::env::temp_dir().join(format!(
            "thinvol-dio-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let f = std::fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)?;
        f.set_len(BLOCK_SIZE as u64 * 4)?;
        drop(f);

        let df = DirectFile::open(&path)?;
        // Vec<u8> почти наверняка не выровнен до 4096 — идёт через bounce.
        let data = vec![0xA5u8; BLOCK_SIZE];
        df.write_at(&data, BLOCK_SIZE as u64)?;
        let mut back = vec![0u8; BLOCK_SIZE];
        df.read_at(&mut back, BLOCK_SIZE as u64)?;
        assert_eq!(back, data);

        df.sync()?;
        let err = df.read_at(&mut back, 7).unwrap_err();
        assert!(err.to_string().contains("unaligned"));

        std::fs::remove_file(&path)?;
        Ok(())
    }
}
