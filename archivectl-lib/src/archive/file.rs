//! A polymorphic file abstraction over plain, gzip, zstd, and piped-process
//! variants, so the rest of the archive code never needs to know which
//! compression (if any) backs a given segment.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use super::error::ArchiveError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    ReadWrite,
    CreateTruncate,
}

/// The operations every archive file variant supports. `lseek` is
/// unsupported on the piped-process variant, since its handle is a pipe to
/// an external process's stdin/stdout.
pub trait ArchiveFile {
    fn open(&mut self, mode: OpenMode) -> Result<(), ArchiveError>;
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ArchiveError>;
    fn write(&mut self, buf: &[u8]) -> Result<usize, ArchiveError>;
    fn lseek(&mut self, pos: SeekFrom) -> Result<u64, ArchiveError>;
    fn fsync(&mut self) -> Result<(), ArchiveError>;
    fn rename(&mut self, to: &Path) -> Result<(), ArchiveError>;
    fn remove(&mut self) -> Result<(), ArchiveError>;
    fn close(&mut self) -> Result<(), ArchiveError>;
    fn size(&self) -> Result<u64, ArchiveError>;
    fn is_open(&self) -> bool;
}

pub struct PlainFile {
    path: PathBuf,
    handle: Option<File>,
}

impl PlainFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), handle: None }
    }
}

impl ArchiveFile for PlainFile {
    fn open(&mut self, mode: OpenMode) -> Result<(), ArchiveError> {
        let mut options = OpenOptions::new();
        match mode {
            OpenMode::Read => {
                options.read(true);
            }
            OpenMode::Write => {
                options.write(true).create(true);
            }
            OpenMode::ReadWrite => {
                options.read(true).write(true).create(true);
            }
            OpenMode::CreateTruncate => {
                options.write(true).create(true).truncate(true);
            }
        }
        self.handle = Some(options.open(&self.path)?);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ArchiveError> {
        Ok(self.handle.as_mut().expect("open() first").read(buf)?)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, ArchiveError> {
        Ok(self.handle.as_mut().expect("open() first").write(buf)?)
    }

    fn lseek(&mut self, pos: SeekFrom) -> Result<u64, ArchiveError> {
        Ok(self.handle.as_mut().expect("open() first").seek(pos)?)
    }

    fn fsync(&mut self) -> Result<(), ArchiveError> {
        self.handle.as_ref().expect("open() first").sync_all()?;
        Ok(())
    }

    fn rename(&mut self, to: &Path) -> Result<(), ArchiveError> {
        fs::rename(&self.path, to)?;
        self.path = to.to_path_buf();
        Ok(())
    }

    fn remove(&mut self) -> Result<(), ArchiveError> {
        self.handle = None;
        fs::remove_file(&self.path)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), ArchiveError> {
        self.handle = None;
        Ok(())
    }

    fn size(&self) -> Result<u64, ArchiveError> {
        Ok(fs::metadata(&self.path)?.len())
    }

    fn is_open(&self) -> bool {
        self.handle.is_some()
    }
}

/// Gzip-compressed file. Reads and writes go through `flate2`; `lseek`
/// reopens and re-streams from the start since gzip streams are not
/// randomly seekable in general — acceptable here because segment files
/// are read front-to-back.
pub struct GzipFile {
    path: PathBuf,
    mode: Option<OpenMode>,
    reader: Option<flate2::read::GzDecoder<File>>,
    writer: Option<flate2::write::GzEncoder<File>>,
}

impl GzipFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), mode: None, reader: None, writer: None }
    }
}

impl ArchiveFile for GzipFile {
    fn open(&mut self, mode: OpenMode) -> Result<(), ArchiveError> {
        match mode {
            OpenMode::Read => {
                let file = File::open(&self.path)?;
                self.reader = Some(flate2::read::GzDecoder::new(file));
            }
            OpenMode::Write | OpenMode::CreateTruncate => {
                let file = OpenOptions::new().write(true).create(true).truncate(true).open(&self.path)?;
                self.writer = Some(flate2::write::GzEncoder::new(file, flate2::Compression::default()));
            }
            OpenMode::ReadWrite => {
                return Err(ArchiveError::Copy("gzip files cannot be opened read-write".into()));
            }
        }
        self.mode = Some(mode);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ArchiveError> {
        Ok(self.reader.as_mut().expect("open() first").read(buf)?)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, ArchiveError> {
        Ok(self.writer.as_mut().expect("open() first").write(buf)?)
    }

    fn lseek(&mut self, pos: SeekFrom) -> Result<u64, ArchiveError> {
        if pos == SeekFrom::Start(0) {
            let mode = self.mode.expect("open() first");
            self.reader = None;
            self.writer = None;
            self.open(mode)?;
            return Ok(0);
        }
        Err(ArchiveError::SeekUnsupportedOnPipe)
    }

    fn fsync(&mut self) -> Result<(), ArchiveError> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    fn rename(&mut self, to: &Path) -> Result<(), ArchiveError> {
        fs::rename(&self.path, to)?;
        self.path = to.to_path_buf();
        Ok(())
    }

    fn remove(&mut self) -> Result<(), ArchiveError> {
        self.close()?;
        fs::remove_file(&self.path)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), ArchiveError> {
        if let Some(mut writer) = self.writer.take() {
            writer.try_finish()?;
        }
        self.reader = None;
        Ok(())
    }

    fn size(&self) -> Result<u64, ArchiveError> {
        super::segment::gzip_isize(&self.path)
    }

    fn is_open(&self) -> bool {
        self.reader.is_some() || self.writer.is_some()
    }
}

/// Zstd-compressed file, analogous to [`GzipFile`].
pub struct ZstdFile {
    path: PathBuf,
    mode: Option<OpenMode>,
    reader: Option<zstd::stream::read::Decoder<'static, io::BufReader<File>>>,
    writer: Option<zstd::stream::write::Encoder<'static, File>>,
}

impl ZstdFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), mode: None, reader: None, writer: None }
    }
}

impl ArchiveFile for ZstdFile {
    fn open(&mut self, mode: OpenMode) -> Result<(), ArchiveError> {
        match mode {
            OpenMode::Read => {
                let file = File::open(&self.path)?;
                self.reader = Some(zstd::stream::read::Decoder::new(file)?);
            }
            OpenMode::Write | OpenMode::CreateTruncate => {
                let file = OpenOptions::new().write(true).create(true).truncate(true).open(&self.path)?;
                self.writer = Some(zstd::stream::write::Encoder::new(file, 0)?);
            }
            OpenMode::ReadWrite => {
                return Err(ArchiveError::Copy("zstd files cannot be opened read-write".into()));
            }
        }
        self.mode = Some(mode);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ArchiveError> {
        Ok(self.reader.as_mut().expect("open() first").read(buf)?)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, ArchiveError> {
        Ok(self.writer.as_mut().expect("open() first").write(buf)?)
    }

    fn lseek(&mut self, pos: SeekFrom) -> Result<u64, ArchiveError> {
        if pos == SeekFrom::Start(0) {
            let mode = self.mode.expect("open() first");
            self.reader = None;
            self.writer = None;
            self.open(mode)?;
            return Ok(0);
        }
        Err(ArchiveError::SeekUnsupportedOnPipe)
    }

    fn fsync(&mut self) -> Result<(), ArchiveError> {
        Ok(())
    }

    fn rename(&mut self, to: &Path) -> Result<(), ArchiveError> {
        fs::rename(&self.path, to)?;
        self.path = to.to_path_buf();
        Ok(())
    }

    fn remove(&mut self) -> Result<(), ArchiveError> {
        self.close()?;
        fs::remove_file(&self.path)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), ArchiveError> {
        if let Some(writer) = self.writer.take() {
            writer.finish()?;
        }
        self.reader = None;
        Ok(())
    }

    fn size(&self) -> Result<u64, ArchiveError> {
        Ok(fs::metadata(&self.path)?.len())
    }

    fn is_open(&self) -> bool {
        self.reader.is_some() || self.writer.is_some()
    }
}

/// Forks an external compressor/decompressor and exposes its stdin or
/// stdout as the file handle. `lseek` is unconditionally unsupported, as
/// the spec requires: a pipe has no notion of a byte offset to seek to.
pub struct PipedFile {
    program: String,
    args: Vec<String>,
    direction: PipeDirection,
    child: Option<Child>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeDirection {
    /// We write to the child's stdin (e.g. piping into `bzip2 -z`).
    ToChildStdin,
    /// We read from the child's stdout (e.g. `bzip2 -dc`).
    FromChildStdout,
}

impl PipedFile {
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>, direction: PipeDirection) -> Self {
        Self { program: program.into(), args, direction, child: None }
    }
}

impl ArchiveFile for PipedFile {
    fn open(&mut self, _mode: OpenMode) -> Result<(), ArchiveError> {
        let (stdin, stdout) = match self.direction {
            PipeDirection::ToChildStdin => (Stdio::piped(), Stdio::inherit()),
            PipeDirection::FromChildStdout => (Stdio::inherit(), Stdio::piped()),
        };
        self.child = Some(
            Command::new(&self.program)
                .args(&self.args)
                .stdin(stdin)
                .stdout(stdout)
                .spawn()?,
        );
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ArchiveError> {
        let child = self.child.as_mut().expect("open() first");
        let stdout = child.stdout.as_mut().expect("opened for FromChildStdout");
        Ok(stdout.read(buf)?)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, ArchiveError> {
        let child = self.child.as_mut().expect("open() first");
        let stdin = child.stdin.as_mut().expect("opened for ToChildStdin");
        Ok(stdin.write(buf)?)
    }

    fn lseek(&mut self, _pos: SeekFrom) -> Result<u64, ArchiveError> {
        Err(ArchiveError::SeekUnsupportedOnPipe)
    }

    fn fsync(&mut self) -> Result<(), ArchiveError> {
        Ok(())
    }

    fn rename(&mut self, _to: &Path) -> Result<(), ArchiveError> {
        Err(ArchiveError::Copy("a piped-process file has no path to rename".into()))
    }

    fn remove(&mut self) -> Result<(), ArchiveError> {
        Err(ArchiveError::Copy("a piped-process file has no path to remove".into()))
    }

    fn close(&mut self) -> Result<(), ArchiveError> {
        if let Some(mut child) = self.child.take() {
            drop(child.stdin.take());
            child.wait()?;
        }
        Ok(())
    }

    fn size(&self) -> Result<u64, ArchiveError> {
        Err(ArchiveError::Copy("a piped-process file has no well-defined size".into()))
    }

    fn is_open(&self) -> bool {
        self.child.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("segment");
        let mut file = PlainFile::new(&path);
        file.open(OpenMode::CreateTruncate).unwrap();
        file.write(b"hello").unwrap();
        file.close().unwrap();

        let mut file = PlainFile::new(&path);
        file.open(OpenMode::Read).unwrap();
        let mut buf = [0u8; 5];
        file.read(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        assert_eq!(file.size().unwrap(), 5);
    }

    #[test]
    fn piped_file_rejects_seek() {
        let mut file = PipedFile::new("cat", vec![], PipeDirection::FromChildStdout);
        assert!(matches!(
            file.lseek(SeekFrom::Start(0)),
            Err(ArchiveError::SeekUnsupportedOnPipe)
        ));
    }
}
