//! Command transport: one named queue per catalog, size- and
//! message-bounded, non-blocking on both ends.
//!
//! There is no POSIX message queue crate in this stack, and none of the
//! other example repos in the retrieval pack pull one in either, so this
//! is built the way the rest of this crate builds cross-process
//! coordination: a plain file, guarded by `flock` (`crate::lock`), holding
//! a bounded list of length-prefixed frames. Producers append; the
//! launcher drains from the front. This preserves the contract in §4.3
//! (bounded capacity, non-blocking try-send/try-receive) without
//! fabricating a dependency the corpus never reaches for.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::error::QueueError;

pub const MAX_MESSAGES: usize = 255;
pub const MAX_MESSAGE_BYTES: usize = 255;

pub struct CommandQueue {
    path: PathBuf,
    lock_path: PathBuf,
}

impl CommandQueue {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_name = path.file_name().unwrap_or_default().to_os_string();
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);
        Self { path, lock_path }
    }

    fn with_lock<T>(
        &self,
        body: impl FnOnce(&mut Vec<Vec<u8>>) -> Result<T, QueueError>,
    ) -> Result<T, QueueError> {
        let unlocked = crate::lock::UnlockedFile::try_from(self.lock_path.as_path())
            .map_err(QueueError::Io)?;
        let _locked = unlocked.lock_exclusive().map_err(|errno| {
            QueueError::Io(std::io::Error::from_raw_os_error(errno as i32))
        })?;

        let mut frames = self.read_frames()?;
        let result = body(&mut frames)?;
        self.write_frames(&frames)?;
        Ok(result)
    }

    fn read_frames(&self) -> Result<Vec<Vec<u8>>, QueueError> {
        let mut file = match OpenOptions::new().read(true).open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        let mut frames = Vec::new();
        let mut cursor = 0;
        while cursor + 1 <= bytes.len() {
            let len = bytes[cursor] as usize;
            cursor += 1;
            if cursor + len > bytes.len() {
                break;
            }
            frames.push(bytes[cursor..cursor + len].to_vec());
            cursor += len;
        }
        Ok(frames)
    }

    fn write_frames(&self, frames: &[Vec<u8>]) -> Result<(), QueueError> {
        let mut bytes = Vec::new();
        for frame in frames {
            bytes.push(frame.len() as u8);
            bytes.extend_from_slice(frame);
        }
        let mut file = OpenOptions::new().write(true).create(true).truncate(true).open(&self.path)?;
        file.write_all(&bytes)?;
        file.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    /// Append `message` to the tail. Fails fast (no blocking) if the queue
    /// is full or the message exceeds the per-message size limit.
    pub fn try_send(&self, message: &[u8]) -> Result<(), QueueError> {
        if message.len() > MAX_MESSAGE_BYTES {
            return Err(QueueError::MessageTooLarge(MAX_MESSAGE_BYTES));
        }
        self.with_lock(|frames| {
            if frames.len() >= MAX_MESSAGES {
                return Err(QueueError::QueueFull(MAX_MESSAGES));
            }
            frames.push(message.to_vec());
            Ok(())
        })
    }

    /// Pop the oldest message, or `Err(QueueError::Empty)` if none is
    /// waiting — the launcher treats that as "idle, sleep briefly".
    pub fn try_recv(&self) -> Result<Vec<u8>, QueueError> {
        self.with_lock(|frames| {
            if frames.is_empty() {
                Err(QueueError::Empty)
            } else {
                Ok(frames.remove(0))
            }
        })
    }

    pub fn len(&self) -> Result<usize, QueueError> {
        self.with_lock(|frames| Ok(frames.len()))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_then_recv_is_fifo() {
        let dir = tempfile::tempdir().unwrap();
        let queue = CommandQueue::new(dir.path().join("cmds"));
        queue.try_send(b"first").unwrap();
        queue.try_send(b"second").unwrap();
        assert_eq!(queue.try_recv().unwrap(), b"first");
        assert_eq!(queue.try_recv().unwrap(), b"second");
        assert!(matches!(queue.try_recv(), Err(QueueError::Empty)));
    }

    #[test]
    fn rejects_oversized_message() {
        let dir = tempfile::tempdir().unwrap();
        let queue = CommandQueue::new(dir.path().join("cmds"));
        let big = vec![0u8; MAX_MESSAGE_BYTES + 1];
        assert!(matches!(
            queue.try_send(&big),
            Err(QueueError::MessageTooLarge(_))
        ));
    }

    #[test]
    fn rejects_when_full() {
        let dir = tempfile::tempdir().unwrap();
        let queue = CommandQueue::new(dir.path().join("cmds"));
        for _ in 0..MAX_MESSAGES {
            queue.try_send(b"x").unwrap();
        }
        assert!(matches!(queue.try_send(b"x"), Err(QueueError::QueueFull(_))));
    }
}
