//! Serialized feature records and the shard wire format.
//!
//! A shard file is an 8-byte magic/version header followed by
//! length-prefixed records. All integers are little-endian. Each record
//! payload holds the audio reference, the utterance duration, and the
//! encoded label sequence:
//!
//! ```text
//! u32 payload_len
//!   u16 path_len, path (UTF-8)
//!   f32 duration
//!   u32 label_len, label_len * u32 label ids
//! ```

use std::io::{self, Read, Write};
use std::path::PathBuf;

/// Shard file magic and format version.
pub const SHARD_MAGIC: &[u8; 8] = b"VOXREC\x00\x01";

/// Upper bound on a single record payload; anything larger is corrupt.
const MAX_PAYLOAD: u32 = 16 * 1024 * 1024;

/// One serialized training example. Immutable once written.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    /// Reference to the source audio file
    pub audio_path: PathBuf,
    /// Utterance duration in seconds (0.0 when the manifest omitted it)
    pub duration: f32,
    /// Encoded transcript token ids
    pub labels: Vec<u32>,
}

impl Record {
    pub fn label_len(&self) -> usize {
        self.labels.len()
    }

    /// Append this record to a shard stream.
    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        let path = self.audio_path.to_string_lossy();
        let path_bytes = path.as_bytes();
        if path_bytes.len() > u16::MAX as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("audio path is {} bytes, limit {}", path_bytes.len(), u16::MAX),
            ));
        }

        let payload_len = 2 + path_bytes.len() + 4 + 4 + 4 * self.labels.len();

        writer.write_all(&(payload_len as u32).to_le_bytes())?;
        writer.write_all(&(path_bytes.len() as u16).to_le_bytes())?;
        writer.write_all(path_bytes)?;
        writer.write_all(&self.duration.to_le_bytes())?;
        writer.write_all(&(self.labels.len() as u32).to_le_bytes())?;
        for id in &self.labels {
            writer.write_all(&id.to_le_bytes())?;
        }

        Ok(())
    }

    /// Read the next record from a shard stream.
    ///
    /// Returns `Ok(None)` at a clean end of stream. A stream that ends
    /// mid-record or carries an inconsistent payload surfaces as
    /// `InvalidData`/`UnexpectedEof`.
    pub fn read_from(reader: &mut impl Read) -> io::Result<Option<Self>> {
        let mut len_buf = [0u8; 4];
        if !fill_or_eof(reader, &mut len_buf)? {
            return Ok(None);
        }

        let payload_len = u32::from_le_bytes(len_buf);
        if payload_len < 10 || payload_len > MAX_PAYLOAD {
            return Err(invalid_data(format!("payload length {payload_len}")));
        }

        let mut payload = vec![0u8; payload_len as usize];
        reader.read_exact(&mut payload)?;

        Self::parse(&payload).map(Some)
    }

    fn parse(payload: &[u8]) -> io::Result<Self> {
        let mut cursor = Cursor { buf: payload, pos: 0 };

        let path_len = u16::from_le_bytes(cursor.take()?) as usize;
        let path_bytes = cursor.take_slice(path_len)?;
        let path = std::str::from_utf8(path_bytes)
            .map_err(|_| invalid_data("audio path is not UTF-8".to_string()))?;

        let duration = f32::from_le_bytes(cursor.take()?);
        let label_len = u32::from_le_bytes(cursor.take()?) as usize;

        if cursor.remaining() != 4 * label_len {
            return Err(invalid_data(format!(
                "label field claims {label_len} ids, {} bytes remain",
                cursor.remaining()
            )));
        }

        let mut labels = Vec::with_capacity(label_len);
        for _ in 0..label_len {
            labels.push(u32::from_le_bytes(cursor.take()?));
        }

        Ok(Self {
            audio_path: PathBuf::from(path),
            duration,
            labels,
        })
    }
}

/// Write the shard header to a fresh shard file.
pub fn write_header(writer: &mut impl Write) -> io::Result<()> {
    writer.write_all(SHARD_MAGIC)
}

/// Consume and verify the shard header.
pub fn check_header(reader: &mut impl Read) -> io::Result<bool> {
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    Ok(&magic == SHARD_MAGIC)
}

/// Fill `buf` completely, or report a clean EOF before the first byte.
fn fill_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

fn invalid_data(reason: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("corrupt record: {reason}"))
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        let slice = self.take_slice(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn take_slice(&mut self, len: usize) -> io::Result<&'a [u8]> {
        if self.pos + len > self.buf.len() {
            return Err(invalid_data("field overruns payload".to_string()));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(labels: Vec<u32>) -> Record {
        Record {
            audio_path: PathBuf::from("clips/utt_0001.wav"),
            duration: 2.25,
            labels,
        }
    }

    #[test]
    fn writes_and_reads_back_in_order() {
        let mut buf = Vec::new();
        write_header(&mut buf).unwrap();
        let records = vec![
            sample_record(vec![1, 2, 3]),
            sample_record(vec![]),
            sample_record(vec![7; 100]),
        ];
        for record in &records {
            record.write_to(&mut buf).unwrap();
        }

        let mut reader = buf.as_slice();
        assert!(check_header(&mut reader).unwrap());
        for expected in &records {
            let got = Record::read_from(&mut reader).unwrap().unwrap();
            assert_eq!(&got, expected);
        }
        assert!(Record::read_from(&mut reader).unwrap().is_none());
    }

    #[test]
    fn truncated_record_is_an_error() {
        let mut buf = Vec::new();
        sample_record(vec![1, 2, 3]).write_to(&mut buf).unwrap();
        buf.truncate(buf.len() - 2);

        let mut reader = buf.as_slice();
        let err = Record::read_from(&mut reader).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn inconsistent_label_length_is_invalid_data() {
        let mut buf = Vec::new();
        sample_record(vec![1, 2]).write_to(&mut buf).unwrap();
        // claim one extra label without providing its bytes
        let label_count_offset = buf.len() - 2 * 4 - 4;
        buf[label_count_offset..label_count_offset + 4].copy_from_slice(&3u32.to_le_bytes());

        let mut reader = buf.as_slice();
        let err = Record::read_from(&mut reader).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn oversized_path_is_rejected_at_write_time() {
        let record = Record {
            audio_path: PathBuf::from("a".repeat(u16::MAX as usize + 1)),
            duration: 1.0,
            labels: vec![1],
        };

        let mut buf = Vec::new();
        let err = record.write_to(&mut buf).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(buf.is_empty(), "partial record written");
    }

    #[test]
    fn rejects_foreign_header() {
        let mut reader = b"NOTAREC\x01rest".as_slice();

        assert!(!check_header(&mut reader).unwrap());
    }
}
