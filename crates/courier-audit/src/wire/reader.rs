use super::{datetime_from_ticks, tag};
use crate::error::{AuditError, AuditResult};
use crate::record::{decode_data, decode_error, MessageRecord};
use courier_core::{
    ContentSerializer, ContentTypeRegistry, MessageData, MessageKind, ProcessingStatus,
};
use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

type Chunk = (u8, Vec<u8>);

fn fixed<const N: usize>(body: &[u8], chunk: &str) -> AuditResult<[u8; N]> {
    <[u8; N]>::try_from(body).map_err(|_| {
        AuditError::malformed(format!("{chunk} chunk has {} bytes, expected {N}", body.len()))
    })
}

fn utf8(body: Vec<u8>, chunk: &str) -> AuditResult<String> {
    String::from_utf8(body).map_err(|_| AuditError::malformed(format!("{chunk} chunk is not UTF-8")))
}

/// Reads record frames from a byte stream.
///
/// The reader is a lazy sequential scan:
///
/// - bytes before a `BeginMessage` marker are discarded
/// - each complete frame yields one record
/// - a frame that is cut off by the end of the stream yields nothing
/// - a complete but malformed frame yields `AuditError::MalformedFrame` and
///   the scan continues with the next frame
/// - an I/O error is yielded once and ends the scan
///
/// With a content-type registry, payloads of registered types are
/// reconstituted into [`MessageRecord::payload`].
pub struct MessageRecordReader<R> {
    inner: R,
    serializer: Arc<dyn ContentSerializer>,
    content_types: Option<Arc<ContentTypeRegistry>>,
    done: bool,
}

impl<R: Read> MessageRecordReader<R> {
    /// Creates a reader over `inner`.
    pub fn new(inner: R, serializer: Arc<dyn ContentSerializer>) -> Self {
        Self {
            inner,
            serializer,
            content_types: None,
            done: false,
        }
    }

    /// Reconstitutes payloads of the registered content types.
    #[must_use]
    pub fn with_content_types(mut self, content_types: Arc<ContentTypeRegistry>) -> Self {
        self.content_types = Some(content_types);
        self
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0_u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Reads exactly `len` bytes, or `None` if the stream ends first.
    fn read_body(&mut self, len: usize) -> io::Result<Option<Vec<u8>>> {
        let mut body = Vec::with_capacity(len.min(64 * 1024));
        (&mut self.inner).take(len as u64).read_to_end(&mut body)?;
        Ok((body.len() == len).then_some(body))
    }

    fn next_frame(&mut self) -> io::Result<Option<Vec<Chunk>>> {
        let mut skipped = 0_usize;
        loop {
            match self.read_byte()? {
                None => return Ok(None),
                Some(tag::BEGIN_MESSAGE) => break,
                Some(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            tracing::debug!(skipped, "discarded bytes before frame");
        }

        let mut chunks = Vec::new();
        loop {
            let Some(code) = self.read_byte()? else {
                tracing::debug!(chunks = chunks.len(), "incomplete frame at end of stream");
                return Ok(None);
            };
            match code {
                tag::END_MESSAGE => return Ok(Some(chunks)),
                tag::BEGIN_MESSAGE => {
                    tracing::debug!(chunks = chunks.len(), "frame restarted before its end marker");
                    chunks.clear();
                }
                _ => {
                    let Some(length) = self.read_body(4)? else {
                        return Ok(None);
                    };
                    let length = u32::from_le_bytes([length[0], length[1], length[2], length[3]]);
                    let Some(body) = self.read_body(length as usize)? else {
                        tracing::debug!(tag = code, length, "incomplete chunk at end of stream");
                        return Ok(None);
                    };
                    chunks.push((code, body));
                }
            }
        }
    }

    fn build(&self, chunks: Vec<Chunk>) -> AuditResult<MessageRecord> {
        let mut id = None;
        let mut kind = MessageKind::Unknown;
        let mut content_type = String::new();
        let mut content = Vec::new();
        let mut data = MessageData::new();
        let mut created_at = None;
        let mut duration = Duration::ZERO;
        let mut status = ProcessingStatus::NotInitialized;
        let mut details = None;
        let mut error_message = None;
        let mut error_type = None;

        for (code, body) in chunks {
            match code {
                tag::ID => id = Some(Uuid::from_bytes_le(fixed::<16>(&body, "Id")?)),
                tag::TYPE => kind = MessageKind::from_byte(fixed::<1>(&body, "Type")?[0]),
                tag::CONTENT_TYPE => content_type = utf8(body, "ContentType")?,
                tag::CONTENT => content = body,
                tag::DATA => data = decode_data(&body, self.serializer.as_ref())?,
                tag::CREATED_AT => {
                    let ticks = i64::from_le_bytes(fixed::<8>(&body, "CreatedAt")?);
                    created_at = Some(
                        datetime_from_ticks(ticks)
                            .ok_or_else(|| AuditError::malformed("CreatedAt is out of range"))?,
                    );
                }
                tag::EXECUTION_DURATION => {
                    let millis = i32::from_le_bytes(fixed::<4>(&body, "ExecutionDuration")?);
                    duration = Duration::from_millis(u64::try_from(millis).unwrap_or(0));
                }
                tag::STATUS => {
                    let byte = fixed::<1>(&body, "Status")?[0];
                    status = ProcessingStatus::from_byte(byte)
                        .ok_or_else(|| AuditError::malformed(format!("unknown status {byte}")))?;
                }
                tag::ERROR_DETAILS => details = Some(body),
                tag::ERROR_MESSAGE => error_message = Some(utf8(body, "ErrorMessage")?),
                tag::ERROR_TYPE => error_type = Some(utf8(body, "ErrorType")?),
                other => tracing::trace!(tag = other, "skipping unknown chunk"),
            }
        }

        let id = id.ok_or_else(|| AuditError::malformed("frame has no Id chunk"))?;
        let error = decode_error(
            details.as_deref(),
            error_type,
            error_message,
            self.serializer.as_ref(),
        )?;

        let mut record = MessageRecord {
            id,
            kind,
            content_type,
            content,
            payload: None,
            data,
            created_at: created_at.unwrap_or_default(),
            execution_duration: duration,
            status,
            error,
        };
        self.reconstitute(&mut record);
        Ok(record)
    }

    fn reconstitute(&self, record: &mut MessageRecord) {
        let Some(content_types) = &self.content_types else {
            return;
        };
        if !content_types.contains(&record.content_type) {
            return;
        }
        match record.decode_payload(content_types, self.serializer.as_ref()) {
            Ok(payload) => record.payload = Some(Arc::from(payload)),
            Err(e) => tracing::warn!(
                message_id = %record.id,
                content_type = %record.content_type,
                error = %e,
                "payload left undecoded"
            ),
        }
    }
}

impl<R: Read> Iterator for MessageRecordReader<R> {
    type Item = AuditResult<MessageRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_frame() {
            Ok(Some(chunks)) => Some(self.build(chunks)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(AuditError::Io(e)))
            }
        }
    }
}

impl<R: Read> std::iter::FusedIterator for MessageRecordReader<R> {}

impl<R> fmt::Debug for MessageRecordReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageRecordReader")
            .field("serializer", &self.serializer.name())
            .field("content_types", &self.content_types.as_ref().map(|c| c.len()))
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{encode_frame, MessageRecordWriter};
    use courier_core::{ErrorDescription, JsonContentSerializer};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Ping {
        seq: u32,
    }

    fn serializer() -> Arc<dyn ContentSerializer> {
        Arc::new(JsonContentSerializer)
    }

    fn record(content_type: &str) -> MessageRecord {
        let mut data = MessageData::new();
        data.insert("origin".into(), "test".into());
        MessageRecord::new(Uuid::now_v7(), MessageKind::Event, content_type)
            .with_content(br#"{"seq":1}"#.to_vec())
            .with_data(data)
            .with_execution_duration(Duration::from_millis(42))
    }

    fn frames(records: &[MessageRecord]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for record in records {
            bytes.extend(encode_frame(record, &JsonContentSerializer).unwrap());
        }
        bytes
    }

    fn read_all(bytes: &[u8]) -> Vec<MessageRecord> {
        MessageRecordReader::new(bytes, serializer())
            .collect::<AuditResult<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_round_trip() {
        let failed = record("Ping")
            .with_status(ProcessingStatus::Failed)
            .with_error(ErrorDescription {
                error_type: "Timeout".into(),
                message: "gave up".into(),
                chain: vec!["socket closed".into()],
            });
        let originals = vec![record("Ping"), failed];
        let read = read_all(&frames(&originals));

        assert_eq!(read.len(), 2);
        for (original, read) in originals.iter().zip(&read) {
            assert_eq!(read.id, original.id);
            assert_eq!(read.kind, original.kind);
            assert_eq!(read.content_type, original.content_type);
            assert_eq!(read.content, original.content);
            assert_eq!(read.data, original.data);
            assert_eq!(read.created_at, original.created_at);
            assert_eq!(read.execution_duration, original.execution_duration);
            assert_eq!(read.status, original.status);
            assert_eq!(read.error, original.error);
        }
        assert_eq!(read[1].error.as_ref().unwrap().chain, vec!["socket closed"]);
    }

    #[test]
    fn test_leading_garbage_is_skipped() {
        let original = record("Ping");
        let mut bytes = vec![0xde, 0xad, 0xbe, 0xef];
        bytes.extend(frames(std::slice::from_ref(&original)));
        let read = read_all(&bytes);
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].id, original.id);
    }

    #[test]
    fn test_truncated_final_frame_is_dropped() {
        let originals = vec![record("A"), record("B")];
        let bytes = frames(&originals);
        let read = read_all(&bytes[..bytes.len() - 3]);
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].content_type, "A");
    }

    #[test]
    fn test_malformed_frame_does_not_stop_the_scan() {
        let mut bytes = vec![tag::BEGIN_MESSAGE, tag::ID, 2, 0, 0, 0, 1, 2, tag::END_MESSAGE];
        bytes.extend(frames(&[record("Good")]));

        let results: Vec<_> = MessageRecordReader::new(bytes.as_slice(), serializer()).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].as_ref().unwrap_err().is_malformed());
        assert_eq!(results[1].as_ref().unwrap().content_type, "Good");
    }

    #[test]
    fn test_unknown_chunks_are_ignored() {
        let original = record("Ping");
        let mut bytes = frames(std::slice::from_ref(&original));
        let end = bytes.pop().unwrap();
        bytes.extend([0x7f, 3, 0, 0, 0, 9, 9, 9, end]);
        let read = read_all(&bytes);
        assert_eq!(read[0].id, original.id);
    }

    #[test]
    fn test_payload_reconstitution() {
        let mut content_types = ContentTypeRegistry::new();
        content_types.register_as::<Ping>("Ping");
        let bytes = frames(&[record("Ping"), record("Unregistered")]);

        let read: Vec<_> = MessageRecordReader::new(bytes.as_slice(), serializer())
            .with_content_types(Arc::new(content_types))
            .collect::<AuditResult<_>>()
            .unwrap();
        let ping = read[0].payload.as_ref().unwrap();
        assert_eq!(ping.downcast_ref::<Ping>(), Some(&Ping { seq: 1 }));
        assert!(read[1].payload.is_none());
    }

    #[test]
    fn test_concurrent_writers_produce_whole_frames() {
        let writer = Arc::new(MessageRecordWriter::new(Vec::new(), serializer()));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let writer = Arc::clone(&writer);
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        writer.write(&record(&format!("T{i}"))).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let bytes = Arc::try_unwrap(writer).unwrap().into_inner();
        assert_eq!(read_all(&bytes).len(), 80);
    }
}
