use super::{tag, ticks_from_datetime};
use crate::error::{AuditError, AuditResult};
use crate::record::{encode_data, encode_error, MessageRecord};
use courier_core::ContentSerializer;
use parking_lot::Mutex;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

fn push_chunk(frame: &mut Vec<u8>, tag: u8, body: &[u8]) -> AuditResult<()> {
    let length = u32::try_from(body.len())
        .map_err(|_| AuditError::malformed(format!("chunk 0x{tag:02x} exceeds 4 GiB")))?;
    frame.push(tag);
    frame.extend_from_slice(&length.to_le_bytes());
    frame.extend_from_slice(body);
    Ok(())
}

/// Encodes one record as a complete frame.
///
/// # Errors
///
/// Returns `AuditError::Serialization` if data or error details cannot be
/// encoded, and `AuditError::MalformedFrame` for chunks over 4 GiB or a
/// creation time outside the tick range.
pub fn encode_frame(
    record: &MessageRecord,
    serializer: &dyn ContentSerializer,
) -> AuditResult<Vec<u8>> {
    let mut frame = Vec::with_capacity(64 + record.content_type.len() + record.content.len());
    frame.push(tag::BEGIN_MESSAGE);

    push_chunk(&mut frame, tag::ID, &record.id.to_bytes_le())?;
    push_chunk(&mut frame, tag::TYPE, &[record.kind.as_byte()])?;
    push_chunk(&mut frame, tag::CONTENT_TYPE, record.content_type.as_bytes())?;
    push_chunk(&mut frame, tag::CONTENT, &record.content)?;
    if let Some(data) = encode_data(&record.data, serializer)? {
        push_chunk(&mut frame, tag::DATA, &data)?;
    }
    let created_at = ticks_from_datetime(record.created_at).ok_or_else(|| {
        AuditError::malformed(format!("created_at {} is outside the tick range", record.created_at))
    })?;
    push_chunk(&mut frame, tag::CREATED_AT, &created_at.to_le_bytes())?;
    push_chunk(
        &mut frame,
        tag::EXECUTION_DURATION,
        &record.duration_millis().to_le_bytes(),
    )?;
    push_chunk(&mut frame, tag::STATUS, &[record.status.as_byte()])?;

    if let Some(error) = &record.error {
        push_chunk(&mut frame, tag::ERROR_DETAILS, &encode_error(error, serializer)?)?;
        push_chunk(&mut frame, tag::ERROR_MESSAGE, error.message.as_bytes())?;
        push_chunk(&mut frame, tag::ERROR_TYPE, error.error_type.as_bytes())?;
    }

    frame.push(tag::END_MESSAGE);
    Ok(frame)
}

/// Appends record frames to a byte stream.
///
/// One writer may be shared between threads; each frame is written under a
/// lock so concurrent writers never interleave chunks.
pub struct MessageRecordWriter<W> {
    inner: Mutex<W>,
    serializer: Arc<dyn ContentSerializer>,
}

impl<W: Write> MessageRecordWriter<W> {
    /// Creates a writer over `inner`.
    pub fn new(inner: W, serializer: Arc<dyn ContentSerializer>) -> Self {
        Self {
            inner: Mutex::new(inner),
            serializer,
        }
    }

    /// Writes one record frame.
    ///
    /// # Errors
    ///
    /// Returns encoding errors from [`encode_frame`] and I/O errors from the
    /// stream.
    pub fn write(&self, record: &MessageRecord) -> AuditResult<()> {
        let frame = encode_frame(record, self.serializer.as_ref())?;
        let mut inner = self.inner.lock();
        inner.write_all(&frame)?;
        Ok(())
    }

    /// Flushes the underlying stream.
    ///
    /// # Errors
    ///
    /// Returns the stream's I/O error.
    pub fn flush(&self) -> AuditResult<()> {
        self.inner.lock().flush()?;
        Ok(())
    }

    /// Returns the underlying stream.
    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

impl<W> fmt::Debug for MessageRecordWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageRecordWriter")
            .field("serializer", &self.serializer.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{ErrorDescription, JsonContentSerializer, MessageKind, ProcessingStatus};
    use uuid::Uuid;

    #[test]
    fn test_frame_layout() {
        let id = Uuid::parse_str("00112233-4455-6677-8899-aabbccddeeff").unwrap();
        let record = MessageRecord::new(id, MessageKind::Event, "Ping")
            .with_content(b"{}".to_vec())
            .with_status(ProcessingStatus::Completed);
        let frame = encode_frame(&record, &JsonContentSerializer).unwrap();

        assert_eq!(frame[0], tag::BEGIN_MESSAGE);
        assert_eq!(*frame.last().unwrap(), tag::END_MESSAGE);

        assert_eq!(frame[1], tag::ID);
        assert_eq!(&frame[2..6], &16_u32.to_le_bytes());
        assert_eq!(
            &frame[6..22],
            &[
                0x33, 0x22, 0x11, 0x00, 0x55, 0x44, 0x77, 0x66, 0x88, 0x99, 0xaa, 0xbb, 0xcc,
                0xdd, 0xee, 0xff
            ]
        );

        assert_eq!(&frame[22..28], &[tag::TYPE, 1, 0, 0, 0, 3]);
        assert_eq!(&frame[28..37], &[tag::CONTENT_TYPE, 4, 0, 0, 0, b'P', b'i', b'n', b'g']);
    }

    #[test]
    fn test_error_chunks_only_when_failed() {
        let ok = MessageRecord::new(Uuid::nil(), MessageKind::Command, "A");
        let frame = encode_frame(&ok, &JsonContentSerializer).unwrap();
        assert!(!frame.windows(5).any(|w| w == [tag::ERROR_TYPE, 1, 0, 0, 0]));

        let failed = ok
            .with_status(ProcessingStatus::Failed)
            .with_error(ErrorDescription::new("E", "boom"));
        let frame = encode_frame(&failed, &JsonContentSerializer).unwrap();
        let n = frame.len();
        assert_eq!(&frame[n - 7..n - 1], &[tag::ERROR_TYPE, 1, 0, 0, 0, b'E']);
    }

    #[test]
    fn test_unrepresentable_creation_time_is_refused() {
        let record = MessageRecord::new(Uuid::nil(), MessageKind::Command, "A")
            .with_created_at(chrono::DateTime::<chrono::Utc>::MAX_UTC);
        let error = encode_frame(&record, &JsonContentSerializer).unwrap_err();
        assert!(error.is_malformed());

        let writer = MessageRecordWriter::new(Vec::new(), Arc::new(JsonContentSerializer));
        assert!(writer.write(&record).unwrap_err().is_malformed());
        assert!(writer.into_inner().is_empty());
    }
}
