use super::MessageRepository;
use crate::error::{AuditError, AuditResult};
use crate::query::MessageQuery;
use crate::record::MessageRecord;
use crate::wire::{encode_frame, MessageRecordReader};
use courier_core::{ContentSerializer, ContentTypeRegistry, JsonContentSerializer};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Appends records as wire frames to one file.
///
/// With gzip enabled every append is written as its own gzip member, so the
/// file stays readable after each `add` and is read back with a multi-member
/// decoder. Reading a file that does not exist yet returns no records.
/// Malformed frames are logged and skipped.
pub struct FileMessageRepository {
    path: PathBuf,
    gzip: bool,
    serializer: Arc<dyn ContentSerializer>,
    content_types: Option<Arc<ContentTypeRegistry>>,
    append: Mutex<()>,
}

impl FileMessageRepository {
    /// Creates an uncompressed repository at `path` using JSON content.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            gzip: false,
            serializer: Arc::new(JsonContentSerializer),
            content_types: None,
            append: Mutex::new(()),
        }
    }

    /// Enables or disables gzip compression.
    #[must_use]
    pub fn with_gzip(mut self, gzip: bool) -> Self {
        self.gzip = gzip;
        self
    }

    /// Replaces the content serializer.
    #[must_use]
    pub fn with_serializer(mut self, serializer: Arc<dyn ContentSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Reconstitutes payloads of the registered content types on read.
    #[must_use]
    pub fn with_content_types(mut self, content_types: Arc<ContentTypeRegistry>) -> Self {
        self.content_types = Some(content_types);
        self
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_reader(&self) -> AuditResult<Option<Box<dyn Read>>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let file = BufReader::new(file);
        Ok(Some(if self.gzip {
            Box::new(MultiGzDecoder::new(file))
        } else {
            Box::new(file)
        }))
    }
}

impl MessageRepository for FileMessageRepository {
    fn name(&self) -> &'static str {
        "file"
    }

    fn add(&self, record: &MessageRecord) -> AuditResult<()> {
        let frame = encode_frame(record, self.serializer.as_ref())?;

        let _guard = self.append.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        if self.gzip {
            let mut encoder = GzEncoder::new(&mut file, Compression::default());
            encoder.write_all(&frame)?;
            encoder.finish()?;
        } else {
            file.write_all(&frame)?;
        }
        file.flush()?;

        debug!(
            message_id = %record.id,
            path = %self.path.display(),
            bytes = frame.len(),
            "Appended audit frame"
        );
        Ok(())
    }

    fn get(&self, query: &MessageQuery) -> AuditResult<Vec<MessageRecord>> {
        let Some(input) = self.open_reader()? else {
            return Ok(Vec::new());
        };
        let compiled = query.compile()?;
        let mut reader = MessageRecordReader::new(input, Arc::clone(&self.serializer));
        if let Some(content_types) = &self.content_types {
            reader = reader.with_content_types(Arc::clone(content_types));
        }

        let take = query.take.unwrap_or(usize::MAX);
        let mut skipped = 0;
        let mut found = Vec::new();
        for item in reader {
            if found.len() >= take {
                break;
            }
            let record = match item {
                Ok(record) => record,
                Err(e) if e.is_malformed() => {
                    warn!(path = %self.path.display(), error = %e, "Skipping malformed audit frame");
                    continue;
                }
                Err(AuditError::Io(e)) if self.gzip && e.kind() == io::ErrorKind::UnexpectedEof => {
                    warn!(path = %self.path.display(), "Audit file ends in a truncated gzip member");
                    break;
                }
                Err(e) => return Err(e),
            };
            if !compiled.matches(&record) {
                continue;
            }
            if skipped < query.skip {
                skipped += 1;
                continue;
            }
            found.push(record);
        }
        Ok(found)
    }
}

impl std::fmt::Debug for FileMessageRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileMessageRepository")
            .field("path", &self.path)
            .field("gzip", &self.gzip)
            .field("serializer", &self.serializer.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{ErrorDescription, MessageKind, ProcessingStatus};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Shipped {
        order: u32,
    }

    fn record(order: u32) -> MessageRecord {
        MessageRecord::new(Uuid::now_v7(), MessageKind::Event, "shipped")
            .with_content(format!(r#"{{"order":{order}}}"#).into_bytes())
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repository = FileMessageRepository::new(dir.path().join("absent.log"));
        assert!(repository.get(&MessageQuery::new()).unwrap().is_empty());
    }

    #[test]
    fn test_append_and_read_back() {
        for gzip in [false, true] {
            let dir = tempfile::tempdir().unwrap();
            let repository =
                FileMessageRepository::new(dir.path().join("audit.log")).with_gzip(gzip);
            for order in 0..5 {
                repository.add(&record(order)).unwrap();
            }
            let failed = record(9)
                .with_status(ProcessingStatus::Failed)
                .with_error(ErrorDescription::new("Lost", "gone"));
            repository.add(&failed).unwrap();

            let all = repository.get(&MessageQuery::new()).unwrap();
            assert_eq!(all.len(), 6, "gzip = {gzip}");
            assert_eq!(all[5].error, failed.error);

            let page = repository.get(&MessageQuery::new().skip(1).take(2)).unwrap();
            assert_eq!(page[0].content, br#"{"order":1}"#.to_vec());
            assert_eq!(page.len(), 2);
        }
    }

    #[test]
    fn test_reopened_repository_sees_earlier_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.gz");
        FileMessageRepository::new(&path)
            .with_gzip(true)
            .add(&record(1))
            .unwrap();
        let reopened = FileMessageRepository::new(&path).with_gzip(true);
        reopened.add(&record(2)).unwrap();
        assert_eq!(reopened.get(&MessageQuery::new()).unwrap().len(), 2);
    }

    #[test]
    fn test_skips_garbage_between_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let repository = FileMessageRepository::new(&path);
        repository.add(&record(1)).unwrap();
        OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"noise")
            .unwrap();
        repository.add(&record(2)).unwrap();
        assert_eq!(repository.get(&MessageQuery::new()).unwrap().len(), 2);
    }

    #[test]
    fn test_payload_reconstitution() {
        let dir = tempfile::tempdir().unwrap();
        let mut content_types = ContentTypeRegistry::new();
        content_types.register_as::<Shipped>("shipped");
        let repository = FileMessageRepository::new(dir.path().join("audit.log"))
            .with_content_types(Arc::new(content_types));
        repository.add(&record(4)).unwrap();

        let found = repository.get(&MessageQuery::new()).unwrap();
        let payload = found[0].payload.as_ref().unwrap();
        assert_eq!(payload.downcast_ref::<Shipped>(), Some(&Shipped { order: 4 }));
    }
}
