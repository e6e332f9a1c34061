use super::MessageRepository;
use crate::error::AuditResult;
use crate::query::MessageQuery;
use crate::record::MessageRecord;
use parking_lot::RwLock;

/// Keeps records in memory, in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryMessageRepository {
    records: RwLock<Vec<MessageRecord>>,
}

impl InMemoryMessageRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns `true` if nothing was stored yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl MessageRepository for InMemoryMessageRepository {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn add(&self, record: &MessageRecord) -> AuditResult<()> {
        self.records.write().push(record.clone());
        Ok(())
    }

    fn get(&self, query: &MessageQuery) -> AuditResult<Vec<MessageRecord>> {
        query.apply(self.records.read().iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{MessageKind, ProcessingStatus};
    use std::sync::Arc;
    use std::thread;
    use uuid::Uuid;

    #[test]
    fn test_add_never_deduplicates() {
        let repository = InMemoryMessageRepository::new();
        let record = MessageRecord::new(Uuid::now_v7(), MessageKind::Event, "Shipped");
        repository.add(&record).unwrap();
        repository.add(&record).unwrap();
        assert_eq!(repository.len(), 2);
        assert_eq!(repository.get(&MessageQuery::new().id(record.id)).unwrap().len(), 2);
    }

    #[test]
    fn test_get_filters_in_insertion_order() {
        let repository = InMemoryMessageRepository::new();
        for (i, status) in [
            ProcessingStatus::Completed,
            ProcessingStatus::Failed,
            ProcessingStatus::Failed,
        ]
        .into_iter()
        .enumerate()
        {
            let record = MessageRecord::new(Uuid::now_v7(), MessageKind::Command, format!("m{i}"))
                .with_status(status);
            repository.add(&record).unwrap();
        }
        let failed = repository
            .get(&MessageQuery::new().status(ProcessingStatus::Failed))
            .unwrap();
        let names: Vec<_> = failed.iter().map(|r| r.content_type.as_str()).collect();
        assert_eq!(names, vec!["m1", "m2"]);
    }

    #[test]
    fn test_concurrent_adds() {
        let repository = Arc::new(InMemoryMessageRepository::new());
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let repository = Arc::clone(&repository);
                thread::spawn(move || {
                    for _ in 0..25 {
                        let record = MessageRecord::new(Uuid::now_v7(), MessageKind::Event, "e");
                        repository.add(&record).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(repository.len(), 100);
    }
}
