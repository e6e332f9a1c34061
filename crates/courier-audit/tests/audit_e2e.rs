//! Audit trail tests over real pipelines.
//!
//! Commands run through the default chain with the audit stage appended,
//! then the records are read back from the repository.

use courier_audit::export::to_csv_string;
use courier_audit::wire::{encode_frame, MessageRecordReader};
use courier_audit::{
    AuditMiddleware, FileMessageRepository, InMemoryMessageRepository, MessageQuery,
    MessageRecord, MessageRepository,
};
use courier_core::di::Container;
use courier_core::{
    ContentTypeRegistry, HandlerResult, JsonContentSerializer, MessageKind, PipelineError,
    ProcessingStatus,
};
use courier_middleware::handlers::{ContainerRegistration, HandlerModule, HandlerRegistry, HandlesSync};
use courier_middleware::{CommandPipeline, PipelineOptions};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Charge {
    amount: u32,
}

#[derive(Debug, Serialize)]
struct Refund;

#[derive(Debug, thiserror::Error)]
#[error("card declined for {0}")]
struct Declined(u32);

#[derive(Default)]
struct BillingHandlers;

impl HandlesSync<Charge> for BillingHandlers {
    fn handle(&self, command: &mut Charge, _params: ()) -> HandlerResult {
        if command.amount == 0 {
            return Err(Declined(command.amount).into());
        }
        Ok(())
    }
}

fn pipeline(repository: Arc<dyn MessageRepository>) -> CommandPipeline {
    let billing = HandlerModule::new("billing").container(
        ContainerRegistration::<BillingHandlers>::from_default()
            .marked()
            .method_sync::<Charge, ()>("Handle"),
    );
    let registry = Arc::new(HandlerRegistry::builder().module(billing).build().unwrap());
    let mut commands =
        CommandPipeline::new(registry, PipelineOptions::default(), Arc::new(Container::new()))
            .unwrap();
    commands
        .pipeline_mut()
        .append(Arc::new(AuditMiddleware::new(repository)))
        .unwrap();
    commands
}

#[test]
fn test_every_processed_command_is_recorded() {
    let repository = Arc::new(InMemoryMessageRepository::new());
    let commands = pipeline(repository.clone());

    commands.handle(Charge { amount: 5 }).unwrap();
    commands.handle(Charge { amount: 7 }).unwrap();
    let error = commands.handle(Charge { amount: 0 }).unwrap_err();
    assert!(matches!(error, PipelineError::MessageProcessing { .. }));
    assert!(commands.handle(Refund).unwrap_err().is_handler_not_found());

    assert_eq!(repository.len(), 4);

    let charges = repository
        .get(&MessageQuery::new().content_type("*Charge"))
        .unwrap();
    assert_eq!(charges.len(), 3);
    assert!(charges.iter().all(|r| r.kind == MessageKind::Command));
    assert_eq!(charges[1].content, br#"{"amount":7}"#.to_vec());

    let declined = repository
        .get(&MessageQuery::new().error_type("*Declined"))
        .unwrap();
    assert_eq!(declined.len(), 1);
    assert_eq!(declined[0].status, ProcessingStatus::Failed);
    assert_eq!(declined[0].error_message(), Some("card declined for 0"));

    let missing = repository
        .get(&MessageQuery::new().error_type("HandlerNotFound"))
        .unwrap();
    assert_eq!(missing.len(), 1);
    assert!(missing[0].content_type.ends_with("Refund"));
}

#[test]
fn test_file_trail_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.log.gz");

    let commands = pipeline(Arc::new(FileMessageRepository::new(&path).with_gzip(true)));
    for amount in 1..=3 {
        commands.handle(Charge { amount }).unwrap();
    }
    drop(commands);

    let mut content_types = ContentTypeRegistry::new();
    content_types.register::<Charge>();
    let reopened = FileMessageRepository::new(&path)
        .with_gzip(true)
        .with_content_types(Arc::new(content_types));

    let page = reopened.get(&MessageQuery::new().skip(1).take(5)).unwrap();
    assert_eq!(page.len(), 2);
    let payload = page[0].payload.as_ref().unwrap();
    assert_eq!(payload.downcast_ref::<Charge>(), Some(&Charge { amount: 2 }));
    assert!(page[0].created_at <= page[1].created_at);
}

#[test]
fn test_csv_export_of_trail() {
    let repository = Arc::new(InMemoryMessageRepository::new());
    let commands = pipeline(repository.clone());
    commands.handle(Charge { amount: 3 }).unwrap();
    let _ = commands.handle(Charge { amount: 0 });

    let records = repository.get(&MessageQuery::new()).unwrap();
    let csv = to_csv_string(&records).unwrap();
    let lines: Vec<_> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].contains(",completed,"));
    assert!(lines[2].contains(",failed,"));
    assert!(lines[2].contains("card declined for 0"));
}

fn record(n: u8) -> MessageRecord {
    MessageRecord::new(Uuid::now_v7(), MessageKind::Event, format!("event{n}"))
        .with_content(vec![b'0' + n % 10])
}

proptest! {
    #[test]
    fn test_reader_resynchronises_after_garbage(
        garbage in proptest::collection::vec(any::<u8>().prop_filter("no begin marker", |b| *b != 0x10), 0..64),
        count in 1_u8..6,
    ) {
        let records: Vec<_> = (0..count).map(record).collect();
        let mut bytes = garbage;
        for record in &records {
            bytes.extend(encode_frame(record, &JsonContentSerializer).unwrap());
        }

        let read: Vec<_> = MessageRecordReader::new(bytes.as_slice(), Arc::new(JsonContentSerializer))
            .collect::<Result<_, _>>()
            .unwrap();
        prop_assert_eq!(read.len(), records.len());
        for (read, written) in read.iter().zip(&records) {
            prop_assert_eq!(read.id, written.id);
            prop_assert_eq!(&read.content_type, &written.content_type);
            prop_assert_eq!(&read.content, &written.content);
        }
    }
}
