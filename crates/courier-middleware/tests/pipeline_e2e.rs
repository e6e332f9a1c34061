//! End-to-end dispatch tests.
//!
//! These tests drive the command, event and query pipelines through the full
//! default chain:
//!
//! 1. Handler location (including generic and self-handling messages)
//! 2. Handler resolution (resolver, constructor, properties, disposal)
//! 3. Handler execution (write-back, parameters, failure policy)
//! 4. Telemetry

use courier_core::di::{Container, Inject};
use courier_core::{
    CancellationToken, GenericPayload, HandlerResult, MessageKind, PipelineError,
    ProcessingStatus,
};
use courier_middleware::handlers::{
    BoxFuture, ContainerRegistration, Dispose, GenericMethod, HandlerModule, HandlerRegistry,
    Handles, HandlesSync, SelfHandling,
};
use courier_middleware::stages::ValidationMiddleware;
use courier_middleware::{
    CommandPipeline, EventPipeline, FnMiddleware, PipelineOptions, QueryPipeline,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Shared services
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Counter(AtomicUsize);

impl Counter {
    fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct Disposals(AtomicUsize);

#[derive(Debug, Default)]
struct Observed(Mutex<Option<CancellationToken>>);

#[derive(Debug)]
struct Clock(&'static str);

#[derive(Debug)]
struct Mailer;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct CreateOrder {
    id: u32,
    out: Option<String>,
}

#[derive(Debug, Serialize)]
struct Unroutable;

#[derive(Debug, Serialize)]
struct PackageLost {
    order: u32,
}

#[derive(Debug, Serialize)]
struct Shipped {
    order: u32,
}

impl SelfHandling<Inject<Counter>> for Shipped {
    fn handle(&mut self, Inject(counter): Inject<Counter>) -> BoxFuture<'_, HandlerResult> {
        Box::pin(async move {
            counter.hit();
            Ok(())
        })
    }
}

#[derive(Debug, Serialize)]
struct Envelope<T> {
    body: T,
    seen: Vec<String>,
}

impl<T: Serialize + Debug + Send + Sync + 'static> GenericPayload for Envelope<T> {}

#[derive(Debug, Serialize, Default)]
struct UpdateProfile {
    ctor_clock: Option<String>,
    property_clock: Option<String>,
    has_mailer: bool,
}

#[derive(Debug, Serialize)]
struct Pay {
    amount: u32,
}

#[derive(Debug, Serialize)]
struct Wait;

#[derive(Debug, Serialize)]
struct Post {
    entry: u32,
}

#[derive(Debug, Serialize)]
struct Nap {
    millis: u64,
    woke: bool,
}

impl Nap {
    fn new(millis: u64) -> Self {
        Self { millis, woke: false }
    }
}

#[derive(Debug, Serialize)]
struct Settled {
    entry: u32,
}

#[derive(Debug, thiserror::Error)]
#[error("card declined: {0}")]
struct Declined(String);

// ---------------------------------------------------------------------------
// Handler containers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct OrderHandlers;

impl HandlesSync<CreateOrder> for OrderHandlers {
    fn handle(&self, command: &mut CreateOrder, _params: ()) -> HandlerResult {
        command.out = Some(format!("result-{}", command.id));
        Ok(())
    }
}

impl HandlesSync<Shipped, Inject<Counter>> for OrderHandlers {
    fn handle(&self, _event: &mut Shipped, Inject(counter): Inject<Counter>) -> HandlerResult {
        counter.hit();
        Ok(())
    }
}

impl HandlesSync<PackageLost, Inject<Counter>> for OrderHandlers {
    fn handle(&self, _event: &mut PackageLost, Inject(counter): Inject<Counter>) -> HandlerResult {
        counter.hit();
        Ok(())
    }
}

#[derive(Default)]
struct NotificationHandlers;

impl Handles<Shipped, Inject<Counter>> for NotificationHandlers {
    fn handle<'a>(
        &'a self,
        _event: &'a mut Shipped,
        Inject(counter): Inject<Counter>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            counter.hit();
            Ok(())
        })
    }
}

impl Handles<PackageLost, Inject<Counter>> for NotificationHandlers {
    fn handle<'a>(
        &'a self,
        _event: &'a mut PackageLost,
        Inject(counter): Inject<Counter>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            counter.hit();
            Ok(())
        })
    }
}

#[derive(Default)]
struct EnvelopeHandlers;

impl<T: Debug + Send + Sync + 'static> HandlesSync<Envelope<T>, Inject<Counter>> for EnvelopeHandlers {
    fn handle(&self, message: &mut Envelope<T>, Inject(counter): Inject<Counter>) -> HandlerResult {
        counter.hit();
        message.seen.push(std::any::type_name::<T>().to_string());
        Ok(())
    }
}

struct ProfileHandlers {
    from_constructor: Option<Arc<Clock>>,
    clock: Option<Arc<Clock>>,
    mailer: Option<Arc<Mailer>>,
}

impl HandlesSync<UpdateProfile> for ProfileHandlers {
    fn handle(&self, command: &mut UpdateProfile, _params: ()) -> HandlerResult {
        command.ctor_clock = self.from_constructor.as_ref().map(|c| c.0.to_string());
        command.property_clock = self.clock.as_ref().map(|c| c.0.to_string());
        command.has_mailer = self.mailer.is_some();
        Ok(())
    }
}

#[derive(Default)]
struct PaymentHandlers;

impl HandlesSync<Pay> for PaymentHandlers {
    fn handle(&self, command: &mut Pay, _params: ()) -> HandlerResult {
        Err(Declined(format!("{} is over the limit", command.amount)).into())
    }
}

#[derive(Default)]
struct WaitHandlers;

impl Handles<Wait, (CancellationToken, Inject<Observed>)> for WaitHandlers {
    fn handle<'a>(
        &'a self,
        _command: &'a mut Wait,
        (token, Inject(observed)): (CancellationToken, Inject<Observed>),
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            *observed.0.lock() = Some(token);
            Ok(())
        })
    }
}

struct LedgerHandlers {
    disposals: Arc<Disposals>,
}

impl HandlesSync<Post> for LedgerHandlers {
    fn handle(&self, _command: &mut Post, _params: ()) -> HandlerResult {
        Ok(())
    }
}

impl Dispose for LedgerHandlers {
    fn dispose(&self) {
        self.disposals.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct NapHandlers;

impl Handles<Nap, Inject<Counter>> for NapHandlers {
    fn handle<'a>(
        &'a self,
        command: &'a mut Nap,
        Inject(counter): Inject<Counter>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(command.millis)).await;
            command.woke = true;
            counter.hit();
            Ok(())
        })
    }
}

type Books = (Inject<Counter>, Inject<Disposals>);

struct JournalHandlers {
    counter: Arc<Counter>,
    disposals: Arc<Disposals>,
}

struct ReconcileHandlers {
    disposals: Arc<Disposals>,
}

struct ArchiveHandlers {
    counter: Arc<Counter>,
    disposals: Arc<Disposals>,
}

impl JournalHandlers {
    fn new((Inject(counter), Inject(disposals)): Books) -> Self {
        Self { counter, disposals }
    }
}

impl ReconcileHandlers {
    fn new((_, Inject(disposals)): Books) -> Self {
        Self { disposals }
    }
}

impl ArchiveHandlers {
    fn new((Inject(counter), Inject(disposals)): Books) -> Self {
        Self { counter, disposals }
    }
}

impl HandlesSync<Settled> for JournalHandlers {
    fn handle(&self, _event: &mut Settled, _params: ()) -> HandlerResult {
        self.counter.hit();
        Ok(())
    }
}

impl HandlesSync<Settled> for ReconcileHandlers {
    fn handle(&self, event: &mut Settled, _params: ()) -> HandlerResult {
        Err(Declined(format!("entry {} does not balance", event.entry)).into())
    }
}

impl HandlesSync<Settled> for ArchiveHandlers {
    fn handle(&self, _event: &mut Settled, _params: ()) -> HandlerResult {
        self.counter.hit();
        Ok(())
    }
}

impl Dispose for JournalHandlers {
    fn dispose(&self) {
        self.disposals.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl Dispose for ReconcileHandlers {
    fn dispose(&self) {
        self.disposals.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl Dispose for ArchiveHandlers {
    fn dispose(&self) {
        self.disposals.0.fetch_add(1, Ordering::SeqCst);
    }
}

struct Catalog {
    disposals: Arc<Disposals>,
}

impl Catalog {
    fn price(&self, sku: &str) -> Option<u32> {
        (sku == "tea").then_some(4)
    }
}

impl Dispose for Catalog {
    fn dispose(&self) {
        self.disposals.0.fetch_add(1, Ordering::SeqCst);
    }
}

struct Unregistered;

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

struct Fixture {
    counter: Arc<Counter>,
    disposals: Arc<Disposals>,
    observed: Arc<Observed>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            counter: Arc::new(Counter::default()),
            disposals: Arc::new(Disposals::default()),
            observed: Arc::new(Observed::default()),
        }
    }

    fn container(&self) -> Container {
        let mut container = Container::new();
        container
            .register(Arc::clone(&self.counter))
            .register(Arc::clone(&self.disposals))
            .register(Arc::clone(&self.observed))
            .register(Arc::new(Clock("utc")));
        container
    }

    fn registry() -> Arc<HandlerRegistry> {
        let orders = HandlerModule::new("orders")
            .container(
                ContainerRegistration::<OrderHandlers>::from_default()
                    .marked()
                    .method_sync::<CreateOrder, ()>("Handle")
                    .method_sync::<Shipped, Inject<Counter>>("HandleShipped")
                    .method_sync::<PackageLost, Inject<Counter>>("HandleLost"),
            )
            .container(
                ContainerRegistration::<NotificationHandlers>::from_default()
                    .marked()
                    .method::<Shipped, Inject<Counter>>("Handle")
                    .method::<PackageLost, Inject<Counter>>("Handle"),
            )
            .container(
                ContainerRegistration::<EnvelopeHandlers>::from_default()
                    .marked()
                    .generic(
                        GenericMethod::<EnvelopeHandlers>::new("Handle")
                            .instantiate_sync::<Envelope<u32>, Inject<Counter>>()
                            .instantiate_sync::<Envelope<String>, Inject<Counter>>(),
                    ),
            )
            .self_handling::<Shipped, Inject<Counter>>();

        let accounts = HandlerModule::new("accounts")
            .container(
                ContainerRegistration::new(|clock: Option<Arc<Clock>>| ProfileHandlers {
                    from_constructor: clock,
                    clock: None,
                    mailer: None,
                })
                .marked()
                .property::<Clock>("clock", |h| &mut h.clock)
                .property::<Mailer>("mailer", |h| &mut h.mailer)
                .method_sync::<UpdateProfile, ()>("Handle"),
            )
            .container(
                ContainerRegistration::<PaymentHandlers>::from_default()
                    .marked()
                    .method_sync::<Pay, ()>("Handle"),
            )
            .container(
                ContainerRegistration::<WaitHandlers>::from_default()
                    .marked()
                    .method::<Wait, (CancellationToken, Inject<Observed>)>("Handle"),
            )
            .container(
                ContainerRegistration::new(|Inject(disposals): Inject<Disposals>| {
                    LedgerHandlers { disposals }
                })
                .marked()
                .disposable()
                .method_sync::<Post, ()>("Handle"),
            )
            .container(
                ContainerRegistration::new(|Inject(disposals): Inject<Disposals>| Catalog {
                    disposals,
                })
                .disposable(),
            )
            .container(
                ContainerRegistration::<NapHandlers>::from_default()
                    .marked()
                    .method::<Nap, Inject<Counter>>("Handle"),
            );

        let ledger = HandlerModule::new("ledger")
            .container(
                ContainerRegistration::new(JournalHandlers::new)
                    .marked()
                    .disposable()
                    .method_sync::<Settled, ()>("Handle"),
            )
            .container(
                ContainerRegistration::new(ReconcileHandlers::new)
                    .marked()
                    .disposable()
                    .method_sync::<Settled, ()>("Handle"),
            )
            .container(
                ContainerRegistration::new(ArchiveHandlers::new)
                    .marked()
                    .disposable()
                    .method_sync::<Settled, ()>("Handle"),
            );

        Arc::new(
            HandlerRegistry::builder()
                .module(orders)
                .module(accounts)
                .module(ledger)
                .build()
                .unwrap(),
        )
    }

    fn commands_with(&self, options: PipelineOptions, container: Container) -> CommandPipeline {
        CommandPipeline::new(Self::registry(), options, Arc::new(container)).unwrap()
    }
}

fn commands_with(options: PipelineOptions) -> (CommandPipeline, Fixture) {
    let fixture = Fixture::new();
    let pipeline = fixture.commands_with(options, fixture.container());
    (pipeline, fixture)
}

fn commands() -> (CommandPipeline, Fixture) {
    commands_with(PipelineOptions::default())
}

fn events() -> (EventPipeline, Fixture) {
    let fixture = Fixture::new();
    let pipeline = EventPipeline::new(
        Fixture::registry(),
        PipelineOptions::default(),
        Arc::new(fixture.container()),
    )
    .unwrap();
    (pipeline, fixture)
}

fn queries() -> (QueryPipeline, Fixture) {
    let fixture = Fixture::new();
    let pipeline = QueryPipeline::new(
        Fixture::registry(),
        PipelineOptions::default(),
        Arc::new(fixture.container()),
    )
    .unwrap();
    (pipeline, fixture)
}

// ---------------------------------------------------------------------------
// Handler location
// ---------------------------------------------------------------------------

#[test]
fn test_command_without_handler_is_not_found() {
    let (commands, _) = commands();
    let error = commands.handle(Unroutable).unwrap_err();
    assert!(error.is_handler_not_found());
}

#[test]
fn test_event_without_handler_completes() {
    let (events, fixture) = events();
    events.raise(Unroutable).unwrap();
    assert_eq!(fixture.counter.get(), 0);
}

#[test]
fn test_query_without_target_is_not_found() {
    let (queries, _) = queries();
    let error = queries.query::<Unregistered>().with(|_| 1_u8).unwrap_err();
    assert!(error.is_handler_not_found());
}

#[test]
fn test_two_event_handlers_both_run() {
    let (events, fixture) = events();
    events.raise(PackageLost { order: 1 }).unwrap();
    assert_eq!(fixture.counter.get(), 2);
}

#[tokio::test]
async fn test_self_handling_event_runs_after_containers() {
    let (events, fixture) = events();
    events.raise_async(Shipped { order: 9 }).await.unwrap();
    assert_eq!(fixture.counter.get(), 3);
}

#[test]
fn test_failing_event_handler_stops_the_rest() {
    let (events, fixture) = events();
    let error = events.raise(Settled { entry: 12 }).unwrap_err();

    match &error {
        PipelineError::MessageProcessing { error_type, .. } => {
            assert!(error_type.ends_with("Declined"));
        }
        other => panic!("expected MessageProcessing, got {other:?}"),
    }
    // The journal ran, the archive never did.
    assert_eq!(fixture.counter.get(), 1);
    // All three containers were constructed, so all three are disposed.
    assert_eq!(fixture.disposals.0.load(Ordering::SeqCst), 3);
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

#[test]
fn test_handler_writes_back_to_payload() {
    let (commands, _) = commands();
    let done = commands.handle(CreateOrder { id: 5, out: None }).unwrap();
    assert_eq!(done.out.as_deref(), Some("result-5"));
}

#[test]
fn test_blocking_handle_drives_tokio_timers() {
    let (commands, fixture) = commands();
    let done = commands.handle(Nap::new(5)).unwrap();
    assert!(done.woke);
    assert_eq!(fixture.counter.get(), 1);
}

#[tokio::test]
async fn test_blocking_and_async_calls_share_one_pipeline() {
    let (commands, fixture) = commands();
    let first = commands.handle(Nap::new(5)).unwrap();
    let second = commands.handle_async(Nap::new(5)).await.unwrap();
    let third = commands.handle(Nap::new(1)).unwrap();

    assert!(first.woke && second.woke && third.woke);
    assert_eq!(fixture.counter.get(), 3);

    let order = commands.handle(CreateOrder { id: 2, out: None }).unwrap();
    assert_eq!(order.out.as_deref(), Some("result-2"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_handle_inside_multi_thread_runtime() {
    let (commands, fixture) = commands();
    let blocking = commands.handle(Nap::new(5)).unwrap();
    let (left, right) = tokio::join!(
        commands.handle_async(Nap::new(3)),
        commands.handle_async(Nap::new(1)),
    );

    assert!(blocking.woke);
    assert!(left.unwrap().woke && right.unwrap().woke);
    assert_eq!(fixture.counter.get(), 3);
}

#[test]
fn test_generic_payload_dispatches_matching_instantiation() {
    let (commands, fixture) = commands();

    let numbers = commands
        .handle(Envelope {
            body: 7_u32,
            seen: Vec::new(),
        })
        .unwrap();
    assert_eq!(numbers.seen, vec!["u32".to_string()]);

    let text = commands
        .handle(Envelope {
            body: "hi".to_string(),
            seen: Vec::new(),
        })
        .unwrap();
    assert_eq!(text.seen.len(), 1);
    assert!(text.seen[0].ends_with("String"));
    assert_eq!(fixture.counter.get(), 2);

    let unlisted = commands.handle(Envelope {
        body: 1.5_f64,
        seen: Vec::new(),
    });
    assert!(unlisted.unwrap_err().is_handler_not_found());
}

#[test]
fn test_constructor_and_property_values_come_from_resolver() {
    let (commands, _) = commands_with(PipelineOptions::default().use_properties_resolving(true));
    let done = commands.handle(UpdateProfile::default()).unwrap();
    assert_eq!(done.ctor_clock.as_deref(), Some("utc"));
    assert_eq!(done.property_clock.as_deref(), Some("utc"));
    assert!(!done.has_mailer);
}

#[test]
fn test_properties_untouched_without_property_resolving() {
    let (commands, _) = commands();
    let done = commands.handle(UpdateProfile::default()).unwrap();
    assert_eq!(done.ctor_clock.as_deref(), Some("utc"));
    assert_eq!(done.property_clock, None);
}

#[test]
fn test_handler_error_is_wrapped_by_default() {
    let (commands, _) = commands();
    let error = commands.handle(Pay { amount: 900 }).unwrap_err();

    match &error {
        PipelineError::MessageProcessing { error_type, .. } => {
            assert!(error_type.ends_with("Declined"));
        }
        other => panic!("expected MessageProcessing, got {other:?}"),
    }
    let source = std::error::Error::source(&error).unwrap();
    assert_eq!(source.to_string(), "card declined: 900 is over the limit");
    assert!(error.original::<Declined>().is_some());
}

#[test]
fn test_handler_error_is_preserved_when_configured() {
    let (commands, _) = commands_with(PipelineOptions::default().preserve_original_error(true));
    let error = commands.handle(Pay { amount: 900 }).unwrap_err();

    assert!(matches!(error, PipelineError::Handler { .. }));
    assert_eq!(error.to_string(), "card declined: 900 is over the limit");
    assert_eq!(error.original::<Declined>().unwrap().0, "900 is over the limit");
}

#[test]
fn test_failed_message_records_error_description() {
    let (commands, _) = commands();
    let pipeline = commands.pipeline();
    let mut ctx = pipeline.context(pipeline.message(MessageKind::Command, Pay { amount: 3 }));

    assert!(pipeline.invoke(&mut ctx).is_err());
    assert_eq!(ctx.status(), ProcessingStatus::Failed);
    assert_eq!(
        ctx.message().error_message(),
        Some("card declined: 3 is over the limit")
    );
    assert!(ctx.message().error_type().unwrap().ends_with("Declined"));
}

#[tokio::test]
async fn test_cancellation_token_reaches_async_handler() {
    let (commands, fixture) = commands();
    let token = CancellationToken::new();

    commands
        .handle_with_cancellation(Wait, token.clone())
        .await
        .unwrap();

    let observed = fixture.observed.0.lock().clone().unwrap();
    assert!(!observed.is_cancelled());
    token.cancel();
    assert!(observed.is_cancelled());
}

#[tokio::test]
async fn test_missing_cancellation_token_never_cancels() {
    let (commands, fixture) = commands();
    commands.handle_async(Wait).await.unwrap();
    let observed = fixture.observed.0.lock().clone().unwrap();
    assert!(!observed.is_cancelled());
}

// ---------------------------------------------------------------------------
// Ownership
// ---------------------------------------------------------------------------

#[test]
fn test_constructed_handler_is_disposed() {
    let (commands, fixture) = commands();
    commands.handle(Post { entry: 1 }).unwrap();
    assert_eq!(fixture.disposals.0.load(Ordering::SeqCst), 1);
}

#[test]
fn test_resolver_supplied_handler_is_not_disposed() {
    let fixture = Fixture::new();
    let mut container = fixture.container();
    container.register(Arc::new(LedgerHandlers {
        disposals: Arc::clone(&fixture.disposals),
    }));
    let commands = fixture.commands_with(PipelineOptions::default(), container);

    commands.handle(Post { entry: 1 }).unwrap();
    assert_eq!(fixture.disposals.0.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[test]
fn test_query_returns_value_and_disposes_target() {
    let (queries, fixture) = queries();
    let price = queries
        .query::<Catalog>()
        .named("price(tea)")
        .with(|catalog| catalog.price("tea"))
        .unwrap();
    assert_eq!(price, Some(4));
    assert_eq!(fixture.disposals.0.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_async_query() {
    let (queries, _) = queries();
    let price = queries
        .query::<Catalog>()
        .with_async(|catalog: &Catalog| Box::pin(async move { catalog.price("coffee") }))
        .await
        .unwrap();
    assert_eq!(price, None);
}

#[test]
fn test_failing_query_is_wrapped() {
    let (queries, _) = queries();
    let error = queries
        .query::<Catalog>()
        .try_with(|_catalog| Err::<u32, _>(Declined("closed".into())))
        .unwrap_err();
    assert!(matches!(error, PipelineError::MessageProcessing { .. }));
}

// ---------------------------------------------------------------------------
// Chain editing
// ---------------------------------------------------------------------------

#[test]
fn test_insert_after_places_stage_next_to_anchor() {
    let (mut commands, _) = commands();
    commands
        .pipeline_mut()
        .insert_after(
            "handler_executor",
            Arc::new(FnMiddleware::new("stamp", |ctx| {
                ctx.message_mut()
                    .data_mut()
                    .insert("stamped".into(), "yes".into());
                Ok(())
            })),
        )
        .unwrap();

    assert_eq!(
        commands.pipeline().identifiers(),
        vec![
            "handler_locator",
            "handler_resolver",
            "handler_executor",
            "stamp",
            "telemetry"
        ]
    );

    let duplicate = commands
        .pipeline_mut()
        .append(Arc::new(FnMiddleware::new("telemetry", |_ctx| Ok(()))));
    assert!(matches!(duplicate, Err(PipelineError::Configuration(_))));
}

#[test]
fn test_validation_rejects_before_handler_runs() {
    let (mut commands, _) = commands();
    commands
        .pipeline_mut()
        .insert_before(
            "handler_locator",
            Arc::new(
                ValidationMiddleware::with_rules()
                    .rule(|order: &CreateOrder| {
                        if order.id == 0 {
                            Err("order id is required".to_string())
                        } else {
                            Ok(())
                        }
                    })
                    .build(),
            ),
        )
        .unwrap();

    let error = commands.handle(CreateOrder { id: 0, out: None }).unwrap_err();
    match error {
        PipelineError::Rejected { reason, .. } => assert_eq!(reason, "order id is required"),
        other => panic!("expected Rejected, got {other:?}"),
    }
    assert!(commands.handle(CreateOrder { id: 3, out: None }).is_ok());
}
