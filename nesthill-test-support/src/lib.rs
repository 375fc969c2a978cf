//! Shared test utilities used across nesthill crates.

pub mod tracing {
    //! Capture layer for asserting spans and events emitted by the engine.

    use std::{
        collections::BTreeMap,
        fmt,
        sync::{Arc, Mutex, PoisonError},
    };

    use tracing::{
        Event, Level, Subscriber,
        field::{Field, Visit},
        span::{Attributes, Id, Record},
    };
    use tracing_subscriber::{Layer, layer::Context, registry::LookupSpan};

    /// Span captured when it was opened, with fields recorded up to its close.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct CapturedSpan {
        /// Span name, such as `core.scheme`.
        pub name: String,
        /// Field values rendered as strings.
        pub fields: BTreeMap<String, String>,
    }

    /// Event captured at emission.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct CapturedEvent {
        /// Event level.
        pub level: Level,
        /// Event target, normally the emitting module path.
        pub target: String,
        /// Field values rendered as strings; the message is under `message`.
        pub fields: BTreeMap<String, String>,
    }

    impl CapturedEvent {
        /// Rendered `message` field, if any.
        #[must_use]
        pub fn message(&self) -> Option<&str> {
            self.fields.get("message").map(String::as_str)
        }
    }

    #[derive(Default)]
    struct Captured {
        spans: Vec<CapturedSpan>,
        events: Vec<CapturedEvent>,
    }

    /// Layer that keeps every span and event it sees.
    ///
    /// Clones share storage, so a clone can be installed in a subscriber while
    /// the original is queried afterwards.
    ///
    /// # Examples
    /// ```
    /// use nesthill_test_support::tracing::CaptureLayer;
    /// use tracing_subscriber::layer::SubscriberExt;
    ///
    /// let layer = CaptureLayer::default();
    /// let subscriber = tracing_subscriber::registry().with(layer.clone());
    /// tracing::subscriber::with_default(subscriber, || {
    ///     let _span = tracing::info_span!("core.example", sites = 3).entered();
    ///     tracing::info!(vertices = 8, "built");
    /// });
    /// assert_eq!(
    ///     layer.span("core.example").and_then(|span| span.fields.get("sites").cloned()),
    ///     Some("3".to_owned())
    /// );
    /// assert!(layer.has_event(tracing::Level::INFO, "built"));
    /// ```
    #[derive(Clone, Default)]
    pub struct CaptureLayer {
        captured: Arc<Mutex<Captured>>,
    }

    impl CaptureLayer {
        fn with_captured<T>(&self, read: impl FnOnce(&mut Captured) -> T) -> T {
            let mut guard = self
                .captured
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            read(&mut guard)
        }

        /// Spans in the order they were opened.
        #[must_use]
        pub fn spans(&self) -> Vec<CapturedSpan> {
            self.with_captured(|captured| captured.spans.clone())
        }

        /// Events in emission order.
        #[must_use]
        pub fn events(&self) -> Vec<CapturedEvent> {
            self.with_captured(|captured| captured.events.clone())
        }

        /// First span called `name`.
        #[must_use]
        pub fn span(&self, name: &str) -> Option<CapturedSpan> {
            self.with_captured(|captured| {
                captured.spans.iter().find(|span| span.name == name).cloned()
            })
        }

        /// Whether an event at `level` carried exactly `message`.
        #[must_use]
        pub fn has_event(&self, level: Level, message: &str) -> bool {
            self.with_captured(|captured| {
                captured
                    .events
                    .iter()
                    .any(|event| event.level == level && event.message() == Some(message))
            })
        }
    }

    /// Index of a span's entry in the capture, stored in the span extensions.
    struct SlotIndex(usize);

    impl<S> Layer<S> for CaptureLayer
    where
        S: Subscriber + for<'span> LookupSpan<'span>,
    {
        fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
            let mut fields = BTreeMap::new();
            attrs.record(&mut Stringify(&mut fields));
            let index = self.with_captured(|captured| {
                captured.spans.push(CapturedSpan {
                    name: attrs.metadata().name().to_owned(),
                    fields,
                });
                captured.spans.len() - 1
            });
            if let Some(span) = ctx.span(id) {
                span.extensions_mut().insert(SlotIndex(index));
            }
        }

        fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
            let Some(span) = ctx.span(id) else {
                return;
            };
            let Some(index) = span.extensions().get::<SlotIndex>().map(|slot| slot.0) else {
                return;
            };
            self.with_captured(|captured| {
                if let Some(entry) = captured.spans.get_mut(index) {
                    values.record(&mut Stringify(&mut entry.fields));
                }
            });
        }

        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut fields = BTreeMap::new();
            event.record(&mut Stringify(&mut fields));
            let metadata = event.metadata();
            self.with_captured(|captured| {
                captured.events.push(CapturedEvent {
                    level: *metadata.level(),
                    target: metadata.target().to_owned(),
                    fields,
                });
            });
        }
    }

    struct Stringify<'a>(&'a mut BTreeMap<String, String>);

    impl Stringify<'_> {
        fn put(&mut self, field: &Field, value: String) {
            self.0.insert(field.name().to_owned(), value);
        }
    }

    impl Visit for Stringify<'_> {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            self.put(field, format!("{value:?}"));
        }

        fn record_str(&mut self, field: &Field, value: &str) {
            self.put(field, value.to_owned());
        }

        fn record_f64(&mut self, field: &Field, value: f64) {
            self.put(field, value.to_string());
        }

        fn record_i64(&mut self, field: &Field, value: i64) {
            self.put(field, value.to_string());
        }

        fn record_u64(&mut self, field: &Field, value: u64) {
            self.put(field, value.to_string());
        }

        fn record_bool(&mut self, field: &Field, value: bool) {
            self.put(field, value.to_string());
        }

        fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
            self.put(field, value.to_string());
        }
    }
}
