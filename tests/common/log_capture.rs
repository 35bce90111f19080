//! Capture of tracing events emitted while a test runs.
#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

/// Collects events on the current thread until dropped.
///
/// The guard is thread-local, so use it with the default current-thread
/// `#[tokio::test]` runtime; tasks spawned there are captured too.
pub struct TestLogCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
    _guard: tracing::subscriber::DefaultGuard,
}

#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl CapturedEvent {
    fn mentions(&self, needle: &str) -> bool {
        self.message.contains(needle) || self.fields.iter().any(|(_, v)| v.contains(needle))
    }
}

impl TestLogCapture {
    pub fn start() -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(CaptureLayer {
            events: Arc::clone(&events),
        });
        Self {
            events,
            _guard: tracing::subscriber::set_default(subscriber),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CapturedEvent>> {
        self.events.lock().unwrap()
    }

    pub fn events(&self) -> Vec<CapturedEvent> {
        self.lock().clone()
    }

    fn messages(&self) -> Vec<String> {
        self.lock().iter().map(|e| e.message.clone()).collect()
    }

    /// Assert some event message contains `needle`.
    pub fn assert_logged(&self, needle: &str) {
        let found = self.lock().iter().any(|e| e.message.contains(needle));
        assert!(found, "expected a log containing {needle:?}; got {:#?}", self.messages());
    }

    /// Assert an event at `level` contains `needle`.
    pub fn assert_logged_at(&self, level: Level, needle: &str) {
        let found = self
            .lock()
            .iter()
            .any(|e| e.level == level && e.message.contains(needle));
        assert!(
            found,
            "expected a {level} log containing {needle:?}; got {:#?}",
            self.messages()
        );
    }

    /// Assert a structured field `name` was recorded with a value containing `value`.
    pub fn assert_field(&self, name: &str, value: &str) {
        let found = self
            .lock()
            .iter()
            .any(|e| e.fields.iter().any(|(k, v)| k == name && v.contains(value)));
        assert!(found, "expected field {name}={value:?}; got {:#?}", self.events());
    }

    /// Assert `secret` appears in no message and no field value.
    pub fn assert_never_logged(&self, secret: &str) {
        let leaks: Vec<CapturedEvent> = self
            .lock()
            .iter()
            .filter(|e| e.mentions(secret))
            .cloned()
            .collect();
        assert!(leaks.is_empty(), "{secret:?} leaked into logs: {leaks:#?}");
    }

    pub fn count_at(&self, level: Level) -> usize {
        self.lock().iter().filter(|e| e.level == level).count()
    }
}

struct CaptureLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for CaptureLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            target: event.metadata().target().to_string(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl FieldVisitor {
    fn push(&mut self, name: &str, value: String) {
        if name == "message" {
            self.message = value;
        } else {
            self.fields.push((name.to_string(), value));
        }
    }
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.push(field.name(), format!("{value:?}"));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.push(field.name(), value.to_string());
    }
}
