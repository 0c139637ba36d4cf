use std::fmt::{self, Debug, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use tracing::event::Event;
use tracing::field::{Field, Visit};
use tracing::{span, Id, Level, Metadata, Subscriber};

/// Serializes console output between the read loops and the main thread.
static PRINT_LOCK: Mutex<()> = Mutex::new(());

/// Prints one line without interleaving with trace output.
pub fn print_line(line: fmt::Arguments<'_>) {
    let _guard = PRINT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    println!("{}", line);
}

/// Prints events at or above `max_level`, one line each, tagged with the thread that
/// emitted them.
pub struct ConsoleSubscriber {
    ids: AtomicUsize,
    max_level: Level,
}

impl ConsoleSubscriber {
    pub fn new(max_level: Level) -> Self {
        ConsoleSubscriber {
            ids: AtomicUsize::new(1),
            max_level,
        }
    }

    fn wants(&self, level: &Level) -> bool {
        *level <= self.max_level
    }
}

fn render(level: &Level, thread: Option<&str>, target: &str, line: &LineVisitor) -> String {
    format!(
        "{:>5} [{}] {}: {}{}",
        level,
        thread.unwrap_or("-"),
        target,
        line.message,
        line.fields
    )
}

// https://docs.rs/tracing/0.1.7/tracing/subscriber/trait.Subscriber.html
impl Subscriber for ConsoleSubscriber {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.wants(metadata.level())
    }

    // Spans only need distinct ids, nothing is printed for them
    fn new_span(&self, _span: &span::Attributes) -> Id {
        let id = self.ids.fetch_add(1, Ordering::SeqCst);
        Id::from_u64(id as u64)
    }

    fn record(&self, _span: &Id, _values: &span::Record) {}

    fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

    fn event(&self, event: &Event) {
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        let metadata = event.metadata();
        let current = thread::current();
        let line = render(metadata.level(), current.name(), metadata.target(), &visitor);
        print_line(format_args!("{}", line));
    }

    fn enter(&self, _span: &Id) {}

    fn exit(&self, _span: &Id) {}
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}
