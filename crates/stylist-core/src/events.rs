//! Project events that features subscribe to from `on_init`.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ProjectInitialised,
    ProfileSelected { previous: String, current: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    ProjectInitialised,
    ProfileSelected,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ProjectInitialised => EventKind::ProjectInitialised,
            Event::ProfileSelected { .. } => EventKind::ProfileSelected,
        }
    }
}

type Listener = Box<dyn Fn(&Event)>;

#[derive(Default)]
pub struct Dispatcher {
    listeners: Vec<(EventKind, Listener)>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, kind: EventKind, listener: impl Fn(&Event) + 'static) {
        self.listeners.push((kind, Box::new(listener)));
    }

    /// Call every listener bound to the event's kind, in bind order.
    /// Returns how many ran.
    pub fn emit(&self, event: &Event) -> usize {
        let kind = event.kind();
        let mut count = 0;
        for (bound, listener) in &self.listeners {
            if *bound == kind {
                listener(event);
                count += 1;
            }
        }
        tracing::debug!(?kind, listeners = count, "emitted event");
        count
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
