/*!
 * Typed event bus for translation progress.
 *
 * Observers (CLI progress, autosave, logging) subscribe to the bus; the
 * scheduler dispatches synchronously after the tree mutex has been
 * released, so subscribers may safely take the project lock themselves.
 */

use log::{error, info, warn};
use parking_lot::Mutex;

/// Summary of a translated batch, carried by events
#[derive(Debug, Clone)]
pub struct BatchEvent {
    /// Owning scene number
    pub scene: usize,
    /// Batch number within the scene
    pub batch: usize,
    /// Number of lines in the batch
    pub lines: usize,
    /// Number of lines with a translation after this batch
    pub translated: usize,
    /// Whether every line in the batch now has a translation
    pub all_translated: bool,
}

/// Summary of a translated scene, carried by events
#[derive(Debug, Clone)]
pub struct SceneEvent {
    /// Scene number
    pub scene: usize,
    /// Number of batches in the scene
    pub batches: usize,
    /// Whether every batch is now fully translated
    pub all_translated: bool,
}

/// Events emitted during translation
#[derive(Debug, Clone)]
pub enum TranslationEvent {
    /// Subtitles were batched and preprocessed
    Preprocessed { scenes: usize, batches: usize },
    /// A batch finished translating and was applied to the tree
    BatchTranslated(BatchEvent),
    /// Every selected batch of a scene has been applied
    SceneTranslated(SceneEvent),
    /// The tree was modified through the editor
    Updated { scenes: usize, lines: usize },
    /// Informational message
    Info(String),
    /// Something unexpected but recoverable
    Warning(String),
    /// Something failed
    Error(String),
}

type Subscriber = Box<dyn Fn(&TranslationEvent) + Send + Sync>;

/// Subscription list with synchronous dispatch
#[derive(Default)]
pub struct TranslationEvents {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl TranslationEvents {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber; it will see every event emitted after this call
    pub fn subscribe(&self, subscriber: impl Fn(&TranslationEvent) + Send + Sync + 'static) {
        self.subscribers.lock().push(Box::new(subscriber));
    }

    /// Dispatch an event to every subscriber, in subscription order
    pub fn emit(&self, event: TranslationEvent) {
        let subscribers = self.subscribers.lock();
        for subscriber in subscribers.iter() {
            subscriber(&event);
        }
    }

    /// Route info/warning/error events into the log by default
    pub fn connect_default_loggers(&self) {
        self.subscribe(|event| match event {
            TranslationEvent::Info(message) => info!("{}", message),
            TranslationEvent::Warning(message) => warn!("{}", message),
            TranslationEvent::Error(message) => error!("{}", message),
            _ => {}
        });
    }
}

impl std::fmt::Debug for TranslationEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationEvents")
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}
