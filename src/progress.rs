//! User-visible processing-log labels.
//!
//! Components emit short stage labels ("Fetching the PDF...") while a turn
//! runs; a caller that wants the visible log subscribes to the receiver
//! side. Emission is fire-and-forget: a dropped or absent subscriber never
//! affects the work being reported on.

/// Cloneable handle for emitting stage labels.
#[derive(Clone, Debug)]
pub struct ProgressEmitter {
    tx: Option<flume::Sender<String>>,
}

impl ProgressEmitter {
    /// An emitter that discards every label.
    #[must_use]
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// An emitter paired with the receiver that observes its labels.
    #[must_use]
    pub fn channel() -> (Self, flume::Receiver<String>) {
        let (tx, rx) = flume::unbounded();
        (Self { tx: Some(tx) }, rx)
    }

    /// Emits one stage label. Never fails.
    pub fn emit(&self, label: impl Into<String>) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(label.into());
        }
    }
}

impl Default for ProgressEmitter {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_arrive_in_order() {
        let (emitter, rx) = ProgressEmitter::channel();
        emitter.emit("one");
        emitter.emit("two");
        assert_eq!(rx.recv().unwrap(), "one");
        assert_eq!(rx.recv().unwrap(), "two");
    }

    #[test]
    fn disabled_and_dropped_receivers_are_silent() {
        ProgressEmitter::disabled().emit("ignored");

        let (emitter, rx) = ProgressEmitter::channel();
        drop(rx);
        emitter.emit("also ignored");
    }
}
