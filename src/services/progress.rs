use crate::models::{ProgressEvent, ProgressHandler, TransferListener, TransferProgress};
use uuid::Uuid;

struct Attached {
    handler: ProgressHandler,
    request_id: String,
}

/// Republishes store transfer notifications as [`ProgressEvent`]s.
pub struct ProgressTracker {
    attached: Option<Attached>,
    key: String,
    name: Option<String>,
    known_total: Option<u64>,
}

impl ProgressTracker {
    /// Without a handler the tracker is inert and never emits.
    pub fn attach(
        handler: Option<ProgressHandler>,
        key: &str,
        name: Option<&str>,
        known_total: Option<u64>,
    ) -> Self {
        let attached = handler.map(|handler| Attached {
            handler,
            request_id: Uuid::new_v4().to_string(),
        });

        Self {
            attached,
            key: key.to_string(),
            name: name.map(str::to_string),
            known_total,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        self.attached.as_ref().map(|a| a.request_id.as_str())
    }

    pub fn is_attached(&self) -> bool {
        self.attached.is_some()
    }
}

impl TransferListener for ProgressTracker {
    fn on_transfer_progress(&self, progress: TransferProgress) {
        let Some(attached) = &self.attached else {
            return;
        };

        let total = progress.total.or(self.known_total);
        (attached.handler)(ProgressEvent {
            request_id: attached.request_id.clone(),
            key: self.key.clone(),
            name: self.name.clone(),
            bytes_written: progress.loaded,
            bytes_total: total,
            percent: percent(progress.loaded, total),
        });
    }
}

pub fn percent(written: u64, total: Option<u64>) -> u8 {
    match total {
        Some(total) if total > 0 => {
            let pct = (written as u128 * 100) / total as u128;
            pct.min(100) as u8
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder() -> (ProgressHandler, Arc<Mutex<Vec<ProgressEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let handler: ProgressHandler = Arc::new(move |event| sink.lock().unwrap().push(event));
        (handler, events)
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(0, Some(200)), 0);
        assert_eq!(percent(199, Some(200)), 99);
        assert_eq!(percent(200, Some(200)), 100);
        assert_eq!(percent(500, Some(200)), 100);
        assert_eq!(percent(50, None), 0);
        assert_eq!(percent(50, Some(0)), 0);
        assert_eq!(percent(u64::MAX, Some(u64::MAX)), 100);
    }

    #[test]
    fn test_without_handler_is_noop() {
        let tracker = ProgressTracker::attach(None, "k", None, Some(10));
        assert!(!tracker.is_attached());
        assert!(tracker.request_id().is_none());
        tracker.on_transfer_progress(TransferProgress {
            loaded: 5,
            total: Some(10),
        });
    }

    #[test]
    fn test_events_share_request_id_and_fall_back_to_known_total() {
        let (handler, events) = recorder();
        let tracker = ProgressTracker::attach(Some(handler), "up/a.bin", Some("a.bin"), Some(400));

        tracker.on_transfer_progress(TransferProgress {
            loaded: 100,
            total: None,
        });
        tracker.on_transfer_progress(TransferProgress {
            loaded: 300,
            total: Some(300),
        });

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].request_id, events[1].request_id);
        assert_eq!(Some(events[0].request_id.as_str()), tracker.request_id());
        assert_eq!(events[0].bytes_total, Some(400));
        assert_eq!(events[0].percent, 25);
        assert_eq!(events[1].bytes_total, Some(300));
        assert_eq!(events[1].percent, 100);
        assert_eq!(events[1].key, "up/a.bin");
        assert_eq!(events[1].name.as_deref(), Some("a.bin"));
    }

    #[test]
    fn test_unknown_total_reports_zero_percent() {
        let (handler, events) = recorder();
        let tracker = ProgressTracker::attach(Some(handler), "k", None, None);
        tracker.on_transfer_progress(TransferProgress {
            loaded: 1234,
            total: None,
        });

        let events = events.lock().unwrap();
        assert_eq!(events[0].bytes_total, None);
        assert_eq!(events[0].percent, 0);
    }

    #[test]
    fn test_each_attach_gets_new_id() {
        let (handler, _) = recorder();
        let a = ProgressTracker::attach(Some(handler.clone()), "k", None, None);
        let b = ProgressTracker::attach(Some(handler), "k", None, None);
        assert_ne!(a.request_id(), b.request_id());
    }
}
