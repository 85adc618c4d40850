use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::store::Store;
use crate::types::ClickInfo;

/// Destination for click analytics.
pub trait ClickSink: Send + Sync {
    fn append_click(&self, link_id: i64, info: &ClickInfo, at: DateTime<Utc>) -> Result<()>;
}

impl<S: Store + ?Sized> ClickSink for S {
    fn append_click(&self, link_id: i64, info: &ClickInfo, at: DateTime<Utc>) -> Result<()> {
        self.record_click(link_id, info, at)
    }
}

/// Best-effort click recording that never fails a redirect.
#[derive(Clone)]
pub struct ClickRecorder {
    sink: Arc<dyn ClickSink>,
}

impl ClickRecorder {
    pub fn new(sink: Arc<dyn ClickSink>) -> Self {
        Self { sink }
    }

    /// Appends the click event and bumps the link's counter.
    pub fn record(&self, link_id: i64, info: &ClickInfo) -> Result<()> {
        self.sink.append_click(link_id, info, Utc::now())
    }

    /// Records on the blocking pool; failures are logged and dropped.
    pub fn spawn(&self, link_id: i64, info: ClickInfo) -> JoinHandle<()> {
        let recorder = self.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = recorder.record(link_id, &info) {
                tracing::warn!("Failed to record click for link {link_id}: {e}");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::Error;

    struct CountingSink(AtomicUsize);

    impl ClickSink for CountingSink {
        fn append_click(&self, _: i64, _: &ClickInfo, _: DateTime<Utc>) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct BrokenSink;

    impl ClickSink for BrokenSink {
        fn append_click(&self, _: i64, _: &ClickInfo, _: DateTime<Utc>) -> Result<()> {
            Err(Error::Io(std::io::Error::other("disk unplugged")))
        }
    }

    #[tokio::test]
    async fn test_spawn_records() {
        let sink = Arc::new(CountingSink(AtomicUsize::new(0)));
        let recorder = ClickRecorder::new(sink.clone());

        recorder.spawn(1, ClickInfo::default()).await.unwrap();
        recorder.spawn(1, ClickInfo::default()).await.unwrap();

        assert_eq!(sink.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_spawn_swallows_failures() {
        let recorder = ClickRecorder::new(Arc::new(BrokenSink));

        assert!(recorder.record(1, &ClickInfo::default()).is_err());
        // The background task completes without panicking.
        recorder.spawn(1, ClickInfo::default()).await.unwrap();
    }
}
