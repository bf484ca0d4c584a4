// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: MIT

use std::time::Duration;

use crate::error::{DeliveryError, QueueError};
use crate::queue::Outbox;
use crate::reading::UploadPayload;

/// Something that can hand one reading to the collector.
pub trait Transport {
    fn deliver(&self, payload: &UploadPayload) -> Result<(), DeliveryError>;
}

/// POSTs readings as JSON; any 2xx answer counts as delivered.
pub struct HttpTransport {
    agent: ureq::Agent,
    url: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for HttpTransport {
    fn deliver(&self, payload: &UploadPayload) -> Result<(), DeliveryError> {
        let body = serde_json::to_string(payload)?;

        log::debug!("-> POST {} {}", self.url, body);
        match self
            .agent
            .post(&self.url)
            .set("Content-Type", "application/json")
            .send_string(&body)
        {
            Ok(response) => {
                let status = response.status();
                log::debug!("<- {status}");
                if (200..300).contains(&status) {
                    Ok(())
                } else {
                    Err(DeliveryError::Status {
                        status,
                        body: response.into_string().unwrap_or_default(),
                    })
                }
            }
            Err(ureq::Error::Status(status, response)) => Err(DeliveryError::Status {
                status,
                body: response.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(transport)) => {
                Err(DeliveryError::Transport(transport.to_string()))
            }
        }
    }
}

/// What one flush run achieved.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub delivered: usize,
    /// Unreadable entries moved out of the queue.
    pub quarantined: usize,
    /// Entries still queued after the run.
    pub pending: usize,
    /// Why the run stopped early, if it did.
    pub failure: Option<String>,
}

impl FlushReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// Delivers queued readings oldest first, removing each once it is acknowledged.
///
/// The run stops at the first failed delivery: that entry and everything
/// behind it stay queued for the next run, so readings never arrive out of
/// order and an unreachable collector costs one attempt per run.
pub fn flush<T: Transport + ?Sized>(outbox: &Outbox, transport: &T) -> Result<FlushReport, QueueError> {
    let mut report = FlushReport::default();

    for entry in outbox.entries()? {
        let Some(reading) = outbox.read(&entry)? else {
            report.quarantined += 1;
            continue;
        };

        match transport.deliver(&reading.payload()) {
            Ok(()) => {
                outbox.remove(&entry)?;
                report.delivered += 1;
            }
            Err(e) => {
                log::warn!(
                    "Delivery of entry {} ({}) failed, stopping: {e}",
                    entry.sequence(),
                    reading.iso_time_string()
                );
                report.failure = Some(e.to_string());
                break;
            }
        }
    }

    report.pending = outbox.len()?;
    log::info!(
        "Flush delivered {}, {} still pending",
        report.delivered,
        report.pending
    );

    Ok(report)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::reading::{sample_reading, Reading};
    use std::cell::{Cell, RefCell};

    /// Accepts deliveries until `fail_at` (0-based, counted over its lifetime) or while `up` is set.
    pub(crate) struct ScriptedTransport {
        pub up: Cell<bool>,
        pub fail_at: Option<usize>,
        pub attempts: Cell<usize>,
        pub delivered: RefCell<Vec<UploadPayload>>,
    }

    impl ScriptedTransport {
        pub(crate) fn up() -> Self {
            Self {
                up: Cell::new(true),
                fail_at: None,
                attempts: Cell::new(0),
                delivered: RefCell::new(Vec::new()),
            }
        }

        pub(crate) fn temperatures(&self) -> Vec<Option<f64>> {
            self.delivered.borrow().iter().map(|p| p.temperature).collect()
        }
    }

    impl Transport for ScriptedTransport {
        fn deliver(&self, payload: &UploadPayload) -> Result<(), DeliveryError> {
            let attempt = self.attempts.get();
            self.attempts.set(attempt + 1);

            if !self.up.get() {
                return Err(DeliveryError::Transport("connection refused".into()));
            }
            if self.fail_at == Some(attempt) {
                return Err(DeliveryError::Status {
                    status: 500,
                    body: "disk full".into(),
                });
            }
            self.delivered.borrow_mut().push(payload.clone());
            Ok(())
        }
    }

    fn queued_temperatures(outbox: &Outbox) -> Vec<Option<f64>> {
        outbox
            .entries()
            .unwrap()
            .iter()
            .map(|entry| outbox.read(entry).unwrap().and_then(|r: Reading| r.temperature))
            .collect()
    }

    fn fill(outbox: &Outbox, temperatures: &[f64]) {
        for (minute, temperature) in temperatures.iter().enumerate() {
            let iso = format!("2024-03-01T10:{minute:02}:00");
            outbox.push(&sample_reading(&iso, *temperature)).unwrap();
        }
    }

    #[test]
    fn test_failure_mid_flush_keeps_the_tail_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = Outbox::new(dir.path());
        fill(&outbox, &[1.0, 2.0, 3.0, 4.0, 5.0]);
        let transport = ScriptedTransport {
            fail_at: Some(2),
            ..ScriptedTransport::up()
        };

        let report = flush(&outbox, &transport).unwrap();

        assert_eq!(report.delivered, 2);
        assert_eq!(report.pending, 3);
        assert!(report.failure.unwrap().contains("500"));
        assert_eq!(transport.attempts.get(), 3);
        assert_eq!(transport.temperatures(), vec![Some(1.0), Some(2.0)]);
        assert_eq!(queued_temperatures(&outbox), vec![Some(3.0), Some(4.0), Some(5.0)]);
    }

    #[test]
    fn test_unreachable_then_reachable_collector() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = Outbox::new(dir.path());
        let transport = ScriptedTransport::up();
        transport.up.set(false);

        // Three runs with the collector down, one new reading before each.
        for run in 0..3u32 {
            fill(&outbox, &[f64::from(run)]);
            let report = flush(&outbox, &transport).unwrap();
            assert_eq!(report.delivered, 0);
            assert_eq!(report.pending, run as usize + 1);
        }
        // One attempt per run, not one per queued reading.
        assert_eq!(transport.attempts.get(), 3);

        transport.up.set(true);
        fill(&outbox, &[3.0]);
        let report = flush(&outbox, &transport).unwrap();

        assert!(report.is_complete());
        assert_eq!(report.delivered, 4);
        assert_eq!(report.pending, 0);
        assert_eq!(
            transport.temperatures(),
            vec![Some(0.0), Some(1.0), Some(2.0), Some(3.0)]
        );

        // Nothing is sent twice.
        let report = flush(&outbox, &transport).unwrap();
        assert_eq!(report.delivered, 0);
        assert_eq!(transport.delivered.borrow().len(), 4);
    }

    #[test]
    fn test_empty_queue_flush_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = Outbox::new(dir.path().join("outbox"));
        let transport = ScriptedTransport::up();

        let report = flush(&outbox, &transport).unwrap();

        assert_eq!(report, FlushReport::default());
        assert_eq!(transport.attempts.get(), 0);
    }

    #[test]
    fn test_corrupt_entry_does_not_block_the_queue() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = Outbox::new(dir.path());
        fill(&outbox, &[1.0, 2.0]);
        let first = outbox.entries().unwrap().remove(0);
        std::fs::write(first.path(), "garbage").unwrap();
        let transport = ScriptedTransport::up();

        let report = flush(&outbox, &transport).unwrap();

        assert_eq!(report.quarantined, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(transport.temperatures(), vec![Some(2.0)]);
    }

    #[test]
    fn test_http_transport_reports_unreachable_collector() {
        // Nothing listens on the discard port of localhost in the test environment.
        let transport = HttpTransport::new("http://127.0.0.1:9/data", Duration::from_secs(2));
        let payload = sample_reading("2024-03-01T10:00:00", 1.0).payload();

        let err = transport.deliver(&payload).unwrap_err();

        assert!(matches!(err, DeliveryError::Transport(_)), "{err:?}");
    }
}
