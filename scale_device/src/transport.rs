//! HTTPS event transport (spec §4.E/§6): posts a captured event to the
//! ingest endpoint as JSON over TLS with a shared-secret header. Failure is
//! non-fatal to the caller; the capture state machine clears its buffer and
//! returns to IDLE regardless of the outcome.

use scale_core::Event;
use scale_traits::EventTransport;
use serde::Serialize;
use std::time::Duration;

/// Wire shape for the ingest endpoint (spec §6). The endpoint's field name is
/// `scale_id`, not `device_id`; this is the boundary where that rename happens.
#[derive(Serialize)]
struct IngestBody<'a> {
    scale_id: &'a str,
    t0_epoch_ms: Option<i64>,
    samples: Vec<WireSample>,
}

#[derive(Serialize)]
struct WireSample {
    t: u64,
    kg: f64,
}

pub struct HttpEventTransport {
    client: reqwest::blocking::Client,
    endpoint_url: String,
    secret_header: String,
    secret_value: String,
}

impl HttpEventTransport {
    /// `secret_value` is read by the caller from the `FUNCTION_SECRET`
    /// environment variable; it is never read from TOML.
    pub fn new(endpoint_url: String, secret_header: String, secret_value: String) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self {
            client,
            endpoint_url,
            secret_header,
            secret_value,
        }
    }
}

impl EventTransport for HttpEventTransport {
    type Event = Event;

    fn send(&mut self, event: &Event) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let body = IngestBody {
            scale_id: &event.device_id,
            t0_epoch_ms: event.t0_epoch_ms,
            samples: event
                .samples
                .iter()
                .map(|s| WireSample { t: s.t, kg: s.kg })
                .collect(),
        };

        let resp = self
            .client
            .post(&self.endpoint_url)
            .header(self.secret_header.as_str(), self.secret_value.as_str())
            .json(&body)
            .send()?;

        if !resp.status().is_success() {
            return Err(format!("ingest responded with status {}", resp.status()).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_body_renames_device_id_to_scale_id() {
        let event = Event::new(
            "dev-7",
            Some(12345),
            vec![scale_core::event::Sample::new(0, 1.5)],
        );
        let body = IngestBody {
            scale_id: &event.device_id,
            t0_epoch_ms: event.t0_epoch_ms,
            samples: event
                .samples
                .iter()
                .map(|s| WireSample { t: s.t, kg: s.kg })
                .collect(),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"scale_id\":\"dev-7\""));
        assert!(!json.contains("device_id"));
    }
}
