//! Timed HTTP helpers for iterations
//!
//! Every call produces exactly one [`RequestSample`], transport failures
//! included (status 0). Helpers return the status code rather than an
//! error so a failed call flows into checks instead of aborting the
//! iteration.

use chrono::Utc;
use reqwest::Method;
use tokio::time::Instant;
use tracing::debug;

use surge_metrics::RequestSample;

use crate::iteration::{IterationContext, IterationOutput};

impl IterationContext {
    /// GET a path, record the sample, return the status (0 on transport error)
    pub async fn get(&self, path: &str, out: &mut IterationOutput) -> u16 {
        self.request(Method::GET, path, None, out).await
    }

    /// POST a JSON body
    pub async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
        out: &mut IterationOutput,
    ) -> u16 {
        self.request(Method::POST, path, Some(body), out).await
    }

    /// PUT a JSON body
    pub async fn put_json(
        &self,
        path: &str,
        body: &serde_json::Value,
        out: &mut IterationOutput,
    ) -> u16 {
        self.request(Method::PUT, path, Some(body), out).await
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        out: &mut IterationOutput,
    ) -> u16 {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.client.request(method.clone(), &url);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let started = Instant::now();
        let status = match builder.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                if self.discard_response_bodies {
                    // drop without buffering; duration covers the headers
                    drop(response);
                } else {
                    let _ = response.bytes().await;
                }
                status
            }
            Err(e) => {
                debug!(scenario = %self.scenario, %url, "request failed: {e}");
                0
            }
        };

        out.samples.push(RequestSample {
            scenario: self.scenario.clone(),
            method: method.to_string(),
            path: path.to_string(),
            status,
            duration: started.elapsed(),
            timestamp: Utc::now(),
            tags: self.tags.clone(),
        });
        status
    }
}
