//! Export adapter boundary: normalised rows → a persistent spreadsheet.
//!
//! The destination is an external collaborator behind [`ExportAdapter`];
//! the core owns the retry policy and the success bookkeeping. On
//! exhausted retries the period simply stays `extracted`, so the next run
//! re-exports it - rows are never lost, only delayed.

use crate::document::PeriodKey;
use crate::error::StageFailure;
use crate::records::ExtractionResult;
use crate::retry::{RetryPolicy, Transience};
use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

/// Export-boundary error taxonomy.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("transient: {0}")]
    Transient(String),
    #[error("permanent: {0}")]
    Permanent(String),
}

impl Transience for ExportError {
    fn is_transient(&self) -> bool {
        matches!(self, ExportError::Transient(_))
    }
}

/// The external spreadsheet boundary: append one batch of rows.
///
/// Rows follow the canonical column order from
/// [`ExtractionResult::to_rows`]; numbers arrive as JSON numbers.
pub trait ExportAdapter: Send + Sync {
    fn append_rows<'a>(
        &'a self,
        period: &'a PeriodKey,
        rows: &'a [Vec<Value>],
    ) -> BoxFuture<'a, Result<(), ExportError>>;
}

/// Export one period's result with retries.
///
/// Returns the number of rows appended. An empty result is a successful
/// no-op export (the period had no events).
pub async fn export_result(
    adapter: &dyn ExportAdapter,
    policy: &RetryPolicy,
    result: &ExtractionResult,
) -> Result<usize, StageFailure> {
    let rows = result.to_rows();
    if rows.is_empty() {
        info!("period {}: no rows to export", result.period);
        return Ok(0);
    }

    let what = format!("export {}", result.period);
    policy
        .run(&what, |_attempt| {
            let rows = &rows;
            async move { adapter.append_rows(&result.period, rows).await }
        })
        .await
        .map_err(|(attempts, err)| StageFailure::ExportFailed {
            period: result.period.to_string(),
            attempts,
            detail: err.to_string(),
        })?;

    info!("period {}: appended {} row(s)", result.period, rows.len());
    Ok(rows.len())
}

// ── Bundled HTTP exporter ────────────────────────────────────────────────

/// Export adapter that POSTs row batches as JSON to a configured endpoint
/// (e.g. an Apps Script web app fronting the shared sheet).
///
/// Request body: `{"period": "jan_1993", "rows": [[...], ...]}` with an
/// optional bearer token.
pub struct HttpSheetExporter {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl HttpSheetExporter {
    pub fn new(
        url: impl Into<String>,
        token: Option<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, crate::error::PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| crate::error::PipelineError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            token,
        })
    }
}

impl ExportAdapter for HttpSheetExporter {
    fn append_rows<'a>(
        &'a self,
        period: &'a PeriodKey,
        rows: &'a [Vec<Value>],
    ) -> BoxFuture<'a, Result<(), ExportError>> {
        Box::pin(async move {
            let body = serde_json::json!({
                "period": period.to_string(),
                "rows": rows,
            });

            let mut request = self.client.post(&self.url).json(&body);
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }

            let response = request.send().await.map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    ExportError::Transient(e.to_string())
                } else {
                    ExportError::Permanent(e.to_string())
                }
            })?;

            let status = response.status();
            if status.as_u16() == 429 || status.is_server_error() {
                return Err(ExportError::Transient(format!("HTTP {status}")));
            }
            if !status.is_success() {
                return Err(ExportError::Permanent(format!("HTTP {status}")));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::StormRecord;
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedExporter {
        script: Mutex<Vec<Result<(), ExportError>>>,
        batches: Mutex<Vec<usize>>,
    }

    impl ScriptedExporter {
        fn new(script: Vec<Result<(), ExportError>>) -> Self {
            Self {
                script: Mutex::new(script),
                batches: Mutex::new(Vec::new()),
            }
        }
    }

    impl ExportAdapter for ScriptedExporter {
        fn append_rows<'a>(
            &'a self,
            _period: &'a PeriodKey,
            rows: &'a [Vec<Value>],
        ) -> BoxFuture<'a, Result<(), ExportError>> {
            Box::pin(async move {
                self.batches.lock().unwrap().push(rows.len());
                self.script.lock().unwrap().remove(0)
            })
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            multiplier: 1.0,
            jitter: false,
        }
    }

    fn result_with_rows(n: usize) -> ExtractionResult {
        ExtractionResult {
            period: PeriodKey::from_file_name("jan_1993.pdf").unwrap(),
            records: (0..n)
                .map(|i| StormRecord {
                    state: "TX".into(),
                    location: format!("Town {i}"),
                    date: Some(1),
                    time: String::new(),
                    path_length: None,
                    path_width: None,
                    killed: None,
                    injured: None,
                    property_damage: None,
                    crop_damage: None,
                    character_of_storm: "Tornado".into(),
                    description: String::new(),
                })
                .collect(),
            pages: vec![],
        }
    }

    #[tokio::test]
    async fn export_retries_then_succeeds() {
        let adapter = ScriptedExporter::new(vec![
            Err(ExportError::Transient("503".into())),
            Ok(()),
        ]);
        let n = export_result(&adapter, &fast_policy(), &result_with_rows(3))
            .await
            .unwrap();
        assert_eq!(n, 3);
        assert_eq!(adapter.batches.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn exhausted_export_reports_failure() {
        let adapter = ScriptedExporter::new(vec![
            Err(ExportError::Transient("503".into())),
            Err(ExportError::Transient("503".into())),
        ]);
        let failure = export_result(&adapter, &fast_policy(), &result_with_rows(2))
            .await
            .unwrap_err();
        assert!(matches!(
            failure,
            StageFailure::ExportFailed { attempts: 2, .. }
        ));
    }

    #[tokio::test]
    async fn empty_result_exports_nothing() {
        let adapter = ScriptedExporter::new(vec![]);
        let n = export_result(&adapter, &fast_policy(), &result_with_rows(0))
            .await
            .unwrap();
        assert_eq!(n, 0);
        assert!(adapter.batches.lock().unwrap().is_empty());
    }
}
