//! Dispatch of resolved calls and composition of the reply text.

use std::sync::Arc;

use futures::future::join_all;

use crate::catalog::Catalog;
use crate::ledger::LedgerClient;
use crate::resolver::IntentResolver;
use crate::types::{OperationCall, OperationResult};

pub const NO_INTENT_REPLY: &str = "I couldn't determine what Bitcoin information you're looking for. Please try rephrasing your question.";
pub const UNREACHABLE_REPLY: &str =
    "Failed to connect to the Bitcoin canister. Please try again later.";

/// Reply line for a call whose name is not in the catalog
const UNSUPPORTED: &str = "unsupported operation";

/// One line of a dispatch, in call order
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// Name not in the catalog; never dispatched
    Rejected { name: String },
    Completed(OperationResult),
}

impl Entry {
    pub fn to_line(&self) -> String {
        match self {
            Entry::Rejected { name } => format!("Error executing {}: {}", name, UNSUPPORTED),
            Entry::Completed(result) => result.to_line(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchReport {
    NoIntent,
    BackendUnreachable,
    Completed(Vec<Entry>),
}

impl DispatchReport {
    /// Results of the calls that actually went out
    pub fn results(&self) -> Vec<&OperationResult> {
        match self {
            DispatchReport::Completed(entries) => entries
                .iter()
                .filter_map(|e| match e {
                    Entry::Completed(r) => Some(r),
                    Entry::Rejected { .. } => None,
                })
                .collect(),
            DispatchReport::NoIntent | DispatchReport::BackendUnreachable => vec![],
        }
    }

    pub fn render(&self) -> String {
        match self {
            DispatchReport::NoIntent => NO_INTENT_REPLY.to_string(),
            DispatchReport::BackendUnreachable => UNREACHABLE_REPLY.to_string(),
            DispatchReport::Completed(entries) => entries
                .iter()
                .map(Entry::to_line)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Resolves text into calls, runs them against the ledger, and renders
/// one reply. Holds no per-message state; share it behind an `Arc`.
pub struct Orchestrator {
    catalog: Arc<Catalog>,
    resolver: Arc<dyn IntentResolver>,
    ledger: LedgerClient,
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<Catalog>,
        resolver: Arc<dyn IntentResolver>,
        ledger: LedgerClient,
    ) -> Self {
        Self {
            catalog,
            resolver,
            ledger,
        }
    }

    /// Answer one piece of user text. Never fails: errors become reply text.
    #[tracing::instrument(skip(self, text))]
    pub async fn answer(&self, text: &str) -> String {
        match self.resolver.resolve(text, &self.catalog).await {
            Ok(calls) => self.dispatch(&calls).await,
            Err(e) => {
                tracing::error!(error = %e, "Error processing query");
                format!("An error occurred while processing your request: {}", e)
            }
        }
    }

    pub async fn dispatch(&self, calls: &[OperationCall]) -> String {
        self.execute(calls).await.render()
    }

    /// Probe, then fan out every known call concurrently.
    ///
    /// Results come back in call order. One failing call does not affect
    /// the others.
    pub async fn execute(&self, calls: &[OperationCall]) -> DispatchReport {
        if calls.is_empty() {
            tracing::info!("No operations resolved from query");
            return DispatchReport::NoIntent;
        }

        tracing::info!("Probing ledger before dispatch");
        match self.ledger.probe().await {
            Ok(v) => tracing::debug!(response = %v, "Probe succeeded"),
            Err(e) => {
                tracing::error!(error = %e, "Failed to connect to the ledger");
                return DispatchReport::BackendUnreachable;
            }
        }

        let pending = calls.iter().map(|call| async move {
            if !self.catalog.contains(&call.name) {
                tracing::warn!(operation = %call.name, "Model proposed unknown operation");
                return Entry::Rejected {
                    name: call.name.clone(),
                };
            }

            tracing::info!(operation = %call.name, arguments = ?call.arguments, "Executing operation");
            Entry::Completed(self.ledger.invoke(call).await)
        });

        DispatchReport::Completed(join_all(pending).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ResolveError;
    use async_trait::async_trait;
    use serde_json::json;
    use tallyconf::LedgerConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Scripted(Vec<OperationCall>);

    #[async_trait]
    impl IntentResolver for Scripted {
        async fn resolve(
            &self,
            _text: &str,
            _catalog: &Catalog,
        ) -> Result<Vec<OperationCall>, ResolveError> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    #[async_trait]
    impl IntentResolver for Broken {
        async fn resolve(
            &self,
            _text: &str,
            _catalog: &Catalog,
        ) -> Result<Vec<OperationCall>, ResolveError> {
            Err(ResolveError::EmptyResponse)
        }
    }

    fn orchestrator(server: &MockServer, resolver: Arc<dyn IntentResolver>) -> Orchestrator {
        let catalog = Arc::new(Catalog::ledger());
        let ledger = LedgerClient::new(
            &LedgerConfig {
                base_url: server.uri(),
                canister_id: None,
                timeout_ms: 500,
                read_retries: 0,
                retry_backoff_ms: 1,
            },
            catalog.clone(),
        )
        .unwrap();
        Orchestrator::new(catalog, resolver, ledger)
    }

    async fn mount_probe(server: &MockServer, expected: u64) {
        Mock::given(method("POST"))
            .and(path("/get-current-fee-percentiles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([1000, 1200, 1500])))
            .expect(expected)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_no_calls_means_no_backend_traffic() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let orch = orchestrator(&server, Arc::new(Scripted(vec![])));
        assert_eq!(orch.answer("hello?").await, NO_INTENT_REPLY);
    }

    #[tokio::test]
    async fn test_failed_probe_short_circuits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/get-current-fee-percentiles"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/get-balance"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(1)))
            .expect(0)
            .mount(&server)
            .await;

        let orch = orchestrator(&server, Arc::new(Scripted(vec![])));
        let report = orch
            .execute(&[OperationCall::from_json("get_balance", json!({"address": "tb1qexample"}))])
            .await;

        assert!(matches!(report, DispatchReport::BackendUnreachable));
        assert_eq!(report.render(), UNREACHABLE_REPLY);
        assert!(report.results().is_empty());
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_order() {
        let server = MockServer::start().await;
        // probe plus the fee call itself
        mount_probe(&server, 2).await;
        Mock::given(method("POST"))
            .and(path("/get-balance"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(50000)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/get-utxos"))
            .respond_with(ResponseTemplate::new(500).set_body_string("index unavailable"))
            .expect(1)
            .mount(&server)
            .await;

        let orch = orchestrator(&server, Arc::new(Scripted(vec![])));
        let calls = vec![
            OperationCall::from_json("get_balance", json!({"address": "tb1qa"})),
            OperationCall::from_json("get_utxos", json!({"address": "tb1qa"})),
            OperationCall::bare("get_current_fee_percentiles"),
        ];
        let reply = orch.dispatch(&calls).await;
        let lines: Vec<_> = reply.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "get_balance result: 50000");
        assert!(lines[1].starts_with("Error executing get_utxos:"), "{}", lines[1]);
        assert_eq!(lines[2], "get_current_fee_percentiles result: [1000,1200,1500]");
    }

    #[tokio::test]
    async fn test_unknown_name_folded_without_result() {
        let server = MockServer::start().await;
        mount_probe(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/get-balance"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(7)))
            .expect(1)
            .mount(&server)
            .await;

        let orch = orchestrator(&server, Arc::new(Scripted(vec![])));
        let report = orch
            .execute(&[
                OperationCall::bare("dummy_test"),
                OperationCall::from_json("get_balance", json!({"address": "tb1qa"})),
            ])
            .await;

        assert_eq!(report.results().len(), 1);
        assert_eq!(
            report.render(),
            "Error executing dummy_test: unsupported operation\nget_balance result: 7"
        );
    }

    #[tokio::test]
    async fn test_resolver_failure_becomes_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let orch = orchestrator(&server, Arc::new(Broken));
        let reply = orch.answer("What's my balance?").await;
        assert!(
            reply.starts_with("An error occurred while processing your request:"),
            "{}",
            reply
        );
    }
}
