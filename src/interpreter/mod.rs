mod local;
mod provider;
mod remote;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::info;

pub use local::classify_local;
pub use provider::{CompletionBackend, GeminiClient, ProviderError, ProviderErrorKind};
pub use remote::RemoteClassifier;

use crate::actions::ActionRegistry;
use crate::types::{ExecutionEnvelope, IntentResult};

/// Terminal outcome of processing one utterance. There is no loop back:
/// follow-up information arrives as a fresh utterance that is classified
/// from scratch.
#[derive(Debug)]
pub enum Reply {
    /// No action matched — the caller routes the utterance to the
    /// open-ended conversational responder.
    FreeConversation { intent: IntentResult },
    /// An action matched but parameters are missing; ask, don't execute.
    NeedsInfo {
        intent: IntentResult,
        question: String,
    },
    /// The action ran; the envelope carries its outcome either way.
    Action {
        intent: IntentResult,
        envelope: ExecutionEnvelope,
    },
}

/// Classifier chain plus executor dispatch: the whole conversation core
/// behind one `process` call that never fails.
pub struct Interpreter {
    registry: Arc<ActionRegistry>,
    remote: RemoteClassifier,
}

impl Interpreter {
    pub fn new(
        registry: Arc<ActionRegistry>,
        backend: Option<Arc<dyn CompletionBackend>>,
        cache_ttl: Duration,
    ) -> Self {
        let remote = RemoteClassifier::new(backend, &registry, cache_ttl);
        Self { registry, remote }
    }

    /// Resolve an utterance to an intent (remote first, local fallback).
    pub async fn classify(&self, utterance: &str, context: &Value) -> IntentResult {
        self.remote.classify(utterance, context).await
    }

    pub async fn process(&self, utterance: &str, context: &Value) -> Reply {
        let intent = self.classify(utterance, context).await;
        info!(
            action = %intent.action,
            source = ?intent.source,
            cached = intent.cached,
            confidence = intent.confidence,
            "Intenção resolvida"
        );

        if intent.is_free_conversation() {
            return Reply::FreeConversation { intent };
        }

        if !intent.missing_params.is_empty() {
            let question = format!(
                "Para continuar, preciso saber: {}",
                intent.missing_params.join(", ")
            );
            return Reply::NeedsInfo { intent, question };
        }

        let envelope = self.registry.execute(&intent.action, &intent.params).await;
        Reply::Action { intent, envelope }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::test_support::FakeAction;
    use crate::types::IntentSource;
    use async_trait::async_trait;
    use serde_json::json;

    fn registry() -> Arc<ActionRegistry> {
        let mut registry = ActionRegistry::new();
        registry.register(Arc::new(FakeAction {
            name: "gerar_orcamento",
            category: "trabalho",
            fail_with: None,
        }));
        registry.register(Arc::new(FakeAction {
            name: "buscar_produto_saintyco",
            category: "trabalho",
            fail_with: None,
        }));
        Arc::new(registry)
    }

    fn offline_interpreter() -> Interpreter {
        Interpreter::new(registry(), None, Duration::from_secs(300))
    }

    struct CannedBackend(String);

    #[async_trait]
    impl CompletionBackend for CannedBackend {
        async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn quote_request_executes_with_extracted_client() {
        // Remote classification disabled: the local pattern extracts the
        // client, leaves missing_params empty, and the action runs.
        let reply = offline_interpreter()
            .process("Preciso de um orçamento para a empresa ABC", &json!({}))
            .await;
        match reply {
            Reply::Action { intent, envelope } => {
                assert_eq!(intent.action, "gerar_orcamento");
                assert_eq!(
                    intent.params.get("cliente").and_then(Value::as_str),
                    Some("empresa ABC")
                );
                assert!(intent.missing_params.is_empty());
                assert!(envelope.success);
            }
            other => panic!("expected Action, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn catalog_search_strips_site_keyword() {
        let reply = offline_interpreter()
            .process("saintyco bomba de vácuo", &json!({}))
            .await;
        match reply {
            Reply::Action { intent, envelope } => {
                assert_eq!(intent.action, "buscar_produto_saintyco");
                let termo = intent.params.get("termo").and_then(Value::as_str).unwrap();
                assert!(termo.contains("bomba de vácuo"), "termo was {termo:?}");
                assert!(envelope.success);
            }
            other => panic!("expected Action, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unmatched_utterance_is_free_conversation() {
        let reply = offline_interpreter()
            .process("conta uma piada aí", &json!({}))
            .await;
        match reply {
            Reply::FreeConversation { intent } => {
                assert_eq!(intent.confidence, 0.5);
                assert_eq!(intent.source, IntentSource::Local);
            }
            other => panic!("expected FreeConversation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_params_ask_back_instead_of_executing() {
        let backend = Arc::new(CannedBackend(
            r#"{"action":"gerar_orcamento","params":{"cliente":"ABC"},"missing_params":["itens","prazo"],"confidence":0.9,"message":"ok"}"#.to_string(),
        ));
        let interpreter = Interpreter::new(registry(), Some(backend), Duration::from_secs(300));
        let reply = interpreter.process("orçamento pra ABC", &json!({})).await;
        match reply {
            Reply::NeedsInfo { intent, question } => {
                assert_eq!(question, "Para continuar, preciso saber: itens, prazo");
                assert_eq!(intent.source, IntentSource::Remote);
            }
            other => panic!("expected NeedsInfo, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn remote_unknown_action_becomes_failure_envelope() {
        // The remote model may hallucinate an unregistered action; the
        // executor answers with the valid-name list instead of running it.
        let backend = Arc::new(CannedBackend(
            r#"{"action":"apagar_tudo","params":{},"missing_params":[],"confidence":0.9}"#
                .to_string(),
        ));
        let interpreter = Interpreter::new(registry(), Some(backend), Duration::from_secs(300));
        let reply = interpreter.process("apaga tudo", &json!({})).await;
        match reply {
            Reply::Action { envelope, .. } => {
                assert!(!envelope.success);
                assert_eq!(
                    envelope.available_actions.unwrap(),
                    vec!["gerar_orcamento", "buscar_produto_saintyco"]
                );
            }
            other => panic!("expected Action, got {:?}", other),
        }
    }
}
