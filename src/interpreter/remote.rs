use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use super::local::classify_local;
use super::provider::CompletionBackend;
use crate::actions::ActionRegistry;
use crate::cache::TtlCache;
use crate::types::{IntentResult, IntentSource, Params};

/// LLM-backed intent classification with a total, silent fallback: any
/// failure (missing credentials, network, bad status, unparsable reply)
/// degrades to the local pattern classifier on the same input. Nothing
/// about the remote path is visible to callers except (possibly) higher
/// confidence and `source = Remote`.
pub struct RemoteClassifier {
    backend: Option<Arc<dyn CompletionBackend>>,
    instructions: String,
    cache: TtlCache<IntentResult>,
}

impl RemoteClassifier {
    pub fn new(
        backend: Option<Arc<dyn CompletionBackend>>,
        registry: &ActionRegistry,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            backend,
            instructions: build_instructions(registry),
            cache: TtlCache::new(cache_ttl),
        }
    }

    pub async fn classify(&self, utterance: &str, context: &Value) -> IntentResult {
        let Some(backend) = &self.backend else {
            return classify_local(utterance);
        };

        // The guard is held across the endpoint call: identical concurrent
        // requests wait for the first one instead of racing duplicates.
        let key = cache_key(utterance, context);
        let mut cache = self.cache.lock().await;
        if let Some(mut hit) = cache.fresh(&key) {
            hit.cached = true;
            return hit;
        }

        let prompt = format!(
            "{}\n\nMensagem do usuário: \"{}\"\n\nContexto: {}",
            self.instructions, utterance, context
        );

        let reply = match backend.complete(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Remote classification failed, using local patterns");
                return classify_local(utterance);
            }
        };

        match parse_remote_reply(&reply) {
            Some(intent) => {
                cache.store(key, intent.clone());
                intent
            }
            None => {
                warn!("Remote classifier reply had no parsable JSON, using local patterns");
                classify_local(utterance)
            }
        }
    }
}

fn cache_key(utterance: &str, context: &Value) -> String {
    json!({ "mensagem": utterance, "contexto": context }).to_string()
}

/// Shape the endpoint is instructed to produce. Absent fields get lenient
/// defaults; the instruction block demands all of them.
#[derive(Debug, Deserialize)]
struct RemoteIntent {
    action: String,
    #[serde(default)]
    params: Params,
    #[serde(default)]
    missing_params: Vec<String>,
    #[serde(default = "default_remote_confidence")]
    confidence: f64,
    #[serde(default)]
    message: Option<String>,
}

fn default_remote_confidence() -> f64 {
    0.9
}

/// The endpoint is not guaranteed to answer with bare JSON — it may wrap
/// the object in prose or a code fence. Take the outermost `{...}` span
/// and parse that.
fn parse_remote_reply(reply: &str) -> Option<IntentResult> {
    static JSON_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());
    let span = JSON_SPAN.find(reply)?;
    let parsed: RemoteIntent = serde_json::from_str(span.as_str()).ok()?;
    Some(IntentResult {
        action: parsed.action,
        params: parsed.params,
        missing_params: parsed.missing_params,
        confidence: parsed.confidence,
        message: parsed.message,
        source: IntentSource::Remote,
        cached: false,
    })
}

/// Instruction block sent ahead of every utterance: the registry rendered
/// as a capability list, output rules, and worked examples.
fn build_instructions(registry: &ActionRegistry) -> String {
    format!(
        r#"Você é um interpretador de intenções para o sistema Doce.AI.
Sua tarefa é analisar a mensagem do usuário e identificar:
1. A AÇÃO que ele quer executar
2. Os PARÂMETROS necessários

AÇÕES DISPONÍVEIS:
{}

REGRAS:
- Responda APENAS com um único objeto JSON válido
- Se não conseguir identificar a ação, use "action": "conversa_livre"
- Extraia todos os parâmetros mencionados pelo usuário
- Se faltar informação, inclua em "missing_params"

FORMATO DE RESPOSTA:
{{
    "action": "nome_da_acao",
    "params": {{
        "param1": "valor1",
        "param2": "valor2"
    }},
    "missing_params": ["param_faltando"],
    "confidence": 0.95,
    "message": "Mensagem amigável para o usuário"
}}

EXEMPLOS:

Usuário: "Preciso fazer um orçamento para a empresa ABC"
{{
    "action": "gerar_orcamento",
    "params": {{ "cliente": "empresa ABC" }},
    "missing_params": ["itens"],
    "confidence": 0.9,
    "message": "Vou preparar o orçamento para a empresa ABC. Quais itens você quer incluir?"
}}

Usuário: "Busca informações sobre tablet counting machine no saintyco"
{{
    "action": "buscar_produto_saintyco",
    "params": {{ "termo": "tablet counting machine" }},
    "missing_params": [],
    "confidence": 0.95,
    "message": "Buscando 'tablet counting machine' no Saintyco..."
}}

Usuário: "Tem algum email do João sobre o projeto?"
{{
    "action": "consultar_emails",
    "params": {{ "remetente": "João", "termo": "projeto" }},
    "missing_params": [],
    "confidence": 0.85,
    "message": "Vou verificar os emails do João sobre o projeto."
}}"#,
        registry.render_capabilities()
    )
}

#[cfg(test)]
mod tests {
    use super::super::provider::ProviderError;
    use super::*;
    use crate::actions::test_support::FakeAction;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry() -> ActionRegistry {
        let mut registry = ActionRegistry::new();
        registry.register(Arc::new(FakeAction {
            name: "gerar_orcamento",
            category: "trabalho",
            fail_with: None,
        }));
        registry
    }

    struct ScriptedBackend {
        reply: Result<String, ()>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(reply) => Ok(reply.clone()),
                Err(()) => Err(ProviderError::malformed("scripted failure")),
            }
        }
    }

    fn classifier(backend: Option<Arc<ScriptedBackend>>) -> RemoteClassifier {
        RemoteClassifier::new(
            backend.map(|b| b as Arc<dyn CompletionBackend>),
            &registry(),
            Duration::from_secs(300),
        )
    }

    #[tokio::test]
    async fn endpoint_failure_matches_local_classification_exactly() {
        let remote = classifier(Some(ScriptedBackend::failing()));
        let via_fallback = remote
            .classify("Preciso de um orçamento para a empresa ABC", &json!({}))
            .await;
        let direct = classify_local("Preciso de um orçamento para a empresa ABC");
        assert_eq!(via_fallback, direct);
    }

    #[tokio::test]
    async fn garbage_reply_matches_local_classification_exactly() {
        let remote = classifier(Some(ScriptedBackend::ok("desculpe, não entendi")));
        let via_fallback = remote.classify("saintyco bomba de vácuo", &json!({})).await;
        assert_eq!(via_fallback, classify_local("saintyco bomba de vácuo"));
    }

    #[tokio::test]
    async fn missing_backend_uses_local_classification() {
        let remote = classifier(None);
        let intent = remote.classify("quero cotar um misturador", &json!({})).await;
        assert_eq!(intent.source, IntentSource::Local);
        assert_eq!(intent.action, "gerar_orcamento");
    }

    #[tokio::test]
    async fn json_is_extracted_from_prose_wrapped_reply() {
        let backend = ScriptedBackend::ok(
            "Claro! Aqui está a análise:\n{\"action\":\"gerar_orcamento\",\"params\":{\"cliente\":\"Acme\"},\"missing_params\":[\"itens\"],\"confidence\":0.9,\"message\":\"Ok\"}\nEspero ter ajudado.",
        );
        let remote = classifier(Some(backend));
        let intent = remote.classify("orçamento pra Acme", &json!({})).await;
        assert_eq!(intent.source, IntentSource::Remote);
        assert_eq!(intent.action, "gerar_orcamento");
        assert_eq!(intent.missing_params, vec!["itens".to_string()]);
        assert_eq!(
            intent.params.get("cliente").and_then(Value::as_str),
            Some("Acme")
        );
    }

    #[tokio::test]
    async fn identical_requests_within_window_hit_the_cache() {
        let backend = ScriptedBackend::ok(
            r#"{"action":"gerar_orcamento","params":{},"missing_params":[],"confidence":0.9}"#,
        );
        let remote = classifier(Some(backend.clone()));

        let first = remote.classify("orçamento", &json!({"turno": 1})).await;
        assert!(!first.cached);
        let second = remote.classify("orçamento", &json!({"turno": 1})).await;
        assert!(second.cached);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        // A different context is a different key.
        let third = remote.classify("orçamento", &json!({"turno": 2})).await;
        assert!(!third.cached);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_classifications_are_not_cached() {
        let backend = ScriptedBackend::failing();
        let remote = classifier(Some(backend.clone()));
        remote.classify("orçamento", &json!({})).await;
        remote.classify("orçamento", &json!({})).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn instructions_embed_the_capability_list() {
        let instructions = build_instructions(&registry());
        assert!(instructions.contains("- gerar_orcamento: ação de teste (params: termo)"));
        assert!(instructions.contains("conversa_livre"));
    }
}
