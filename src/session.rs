use std::sync::Arc;

use serde_json::{json, Value};
use tracing::warn;

use crate::interpreter::{Interpreter, Reply};
use crate::responder::Responder;
use crate::store::DocStore;
use crate::types::{ChatTurn, ExecutionEnvelope, IntentResult, TurnRole};

/// One conversation: history plus the collaborators that answer it.
///
/// All per-utterance state lives in the call chain; sessions can run
/// concurrently without sharing anything beyond the registry, the
/// classifier cache and the store.
pub struct ChatSession {
    interpreter: Arc<Interpreter>,
    responder: Responder,
    store: Arc<DocStore>,
    history: Vec<ChatTurn>,
}

impl ChatSession {
    pub fn new(interpreter: Arc<Interpreter>, responder: Responder, store: Arc<DocStore>) -> Self {
        Self {
            interpreter,
            responder,
            store,
            history: Vec::new(),
        }
    }

    /// Answer one utterance. Every failure mode below this point has
    /// already been converted to data, so this cannot fail.
    pub async fn handle(&mut self, utterance: &str) -> String {
        let reply = self.interpreter.process(utterance, &json!({})).await;

        let text = match reply {
            Reply::FreeConversation { .. } => {
                self.responder.reply(&self.history, utterance).await
            }
            Reply::NeedsInfo { question, .. } => question,
            Reply::Action { intent, envelope } => {
                if let Err(e) = self
                    .store
                    .record_history(
                        &intent.action,
                        Value::Object(intent.params.clone()),
                        json!({ "success": envelope.success }),
                    )
                    .await
                {
                    warn!(error = %e, "Failed to record action history");
                }
                render_action_reply(&intent, &envelope)
            }
        };

        self.history.push(ChatTurn {
            role: TurnRole::User,
            content: utterance.to_string(),
        });
        self.history.push(ChatTurn {
            role: TurnRole::Assistant,
            content: text.clone(),
        });
        text
    }
}

/// Chat rendering of an executed action: the classifier's status line, then
/// the handler's own message (when it has one), then a compact result body.
/// Failures get an apologetic line, never a raw error dump.
fn render_action_reply(intent: &IntentResult, envelope: &ExecutionEnvelope) -> String {
    let mut lines: Vec<String> = Vec::new();
    if let Some(message) = &intent.message {
        lines.push(message.clone());
    }

    if envelope.success {
        if let Some(result) = &envelope.result {
            if let Some(message) = result.get("message").and_then(Value::as_str) {
                lines.push(message.to_string());
            }
            if let Some(body) = render_result_body(result) {
                lines.push(body);
            }
        }
    } else {
        lines.push(format!(
            "Não consegui executar essa ação: {}",
            envelope.error.as_deref().unwrap_or("erro desconhecido")
        ));
        if let Some(available) = &envelope.available_actions {
            lines.push(format!("Ações que eu conheço: {}", available.join(", ")));
        }
    }

    if lines.is_empty() {
        lines.push("Pronto!".to_string());
    }
    lines.join("\n")
}

/// Pretty-print the result minus its message line, truncated so a large
/// payload never floods the chat.
fn render_result_body(result: &Value) -> Option<String> {
    let mut body = result.clone();
    if let Some(obj) = body.as_object_mut() {
        obj.remove("message");
        if obj.is_empty() {
            return None;
        }
    }
    let mut rendered = serde_json::to_string_pretty(&body).ok()?;
    if rendered.len() > 1200 {
        let mut end = 1200;
        while end > 0 && !rendered.is_char_boundary(end) {
            end -= 1;
        }
        rendered.truncate(end);
        rendered.push_str("\n... (resultado truncado)");
    }
    Some(rendered)
}
