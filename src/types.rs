use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sentinel action name meaning "no action matched, answer conversationally".
pub const FREE_CONVERSATION: &str = "conversa_livre";

/// Parameter mapping passed to action handlers, keyed by declared param name.
pub type Params = Map<String, Value>;

/// Which classifier stage produced an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentSource {
    /// LLM classification endpoint.
    Remote,
    /// Deterministic keyword/regex fallback.
    Local,
}

/// The classifier's resolved guess for one utterance.
///
/// Constructed fresh by whichever stage resolves the utterance and consumed
/// immediately by the orchestrator; never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    /// A registered action name, or [`FREE_CONVERSATION`].
    pub action: String,
    #[serde(default)]
    pub params: Params,
    /// Parameter names the classifier believes are still unknown, in the
    /// order it wants them asked for.
    #[serde(default)]
    pub missing_params: Vec<String>,
    /// Informational only — never gates execution.
    #[serde(default)]
    pub confidence: f64,
    /// Optional status line to show the user while the action runs.
    #[serde(default)]
    pub message: Option<String>,
    pub source: IntentSource,
    /// True when this result was served from the classification cache.
    #[serde(default)]
    pub cached: bool,
}

impl IntentResult {
    /// The free-conversation fallback for an utterance no pattern claimed.
    pub fn free_conversation(utterance: &str) -> Self {
        let mut params = Params::new();
        params.insert("mensagem".into(), Value::String(utterance.to_string()));
        Self {
            action: FREE_CONVERSATION.to_string(),
            params,
            missing_params: Vec::new(),
            confidence: 0.5,
            message: None,
            source: IntentSource::Local,
            cached: false,
        }
    }

    pub fn is_free_conversation(&self) -> bool {
        self.action == FREE_CONVERSATION
    }
}

/// Uniform success/failure wrapper returned by the executor.
///
/// Exactly one of `result`/`error` is populated, gated by `success`; the
/// constructors below are the only way these are built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEnvelope {
    pub success: bool,
    pub action: String,
    /// Opaque handler payload. Shape is handler-specific; nothing in the
    /// executor or orchestrator matches on it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// On unknown-action failures, the full list of valid names so the
    /// caller can self-correct.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_actions: Option<Vec<String>>,
}

impl ExecutionEnvelope {
    pub fn ok(action: &str, result: Value) -> Self {
        Self {
            success: true,
            action: action.to_string(),
            result: Some(result),
            error: None,
            available_actions: None,
        }
    }

    pub fn failure(action: &str, error: String) -> Self {
        Self {
            success: false,
            action: action.to_string(),
            result: None,
            error: Some(error),
            available_actions: None,
        }
    }

    pub fn unknown_action(action: &str, available: Vec<String>) -> Self {
        Self {
            success: false,
            action: action.to_string(),
            result: None,
            error: Some(format!("Ação \"{}\" não encontrada", action)),
            available_actions: Some(available),
        }
    }
}

/// One turn of conversation history kept by a chat session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}
