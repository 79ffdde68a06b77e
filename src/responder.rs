use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use tracing::warn;

use crate::config::ResponderConfig;
use crate::types::{ChatTurn, TurnRole};

const PERSONA: &str = "Você é a Doce, uma assistente IA amigável e carismática. \
Você ajuda o usuário com orçamentos, busca de produtos, planilhas e emails, \
e conversa naturalmente sobre qualquer outro assunto, como uma amiga de WhatsApp. \
Seja calorosa e direta; use emojis ocasionalmente.";

const APOLOGY: &str = "Desculpe, tive um problema de conexão. Pode tentar novamente? 🙏";

/// Open-ended conversational responder for utterances no action claimed.
///
/// With credentials it calls an OpenAI-compatible chat completions endpoint;
/// without them it falls back to the canned offline replies, so the chat
/// always answers something.
pub struct Responder {
    chat: Option<ChatCompletions>,
    max_history: usize,
}

struct ChatCompletions {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl Responder {
    pub fn from_config(config: &ResponderConfig) -> Self {
        let chat = if config.api_key.is_empty() {
            None
        } else {
            Some(ChatCompletions {
                client: Client::builder()
                    .timeout(Duration::from_secs(60))
                    .build()
                    .expect("failed to build HTTP client"),
                base_url: config.base_url.trim_end_matches('/').to_string(),
                api_key: config.api_key.clone(),
                model: config.model.clone(),
            })
        };
        Self {
            chat,
            max_history: config.max_history,
        }
    }

    /// Never fails: connection problems become an apology line.
    pub async fn reply(&self, history: &[ChatTurn], utterance: &str) -> String {
        let Some(chat) = &self.chat else {
            return simulated_reply(history, utterance).to_string();
        };
        match self.complete(chat, history, utterance).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Conversational completion failed");
                APOLOGY.to_string()
            }
        }
    }

    async fn complete(
        &self,
        chat: &ChatCompletions,
        history: &[ChatTurn],
        utterance: &str,
    ) -> anyhow::Result<String> {
        let mut messages = vec![json!({ "role": "system", "content": PERSONA })];
        let start = history.len().saturating_sub(self.max_history);
        for turn in &history[start..] {
            let role = match turn.role {
                TurnRole::User => "user",
                TurnRole::Assistant => "assistant",
            };
            messages.push(json!({ "role": role, "content": turn.content }));
        }
        messages.push(json!({ "role": "user", "content": utterance }));

        let body = json!({
            "model": chat.model,
            "messages": messages,
            "temperature": 0.7,
            "max_tokens": 1024,
        });
        let resp = chat
            .client
            .post(format!("{}/chat/completions", chat.base_url))
            .bearer_auth(&chat.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let data: Value = resp.json().await?;
        data["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| anyhow::anyhow!("resposta sem choices"))
    }
}

/// Canned offline replies: a warm introduction on the first exchange, then
/// topic-keyed suggestions.
fn simulated_reply(history: &[ChatTurn], utterance: &str) -> &'static str {
    let first_exchange = !history.iter().any(|t| t.role == TurnRole::Assistant);
    if first_exchange {
        return greeting();
    }

    let lower = utterance.to_lowercase();
    if lower.contains("trabalho") || lower.contains("emprego") || lower.contains("vaga") {
        "Legal! 💼 Posso te ajudar com o lado profissional: orçamentos para clientes, \
         planilhas de controle e busca de produtos nos catálogos. Por onde começamos?"
    } else if lower.contains("empresa") || lower.contains("negócio") || lower.contains("empreend") {
        "Adoro falar de negócios! 🚀 Me conta o que sua empresa precisa — posso montar \
         orçamentos, organizar planilhas e pesquisar equipamentos nos sites parceiros."
    } else if lower.contains("amigo") || lower.contains("conversar") || lower.contains("social") {
        "Tô aqui pra isso também! 😎 Pode puxar papo sobre qualquer assunto. E quando \
         precisar de algo prático, é só pedir um orçamento ou uma busca."
    } else {
        "Hmm, interessante! Me conta mais sobre o que você precisa?\n\n\
         Posso te ajudar com:\n\
         - 📋 Gerar e buscar orçamentos\n\
         - 🔎 Pesquisar produtos no Saintyco e no Countec\n\
         - 📊 Criar e atualizar planilhas\n\
         - 📧 Consultar seus emails\n\n\
         O que combina com você agora? 😊"
    }
}

/// Opening message shown when a session starts.
pub fn greeting() -> &'static str {
    "Olá! 🍬 Que bom te ver por aqui!\n\n\
     Eu sou a Doce, sua assistente pessoal. Posso gerar orçamentos, buscar \
     produtos nos catálogos Saintyco e Countec, cuidar de planilhas e \
     consultar seus emails.\n\n\
     Como posso te ajudar hoje? É só me contar o que você precisa! 😊"
}
