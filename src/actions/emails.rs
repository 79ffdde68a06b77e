use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::Action;
use crate::cache::TtlCache;
use crate::config::EmailConfig;
use crate::types::Params;

/// The email hub only has a web interface, so queries are answered with
/// step-by-step instructions plus the exact question to paste there.
/// Identical queries within the freshness window are served from cache.
pub struct EmailHub {
    hub_url: String,
    cache: TtlCache<Value>,
}

impl EmailHub {
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            hub_url: config.hub_url.clone(),
            cache: TtlCache::new(Duration::from_secs(config.cache_ttl_secs)),
        }
    }

    /// Natural-language hub query from whatever fields were classified.
    fn build_query(params: &Params) -> String {
        let get = |key: &str| params.get(key).and_then(Value::as_str).filter(|s| !s.is_empty());
        let mut query = String::from("Encontre emails");
        if let Some(remetente) = get("remetente") {
            query.push_str(&format!(" de {}", remetente));
        }
        if let Some(assunto) = get("assunto") {
            query.push_str(&format!(" sobre \"{}\"", assunto));
        }
        if let Some(termo) = get("termo") {
            query.push_str(&format!(" que mencionam \"{}\"", termo));
        }
        if let Some(data) = get("data") {
            query.push_str(&format!(" de {}", data));
        }
        query
    }

    async fn consultar(&self, params: &Params) -> Value {
        // serde_json::Map is ordered, so serializing the full parameter set
        // is a canonical key: exact structural equality, as required.
        let key = Value::Object(params.clone()).to_string();
        if let Some(mut hit) = self.cache.get(&key).await {
            if let Some(obj) = hit.as_object_mut() {
                obj.insert("from_cache".into(), json!(true));
            }
            return hit;
        }

        let query = Self::build_query(params);
        let assunto = params
            .get("termo")
            .or_else(|| params.get("assunto"))
            .and_then(Value::as_str)
            .unwrap_or("sua consulta");
        let payload = json!({
            "modo": "manual",
            "message": format!("Para buscar emails sobre \"{}\":", assunto),
            "instrucoes": [
                format!("1. Abra o hub de emails: {}", self.hub_url),
                format!("2. Pergunte: \"{}\"", query),
                "3. Copie a resposta e cole aqui",
            ],
            "query": query,
            "url": self.hub_url,
        });
        self.cache.insert(key, payload.clone()).await;
        payload
    }
}

pub struct ConsultarEmailsAction {
    hub: Arc<EmailHub>,
}

impl ConsultarEmailsAction {
    pub fn new(hub: Arc<EmailHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl Action for ConsultarEmailsAction {
    fn name(&self) -> &'static str {
        "consultar_emails"
    }
    fn description(&self) -> &'static str {
        "Consulta emails via hub de emails"
    }
    fn declared_params(&self) -> &'static [&'static str] {
        &["termo", "remetente", "data"]
    }
    fn difficulty(&self) -> &'static str {
        "avancado"
    }

    async fn call(&self, params: &Params) -> anyhow::Result<Value> {
        Ok(self.hub.consultar(params).await)
    }
}

pub struct ResumirEmailAction {
    hub: Arc<EmailHub>,
}

impl ResumirEmailAction {
    pub fn new(hub: Arc<EmailHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl Action for ResumirEmailAction {
    fn name(&self) -> &'static str {
        "resumir_email"
    }
    fn description(&self) -> &'static str {
        "Pede resumo de email específico"
    }
    fn declared_params(&self) -> &'static [&'static str] {
        &["assunto", "remetente"]
    }
    fn difficulty(&self) -> &'static str {
        "avancado"
    }

    async fn call(&self, params: &Params) -> anyhow::Result<Value> {
        let get = |key: &str| params.get(key).and_then(Value::as_str).filter(|s| !s.is_empty());
        let mut query = String::from("Resuma o email");
        if let Some(remetente) = get("remetente") {
            query.push_str(&format!(" de {}", remetente));
        }
        if let Some(assunto) = get("assunto") {
            query.push_str(&format!(" sobre \"{}\"", assunto));
        }
        Ok(json!({
            "modo": "manual",
            "message": "Para resumir este email:",
            "instrucoes": [
                format!("1. Abra o hub de emails: {}", self.hub.hub_url),
                format!("2. Pergunte: \"{}\"", query),
                "3. Cole o resumo aqui",
            ],
            "query": query,
            "url": self.hub.hub_url,
        }))
    }
}
