use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde_json::{json, Value};

use super::Action;
use crate::config::SheetsConfig;
use crate::types::Params;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Google Sheets v4 REST client. Without an access token every operation
/// answers with a needs-auth payload instead of failing, so the chat keeps
/// flowing and tells the user what to configure.
pub struct SheetsClient {
    client: Client,
    access_token: String,
    api_base: String,
}

impl SheetsClient {
    pub fn new(config: &SheetsConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            access_token: config.access_token.clone(),
            api_base: SHEETS_API.to_string(),
        }
    }

    fn authorized(&self) -> bool {
        !self.access_token.is_empty()
    }

    fn needs_auth(message: &str) -> Value {
        json!({ "needs_auth": true, "message": message })
    }

    async fn create(&self, nome: &str, abas: &[String], dados: &[Value]) -> anyhow::Result<Value> {
        let body = json!({
            "properties": { "title": nome },
            "sheets": abas.iter().map(|aba| json!({ "properties": { "title": aba } })).collect::<Vec<_>>(),
        });
        let resp: Value = self
            .client
            .post(&self.api_base)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let id = resp["spreadsheetId"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("resposta sem spreadsheetId"))?
            .to_string();
        if !dados.is_empty() {
            self.write_values(&id, &format!("{}!A1", abas[0]), dados, "substituir")
                .await?;
        }
        Ok(json!({
            "message": format!("Planilha \"{}\" criada!", nome),
            "id": id,
            "url": format!("https://docs.google.com/spreadsheets/d/{}", id),
        }))
    }

    async fn read(&self, id: &str, aba: &str, range: &str) -> anyhow::Result<Value> {
        let url = format!("{}/{}/values/{}!{}", self.api_base, id, aba, range);
        let resp: Value = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let dados = resp["values"].as_array().cloned().unwrap_or_default();
        Ok(json!({
            "linhas": dados.len(),
            "colunas": dados.first().and_then(Value::as_array).map_or(0, Vec::len),
            "dados": dados,
        }))
    }

    /// `modo` "adicionar" appends rows; anything else overwrites the range.
    async fn write_values(
        &self,
        id: &str,
        full_range: &str,
        dados: &[Value],
        modo: &str,
    ) -> anyhow::Result<()> {
        let body = json!({ "values": dados });
        let request = if modo == "adicionar" {
            let url = format!(
                "{}/{}/values/{}:append?valueInputOption=USER_ENTERED&insertDataOption=INSERT_ROWS",
                self.api_base, id, full_range
            );
            self.client.post(&url)
        } else {
            let url = format!(
                "{}/{}/values/{}?valueInputOption=USER_ENTERED",
                self.api_base, id, full_range
            );
            self.client.put(&url)
        };
        request
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Accept a bare spreadsheet id or a shared docs.google.com link.
pub(crate) fn extract_spreadsheet_id(value: &str) -> Option<&str> {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"/spreadsheets/d/([a-zA-Z0-9_-]+)").unwrap());
    if let Some(cap) = RE.captures(value) {
        return cap.get(1).map(|m| m.as_str());
    }
    if !value.is_empty() && !value.contains('/') {
        return Some(value);
    }
    None
}

fn planilha_id_param(params: &Params) -> anyhow::Result<&str> {
    params
        .get("planilha_id")
        .and_then(Value::as_str)
        .and_then(extract_spreadsheet_id)
        .ok_or_else(|| anyhow::anyhow!("Preciso do ID ou link da planilha"))
}

fn dados_param(params: &Params) -> Vec<Value> {
    params
        .get("dados")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

pub struct CriarPlanilhaAction {
    sheets: Arc<SheetsClient>,
}

impl CriarPlanilhaAction {
    pub fn new(sheets: Arc<SheetsClient>) -> Self {
        Self { sheets }
    }
}

#[async_trait]
impl Action for CriarPlanilhaAction {
    fn name(&self) -> &'static str {
        "criar_planilha"
    }
    fn description(&self) -> &'static str {
        "Cria nova planilha no Google Drive"
    }
    fn declared_params(&self) -> &'static [&'static str] {
        &["nome", "dados"]
    }
    fn difficulty(&self) -> &'static str {
        "medio"
    }

    async fn call(&self, params: &Params) -> anyhow::Result<Value> {
        if !self.sheets.authorized() {
            return Ok(SheetsClient::needs_auth(
                "Preciso de permissão para acessar o Google Sheets.",
            ));
        }
        let nome = params
            .get("nome")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Doce AI - {}", Utc::now().format("%d/%m/%Y")));
        let abas: Vec<String> = params
            .get("abas")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .filter(|abas: &Vec<String>| !abas.is_empty())
            .unwrap_or_else(|| vec!["Dados".to_string()]);
        self.sheets.create(&nome, &abas, &dados_param(params)).await
    }
}

pub struct AtualizarPlanilhaAction {
    sheets: Arc<SheetsClient>,
}

impl AtualizarPlanilhaAction {
    pub fn new(sheets: Arc<SheetsClient>) -> Self {
        Self { sheets }
    }
}

#[async_trait]
impl Action for AtualizarPlanilhaAction {
    fn name(&self) -> &'static str {
        "atualizar_planilha"
    }
    fn description(&self) -> &'static str {
        "Atualiza planilha existente"
    }
    fn declared_params(&self) -> &'static [&'static str] {
        &["planilha_id", "dados", "aba"]
    }
    fn difficulty(&self) -> &'static str {
        "medio"
    }

    async fn call(&self, params: &Params) -> anyhow::Result<Value> {
        if !self.sheets.authorized() {
            return Ok(SheetsClient::needs_auth(
                "Preciso de permissão para atualizar a planilha.",
            ));
        }
        let id = planilha_id_param(params)?;
        let aba = params.get("aba").and_then(Value::as_str).unwrap_or("Sheet1");
        let range = params.get("range").and_then(Value::as_str).unwrap_or("A1");
        let modo = params
            .get("modo")
            .and_then(Value::as_str)
            .unwrap_or("substituir");
        let dados = dados_param(params);

        self.sheets
            .write_values(id, &format!("{}!{}", aba, range), &dados, modo)
            .await?;
        Ok(json!({
            "message": "Planilha atualizada!",
            "linhas_afetadas": dados.len(),
        }))
    }
}

pub struct LerPlanilhaAction {
    sheets: Arc<SheetsClient>,
}

impl LerPlanilhaAction {
    pub fn new(sheets: Arc<SheetsClient>) -> Self {
        Self { sheets }
    }
}

#[async_trait]
impl Action for LerPlanilhaAction {
    fn name(&self) -> &'static str {
        "ler_planilha"
    }
    fn description(&self) -> &'static str {
        "Lê dados de uma planilha"
    }
    fn declared_params(&self) -> &'static [&'static str] {
        &["planilha_id", "range"]
    }
    fn difficulty(&self) -> &'static str {
        "medio"
    }

    async fn call(&self, params: &Params) -> anyhow::Result<Value> {
        if !self.sheets.authorized() {
            return Ok(SheetsClient::needs_auth(
                "Preciso de permissão para ler a planilha.",
            ));
        }
        let id = planilha_id_param(params)?;
        let aba = params.get("aba").and_then(Value::as_str).unwrap_or("Sheet1");
        let range = params
            .get("range")
            .and_then(Value::as_str)
            .unwrap_or("A1:Z1000");
        self.sheets.read(id, aba, range).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unauthorized() -> Arc<SheetsClient> {
        Arc::new(SheetsClient::new(&SheetsConfig::default()))
    }

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn spreadsheet_id_comes_from_link_or_bare_id() {
        assert_eq!(
            extract_spreadsheet_id("https://docs.google.com/spreadsheets/d/1aB_c-3/edit#gid=0"),
            Some("1aB_c-3")
        );
        assert_eq!(extract_spreadsheet_id("1aB_c-3"), Some("1aB_c-3"));
        assert_eq!(extract_spreadsheet_id(""), None);
        assert_eq!(extract_spreadsheet_id("https://example.com/nope"), None);
    }

    #[tokio::test]
    async fn missing_token_yields_needs_auth_payload() {
        let result = CriarPlanilhaAction::new(unauthorized())
            .call(&params(json!({ "nome": "Fornecedores" })))
            .await
            .unwrap();
        assert_eq!(result["needs_auth"], true);

        let result = LerPlanilhaAction::new(unauthorized())
            .call(&params(json!({ "planilha_id": "abc" })))
            .await
            .unwrap();
        assert_eq!(result["needs_auth"], true);
    }

    #[tokio::test]
    async fn update_without_id_is_a_handler_failure() {
        let sheets = Arc::new(SheetsClient {
            client: Client::new(),
            access_token: "token".to_string(),
            api_base: SHEETS_API.to_string(),
        });
        let err = AtualizarPlanilhaAction::new(sheets)
            .call(&Params::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ID ou link"));
    }
}
