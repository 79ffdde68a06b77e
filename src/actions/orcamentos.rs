use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::info;

use super::scraping::percent_encode;
use super::Action;
use crate::config::QuotesConfig;
use crate::store::Orcamento;
use crate::types::Params;

/// Generate a quote through the external quote-builder site.
///
/// Two-stage pipeline, in order: the builder's JSON API, then a prefilled
/// deep link the user opens themselves. A failing API stage is not an
/// error; the link stage always produces an answer.
pub struct GerarOrcamentoAction {
    client: Client,
    base_url: String,
}

impl GerarOrcamentoAction {
    pub fn new(config: &QuotesConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn via_api(&self, dados: &Value) -> anyhow::Result<Value> {
        let resp = self
            .client
            .post(format!("{}/api/orcamento", self.base_url))
            .json(dados)
            .send()
            .await?;
        if !resp.status().is_success() {
            anyhow::bail!("quote API answered {}", resp.status());
        }
        let orcamento: Value = resp.json().await?;
        let url = orcamento
            .get("id")
            .and_then(Value::as_str)
            .map(|id| format!("{}/orcamento/{}", self.base_url, id));
        Ok(json!({
            "modo": "api",
            "message": "Orçamento criado com sucesso!",
            "orcamento": orcamento,
            "url": url,
        }))
    }

    fn via_link(&self, dados: &Value) -> Value {
        let cliente = dados["cliente"].as_str().unwrap_or_default();
        let url = format!(
            "{}?cliente={}&origem=doce_ai",
            self.base_url,
            percent_encode(cliente)
        );
        json!({
            "modo": "link",
            "message": "Abrindo Local Orçamentos...",
            "url": url,
            "dados": dados,
        })
    }
}

#[async_trait]
impl Action for GerarOrcamentoAction {
    fn name(&self) -> &'static str {
        "gerar_orcamento"
    }
    fn description(&self) -> &'static str {
        "Gera um novo orçamento no Local Orçamentos"
    }
    fn declared_params(&self) -> &'static [&'static str] {
        &["cliente", "itens", "imagens"]
    }
    fn difficulty(&self) -> &'static str {
        "facil"
    }

    async fn call(&self, params: &Params) -> anyhow::Result<Value> {
        let itens = params
            .get("itens")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let desconto = params.get("desconto").and_then(Value::as_f64).unwrap_or(0.0);
        let imposto = params.get("imposto").and_then(Value::as_f64).unwrap_or(0.0);

        let dados = json!({
            "cliente": params.get("cliente").and_then(Value::as_str).unwrap_or_default(),
            "itens": itens,
            "imagens": params.get("imagens").and_then(Value::as_array).cloned().unwrap_or_default(),
            "valores": calcular_orcamento(&itens, desconto, imposto),
            "origem": "doce_ai",
            "timestamp": Utc::now().to_rfc3339(),
        });

        match self.via_api(&dados).await {
            Ok(result) => Ok(result),
            Err(e) => {
                info!(error = %e, "Quote API unavailable, answering with deep link");
                Ok(self.via_link(&dados))
            }
        }
    }
}

/// Quote arithmetic: per-item totals, then discount, then tax on the
/// discounted amount.
pub fn calcular_orcamento(itens: &[Value], desconto: f64, imposto: f64) -> Value {
    let mut subtotal = 0.0;
    let itens_calculados: Vec<Value> = itens
        .iter()
        .map(|item| {
            let preco = item.get("preco").and_then(Value::as_f64).unwrap_or(0.0);
            let quantidade = item.get("quantidade").and_then(Value::as_f64).unwrap_or(1.0);
            let valor_item = preco * quantidade;
            subtotal += valor_item;
            let mut calculado = item.clone();
            if let Some(obj) = calculado.as_object_mut() {
                obj.insert("valor_total".into(), json!(valor_item));
            }
            calculado
        })
        .collect();

    let valor_desconto = subtotal * (desconto / 100.0);
    let com_desconto = subtotal - valor_desconto;
    let valor_imposto = com_desconto * (imposto / 100.0);
    let total = com_desconto + valor_imposto;

    json!({
        "itens": itens_calculados,
        "subtotal": subtotal,
        "desconto": { "percentual": desconto, "valor": valor_desconto },
        "imposto": { "percentual": imposto, "valor": valor_imposto },
        "total": total,
    })
}

/// Render a stored quote for chat display.
pub fn formatar_orcamento(orcamento: &Orcamento) -> String {
    let mut linhas = vec![
        "📋 ORÇAMENTO".to_string(),
        format!(
            "Cliente: {}",
            if orcamento.cliente.is_empty() {
                "Não informado"
            } else {
                orcamento.cliente.as_str()
            }
        ),
        format!("Data: {}", &orcamento.criado_em[..orcamento.criado_em.len().min(10)]),
        "Itens:".to_string(),
    ];

    if orcamento.itens.is_empty() {
        linhas.push("(Nenhum item)".to_string());
    } else {
        for (i, item) in orcamento.itens.iter().enumerate() {
            linhas.push(format!(
                "{}. {} - {}x - R$ {:.2}",
                i + 1,
                item.get("nome").and_then(Value::as_str).unwrap_or("item"),
                item.get("quantidade").and_then(Value::as_f64).unwrap_or(1.0),
                item.get("preco").and_then(Value::as_f64).unwrap_or(0.0),
            ));
        }
    }

    linhas.push(format!("TOTAL: R$ {:.2}", orcamento.valor_total));
    linhas.join("\n")
}
