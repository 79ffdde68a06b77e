use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::orcamentos::formatar_orcamento;
use super::Action;
use crate::store::{now_rfc3339, DocStore, Orcamento};
use crate::types::Params;

fn str_param<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Persist a quote into the local document store.
pub struct SalvarOrcamentoAction {
    store: Arc<DocStore>,
}

impl SalvarOrcamentoAction {
    pub fn new(store: Arc<DocStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for SalvarOrcamentoAction {
    fn name(&self) -> &'static str {
        "salvar_orcamento"
    }
    fn description(&self) -> &'static str {
        "Salva orçamento no banco de dados local"
    }
    fn declared_params(&self) -> &'static [&'static str] {
        &["orcamento", "imagens", "specs"]
    }
    fn difficulty(&self) -> &'static str {
        "facil"
    }

    async fn call(&self, params: &Params) -> anyhow::Result<Value> {
        // Accept either a nested "orcamento" object or flat fields, since
        // both shapes show up in classified parameters.
        let empty = Params::new();
        let fields = params
            .get("orcamento")
            .and_then(Value::as_object)
            .unwrap_or(&empty);
        let get = |key: &str| fields.get(key).or_else(|| params.get(key));

        let now = now_rfc3339();
        let orcamento = Orcamento {
            id: String::new(),
            cliente: get("cliente")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            itens: get("itens")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            valor_total: get("valor_total").and_then(Value::as_f64).unwrap_or(0.0),
            imagens: get("imagens")
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            specs: get("specs")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            origem: get("origem")
                .and_then(Value::as_str)
                .unwrap_or("manual")
                .to_string(),
            criado_em: now.clone(),
            atualizado_em: now,
        };

        let saved = self.store.save_orcamento(orcamento).await?;
        Ok(json!({
            "message": "Orçamento salvo com sucesso!",
            "orcamento": saved,
        }))
    }
}

/// Search saved quotes by free term, client and creation date.
pub struct BuscarOrcamentoAction {
    store: Arc<DocStore>,
}

impl BuscarOrcamentoAction {
    pub fn new(store: Arc<DocStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for BuscarOrcamentoAction {
    fn name(&self) -> &'static str {
        "buscar_orcamento"
    }
    fn description(&self) -> &'static str {
        "Busca orçamento salvo no banco de dados"
    }
    fn declared_params(&self) -> &'static [&'static str] {
        &["termo", "data", "cliente"]
    }
    fn difficulty(&self) -> &'static str {
        "facil"
    }

    async fn call(&self, params: &Params) -> anyhow::Result<Value> {
        let encontrados = self
            .store
            .find_orcamentos(
                str_param(params, "termo"),
                str_param(params, "cliente"),
                str_param(params, "data"),
            )
            .await;
        let resumo: Vec<String> = encontrados.iter().map(formatar_orcamento).collect();
        Ok(json!({
            "encontrados": encontrados.len(),
            "orcamentos": encontrados,
            "resumo": resumo,
        }))
    }
}

/// List saved quotes, most recent (or highest value) first.
pub struct ListarOrcamentosAction {
    store: Arc<DocStore>,
}

impl ListarOrcamentosAction {
    pub fn new(store: Arc<DocStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for ListarOrcamentosAction {
    fn name(&self) -> &'static str {
        "listar_orcamentos"
    }
    fn description(&self) -> &'static str {
        "Lista todos os orçamentos salvos"
    }
    fn declared_params(&self) -> &'static [&'static str] {
        &["filtro", "limite"]
    }
    fn difficulty(&self) -> &'static str {
        "facil"
    }

    async fn call(&self, params: &Params) -> anyhow::Result<Value> {
        let limite = params
            .get("limite")
            .and_then(Value::as_u64)
            .unwrap_or(10) as usize;
        let ordem = params
            .get("ordem")
            .and_then(Value::as_str)
            .unwrap_or("recente");
        let (total, orcamentos) = self.store.list_orcamentos(limite, ordem).await;
        let resumo: Vec<String> = orcamentos.iter().map(formatar_orcamento).collect();
        Ok(json!({
            "total": total,
            "mostrando": orcamentos.len(),
            "orcamentos": orcamentos,
            "resumo": resumo,
        }))
    }
}

/// Look up technical specifications for a stored product.
pub struct BuscarSpecsAction {
    store: Arc<DocStore>,
}

impl BuscarSpecsAction {
    pub fn new(store: Arc<DocStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for BuscarSpecsAction {
    fn name(&self) -> &'static str {
        "buscar_specs_produto"
    }
    fn description(&self) -> &'static str {
        "Busca especificações técnicas de produto"
    }
    fn declared_params(&self) -> &'static [&'static str] {
        &["produto", "fabricante"]
    }
    fn difficulty(&self) -> &'static str {
        "facil"
    }

    async fn call(&self, params: &Params) -> anyhow::Result<Value> {
        let produto = str_param(params, "produto").unwrap_or_default();
        let encontrados = self
            .store
            .find_specs(produto, str_param(params, "fabricante"))
            .await;

        if encontrados.is_empty() {
            return Ok(json!({
                "encontrado": false,
                "message": format!("Nenhum produto encontrado para \"{}\"", produto),
                "sugestao": "Posso buscar nos sites Saintyco ou Countec?",
            }));
        }
        Ok(json!({
            "encontrado": true,
            "produtos": encontrados,
        }))
    }
}
