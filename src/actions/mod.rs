mod database;
mod emails;
mod orcamentos;
mod planilhas;
mod scraping;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

pub use database::{
    BuscarOrcamentoAction, BuscarSpecsAction, ListarOrcamentosAction, SalvarOrcamentoAction,
};
pub use emails::{ConsultarEmailsAction, EmailHub, ResumirEmailAction};
pub use orcamentos::{calcular_orcamento, formatar_orcamento, GerarOrcamentoAction};
pub use planilhas::{
    AtualizarPlanilhaAction, CriarPlanilhaAction, LerPlanilhaAction, SheetsClient,
};
pub use scraping::{BaixarArquivoAction, BuscarProdutoAction, CatalogSearcher};

use crate::config::AppConfig;
use crate::store::DocStore;
use crate::types::{ExecutionEnvelope, Params};

/// A named, registered operation. Metadata is registered once at startup;
/// `declared_params` documents the expected parameter names but is never
/// enforced as a schema. Handlers read what they need from the mapping.
#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn declared_params(&self) -> &'static [&'static str];
    fn category(&self) -> &'static str {
        "trabalho"
    }
    /// "facil", "medio" or "avancado". Display metadata only.
    fn difficulty(&self) -> &'static str;

    /// Execute with the parameters exactly as classified — no coercion.
    /// Failures are reported with a human-readable message; the executor
    /// converts them into failure envelopes.
    async fn call(&self, params: &Params) -> anyhow::Result<Value>;
}

/// Display row returned by [`ActionRegistry::list_by_category`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ActionSummary {
    pub name: &'static str,
    pub description: &'static str,
    pub difficulty: &'static str,
}

/// Read-only lookup table of every action the assistant can perform.
/// Populated once at startup; insertion order is preserved for listings
/// and for the capability block sent to the remote classifier.
pub struct ActionRegistry {
    order: Vec<Arc<dyn Action>>,
    index: HashMap<&'static str, usize>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Startup-only registration. Duplicate names are a wiring bug.
    pub fn register(&mut self, action: Arc<dyn Action>) {
        let name = action.name();
        assert!(
            !self.index.contains_key(name),
            "duplicate action registered: {name}"
        );
        self.index.insert(name, self.order.len());
        self.order.push(action);
    }

    /// Case-sensitive exact-match lookup.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Action>> {
        self.index.get(name).map(|&i| &self.order[i])
    }

    pub fn names(&self) -> Vec<String> {
        self.order.iter().map(|a| a.name().to_string()).collect()
    }

    pub fn list_by_category(&self, category: &str) -> Vec<ActionSummary> {
        self.order
            .iter()
            .filter(|a| a.category() == category)
            .map(|a| ActionSummary {
                name: a.name(),
                description: a.description(),
                difficulty: a.difficulty(),
            })
            .collect()
    }

    /// Capability list embedded in the remote classifier's instructions,
    /// one `- name: description (params: ...)` line per action.
    pub fn render_capabilities(&self) -> String {
        self.order
            .iter()
            .map(|a| {
                format!(
                    "- {}: {} (params: {})",
                    a.name(),
                    a.description(),
                    a.declared_params().join(", ")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Run the named action and normalize the outcome. This is the only
    /// blanket error boundary in the system: handler failures come back as
    /// failure envelopes, never as errors to the caller.
    pub async fn execute(&self, name: &str, params: &Params) -> ExecutionEnvelope {
        let Some(action) = self.get(name) else {
            return ExecutionEnvelope::unknown_action(name, self.names());
        };

        let params_value = Value::Object(params.clone());
        info!(action = name, params = %params_value, "Executando ação");

        match action.call(params).await {
            Ok(result) => ExecutionEnvelope::ok(name, result),
            Err(e) => {
                error!(action = name, error = %e, "Ação falhou");
                ExecutionEnvelope::failure(name, e.to_string())
            }
        }
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Wire up every built-in action against the shared collaborators.
pub fn builtin_registry(store: Arc<DocStore>, config: &AppConfig) -> ActionRegistry {
    let searcher = Arc::new(CatalogSearcher::new(store.clone()));
    let sheets = Arc::new(SheetsClient::new(&config.sheets));
    let email_hub = Arc::new(EmailHub::new(&config.email));

    let mut registry = ActionRegistry::new();

    // Quotes
    registry.register(Arc::new(GerarOrcamentoAction::new(&config.quotes)));
    registry.register(Arc::new(BuscarOrcamentoAction::new(store.clone())));
    registry.register(Arc::new(ListarOrcamentosAction::new(store.clone())));

    // Spreadsheets
    registry.register(Arc::new(CriarPlanilhaAction::new(sheets.clone())));
    registry.register(Arc::new(AtualizarPlanilhaAction::new(sheets.clone())));
    registry.register(Arc::new(LerPlanilhaAction::new(sheets)));

    // Catalog scraping
    registry.register(Arc::new(BuscarProdutoAction::saintyco(searcher.clone())));
    registry.register(Arc::new(BuscarProdutoAction::countec(searcher.clone())));
    registry.register(Arc::new(BaixarArquivoAction::new()));

    // Local database
    registry.register(Arc::new(SalvarOrcamentoAction::new(store.clone())));
    registry.register(Arc::new(BuscarSpecsAction::new(store)));

    // Email hub
    registry.register(Arc::new(ConsultarEmailsAction::new(email_hub.clone())));
    registry.register(Arc::new(ResumirEmailAction::new(email_hub)));

    registry
}
