use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

/// Most recent history entries kept per document.
const HISTORY_CAP: usize = 100;

/// A saved quote.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Orcamento {
    pub id: String,
    pub cliente: String,
    #[serde(default)]
    pub itens: Vec<Value>,
    #[serde(default)]
    pub valor_total: f64,
    #[serde(default)]
    pub imagens: Vec<String>,
    #[serde(default)]
    pub specs: Vec<Value>,
    /// Where the quote came from: "manual", "doce_ai", "importado".
    #[serde(default)]
    pub origem: String,
    pub criado_em: String,
    pub atualizado_em: String,
}

/// A product with technical specifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Produto {
    pub id: String,
    pub nome: String,
    #[serde(default)]
    pub fabricante: String,
    #[serde(default)]
    pub specs: Value,
    #[serde(default)]
    pub preco: Option<f64>,
    #[serde(default)]
    pub imagem: Option<String>,
    #[serde(default = "default_categoria")]
    pub categoria: String,
    pub criado_em: String,
}

fn default_categoria() -> String {
    "geral".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricoEntry {
    pub id: String,
    pub acao: String,
    #[serde(default)]
    pub dados: Value,
    #[serde(default)]
    pub resultado: Value,
    pub timestamp: String,
}

/// A catalog site the scraping collaborator knows how to search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteConfig {
    pub id: String,
    pub nome: String,
    pub base_url: String,
    /// Prefix the urlencoded search term is appended to.
    pub search_url: String,
    #[serde(default = "default_true")]
    pub ativo: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreMeta {
    criado_em: String,
    versao: String,
}

/// The on-disk document. One JSON file, whole-document writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Database {
    #[serde(default)]
    orcamentos: Vec<Orcamento>,
    #[serde(default)]
    produtos: Vec<Produto>,
    #[serde(default)]
    specs: Vec<Value>,
    #[serde(default)]
    historico: Vec<HistoricoEntry>,
    #[serde(default)]
    sites_scraping: Vec<SiteConfig>,
    config: StoreMeta,
}

impl Database {
    fn initial() -> Self {
        Self {
            orcamentos: Vec::new(),
            produtos: Vec::new(),
            specs: Vec::new(),
            historico: Vec::new(),
            sites_scraping: vec![
                SiteConfig {
                    id: "saintyco".to_string(),
                    nome: "Saintyco".to_string(),
                    base_url: "https://www.saintyco.com/pt/".to_string(),
                    search_url: "https://www.saintyco.com/pt/?s=".to_string(),
                    ativo: true,
                },
                SiteConfig {
                    id: "countec".to_string(),
                    nome: "Countec Group".to_string(),
                    base_url: "https://countec-group.com/en/sub/sub02_01.php".to_string(),
                    search_url: "https://countec-group.com/en/sub/sub02_01.php?search=".to_string(),
                    ativo: true,
                },
            ],
            config: StoreMeta {
                criado_em: Utc::now().to_rfc3339(),
                versao: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }
}

/// JSON document store for quotes, products, history and scraping sites.
///
/// The core never touches this directly — only registered action handlers
/// do. A corrupt or missing file yields a fresh initial document rather
/// than an error, so the assistant always comes up.
pub struct DocStore {
    path: PathBuf,
    db: RwLock<Database>,
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

impl DocStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let db = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(db) => db,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Corrupt store file, starting fresh");
                    Database::initial()
                }
            },
            Err(_) => Database::initial(),
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
            db: RwLock::new(db),
        })
    }

    async fn persist(&self, db: &Database) -> anyhow::Result<()> {
        let raw = serde_json::to_string_pretty(db)?;
        tokio::fs::write(&self.path, raw).await?;
        Ok(())
    }

    // === Quotes ===

    pub async fn save_orcamento(&self, mut orcamento: Orcamento) -> anyhow::Result<Orcamento> {
        if orcamento.id.is_empty() {
            orcamento.id = new_id();
        }
        let mut db = self.db.write().await;
        db.orcamentos.push(orcamento.clone());
        self.persist(&db).await?;
        Ok(orcamento)
    }

    /// Filter quotes by free term (client name or item name), client and
    /// RFC3339 date prefix. All filters are optional and conjunctive.
    pub async fn find_orcamentos(
        &self,
        termo: Option<&str>,
        cliente: Option<&str>,
        data: Option<&str>,
    ) -> Vec<Orcamento> {
        let db = self.db.read().await;
        db.orcamentos
            .iter()
            .filter(|orc| {
                let termo_ok = termo.map_or(true, |t| {
                    let t = t.to_lowercase();
                    orc.cliente.to_lowercase().contains(&t)
                        || orc.itens.iter().any(|item| {
                            item.get("nome")
                                .and_then(Value::as_str)
                                .map_or(false, |nome| nome.to_lowercase().contains(&t))
                        })
                });
                let cliente_ok = cliente.map_or(true, |c| {
                    orc.cliente.to_lowercase().contains(&c.to_lowercase())
                });
                let data_ok = data.map_or(true, |d| orc.criado_em.starts_with(d));
                termo_ok && cliente_ok && data_ok
            })
            .cloned()
            .collect()
    }

    /// Most recent (or highest-value) quotes, up to `limite`.
    pub async fn list_orcamentos(&self, limite: usize, ordem: &str) -> (usize, Vec<Orcamento>) {
        let db = self.db.read().await;
        let mut orcamentos = db.orcamentos.clone();
        match ordem {
            "valor" => orcamentos.sort_by(|a, b| {
                b.valor_total
                    .partial_cmp(&a.valor_total)
                    .unwrap_or(std::cmp::Ordering::Equal)
            }),
            _ => orcamentos.sort_by(|a, b| b.criado_em.cmp(&a.criado_em)),
        }
        orcamentos.truncate(limite);
        (db.orcamentos.len(), orcamentos)
    }

    // === Products ===

    /// Products are written by import flows that live outside the chat
    /// core; the registry only exercises the specs search below.
    #[allow(dead_code)]
    pub async fn save_produto(&self, mut produto: Produto) -> anyhow::Result<Produto> {
        if produto.id.is_empty() {
            produto.id = new_id();
        }
        let mut db = self.db.write().await;
        db.produtos.push(produto.clone());
        self.persist(&db).await?;
        Ok(produto)
    }

    pub async fn find_specs(&self, produto: &str, fabricante: Option<&str>) -> Vec<Produto> {
        let termo = produto.to_lowercase();
        let db = self.db.read().await;
        db.produtos
            .iter()
            .filter(|p| {
                let nome_ok = p.nome.to_lowercase().contains(&termo);
                let fab_ok = fabricante.map_or(true, |f| {
                    p.fabricante.to_lowercase().contains(&f.to_lowercase())
                });
                nome_ok && fab_ok
            })
            .cloned()
            .collect()
    }

    // === Scraping sites ===

    pub async fn list_sites(&self) -> Vec<SiteConfig> {
        self.db.read().await.sites_scraping.clone()
    }

    pub async fn find_site(&self, id: &str) -> Option<SiteConfig> {
        self.db
            .read()
            .await
            .sites_scraping
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    /// The scraping collaborator may grow its own site table; the action
    /// registry itself stays immutable.
    pub async fn add_site(&self, site: SiteConfig) -> anyhow::Result<()> {
        let mut db = self.db.write().await;
        db.sites_scraping.retain(|s| s.id != site.id);
        db.sites_scraping.push(site);
        self.persist(&db).await?;
        Ok(())
    }

    // === History ===

    pub async fn record_history(
        &self,
        acao: &str,
        dados: Value,
        resultado: Value,
    ) -> anyhow::Result<()> {
        let mut db = self.db.write().await;
        db.historico.push(HistoricoEntry {
            id: new_id(),
            acao: acao.to_string(),
            dados,
            resultado,
            timestamp: now_rfc3339(),
        });
        let len = db.historico.len();
        if len > HISTORY_CAP {
            db.historico.drain(..len - HISTORY_CAP);
        }
        self.persist(&db).await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn history_len(&self) -> usize {
        self.db.read().await.historico.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_store() -> (tempfile::TempDir, DocStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = DocStore::open(&dir.path().join("db.json")).unwrap();
        (dir, store)
    }

    fn quote(cliente: &str, criado_em: &str, valor: f64) -> Orcamento {
        Orcamento {
            id: String::new(),
            cliente: cliente.to_string(),
            itens: vec![json!({"nome": "misturador", "quantidade": 1, "preco": valor})],
            valor_total: valor,
            imagens: vec![],
            specs: vec![],
            origem: "manual".to_string(),
            criado_em: criado_em.to_string(),
            atualizado_em: criado_em.to_string(),
        }
    }

    #[tokio::test]
    async fn initial_document_seeds_default_sites() {
        let (_dir, store) = temp_store();
        let sites = store.list_sites().await;
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].id, "saintyco");
        assert_eq!(sites[1].id, "countec");
    }

    #[tokio::test]
    async fn corrupt_file_falls_back_to_initial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = DocStore::open(&path).unwrap();
        assert_eq!(store.list_sites().await.len(), 2);
    }

    #[tokio::test]
    async fn quotes_round_trip_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        {
            let store = DocStore::open(&path).unwrap();
            store
                .save_orcamento(quote("Empresa ABC", "2025-03-01T10:00:00Z", 1200.0))
                .await
                .unwrap();
        }
        let store = DocStore::open(&path).unwrap();
        let found = store.find_orcamentos(None, Some("abc"), None).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].cliente, "Empresa ABC");
    }

    #[tokio::test]
    async fn find_orcamentos_filters_by_term_and_date() {
        let (_dir, store) = temp_store();
        store
            .save_orcamento(quote("Empresa ABC", "2025-03-01T10:00:00Z", 100.0))
            .await
            .unwrap();
        store
            .save_orcamento(quote("Fábrica XYZ", "2025-04-02T10:00:00Z", 200.0))
            .await
            .unwrap();

        // Term matches an item name in both quotes.
        assert_eq!(store.find_orcamentos(Some("misturador"), None, None).await.len(), 2);
        assert_eq!(store.find_orcamentos(None, None, Some("2025-04")).await.len(), 1);
        assert_eq!(store.find_orcamentos(Some("xyz"), None, None).await.len(), 1);
    }

    #[tokio::test]
    async fn list_orcamentos_orders_and_limits() {
        let (_dir, store) = temp_store();
        store
            .save_orcamento(quote("A", "2025-01-01T00:00:00Z", 50.0))
            .await
            .unwrap();
        store
            .save_orcamento(quote("B", "2025-02-01T00:00:00Z", 500.0))
            .await
            .unwrap();
        store
            .save_orcamento(quote("C", "2025-03-01T00:00:00Z", 5.0))
            .await
            .unwrap();

        let (total, recent) = store.list_orcamentos(2, "recente").await;
        assert_eq!(total, 3);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].cliente, "C");

        let (_, by_value) = store.list_orcamentos(10, "valor").await;
        assert_eq!(by_value[0].cliente, "B");
    }

    #[tokio::test]
    async fn history_is_capped() {
        let (_dir, store) = temp_store();
        for i in 0..105 {
            store
                .record_history("acao", json!({"i": i}), json!({}))
                .await
                .unwrap();
        }
        assert_eq!(store.history_len().await, 100);
    }

    #[tokio::test]
    async fn add_site_replaces_same_id() {
        let (_dir, store) = temp_store();
        store
            .add_site(SiteConfig {
                id: "saintyco".to_string(),
                nome: "Saintyco BR".to_string(),
                base_url: "https://www.saintyco.com/br/".to_string(),
                search_url: "https://www.saintyco.com/br/?s=".to_string(),
                ativo: true,
            })
            .await
            .unwrap();
        let sites = store.list_sites().await;
        assert_eq!(sites.len(), 2);
        assert_eq!(store.find_site("saintyco").await.unwrap().nome, "Saintyco BR");
    }
}
