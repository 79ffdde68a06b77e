use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Url};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::Action;
use crate::store::{DocStore, SiteConfig};
use crate::types::Params;

/// RFC 3986 percent-encoding for query-string values.
pub(crate) fn percent_encode(s: &str) -> String {
    let mut result = String::with_capacity(s.len() * 2);
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

/// Searches product catalogs on the configured third-party sites.
///
/// The pipeline per search is fetch then extract; when the fetch stage
/// fails (site unreachable, non-2xx) the answer degrades to a manual-search
/// link rather than an error. The site table belongs to this collaborator:
/// it may grow at runtime, the action registry never does.
pub struct CatalogSearcher {
    client: Client,
    store: Arc<DocStore>,
}

impl CatalogSearcher {
    pub fn new(store: Arc<DocStore>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent("Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:142.0) Gecko/20100101 Firefox/142.0")
            .build()
            .expect("failed to build HTTP client");
        Self { client, store }
    }

    /// Entry point for "adicionar site" config flows outside the chat core.
    #[allow(dead_code)]
    pub async fn add_site(&self, site: SiteConfig) -> anyhow::Result<()> {
        self.store.add_site(site).await
    }

    pub async fn search(&self, site_id: &str, termo: &str) -> anyhow::Result<Value> {
        let site = self
            .store
            .find_site(site_id)
            .await
            .ok_or_else(|| anyhow::anyhow!("Site \"{}\" não configurado", site_id))?;
        if !site.ativo {
            anyhow::bail!("Site \"{}\" está desativado", site.nome);
        }

        let search_url = format!("{}{}", site.search_url, percent_encode(termo));
        info!(site = %site.id, termo, "Buscando no catálogo");

        let html = match self.fetch(&search_url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(site = %site.id, error = %e, "Catalog fetch failed, answering with manual link");
                return Ok(json!({
                    "encontrados": 0,
                    "error": "Não consegui acessar o site automaticamente",
                    "alternativa": {
                        "message": "Você pode buscar manualmente em:",
                        "url": search_url,
                    },
                }));
            }
        };

        let produtos = extract_products(&html, &site.base_url);
        if produtos.is_empty() {
            return Ok(json!({
                "site": site.nome,
                "termo": termo,
                "encontrados": 0,
                "message": format!("Nenhum produto encontrado para \"{}\" no {}", termo, site.nome),
                "sugestao": "Tente outros termos de busca",
            }));
        }
        Ok(json!({
            "site": site.nome,
            "termo": termo,
            "encontrados": produtos.len(),
            "produtos": produtos,
        }))
    }

    async fn fetch(&self, url: &str) -> anyhow::Result<String> {
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("HTTP {}", resp.status());
        }
        Ok(resp.text().await?)
    }
}

/// Pull up to 10 product entries out of a results page: linked text plus an
/// optional image. Navigation links (anchors, fragments, tiny labels) are
/// filtered out.
fn extract_products(html: &str, base_url: &str) -> Vec<Value> {
    static ANCHOR: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r##"(?is)<a\b[^>]*href\s*=\s*"([^"#]+)"[^>]*>(.*?)</a>"##).unwrap()
    });
    static IMG: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"(?is)<img\b[^>]*src\s*=\s*"([^"]+)""#).unwrap());
    static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());
    static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

    let base = Url::parse(base_url).ok();
    let mut produtos = Vec::new();
    let mut vistos = Vec::new();

    for cap in ANCHOR.captures_iter(html) {
        if produtos.len() >= 10 {
            break;
        }
        let href = cap[1].trim();
        let inner = &cap[2];
        let nome = SPACES
            .replace_all(TAGS.replace_all(inner, " ").trim(), " ")
            .to_string();
        if nome.len() < 4 || vistos.contains(&href.to_string()) {
            continue;
        }
        vistos.push(href.to_string());

        let link = absolutize(href, base.as_ref());
        let imagem = IMG
            .captures(inner)
            .map(|img| absolutize(img[1].trim(), base.as_ref()));
        produtos.push(json!({
            "nome": nome,
            "link": link,
            "imagem": imagem,
        }));
    }
    produtos
}

fn absolutize(href: &str, base: Option<&Url>) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    match base.and_then(|b| b.join(href).ok()) {
        Some(url) => url.to_string(),
        None => href.to_string(),
    }
}

/// Catalog search bound to one configured site.
pub struct BuscarProdutoAction {
    searcher: Arc<CatalogSearcher>,
    site_id: &'static str,
    name: &'static str,
    description: &'static str,
}

impl BuscarProdutoAction {
    pub fn saintyco(searcher: Arc<CatalogSearcher>) -> Self {
        Self {
            searcher,
            site_id: "saintyco",
            name: "buscar_produto_saintyco",
            description: "Busca produto no site Saintyco",
        }
    }

    pub fn countec(searcher: Arc<CatalogSearcher>) -> Self {
        Self {
            searcher,
            site_id: "countec",
            name: "buscar_produto_countec",
            description: "Busca produto no site Countec",
        }
    }
}

#[async_trait]
impl Action for BuscarProdutoAction {
    fn name(&self) -> &'static str {
        self.name
    }
    fn description(&self) -> &'static str {
        self.description
    }
    fn declared_params(&self) -> &'static [&'static str] {
        &["termo", "categoria"]
    }
    fn difficulty(&self) -> &'static str {
        "medio"
    }

    async fn call(&self, params: &Params) -> anyhow::Result<Value> {
        let termo = params
            .get("termo")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        if termo.is_empty() {
            anyhow::bail!("Me diga o que você quer buscar no site");
        }
        self.searcher.search(self.site_id, termo).await
    }
}

/// Find downloadable documents behind a URL: either the URL itself or
/// document links scraped from the page.
pub struct BaixarArquivoAction {
    client: Client,
}

static DOC_EXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(pdf|docx?|xlsx?|zip)(?:\?.*)?$").unwrap());
static DOC_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)href\s*=\s*"([^"]+\.(?:pdf|docx?|xlsx?))""#).unwrap());

impl BaixarArquivoAction {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .expect("failed to build HTTP client");
        Self { client }
    }
}

#[async_trait]
impl Action for BaixarArquivoAction {
    fn name(&self) -> &'static str {
        "baixar_arquivo_site"
    }
    fn description(&self) -> &'static str {
        "Baixa PDF/documento de um site"
    }
    fn declared_params(&self) -> &'static [&'static str] {
        &["url", "tipo"]
    }
    fn difficulty(&self) -> &'static str {
        "avancado"
    }

    async fn call(&self, params: &Params) -> anyhow::Result<Value> {
        let url = params
            .get("url")
            .and_then(Value::as_str)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| anyhow::anyhow!("Preciso de uma URL para buscar o arquivo"))?;

        if let Some(ext) = DOC_EXT.captures(url).and_then(|c| c.get(1)) {
            return Ok(json!({
                "message": "Arquivo encontrado!",
                "tipo": ext.as_str().to_uppercase(),
                "url": url,
            }));
        }

        let html = match self.client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => resp.text().await?,
            Ok(resp) => {
                warn!(url, status = %resp.status(), "Document page fetch failed");
                return Ok(manual_page_payload(url));
            }
            Err(e) => {
                warn!(url, error = %e, "Document page fetch failed");
                return Ok(manual_page_payload(url));
            }
        };

        let base = Url::parse(url).ok();
        let arquivos: Vec<Value> = DOC_LINK
            .captures_iter(&html)
            .take(10)
            .map(|cap| {
                let link = absolutize(cap[1].trim(), base.as_ref());
                let nome = link.rsplit('/').next().unwrap_or("Arquivo").to_string();
                let tipo = link.rsplit('.').next().unwrap_or("").to_uppercase();
                json!({ "nome": nome, "tipo": tipo, "url": link })
            })
            .collect();

        if arquivos.is_empty() {
            return Ok(json!({
                "encontrados": 0,
                "message": "Nenhum arquivo encontrado nesta página",
            }));
        }
        Ok(json!({
            "encontrados": arquivos.len(),
            "arquivos": arquivos,
        }))
    }
}

fn manual_page_payload(url: &str) -> Value {
    json!({
        "error": "Não consegui acessar a página automaticamente",
        "alternativa": {
            "message": "Abrir página manualmente:",
            "url": url,
        },
    })
}
