use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use crate::types::{IntentResult, IntentSource, Params};

/// One entry of the deterministic fallback classifier: trigger keywords, the
/// action they resolve to, and a regex extractor for its parameters.
struct Pattern {
    /// Lowercase substrings; any hit anywhere in the lowercased utterance
    /// claims the pattern.
    keywords: &'static [&'static str],
    action: &'static str,
    extract: fn(&str) -> Params,
}

/// Declaration order is the tie-break: the first pattern with a keyword hit
/// wins, not the best match. Reordering entries changes behavior.
static PATTERNS: &[Pattern] = &[
    Pattern {
        keywords: &["orçamento", "orcamento", "orçar", "cotar"],
        action: "gerar_orcamento",
        extract: extract_cliente,
    },
    Pattern {
        keywords: &[
            "buscar orçamento",
            "encontrar orçamento",
            "orçamento do",
            "orçamento de",
        ],
        action: "buscar_orcamento",
        extract: extract_termo_orcamento,
    },
    Pattern {
        keywords: &["criar planilha", "nova planilha", "planilha nova"],
        action: "criar_planilha",
        extract: extract_nome_planilha,
    },
    Pattern {
        keywords: &["atualizar planilha", "editar planilha", "modificar planilha"],
        action: "atualizar_planilha",
        extract: extract_nothing,
    },
    Pattern {
        keywords: &["saintyco", "buscar saintyco", "pesquisar saintyco"],
        action: "buscar_produto_saintyco",
        extract: extract_termo_saintyco,
    },
    Pattern {
        keywords: &["countec", "buscar countec", "pesquisar countec"],
        action: "buscar_produto_countec",
        extract: extract_termo_countec,
    },
    Pattern {
        keywords: &["email", "emails", "jace", "caixa de entrada"],
        action: "consultar_emails",
        extract: extract_email_query,
    },
    Pattern {
        keywords: &[
            "listar orçamentos",
            "meus orçamentos",
            "todos orçamentos",
            "ver orçamentos",
        ],
        action: "listar_orcamentos",
        extract: extract_limite,
    },
    Pattern {
        keywords: &["baixar", "download", "pdf", "documento"],
        action: "baixar_arquivo_site",
        extract: extract_url,
    },
];

/// Keyword fallback classification: zero dependencies, zero latency.
/// Matched patterns get a fixed 0.7 confidence and never ask follow-up
/// questions; anything unclaimed becomes free conversation at 0.5.
pub fn classify_local(utterance: &str) -> IntentResult {
    let lower = utterance.to_lowercase();
    for pattern in PATTERNS {
        if pattern.keywords.iter().any(|kw| lower.contains(kw)) {
            let params = (pattern.extract)(utterance);
            let message = status_message(pattern.action, &params);
            return IntentResult {
                action: pattern.action.to_string(),
                params,
                missing_params: Vec::new(),
                confidence: 0.7,
                message: Some(message),
                source: IntentSource::Local,
                cached: false,
            };
        }
    }
    IntentResult::free_conversation(utterance)
}

/// Status line shown while the action runs, keyed by action name.
fn status_message(action: &str, params: &Params) -> String {
    let str_param = |key: &str| {
        params
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    };
    match action {
        "gerar_orcamento" => match str_param("cliente") {
            Some(cliente) => format!("Vou preparar o orçamento para {}...", cliente),
            None => "Vou preparar o orçamento...".to_string(),
        },
        "buscar_orcamento" => match str_param("termo") {
            Some(termo) => format!("Buscando orçamentos sobre \"{}\"...", termo),
            None => "Buscando orçamentos...".to_string(),
        },
        "criar_planilha" => format!(
            "Criando planilha \"{}\"...",
            str_param("nome").unwrap_or("Nova")
        ),
        "buscar_produto_saintyco" => format!(
            "Buscando \"{}\" no Saintyco...",
            str_param("termo").unwrap_or_default()
        ),
        "buscar_produto_countec" => format!(
            "Buscando \"{}\" no Countec...",
            str_param("termo").unwrap_or_default()
        ),
        "consultar_emails" => match str_param("remetente") {
            Some(remetente) => format!("Verificando emails de {}...", remetente),
            None => "Verificando emails...".to_string(),
        },
        "listar_orcamentos" => "Listando seus orçamentos...".to_string(),
        _ => "Processando...".to_string(),
    }
}

fn params_from(pairs: &[(&str, Value)]) -> Params {
    let mut params = Params::new();
    for (key, value) in pairs {
        params.insert((*key).to_string(), value.clone());
    }
    params
}

/// Client name after "para/cliente/empresa", skipping a leading article and
/// stopping at a comma. A failed capture leaves the field empty, never the
/// classification.
fn extract_cliente(utterance: &str) -> Params {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)\b(?:para|cliente|empresa)\b\s+(?:a\s+|o\s+)?([^,]+)").unwrap()
    });
    let cliente = RE
        .captures(utterance)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or("");
    params_from(&[("cliente", json!(cliente))])
}

fn extract_termo_orcamento(utterance: &str) -> Params {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)(?:buscar|encontrar|orçamento)\s+(?:do|de|sobre)?\s*(.+)").unwrap()
    });
    let termo = RE
        .captures(utterance)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or("");
    params_from(&[("termo", json!(termo))])
}

fn extract_nome_planilha(utterance: &str) -> Params {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)planilha\s+(?:de|para|chamada)?\s*(.+)").unwrap());
    let nome = RE
        .captures(utterance)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .unwrap_or("Nova Planilha");
    params_from(&[("nome", json!(nome))])
}

fn extract_nothing(_utterance: &str) -> Params {
    Params::new()
}

/// Search term for a catalog site: drop the site name and stray search
/// verbs/prepositions, then collapse whitespace.
fn strip_site_term(utterance: &str, site_re: &Regex) -> String {
    static FILLER: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)\b(?:buscar|pesquisar|no|na|em)\b").unwrap());
    static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
    let sem_site = site_re.replace_all(utterance, " ");
    let sem_filler = FILLER.replace_all(&sem_site, " ");
    SPACES.replace_all(&sem_filler, " ").trim().to_string()
}

fn extract_termo_saintyco(utterance: &str) -> Params {
    static SITE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)saintyco").unwrap());
    params_from(&[("termo", json!(strip_site_term(utterance, &SITE)))])
}

fn extract_termo_countec(utterance: &str) -> Params {
    static SITE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)countec").unwrap());
    params_from(&[("termo", json!(strip_site_term(utterance, &SITE)))])
}

/// Sender after "de/do/da" and subject after "sobre". Either may be absent.
fn extract_email_query(utterance: &str) -> Params {
    static REMETENTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(?:de|do|da)\s+(\w+)").unwrap());
    static ASSUNTO: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)sobre\s+(.+?)(?:\?|$)").unwrap());
    let mut params = Params::new();
    if let Some(remetente) = REMETENTE.captures(utterance).and_then(|c| c.get(1)) {
        params.insert("remetente".into(), json!(remetente.as_str()));
    }
    if let Some(termo) = ASSUNTO.captures(utterance).and_then(|c| c.get(1)) {
        params.insert("termo".into(), json!(termo.as_str().trim()));
    }
    params
}

fn extract_limite(_utterance: &str) -> Params {
    params_from(&[("limite", json!(10))])
}

fn extract_url(utterance: &str) -> Params {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").unwrap());
    let mut params = Params::new();
    if let Some(url) = RE.find(utterance) {
        params.insert("url".into(), json!(url.as_str()));
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FREE_CONVERSATION;

    #[test]
    fn keyword_hit_resolves_with_fixed_confidence() {
        let intent = classify_local("preciso cotar 3 misturadores");
        assert_eq!(intent.action, "gerar_orcamento");
        assert_eq!(intent.confidence, 0.7);
        assert!(intent.missing_params.is_empty());
        assert_eq!(intent.source, IntentSource::Local);
    }

    #[test]
    fn no_keyword_falls_back_to_free_conversation() {
        let intent = classify_local("bom dia, tudo certo por aí?");
        assert_eq!(intent.action, FREE_CONVERSATION);
        assert_eq!(intent.confidence, 0.5);
        assert_eq!(
            intent.params.get("mensagem").and_then(Value::as_str),
            Some("bom dia, tudo certo por aí?")
        );
    }

    #[test]
    fn first_matching_pattern_wins_by_declaration_order() {
        // "buscar orçamento" also carries the plain "orçamento" keyword of
        // the first pattern, which therefore claims the utterance.
        let intent = classify_local("buscar orçamento do cliente Acme");
        assert_eq!(intent.action, "gerar_orcamento");
    }

    #[test]
    fn quote_pattern_extracts_client_name() {
        let intent = classify_local("Preciso de um orçamento para a empresa ABC");
        assert_eq!(intent.action, "gerar_orcamento");
        assert_eq!(
            intent.params.get("cliente").and_then(Value::as_str),
            Some("empresa ABC")
        );
        assert_eq!(
            intent.message.as_deref(),
            Some("Vou preparar o orçamento para empresa ABC...")
        );
    }

    #[test]
    fn quote_pattern_with_no_client_leaves_field_empty() {
        let intent = classify_local("quero um orçamento novo");
        assert_eq!(intent.action, "gerar_orcamento");
        assert_eq!(intent.params.get("cliente").and_then(Value::as_str), Some(""));
        assert_eq!(intent.message.as_deref(), Some("Vou preparar o orçamento..."));
    }

    #[test]
    fn saintyco_pattern_strips_site_and_prepositions() {
        let intent = classify_local("saintyco bomba de vácuo");
        assert_eq!(intent.action, "buscar_produto_saintyco");
        assert_eq!(
            intent.params.get("termo").and_then(Value::as_str),
            Some("bomba de vácuo")
        );

        let intent = classify_local("pesquisar tablet counting machine no Saintyco");
        assert_eq!(
            intent.params.get("termo").and_then(Value::as_str),
            Some("tablet counting machine")
        );
    }

    #[test]
    fn countec_pattern_uses_its_own_site_name() {
        let intent = classify_local("buscar blister machine no countec");
        assert_eq!(intent.action, "buscar_produto_countec");
        assert_eq!(
            intent.params.get("termo").and_then(Value::as_str),
            Some("blister machine")
        );
    }

    #[test]
    fn spreadsheet_pattern_defaults_name() {
        let intent = classify_local("criar planilha de fornecedores");
        assert_eq!(intent.action, "criar_planilha");
        assert_eq!(
            intent.params.get("nome").and_then(Value::as_str),
            Some("fornecedores")
        );
    }

    #[test]
    fn email_pattern_extracts_sender_and_subject() {
        let intent = classify_local("Tem algum email do João sobre o projeto?");
        assert_eq!(intent.action, "consultar_emails");
        assert_eq!(
            intent.params.get("remetente").and_then(Value::as_str),
            Some("João")
        );
        assert_eq!(
            intent.params.get("termo").and_then(Value::as_str),
            Some("o projeto")
        );
    }

    #[test]
    fn email_pattern_tolerates_missing_captures() {
        let intent = classify_local("abre minha caixa de entrada");
        assert_eq!(intent.action, "consultar_emails");
        // "de" is followed by "entrada" here, which the sender capture takes;
        // the subject capture fails and is simply omitted.
        assert!(intent.params.get("termo").is_none());
    }

    #[test]
    fn download_pattern_captures_url_when_present() {
        let intent = classify_local("baixar https://exemplo.com/catalogo.pdf por favor");
        assert_eq!(intent.action, "baixar_arquivo_site");
        assert_eq!(
            intent.params.get("url").and_then(Value::as_str),
            Some("https://exemplo.com/catalogo.pdf")
        );

        let intent = classify_local("quero baixar o catálogo");
        assert!(intent.params.get("url").is_none());
    }

    #[test]
    fn classification_is_idempotent() {
        let first = classify_local("saintyco bomba de vácuo");
        let second = classify_local("saintyco bomba de vácuo");
        assert_eq!(first, second);
    }

    #[test]
    fn unmatched_status_message_uses_generic_template() {
        assert_eq!(status_message("baixar_arquivo_site", &Params::new()), "Processando...");
    }
}
