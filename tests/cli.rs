mod common;

use common::doceai_bin;

#[test]
fn version_flag_prints_version() {
    doceai_bin()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn help_flag_mentions_config_and_env() {
    doceai_bin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("GEMINI_API_KEY"));
}

#[test]
fn chat_greets_and_exits_on_sair() {
    let dir = tempfile::tempdir().unwrap();
    doceai_bin()
        .current_dir(dir.path())
        .write_stdin("sair\n")
        .assert()
        .success()
        .stdout(predicates::str::contains("Eu sou a Doce"))
        .stdout(predicates::str::contains("Até logo"));
}

#[test]
fn offline_quote_utterance_gets_a_quote_reply() {
    // No API keys in the environment: local classification plus the
    // deep-link quote stage, end to end through the real binary.
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("config.toml"),
        "[quotes]\nbase_url = \"http://127.0.0.1:9\"\n",
    )
    .unwrap();
    doceai_bin()
        .current_dir(dir.path())
        .env_remove("GEMINI_API_KEY")
        .env_remove("GLM_API_KEY")
        .write_stdin("Preciso de um orçamento para a empresa ABC\nsair\n")
        .assert()
        .success()
        .stdout(predicates::str::contains(
            "Vou preparar o orçamento para empresa ABC...",
        ));
}
