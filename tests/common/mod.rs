use assert_cmd::Command;

pub fn doceai_bin() -> Command {
    #[allow(deprecated)]
    {
        Command::cargo_bin("doceai").expect("doceai test binary should build")
    }
}
