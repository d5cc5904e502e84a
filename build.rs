use std::process::Command;

fn git_short_sha() -> Option<String> {
    let from_git = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .filter(|s| !s.is_empty());
    // CI builds without a checkout pass the sha explicitly
    from_git.or_else(|| std::env::var("GIT_SHA").ok().filter(|s| !s.is_empty()))
}

fn main() {
    let base = env!("CARGO_PKG_VERSION");

    let is_nightly = std::env::var("HELIOS_NIGHTLY")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let version = if is_nightly {
        match git_short_sha() {
            Some(s) => format!("{}-nightly+{}", base, s),
            None => format!("{}-nightly", base),
        }
    } else {
        base.to_string()
    };

    // Published as /Mgmt/ProcessVersion
    println!("cargo:rustc-env=APP_VERSION={}", version);

    println!("cargo:rerun-if-env-changed=HELIOS_NIGHTLY");
    println!("cargo:rerun-if-env-changed=GIT_SHA");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads");
}
