use std::env;
use std::process::Command;

/// First line of a command's stdout, if it ran and printed anything.
fn first_line(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8(output.stdout).ok()?;
    let line = stdout.lines().next()?.trim();
    (!line.is_empty()).then(|| line.to_string())
}

fn export(name: &str, value: Option<String>) {
    if let Some(value) = value {
        println!("cargo:rustc-env={name}={value}");
    }
}

fn main() {
    export("CLFSCTL_BUILD_TARGET", env::var("TARGET").ok());
    export("CLFSCTL_BUILD_PROFILE", env::var("PROFILE").ok());

    let rustc = env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
    export("RUSTC_VERSION", first_line(&rustc, &["--version"]));

    // Release pipelines may pin the hash; outside a checkout it stays unset.
    let git_hash = env::var("GIT_HASH")
        .ok()
        .filter(|hash| !hash.is_empty())
        .or_else(|| first_line("git", &["rev-parse", "--short=12", "HEAD"]));
    export("GIT_HASH", git_hash);

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=TARGET");
    println!("cargo:rerun-if-env-changed=PROFILE");
    println!("cargo:rerun-if-env-changed=GIT_HASH");
}
