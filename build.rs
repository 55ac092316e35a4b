use std::process::Command;

/// Embed the short commit hash for `multichain_sync version`
fn git(args: &[&str]) -> Option<std::process::Output> {
    Command::new("git").args(args).output().ok()
}

fn main() {
    let git_hash = match git(&["rev-parse", "--short", "HEAD"]) {
        Some(o) if o.status.success() => {
            let hash = String::from_utf8_lossy(&o.stdout).trim().to_string();
            let dirty = git(&["diff", "--quiet"])
                .map(|o| !o.status.success())
                .unwrap_or(false);
            if dirty { format!("{}-dirty", hash) } else { hash }
        }
        _ => "unknown".to_string(),
    };

    println!("cargo:rustc-env=GIT_HASH={}", git_hash);
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads");
}
