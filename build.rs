fn main() {
    match git_revision_hash() {
        Some(rev) => println!("cargo:rustc-env=BUILD_GIT_HASH={rev}"),
        None => println!("cargo:rustc-env=BUILD_GIT_HASH=GIT FAILED"),
    }
    println!("cargo:rustc-env=BUILD_ENGINES={}", compiled_engines().join(","));
    println!("cargo:rerun-if-changed=.git/HEAD");
}

// optional engines show up as CARGO_FEATURE_<NAME> in the build script environment
fn compiled_engines() -> Vec<&'static str> {
    let mut engines = vec!["btree", "hash", "par", "sorted"];
    for (feature, name) in [("CARGO_FEATURE_POLARS", "polars"), ("CARGO_FEATURE_DUCKDB", "duckdb")] {
        if std::env::var_os(feature).is_some() {
            engines.push(name);
        }
    }
    engines
}

fn git_revision_hash() -> Option<String> {
    let output = std::process::Command::new("git")
        .args(["rev-parse", "--short=10", "HEAD"])
        .output()
        .ok()?;
    let v = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if v.is_empty() { None } else { Some(v) }
}
