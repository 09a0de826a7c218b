#![allow(missing_docs)]

fn main() {
    process_version_string();
}

fn process_version_string() {
    // Source tarballs have no git metadata
    let hash = git_short_hash().unwrap_or("unknown".into());
    println!("cargo:rustc-env=SMDP_BUILD_GIT_HASH={hash}");
    let cargo_version = env!("CARGO_PKG_VERSION");

    let version_string = if let Some(tag) = release_tag() {
        // Tagged builds are named "v1.2.3"
        let short_tag = tag.strip_prefix("v").unwrap_or(&tag);
        if cargo_version != short_tag {
            println!(
                "cargo::error=mismatched version tags: cargo={cargo_version}, release tag={short_tag}"
            );
        }
        tag
    } else {
        format!("{cargo_version}+g{hash}")
    };
    println!("cargo:rustc-env=SMDP_VERSION_STRING={version_string}");
    println!("cargo:rerun-if-env-changed=SMDP_RELEASE_TAG");
}

fn release_tag() -> Option<String> {
    std::env::var("SMDP_RELEASE_TAG")
        .ok()
        .filter(|t| !t.is_empty())
}

fn git_short_hash() -> Option<String> {
    use std::process::Command;
    let args = &["rev-parse", "--short=8", "HEAD"];
    if let Ok(output) = Command::new("git").args(args).output() {
        let rev = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if rev.is_empty() { None } else { Some(rev) }
    } else {
        None
    }
}
