use std::path::{Path, PathBuf};
use std::process::Command;

const MAX_LINES: usize = 750;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/main");

    let sha = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                String::from_utf8(output.stdout)
                    .ok()
                    .map(|s| s.trim().to_string())
            } else {
                None
            }
        })
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=QUOTA_SYNC_GIT_SHA={}", sha);

    enforce_line_limits();
}

fn enforce_line_limits() {
    let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") else {
        return;
    };
    let root = PathBuf::from(&manifest_dir);
    let mut files = Vec::new();
    collect_rust_files(&root.join("src"), &mut files);

    let mut violations = Vec::new();
    for file in &files {
        println!("cargo:rerun-if-changed={}", file.display());
        match std::fs::read_to_string(file) {
            Ok(content) => {
                let lines = content.lines().filter(|l| !l.trim().is_empty()).count();
                if lines > MAX_LINES {
                    let rel_path = file.strip_prefix(&root).unwrap_or(file);
                    violations.push((rel_path.to_path_buf(), lines));
                }
            }
            Err(e) => println!(
                "cargo:warning=Could not read file {}: {}",
                file.display(),
                e
            ),
        }
    }

    if !violations.is_empty() {
        for (path, lines) in &violations {
            eprintln!("  {} - {} lines (max {})", path.display(), lines, MAX_LINES);
        }
        panic!(
            "Build failed: {} file(s) exceed the {} line limit",
            violations.len(),
            MAX_LINES
        );
    }
}

fn collect_rust_files(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_rust_files(&path, files);
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            files.push(path);
        }
    }
}
