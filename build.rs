//! Generates the list of `SPEC_ARCHIVE_*` environment variables the binary
//! reads, so `status` can flag misspelled ones.
//!
//! Only names written as a complete string literal (`"SPEC_ARCHIVE_ROOT"`)
//! count. Prefixed text inside longer literals, like the
//! `SPEC_ARCHIVE_WARN code=...` log tag, or inside comments is ignored.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const LITERAL_PREFIX: &[u8] = b"\"SPEC_ARCHIVE_";

fn collect_rs_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    let mut entries = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            collect_rs_files(&path, out)?;
        } else if path.extension().and_then(|ext| ext.to_str()) == Some("rs") {
            out.push(path);
        }
    }
    Ok(())
}

fn is_env_key_char(byte: u8) -> bool {
    byte.is_ascii_uppercase() || byte.is_ascii_digit() || byte == b'_'
}

/// Env names quoted on their own in `source`, in order of appearance.
fn quoted_env_keys(source: &str) -> Vec<&str> {
    let bytes = source.as_bytes();
    let n = LITERAL_PREFIX.len();
    let mut keys = Vec::new();
    let mut i = 0usize;
    while i + n <= bytes.len() {
        if &bytes[i..i + n] != LITERAL_PREFIX {
            i += 1;
            continue;
        }
        let start = i + 1;
        let mut j = i + n;
        while j < bytes.len() && is_env_key_char(bytes[j]) {
            j += 1;
        }
        // `"SPEC_ARCHIVE_"` alone is the prefix, not a variable.
        if j > i + n && bytes.get(j) == Some(&b'"') {
            if let Some(key) = source.get(start..j) {
                keys.push(key);
            }
        }
        i = j;
    }
    keys
}

fn write_generated_allowlist(files: &[PathBuf]) -> std::io::Result<()> {
    // Key to the first file that reads it, kept for the generated comment.
    let mut keys: BTreeMap<String, String> = BTreeMap::new();
    for file in files {
        let Ok(content) = fs::read_to_string(file) else {
            continue;
        };
        for key in quoted_env_keys(&content) {
            keys.entry(key.to_string())
                .or_insert_with(|| file.display().to_string());
        }
    }

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    let generated = Path::new(&out_dir).join("spec_archive_env_allowlist.rs");
    let mut f = fs::File::create(generated)?;
    writeln!(f, "pub const GENERATED_SPEC_ARCHIVE_ENV_ALLOWLIST: &[&str] = &[")?;
    for (key, origin) in keys {
        writeln!(f, "    \"{key}\", // {origin}")?;
    }
    writeln!(f, "];")?;
    Ok(())
}

fn main() {
    let mut files = Vec::new();
    collect_rs_files(Path::new("src"), &mut files).expect("src/ is readable");
    write_generated_allowlist(&files).expect("failed to generate SPEC_ARCHIVE env allowlist");

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");
    for file in &files {
        println!("cargo:rerun-if-changed={}", file.display());
    }
}
