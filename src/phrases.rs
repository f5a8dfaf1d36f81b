use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

use crate::consent::normalize_text;

// Include default phrases at compile time
const DEFAULT_PHRASES: &str = include_str!("../default_accept_words.txt");

pub const DEFAULT_PHRASE_FILE: &str = "accept_words.txt";

/// Parse a phrase list. File order is priority order; duplicates keep their
/// first position.
pub fn parse_phrases(content: &str, component: &str) -> Vec<String> {
    let mut phrases: Vec<String> = Vec::new();
    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let phrase = normalize_text(line);
        if phrases.contains(&phrase) {
            warn!(action = "parse", component, line_number = line_num + 1, phrase = %phrase, "Duplicate consent phrase");
            continue;
        }
        phrases.push(phrase);
    }
    phrases
}

pub fn load_accept_phrases(phrase_file_path: Option<&Path>) -> Result<Vec<String>> {
    let start_time = Instant::now();
    info!(
        action = "start",
        component = "phrase_loading",
        "Starting consent phrase loading"
    );

    let mut phrases = Vec::new();

    if let Some(path) = phrase_file_path {
        info!(action = "load", component = "phrase_file", file_path = ?path, "Loading phrases from specified file");
        if !path.exists() {
            anyhow::bail!("Phrase file not found: {:?}", path);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read phrase file {:?}", path))?;
        phrases = parse_phrases(&content, "phrase_file");
        if phrases.is_empty() {
            anyhow::bail!("Phrase file {:?} contains no phrases", path);
        }
        info!(action = "loaded", component = "phrase_file", phrase_count = phrases.len(), file_path = ?path, "Loaded phrases from file");
    } else {
        // Try default file
        let default_file = Path::new(DEFAULT_PHRASE_FILE);
        if default_file.exists() {
            info!(action = "load", component = "default_phrase_file", file_path = ?default_file, "Loading phrases from default file");
            let content = fs::read_to_string(default_file)
                .with_context(|| format!("Failed to read phrase file {:?}", default_file))?;
            phrases = parse_phrases(&content, "default_phrase_file");
            info!(action = "loaded", component = "default_phrase_file", phrase_count = phrases.len(), file_path = ?default_file, "Loaded phrases from default file");
        }

        // If no phrases loaded, use embedded defaults
        if phrases.is_empty() {
            info!(
                action = "load",
                component = "embedded_phrases",
                "Using embedded default phrases"
            );
            phrases = parse_phrases(DEFAULT_PHRASES, "embedded_phrases");
        }
    }

    info!(
        action = "complete",
        component = "phrase_loading",
        phrase_count = phrases.len(),
        duration_ms = start_time.elapsed().as_millis(),
        "Consent phrases ready"
    );
    Ok(phrases)
}

/// Write the embedded phrase list to `path`, refusing to overwrite.
pub fn init_default_phrases(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!(
            "{} already exists. Remove it first if you want to reinitialize.",
            path.display()
        );
    }

    fs::write(path, DEFAULT_PHRASES)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Created {} with default consent phrases", path.display());

    Ok(())
}
