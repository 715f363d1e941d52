use std::path::Path;

/// Render `path` relative to `base` when it lives under it.
pub fn display_path(path: &Path, base: Option<&Path>) -> String {
    if let Some(base) = base {
        if let Ok(relative) = path.strip_prefix(base) {
            return relative.display().to_string();
        }
    }
    path.display().to_string()
}

pub fn truncate_bytes(bytes: &[u8], max_bytes: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    truncate_string(&text, max_bytes)
}

pub fn truncate_string(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut truncated = String::new();
    for ch in text.chars() {
        if truncated.len() + ch.len_utf8() > max_bytes {
            break;
        }
        truncated.push(ch);
    }
    truncated
}

pub fn error_chain_message(err: &anyhow::Error) -> String {
    err.chain()
        .map(|cause| cause.to_string())
        .collect::<Vec<_>>()
        .join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_string("short", 10), "short");
        assert_eq!(truncate_string("amén amén", 4), "amé");
        assert_eq!(truncate_bytes(b"abcdef", 3), "abc");
    }

    #[test]
    fn display_path_strips_base() {
        let base = Path::new("/srv/sermons");
        assert_eq!(
            display_path(Path::new("/srv/sermons/audio/a.mp3"), Some(base)),
            "audio/a.mp3"
        );
        assert_eq!(display_path(Path::new("/tmp/x"), Some(base)), "/tmp/x");
    }

    #[test]
    fn chain_message_joins_context() {
        let err = Err::<(), _>(anyhow::anyhow!("disk full"))
            .context("write audio/a.mp3")
            .expect_err("error");
        assert_eq!(error_chain_message(&err), "write audio/a.mp3: disk full");
    }
}
