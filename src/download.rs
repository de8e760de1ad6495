use std::path::{Path, PathBuf};

use crate::dispatch::SynchronousResult;

/// Make a download name safe to use as a single file name. Path separators
/// and control characters become `_`, and leading dots are replaced so the
/// result can never be `..` or a hidden file.
pub fn sanitize_file_name(name: &str) -> String {
    let mut out: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    let leading_dots = out.chars().take_while(|c| *c == '.').count();
    if leading_dots > 0 {
        out.replace_range(..leading_dots, &"_".repeat(leading_dots));
    }
    if out.is_empty() {
        out.push_str("document.pdf");
    }
    out
}

/// Write a synchronous document into `dir` under its download name.
///
/// Atomic write: temp file + rename, so readers never see a half-written
/// PDF. Returns the final path.
pub async fn save_document(result: &SynchronousResult, dir: &Path) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;

    let path = dir.join(sanitize_file_name(&result.download_name));
    let tmp_path = path.with_extension("pdf.tmp");

    tokio::fs::write(&tmp_path, &result.document).await?;
    if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }

    tracing::info!(
        path = %path.display(),
        bytes = result.document.len(),
        "document saved"
    );
    Ok(path)
}
