//! Per-query JSON artifacts. Their presence on disk is what marks a step done.
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::warn;

use docqa_core::config::GeneratorKind;
use docqa_core::types::ModalityResponse;

/// `response_{q_id}.json` with `/` replaced by `$`.
pub fn artifact_file_name(q_id: &str) -> String {
    format!("response_{}.json", q_id.replace('/', "$"))
}

/// Output directories for one generator: `{generator}_vision`, `{generator}_text`
/// and `{generator}_visdmrag` for the fused answer.
#[derive(Debug, Clone)]
pub struct ArtifactDirs {
    pub visual: PathBuf,
    pub textual: PathBuf,
    pub combined: PathBuf,
}

impl ArtifactDirs {
    pub fn new(output_dir: &Path, generator: GeneratorKind) -> Self {
        Self {
            visual: output_dir.join(format!("{generator}_vision")),
            textual: output_dir.join(format!("{generator}_text")),
            combined: output_dir.join(format!("{generator}_visdmrag")),
        }
    }

    pub fn create(&self) -> std::io::Result<()> {
        for dir in [&self.visual, &self.textual, &self.combined] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn for_query(&self, q_id: &str) -> ArtifactPaths {
        let name = artifact_file_name(q_id);
        ArtifactPaths {
            visual: self.visual.join(&name),
            textual: self.textual.join(&name),
            combined: self.combined.join(&name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub visual: PathBuf,
    pub textual: PathBuf,
    pub combined: PathBuf,
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> docqa_core::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

/// An existing modality artifact. Unreadable content still counts as done and
/// yields an empty response.
pub fn load_response(path: &Path) -> ModalityResponse {
    let parsed = std::fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|raw| {
            serde_json::from_str::<ModalityResponse>(&raw).map_err(anyhow::Error::from)
        });
    parsed.unwrap_or_else(|e| {
        warn!(
            "Unreadable artifact {}: {:#}; using an empty response",
            path.display(),
            e
        );
        ModalityResponse::default()
    })
}
