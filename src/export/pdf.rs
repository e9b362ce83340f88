use std::path::{ Path, PathBuf };
use std::process::Stdio;
use std::time::Duration;

use log::{ error, info, warn };
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("No PDF converter command configured")]
    NoCommand,
    #[error("PDF converter '{0}' not found")]
    ConverterNotFound(String),
    #[error("PDF conversion timeout after {0}s")]
    Timeout(u64),
    #[error("PDF converter exited with {status}: {stderr}")]
    Failed {
        status: String,
        stderr: String,
    },
    #[error("PDF generation failed - output file not found")]
    MissingOutput,
    #[error("PDF export I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PdfError {
    /// Message shown to the user, picked by what the error text mentions.
    pub fn friendly_message(&self) -> String {
        let text = self.to_string();
        if text.contains("timeout") {
            "PDF conversion timed out. Please try again.".to_string()
        } else if text.contains("not found") {
            "PDF converter not found. Please ensure dependencies are installed.".to_string()
        } else {
            text
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfDocument {
    /// Sanitised name including the `.pdf` extension.
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Replaces every non-alphanumeric character with `_`; blank names become
/// `presentation`.
pub fn sanitize_filename(name: Option<&str>) -> String {
    let name = name.filter(|n| !n.is_empty()).unwrap_or("presentation");
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[derive(Debug, Clone)]
pub struct PdfConverter {
    command: Vec<String>,
    temp_dir: PathBuf,
    timeout: Duration,
}

impl PdfConverter {
    /// `command` is split on whitespace, e.g. `npx @marp-team/marp-cli`.
    pub fn new(command: &str, temp_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            command: command.split_whitespace().map(str::to_string).collect(),
            temp_dir: temp_dir.into(),
            timeout,
        }
    }

    /// Writes `markdown` to a scratch directory, runs the converter on it and
    /// returns the produced PDF. The scratch directory is removed on every
    /// path.
    pub async fn convert(&self, markdown: &str, filename: Option<&str>) -> Result<PdfDocument, PdfError> {
        let (program, base_args) = self.command.split_first().ok_or(PdfError::NoCommand)?;
        let safe_name = sanitize_filename(filename);

        tokio::fs::create_dir_all(&self.temp_dir).await?;
        let scratch = tempfile::Builder::new().prefix("pdf-export-").tempdir_in(&self.temp_dir)?;

        let stamp = chrono::Utc::now().timestamp_millis();
        let md_path = scratch.path().join(format!("{}_{}.md", safe_name, stamp));
        let pdf_path = scratch.path().join(format!("{}_{}.pdf", safe_name, stamp));

        let result = self.run(program, base_args, markdown, &md_path, &pdf_path).await;

        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            warn!("Failed to clean up {}: {}", scratch_path.display(), e);
        }

        let bytes = result?;
        Ok(PdfDocument {
            filename: format!("{}.pdf", safe_name),
            bytes,
        })
    }

    async fn run(
        &self,
        program: &str,
        base_args: &[String],
        markdown: &str,
        md_path: &Path,
        pdf_path: &Path
    ) -> Result<Vec<u8>, PdfError> {
        tokio::fs::write(md_path, markdown).await?;

        info!("Converting {} to PDF with '{}'", md_path.display(), program);
        let child = Command::new(program)
            .args(base_args)
            .arg(md_path)
            .arg("--pdf")
            .arg("--output")
            .arg(pdf_path)
            .arg("--allow-local-files")
            .arg("--no-stdin")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    PdfError::ConverterNotFound(program.to_string())
                } else {
                    PdfError::Io(e)
                }
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                error!("PDF converter exceeded {:?}", self.timeout);
                return Err(PdfError::Timeout(self.timeout.as_secs()));
            }
        };

        if !output.status.success() {
            return Err(PdfError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        match tokio::fs::read(pdf_path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(PdfError::MissingOutput),
            Err(e) => Err(PdfError::Io(e)),
        }
    }
}
