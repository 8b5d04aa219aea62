//! Optional fixed-layout rendering of raw documents.
//!
//! Rendering is pluggable and off by default. The only real implementation
//! pipes the document through an external command that reads markup on stdin
//! and writes rendered bytes (typically PDF) to stdout, e.g.
//! `wkhtmltopdf - -`.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::RenderMethod;
use crate::error::{IngestError, Result};

/// Renders a raw document into a fixed-layout derivative.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Returns the rendered bytes, or `None` when rendering is disabled.
    async fn render(&self, document: &str) -> Result<Option<Vec<u8>>>;
}

/// Builds the renderer selected by configuration.
pub fn build_renderer(method: &RenderMethod) -> Box<dyn Renderer> {
    match method {
        RenderMethod::Skip => Box::new(SkipRenderer),
        RenderMethod::Command { program, args } => {
            Box::new(CommandRenderer::new(program.clone(), args.clone()))
        }
    }
}

/// Default renderer: produces nothing.
pub struct SkipRenderer;

#[async_trait]
impl Renderer for SkipRenderer {
    async fn render(&self, _document: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// Pipes the document through an external command.
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
}

impl CommandRenderer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl Renderer for CommandRenderer {
    async fn render(&self, document: &str) -> Result<Option<Vec<u8>>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                IngestError::RenderError(format!("failed to spawn {}: {}", self.program, e))
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            IngestError::RenderError(format!("{}: no stdin handle", self.program))
        })?;

        // Feed stdin from its own task while wait_with_output drains stdout,
        // so a command that streams output early cannot deadlock the pipe.
        let input = document.as_bytes().to_vec();
        let writer = tokio::spawn(async move {
            let _ = stdin.write_all(&input).await;
            let _ = stdin.shutdown().await;
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| IngestError::RenderError(format!("{}: {}", self.program, e)))?;
        let _ = writer.await;

        if !output.status.success() {
            return Err(IngestError::RenderError(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(Some(output.stdout))
    }
}
