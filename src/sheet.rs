use std::io::IsTerminal;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::error::Result;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetRequest {
    #[serde(default)]
    pub input: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetResult {
    pub translated_text: String,
}

/// Interactive surface that shows a translation and returns whatever the
/// user settles on.
#[async_trait]
pub trait SheetSurface: Send + Sync {
    fn is_available(&self) -> bool;

    async fn present(&self, source: &str, proposal: &str) -> Result<String>;
}

/// Sheet drawn on the controlling terminal.
pub struct TerminalSheet;

#[async_trait]
impl SheetSurface for TerminalSheet {
    fn is_available(&self) -> bool {
        std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
    }

    async fn present(&self, source: &str, proposal: &str) -> Result<String> {
        let mut stdout = tokio::io::stdout();
        let sheet = format!(
            "\n{}\n{}\n{}\n\n{}\n\nPress Enter to accept, or type a replacement: ",
            "-".repeat(60),
            source,
            "-".repeat(60),
            proposal
        );
        stdout.write_all(sheet.as_bytes()).await?;
        stdout.flush().await?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        Ok(accept_or_replace(&line, proposal))
    }
}

fn accept_or_replace(line: &str, proposal: &str) -> String {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        proposal.to_string()
    } else {
        line.to_string()
    }
}
