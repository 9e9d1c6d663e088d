// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Interactive steps of browser-based sign-in flows.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::sync::Mutex;

use crate::providers::ProviderError;

/// Surface through which a flow shows an authorization URL and reads input.
#[async_trait]
pub trait InteractivePrompt: Send + Sync {
    async fn show_url(&self, purpose: &str, url: &str) -> Result<(), ProviderError>;

    /// Ask a question and return the trimmed answer (may be empty).
    async fn ask(&self, question: &str) -> Result<String, ProviderError>;
}

type InputLines = Lines<BufReader<Box<dyn AsyncRead + Send + Unpin>>>;

/// Terminal prompt: URLs and questions on stderr, answers from stdin.
///
/// One buffered reader serves every question, so answers piped or pasted
/// together are read in order.
pub struct ConsolePrompt {
    input: Mutex<InputLines>,
}

impl ConsolePrompt {
    pub fn new() -> Self {
        Self::from_reader(tokio::io::stdin())
    }

    /// Read answers from `reader` instead of stdin.
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        let reader: Box<dyn AsyncRead + Send + Unpin> = Box::new(reader);
        Self {
            input: Mutex::new(BufReader::new(reader).lines()),
        }
    }
}

impl Default for ConsolePrompt {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InteractivePrompt for ConsolePrompt {
    async fn show_url(&self, purpose: &str, url: &str) -> Result<(), ProviderError> {
        eprintln!("{purpose}:\n\n  {url}\n");
        Ok(())
    }

    async fn ask(&self, question: &str) -> Result<String, ProviderError> {
        eprint!("{question}: ");
        let line = self
            .input
            .lock()
            .await
            .next_line()
            .await
            .map_err(|e| ProviderError::other(format!("Failed to read input: {e}")))?;

        match line {
            Some(line) => Ok(line.trim().to_string()),
            None => Err(ProviderError::cancelled("Input closed")),
        }
    }
}
