//! The extraction pipeline: normalized messages in, speech-ready utterances out.
//!
//! Stages run in a fixed order. Only link resolution touches the network;
//! everything else is pure.

pub mod estimate;
pub mod links;
pub mod merge;
pub mod speech;
pub mod threads;

use anyhow::{Context, Result};

use crate::imessage::{normalize_with, NormalizeOptions};
use crate::models::{Message, MessageRow};

pub use estimate::estimate;
pub use links::{LinkResolver, LinkSettings};
pub use speech::{SpeechNormalizer, SpeechTables};

/// Everything one run needs to know.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub merge_window_secs: u64,
    pub resolve_links: bool,
    pub links: LinkSettings,
    pub speech: SpeechTables,
    pub normalize: NormalizeOptions,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            merge_window_secs: merge::DEFAULT_WINDOW_SECS,
            resolve_links: true,
            links: LinkSettings::default(),
            speech: SpeechTables::default(),
            normalize: NormalizeOptions::default(),
        }
    }
}

/// One extraction. Owns the link-title cache, so titles fetched here are
/// never shared with another run.
pub struct ExtractionRun {
    merge_window_secs: u64,
    normalize: NormalizeOptions,
    speech: SpeechNormalizer,
    links: Option<LinkResolver>,
}

impl ExtractionRun {
    pub fn new(settings: RunSettings) -> Result<Self> {
        let speech =
            SpeechNormalizer::new(&settings.speech).context("Invalid speech normalization tables")?;
        let links = if settings.resolve_links {
            Some(LinkResolver::new(settings.links)?)
        } else {
            None
        };

        Ok(Self {
            merge_window_secs: settings.merge_window_secs,
            normalize: settings.normalize,
            speech,
            links,
        })
    }

    /// Turn store rows (chronological) into final utterances.
    pub async fn run(&mut self, rows: Vec<MessageRow>) -> Vec<Message> {
        let row_count = rows.len();
        let messages: Vec<Message> = rows
            .iter()
            .filter_map(|row| normalize_with(row, self.normalize))
            .collect();
        tracing::debug!(
            "Normalized {} rows into {} messages",
            row_count,
            messages.len()
        );

        let mut messages = threads::reorder(messages);

        if let Some(resolver) = self.links.as_mut() {
            resolver
                .prefetch(
                    messages
                        .iter()
                        .flat_map(|m| links::find_urls(&m.text)),
                )
                .await;
            for msg in &mut messages {
                msg.text = resolver.resolve(&msg.text);
            }
        }

        let before = messages.len();
        messages.retain(|m| !m.text.trim().is_empty());
        if messages.len() < before {
            tracing::debug!("Dropped {} empty messages", before - messages.len());
        }

        let mut utterances = merge::merge(messages, self.merge_window_secs);
        for utterance in &mut utterances {
            utterance.text = self.speech.normalize(&utterance.text);
        }
        tracing::debug!("Produced {} utterances", utterances.len());
        utterances
    }
}
