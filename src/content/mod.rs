pub mod canned;
pub mod llm;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::filter::DiceRollEvent;

/// A generated reply for a roll
#[derive(Debug, Clone, PartialEq)]
pub struct ContentResult {
    /// Plain form, used for event publication
    pub message: String,
    /// Render-ready form, sent to the chat
    pub formatted_message: String,
    pub image: Option<Vec<u8>>,
    pub use_html: bool,
}

#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// `None` means this roll gets no reply.
    async fn provide(&self, roll: &DiceRollEvent) -> Result<Option<ContentResult>>;
}

/// Sends every reply of `inner` as a photo with the reply as caption
pub struct WithImage {
    inner: Arc<dyn ContentProvider>,
    image: Vec<u8>,
}

impl WithImage {
    pub fn new(inner: Arc<dyn ContentProvider>, image: Vec<u8>) -> Self {
        Self { inner, image }
    }
}

#[async_trait]
impl ContentProvider for WithImage {
    async fn provide(&self, roll: &DiceRollEvent) -> Result<Option<ContentResult>> {
        let result = self.inner.provide(roll).await?;
        Ok(result.map(|mut result| {
            result.image.get_or_insert_with(|| self.image.clone());
            result
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reel {
    Bar,
    Grapes,
    Lemon,
    Seven,
}

impl Reel {
    pub fn name(&self) -> &'static str {
        match self {
            Reel::Bar => "BAR",
            Reel::Grapes => "Trauben",
            Reel::Lemon => "Zitrone",
            Reel::Seven => "Sieben",
        }
    }
}

/// Decode a slot-machine value (1..=64) into its three reels, left to right.
pub fn reels(value: u8) -> Option<[Reel; 3]> {
    if !(1..=64).contains(&value) {
        return None;
    }

    const SYMBOLS: [Reel; 4] = [Reel::Bar, Reel::Grapes, Reel::Lemon, Reel::Seven];
    let code = (value - 1) as usize;
    Some([
        SYMBOLS[code % 4],
        SYMBOLS[(code / 4) % 4],
        SYMBOLS[code / 16],
    ])
}
