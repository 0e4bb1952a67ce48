use anyhow::Result;
use async_trait::async_trait;
use chrono::Datelike;

use crate::content::{reels, ContentProvider, ContentResult, Reel};
use crate::filter::DiceRollEvent;

const LINES: [&str; 8] = [
    "Heute ist ein guter Tag, um nichts zu tun. Morgen auch.",
    "Ein Fremder wird dir heute ein Lächeln schenken. Er meint jemand anderen.",
    "Die Sterne raten dir, heute keine wichtigen Entscheidungen zu treffen.",
    "Dein Kaffee wird heute genau richtig sein. Genieße es, mehr kommt nicht.",
    "Venus steht im Büro. Rechne mit unnötigen Meetings.",
    "Heute findest du etwas, das du nie gesucht hast.",
    "Ein alter Bekannter denkt an dich. Leider wegen Schulden.",
    "Mars empfiehlt Bewegung. Der Weg zum Kühlschrank zählt.",
];

/// Offline horoscopes picked from a fixed table
#[derive(Debug, Default)]
pub struct CannedContent;

impl CannedContent {
    pub fn new() -> Self {
        Self
    }

    fn text_for(roll: &DiceRollEvent, reels: [Reel; 3]) -> String {
        match reels {
            [Reel::Seven, Reel::Seven, Reel::Seven] => {
                "Jackpot! Heute gelingt dir einfach alles. Kauf ein Los.".to_string()
            }
            [Reel::Bar, Reel::Bar, Reel::Bar] => {
                "Drei Balken: Heute Abend gehst du in eine Bar. Die Sterne zahlen nicht.".to_string()
            }
            [Reel::Grapes, Reel::Grapes, Reel::Grapes] => {
                "Trauben überall. Ein Glas Wein wäre heute keine Sünde.".to_string()
            }
            [Reel::Lemon, Reel::Lemon, Reel::Lemon] => {
                "Wenn das Leben dir Zitronen gibt, hast du heute Pech gehabt.".to_string()
            }
            _ => {
                let seed = roll.roll_value as usize + roll.occurred_at.ordinal() as usize;
                LINES[seed % LINES.len()].to_string()
            }
        }
    }
}

#[async_trait]
impl ContentProvider for CannedContent {
    async fn provide(&self, roll: &DiceRollEvent) -> Result<Option<ContentResult>> {
        let Some(reels) = reels(roll.roll_value) else {
            return Ok(None);
        };

        let text = Self::text_for(roll, reels);
        Ok(Some(ContentResult {
            message: text.clone(),
            formatted_message: text,
            image: None,
            use_html: false,
        }))
    }
}
