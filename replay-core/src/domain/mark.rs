//! Mark — an append-only diagnostic annotation on the bar timeline.

use super::ids::MarkId;
use super::signal::Signal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkShape {
    Circle,
    Triangle,
    Square,
}

/// A diagnostic annotation correlated with a bar, optionally carrying a
/// `Signal`. Append-only; never mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mark {
    pub id: MarkId,
    pub market_data_id: String,
    pub signal: Option<Signal>,
    pub color: String,
    pub shape: MarkShape,
    pub level: MarkLevel,
    pub title: String,
    pub message: String,
    pub category: String,
}

impl Mark {
    pub fn info(market_data_id: impl Into<String>, title: impl Into<String>, message: impl Into<String>) -> MarkBuilder {
        MarkBuilder::new(market_data_id, MarkLevel::Info, title, message)
    }

    pub fn warning(market_data_id: impl Into<String>, title: impl Into<String>, message: impl Into<String>) -> MarkBuilder {
        MarkBuilder::new(market_data_id, MarkLevel::Warning, title, message)
    }

    pub fn error(market_data_id: impl Into<String>, title: impl Into<String>, message: impl Into<String>) -> MarkBuilder {
        MarkBuilder::new(market_data_id, MarkLevel::Error, title, message)
    }
}

/// Builder that fills in sensible defaults (gray circle, empty category)
/// for the common case of a diagnostic mark with no linked signal.
pub struct MarkBuilder {
    market_data_id: String,
    level: MarkLevel,
    title: String,
    message: String,
    signal: Option<Signal>,
    category: String,
    color: String,
    shape: MarkShape,
}

impl MarkBuilder {
    fn new(
        market_data_id: impl Into<String>,
        level: MarkLevel,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let color = match level {
            MarkLevel::Info => "gray",
            MarkLevel::Warning => "yellow",
            MarkLevel::Error => "red",
        };
        Self {
            market_data_id: market_data_id.into(),
            level,
            title: title.into(),
            message: message.into(),
            signal: None,
            category: String::new(),
            color: color.to_string(),
            shape: MarkShape::Circle,
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn signal(mut self, signal: Signal) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn build(self, id: MarkId) -> Mark {
        Mark {
            id,
            market_data_id: self.market_data_id,
            signal: self.signal,
            color: self.color,
            shape: self.shape,
            level: self.level,
            title: self.title,
            message: self.message,
            category: self.category,
        }
    }
}
