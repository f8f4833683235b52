use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StudioError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationMode {
    TextToImage,
    ImageToImage,
    #[serde(alias = "series")]
    Conversation,
}

impl GenerationMode {
    /// Series flag wins, then the presence of reference images decides.
    pub fn detect(reference_count: usize, series_mode: bool) -> Self {
        if series_mode {
            GenerationMode::Conversation
        } else if reference_count == 0 {
            GenerationMode::TextToImage
        } else {
            GenerationMode::ImageToImage
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMode::TextToImage => "text-to-image",
            GenerationMode::ImageToImage => "image-to-image",
            GenerationMode::Conversation => "conversation",
        }
    }

    /// Batch modes are the ones driven image by image from the client.
    pub fn is_batch(&self) -> bool {
        !matches!(self, GenerationMode::Conversation)
    }

    pub fn has_reference_images(&self) -> bool {
        matches!(
            self,
            GenerationMode::ImageToImage | GenerationMode::Conversation
        )
    }
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    Landscape16x9,
    #[serde(rename = "9:16")]
    Portrait9x16,
    #[serde(rename = "4:3")]
    Landscape4x3,
    #[serde(rename = "3:4")]
    Portrait3x4,
    #[serde(rename = "3:2")]
    Landscape3x2,
    #[serde(rename = "2:3")]
    Portrait2x3,
    #[serde(rename = "21:9")]
    Ultrawide,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 8] = [
        AspectRatio::Square,
        AspectRatio::Landscape16x9,
        AspectRatio::Portrait9x16,
        AspectRatio::Landscape4x3,
        AspectRatio::Portrait3x4,
        AspectRatio::Landscape3x2,
        AspectRatio::Portrait2x3,
        AspectRatio::Ultrawide,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Landscape16x9 => "16:9",
            AspectRatio::Portrait9x16 => "9:16",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Portrait3x4 => "3:4",
            AspectRatio::Landscape3x2 => "3:2",
            AspectRatio::Portrait2x3 => "2:3",
            AspectRatio::Ultrawide => "21:9",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = StudioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AspectRatio::ALL
            .iter()
            .copied()
            .find(|ratio| ratio.as_str() == s.trim())
            .ok_or_else(|| StudioError::ValidationError(format!("Unknown aspect ratio: {}", s)))
    }
}
