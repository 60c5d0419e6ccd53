use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightColor {
    #[default]
    Blue,
    Red,
    Green,
    Yellow,
}

impl HighlightColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            HighlightColor::Blue => "blue",
            HighlightColor::Red => "red",
            HighlightColor::Green => "green",
            HighlightColor::Yellow => "yellow",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightShape {
    #[default]
    Auto,
    Rectangle,
    Circle,
    Oval,
}

impl HighlightShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            HighlightShape::Auto => "auto",
            HighlightShape::Rectangle => "rectangle",
            HighlightShape::Circle => "circle",
            HighlightShape::Oval => "oval",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Jpg,
    Jpeg,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpg => "jpg",
            OutputFormat::Jpeg => "jpeg",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    pub crop: bool,
    pub color: HighlightColor,
    pub shape: HighlightShape,
    pub format: OutputFormat,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            crop: true,
            color: HighlightColor::default(),
            shape: HighlightShape::default(),
            format: OutputFormat::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionRequest {
    pub control: String,
    pub current: String,
    pub sectors: Vec<u32>,
    pub client: String,
    pub room: String,
    pub render: RenderOptions,
}

impl DetectionRequest {
    /// Query string for `GET /detect`; `sectors` repeats once per sector.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("control", self.control.clone()),
            ("current", self.current.clone()),
        ];
        pairs.extend(self.sectors.iter().map(|sector| ("sectors", sector.to_string())));
        pairs.extend([
            ("client", self.client.clone()),
            ("room", self.room.clone()),
            ("crop", self.render.crop.to_string()),
            ("color", self.render.color.as_str().to_string()),
            ("shape", self.render.shape.as_str().to_string()),
            ("format", self.render.format.as_str().to_string()),
        ]);
        pairs
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorHighlight {
    pub control: String,
    pub highlight: String,
}

/// Sectors where stains were found. Empty means a clean room.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionResult {
    pub stains: BTreeMap<u32, SectorHighlight>,
}

impl DetectionResult {
    pub fn is_clean(&self) -> bool {
        self.stains.is_empty()
    }

    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        let raw = match serde_json::from_slice::<Value>(body)? {
            Value::Null => return Ok(Self::default()),
            Value::Array(items) if items.is_empty() => return Ok(Self::default()),
            other => serde_json::from_value::<BTreeMap<String, SectorHighlight>>(other)?,
        };

        let mut stains = BTreeMap::new();
        for (sector, highlight) in raw {
            let sector = sector.trim().parse::<u32>().map_err(|_| {
                <serde_json::Error as serde::de::Error>::custom(format!(
                    "sector key '{sector}' is not an integer"
                ))
            })?;
            stains.insert(sector, highlight);
        }
        Ok(Self { stains })
    }
}
