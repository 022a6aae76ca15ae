use anyhow::Result;
use serde::Serialize;
use std::io::Write;

use crate::classify::Tag;
use crate::config::{OutputFormat, ThemeConfig};
use crate::sensor::Sensor;
use crate::theme;

/// One rendered sensor, in i3bar block shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    pub name: String,
    pub full_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub urgent: bool,
    #[serde(rename = "_tags")]
    pub tags: Vec<Tag>,
}

impl Block {
    /// Label and tags are taken once each, in that order.
    pub fn from_sensor(sensor: &dyn Sensor, theme: &ThemeConfig) -> Self {
        let label = sensor.label();
        let tags = sensor.tags();
        let full_text = match theme::prefix_for(theme, &tags) {
            Some(prefix) => format!("{}{}", prefix, label),
            None => label,
        };
        Self {
            name: sensor.name().to_string(),
            full_text,
            color: Some(theme::hex(theme::color_for(theme, &tags))),
            urgent: tags.first() == Some(&Tag::Critical),
            tags,
        }
    }
}

/// Writes status lines in the configured format.
pub struct LineWriter<W: Write> {
    out: W,
    format: OutputFormat,
    started: bool,
}

impl<W: Write> LineWriter<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format, started: false }
    }

    pub fn write_line(&mut self, blocks: &[Block]) -> Result<()> {
        match self.format {
            OutputFormat::I3bar => {
                if !self.started {
                    self.out.write_all(b"{\"version\":1}\n[\n")?;
                    self.started = true;
                    writeln!(self.out, "{}", serde_json::to_string(blocks)?)?;
                } else {
                    writeln!(self.out, ",{}", serde_json::to_string(blocks)?)?;
                }
            }
            OutputFormat::Plain => {
                writeln!(self.out, "{}", plain_line(blocks))?;
            }
        }
        self.out.flush()?;
        Ok(())
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

fn plain_line(blocks: &[Block]) -> String {
    blocks
        .iter()
        .map(|b| {
            let tags: Vec<String> = b.tags.iter().map(|t| t.to_string()).collect();
            format!("{} [{}]", b.full_text, tags.join(","))
        })
        .collect::<Vec<_>>()
        .join(" | ")
}
