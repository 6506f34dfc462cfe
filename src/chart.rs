use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use crate::reading::{ParseError, Reading};

/// Which chart, if any, the application offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartMode {
    /// No chart page
    Disabled,
    /// Server-rendered PNG
    Static,
    /// Data shipped to the browser and drawn there
    Interactive,
}

impl FromStr for ChartMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "disabled" | "none" => Ok(ChartMode::Disabled),
            "static" => Ok(ChartMode::Static),
            "interactive" => Ok(ChartMode::Interactive),
            _ => Err(()),
        }
    }
}

/// One reading with its timestamp parsed, ready to plot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartPoint {
    pub at: NaiveDateTime,
    pub systolic: u32,
    pub diastolic: u32,
    pub pulse: u32,
}

/// Parses every timestamp and orders the readings by time.
///
/// The sort is stable, so readings sharing a timestamp keep their store
/// order. A single unparsable timestamp fails the whole series.
pub fn prepare_series(readings: &[Reading]) -> Result<Vec<ChartPoint>, ParseError> {
    let mut points = readings
        .iter()
        .map(|r| {
            Ok(ChartPoint {
                at: r.parsed_timestamp()?,
                systolic: r.systolic,
                diastolic: r.diastolic,
                pulse: r.pulse,
            })
        })
        .collect::<Result<Vec<_>, ParseError>>()?;

    points.sort_by_key(|p| p.at);
    Ok(points)
}

/// The three plotted metrics, in legend order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Systolic,
    Diastolic,
    Pulse,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Systolic, Metric::Diastolic, Metric::Pulse];

    pub fn label(self) -> &'static str {
        match self {
            Metric::Systolic => "Systolic",
            Metric::Diastolic => "Diastolic",
            Metric::Pulse => "Pulse",
        }
    }

    pub fn value(self, point: &ChartPoint) -> u32 {
        match self {
            Metric::Systolic => point.systolic,
            Metric::Diastolic => point.diastolic,
            Metric::Pulse => point.pulse,
        }
    }
}

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("failed to draw chart: {0}")]
    Render(String),
}

/// Styling shared by the chart strategies.
#[derive(Clone, Debug)]
pub struct ChartOptions {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub width: u32,
    pub height: u32,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            title: "Blood Pressure and Pulse Over Time".to_string(),
            x_label: "Timestamp".to_string(),
            y_label: "Value".to_string(),
            width: 900,
            height: 500,
        }
    }
}

/// Output of a [`ChartRenderer`].
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedChart {
    /// Encoded PNG image
    Png(Vec<u8>),
    /// JSON document for the in-browser chart
    Interactive(String),
}

/// A way of turning time-ordered points into something the chart page can
/// show. Points are always non-empty and already sorted.
pub trait ChartRenderer: Send + Sync {
    fn mode(&self) -> ChartMode;

    fn render(
        &self,
        points: &[ChartPoint],
        options: &ChartOptions,
    ) -> Result<RenderedChart, ChartError>;
}

/// Picks the renderer for a mode; `Disabled` has none.
#[cfg(feature = "web")]
pub fn renderer_for(mode: ChartMode) -> Option<Box<dyn ChartRenderer>> {
    use crate::graph::{InteractiveChart, StaticChart};

    match mode {
        ChartMode::Disabled => None,
        ChartMode::Static => Some(Box::new(StaticChart)),
        ChartMode::Interactive => Some(Box::new(InteractiveChart)),
    }
}
