#![cfg(feature = "web")]
use chrono::DateTime;
use image::ImageEncoder;
use image::codecs::png::PngEncoder;
use log::warn;
use plotters::prelude::*;
use serde::Serialize;

use crate::chart::{ChartError, ChartMode, ChartOptions, ChartPoint, ChartRenderer, Metric, RenderedChart};
use crate::reading::format_timestamp;

/// Line colours, matched to [`Metric::ALL`]
const SERIES_COLORS: [RGBColor; 3] = [RED, BLUE, GREEN];

/// Server-side line chart encoded as a PNG
///
/// Draws the three metrics as line series with point markers on a shared
/// time axis and adds a legend in the upper-right corner. When no usable
/// font is installed the chart is drawn again without any text, so the
/// series still reach the page.
pub struct StaticChart;

impl ChartRenderer for StaticChart {
    fn mode(&self) -> ChartMode {
        ChartMode::Static
    }

    fn render(
        &self,
        points: &[ChartPoint],
        options: &ChartOptions,
    ) -> Result<RenderedChart, ChartError> {
        if options.width == 0 || options.height == 0 {
            return Err(ChartError::Render("chart size must be non-zero".to_string()));
        }

        let mut buffer = vec![0u8; options.width as usize * options.height as usize * 3];
        if let Err(e) = draw_line_chart(points, options, &mut buffer, true) {
            warn!("drawing chart without labels: {}", e);
            draw_line_chart(points, options, &mut buffer, false)
                .map_err(|e| ChartError::Render(e.to_string()))?;
        }

        encode_png(&buffer, options).map(RenderedChart::Png)
    }
}

fn encode_png(buffer: &[u8], options: &ChartOptions) -> Result<Vec<u8>, ChartError> {
    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(buffer, options.width, options.height, image::ColorType::Rgb8)
        .map_err(|e| ChartError::Render(e.to_string()))?;
    Ok(png)
}

/// Seconds since the epoch, used as the x coordinate
fn seconds(point: &ChartPoint) -> f64 {
    point.at.and_utc().timestamp() as f64
}

fn format_tick(x: &f64) -> String {
    DateTime::from_timestamp(*x as i64, 0)
        .map(|dt| dt.naive_utc().format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

// Caption, mesh labels and legend are the only parts that need a font
fn draw_line_chart(
    points: &[ChartPoint],
    options: &ChartOptions,
    buffer: &mut [u8],
    with_text: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let root =
        BitMapBackend::with_buffer(buffer, (options.width, options.height)).into_drawing_area();
    root.fill(&WHITE)?;

    let min_x = points.first().map(seconds).unwrap_or(0.0);
    let max_x = points.last().map(seconds).unwrap_or(0.0);
    // A single instant still needs a visible span
    let x_range = if max_x > min_x {
        min_x..max_x
    } else {
        min_x - 60.0..max_x + 60.0
    };

    let max_y = points
        .iter()
        .flat_map(|p| Metric::ALL.iter().map(move |m| m.value(p)))
        .max()
        .unwrap_or(100);
    let y_range = 0.0..(max_y as f64 * 1.1).max(10.0);

    let mut builder = ChartBuilder::on(&root);
    builder.margin(15);
    if with_text {
        builder
            .caption(&options.title, ("sans-serif", 30).into_font())
            .x_label_area_size(40)
            .y_label_area_size(50);
    }
    let mut chart = builder.build_cartesian_2d(x_range, y_range)?;

    if with_text {
        chart
            .configure_mesh()
            .x_desc(&options.x_label)
            .y_desc(&options.y_label)
            .x_labels(5)
            .x_label_formatter(&format_tick)
            .draw()?;
    }

    for (metric, color) in Metric::ALL.into_iter().zip(SERIES_COLORS) {
        chart
            .draw_series(
                LineSeries::new(
                    points.iter().map(|p| (seconds(p), metric.value(p) as f64)),
                    color.stroke_width(2),
                )
                .point_size(4),
            )?
            .label(metric.label())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
    }

    if with_text {
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }

    root.present()?;
    Ok(())
}

/// Chart drawn in the browser from a JSON payload
///
/// The page script plots one line per series with markers, shows the exact
/// reading under the cursor and lets the legend toggle series.
pub struct InteractiveChart;

#[derive(Serialize)]
struct InteractivePayload<'a> {
    title: &'a str,
    x_label: &'a str,
    y_label: &'a str,
    timestamps: Vec<String>,
    series: Vec<SeriesPayload>,
}

#[derive(Serialize)]
struct SeriesPayload {
    name: &'static str,
    color: &'static str,
    values: Vec<u32>,
}

const SERIES_CSS_COLORS: [&str; 3] = ["#d62728", "#1f77b4", "#2ca02c"];

impl ChartRenderer for InteractiveChart {
    fn mode(&self) -> ChartMode {
        ChartMode::Interactive
    }

    fn render(
        &self,
        points: &[ChartPoint],
        options: &ChartOptions,
    ) -> Result<RenderedChart, ChartError> {
        let payload = InteractivePayload {
            title: &options.title,
            x_label: &options.x_label,
            y_label: &options.y_label,
            timestamps: points.iter().map(|p| format_timestamp(p.at)).collect(),
            series: Metric::ALL
                .into_iter()
                .zip(SERIES_CSS_COLORS)
                .map(|(metric, color)| SeriesPayload {
                    name: metric.label(),
                    color,
                    values: points.iter().map(|p| metric.value(p)).collect(),
                })
                .collect(),
        };

        serde_json::to_string(&payload)
            .map(RenderedChart::Interactive)
            .map_err(|e| ChartError::Render(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::prepare_series;
    use crate::reading::Reading;

    fn points() -> Vec<ChartPoint> {
        let readings = vec![
            Reading {
                timestamp: "2024-01-02 10:00:00".to_string(),
                systolic: 130,
                diastolic: 85,
                pulse: 72,
            },
            Reading {
                timestamp: "2024-01-01 09:00:00".to_string(),
                systolic: 120,
                diastolic: 80,
                pulse: 65,
            },
        ];
        prepare_series(&readings).unwrap()
    }

    #[test]
    fn interactive_payload_lists_series_in_time_order() {
        let rendered = InteractiveChart
            .render(&points(), &ChartOptions::default())
            .unwrap();
        let RenderedChart::Interactive(json) = rendered else {
            panic!("expected interactive output");
        };

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            value["timestamps"],
            serde_json::json!(["2024-01-01 09:00:00", "2024-01-02 10:00:00"])
        );
        assert_eq!(value["series"][0]["name"], "Systolic");
        assert_eq!(value["series"][0]["values"], serde_json::json!([120, 130]));
        assert_eq!(value["series"][1]["values"], serde_json::json!([80, 85]));
        assert_eq!(value["series"][2]["name"], "Pulse");
        assert_eq!(value["series"][2]["values"], serde_json::json!([65, 72]));
    }

    #[test]
    fn static_chart_rejects_zero_size() {
        let options = ChartOptions {
            width: 0,
            ..ChartOptions::default()
        };
        assert!(matches!(
            StaticChart.render(&points(), &options),
            Err(ChartError::Render(_))
        ));
    }

    #[test]
    fn static_chart_produces_png() {
        let options = ChartOptions {
            width: 320,
            height: 200,
            ..ChartOptions::default()
        };
        match StaticChart.render(&points(), &options) {
            Ok(RenderedChart::Png(png)) => assert!(png.starts_with(b"\x89PNG\r\n\x1a\n")),
            other => panic!("expected png, got {:?}", other),
        }
    }

    #[test]
    fn series_are_drawn_without_a_font() {
        let options = ChartOptions {
            width: 320,
            height: 200,
            ..ChartOptions::default()
        };
        let mut buffer = vec![0u8; 320 * 200 * 3];
        draw_line_chart(&points(), &options, &mut buffer, false).unwrap();

        let pixels: Vec<&[u8]> = buffer.chunks(3).collect();
        assert!(pixels.iter().any(|p| *p != [255, 255, 255]));
        // Systolic line is pure red
        assert!(pixels.iter().any(|p| *p == [255, 0, 0]));
    }

    #[test]
    fn single_point_chart_still_renders() {
        let options = ChartOptions {
            width: 200,
            height: 120,
            ..ChartOptions::default()
        };
        let one = &points()[..1];
        assert!(matches!(
            StaticChart.render(one, &options),
            Ok(RenderedChart::Png(_))
        ));
    }

    #[test]
    fn tick_labels_are_calendar_times() {
        assert_eq!(format_tick(&1_704_099_600.0), "2024-01-01 09:00");
    }
}
