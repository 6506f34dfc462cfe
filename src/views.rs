use chrono::NaiveDateTime;
use serde::Deserialize;
use thiserror::Error;

use crate::chart::{ChartError, ChartMode, ChartPoint, prepare_series};
use crate::reading::{ParseError, Reading};
use crate::store::{ReadingStore, StoreError};

/// The navigation modes of the sidebar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    EnterData,
    ViewData,
    ViewChart,
}

impl Page {
    pub fn label(self) -> &'static str {
        match self {
            Page::EnterData => "Enter Data",
            Page::ViewData => "View Data",
            Page::ViewChart => "View Chart",
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            Page::EnterData => "/",
            Page::ViewData => "/data",
            Page::ViewChart => "/chart",
        }
    }

    /// Pages offered for a chart mode; the chart page only exists when a
    /// chart can be drawn.
    pub fn available(chart_mode: ChartMode) -> Vec<Page> {
        match chart_mode {
            ChartMode::Disabled => vec![Page::EnterData, Page::ViewData],
            _ => vec![Page::EnterData, Page::ViewData, Page::ViewChart],
        }
    }
}

/// Raw values from the entry form.
///
/// Kept as text so a rejected submission can be shown back exactly as typed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EntryInput {
    #[serde(default)]
    pub systolic: String,
    #[serde(default)]
    pub diastolic: String,
    #[serde(default)]
    pub pulse: String,
}

impl Default for EntryInput {
    fn default() -> Self {
        EntryInput {
            systolic: "0".to_string(),
            diastolic: "0".to_string(),
            pulse: "0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryValues {
    pub systolic: u32,
    pub diastolic: u32,
    pub pulse: u32,
}

impl EntryInput {
    pub fn parse(&self) -> Result<EntryValues, EntryError> {
        let field = |name: &'static str, value: &str| {
            value
                .trim()
                .parse::<u32>()
                .map_err(|_| EntryError::InvalidInput { field: name })
        };

        Ok(EntryValues {
            systolic: field("Systolic", &self.systolic)?,
            diastolic: field("Diastolic", &self.diastolic)?,
            pulse: field("Pulse", &self.pulse)?,
        })
    }
}

#[derive(Debug, Error)]
pub enum EntryError {
    #[error("{field} must be a whole number of 0 or more")]
    InvalidInput { field: &'static str },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Stamps the submitted values with `now` and appends them to the store.
pub async fn submit_entry(
    store: &mut dyn ReadingStore,
    input: &EntryInput,
    now: NaiveDateTime,
) -> Result<Reading, EntryError> {
    let values = input.parse()?;
    store.ensure_header().await?;

    let reading = Reading::stamped(now, values.systolic, values.diastolic, values.pulse);
    store.append(&reading).await?;
    Ok(reading)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableView {
    Empty,
    /// Readings in store order
    Rows(Vec<Reading>),
}

pub async fn load_table(store: &mut dyn ReadingStore) -> Result<TableView, StoreError> {
    store.ensure_header().await?;
    let readings = store.read_all().await?;
    if readings.is_empty() {
        Ok(TableView::Empty)
    } else {
        Ok(TableView::Rows(readings))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartView {
    Empty,
    /// Points sorted by time
    Points(Vec<ChartPoint>),
}

#[derive(Debug, Error)]
pub enum ViewError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Render(#[from] ChartError),
}

pub async fn load_chart(store: &mut dyn ReadingStore) -> Result<ChartView, ViewError> {
    store.ensure_header().await?;
    let readings = store.read_all().await?;
    if readings.is_empty() {
        return Ok(ChartView::Empty);
    }
    Ok(ChartView::Points(prepare_series(&readings)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::{TIMESTAMP_FORMAT, parse_timestamp};
    use crate::store::{MemoryStore, header_row};
    use chrono::{Local, NaiveDate};

    fn input(s: &str, d: &str, p: &str) -> EntryInput {
        EntryInput {
            systolic: s.to_string(),
            diastolic: d.to_string(),
            pulse: p.to_string(),
        }
    }

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn form_defaults_to_zero() {
        assert_eq!(
            EntryInput::default().parse().unwrap(),
            EntryValues {
                systolic: 0,
                diastolic: 0,
                pulse: 0
            }
        );
    }

    #[test]
    fn form_rejects_negative_and_fractional_values() {
        for (bad, field) in [
            (input("-1", "80", "60"), "Systolic"),
            (input("120", "80.5", "60"), "Diastolic"),
            (input("120", "80", ""), "Pulse"),
        ] {
            match bad.parse() {
                Err(EntryError::InvalidInput { field: f }) => assert_eq!(f, field),
                other => panic!("expected invalid input, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn submit_appends_exactly_one_row() {
        let mut store = MemoryStore::new();
        let reading = submit_entry(&mut store, &input("121", "79", "66"), noon())
            .await
            .unwrap();

        assert_eq!(reading.timestamp, "2024-03-01 12:00:00");
        assert_eq!(
            store.rows(),
            &[header_row(), row(&["2024-03-01 12:00:00", "121", "79", "66"])]
        );
    }

    #[tokio::test]
    async fn submit_stamps_current_time() {
        let mut store = MemoryStore::new();
        let before = Local::now().naive_local();
        let reading = submit_entry(&mut store, &input("1", "2", "3"), Local::now().naive_local())
            .await
            .unwrap();
        let after = Local::now().naive_local();

        let stamped = parse_timestamp(&reading.timestamp).unwrap();
        // Stored with whole-second precision
        let floor = NaiveDateTime::parse_from_str(
            &before.format(TIMESTAMP_FORMAT).to_string(),
            TIMESTAMP_FORMAT,
        )
        .unwrap();
        assert!(stamped >= floor && stamped <= after);
    }

    #[tokio::test]
    async fn invalid_input_never_touches_the_store() {
        let mut store = MemoryStore::new();
        let err = submit_entry(&mut store, &input("abc", "80", "60"), noon())
            .await
            .unwrap_err();
        assert!(matches!(err, EntryError::InvalidInput { field: "Systolic" }));
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn store_failure_on_submit_is_returned() {
        let mut store = MemoryStore::new();
        store.fail_with("quota exceeded");
        let err = submit_entry(&mut store, &input("120", "80", "60"), noon())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "store unavailable: quota exceeded");
    }

    #[tokio::test]
    async fn n_appends_read_back_as_n_records() {
        let mut store = MemoryStore::new();
        let mut written = Vec::new();
        for i in 0..7u32 {
            let at = noon() + chrono::Duration::minutes(i as i64);
            let values = input(&(100 + i).to_string(), &(60 + i).to_string(), &(50 + i).to_string());
            written.push(submit_entry(&mut store, &values, at).await.unwrap());
        }

        match load_table(&mut store).await.unwrap() {
            TableView::Rows(rows) => assert_eq!(rows, written),
            TableView::Empty => panic!("expected rows"),
        }
    }

    #[tokio::test]
    async fn table_keeps_store_order() {
        let mut store = MemoryStore::with_rows(vec![
            header_row(),
            row(&["2024-01-02 10:00:00", "130", "85", "70"]),
            row(&["2024-01-01 09:00:00", "120", "80", "60"]),
        ]);
        let TableView::Rows(rows) = load_table(&mut store).await.unwrap() else {
            panic!("expected rows");
        };
        assert_eq!(rows[0].timestamp, "2024-01-02 10:00:00");
        assert_eq!(rows[1].timestamp, "2024-01-01 09:00:00");
    }

    #[tokio::test]
    async fn chart_orders_points_by_time() {
        let mut store = MemoryStore::with_rows(vec![
            header_row(),
            row(&["2024-01-02 10:00:00", "130", "85", "70"]),
            row(&["2024-01-01 09:00:00", "120", "80", "60"]),
        ]);
        let ChartView::Points(points) = load_chart(&mut store).await.unwrap() else {
            panic!("expected points");
        };
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].systolic, 120);
        assert_eq!(points[1].systolic, 130);
    }

    #[tokio::test]
    async fn empty_store_shows_no_data_everywhere() {
        let mut store = MemoryStore::new();
        assert_eq!(load_table(&mut store).await.unwrap(), TableView::Empty);
        assert_eq!(load_chart(&mut store).await.unwrap(), ChartView::Empty);
        // Opening initialised the header
        assert_eq!(store.rows(), &[header_row()]);
    }

    #[tokio::test]
    async fn bad_timestamp_fails_chart_but_not_table() {
        let mut store = MemoryStore::with_rows(vec![
            header_row(),
            row(&["2024-01-02 10:00:00", "130", "85", "70"]),
            row(&["last tuesday", "120", "80", "60"]),
        ]);
        assert!(matches!(load_table(&mut store).await, Ok(TableView::Rows(_))));
        assert!(matches!(
            load_chart(&mut store).await,
            Err(ViewError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn store_failure_on_read_views_is_returned() {
        let mut store = MemoryStore::new();
        store.fail_with("network down");
        assert!(load_table(&mut store).await.is_err());
        assert!(matches!(
            load_chart(&mut store).await,
            Err(ViewError::Store(StoreError::Unavailable(_)))
        ));
    }

    #[test]
    fn chart_page_only_when_enabled() {
        assert_eq!(
            Page::available(ChartMode::Disabled),
            vec![Page::EnterData, Page::ViewData]
        );
        assert_eq!(Page::available(ChartMode::Static).len(), 3);
        assert_eq!(Page::ViewChart.path(), "/chart");
    }
}
