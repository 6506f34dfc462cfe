/*!
# Blood Pressure Tracker

A small web application for logging blood pressure and pulse readings to a
spreadsheet and looking back over them, built in Rust.

## Overview

Each reading is a systolic value, a diastolic value and a pulse, stamped with
the local time it was submitted. Readings are appended to a tabular store
whose first row is always the header `timestamp, systolic, diastolic, pulse`.
The store is a Google Sheets spreadsheet by default; a local CSV file or an
in-memory table can stand in for it.

## Architecture

### Pages
- **Enter Data** - form with three numeric inputs, appends one reading per submit
- **View Data** - every reading in store order, with CSV/XLSX download
- **View Chart** - the three metrics over time, offered when a chart mode is configured

Every page re-reads the store when it is opened; there is no cache.

### Store Layer
- `ReadingStore` trait with three operations: ensure header, append, read all
- `SheetsStore` - Google Sheets v4 API with service-account credentials
- `CsvStore` - local CSV file with the same layout
- `MemoryStore` - in-process table, used by tests

### Chart Strategies
- `disabled` - no chart page
- `static` - PNG drawn server-side with plotters
- `interactive` - data sent to the browser and drawn as SVG with tooltips

## Modules

- **reading**: the Reading record and timestamp format
- **store**: store trait, errors, record decoding, in-memory store
- **csv_store**: CSV file backend
- **sheets**: Google Sheets backend
- **config**: configuration file and environment overrides
- **views**: page logic independent of HTTP
- **chart**: time ordering of readings and the renderer interface
- **graph**: static and interactive renderers
- **downloader**: CSV and XLSX export
- **app**: routing and HTML rendering
*/

pub mod chart;
pub mod config;
pub mod csv_store;
pub mod reading;
pub mod store;
pub mod views;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod downloader;
#[cfg(feature = "web")]
pub mod graph;
#[cfg(feature = "web")]
pub mod sheets;

/// Re-export the types most callers need
pub use chart::{ChartMode, ChartPoint};
pub use config::{Config, StoreBackend};
pub use reading::Reading;
pub use store::{MemoryStore, ReadingStore, StoreError, open_store};
