use axum::{
    Form, Router,
    extract::State,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Local;
use handlebars::{Handlebars, TemplateError};
use log::{error, info, warn};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::chart::{ChartOptions, ChartRenderer, RenderedChart, renderer_for};
use crate::config::Config;
use crate::downloader;
use crate::store::{ReadingStore, StoreError, open_store};
use crate::views::{self, ChartView, EntryError, EntryInput, Page, TableView, ViewError};

const CHART_SCRIPT: &str = include_str!("./static/chart.js");

/// Shared state behind every route.
///
/// The store sits behind one async mutex that each handler holds for its
/// whole run, so interactions reach the store one at a time.
pub struct AppState {
    store: Mutex<Box<dyn ReadingStore>>,
    renderer: Option<Box<dyn ChartRenderer>>,
    templates: Handlebars<'static>,
    config: Config,
}

impl AppState {
    pub fn new(config: Config, store: Box<dyn ReadingStore>) -> Result<Self, TemplateError> {
        Ok(AppState {
            store: Mutex::new(store),
            renderer: renderer_for(config.chart_mode),
            templates: templates()?,
            config,
        })
    }

    fn chart_options(&self) -> ChartOptions {
        ChartOptions {
            width: self.config.chart_width,
            height: self.config.chart_height,
            ..ChartOptions::default()
        }
    }

    /// Renders a page template with the sidebar filled in.
    fn render(&self, template: &str, page: Page, status: StatusCode, mut data: Value) -> Response {
        let nav: Vec<Value> = Page::available(self.config.chart_mode)
            .into_iter()
            .map(|p| json!({ "path": p.path(), "label": p.label(), "active": p == page }))
            .collect();
        data["nav"] = Value::Array(nav);
        data["page_title"] = json!(page.label());

        match self.templates.render(template, &data) {
            Ok(html) => (status, Html(html)).into_response(),
            Err(e) => {
                error!("failed to render {} page: {}", template, e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render page").into_response()
            }
        }
    }
}

/// Compiles the page templates shipped in `src/static`.
pub fn templates() -> Result<Handlebars<'static>, TemplateError> {
    let mut templates = Handlebars::new();
    templates.register_partial("layout", include_str!("./static/layout.hbs"))?;
    templates.register_template_string("entry", include_str!("./static/entry.hbs"))?;
    templates.register_template_string("table", include_str!("./static/table.hbs"))?;
    templates.register_template_string("chart", include_str!("./static/chart.hbs"))?;
    Ok(templates)
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(serve_entry).post(submit_entry))
        .route("/data", get(serve_table))
        .route("/chart", get(serve_chart))
        .route("/export.csv", get(export_csv))
        .route("/export.xlsx", get(export_xlsx))
        .with_state(state)
}

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(&config)?;
    let bind_addr = config.bind_addr.clone();
    info!("Using {:?} store", config.backend);
    let app_state = Arc::new(AppState::new(config, store)?);
    match &app_state.renderer {
        Some(renderer) => info!("Chart view enabled ({:?})", renderer.mode()),
        None => info!("Chart view disabled"),
    }

    let app = router(app_state);

    let listener = TcpListener::bind(&bind_addr).await?;
    info!("Listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn serve_entry(State(state): State<Arc<AppState>>) -> Response {
    let input = EntryInput::default();
    state.render("entry", Page::EnterData, StatusCode::OK, entry_data(&input))
}

async fn submit_entry(
    State(state): State<Arc<AppState>>,
    Form(input): Form<EntryInput>,
) -> Response {
    let mut store = state.store.lock().await;
    let now = Local::now().naive_local();
    let mut data = entry_data(&input);

    let status = match views::submit_entry(&mut **store, &input, now).await {
        Ok(reading) => {
            info!(
                "Recorded {}/{} pulse {} at {}",
                reading.systolic, reading.diastolic, reading.pulse, reading.timestamp
            );
            data["success"] = json!("Data submitted successfully!");
            StatusCode::OK
        }
        Err(EntryError::InvalidInput { field }) => {
            warn!("Rejected entry: invalid {}", field);
            data["error"] = json!(format!("{} must be a whole number of 0 or more", field));
            StatusCode::UNPROCESSABLE_ENTITY
        }
        Err(EntryError::Store(e)) => {
            warn!("Failed to submit entry: {}", e);
            data["error"] = json!(format!("An error occurred: {}", e));
            StatusCode::SERVICE_UNAVAILABLE
        }
    };

    state.render("entry", Page::EnterData, status, data)
}

fn entry_data(input: &EntryInput) -> Value {
    json!({
        "systolic": input.systolic,
        "diastolic": input.diastolic,
        "pulse": input.pulse,
    })
}

async fn serve_table(State(state): State<Arc<AppState>>) -> Response {
    let mut store = state.store.lock().await;

    match views::load_table(&mut **store).await {
        Ok(TableView::Rows(rows)) => {
            state.render("table", Page::ViewData, StatusCode::OK, json!({ "rows": rows }))
        }
        Ok(TableView::Empty) => state.render("table", Page::ViewData, StatusCode::OK, json!({})),
        Err(e) => {
            warn!("Failed to load data: {}", e);
            state.render(
                "table",
                Page::ViewData,
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": load_error_message(&e.to_string()) }),
            )
        }
    }
}

async fn serve_chart(State(state): State<Arc<AppState>>) -> Response {
    let Some(renderer) = &state.renderer else {
        return (StatusCode::NOT_FOUND, "Chart view is not enabled").into_response();
    };
    let mut store = state.store.lock().await;

    let rendered = match views::load_chart(&mut **store).await {
        Ok(ChartView::Empty) => {
            return state.render("chart", Page::ViewChart, StatusCode::OK, json!({}));
        }
        Ok(ChartView::Points(points)) => renderer
            .render(&points, &state.chart_options())
            .map_err(ViewError::from),
        Err(e) => Err(e),
    };

    match rendered {
        Ok(RenderedChart::Png(png)) => state.render(
            "chart",
            Page::ViewChart,
            StatusCode::OK,
            json!({ "png": BASE64.encode(png) }),
        ),
        Ok(RenderedChart::Interactive(chart_data)) => state.render(
            "chart",
            Page::ViewChart,
            StatusCode::OK,
            json!({
                "chart_data": script_safe(&chart_data),
                "chart_script": CHART_SCRIPT,
                "width": state.config.chart_width,
                "height": state.config.chart_height,
            }),
        ),
        Err(e) => {
            warn!("Failed to build chart: {}", e);
            let status = match e {
                ViewError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
                ViewError::Parse(_) | ViewError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            state.render(
                "chart",
                Page::ViewChart,
                status,
                json!({ "error": load_error_message(&e.to_string()) }),
            )
        }
    }
}

fn load_error_message(message: &str) -> String {
    format!("An error occurred while loading data: {}", message)
}

/// Keeps JSON embedded in a `<script>` element from closing it early.
fn script_safe(json: &str) -> String {
    json.replace("</", "<\\/")
}

async fn export_csv(State(state): State<Arc<AppState>>) -> Response {
    match export_rows(&state).await {
        Ok(readings) => (
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"readings.csv\""),
            ],
            downloader::to_csv(&readings),
        )
            .into_response(),
        Err(e) => export_failed(e),
    }
}

async fn export_xlsx(State(state): State<Arc<AppState>>) -> Response {
    let readings = match export_rows(&state).await {
        Ok(readings) => readings,
        Err(e) => return export_failed(e),
    };

    match downloader::to_xlsx(&readings) {
        Ok(bytes) => (
            [
                (
                    header::CONTENT_TYPE,
                    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                ),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"readings.xlsx\""),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to build xlsx export: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to build spreadsheet").into_response()
        }
    }
}

async fn export_rows(state: &AppState) -> Result<Vec<crate::reading::Reading>, StoreError> {
    let mut store = state.store.lock().await;
    match views::load_table(&mut **store).await? {
        TableView::Rows(rows) => Ok(rows),
        TableView::Empty => Ok(Vec::new()),
    }
}

fn export_failed(e: StoreError) -> Response {
    warn!("Export failed: {}", e);
    (
        StatusCode::SERVICE_UNAVAILABLE,
        load_error_message(&e.to_string()),
    )
        .into_response()
}
