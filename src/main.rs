// Atribut pro skrytí konzolového okna ve finální verzi (v release buildu)
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use chrono::{DateTime, Local};
use eframe::egui;
use egui_extras::{Size, StripBuilder};
use egui_plot::PlotMemory;
use incubator_monitor::config::{config_path, load_config, save_config};
use incubator_monitor::{
    AlertLevel, AppConfig, ConnectionState, RollingSeries, SensorReading, StreamClient, StreamEvent, Thresholds,
};
#[cfg(debug_assertions)]
use std::io::Write;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::{Duration, Instant};
use log::{debug, error, info, warn};

const TEMP_COLOR: egui::Color32 = egui::Color32::from_rgb(255, 100, 100);
const HUM_COLOR: egui::Color32 = egui::Color32::from_rgb(100, 100, 255);
const LOW_COLOR: egui::Color32 = egui::Color32::from_rgb(120, 180, 255);

struct MonitorApp {
    config: AppConfig,
    config_path: PathBuf,
    config_changed: bool,
    settings_open: bool,
    restart_pending: bool,
    client: StreamClient,
    rx: Option<mpsc::Receiver<StreamEvent>>,
    series: RollingSeries,
    last_reading: Option<SensorReading>,
    status: ConnectionState,
    last_problem: Option<String>,
    malformed_count: usize,
    reset_plot: bool,
    toast_message: Option<(String, Instant)>,
}

impl MonitorApp {
    fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        info!("Vytváření nové instance aplikace MonitorApp.");
        let config_path = config_path();
        let (config, last_problem) = match load_config(&config_path) {
            Ok(config) => (config, None),
            Err(e) => {
                error!("Nelze načíst konfiguraci '{}': {}", config_path.display(), e);
                (AppConfig::default(), Some(format!("Chyba konfigurace: {}", e)))
            }
        };
        Self {
            client: StreamClient::new(config.stream_config()),
            series: RollingSeries::with_capacity(config.series_capacity),
            config,
            config_path,
            config_changed: false,
            settings_open: false,
            restart_pending: false,
            rx: None,
            last_reading: None,
            status: ConnectionState::Idle,
            last_problem,
            malformed_count: 0,
            reset_plot: false,
            toast_message: None,
        }
    }

    fn start_monitoring(&mut self) {
        self.stop_monitoring();
        let (tx, rx) = mpsc::channel();
        self.client = StreamClient::new(self.config.stream_config());
        self.series = RollingSeries::with_capacity(self.config.series_capacity);
        match self.client.start(tx) {
            Ok(()) => {
                info!("Monitorování spuštěno ({}:{}).", self.config.tcp_host, self.config.tcp_port);
                self.rx = Some(rx);
                self.last_problem = None;
                self.malformed_count = 0;
            }
            Err(e) => {
                error!("Nelze spustit TCP klienta: {}", e);
                self.last_problem = Some(e.to_string());
            }
        }
    }

    fn stop_monitoring(&mut self) {
        self.client.stop();
        self.rx = None;
        self.status = ConnectionState::Idle;
        self.series.clear();
        self.last_reading = None;
    }

    fn drain_events(&mut self) {
        let Some(rx) = &self.rx else { return };
        let events: Vec<StreamEvent> = rx.try_iter().collect();
        for event in events {
            match event {
                StreamEvent::Reading(reading) => self.add_reading(reading),
                StreamEvent::Status(state) => {
                    debug!("Aktualizace stavu spojení: {}", state);
                    self.status = state;
                }
                StreamEvent::Malformed { line, reason } => {
                    self.malformed_count += 1;
                    self.last_problem = Some(format!("{}: '{}'", reason, line));
                }
            }
        }
    }

    fn add_reading(&mut self, reading: SensorReading) {
        self.series.append_reading(&reading);
        self.last_reading = Some(reading);
        let Some(sample) = self.series.latest() else { return };
        let thresholds = self.config.thresholds();
        let status = thresholds.evaluate(&sample);
        if status.temperature.is_alert() {
            let message = format!(
                "Varování: teplota {:.1}°C mimo rozsah {:.1}-{:.1}°C!",
                sample.temperature, thresholds.temperature.min, thresholds.temperature.max
            );
            warn!("{}", message);
            self.toast_message = Some((message, Instant::now()));
        } else if status.humidity.is_alert() {
            let message = format!(
                "Varování: vlhkost {:.1}% mimo rozsah {:.1}-{:.1}%!",
                sample.humidity, thresholds.humidity.min, thresholds.humidity.max
            );
            warn!("{}", message);
            self.toast_message = Some((message, Instant::now()));
        }
    }
}

// --- Logika GUI ---
impl eframe::App for MonitorApp {
    fn save(&mut self, _storage: &mut dyn eframe::Storage) {
        if self.config_changed {
            info!("Změna v konfiguraci detekována, ukládám do souboru.");
            if let Err(e) = save_config(&self.config_path, &self.config) {
                error!("Nepodařilo se uložit konfiguraci: {}", e);
                self.last_problem = Some(e.to_string());
            }
            self.config_changed = false;
        }
    }

    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint_after(Duration::from_millis(250));
        self.drain_events();

        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("Soubor", |ui| {
                    if ui.button("Nastavení").clicked() { self.settings_open = true; ui.close_menu(); }
                    if ui.button("Ukončit").clicked() { ctx.send_viewport_cmd(egui::ViewportCommand::Close); }
                });
                ui.separator();
                let running = self.client.is_running();
                if ui.add_enabled(!running, egui::Button::new("▶ Spustit")).clicked() { self.start_monitoring(); }
                if ui.add_enabled(running, egui::Button::new("⏹ Zastavit")).clicked() { self.stop_monitoring(); }
                ui.separator();
                if ui.button("⛶").on_hover_text("Vycentrovat graf").clicked() { self.reset_plot = true; }
            });
        });

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(egui::RichText::new(format!("TCP: {}", self.status)).color(status_color(&self.status)));
                ui.separator();
                ui.label(format!("Vadné záznamy: {}", self.malformed_count));
                if let Some(problem) = &self.last_problem {
                    ui.separator();
                    ui.label(egui::RichText::new(problem).color(egui::Color32::LIGHT_RED));
                }
            });
        });

        if self.reset_plot { info!("Resetuji pohled grafů."); ctx.memory_mut(|memory| { memory.data.remove::<PlotMemory>(egui::Id::new("linked_plots")); }); }

        egui::CentralPanel::default().show(ctx, |ui| {
            StripBuilder::new(ui)
                .size(Size::relative(0.16)).size(Size::remainder()).size(Size::remainder())
                .vertical(|mut strip| {
                    strip.cell(|ui| { ui.columns(4, |columns| {
                        let thresholds = self.config.thresholds();
                        columns[0].vertical_centered(|ui| draw_temperature_info(ui, &self.series, &thresholds));
                        columns[1].vertical_centered(|ui| draw_humidity_info(ui, &self.series, &thresholds));
                        columns[2].vertical(|ui| if draw_threshold_editor(ui, &mut self.config) { self.config_changed = true; });
                        columns[3].vertical(|ui| draw_reading_details(ui, &self.last_reading));
                    });});
                    strip.cell(|ui| { ui.label(egui::RichText::new("Teplota").strong()); draw_graph(ui, self, Metric::Temperature); });
                    strip.cell(|ui| { ui.label(egui::RichText::new("Vlhkost").strong()); draw_graph(ui, self, Metric::Humidity); });
                });
        });

        if let Some((message, created_at)) = &self.toast_message {
            egui::Area::new("toast_area".into())
                .anchor(egui::Align2::CENTER_BOTTOM, egui::vec2(0.0, -40.0))
                .show(ctx, |ui| {
                    egui::Frame::popup(ui.style()).show(ui, |ui| { ui.label(message); });
                });
            if created_at.elapsed() > Duration::from_secs(5) {
                self.toast_message = None;
            }
        }

        if self.reset_plot { self.reset_plot = false; }
        self.draw_settings_window(ctx);
    }
}

impl MonitorApp {
    fn draw_settings_window(&mut self, ctx: &egui::Context) {
        if self.settings_open {
            let mut is_open = self.settings_open;
            let old_config = self.config.clone();
            egui::Window::new("Nastavení").open(&mut is_open).show(ctx, |ui| {
                ui.label("Host TCP serveru:"); ui.text_edit_singleline(&mut self.config.tcp_host);
                ui.add(egui::DragValue::new(&mut self.config.tcp_port).clamp_range(1..=65535).prefix("Port: "));
                ui.add(egui::DragValue::new(&mut self.config.reconnect_delay_seconds).clamp_range(1..=600).prefix("Prodleva před novým připojením (s): "));
                ui.separator();
                ui.add(egui::DragValue::new(&mut self.config.series_capacity).clamp_range(1..=10_000).prefix("Počet bodů v grafu: "));
                ui.label("⚠️ Změny spojení se projeví po novém spuštění monitorování.");
            });
            if self.config != old_config {
                debug!("Detekována změna v nastavení.");
                self.config_changed = true;
                self.restart_pending = true;
            }
            if !is_open && self.restart_pending {
                self.restart_pending = false;
                self.toast_message = Some(("Konfigurace uložena.".to_owned(), Instant::now()));
                if self.client.is_running() {
                    info!("Nastavení zavřeno, restartuji monitorování s novou konfigurací.");
                    self.start_monitoring();
                }
            }
            self.settings_open = is_open;
        }
    }
}

// --- Vykreslovací funkce ---

#[derive(Clone, Copy)]
enum Metric { Temperature, Humidity }

fn status_color(state: &ConnectionState) -> egui::Color32 {
    match state {
        ConnectionState::Connected => egui::Color32::GREEN,
        ConnectionState::Disconnected(_) => egui::Color32::RED,
        ConnectionState::Idle => egui::Color32::GRAY,
        ConnectionState::Connecting => egui::Color32::from_rgb(255, 165, 0),
    }
}

fn level_color(level: AlertLevel, normal: egui::Color32) -> egui::Color32 {
    match level {
        AlertLevel::Above => egui::Color32::GOLD,
        AlertLevel::Below => LOW_COLOR,
        AlertLevel::Invalid => egui::Color32::GRAY,
        AlertLevel::Normal => normal,
    }
}

fn format_time(time: DateTime<chrono::Utc>) -> String {
    time.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn draw_temperature_info(ui: &mut egui::Ui, series: &RollingSeries, thresholds: &Thresholds) {
    ui.label(egui::RichText::new("🌡 Teplota").color(egui::Color32::GRAY));
    match series.latest() {
        Some(sample) if !sample.temperature.is_nan() => {
            let color = level_color(thresholds.temperature.check(sample.temperature), TEMP_COLOR);
            ui.label(egui::RichText::new(format!("{:.1}°C", sample.temperature)).size(32.0).color(color));
        }
        _ => { ui.label(egui::RichText::new("-- °C").size(32.0)); }
    }
    if let Some((min, max)) = series.min_max_temperature() { ui.label(format!("Min: {:.1}° / Max: {:.1}°", min, max)); }
}

fn draw_humidity_info(ui: &mut egui::Ui, series: &RollingSeries, thresholds: &Thresholds) {
    ui.label(egui::RichText::new("💧 Vlhkost").color(egui::Color32::GRAY));
    match series.latest() {
        Some(sample) if !sample.humidity.is_nan() => {
            let color = level_color(thresholds.humidity.check(sample.humidity), HUM_COLOR);
            ui.label(egui::RichText::new(format!("{:.1}%", sample.humidity)).size(32.0).color(color));
        }
        _ => { ui.label(egui::RichText::new("-- %").size(32.0)); }
    }
    if let Some((min, max)) = series.min_max_humidity() { ui.label(format!("Min: {:.1}% / Max: {:.1}%", min, max)); }
}

/// Vrací `true`, pokud uživatel změnil některou mez.
fn draw_threshold_editor(ui: &mut egui::Ui, config: &mut AppConfig) -> bool {
    let before = config.thresholds();
    ui.label(egui::RichText::new("Optimální rozsah").color(egui::Color32::GRAY));
    ui.horizontal(|ui| {
        ui.add(egui::DragValue::new(&mut config.min_temp).clamp_range(0.0..=50.0).speed(0.1).suffix(" °C"));
        ui.label("–");
        ui.add(egui::DragValue::new(&mut config.max_temp).clamp_range(0.0..=50.0).speed(0.1).suffix(" °C"));
    });
    ui.horizontal(|ui| {
        ui.add(egui::DragValue::new(&mut config.min_humid).clamp_range(0.0..=100.0).speed(0.1).suffix(" %"));
        ui.label("–");
        ui.add(egui::DragValue::new(&mut config.max_humid).clamp_range(0.0..=100.0).speed(0.1).suffix(" %"));
    });
    // min nesmí přerůst max
    config.max_temp = config.max_temp.max(config.min_temp);
    config.max_humid = config.max_humid.max(config.min_humid);
    config.thresholds() != before
}

fn draw_reading_details(ui: &mut egui::Ui, last_reading: &Option<SensorReading>) {
    let Some(reading) = last_reading else {
        ui.label(egui::RichText::new("Žádná data").color(egui::Color32::GRAY));
        return;
    };
    ui.horizontal(|ui| { ui.label(egui::RichText::new("Aktualizace:").color(egui::Color32::GRAY)); ui.label(format_time(reading.timestamp)); });
    if let Some(sensor_id) = &reading.sensor_id {
        ui.horizontal(|ui| { ui.label(egui::RichText::new("Senzor:").color(egui::Color32::GRAY)); ui.label(sensor_id); });
    }
    if let Some(location) = &reading.location {
        ui.horizontal(|ui| { ui.label(egui::RichText::new("Umístění:").color(egui::Color32::GRAY)); ui.label(location); });
    }
    if let Some(stage) = &reading.process_stage {
        ui.horizontal(|ui| { ui.label(egui::RichText::new("Fáze:").color(egui::Color32::GRAY)); ui.label(stage); });
    }
}

fn draw_graph(ui: &mut egui::Ui, app: &MonitorApp, metric: Metric) {
    use egui_plot::{GridMark, HLine, Line, MarkerShape, Plot, PlotPoints, Points};
    let thresholds = app.config.thresholds();
    let (id, points, color, range, unit) = match metric {
        Metric::Temperature => ("temperature_plot", app.series.temperature_points(), TEMP_COLOR, thresholds.temperature, "°C"),
        Metric::Humidity => ("humidity_plot", app.series.humidity_points(), HUM_COLOR, thresholds.humidity, "%"),
    };
    let points: Vec<[f64; 2]> = points.into_iter().filter(|p| !p[1].is_nan()).collect();
    let line = Line::new(PlotPoints::new(points.clone())).color(color).width(2.0);
    let markers = Points::new(PlotPoints::new(points)).shape(MarkerShape::Circle).radius(3.0).color(egui::Color32::from_rgb(0, 255, 0)).highlight(true);

    let mut plot = Plot::new(id).height(ui.available_height()).width(ui.available_width())
        .link_axis(egui::Id::new("linked_plots"), true, false).show_background(false).allow_drag(true).allow_zoom(true)
        .auto_bounds(egui::Vec2b::new(true, true))
        .label_formatter(move |_name, value| { let time = DateTime::from_timestamp(value.x as i64, 0).unwrap_or_default().with_timezone(&Local); format!("Čas: {}\n{:.1}{}", time.format("%H:%M:%S"), value.y, unit) })
        .x_axis_formatter(|mark: GridMark, _, _| { let time = DateTime::from_timestamp(mark.value as i64, 0).unwrap_or_default().with_timezone(&Local); time.format("%H:%M:%S").to_string() })
        .y_axis_formatter(move |mark: GridMark, _, _| format!("{:.1}{}", mark.value, unit))
        .include_y(range.min).include_y(range.max);
    if app.reset_plot { plot = plot.reset(); }

    plot.show(ui, |plot_ui| {
        plot_ui.hline(HLine::new(range.min).color(LOW_COLOR));
        plot_ui.hline(HLine::new(range.max).color(egui::Color32::GOLD));
        plot_ui.line(line);
        plot_ui.points(markers);
    });
}

fn main() -> Result<(), eframe::Error> {
    #[cfg(debug_assertions)]
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| { writeln!(buf, "[{}] [{}] - {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"), record.level(), record.args()) })
        .init();
    info!("Logger inicializován, spouštím aplikaci...");
    let viewport = egui::ViewportBuilder::default().with_inner_size([900.0, 560.0]).with_decorations(true).with_app_id("incubator_monitor");
    let options = eframe::NativeOptions { viewport, ..Default::default() };
    eframe::run_native("Monitor inkubátoru", options, Box::new(|cc| Box::new(MonitorApp::new(cc))))
}
