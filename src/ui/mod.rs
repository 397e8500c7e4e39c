// Terminal rendering for the browser and progress screens
pub mod keys;

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph};
use ratatui::Frame;

use crate::audio::player::{Telemetry, TransportState};
use crate::audio::timing::format_clock;
use crate::state::{AppState, Screen};

pub fn render(frame: &mut Frame<'_>, state: &AppState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(1), Constraint::Length(1)])
        .split(frame.area());

    let help = match state.screen {
        Screen::Browser => {
            render_browser(frame, rows[0], state);
            keys::BROWSER_HELP
        }
        Screen::Progress => {
            render_progress(frame, rows[0], state);
            keys::PROGRESS_HELP
        }
    };

    frame.render_widget(
        Paragraph::new(Line::from(help)).style(Style::default().fg(Color::DarkGray)),
        rows[1],
    );
    frame.render_widget(
        Paragraph::new(Line::from(ellipsize(&state.status_line, rows[2].width as usize)))
            .style(Style::default().fg(Color::Yellow)),
        rows[2],
    );
}

fn render_browser(frame: &mut Frame<'_>, area: Rect, state: &AppState) {
    let browser = state.browser.lock();
    let lines: Vec<Line<'static>> = if browser.entries().is_empty() {
        vec![Line::from("No media files here.")]
    } else {
        browser
            .entries()
            .iter()
            .enumerate()
            .map(|(idx, entry)| {
                let marker = if idx == browser.cursor() { ">" } else { " " };
                let suffix = if entry.is_dir { "/" } else { "" };
                selected_line(format!("{marker} {}{suffix}", entry.name), idx == browser.cursor())
            })
            .collect()
    };

    let scroll = follow_scroll(browser.cursor(), browser.entries().len(), area);
    frame.render_widget(
        Paragraph::new(Text::from(lines)).scroll((scroll, 0)).block(
            Block::default()
                .borders(Borders::ALL)
                .title(browser.root().display().to_string()),
        ),
        area,
    );
}

fn render_progress(frame: &mut Frame<'_>, area: Rect, state: &AppState) {
    let telemetry = state.telemetry();
    let title = state
        .now_playing
        .as_ref()
        .map(|t| t.display())
        .unwrap_or_else(|| "-".to_string());

    let block = Block::default()
        .borders(Borders::ALL)
        .title("Now Playing")
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    frame.render_widget(block, area);
    if inner.width == 0 || inner.height == 0 {
        return;
    }

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .split(inner);

    let (badge, color) = state_badge(telemetry.state);
    let top = Line::from(vec![
        Span::styled(format!(" {badge} "), Style::default().fg(Color::Black).bg(color)),
        Span::raw(" "),
        Span::raw(ellipsize(&title, rows[0].width.saturating_sub(10) as usize)),
    ]);
    frame.render_widget(Paragraph::new(top), rows[0]);

    frame.render_widget(
        Gauge::default()
            .ratio(telemetry.progress())
            .label(clock_label(&telemetry))
            .gauge_style(Style::default().fg(color).bg(Color::DarkGray))
            .use_unicode(true),
        rows[1],
    );

    frame.render_widget(Paragraph::new(Line::from(detail_line(&telemetry))), rows[2]);
}

fn clock_label(telemetry: &Telemetry) -> String {
    format!(
        "{} / {}",
        format_clock(telemetry.position),
        format_clock(telemetry.duration)
    )
}

fn detail_line(telemetry: &Telemetry) -> String {
    format!(
        "-{}  tempo {:+}%  volume {:.0}%",
        format_clock(telemetry.remaining),
        telemetry.tempo,
        telemetry.volume * 100.0
    )
}

fn state_badge(state: TransportState) -> (&'static str, Color) {
    match state {
        TransportState::Playing => ("PLAY", Color::Green),
        TransportState::Paused => ("PAUSE", Color::Yellow),
        TransportState::Errored => ("ERROR", Color::Red),
        TransportState::Ready | TransportState::Stopped | TransportState::Uninitialized => {
            ("STOP", Color::DarkGray)
        }
    }
}

fn ellipsize(input: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    let chars = input.chars().collect::<Vec<_>>();
    if chars.len() <= max_chars {
        return input.to_string();
    }
    let take = max_chars.saturating_sub(3);
    let prefix = chars.into_iter().take(take).collect::<String>();
    format!("{prefix}...")
}

fn selected_line(text: String, selected: bool) -> Line<'static> {
    if selected {
        Line::from(text).style(Style::default().fg(Color::Black).bg(Color::Cyan))
    } else {
        Line::from(text)
    }
}

fn follow_scroll(selected: usize, total_items: usize, area: Rect) -> u16 {
    let content_height = area.height.saturating_sub(2) as usize;
    if content_height == 0 || total_items <= content_height {
        return 0;
    }
    let half = content_height / 2;
    let desired = selected.saturating_sub(half);
    let max_scroll = total_items.saturating_sub(content_height);
    desired.min(max_scroll).min(u16::MAX as usize) as u16
}
