use crate::cli::{build_config, Cli};
use crate::client::DetectionClient;
use crate::model::{BeliefSnapshot, ServiceStatus, SyncCommand, SyncEvent};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, DisableFocusChange, EnableFocusChange, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Terminal,
};
use std::{io, sync::Arc, time::Duration, time::Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

struct UiState {
    snapshot: BeliefSnapshot,
    alert: Option<String>,
    notice: Option<String>,
    focused: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            snapshot: BeliefSnapshot::default(),
            alert: None,
            notice: None,
            focused: true,
        }
    }
}

pub async fn run(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let client = Arc::new(DetectionClient::new(&cfg)?);

    // Unbounded channels in both directions; the UI never blocks the
    // controller and vice versa.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<SyncEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<SyncCommand>();

    // TUI runs in a dedicated thread to keep all blocking I/O out of the
    // Tokio runtime.
    let ui_handle = std::thread::spawn(move || run_threaded(event_rx, cmd_tx));

    let res = crate::sync::run_controller(cfg, client, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    mut event_rx: UnboundedReceiver<SyncEvent>,
    cmd_tx: UnboundedSender<SyncCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let mut state = UiState::default();
    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        // Drain events without blocking to keep the UI responsive.
        while let Ok(ev) = event_rx.try_recv() {
            apply_event(&mut state, ev);
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            match event::read() {
                Ok(Event::Key(k)) => {
                    if k.kind != KeyEventKind::Press {
                        continue;
                    }
                    match (k.modifiers, k.code) {
                        (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                            let _ = cmd_tx.send(SyncCommand::Shutdown);
                            break Ok(());
                        }
                        (_, KeyCode::Char('s')) => {
                            let _ = cmd_tx.send(SyncCommand::Start);
                        }
                        (_, KeyCode::Char('p')) => {
                            let _ = cmd_tx.send(SyncCommand::TogglePause);
                        }
                        (_, KeyCode::Char('x')) => {
                            let _ = cmd_tx.send(SyncCommand::Stop);
                        }
                        _ => {}
                    }
                }
                // Terminal focus stands in for page visibility: an
                // unfocused dashboard polls lazily.
                Ok(Event::FocusLost) => {
                    state.focused = false;
                    let _ = cmd_tx.send(SyncCommand::SetHidden(true));
                }
                Ok(Event::FocusGained) => {
                    state.focused = true;
                    let _ = cmd_tx.send(SyncCommand::SetHidden(false));
                }
                _ => {}
            }
        }
    };

    disable_raw_mode().ok();
    execute!(
        terminal.backend_mut(),
        DisableFocusChange,
        LeaveAlternateScreen
    )
    .ok();
    terminal.show_cursor().ok();

    res
}

fn apply_event(state: &mut UiState, ev: SyncEvent) {
    match ev {
        SyncEvent::Belief(snap) => state.snapshot = snap,
        SyncEvent::ControlFailed { action, message } => {
            state.alert = Some(format!("{} failed: {message}", action.as_str()));
        }
        SyncEvent::ServiceUnreachable { message } => {
            state.alert = Some(format!("Cannot reach detection service: {message}"));
        }
        SyncEvent::Notice(msg) => state.notice = Some(msg),
    }
}

fn status_color(status: ServiceStatus) -> Color {
    match status {
        ServiceStatus::Running => Color::Green,
        ServiceStatus::Loading => Color::Yellow,
        ServiceStatus::Paused => Color::Cyan,
        ServiceStatus::Stopped => Color::DarkGray,
    }
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// A keyboard control hint, dimmed when the action is unavailable.
fn control_span(key: &str, label: String, enabled: bool) -> Vec<Span<'static>> {
    let style = if enabled {
        Style::default().fg(Color::White)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    vec![
        Span::styled(format!("[{key}] "), style.add_modifier(Modifier::BOLD)),
        Span::styled(label, style),
        Span::raw("   "),
    ]
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(1),
        ])
        .split(area);

    let snap = &state.snapshot;

    let mut status_spans = vec![
        Span::styled("● ", Style::default().fg(status_color(snap.status))),
        Span::styled(
            title_case(snap.status.as_str()),
            Style::default().add_modifier(Modifier::BOLD),
        ),
    ];
    if snap.processing {
        status_spans.push(Span::styled(
            "  (working…)",
            Style::default().fg(Color::Yellow),
        ));
    }
    if !state.focused {
        status_spans.push(Span::styled(
            "  [unfocused: slow polling]",
            Style::default().fg(Color::DarkGray),
        ));
    }
    f.render_widget(
        Paragraph::new(Line::from(status_spans))
            .block(Block::default().borders(Borders::ALL).title("Detection")),
        chunks[0],
    );

    let counts = Line::from(vec![
        Span::raw("Suitable: "),
        Span::styled(
            snap.suitable_count.to_string(),
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        ),
        Span::raw("    Unsuitable: "),
        Span::styled(
            snap.unsuitable_count.to_string(),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ),
    ]);
    f.render_widget(
        Paragraph::new(counts).block(Block::default().borders(Borders::ALL).title("Counts")),
        chunks[1],
    );

    let mut controls = Vec::new();
    controls.extend(control_span("s", "Start".to_string(), snap.start_enabled()));
    controls.extend(control_span(
        "p",
        snap.pause_label().to_string(),
        snap.pause_enabled(),
    ));
    controls.extend(control_span("x", "Stop".to_string(), snap.stop_enabled()));
    controls.extend(control_span("q", "Quit".to_string(), true));
    f.render_widget(
        Paragraph::new(Line::from(controls))
            .block(Block::default().borders(Borders::ALL).title("Controls")),
        chunks[2],
    );

    let message = if let Some(alert) = &state.alert {
        Line::from(Span::styled(
            alert.clone(),
            Style::default().fg(Color::Red),
        ))
    } else if let Some(notice) = &state.notice {
        Line::from(Span::styled(
            notice.clone(),
            Style::default().fg(Color::Gray),
        ))
    } else {
        Line::from(Span::styled(
            "Waiting for something to report…",
            Style::default().fg(Color::DarkGray),
        ))
    };
    f.render_widget(
        Paragraph::new(message).block(Block::default().borders(Borders::ALL).title("Messages")),
        chunks[3],
    );
}
