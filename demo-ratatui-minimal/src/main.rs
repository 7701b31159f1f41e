// SPDX-License-Identifier: Apache-2.0 OR MIT

#![warn(clippy::pedantic)]

mod embed;

use ::std::env;
use ::std::fs::File;
use ::std::sync::{Arc, Mutex};
use ::std::time::Duration;

use ::crossterm::event::{Event, EventStream, KeyCode, KeyEventKind, KeyModifiers};
use ::futures_util::StreamExt as _;
use ::ratatui::Frame;
use ::ratatui::layout::{Constraint, Layout};
use ::ratatui::style::{Color, Styled, Stylize};
use ::ratatui::text::{Line, Span, ToSpan};
use ::ratatui::widgets::{Block, Paragraph};
use ::tokio::runtime::Runtime;
use ::tokio::select;
use ::tokio::sync::watch;
use ::tokio::task::JoinHandle;
use ::tokio_waitfor::{AsyncViewport, AsyncWaitFor, AsyncWakeUp, GlobalNamespace, WaitForConfig};
use ::tracing::{error, info};
use ::tracing_subscriber::EnvFilter;

use crate::embed::{
    BOOTSTRAP_GLOBAL, EmbedError, EmbedSettings, EmbeddedServiceBootstrap, init_embedded_messaging,
    inject_bootstrap_script,
};

/// Path of the log file. Logging is off when unset, the terminal belongs to the UI.
const LOG_FILE_ENV: &str = "TOKIO_WAITFOR_DEMO_LOG";
const SCRIPT_LOAD_TIME: Duration = Duration::from_millis(1500);

fn main() {
    init_tracing();

    let runtime = Runtime::new().expect("Failed to create Tokio runtime");
    let _runtime_guard = runtime.enter();

    let _restore = RestoreGuard;
    let mut terminal = ::ratatui::init();
    let mut events = EventStream::new();

    let (sender, mut receiver) = watch::channel(());
    receiver.mark_changed();
    let viewport = AsyncViewport::new_with_wake_up(Arc::new(move || sender.send_replace(())));
    let mut app = DemoApp::new(viewport);

    loop {
        let event = runtime.block_on(async {
            select! {
                event = events.next() => Some(event.expect("Event stream ended unexpectedly")),

                result = receiver.changed() => {
                    result.expect("Repaint request receiver failed");
                    None
                },
            }
        });
        let Some(event) = event else {
            // Repaint request.
            terminal
                .draw(|frame| app.render_ui(frame))
                .expect("draw() failed");
            continue;
        };
        // Terminal event.
        let event = event.expect("Got error event");

        if app.handle_event(&event) {
            break;
        }
    }
}

fn init_tracing() {
    let Some(path) = env::var_os(LOG_FILE_ENV) else {
        return;
    };
    let file = File::create(&path).expect("Failed to create log file");
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tokio_waitfor=debug"));

    ::tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
}

struct RestoreGuard;

impl Drop for RestoreGuard {
    fn drop(&mut self) {
        ::ratatui::restore();
    }
}

struct DemoApp {
    frame_n: usize,
    viewport: AsyncViewport,
    namespace: GlobalNamespace,
    settings: EmbedSettings,
    /// Created when the script is injected, so the timeout covers its load.
    bootstrap: Option<AsyncWaitFor>,
    script: Option<JoinHandle<()>>,
    init_result: Option<Result<(), EmbedError>>,
}

fn gate_config() -> WaitForConfig {
    WaitForConfig::default().with_timeout(Duration::from_secs(10))
}

impl DemoApp {
    fn new(viewport: AsyncViewport) -> Self {
        Self {
            frame_n: 0,
            bootstrap: None,
            viewport,
            namespace: GlobalNamespace::default(),
            settings: EmbedSettings::default(),
            script: None,
            init_result: None,
        }
    }

    fn handle_event(&mut self, event: &Event) -> bool {
        let Event::Key(key) = event else {
            return false;
        };
        if key.kind != KeyEventKind::Press {
            return false;
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                // Close this app.
                KeyCode::Char('q' | 'w') => return true,

                KeyCode::Char('r') => self.reset(),

                _ => {}
            }
        } else if key.code == KeyCode::Enter {
            self.inject_script();
        }

        false
    }

    fn inject_script(&mut self) {
        if self.script.is_some() {
            return;
        }

        self.script = Some(inject_bootstrap_script(
            self.namespace.clone(),
            SCRIPT_LOAD_TIME,
            self.viewport.new_waker(),
        ));
        self.bootstrap = Some(self.viewport.new_wait_for(
            self.namespace.clone(),
            BOOTSTRAP_GLOBAL,
            gate_config(),
        ));
        info!(load_time = ?SCRIPT_LOAD_TIME, "bootstrap script injected");
        self.viewport.wake_up();
    }

    /// Starts over as if the page had been reloaded.
    fn reset(&mut self) {
        if let Some(script) = self.script.take() {
            script.abort();
        }
        let _ = self.namespace.remove(BOOTSTRAP_GLOBAL);
        self.init_result = None;
        self.bootstrap = None;
        self.viewport.wake_up();
    }

    fn update(&mut self) {
        let ready = self
            .bootstrap
            .as_mut()
            .is_some_and(|gate| gate.update(BOOTSTRAP_GLOBAL, gate_config()));
        if ready && self.init_result.is_none() {
            let result = init_embedded_messaging(&self.namespace, &self.settings);
            if let Err(err) = &result {
                error!("Error loading Embedded Messaging: {err}");
            }
            self.init_result = Some(result);
        }
    }

    fn render_ui(&mut self, frame: &mut Frame) {
        // Allow more redraw requests.
        self.viewport.woke_up();

        self.update();

        let [frame_n_area, help_area, status_area] = Layout::vertical([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(3),
        ])
        .areas(frame.area());

        frame.render_widget(Line::from(format!("Frame: {}", self.frame_n)), frame_n_area);
        self.frame_n += 1;

        let help_message = Line::from_iter([
            "Press ".to_span(),
            "Enter".bold(),
            " to inject the chat script, ".to_span(),
            "Ctrl-R".bold(),
            " to reload, or ".to_span(),
            "Ctrl-Q".bold(),
            " to exit.".to_span(),
        ]);
        frame.render_widget(help_message, help_area);

        let ready = self.bootstrap.as_ref().is_some_and(|gate| gate.is_ready());
        let gate_line = if ready {
            Line::from_iter([
                BOOTSTRAP_GLOBAL.bold(),
                " is available.".set_style(Color::Green),
            ])
        } else if self.script.is_some() {
            Line::from_iter(["Waiting for ".to_span(), BOOTSTRAP_GLOBAL.bold(), "...".to_span()])
        } else {
            Line::from("Chat script not injected yet.".set_style(Color::Yellow))
        };

        let init_line = match &self.init_result {
            None => Line::default(),

            Some(Ok(())) => {
                let language = self
                    .namespace
                    .get::<EmbeddedServiceBootstrap>(BOOTSTRAP_GLOBAL)
                    .filter(|bootstrap| bootstrap.is_initialized())
                    .and_then(|bootstrap| bootstrap.language())
                    .unwrap_or_default();
                Line::from_iter([
                    "Chat widget initialized! ".set_style(Color::Green),
                    Span::raw(format!("Language: {language}")),
                ])
            }

            Some(Err(error)) => Line::from_iter([
                "Error loading Embedded Messaging: ".set_style(Color::Red),
                error.to_span(),
            ]),
        };

        let status = Paragraph::new(vec![gate_line, init_line])
            .block(Block::bordered().title("EMBEDDED MESSAGING"));
        frame.render_widget(status, status_area);
    }
}
