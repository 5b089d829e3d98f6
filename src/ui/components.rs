use std::{io, path::PathBuf};

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use crate::{
    crud::CrudForm,
    models::{connections::AppConfig, result::QueryResult, role::Role},
    query::AuditEntry,
    routines::Routine,
    session::Session,
};

use super::screens;

pub struct ConsoleUI {
    pub config: AppConfig,
    pub export_dir: PathBuf,
    pub session: Option<Session>,
    pub current_screen: ScreenState,
    pub popup: Option<Popup>,
    pub selected_role: usize,
    pub current_focus: FocusedWidget,
    pub tables: Vec<String>,
    pub selected_table: usize,
    pub result: Option<QueryResult>,
    /// Indices into `result.rows` that pass the search filter.
    pub visible_rows: Vec<usize>,
    pub selected_row: usize,
    pub search: SearchInput,
    pub sql_editor_content: String,
    pub form: Option<FormInput>,
    pub routine: RoutineInput,
    pub audit: Vec<AuditEntry>,
    pub status: String,
    pub should_quit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenState {
    RoleSelection,
    Browser,
    Form,
    SqlEditor,
    Routine,
    Audit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusedWidget {
    TablesList,
    QueryResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Popup {
    Message { title: String, text: String, is_error: bool },
    /// Index into `result.rows`.
    ConfirmDelete { row: usize },
}

#[derive(Debug, Default)]
pub struct SearchInput {
    pub text: String,
    pub active: bool,
}

/// A form plus the text typed into each of its fields.
#[derive(Debug)]
pub struct FormInput {
    pub form: CrudForm,
    pub inputs: Vec<String>,
    pub current_field: usize,
}

impl FormInput {
    pub fn new(form: CrudForm) -> Self {
        let inputs = form.fields().iter().map(|f| f.display().to_string()).collect();
        Self {
            form,
            inputs,
            current_field: 0,
        }
    }
}

#[derive(Debug)]
pub struct RoutineInput {
    pub selected: usize,
    pub inputs: Vec<String>,
    pub current_field: usize,
    pub output: Option<String>,
}

impl RoutineInput {
    pub fn new(selected: usize) -> Self {
        let routine = Routine::ALL[selected % Routine::ALL.len()];
        Self {
            selected: selected % Routine::ALL.len(),
            inputs: vec![String::new(); routine.labels().len()],
            current_field: 0,
            output: None,
        }
    }

    pub fn routine(&self) -> Routine {
        Routine::ALL[self.selected]
    }
}

impl ConsoleUI {
    pub fn new(config: AppConfig, export_dir: PathBuf) -> Self {
        Self {
            config,
            export_dir,
            session: None,
            current_screen: ScreenState::RoleSelection,
            popup: None,
            selected_role: 0,
            current_focus: FocusedWidget::TablesList,
            tables: Vec::new(),
            selected_table: 0,
            result: None,
            visible_rows: Vec::new(),
            selected_row: 0,
            search: SearchInput::default(),
            sql_editor_content: String::new(),
            form: None,
            routine: RoutineInput::new(0),
            audit: Vec::new(),
            status: String::new(),
            should_quit: false,
        }
    }

    pub fn role(&self) -> Option<Role> {
        self.session.as_ref().map(Session::role)
    }

    /// The row under the cursor, as an index into `result.rows`.
    pub fn selected_result_row(&self) -> Option<usize> {
        self.visible_rows.get(self.selected_row).copied()
    }

    pub fn set_result(&mut self, result: QueryResult) {
        self.status = format!("{}: {} rows", result.source.label(), result.row_count());
        self.result = Some(result);
        self.apply_filter();
    }

    pub fn apply_filter(&mut self) {
        self.visible_rows = match &self.result {
            Some(result) => result.matching_rows(&self.search.text),
            None => Vec::new(),
        };
        if self.selected_row >= self.visible_rows.len() {
            self.selected_row = self.visible_rows.len().saturating_sub(1);
        }
    }

    pub fn show_message(&mut self, title: &str, text: impl Into<String>) {
        self.popup = Some(Popup::Message {
            title: title.to_string(),
            text: text.into(),
            is_error: false,
        });
    }

    pub fn show_error(&mut self, text: impl Into<String>) {
        self.popup = Some(Popup::Message {
            title: "Error".to_string(),
            text: text.into(),
            is_error: true,
        });
    }

    pub async fn run_ui(&mut self) -> Result<(), io::Error> {
        let _guard = TerminalGuard;
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.ui_loop(&mut terminal).await;

        if let Some(session) = self.session.take() {
            session.close().await;
        }
        terminal.show_cursor()?;

        result
    }

    async fn ui_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> io::Result<()> {
        while !self.should_quit {
            terminal.draw(|f| screens::render(f, &*self))?;

            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    self.handle_key(key.code).await;
                }
            }
        }
        Ok(())
    }
}

struct TerminalGuard;

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = execute!(stdout, LeaveAlternateScreen, DisableMouseCapture);
    }
}
