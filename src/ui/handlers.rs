use crossterm::event::KeyCode;
use log::error;

use crate::{
    export,
    models::{
        result::QueryResult,
        role::{Operation, Role},
    },
    query::{self, CannedQuery},
    routines::{Routine, RoutineOutcome},
    session::Session,
};

use super::components::{ConsoleUI, FocusedWidget, FormInput, Popup, RoutineInput, ScreenState};

impl ConsoleUI {
    pub async fn handle_key(&mut self, key: KeyCode) {
        if self.popup.is_some() {
            self.handle_popup_input(key).await;
            return;
        }

        match self.current_screen {
            ScreenState::RoleSelection => self.handle_role_selection_input(key).await,
            ScreenState::Browser => self.handle_browser_input(key).await,
            ScreenState::Form => self.handle_form_input(key).await,
            ScreenState::SqlEditor => self.handle_sql_editor_input(key).await,
            ScreenState::Routine => self.handle_routine_input(key).await,
            ScreenState::Audit => self.handle_audit_input(key).await,
        }
    }

    async fn handle_popup_input(&mut self, key: KeyCode) {
        match self.popup.take() {
            Some(Popup::ConfirmDelete { row }) => {
                if matches!(key, KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter) {
                    self.delete_row(row).await;
                } else {
                    self.status = "Delete cancelled".to_string();
                }
            }
            Some(Popup::Message { .. }) | None => {}
        }
    }

    async fn handle_role_selection_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Up => {
                if self.selected_role > 0 {
                    self.selected_role -= 1;
                }
            }
            KeyCode::Down => {
                if self.selected_role < Role::ALL.len() - 1 {
                    self.selected_role += 1;
                }
            }
            KeyCode::Enter => self.login().await,
            KeyCode::Char('q') | KeyCode::Esc => self.quit().await,
            _ => {}
        }
    }

    async fn login(&mut self) {
        let role = Role::ALL[self.selected_role];
        match Session::connect(&self.config, role).await {
            Ok(session) => self.start_session(session).await,
            Err(err) => {
                error!("login as {} failed: {}", role, err);
                self.show_error(format!("Login as {} failed: {}", role, err));
            }
        }
    }

    pub async fn start_session(&mut self, session: Session) {
        self.session = Some(session);
        self.current_screen = ScreenState::Browser;
        self.current_focus = FocusedWidget::TablesList;
        self.refresh_tables().await;
    }

    async fn quit(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
        self.should_quit = true;
    }

    async fn handle_browser_input(&mut self, key: KeyCode) {
        if self.search.active {
            match key {
                KeyCode::Char(c) => self.search.text.push(c),
                KeyCode::Backspace => {
                    self.search.text.pop();
                }
                KeyCode::Esc => {
                    self.search.text.clear();
                    self.search.active = false;
                }
                KeyCode::Enter => self.search.active = false,
                _ => {}
            }
            self.apply_filter();
            return;
        }

        match key {
            KeyCode::Tab => self.cycle_focus(),
            KeyCode::Up => self.move_selection_up(),
            KeyCode::Down => self.move_selection_down(),
            KeyCode::Enter => {
                if let FocusedWidget::TablesList = self.current_focus {
                    if let Some(table) = self.tables.get(self.selected_table).cloned() {
                        self.load_table(&table).await;
                    }
                }
            }
            KeyCode::Char('r') => {
                self.refresh_tables().await;
                if let Some(table) = self.current_table() {
                    self.load_table(&table).await;
                }
            }
            KeyCode::Char(c @ '1'..='3') => {
                let index = c as usize - '1' as usize;
                self.run_canned(CannedQuery::ALL[index]).await;
            }
            KeyCode::Char('e') => self.current_screen = ScreenState::SqlEditor,
            KeyCode::Char('i') => self.open_insert_form().await,
            KeyCode::Char('u') => self.open_update_form().await,
            KeyCode::Char('d') => self.request_delete(),
            KeyCode::Char('p') => {
                self.routine = RoutineInput::new(self.routine.selected);
                self.current_screen = ScreenState::Routine;
            }
            KeyCode::Char('a') => {
                self.load_audit().await;
                self.current_screen = ScreenState::Audit;
            }
            KeyCode::Char('s') => self.export_result(),
            KeyCode::Char('/') => self.search.active = true,
            KeyCode::Esc => {
                self.search.text.clear();
                self.apply_filter();
            }
            KeyCode::Char('q') => self.quit().await,
            _ => {}
        }
    }

    pub fn cycle_focus(&mut self) {
        self.current_focus = match self.current_focus {
            FocusedWidget::TablesList => FocusedWidget::QueryResult,
            FocusedWidget::QueryResult => FocusedWidget::TablesList,
        };
    }

    pub fn move_selection_up(&mut self) {
        match self.current_focus {
            FocusedWidget::TablesList => self.selected_table = self.selected_table.saturating_sub(1),
            FocusedWidget::QueryResult => self.selected_row = self.selected_row.saturating_sub(1),
        }
    }

    pub fn move_selection_down(&mut self) {
        match self.current_focus {
            FocusedWidget::TablesList => {
                if self.selected_table + 1 < self.tables.len() {
                    self.selected_table += 1;
                }
            }
            FocusedWidget::QueryResult => {
                if self.selected_row + 1 < self.visible_rows.len() {
                    self.selected_row += 1;
                }
            }
        }
    }

    /// The table of the displayed result, or the one selected in the list.
    fn current_table(&self) -> Option<String> {
        self.result
            .as_ref()
            .and_then(|result| result.source.table())
            .or_else(|| self.tables.get(self.selected_table).map(String::as_str))
            .map(str::to_string)
    }

    async fn refresh_tables(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        self.tables = query::list_tables(session.client()).await;
        if self.selected_table >= self.tables.len() {
            self.selected_table = 0;
        }
    }

    async fn load_table(&mut self, table: &str) {
        let Some(session) = &self.session else {
            return;
        };
        match query::load_table(session.client(), table).await {
            Ok(result) => {
                self.selected_row = 0;
                self.set_result(result);
            }
            Err(err) => self.show_error(format!("Cannot load {}: {}", table, err)),
        }
    }

    async fn run_canned(&mut self, canned: CannedQuery) {
        let Some(session) = &self.session else {
            return;
        };
        match query::run_canned(session.client(), canned).await {
            Ok(result) => {
                self.selected_row = 0;
                self.current_focus = FocusedWidget::QueryResult;
                self.set_result(result);
            }
            Err(err) => self.show_error(format!("{} failed: {}", canned.title(), err)),
        }
    }

    async fn open_insert_form(&mut self) {
        let Some(table) = self.current_table() else {
            self.show_error("Select a table first");
            return;
        };
        let Some(session) = &self.session else {
            return;
        };
        match session.open_insert_form(&table).await {
            Ok(form) => {
                self.form = Some(FormInput::new(form));
                self.current_screen = ScreenState::Form;
            }
            Err(err) => self.show_error(err.to_string()),
        }
    }

    async fn open_update_form(&mut self) {
        let (Some(session), Some(result)) = (&self.session, &self.result) else {
            return;
        };
        let Some(row) = self.visible_rows.get(self.selected_row).copied() else {
            self.show_error("Select a row to edit");
            return;
        };
        match session.open_update_form(result, row).await {
            Ok(form) => {
                self.form = Some(FormInput::new(form));
                self.current_screen = ScreenState::Form;
            }
            Err(err) => self.show_error(err.to_string()),
        }
    }

    fn request_delete(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        if let Err(err) = session.require(Operation::Delete) {
            self.show_error(err.to_string());
            return;
        }
        match self.selected_result_row() {
            Some(row) => self.popup = Some(Popup::ConfirmDelete { row }),
            None => self.show_error("Select a row to delete"),
        }
    }

    async fn delete_row(&mut self, row: usize) {
        let (Some(session), Some(result)) = (&self.session, &self.result) else {
            return;
        };
        match session.delete_row(result, row).await {
            Ok(affected) => {
                let table = self.current_table();
                if let Some(table) = table {
                    self.load_table(&table).await;
                }
                self.show_message("Deleted", format!("{} row(s) deleted", affected));
            }
            Err(err) => self.show_error(err.to_string()),
        }
    }

    async fn handle_form_input(&mut self, key: KeyCode) {
        let Some(input) = self.form.as_mut() else {
            self.current_screen = ScreenState::Browser;
            return;
        };
        let field_count = input.inputs.len();

        match key {
            KeyCode::Esc => {
                self.form = None;
                self.current_screen = ScreenState::Browser;
            }
            KeyCode::Up | KeyCode::BackTab => {
                input.current_field = input.current_field.checked_sub(1).unwrap_or(field_count.saturating_sub(1));
            }
            KeyCode::Down | KeyCode::Tab => {
                if field_count > 0 {
                    input.current_field = (input.current_field + 1) % field_count;
                }
            }
            KeyCode::Char(c) => {
                if !input.form.fields()[input.current_field].read_only {
                    input.inputs[input.current_field].push(c);
                }
            }
            KeyCode::Backspace => {
                if !input.form.fields()[input.current_field].read_only {
                    input.inputs[input.current_field].pop();
                }
            }
            KeyCode::Enter => self.submit_form().await,
            _ => {}
        }
    }

    async fn submit_form(&mut self) {
        let (Some(session), Some(input)) = (&self.session, self.form.as_mut()) else {
            return;
        };

        let edits: Vec<(String, String)> = input
            .form
            .fields()
            .iter()
            .zip(&input.inputs)
            .filter(|(field, _)| !field.read_only)
            .map(|(field, value)| (field.column.name.clone(), value.clone()))
            .collect();
        for (column, value) in &edits {
            if let Err(err) = input.form.set_value(column, value) {
                self.show_error(err.to_string());
                return;
            }
        }

        let table = input.form.table().to_string();
        match session.submit(&mut input.form).await {
            Ok(affected) => {
                self.form = None;
                self.current_screen = ScreenState::Browser;
                self.load_table(&table).await;
                self.show_message("Saved", format!("{} row(s) affected in {}", affected, table));
            }
            Err(err) => self.show_error(err.to_string()),
        }
    }

    async fn handle_sql_editor_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Esc => self.current_screen = ScreenState::Browser,
            KeyCode::Enter if self.sql_editor_content.trim().is_empty() => {}
            KeyCode::Enter => {
                let Some(session) = &self.session else {
                    return;
                };
                match query::run_ad_hoc(session.client(), &self.sql_editor_content).await {
                    Ok(result) => {
                        self.selected_row = 0;
                        self.current_focus = FocusedWidget::QueryResult;
                        self.current_screen = ScreenState::Browser;
                        self.set_result(result);
                    }
                    Err(err) => self.show_error(err.to_string()),
                }
            }
            KeyCode::Char(c) => self.sql_editor_content.push(c),
            KeyCode::Backspace => {
                self.sql_editor_content.pop();
            }
            _ => {}
        }
    }

    async fn handle_routine_input(&mut self, key: KeyCode) {
        let field_count = self.routine.inputs.len();
        match key {
            KeyCode::Esc => self.current_screen = ScreenState::Browser,
            KeyCode::Left => {
                let previous = (self.routine.selected + Routine::ALL.len() - 1) % Routine::ALL.len();
                self.routine = RoutineInput::new(previous);
            }
            KeyCode::Right => self.routine = RoutineInput::new(self.routine.selected + 1),
            KeyCode::Up => {
                self.routine.current_field = self.routine.current_field.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Tab => {
                self.routine.current_field = (self.routine.current_field + 1) % field_count;
            }
            KeyCode::Char(c) => self.routine.inputs[self.routine.current_field].push(c),
            KeyCode::Backspace => {
                self.routine.inputs[self.routine.current_field].pop();
            }
            KeyCode::Enter => self.invoke_routine().await,
            _ => {}
        }
    }

    async fn invoke_routine(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        let routine = self.routine.routine();

        match session.call(routine, &self.routine.inputs).await {
            Ok(outcome) => {
                let text = match outcome {
                    RoutineOutcome::Done => format!("{} completed", routine.name()),
                    RoutineOutcome::Created(Some(id)) => format!("New ExperimentID: {}", id),
                    RoutineOutcome::Created(None) => format!("{} completed", routine.name()),
                    RoutineOutcome::Value(Some(value)) => format!("{} = {}", routine.name(), value),
                    RoutineOutcome::Value(None) => format!("{} = NULL (no matching row)", routine.name()),
                };
                self.status = text.clone();
                self.routine.output = Some(text);
            }
            Err(err) => self.show_error(err.to_string()),
        }
    }

    async fn load_audit(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        match query::audit_feed(session.client()).await {
            Ok(entries) => self.audit = entries,
            Err(err) => self.show_error(format!("Audit log unavailable: {}", err)),
        }
    }

    async fn handle_audit_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('r') => self.load_audit().await,
            KeyCode::Esc | KeyCode::Char('q') => self.current_screen = ScreenState::Browser,
            _ => {}
        }
    }

    /// Exports the rows that pass the current filter.
    fn export_result(&mut self) {
        let Some(result) = &self.result else {
            self.show_error("Nothing to export");
            return;
        };
        let shown = QueryResult {
            source: result.source.clone(),
            columns: result.columns.clone(),
            rows: self
                .visible_rows
                .iter()
                .filter_map(|&i| result.rows.get(i).cloned())
                .collect(),
            ..Default::default()
        };

        match export::export_to_dir(&shown, &self.export_dir) {
            Ok(path) => self.show_message("Exported", format!("Saved {}", path.display())),
            Err(err) => self.show_error(err.to_string()),
        }
    }
}
