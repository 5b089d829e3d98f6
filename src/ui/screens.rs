use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, List, ListItem, ListState, Paragraph, Row, Table, TableState, Wrap},
    Frame,
};

use crate::{
    crud::{FormMode, FormState},
    models::{
        result::{display_value, QueryResult},
        role::Role,
    },
    query::{AuditEntry, CannedQuery},
    routines::Routine,
};

use super::components::{ConsoleUI, FocusedWidget, Popup, ScreenState};

const MAX_COLUMN_WIDTH: u16 = 32;

fn highlight() -> Style {
    Style::default()
        .bg(Color::Yellow)
        .fg(Color::Black)
        .add_modifier(Modifier::BOLD)
}

fn border(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::White)
    }
}

fn key_hint(key: &str, color: Color) -> Span<'_> {
    Span::styled(key, Style::default().fg(color).add_modifier(Modifier::BOLD))
}

pub fn render(f: &mut Frame, ui: &ConsoleUI) {
    match ui.current_screen {
        ScreenState::RoleSelection => render_role_selection_screen(f, ui),
        ScreenState::Browser => render_browser_screen(f, ui),
        ScreenState::Form => render_form_screen(f, ui),
        ScreenState::SqlEditor => render_sql_editor_screen(f, ui),
        ScreenState::Routine => render_routine_screen(f, ui),
        ScreenState::Audit => render_audit_screen(f, ui),
    }

    if let Some(popup) = &ui.popup {
        render_popup(f, ui, popup);
    }
}

fn render_role_selection_screen(f: &mut Frame, ui: &ConsoleUI) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(30),
            Constraint::Percentage(40),
            Constraint::Percentage(20),
            Constraint::Percentage(10),
        ])
        .split(f.area());

    let role_list: Vec<ListItem> = Role::ALL
        .iter()
        .map(|role| {
            let user = &ui.config.roles.for_role(*role).user;
            ListItem::new(format!("{:<10} ({})", role.as_str(), user))
        })
        .collect();

    let block = Block::default()
        .title(format!(
            "Log in to {} on {}:{}",
            ui.config.database, ui.config.host, ui.config.port
        ))
        .borders(Borders::ALL)
        .title_alignment(Alignment::Center);

    let mut state = ListState::default().with_selected(Some(ui.selected_role));
    let role_widget = List::new(role_list).block(block).highlight_style(highlight());
    f.render_stateful_widget(role_widget, centered_rect(50, 100, chunks[1]), &mut state);

    let help_message = Line::from(vec![
        key_hint("Up", Color::Yellow),
        Span::raw("/"),
        key_hint("Down", Color::Yellow),
        Span::raw(" to choose a role, "),
        key_hint("Enter", Color::Green),
        Span::raw(" to log in, "),
        key_hint("q", Color::Red),
        Span::raw(" to quit"),
    ]);
    let help_paragraph = Paragraph::new(help_message)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    f.render_widget(help_paragraph, chunks[2]);
}

/// Header, body and footer rows shared by the session screens.
fn frame_layout(area: Rect) -> (Rect, Rect, Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(3), Constraint::Length(2)])
        .split(area);
    (chunks[0], chunks[1], chunks[2])
}

fn render_header(f: &mut Frame, ui: &ConsoleUI, area: Rect) {
    let role = ui.role().map(|r| r.as_str()).unwrap_or("-");
    let header = Line::from(vec![
        Span::styled(" SRS console ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!("| role: {} | {} ", role, ui.config.database)),
        Span::styled(ui.status.clone(), Style::default().fg(Color::Cyan)),
    ]);
    f.render_widget(Paragraph::new(header), area);
}

fn render_browser_screen(f: &mut Frame, ui: &ConsoleUI) {
    let (header, body, footer) = frame_layout(f.area());
    render_header(f, ui, header);

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(22), Constraint::Percentage(78)])
        .split(body);

    render_tables_list(f, ui, chunks[0]);
    render_result(f, ui, chunks[1], ui.current_focus == FocusedWidget::QueryResult);

    let mut hints = vec![
        key_hint("Tab", Color::Yellow),
        Span::raw(" focus  "),
        key_hint("Enter", Color::Green),
        Span::raw(" open  "),
    ];
    if let Some(permissions) = ui.session.as_ref().map(|s| s.permissions()) {
        if permissions.can_insert {
            hints.extend([key_hint("i", Color::Green), Span::raw(" insert  ")]);
        }
        if permissions.can_update {
            hints.extend([key_hint("u", Color::Green), Span::raw(" update  ")]);
        }
        if permissions.can_delete {
            hints.extend([key_hint("d", Color::Red), Span::raw(" delete  ")]);
        }
    }
    hints.extend([
        key_hint("1-3", Color::Yellow),
        Span::raw(" reports  "),
        key_hint("e", Color::Yellow),
        Span::raw(" SQL  "),
        key_hint("p", Color::Yellow),
        Span::raw(" routines  "),
        key_hint("a", Color::Yellow),
        Span::raw(" audit  "),
        key_hint("s", Color::Yellow),
        Span::raw(" export  "),
        key_hint("r", Color::Yellow),
        Span::raw(" reload  "),
        key_hint("q", Color::Red),
        Span::raw(" quit"),
    ]);

    let search = if ui.search.active || !ui.search.text.is_empty() {
        let cursor = if ui.search.active { "_" } else { "" };
        Line::from(vec![key_hint("/", Color::Yellow), Span::raw(format!(" {}{}", ui.search.text, cursor))])
    } else {
        Line::from(Span::raw("/ to search"))
    };

    f.render_widget(Paragraph::new(vec![Line::from(hints), search]), footer);
}

fn render_tables_list(f: &mut Frame, ui: &ConsoleUI, area: Rect) {
    let focused = ui.current_focus == FocusedWidget::TablesList;
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Tables")
        .border_style(border(focused));

    let table_list: Vec<ListItem> = ui
        .tables
        .iter()
        .map(|table| ListItem::new(table.as_str()))
        .collect();

    let mut state = ListState::default().with_selected(Some(ui.selected_table));
    let tables_widget = List::new(table_list).block(block).highlight_style(if focused {
        highlight()
    } else {
        Style::default().add_modifier(Modifier::BOLD)
    });
    f.render_stateful_widget(tables_widget, area, &mut state);
}

fn render_result(f: &mut Frame, ui: &ConsoleUI, area: Rect, focused: bool) {
    let Some(result) = &ui.result else {
        let block = Block::default()
            .borders(Borders::ALL)
            .title("Query Result")
            .border_style(border(focused));
        let hint = Paragraph::new("Select a table and press Enter, or run a report (1-3).")
            .block(block)
            .style(Style::default().fg(Color::DarkGray));
        f.render_widget(hint, area);
        return;
    };

    let title = format!(
        "{} ({} of {} rows)",
        result.source.label(),
        ui.visible_rows.len(),
        result.row_count()
    );
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(border(focused));

    let header = Row::new(result.columns.iter().map(|c| Cell::from(c.as_str())))
        .style(Style::default().add_modifier(Modifier::BOLD).fg(Color::Cyan));
    let rows: Vec<Row> = ui
        .visible_rows
        .iter()
        .filter_map(|&i| result.rows.get(i))
        .map(|row| Row::new(row.iter().map(display_value)))
        .collect();

    let table = Table::new(rows, column_widths(result, &ui.visible_rows))
        .header(header)
        .block(block)
        .highlight_style(highlight());

    let mut state = TableState::default().with_selected(if focused { Some(ui.selected_row) } else { None });
    f.render_stateful_widget(table, area, &mut state);
}

/// Each column as wide as its header or widest displayed value, capped.
pub fn column_widths(result: &QueryResult, visible_rows: &[usize]) -> Vec<Constraint> {
    result
        .columns
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let widest = visible_rows
                .iter()
                .filter_map(|&row| result.rows.get(row).and_then(|r| r.get(index)))
                .map(|value| display_value(value).chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0);
            Constraint::Length((widest as u16).clamp(3, MAX_COLUMN_WIDTH))
        })
        .collect()
}

fn render_form_screen(f: &mut Frame, ui: &ConsoleUI) {
    let (header, body, footer) = frame_layout(f.area());
    render_header(f, ui, header);

    let Some(input) = &ui.form else {
        return;
    };
    let title = match input.form.mode() {
        FormMode::Insert => format!("Insert into {}", input.form.table()),
        FormMode::Update => format!("Update {}", input.form.table()),
    };

    let mut lines: Vec<Line> = input
        .form
        .fields()
        .iter()
        .zip(&input.inputs)
        .enumerate()
        .map(|(index, (field, value))| {
            let column = &field.column;
            let mut label = format!("{} [{}]", column.name, column.declared_type);
            if column.is_required() {
                label.push('*');
            }
            let mut spans = vec![Span::raw(format!("{:<36} ", label))];
            if field.read_only {
                let shown = if value.is_empty() && column.is_auto_generated {
                    "(auto)".to_string()
                } else {
                    value.clone()
                };
                spans.push(Span::styled(shown, Style::default().fg(Color::DarkGray)));
            } else {
                spans.push(Span::raw(value.clone()));
            }
            if index == input.current_field {
                spans.push(Span::styled(" <", Style::default().fg(Color::Yellow)));
            }
            Line::from(spans)
        })
        .collect();

    match input.form.state() {
        FormState::Failed(message) => {
            lines.push(Line::raw(""));
            lines.push(Line::styled(message.clone(), Style::default().fg(Color::Red)));
        }
        FormState::Submitting => lines.push(Line::raw("Saving...")),
        FormState::Ready | FormState::Success { .. } => {}
    }

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(border(true));
    let form_widget = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
    f.render_widget(form_widget, centered_rect(80, 90, body));

    let help_message = Line::from(vec![
        key_hint("Up", Color::Yellow),
        Span::raw("/"),
        key_hint("Down", Color::Yellow),
        Span::raw(" field, "),
        key_hint("Enter", Color::Green),
        Span::raw(" save, "),
        key_hint("Esc", Color::Red),
        Span::raw(" cancel. Empty means NULL, * marks required columns."),
    ]);
    f.render_widget(Paragraph::new(help_message), footer);
}

fn render_sql_editor_screen(f: &mut Frame, ui: &ConsoleUI) {
    let (header, body, footer) = frame_layout(f.area());
    render_header(f, ui, header);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(body);

    let block = Block::default()
        .borders(Borders::ALL)
        .title("SQL Query (SELECT only)")
        .border_style(border(true));
    let sql_widget = Paragraph::new(format!("{}_", ui.sql_editor_content))
        .block(block)
        .wrap(Wrap { trim: false });
    f.render_widget(sql_widget, chunks[0]);
    render_result(f, ui, chunks[1], false);

    let reports: Vec<Span> = CannedQuery::ALL
        .iter()
        .enumerate()
        .map(|(i, q)| Span::raw(format!("{}: {}  ", i + 1, q.title())))
        .collect();
    let help_message = vec![
        Line::from(vec![
            key_hint("Enter", Color::Green),
            Span::raw(" run, "),
            key_hint("Esc", Color::Red),
            Span::raw(" back"),
        ]),
        Line::from(reports),
    ];
    f.render_widget(Paragraph::new(help_message), footer);
}

fn render_routine_screen(f: &mut Frame, ui: &ConsoleUI) {
    let (header, body, footer) = frame_layout(f.area());
    render_header(f, ui, header);

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(body);

    let routine_list: Vec<ListItem> = Routine::ALL
        .iter()
        .map(|routine| {
            let kind = if routine.is_procedure() { "procedure" } else { "function" };
            ListItem::new(format!("{} ({})", routine.name(), kind))
        })
        .collect();
    let mut state = ListState::default().with_selected(Some(ui.routine.selected));
    let list_widget = List::new(routine_list)
        .block(Block::default().borders(Borders::ALL).title("Routines"))
        .highlight_style(highlight());
    f.render_stateful_widget(list_widget, chunks[0], &mut state);

    let routine = ui.routine.routine();
    let mut lines: Vec<Line> = routine
        .labels()
        .iter()
        .zip(&ui.routine.inputs)
        .enumerate()
        .map(|(index, (label, value))| {
            let marker = if index == ui.routine.current_field { " <" } else { "" };
            Line::raw(format!("{:<18} {}{}", label, value, marker))
        })
        .collect();
    if let Some(output) = &ui.routine.output {
        lines.push(Line::raw(""));
        lines.push(Line::styled(output.clone(), Style::default().fg(Color::Green)));
    }

    let inputs_widget = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(routine.name())
            .border_style(border(true)),
    );
    f.render_widget(inputs_widget, chunks[1]);

    let help_message = Line::from(vec![
        key_hint("Left", Color::Yellow),
        Span::raw("/"),
        key_hint("Right", Color::Yellow),
        Span::raw(" routine, "),
        key_hint("Up", Color::Yellow),
        Span::raw("/"),
        key_hint("Down", Color::Yellow),
        Span::raw(" field, "),
        key_hint("Enter", Color::Green),
        Span::raw(" call, "),
        key_hint("Esc", Color::Red),
        Span::raw(" back"),
    ]);
    f.render_widget(Paragraph::new(help_message), footer);
}

fn render_audit_screen(f: &mut Frame, ui: &ConsoleUI) {
    let (header, body, footer) = frame_layout(f.area());
    render_header(f, ui, header);

    let header_row = Row::new(AuditEntry::COLUMNS)
        .style(Style::default().add_modifier(Modifier::BOLD).fg(Color::Cyan));
    let rows: Vec<Row> = ui.audit.iter().map(|entry| Row::new(entry.cells())).collect();
    let widths = [
        Constraint::Length(8),
        Constraint::Length(20),
        Constraint::Length(10),
        Constraint::Percentage(20),
        Constraint::Percentage(40),
        Constraint::Length(20),
    ];

    let table = Table::new(rows, widths).header(header_row).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Audit log ({} most recent)", ui.audit.len())),
    );
    f.render_widget(table, body);

    let help_message = Line::from(vec![
        key_hint("r", Color::Yellow),
        Span::raw(" refresh, "),
        key_hint("Esc", Color::Red),
        Span::raw(" back"),
    ]);
    f.render_widget(Paragraph::new(help_message), footer);
}

fn render_popup(f: &mut Frame, ui: &ConsoleUI, popup: &Popup) {
    let area = centered_rect(60, 25, f.area());
    let (title, text, color) = match popup {
        Popup::Message { title, text, is_error } => (
            title.clone(),
            format!("{}\n\nPress any key", text),
            if *is_error { Color::Red } else { Color::Green },
        ),
        Popup::ConfirmDelete { row } => {
            let table = ui
                .result
                .as_ref()
                .and_then(|r| r.source.table())
                .unwrap_or("table");
            let values = ui
                .result
                .as_ref()
                .and_then(|r| r.display_row(*row))
                .map(|values| values.join(", "))
                .unwrap_or_default();
            (
                "Confirm delete".to_string(),
                format!("Delete this row from {}?\n\n{}\n\ny to delete, any other key to cancel", table, values),
                Color::Red,
            )
        }
    };

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color))
        .title_alignment(Alignment::Center);
    let paragraph = Paragraph::new(text).block(block).wrap(Wrap { trim: false });

    f.render_widget(Clear, area);
    f.render_widget(paragraph, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use ratatui::{backend::TestBackend, Terminal};
    use serde_json::json;

    use super::*;
    use crate::models::result::ResultSource;

    #[test]
    fn test_column_widths_fit_content() {
        let result = QueryResult {
            source: ResultSource::AdHoc,
            columns: vec!["ID".into(), "Objective".into()],
            rows: vec![
                vec![json!(1), json!("x".repeat(80))],
                vec![json!(22), json!("short")],
            ],
            ..Default::default()
        };
        assert_eq!(
            column_widths(&result, &[0, 1]),
            vec![Constraint::Length(3), Constraint::Length(MAX_COLUMN_WIDTH)]
        );
        assert_eq!(
            column_widths(&result, &[1]),
            vec![Constraint::Length(3), Constraint::Length(9)]
        );
    }

    #[test]
    fn test_role_selection_renders() {
        let config = crate::models::connections::AppConfig::from_lookup(|_| None).unwrap();
        let ui = ConsoleUI::new(config, std::path::PathBuf::from("."));

        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        terminal.draw(|f| render(f, &ui)).unwrap();

        let content: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(content.contains("viewer_srs"));
        assert!(content.contains("Log in to srsdb"));
    }
}
