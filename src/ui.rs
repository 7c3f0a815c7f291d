use ratatui::{
    Frame,
    layout::{Constraint, Layout, Position, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Wrap},
};

use crate::domain::{DashConfig, Severity};
use crate::filter::SortDirection;
use crate::model::{Model, Screen, UIData};
use crate::table::TableView;

pub const CMDLINE_HEIGH: usize = 2;
pub const TABLE_HEADER_HEIGHT: usize = 1;
pub const FOOTER_HEIGHT: usize = 1;
pub const TITLE_HEIGHT: usize = 1;
pub const CHECKBOX_WIDTH: usize = 4;
pub const COLUMN_WIDTH_MARGIN: usize = 1;

const POPUP_WIDTH: u16 = 76;
const POPUP_HEIGHT: u16 = 40;

#[derive(Debug)]
pub struct TableUI {
    max_column_width: usize,
}

fn centered_area(area: Rect, max_width: u16, max_height: u16) -> Rect {
    let width = area.width.min(max_width);
    let height = area.height.min(max_height);
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn severity_style(severity: Severity) -> Style {
    match severity {
        Severity::Success => Style::default().fg(Color::Green),
        Severity::Info => Style::default().fg(Color::Cyan),
        Severity::Warning => Style::default().fg(Color::Yellow),
        Severity::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    }
}

fn checkbox(checked: bool) -> &'static str {
    if checked { "[x]" } else { "[ ]" }
}

impl TableUI {
    pub fn new(cfg: &DashConfig) -> Self {
        Self {
            max_column_width: cfg.max_column_width,
        }
    }

    pub fn draw(&mut self, model: &Model, frame: &mut Frame) {
        let uidata = model.get_uidata();
        let [title_area, body_area, status_area, cmd_area] = Layout::vertical([
            Constraint::Length(TITLE_HEIGHT as u16),
            Constraint::Min(0),
            Constraint::Length(1),
            Constraint::Length((CMDLINE_HEIGH - 1) as u16),
        ])
        .areas(frame.area());

        self.draw_title(&uidata, frame, title_area);
        match &uidata.screen {
            Screen::Login => self.draw_login(&uidata, frame, body_area),
            Screen::Pages { pages, selected } => self.draw_pages(pages, *selected, frame, body_area),
            Screen::Loading { what } => {
                let text = Paragraph::new(what.as_str()).centered().italic();
                frame.render_widget(text, centered_area(body_area, body_area.width, 1));
            }
            Screen::Error { message } => self.draw_error(message, frame, body_area),
            Screen::Table(table) => self.draw_table(table, &uidata, frame, body_area),
        }
        self.draw_statusline(&uidata, frame, status_area);
        self.draw_cmdline(&uidata, frame, cmd_area);

        if uidata.show_popup {
            self.draw_popup(uidata.popup_message, frame);
        }
    }

    fn draw_title(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let mut spans = vec![
            " pagedesk ".bold().reversed(),
            Span::raw(format!(" {} ", uidata.tenant)),
        ];
        if let Screen::Table(table) = &uidata.screen {
            spans.push(Span::raw(format!("/ {} ", table.name)).bold());
        }
        if let Some(user) = uidata.user {
            spans.push(Span::raw(format!("  user: {user}")));
        }
        if let Some(minutes) = uidata.session_minutes_left {
            spans.push(Span::raw(format!("  session: {}m left", minutes.max(0))).dim());
        }
        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    fn draw_login(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let lines = vec![
            Line::from(format!("Sign in to {}", uidata.tenant)).bold(),
            Line::from(""),
            Line::from("Enter your username below, then the OTP you receive."),
            Line::from("Esc on the OTP prompt starts over."),
        ];
        let block = Block::default().borders(Borders::ALL).title(" Login ");
        let text = Paragraph::new(lines).centered().block(block);
        frame.render_widget(text, centered_area(area, 60, 6));
    }

    fn draw_pages(&self, pages: &[String], selected: usize, frame: &mut Frame, area: Rect) {
        let items: Vec<Line> = if pages.is_empty() {
            vec![Line::from("No pages for this tenant").italic()]
        } else {
            pages
                .iter()
                .enumerate()
                .map(|(idx, page)| {
                    if idx == selected {
                        Line::from(format!("> {page}")).reversed()
                    } else {
                        Line::from(format!("  {page}"))
                    }
                })
                .collect()
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .title(" Pages ")
            .title_bottom(" Enter open · r reload · L sign out ");
        // centered_area trims this to the body height
        let height = u16::try_from(pages.len() + 2).unwrap_or(u16::MAX).max(3);
        frame.render_widget(
            Paragraph::new(items).block(block),
            centered_area(area, 50, height),
        );
    }

    fn draw_error(&self, message: &str, frame: &mut Frame, area: Rect) {
        let lines = vec![
            Line::from(message.to_string()).red(),
            Line::from(""),
            Line::from("r retry · g page list · L sign out · q quit").dim(),
        ];
        let block = Block::default().borders(Borders::ALL).title(" Error ").red();
        let text = Paragraph::new(lines)
            .centered()
            .wrap(Wrap { trim: true })
            .block(block);
        frame.render_widget(text, centered_area(area, 80, 7));
    }

    fn header_label(table: &TableView, name: &str, header: &str) -> String {
        let mut label = header.to_string();
        if let Some(sort) = &table.filter.sort
            && sort.column == name
        {
            label.push(match sort.direction {
                SortDirection::Ascending => '▲',
                SortDirection::Descending => '▼',
            });
        }
        let filtered = table
            .filter
            .per_column
            .get(name)
            .is_some_and(|f| !f.text.is_empty())
            || table.filter.date_range.as_ref().is_some_and(|r| r.column == name);
        if filtered {
            label.push('*');
        }
        label
    }

    fn draw_table(&self, table: &TableView, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let [table_area, footer_area] =
            Layout::vertical([Constraint::Min(0), Constraint::Length(FOOTER_HEIGHT as u16)])
                .areas(area);

        let columns = table.visible_columns();
        let widths = table.column_widths(self.max_column_width);

        // Columns from the scroll offset that fit into the area
        let mut shown = Vec::new();
        let mut used = CHECKBOX_WIDTH;
        for idx in table.offset_column..columns.len() {
            let width = widths[idx] + COLUMN_WIDTH_MARGIN;
            if !shown.is_empty() && used + width > table_area.width as usize {
                break;
            }
            used += width;
            shown.push(idx);
        }

        let mut constraints = vec![Constraint::Length((CHECKBOX_WIDTH - 1) as u16)];
        constraints.extend(shown.iter().map(|&idx| Constraint::Length(widths[idx] as u16)));

        let mut header_cells = vec![Cell::from(checkbox(table.all_selected()))];
        header_cells.extend(shown.iter().map(|&idx| {
            let column = columns[idx];
            let label = Self::header_label(table, &column.name, &column.header);
            let mut cell = Cell::from(truncate(&label, widths[idx]));
            if idx == table.curser_column {
                cell = cell.underlined();
            }
            cell
        }));
        let header = Row::new(header_cells).bold().height(TABLE_HEADER_HEIGHT as u16);

        let editor = table.editor.as_ref();
        let rows: Vec<Row> = table
            .page_rows()
            .iter()
            .enumerate()
            .map(|(ridx, record)| {
                let mut cells = vec![Cell::from(checkbox(table.selection.contains(&record.id)))];
                for &cidx in &shown {
                    let column = columns[cidx];
                    let is_cursor = ridx == table.curser_row && cidx == table.curser_column;
                    let editing = editor
                        .filter(|e| e.row == record.id && e.column == column.name);
                    let cell = match editing {
                        Some(ed) => {
                            let style = if ed.error.is_some() {
                                Style::default().fg(Color::Black).bg(Color::Red)
                            } else {
                                Style::default().fg(Color::Black).bg(Color::Yellow)
                            };
                            let value = ed.value();
                            let line = match ed.cursor() {
                                Some(pos) => {
                                    let before: String = value.chars().take(pos).collect();
                                    let at: String = value.chars().skip(pos).take(1).collect();
                                    let after: String = value.chars().skip(pos + 1).collect();
                                    let at = if at.is_empty() { " ".to_string() } else { at };
                                    Line::from(vec![
                                        Span::raw(before),
                                        Span::raw(at).reversed(),
                                        Span::raw(after),
                                    ])
                                }
                                None => Line::from(format!("◀ {value} ▶")),
                            };
                            Cell::from(line).style(style)
                        }
                        None => {
                            let text = truncate(&record.display(&column.name), widths[cidx]);
                            let cell = Cell::from(text);
                            if is_cursor { cell.reversed() } else { cell }
                        }
                    };
                    cells.push(cell);
                }
                let row = Row::new(cells);
                if ridx == table.curser_row {
                    row.bold()
                } else {
                    row
                }
            })
            .collect();

        let body = Table::new(rows, constraints)
            .header(header)
            .column_spacing(COLUMN_WIDTH_MARGIN as u16);
        frame.render_widget(body, table_area);

        frame.render_widget(Paragraph::new(Self::footer(table, uidata)).dim(), footer_area);
    }

    fn footer(table: &TableView, uidata: &UIData) -> Line<'static> {
        let total = table.filtered_count();
        let range = table.pager.range(total);
        let mut parts = vec![
            format!(
                "page {}/{}",
                table.pager.page() + 1,
                table.pager.page_count(total)
            ),
            if total == 0 {
                "no rows".to_string()
            } else {
                format!("rows {}-{} of {total}", range.start + 1, range.end)
            },
            format!("{} per page", table.page_size()),
        ];
        if table.filter.is_active() {
            parts.push(format!("{} total", table.store.len()));
        }
        if !table.selection.is_empty() {
            parts.push(format!("{} selected", table.selection.len()));
        }
        if !table.filter.global_text.is_empty() {
            parts.push(format!("search \"{}\"", table.filter.global_text));
        }
        if let Some(column) = table.current_column()
            && let Some(filter) = table.filter.per_column.get(&column.name)
            && !filter.text.is_empty()
        {
            parts.push(format!("{} {} \"{}\"", column.header, filter.mode.label(), filter.text));
        }
        if table.hidden_count() > 0 {
            parts.push(format!("{} hidden columns", table.hidden_count()));
        }
        if table.page_size() > uidata.layout.table_height {
            parts.push("page taller than the window".to_string());
        }
        if table.store.is_mirrored() {
            parts.push("saved locally".to_string());
        }
        Line::from(format!(" {}", parts.join(" · ")))
    }

    fn draw_statusline(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let line = match uidata.notification {
            Some(n) => Line::from(vec![
                Span::styled(format!(" {}: ", n.summary), severity_style(n.severity)),
                Span::raw(n.detail.clone()),
            ]),
            None => Line::from(" ? help · q quit").dim(),
        };
        frame.render_widget(Paragraph::new(line), area);
    }

    fn draw_cmdline(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        if !uidata.active_cmdinput {
            return;
        }
        let Some(mode) = uidata.cmd_mode else {
            return;
        };
        let prompt = mode.prompt();
        // Never echo the OTP
        let shown = match mode {
            crate::domain::CMDMode::Otp => "*".repeat(uidata.cmdinput.input.chars().count()),
            _ => uidata.cmdinput.input.clone(),
        };
        let line = Line::from(vec![Span::raw(prompt).bold(), Span::raw(shown)]);
        frame.render_widget(Paragraph::new(line), area);

        let x = area.x as usize + prompt.chars().count() + uidata.cmdinput.curser_pos;
        let x = std::cmp::min(x, (area.x + area.width.saturating_sub(1)) as usize) as u16;
        frame.set_cursor_position(Position::new(x, area.y));
    }

    fn draw_popup(&self, message: &str, frame: &mut Frame) {
        let area = centered_area(frame.area(), POPUP_WIDTH, POPUP_HEIGHT);
        frame.render_widget(Clear, area);
        let block = Block::default()
            .borders(Borders::ALL)
            .title(" Help ")
            .title_bottom(" Esc close ");
        let text = Paragraph::new(Text::from(message)).block(block);
        frame.render_widget(text, area);
    }
}
