/*!
 * Bluelight TUI Interface
 * Devices on the left, keys on the right
 */

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};

use bluelight_agent::Device;

use crate::app::{App, FocusedPanel};

// Conservative color palette
const BLUE: Color = Color::Rgb(100, 149, 237);
const GRAY: Color = Color::Rgb(128, 128, 128);
const WHITE: Color = Color::Rgb(255, 255, 255);
const GREEN: Color = Color::Rgb(34, 139, 34);

pub fn render_ui(f: &mut Frame, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(f.area());

    let panels = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[0]);

    render_devices_panel(f, panels[0], app);
    render_keys_panel(f, panels[1], app);
    render_status_line(f, rows[1], app);
}

fn border_style(app: &App, panel: FocusedPanel) -> Style {
    if app.focused_panel == panel {
        Style::default().fg(BLUE)
    } else {
        Style::default().fg(GRAY)
    }
}

fn render_devices_panel(f: &mut Frame, area: Rect, app: &App) {
    let focused = app.focused_panel == FocusedPanel::Devices;
    let items: Vec<ListItem> = if app.devices.is_empty() {
        vec![ListItem::new(Line::from(Span::styled(
            "No Nearby Devices",
            Style::default().fg(GRAY),
        )))]
    } else {
        app.devices
            .iter()
            .enumerate()
            .map(|(i, device)| {
                let action = if device.is_bonded() { "[Forget]" } else { "[Pair]" };
                device_row(device, action, area, focused && i == app.selected_device)
            })
            .collect()
    };

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Devices")
            .border_style(border_style(app, FocusedPanel::Devices)),
    );
    f.render_widget(list, area);
}

fn render_keys_panel(f: &mut Frame, area: Rect, app: &App) {
    let focused = app.focused_panel == FocusedPanel::Keys;
    let items: Vec<ListItem> = if app.paired.is_empty() {
        vec![ListItem::new(Line::from(Span::styled(
            "No Paired Devices",
            Style::default().fg(GRAY),
        )))]
    } else {
        app.paired
            .iter()
            .enumerate()
            .map(|(i, device)| {
                let marker = if app.is_key(device) { "[KEY]" } else { "[ ]" };
                device_row(device, marker, area, focused && i == app.selected_key)
            })
            .collect()
    };

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Keys")
            .border_style(border_style(app, FocusedPanel::Keys)),
    );
    f.render_widget(list, area);
}

/// Alias on the left, action marker flush right.
fn device_row<'a>(device: &'a Device, marker: &'a str, area: Rect, highlighted: bool) -> ListItem<'a> {
    let prefix = if highlighted { "▶ " } else { "  " };
    let status_indicator = if device.is_connected() { "●" } else { "○" };
    let status_color = if device.is_connected() { GREEN } else { GRAY };

    // Borders take one column each side
    let inner = area.width.saturating_sub(2) as usize;
    let used = prefix.chars().count() + 2 + device.alias().chars().count() + marker.chars().count();
    let padding = " ".repeat(inner.saturating_sub(used));

    let name_style = if highlighted {
        Style::default().fg(WHITE).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(WHITE)
    };
    let marker_style = if highlighted {
        Style::default().fg(WHITE).add_modifier(Modifier::REVERSED)
    } else {
        Style::default().fg(GRAY)
    };

    ListItem::new(Line::from(vec![
        Span::raw(prefix),
        Span::styled(status_indicator, Style::default().fg(status_color)),
        Span::raw(" "),
        Span::styled(device.alias(), name_style),
        Span::raw(padding),
        Span::styled(marker, marker_style),
    ]))
}

fn render_status_line(f: &mut Frame, area: Rect, app: &App) {
    let help = "[←/→] Panel  [↑/↓] Move  [Enter] Select  [v] Verify  [r] Refresh  [q] Quit";
    let line = match &app.status {
        Some(status) => Line::from(vec![
            Span::styled(status.as_str(), Style::default().fg(WHITE)),
            Span::raw("  "),
            Span::styled(help, Style::default().fg(GRAY)),
        ]),
        None => Line::from(Span::styled(help, Style::default().fg(GRAY))),
    };
    f.render_widget(Paragraph::new(line), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::{device, NullBus};
    use bluelight_agent::TrustedKeys;
    use ratatui::{backend::TestBackend, Terminal};
    use std::rc::Rc;

    fn screen(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 12)).unwrap();
        terminal.draw(|f| render_ui(f, app)).unwrap();

        let buffer = terminal.backend().buffer();
        let mut text = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                text.push_str(buffer[(x, y)].symbol());
            }
            text.push('\n');
        }
        text
    }

    #[test]
    fn test_empty_state() {
        let app = App::new(TrustedKeys::new());
        let text = screen(&app);

        assert!(text.contains("No Nearby Devices"));
        assert!(text.contains("No Paired Devices"));
    }

    #[test]
    fn test_devices_and_keys_are_rendered() {
        let bus = Rc::new(NullBus::default());
        let keys: TrustedKeys = ["AA:AA:AA:AA:AA:AA"].into_iter().collect();
        let mut app = App::new(keys);
        app.set_devices(vec![
            device(&bus, "Phone", "AA:AA:AA:AA:AA:AA", true),
            device(&bus, "Speaker", "DD:DD:DD:DD:DD:DD", false),
        ]);
        app.status = Some("Phone is present".to_string());

        let text = screen(&app);
        assert!(text.contains("Phone"));
        assert!(text.contains("[Forget]"));
        assert!(text.contains("Speaker"));
        assert!(text.contains("[Pair]"));
        assert!(text.contains("[KEY]"));
        assert!(text.contains("Phone is present"));
    }
}
