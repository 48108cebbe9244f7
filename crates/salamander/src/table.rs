use chrono::Utc;
use unicode_width::UnicodeWidthStr;

use salamander_protocol::ProcessListItem;

use crate::color;

const HEADERS: [&str; 6] = ["Pid", "State", "Class", "Started", "Heartbeat", "Window"];

/// Column layout for `salamander tasks`.
pub struct TableFormatter {
    widths: [usize; 6],
    own_pid: u32,
}

impl TableFormatter {
    pub fn new(items: &[ProcessListItem], own_pid: u32) -> Self {
        let mut widths = HEADERS.map(display_width);
        for item in items {
            for (width, cell) in widths.iter_mut().zip(Self::cells(item)) {
                *width = (*width).max(display_width(&cell));
            }
        }
        Self { widths, own_pid }
    }

    fn cells(item: &ProcessListItem) -> [String; 6] {
        let class = format!(
            "{}/{:?}",
            truncate(&item.privilege.sid_hash, 8),
            item.privilege.integrity_level
        )
        .to_lowercase();
        let heartbeat_age = Utc::now().timestamp_millis() - item.heartbeat_ms;
        [
            item.pid.to_string(),
            item.state.to_string(),
            class,
            item.start_time.format("%Y-%m-%d %H:%M:%S").to_string(),
            format!("{:.1}s ago", heartbeat_age.max(0) as f64 / 1000.0),
            item.main_window
                .map_or("-".to_string(), |window| format!("{:#x}", window)),
        ]
    }

    pub fn print_header(&self) {
        let line: Vec<String> = HEADERS
            .iter()
            .zip(self.widths)
            .map(|(header, width)| color::bold(&pad(header, width)))
            .collect();
        println!("{}", line.join("  "));
        let rule: Vec<String> = self.widths.iter().map(|w| "-".repeat(*w)).collect();
        println!("{}", color::muted(&rule.join("  ")));
    }

    pub fn print_row(&self, item: &ProcessListItem) {
        let cells = Self::cells(item);
        let mut line = Vec::with_capacity(cells.len());
        for (i, (cell, width)) in cells.iter().zip(self.widths).enumerate() {
            let padded = pad(cell, width);
            line.push(match i {
                0 if item.pid == self.own_pid => color::bold(&padded),
                0 => color::accent(&padded),
                1 => color::state(&padded),
                _ => padded,
            });
        }
        println!("{}", line.join("  "));
    }
}

fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Left-align `s` in `width` columns.
fn pad(s: &str, width: usize) -> String {
    let fill = width.saturating_sub(display_width(s));
    format!("{}{}", s, " ".repeat(fill))
}

/// Cut `s` to at most `max` chars.
pub fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use salamander_protocol::{IntegrityLevel, PrivilegeClass, ProcessState};
    use std::path::PathBuf;

    fn item(pid: u32) -> ProcessListItem {
        ProcessListItem {
            pid,
            privilege: PrivilegeClass {
                sid_hash: "0123456789abcdef".repeat(2),
                integrity_level: IntegrityLevel::Medium,
            },
            state: ProcessState::Running,
            main_window: Some(255),
            salmon_pid: None,
            start_time: Utc::now(),
            heartbeat_ms: Utc::now().timestamp_millis(),
            control_socket: PathBuf::from("/tmp/x.sock"),
        }
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abcdef", 3), "abc");
        assert_eq!(truncate("ab", 3), "ab");
        assert_eq!(truncate("žluťoučký", 4), "žluť");
    }

    #[test]
    fn test_pad_uses_display_width() {
        assert_eq!(pad("ab", 4), "ab  ");
        assert_eq!(pad("abcdef", 4), "abcdef");
    }

    #[test]
    fn test_cells() {
        let cells = TableFormatter::cells(&item(4242));
        assert_eq!(cells[0], "4242");
        assert_eq!(cells[1], "running");
        assert_eq!(cells[2], "01234567/medium");
        assert_eq!(cells[5], "0xff");
    }

    #[test]
    fn test_widths_grow_to_content() {
        let formatter = TableFormatter::new(&[item(1_234_567)], 1);
        assert_eq!(formatter.widths[0], 7);
        assert_eq!(formatter.widths[1], "running".len());
    }
}
