use ratatui::style::{Color, Modifier, Style};

use bizenrich_core::{ChannelState, ScrapeStatus};

/// Color theme for the TUI.
pub struct Theme {
    pub success: Color,
    pub partial: Color,
    pub failed: Color,

    pub header_fg: Color,
    pub header_bg: Color,
    pub border: Color,
    pub text: Color,
    pub dim: Color,
    pub highlight_bg: Color,
    pub active: Color,
    pub spinner: Color,
    pub gauge: Color,
    pub footer_fg: Color,
    pub footer_bg: Color,
}

impl Theme {
    pub fn terminal() -> Self {
        Self {
            success: Color::Green,
            partial: Color::Yellow,
            failed: Color::Red,

            header_fg: Color::Black,
            header_bg: Color::Cyan,
            border: Color::DarkGray,
            text: Color::White,
            dim: Color::DarkGray,
            highlight_bg: Color::Rgb(25, 40, 55),
            active: Color::Cyan,
            spinner: Color::Cyan,
            gauge: Color::Blue,
            footer_fg: Color::DarkGray,
            footer_bg: Color::Reset,
        }
    }

    pub fn status_color(&self, status: ScrapeStatus) -> Color {
        match status {
            ScrapeStatus::Success => self.success,
            ScrapeStatus::Partial => self.partial,
            ScrapeStatus::Failed => self.failed,
        }
    }

    pub fn channel_color(&self, state: ChannelState) -> Color {
        match state {
            ChannelState::Idle => self.dim,
            ChannelState::Connecting => self.partial,
            ChannelState::Live => self.success,
            ChannelState::Polling => self.active,
            ChannelState::Completed => self.success,
        }
    }

    pub fn up_down_color(&self, up: bool) -> Color {
        if up { self.success } else { self.failed }
    }

    pub fn header_style(&self) -> Style {
        Style::default().fg(self.header_fg).bg(self.header_bg).add_modifier(Modifier::BOLD)
    }

    pub fn title_style(&self) -> Style {
        Style::default().fg(self.text).add_modifier(Modifier::BOLD)
    }

    pub fn highlight_style(&self) -> Style {
        Style::default().bg(self.highlight_bg).add_modifier(Modifier::BOLD)
    }

    pub fn border_style(&self) -> Style {
        Style::default().fg(self.border)
    }

    pub fn footer_style(&self) -> Style {
        Style::default().fg(self.footer_fg).bg(self.footer_bg)
    }
}
