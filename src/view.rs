use crate::model::palette::{Rgb, channel_colour};
use crate::model::song::NoteEvent;
use crate::util::format_clock;
use ratatui::Frame;
use ratatui::buffer::Buffer;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Paragraph, Widget};

/// A0, the lowest key on an 88-key piano.
pub const LOWEST_KEY: u8 = 21;
pub const KEY_COUNT: u8 = 88;

const BACKGROUND: Color = Color::Rgb(60, 60, 60);
const OCTAVE_DIVIDER: Color = Color::Rgb(80, 80, 80);
const HIT_LINE: Color = Color::Rgb(200, 0, 0);
const WHITE_KEY: Color = Color::Rgb(235, 235, 235);
const BLACK_KEY: Color = Color::Rgb(20, 20, 20);

impl From<Rgb> for Color {
    fn from(c: Rgb) -> Self {
        Color::Rgb(c.0, c.1, c.2)
    }
}

/// One visible note, placed on the roll. `bottom` and `top` are measured in lookahead
/// windows above the hit line: 0 is the hit line, 1 the top of the roll, negatives are
/// already behind it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteRect {
    pub lane: u8,
    pub bottom: f64,
    pub top: f64,
    pub colour: Rgb,
}

pub fn is_black_key(pitch: u8) -> bool {
    matches!(pitch % 12, 1 | 3 | 6 | 8 | 10)
}

/// Horizontal lane of a pitch on the 88-key piano, `None` when it's off the keyboard.
pub fn lane(pitch: u8) -> Option<u8> {
    pitch
        .checked_sub(LOWEST_KEY)
        .filter(|lane| *lane < KEY_COUNT)
}

/// Maps notes to draw commands for the frame at `current_time`.
pub fn layout_notes<'a, I>(notes: I, current_time: f64, lookahead: f64) -> Vec<NoteRect>
where
    I: IntoIterator<Item = &'a NoteEvent>,
{
    let lookahead = lookahead.max(f64::EPSILON);

    notes
        .into_iter()
        .filter_map(|note| {
            Some(NoteRect {
                lane: lane(note.pitch)?,
                bottom: (note.start_time - current_time) / lookahead,
                top: (note.end_time - current_time) / lookahead,
                colour: channel_colour(note.channel),
            })
        })
        .collect()
}

/// Column span `[start, end)` of a lane when 88 lanes are squeezed into `width` columns.
fn lane_columns(lane: u8, width: u16) -> (u16, u16) {
    let w = width as u32;
    let start = lane as u32 * w / KEY_COUNT as u32;
    let end = ((lane as u32 + 1) * w / KEY_COUNT as u32).max(start + 1);
    (start as u16, end.min(w) as u16)
}

fn lane_at_column(column: u16, width: u16) -> u8 {
    ((column as u32 * KEY_COUNT as u32) / (width.max(1) as u32)).min(KEY_COUNT as u32 - 1) as u8
}

/// The scrolling note area.
pub struct PianoRoll<'a> {
    pub rects: &'a [NoteRect],
    /// Lookbehind as a fraction of the lookahead; room reserved under the hit line.
    pub behind: f64,
    pub octave_dividers: bool,
}

impl PianoRoll<'_> {
    /// Row (from the top of `area`) for a position measured in lookahead windows.
    fn row(&self, position: f64, height: u16) -> f64 {
        let span = 1.0 + self.behind.max(0.0);
        (1.0 - position) / span * height as f64
    }
}

impl Widget for PianoRoll<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width == 0 || area.height == 0 {
            return;
        }

        for y in area.top()..area.bottom() {
            for x in area.left()..area.right() {
                if let Some(cell) = buf.cell_mut((x, y)) {
                    cell.reset();
                    cell.set_bg(BACKGROUND);
                }
            }
        }

        if self.octave_dividers {
            for pitch in (LOWEST_KEY..LOWEST_KEY + KEY_COUNT).filter(|p| p % 12 == 0) {
                let Some(lane) = lane(pitch) else { continue };
                let x = area.x + lane_columns(lane, area.width).0;
                for y in area.top()..area.bottom() {
                    if let Some(cell) = buf.cell_mut((x, y)) {
                        cell.set_symbol("│").set_fg(OCTAVE_DIVIDER);
                    }
                }
            }
        }

        if self.behind > 0.0 {
            let y = area.y + (self.row(0.0, area.height).round() as u16).min(area.height - 1);
            for x in area.left()..area.right() {
                if let Some(cell) = buf.cell_mut((x, y)) {
                    cell.set_symbol("─").set_fg(HIT_LINE);
                }
            }
        }

        let height = area.height as f64;
        for rect in self.rects {
            let top = self.row(rect.top, area.height).floor().clamp(0.0, height);
            let bottom = self.row(rect.bottom, area.height).ceil().clamp(0.0, height);
            if top >= height || bottom <= 0.0 {
                continue;
            }
            let (top, bottom) = (top as u16, (bottom as u16).max(top as u16 + 1));

            let (x0, x1) = lane_columns(rect.lane, area.width);
            let colour: Color = rect.colour.into();
            let edge: Color = rect.colour.darken(0.5).into();

            for y in (area.y + top)..(area.y + bottom).min(area.bottom()) {
                for x in (area.x + x0)..(area.x + x1) {
                    if let Some(cell) = buf.cell_mut((x, y)) {
                        cell.set_symbol(" ").set_bg(colour).set_fg(edge);
                    }
                }
            }
        }
    }
}

/// Two-row keyboard strip; keys of sounding notes light up in their channel colour.
pub struct Keyboard<'a> {
    /// `(pitch, channel)` of every sounding note.
    pub pressed: &'a [(u8, u8)],
}

impl Keyboard<'_> {
    fn key_colour(&self, pitch: u8) -> Color {
        match self.pressed.iter().rev().find(|(p, _)| *p == pitch) {
            Some((_, channel)) => channel_colour(*channel).into(),
            None if is_black_key(pitch) => BLACK_KEY,
            None => WHITE_KEY,
        }
    }
}

impl Widget for Keyboard<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        for column in 0..area.width {
            let pitch = LOWEST_KEY + lane_at_column(column, area.width);
            let x = area.x + column;

            for (row, y) in (area.top()..area.bottom()).enumerate() {
                // the last row only shows the white keys, like the front edge of a real piano
                let shown = if row + 1 == area.height as usize && is_black_key(pitch) {
                    pitch.saturating_sub(1)
                } else {
                    pitch
                };

                if let Some(cell) = buf.cell_mut((x, y)) {
                    cell.reset();
                    let bg = self.key_colour(shown);
                    cell.set_symbol(" ").set_bg(bg);
                    if !is_black_key(shown) && shown % 12 == 0 {
                        cell.set_symbol("▏").set_fg(BLACK_KEY);
                    }
                }
            }
        }
    }
}

/// Everything a frame needs to draw, collected by the visualiser.
#[derive(Debug, Clone)]
pub struct Scene {
    pub rects: Vec<NoteRect>,
    pub pressed: Vec<(u8, u8)>,
    pub behind: f64,
    pub octave_dividers: bool,
    pub show_keyboard: bool,
    pub title: String,
    pub playing: bool,
    pub current_time: f64,
    pub total_duration: f64,
    pub position: usize,
    pub playlist_len: usize,
    pub message: Option<String>,
}

fn status_line(scene: &Scene) -> Line<'_> {
    let icon = if scene.playing { " ▶ " } else { " ⏸ " };

    let mut spans = vec![
        Span::styled(icon, Style::default().add_modifier(Modifier::BOLD)),
        Span::styled(scene.title.as_str(), Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!(
            "  {} / {}  [{}/{}]",
            format_clock(scene.current_time),
            format_clock(scene.total_duration),
            scene.position + 1,
            scene.playlist_len
        )),
    ];

    if let Some(message) = &scene.message {
        spans.push(Span::styled(
            format!("  {}", message),
            Style::default().fg(Color::LightRed),
        ));
    }

    Line::from(spans)
}

const HELP: &str = " space play/pause · r restart · ←/→ previous/next · q quit";

pub fn render(frame: &mut Frame, scene: &Scene) {
    let keyboard_rows = if scene.show_keyboard { 2 } else { 0 };

    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),             // status
            Constraint::Min(3),                // roll
            Constraint::Length(1),             // hit line
            Constraint::Length(keyboard_rows), // keys
            Constraint::Length(1),             // help
        ])
        .split(frame.area());

    frame.render_widget(Paragraph::new(status_line(scene)), sections[0]);
    frame.render_widget(
        PianoRoll {
            rects: &scene.rects,
            behind: scene.behind,
            octave_dividers: scene.octave_dividers,
        },
        sections[1],
    );
    frame.render_widget(
        Paragraph::new("").style(Style::default().bg(HIT_LINE)),
        sections[2],
    );
    if scene.show_keyboard {
        frame.render_widget(
            Keyboard {
                pressed: &scene.pressed,
            },
            sections[3],
        );
    }
    frame.render_widget(
        Paragraph::new(HELP).style(Style::default().fg(Color::DarkGray)),
        sections[4],
    );
}

#[cfg(test)]
mod test {
    use super::*;
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    fn note(channel: u8, pitch: u8, start: f64, end: f64) -> NoteEvent {
        NoteEvent {
            channel,
            pitch,
            velocity: 100,
            start_time: start,
            end_time: end,
        }
    }

    #[test]
    fn lanes_cover_the_88_keys() {
        assert_eq!(lane(21), Some(0));
        assert_eq!(lane(60), Some(39));
        assert_eq!(lane(108), Some(87));
        assert_eq!(lane(20), None);
        assert_eq!(lane(109), None);
    }

    #[test]
    fn black_keys() {
        assert!(!is_black_key(60));
        assert!(is_black_key(61));
        assert!(is_black_key(22));
        assert!(!is_black_key(21));
    }

    #[test]
    fn layout_positions_notes_relative_to_now() {
        let notes = vec![note(0, 60, 3.0, 4.0), note(5, 21, 2.0, 2.5), note(1, 127, 2.0, 3.0)];
        let rects = layout_notes(&notes, 2.0, 2.0);

        assert_eq!(rects.len(), 2);
        assert_eq!(rects[0].lane, 39);
        assert!((rects[0].bottom - 0.5).abs() < 1e-9);
        assert!((rects[0].top - 1.0).abs() < 1e-9);
        assert_eq!(rects[0].colour, channel_colour(0));

        assert_eq!(rects[1].lane, 0);
        assert_eq!(rects[1].bottom, 0.0);
        assert!((rects[1].top - 0.25).abs() < 1e-9);
        assert_eq!(rects[1].colour, channel_colour(5));
    }

    #[test]
    fn lane_columns_stay_in_bounds() {
        for width in [10_u16, 40, 88, 200] {
            for lane in 0..KEY_COUNT {
                let (start, end) = lane_columns(lane, width);
                assert!(start < end);
                assert!(end <= width);
            }
        }
        assert_eq!(lane_columns(0, 176), (0, 2));
        assert_eq!(lane_columns(87, 176), (174, 176));
        assert_eq!(lane_at_column(175, 176), 87);
    }

    #[test]
    fn roll_paints_note_at_the_hit_line() {
        let area = Rect::new(0, 0, 88, 10);
        let mut buf = Buffer::empty(area);
        let rects = layout_notes(&[note(1, 60, 0.0, 1.0)], 0.0, 2.0);

        PianoRoll {
            rects: &rects,
            behind: 0.0,
            octave_dividers: false,
        }
        .render(area, &mut buf);

        let colour: Color = channel_colour(1).into();
        // occupies the lower half of lane 39
        assert_eq!(buf[(39, 9)].bg, colour);
        assert_eq!(buf[(39, 5)].bg, colour);
        assert_eq!(buf[(39, 4)].bg, BACKGROUND);
        assert_eq!(buf[(38, 9)].bg, BACKGROUND);
    }

    #[test]
    fn roll_skips_notes_outside_the_window() {
        let area = Rect::new(0, 0, 88, 8);
        let mut buf = Buffer::empty(area);
        let rects = vec![
            NoteRect {
                lane: 10,
                bottom: 1.5,
                top: 2.0,
                colour: Rgb(1, 2, 3),
            },
            NoteRect {
                lane: 11,
                bottom: -3.0,
                top: -2.0,
                colour: Rgb(1, 2, 3),
            },
        ];

        PianoRoll {
            rects: &rects,
            behind: 0.0,
            octave_dividers: false,
        }
        .render(area, &mut buf);

        for y in 0..8 {
            assert_eq!(buf[(10, y)].bg, BACKGROUND);
            assert_eq!(buf[(11, y)].bg, BACKGROUND);
        }
    }

    #[test]
    fn keyboard_lights_pressed_keys() {
        let area = Rect::new(0, 0, 88, 2);
        let mut buf = Buffer::empty(area);
        Keyboard {
            pressed: &[(60, 2), (61, 4)],
        }
        .render(area, &mut buf);

        assert_eq!(buf[(39, 0)].bg, Color::from(channel_colour(2)));
        assert_eq!(buf[(40, 0)].bg, Color::from(channel_colour(4)));
        // the front row under a black key shows its white neighbour
        assert_eq!(buf[(40, 1)].bg, Color::from(channel_colour(2)));
        assert_eq!(buf[(41, 0)].bg, WHITE_KEY);
        assert_eq!(buf[(42, 0)].bg, BLACK_KEY);
    }

    #[test]
    fn full_frame_renders() {
        let backend = TestBackend::new(100, 20);
        let mut terminal = Terminal::new(backend).unwrap();
        let scene = Scene {
            rects: layout_notes(&[note(0, 64, 0.5, 1.0)], 0.0, 2.0),
            pressed: vec![(64, 0)],
            behind: 0.0,
            octave_dividers: true,
            show_keyboard: true,
            title: String::from("demo.mid"),
            playing: true,
            current_time: 0.0,
            total_duration: 61.0,
            position: 0,
            playlist_len: 3,
            message: Some(String::from("oops")),
        };

        terminal.draw(|frame| render(frame, &scene)).unwrap();

        let buffer = terminal.backend().buffer();
        let status: String = (0..buffer.area.width)
            .map(|x| buffer[(x, 0)].symbol().to_string())
            .collect();
        assert!(status.contains("demo.mid"));
        assert!(status.contains("1:01.0"));
        assert!(status.contains("[1/3]"));
        assert!(status.contains("oops"));
    }
}
