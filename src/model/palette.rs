/// Number of distinct channels in a standard MIDI stream.
pub const CHANNEL_COUNT: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// Same hue, scaled towards black. Used for the note outlines and the dimmed keys.
    pub fn darken(self, factor: f32) -> Self {
        let f = factor.clamp(0.0, 1.0);
        Rgb(
            (self.0 as f32 * f) as u8,
            (self.1 as f32 * f) as u8,
            (self.2 as f32 * f) as u8,
        )
    }
}

// The first eight are the classic defaults; the second eight fill the gaps in hue and
// lightness between them so that neighbouring channels stay distinguishable.
const PALETTE: [Rgb; CHANNEL_COUNT] = [
    Rgb(255, 128, 20),
    Rgb(0, 128, 255),
    Rgb(150, 50, 255),
    Rgb(0, 255, 0),
    Rgb(255, 0, 0),
    Rgb(150, 255, 255),
    Rgb(255, 100, 255),
    Rgb(0, 0, 255),
    Rgb(255, 230, 0),
    Rgb(0, 150, 110),
    Rgb(140, 70, 20),
    Rgb(255, 170, 190),
    Rgb(110, 110, 0),
    Rgb(200, 200, 255),
    Rgb(120, 0, 60),
    Rgb(180, 255, 120),
];

/// Fixed colour for a channel; channels past 15 wrap around.
pub fn channel_colour(channel: u8) -> Rgb {
    PALETTE[channel as usize % CHANNEL_COUNT]
}
