use crate::BoundaryPolicy;
use log::info;

pub fn parse_boundary(input: &str) -> BoundaryPolicy {
    match input.to_lowercase().as_str() {
        "w" | "wrap" | "loop" => BoundaryPolicy::Wrap,
        "s" | "stop" | "clamp" => BoundaryPolicy::Stop,
        other => {
            info!("Unknown boundary policy '{}', defaulting to `wrap`..!", other);
            BoundaryPolicy::Wrap
        }
    }
}

/// `90.5` -> `"1:30.5"`
pub fn format_clock(seconds: f64) -> String {
    let tenths = (seconds.max(0.0) * 10.0).round() as u64;
    let (minutes, rest) = (tenths / 600, tenths % 600);
    format!("{}:{:02}.{}", minutes, rest / 10, rest % 10)
}

pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Scientific pitch name, middle C (60) is `C4`.
pub fn note_name(pitch: u8) -> String {
    let octave = (pitch / 12) as i8 - 1;
    format!("{}{}", NOTE_NAMES[(pitch % 12) as usize], octave)
}
