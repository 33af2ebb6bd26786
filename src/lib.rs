mod engine;
mod input;
mod midi_importer;
mod model;
mod player;
mod playlist;
mod util;
mod view;
mod visualiser;

pub use engine::*;
pub use input::*;
pub use midi_importer::*;
pub use model::config::*;
pub use model::palette::*;
pub use model::song::*;
pub use player::*;
pub use playlist::*;
pub use util::*;
pub use view::{KEY_COUNT, LOWEST_KEY, NoteRect, Scene, layout_notes, render};
pub use visualiser::*;
