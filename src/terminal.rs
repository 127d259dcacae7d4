mod bullet_points;
mod prompt;

pub use bullet_points::{label_width, BulletPointPrinter, LineWriter, StdoutLineWriter};
pub use prompt::{prompt_acknowledge, PromptConflictResolver};
