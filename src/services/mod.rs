mod assembler;
mod ollama;
mod telegram;
mod youtube;

pub use assembler::{Assembler, FfmpegAssembler};
pub use ollama::ScriptGenerator;
pub use telegram::TelegramClient;
pub use youtube::TrendSourceClient;
