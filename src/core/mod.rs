pub mod analyzer;
pub mod audio;
pub mod engine;
pub mod midi;
pub mod note;
