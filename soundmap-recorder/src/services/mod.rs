//! External collaborators reached over the network

pub mod sound_generator;

pub use sound_generator::{ElevenLabsGenerator, GeneratedSound, SoundGenerationError, SoundGenerator};
