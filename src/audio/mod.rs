pub mod backend;
pub mod device;

#[cfg(feature = "alsa")]
pub mod input;

pub use backend::{open_audio_source, AudioFormat, AudioSource, BYTES_PER_SAMPLE};
pub use device::{alsa_hint_names, proc_card_id};
