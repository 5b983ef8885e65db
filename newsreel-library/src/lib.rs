//! Media library for Newsreel - decoding, fetching, narration, and storage

pub mod config;
mod fetch;
mod http;
mod loader;
mod narrate;
mod poll;
mod speech;
mod store;

pub use config::Config;
pub use fetch::{extension_of, fetch_bytes, FetchError};
pub use http::HttpClient;
pub use loader::{LoadError, LoadedAudio, TrackLoader};
pub use narrate::{await_record, Narration, NarrationError, Narrator};
pub use poll::{PollOutcome, PollStep, Poller};
pub use speech::{HttpSpeechClient, ServiceError, ServiceErrorKind, SpeechResult, SpeechService};
pub use store::{
    GenerationStatus, LocalMediaStore, MediaStore, RecordUpdate, StoreError, StoryRecord,
};
