pub mod transcript;

pub use transcript::{TranscriptHeader, TranscriptReporter};
