mod content;
mod history;
mod message;
mod query;

pub use content::{process_content, validate_questions, ContentError, IMAGE_MARKER};
pub use history::{seed_history, Conversation};
pub use message::{Content, ContentPart, ImageSource, Message, Role};
pub use query::{QueryResult, ResponseDetails, TokenUsage, UNKNOWN_FINISH_REASON};
