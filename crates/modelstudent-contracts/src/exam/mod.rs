mod prompts;
mod settings;

pub use prompts::{
    render_system_prompt, ASSISTANT_INIT_STATEMENT, SYSTEM_PROMPT_TEMPLATE, USER_INIT_STATEMENT,
};
pub use settings::{load_questions, split_questions, ExamSettings, QUESTION_SEPARATOR};
