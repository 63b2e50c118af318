use super::settings::ExamSettings;

const LEVEL_PLACEHOLDER: &str = "{course_level}";
const NAME_PLACEHOLDER: &str = "{course_name}";
const DETAILS_PLACEHOLDER: &str = "{extra_details}";

pub const SYSTEM_PROMPT_TEMPLATE: &str = "\
Please provide correct and very concise answers to the following questions from
a {course_level}-level exam from {course_name}.
Use technical or advanced language as appropriate to the level of the course
to answer the question correctly.

{extra_details}

Some questions may have multiple parts, denoted by letters after the question number.
For example: 1A and 1B. When answering multiple part questions, refer to the answer of
previous parts of the question as necessary to answer each question correctly.

Do not include numeric lists in the answer unless the question specifically asks for one.

If the question asks for a sketch, provide detailed instructions to draw the requested sketch.

Answers will be provided back to the examiner by copying and pasting answers into a
document.

For formatting of any responses, provide each answer as
plain text without markup symbols or header markers such as \"**\" or \"--\".

";

pub const USER_INIT_STATEMENT: &str = "I am ready to provide you with questions to answer.";

pub const ASSISTANT_INIT_STATEMENT: &str = "\
I am ready to answer the questions correctly and concisely at the appropriate
level, without using numerical lists unless the question specifically asks for
one. I will not include markup symbols or header markers
such as \"**\" or \"--\".
";

/// Fill the system template with one exam's course metadata.
pub fn render_system_prompt(exam: &ExamSettings) -> String {
    SYSTEM_PROMPT_TEMPLATE
        .trim_start()
        .replace(LEVEL_PLACEHOLDER, &exam.course_level)
        .replace(NAME_PLACEHOLDER, &exam.course_name)
        .replace(DETAILS_PLACEHOLDER, &exam.extra_details)
}

#[cfg(test)]
mod tests {
    use super::render_system_prompt;
    use crate::exam::ExamSettings;

    #[test]
    fn placeholders_are_all_substituted() {
        let exam = ExamSettings {
            course_id: "Imm".to_string(),
            course_name: "Immunology".to_string(),
            course_level: "undergraduate".to_string(),
            extra_details: String::new(),
        };
        let prompt = render_system_prompt(&exam);
        assert!(prompt.contains("a undergraduate-level exam from Immunology."));
        assert!(!prompt.contains('{'));
        assert!(prompt.ends_with("\"--\".\n\n"));
    }
}
