//! Builds the system instruction steering the reading companion.

/// The reading assignment this reflection session is about.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub book_title: String,
    /// Chapter range under discussion, e.g. "6-10".
    pub chapters: String,
    /// Exact question the companion should open with. When absent the
    /// companion picks its own opening question about the chapters.
    pub opening_question: Option<String>,
}

pub fn system_instruction(assignment: &Assignment) -> String {
    let opening = match &assignment.opening_question {
        Some(question) => format!(
            "1. START IMMEDIATELY by asking this exact question: \"{}\"",
            question
        ),
        None => format!(
            "1. START IMMEDIATELY by asking one specific question about chapters {} of \"{}\".",
            assignment.chapters, assignment.book_title
        ),
    };

    format!(
        "You are a friendly AI reading companion. Make sure you finish asking your question \
before stopping because you heard background noise or anything else, don't get distracted.\n\
The student is reading \"{title}\", chapters {chapters}.\n\n\
CRITICAL RULES:\n\
{opening}\n\
2. BE BRIEF. Keep every response under 15 words.\n\
3. Focus only on chapters {chapters} of \"{title}\".\n\
4. Only ask ONE question at a time.\n\
5. Stay encouraging and warm, be specific and grounded in the events of those chapters, \
don't add fluff.",
        title = assignment.book_title,
        chapters = assignment.chapters,
        opening = opening,
    )
}
